//! Trigger types for workflow initiation.
//!
//! The trigger type is denormalized onto the workflow row so event sources
//! can find the workflows interested in an event without parsing graphs.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The CRM event (or manual action) that starts a workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    LeadCreated,
    LeadUpdated,
    DealCreated,
    DealStageChanged,
    ContactCreated,
    FormSubmitted,
    EmailReceived,
    CallCompleted,
    /// Inbound HTTP webhook.
    Webhook,
    /// Time-based trigger.
    Schedule,
    /// User-initiated from the UI or API.
    Manual,
}

impl TriggerType {
    /// Every trigger type.
    pub const ALL: [Self; 11] = [
        Self::LeadCreated,
        Self::LeadUpdated,
        Self::DealCreated,
        Self::DealStageChanged,
        Self::ContactCreated,
        Self::FormSubmitted,
        Self::EmailReceived,
        Self::CallCompleted,
        Self::Webhook,
        Self::Schedule,
        Self::Manual,
    ];

    /// Returns the string representation for database storage.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LeadCreated => "lead_created",
            Self::LeadUpdated => "lead_updated",
            Self::DealCreated => "deal_created",
            Self::DealStageChanged => "deal_stage_changed",
            Self::ContactCreated => "contact_created",
            Self::FormSubmitted => "form_submitted",
            Self::EmailReceived => "email_received",
            Self::CallCompleted => "call_completed",
            Self::Webhook => "webhook",
            Self::Schedule => "schedule",
            Self::Manual => "manual",
        }
    }

    /// Parses from database string representation.
    #[must_use]
    pub fn from_str_value(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == s)
    }
}

impl fmt::Display for TriggerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
