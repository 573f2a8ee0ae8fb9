//! Action types and the dispatcher seam.
//!
//! Action nodes hand their resolved `actionConfig` to an
//! [`ActionDispatcher`]. The [`RoutingDispatcher`] fans actions out to one
//! [`ActionHandler`] per [`ActionType`].

use crate::error::DispatchError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, instrument};

/// The kind of side effect an action node performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    DraftEmail,
    SendEmail,
    UpdateField,
    CreateTask,
    CreateDeal,
    SendNotification,
    Webhook,
}

impl ActionType {
    /// Every action type.
    pub const ALL: [Self; 7] = [
        Self::DraftEmail,
        Self::SendEmail,
        Self::UpdateField,
        Self::CreateTask,
        Self::CreateDeal,
        Self::SendNotification,
        Self::Webhook,
    ];

    /// Returns the wire name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DraftEmail => "draft_email",
            Self::SendEmail => "send_email",
            Self::UpdateField => "update_field",
            Self::CreateTask => "create_task",
            Self::CreateDeal => "create_deal",
            Self::SendNotification => "send_notification",
            Self::Webhook => "webhook",
        }
    }

    /// Parses a wire name.
    #[must_use]
    pub fn from_str_value(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == s)
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trait for the collaborator that performs action side effects.
#[async_trait]
pub trait ActionDispatcher: Send + Sync {
    /// Performs the action and returns its result.
    ///
    /// # Errors
    ///
    /// Returns a classified [`DispatchError`] if the action fails.
    async fn dispatch(
        &self,
        action_type: ActionType,
        config: &JsonValue,
    ) -> Result<JsonValue, DispatchError>;
}

/// Handles one or more action types for a [`RoutingDispatcher`].
#[async_trait]
pub trait ActionHandler: Send + Sync {
    /// Performs the action.
    ///
    /// # Errors
    ///
    /// Returns a classified [`DispatchError`] if the action fails.
    async fn handle(
        &self,
        action_type: ActionType,
        config: &JsonValue,
    ) -> Result<JsonValue, DispatchError>;
}

/// Routes actions to registered handlers.
///
/// Action types with no handler fail permanently with
/// [`DispatchError::Unsupported`].
#[derive(Default, Clone)]
pub struct RoutingDispatcher {
    handlers: HashMap<ActionType, Arc<dyn ActionHandler>>,
}

impl RoutingDispatcher {
    /// Creates a dispatcher with no handlers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler for an action type, replacing any previous one.
    #[must_use]
    pub fn with_handler(mut self, action_type: ActionType, handler: Arc<dyn ActionHandler>) -> Self {
        self.handlers.insert(action_type, handler);
        self
    }

    /// Registers one handler for several action types.
    #[must_use]
    pub fn with_handler_for(
        mut self,
        action_types: impl IntoIterator<Item = ActionType>,
        handler: Arc<dyn ActionHandler>,
    ) -> Self {
        for action_type in action_types {
            self.handlers.insert(action_type, Arc::clone(&handler));
        }
        self
    }

    /// Returns whether a handler is registered for the action type.
    #[must_use]
    pub fn supports(&self, action_type: ActionType) -> bool {
        self.handlers.contains_key(&action_type)
    }
}

impl fmt::Debug for RoutingDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut routes: Vec<_> = self.handlers.keys().map(ActionType::as_str).collect();
        routes.sort_unstable();
        f.debug_struct("RoutingDispatcher")
            .field("routes", &routes)
            .finish()
    }
}

#[async_trait]
impl ActionDispatcher for RoutingDispatcher {
    #[instrument(skip(self, config), fields(action_type = %action_type))]
    async fn dispatch(
        &self,
        action_type: ActionType,
        config: &JsonValue,
    ) -> Result<JsonValue, DispatchError> {
        let handler = self
            .handlers
            .get(&action_type)
            .ok_or_else(|| DispatchError::Unsupported {
                action_type: action_type.to_string(),
            })?;
        debug!("dispatching action");
        handler.handle(action_type, config).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingHandler {
        calls: Mutex<Vec<(ActionType, JsonValue)>>,
    }

    #[async_trait]
    impl ActionHandler for RecordingHandler {
        async fn handle(
            &self,
            action_type: ActionType,
            config: &JsonValue,
        ) -> Result<JsonValue, DispatchError> {
            self.calls
                .lock()
                .unwrap()
                .push((action_type, config.clone()));
            Ok(json!({"handled": action_type.as_str()}))
        }
    }

    #[test]
    fn action_type_wire_names() {
        for action_type in ActionType::ALL {
            assert_eq!(
                ActionType::from_str_value(action_type.as_str()),
                Some(action_type)
            );
            let json = serde_json::to_value(action_type).unwrap();
            assert_eq!(json, json!(action_type.as_str()));
        }
        assert_eq!(ActionType::from_str_value("fax"), None);
    }

    #[tokio::test]
    async fn routes_to_registered_handler() {
        let handler = Arc::new(RecordingHandler::default());
        let dispatcher = RoutingDispatcher::new()
            .with_handler_for([ActionType::CreateTask, ActionType::SendEmail], handler.clone());

        let result = dispatcher
            .dispatch(ActionType::CreateTask, &json!({"title": "Call Dana"}))
            .await
            .unwrap();

        assert_eq!(result, json!({"handled": "create_task"}));
        let calls = handler.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].1["title"], "Call Dana");
    }

    #[tokio::test]
    async fn unregistered_type_is_unsupported() {
        let dispatcher = RoutingDispatcher::new();
        assert!(!dispatcher.supports(ActionType::Webhook));

        let err = dispatcher
            .dispatch(ActionType::Webhook, &json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Unsupported { .. }));
        assert!(!err.is_transient());
    }
}
