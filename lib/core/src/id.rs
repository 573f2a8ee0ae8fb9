//! Typed identifiers.
//!
//! Each id wraps a ULID and renders as `<prefix>_<ulid>`, which is also the
//! form stored in the database and returned by the API.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ulid::Ulid;

/// An id string that is not a valid ULID for the expected kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseIdError {
    /// Name of the id type being parsed.
    pub id_type: &'static str,
    pub reason: String,
}

impl fmt::Display for ParseIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid {}: {}", self.id_type, self.reason)
    }
}

impl std::error::Error for ParseIdError {}

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Ulid);

        impl $name {
            /// Generates a fresh id.
            #[must_use]
            pub fn new() -> Self {
                Self(Ulid::new())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "_{}"), self.0)
            }
        }

        /// Accepts `<prefix>_<ulid>` or a bare ULID.
        impl FromStr for $name {
            type Err = ParseIdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let raw = s.strip_prefix(concat!($prefix, "_")).unwrap_or(s);
                Ulid::from_str(raw).map(Self).map_err(|e| ParseIdError {
                    id_type: stringify!($name),
                    reason: e.to_string(),
                })
            }
        }
    };
}

define_id!(
    /// A CRM workspace.
    TenantId,
    "tnt"
);

define_id!(
    /// A workflow definition.
    WorkflowId,
    "wf"
);

define_id!(
    /// One run of a workflow.
    ExecutionId,
    "exec"
);

define_id!(
    /// One successful claim on an execution.
    ///
    /// Every claim gets a fresh id. Writes made under a claim carry it, so a
    /// worker whose lease was taken over can no longer write.
    ClaimId,
    "clm"
);
