//! CRM side effects.
//!
//! CRM actions are not performed inline. Each dispatch is recorded in the
//! `crm_action_outbox` table and the created record id is returned as the
//! node's output; the CRM sync service drains the outbox.

use async_trait::async_trait;
use leadflow_integration::{ActionHandler, ActionType, DispatchError};
use serde_json::{Value as JsonValue, json};
use sqlx::PgPool;
use tracing::{debug, instrument};
use ulid::Ulid;

/// Action types recorded in the CRM outbox.
pub const CRM_ACTIONS: [ActionType; 6] = [
    ActionType::DraftEmail,
    ActionType::SendEmail,
    ActionType::UpdateField,
    ActionType::CreateTask,
    ActionType::CreateDeal,
    ActionType::SendNotification,
];

/// Records CRM actions in the outbox table.
#[derive(Debug, Clone)]
pub struct CrmOutboxHandler {
    pool: PgPool,
}

impl CrmOutboxHandler {
    /// Creates a new handler.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ActionHandler for CrmOutboxHandler {
    #[instrument(skip(self, config))]
    async fn handle(
        &self,
        action_type: ActionType,
        config: &JsonValue,
    ) -> Result<JsonValue, DispatchError> {
        validate_config(action_type, config)?;
        let record_id = format!("crm_{}", Ulid::new());

        sqlx::query(
            r#"
            INSERT INTO crm_action_outbox (id, action_type, payload)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(&record_id)
        .bind(action_type.as_str())
        .bind(config)
        .execute(&self.pool)
        .await
        .map_err(|e| outbox_error(action_type, e))?;

        debug!(%record_id, "crm action queued");
        Ok(json!({
            "record_id": record_id,
            "action_type": action_type.as_str(),
            "status": "queued",
        }))
    }
}

fn validate_config(action_type: ActionType, config: &JsonValue) -> Result<(), DispatchError> {
    if config.is_object() {
        Ok(())
    } else {
        Err(DispatchError::InvalidConfig {
            action_type: action_type.as_str().to_string(),
            reason: "action config must be a JSON object".to_string(),
        })
    }
}

fn outbox_error(action_type: ActionType, error: sqlx::Error) -> DispatchError {
    match error {
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
            DispatchError::ConnectionFailed {
                reason: error.to_string(),
            }
        }
        other => DispatchError::InvalidConfig {
            action_type: action_type.as_str().to_string(),
            reason: other.to_string(),
        },
    }
}
