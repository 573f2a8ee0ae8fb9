//! Workflow node types.
//!
//! Editor nodes arrive as `{id, type, data}` with a loosely typed `data`
//! payload. [`WorkflowNode::try_from`] turns them into a tagged union so the
//! executors never see a malformed payload.

use crate::condition::Operator;
use crate::definition::NodeDefinition;
use crate::error::GraphError;
use chrono::TimeDelta;
use leadflow_integration::ActionType;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::borrow::Borrow;
use std::fmt;

/// A node identifier, unique within its workflow.
///
/// Editor-assigned, so any non-empty string is accepted.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for NodeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Borrow<str> for NodeId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Entry point payload.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerNode {
    #[serde(default)]
    pub label: Option<String>,
}

/// Branching payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionNode {
    /// Bare path (`lead.score`) or template (`{{trigger.lead.score}}`).
    pub field: String,
    pub operator: Operator,
    /// String, number or boolean literal; strings may hold placeholders.
    #[serde(default)]
    pub value: JsonValue,
}

/// Unit of a delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DelayUnit {
    Seconds,
    Minutes,
    Hours,
    Days,
    Weeks,
}

impl DelayUnit {
    fn seconds(self) -> i64 {
        match self {
            Self::Seconds => 1,
            Self::Minutes => 60,
            Self::Hours => 60 * 60,
            Self::Days => 24 * 60 * 60,
            Self::Weeks => 7 * 24 * 60 * 60,
        }
    }
}

/// Suspension payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DelayNode {
    #[serde(deserialize_with = "number_or_numeric_string")]
    pub amount: u64,
    pub unit: DelayUnit,
}

impl DelayNode {
    /// Returns `amount * unit`, or `None` if it does not fit in a [`TimeDelta`].
    #[must_use]
    pub fn duration(&self) -> Option<TimeDelta> {
        let amount = i64::try_from(self.amount).ok()?;
        amount
            .checked_mul(self.unit.seconds())
            .and_then(TimeDelta::try_seconds)
    }
}

fn number_or_numeric_string<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Amount {
        Number(u64),
        Text(String),
    }

    match Amount::deserialize(deserializer)? {
        Amount::Number(n) => Ok(n),
        Amount::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

fn default_output_variable() -> String {
    "result".to_string()
}

/// AI step payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiProcessorNode {
    /// Instruction template.
    pub instruction: String,
    /// `trigger`, `all`, `previous`, a node id, or a dotted path.
    #[serde(default)]
    pub context_source: Option<String>,
    /// Key the generated text is stored under.
    #[serde(default = "default_output_variable")]
    pub output_variable: String,
    /// Model override.
    #[serde(default)]
    pub model: Option<String>,
}

/// Side-effect payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionNode {
    pub action_type: ActionType,
    /// Templated configuration handed to the dispatcher after resolution.
    #[serde(default = "empty_object")]
    pub action_config: JsonValue,
    #[serde(default)]
    pub requires_approval: bool,
}

fn empty_object() -> JsonValue {
    JsonValue::Object(Map::new())
}

/// The kind of a node and its payload.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Trigger(TriggerNode),
    Condition(ConditionNode),
    Delay(DelayNode),
    AiProcessor(AiProcessorNode),
    Action(ActionNode),
}

impl NodeKind {
    /// Returns the editor type name.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Trigger(_) => "trigger",
            Self::Condition(_) => "condition",
            Self::Delay(_) => "delay",
            Self::AiProcessor(_) => "ai_processor",
            Self::Action(_) => "action",
        }
    }
}

/// A parsed workflow node.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowNode {
    pub id: NodeId,
    pub kind: NodeKind,
}

impl WorkflowNode {
    /// Returns whether this node is the trigger.
    #[must_use]
    pub fn is_trigger(&self) -> bool {
        matches!(self.kind, NodeKind::Trigger(_))
    }
}

impl TryFrom<&NodeDefinition> for WorkflowNode {
    type Error = GraphError;

    fn try_from(def: &NodeDefinition) -> Result<Self, Self::Error> {
        let id = NodeId::from(def.id.as_str());
        let data = if def.data.is_null() {
            empty_object()
        } else {
            def.data.clone()
        };

        let invalid = |e: serde_json::Error| GraphError::InvalidNodeData {
            node_id: id.clone(),
            reason: e.to_string(),
        };

        let kind = match def.node_type.as_str() {
            "trigger" => NodeKind::Trigger(serde_json::from_value(data).map_err(invalid)?),
            "condition" => NodeKind::Condition(serde_json::from_value(data).map_err(invalid)?),
            "delay" => NodeKind::Delay(serde_json::from_value(data).map_err(invalid)?),
            "ai_processor" => {
                NodeKind::AiProcessor(serde_json::from_value(data).map_err(invalid)?)
            }
            "action" => NodeKind::Action(serde_json::from_value(data).map_err(invalid)?),
            other => {
                return Err(GraphError::UnknownNodeType {
                    node_id: id,
                    node_type: other.to_string(),
                });
            }
        };

        Ok(Self { id, kind })
    }
}
