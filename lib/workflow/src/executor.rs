//! Node executors.
//!
//! Each node kind maps to one executor. Executors see the execution as
//! read-only and report what happened through [`NodeOutcome`]; persisting,
//! routing and retrying are the engine's job.

use crate::condition;
use crate::edge::BranchHandle;
use crate::error::NodeError;
use crate::execution::WorkflowExecution;
use crate::node::{ActionNode, AiProcessorNode, DelayNode, NodeId, NodeKind, WorkflowNode};
use crate::template::{TemplateContext, has_placeholder};
use chrono::{DateTime, Utc};
use leadflow_ai::{AiInvoker, AiRequest};
use leadflow_integration::ActionDispatcher;
use serde_json::{Map, Value as JsonValue, json};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, instrument};

/// How a node interacts with the outside world.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SideEffect {
    /// Computes from execution state only; safe to re-run.
    Pure,
    /// Parks the run until a later time.
    Suspending,
    /// Calls a collaborator; run at most once per execution.
    ExternalCall,
}

impl NodeKind {
    /// Returns the side-effect class of this node kind.
    #[must_use]
    pub fn side_effect(&self) -> SideEffect {
        match self {
            Self::Trigger(_) | Self::Condition(_) => SideEffect::Pure,
            Self::Delay(_) => SideEffect::Suspending,
            Self::AiProcessor(_) | Self::Action(_) => SideEffect::ExternalCall,
        }
    }
}

/// What the engine should do after a node ran.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeOutcome {
    /// Record `output` and follow the edge for `handle`.
    Continue {
        output: JsonValue,
        handle: Option<BranchHandle>,
    },
    /// Record `output` and park the run until `resume_at`.
    Suspend {
        output: JsonValue,
        resume_at: DateTime<Utc>,
    },
    /// Record `output` and wait for a human to approve.
    AwaitApproval { output: JsonValue },
}

impl NodeOutcome {
    fn pass(output: JsonValue) -> Self {
        Self::Continue {
            output,
            handle: None,
        }
    }
}

/// Runs nodes against their collaborators.
#[derive(Clone)]
pub struct NodeExecutors {
    ai: Arc<dyn AiInvoker>,
    actions: Arc<dyn ActionDispatcher>,
    default_model: String,
}

impl fmt::Debug for NodeExecutors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeExecutors")
            .field("default_model", &self.default_model)
            .finish_non_exhaustive()
    }
}

impl NodeExecutors {
    /// Creates executors backed by the given collaborators.
    #[must_use]
    pub fn new(
        ai: Arc<dyn AiInvoker>,
        actions: Arc<dyn ActionDispatcher>,
        default_model: impl Into<String>,
    ) -> Self {
        Self {
            ai,
            actions,
            default_model: default_model.into(),
        }
    }

    /// Runs one node.
    ///
    /// # Errors
    ///
    /// Returns a classified [`NodeError`] when a collaborator fails or the
    /// node's resolved input cannot be executed.
    #[instrument(skip(self, node, execution), fields(node_id = %node.id, node_type = node.kind.type_name()))]
    pub async fn execute(
        &self,
        node: &WorkflowNode,
        execution: &WorkflowExecution,
        now: DateTime<Utc>,
    ) -> Result<NodeOutcome, NodeError> {
        let ctx = TemplateContext::new(&execution.trigger_data, &execution.node_outputs);
        match &node.kind {
            NodeKind::Trigger(_) => Ok(NodeOutcome::pass(execution.trigger_data.clone())),
            NodeKind::Condition(condition) => {
                let result = condition::evaluate_node(condition, &ctx);
                debug!(result, "condition evaluated");
                Ok(NodeOutcome::Continue {
                    output: JsonValue::Bool(result),
                    handle: Some(BranchHandle::from_bool(result)),
                })
            }
            NodeKind::Delay(delay) => execute_delay(delay, now),
            NodeKind::AiProcessor(ai) => {
                let previous = previous_node(execution, &node.id);
                self.execute_ai(ai, &ctx, previous).await
            }
            NodeKind::Action(action) => self.execute_action(action, &ctx).await,
        }
    }

    async fn execute_ai(
        &self,
        node: &AiProcessorNode,
        ctx: &TemplateContext<'_>,
        previous: Option<&NodeId>,
    ) -> Result<NodeOutcome, NodeError> {
        let instruction = ctx.resolve(&node.instruction);
        if instruction.trim().is_empty() {
            return Err(NodeError::InvalidInput {
                reason: "instruction resolved to an empty string".to_string(),
            });
        }

        let model = node
            .model
            .as_deref()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or(&self.default_model);
        let request = AiRequest::new(instruction, model)
            .with_context(resolve_context(node.context_source.as_deref(), ctx, previous));

        let text = self.ai.invoke(&request).await?;
        let mut output = Map::new();
        output.insert(node.output_variable.clone(), JsonValue::String(text));
        Ok(NodeOutcome::pass(JsonValue::Object(output)))
    }

    async fn execute_action(
        &self,
        node: &ActionNode,
        ctx: &TemplateContext<'_>,
    ) -> Result<NodeOutcome, NodeError> {
        let config = ctx.resolve_value(&node.action_config);
        let output = self.actions.dispatch(node.action_type, &config).await?;

        if node.requires_approval {
            Ok(NodeOutcome::AwaitApproval { output })
        } else {
            Ok(NodeOutcome::pass(output))
        }
    }
}

fn execute_delay(delay: &DelayNode, now: DateTime<Utc>) -> Result<NodeOutcome, NodeError> {
    let resume_at = delay
        .duration()
        .and_then(|d| now.checked_add_signed(d))
        .ok_or_else(|| NodeError::InvalidInput {
            reason: format!("delay of {} {:?} is out of range", delay.amount, delay.unit),
        })?;
    Ok(NodeOutcome::Suspend {
        output: json!({ "resume_at": resume_at.to_rfc3339() }),
        resume_at,
    })
}

/// The node visited before `current` on this run's path.
fn previous_node<'e>(execution: &'e WorkflowExecution, current: &NodeId) -> Option<&'e NodeId> {
    execution.execution_path.iter().rev().find(|id| *id != current)
}

/// Resolves an AI node's `contextSource` to the data it should see.
///
/// `previous` (or no source) is the output of the node visited just before;
/// `trigger` is the trigger payload; `all` bundles the trigger payload with
/// every node output. Anything else is a template, a node id or a dotted
/// path.
fn resolve_context(
    source: Option<&str>,
    ctx: &TemplateContext<'_>,
    previous: Option<&NodeId>,
) -> JsonValue {
    let source = source.map(str::trim).filter(|s| !s.is_empty());
    match source {
        None | Some("previous") => previous
            .and_then(|id| ctx.node_outputs.get(id))
            .unwrap_or(ctx.trigger_data)
            .clone(),
        Some("trigger") => ctx.trigger_data.clone(),
        Some("all") => json!({
            "trigger": ctx.trigger_data,
            "nodes": ctx.node_outputs,
        }),
        Some(template) if has_placeholder(template) => JsonValue::String(ctx.resolve(template)),
        Some(path) => ctx
            .node_outputs
            .get(path)
            .or_else(|| ctx.lookup_field(path))
            .cloned()
            .unwrap_or(JsonValue::Null),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::Operator;
    use crate::node::{ConditionNode, DelayUnit, TriggerNode};
    use async_trait::async_trait;
    use chrono::TimeZone;
    use leadflow_ai::AiError;
    use leadflow_core::{TenantId, WorkflowId};
    use leadflow_integration::{ActionType, DispatchError};
    use std::sync::Mutex;

    #[derive(Default)]
    struct EchoAi {
        requests: Mutex<Vec<AiRequest>>,
    }

    #[async_trait]
    impl AiInvoker for EchoAi {
        async fn invoke(&self, request: &AiRequest) -> Result<String, AiError> {
            self.requests.lock().unwrap().push(request.clone());
            Ok(format!("echo: {}", request.instruction))
        }
    }

    #[derive(Default)]
    struct RecordingDispatcher {
        calls: Mutex<Vec<(ActionType, JsonValue)>>,
    }

    #[async_trait]
    impl ActionDispatcher for RecordingDispatcher {
        async fn dispatch(
            &self,
            action_type: ActionType,
            config: &JsonValue,
        ) -> Result<JsonValue, DispatchError> {
            self.calls
                .lock()
                .unwrap()
                .push((action_type, config.clone()));
            Ok(json!({"id": "rec_1"}))
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap()
    }

    fn execution(path: &[&str], outputs: &[(&str, JsonValue)]) -> WorkflowExecution {
        let mut exec = WorkflowExecution::new(
            WorkflowId::new(),
            TenantId::new(),
            json!({"lead": {"name": "Dana", "email": "dana@example.com"}}),
            now(),
        );
        exec.execution_path = path.iter().map(|id| NodeId::from(*id)).collect();
        for (id, value) in outputs {
            exec.node_outputs.insert(NodeId::from(*id), value.clone());
        }
        exec
    }

    fn executors() -> (NodeExecutors, Arc<EchoAi>, Arc<RecordingDispatcher>) {
        let ai = Arc::new(EchoAi::default());
        let actions = Arc::new(RecordingDispatcher::default());
        (
            NodeExecutors::new(ai.clone(), actions.clone(), "gpt-4o-mini"),
            ai,
            actions,
        )
    }

    fn node(id: &str, kind: NodeKind) -> WorkflowNode {
        WorkflowNode {
            id: NodeId::from(id),
            kind,
        }
    }

    #[test]
    fn side_effect_classes() {
        assert_eq!(
            NodeKind::Trigger(TriggerNode::default()).side_effect(),
            SideEffect::Pure
        );
        assert_eq!(
            NodeKind::Delay(DelayNode {
                amount: 1,
                unit: DelayUnit::Days
            })
            .side_effect(),
            SideEffect::Suspending
        );
    }

    #[tokio::test]
    async fn trigger_outputs_trigger_data() {
        let (executors, _, _) = executors();
        let exec = execution(&["t"], &[]);
        let outcome = executors
            .execute(&node("t", NodeKind::Trigger(TriggerNode::default())), &exec, now())
            .await
            .unwrap();
        assert_eq!(outcome, NodeOutcome::pass(exec.trigger_data.clone()));
    }

    #[tokio::test]
    async fn condition_sets_handle() {
        let (executors, _, _) = executors();
        let exec = execution(&["t", "c"], &[]);
        let condition = NodeKind::Condition(ConditionNode {
            field: "lead.name".to_string(),
            operator: Operator::Equals,
            value: json!("Dana"),
        });
        let outcome = executors
            .execute(&node("c", condition), &exec, now())
            .await
            .unwrap();
        assert_eq!(
            outcome,
            NodeOutcome::Continue {
                output: json!(true),
                handle: Some(BranchHandle::Yes)
            }
        );
    }

    #[tokio::test]
    async fn delay_is_deterministic_from_clock() {
        let (executors, _, _) = executors();
        let exec = execution(&["t", "d"], &[]);
        let delay = NodeKind::Delay(DelayNode {
            amount: 2,
            unit: DelayUnit::Hours,
        });
        let outcome = executors
            .execute(&node("d", delay), &exec, now())
            .await
            .unwrap();
        let expected = now() + chrono::TimeDelta::seconds(7200);
        assert_eq!(
            outcome,
            NodeOutcome::Suspend {
                output: json!({"resume_at": expected.to_rfc3339()}),
                resume_at: expected,
            }
        );
    }

    #[tokio::test]
    async fn ai_resolves_instruction_and_stores_under_output_variable() {
        let (executors, ai, _) = executors();
        let exec = execution(&["t", "score", "ai"], &[("score", json!({"score": 91}))]);
        let kind = NodeKind::AiProcessor(AiProcessorNode {
            instruction: "Write to {{trigger.lead.name}}".to_string(),
            context_source: None,
            output_variable: "draft".to_string(),
            model: None,
        });

        let outcome = executors.execute(&node("ai", kind), &exec, now()).await.unwrap();

        assert_eq!(outcome, NodeOutcome::pass(json!({"draft": "echo: Write to Dana"})));
        let requests = ai.requests.lock().unwrap();
        assert_eq!(requests[0].model, "gpt-4o-mini");
        // Default context is the previous node's output.
        assert_eq!(requests[0].context, json!({"score": 91}));
    }

    #[tokio::test]
    async fn ai_rejects_empty_instruction() {
        let (executors, ai, _) = executors();
        let exec = execution(&["t", "ai"], &[]);
        let kind = NodeKind::AiProcessor(AiProcessorNode {
            instruction: "{{trigger.missing}}".to_string(),
            context_source: None,
            output_variable: "result".to_string(),
            model: Some("gpt-4o".to_string()),
        });
        let err = executors
            .execute(&node("ai", kind), &exec, now())
            .await
            .unwrap_err();
        assert!(!err.is_transient());
        assert!(ai.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn action_resolves_config_and_honours_approval() {
        let (executors, _, actions) = executors();
        let exec = execution(&["t", "send"], &[]);
        let kind = NodeKind::Action(ActionNode {
            action_type: ActionType::SendEmail,
            action_config: json!({"to": "{{trigger.lead.email}}", "subject": "Welcome"}),
            requires_approval: true,
        });

        let outcome = executors.execute(&node("send", kind), &exec, now()).await.unwrap();

        assert_eq!(
            outcome,
            NodeOutcome::AwaitApproval {
                output: json!({"id": "rec_1"})
            }
        );
        let calls = actions.calls.lock().unwrap();
        assert_eq!(calls[0].0, ActionType::SendEmail);
        assert_eq!(calls[0].1["to"], "dana@example.com");
    }

    #[test]
    fn context_sources() {
        let exec = execution(
            &["t", "enrich", "ai"],
            &[("t", json!({"lead": {}})), ("enrich", json!({"industry": "saas"}))],
        );
        let ctx = TemplateContext::new(&exec.trigger_data, &exec.node_outputs);
        let previous = previous_node(&exec, &NodeId::from("ai"));
        assert_eq!(previous, Some(&NodeId::from("enrich")));

        assert_eq!(resolve_context(None, &ctx, previous), json!({"industry": "saas"}));
        assert_eq!(
            resolve_context(Some("previous"), &ctx, previous),
            json!({"industry": "saas"})
        );
        assert_eq!(resolve_context(Some("trigger"), &ctx, previous), exec.trigger_data);
        assert_eq!(
            resolve_context(Some("all"), &ctx, previous)["nodes"]["enrich"],
            json!({"industry": "saas"})
        );
        assert_eq!(
            resolve_context(Some("enrich"), &ctx, previous),
            json!({"industry": "saas"})
        );
        assert_eq!(
            resolve_context(Some("enrich.industry"), &ctx, previous),
            json!("saas")
        );
        assert_eq!(
            resolve_context(Some("lead.email"), &ctx, previous),
            json!("dana@example.com")
        );
        assert_eq!(
            resolve_context(Some("{{trigger.lead.name}}"), &ctx, previous),
            json!("Dana")
        );
        assert_eq!(resolve_context(Some("nothing.here"), &ctx, previous), JsonValue::Null);
    }

    #[test]
    fn previous_defaults_to_trigger_data() {
        let exec = execution(&["ai"], &[]);
        let ctx = TemplateContext::new(&exec.trigger_data, &exec.node_outputs);
        assert_eq!(resolve_context(None, &ctx, None), exec.trigger_data);
    }
}
