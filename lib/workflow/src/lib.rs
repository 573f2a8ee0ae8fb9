//! Workflow engine for leadflow.
//!
//! This crate turns stored workflow definitions into running executions:
//!
//! - **Definitions**: workflows, raw nodes and edges as authored in the editor
//! - **Graph**: validated petgraph view with branch-aware routing
//! - **Templates and conditions**: `{{...}}` resolution and branch evaluation
//! - **Executors**: per-node behaviour for triggers, conditions, delays, AI and actions
//! - **Engine**: claims, drives, suspends, resumes and cancels executions
//! - **Stores**: persistence traits with in-memory implementations

pub mod condition;
pub mod definition;
pub mod edge;
pub mod engine;
pub mod error;
pub mod execution;
pub mod executor;
pub mod graph;
pub mod node;
pub mod retry;
pub mod store;
pub mod template;
pub mod trigger;

pub use condition::Operator;
pub use definition::{NodeDefinition, Workflow, WorkflowStatus};
pub use edge::{BranchHandle, WorkflowEdge};
pub use engine::{EngineConfig, ExecutionEngine};
pub use error::{EngineError, GraphError, NodeError, StoreError};
pub use execution::{ExecutionStatus, WorkflowExecution};
pub use executor::{NodeExecutors, NodeOutcome, SideEffect};
pub use graph::WorkflowGraph;
pub use node::{NodeId, NodeKind, WorkflowNode};
pub use retry::RetryPolicy;
pub use store::{
    ClaimPurpose, Claimed, ExecutionStore, InMemoryExecutionStore, InMemoryWorkflowStore,
    WorkflowStore,
};
pub use template::TemplateContext;
pub use trigger::TriggerType;
