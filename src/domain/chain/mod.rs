//! Chain domain - configuration, templating, conditions and execution contracts

mod condition;
mod context;
mod entity;
mod error;
mod executor;
mod merge;
pub mod path;
mod resolver;
mod service;
mod step;
mod validation;

pub use condition::{ConditionEvaluator, ConditionOperator, StepCondition, INPUT_SOURCE};
pub use context::ExecutionContext;
pub use entity::{validate_chain_id, ChainConfiguration, ChainId, PipelineTrigger, MAX_ID_LENGTH};
pub use error::ChainError;
pub use executor::{
    ChainExecutor, ChainRunResult, ExecutionRequest, ResolvedRequest, RoutingTrace, RunError,
    RunState, StepExecutor, StepResult, StepStatus, StepTrace,
};
pub use merge::{deep_merge, merged};
pub use resolver::{value_to_string, Namespace, VariableRef, VariableResolver};
pub use service::{EndpointInfo, ModuleInfo, TargetService};
pub use step::{ChainStep, HttpMethod, OnStepFailure, RoutingAction, RoutingRule};
pub use validation::{parallel_groups, validate_chain};
