//! Step and chain executor traits and result types

use std::fmt::Debug;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

use super::context::ExecutionContext;
use super::entity::ChainConfiguration;
use super::error::ChainError;
use super::resolver::{value_to_string, VariableResolver};
use super::service::TargetService;
use super::step::{ChainStep, HttpMethod, RoutingAction};
use crate::domain::history::ExecutionId;
use crate::domain::pipeline::PipelineOutcome;

/// A step request with every template resolved
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResolvedRequest {
    pub service: TargetService,
    pub method: HttpMethod,
    pub endpoint: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub params: Vec<(String, String)>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub headers: Vec<(String, String)>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

impl ResolvedRequest {
    /// Resolve a step's endpoint, params, headers and body against a context
    pub fn build(step: &ChainStep, context: &ExecutionContext, resolver: &VariableResolver) -> Self {
        let params = resolve_pairs(&step.params, context, resolver)
            .into_iter()
            .filter(|(_, value)| !value.is_empty())
            .collect();

        Self {
            service: step.service,
            method: step.method,
            endpoint: resolver.resolve_str(&step.endpoint, context),
            params,
            headers: resolve_pairs(&step.headers, context, resolver),
            body: step.body.as_ref().map(|body| resolver.resolve(body, context)),
        }
    }
}

fn resolve_pairs(
    map: &Map<String, Value>,
    context: &ExecutionContext,
    resolver: &VariableResolver,
) -> Vec<(String, String)> {
    map.iter()
        .map(|(key, value)| {
            let resolved = resolver.resolve(value, context);
            (key.clone(), value_to_string(&resolved))
        })
        .collect()
}

/// Normalized outcome of one step call
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StepResult {
    pub success: bool,

    /// HTTP status, absent when the call never got a response
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,

    /// Parsed response body, `null` when there was none
    pub body: Value,

    pub duration_ms: u64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    pub request: ResolvedRequest,
}

impl StepResult {
    pub fn success(request: ResolvedRequest, status: u16, body: Value, duration_ms: u64) -> Self {
        Self {
            success: true,
            status: Some(status),
            body,
            duration_ms,
            error: None,
            request,
        }
    }

    pub fn failure(request: ResolvedRequest, error: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            success: false,
            status: None,
            body: Value::Null,
            duration_ms,
            error: Some(error.into()),
            request,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = body;
        self
    }
}

/// Issues the HTTP call for one step
///
/// Implementations resolve the step's templates against the context and
/// must always return a result: transport errors, timeouts and non-2xx
/// responses become `success: false`.
#[async_trait]
pub trait StepExecutor: Send + Sync + Debug {
    async fn execute(
        &self,
        step: &ChainStep,
        context: &ExecutionContext,
        cancel: &CancellationToken,
    ) -> StepResult;
}

/// Terminal state of a run
///
/// Runs are synchronous from invocation to result, so only the two end
/// states are ever observed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Completed,
    Failed,
}

/// Outcome of a step within a run
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Succeeded,
    Failed,
    Skipped,
}

/// Routing rule that fired after a step
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoutingTrace {
    pub action: RoutingAction,
    pub target: String,
    pub rule_index: usize,
}

/// Per-step record in a run trace
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StepTrace {
    pub step_id: String,
    pub step_name: String,

    /// Chain the step belongs to; differs from the run chain for sub-runs
    pub chain_id: String,

    pub service: TargetService,
    pub status: StepStatus,
    pub success: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub request: Option<ResolvedRequest>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_status: Option<u16>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    pub duration_ms: u64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub routing: Option<RoutingTrace>,
}

impl StepTrace {
    pub fn executed(chain_id: &str, step: &ChainStep, result: &StepResult) -> Self {
        Self {
            step_id: step.id.clone(),
            step_name: step.display_name().to_string(),
            chain_id: chain_id.to_string(),
            service: step.service,
            status: if result.success {
                StepStatus::Succeeded
            } else {
                StepStatus::Failed
            },
            success: result.success,
            request: Some(result.request.clone()),
            response: Some(result.body.clone()),
            http_status: result.status,
            error: result.error.clone(),
            duration_ms: result.duration_ms,
            routing: None,
        }
    }

    pub fn skipped(chain_id: &str, step: &ChainStep) -> Self {
        Self {
            step_id: step.id.clone(),
            step_name: step.display_name().to_string(),
            chain_id: chain_id.to_string(),
            service: step.service,
            status: StepStatus::Skipped,
            success: true,
            request: None,
            response: None,
            http_status: None,
            error: None,
            duration_ms: 0,
            routing: None,
        }
    }

    pub fn is_failure(&self) -> bool {
        self.status == StepStatus::Failed
    }
}

/// Error attached to a failed run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunError {
    pub kind: String,
    pub message: String,
}

impl From<&ChainError> for RunError {
    fn from(err: &ChainError) -> Self {
        Self {
            kind: err.kind().to_string(),
            message: err.to_string(),
        }
    }
}

/// Caller-supplied parameters of a run
#[derive(Debug, Clone, Default)]
pub struct ExecutionRequest {
    pub input: Value,
    pub env: Map<String, Value>,
    pub metadata: Map<String, Value>,
    pub cancel: CancellationToken,

    /// Saved chains record their id in history, ad-hoc chains do not
    pub saved_chain: bool,
}

impl ExecutionRequest {
    pub fn new(input: Value) -> Self {
        Self {
            input,
            saved_chain: true,
            ..Default::default()
        }
    }

    pub fn with_env(mut self, env: Map<String, Value>) -> Self {
        self.env = env;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn ad_hoc(mut self) -> Self {
        self.saved_chain = false;
        self
    }
}

/// Structured result of one chain run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChainRunResult {
    pub run_id: ExecutionId,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<String>,

    pub chain_name: String,
    pub success: bool,
    pub state: RunState,
    pub steps: Vec<StepTrace>,
    pub output: Value,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RunError>,

    pub jumps: usize,
    pub duration_ms: u64,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub pipeline: Option<PipelineOutcome>,

    /// Set when the history record could not be written
    #[serde(skip_serializing_if = "Option::is_none")]
    pub history_error: Option<String>,
}

/// Runs complete chains
#[async_trait]
pub trait ChainExecutor: Send + Sync + Debug {
    /// Execute a chain to a terminal state
    ///
    /// Returns `Err` only when the chain is rejected before any step runs.
    /// Failures during the run are reported in the returned result.
    async fn execute(
        &self,
        chain: &ChainConfiguration,
        request: ExecutionRequest,
    ) -> Result<ChainRunResult, ChainError>;
}
