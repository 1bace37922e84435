//! Chain service - CRUD, execution and history retrieval for chains

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::domain::chain::{
    validate_chain, ChainConfiguration, ChainExecutor, ChainId, ChainRunResult, ChainStep,
    ExecutionContext, ExecutionRequest, PipelineTrigger, VariableResolver,
};
use crate::domain::{
    ChainStore, DomainError, ExecutionHistory, ExecutionId, PipelineOutcome, PipelineRunner,
};
use crate::infrastructure::http::ServiceRegistry;

/// Default number of history records returned by a listing
pub const DEFAULT_HISTORY_LIMIT: usize = 50;

/// Upper bound on a history listing
pub const MAX_HISTORY_LIMIT: usize = 500;

/// Request to create a new chain
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateChainRequest {
    /// Generated when absent
    #[serde(default)]
    pub id: Option<String>,

    #[serde(alias = "user_id", alias = "owner")]
    pub user_id: String,

    pub name: String,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub steps: Vec<ChainStep>,

    #[serde(default, alias = "output_template")]
    pub output_template: Option<Value>,

    #[serde(default)]
    pub pipeline: Option<PipelineTrigger>,
}

impl CreateChainRequest {
    pub fn new(user_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: None,
            user_id: user_id.into(),
            name: name.into(),
            description: None,
            steps: Vec::new(),
            output_template: None,
            pipeline: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_step(mut self, step: ChainStep) -> Self {
        self.steps.push(step);
        self
    }

    pub fn with_output_template(mut self, template: Value) -> Self {
        self.output_template = Some(template);
        self
    }

    pub fn with_pipeline(mut self, pipeline: PipelineTrigger) -> Self {
        self.pipeline = Some(pipeline);
        self
    }
}

/// Request to run a saved chain
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExecuteChainRequest {
    #[serde(default)]
    pub input: Value,

    #[serde(default)]
    pub env: Map<String, Value>,
}

/// Request to run an unsaved chain
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdHocExecuteRequest {
    pub name: String,

    #[serde(alias = "userId", alias = "user_id")]
    pub owner: String,

    pub steps: Vec<ChainStep>,

    #[serde(default)]
    pub input: Value,

    #[serde(default)]
    pub env: Map<String, Value>,

    #[serde(default, alias = "output_template")]
    pub output_template: Option<Value>,
}

/// Chain service
pub struct ChainService {
    store: Arc<dyn ChainStore>,
    executor: Arc<dyn ChainExecutor>,
    registry: Arc<ServiceRegistry>,
    pipeline: Option<Arc<dyn PipelineRunner>>,
}

impl std::fmt::Debug for ChainService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainService")
            .field("registry", &self.registry)
            .field("pipeline", &self.pipeline.is_some())
            .finish()
    }
}

impl ChainService {
    pub fn new(
        store: Arc<dyn ChainStore>,
        executor: Arc<dyn ChainExecutor>,
        registry: Arc<ServiceRegistry>,
    ) -> Self {
        Self {
            store,
            executor,
            registry,
            pipeline: None,
        }
    }

    pub fn with_pipeline_runner(mut self, runner: Arc<dyn PipelineRunner>) -> Self {
        self.pipeline = Some(runner);
        self
    }

    fn parse_id(id: &str) -> Result<ChainId, DomainError> {
        ChainId::new(id).map_err(|e| DomainError::invalid_id(e.to_string()))
    }

    fn check(&self, chain: &ChainConfiguration) -> Result<(), DomainError> {
        validate_chain(chain)?;
        self.registry.ensure_configured(chain)?;
        Ok(())
    }

    async fn load(&self, id: &str, user_id: &str) -> Result<ChainConfiguration, DomainError> {
        self.get(id, user_id)
            .await?
            .ok_or_else(|| DomainError::not_found(format!("Chain '{}' not found", id)))
    }

    /// Get a chain owned by `user_id`
    pub async fn get(&self, id: &str, user_id: &str) -> Result<Option<ChainConfiguration>, DomainError> {
        let chain_id = Self::parse_id(id)?;
        self.store.get_chain(&chain_id, user_id).await
    }

    /// List chains owned by `user_id`
    pub async fn list(&self, user_id: &str) -> Result<Vec<ChainConfiguration>, DomainError> {
        self.store.list_chains(user_id).await
    }

    /// Create a new chain
    pub async fn create(&self, request: CreateChainRequest) -> Result<ChainConfiguration, DomainError> {
        let chain_id = match &request.id {
            Some(id) => Self::parse_id(id)?,
            None => ChainId::generate(),
        };

        let mut chain = ChainConfiguration::new(chain_id, request.user_id, request.name)
            .with_steps(request.steps);

        if let Some(description) = request.description {
            chain = chain.with_description(description);
        }
        if let Some(template) = request.output_template {
            chain = chain.with_output_template(template);
        }
        if let Some(pipeline) = request.pipeline {
            chain = chain.with_pipeline(pipeline);
        }

        self.check(&chain)?;

        let created = self.store.create_chain(chain).await?;
        info!(chain_id = %created.id(), user_id = %created.user_id(), "Created chain");

        Ok(created)
    }

    /// Apply a partial update to a chain owned by `user_id`
    pub async fn update(&self, id: &str, user_id: &str, patch: Value) -> Result<ChainConfiguration, DomainError> {
        let existing = self.load(id, user_id).await?;
        let updated = existing.patched(patch)?;

        self.check(&updated)?;

        let saved = self.store.update_chain(updated).await?;
        info!(chain_id = %saved.id(), "Updated chain");

        Ok(saved)
    }

    /// Delete a chain owned by `user_id`
    pub async fn delete(&self, id: &str, user_id: &str) -> Result<bool, DomainError> {
        let chain_id = Self::parse_id(id)?;
        let deleted = self.store.delete_chain(&chain_id, user_id).await?;

        if deleted {
            info!(chain_id = %chain_id, "Deleted chain");
        }

        Ok(deleted)
    }

    /// Run a saved chain
    pub async fn execute(
        &self,
        id: &str,
        user_id: &str,
        request: ExecuteChainRequest,
    ) -> Result<ChainRunResult, DomainError> {
        let chain = self.load(id, user_id).await?;
        self.registry.ensure_configured(&chain)?;

        let execution = ExecutionRequest::new(request.input)
            .with_env(request.env)
            .with_metadata("userId", Value::String(user_id.to_string()));

        self.run(&chain, execution).await
    }

    /// Run an unsaved chain
    pub async fn execute_ad_hoc(&self, request: AdHocExecuteRequest) -> Result<ChainRunResult, DomainError> {
        let mut chain = ChainConfiguration::new(ChainId::generate(), request.owner, request.name)
            .with_steps(request.steps);

        if let Some(template) = request.output_template {
            chain = chain.with_output_template(template);
        }

        self.registry.ensure_configured(&chain)?;

        let execution = ExecutionRequest::new(request.input)
            .with_env(request.env)
            .ad_hoc();

        self.run(&chain, execution).await
    }

    async fn run(
        &self,
        chain: &ChainConfiguration,
        request: ExecutionRequest,
    ) -> Result<ChainRunResult, DomainError> {
        let input = request.input.clone();
        let mut result = self.executor.execute(chain, request).await?;

        if result.success {
            result.pipeline = self.trigger_pipeline(chain, input, &result).await;
        }

        Ok(result)
    }

    /// Hand a successful run to the configured pipeline, if any
    ///
    /// The template sees the run input, run metadata, each executed step's
    /// latest response and the final output as `{{output...}}`.
    async fn trigger_pipeline(
        &self,
        chain: &ChainConfiguration,
        input: Value,
        result: &ChainRunResult,
    ) -> Option<PipelineOutcome> {
        let trigger = chain.pipeline()?;

        let Some(runner) = &self.pipeline else {
            debug!(chain_id = %chain.id(), pipeline = %trigger.name, "No pipeline runner configured");
            return None;
        };

        let mut metadata = Map::new();
        metadata.insert("userId".into(), Value::String(chain.user_id().to_string()));
        metadata.insert("chainId".into(), Value::String(chain.id().to_string()));
        metadata.insert("runId".into(), Value::String(result.run_id.to_string()));

        let mut context = ExecutionContext::new(input).with_metadata(metadata);
        for trace in &result.steps {
            if let Some(response) = &trace.response {
                context.record_step_result(trace.step_id.clone(), response.clone());
            }
        }
        context.record_step_result("output", result.output.clone());

        let pipeline_input = VariableResolver::new().resolve(&trigger.input_template, &context);

        Some(runner.run_pipeline(&trigger.name, pipeline_input).await)
    }

    /// Get one of a user's execution records
    pub async fn get_execution(
        &self,
        id: &str,
        user_id: &str,
    ) -> Result<Option<ExecutionHistory>, DomainError> {
        let execution_id: ExecutionId = id.parse()?;
        let history = self.store.get_history(&execution_id).await?;

        Ok(history.filter(|h| h.user_id == user_id))
    }

    /// List a user's execution records, newest first
    pub async fn list_executions(
        &self,
        user_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<ExecutionHistory>, DomainError> {
        let limit = limit
            .unwrap_or(DEFAULT_HISTORY_LIMIT)
            .clamp(1, MAX_HISTORY_LIMIT);

        self.store.list_history(user_id, limit).await
    }
}
