//! Chain execution engine
//!
//! Walks a chain's step list group by group. Consecutive parallel steps are
//! dispatched together and joined before anything else happens; the join
//! point is where results are recorded, routing rules evaluated and failure
//! policy applied.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use futures::future::{join_all, BoxFuture};
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::EngineSettings;
use crate::domain::chain::{
    parallel_groups, validate_chain, ChainConfiguration, ChainError, ChainExecutor, ChainId,
    ChainRunResult, ChainStep, ConditionEvaluator, ExecutionContext, ExecutionRequest,
    OnStepFailure, RoutingAction, RoutingRule, RoutingTrace, RunError, RunState, StepExecutor,
    StepResult, StepTrace, VariableResolver,
};
use crate::domain::{ChainStore, ExecutionHistory, ExecutionId};
use crate::infrastructure::observability::{record_chain_run, record_routing_jump, record_step_call};

/// Metadata key holding the output of the last `jump_to_chain` sub-run
const SUBCHAIN_KEY: &str = "subchain";

/// Configuration for the chain engine
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Routing jumps allowed per run, across sub-runs
    pub max_jumps: usize,

    /// Nesting limit for `jump_to_chain`
    pub max_chain_depth: usize,

    /// Cancel the whole run after this budget
    pub run_timeout: Option<Duration>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_jumps: 50,
            max_chain_depth: 8,
            run_timeout: None,
        }
    }
}

impl From<&EngineSettings> for EngineConfig {
    fn from(settings: &EngineSettings) -> Self {
        Self {
            max_jumps: settings.max_jumps,
            max_chain_depth: settings.max_chain_depth,
            run_timeout: settings.run_timeout_ms.map(Duration::from_millis),
        }
    }
}

/// State shared by a run and all of its sub-runs
#[derive(Debug, Default)]
struct RunProgress {
    jumps: usize,
    trace: Vec<StepTrace>,
}

/// How one chain (or sub-chain) ended
#[derive(Debug)]
struct ChainOutcome {
    output: Value,
    error: Option<ChainError>,
}

impl ChainOutcome {
    fn failed(context: &ExecutionContext, error: ChainError) -> Self {
        Self {
            output: context.results_snapshot(),
            error: Some(error),
        }
    }
}

/// A routing rule that fired after a group joined
struct FiredRule<'a> {
    step: &'a ChainStep,
    rule: &'a RoutingRule,
}

/// Executes chains against a step executor and a chain store
#[derive(Debug)]
pub struct ChainEngine {
    step_executor: Arc<dyn StepExecutor>,
    store: Arc<dyn ChainStore>,
    resolver: VariableResolver,
    evaluator: ConditionEvaluator,
    config: EngineConfig,
}

impl ChainEngine {
    pub fn new(step_executor: Arc<dyn StepExecutor>, store: Arc<dyn ChainStore>) -> Self {
        Self::with_config(step_executor, store, EngineConfig::default())
    }

    pub fn with_config(
        step_executor: Arc<dyn StepExecutor>,
        store: Arc<dyn ChainStore>,
        config: EngineConfig,
    ) -> Self {
        Self {
            step_executor,
            store,
            resolver: VariableResolver::new(),
            evaluator: ConditionEvaluator::new(),
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Check that every `jump_to_chain` target exists in the owner's scope
    async fn check_chain_targets(&self, chain: &ChainConfiguration) -> Result<(), ChainError> {
        let targets: BTreeSet<&str> = chain
            .steps()
            .iter()
            .flat_map(|step| &step.conditional_routing)
            .filter(|rule| rule.action == RoutingAction::JumpToChain)
            .map(|rule| rule.target.as_str())
            .collect();

        for target in targets {
            let id = ChainId::new(target)?;
            let found = self
                .store
                .get_chain(&id, chain.user_id())
                .await
                .map_err(|e| ChainError::persistence(e.to_string()))?;

            if found.is_none() {
                return Err(ChainError::validation(format!(
                    "Unknown jump_to_chain target '{}'",
                    target
                )));
            }
        }

        Ok(())
    }

    /// Execute one step and log its outcome
    async fn dispatch(
        &self,
        chain_id: &str,
        step: &ChainStep,
        context: &ExecutionContext,
        cancel: &CancellationToken,
    ) -> StepResult {
        debug!(chain_id, step_id = %step.id, service = %step.service, "Executing step");

        let result = self.step_executor.execute(step, context, cancel).await;

        record_step_call(
            step.service.as_str(),
            result.success,
            Duration::from_millis(result.duration_ms),
        );

        if result.success {
            debug!(chain_id, step_id = %step.id, duration_ms = result.duration_ms, "Step succeeded");
        } else {
            warn!(
                chain_id,
                step_id = %step.id,
                error = result.error.as_deref().unwrap_or("unknown"),
                "Step failed"
            );
        }

        result
    }

    /// Whether a step should run, per its skip condition
    fn should_run(&self, chain_id: &str, step: &ChainStep, context: &ExecutionContext) -> bool {
        let Some(condition) = &step.condition else {
            return true;
        };

        if let Some(source) = condition.source_step_id() {
            if !context.has_step_result(source) {
                warn!(
                    chain_id,
                    step_id = %step.id,
                    source_step = source,
                    "Skip condition references a step that has not run; executing step"
                );
                return true;
            }
        }

        self.evaluator.evaluate(condition, context, None)
    }

    /// First routing rule that fires, scanning executed steps in declared order
    fn fired_rule<'a>(
        &self,
        executed: &[&'a ChainStep],
        context: &ExecutionContext,
    ) -> Option<(FiredRule<'a>, usize)> {
        executed.iter().copied().find_map(|step| {
            step.conditional_routing
                .iter()
                .enumerate()
                .find(|(_, rule)| self.evaluator.evaluate(&rule.condition, context, Some(&step.id)))
                .map(|(index, rule)| (FiredRule { step, rule }, index))
        })
    }

    /// Run a chain from its first step
    fn run_chain<'a>(
        &'a self,
        chain: &'a ChainConfiguration,
        context: &'a mut ExecutionContext,
        progress: &'a mut RunProgress,
        depth: usize,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, ChainOutcome> {
        Box::pin(async move {
            let chain_id = chain.id().as_str();
            let steps = chain.steps();
            let groups = parallel_groups(steps);
            let mut index = 0;

            while index < steps.len() {
                if cancel.is_cancelled() {
                    return ChainOutcome::failed(context, ChainError::Cancelled);
                }

                // Jumping into a parallel group starts at the target step
                let Some(group_end) = groups.iter().find(|g| g.contains(&index)).map(|g| g.end)
                else {
                    break;
                };
                let members = &steps[index..group_end];

                let mut to_run = Vec::with_capacity(members.len());
                let mut trace_slots = Vec::with_capacity(members.len());

                for step in members {
                    if self.should_run(chain_id, step, context) {
                        trace_slots.push(None);
                        to_run.push(step);
                    } else {
                        debug!(chain_id, step_id = %step.id, "Skipping step, condition not met");
                        trace_slots.push(Some(StepTrace::skipped(chain_id, step)));
                    }
                }

                let results = {
                    let shared: &ExecutionContext = context;
                    join_all(
                        to_run
                            .iter()
                            .map(|step| self.dispatch(chain_id, step, shared, cancel)),
                    )
                    .await
                };

                let mut executed = Vec::with_capacity(to_run.len());
                let mut executed_trace_index = Vec::with_capacity(to_run.len());
                let mut abort_error = None;
                let mut results = to_run.iter().zip(results);

                for (step, slot) in members.iter().zip(trace_slots) {
                    if let Some(skipped) = slot {
                        progress.trace.push(skipped);
                        continue;
                    }

                    let Some((ran, result)) = results.next() else {
                        break;
                    };

                    context.record_step_result(ran.id.clone(), result.body.clone());
                    progress.trace.push(StepTrace::executed(chain_id, ran, &result));

                    if !result.success && step.on_failure == OnStepFailure::Abort && abort_error.is_none() {
                        abort_error = Some(ChainError::step_execution(
                            &step.id,
                            result.error.clone().unwrap_or_else(|| "step failed".to_string()),
                        ));
                    }

                    executed.push(*ran);
                    executed_trace_index.push(progress.trace.len() - 1);
                }

                if let Some(error) = abort_error {
                    warn!(chain_id, error = %error, "Aborting run after failed step");
                    return ChainOutcome::failed(context, error);
                }

                if cancel.is_cancelled() {
                    return ChainOutcome::failed(context, ChainError::Cancelled);
                }

                let Some((fired, rule_index)) = self.fired_rule(&executed, context) else {
                    index = group_end;
                    continue;
                };

                if let Some(position) = executed.iter().position(|s| s.id == fired.step.id) {
                    progress.trace[executed_trace_index[position]].routing = Some(RoutingTrace {
                        action: fired.rule.action,
                        target: fired.rule.target.clone(),
                        rule_index,
                    });
                }

                progress.jumps += 1;
                record_routing_jump(fired.rule.action.as_str());

                if progress.jumps > self.config.max_jumps {
                    warn!(chain_id, jumps = progress.jumps, "Routing jump limit exceeded");
                    return ChainOutcome::failed(
                        context,
                        ChainError::routing_cycle(self.config.max_jumps),
                    );
                }

                info!(
                    chain_id,
                    step_id = %fired.step.id,
                    action = fired.rule.action.as_str(),
                    target = %fired.rule.target,
                    "Routing rule fired"
                );

                match fired.rule.action {
                    RoutingAction::JumpToStep => match chain.step_index(&fired.rule.target) {
                        Some(target) => index = target,
                        None => {
                            return ChainOutcome::failed(
                                context,
                                ChainError::step_not_found(fired.rule.target.clone()),
                            );
                        }
                    },
                    RoutingAction::JumpToChain => {
                        return self
                            .jump_to_chain(chain, fired.rule, context, progress, depth, cancel)
                            .await;
                    }
                }
            }

            ChainOutcome {
                output: self.chain_output(chain, context),
                error: None,
            }
        })
    }

    /// The chain's output template resolved against the context, or the
    /// latest result of every step when it has none
    fn chain_output(&self, chain: &ChainConfiguration, context: &ExecutionContext) -> Value {
        match chain.output_template() {
            Some(template) => self.resolver.resolve(template, context),
            None => context.results_snapshot(),
        }
    }

    /// Transfer control to another chain of the same owner
    ///
    /// The sub-run's output is exposed to the parent as `{{context.subchain}}`
    /// and spliced into the parent's own output under the target chain id.
    async fn jump_to_chain(
        &self,
        chain: &ChainConfiguration,
        rule: &RoutingRule,
        context: &mut ExecutionContext,
        progress: &mut RunProgress,
        depth: usize,
        cancel: &CancellationToken,
    ) -> ChainOutcome {
        if depth + 1 > self.config.max_chain_depth {
            return ChainOutcome::failed(
                context,
                ChainError::chain_depth_exceeded(self.config.max_chain_depth),
            );
        }

        let target = match ChainId::new(rule.target.as_str()) {
            Ok(id) => self.store.get_chain(&id, chain.user_id()).await,
            Err(e) => return ChainOutcome::failed(context, e),
        };

        let target = match target {
            Ok(Some(target)) => target,
            Ok(None) => return ChainOutcome::failed(context, ChainError::not_found(&rule.target)),
            Err(e) => {
                return ChainOutcome::failed(context, ChainError::persistence(e.to_string()));
            }
        };

        if let Err(e) = validate_chain(&target) {
            return ChainOutcome::failed(context, e);
        }

        let input = match &rule.input_mapping {
            Some(mapping) => self.resolver.resolve(mapping, context),
            None => context.input().clone(),
        };

        let mut sub_context = ExecutionContext::new(input)
            .with_env(as_map(context.env()))
            .with_metadata(as_map(context.metadata()));

        debug!(
            chain_id = %chain.id(),
            target_chain = %target.id(),
            depth = depth + 1,
            "Starting sub-run"
        );

        let sub = self
            .run_chain(&target, &mut sub_context, progress, depth + 1, cancel)
            .await;

        context.set_metadata(SUBCHAIN_KEY, sub.output.clone());
        let output = splice_output(
            self.chain_output(chain, context),
            target.id().as_str(),
            sub.output,
        );

        ChainOutcome {
            output,
            error: sub.error,
        }
    }

    /// Persist the history record, reporting failures on the result
    async fn persist_history(&self, chain: &ChainConfiguration, input: Value, run: &mut ChainRunResult) {
        let history = ExecutionHistory::from_run(chain.user_id(), input, run);

        if let Err(e) = self.store.append_history(history).await {
            error!(run_id = %run.run_id, error = %e, "Failed to persist execution history");
            run.history_error = Some(e.to_string());
        }
    }
}

/// Insert a sub-run's output into the parent's output under the chain id
///
/// A parent output that is not an object is kept under `output`.
fn splice_output(parent: Value, target_chain: &str, sub_output: Value) -> Value {
    let mut output = match parent {
        Value::Object(map) => map,
        other => {
            let mut map = Map::new();
            map.insert("output".to_string(), other);
            map
        }
    };

    output.insert(target_chain.to_string(), sub_output);
    Value::Object(output)
}

fn as_map(value: &Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}

#[async_trait]
impl ChainExecutor for ChainEngine {
    async fn execute(
        &self,
        chain: &ChainConfiguration,
        request: ExecutionRequest,
    ) -> Result<ChainRunResult, ChainError> {
        validate_chain(chain)?;
        self.check_chain_targets(chain).await?;

        let run_id = ExecutionId::new();
        let started_at = Utc::now();
        let start = Instant::now();

        info!(run_id = %run_id, chain_id = %chain.id(), steps = chain.steps().len(), "Starting chain run");

        let mut metadata = request.metadata;
        metadata
            .entry("userId")
            .or_insert_with(|| Value::String(chain.user_id().to_string()));
        metadata.insert("chainId".into(), Value::String(chain.id().to_string()));
        metadata.insert("runId".into(), Value::String(run_id.to_string()));

        let mut context = ExecutionContext::new(request.input.clone())
            .with_env(request.env)
            .with_metadata(metadata);

        let cancel = request.cancel.child_token();
        let timer = self.config.run_timeout.map(|budget| {
            let token = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(budget).await;
                token.cancel();
            })
        });

        let mut progress = RunProgress::default();
        let outcome = self
            .run_chain(chain, &mut context, &mut progress, 0, &cancel)
            .await;

        if let Some(timer) = timer {
            timer.abort();
        }

        let success = outcome.error.is_none() && !progress.trace.iter().any(StepTrace::is_failure);
        let duration = start.elapsed();

        let mut result = ChainRunResult {
            run_id,
            chain_id: request.saved_chain.then(|| chain.id().to_string()),
            chain_name: chain.name().to_string(),
            success,
            state: if outcome.error.is_none() {
                RunState::Completed
            } else {
                RunState::Failed
            },
            steps: progress.trace,
            output: outcome.output,
            error: outcome.error.as_ref().map(RunError::from),
            jumps: progress.jumps,
            duration_ms: duration.as_millis() as u64,
            started_at,
            completed_at: Utc::now(),
            pipeline: None,
            history_error: None,
        };

        record_chain_run(success, duration);

        match &outcome.error {
            Some(e) => warn!(run_id = %run_id, chain_id = %chain.id(), error = %e, "Chain run failed"),
            None => info!(
                run_id = %run_id,
                chain_id = %chain.id(),
                success,
                duration_ms = result.duration_ms,
                "Chain run completed"
            ),
        }

        self.persist_history(chain, request.input, &mut result).await;

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::chain::{
        ConditionOperator, HttpMethod, ResolvedRequest, StepCondition, StepStatus, TargetService,
    };
    use crate::domain::store::MockChainStore;
    use crate::infrastructure::store::InMemoryChainStore;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Scripted step executor: fixed responses and delays per step id
    #[derive(Debug, Default)]
    struct ScriptedExecutor {
        responses: HashMap<String, Vec<(bool, Value)>>,
        delays: HashMap<String, u64>,
        calls: Mutex<Vec<String>>,
        requests: Mutex<Vec<ResolvedRequest>>,
    }

    impl ScriptedExecutor {
        fn new() -> Self {
            Self::default()
        }

        fn respond(mut self, step_id: &str, body: Value) -> Self {
            self.responses.insert(step_id.to_string(), vec![(true, body)]);
            self
        }

        /// Successive calls get successive bodies; the last one repeats
        fn respond_seq(mut self, step_id: &str, bodies: Vec<Value>) -> Self {
            let script = bodies.into_iter().map(|body| (true, body)).collect();
            self.responses.insert(step_id.to_string(), script);
            self
        }

        fn fail(mut self, step_id: &str) -> Self {
            self.responses.insert(step_id.to_string(), vec![(false, Value::Null)]);
            self
        }

        fn delay(mut self, step_id: &str, ms: u64) -> Self {
            self.delays.insert(step_id.to_string(), ms);
            self
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn request_for(&self, endpoint: &str) -> Option<ResolvedRequest> {
            self.requests
                .lock()
                .unwrap()
                .iter()
                .find(|r| r.endpoint == endpoint)
                .cloned()
        }
    }

    #[async_trait]
    impl StepExecutor for ScriptedExecutor {
        async fn execute(
            &self,
            step: &ChainStep,
            context: &ExecutionContext,
            cancel: &CancellationToken,
        ) -> StepResult {
            let request = ResolvedRequest::build(step, context, &VariableResolver::new());
            let attempt = {
                let mut calls = self.calls.lock().unwrap();
                let attempt = calls.iter().filter(|id| **id == step.id).count();
                calls.push(step.id.clone());
                attempt
            };
            self.requests.lock().unwrap().push(request.clone());

            if let Some(ms) = self.delays.get(&step.id) {
                tokio::select! {
                    _ = cancel.cancelled() => return StepResult::failure(request, "Cancelled", 0),
                    _ = tokio::time::sleep(Duration::from_millis(*ms)) => {}
                }
            }

            let scripted = self
                .responses
                .get(&step.id)
                .and_then(|script| script.get(attempt).or_else(|| script.last()));

            match scripted {
                Some((true, body)) => StepResult::success(request, 200, body.clone(), 1),
                Some((false, _)) => StepResult::failure(request, "HTTP 500", 1).with_status(500),
                None => StepResult::success(request, 200, json!({"ok": true}), 1),
            }
        }
    }

    fn step(id: &str) -> ChainStep {
        ChainStep::new(id, TargetService::Character, HttpMethod::POST, format!("/{}", id))
    }

    fn chain(id: &str, steps: Vec<ChainStep>) -> ChainConfiguration {
        ChainConfiguration::new(ChainId::new(id).unwrap(), "admin", id).with_steps(steps)
    }

    fn engine(executor: Arc<ScriptedExecutor>) -> (ChainEngine, Arc<InMemoryChainStore>) {
        let store = Arc::new(InMemoryChainStore::new());
        (ChainEngine::new(executor, store.clone()), store)
    }

    fn always() -> StepCondition {
        StepCondition::new("ok", ConditionOperator::Equals).with_value(json!(true))
    }

    #[tokio::test]
    async fn test_sequential_order_matches_declaration() {
        let executor = Arc::new(ScriptedExecutor::new());
        let (engine, _) = engine(executor.clone());

        let chain = chain("seq", vec![step("a"), step("b"), step("c"), step("d")]);
        let result = engine.execute(&chain, ExecutionRequest::new(json!({}))).await.unwrap();

        let order: Vec<_> = result.steps.iter().map(|s| s.step_id.as_str()).collect();
        assert_eq!(order, vec!["a", "b", "c", "d"]);
        assert_eq!(executor.calls(), vec!["a", "b", "c", "d"]);
        assert!(result.success);
        assert_eq!(result.state, RunState::Completed);
    }

    #[tokio::test]
    async fn test_end_to_end_intent_flows_into_next_step() {
        let executor = Arc::new(
            ScriptedExecutor::new()
                .respond("step_1", json!({"result": {"primaryIntent": {"type": "attack"}}})),
        );
        let (engine, _) = engine(executor.clone());

        let chain = chain(
            "combat",
            vec![
                ChainStep::new("step_1", TargetService::Intent, HttpMethod::POST, "/intent/classify")
                    .with_body(json!({"message": "{{input.message}}"})),
                ChainStep::new(
                    "step_2",
                    TargetService::Character,
                    HttpMethod::POST,
                    "/character/{{input.characterName}}/action",
                )
                .with_body(json!({"intent": "{{step_1.result.primaryIntent.type}}"})),
            ],
        );

        let input = json!({
            "message": "I attack the goblin",
            "userId": "admin",
            "characterName": "Thorin"
        });
        let result = engine.execute(&chain, ExecutionRequest::new(input)).await.unwrap();

        assert!(result.success);

        let classify = executor.request_for("/intent/classify").unwrap();
        assert_eq!(classify.body, Some(json!({"message": "I attack the goblin"})));

        let update = executor.request_for("/character/Thorin/action").unwrap();
        assert_eq!(update.body, Some(json!({"intent": "attack"})));
    }

    #[tokio::test]
    async fn test_parallel_steps_run_concurrently() {
        let executor = Arc::new(
            ScriptedExecutor::new()
                .delay("a", 200)
                .delay("b", 200)
                .delay("c", 200),
        );
        let (engine, _) = engine(executor);

        let chain = chain(
            "fanout",
            vec![
                step("a").with_parallel(true),
                step("b").with_parallel(true),
                step("c").with_parallel(true),
            ],
        );

        let start = Instant::now();
        let result = engine.execute(&chain, ExecutionRequest::new(json!({}))).await.unwrap();
        let elapsed = start.elapsed();

        assert!(result.success);
        assert_eq!(result.steps.len(), 3);
        assert!(elapsed < Duration::from_millis(500), "took {:?}", elapsed);
    }

    #[tokio::test]
    async fn test_later_group_waits_for_parallel_join() {
        let executor = Arc::new(
            ScriptedExecutor::new()
                .delay("a", 100)
                .respond("a", json!({"v": 1}))
                .respond("b", json!({"v": 2})),
        );
        let (engine, _) = engine(executor.clone());

        let chain = chain(
            "join",
            vec![
                step("a").with_parallel(true),
                step("b").with_parallel(true),
                step("c").with_body(json!({"sum": ["{{a.v}}", "{{b.v}}"]})),
            ],
        );

        engine.execute(&chain, ExecutionRequest::new(json!({}))).await.unwrap();

        assert_eq!(executor.calls().last().map(String::as_str), Some("c"));
        let request = executor.request_for("/c").unwrap();
        assert_eq!(request.body, Some(json!({"sum": [1, 2]})));
    }

    #[tokio::test]
    async fn test_failed_step_does_not_stop_later_steps() {
        let executor = Arc::new(ScriptedExecutor::new().fail("a"));
        let (engine, _) = engine(executor.clone());

        let chain = chain(
            "resilient",
            vec![step("a"), step("b").with_body(json!({"from_a": "{{a.result}}"}))],
        );

        let result = engine.execute(&chain, ExecutionRequest::new(json!({}))).await.unwrap();

        assert!(!result.success);
        assert_eq!(result.state, RunState::Completed);
        assert_eq!(result.steps.len(), 2);
        assert_eq!(result.steps[0].status, StepStatus::Failed);
        assert_eq!(result.steps[1].status, StepStatus::Succeeded);
        assert_eq!(executor.request_for("/b").unwrap().body, Some(json!({"from_a": null})));
    }

    #[tokio::test]
    async fn test_abort_on_failure_stops_run() {
        let executor = Arc::new(ScriptedExecutor::new().fail("a"));
        let (engine, _) = engine(executor.clone());

        let chain = chain(
            "strict",
            vec![step("a").with_on_failure(OnStepFailure::Abort), step("b")],
        );

        let result = engine.execute(&chain, ExecutionRequest::new(json!({}))).await.unwrap();

        assert!(!result.success);
        assert_eq!(result.state, RunState::Failed);
        assert_eq!(result.error.unwrap().kind, "step_execution");
        assert_eq!(executor.calls(), vec!["a"]);
    }

    #[tokio::test]
    async fn test_skip_condition() {
        let executor = Arc::new(ScriptedExecutor::new().respond("a", json!({"hostile": false})));
        let (engine, _) = engine(executor.clone());

        let chain = chain(
            "skip",
            vec![
                step("a"),
                step("b").with_condition(
                    StepCondition::new("hostile", ConditionOperator::Equals)
                        .with_source("a")
                        .with_value(json!(true)),
                ),
                step("c").with_condition(
                    StepCondition::new("mode", ConditionOperator::Equals).with_value(json!("combat")),
                ),
            ],
        );

        let result = engine
            .execute(&chain, ExecutionRequest::new(json!({"mode": "combat"})))
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(result.steps[1].status, StepStatus::Skipped);
        assert_eq!(result.steps[2].status, StepStatus::Succeeded);
        assert_eq!(executor.calls(), vec!["a", "c"]);
    }

    #[tokio::test]
    async fn test_routing_with_boolean_true_matches() {
        let executor = Arc::new(ScriptedExecutor::new().respond("check", json!({"dead": true})));
        let (engine, _) = engine(executor.clone());

        let chain = chain(
            "route",
            vec![
                step("check").with_routing_rule(RoutingRule::jump_to_step(
                    StepCondition::new("dead", ConditionOperator::Equals).with_value(json!(true)),
                    "epilogue",
                )),
                step("fight"),
                step("epilogue"),
            ],
        );

        let result = engine.execute(&chain, ExecutionRequest::new(json!({}))).await.unwrap();

        assert!(result.success);
        assert_eq!(executor.calls(), vec!["check", "epilogue"]);
        assert_eq!(result.jumps, 1);

        let routing = result.steps[0].routing.as_ref().unwrap();
        assert_eq!(routing.action, RoutingAction::JumpToStep);
        assert_eq!(routing.target, "epilogue");
    }

    #[tokio::test]
    async fn test_routing_cycle_fails_within_bound() {
        let executor = Arc::new(ScriptedExecutor::new());
        let store = Arc::new(InMemoryChainStore::new());
        let engine = ChainEngine::with_config(
            executor.clone(),
            store,
            EngineConfig {
                max_jumps: 5,
                ..Default::default()
            },
        );

        let chain = chain(
            "loop",
            vec![
                step("a"),
                step("b").with_routing_rule(RoutingRule::jump_to_step(always(), "a")),
            ],
        );

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            engine.execute(&chain, ExecutionRequest::new(json!({}))),
        )
        .await
        .expect("engine must not hang")
        .unwrap();

        assert!(!result.success);
        assert_eq!(result.state, RunState::Failed);

        let error = result.error.unwrap();
        assert_eq!(error.kind, "routing_cycle");
        assert_eq!(result.jumps, 6);
        assert_eq!(executor.calls().len(), 12);
    }

    #[tokio::test]
    async fn test_backward_jump_appends_new_result() {
        let executor = Arc::new(
            ScriptedExecutor::new().respond_seq("a", vec![json!({"n": 1}), json!({"n": 2})]),
        );
        let (engine, _) = engine(executor.clone());

        let chain = chain(
            "retry",
            vec![
                step("a"),
                step("b")
                    .with_body(json!({"seen": "{{a.n}}"}))
                    .with_routing_rule(RoutingRule::jump_to_step(
                        StepCondition::new("n", ConditionOperator::Equals)
                            .with_source("a")
                            .with_value(json!(1)),
                        "a",
                    )),
            ],
        );

        let result = engine.execute(&chain, ExecutionRequest::new(json!({}))).await.unwrap();

        assert!(result.success);
        assert_eq!(result.jumps, 1);
        assert_eq!(executor.calls(), vec!["a", "b", "a", "b"]);
        assert_eq!(result.steps.len(), 4);
        assert_eq!(result.steps[0].response, Some(json!({"n": 1})));
        assert_eq!(result.steps[2].response, Some(json!({"n": 2})));
        assert_eq!(result.output["a"], json!({"n": 2}));
    }

    #[tokio::test]
    async fn test_jump_into_parallel_group_starts_at_target() {
        let executor = Arc::new(ScriptedExecutor::new().respond("gate", json!({"go": "late"})));
        let (engine, _) = engine(executor.clone());

        let chain = chain(
            "mid",
            vec![
                step("gate").with_routing_rule(RoutingRule::jump_to_step(
                    StepCondition::new("go", ConditionOperator::Equals).with_value(json!("late")),
                    "p2",
                )),
                step("p1").with_parallel(true),
                step("p2").with_parallel(true),
                step("p3").with_parallel(true),
                step("tail"),
            ],
        );

        engine.execute(&chain, ExecutionRequest::new(json!({}))).await.unwrap();

        let calls = executor.calls();
        assert!(!calls.contains(&"p1".to_string()));
        assert!(calls.contains(&"p2".to_string()));
        assert!(calls.contains(&"p3".to_string()));
        assert_eq!(calls.last().map(String::as_str), Some("tail"));
    }

    #[tokio::test]
    async fn test_jump_to_chain_transfers_control() {
        let executor = Arc::new(ScriptedExecutor::new().respond("death_check", json!({"dead": true})));
        let (engine, store) = engine(executor.clone());

        let target = chain("death", vec![step("mourn").with_body(json!({"who": "{{input.name}}"}))])
            .with_output_template(json!({"mourned": "{{mourn.ok}}"}));
        store.create_chain(target).await.unwrap();

        let main = chain(
            "main",
            vec![
                step("death_check").with_routing_rule(
                    RoutingRule::jump_to_chain(
                        StepCondition::new("dead", ConditionOperator::Equals).with_value(json!(true)),
                        "death",
                    )
                    .with_input_mapping(json!({"name": "{{input.characterName}}"})),
                ),
                step("continue_story"),
            ],
        );

        let result = engine
            .execute(&main, ExecutionRequest::new(json!({"characterName": "Thorin"})))
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(executor.calls(), vec!["death_check", "mourn"]);
        assert_eq!(
            result.output,
            json!({"death_check": {"dead": true}, "death": {"mourned": true}})
        );
        assert_eq!(result.steps[1].chain_id, "death");
        assert_eq!(
            executor.request_for("/mourn").unwrap().body,
            Some(json!({"who": "Thorin"}))
        );
    }

    #[tokio::test]
    async fn test_jump_to_chain_keeps_parent_output() {
        let executor = Arc::new(ScriptedExecutor::new().respond("check", json!({"dead": true})));
        let (engine, store) = engine(executor);

        store.create_chain(chain("sub", vec![step("mourn")])).await.unwrap();

        let parent = chain(
            "parent",
            vec![step("check").with_routing_rule(RoutingRule::jump_to_chain(
                StepCondition::new("dead", ConditionOperator::Equals).with_value(json!(true)),
                "sub",
            ))],
        )
        .with_output_template(json!({
            "parent": "{{check.dead}}",
            "mourned": "{{context.subchain.mourn.ok}}"
        }));

        let result = engine.execute(&parent, ExecutionRequest::new(json!({}))).await.unwrap();

        assert!(result.success);
        assert_eq!(
            result.output,
            json!({
                "parent": true,
                "mourned": true,
                "sub": {"mourn": {"ok": true}}
            })
        );
    }

    #[test]
    fn test_splice_output_wraps_non_object_parent() {
        assert_eq!(
            splice_output(json!("done"), "sub", json!({"x": 1})),
            json!({"output": "done", "sub": {"x": 1}})
        );
    }

    #[tokio::test]
    async fn test_unknown_chain_target_rejected_before_execution() {
        let executor = Arc::new(ScriptedExecutor::new());
        let (engine, _) = engine(executor.clone());

        let chain = chain(
            "main",
            vec![step("a").with_routing_rule(RoutingRule::jump_to_chain(always(), "missing"))],
        );

        let err = engine
            .execute(&chain, ExecutionRequest::new(json!({})))
            .await
            .unwrap_err();

        assert!(matches!(err, ChainError::Validation(_)));
        assert!(executor.calls().is_empty());
    }

    #[tokio::test]
    async fn test_validation_error_executes_nothing() {
        let executor = Arc::new(ScriptedExecutor::new());
        let (engine, store) = engine(executor.clone());

        let chain = chain("dup", vec![step("a"), step("a")]);
        let err = engine
            .execute(&chain, ExecutionRequest::new(json!({})))
            .await
            .unwrap_err();

        assert!(matches!(err, ChainError::Validation(_)));
        assert!(executor.calls().is_empty());
        assert!(store.list_history("admin", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_output_template_and_default_output() {
        let executor = Arc::new(ScriptedExecutor::new().respond("a", json!({"x": 5})));
        let (engine, _) = engine(executor);

        let templated = chain("out", vec![step("a")])
            .with_output_template(json!({"x": "{{a.x}}", "label": "x={{a.x}}"}));
        let result = engine
            .execute(&templated, ExecutionRequest::new(json!({})))
            .await
            .unwrap();
        assert_eq!(result.output, json!({"x": 5, "label": "x=5"}));

        let plain = chain("plain", vec![step("a")]);
        let result = engine.execute(&plain, ExecutionRequest::new(json!({}))).await.unwrap();
        assert_eq!(result.output, json!({"a": {"x": 5}}));
    }

    #[tokio::test]
    async fn test_history_written_once() {
        let executor = Arc::new(ScriptedExecutor::new());
        let (engine, store) = engine(executor);

        let chain = chain("hist", vec![step("a")]);
        let result = engine
            .execute(&chain, ExecutionRequest::new(json!({"m": 1})))
            .await
            .unwrap();

        let history = store.list_history("admin", 10).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].id, result.run_id);
        assert_eq!(history[0].chain_id.as_deref(), Some("hist"));
        assert_eq!(history[0].input, json!({"m": 1}));
        assert!(result.history_error.is_none());
    }

    #[tokio::test]
    async fn test_ad_hoc_run_has_no_chain_id() {
        let executor = Arc::new(ScriptedExecutor::new());
        let (engine, store) = engine(executor);

        let chain = chain("adhoc", vec![step("a")]);
        let result = engine
            .execute(&chain, ExecutionRequest::new(json!({})).ad_hoc())
            .await
            .unwrap();

        assert!(result.chain_id.is_none());
        let history = store.get_history(&result.run_id).await.unwrap().unwrap();
        assert!(history.chain_id.is_none());
    }

    #[tokio::test]
    async fn test_history_failure_keeps_result() {
        let executor = Arc::new(ScriptedExecutor::new().respond("a", json!({"v": 1})));
        let mut store = MockChainStore::new();
        store
            .expect_append_history()
            .times(1)
            .returning(|_| Err(crate::domain::DomainError::storage("disk full")));

        let engine = ChainEngine::new(executor, Arc::new(store));
        let chain = chain("c", vec![step("a")]);

        let result = engine.execute(&chain, ExecutionRequest::new(json!({}))).await.unwrap();

        assert!(result.success);
        assert_eq!(result.output, json!({"a": {"v": 1}}));
        assert!(result.history_error.unwrap().contains("disk full"));
    }

    #[tokio::test]
    async fn test_cancelled_run_fails() {
        let executor = Arc::new(ScriptedExecutor::new().delay("slow", 2_000));
        let (engine, store) = engine(executor.clone());

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let chain = chain("cancel", vec![step("slow"), step("after")]);
        let result = engine
            .execute(&chain, ExecutionRequest::new(json!({})).with_cancellation(cancel))
            .await
            .unwrap();

        assert!(!result.success);
        assert_eq!(result.error.unwrap().kind, "cancelled");
        assert_eq!(executor.calls(), vec!["slow"]);
        assert_eq!(store.list_history("admin", 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_run_timeout_cancels() {
        let executor = Arc::new(ScriptedExecutor::new().delay("slow", 2_000));
        let engine = ChainEngine::with_config(
            executor,
            Arc::new(InMemoryChainStore::new()),
            EngineConfig {
                run_timeout: Some(Duration::from_millis(50)),
                ..Default::default()
            },
        );

        let chain = chain("budget", vec![step("slow")]);
        let result = engine.execute(&chain, ExecutionRequest::new(json!({}))).await.unwrap();

        assert_eq!(result.error.unwrap().kind, "cancelled");
    }

    #[tokio::test]
    async fn test_context_metadata_available() {
        let executor = Arc::new(ScriptedExecutor::new());
        let (engine, _) = engine(executor.clone());

        let mut env = Map::new();
        env.insert("region".into(), json!("north"));

        let chain = chain(
            "meta",
            vec![step("a").with_body(json!({"user": "{{context.userId}}", "region": "{{env.region}}"}))],
        );

        engine
            .execute(&chain, ExecutionRequest::new(json!({})).with_env(env))
            .await
            .unwrap();

        assert_eq!(
            executor.request_for("/a").unwrap().body,
            Some(json!({"user": "admin", "region": "north"}))
        );
    }
}
