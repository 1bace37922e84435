//! Per-run execution context

use std::collections::HashMap;

use serde_json::{Map, Value};

/// Mutable working state of one chain run
///
/// Holds the caller input, environment overrides, run metadata and the
/// results recorded for each executed step. Step results are append-only:
/// a recorded entry is never modified, and a step that runs again after a
/// backward jump adds a new entry that becomes the one resolved.
#[derive(Debug, Clone, Default)]
pub struct ExecutionContext {
    input: Value,
    env: Value,
    metadata: Value,
    step_results: HashMap<String, Vec<Value>>,
}

impl ExecutionContext {
    /// Create a new context with the given input
    pub fn new(input: Value) -> Self {
        Self {
            input,
            env: Value::Object(Map::new()),
            metadata: Value::Object(Map::new()),
            step_results: HashMap::new(),
        }
    }

    pub fn with_env(mut self, env: Map<String, Value>) -> Self {
        self.env = Value::Object(env);
        self
    }

    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = Value::Object(metadata);
        self
    }

    pub fn input(&self) -> &Value {
        &self.input
    }

    pub fn env(&self) -> &Value {
        &self.env
    }

    pub fn metadata(&self) -> &Value {
        &self.metadata
    }

    /// Set one run metadata entry, visible as `{{context.<key>}}`
    pub fn set_metadata(&mut self, key: impl Into<String>, value: Value) {
        if let Value::Object(map) = &mut self.metadata {
            map.insert(key.into(), value);
        }
    }

    /// Append a result for a step
    pub fn record_step_result(&mut self, step_id: impl Into<String>, result: Value) {
        self.step_results
            .entry(step_id.into())
            .or_default()
            .push(result);
    }

    /// Most recent result recorded for a step
    pub fn step_result(&self, step_id: &str) -> Option<&Value> {
        self.step_results.get(step_id).and_then(|results| results.last())
    }

    pub fn has_step_result(&self, step_id: &str) -> bool {
        self.step_results.contains_key(step_id)
    }

    /// Latest result of every step, keyed by step id
    pub fn results_snapshot(&self) -> Value {
        let map: Map<String, Value> = self
            .step_results
            .iter()
            .filter_map(|(id, results)| results.last().map(|v| (id.clone(), v.clone())))
            .collect();

        Value::Object(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_context_creation() {
        let input = json!({"message": "I attack the goblin"});
        let ctx = ExecutionContext::new(input.clone());

        assert_eq!(ctx.input(), &input);
        assert_eq!(ctx.env(), &json!({}));
        assert_eq!(ctx.results_snapshot(), json!({}));
    }

    #[test]
    fn test_record_step_result_is_append_only() {
        let mut ctx = ExecutionContext::new(json!({}));
        ctx.record_step_result("step_1", json!({"attempt": 1}));
        ctx.record_step_result("step_1", json!({"attempt": 2}));

        assert_eq!(ctx.step_result("step_1"), Some(&json!({"attempt": 2})));
        assert_eq!(ctx.step_results["step_1"].len(), 2);
        assert!(ctx.has_step_result("step_1"));
        assert!(!ctx.has_step_result("step_2"));
    }

    #[test]
    fn test_results_snapshot_uses_latest() {
        let mut ctx = ExecutionContext::new(json!({}));
        ctx.record_step_result("a", json!(1));
        ctx.record_step_result("a", json!(2));
        ctx.record_step_result("b", json!("x"));

        assert_eq!(ctx.results_snapshot(), json!({"a": 2, "b": "x"}));
    }
}
