//! Conditions for step gating and conditional routing

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::context::ExecutionContext;
use super::path;
use super::resolver::VariableResolver;

/// Source name that refers to the run input rather than a step result
pub const INPUT_SOURCE: &str = "input";

/// Condition comparison operators
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOperator {
    Equals,
    NotEquals,
    Contains,
    NotContains,
    GreaterThan,
    LessThan,
    GreaterOrEqual,
    LessOrEqual,
    Exists,
    NotExists,
    InArray,
}

impl ConditionOperator {
    /// Evaluate the operator. `field_value` is `None` when the path is missing.
    pub fn evaluate(&self, field_value: Option<&Value>, compare_value: &Value) -> bool {
        let field = field_value.unwrap_or(&Value::Null);

        match self {
            Self::Equals => loose_equals(field, compare_value),
            Self::NotEquals => !loose_equals(field, compare_value),
            Self::Contains => contains(field, compare_value),
            Self::NotContains => !contains(field, compare_value),
            Self::GreaterThan => compare_numbers(field, compare_value, |a, b| a > b),
            Self::LessThan => compare_numbers(field, compare_value, |a, b| a < b),
            Self::GreaterOrEqual => compare_numbers(field, compare_value, |a, b| a >= b),
            Self::LessOrEqual => compare_numbers(field, compare_value, |a, b| a <= b),
            Self::Exists => !field.is_null(),
            Self::NotExists => field.is_null(),
            Self::InArray => match compare_value {
                Value::Array(items) => {
                    !field.is_null() && items.iter().any(|item| loose_equals(field, item))
                }
                _ => false,
            },
        }
    }
}

/// Parse a boolean-looking string
fn bool_from_str(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

/// Structural equality with two coercions: numbers compare by value, and
/// the strings `"true"`/`"false"` compare equal to the matching boolean.
fn loose_equals(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => x == y,
        },
        (Value::Bool(x), Value::String(s)) | (Value::String(s), Value::Bool(x)) => {
            bool_from_str(s) == Some(*x)
        }
        _ => a == b,
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn compare_numbers<F>(a: &Value, b: &Value, f: F) -> bool
where
    F: Fn(f64, f64) -> bool,
{
    match (as_number(a), as_number(b)) {
        (Some(a), Some(b)) => f(a, b),
        _ => false,
    }
}

fn contains(field: &Value, value: &Value) -> bool {
    match field {
        Value::String(s) => match value {
            Value::String(v) => s.contains(v.as_str()),
            Value::Number(n) => s.contains(&n.to_string()),
            _ => false,
        },
        Value::Array(arr) => arr.iter().any(|item| loose_equals(item, value)),
        Value::Object(obj) => value.as_str().is_some_and(|key| obj.contains_key(key)),
        _ => false,
    }
}

/// A comparison against a field of a step result or the run input
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StepCondition {
    /// Step whose result is inspected. `input` targets the run input; when
    /// absent, skip conditions read the input and routing rules read the
    /// step that just completed.
    #[serde(default, alias = "source_step", skip_serializing_if = "Option::is_none")]
    pub source_step: Option<String>,

    /// Path into the source value
    #[serde(default)]
    pub field: String,

    pub operator: ConditionOperator,

    /// Comparison value. String leaves may reference the context.
    #[serde(default)]
    pub value: Value,
}

impl StepCondition {
    pub fn new(field: impl Into<String>, operator: ConditionOperator) -> Self {
        Self {
            source_step: None,
            field: field.into(),
            operator,
            value: Value::Null,
        }
    }

    pub fn with_source(mut self, source_step: impl Into<String>) -> Self {
        self.source_step = Some(source_step.into());
        self
    }

    pub fn with_value(mut self, value: Value) -> Self {
        self.value = value;
        self
    }

    /// Whether the comparison value is a boolean stored as a string
    pub fn has_boolean_string_value(&self) -> bool {
        self.value.as_str().and_then(bool_from_str).is_some()
    }

    /// Explicit step source, ignoring the `input` pseudo-source
    pub fn source_step_id(&self) -> Option<&str> {
        self.source_step
            .as_deref()
            .filter(|source| *source != INPUT_SOURCE)
    }
}

/// Evaluates conditions against an execution context
#[derive(Debug, Clone, Copy, Default)]
pub struct ConditionEvaluator {
    resolver: VariableResolver,
}

impl ConditionEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    /// The value a condition reads its field from
    ///
    /// `default_step` is used when the condition names no source: the
    /// completed step for routing rules, `None` (the input) for skip
    /// conditions. Returns `None` when the source step has not run yet.
    pub fn source_value<'a>(
        condition: &StepCondition,
        context: &'a ExecutionContext,
        default_step: Option<&str>,
    ) -> Option<&'a Value> {
        match condition.source_step.as_deref().or(default_step) {
            None | Some(INPUT_SOURCE) => Some(context.input()),
            Some(step_id) => context.step_result(step_id),
        }
    }

    /// Evaluate a condition
    pub fn evaluate(
        &self,
        condition: &StepCondition,
        context: &ExecutionContext,
        default_step: Option<&str>,
    ) -> bool {
        let field_value = Self::source_value(condition, context, default_step)
            .and_then(|source| path::lookup(source, &condition.field));

        let compare_value = self.resolver.resolve(&condition.value, context);

        condition.operator.evaluate(field_value, &compare_value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_equals_native_types() {
        let op = ConditionOperator::Equals;
        assert!(op.evaluate(Some(&json!("attack")), &json!("attack")));
        assert!(!op.evaluate(Some(&json!("attack")), &json!("flee")));
        assert!(op.evaluate(Some(&json!(42)), &json!(42.0)));
        assert!(op.evaluate(Some(&json!(true)), &json!(true)));
        assert!(!op.evaluate(Some(&json!(true)), &json!(false)));
        assert!(op.evaluate(Some(&json!({"a": [1]})), &json!({"a": [1]})));
    }

    #[test]
    fn test_equals_coerces_boolean_strings() {
        let op = ConditionOperator::Equals;
        assert!(op.evaluate(Some(&json!(false)), &json!("false")));
        assert!(op.evaluate(Some(&json!(true)), &json!("TRUE")));
        assert!(!op.evaluate(Some(&json!(true)), &json!("false")));
        assert!(!op.evaluate(Some(&json!(true)), &json!("yes")));
        assert!(ConditionOperator::NotEquals.evaluate(Some(&json!(true)), &json!("false")));
    }

    #[test]
    fn test_missing_field_equals_null() {
        assert!(ConditionOperator::Equals.evaluate(None, &json!(null)));
        assert!(!ConditionOperator::Equals.evaluate(None, &json!(false)));
    }

    #[test]
    fn test_contains() {
        let op = ConditionOperator::Contains;
        assert!(op.evaluate(Some(&json!("hello world")), &json!("world")));
        assert!(!op.evaluate(Some(&json!("hello")), &json!("world")));
        assert!(op.evaluate(Some(&json!([1, 2, 3])), &json!(2)));
        assert!(op.evaluate(Some(&json!({"sword": 1})), &json!("sword")));
        assert!(!op.evaluate(None, &json!("x")));
        assert!(ConditionOperator::NotContains.evaluate(Some(&json!([1, 2])), &json!(5)));
    }

    #[test]
    fn test_numeric_comparisons() {
        assert!(ConditionOperator::GreaterThan.evaluate(Some(&json!(10)), &json!(5)));
        assert!(!ConditionOperator::GreaterThan.evaluate(Some(&json!(5)), &json!(10)));
        assert!(ConditionOperator::LessThan.evaluate(Some(&json!(1.5)), &json!(2)));
        assert!(ConditionOperator::GreaterOrEqual.evaluate(Some(&json!(10)), &json!(10)));
        assert!(ConditionOperator::LessOrEqual.evaluate(Some(&json!("3")), &json!(3)));
        assert!(!ConditionOperator::GreaterThan.evaluate(Some(&json!("abc")), &json!(1)));
        assert!(!ConditionOperator::LessThan.evaluate(None, &json!(1)));
    }

    #[test]
    fn test_exists_is_not_falsiness() {
        assert!(ConditionOperator::Exists.evaluate(Some(&json!(false)), &json!(null)));
        assert!(ConditionOperator::Exists.evaluate(Some(&json!(0)), &json!(null)));
        assert!(ConditionOperator::Exists.evaluate(Some(&json!("")), &json!(null)));
        assert!(!ConditionOperator::Exists.evaluate(Some(&json!(null)), &json!(null)));
        assert!(!ConditionOperator::Exists.evaluate(None, &json!(null)));
        assert!(ConditionOperator::NotExists.evaluate(None, &json!(null)));
        assert!(!ConditionOperator::NotExists.evaluate(Some(&json!(false)), &json!(null)));
    }

    #[test]
    fn test_in_array() {
        let op = ConditionOperator::InArray;
        assert!(op.evaluate(Some(&json!("attack")), &json!(["attack", "defend"])));
        assert!(!op.evaluate(Some(&json!("flee")), &json!(["attack", "defend"])));
        assert!(!op.evaluate(Some(&json!("attack")), &json!("attack")));
        assert!(!op.evaluate(None, &json!([null])));
    }

    #[test]
    fn test_condition_deserialization() {
        let condition: StepCondition = serde_json::from_value(json!({
            "sourceStep": "step_1",
            "field": "result.primaryIntent.type",
            "operator": "equals",
            "value": "attack"
        }))
        .unwrap();

        assert_eq!(condition.source_step.as_deref(), Some("step_1"));
        assert_eq!(condition.operator, ConditionOperator::Equals);
        assert!(!condition.has_boolean_string_value());

        let condition: StepCondition = serde_json::from_value(json!({
            "source_step": "input",
            "field": "dryRun",
            "operator": "not_equals",
            "value": "false"
        }))
        .unwrap();

        assert!(condition.has_boolean_string_value());
        assert_eq!(condition.source_step_id(), None);
    }

    #[test]
    fn test_evaluate_against_step_result() {
        let mut ctx = ExecutionContext::new(json!({"mode": "combat"}));
        ctx.record_step_result("step_1", json!({"result": {"hostile": true, "hp": 4}}));

        let evaluator = ConditionEvaluator::new();

        let routing = StepCondition::new("result.hostile", ConditionOperator::Equals)
            .with_value(json!(true));
        assert!(evaluator.evaluate(&routing, &ctx, Some("step_1")));

        let explicit = StepCondition::new("result.hp", ConditionOperator::LessThan)
            .with_source("step_1")
            .with_value(json!(5));
        assert!(evaluator.evaluate(&explicit, &ctx, None));

        let on_input = StepCondition::new("mode", ConditionOperator::Equals)
            .with_value(json!("combat"));
        assert!(evaluator.evaluate(&on_input, &ctx, None));
    }

    #[test]
    fn test_evaluate_resolves_comparison_template() {
        let mut ctx = ExecutionContext::new(json!({"threshold": 3}));
        ctx.record_step_result("roll", json!({"value": 5}));

        let condition = StepCondition::new("value", ConditionOperator::GreaterThan)
            .with_source("roll")
            .with_value(json!("{{input.threshold}}"));

        assert!(ConditionEvaluator::new().evaluate(&condition, &ctx, None));
    }

    #[test]
    fn test_source_value_unresolved_step() {
        let ctx = ExecutionContext::new(json!({}));
        let condition = StepCondition::new("x", ConditionOperator::Exists).with_source("later");

        assert!(ConditionEvaluator::source_value(&condition, &ctx, None).is_none());
        assert!(!ConditionEvaluator::new().evaluate(&condition, &ctx, None));
    }
}
