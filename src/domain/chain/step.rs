//! Chain step types

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::condition::StepCondition;
use super::service::TargetService;

/// HTTP request method
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    #[serde(alias = "get")]
    GET,
    #[serde(alias = "post")]
    POST,
    #[serde(alias = "put")]
    PUT,
    #[serde(alias = "patch")]
    PATCH,
    #[serde(alias = "delete")]
    DELETE,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GET => "GET",
            Self::POST => "POST",
            Self::PUT => "PUT",
            Self::PATCH => "PATCH",
            Self::DELETE => "DELETE",
        }
    }

    /// Whether requests with this method carry a JSON body
    pub fn allows_body(&self) -> bool {
        !matches!(self, Self::GET | Self::DELETE)
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What the engine does when a step fails
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum OnStepFailure {
    /// Record the failure and keep executing later groups
    #[default]
    Continue,

    /// End the run as failed once the current group has joined
    Abort,
}

/// Routing action fired after a step completes
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RoutingAction {
    JumpToStep,
    JumpToChain,
}

impl RoutingAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::JumpToStep => "jump_to_step",
            Self::JumpToChain => "jump_to_chain",
        }
    }
}

/// Post-step routing rule
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RoutingRule {
    pub condition: StepCondition,
    pub action: RoutingAction,

    /// Step id for `jump_to_step`, chain id for `jump_to_chain`
    pub target: String,

    /// Template for the sub-run input of `jump_to_chain`
    #[serde(default, alias = "input_mapping", skip_serializing_if = "Option::is_none")]
    pub input_mapping: Option<Value>,
}

impl RoutingRule {
    pub fn jump_to_step(condition: StepCondition, target: impl Into<String>) -> Self {
        Self {
            condition,
            action: RoutingAction::JumpToStep,
            target: target.into(),
            input_mapping: None,
        }
    }

    pub fn jump_to_chain(condition: StepCondition, target: impl Into<String>) -> Self {
        Self {
            condition,
            action: RoutingAction::JumpToChain,
            target: target.into(),
            input_mapping: None,
        }
    }

    pub fn with_input_mapping(mut self, mapping: Value) -> Self {
        self.input_mapping = Some(mapping);
        self
    }
}

/// One HTTP call in a chain
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChainStep {
    /// Unique id within the chain
    pub id: String,

    /// Human readable label recorded in history
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(alias = "module", alias = "target_service", alias = "targetService")]
    pub service: TargetService,

    #[serde(default)]
    pub method: HttpMethod,

    /// Path appended to the service base URL; may contain `{{...}}`
    pub endpoint: String,

    /// Query string parameters
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub params: Map<String, Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,

    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub headers: Map<String, Value>,

    /// Run concurrently with adjacent parallel steps
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub parallel: bool,

    /// Skip the step when this evaluates false
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<StepCondition>,

    #[serde(default, alias = "conditional_routing", skip_serializing_if = "Vec::is_empty")]
    pub conditional_routing: Vec<RoutingRule>,

    /// Per-step override of the executor timeout
    #[serde(default, alias = "timeout_ms", skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,

    #[serde(default, alias = "on_failure")]
    pub on_failure: OnStepFailure,
}

impl ChainStep {
    pub fn new(
        id: impl Into<String>,
        service: TargetService,
        method: HttpMethod,
        endpoint: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: None,
            service,
            method,
            endpoint: endpoint.into(),
            params: Map::new(),
            body: None,
            headers: Map::new(),
            parallel: false,
            condition: None,
            conditional_routing: Vec::new(),
            timeout_ms: None,
            on_failure: OnStepFailure::default(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), Value::String(value.into()));
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn with_condition(mut self, condition: StepCondition) -> Self {
        self.condition = Some(condition);
        self
    }

    pub fn with_routing_rule(mut self, rule: RoutingRule) -> Self {
        self.conditional_routing.push(rule);
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    pub fn with_on_failure(mut self, on_failure: OnStepFailure) -> Self {
        self.on_failure = on_failure;
        self
    }

    /// Name recorded in history, falling back to the id
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }

    /// All templates of the request side of the step
    pub fn request_templates(&self) -> Vec<Value> {
        let mut templates = vec![
            Value::String(self.endpoint.clone()),
            Value::Object(self.params.clone()),
            Value::Object(self.headers.clone()),
        ];

        if let Some(body) = &self.body {
            templates.push(body.clone());
        }

        templates
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::chain::condition::ConditionOperator;
    use serde_json::json;

    #[test]
    fn test_step_deserialization() {
        let step: ChainStep = serde_json::from_value(json!({
            "id": "step_2",
            "service": "character",
            "method": "post",
            "endpoint": "/character/{{input.characterName}}/action",
            "body": {"intent": "{{step_1.result.primaryIntent.type}}"},
            "parallel": true,
            "conditionalRouting": [{
                "condition": {"field": "result.dead", "operator": "equals", "value": true},
                "action": "jump_to_chain",
                "target": "death-chain",
                "input_mapping": {"name": "{{input.characterName}}"}
            }],
            "on_failure": "abort"
        }))
        .unwrap();

        assert_eq!(step.id, "step_2");
        assert_eq!(step.service, TargetService::Character);
        assert_eq!(step.method, HttpMethod::POST);
        assert!(step.parallel);
        assert_eq!(step.on_failure, OnStepFailure::Abort);
        assert_eq!(step.conditional_routing.len(), 1);

        let rule = &step.conditional_routing[0];
        assert_eq!(rule.action, RoutingAction::JumpToChain);
        assert_eq!(rule.condition.operator, ConditionOperator::Equals);
        assert!(rule.input_mapping.is_some());
    }

    #[test]
    fn test_step_defaults() {
        let step: ChainStep = serde_json::from_value(json!({
            "id": "lookup",
            "module": "inventory",
            "endpoint": "/inventory/{{input.characterName}}"
        }))
        .unwrap();

        assert_eq!(step.service, TargetService::Item);
        assert_eq!(step.method, HttpMethod::GET);
        assert!(!step.parallel);
        assert_eq!(step.on_failure, OnStepFailure::Continue);
        assert_eq!(step.display_name(), "lookup");
    }

    #[test]
    fn test_step_builder_serializes_compactly() {
        let step = ChainStep::new("classify", TargetService::Intent, HttpMethod::POST, "/intent/classify")
            .with_name("Classify")
            .with_body(json!({"message": "{{input.message}}"}));

        let value = serde_json::to_value(&step).unwrap();
        assert_eq!(value["service"], "intent");
        assert_eq!(value["method"], "POST");
        assert!(value.get("parallel").is_none());
        assert!(value.get("conditionalRouting").is_none());
        assert_eq!(step.display_name(), "Classify");
        assert_eq!(step.request_templates().len(), 4);
    }

    #[test]
    fn test_method_allows_body() {
        assert!(HttpMethod::POST.allows_body());
        assert!(!HttpMethod::GET.allows_body());
        assert!(!HttpMethod::DELETE.allows_body());
    }
}
