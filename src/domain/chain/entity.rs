//! Chain configuration entity

use std::fmt;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::error::ChainError;
use super::merge::merged;
use super::step::ChainStep;

/// Maximum length for chain and step IDs
pub const MAX_ID_LENGTH: usize = 64;

/// Alphanumeric with hyphens and underscores, starting alphanumeric
static ID_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9][a-zA-Z0-9_-]*$").unwrap());

/// Validated chain identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ChainId(String);

impl ChainId {
    /// Create a new validated chain ID
    pub fn new(id: impl Into<String>) -> Result<Self, ChainError> {
        let id = id.into();
        validate_chain_id(&id)?;
        Ok(Self(id))
    }

    /// Generate a fresh random ID
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ChainId {
    type Error = ChainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ChainId> for String {
    fn from(id: ChainId) -> Self {
        id.0
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for ChainId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Validate a chain ID string
pub fn validate_chain_id(id: &str) -> Result<(), ChainError> {
    validate_identifier("Chain", id)
}

/// Shared ID rules for chains and steps
pub(crate) fn validate_identifier(kind: &str, id: &str) -> Result<(), ChainError> {
    if id.is_empty() {
        return Err(ChainError::validation(format!("{} ID cannot be empty", kind)));
    }

    if id.len() > MAX_ID_LENGTH {
        return Err(ChainError::validation(format!(
            "{} ID exceeds maximum length of {} characters",
            kind, MAX_ID_LENGTH
        )));
    }

    if !ID_PATTERN.is_match(id) {
        return Err(ChainError::validation(format!(
            "Invalid {} ID '{}': must be alphanumeric with hyphens or underscores",
            kind.to_lowercase(),
            id
        )));
    }

    Ok(())
}

/// Pipeline invoked after a successful run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PipelineTrigger {
    pub name: String,

    /// Resolved against the final run context to build the pipeline input
    #[serde(default, alias = "input_template")]
    pub input_template: Value,
}

impl PipelineTrigger {
    pub fn new(name: impl Into<String>, input_template: Value) -> Self {
        Self {
            name: name.into(),
            input_template,
        }
    }
}

/// A named, owned configuration of steps
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChainConfiguration {
    id: ChainId,

    #[serde(alias = "user_id", alias = "owner")]
    user_id: String,

    name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,

    steps: Vec<ChainStep>,

    #[serde(default, alias = "output_template", skip_serializing_if = "Option::is_none")]
    output_template: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pipeline: Option<PipelineTrigger>,

    #[serde(default = "Utc::now", alias = "created_at")]
    created_at: DateTime<Utc>,

    #[serde(default = "Utc::now", alias = "updated_at")]
    updated_at: DateTime<Utc>,
}

impl ChainConfiguration {
    pub fn new(id: ChainId, user_id: impl Into<String>, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            user_id: user_id.into(),
            name: name.into(),
            description: None,
            steps: Vec::new(),
            output_template: None,
            pipeline: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_step(mut self, step: ChainStep) -> Self {
        self.steps.push(step);
        self
    }

    pub fn with_steps(mut self, steps: Vec<ChainStep>) -> Self {
        self.steps = steps;
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

    pub fn with_timestamps(mut self, created_at: DateTime<Utc>, updated_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self.updated_at = updated_at;
        self
    }

    pub fn id(&self) -> &ChainId {
        &self.id
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn steps(&self) -> &[ChainStep] {
        &self.steps
    }

    pub fn output_template(&self) -> Option<&Value> {
        self.output_template.as_ref()
    }

    pub fn pipeline(&self) -> Option<&PipelineTrigger> {
        self.pipeline.as_ref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Whether the given user owns this chain
    pub fn is_owned_by(&self, user_id: &str) -> bool {
        self.user_id == user_id
    }

    pub fn step(&self, step_id: &str) -> Option<&ChainStep> {
        self.steps.iter().find(|s| s.id == step_id)
    }

    pub fn step_index(&self, step_id: &str) -> Option<usize> {
        self.steps.iter().position(|s| s.id == step_id)
    }

    /// Replace the full step list
    pub fn set_steps(&mut self, steps: Vec<ChainStep>) {
        self.steps = steps;
        self.touch();
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
        self.touch();
    }

    pub fn set_description(&mut self, description: Option<String>) {
        self.description = description;
        self.touch();
    }

    pub fn set_output_template(&mut self, template: Option<Value>) {
        self.output_template = template;
        self.touch();
    }

    pub fn set_pipeline(&mut self, pipeline: Option<PipelineTrigger>) {
        self.pipeline = pipeline;
        self.touch();
    }

    /// Apply a partial JSON document on top of this configuration
    ///
    /// Objects merge key by key, arrays replace wholesale and `null` clears a
    /// field. Identity, owner and creation time cannot be patched.
    pub fn patched(&self, patch: Value) -> Result<Self, ChainError> {
        let Value::Object(mut patch) = patch else {
            return Err(ChainError::validation("Chain update must be a JSON object"));
        };

        for key in IMMUTABLE_FIELDS {
            patch.remove(*key);
        }

        let current = serde_json::to_value(self)
            .map_err(|e| ChainError::validation(format!("Failed to serialize chain: {}", e)))?;

        let mut updated: Self = serde_json::from_value(merged(&current, Value::Object(patch)))
            .map_err(|e| ChainError::validation(format!("Invalid chain update: {}", e)))?;

        updated.id = self.id.clone();
        updated.user_id = self.user_id.clone();
        updated.created_at = self.created_at;
        updated.touch();

        Ok(updated)
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

const IMMUTABLE_FIELDS: &[&str] = &[
    "id",
    "userId",
    "user_id",
    "owner",
    "createdAt",
    "created_at",
    "updatedAt",
    "updated_at",
];
