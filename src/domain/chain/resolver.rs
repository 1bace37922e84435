//! Variable resolution for chain templates
//!
//! Templates reference the execution context with `{{namespace.path}}`:
//! - `{{input.characterName}}` - caller supplied input
//! - `{{step_1.result.primaryIntent.type}}` - result of step `step_1`
//! - `{{steps.lookup.items[0]}}` - explicit step namespace
//! - `{{env.region}}` - environment overrides
//! - `{{context.userId}}` - run metadata
//!
//! A string that is exactly one token resolves to the referenced JSON value
//! with its type preserved. Tokens embedded in surrounding text are
//! interpolated as strings. Unresolvable references become `null` (or the
//! empty string when interpolated) and never fail the resolution.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::{Map, Value};
use tracing::debug;

use super::context::ExecutionContext;
use super::path;

/// Any `{{...}}` token inside a string
static TOKEN_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{\s*([^{}]+?)\s*\}\}").unwrap());

/// A string consisting of exactly one token
static WHOLE_TOKEN_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\{\{\s*([^{}]+?)\s*\}\}$").unwrap());

/// The slice of the execution context a reference points into
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Namespace {
    Input,
    Env,
    Context,
    Step(String),
}

/// A parsed `{{namespace.path}}` reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableRef {
    pub namespace: Namespace,
    pub path: String,
}

impl VariableRef {
    /// Parse the inside of a token. Returns `None` for malformed references.
    pub fn parse(token: &str) -> Option<Self> {
        let token = token.trim();
        let split = token.find(['.', '[']).unwrap_or(token.len());
        let head = &token[..split];
        let rest = token[split..].strip_prefix('.').unwrap_or(&token[split..]);

        if head.is_empty() {
            return None;
        }

        let reference = match head {
            "input" => Self::new(Namespace::Input, rest),
            "env" => Self::new(Namespace::Env, rest),
            "context" => Self::new(Namespace::Context, rest),
            "steps" => {
                let split = rest.find(['.', '[']).unwrap_or(rest.len());
                let step_id = &rest[..split];

                if step_id.is_empty() {
                    return None;
                }

                let path = rest[split..].strip_prefix('.').unwrap_or(&rest[split..]);
                Self::new(Namespace::Step(step_id.to_string()), path)
            }
            step_id => Self::new(Namespace::Step(step_id.to_string()), rest),
        };

        path::parse_path(&reference.path)?;
        Some(reference)
    }

    fn new(namespace: Namespace, path: &str) -> Self {
        Self {
            namespace,
            path: path.to_string(),
        }
    }

    /// Step id referenced, if this is a step reference
    pub fn step_id(&self) -> Option<&str> {
        match &self.namespace {
            Namespace::Step(id) => Some(id),
            _ => None,
        }
    }
}

/// Resolves `{{...}}` templates against an execution context
#[derive(Debug, Clone, Copy, Default)]
pub struct VariableResolver;

impl VariableResolver {
    pub fn new() -> Self {
        Self
    }

    /// Resolve every string leaf of a JSON template
    pub fn resolve(&self, template: &Value, context: &ExecutionContext) -> Value {
        match template {
            Value::String(s) => self.resolve_string_value(s, context),
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|item| self.resolve(item, context))
                    .collect(),
            ),
            Value::Object(obj) => Value::Object(
                obj.iter()
                    .map(|(key, value)| (key.clone(), self.resolve(value, context)))
                    .collect::<Map<String, Value>>(),
            ),
            other => other.clone(),
        }
    }

    /// Resolve a string template, always producing a string
    pub fn resolve_str(&self, template: &str, context: &ExecutionContext) -> String {
        TOKEN_PATTERN
            .replace_all(template, |caps: &Captures| {
                let value = self.lookup(&caps[1], context).unwrap_or(Value::Null);
                value_to_string(&value)
            })
            .into_owned()
    }

    /// Look up a single reference (the inside of a token)
    pub fn lookup(&self, token: &str, context: &ExecutionContext) -> Option<Value> {
        let Some(reference) = VariableRef::parse(token) else {
            debug!(token, "Malformed variable reference resolved to null");
            return None;
        };

        let root = match &reference.namespace {
            Namespace::Input => Some(context.input()),
            Namespace::Env => Some(context.env()),
            Namespace::Context => Some(context.metadata()),
            Namespace::Step(id) => context.step_result(id).or_else(|| {
                id.strip_prefix("step_")
                    .and_then(|short| context.step_result(short))
            }),
        };

        let value = root.and_then(|root| path::lookup(root, &reference.path)).cloned();

        if value.is_none() {
            debug!(token, "Variable reference resolved to null");
        }

        value
    }

    /// Whether a string contains at least one token
    pub fn has_variables(template: &str) -> bool {
        TOKEN_PATTERN.is_match(template)
    }

    /// Collect all references found in the string leaves of a template
    pub fn references(template: &Value) -> Vec<VariableRef> {
        let mut references = Vec::new();
        collect_references(template, &mut references);
        references
    }

    /// References found in a single string
    pub fn string_references(template: &str) -> Vec<VariableRef> {
        TOKEN_PATTERN
            .captures_iter(template)
            .filter_map(|caps| VariableRef::parse(&caps[1]))
            .collect()
    }

    /// Check that a template string is well formed
    ///
    /// Every `{{` must close with `}}`, tokens must be non-empty and parse
    /// as a reference.
    pub fn validate_str(template: &str) -> Result<(), String> {
        for caps in TOKEN_PATTERN.captures_iter(template) {
            if VariableRef::parse(&caps[1]).is_none() {
                return Err(format!("malformed reference '{{{{{}}}}}'", &caps[1]));
            }
        }

        let residue = TOKEN_PATTERN.replace_all(template, "");

        if residue.contains("{{") || residue.contains("}}") {
            return Err(format!("unbalanced braces in template '{}'", template));
        }

        Ok(())
    }

    /// Check every string leaf of a JSON template
    pub fn validate(template: &Value) -> Result<(), String> {
        match template {
            Value::String(s) => Self::validate_str(s),
            Value::Array(items) => items.iter().try_for_each(Self::validate),
            Value::Object(obj) => obj.values().try_for_each(Self::validate),
            _ => Ok(()),
        }
    }

    fn resolve_string_value(&self, template: &str, context: &ExecutionContext) -> Value {
        if let Some(caps) = WHOLE_TOKEN_PATTERN.captures(template) {
            return self.lookup(&caps[1], context).unwrap_or(Value::Null);
        }

        if Self::has_variables(template) {
            return Value::String(self.resolve_str(template, context));
        }

        Value::String(template.to_string())
    }
}

fn collect_references(template: &Value, out: &mut Vec<VariableRef>) {
    match template {
        Value::String(s) => out.extend(VariableResolver::string_references(s)),
        Value::Array(items) => items.iter().for_each(|item| collect_references(item, out)),
        Value::Object(obj) => obj.values().for_each(|value| collect_references(value, out)),
        _ => {}
    }
}

/// Convert a JSON value to its interpolated string form
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),

        // Arrays and objects interpolate as compact JSON
        _ => serde_json::to_string(value).unwrap_or_default(),
    }
}
