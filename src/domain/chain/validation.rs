//! Structural validation of chain configurations
//!
//! Runs once before any step executes; a chain that fails here never
//! produces a partial run.

use std::collections::HashSet;
use std::ops::Range;

use tracing::warn;

use super::condition::{ConditionOperator, StepCondition, INPUT_SOURCE};
use super::entity::{validate_chain_id, validate_identifier, ChainConfiguration};
use super::error::ChainError;
use super::resolver::VariableResolver;
use super::step::{ChainStep, RoutingAction};

/// Template namespaces; a step with one of these ids could never be referenced
const RESERVED_STEP_IDS: [&str; 5] = ["input", "env", "context", "steps", "output"];

/// Partition steps into execution groups
///
/// Maximal runs of consecutive `parallel` steps form one group; every other
/// step is a group of its own.
pub fn parallel_groups(steps: &[ChainStep]) -> Vec<Range<usize>> {
    let mut groups = Vec::new();
    let mut start = 0;

    while start < steps.len() {
        let mut end = start + 1;

        if steps[start].parallel {
            while end < steps.len() && steps[end].parallel {
                end += 1;
            }
        }

        groups.push(start..end);
        start = end;
    }

    groups
}

/// Validate a chain configuration
pub fn validate_chain(chain: &ChainConfiguration) -> Result<(), ChainError> {
    if chain.name().trim().is_empty() {
        return Err(ChainError::validation("Chain name cannot be empty"));
    }

    if chain.user_id().trim().is_empty() {
        return Err(ChainError::validation("Chain owner cannot be empty"));
    }

    if chain.steps().is_empty() {
        return Err(ChainError::validation("Chain must have at least one step"));
    }

    let mut step_ids = HashSet::new();
    for step in chain.steps() {
        validate_identifier("Step", &step.id)?;

        if RESERVED_STEP_IDS.contains(&step.id.as_str()) {
            return Err(ChainError::validation(format!(
                "Step id '{}' is reserved for template variables",
                step.id
            )));
        }

        if !step_ids.insert(step.id.as_str()) {
            return Err(ChainError::validation(format!(
                "Duplicate step id '{}'",
                step.id
            )));
        }
    }

    // `{{step_x...}}` falls back to step `x`, so both ids would be ambiguous
    for id in &step_ids {
        if let Some(short) = id.strip_prefix("step_") {
            if step_ids.contains(short) {
                return Err(ChainError::validation(format!(
                    "Step ids '{}' and '{}' are ambiguous in templates",
                    short, id
                )));
            }
        }
    }

    for step in chain.steps() {
        validate_step(step, &step_ids)?;
    }

    if let Some(template) = chain.output_template() {
        VariableResolver::validate(template)
            .map_err(|e| ChainError::validation(format!("Output template: {}", e)))?;
    }

    if let Some(pipeline) = chain.pipeline() {
        if pipeline.name.trim().is_empty() {
            return Err(ChainError::validation("Pipeline name cannot be empty"));
        }

        VariableResolver::validate(&pipeline.input_template)
            .map_err(|e| ChainError::validation(format!("Pipeline input template: {}", e)))?;
    }

    for group in parallel_groups(chain.steps()) {
        validate_group_independence(&chain.steps()[group])?;
    }

    Ok(())
}

fn validate_step(step: &ChainStep, step_ids: &HashSet<&str>) -> Result<(), ChainError> {
    if step.endpoint.trim().is_empty() {
        return Err(ChainError::validation(format!(
            "Step '{}' has an empty endpoint",
            step.id
        )));
    }

    if !step.endpoint.starts_with('/') {
        return Err(ChainError::validation(format!(
            "Step '{}' endpoint must start with '/'",
            step.id
        )));
    }

    for template in step.request_templates() {
        VariableResolver::validate(&template)
            .map_err(|e| ChainError::validation(format!("Step '{}': {}", step.id, e)))?;
    }

    if let Some(condition) = &step.condition {
        validate_condition(&step.id, condition, step_ids)?;
    }

    for rule in &step.conditional_routing {
        validate_condition(&step.id, &rule.condition, step_ids)?;

        match rule.action {
            RoutingAction::JumpToStep => {
                if !step_ids.contains(rule.target.as_str()) {
                    return Err(ChainError::step_not_found(format!(
                        "{} (jump target of step '{}')",
                        rule.target, step.id
                    )));
                }
            }
            RoutingAction::JumpToChain => {
                validate_chain_id(&rule.target).map_err(|e| {
                    ChainError::validation(format!(
                        "Step '{}' jump_to_chain target: {}",
                        step.id, e
                    ))
                })?;
            }
        }

        if let Some(mapping) = &rule.input_mapping {
            VariableResolver::validate(mapping).map_err(|e| {
                ChainError::validation(format!("Step '{}' input mapping: {}", step.id, e))
            })?;
        }
    }

    Ok(())
}

fn validate_condition(
    step_id: &str,
    condition: &StepCondition,
    step_ids: &HashSet<&str>,
) -> Result<(), ChainError> {
    if let Some(source) = condition.source_step.as_deref() {
        if source != INPUT_SOURCE && !step_ids.contains(source) {
            return Err(ChainError::validation(format!(
                "Step '{}' condition references unknown source step '{}'",
                step_id, source
            )));
        }
    }

    if condition.operator == ConditionOperator::InArray && !condition.value.is_array() {
        return Err(ChainError::validation(format!(
            "Step '{}' condition uses in_array with a non-array value",
            step_id
        )));
    }

    VariableResolver::validate(&condition.value)
        .map_err(|e| ChainError::validation(format!("Step '{}' condition: {}", step_id, e)))?;

    if condition.has_boolean_string_value() {
        warn!(
            step_id = %step_id,
            value = %condition.value,
            "Condition compares against a boolean stored as a string; it will be coerced"
        );
    }

    Ok(())
}

/// Members of one parallel group must not read each other's results
fn validate_group_independence(group: &[ChainStep]) -> Result<(), ChainError> {
    if group.len() < 2 {
        return Ok(());
    }

    let members: HashSet<&str> = group.iter().map(|s| s.id.as_str()).collect();

    for step in group {
        let mut referenced: Vec<String> = step
            .request_templates()
            .iter()
            .flat_map(VariableResolver::references)
            .filter_map(|r| r.step_id().map(str::to_string))
            .collect();

        if let Some(source) = step.condition.as_ref().and_then(|c| c.source_step_id()) {
            referenced.push(source.to_string());
        }

        for reference in referenced {
            let short = reference.strip_prefix("step_").unwrap_or(&reference);
            let hit = [reference.as_str(), short]
                .into_iter()
                .find(|id| *id != step.id && members.contains(id));

            if let Some(other) = hit {
                return Err(ChainError::validation(format!(
                    "Parallel step '{}' depends on '{}' in the same parallel group",
                    step.id, other
                )));
            }
        }
    }

    Ok(())
}
