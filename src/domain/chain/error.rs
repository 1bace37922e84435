//! Chain error types

use thiserror::Error;

/// Errors that can occur while validating or executing a chain
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ChainError {
    #[error("Chain not found: {0}")]
    NotFound(String),

    #[error("Step not found: {0}")]
    StepNotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("routing_cycle: jump limit of {max_jumps} exceeded")]
    RoutingCycle { max_jumps: usize },

    #[error("Chain nesting depth of {max_depth} exceeded")]
    ChainDepthExceeded { max_depth: usize },

    #[error("Step execution failed in '{step}': {message}")]
    StepExecution { step: String, message: String },

    #[error("Timeout in step '{step}' after {timeout_ms}ms")]
    Timeout { step: String, timeout_ms: u64 },

    #[error("Run cancelled")]
    Cancelled,

    #[error("Persistence error: {0}")]
    Persistence(String),
}

impl ChainError {
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound(id.into())
    }

    pub fn step_not_found(id: impl Into<String>) -> Self {
        Self::StepNotFound(id.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn routing_cycle(max_jumps: usize) -> Self {
        Self::RoutingCycle { max_jumps }
    }

    pub fn chain_depth_exceeded(max_depth: usize) -> Self {
        Self::ChainDepthExceeded { max_depth }
    }

    pub fn step_execution(step: impl Into<String>, message: impl Into<String>) -> Self {
        Self::StepExecution {
            step: step.into(),
            message: message.into(),
        }
    }

    pub fn timeout(step: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout {
            step: step.into(),
            timeout_ms,
        }
    }

    pub fn persistence(message: impl Into<String>) -> Self {
        Self::Persistence(message.into())
    }

    /// Stable machine-readable kind, reported alongside failed runs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::StepNotFound(_) => "step_not_found",
            Self::Validation(_) => "validation",
            Self::RoutingCycle { .. } => "routing_cycle",
            Self::ChainDepthExceeded { .. } => "chain_depth_exceeded",
            Self::StepExecution { .. } => "step_execution",
            Self::Timeout { .. } => "timeout",
            Self::Cancelled => "cancelled",
            Self::Persistence(_) => "persistence",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ChainError::not_found("intro-chain");
        assert_eq!(err.to_string(), "Chain not found: intro-chain");

        let err = ChainError::step_execution("step_1", "Connection refused");
        assert_eq!(
            err.to_string(),
            "Step execution failed in 'step_1': Connection refused"
        );

        let err = ChainError::routing_cycle(50);
        assert_eq!(err.to_string(), "routing_cycle: jump limit of 50 exceeded");
    }

    #[test]
    fn test_error_kind() {
        assert_eq!(ChainError::routing_cycle(3).kind(), "routing_cycle");
        assert_eq!(ChainError::Cancelled.kind(), "cancelled");
        assert_eq!(ChainError::validation("x").kind(), "validation");
    }
}
