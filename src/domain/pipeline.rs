//! External pipeline collaborator triggered by chain completion

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[cfg(test)]
use mockall::automock;

/// Result reported by a pipeline run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PipelineOutcome {
    pub success: bool,
    pub summary: String,
}

impl PipelineOutcome {
    pub fn success(summary: impl Into<String>) -> Self {
        Self {
            success: true,
            summary: summary.into(),
        }
    }

    pub fn failure(summary: impl Into<String>) -> Self {
        Self {
            success: false,
            summary: summary.into(),
        }
    }
}

/// Runs a named multi-stage pipeline
///
/// Implementations never fail: errors are reported as an unsuccessful
/// outcome so they cannot affect the chain run that triggered them.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait PipelineRunner: Send + Sync + std::fmt::Debug {
    async fn run_pipeline(&self, name: &str, input: Value) -> PipelineOutcome;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_constructors() {
        assert!(PipelineOutcome::success("done").success);
        let failed = PipelineOutcome::failure("boom");
        assert!(!failed.success);
        assert_eq!(failed.summary, "boom");
    }
}
