//! Execution history entity

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::domain::chain::{ChainRunResult, StepTrace};
use crate::domain::DomainError;

/// Identifier of one chain run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutionId(Uuid);

impl ExecutionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ExecutionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ExecutionId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|_| DomainError::invalid_id(format!("Invalid execution ID '{}'", s)))
    }
}

/// Persisted, immutable record of one run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecutionHistory {
    pub id: ExecutionId,
    pub user_id: String,

    /// `None` for ad-hoc chains that were never saved
    pub chain_id: Option<String>,

    pub chain_name: String,
    pub input: Value,
    pub steps: Vec<StepTrace>,
    pub success: bool,
    pub error: Option<String>,
    pub total_duration_ms: u64,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl ExecutionHistory {
    /// Build the history record of a finished run
    pub fn from_run(user_id: impl Into<String>, input: Value, run: &ChainRunResult) -> Self {
        Self {
            id: run.run_id,
            user_id: user_id.into(),
            chain_id: run.chain_id.clone(),
            chain_name: run.chain_name.clone(),
            input,
            steps: run.steps.clone(),
            success: run.success,
            error: run.error.as_ref().map(|e| e.message.clone()),
            total_duration_ms: run.duration_ms,
            started_at: run.started_at,
            completed_at: run.completed_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::chain::{RunError, RunState};
    use serde_json::json;

    fn run(success: bool) -> ChainRunResult {
        let now = Utc::now();
        ChainRunResult {
            run_id: ExecutionId::new(),
            chain_id: Some("combat".into()),
            chain_name: "Combat".into(),
            success,
            state: if success { RunState::Completed } else { RunState::Failed },
            steps: vec![],
            output: json!({}),
            error: (!success).then(|| RunError {
                kind: "routing_cycle".into(),
                message: "routing_cycle: jump limit of 50 exceeded".into(),
            }),
            jumps: 0,
            duration_ms: 12,
            started_at: now,
            completed_at: now,
            pipeline: None,
            history_error: None,
        }
    }

    #[test]
    fn test_execution_id_parse() {
        let id = ExecutionId::new();
        let parsed: ExecutionId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
        assert!("not-a-uuid".parse::<ExecutionId>().is_err());
    }

    #[test]
    fn test_from_run() {
        let run = run(false);
        let history = ExecutionHistory::from_run("admin", json!({"m": 1}), &run);

        assert_eq!(history.id, run.run_id);
        assert_eq!(history.user_id, "admin");
        assert_eq!(history.chain_id.as_deref(), Some("combat"));
        assert!(!history.success);
        assert_eq!(
            history.error.as_deref(),
            Some("routing_cycle: jump limit of 50 exceeded")
        );
        assert_eq!(history.total_duration_ms, 12);
    }
}
