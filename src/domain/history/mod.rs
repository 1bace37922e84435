//! Execution history domain

mod entity;

pub use entity::{ExecutionHistory, ExecutionId};
