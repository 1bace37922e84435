//! Domain layer - Core business logic and entities

pub mod chain;
pub mod error;
pub mod history;
pub mod pipeline;
pub mod store;

pub use chain::{
    ChainConfiguration, ChainError, ChainExecutor, ChainId, ChainRunResult, ChainStep,
    ExecutionContext, ExecutionRequest, StepExecutor, StepResult, TargetService,
};
pub use error::DomainError;
pub use history::{ExecutionHistory, ExecutionId};
pub use pipeline::{PipelineOutcome, PipelineRunner};
pub use store::ChainStore;
