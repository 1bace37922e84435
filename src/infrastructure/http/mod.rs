//! HTTP step execution against target services

mod registry;
mod step_executor;

pub use registry::ServiceRegistry;
pub use step_executor::HttpStepExecutor;
