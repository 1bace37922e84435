//! Chain execution engine

mod engine;

pub use engine::{ChainEngine, EngineConfig};
