//! Pipeline runner implementations

mod http;

pub use http::HttpPipelineRunner;
