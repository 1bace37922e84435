//! Infrastructure layer - engine, HTTP clients, persistence and services

pub mod chain;
pub mod http;
pub mod logging;
pub mod observability;
pub mod pipeline;
pub mod services;
pub mod store;
