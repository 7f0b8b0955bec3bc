// Library root: re-exports all modules so integration tests and external
// consumers can access the crate's public API.

pub mod config;
pub mod http;
pub mod llm;
pub mod model;
pub mod store;
