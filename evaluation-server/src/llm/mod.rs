// LLM provider selection and generation.

pub mod client;
pub mod config;
