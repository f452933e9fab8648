pub mod ai;
pub mod anthropic;
pub mod api;
pub mod cli;
pub mod client;
pub mod context;
pub mod core;
pub mod extract;
pub mod google;
pub mod ollama;
pub mod openai;
