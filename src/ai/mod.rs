pub mod chat;
pub mod prompt;
pub mod provider;
pub use provider::{ChatModel, ModelClient, Provider, ValidationError, resolve};
