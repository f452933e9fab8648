pub mod chat;
pub use chat::OllamaClient;
