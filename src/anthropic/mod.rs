pub mod claude;
pub use claude::AnthropicClient;
