pub mod config;
pub mod sse;
pub mod upstream;
pub use config::AppConfig;
