use std::env;
use std::time::Duration;

pub const DEFAULT_OLLAMA_BASE_URL: &str = "http://localhost:11434/api";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub request_timeout: Duration,
    pub openai_api_hostname: String,
    pub anthropic_api_hostname: String,
    pub google_api_hostname: String,
    pub ollama_base_url: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        let request_timeout = env::var("STUDYCHAT_REQUEST_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(60));
        let openai_api_hostname = env::var("STUDYCHAT_OPENAI_API_HOST")
            .unwrap_or_else(|_| "https://api.openai.com".to_string());
        let anthropic_api_hostname = env::var("STUDYCHAT_ANTHROPIC_API_HOST")
            .unwrap_or_else(|_| "https://api.anthropic.com".to_string());
        let google_api_hostname = env::var("STUDYCHAT_GOOGLE_API_HOST")
            .unwrap_or_else(|_| "https://generativelanguage.googleapis.com".to_string());
        let ollama_base_url = env::var("STUDYCHAT_OLLAMA_BASE_URL")
            .unwrap_or_else(|_| DEFAULT_OLLAMA_BASE_URL.to_string());

        Self {
            request_timeout,
            openai_api_hostname,
            anthropic_api_hostname,
            google_api_hostname,
            ollama_base_url,
        }
    }
}
