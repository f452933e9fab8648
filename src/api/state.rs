use crate::core::AppConfig;

/// Request handlers only read from this. Nothing about a chat session
/// lives here, every request carries its own history and credential.
pub struct AppState {
    pub config: AppConfig,
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }
}
