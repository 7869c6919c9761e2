use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub bind_address: String,
    pub source_base_url: String,
    pub notify_base_url: String,
    pub notify_api_key: String,
    pub notify_from_email: String,
    /// Scheduler tick interval in seconds
    pub schedule_tick_secs: u64,
    /// Work-unit budget handed to each scheduled run
    pub run_budget: u32,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, config::ConfigError> {
        Ok(Self {
            bind_address: std::env::var("BIND_ADDRESS")
                .unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
            source_base_url: std::env::var("SETTLEMENT_SOURCE_URL")
                .unwrap_or_else(|_| "https://api.settlement-source.example.com".to_string()),
            notify_base_url: std::env::var("NOTIFY_BASE_URL")
                .unwrap_or_else(|_| "https://api.resend.com".to_string()),
            notify_api_key: std::env::var("NOTIFY_API_KEY").unwrap_or_default(),
            notify_from_email: std::env::var("NOTIFY_FROM_EMAIL")
                .unwrap_or_else(|_| "recon@example.com".to_string()),
            schedule_tick_secs: std::env::var("SCHEDULE_TICK_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3600),
            run_budget: std::env::var("RUN_BUDGET")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(1000),
        })
    }
}
