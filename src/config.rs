//! Process configuration loaded entirely from environment variables, with
//! an optional `.env` file read first via `dotenvy` — no TOML/YAML config
//! file, matching the original implementation.

use tracing::warn;

#[derive(Debug, Clone)]
pub struct Config {
    pub es_host: String,
    pub es_port: u16,
    pub es_user: Option<String>,
    pub es_password: Option<String>,
    pub es_index_name: String,
    pub log_sources: Vec<String>,
    pub anomaly_threshold: f64,
    pub training_days: i64,
    pub alert_webhook: Option<String>,
    pub alert_email: Option<String>,
    pub api_key: String,
    pub llm_provider: String,
    pub server_host: String,
    pub server_port: u16,
}

impl Config {
    /// Loads a `.env` file if present, then reads every variable from the
    /// process environment, falling back to the documented defaults.
    pub fn load() -> Self {
        if dotenvy::dotenv().is_err() {
            tracing::debug!("no .env file found, reading configuration from the process environment only");
        }

        let api_key = std::env::var("API_KEY").unwrap_or_else(|_| {
            warn!("API_KEY not set, falling back to the development default \"dev-secret-key\" - set API_KEY explicitly in production");
            "dev-secret-key".to_string()
        });

        Self {
            es_host: env_or("ES_HOST", "localhost"),
            es_port: env_parse_or("ES_PORT", 9200),
            es_user: std::env::var("ES_USER").ok(),
            es_password: std::env::var("ES_PASSWORD").ok(),
            es_index_name: env_or("ES_INDEX_NAME", "siem-events"),
            log_sources: env_or("LOG_SOURCES", &default_log_source())
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            anomaly_threshold: env_parse_or("ANOMALY_THRESHOLD", -0.5),
            training_days: env_parse_or("TRAINING_DAYS", 7),
            alert_webhook: std::env::var("ALERT_WEBHOOK").ok(),
            alert_email: std::env::var("ALERT_EMAIL").ok(),
            api_key,
            llm_provider: env_or("LLM_PROVIDER", "local"),
            server_host: env_or("SERVER_HOST", "0.0.0.0"),
            server_port: env_parse_or("SERVER_PORT", 8080),
        }
    }
}

#[cfg(target_os = "linux")]
fn default_log_source() -> String {
    "/var/log/syslog".to_string()
}

#[cfg(not(target_os = "linux"))]
fn default_log_source() -> String {
    "/var/log/system.log".to_string()
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_parse_or_falls_back_on_missing_var() {
        std::env::remove_var("SIEM_TEST_NONEXISTENT_VAR");
        let value: u16 = env_parse_or("SIEM_TEST_NONEXISTENT_VAR", 42);
        assert_eq!(value, 42);
    }

    #[test]
    fn env_parse_or_falls_back_on_unparseable_value() {
        std::env::set_var("SIEM_TEST_BAD_NUMBER", "not-a-number");
        let value: u16 = env_parse_or("SIEM_TEST_BAD_NUMBER", 7);
        assert_eq!(value, 7);
        std::env::remove_var("SIEM_TEST_BAD_NUMBER");
    }
}
