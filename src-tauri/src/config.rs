use crate::api::models::ChatMode;
use crate::db::Database;
use crate::error::{ClientError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_API_BASE_URL: &str = "http://127.0.0.1:5000/api";
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 3000;

/// Keys accepted by the settings commands. Anything else is rejected.
pub const SETTING_KEYS: &[&str] = &[
    "api_base_url",
    "api_token",
    "request_timeout_secs",
    "poll_interval_ms",
    "streaming_enabled",
    "default_chat_mode",
    "theme",
];

/// Runtime configuration assembled from persisted settings plus defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    pub api_base_url: String,
    pub api_token: Option<String>,
    pub request_timeout_secs: u64,
    pub poll_interval_ms: u64,
    pub streaming_enabled: bool,
    pub default_chat_mode: ChatMode,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            api_token: None,
            request_timeout_secs: DEFAULT_TIMEOUT_SECS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            streaming_enabled: true,
            default_chat_mode: ChatMode::Normal,
        }
    }
}

impl ClientConfig {
    /// Read settings from the database. Malformed values fall back to defaults
    /// with a warning rather than failing startup.
    pub fn load(db: &Database) -> Result<Self> {
        let mut config = Self::default();

        if let Some(url) = db.get_setting("api_base_url")? {
            match normalize_base_url(&url) {
                Ok(url) => config.api_base_url = url,
                Err(e) => log::warn!("ignoring api_base_url setting: {}", e),
            }
        }
        config.api_token = db
            .get_setting("api_token")?
            .filter(|t| !t.trim().is_empty());
        if let Some(secs) = parse_setting::<u64>(db, "request_timeout_secs")? {
            config.request_timeout_secs = secs.max(1);
        }
        if let Some(ms) = parse_setting::<u64>(db, "poll_interval_ms")? {
            config.poll_interval_ms = ms.max(100);
        }
        if let Some(enabled) = parse_setting::<bool>(db, "streaming_enabled")? {
            config.streaming_enabled = enabled;
        }
        if let Some(mode) = db.get_setting("default_chat_mode")? {
            match mode.parse::<ChatMode>() {
                Ok(mode) => config.default_chat_mode = mode,
                Err(e) => log::warn!("ignoring default_chat_mode setting: {}", e),
            }
        }

        Ok(config)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

fn parse_setting<T: std::str::FromStr>(db: &Database, key: &str) -> Result<Option<T>> {
    let Some(raw) = db.get_setting(key)? else {
        return Ok(None);
    };
    match raw.trim().parse::<T>() {
        Ok(v) => Ok(Some(v)),
        Err(_) => {
            log::warn!("ignoring malformed setting {} = {:?}", key, raw);
            Ok(None)
        }
    }
}

/// Validate a value before it is written to the settings table.
pub fn validate_setting(key: &str, value: &str) -> Result<()> {
    if !SETTING_KEYS.contains(&key) {
        return Err(ClientError::validation(format!("Unknown setting key: {}", key)));
    }
    let invalid = |what: &str| ClientError::validation(format!("Invalid value for {}: {}", key, what));
    match key {
        "api_base_url" => normalize_base_url(value).map(|_| ()),
        "request_timeout_secs" | "poll_interval_ms" => value
            .trim()
            .parse::<u64>()
            .map(|_| ())
            .map_err(|_| invalid("expected a positive integer")),
        "streaming_enabled" => value
            .trim()
            .parse::<bool>()
            .map(|_| ())
            .map_err(|_| invalid("expected true or false")),
        "default_chat_mode" => value.parse::<ChatMode>().map(|_| ()),
        _ => Ok(()),
    }
}

/// Trim whitespace and trailing slashes; only http(s) URLs are accepted.
pub fn normalize_base_url(url: &str) -> Result<String> {
    let url = url.trim().trim_end_matches('/');
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(ClientError::validation(format!(
            "API base URL must start with http:// or https://: {}",
            url
        )));
    }
    Ok(url.to_string())
}

/// Mask secrets for display: keep the first and last four characters.
pub fn mask_secret(value: &str) -> String {
    if value.chars().count() > 8 {
        let chars: Vec<char> = value.chars().collect();
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{}...{}", head, tail)
    } else {
        "****".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_empty() {
        let db = Database::in_memory().unwrap();
        let config = ClientConfig::load(&db).unwrap();
        assert_eq!(config.api_base_url, DEFAULT_API_BASE_URL);
        assert!(config.streaming_enabled);
        assert_eq!(config.poll_interval(), Duration::from_millis(3000));
        assert_eq!(config.default_chat_mode, ChatMode::Normal);
    }

    #[test]
    fn test_load_overrides_and_ignores_garbage() {
        let db = Database::in_memory().unwrap();
        db.set_setting("api_base_url", " https://rag.example.com/api/ ").unwrap();
        db.set_setting("streaming_enabled", "false").unwrap();
        db.set_setting("poll_interval_ms", "soon").unwrap();
        db.set_setting("default_chat_mode", "web_search").unwrap();
        db.set_setting("api_token", "  ").unwrap();

        let config = ClientConfig::load(&db).unwrap();
        assert_eq!(config.api_base_url, "https://rag.example.com/api");
        assert!(!config.streaming_enabled);
        assert_eq!(config.poll_interval_ms, DEFAULT_POLL_INTERVAL_MS);
        assert_eq!(config.default_chat_mode, ChatMode::WebSearch);
        assert_eq!(config.api_token, None);
    }

    #[test]
    fn test_validate_setting() {
        assert!(validate_setting("theme", "dark").is_ok());
        assert!(validate_setting("openai_api_key", "x").is_err());
        assert!(validate_setting("api_base_url", "ftp://nope").is_err());
        assert!(validate_setting("poll_interval_ms", "-3").is_err());
        assert!(validate_setting("streaming_enabled", "yes").is_err());
        assert!(validate_setting("default_chat_mode", "rag").is_ok());
    }

    #[test]
    fn test_mask_secret() {
        assert_eq!(mask_secret("sk-1234567890abcd"), "sk-1...abcd");
        assert_eq!(mask_secret("short"), "****");
    }
}
