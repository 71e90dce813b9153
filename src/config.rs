use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub security: SecurityConfig,

    #[serde(default)]
    pub mail: MailConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub database_path: String,

    pub log_level: String,

    /// Number of tokio worker threads (default: 2)
    /// Set to 0 to use the number of CPU cores
    pub worker_threads: usize,

    /// Maximum database connections (default: 5)
    pub max_db_connections: u32,

    /// Minimum database connections (default: 1)
    pub min_db_connections: u32,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            database_path: "sqlite:data/emberboard.db".to_string(),
            log_level: "info".to_string(),
            worker_threads: 2,
            max_db_connections: 5,
            min_db_connections: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,

    pub cors_allowed_origins: Vec<String>,

    /// Whether to set the Secure flag on session cookies.
    /// Default: true for production safety. Set to false for local development without HTTPS.
    pub secure_cookies: bool,

    /// Session inactivity expiry in minutes.
    pub session_expiry_minutes: i64,

    /// Public base URL of the site, used when building activation and
    /// password-reset links sent by email.
    pub public_url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8793,
            cors_allowed_origins: vec![
                "http://localhost:8793".to_string(),
                "http://127.0.0.1:8793".to_string(),
            ],
            secure_cookies: true,
            session_expiry_minutes: 60,
            public_url: "http://localhost:8793".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Argon2 memory cost in KiB (default: 8192 = 8MB)
    pub argon2_memory_cost_kib: u32,

    /// Argon2 time cost (iterations) - higher = more CPU work
    pub argon2_time_cost: u32,

    /// Argon2 parallelism (default: 1)
    pub argon2_parallelism: u32,

    /// HMAC key for password-reset tokens. When empty, a random key is
    /// generated at startup and outstanding reset links stop working across
    /// restarts.
    pub reset_token_key: String,

    /// Validity window for password-reset tokens, in hours.
    pub reset_token_max_age_hours: i64,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            argon2_memory_cost_kib: 8192,
            argon2_time_cost: 3,
            argon2_parallelism: 1,
            reset_token_key: String::new(),
            reset_token_max_age_hours: 72,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MailConfig {
    /// Transactional email API endpoint (Brevo-compatible).
    pub api_url: String,

    /// API credential. Usually supplied via the BREVO_API_KEY environment
    /// variable rather than the config file; an empty value disables
    /// dispatch (logged, never fatal).
    pub api_key: String,

    pub sender_name: String,

    pub sender_email: String,

    /// Request timeout in seconds (default: 10)
    pub request_timeout_seconds: u64,

    /// Delivery attempts beyond the first (default: 2)
    pub max_retries: u32,

    /// Base backoff delay between attempts, doubled per retry.
    pub retry_base_delay_ms: u64,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.brevo.com/v3/smtp/email".to_string(),
            api_key: String::new(),
            sender_name: "Emberboard".to_string(),
            sender_email: "info@emberboard.local".to_string(),
            request_timeout_seconds: 10,
            max_retries: 2,
            retry_base_delay_ms: 500,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            server: ServerConfig::default(),
            security: SecurityConfig::default(),
            mail: MailConfig::default(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let paths = Self::config_paths();

        let mut config = None;
        for path in &paths {
            if path.exists() {
                info!("Loading config from: {}", path.display());
                config = Some(Self::load_from_path(path)?);
                break;
            }
        }

        let mut config = config.unwrap_or_else(|| {
            info!("No config file found, using defaults");
            Self::default()
        });

        if let Ok(key) = std::env::var("BREVO_API_KEY") {
            config.mail.api_key = key;
        }

        Ok(config)
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Config saved to: {}", path.display());
        Ok(())
    }

    fn config_paths() -> Vec<PathBuf> {
        let mut paths = vec![];

        paths.push(PathBuf::from("config.toml"));

        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("emberboard").join("config.toml"));
        }

        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".emberboard").join("config.toml"));
        }

        paths
    }

    fn default_config_path() -> PathBuf {
        PathBuf::from("config.toml")
    }

    pub fn create_default_if_missing() -> Result<bool> {
        let path = Self::default_config_path();
        if path.exists() {
            Ok(false)
        } else {
            let config = Self::default();
            config.save_to_path(&path)?;
            info!("Created default config file: {}", path.display());
            Ok(true)
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.general.database_path.is_empty() {
            anyhow::bail!("Database path cannot be empty");
        }

        if self.security.argon2_memory_cost_kib == 0
            || self.security.argon2_time_cost == 0
            || self.security.argon2_parallelism == 0
        {
            anyhow::bail!("Argon2 parameters must be non-zero");
        }

        if self.security.reset_token_max_age_hours <= 0 {
            anyhow::bail!("Reset token validity window must be positive");
        }

        url::Url::parse(&self.server.public_url)
            .with_context(|| format!("Invalid public URL: {}", self.server.public_url))?;

        url::Url::parse(&self.mail.api_url)
            .with_context(|| format!("Invalid mail API URL: {}", self.mail.api_url))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn config_roundtrips_through_toml() {
        let config = Config::default();
        let serialized = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&serialized).unwrap();

        assert_eq!(parsed.server.port, config.server.port);
        assert_eq!(
            parsed.security.reset_token_max_age_hours,
            config.security.reset_token_max_age_hours
        );
    }

    #[test]
    fn partial_toml_falls_back_to_defaults() {
        let parsed: Config = toml::from_str("[server]\nport = 9000\n").unwrap();

        assert_eq!(parsed.server.port, 9000);
        assert_eq!(parsed.general.log_level, "info");
        assert_eq!(parsed.mail.max_retries, 2);
    }

    #[test]
    fn zero_argon2_params_rejected() {
        let mut config = Config::default();
        config.security.argon2_time_cost = 0;

        assert!(config.validate().is_err());
    }
}
