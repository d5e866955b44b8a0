use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub scanner: ScannerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Allowed CORS origins; "*" allows any
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            data_dir: default_data_dir(),
            cors_origins: default_cors_origins(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_cors_origins() -> Vec<String> {
    vec!["*".to_string()]
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Email of the administrator account ensured at startup
    #[serde(default = "default_admin_email")]
    pub admin_email: String,
    /// Password of the administrator account (random if not provided)
    #[serde(default = "default_admin_password")]
    pub admin_password: String,
    /// Company the administrator account is attached to
    #[serde(default = "default_admin_company")]
    pub admin_company: String,
    /// Lifetime of issued bearer tokens
    #[serde(default = "default_token_ttl_days")]
    pub token_ttl_days: i64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            admin_email: default_admin_email(),
            admin_password: default_admin_password(),
            admin_company: default_admin_company(),
            token_ttl_days: default_token_ttl_days(),
        }
    }
}

fn default_admin_email() -> String {
    "admin@badgenotes.local".to_string()
}

fn default_admin_password() -> String {
    // Generate a random password if not provided
    uuid::Uuid::new_v4().to_string()
}

fn default_admin_company() -> String {
    "Administration".to_string()
}

fn default_token_ttl_days() -> i64 {
    7
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    /// Base URL of the backend (without the /api prefix)
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Where the cached session is persisted between runs
    #[serde(default = "default_session_file")]
    pub session_file: PathBuf,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// Directory receiving exported reports
    #[serde(default = "default_export_dir")]
    pub export_dir: PathBuf,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            session_file: default_session_file(),
            request_timeout_secs: default_request_timeout(),
            export_dir: default_export_dir(),
        }
    }
}

fn default_api_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_session_file() -> PathBuf {
    PathBuf::from("./data/session.json")
}

fn default_request_timeout() -> u64 {
    30
}

fn default_export_dir() -> PathBuf {
    PathBuf::from(".")
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScannerConfig {
    /// Upper bound on decode attempts per second; 0 disables throttling
    #[serde(default = "default_fps")]
    pub fps: u32,
    #[serde(default = "default_min_length")]
    pub min_length: usize,
    #[serde(default = "default_max_length")]
    pub max_length: usize,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            fps: default_fps(),
            min_length: default_min_length(),
            max_length: default_max_length(),
        }
    }
}

fn default_fps() -> u32 {
    10
}

fn default_min_length() -> usize {
    1
}

fn default_max_length() -> usize {
    64
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            info!("Loading configuration from {}", path.display());
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            Self::parse(&content)
        } else {
            info!("No config file found, using defaults");
            Ok(Config::default())
        }
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(content).with_context(|| "Failed to parse configuration file")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.scanner.min_length == 0 || self.scanner.min_length > self.scanner.max_length {
            anyhow::bail!(
                "scanner.min_length must be between 1 and scanner.max_length ({})",
                self.scanner.max_length
            );
        }
        if self.auth.token_ttl_days <= 0 {
            anyhow::bail!("auth.token_ttl_days must be positive");
        }
        Ok(())
    }
}
