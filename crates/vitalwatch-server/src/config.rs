use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use vitalwatch_storage::ChannelCredentials;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_database_file")]
    pub database_file: String,

    /// CORS origins; empty allows any origin (development).
    #[serde(default)]
    pub cors_allowed_origins: Vec<String>,

    /// Optional JSON file replacing the built-in vital-sign threshold table.
    #[serde(default)]
    pub threshold_table: Option<String>,

    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_port: default_http_port(),
            data_dir: default_data_dir(),
            database_file: default_database_file(),
            cors_allowed_origins: Vec::new(),
            threshold_table: None,
            auth: AuthConfig::default(),
            dispatch: DispatchConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub jwt_secret: Option<String>,
    #[serde(default = "default_token_expire_secs")]
    pub token_expire_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: None,
            token_expire_secs: default_token_expire_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Seconds during which an identical alert is not re-sent; 0 disables.
    #[serde(default)]
    pub silence_secs: u64,
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            silence_secs: 0,
            cache_capacity: default_cache_capacity(),
        }
    }
}

// ---- Seed file types (used by the `init-configs` CLI subcommand) ----

/// Runtime settings written to the store's settings table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigsSeedFile {
    #[serde(default)]
    pub alert_destination_address: Option<String>,
    #[serde(default)]
    pub channel_credentials: Option<ChannelCredentials>,
}

fn default_http_port() -> u16 {
    8080
}

fn default_data_dir() -> String {
    "data".to_string()
}

fn default_database_file() -> String {
    "vitalwatch.db".to_string()
}

fn default_token_expire_secs() -> u64 {
    86400
}

fn default_cache_capacity() -> usize {
    1024
}

impl ServerConfig {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config '{path}': {e}"))?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn database_path(&self) -> PathBuf {
        PathBuf::from(&self.data_dir).join(&self.database_file)
    }
}
