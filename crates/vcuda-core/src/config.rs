use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Top-level vcuda configuration, loaded from vcuda.toml.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VcudaConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
    /// Bind address
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Maximum concurrent sessions
    #[serde(default = "default_max_clients")]
    pub max_clients: u32,
    /// Seconds a session may stay silent before it is closed
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
    /// Unregister modules a session left behind when it disconnects
    #[serde(default = "default_true")]
    pub release_on_disconnect: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Explicit path to the CUDA runtime library (None = search the platform defaults)
    pub library_path: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind: default_bind(),
            max_clients: default_max_clients(),
            idle_timeout_secs: default_idle_timeout(),
            release_on_disconnect: true,
        }
    }
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}

impl VcudaConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self, CoreError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, CoreError> {
        toml::from_str(content).map_err(|e| CoreError::ConfigError(e.to_string()))
    }

    /// Load configuration from file if it exists, otherwise return defaults.
    pub fn load_or_default(path: &str) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(CoreError::Io(_)) => Self::default(),
            Err(e) => {
                tracing::warn!("ignoring {}: {}", path, e);
                Self::default()
            }
        }
    }
}

/// Returns the default config file path based on platform conventions.
/// Search order:
/// 1. System-wide config: `%PROGRAMDATA%\vcuda\vcuda.toml` (Windows) or `/etc/vcuda/vcuda.toml`
/// 2. Local fallback: `./vcuda.toml`
pub fn default_config_path() -> String {
    #[cfg(windows)]
    {
        let programdata = std::env::var("PROGRAMDATA")
            .unwrap_or_else(|_| r"C:\ProgramData".to_string());
        let system_path = format!(r"{}\vcuda\vcuda.toml", programdata);
        if std::path::Path::new(&system_path).exists() {
            return system_path;
        }
    }
    #[cfg(not(windows))]
    {
        let system_path = "/etc/vcuda/vcuda.toml";
        if std::path::Path::new(system_path).exists() {
            return system_path.to_string();
        }
    }
    "vcuda.toml".to_string()
}

fn default_port() -> u16 {
    9988
}

fn default_bind() -> String {
    "0.0.0.0".to_string()
}

fn default_max_clients() -> u32 {
    16
}

fn default_idle_timeout() -> u64 {
    120
}

fn default_true() -> bool {
    true
}
