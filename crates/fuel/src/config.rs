use anyhow::{Context, Result};
use fuel_tools_core::ServerConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const DEFAULT_SERVERS: &str = include_str!("servers.toml");

#[derive(Debug, Default, Serialize, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    servers: Vec<ServerConfig>,
}

/// Known servers plus the cache root. Owned by the client for its lifetime.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    servers: Vec<ServerConfig>,
    cache_location: PathBuf,
}

impl ClientConfig {
    /// An empty configuration: no servers, cache at `cache_location`.
    pub fn new(cache_location: impl Into<PathBuf>) -> Self {
        Self {
            servers: Vec::new(),
            cache_location: cache_location.into(),
        }
    }

    /// Resolve directories from the environment, then load the built-in
    /// servers followed by `config.toml` from the config directory.
    pub fn load() -> Result<Self> {
        let config_dir = if let Ok(home) = std::env::var("FUEL_HOME") {
            PathBuf::from(home)
        } else if let Ok(custom_path) = std::env::var("FUEL_CONFIG_DIR") {
            PathBuf::from(custom_path)
        } else {
            dirs::config_dir()
                .context("Could not find config directory")?
                .join("fuel-tools")
        };

        let cache_dir = if let Ok(cache) = std::env::var("FUEL_CACHE_PATH") {
            PathBuf::from(cache)
        } else {
            config_dir.join("cache")
        };

        Self::load_from(&config_dir, cache_dir)
    }

    pub fn load_from(config_dir: &Path, cache_dir: impl Into<PathBuf>) -> Result<Self> {
        let cache_dir = cache_dir.into();
        fs::create_dir_all(config_dir)
            .with_context(|| format!("Failed to create {}", config_dir.display()))?;
        fs::create_dir_all(&cache_dir)
            .with_context(|| format!("Failed to create {}", cache_dir.display()))?;

        let mut config = Self::new(cache_dir);
        config.load_defaults()?;
        config.load_user_file(&config_dir.join("config.toml"))?;
        Ok(config)
    }

    fn load_defaults(&mut self) -> Result<()> {
        let parsed: ConfigFile = toml::from_str(DEFAULT_SERVERS)?;
        for server in parsed.servers {
            self.add_server(server);
        }
        Ok(())
    }

    fn load_user_file(&mut self, path: &Path) -> Result<()> {
        if path.exists() {
            let content = fs::read_to_string(path)?;
            let parsed: ConfigFile = toml::from_str(&content)
                .with_context(|| format!("Invalid config file {}", path.display()))?;
            for server in parsed.servers {
                self.add_server(server);
            }
        }
        Ok(())
    }

    /// Append a server, or replace the entry with the same host in place.
    pub fn add_server(&mut self, server: ServerConfig) {
        let host = server.host();
        if let Some(pos) = self.servers.iter().position(|s| s.host() == host) {
            self.servers[pos] = server;
        } else {
            self.servers.push(server);
        }
    }

    pub fn servers(&self) -> &[ServerConfig] {
        &self.servers
    }

    pub fn clear_servers(&mut self) {
        self.servers.clear();
    }

    /// The first configured server is the default.
    pub fn default_server(&self) -> Option<&ServerConfig> {
        self.servers.first()
    }

    pub fn server_for_host(&self, host: &str) -> Option<&ServerConfig> {
        self.servers.iter().find(|s| s.host() == host)
    }

    pub fn cache_location(&self) -> &Path {
        &self.cache_location
    }
}
