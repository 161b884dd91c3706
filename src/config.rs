//! Configuration loading: TOML file plus environment overrides.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

const CONFIG_FILE: &str = "streamhub.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerSection,
    pub stores: StoresSection,
    pub graph: GraphSection,
    pub sync: SyncSection,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub host: String,
    pub port: u16,
    /// Worker threads; one stays pinned per open connection.
    pub workers: usize,
    /// Accepted connections waiting for a free worker.
    pub queue_depth: usize,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            workers: 50,
            queue_depth: 128,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoresSection {
    pub primary_path: PathBuf,
    pub analytics_path: PathBuf,
    pub pool_size: usize,
}

impl Default for StoresSection {
    fn default() -> Self {
        Self {
            primary_path: PathBuf::from("streamhub.db"),
            analytics_path: PathBuf::from("streamhub-analytics.db"),
            pool_size: 8,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphSection {
    /// Base URL of the graph store's HTTP endpoint.
    pub url: String,
    pub user: String,
    pub password: String,
    pub database: String,
}

impl Default for GraphSection {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:7474".to_string(),
            user: "neo4j".to_string(),
            password: String::new(),
            database: "neo4j".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSection {
    pub analytics_interval_ms: u64,
    pub graph_interval_ms: u64,
}

impl Default for SyncSection {
    fn default() -> Self {
        Self {
            analytics_interval_ms: 5_000,
            graph_interval_ms: 500,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Pretty,
    Compact,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub stdout: bool,
    pub format: LogFormat,
    pub filter: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            stdout: true,
            format: LogFormat::Compact,
            filter: None,
        }
    }
}

/// Load configuration from `path`, or from `./streamhub.toml` when present,
/// falling back to defaults. Environment overrides are applied last.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(path) => read_file(path)?,
        None => {
            let default = Path::new(CONFIG_FILE);
            if default.exists() {
                read_file(default)?
            } else {
                Config::default()
            }
        }
    };
    apply_env_overrides(&mut config);
    Ok(config)
}

fn read_file(path: &Path) -> Result<Config, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

pub fn apply_env_overrides(config: &mut Config) {
    if let Some(port) = env_parse::<u16>("STREAMHUB_PORT") {
        config.server.port = port;
    }
    if let Some(path) = std::env::var_os("STREAMHUB_PRIMARY_PATH") {
        config.stores.primary_path = PathBuf::from(path);
    }
    if let Some(path) = std::env::var_os("STREAMHUB_ANALYTICS_PATH") {
        config.stores.analytics_path = PathBuf::from(path);
    }
    if let Ok(url) = std::env::var("STREAMHUB_GRAPH_URL") {
        config.graph.url = url;
    }
    if let Ok(filter) = std::env::var("STREAMHUB_LOG") {
        config.logging.filter = Some(filter);
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = Config::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.workers, 50);
        assert_eq!(config.sync.analytics_interval_ms, 5_000);
        assert_eq!(config.sync.graph_interval_ms, 500);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let parsed: Config = toml::from_str(
            "[server]\nport = 9999\n\n[sync]\ngraph_interval_ms = 50\n",
        )
        .unwrap();
        assert_eq!(parsed.server.port, 9999);
        assert_eq!(parsed.server.workers, 50);
        assert_eq!(parsed.sync.graph_interval_ms, 50);
        assert_eq!(parsed.sync.analytics_interval_ms, 5_000);
    }
}
