//! Server configuration (ambient) — loaded once at startup from a JSON file.
//!
//! Schema matches the node's on-disk contract exactly: `seed_host`,
//! `seed_port`, `server_host`, `server_port`, `debug`, `access_log`. The file
//! path defaults to `server_conf.json` in the working directory, overridable
//! via the `KV_NODE_CONFIG` environment variable.

use std::path::PathBuf;

use serde::Deserialize;

const DEFAULT_CONFIG_PATH: &str = "server_conf.json";
const CONFIG_PATH_ENV_VAR: &str = "KV_NODE_CONFIG";

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub seed_host: Option<String>,
    pub seed_port: Option<u16>,
    pub server_host: String,
    pub server_port: u16,
    #[serde(default)]
    pub debug: bool,
    #[serde(default)]
    pub access_log: bool,
}

impl ServerConfig {
    pub fn seed_url(&self) -> Option<String> {
        match (&self.seed_host, self.seed_port) {
            (Some(host), Some(port)) => Some(format!("http://{}:{}", host, port)),
            _ => None,
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }
}

fn config_path() -> PathBuf {
    std::env::var(CONFIG_PATH_ENV_VAR)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Load the config file, or exit the process with status 1 if it's missing
/// or malformed. There's no recovery path for a node that can't learn its own
/// bind address — this mirrors the original's fail-fast behavior.
pub fn load_or_exit() -> ServerConfig {
    let path = config_path();
    let data = match std::fs::read(&path) {
        Ok(data) => data,
        Err(e) => {
            tracing::error!(path = %path.display(), error = %e, "failed to read server config");
            std::process::exit(1);
        }
    };

    match serde_json::from_slice(&data) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(path = %path.display(), error = %e, "failed to parse server config");
            std::process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_url_requires_both_host_and_port() {
        let config = ServerConfig {
            seed_host: Some("10.0.0.1".to_string()),
            seed_port: None,
            server_host: "0.0.0.0".to_string(),
            server_port: 8000,
            debug: false,
            access_log: false,
        };
        assert_eq!(config.seed_url(), None);
    }

    #[test]
    fn seed_url_builds_from_host_and_port() {
        let config = ServerConfig {
            seed_host: Some("10.0.0.1".to_string()),
            seed_port: Some(9000),
            server_host: "0.0.0.0".to_string(),
            server_port: 8000,
            debug: false,
            access_log: false,
        };
        assert_eq!(config.seed_url(), Some("http://10.0.0.1:9000".to_string()));
    }

    #[test]
    fn bind_addr_combines_host_and_port() {
        let config = ServerConfig {
            seed_host: None,
            seed_port: None,
            server_host: "0.0.0.0".to_string(),
            server_port: 8000,
            debug: false,
            access_log: false,
        };
        assert_eq!(config.bind_addr(), "0.0.0.0:8000");
    }

    #[test]
    fn config_parses_from_expected_schema() {
        let raw = r#"{
            "seed_host": "127.0.0.1",
            "seed_port": 9000,
            "server_host": "0.0.0.0",
            "server_port": 8001,
            "debug": true,
            "access_log": false
        }"#;
        let config: ServerConfig = serde_json::from_str(raw).unwrap();
        assert_eq!(config.server_port, 8001);
        assert!(config.debug);
    }
}
