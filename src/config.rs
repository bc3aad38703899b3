//! Configuration loading with env-var overrides.
//!
//! Reads `config/default.toml` relative to the current working directory,
//! then applies `TUTORGRAPH_LOG_LEVEL` and the `NEO4J_*` env overrides.
//! The database password is sourced from `NEO4J_PASSWORD` only, never
//! from the TOML file.

use std::{env, fs, path::Path};

use serde::Deserialize;

use crate::error::GraphError;

/// Graph database connection configuration.
#[derive(Debug, Clone)]
pub struct GraphConfig {
    /// Which store backend is active (`"neo4j"` or `"memory"`).
    pub backend: String,
    /// Bolt URI of the Neo4j server.
    pub uri: String,
    pub username: String,
    /// From `NEO4J_PASSWORD` env var; `None` for auth-less local servers.
    pub password: Option<String>,
}

/// Chat-history retrieval configuration.
#[derive(Debug, Clone)]
pub struct HistoryConfig {
    /// How many of the most recent turns `get_history` returns when the
    /// caller does not pass an explicit depth.
    pub default_depth: usize,
}

/// Fully-resolved service configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub service_name: String,
    pub log_level: String,
    pub graph: GraphConfig,
    pub history: HistoryConfig,
}

/// Raw TOML shape, the `serde` target before resolution.
#[derive(Deserialize)]
struct RawConfig {
    service: RawService,
    #[serde(default)]
    graph: RawGraph,
    #[serde(default)]
    history: RawHistory,
}

#[derive(Deserialize)]
struct RawService {
    name: String,
    #[serde(default = "default_log_level")]
    log_level: String,
}

#[derive(Deserialize)]
struct RawGraph {
    #[serde(default = "default_backend")]
    backend: String,
    #[serde(default = "default_uri")]
    uri: String,
    #[serde(default = "default_username")]
    username: String,
}

impl Default for RawGraph {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            uri: default_uri(),
            username: default_username(),
        }
    }
}

#[derive(Deserialize)]
struct RawHistory {
    #[serde(default = "default_depth")]
    default_depth: usize,
}

impl Default for RawHistory {
    fn default() -> Self {
        Self {
            default_depth: default_depth(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_backend() -> String {
    "neo4j".to_string()
}

fn default_uri() -> String {
    "bolt://localhost:7687".to_string()
}

fn default_username() -> String {
    "neo4j".to_string()
}

fn default_depth() -> usize {
    6
}

/// Load config from `config/default.toml`, then apply env-var overrides.
pub fn load() -> Result<Config, GraphError> {
    let log_level_override = env::var("TUTORGRAPH_LOG_LEVEL").ok();
    let uri_override = env::var("NEO4J_URI").ok();
    let username_override = env::var("NEO4J_USERNAME").ok();
    load_from(
        Path::new("config/default.toml"),
        log_level_override.as_deref(),
        uri_override.as_deref(),
        username_override.as_deref(),
    )
}

/// Internal loader that accepts an explicit path and optional overrides.
/// Tests pass overrides directly instead of mutating env vars.
pub fn load_from(
    path: &Path,
    log_level_override: Option<&str>,
    uri_override: Option<&str>,
    username_override: Option<&str>,
) -> Result<Config, GraphError> {
    let raw = fs::read_to_string(path)
        .map_err(|e| GraphError::Config(format!("cannot read {}: {e}", path.display())))?;

    let parsed: RawConfig = toml::from_str(&raw)
        .map_err(|e| GraphError::Config(format!("parse error in {}: {e}", path.display())))?;

    if parsed.history.default_depth == 0 {
        return Err(GraphError::Config(
            "history.default_depth must be at least 1".into(),
        ));
    }

    Ok(Config {
        service_name: parsed.service.name,
        log_level: log_level_override
            .unwrap_or(&parsed.service.log_level)
            .to_string(),
        graph: GraphConfig {
            backend: parsed.graph.backend,
            uri: uri_override.unwrap_or(&parsed.graph.uri).to_string(),
            username: username_override
                .unwrap_or(&parsed.graph.username)
                .to_string(),
            password: env::var("NEO4J_PASSWORD").ok(),
        },
        history: HistoryConfig {
            default_depth: parsed.history.default_depth,
        },
    })
}

// ── test helpers ──────────────────────────────────────────────────────────────

/// Safe `Config` for unit tests: memory backend, no credentials.
#[cfg(test)]
impl Config {
    pub fn test_default() -> Self {
        Self {
            service_name: "test".into(),
            log_level: "info".into(),
            graph: GraphConfig {
                backend: "memory".into(),
                uri: default_uri(),
                username: default_username(),
                password: None,
            },
            history: HistoryConfig { default_depth: 6 },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const MINIMAL_TOML: &str = r#"
[service]
name = "tutorgraph-test"
"#;

    fn write_toml(content: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    #[test]
    fn parse_minimal_config_with_defaults() {
        let f = write_toml(MINIMAL_TOML);
        let cfg = load_from(f.path(), None, None, None).unwrap();
        assert_eq!(cfg.service_name, "tutorgraph-test");
        assert_eq!(cfg.log_level, "info");
        assert_eq!(cfg.graph.backend, "neo4j");
        assert_eq!(cfg.graph.uri, "bolt://localhost:7687");
        assert_eq!(cfg.history.default_depth, 6);
    }

    #[test]
    fn parse_full_config() {
        let f = write_toml(
            r#"
[service]
name = "tutorgraph"
log_level = "debug"

[graph]
backend = "memory"
uri = "bolt://db:7687"
username = "tutor"

[history]
default_depth = 10
"#,
        );
        let cfg = load_from(f.path(), None, None, None).unwrap();
        assert_eq!(cfg.log_level, "debug");
        assert_eq!(cfg.graph.backend, "memory");
        assert_eq!(cfg.graph.uri, "bolt://db:7687");
        assert_eq!(cfg.graph.username, "tutor");
        assert_eq!(cfg.history.default_depth, 10);
    }

    #[test]
    fn overrides_win() {
        let f = write_toml(MINIMAL_TOML);
        let cfg = load_from(f.path(), Some("trace"), Some("bolt://other:7687"), Some("admin")).unwrap();
        assert_eq!(cfg.log_level, "trace");
        assert_eq!(cfg.graph.uri, "bolt://other:7687");
        assert_eq!(cfg.graph.username, "admin");
    }

    #[test]
    fn zero_depth_rejected() {
        let f = write_toml(
            r#"
[service]
name = "t"

[history]
default_depth = 0
"#,
        );
        let result = load_from(f.path(), None, None, None);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("default_depth"));
    }

    #[test]
    fn missing_file_errors() {
        let result = load_from(Path::new("/nonexistent/config.toml"), None, None, None);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("config error"));
    }
}
