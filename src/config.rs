use std::path::PathBuf;
use std::str::FromStr;

use crate::engine::EngineConfig;
use crate::model::ConflictScope;

/// Server settings, read from `SITEGATE_*` environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub bind: String,
    pub data_dir: PathBuf,
    pub password: String,
    pub max_connections: usize,
    pub compact_threshold: u64,
    pub tls_cert: Option<String>,
    pub tls_key: Option<String>,
    pub metrics_port: Option<u16>,
    pub engine: EngineConfig,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Unparseable values fall back to the default.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let scope = |key: &str, default: ConflictScope| {
            match get(key).map(|s| s.parse::<ConflictScope>()) {
                Some(Ok(scope)) => scope,
                Some(Err(e)) => {
                    tracing::warn!("ignoring {key}: {e}");
                    default
                }
                None => default,
            }
        };

        let defaults = EngineConfig::default();
        Self {
            port: parsed(&get, "SITEGATE_PORT").unwrap_or(5433),
            bind: get("SITEGATE_BIND").unwrap_or_else(|| "0.0.0.0".into()),
            data_dir: PathBuf::from(get("SITEGATE_DATA_DIR").unwrap_or_else(|| "./data".into())),
            password: get("SITEGATE_PASSWORD").unwrap_or_else(|| "sitegate".into()),
            max_connections: parsed(&get, "SITEGATE_MAX_CONNECTIONS").unwrap_or(256),
            compact_threshold: parsed(&get, "SITEGATE_COMPACT_THRESHOLD").unwrap_or(1000),
            tls_cert: get("SITEGATE_TLS_CERT"),
            tls_key: get("SITEGATE_TLS_KEY"),
            metrics_port: parsed(&get, "SITEGATE_METRICS_PORT"),
            engine: EngineConfig {
                conflict_scope: scope("SITEGATE_CONFLICT_SCOPE", defaults.conflict_scope),
                free_slot_scope: scope("SITEGATE_FREE_SLOT_SCOPE", defaults.free_slot_scope),
            },
        }
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}

fn parsed<T: FromStr>(get: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = get(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!("ignoring {key}: cannot parse {raw:?}");
            None
        }
    }
}
