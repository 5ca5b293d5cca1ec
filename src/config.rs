use std::{env, path::PathBuf, time::Duration};

use async_trait::async_trait;
use dashmap::DashMap;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Env key for the fixed delay between backend restarts, in milliseconds.
pub const RESTART_DELAY_MS_KEY: &str = "ROUTER_RESTART_DELAY_MS";
/// Env key for the optional cap on restarts per backend.
pub const MAX_RESTARTS_KEY: &str = "ROUTER_MAX_RESTARTS";
/// Env key for how long the stop path waits on each worker, in milliseconds.
pub const STOP_TIMEOUT_MS_KEY: &str = "ROUTER_STOP_TIMEOUT_MS";

#[async_trait]
#[typetag::serde]
pub trait ConfigManagerType: Send + Sync {
    async fn keys(&self) -> Vec<String>;
    async fn get(&self, key: &str) -> Option<String>;
    fn clone_box(&self) -> Box<dyn ConfigManagerType>;
    fn debug_box(&self) -> String;
}

#[derive(Serialize, Deserialize)]
pub struct ConfigManager(pub Box<dyn ConfigManagerType>);

impl ConfigManager {
    pub fn into_inner(self) -> Box<dyn ConfigManagerType> {
        self.0
    }
}

impl Clone for ConfigManager {
    fn clone(&self) -> Self {
        ConfigManager(self.0.clone_box())
    }
}

impl std::fmt::Debug for ConfigManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0.debug_box())
    }
}

/// Reads configuration from the process environment, optionally seeded
/// from a `.env` file.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EnvConfigManager {
    env_file: PathBuf,
}

impl EnvConfigManager {
    pub fn new(env_file: PathBuf) -> Box<Self> {
        if env_file.exists() {
            dotenvy::from_path(env_file.clone()).ok();
            info!("Loaded .env from {}", env_file.display());
        } else {
            warn!("no .env at {}, using process environment only", env_file.display())
        }

        Box::new(Self { env_file })
    }
}

#[typetag::serde]
#[async_trait]
impl ConfigManagerType for EnvConfigManager {
    async fn keys(&self) -> Vec<String> {
        env::vars().map(|(k, _)| k).collect()
    }

    async fn get(&self, key: &str) -> Option<String> {
        env::var(key).ok()
    }

    fn clone_box(&self) -> Box<dyn ConfigManagerType> {
        Box::new(self.clone())
    }

    fn debug_box(&self) -> String {
        "EnvConfigManager".to_string()
    }
}

/// In-memory configuration, mostly for tests.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
pub struct MapConfigManager {
    #[schemars(with = "std::collections::HashMap<String, String>")]
    map: DashMap<String, String>,
}

impl MapConfigManager {
    pub fn new() -> Box<Self> {
        Box::new(Self {
            map: DashMap::new(),
        })
    }

    pub fn insert(&self, key: &str, value: &str) {
        self.map.insert(key.to_string(), value.to_string());
    }
}

#[typetag::serde]
#[async_trait]
impl ConfigManagerType for MapConfigManager {
    async fn keys(&self) -> Vec<String> {
        self.map.iter().map(|entry| entry.key().clone()).collect()
    }

    async fn get(&self, key: &str) -> Option<String> {
        self.map.get(key).map(|v| v.clone())
    }

    fn clone_box(&self) -> Box<dyn ConfigManagerType> {
        Box::new(self.clone())
    }

    fn debug_box(&self) -> String {
        format!("MapConfigManager({} entries)", self.map.len())
    }
}

/// Router tunables. The restart policy is explicit configuration rather
/// than constants buried in the supervision loop.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RouterConfig {
    /// Fixed delay between restarts of a failed backend.
    pub restart_delay: Duration,
    /// Cap on restarts per backend; `None` restarts forever.
    pub max_restarts: Option<u32>,
    /// How long the stop path waits for each worker before abandoning it.
    pub stop_timeout: Duration,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            restart_delay: Duration::from_secs(5),
            max_restarts: None,
            stop_timeout: Duration::from_secs(5),
        }
    }
}

impl RouterConfig {
    /// Resolve the config from a `ConfigManager`, falling back to defaults
    /// for anything missing or unparsable.
    pub async fn from_config(cfg: &ConfigManager) -> Self {
        let mut out = Self::default();

        if let Some(raw) = cfg.0.get(RESTART_DELAY_MS_KEY).await {
            match raw.parse::<u64>() {
                Ok(ms) => out.restart_delay = Duration::from_millis(ms),
                Err(_) => warn!(key = RESTART_DELAY_MS_KEY, value = %raw, "ignoring unparsable config value"),
            }
        }
        if let Some(raw) = cfg.0.get(MAX_RESTARTS_KEY).await {
            match raw.parse::<u32>() {
                Ok(n) => out.max_restarts = Some(n),
                Err(_) => warn!(key = MAX_RESTARTS_KEY, value = %raw, "ignoring unparsable config value"),
            }
        }
        if let Some(raw) = cfg.0.get(STOP_TIMEOUT_MS_KEY).await {
            match raw.parse::<u64>() {
                Ok(ms) => out.stop_timeout = Duration::from_millis(ms),
                Err(_) => warn!(key = STOP_TIMEOUT_MS_KEY, value = %raw, "ignoring unparsable config value"),
            }
        }

        out
    }
}
