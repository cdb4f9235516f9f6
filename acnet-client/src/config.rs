//! Load config from file and environment.

use acnet_net::TransportConfig;
use serde::Deserialize;
use std::path::PathBuf;

/// Client configuration. File: ~/.config/acnet/client.toml or /etc/acnet/client.toml.
/// Env overrides: ACNET_HOST, ACNET_PORT, ACNET_PRODUCT_USER_ID, ACNET_TOKEN, ACNET_PLATFORM.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Server host name or address (default 127.0.0.1).
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
    #[serde(default)]
    pub product_user_id: String,
    #[serde(default)]
    pub token: String,
    /// Platform name as accepted by `Platform::from_str` (default "unknown").
    #[serde(default = "default_platform")]
    pub platform: String,
    #[serde(default)]
    pub transport: TransportConfig,
}

fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_port() -> u16 {
    7777
}
fn default_tick_ms() -> u64 {
    30
}
fn default_platform() -> String {
    "unknown".into()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            tick_ms: default_tick_ms(),
            product_user_id: String::new(),
            token: String::new(),
            platform: default_platform(),
            transport: TransportConfig::default(),
        }
    }
}

/// Load config: defaults, then the first config file found, then env vars.
pub fn load() -> Config {
    let mut c = load_file().unwrap_or_default();
    apply_env(&mut c, |key| std::env::var(key).ok());
    c
}

fn apply_env(c: &mut Config, var: impl Fn(&str) -> Option<String>) {
    if let Some(h) = var("ACNET_HOST") {
        c.host = h;
    }
    if let Some(p) = var("ACNET_PORT").and_then(|s| s.parse().ok()) {
        c.port = p;
    }
    if let Some(id) = var("ACNET_PRODUCT_USER_ID") {
        c.product_user_id = id;
    }
    if let Some(t) = var("ACNET_TOKEN") {
        c.token = t;
    }
    if let Some(p) = var("ACNET_PLATFORM") {
        c.platform = p;
    }
}

fn config_paths() -> Vec<PathBuf> {
    let mut out = Vec::new();
    if let Some(h) = std::env::var_os("HOME").map(PathBuf::from) {
        out.push(h.join(".config/acnet/client.toml"));
    }
    out.push(PathBuf::from("/etc/acnet/client.toml"));
    out
}

fn load_file() -> Option<Config> {
    let path = config_paths().into_iter().find(|p| p.exists())?;
    let text = match std::fs::read_to_string(&path) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!("cannot read {}: {}", path.display(), e);
            return None;
        }
    };
    match toml::from_str::<Config>(&text) {
        Ok(c) => {
            tracing::info!("loaded config from {}", path.display());
            Some(c)
        }
        Err(e) => {
            tracing::warn!("ignoring {}: {}", path.display(), e);
            None
        }
    }
}
