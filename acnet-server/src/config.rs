//! Load config from file and environment.

use acnet_net::TransportConfig;
use serde::Deserialize;
use std::path::PathBuf;

/// Server configuration. File: ~/.config/acnet/server.toml or /etc/acnet/server.toml.
/// Env overrides: ACNET_PORT, ACNET_MAX_CLIENTS, ACNET_TICK_MS.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// TCP listen port (default 7777).
    #[serde(default = "default_port")]
    pub port: u16,
    /// Milliseconds between transport updates (default 30).
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
    #[serde(default)]
    pub transport: TransportConfig,
}

fn default_port() -> u16 {
    7777
}
fn default_tick_ms() -> u64 {
    30
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: default_port(),
            tick_ms: default_tick_ms(),
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
    if let Some(p) = var("ACNET_PORT").and_then(|s| s.parse().ok()) {
        c.port = p;
    }
    if let Some(n) = var("ACNET_MAX_CLIENTS").and_then(|s| s.parse().ok()) {
        c.transport.max_clients = n;
    }
    if let Some(ms) = var("ACNET_TICK_MS").and_then(|s| s.parse().ok()) {
        c.tick_ms = ms;
    }
}

fn config_paths() -> Vec<PathBuf> {
    let mut out = Vec::new();
    if let Some(h) = std::env::var_os("HOME").map(PathBuf::from) {
        out.push(h.join(".config/acnet/server.toml"));
    }
    out.push(PathBuf::from("/etc/acnet/server.toml"));
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
