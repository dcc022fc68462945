//! Configuration loading from `.env` files.

use std::env;

use anyhow::{Context, Result};

/// Runtime settings derived from environment variables.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Relay endpoints to connect to, e.g. `wss://relay.example.com`.
    pub relays: Vec<String>,
    /// Local identity public key (hex, x-only).
    pub pubkey: String,
    /// Optional private key (hex) for signing outgoing notes.
    pub privkey: Option<String>,
    /// Optional Tor SOCKS proxy (host:port).
    pub tor_socks: Option<String>,
}

impl Settings {
    /// Load settings from the specified `.env` file.
    pub fn from_env(path: &str) -> Result<Self> {
        dotenvy::from_filename(path).context("reading env file")?;
        let relays = csv_strings(env::var("RELAYS").unwrap_or_default());
        let pubkey = env::var("PUBKEY").context("PUBKEY is required")?;
        let privkey = env::var("PRIVKEY").ok().filter(|s| !s.is_empty());
        let tor_socks = env::var("TOR_SOCKS").ok().filter(|s| !s.is_empty());
        Ok(Self {
            relays,
            pubkey,
            privkey,
            tor_socks,
        })
    }
}

/// Split a comma-separated string into trimmed string values.
pub fn csv_strings(input: impl AsRef<str>) -> Vec<String> {
    input
        .as_ref()
        .split(',')
        .filter_map(|s| {
            let t = s.trim();
            if t.is_empty() {
                None
            } else {
                Some(t.to_string())
            }
        })
        .collect()
}
