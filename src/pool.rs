//! Relay pool: fan-out of client messages to every connection, fan-in of
//! status changes and protocol frames into one stream tagged with the
//! originating relay id.

use std::collections::HashMap;

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::debug;

use crate::messages::ClientMessage;
use crate::relay::{RelayCapabilities, RelayConnection, RelayEvent};

/// Errors from pool-level operations.
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("relay already registered: {0}")]
    DuplicateRelay(String),
}

/// Owns one [`RelayConnection`] per registered relay. The pool multiplexes
/// outbound messages and demultiplexes inbound occurrences; it never
/// interprets event semantics.
pub struct RelayPool {
    relays: HashMap<String, RelayConnection>,
    events: mpsc::UnboundedSender<(String, RelayEvent)>,
    tor_socks: Option<String>,
}

impl RelayPool {
    /// Create an empty pool and the receiver for its unified event stream.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<(String, RelayEvent)>) {
        RelayPool::with_proxy(None)
    }

    /// Like [`RelayPool::new`] with an optional SOCKS5 proxy applied to
    /// every connection.
    pub fn with_proxy(
        tor_socks: Option<String>,
    ) -> (Self, mpsc::UnboundedReceiver<(String, RelayEvent)>) {
        let (events, rx) = mpsc::unbounded_channel();
        (
            RelayPool {
                relays: HashMap::new(),
                events,
                tor_socks,
            },
            rx,
        )
    }

    /// Register a relay under its URL.
    pub fn add_relay(
        &mut self,
        url: &str,
        capabilities: RelayCapabilities,
    ) -> Result<(), PoolError> {
        if self.relays.contains_key(url) {
            return Err(PoolError::DuplicateRelay(url.to_string()));
        }
        let conn = RelayConnection::new(
            url.to_string(),
            capabilities,
            self.tor_socks.clone(),
            self.events.clone(),
        );
        self.relays.insert(url.to_string(), conn);
        Ok(())
    }

    /// Connect every registered relay, or only the named subset. The subset
    /// form is used for targeted reconnection of one failed relay without
    /// disturbing healthy ones.
    pub fn connect(&self, only: Option<&[String]>) {
        for (id, conn) in &self.relays {
            if only.map_or(true, |ids| ids.iter().any(|i| i == id)) {
                conn.connect();
            }
        }
    }

    /// Broadcast a message to every relay. Write capability is not consulted
    /// here; relays registered write-only or read-only all receive the
    /// message, and per-connection queue/drop semantics apply.
    pub fn send(&self, msg: &ClientMessage) {
        for conn in self.relays.values() {
            conn.send(msg);
        }
    }

    /// Send a message to a single relay by id. Unknown ids are ignored.
    pub fn send_to(&self, relay_id: &str, msg: &ClientMessage) {
        match self.relays.get(relay_id) {
            Some(conn) => conn.send(msg),
            None => debug!(relay = %relay_id, "send_to: unknown relay"),
        }
    }

    pub fn relay_ids(&self) -> Vec<String> {
        self.relays.keys().cloned().collect()
    }

    /// Tear down every connection. Transport tasks are aborted, so no
    /// further occurrences are emitted once this returns.
    pub fn shutdown(&mut self) {
        for conn in self.relays.values() {
            conn.abort();
        }
    }
}
