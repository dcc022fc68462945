//! Driver joining the relay pool and the reconciliation engine. All relay
//! deliveries pass through one consumer loop here, so engine state is only
//! ever touched by a single logical actor.

use tokio::sync::mpsc;

use crate::config::Settings;
use crate::engine::{Action, Engine};
use crate::event::SignError;
use crate::pool::{PoolError, RelayPool};
use crate::relay::{RelayCapabilities, RelayEvent};

pub struct Client {
    pool: RelayPool,
    engine: Engine,
    events: mpsc::UnboundedReceiver<(String, RelayEvent)>,
}

impl Client {
    /// Build a client from settings, registering every configured relay as
    /// read/write.
    pub fn new(settings: &Settings) -> Result<Self, PoolError> {
        let (mut pool, events) = RelayPool::with_proxy(settings.tor_socks.clone());
        for url in &settings.relays {
            pool.add_relay(url, RelayCapabilities::read_write())?;
        }
        let engine = Engine::new(settings.pubkey.clone(), settings.privkey.clone());
        Ok(Client {
            pool,
            engine,
            events,
        })
    }

    /// Open connections to every registered relay.
    pub fn connect(&self) {
        self.pool.connect(None);
    }

    /// Process one inbound occurrence and apply whatever the engine decided.
    /// Returns the occurrence so callers can react to it, or `None` once the
    /// stream is closed.
    pub async fn handle_next(&mut self) -> Option<(String, RelayEvent)> {
        let (relay_id, event) = self.events.recv().await?;
        let actions = self.engine.handle(&relay_id, event.clone());
        self.apply(actions);
        Some((relay_id, event))
    }

    fn apply(&self, actions: Vec<Action>) {
        for action in actions {
            match action {
                Action::Send { relay_id, message } => self.pool.send_to(&relay_id, &message),
                Action::Broadcast(message) => self.pool.send(&message),
                Action::Reconnect(relay_id) => self.pool.connect(Some(&[relay_id])),
            }
        }
    }

    /// Sign a text note with the configured key and broadcast it to every
    /// relay.
    pub fn post(&self, content: &str) -> Result<(), SignError> {
        let action = self.engine.compose_post(content)?;
        self.apply(vec![action]);
        Ok(())
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut Engine {
        &mut self.engine
    }

    /// Tear down every connection. No occurrence is processed after this
    /// returns.
    pub fn shutdown(&mut self) {
        self.pool.shutdown();
        self.events.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(relays: Vec<String>) -> Settings {
        Settings {
            relays,
            pubkey: "me".into(),
            privkey: None,
            tor_socks: None,
        }
    }

    #[tokio::test]
    async fn duplicate_relay_urls_are_rejected() {
        let cfg = settings(vec!["ws://one".into(), "ws://one".into()]);
        assert!(matches!(
            Client::new(&cfg),
            Err(PoolError::DuplicateRelay(_))
        ));
    }

    #[tokio::test]
    async fn post_without_key_fails() {
        let mut client = Client::new(&settings(vec![])).unwrap();
        assert!(matches!(client.post("hi"), Err(SignError::EmptyKey)));
        client.shutdown();
    }
}
