//! Multi-relay Nostr client. Maintains concurrent WebSocket connections to
//! independent relays, issues time-windowed subscriptions, and reconciles the
//! resulting event streams (dedup, per-kind watermarks, profile and contact
//! merging) into a single view-ready feed.

pub mod client;
pub mod config;
pub mod engine;
pub mod event;
pub mod filter;
pub mod messages;
pub mod pool;
pub mod relay;
