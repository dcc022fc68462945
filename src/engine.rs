//! Event-reconciliation engine. Consumes the pool's unified stream,
//! deduplicates events delivered by multiple relays, maintains per-kind
//! watermarks, merges profile and contact state, and keeps the feed sorted
//! newest-first.
//!
//! The engine owns its state exclusively; everything external goes through
//! the query methods or the [`Action`] values it returns.

use std::collections::{HashMap, HashSet};

use tracing::{debug, info};
use uuid::Uuid;

use crate::event::{
    decode_profile, unix_now, Event, Profile, SignError, TimestampedProfile, KIND_CONTACTS,
    KIND_METADATA, KIND_TEXT,
};
use crate::filter::Filter;
use crate::messages::{ClientMessage, RelayMessage, Subscription};
use crate::relay::{RelayEvent, RelayStatus};

/// Overlap subtracted from watermark cursors to absorb clock skew and
/// delivery jitter across relays.
const SINCE_OVERLAP: i64 = 600;
/// Initial backfill window used before any text note has been seen.
const INITIAL_BACKFILL: i64 = 4 * 24 * 60 * 60;

/// Authors whose text notes are never shown.
const DENYLIST: &[&str] = &["887645fef0ce0c3c1218d2f5d8e6132a19304cdc57cd20281d082f38cfea0072"];

/// Which slice of the feed the presentation layer wants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeline {
    Friends,
    Global,
}

/// Instructions for the pool produced while reconciling an inbound
/// occurrence. The engine never talks to connections directly; the driver
/// applies these.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Send a message to one relay.
    Send {
        relay_id: String,
        message: ClientMessage,
    },
    /// Broadcast a message to every relay.
    Broadcast(ClientMessage),
    /// Ask the pool to reconnect a single relay.
    Reconnect(String),
}

/// Reconciliation state for one session.
pub struct Engine {
    pubkey: String,
    privkey: Option<String>,
    /// Event ids already applied; enforces at-most-once semantics. Grows
    /// for the whole session.
    seen: HashSet<String>,
    /// Most recent event per kind, by `created_at`. Drives `since` cursors
    /// on resubscription.
    last_event_of_kind: HashMap<u32, Event>,
    profiles: HashMap<String, TimestampedProfile>,
    friends: HashSet<String>,
    feed: Vec<Event>,
    loading: bool,
    timeline: Timeline,
}

impl Engine {
    pub fn new(pubkey: String, privkey: Option<String>) -> Self {
        Engine {
            pubkey,
            privkey,
            seen: HashSet::new(),
            last_event_of_kind: HashMap::new(),
            profiles: HashMap::new(),
            friends: HashSet::new(),
            feed: Vec::new(),
            loading: true,
            timeline: Timeline::Friends,
        }
    }

    /// Reconcile one inbound occurrence against the current time.
    pub fn handle(&mut self, relay_id: &str, event: RelayEvent) -> Vec<Action> {
        self.handle_at(relay_id, event, unix_now())
    }

    /// Reconcile one inbound occurrence with an explicit current time.
    pub fn handle_at(&mut self, relay_id: &str, event: RelayEvent, now: i64) -> Vec<Action> {
        match event {
            RelayEvent::Status(RelayStatus::Connected) => {
                let sub = self.subscription_at(now);
                debug!(relay = %relay_id, sub_id = %sub.sub_id, "subscribing");
                vec![Action::Send {
                    relay_id: relay_id.to_string(),
                    message: ClientMessage::Subscribe(sub),
                }]
            }
            RelayEvent::Status(RelayStatus::Disconnected)
            | RelayEvent::Status(RelayStatus::Cancelled)
            | RelayEvent::Status(RelayStatus::ReconnectSuggested(true)) => {
                vec![Action::Reconnect(relay_id.to_string())]
            }
            RelayEvent::Status(RelayStatus::ReconnectSuggested(false)) => Vec::new(),
            RelayEvent::Frame(RelayMessage::Event(_, ev)) => {
                self.apply_event(ev);
                Vec::new()
            }
            RelayEvent::Frame(RelayMessage::Notice(msg)) => {
                info!(relay = %relay_id, notice = %msg, "relay notice");
                Vec::new()
            }
        }
    }

    /// Build the per-relay subscription, re-deriving fresh `since` cursors
    /// from the watermark table. Each call mints a new globally unique
    /// subscription id.
    fn subscription_at(&self, now: i64) -> Subscription {
        let mut text = Filter::text();
        text.since = Some(self.text_since(now));

        let mut profiles = Filter::profiles();
        profiles.since = self.metadata_since();

        // Only the local user's contact list is authoritative.
        let contacts = Filter::contacts(vec![self.pubkey.clone()]);

        Subscription {
            sub_id: Uuid::new_v4().to_string(),
            filters: vec![text, profiles, contacts],
        }
    }

    fn text_since(&self, now: i64) -> i64 {
        match self.last_event_of_kind.get(&KIND_TEXT) {
            Some(ev) => ev.created_at - SINCE_OVERLAP,
            None => now - INITIAL_BACKFILL,
        }
    }

    fn metadata_since(&self) -> Option<i64> {
        self.last_event_of_kind
            .get(&KIND_METADATA)
            .map(|ev| ev.created_at - SINCE_OVERLAP)
    }

    /// Apply one protocol event: dedup, watermark, then kind dispatch.
    fn apply_event(&mut self, ev: Event) {
        self.loading = false;
        if !self.seen.insert(ev.id.clone()) {
            return;
        }

        let newer = self
            .last_event_of_kind
            .get(&ev.kind)
            .map_or(true, |last| ev.created_at > last.created_at);
        if newer {
            self.last_event_of_kind.insert(ev.kind, ev.clone());
        }

        match ev.kind {
            KIND_TEXT => {
                if !self.should_hide(&ev) {
                    self.feed.push(ev);
                }
                self.feed
                    .sort_by(|a, b| b.created_at.cmp(&a.created_at));
            }
            KIND_METADATA => self.merge_profile(ev),
            KIND_CONTACTS => self.merge_contacts(&ev),
            _ => {}
        }
    }

    /// Last-write-wins on `created_at`; the stored profile is replaced only
    /// by a strictly newer one, independent of arrival order.
    fn merge_profile(&mut self, ev: Event) {
        let Some(profile) = decode_profile(&ev.content) else {
            debug!(author = %ev.pubkey, "discarding malformed profile");
            return;
        };
        if let Some(existing) = self.profiles.get(&ev.pubkey) {
            if existing.timestamp >= ev.created_at {
                return;
            }
        }
        self.profiles.insert(
            ev.pubkey,
            TimestampedProfile {
                profile,
                timestamp: ev.created_at,
            },
        );
    }

    /// Additive merge of the self-authored contact list. Contact lists from
    /// other authors are ignored; entries are never removed.
    fn merge_contacts(&mut self, ev: &Event) {
        if ev.pubkey != self.pubkey {
            return;
        }
        for tag in &ev.tags {
            if tag.0.len() > 1 && tag.0[0] == "p" {
                self.friends.insert(tag.0[1].clone());
            }
        }
    }

    fn should_hide(&self, ev: &Event) -> bool {
        DENYLIST.contains(&ev.pubkey.as_str())
    }

    /// Sign a text note with the configured key and broadcast it.
    pub fn compose_post(&self, content: &str) -> Result<Action, SignError> {
        let privkey = self.privkey.clone().unwrap_or_default();
        let mut ev = Event::new(content, self.pubkey.clone(), KIND_TEXT, None);
        ev.sign(&privkey)?;
        Ok(Action::Broadcast(ClientMessage::Event(ev)))
    }

    /// The feed visible under the current timeline mode, newest first, each
    /// event paired with the author's resolved profile if known.
    pub fn visible_feed(&self) -> Vec<(&Event, Option<&Profile>)> {
        self.feed
            .iter()
            .filter(|ev| self.is_visible(ev))
            .map(|ev| {
                (
                    ev,
                    self.profiles.get(&ev.pubkey).map(|tp| &tp.profile),
                )
            })
            .collect()
    }

    fn is_visible(&self, ev: &Event) -> bool {
        match self.timeline {
            Timeline::Global => true,
            Timeline::Friends => self.is_friend(&ev.pubkey),
        }
    }

    /// True for the local user and everyone on the contact list.
    pub fn is_friend(&self, pubkey: &str) -> bool {
        pubkey == self.pubkey || self.friends.contains(pubkey)
    }

    pub fn profile(&self, pubkey: &str) -> Option<&TimestampedProfile> {
        self.profiles.get(pubkey)
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn timeline(&self) -> Timeline {
        self.timeline
    }

    pub fn set_timeline(&mut self, timeline: Timeline) {
        self.timeline = timeline;
    }
}
