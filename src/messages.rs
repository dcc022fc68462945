//! Wire messages exchanged with relays as NIP-01 JSON arrays.

use serde_json::{json, Value};

use crate::event::Event;
use crate::filter::Filter;

/// A named registration of filters against one relay connection. Closed when
/// superseded or when the owning connection drops; reopened (with a fresh id)
/// on reconnect.
#[derive(Debug, Clone, PartialEq)]
pub struct Subscription {
    pub sub_id: String,
    pub filters: Vec<Filter>,
}

/// Messages the client sends to a relay.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    /// Publish an event: `["EVENT", {..}]`.
    Event(Event),
    /// Open a subscription: `["REQ", <sub_id>, <filter>...]`.
    Subscribe(Subscription),
    /// Close a subscription: `["CLOSE", <sub_id>]`.
    Unsubscribe(String),
}

impl ClientMessage {
    /// Encode as a NIP-01 JSON array.
    pub fn to_json(&self) -> String {
        match self {
            ClientMessage::Event(ev) => json!(["EVENT", ev]).to_string(),
            ClientMessage::Subscribe(sub) => {
                let mut arr = vec![json!("REQ"), json!(sub.sub_id)];
                for filter in &sub.filters {
                    arr.push(json!(filter));
                }
                Value::Array(arr).to_string()
            }
            ClientMessage::Unsubscribe(sub_id) => json!(["CLOSE", sub_id]).to_string(),
        }
    }
}

/// Protocol frames a relay sends back.
#[derive(Debug, Clone, PartialEq)]
pub enum RelayMessage {
    /// `["EVENT", <sub_id>, {..}]`
    Event(String, Event),
    /// `["NOTICE", <message>]`
    Notice(String),
}

impl RelayMessage {
    /// Parse a relay frame. Unknown or malformed shapes yield `None` so new
    /// message kinds from newer relays are skipped rather than treated as
    /// errors.
    pub fn from_json(txt: &str) -> Option<RelayMessage> {
        let val: Value = serde_json::from_str(txt).ok()?;
        let arr = val.as_array()?;
        match arr.first()?.as_str()? {
            "EVENT" if arr.len() >= 3 => {
                let sub_id = arr.get(1)?.as_str()?.to_string();
                let ev = serde_json::from_value(arr.get(2)?.clone()).ok()?;
                Some(RelayMessage::Event(sub_id, ev))
            }
            "NOTICE" if arr.len() >= 2 => {
                Some(RelayMessage::Notice(arr.get(1)?.as_str()?.to_string()))
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::KIND_TEXT;

    fn sample_event() -> Event {
        Event {
            id: "aa11".into(),
            pubkey: "p1".into(),
            kind: KIND_TEXT,
            created_at: 1,
            tags: vec![],
            content: "hi".into(),
            sig: String::new(),
        }
    }

    #[test]
    fn encodes_event_message() {
        let msg = ClientMessage::Event(sample_event());
        let val: Value = serde_json::from_str(&msg.to_json()).unwrap();
        assert_eq!(val[0], "EVENT");
        assert_eq!(val[1]["id"], "aa11");
        assert_eq!(val[1]["content"], "hi");
    }

    #[test]
    fn encodes_subscribe_with_all_filters() {
        let sub = Subscription {
            sub_id: "s1".into(),
            filters: vec![Filter::text(), Filter::contacts(vec!["me".into()])],
        };
        let val: Value = serde_json::from_str(&ClientMessage::Subscribe(sub).to_json()).unwrap();
        assert_eq!(val[0], "REQ");
        assert_eq!(val[1], "s1");
        assert_eq!(val[2]["kinds"][0], 1);
        assert_eq!(val[3]["kinds"][0], 3);
        assert_eq!(val[3]["authors"][0], "me");
        assert_eq!(val.as_array().unwrap().len(), 4);
    }

    #[test]
    fn encodes_unsubscribe() {
        let val: Value =
            serde_json::from_str(&ClientMessage::Unsubscribe("s1".into()).to_json()).unwrap();
        assert_eq!(val, serde_json::json!(["CLOSE", "s1"]));
    }

    #[test]
    fn parses_event_frame() {
        let txt = json!(["EVENT", "sub", sample_event()]).to_string();
        match RelayMessage::from_json(&txt) {
            Some(RelayMessage::Event(sub_id, ev)) => {
                assert_eq!(sub_id, "sub");
                assert_eq!(ev.id, "aa11");
            }
            other => panic!("unexpected parse: {other:?}"),
        }
    }

    #[test]
    fn parses_notice_frame() {
        let txt = json!(["NOTICE", "slow down"]).to_string();
        assert_eq!(
            RelayMessage::from_json(&txt),
            Some(RelayMessage::Notice("slow down".into()))
        );
    }

    #[test]
    fn unknown_frames_are_skipped() {
        assert!(RelayMessage::from_json(&json!(["EOSE", "sub"]).to_string()).is_none());
        assert!(RelayMessage::from_json(&json!(["OK", "id", true]).to_string()).is_none());
        assert!(RelayMessage::from_json("not json").is_none());
        assert!(RelayMessage::from_json("{}").is_none());
        // EVENT with a malformed body
        assert!(RelayMessage::from_json(&json!(["EVENT", "sub", {"id": 5}]).to_string()).is_none());
        // EVENT missing the body entirely
        assert!(RelayMessage::from_json(&json!(["EVENT", "sub"]).to_string()).is_none());
    }
}
