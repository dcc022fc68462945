//! Nostr event model and signing.

use secp256k1::{Keypair, Message, Secp256k1};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Kind number for profile metadata events.
pub const KIND_METADATA: u32 = 0;
/// Kind number for plain text notes.
pub const KIND_TEXT: u32 = 1;
/// Kind number for contact-list events.
pub const KIND_CONTACTS: u32 = 3;

/// Wrapper for a Nostr tag expressed as an array of strings.
///
/// Tags appear as small arrays where the first element denotes the type and
/// the following elements hold data, e.g. `["p", "<pubkey>"]` references
/// another author. Each tag is stored verbatim so uncommon or custom tags are
/// preserved.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Tag(pub Vec<String>);

/// Core Nostr event exchanged with relays.
///
/// ```json
/// {
///   "id": "aa11",
///   "pubkey": "fd3f...",
///   "kind": 1,
///   "created_at": 1700000000,
///   "tags": [["p", "887..."]],
///   "content": "hello",
///   "sig": "deadbeef"
/// }
/// ```
///
/// Two events with the same `id` are identical regardless of which relay
/// delivered them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Event {
    /// Event identifier (hex of the SHA-256 canonical hash).
    pub id: String,
    /// Author public key (hex, x-only).
    pub pubkey: String,
    /// Kind number, e.g. `0`, `1` or `3`.
    pub kind: u32,
    /// Unix timestamp of creation.
    pub created_at: i64,
    /// Arbitrary tags such as `p` (pubkey reference).
    pub tags: Vec<Tag>,
    /// Event content body.
    pub content: String,
    /// Schnorr signature over the event hash.
    pub sig: String,
}

/// Errors produced while signing an event.
#[derive(Debug, Error)]
pub enum SignError {
    #[error("private key is empty")]
    EmptyKey,
    #[error("malformed private key: {0}")]
    MalformedKey(String),
    #[error("event serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("signing failed: {0}")]
    Crypto(#[from] secp256k1::Error),
}

impl Event {
    /// Build an unsigned event. `created_at` defaults to the current time
    /// when not given.
    pub fn new(
        content: impl Into<String>,
        pubkey: impl Into<String>,
        kind: u32,
        created_at: Option<i64>,
    ) -> Self {
        Event {
            id: String::new(),
            pubkey: pubkey.into(),
            kind,
            created_at: created_at.unwrap_or_else(unix_now),
            tags: Vec::new(),
            content: content.into(),
            sig: String::new(),
        }
    }

    /// Canonical NIP-01 hash over `[0, pubkey, created_at, kind, tags, content]`.
    pub fn hash(&self) -> Result<[u8; 32], serde_json::Error> {
        let arr = serde_json::json!([
            0,
            self.pubkey,
            self.created_at,
            self.kind,
            self.tags,
            self.content
        ]);
        let data = serde_json::to_vec(&arr)?;
        Ok(Sha256::digest(&data).into())
    }

    /// Fill `id` and `sig` from the given private key (hex). The author
    /// pubkey is derived from the key so the signed event is self-consistent.
    pub fn sign(&mut self, privkey: &str) -> Result<(), SignError> {
        if privkey.is_empty() {
            return Err(SignError::EmptyKey);
        }
        let sk = hex::decode(privkey).map_err(|e| SignError::MalformedKey(e.to_string()))?;
        let secp = Secp256k1::new();
        let kp = Keypair::from_seckey_slice(&secp, &sk)
            .map_err(|e| SignError::MalformedKey(e.to_string()))?;
        self.pubkey = hex::encode(kp.x_only_public_key().0.serialize());
        let hash = self.hash()?;
        self.id = hex::encode(hash);
        let msg = Message::from_digest_slice(&hash)?;
        let sig = secp.sign_schnorr_no_aux_rand(&msg, &kp);
        self.sig = hex::encode(sig.as_ref());
        Ok(())
    }
}

/// Current Unix time in seconds.
pub fn unix_now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Profile metadata decoded from the content of a kind-0 event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Profile {
    pub name: Option<String>,
    pub about: Option<String>,
    pub picture: Option<String>,
}

/// A profile together with the `created_at` of the event that carried it,
/// so conflicting updates for the same author resolve last-write-wins.
#[derive(Debug, Clone, PartialEq)]
pub struct TimestampedProfile {
    pub profile: Profile,
    pub timestamp: i64,
}

/// Decode a profile from event content. Malformed payloads yield `None`;
/// callers treat absence as "ignore this event", never as a fatal error.
pub fn decode_profile(content: &str) -> Option<Profile> {
    serde_json::from_str(content).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use secp256k1::XOnlyPublicKey;

    #[test]
    fn new_defaults_created_at_to_now() {
        let before = unix_now();
        let ev = Event::new("hi", "pk", KIND_TEXT, None);
        assert!(ev.created_at >= before);
        assert_eq!(ev.kind, KIND_TEXT);
        assert!(ev.id.is_empty());
        assert!(ev.sig.is_empty());
    }

    #[test]
    fn new_honors_explicit_created_at() {
        let ev = Event::new("hi", "pk", KIND_TEXT, Some(42));
        assert_eq!(ev.created_at, 42);
    }

    #[test]
    fn sign_fills_id_and_signature() {
        let sk = hex::encode([1u8; 32]);
        let mut ev = Event::new("hello", "", KIND_TEXT, Some(1));
        ev.sign(&sk).unwrap();
        assert_eq!(ev.id, hex::encode(ev.hash().unwrap()));
        assert_eq!(ev.sig.len(), 128);

        // The signature must verify against the derived pubkey.
        let hash = ev.hash().unwrap();
        let secp = Secp256k1::verification_only();
        let msg = Message::from_digest_slice(&hash).unwrap();
        let pk = XOnlyPublicKey::from_slice(&hex::decode(&ev.pubkey).unwrap()).unwrap();
        let sig =
            secp256k1::schnorr::Signature::from_slice(&hex::decode(&ev.sig).unwrap()).unwrap();
        secp.verify_schnorr(&sig, &msg, &pk).unwrap();
    }

    #[test]
    fn sign_rejects_empty_key() {
        let mut ev = Event::new("hello", "pk", KIND_TEXT, Some(1));
        assert!(matches!(ev.sign(""), Err(SignError::EmptyKey)));
    }

    #[test]
    fn sign_rejects_malformed_key() {
        let mut ev = Event::new("hello", "pk", KIND_TEXT, Some(1));
        assert!(matches!(ev.sign("zz"), Err(SignError::MalformedKey(_))));
        // valid hex but not a valid scalar
        let zeros = hex::encode([0u8; 32]);
        assert!(matches!(ev.sign(&zeros), Err(SignError::MalformedKey(_))));
    }

    #[test]
    fn hash_is_deterministic() {
        let ev = Event::new("x", "pk", KIND_TEXT, Some(7));
        assert_eq!(ev.hash().unwrap(), ev.hash().unwrap());
    }

    #[test]
    fn decode_profile_reads_known_fields() {
        let p =
            decode_profile(r#"{"name":"jb","about":"dev","picture":"http://x/y.png"}"#).unwrap();
        assert_eq!(p.name.as_deref(), Some("jb"));
        assert_eq!(p.about.as_deref(), Some("dev"));
        assert_eq!(p.picture.as_deref(), Some("http://x/y.png"));
    }

    #[test]
    fn decode_profile_tolerates_unknown_fields() {
        let p = decode_profile(r#"{"name":"a","nip05":"a@b.c"}"#).unwrap();
        assert_eq!(p.name.as_deref(), Some("a"));
    }

    #[test]
    fn decode_profile_rejects_malformed_payloads() {
        assert!(decode_profile("not json").is_none());
        assert!(decode_profile("[1,2,3]").is_none());
    }
}
