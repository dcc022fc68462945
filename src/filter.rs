//! Subscription filters in the NIP-01 JSON shape.

use serde::{Deserialize, Serialize};

use crate::event::{KIND_CONTACTS, KIND_METADATA, KIND_TEXT};

/// A request descriptor sent inside `REQ` messages. All present fields are
/// AND-ed together; absent fields are unconstrained and omitted from JSON.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Filter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ids: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kinds: Option<Vec<u32>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authors: Option<Vec<String>>,
    /// Referenced event ids, serialized as the `#e` tag query.
    #[serde(rename = "#e", skip_serializing_if = "Option::is_none")]
    pub events: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub since: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub until: Option<i64>,
}

impl Filter {
    /// Preset matching plain text notes.
    pub fn text() -> Self {
        Filter {
            kinds: Some(vec![KIND_TEXT]),
            ..Filter::default()
        }
    }

    /// Preset matching profile metadata events.
    pub fn profiles() -> Self {
        Filter {
            kinds: Some(vec![KIND_METADATA]),
            ..Filter::default()
        }
    }

    /// Preset matching contact-list events from the given authors.
    pub fn contacts(authors: Vec<String>) -> Self {
        Filter {
            kinds: Some(vec![KIND_CONTACTS]),
            authors: Some(authors),
            ..Filter::default()
        }
    }
}
