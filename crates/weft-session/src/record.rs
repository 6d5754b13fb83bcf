//! Persisted session records.
//!
//! A stored entry has the shape
//!
//! ```json
//! {
//!   "session": {
//!     "data":   { "...application fields...": 1 },
//!     "scenes": { "current": "greeter", "state": {}, "expires": null, "cursor": 0 }
//!   },
//!   "expires": 1735689600000
//! }
//! ```
//!
//! Application data and scene bookkeeping live side by side, so user fields
//! can never collide with the scene manager's.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The live, mutable part of a session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Application data.
    #[serde(default)]
    pub data: Map<String, Value>,
    /// Scene manager state, present while a scene has been used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scenes: Option<SceneSession>,
}

impl SessionRecord {
    pub fn is_empty(&self) -> bool {
        self.data.is_empty() && self.scenes.is_none()
    }
}

/// Scene bookkeeping nested in a [`SessionRecord`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SceneSession {
    /// Id of the active scene.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current: Option<String>,
    /// Scene-local state.
    #[serde(default)]
    pub state: Map<String, Value>,
    /// Epoch milliseconds after which the scene is void.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<u64>,
    /// Wizard step cursor.
    #[serde(default)]
    pub cursor: usize,
}

/// A record as held by a store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoredSession {
    pub session: SessionRecord,
    /// Epoch milliseconds after which the record is discarded.
    #[serde(default)]
    pub expires: Option<u64>,
}

impl StoredSession {
    pub fn new(session: SessionRecord, expires: Option<u64>) -> Self {
        Self { session, expires }
    }

    /// Returns `true` once `now_ms` has reached the expiry.
    pub fn is_expired(&self, now_ms: u64) -> bool {
        self.expires.is_some_and(|expires| expires <= now_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wire_shape() {
        let stored: StoredSession = serde_json::from_value(json!({
            "session": { "data": { "count": 2 }, "scenes": { "current": "a" } },
            "expires": null
        }))
        .unwrap();
        assert_eq!(stored.session.data["count"], json!(2));
        let scenes = stored.session.scenes.as_ref().unwrap();
        assert_eq!(scenes.current.as_deref(), Some("a"));
        assert_eq!(scenes.cursor, 0);
        assert!(!stored.is_expired(u64::MAX));
    }

    #[test]
    fn test_expiry_boundary() {
        let stored = StoredSession::new(SessionRecord::default(), Some(1_000));
        assert!(!stored.is_expired(999));
        assert!(stored.is_expired(1_000));
    }
}
