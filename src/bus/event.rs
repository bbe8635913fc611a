//! Sync events - the wire format carried on the bus.
//!
//! Serialized as JSON with a `type` tag plus `key`, `version`, `payload`,
//! `origin` and `timestamp` fields, matching the channel contract exactly.
//! Events are ephemeral: produced on write, consumed at most once per
//! subscriber, never persisted.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::node::NodeIdentity;

/// A fleet-wide notification of a write, a deletion, or node liveness.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncEvent {
    /// A key was written; peers with an older version apply the payload.
    Update {
        key: String,
        version: u64,
        payload: Value,
        origin: String,
        timestamp: i64,
    },

    /// A key was deleted; peers evict their copy.
    Invalidate {
        key: String,
        /// Last version known to the deleting node. Informational: an
        /// invalidation is applied unconditionally, since no authoritative
        /// version remains to compare against.
        version: u64,
        origin: String,
        timestamp: i64,
    },

    /// Periodic node liveness beacon.
    Heartbeat { origin: String, timestamp: i64 },
}

impl SyncEvent {
    pub fn update(node: &NodeIdentity, key: impl Into<String>, version: u64, payload: Value) -> Self {
        Self::Update {
            key: key.into(),
            version,
            payload,
            origin: node.id().to_string(),
            timestamp: now_millis(),
        }
    }

    pub fn invalidate(node: &NodeIdentity, key: impl Into<String>, version: u64) -> Self {
        Self::Invalidate {
            key: key.into(),
            version,
            origin: node.id().to_string(),
            timestamp: now_millis(),
        }
    }

    pub fn heartbeat(node: &NodeIdentity) -> Self {
        Self::Heartbeat {
            origin: node.id().to_string(),
            timestamp: now_millis(),
        }
    }

    /// Originating node id.
    pub fn origin(&self) -> &str {
        match self {
            Self::Update { origin, .. }
            | Self::Invalidate { origin, .. }
            | Self::Heartbeat { origin, .. } => origin,
        }
    }

    /// Key the event refers to, if any.
    pub fn key(&self) -> Option<&str> {
        match self {
            Self::Update { key, .. } | Self::Invalidate { key, .. } => Some(key),
            Self::Heartbeat { .. } => None,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use serde_json::json;

    #[test]
    fn update_round_trips_all_fields() {
        let node = NodeIdentity::generate(Some("lobby-1"));
        let event = SyncEvent::update(&node, "player:42:balance", 7, json!({"gold": 100}));

        let wire = event.to_json().unwrap();
        assert!(wire.contains("\"type\":\"update\""));

        let back = SyncEvent::from_json(&wire).unwrap();
        assert_eq!(back, event);
        assert_eq!(back.origin(), node.id());
        assert_eq!(back.key(), Some("player:42:balance"));
    }

    #[test]
    fn heartbeat_has_no_key() {
        let node = NodeIdentity::generate(None);
        let event = SyncEvent::heartbeat(&node);
        assert_eq!(event.key(), None);
    }

    #[test]
    fn malformed_wire_data_is_a_serialization_error() {
        let result = SyncEvent::from_json("{\"type\":\"update\"");
        assert!(matches!(result, Err(Error::Serialization(_))));
    }
}
