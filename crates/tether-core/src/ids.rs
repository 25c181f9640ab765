//! Connection identity.
//!
//! Connections are keyed by a caller-supplied string (for example `"feed"`
//! or `"draft:42"`). The newtype keeps those keys from being confused with
//! endpoints or reasons, which are also plain strings.

use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Caller-supplied identifier, unique within one manager.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(String);

impl ConnectionId {
    /// Create from any string-like value.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Return the inner string as a slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume self and return the inner `String`.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl std::ops::Deref for ConnectionId {
    type Target = str;
    fn deref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for ConnectionId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for ConnectionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ConnectionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ConnectionId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<&ConnectionId> for ConnectionId {
    fn from(id: &ConnectionId) -> Self {
        id.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn display_is_raw_string() {
        let id = ConnectionId::new("feed");
        assert_eq!(id.to_string(), "feed");
    }

    #[test]
    fn serde_is_transparent() {
        let id = ConnectionId::from("draft:42");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"draft:42\"");
        let back: ConnectionId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn map_lookup_by_str() {
        let mut map = HashMap::new();
        let _ = map.insert(ConnectionId::from("feed"), 1);
        assert_eq!(map.get("feed"), Some(&1));
        assert!(map.get("other").is_none());
    }

    #[test]
    fn deref_to_str() {
        let id = ConnectionId::from(String::from("presence"));
        assert!(id.starts_with("pres"));
        assert_eq!(id.as_str(), "presence");
        assert_eq!(id.into_inner(), "presence");
    }
}
