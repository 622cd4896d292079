//! Group identity for cliprelay.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a sharing group.
///
/// Clients derive it from their shared secret (the relay never sees the
/// secret) and every client presenting the same key hash sees the others'
/// relayed payloads. Never empty.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyHash(String);

impl KeyHash {
    /// Create a KeyHash, rejecting the empty string.
    pub fn new(value: impl Into<String>) -> Option<Self> {
        let value = value.into();
        if value.is_empty() {
            None
        } else {
            Some(Self(value))
        }
    }

    /// Get the key hash as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for KeyHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for KeyHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix: String = self.0.chars().take(8).collect();
        write!(f, "KeyHash({prefix})")
    }
}

impl PartialEq<str> for KeyHash {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_key_rejected() {
        assert!(KeyHash::new("").is_none());
        assert!(KeyHash::new(String::new()).is_none());
    }

    #[test]
    fn key_compares_with_str() {
        let key = KeyHash::new("abc").unwrap();
        assert!(key == *"abc");
        assert!(key != *"abd");
        assert_eq!(key.as_str(), "abc");
    }

    #[test]
    fn debug_truncates() {
        let key = KeyHash::new("0123456789abcdef0123456789abcdef").unwrap();
        let debug = format!("{:?}", key);
        assert_eq!(debug, "KeyHash(01234567)");
        assert_eq!(key.to_string(), "0123456789abcdef0123456789abcdef");
    }

    #[test]
    fn debug_short_key() {
        let key = KeyHash::new("ab").unwrap();
        assert_eq!(format!("{:?}", key), "KeyHash(ab)");
    }

    #[test]
    fn serializes_as_plain_string() {
        let key = KeyHash::new("abc").unwrap();
        assert_eq!(serde_json::to_string(&key).unwrap(), "\"abc\"");
        let restored: KeyHash = serde_json::from_str("\"abc\"").unwrap();
        assert_eq!(restored, key);
    }
}
