//! Normalized identity handles and scope helpers.

use serde::{Deserialize, Serialize};

/// Scope name that applies across every channel; the owner role lives here.
pub const WILDCARD_SCOPE: &str = "*";

/// Canonical form of a scope name. Channel names compare case-insensitively.
pub fn fold_scope(scope: &str) -> String {
    scope.to_ascii_lowercase()
}

/// Whether a message target names a channel rather than a private recipient.
pub fn is_channel(target: &str) -> bool {
    target.starts_with('#') || target.starts_with('&')
}

/// Durable identity key derived from a protocol address.
///
/// A handle is always `~user@host`: the leading `~` is added when absent so
/// that addresses reported with and without ident prefixes compare equal.
/// The mutable display nickname never participates.
///
/// # Examples
///
/// ```
/// use warden_core::Handle;
///
/// let from_reply = Handle::from_user_host("alice", "example.com");
/// let from_source = Handle::from_source("Bob!~alice@example.com").unwrap();
/// assert_eq!(from_reply, from_source);
/// assert_eq!(from_reply.as_str(), "~alice@example.com");
/// ```
#[derive(
    Debug,
    Clone,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    derive_more::Display,
)]
#[serde(from = "String", into = "String")]
pub struct Handle(String);

impl Handle {
    /// Normalize a raw `user@host` string.
    pub fn normalize(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.starts_with('~') {
            Self(raw.to_string())
        } else {
            Self(format!("~{}", raw))
        }
    }

    /// Build a handle from the user and host fields of an identity reply.
    pub fn from_user_host(user: &str, host: &str) -> Self {
        Self::normalize(&format!("{}@{}", user, host))
    }

    /// Extract the handle from a `nick!user@host` source address.
    ///
    /// Returns `None` when the source carries no `user@host` part, as is the
    /// case for server-originated events.
    pub fn from_source(source: &str) -> Option<Self> {
        let (_, address) = source.split_once('!')?;
        if address.is_empty() || !address.contains('@') {
            return None;
        }
        Some(Self::normalize(address))
    }

    /// The normalized handle text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for Handle {
    fn from(raw: String) -> Self {
        Self::normalize(&raw)
    }
}

impl From<&str> for Handle {
    fn from(raw: &str) -> Self {
        Self::normalize(raw)
    }
}

impl From<Handle> for String {
    fn from(handle: Handle) -> Self {
        handle.0
    }
}

impl AsRef<str> for Handle {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fold_scope() {
        assert_eq!(fold_scope("#Rust"), "#rust");
        assert_eq!(fold_scope(WILDCARD_SCOPE), WILDCARD_SCOPE);
    }

    #[test]
    fn test_normalize_adds_tilde_once() {
        assert_eq!(Handle::normalize("bob@host").as_str(), "~bob@host");
        assert_eq!(Handle::normalize("~bob@host").as_str(), "~bob@host");
    }

    #[test]
    fn test_from_source_requires_address() {
        assert!(Handle::from_source("irc.example.net").is_none());
        assert!(Handle::from_source("nick!").is_none());
        assert!(Handle::from_source("nick!user").is_none());
        assert_eq!(
            Handle::from_source("nick!user@host").unwrap().as_str(),
            "~user@host"
        );
    }

    #[test]
    fn test_deserialize_normalizes() {
        let handle: Handle = serde_json::from_str("\"carol@example.org\"").unwrap();
        assert_eq!(handle.as_str(), "~carol@example.org");
        assert_eq!(
            serde_json::to_string(&handle).unwrap(),
            "\"~carol@example.org\""
        );
    }

    #[test]
    fn test_channel_detection() {
        assert!(is_channel("#rust"));
        assert!(is_channel("&local"));
        assert!(!is_channel("warden"));
    }
}
