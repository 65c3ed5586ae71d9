//! Decoded inbound events consumed by the core.

use crate::{Handle, is_channel};
use serde::{Deserialize, Serialize};

/// Kinds of inbound events the core reacts to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    /// Channel or private text message
    Message,
    /// Identity-query reply carrying user and host for a nickname
    IdentityReply,
    /// End of an identity-query reply sequence
    IdentityReplyEnd,
    /// Anything else; ignored by the core
    Other(String),
}

impl EventKind {
    /// Map a protocol command or numeric onto an event kind.
    pub fn from_command(command: &str) -> Self {
        match command {
            "PRIVMSG" => EventKind::Message,
            "311" => EventKind::IdentityReply,
            "318" => EventKind::IdentityReplyEnd,
            other => EventKind::Other(other.to_string()),
        }
    }
}

/// A decoded event record.
///
/// `source` is shaped `nick!user@host`; `params` keeps the protocol
/// parameter order. For messages `params` is `[target, text]`; for identity
/// replies it is `[me, nick, user, host, ...]`; for the end-of-reply marker it
/// is `[me, nick, ...]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundEvent {
    /// What the event is
    pub kind: EventKind,
    /// Origin address
    pub source: String,
    /// Ordered protocol parameters
    pub params: Vec<String>,
}

impl InboundEvent {
    /// Create a new event.
    pub fn new(kind: EventKind, source: impl Into<String>, params: Vec<String>) -> Self {
        Self {
            kind,
            source: source.into(),
            params,
        }
    }

    /// Convenience constructor for a text message.
    pub fn message(
        source: impl Into<String>,
        target: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self::new(
            EventKind::Message,
            source,
            vec![target.into(), text.into()],
        )
    }

    /// Convenience constructor for an identity-query reply.
    pub fn identity_reply(nickname: &str, user: &str, host: &str) -> Self {
        Self::new(
            EventKind::IdentityReply,
            "server",
            vec![
                "warden".to_string(),
                nickname.to_string(),
                user.to_string(),
                host.to_string(),
                "*".to_string(),
                nickname.to_string(),
            ],
        )
    }

    /// Convenience constructor for the end-of-reply marker.
    pub fn identity_reply_end(nickname: &str) -> Self {
        Self::new(
            EventKind::IdentityReplyEnd,
            "server",
            vec![
                "warden".to_string(),
                nickname.to_string(),
                "End of /WHOIS list.".to_string(),
            ],
        )
    }

    /// Sender nickname: the part of `source` before `!`.
    pub fn nickname(&self) -> &str {
        match self.source.split_once('!') {
            Some((nick, _)) => nick,
            None => &self.source,
        }
    }

    /// Normalized handle of the sender, when the source carries an address.
    pub fn sender_handle(&self) -> Option<Handle> {
        Handle::from_source(&self.source)
    }

    /// Message target (channel or recipient nickname).
    pub fn target(&self) -> Option<&str> {
        match self.kind {
            EventKind::Message => self.params.first().map(String::as_str),
            _ => None,
        }
    }

    /// Message text.
    pub fn text(&self) -> Option<&str> {
        match self.kind {
            EventKind::Message => self.params.get(1).map(String::as_str),
            _ => None,
        }
    }

    /// Whether this is a message addressed privately rather than to a channel.
    pub fn is_private(&self) -> bool {
        self.target().is_some_and(|target| !is_channel(target))
    }

    /// Where feedback for this message should go: the channel, or the sender
    /// for private messages.
    pub fn reply_target(&self) -> Option<&str> {
        let target = self.target()?;
        if is_channel(target) {
            Some(target)
        } else {
            Some(self.nickname())
        }
    }

    /// Parsed identity-query reply payload.
    pub fn as_identity_reply(&self) -> Option<IdentityReply> {
        if self.kind != EventKind::IdentityReply || self.params.len() < 4 {
            return None;
        }
        let user = self.params[2].as_str();
        let host = self.params[3].as_str();
        if user.is_empty() || host.is_empty() {
            return None;
        }
        Some(IdentityReply {
            nickname: self.params[1].clone(),
            user: user.to_string(),
            host: host.to_string(),
        })
    }

    /// Nickname named by an end-of-reply marker.
    pub fn identity_reply_end_nickname(&self) -> Option<&str> {
        match self.kind {
            EventKind::IdentityReplyEnd => self.params.get(1).map(String::as_str),
            _ => None,
        }
    }
}

/// Payload of an identity-query reply.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdentityReply {
    /// Nickname the query was issued for
    pub nickname: String,
    /// Reported user (ident) field
    pub user: String,
    /// Reported host field
    pub host: String,
}

impl IdentityReply {
    /// Durable handle derived from the reply.
    pub fn handle(&self) -> Handle {
        Handle::from_user_host(&self.user, &self.host)
    }
}
