//! Outbound collaborator interface.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Why the core is asking the host application to stop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, derive_more::Display)]
pub enum TerminationReason {
    /// Enrollment candidate answered with the wrong secret
    #[display("enrollment rejected")]
    EnrollmentRejected,
    /// Enrollment deadline passed without an answer
    #[display("enrollment timed out")]
    EnrollmentTimedOut,
    /// Enrollment could not complete for another reason
    #[display("enrollment failed: {}", _0)]
    EnrollmentFailed(String),
    /// An authorized operator asked for shutdown
    #[display("shutdown requested by {}", requested_by)]
    OperatorShutdown {
        /// Handle of the requesting operator
        requested_by: String,
    },
}

/// Everything the core emits towards the chat connection and its host.
///
/// Implementations must not block: the core calls these from the event path
/// and from timer tasks.
pub trait Outbound: Send + Sync {
    /// Send a text reply to a channel or private target.
    fn send_reply(&self, target: &str, text: &str);

    /// Issue an out-of-band identity query for a nickname.
    fn send_identity_query(&self, nickname: &str);

    /// Ask the host application to terminate.
    fn request_termination(&self, reason: TerminationReason);
}

/// An action produced through [`ChannelOutbound`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutboundAction {
    /// Text reply
    Reply {
        /// Channel or nickname
        target: String,
        /// Message text
        text: String,
    },
    /// Identity query
    IdentityQuery {
        /// Nickname to resolve
        nickname: String,
    },
    /// Termination request
    Terminate(TerminationReason),
}

/// [`Outbound`] implementation that forwards every action into an unbounded
/// channel drained by the host application.
#[derive(Debug, Clone)]
pub struct ChannelOutbound {
    tx: mpsc::UnboundedSender<OutboundAction>,
}

impl ChannelOutbound {
    /// Create the outbound sink and the receiver the host drains.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<OutboundAction>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn emit(&self, action: OutboundAction) {
        debug!(?action, "Emitting outbound action");
        if self.tx.send(action).is_err() {
            warn!("Outbound receiver dropped, action discarded");
        }
    }
}

impl Outbound for ChannelOutbound {
    fn send_reply(&self, target: &str, text: &str) {
        self.emit(OutboundAction::Reply {
            target: target.to_string(),
            text: text.to_string(),
        });
    }

    fn send_identity_query(&self, nickname: &str) {
        self.emit(OutboundAction::IdentityQuery {
            nickname: nickname.to_string(),
        });
    }

    fn request_termination(&self, reason: TerminationReason) {
        self.emit(OutboundAction::Terminate(reason));
    }
}
