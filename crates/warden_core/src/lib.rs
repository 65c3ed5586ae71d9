//! Core data types for the Warden chat command trust boundary.
//!
//! This crate provides the vocabulary shared by every Warden component: the
//! closed [`Role`] ladder, normalized identity [`Handle`]s, decoded inbound
//! events and the [`Outbound`] collaborator through which replies, identity
//! queries and termination requests leave the core.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod event;
mod handle;
mod humanize;
mod outbound;
mod role;

pub use event::{EventKind, IdentityReply, InboundEvent};
pub use handle::{Handle, WILDCARD_SCOPE, fold_scope, is_channel};
pub use humanize::format_duration;
pub use outbound::{ChannelOutbound, Outbound, OutboundAction, TerminationReason};
pub use role::Role;
