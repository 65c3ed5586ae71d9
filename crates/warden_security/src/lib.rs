//! Trust boundary for a chat automation bot.
//!
//! Every inbound command passes through this crate before anything runs:
//!
//! 1. **Identity directory** - durable handle to per-scope role mapping
//! 2. **Pending lookups** - correlates asynchronous identity replies with the
//!    work waiting on them
//! 3. **Admission control** - per-identity and global sliding windows with
//!    cooldown and suspension escalation
//! 4. **Enrollment** - one-time, time-bounded owner bootstrap
//! 5. **Dispatcher** - scope, admission, `BadBoy` and role checks in that
//!    order, then hands the command to its handler
//!
//! Every identity used for authorization is a normalized [`Handle`] derived
//! from the sender's address, never the display nickname.
//!
//! [`Handle`]: warden_core::Handle

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod admission;
mod builtin;
mod config;
mod context;
mod directory;
mod dispatcher;
mod enrollment;
mod pending;
mod policy;
mod store;

pub use admission::{AdmissionConfig, AdmissionController, AdmissionDecision, MAX_PENALTY};
pub use builtin::{
    GRANT_COMMAND, GrantCommand, REVOKE_COMMAND, RevokeCommand, SHUTDOWN_COMMAND, ShutdownCommand,
};
pub use config::{DirectoryConfig, DispatchConfig, LookupConfig, WardenConfig};
pub use context::{CommandContext, Services};
pub use directory::{IdentityDirectory, IdentityRecord, Records, RemoveOutcome, UpsertOutcome};
pub use dispatcher::{CommandHandler, Denial, DispatchOutcome, Dispatcher};
pub use enrollment::{
    CHALLENGE_MESSAGE, CONFIRMED_MESSAGE, EnrollmentConfig, EnrollmentCoordinator,
    EnrollmentPhase, REJECTED_MESSAGE,
};
pub use pending::{
    Continuation, LookupOutcome, LookupTicket, PendingResolutionRegistry, query_key,
};
pub use policy::{CommandPolicies, CommandPolicy};
pub use store::{JsonFileStore, MemoryStore, RecordStore};
