//! Shared services and per-invocation command context.

use crate::{AdmissionController, EnrollmentCoordinator, IdentityDirectory, PendingResolutionRegistry};
use std::sync::Arc;
use std::time::Duration;
use warden_core::{Handle, Outbound, Role};

/// Long-lived components every command handler may reach.
#[derive(Clone)]
pub struct Services {
    /// Identity directory
    pub directory: Arc<IdentityDirectory>,
    /// In-flight identity lookups
    pub registry: Arc<PendingResolutionRegistry>,
    /// Admission controller
    pub admission: Arc<AdmissionController>,
    /// Enrollment coordinator
    pub enrollment: Arc<EnrollmentCoordinator>,
    /// Outbound sink
    pub outbound: Arc<dyn Outbound>,
    /// Deadline for identity lookups issued by commands
    pub lookup_timeout: Duration,
}

impl std::fmt::Debug for Services {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Services")
            .field("directory", &self.directory)
            .field("registry", &self.registry)
            .field("admission", &self.admission)
            .field("enrollment", &self.enrollment)
            .field("lookup_timeout", &self.lookup_timeout)
            .finish_non_exhaustive()
    }
}

/// Everything a handler knows about one authorized invocation.
#[derive(Debug, Clone)]
pub struct CommandContext {
    /// Command name as typed
    pub command: String,
    /// Whitespace-separated arguments after the command name
    pub args: Vec<String>,
    /// Issuer's nickname
    pub nickname: String,
    /// Issuer's handle
    pub handle: Handle,
    /// Scope the command was issued in
    pub scope: String,
    /// Where replies go
    pub reply_to: String,
    /// Issuer's effective role in `scope`
    pub role: Role,
    /// Minimum role the command's policy requires
    pub required: Role,
    /// Shared services
    pub services: Arc<Services>,
}

impl CommandContext {
    /// Reply to wherever the command was issued.
    pub fn reply(&self, text: &str) {
        self.services.outbound.send_reply(&self.reply_to, text);
    }
}
