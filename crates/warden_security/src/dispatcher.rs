//! Authorization pipeline and event routing.

use crate::{
    AdmissionDecision, CommandContext, CommandPolicies, CommandPolicy, LookupOutcome, Services,
};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};
use warden_core::{EventKind, InboundEvent, Role, format_duration};
use warden_error::{SecurityError, SecurityResult};

/// Executes one command after it has been authorized.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    /// Run the command.
    ///
    /// Errors are logged by the dispatcher; handlers report user-facing
    /// problems through [`CommandContext::reply`] and return `Ok`.
    async fn handle(&self, ctx: CommandContext) -> SecurityResult<()>;
}

/// Why a command attempt was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Denial {
    /// The command is not allowed in the scope it was issued in
    ScopeNotAllowed,
    /// Too many commands across all identities
    GloballyThrottled,
    /// The identity exceeded its rate
    Cooldown {
        /// Time until the cooldown ends
        remaining: Duration,
    },
    /// The identity is suspended
    Suspended {
        /// Time until the suspension ends
        remaining: Duration,
    },
    /// The identity's role is too low, or it is marked `BadBoy`
    PermissionDenied,
}

impl Denial {
    /// Feedback text sent to the issuer.
    pub fn feedback(&self) -> String {
        match self {
            Denial::ScopeNotAllowed => "This command is not allowed in this channel.".to_string(),
            Denial::GloballyThrottled => {
                "Too many commands are being processed right now. Please try again shortly."
                    .to_string()
            }
            Denial::Cooldown { remaining } => format!(
                "You are currently in cooldown for {}. Please wait before sending more commands.",
                format_duration(*remaining)
            ),
            Denial::Suspended { remaining } => format!(
                "You have been temporarily suspended for {} for not reading the warning. Please wait and try again later.",
                format_duration(*remaining)
            ),
            Denial::PermissionDenied => {
                "You do not have permission to execute this command.".to_string()
            }
        }
    }
}

/// What happened to one inbound event.
#[derive(Debug, Clone)]
pub enum DispatchOutcome {
    /// Not a command, or not one this dispatcher knows
    Ignored,
    /// Consumed by the running enrollment session
    Enrollment,
    /// Completed a pending identity lookup
    LookupCompleted {
        /// Nickname the lookup was for
        nickname: String,
    },
    /// Authorized and handed to its handler
    Executed {
        /// Command name
        command: String,
    },
    /// Refused before reaching its handler
    Denied {
        /// Command name
        command: String,
        /// Reason
        denial: Denial,
    },
    /// Authorized but the handler failed
    Failed {
        /// Command name
        command: String,
        /// Handler error
        error: SecurityError,
    },
}

/// Routes inbound events and authorizes command attempts.
///
/// A command attempt passes, in order: role resolution, the scope allow-list,
/// admission control, the `BadBoy` check and the role comparison. The first
/// failing step ends the attempt with feedback to the issuer.
pub struct Dispatcher {
    services: Arc<Services>,
    handlers: RwLock<HashMap<String, Arc<dyn CommandHandler>>>,
    policies: RwLock<CommandPolicies>,
    management_command: String,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("commands", &self.commands())
            .field("management_command", &self.management_command)
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    /// Create a dispatcher with no handlers.
    ///
    /// `management_command` names the one command an owner may issue in any
    /// scope regardless of its allow-list.
    pub fn new(
        services: Arc<Services>,
        policies: CommandPolicies,
        management_command: impl Into<String>,
    ) -> Self {
        Self {
            services,
            handlers: RwLock::new(HashMap::new()),
            policies: RwLock::new(policies),
            management_command: management_command.into(),
        }
    }

    /// Shared services.
    pub fn services(&self) -> &Arc<Services> {
        &self.services
    }

    /// Register the handler for `name`, replacing any previous one.
    pub fn register<H: CommandHandler + 'static>(&self, name: impl Into<String>, handler: H) {
        let name = name.into();
        debug!(command = %name, "Registered command handler");
        self.handlers.write().insert(name, Arc::new(handler));
    }

    /// Replace the whole policy table.
    pub fn replace_policies(&self, policies: CommandPolicies) {
        info!(count = policies.len(), "Command policies replaced");
        *self.policies.write() = policies;
    }

    /// Set the policy for one command.
    pub fn set_policy(&self, name: impl Into<String>, policy: CommandPolicy) {
        self.policies.write().insert(name.into(), policy);
    }

    /// Policy for `name`.
    pub fn policy(&self, name: &str) -> Option<CommandPolicy> {
        self.policies.read().get(name).cloned()
    }

    /// Names of commands with a registered handler, sorted.
    pub fn commands(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Route one inbound event.
    ///
    /// Messages are first offered to the enrollment session. Identity replies
    /// and end-of-reply markers complete pending lookups.
    pub async fn handle_event(&self, event: &InboundEvent) -> DispatchOutcome {
        match &event.kind {
            EventKind::Message => {
                if self.services.enrollment.on_message(event) {
                    return DispatchOutcome::Enrollment;
                }
                self.dispatch(event).await
            }
            EventKind::IdentityReply => {
                let Some(reply) = event.as_identity_reply() else {
                    debug!("Malformed identity reply");
                    return DispatchOutcome::Ignored;
                };
                let nickname = reply.nickname.clone();
                if self
                    .services
                    .registry
                    .resolve(&nickname, LookupOutcome::Resolved(reply))
                {
                    DispatchOutcome::LookupCompleted { nickname }
                } else {
                    DispatchOutcome::Ignored
                }
            }
            EventKind::IdentityReplyEnd => {
                let Some(nickname) = event.identity_reply_end_nickname() else {
                    return DispatchOutcome::Ignored;
                };
                // Reaching the end marker with the lookup still pending means
                // no reply was sent for this nickname.
                if self
                    .services
                    .registry
                    .resolve(nickname, LookupOutcome::NotFound)
                {
                    DispatchOutcome::LookupCompleted {
                        nickname: nickname.to_string(),
                    }
                } else {
                    DispatchOutcome::Ignored
                }
            }
            EventKind::Other(_) => DispatchOutcome::Ignored,
        }
    }

    /// Authorize and run a command message.
    #[instrument(skip(self, event), fields(source = %event.source))]
    pub async fn dispatch(&self, event: &InboundEvent) -> DispatchOutcome {
        let (Some(scope), Some(text), Some(reply_to)) =
            (event.target(), event.text(), event.reply_target())
        else {
            return DispatchOutcome::Ignored;
        };
        let mut tokens = text.split_whitespace();
        let Some(command) = tokens.next() else {
            return DispatchOutcome::Ignored;
        };

        let handler = self.handlers.read().get(command).cloned();
        let policy = self.policies.read().get(command).cloned();
        let (Some(handler), Some(policy)) = (handler, policy) else {
            return DispatchOutcome::Ignored;
        };
        let Some(handle) = event.sender_handle() else {
            debug!(command, "Sender has no address");
            return DispatchOutcome::Ignored;
        };

        let services = &self.services;
        let role = services.directory.get_role(&handle, scope);
        debug!(command, handle = %handle, %role, scope, "Authorizing command");

        let bypass = command == self.management_command && role == Role::Owner;
        if !bypass && !policy.allows_scope(scope) {
            return self.deny(command, reply_to, Denial::ScopeNotAllowed);
        }

        match services.admission.check(handle.as_str()) {
            AdmissionDecision::Accepted => {}
            AdmissionDecision::GloballyThrottled => {
                return self.deny(command, reply_to, Denial::GloballyThrottled);
            }
            AdmissionDecision::Cooldown { remaining } => {
                return self.deny(command, reply_to, Denial::Cooldown { remaining });
            }
            AdmissionDecision::Suspended { remaining } => {
                let denial = Denial::Suspended { remaining };
                if services.admission.can_notify(handle.as_str()) {
                    return self.deny(command, reply_to, denial);
                }
                debug!(command, "Suspension notice suppressed");
                return DispatchOutcome::Denied {
                    command: command.to_string(),
                    denial,
                };
            }
        }

        if role == Role::BadBoy || !role.permits(policy.role) {
            return self.deny(command, reply_to, Denial::PermissionDenied);
        }

        let ctx = CommandContext {
            command: command.to_string(),
            args: tokens.map(str::to_string).collect(),
            nickname: event.nickname().to_string(),
            handle,
            scope: scope.to_string(),
            reply_to: reply_to.to_string(),
            role,
            required: policy.role,
            services: Arc::clone(services),
        };

        info!(command, "Executing command");
        match handler.handle(ctx).await {
            Ok(()) => DispatchOutcome::Executed {
                command: command.to_string(),
            },
            Err(error) => {
                warn!(command, error = %error, "Command handler failed");
                DispatchOutcome::Failed {
                    command: command.to_string(),
                    error,
                }
            }
        }
    }

    fn deny(&self, command: &str, reply_to: &str, denial: Denial) -> DispatchOutcome {
        info!(command, ?denial, "Command denied");
        self.services
            .outbound
            .send_reply(reply_to, &denial.feedback());
        DispatchOutcome::Denied {
            command: command.to_string(),
            denial,
        }
    }

    /// Drop idle admission state and expire lookups older than twice the
    /// lookup timeout. Returns `(identities, lookups)` removed.
    pub fn housekeep(&self, now: Instant) -> (usize, usize) {
        let identities = self.services.admission.prune_idle_at(now);
        let lookups = self
            .services
            .registry
            .purge_stale(self.services.lookup_timeout.saturating_mul(2), now);
        if identities + lookups > 0 {
            debug!(identities, lookups, "Housekeeping removed stale state");
        }
        (identities, lookups)
    }
}
