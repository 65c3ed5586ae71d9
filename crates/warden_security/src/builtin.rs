//! Built-in role management and shutdown commands.

use crate::{CommandContext, CommandHandler, Dispatcher, LookupOutcome, RemoveOutcome, UpsertOutcome};
use async_trait::async_trait;
use tracing::{info, instrument, warn};
use warden_core::{Role, TerminationReason, WILDCARD_SCOPE};
use warden_error::{SecurityErrorKind, SecurityResult};

/// Command name of [`GrantCommand`].
pub const GRANT_COMMAND: &str = "!adduser";
/// Command name of [`RevokeCommand`].
pub const REVOKE_COMMAND: &str = "!deluser";
/// Command name of [`ShutdownCommand`].
pub const SHUTDOWN_COMMAND: &str = "!shutdown";

impl Dispatcher {
    /// Register the grant, revoke and shutdown handlers.
    ///
    /// Their policies come from configuration like any other command.
    pub fn register_builtin_commands(&self) {
        self.register(GRANT_COMMAND, GrantCommand);
        self.register(REVOKE_COMMAND, RevokeCommand);
        self.register(SHUTDOWN_COMMAND, ShutdownCommand);
    }
}

/// Whether the issuer may manage roles in `scope`.
///
/// Holding the command's required role where the command was typed is not
/// enough; the issuer must hold it in the scope being changed too.
fn may_manage(ctx: &CommandContext, scope: &str) -> bool {
    let role = ctx.services.directory.get_role(&ctx.handle, scope);
    role != Role::BadBoy && role.permits(ctx.required)
}

/// `!adduser <nickname> <role> [<scope>]`
///
/// Resolves the nickname's handle and assigns the role. Without a scope the
/// current channel is used.
#[derive(Debug, Clone, Copy, Default)]
pub struct GrantCommand;

#[async_trait]
impl CommandHandler for GrantCommand {
    #[instrument(skip(self, ctx), fields(issuer = %ctx.handle))]
    async fn handle(&self, ctx: CommandContext) -> SecurityResult<()> {
        let (Some(nickname), Some(role_name)) = (ctx.args.first(), ctx.args.get(1)) else {
            ctx.reply("Usage: !adduser <nickname> <role> [<channel>]");
            return Ok(());
        };
        let Ok(role) = Role::from_name(role_name) else {
            ctx.reply(&format!("Invalid role. Valid roles are: {}", Role::names()));
            return Ok(());
        };
        let scope = if role == Role::Owner {
            WILDCARD_SCOPE.to_string()
        } else {
            ctx.args.get(2).cloned().unwrap_or_else(|| ctx.scope.clone())
        };

        if !may_manage(&ctx, &scope) {
            ctx.reply(&format!("You do not have permission to manage roles in {}.", scope));
            return Ok(());
        }

        let nickname = nickname.clone();
        let services = ctx.services.clone();
        let reply_to = ctx.reply_to.clone();
        let target = nickname.clone();
        let registered = ctx.services.registry.register_with_timeout(
            &nickname,
            ctx.services.lookup_timeout,
            move |outcome| {
                let text = match outcome {
                    LookupOutcome::Resolved(reply) => {
                        let handle = reply.handle();
                        match services.directory.upsert(&handle, &scope, role) {
                            Ok(UpsertOutcome::Created) => {
                                format!("Added {} ({}) as {} in {}.", target, handle, role, scope)
                            }
                            Ok(UpsertOutcome::Updated { .. }) => {
                                format!("Updated {} to {} in {}.", target, role, scope)
                            }
                            Ok(UpsertOutcome::Unchanged) => {
                                format!("{} already has the role {} in {}.", target, role, scope)
                            }
                            Err(e) => match e.kind() {
                                SecurityErrorKind::OwnerConflict { .. } => {
                                    "There is already an Owner. Only one Owner is allowed."
                                        .to_string()
                                }
                                SecurityErrorKind::OwnerProtected { .. } => {
                                    format!("{} is the Owner and cannot be modified.", target)
                                }
                                _ => {
                                    warn!(error = %e, "Failed to assign role");
                                    format!("Failed to update {}. Nothing was changed.", target)
                                }
                            },
                        }
                    }
                    LookupOutcome::NotFound => format!("Could not find user {}.", target),
                    LookupOutcome::Expired => format!("Lookup for {} timed out.", target),
                };
                services.outbound.send_reply(&reply_to, &text);
            },
        );

        match registered {
            Ok(_) => {
                info!(target = %nickname, "Resolving grant target");
                ctx.services.outbound.send_identity_query(&nickname);
                Ok(())
            }
            Err(e) if matches!(e.kind(), SecurityErrorKind::DuplicateQuery { .. }) => {
                ctx.reply(&format!(
                    "A lookup for {} is already in progress. Please wait.",
                    nickname
                ));
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

/// `!deluser <nickname> [<scope>]`
///
/// Resolves the nickname's handle and removes its role in the scope. Without
/// a scope the current channel is used.
#[derive(Debug, Clone, Copy, Default)]
pub struct RevokeCommand;

#[async_trait]
impl CommandHandler for RevokeCommand {
    #[instrument(skip(self, ctx), fields(issuer = %ctx.handle))]
    async fn handle(&self, ctx: CommandContext) -> SecurityResult<()> {
        let Some(nickname) = ctx.args.first().cloned() else {
            ctx.reply("Usage: !deluser <nickname> [<channel>]");
            return Ok(());
        };
        let scope = ctx.args.get(1).cloned().unwrap_or_else(|| ctx.scope.clone());

        if !may_manage(&ctx, &scope) {
            ctx.reply(&format!("You do not have permission to manage roles in {}.", scope));
            return Ok(());
        }

        let services = ctx.services.clone();
        let reply_to = ctx.reply_to.clone();
        let target = nickname.clone();
        let registered = ctx.services.registry.register_with_timeout(
            &nickname,
            ctx.services.lookup_timeout,
            move |outcome| {
                let text = match outcome {
                    LookupOutcome::Resolved(reply) => {
                        let handle = reply.handle();
                        match services.directory.remove(&handle, &scope) {
                            Ok(RemoveOutcome::Removed { role }) => {
                                format!("Removed role {} from {} in {}.", role, target, scope)
                            }
                            Ok(RemoveOutcome::IdentityRemoved { role }) => format!(
                                "Removed role {} from {} in {}. {} has no roles left.",
                                role, target, scope, target
                            ),
                            Ok(RemoveOutcome::NotAssigned) => {
                                format!("{} has no role in {}.", target, scope)
                            }
                            Ok(RemoveOutcome::UnknownIdentity) => {
                                format!("{} is not in the user list.", target)
                            }
                            Err(e) => match e.kind() {
                                SecurityErrorKind::OwnerProtected { .. } => {
                                    format!("{} is the Owner and cannot be removed.", target)
                                }
                                _ => {
                                    warn!(error = %e, "Failed to remove role");
                                    format!("Failed to update {}. Nothing was changed.", target)
                                }
                            },
                        }
                    }
                    LookupOutcome::NotFound => format!("Could not find user {}.", target),
                    LookupOutcome::Expired => format!("Lookup for {} timed out.", target),
                };
                services.outbound.send_reply(&reply_to, &text);
            },
        );

        match registered {
            Ok(_) => {
                info!(target = %nickname, "Resolving revoke target");
                ctx.services.outbound.send_identity_query(&nickname);
                Ok(())
            }
            Err(e) if matches!(e.kind(), SecurityErrorKind::DuplicateQuery { .. }) => {
                ctx.reply(&format!(
                    "A lookup for {} is already in progress. Please wait.",
                    nickname
                ));
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

/// `!shutdown`
#[derive(Debug, Clone, Copy, Default)]
pub struct ShutdownCommand;

#[async_trait]
impl CommandHandler for ShutdownCommand {
    async fn handle(&self, ctx: CommandContext) -> SecurityResult<()> {
        warn!(issuer = %ctx.handle, "Shutdown requested");
        ctx.reply("Shutting down. Bye!");
        ctx.services
            .outbound
            .request_termination(TerminationReason::OperatorShutdown {
                requested_by: ctx.handle.to_string(),
            });
        Ok(())
    }
}
