//! First-run owner enrollment.
//!
//! When the directory has no owner, the host names a candidate nickname and
//! a one-time secret. The coordinator resolves the candidate's handle, asks
//! them privately for the secret and waits a bounded time for the answer.
//! A correct answer makes the candidate the owner; anything else terminates
//! the process.
//!
//! ```text
//! Idle -> AwaitingIdentity -> AwaitingSecret -> Confirmed
//!                  |                |-> Rejected
//!                  |                `-> TimedOut
//!                  `-> Rejected | TimedOut   (identity unresolved)
//! ```

use crate::{IdentityDirectory, LookupOutcome, PendingResolutionRegistry};
use derive_getters::Getters;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tracing::{debug, error, info, instrument, warn};
use warden_core::{
    EventKind, Handle, IdentityReply, InboundEvent, Outbound, Role, TerminationReason,
    WILDCARD_SCOPE, format_duration,
};
use warden_error::{SecurityError, SecurityErrorKind, SecurityResult};

/// Text of the private challenge sent to the candidate.
pub const CHALLENGE_MESSAGE: &str =
    "Hey! If you know me, spill the setup password. Reply here in a private message.";
/// Sent to the candidate after a correct answer.
pub const CONFIRMED_MESSAGE: &str = "Setup password confirmed. You are now the owner of the bot.";
/// Sent to the candidate after a wrong answer.
pub const REJECTED_MESSAGE: &str = "Setup password was incorrect. Bye!";

/// Enrollment timing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Getters)]
pub struct EnrollmentConfig {
    /// How long the candidate has to answer the challenge
    #[serde(default = "default_timeout", with = "humantime_serde")]
    secret_timeout: Duration,
    /// How long to wait for the candidate's identity to resolve
    #[serde(default = "default_timeout", with = "humantime_serde")]
    identity_timeout: Duration,
}

fn default_timeout() -> Duration {
    Duration::from_secs(60)
}

impl Default for EnrollmentConfig {
    fn default() -> Self {
        Self {
            secret_timeout: default_timeout(),
            identity_timeout: default_timeout(),
        }
    }
}

impl EnrollmentConfig {
    /// Build a config from explicit timeouts.
    pub fn new(secret_timeout: Duration, identity_timeout: Duration) -> Self {
        Self {
            secret_timeout,
            identity_timeout,
        }
    }
}

/// Where an enrollment session stands.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default, derive_more::Display,
)]
pub enum EnrollmentPhase {
    /// No session has run
    #[default]
    Idle,
    /// Waiting for the candidate's identity to resolve
    AwaitingIdentity,
    /// Challenge sent, waiting for the secret
    AwaitingSecret,
    /// Candidate enrolled as owner
    Confirmed,
    /// Wrong secret or unresolvable candidate
    Rejected,
    /// No answer in time
    TimedOut,
}

impl EnrollmentPhase {
    /// Whether the session is still running.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            EnrollmentPhase::AwaitingIdentity | EnrollmentPhase::AwaitingSecret
        )
    }

    /// Whether the session has finished.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            EnrollmentPhase::Confirmed | EnrollmentPhase::Rejected | EnrollmentPhase::TimedOut
        )
    }
}

struct EnrollmentSession {
    nickname: String,
    secret: String,
    handle: Option<Handle>,
    phase: EnrollmentPhase,
    // Taken by whichever of the answer or the deadline gets there first.
    completion: Option<oneshot::Sender<()>>,
}

/// Drives a single enrollment session.
pub struct EnrollmentCoordinator {
    directory: Arc<IdentityDirectory>,
    registry: Arc<PendingResolutionRegistry>,
    outbound: Arc<dyn Outbound>,
    config: EnrollmentConfig,
    session: Mutex<Option<EnrollmentSession>>,
    phase_tx: watch::Sender<EnrollmentPhase>,
}

impl std::fmt::Debug for EnrollmentCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnrollmentCoordinator")
            .field("phase", &self.phase())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl EnrollmentCoordinator {
    /// Create an idle coordinator.
    pub fn new(
        directory: Arc<IdentityDirectory>,
        registry: Arc<PendingResolutionRegistry>,
        outbound: Arc<dyn Outbound>,
        config: EnrollmentConfig,
    ) -> Self {
        let (phase_tx, _) = watch::channel(EnrollmentPhase::Idle);
        Self {
            directory,
            registry,
            outbound,
            config,
            session: Mutex::new(None),
            phase_tx,
        }
    }

    /// Current phase.
    pub fn phase(&self) -> EnrollmentPhase {
        *self.phase_tx.borrow()
    }

    /// Observe phase changes.
    pub fn subscribe(&self) -> watch::Receiver<EnrollmentPhase> {
        self.phase_tx.subscribe()
    }

    /// Nickname of the current or last candidate.
    pub fn candidate(&self) -> Option<String> {
        self.session.lock().as_ref().map(|s| s.nickname.clone())
    }

    /// Start enrollment for `nickname` with the expected `secret`.
    ///
    /// Registers an identity lookup for the candidate and issues the query.
    /// The returned receiver sees every phase change of the session.
    ///
    /// # Errors
    ///
    /// * `OwnerAlreadyEnrolled` when the directory already has an owner.
    /// * `EnrollmentActive` when a session is running.
    /// * `Configuration` when the secret is empty.
    /// * `DuplicateQuery` when a lookup for the candidate is in flight.
    #[instrument(skip(self, secret))]
    pub fn begin(
        self: &Arc<Self>,
        nickname: &str,
        secret: &str,
    ) -> SecurityResult<watch::Receiver<EnrollmentPhase>> {
        if let Some(owner) = self.directory.owner() {
            return Err(SecurityError::new(SecurityErrorKind::OwnerAlreadyEnrolled(
                owner.to_string(),
            )));
        }
        if secret.is_empty() {
            return Err(SecurityError::new(SecurityErrorKind::Configuration(
                "enrollment secret must not be empty".to_string(),
            )));
        }

        {
            let mut session = self.session.lock();
            if session.as_ref().is_some_and(|s| s.phase.is_active()) {
                return Err(SecurityError::new(SecurityErrorKind::EnrollmentActive));
            }
            *session = Some(EnrollmentSession {
                nickname: nickname.to_string(),
                secret: secret.to_string(),
                handle: None,
                phase: EnrollmentPhase::AwaitingIdentity,
                completion: None,
            });
        }
        let receiver = self.subscribe();
        self.phase_tx.send_replace(EnrollmentPhase::AwaitingIdentity);

        let weak: Weak<Self> = Arc::downgrade(self);
        let registered = self.registry.register_with_timeout(
            nickname,
            self.config.identity_timeout,
            move |outcome| {
                if let Some(coordinator) = weak.upgrade() {
                    coordinator.on_identity(outcome);
                }
            },
        );
        if let Err(e) = registered {
            *self.session.lock() = None;
            self.phase_tx.send_replace(EnrollmentPhase::Idle);
            return Err(e);
        }

        info!("Enrollment started, resolving candidate identity");
        self.outbound.send_identity_query(nickname);
        Ok(receiver)
    }

    fn on_identity(self: &Arc<Self>, outcome: LookupOutcome) {
        match outcome {
            LookupOutcome::Resolved(reply) => self.challenge(reply),
            LookupOutcome::NotFound => self.abandon(
                EnrollmentPhase::Rejected,
                TerminationReason::EnrollmentFailed("candidate identity not found".to_string()),
            ),
            LookupOutcome::Expired => {
                self.abandon(EnrollmentPhase::TimedOut, TerminationReason::EnrollmentTimedOut)
            }
        }
    }

    fn challenge(self: &Arc<Self>, reply: IdentityReply) {
        let handle = reply.handle();
        let (nickname, cancelled) = {
            let mut guard = self.session.lock();
            let Some(session) = guard.as_mut() else {
                return;
            };
            if session.phase != EnrollmentPhase::AwaitingIdentity {
                return;
            }
            let (tx, rx) = oneshot::channel();
            session.handle = Some(handle.clone());
            session.phase = EnrollmentPhase::AwaitingSecret;
            session.completion = Some(tx);
            (session.nickname.clone(), rx)
        };
        self.phase_tx.send_replace(EnrollmentPhase::AwaitingSecret);
        info!(handle = %handle, "Candidate resolved, awaiting secret");
        self.outbound.send_reply(&nickname, CHALLENGE_MESSAGE);

        let coordinator = Arc::clone(self);
        let timeout = self.config.secret_timeout;
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(timeout) => {
                    coordinator.finish(EnrollmentPhase::TimedOut);
                }
                _ = cancelled => {
                    debug!("Enrollment deadline cancelled");
                }
            }
        });
    }

    fn abandon(&self, phase: EnrollmentPhase, reason: TerminationReason) {
        {
            let mut guard = self.session.lock();
            let Some(session) = guard.as_mut() else {
                return;
            };
            if session.phase != EnrollmentPhase::AwaitingIdentity {
                return;
            }
            session.phase = phase;
        }
        self.phase_tx.send_replace(phase);
        warn!(%phase, %reason, "Enrollment abandoned");
        self.outbound.request_termination(reason);
    }

    /// Offer an inbound message to the running session.
    ///
    /// Returns `true` when the message was the candidate's private answer and
    /// has been consumed; such a message must not be dispatched as a command.
    pub fn on_message(&self, event: &InboundEvent) -> bool {
        if event.kind != EventKind::Message || !event.is_private() {
            return false;
        }
        let Some(text) = event.text() else {
            return false;
        };

        let matched = {
            let guard = self.session.lock();
            let Some(session) = guard.as_ref() else {
                return false;
            };
            if session.phase != EnrollmentPhase::AwaitingSecret
                || !session.nickname.eq_ignore_ascii_case(event.nickname())
            {
                return false;
            }
            text == session.secret
        };

        let verdict = if matched {
            EnrollmentPhase::Confirmed
        } else {
            EnrollmentPhase::Rejected
        };
        self.finish(verdict);
        true
    }

    /// Settle an awaiting-secret session. Only the first caller has effect.
    fn finish(&self, verdict: EnrollmentPhase) -> bool {
        let (nickname, handle) = {
            let mut guard = self.session.lock();
            let Some(session) = guard.as_mut() else {
                return false;
            };
            let Some(completion) = session.completion.take() else {
                debug!(%verdict, "Enrollment already settled");
                return false;
            };
            drop(completion);
            (session.nickname.clone(), session.handle.clone())
        };

        let (phase, termination) = match verdict {
            EnrollmentPhase::Confirmed => match self.enroll(handle) {
                Ok(()) => (EnrollmentPhase::Confirmed, None),
                Err(e) => {
                    error!(error = %e, "Failed to persist owner");
                    (
                        EnrollmentPhase::Rejected,
                        Some(TerminationReason::EnrollmentFailed(e.to_string())),
                    )
                }
            },
            EnrollmentPhase::TimedOut => (
                EnrollmentPhase::TimedOut,
                Some(TerminationReason::EnrollmentTimedOut),
            ),
            _ => (
                EnrollmentPhase::Rejected,
                Some(TerminationReason::EnrollmentRejected),
            ),
        };

        if let Some(session) = self.session.lock().as_mut() {
            session.phase = phase;
        }
        self.phase_tx.send_replace(phase);

        match termination {
            None => {
                info!(nickname = %nickname, "Owner enrolled");
                self.outbound.send_reply(&nickname, CONFIRMED_MESSAGE);
                self.outbound.send_reply(
                    &nickname,
                    "Use !adduser <nickname> <role> [<channel>] to grant roles and !deluser <nickname> [<channel>] to revoke them.",
                );
            }
            Some(reason) => {
                warn!(nickname = %nickname, %phase, "Enrollment failed");
                let notice = match phase {
                    EnrollmentPhase::TimedOut => format!(
                        "No response within {}. Shutting down. Bye!",
                        format_duration(self.config.secret_timeout)
                    ),
                    _ => REJECTED_MESSAGE.to_string(),
                };
                self.outbound.send_reply(&nickname, &notice);
                self.outbound.request_termination(reason);
            }
        }
        true
    }

    fn enroll(&self, handle: Option<Handle>) -> SecurityResult<()> {
        let handle = handle.ok_or_else(|| {
            SecurityError::new(SecurityErrorKind::Configuration(
                "candidate handle unresolved".to_string(),
            ))
        })?;
        self.directory.upsert(&handle, WILDCARD_SCOPE, Role::Owner)?;
        Ok(())
    }
}
