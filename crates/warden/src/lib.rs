//! Warden: the trust boundary of a chat automation bot.
//!
//! Warden decides, for every inbound command, whether it runs. It keeps a
//! durable directory of identities and their roles per channel, rate limits
//! every identity with escalating penalties, bootstraps the first owner
//! through a one-time secret handshake, and only then hands authorized
//! commands to their handlers.
//!
//! The host application owns the chat connection. It decodes protocol lines
//! into [`InboundEvent`]s, feeds them to [`Warden::handle_event`], and drains
//! the [`OutboundAction`]s Warden produces.
//!
//! # Example
//!
//! ```no_run
//! use warden::{ChannelOutbound, InboundEvent, Warden, WardenConfig};
//! use std::sync::Arc;
//!
//! # async fn run() -> warden::WardenResult<()> {
//! let config = WardenConfig::load()?;
//! let (outbound, mut actions) = ChannelOutbound::new();
//! let warden = Warden::build(&config, Arc::new(outbound))?;
//!
//! if warden.needs_enrollment() {
//!     warden.begin_enrollment("alice", "correct horse battery staple")?;
//! }
//!
//! let event = InboundEvent::message("bob!~bob@example.com", "#rust", "!shutdown");
//! warden.handle_event(&event).await;
//! while let Ok(action) = actions.try_recv() {
//!     println!("{:?}", action);
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod observability;

pub use observability::{ObservabilityConfig, init_observability, init_observability_with_config};

pub use warden_core::{
    ChannelOutbound, EventKind, Handle, IdentityReply, InboundEvent, Outbound, OutboundAction,
    Role, TerminationReason, WILDCARD_SCOPE, fold_scope, format_duration, is_channel,
};
pub use warden_error::{
    ConfigError, SecurityError, SecurityErrorKind, SecurityResult, StorageError, StorageErrorKind,
    WardenError, WardenErrorKind, WardenResult,
};
pub use warden_security::{
    AdmissionConfig, AdmissionController, AdmissionDecision, CommandContext, CommandHandler,
    CommandPolicies, CommandPolicy, Denial, DirectoryConfig, DispatchConfig, DispatchOutcome,
    Dispatcher, EnrollmentConfig, EnrollmentCoordinator, EnrollmentPhase, IdentityDirectory,
    IdentityRecord, JsonFileStore, LookupConfig, LookupOutcome, MAX_PENALTY, MemoryStore,
    PendingResolutionRegistry, RecordStore, RemoveOutcome, Services, UpsertOutcome, WardenConfig,
};

use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, instrument};

/// Composition root: owns exactly one of every component.
#[derive(Debug)]
pub struct Warden {
    services: Arc<Services>,
    dispatcher: Arc<Dispatcher>,
    config: WardenConfig,
}

impl Warden {
    /// Build from configuration, opening the JSON identity store it names.
    ///
    /// # Errors
    ///
    /// Fails when the identity store cannot be read, created or decoded.
    #[instrument(skip_all, fields(path = %config.directory().path().display()))]
    pub fn build(config: &WardenConfig, outbound: Arc<dyn Outbound>) -> WardenResult<Self> {
        let store = JsonFileStore::new(config.directory().path());
        Self::with_store(config, store, outbound)
    }

    /// Build from configuration with an explicit record store.
    pub fn with_store(
        config: &WardenConfig,
        store: impl RecordStore + 'static,
        outbound: Arc<dyn Outbound>,
    ) -> WardenResult<Self> {
        let directory = Arc::new(IdentityDirectory::load(store)?);
        let registry = Arc::new(PendingResolutionRegistry::new());
        let admission = Arc::new(AdmissionController::new(config.admission().clone()));
        let enrollment = Arc::new(EnrollmentCoordinator::new(
            Arc::clone(&directory),
            Arc::clone(&registry),
            Arc::clone(&outbound),
            config.enrollment().clone(),
        ));

        let services = Arc::new(Services {
            directory,
            registry,
            admission,
            enrollment,
            outbound,
            lookup_timeout: *config.lookup().timeout(),
        });

        let dispatcher = Dispatcher::new(
            Arc::clone(&services),
            config.commands().clone(),
            config.dispatch().management_command().clone(),
        );
        dispatcher.register_builtin_commands();

        info!(
            identities = services.directory.len(),
            commands = config.commands().len(),
            "Warden ready"
        );
        Ok(Self {
            services,
            dispatcher: Arc::new(dispatcher),
            config: config.clone(),
        })
    }

    /// Whether no owner is enrolled yet.
    pub fn needs_enrollment(&self) -> bool {
        !self.services.directory.has_owner()
    }

    /// Start owner enrollment for `nickname`.
    pub fn begin_enrollment(
        &self,
        nickname: &str,
        secret: &str,
    ) -> WardenResult<watch::Receiver<EnrollmentPhase>> {
        Ok(self.services.enrollment.begin(nickname, secret)?)
    }

    /// Route one inbound event.
    pub async fn handle_event(&self, event: &InboundEvent) -> DispatchOutcome {
        self.dispatcher.handle_event(event).await
    }

    /// Register a command handler.
    ///
    /// The command only runs once a policy for `name` is configured.
    pub fn register_command<H: CommandHandler + 'static>(&self, name: impl Into<String>, handler: H) {
        self.dispatcher.register(name, handler);
    }

    /// Command dispatcher.
    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Shared components.
    pub fn services(&self) -> &Arc<Services> {
        &self.services
    }

    /// Configuration this instance was built from.
    pub fn config(&self) -> &WardenConfig {
        &self.config
    }

    /// Spawn a task that periodically drops idle admission state and expires
    /// stale lookups. Abort the returned handle to stop it.
    pub fn spawn_housekeeping(&self) -> JoinHandle<()> {
        let dispatcher = Arc::clone(&self.dispatcher);
        let period = *self.config.dispatch().housekeeping_interval();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                dispatcher.housekeep(Instant::now());
            }
        })
    }
}
