//! Per-identity and global admission control.
//!
//! Every command attempt passes through a sliding window per identity and a
//! shared global window. An identity that exceeds its window enters a
//! cooldown; an identity that keeps sending during its cooldown is escalated
//! to a much longer suspension.

use derive_getters::Getters;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

/// Admission limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Getters)]
pub struct AdmissionConfig {
    /// Accepted attempts per identity within one window
    #[serde(default = "default_per_identity_limit")]
    per_identity_limit: usize,
    /// Accepted attempts across all identities within one window
    #[serde(default = "default_global_limit")]
    global_limit: usize,
    /// Length of the sliding window
    #[serde(default = "default_window", with = "humantime_serde")]
    window: Duration,
    /// Cooldown imposed after exceeding the per-identity limit
    #[serde(default = "default_cooldown", with = "humantime_serde")]
    cooldown: Duration,
    /// Suspension imposed for sending during a cooldown
    #[serde(default = "default_suspension", with = "humantime_serde")]
    suspension: Duration,
    /// Minimum spacing between suspension notices to one identity
    #[serde(default = "default_notice_cooldown", with = "humantime_serde")]
    notice_cooldown: Duration,
}

/// Upper bound on configured cooldown and suspension lengths.
pub const MAX_PENALTY: Duration = Duration::from_secs(365 * 24 * 60 * 60);

fn default_per_identity_limit() -> usize {
    2
}

fn default_global_limit() -> usize {
    5
}

fn default_window() -> Duration {
    Duration::from_secs(1)
}

fn default_cooldown() -> Duration {
    Duration::from_secs(10)
}

fn default_suspension() -> Duration {
    Duration::from_secs(60 * 60)
}

fn default_notice_cooldown() -> Duration {
    Duration::from_secs(60)
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            per_identity_limit: default_per_identity_limit(),
            global_limit: default_global_limit(),
            window: default_window(),
            cooldown: default_cooldown(),
            suspension: default_suspension(),
            notice_cooldown: default_notice_cooldown(),
        }
    }
}

impl AdmissionConfig {
    /// Override the per-identity limit.
    pub fn with_per_identity_limit(mut self, limit: usize) -> Self {
        self.per_identity_limit = limit;
        self
    }

    /// Override the global limit.
    pub fn with_global_limit(mut self, limit: usize) -> Self {
        self.global_limit = limit;
        self
    }

    /// Override the sliding window length.
    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    /// Override the cooldown.
    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    /// Override the suspension.
    pub fn with_suspension(mut self, suspension: Duration) -> Self {
        self.suspension = suspension;
        self
    }

    /// Override the notice spacing.
    pub fn with_notice_cooldown(mut self, notice_cooldown: Duration) -> Self {
        self.notice_cooldown = notice_cooldown;
        self
    }
}

/// Verdict for one command attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionDecision {
    /// The attempt was admitted and recorded
    Accepted,
    /// The global window is full
    GloballyThrottled,
    /// The identity just exceeded its window
    Cooldown {
        /// Time until the cooldown ends
        remaining: Duration,
    },
    /// The identity is suspended
    Suspended {
        /// Time until the suspension ends
        remaining: Duration,
    },
}

impl AdmissionDecision {
    /// Whether the attempt was admitted.
    pub fn is_accepted(&self) -> bool {
        matches!(self, AdmissionDecision::Accepted)
    }
}

#[derive(Debug, Default)]
struct RateState {
    window: VecDeque<Instant>,
    cooldown_until: Option<Instant>,
    suspended_until: Option<Instant>,
    last_notice_at: Option<Instant>,
}

impl RateState {
    fn is_idle(&self, now: Instant) -> bool {
        self.window.is_empty()
            && self.cooldown_until.is_none_or(|until| now >= until)
            && self.suspended_until.is_none_or(|until| now >= until)
    }
}

#[derive(Debug, Default)]
struct AdmissionState {
    identities: HashMap<String, RateState>,
    global: VecDeque<Instant>,
}

fn prune(window: &mut VecDeque<Instant>, length: Duration, now: Instant) {
    window.retain(|at| now.saturating_duration_since(*at) < length);
}

/// Sliding-window admission controller.
///
/// All state sits behind one lock so each decision is atomic per identity
/// and against the global window.
#[derive(Debug)]
pub struct AdmissionController {
    config: AdmissionConfig,
    state: Mutex<AdmissionState>,
}

impl AdmissionController {
    /// Create a controller with the given limits.
    ///
    /// Cooldown and suspension are capped at [`MAX_PENALTY`].
    pub fn new(mut config: AdmissionConfig) -> Self {
        for (name, span) in [
            ("cooldown", &mut config.cooldown),
            ("suspension", &mut config.suspension),
        ] {
            if *span > MAX_PENALTY {
                warn!(name, configured = ?*span, cap = ?MAX_PENALTY, "Penalty length capped");
                *span = MAX_PENALTY;
            }
        }
        info!(
            per_identity = config.per_identity_limit,
            global = config.global_limit,
            "Admission controller initialized"
        );
        Self {
            config,
            state: Mutex::new(AdmissionState::default()),
        }
    }

    /// Limits in force.
    pub fn config(&self) -> &AdmissionConfig {
        &self.config
    }

    /// Decide on an attempt by `identity` now.
    pub fn check(&self, identity: &str) -> AdmissionDecision {
        self.check_at(identity, Instant::now())
    }

    /// Decide on an attempt by `identity` at `now`.
    ///
    /// Only an accepted attempt is recorded in the windows.
    #[instrument(skip(self, now))]
    pub fn check_at(&self, identity: &str, now: Instant) -> AdmissionDecision {
        let mut guard = self.state.lock();
        let AdmissionState { identities, global } = &mut *guard;

        prune(global, self.config.window, now);
        if global.len() >= self.config.global_limit {
            warn!(in_window = global.len(), "Global command limit reached");
            return AdmissionDecision::GloballyThrottled;
        }

        let state = identities.entry(identity.to_string()).or_default();

        if let Some(until) = state.suspended_until {
            if now < until {
                debug!("Identity suspended");
                return AdmissionDecision::Suspended {
                    remaining: until - now,
                };
            }
            state.suspended_until = None;
        }

        if let Some(until) = state.cooldown_until.take()
            && now < until
        {
            warn!(suspension = ?self.config.suspension, "Attempt during cooldown, suspending");
            state.suspended_until = Some(now + self.config.suspension);
            return AdmissionDecision::Suspended {
                remaining: self.config.suspension,
            };
        }

        prune(&mut state.window, self.config.window, now);
        if state.window.len() >= self.config.per_identity_limit {
            info!(cooldown = ?self.config.cooldown, "Per-identity limit reached");
            state.cooldown_until = Some(now + self.config.cooldown);
            return AdmissionDecision::Cooldown {
                remaining: self.config.cooldown,
            };
        }

        state.window.push_back(now);
        global.push_back(now);
        AdmissionDecision::Accepted
    }

    /// Whether a suspension notice may be sent to `identity` now.
    pub fn can_notify(&self, identity: &str) -> bool {
        self.can_notify_at(identity, Instant::now())
    }

    /// Whether a suspension notice may be sent to `identity` at `now`.
    ///
    /// Returns `true` when more than the notice spacing has passed since the
    /// last notice, and records `now` as the latest notice in that case.
    pub fn can_notify_at(&self, identity: &str, now: Instant) -> bool {
        let mut guard = self.state.lock();
        let state = guard.identities.entry(identity.to_string()).or_default();
        let allowed = state
            .last_notice_at
            .is_none_or(|last| now.saturating_duration_since(last) > self.config.notice_cooldown);
        if allowed {
            state.last_notice_at = Some(now);
        }
        allowed
    }

    /// Drop state for identities with no recent attempts and no active
    /// penalty. Returns how many were dropped.
    ///
    /// Notice history is dropped along with the rest once an identity is idle
    /// for longer than the notice spacing.
    pub fn prune_idle_at(&self, now: Instant) -> usize {
        let mut guard = self.state.lock();
        let window = self.config.window;
        let notice = self.config.notice_cooldown;
        let before = guard.identities.len();
        guard.identities.retain(|_, state| {
            prune(&mut state.window, window, now);
            let notice_recent = state
                .last_notice_at
                .is_some_and(|last| now.saturating_duration_since(last) <= notice);
            !state.is_idle(now) || notice_recent
        });
        let pruned = before - guard.identities.len();
        if pruned > 0 {
            debug!(pruned, "Pruned idle admission state");
        }
        pruned
    }

    /// Number of identities with tracked state.
    pub fn tracked_identities(&self) -> usize {
        self.state.lock().identities.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AdmissionConfig::default();
        assert_eq!(*config.per_identity_limit(), 2);
        assert_eq!(*config.global_limit(), 5);
        assert_eq!(*config.cooldown(), Duration::from_secs(10));
        assert_eq!(*config.suspension(), Duration::from_secs(3600));
    }

    #[test]
    fn test_config_parses_human_durations() {
        let config: AdmissionConfig = toml::from_str(
            r#"
            per_identity_limit = 3
            window = "2s"
            suspension = "30m"
            "#,
        )
        .unwrap();
        assert_eq!(*config.per_identity_limit(), 3);
        assert_eq!(*config.window(), Duration::from_secs(2));
        assert_eq!(*config.suspension(), Duration::from_secs(1800));
        assert_eq!(*config.global_limit(), 5);
    }

    #[test]
    fn test_rejected_attempts_are_not_recorded() {
        let controller = AdmissionController::new(AdmissionConfig::default());
        let t0 = Instant::now();
        assert!(controller.check_at("a", t0).is_accepted());
        assert!(controller.check_at("a", t0).is_accepted());
        assert!(!controller.check_at("a", t0).is_accepted());

        let guard = controller.state.lock();
        assert_eq!(guard.identities["a"].window.len(), 2);
        assert_eq!(guard.global.len(), 2);
    }

    #[test]
    fn test_prune_idle_keeps_penalized_identities() {
        let controller = AdmissionController::new(AdmissionConfig::default());
        let t0 = Instant::now();
        controller.check_at("quiet", t0);
        for _ in 0..4 {
            controller.check_at("noisy", t0);
        }

        let later = t0 + Duration::from_secs(5);
        assert_eq!(controller.prune_idle_at(later), 1);
        assert_eq!(controller.tracked_identities(), 1);
    }
}
