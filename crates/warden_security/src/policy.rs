//! Per-command authorization policy.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use warden_core::{Role, WILDCARD_SCOPE, fold_scope};

/// Minimum role and allowed scopes for one command.
///
/// An empty scope list, or one containing `*`, allows the command everywhere.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandPolicy {
    /// Minimum role required to run the command
    pub role: Role,
    /// Scopes where the command may be issued
    #[serde(default)]
    pub scopes: Vec<String>,
}

impl CommandPolicy {
    /// Policy allowing the command everywhere for `role` and above.
    pub fn new(role: Role) -> Self {
        Self {
            role,
            scopes: Vec::new(),
        }
    }

    /// Restrict the command to `scopes`.
    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    /// Whether the command may be issued in `scope`.
    ///
    /// Scopes are compared folded, as the identity directory stores them.
    pub fn allows_scope(&self, scope: &str) -> bool {
        let scope = fold_scope(scope);
        self.scopes.is_empty()
            || self
                .scopes
                .iter()
                .any(|allowed| allowed == WILDCARD_SCOPE || fold_scope(allowed) == scope)
    }
}

/// Policies keyed by command name.
pub type CommandPolicies = HashMap<String, CommandPolicy>;
