//! Role ladder for command authorization.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use warden_error::{SecurityError, SecurityErrorKind, SecurityResult};

/// Closed, totally ordered set of roles.
///
/// Variants are declared in ascending privilege so the derived `Ord` agrees
/// with [`Role::level`]. Authorization always compares levels, never names.
///
/// # Examples
///
/// ```
/// use warden_core::Role;
///
/// assert!(Role::Owner.permits(Role::Admin));
/// assert!(!Role::Trusted.permits(Role::Admin));
/// assert_eq!(Role::from_name("admin").unwrap(), Role::Admin);
/// assert_eq!(format!("{}", Role::BadBoy), "BadBoy");
/// ```
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Default,
    Serialize,
    Deserialize,
    derive_more::Display,
    strum::EnumIter,
    strum::EnumString,
)]
#[serde(try_from = "String")]
#[strum(ascii_case_insensitive)]
pub enum Role {
    /// Explicitly distrusted; denied every command
    BadBoy,
    /// Default role of any unknown identity
    #[default]
    Everyone,
    /// Trusted regular
    Trusted,
    /// Scope administrator
    Admin,
    /// Single global owner
    Owner,
}

impl Role {
    /// Integer rank used for `>=` comparisons.
    pub fn level(self) -> i32 {
        match self {
            Role::BadBoy => -10,
            Role::Everyone => 0,
            Role::Trusted => 3,
            Role::Admin => 5,
            Role::Owner => 10,
        }
    }

    /// Whether this role satisfies a `required` role.
    pub fn permits(self, required: Role) -> bool {
        self.level() >= required.level()
    }

    /// Parse a role name case-insensitively.
    ///
    /// Names outside the closed set are rejected rather than mapped to a
    /// default.
    #[track_caller]
    pub fn from_name(name: &str) -> SecurityResult<Self> {
        Role::from_str(name.trim())
            .map_err(|_| SecurityError::new(SecurityErrorKind::InvalidRole(name.to_string())))
    }

    /// Comma separated list of every role name, lowest first.
    pub fn names() -> String {
        use strum::IntoEnumIterator;
        Role::iter()
            .map(|role| role.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl TryFrom<String> for Role {
    type Error = SecurityError;

    fn try_from(name: String) -> Result<Self, Self::Error> {
        Role::from_name(&name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levels_follow_declaration_order() {
        let ordered = [
            Role::BadBoy,
            Role::Everyone,
            Role::Trusted,
            Role::Admin,
            Role::Owner,
        ];
        for pair in ordered.windows(2) {
            assert!(pair[0] < pair[1]);
            assert!(pair[0].level() < pair[1].level());
        }
    }

    #[test]
    fn test_from_name_is_case_insensitive() {
        assert_eq!(Role::from_name("OWNER").unwrap(), Role::Owner);
        assert_eq!(Role::from_name("badboy").unwrap(), Role::BadBoy);
        assert_eq!(Role::from_name(" Trusted ").unwrap(), Role::Trusted);
    }

    #[test]
    fn test_from_name_rejects_unknown() {
        let err = Role::from_name("Regular").unwrap_err();
        assert!(matches!(err.kind, SecurityErrorKind::InvalidRole(ref name) if name == "Regular"));
    }

    #[test]
    fn test_badboy_permits_nothing_above_it() {
        assert!(!Role::BadBoy.permits(Role::Everyone));
        assert!(Role::Everyone.permits(Role::Everyone));
    }

    #[test]
    fn test_deserialize_accepts_any_case() {
        let role: Role = serde_json::from_str("\"admin\"").unwrap();
        assert_eq!(role, Role::Admin);
        assert_eq!(serde_json::to_string(&role).unwrap(), "\"Admin\"");
        assert!(serde_json::from_str::<Role>("\"Regular\"").is_err());
    }

    #[test]
    fn test_names_lists_all_roles() {
        assert_eq!(Role::names(), "BadBoy, Everyone, Trusted, Admin, Owner");
    }
}
