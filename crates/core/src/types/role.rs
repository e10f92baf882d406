//! Caller roles as stored on the `profiles` table.

use core::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Error returned by [`Role::from_str`](std::str::FromStr) for unrecognised input.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unrecognised role: {0:?}")]
pub struct UnknownRole(pub String);

/// Role attached to an authenticated identity.
///
/// The profile store holds a free-form, nullable string. It is folded into
/// this closed set exactly once, at the edge, via [`Role::from_profile`]:
/// the value is trimmed and lowercased, and anything that is not one of the
/// three recognised roles (including `NULL` and the empty string) becomes
/// [`Role::Unset`].
///
/// On the wire a role is its lowercase name, and `Unset` is `null`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Role {
    /// Full back-office access.
    Admin,
    /// Back-office access for operations staff.
    Employee,
    /// A customer using the portal.
    Client,
    /// No recognised role on the profile.
    #[default]
    Unset,
}

impl Role {
    /// Every recognised role, excluding `Unset`.
    pub const RECOGNISED: [Self; 3] = [Self::Admin, Self::Employee, Self::Client];

    /// Back-office roles.
    pub const STAFF: [Self; 2] = [Self::Admin, Self::Employee];

    /// Fold a raw profile value into a role.
    ///
    /// ```
    /// use autohaul_core::Role;
    ///
    /// assert_eq!(Role::from_profile(Some("  Admin ")), Role::Admin);
    /// assert_eq!(Role::from_profile(Some("")), Role::Unset);
    /// assert_eq!(Role::from_profile(None), Role::Unset);
    /// ```
    #[must_use]
    pub fn from_profile(raw: Option<&str>) -> Self {
        raw.and_then(|s| s.parse().ok()).unwrap_or(Self::Unset)
    }

    /// The lowercase name of the role, or `None` for `Unset`.
    #[must_use]
    pub const fn as_str(self) -> Option<&'static str> {
        match self {
            Self::Admin => Some("admin"),
            Self::Employee => Some("employee"),
            Self::Client => Some("client"),
            Self::Unset => None,
        }
    }

    /// Whether this is a back-office role.
    #[must_use]
    pub const fn is_staff(self) -> bool {
        matches!(self, Self::Admin | Self::Employee)
    }

    /// Whether the profile carried a recognised role.
    #[must_use]
    pub const fn is_set(self) -> bool {
        !matches!(self, Self::Unset)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str().unwrap_or("unset"))
    }
}

impl std::str::FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "admin" => Ok(Self::Admin),
            "employee" => Ok(Self::Employee),
            "client" => Ok(Self::Client),
            _ => Err(UnknownRole(s.to_string())),
        }
    }
}

impl Serialize for Role {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.as_str().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Role {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(Self::from_profile(raw.as_deref()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_from_profile_normalizes_case_and_whitespace() {
        assert_eq!(Role::from_profile(Some("ADMIN")), Role::Admin);
        assert_eq!(Role::from_profile(Some(" employee\n")), Role::Employee);
        assert_eq!(Role::from_profile(Some("Client")), Role::Client);
    }

    #[test]
    fn test_from_profile_empty_and_unknown_are_unset() {
        assert_eq!(Role::from_profile(Some("")), Role::Unset);
        assert_eq!(Role::from_profile(Some("   ")), Role::Unset);
        assert_eq!(Role::from_profile(Some("superuser")), Role::Unset);
        assert_eq!(Role::from_profile(None), Role::Unset);
    }

    #[test]
    fn test_from_str_rejects_empty() {
        assert!("".parse::<Role>().is_err());
        assert_eq!("admin".parse::<Role>().unwrap(), Role::Admin);
    }

    #[test]
    fn test_is_staff() {
        assert!(Role::Admin.is_staff());
        assert!(Role::Employee.is_staff());
        assert!(!Role::Client.is_staff());
        assert!(!Role::Unset.is_staff());
    }

    #[test]
    fn test_serde_uses_null_for_unset() {
        assert_eq!(serde_json::to_string(&Role::Employee).unwrap(), "\"employee\"");
        assert_eq!(serde_json::to_string(&Role::Unset).unwrap(), "null");

        let parsed: Role = serde_json::from_str("null").unwrap();
        assert_eq!(parsed, Role::Unset);
        let parsed: Role = serde_json::from_str("\" Admin \"").unwrap();
        assert_eq!(parsed, Role::Admin);
    }
}
