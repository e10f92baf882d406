//! Role predicates shared by the server gates and the client route guard.

use crate::types::Role;

/// Allow-list check.
///
/// `Unset` is only admitted when it appears in `allowed` explicitly, so a
/// missing or empty profile role never grants access by accident.
///
/// ```
/// use autohaul_core::{Role, is_authorized};
///
/// assert!(is_authorized(Role::Employee, &Role::STAFF));
/// assert!(!is_authorized(Role::Unset, &[Role::Client]));
/// ```
#[must_use]
pub fn is_authorized(role: Role, allowed: &[Role]) -> bool {
    allowed.contains(&role)
}

/// Deny-list check used by the client-scoped routes.
///
/// Everyone except staff is admitted, including identities whose profile
/// carries no role. Client routes are filtered by the caller's own email, so
/// an unset role only ever sees its own data.
#[must_use]
pub const fn admits_client(role: Role) -> bool {
    !role.is_staff()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_authorized_allow_list() {
        assert!(is_authorized(Role::Admin, &[Role::Admin]));
        assert!(!is_authorized(Role::Employee, &[Role::Admin]));
        assert!(is_authorized(Role::Employee, &Role::STAFF));
        assert!(!is_authorized(Role::Client, &Role::STAFF));
    }

    #[test]
    fn test_is_authorized_unset_needs_explicit_entry() {
        assert!(!is_authorized(Role::Unset, &Role::RECOGNISED));
        assert!(!is_authorized(Role::Unset, &[]));
        assert!(is_authorized(Role::Unset, &[Role::Client, Role::Unset]));
    }

    #[test]
    fn test_admits_client_deny_list() {
        assert!(admits_client(Role::Unset));
        assert!(admits_client(Role::Client));
        assert!(!admits_client(Role::Admin));
        assert!(!admits_client(Role::Employee));
    }
}
