//! Route access policy.
//!
//! The single source of truth for which profile roles may open which
//! sections of the app. Callers resolve the signed-in profile's role (or
//! `None` for anonymous visitors) and act on the returned [`Access`].

use crate::types::status::Role;

/// Outcome of an access check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Render the page.
    Allow,
    /// Send the visitor to `/auth`, then back.
    RequireLogin,
    /// Signed in, but the role is not enough.
    Forbidden,
}

/// Who may open a section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Gate {
    Public,
    SignedIn,
    Staff,
    AdminOnly,
}

fn gate_for(path: &str) -> Gate {
    let path = path.split(['?', '#']).next().unwrap_or_default();
    let path = path.trim_end_matches('/');
    let first = path.trim_start_matches('/').split('/').next().unwrap_or_default();
    match first {
        "" | "menu" | "plans" | "auth" => Gate::Public,
        "attendant" => Gate::Staff,
        "admin" => Gate::AdminOnly,
        // Checkout, account pages and anything unknown need a session.
        _ => Gate::SignedIn,
    }
}

/// Decide whether `role` may open `path`.
///
/// ```
/// use forno_core::{Access, Role, authorize};
///
/// assert_eq!(authorize("/menu", None), Access::Allow);
/// assert_eq!(authorize("/checkout", None), Access::RequireLogin);
/// assert_eq!(authorize("/admin/products", Some(Role::Attendant)), Access::Forbidden);
/// ```
#[must_use]
pub fn authorize(path: &str, role: Option<Role>) -> Access {
    let gate = gate_for(path);
    let Some(role) = role else {
        return if gate == Gate::Public {
            Access::Allow
        } else {
            Access::RequireLogin
        };
    };
    let allowed = match gate {
        Gate::Public | Gate::SignedIn => true,
        Gate::Staff => matches!(role, Role::Attendant | Role::Admin),
        Gate::AdminOnly => role == Role::Admin,
    };
    if allowed { Access::Allow } else { Access::Forbidden }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_pages() {
        for path in ["/", "/menu", "/plans", "/auth", "/menu?category=doces"] {
            assert_eq!(authorize(path, None), Access::Allow, "{path}");
            assert_eq!(authorize(path, Some(Role::Customer)), Access::Allow);
        }
    }

    #[test]
    fn test_checkout_needs_session() {
        assert_eq!(authorize("/checkout", None), Access::RequireLogin);
        assert_eq!(authorize("/checkout", Some(Role::Customer)), Access::Allow);
    }

    #[test]
    fn test_attendant_board() {
        assert_eq!(authorize("/attendant", None), Access::RequireLogin);
        assert_eq!(
            authorize("/attendant", Some(Role::Customer)),
            Access::Forbidden
        );
        assert_eq!(authorize("/attendant", Some(Role::Attendant)), Access::Allow);
        assert_eq!(authorize("/attendant", Some(Role::Admin)), Access::Allow);
    }

    #[test]
    fn test_admin_section() {
        for path in ["/admin", "/admin/", "/admin/orders", "/admin/stock/42"] {
            assert_eq!(authorize(path, Some(Role::Admin)), Access::Allow, "{path}");
            assert_eq!(
                authorize(path, Some(Role::Attendant)),
                Access::Forbidden,
                "{path}"
            );
            assert_eq!(authorize(path, None), Access::RequireLogin, "{path}");
        }
    }

    #[test]
    fn test_prefix_does_not_leak() {
        // "/administrator" is not the admin section.
        assert_eq!(
            authorize("/administrator", Some(Role::Customer)),
            Access::Allow
        );
    }
}
