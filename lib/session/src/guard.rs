//! Navigation guard for protected screens.

use crate::store::SessionStore;
use crate::user::Role;

/// What a screen requires of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteRequirement {
    /// Any signed-in user.
    Authenticated,
    /// A signed-in administrator.
    Administrator,
}

/// Outcome of checking a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteDecision {
    Allow,
    /// Not signed in: send the user to the login screen.
    RedirectToLogin,
    /// Signed in without the required role: send the user home.
    RedirectToHome,
}

/// Decides whether the current session may open a screen.
#[derive(Debug, Clone, Copy, Default)]
pub struct RouteGuard;

impl RouteGuard {
    /// Checks `requirement` against the current session.
    ///
    /// Uses the locally known session state only; an expired token redirects
    /// to login without contacting the backend.
    #[must_use]
    pub fn check(session: &SessionStore, requirement: RouteRequirement) -> RouteDecision {
        if !session.is_authenticated() {
            return RouteDecision::RedirectToLogin;
        }
        match requirement {
            RouteRequirement::Authenticated => RouteDecision::Allow,
            RouteRequirement::Administrator if session.has_role(Role::Administrator) => {
                RouteDecision::Allow
            }
            RouteRequirement::Administrator => RouteDecision::RedirectToHome,
        }
    }
}
