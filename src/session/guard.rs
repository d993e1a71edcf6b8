//! Client route-guard policy.
//!
//! Pure decision logic: rendering and navigation belong to the host UI, the
//! policy here only decides. History for the sign-in redirect must be
//! replaced, not pushed, so back-navigation cannot return to the protected
//! view.

use super::Session;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteDecision {
    /// Bootstrap still in progress: show a neutral waiting state, never
    /// navigate.
    Wait,
    /// No identity: navigate to the sign-in entry point (replace history).
    RedirectToSignIn,
    /// Identity present: render the protected children.
    Render,
}

/// Decide what a protected route renders for the given session.
#[must_use]
pub fn route_decision(session: &Session) -> RouteDecision {
    if session.loading {
        return RouteDecision::Wait;
    }
    if session.user.is_none() {
        return RouteDecision::RedirectToSignIn;
    }
    RouteDecision::Render
}
