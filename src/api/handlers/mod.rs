//! Route handlers for the authenticated-session API.

pub mod greeting;
pub mod health;
pub mod me;
