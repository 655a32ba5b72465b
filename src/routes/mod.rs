//! Router Module Index
//!
//! Routes are grouped by resource rather than by access level: whether a route is
//! public, role-gated or owner-only is decided by the access pipeline layered over
//! the whole router, and by the ownership checks inside the mutating handlers.

/// Versioned marketplace API, nested under `/v1`.
pub mod v1;
