//! Access control: public-route classification, coarse role policy and per-instance
//! ownership, wired together by the access pipeline middleware.

pub mod decision;
pub mod ownership;
pub mod pipeline;
pub mod policy;
pub mod public;
pub mod template;

pub use decision::{AccessDecision, DecisionReason};
pub use ownership::{OwnershipStore, OwnershipVerifier, ResourceKind, parse_id};
pub use pipeline::{Access, AccessPipeline, access_middleware};
pub use policy::{PolicyEnforcer, PolicyError, PolicyRule, PolicyTable, RoleInheritance};
pub use public::{PathClassifier, PublicRoute, RouteSpec, RouteTableError};
