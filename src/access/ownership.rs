//! OwnershipVerifier: fine-grained, per-instance authorization for mutations.

use std::{fmt, sync::Arc};

use async_trait::async_trait;
use uuid::Uuid;

use super::decision::{AccessDecision, DecisionReason};
use crate::{auth::Subject, error::ApiError};

/// The resource kinds that carry an owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Car,
    SavedCar,
    Comment,
    Message,
    NotificationToken,
    /// Owned by whoever owns the image's car.
    Image,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Car => "car",
            ResourceKind::SavedCar => "saved_car",
            ResourceKind::Comment => "comment",
            ResourceKind::Message => "message",
            ResourceKind::NotificationToken => "notification_token",
            ResourceKind::Image => "image",
        }
    }

    /// The existence predicate for `(resource id = $1, owner = $2)`.
    pub fn ownership_query(&self) -> &'static str {
        match self {
            ResourceKind::Car => {
                "SELECT EXISTS(SELECT 1 FROM cars WHERE id = $1 AND owner_id = $2)"
            }
            ResourceKind::SavedCar => {
                "SELECT EXISTS(SELECT 1 FROM saved_cars WHERE id = $1 AND user_id = $2)"
            }
            ResourceKind::Comment => {
                "SELECT EXISTS(SELECT 1 FROM comments WHERE id = $1 AND user_id = $2)"
            }
            ResourceKind::Message => {
                "SELECT EXISTS(SELECT 1 FROM messages WHERE id = $1 AND sender_id = $2)"
            }
            ResourceKind::NotificationToken => {
                "SELECT EXISTS(SELECT 1 FROM notification_tokens WHERE id = $1 AND user_id = $2)"
            }
            ResourceKind::Image => {
                "SELECT EXISTS(SELECT 1 FROM images i JOIN cars c ON c.id = i.car_id \
                 WHERE i.id = $1 AND c.owner_id = $2)"
            }
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// OwnershipStore
///
/// The persistence predicate behind ownership checks. Returns `Ok(false)` both for
/// "exists but owned by someone else" and for "does not exist".
#[async_trait]
pub trait OwnershipStore: Send + Sync {
    async fn is_owner(
        &self,
        kind: ResourceKind,
        resource_id: Uuid,
        subject_id: Uuid,
    ) -> Result<bool, sqlx::Error>;
}

/// OwnershipVerifier
///
/// Every mutating handler on an existing resource calls `require_ownership` with the
/// identifier taken from its path before it touches persistence.
#[derive(Clone)]
pub struct OwnershipVerifier {
    store: Arc<dyn OwnershipStore>,
}

impl OwnershipVerifier {
    pub fn new(store: Arc<dyn OwnershipStore>) -> Self {
        Self { store }
    }

    /// Not-owner, not-found and lookup failures all deny.
    pub async fn check_ownership(
        &self,
        kind: ResourceKind,
        subject: &Subject,
        resource_id: Uuid,
    ) -> AccessDecision {
        match self.store.is_owner(kind, resource_id, subject.id).await {
            Ok(true) => AccessDecision::allow(DecisionReason::Owner),
            Ok(false) => AccessDecision::deny(DecisionReason::NotOwner),
            Err(err) => {
                tracing::error!(
                    subject = %subject.id,
                    resource_id = %resource_id,
                    kind = %kind,
                    error = ?err,
                    "ownership lookup failed"
                );
                AccessDecision::deny(DecisionReason::EvaluationFailed)
            }
        }
    }

    /// Parses `raw_id`, checks ownership and returns the parsed id on success.
    ///
    /// A malformed id is `InvalidArgument` and the store is never consulted. Every deny
    /// maps to the same `PermissionDenied`.
    pub async fn require_ownership(
        &self,
        kind: ResourceKind,
        raw_id: &str,
        subject: &Subject,
    ) -> Result<Uuid, ApiError> {
        let resource_id = parse_id(raw_id, kind.as_str())?;
        let decision = self.check_ownership(kind, subject, resource_id).await;
        if decision.is_allowed() {
            Ok(resource_id)
        } else {
            tracing::debug!(
                subject = %subject.id,
                resource_id = %resource_id,
                kind = %kind,
                reason = ?decision.reason(),
                "ownership denied"
            );
            Err(ApiError::PermissionDenied)
        }
    }
}

/// Parses a path identifier, naming the resource in the error message.
pub fn parse_id(raw: &str, what: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::invalid(format!("invalid {what} id format")))
}
