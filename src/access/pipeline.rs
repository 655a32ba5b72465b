//! AccessPipeline: classify, authenticate and authorize every inbound request.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{HeaderMap, Method},
    middleware::Next,
    response::{IntoResponse, Response},
};

use super::{policy::PolicyEnforcer, public::PathClassifier};
use crate::{
    auth::{IdentityResolver, Subject, bearer_token},
    error::ApiError,
};

/// Result of a successful pipeline pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Access {
    /// Matched a public route; no identity was resolved.
    Public,
    /// Authenticated and allowed by the coarse policy.
    Authorized(Subject),
}

/// AccessPipeline
///
/// Shared, immutable orchestrator. Holds no per-request state.
#[derive(Clone)]
pub struct AccessPipeline {
    classifier: Arc<PathClassifier>,
    resolver: Arc<dyn IdentityResolver>,
    enforcer: Arc<PolicyEnforcer>,
}

impl AccessPipeline {
    pub fn new(
        classifier: Arc<PathClassifier>,
        resolver: Arc<dyn IdentityResolver>,
        enforcer: Arc<PolicyEnforcer>,
    ) -> Self {
        Self {
            classifier,
            resolver,
            enforcer,
        }
    }

    pub fn enforcer(&self) -> &PolicyEnforcer {
        &self.enforcer
    }

    pub async fn evaluate(
        &self,
        method: &Method,
        path: &str,
        headers: &HeaderMap,
    ) -> Result<Access, ApiError> {
        if self.classifier.is_public(path, method) {
            return Ok(Access::Public);
        }

        let token = match bearer_token(headers) {
            Ok(Some(token)) => token,
            Ok(None) => {
                tracing::debug!(%method, path, "missing credential");
                return Err(ApiError::Unauthenticated);
            }
            Err(err) => {
                tracing::debug!(%method, path, error = %err, "malformed credential");
                return Err(ApiError::Unauthenticated);
            }
        };

        let subject = self.resolver.resolve(token).await.map_err(|err| {
            tracing::debug!(%method, path, error = %err, "credential rejected");
            ApiError::Unauthenticated
        })?;

        let decision = self.enforcer.enforce(&subject.role, path, method);
        if !decision.is_allowed() {
            tracing::warn!(
                subject = %subject.id,
                role = %subject.role,
                %method,
                path,
                reason = ?decision.reason(),
                "policy denied"
            );
            return Err(ApiError::PermissionDenied);
        }

        Ok(Access::Authorized(subject))
    }
}

/// access_middleware
///
/// Runs the pipeline before any routing decision. On success the resolved `Subject`
/// (if any) is inserted into the request extensions for the `Subject` extractor.
pub async fn access_middleware(
    State(pipeline): State<Arc<AccessPipeline>>,
    mut request: Request,
    next: Next,
) -> Response {
    let access = pipeline
        .evaluate(request.method(), request.uri().path(), request.headers())
        .await;

    match access {
        Ok(Access::Public) => next.run(request).await,
        Ok(Access::Authorized(subject)) => {
            request.extensions_mut().insert(subject);
            next.run(request).await
        }
        Err(err) => err.into_response(),
    }
}
