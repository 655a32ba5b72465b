use async_trait::async_trait;
use axum::{
    extract::FromRequestParts,
    http::{HeaderMap, header, request::Parts},
};
use jsonwebtoken::{DecodingKey, Validation, decode, errors::ErrorKind};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::error::ApiError;

/// Claims
///
/// The payload expected inside the bearer JWT. Tokens are issued elsewhere; this
/// service only verifies them.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (sub): the user's UUID. Compared against owner fields during
    /// ownership checks.
    pub sub: Uuid,
    /// The RBAC role looked up in the policy table, e.g. "user" or "admin".
    pub role: String,
    /// Expiration Time (exp). Always validated.
    pub exp: usize,
    /// Issued At (iat). Informational; tokens without it are accepted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<usize>,
}

/// Subject
///
/// The authenticated caller, resolved fresh for each request and never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subject {
    pub id: Uuid,
    pub role: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CredentialError {
    #[error("more than one authorization header")]
    Ambiguous,
    #[error("authorization header is not valid ASCII")]
    NotAscii,
    #[error("authorization scheme is not Bearer")]
    WrongScheme,
    #[error("empty bearer token")]
    Empty,
    #[error("token expired")]
    Expired,
    #[error("token rejected: {0}")]
    Rejected(String),
}

/// Extracts the bearer credential from the `Authorization` header.
///
/// Returns `Ok(None)` when the header is absent. The scheme is matched
/// case-insensitively and stripped.
pub fn bearer_token(headers: &HeaderMap) -> Result<Option<&str>, CredentialError> {
    let mut values = headers.get_all(header::AUTHORIZATION).iter();
    let Some(value) = values.next() else {
        return Ok(None);
    };
    if values.next().is_some() {
        return Err(CredentialError::Ambiguous);
    }

    let value = value.to_str().map_err(|_| CredentialError::NotAscii)?;
    let (scheme, token) = value.split_once(' ').ok_or(CredentialError::WrongScheme)?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(CredentialError::WrongScheme);
    }
    let token = token.trim();
    if token.is_empty() {
        return Err(CredentialError::Empty);
    }
    Ok(Some(token))
}

/// IdentityResolver
///
/// Boundary to the credential verifier: turns a raw bearer token into a `Subject`.
/// Implementations must fail for malformed, unverifiable or expired credentials.
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    async fn resolve(&self, token: &str) -> Result<Subject, CredentialError>;
}

/// JwtIdentityResolver
///
/// Verifies HS256 tokens signed with the configured `TOKEN_KEY`.
pub struct JwtIdentityResolver {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtIdentityResolver {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::default();
        // Ensure expiration time validation is always active.
        validation.validate_exp = true;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Self {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }
}

#[async_trait]
impl IdentityResolver for JwtIdentityResolver {
    async fn resolve(&self, token: &str) -> Result<Subject, CredentialError> {
        let data = decode::<Claims>(token, &self.decoding_key, &self.validation).map_err(
            |e| match e.kind() {
                ErrorKind::ExpiredSignature => CredentialError::Expired,
                _ => CredentialError::Rejected(e.to_string()),
            },
        )?;

        if data.claims.role.is_empty() {
            return Err(CredentialError::Rejected("missing role".to_string()));
        }

        Ok(Subject {
            id: data.claims.sub,
            role: data.claims.role,
        })
    }
}

/// Subject Extractor
///
/// The access middleware resolves the caller and stores the `Subject` in the
/// request extensions. Handlers that act on behalf of a caller take `Subject` as an
/// argument; on a public route no subject was resolved, so the extractor rejects
/// with 401 before the handler runs.
impl<S> FromRequestParts<S> for Subject
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Subject>()
            .cloned()
            .ok_or(ApiError::Unauthenticated)
    }
}
