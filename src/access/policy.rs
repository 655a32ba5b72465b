//! PolicyEnforcer: coarse role/path/method authorization backed by Casbin.
//!
//! Rules come from a CSV file with two kinds of lines:
//!
//! ```text
//! # role rules
//! p, user, /v1/cars/{id}, DELETE
//! # role inheritance: admin gets everything user has
//! g, admin, user
//! ```
//!
//! The table is loaded into a `casbin::Enforcer` built from the shipped
//! `policy/model.conf`. Role links, the matcher and the allow effect are Casbin's.
//! Each built enforcer is an immutable snapshot behind an `ArcSwap`: lookups load
//! the current snapshot without locking and `reload` replaces it in one pointer swap.

use std::{fs, path::Path, sync::Arc};

use arc_swap::ArcSwap;
use axum::http::Method;
use casbin::{CoreApi, DefaultModel, Enforcer, MemoryAdapter, MgmtApi};
use thiserror::Error;

use super::{
    decision::{AccessDecision, DecisionReason},
    public::parse_method,
    template::{PathTemplate, TemplateError, split_path},
};

/// Casbin model: `sub` is the role, `obj` the request path, `act` the HTTP method.
pub const MODEL_CONF: &str = include_str!("../../policy/model.conf");

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("line {line}: expected `p, role, pattern, action` or `g, role, parent`")]
    MalformedLine { line: usize },
    #[error("line {line}: invalid pattern: {source}")]
    InvalidPattern {
        line: usize,
        #[source]
        source: TemplateError,
    },
    #[error("invalid pattern {pattern}: {source}")]
    InvalidRulePattern {
        pattern: String,
        #[source]
        source: TemplateError,
    },
    #[error("catch-all segments are not allowed in policy patterns: {0}")]
    CatchAllPattern(String),
    #[error("unknown action '{0}'")]
    UnknownAction(String),
    #[error("failed to read policy file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed request path: {0}")]
    MalformedPath(#[from] TemplateError),
    #[error("casbin: {0}")]
    Casbin(#[from] casbin::Error),
}

/// PolicyRule
///
/// A declarative `(role, resource_pattern, action)` grant. `action` is an HTTP method
/// name or `*` for every method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyRule {
    pub role: String,
    pub resource_pattern: String,
    pub action: String,
}

impl PolicyRule {
    pub fn new(role: &str, resource_pattern: &str, action: &str) -> Self {
        Self {
            role: role.to_string(),
            resource_pattern: resource_pattern.to_string(),
            action: action.to_string(),
        }
    }
}

/// `role` inherits every grant of `parent`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleInheritance {
    pub role: String,
    pub parent: String,
}

/// The raw rule table, as read from the CSV file.
#[derive(Debug, Clone, Default)]
pub struct PolicyTable {
    pub rules: Vec<PolicyRule>,
    pub inheritance: Vec<RoleInheritance>,
}

impl PolicyTable {
    pub fn parse(src: &str) -> Result<Self, PolicyError> {
        let mut table = PolicyTable::default();

        for (idx, raw_line) in src.lines().enumerate() {
            let line = idx + 1;
            let trimmed = raw_line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let fields: Vec<&str> = trimmed.split(',').map(str::trim).collect();
            if fields.iter().any(|f| f.is_empty()) {
                return Err(PolicyError::MalformedLine { line });
            }
            match fields.as_slice() {
                ["p", role, pattern, action] => {
                    pattern
                        .parse::<PathTemplate>()
                        .map_err(|source| PolicyError::InvalidPattern { line, source })?;
                    casbin_action(action)?;
                    table.rules.push(PolicyRule::new(role, pattern, action));
                }
                ["g", role, parent] => table.inheritance.push(RoleInheritance {
                    role: role.to_string(),
                    parent: parent.to_string(),
                }),
                _ => return Err(PolicyError::MalformedLine { line }),
            }
        }

        Ok(table)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, PolicyError> {
        let path = path.as_ref();
        let src = fs::read_to_string(path).map_err(|source| PolicyError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&src)
    }
}

/// Canonical Casbin `act` for a rule: `*` or the upper-case method name.
fn casbin_action(raw: &str) -> Result<String, PolicyError> {
    if raw == "*" {
        return Ok(raw.to_string());
    }
    parse_method(raw)
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| PolicyError::UnknownAction(raw.to_string()))
}

/// Rewrites a `{param}` template into the `:param` form `keyMatch2` expects.
///
/// `keyMatch2` turns each `:param` into `[^/]+` and anchors the whole pattern, so a
/// parameter still matches exactly one segment. Catch-alls have no single-segment
/// equivalent and are rejected.
fn casbin_object(pattern: &str) -> Result<String, PolicyError> {
    pattern
        .parse::<PathTemplate>()
        .map_err(|source| PolicyError::InvalidRulePattern {
            pattern: pattern.to_string(),
            source,
        })?;

    let mut object = String::new();
    for segment in split_path(pattern)? {
        object.push('/');
        if segment == "*" {
            object.push_str(":param");
        } else if let Some(name) = segment.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
            if name.starts_with('*') {
                return Err(PolicyError::CatchAllPattern(pattern.to_string()));
            }
            object.push(':');
            object.push_str(name);
        } else {
            object.push_str(segment);
        }
    }
    if object.is_empty() {
        object.push('/');
    }
    Ok(object)
}

/// A built Casbin enforcer for one version of the table.
pub struct PolicySnapshot {
    version: u64,
    enforcer: Enforcer,
}

impl PolicySnapshot {
    async fn build(table: &PolicyTable, version: u64) -> Result<Self, PolicyError> {
        let model = DefaultModel::from_str(MODEL_CONF).await?;
        let mut enforcer = Enforcer::new(model, MemoryAdapter::default()).await?;

        for rule in &table.rules {
            enforcer
                .add_policy(vec![
                    rule.role.clone(),
                    casbin_object(&rule.resource_pattern)?,
                    casbin_action(&rule.action)?,
                ])
                .await?;
        }
        for link in &table.inheritance {
            enforcer
                .add_grouping_policy(vec![link.role.clone(), link.parent.clone()])
                .await?;
        }
        enforcer.build_role_links()?;

        Ok(Self { version, enforcer })
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    fn evaluate(&self, role: &str, path: &str, method: &Method) -> Result<bool, PolicyError> {
        // Same segment rules as the classifier: `//` is rejected, one trailing `/` ignored.
        let segments = split_path(path)?;
        let path = format!("/{}", segments.join("/"));
        Ok(self.enforcer.enforce((role, path.as_str(), method.as_str()))?)
    }
}

/// PolicyEnforcer
///
/// Safe for unlimited concurrent readers. Every decision is a pure function of the
/// snapshot it loaded, the role, the path and the method.
pub struct PolicyEnforcer {
    snapshot: ArcSwap<PolicySnapshot>,
}

impl PolicyEnforcer {
    pub async fn new(table: &PolicyTable) -> Result<Self, PolicyError> {
        let snapshot = PolicySnapshot::build(table, 1).await?;
        Ok(Self {
            snapshot: ArcSwap::from_pointee(snapshot),
        })
    }

    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, PolicyError> {
        Self::new(&PolicyTable::load(path)?).await
    }

    /// Decides whether `role` may perform `action` on `resource_path`. Evaluation
    /// errors deny.
    pub fn enforce(&self, role: &str, resource_path: &str, action: &Method) -> AccessDecision {
        let snapshot = self.snapshot.load();
        match snapshot.evaluate(role, resource_path, action) {
            Ok(true) => AccessDecision::allow(DecisionReason::RuleMatched),
            Ok(false) => AccessDecision::deny(DecisionReason::NoMatchingRule),
            Err(err) => {
                tracing::warn!(
                    role,
                    path = resource_path,
                    method = %action,
                    error = %err,
                    "policy evaluation failed"
                );
                AccessDecision::deny(DecisionReason::EvaluationFailed)
            }
        }
    }

    /// Builds an enforcer for `table` and swaps it in. On error the current snapshot
    /// stays active.
    pub async fn reload(&self, table: &PolicyTable) -> Result<u64, PolicyError> {
        let next_version = self.snapshot.load().version() + 1;
        let snapshot = PolicySnapshot::build(table, next_version).await?;
        self.snapshot.store(Arc::new(snapshot));
        tracing::info!(version = next_version, "policy table reloaded");
        Ok(next_version)
    }

    pub fn version(&self) -> u64 {
        self.snapshot.load().version()
    }
}
