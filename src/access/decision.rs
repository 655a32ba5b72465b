use serde::Serialize;

/// Why a decision came out the way it did. Reasons are for logs and tests; callers
/// only ever see the mapped `ApiError`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionReason {
    RuleMatched,
    NoMatchingRule,
    Owner,
    NotOwner,
    /// The table or the persistence predicate could not be evaluated.
    EvaluationFailed,
}

/// AccessDecision
///
/// Output of `PolicyEnforcer::enforce` and `OwnershipVerifier::check_ownership`.
/// Only constructible through `allow`/`deny`, so `allow` and `reason` are always
/// set together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AccessDecision {
    allow: bool,
    reason: DecisionReason,
}

impl AccessDecision {
    pub fn allow(reason: DecisionReason) -> Self {
        Self {
            allow: true,
            reason,
        }
    }

    pub fn deny(reason: DecisionReason) -> Self {
        Self {
            allow: false,
            reason,
        }
    }

    pub fn is_allowed(&self) -> bool {
        self.allow
    }

    pub fn reason(&self) -> DecisionReason {
        self.reason
    }
}
