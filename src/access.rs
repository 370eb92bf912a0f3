use std::fmt;

use crate::transition::ScheduledTransition;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransitionOperation {
    View,
    Update,
    Delete,
    Reschedule,
}

impl TransitionOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransitionOperation::View => "view",
            TransitionOperation::Update => "update",
            TransitionOperation::Delete => "delete",
            TransitionOperation::Reschedule => "reschedule",
        }
    }

    /// Operations that modify the record, refused once it is processed.
    pub fn is_mutation(&self) -> bool {
        !matches!(self, TransitionOperation::View)
    }
}

impl fmt::Display for TransitionOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Three-valued access decision. Forbidden always wins when combined.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessResult {
    Allowed,
    Neutral,
    Forbidden(String),
}

impl AccessResult {
    pub fn forbidden_if(condition: bool, reason: impl Into<String>) -> Self {
        if condition {
            AccessResult::Forbidden(reason.into())
        } else {
            AccessResult::Neutral
        }
    }

    pub fn is_allowed(&self) -> bool {
        matches!(self, AccessResult::Allowed)
    }

    pub fn is_neutral(&self) -> bool {
        matches!(self, AccessResult::Neutral)
    }

    pub fn is_forbidden(&self) -> bool {
        matches!(self, AccessResult::Forbidden(_))
    }

    /// Allowed only if both are allowed.
    pub fn and_if(self, other: AccessResult) -> AccessResult {
        match (self, other) {
            (forbidden @ AccessResult::Forbidden(_), _) => forbidden,
            (_, forbidden @ AccessResult::Forbidden(_)) => forbidden,
            (AccessResult::Allowed, AccessResult::Allowed) => AccessResult::Allowed,
            _ => AccessResult::Neutral,
        }
    }

    /// Allowed if either is allowed and neither forbids.
    pub fn or_if(self, other: AccessResult) -> AccessResult {
        match (self, other) {
            (forbidden @ AccessResult::Forbidden(_), _) => forbidden,
            (_, forbidden @ AccessResult::Forbidden(_)) => forbidden,
            (AccessResult::Allowed, _) | (_, AccessResult::Allowed) => AccessResult::Allowed,
            _ => AccessResult::Neutral,
        }
    }
}

/// Decide access to `operation` on a scheduled transition.
///
/// `base` is the caller's own permission result. When it is neutral and the
/// target entity answered, that answer is final: `target_access` is the
/// target entity's result for the same operation. Otherwise rescheduling
/// also needs `target_reschedule_access`, and mutations of a processed
/// transition are forbidden.
pub fn check_access(
    transition: &ScheduledTransition,
    operation: TransitionOperation,
    base: AccessResult,
    target_access: Option<AccessResult>,
    target_reschedule_access: Option<AccessResult>,
) -> AccessResult {
    let mut access = match (base, target_access) {
        (AccessResult::Neutral, Some(target)) => return target,
        (base, _) => base,
    };

    if operation == TransitionOperation::Reschedule {
        if let Some(reschedule) = target_reschedule_access {
            access = access.and_if(reschedule);
        }
    }

    if operation.is_mutation() {
        access = access.or_if(AccessResult::forbidden_if(
            transition.is_processed(),
            format!("Cannot `{operation}` when Scheduled Transition has been processed."),
        ));
    }

    access
}
