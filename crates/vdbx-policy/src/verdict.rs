//! Verdict types for access checks
//!
//! Provides Allow/Deny verdicts together with the row conditions and column
//! masks the granting policies attach.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::data_policy::PermissionType;

/// The result of checking one action on one resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    /// Access is granted
    Allow {
        /// Policy whose permission decided the check
        policy: String,
        /// Row filters that must be applied
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        conditions: Vec<String>,
        /// Column mask, if one applies
        #[serde(default, skip_serializing_if = "Option::is_none")]
        mask: Option<String>,
    },

    /// Access is refused
    Deny {
        reason: String,
    },
}

impl Verdict {
    pub fn allow(policy: impl Into<String>) -> Self {
        Verdict::Allow {
            policy: policy.into(),
            conditions: Vec::new(),
            mask: None,
        }
    }

    pub fn deny(reason: impl Into<String>) -> Self {
        Verdict::Deny {
            reason: reason.into(),
        }
    }

    /// Denial for an action nobody granted
    pub fn not_granted(resource: &str, action: PermissionType) -> Self {
        Verdict::deny(format!("{} on {} is not granted by any allowed policy", action, resource))
    }

    pub fn is_allowed(&self) -> bool {
        matches!(self, Verdict::Allow { .. })
    }

    pub fn is_denied(&self) -> bool {
        matches!(self, Verdict::Deny { .. })
    }

    pub fn conditions(&self) -> &[String] {
        match self {
            Verdict::Allow { conditions, .. } => conditions,
            Verdict::Deny { .. } => &[],
        }
    }

    pub fn mask(&self) -> Option<&str> {
        match self {
            Verdict::Allow { mask, .. } => mask.as_deref(),
            Verdict::Deny { .. } => None,
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Verdict::Allow { policy, .. } => write!(f, "ALLOW ({})", policy),
            Verdict::Deny { reason } => write!(f, "DENY: {}", reason),
        }
    }
}
