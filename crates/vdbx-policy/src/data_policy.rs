//! Data policy model
//!
//! A data policy is a named set of permissions a user is granted inside one
//! virtual database. Policies are mapped to roles; a user's allowed policies
//! are the ones whose roles they hold.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use crate::PolicyError;

/// Kind of access a permission can grant or revoke
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionType {
    Create,
    Read,
    Update,
    Delete,
    Execute,
    Alter,
    Language,
}

impl fmt::Display for PermissionType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PermissionType::Create => write!(f, "CREATE"),
            PermissionType::Read => write!(f, "READ"),
            PermissionType::Update => write!(f, "UPDATE"),
            PermissionType::Delete => write!(f, "DELETE"),
            PermissionType::Execute => write!(f, "EXECUTE"),
            PermissionType::Alter => write!(f, "ALTER"),
            PermissionType::Language => write!(f, "LANGUAGE"),
        }
    }
}

/// Permission on a single resource (schema, table, column, procedure)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    /// Dotted resource path, e.g. `sales.orders.amount`
    pub resource_name: String,

    /// Explicit grants (`true`) and revocations (`false`).
    /// Actions not listed are inherited from less specific resources.
    #[serde(default)]
    pub actions: BTreeMap<PermissionType, bool>,

    /// Row filter applied when reading through this permission
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,

    /// Column mask expression
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mask: Option<String>,
}

impl Permission {
    pub fn new(resource_name: impl Into<String>) -> Self {
        Self {
            resource_name: resource_name.into(),
            actions: BTreeMap::new(),
            condition: None,
            mask: None,
        }
    }

    pub fn allow(mut self, action: PermissionType) -> Self {
        self.actions.insert(action, true);
        self
    }

    pub fn revoke(mut self, action: PermissionType) -> Self {
        self.actions.insert(action, false);
        self
    }

    pub fn with_condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }

    pub fn with_mask(mut self, mask: impl Into<String>) -> Self {
        self.mask = Some(mask.into());
        self
    }

    /// Explicit decision for `action`, if this permission makes one
    pub fn decision(&self, action: PermissionType) -> Option<bool> {
        self.actions.get(&action).copied()
    }

    /// Number of path segments shared with `resource` when this permission
    /// covers it, `None` otherwise.
    ///
    /// Matching is case-insensitive; `a.b` covers `a.b` and `a.b.c` but not `a.bc`.
    pub fn specificity(&self, resource: &str) -> Option<usize> {
        let granted = self.resource_name.to_ascii_lowercase();
        let target = resource.to_ascii_lowercase();

        if granted.is_empty() {
            return None;
        }
        if target == granted
            || (target.starts_with(&granted) && target[granted.len()..].starts_with('.'))
        {
            Some(granted.split('.').count())
        } else {
            None
        }
    }
}

/// A named authorization rule set within one VDB
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataPolicy {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Applies to every authenticated user regardless of roles
    #[serde(default)]
    pub any_authenticated: bool,

    #[serde(default)]
    pub allow_create_temporary_tables: bool,

    #[serde(default)]
    pub mapped_role_names: BTreeSet<String>,

    #[serde(default)]
    pub permissions: Vec<Permission>,
}

impl DataPolicy {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            any_authenticated: false,
            allow_create_temporary_tables: false,
            mapped_role_names: BTreeSet::new(),
            permissions: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn any_authenticated(mut self) -> Self {
        self.any_authenticated = true;
        self
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.mapped_role_names.insert(role.into());
        self
    }

    pub fn with_permission(mut self, permission: Permission) -> Self {
        self.permissions.push(permission);
        self
    }

    pub fn allow_temporary_tables(mut self) -> Self {
        self.allow_create_temporary_tables = true;
        self
    }

    /// Whether a principal holding `roles` is granted this policy
    pub fn applies_to<'a, I>(&self, roles: I) -> bool
    where
        I: IntoIterator<Item = &'a String>,
    {
        self.any_authenticated
            || roles
                .into_iter()
                .any(|role| self.mapped_role_names.contains(role))
    }

    /// Load a list of policies from YAML
    pub fn list_from_yaml(yaml: &str) -> Result<Vec<Self>, PolicyError> {
        let policies: Vec<Self> = serde_yaml::from_str(yaml)?;
        for policy in &policies {
            if policy.name.trim().is_empty() {
                return Err(PolicyError::Invalid("policy without a name".to_string()));
            }
        }
        Ok(policies)
    }
}

/// Select the policies a principal is allowed, keyed by policy name.
///
/// The result is empty, never absent, when nothing applies.
pub fn resolve_allowed<'a, R>(
    policies: &[DataPolicy],
    roles: R,
) -> HashMap<String, DataPolicy>
where
    R: IntoIterator<Item = &'a String> + Clone,
{
    policies
        .iter()
        .filter(|policy| policy.applies_to(roles.clone()))
        .map(|policy| (policy.name.clone(), policy.clone()))
        .collect()
}
