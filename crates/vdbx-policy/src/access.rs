//! Access evaluation over a set of allowed data policies
//!
//! The most specific permission that makes an explicit decision for the
//! requested action wins. When several policies decide at the same depth, a
//! grant from any of them is enough.

use std::collections::BTreeSet;

use crate::data_policy::{DataPolicy, PermissionType};
use crate::verdict::Verdict;

/// Check whether `action` on `resource` is allowed by `policies`
pub fn check_access<'a, I>(policies: I, resource: &str, action: PermissionType) -> Verdict
where
    I: IntoIterator<Item = &'a DataPolicy>,
{
    // Evaluation order must not depend on map iteration order.
    let mut ordered: Vec<&DataPolicy> = policies.into_iter().collect();
    ordered.sort_by(|a, b| a.name.cmp(&b.name));

    let mut best_depth = 0;
    let mut decisions: Vec<(&str, bool)> = Vec::new();

    for policy in &ordered {
        for permission in &policy.permissions {
            let (Some(depth), Some(granted)) =
                (permission.specificity(resource), permission.decision(action))
            else {
                continue;
            };

            if depth > best_depth {
                best_depth = depth;
                decisions.clear();
            }
            if depth == best_depth {
                decisions.push((policy.name.as_str(), granted));
            }
        }
    }

    if decisions.is_empty() {
        tracing::debug!(resource, %action, "no policy decides access");
        return Verdict::not_granted(resource, action);
    }

    let Some((granting, _)) = decisions.iter().find(|(_, granted)| *granted) else {
        let revoking: BTreeSet<&str> = decisions.iter().map(|(name, _)| *name).collect();
        return Verdict::deny(format!(
            "{} on {} is revoked by {}",
            action,
            resource,
            revoking.into_iter().collect::<Vec<_>>().join(", ")
        ));
    };

    let (conditions, mask) = if action == PermissionType::Read {
        read_restrictions(&ordered, resource)
    } else {
        (Vec::new(), None)
    };

    Verdict::Allow {
        policy: granting.to_string(),
        conditions,
        mask,
    }
}

/// Row conditions from every covering permission, and the most specific mask
fn read_restrictions(policies: &[&DataPolicy], resource: &str) -> (Vec<String>, Option<String>) {
    let mut conditions = Vec::new();
    let mut mask: Option<(usize, String)> = None;

    for policy in policies {
        for permission in &policy.permissions {
            let Some(depth) = permission.specificity(resource) else {
                continue;
            };
            if let Some(condition) = &permission.condition {
                if !conditions.contains(condition) {
                    conditions.push(condition.clone());
                }
            }
            if let Some(expr) = &permission.mask {
                if mask.as_ref().map_or(true, |(d, _)| depth > *d) {
                    mask = Some((depth, expr.clone()));
                }
            }
        }
    }

    (conditions, mask.map(|(_, expr)| expr))
}

/// Whether any policy lets the holder create temporary tables
pub fn can_create_temporary_tables<'a, I>(policies: I) -> bool
where
    I: IntoIterator<Item = &'a DataPolicy>,
{
    policies
        .into_iter()
        .any(|policy| policy.allow_create_temporary_tables)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_policy::Permission;

    fn readers() -> DataPolicy {
        DataPolicy::new("readers")
            .with_permission(Permission::new("sales").allow(PermissionType::Read))
            .with_permission(Permission::new("sales.salaries").revoke(PermissionType::Read))
    }

    #[test]
    fn test_schema_grant_covers_tables() {
        let policies = vec![readers()];
        let verdict = check_access(&policies, "sales.orders", PermissionType::Read);
        assert_eq!(verdict, Verdict::allow("readers"));
    }

    #[test]
    fn test_specific_revocation_wins() {
        let policies = vec![readers()];
        let verdict = check_access(&policies, "sales.salaries.amount", PermissionType::Read);
        assert!(verdict.is_denied());
        assert!(verdict.to_string().contains("revoked by readers"));
    }

    #[test]
    fn test_grant_from_other_policy_at_same_depth() {
        let auditors = DataPolicy::new("auditors")
            .with_permission(Permission::new("sales.salaries").allow(PermissionType::Read));
        let policies = vec![readers(), auditors];

        let verdict = check_access(&policies, "sales.salaries", PermissionType::Read);
        assert_eq!(verdict, Verdict::allow("auditors"));
    }

    #[test]
    fn test_no_policies_denies() {
        let policies: Vec<DataPolicy> = Vec::new();
        let verdict = check_access(&policies, "sales", PermissionType::Read);
        assert!(verdict.is_denied());
    }

    #[test]
    fn test_unspecified_action_is_not_granted() {
        let policies = vec![readers()];
        let verdict = check_access(&policies, "sales.orders", PermissionType::Update);
        assert_eq!(verdict, Verdict::not_granted("sales.orders", PermissionType::Update));
    }

    #[test]
    fn test_read_restrictions_collected() {
        let policy = DataPolicy::new("regional")
            .with_permission(
                Permission::new("sales.orders")
                    .allow(PermissionType::Read)
                    .with_condition("region = 'EU'"),
            )
            .with_permission(Permission::new("sales.orders.card").with_mask("'****'"));

        let policies = vec![policy];
        let verdict = check_access(&policies, "sales.orders.card", PermissionType::Read);

        assert!(verdict.is_allowed());
        assert_eq!(verdict.conditions(), &["region = 'EU'".to_string()]);
        assert_eq!(verdict.mask(), Some("'****'"));
    }

    #[test]
    fn test_temporary_tables() {
        let policies = vec![readers(), DataPolicy::new("scratch").allow_temporary_tables()];
        assert!(can_create_temporary_tables(&policies));
        assert!(!can_create_temporary_tables(&policies[..1]));
    }
}
