//! Integration tests for data policies loaded from YAML.
//!
//! These tests follow a policy set from its YAML definition through role
//! resolution and access checks.

use vdbx_policy::{check_access, resolve_allowed, DataPolicy, PermissionType, Verdict};

const POLICIES: &str = r#"
- name: analysts
  description: Read access to sales, salaries excluded
  mapped_role_names: [analyst]
  permissions:
    - resource_name: sales
      actions: { read: true }
    - resource_name: sales.salaries
      actions: { read: false }
    - resource_name: sales.customers.email
      mask: "'hidden'"
- name: hr
  mapped_role_names: [hr]
  permissions:
    - resource_name: sales.salaries
      actions: { read: true, update: true }
      condition: "department = user_department()"
- name: everyone
  any_authenticated: true
  allow_create_temporary_tables: true
  permissions:
    - resource_name: sys
      actions: { read: true, execute: true }
"#;

fn roles(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

#[test]
fn test_analyst_access() {
    let catalog = DataPolicy::list_from_yaml(POLICIES).unwrap();
    let analyst = roles(&["analyst"]);
    let allowed = resolve_allowed(&catalog, &analyst);

    let mut names: Vec<&str> = allowed.keys().map(String::as_str).collect();
    names.sort();
    assert_eq!(names, vec!["analysts", "everyone"]);

    assert!(check_access(allowed.values(), "sales.orders", PermissionType::Read).is_allowed());
    assert!(check_access(allowed.values(), "sales.salaries", PermissionType::Read).is_denied());
    assert!(check_access(allowed.values(), "sys.tables", PermissionType::Execute).is_allowed());

    let email = check_access(allowed.values(), "sales.customers.email", PermissionType::Read);
    assert_eq!(email.mask(), Some("'hidden'"));
}

#[test]
fn test_hr_overrides_revocation_at_same_depth() {
    let catalog = DataPolicy::list_from_yaml(POLICIES).unwrap();
    let both = roles(&["analyst", "hr"]);
    let allowed = resolve_allowed(&catalog, &both);

    let verdict = check_access(allowed.values(), "sales.salaries.amount", PermissionType::Read);
    match verdict {
        Verdict::Allow { policy, conditions, .. } => {
            assert_eq!(policy, "hr");
            assert_eq!(conditions, vec!["department = user_department()".to_string()]);
        }
        other => panic!("expected allow, got {}", other),
    }
}

#[test]
fn test_unknown_role_gets_only_public_policies() {
    let catalog = DataPolicy::list_from_yaml(POLICIES).unwrap();
    let nobody = roles(&["contractor"]);
    let allowed = resolve_allowed(&catalog, &nobody);

    assert_eq!(allowed.len(), 1);
    assert!(vdbx_policy::can_create_temporary_tables(allowed.values()));
    assert!(check_access(allowed.values(), "sales.orders", PermissionType::Read).is_denied());
}
