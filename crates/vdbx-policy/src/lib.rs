//! VDBX Policy: data policies and access checks
//!
//! A user's allowed data policies travel with every command's execution
//! context. This crate models those policies and evaluates access against
//! them.
//!
//! # Example
//!
//! ```
//! use vdbx_policy::{check_access, DataPolicy, Permission, PermissionType};
//!
//! let policies = vec![
//!     DataPolicy::new("readers")
//!         .with_role("analyst")
//!         .with_permission(Permission::new("sales").allow(PermissionType::Read))
//!         .with_permission(Permission::new("sales.salaries").revoke(PermissionType::Read)),
//! ];
//!
//! assert!(check_access(&policies, "sales.orders", PermissionType::Read).is_allowed());
//! assert!(check_access(&policies, "sales.salaries", PermissionType::Read).is_denied());
//! ```

pub mod access;
pub mod data_policy;
pub mod verdict;

pub use access::{can_create_temporary_tables, check_access};
pub use data_policy::{resolve_allowed, DataPolicy, Permission, PermissionType};
pub use verdict::Verdict;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PolicyError {
    #[error("POLICY/PARSE: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("POLICY/INVALID: {0}")]
    Invalid(String),
}
