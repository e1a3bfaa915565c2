//! Identity: who is running a command, against which VDB
//!
//! These values are produced by the session and catalog providers and handed
//! to the context at construction. The context only reads them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use crate::context::CommandContext;

/// Deployment state of a virtual database
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VdbStatus {
    Loading,
    #[default]
    Active,
    Failed,
    Removed,
}

/// A named, versioned virtual database
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VdbDescriptor {
    pub name: String,
    pub version: u32,
    #[serde(default)]
    pub status: VdbStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

impl VdbDescriptor {
    pub fn new(name: impl Into<String>, version: u32) -> Self {
        Self {
            name: name.into(),
            version,
            status: VdbStatus::Active,
            description: None,
            properties: BTreeMap::new(),
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }
}

impl fmt::Display for VdbDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}.{}", self.name, self.version)
    }
}

/// Client session as established by the session provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub user_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_host: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Session {
    pub fn new(session_id: impl Into<String>, user_name: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            user_name: user_name.into(),
            application_name: None,
            client_host: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_application(mut self, name: impl Into<String>) -> Self {
        self.application_name = Some(name.into());
        self
    }

    pub fn with_client_host(mut self, host: impl Into<String>) -> Self {
        self.client_host = Some(host.into());
        self
    }
}

/// Authenticated security principal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    pub name: String,
    #[serde(default)]
    pub roles: BTreeSet<String>,
}

impl Subject {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            roles: BTreeSet::new(),
        }
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.roles.insert(role.into());
        self
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }
}

/// VDB-scoped user code, callable with the current command's context
pub type UserFunction =
    Arc<dyn Fn(&dyn CommandContext, &[Value]) -> anyhow::Result<Value> + Send + Sync>;

/// Resolves code deployed with a VDB.
///
/// Owned by the deployment; contexts only keep a weak handle to it.
pub trait VdbResolver: Send + Sync {
    fn vdb_name(&self) -> &str;

    /// Look up a function by its qualified name
    fn resolve_function(&self, name: &str) -> Option<UserFunction>;
}

/// Resolver backed by a name → function table
#[derive(Default)]
pub struct FunctionTable {
    vdb_name: String,
    functions: BTreeMap<String, UserFunction>,
}

impl FunctionTable {
    pub fn new(vdb_name: impl Into<String>) -> Self {
        Self {
            vdb_name: vdb_name.into(),
            functions: BTreeMap::new(),
        }
    }

    /// Register a function; names are matched case-insensitively
    pub fn register<F>(mut self, name: &str, function: F) -> Self
    where
        F: Fn(&dyn CommandContext, &[Value]) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        self.functions
            .insert(name.to_ascii_lowercase(), Arc::new(function));
        self
    }
}

impl VdbResolver for FunctionTable {
    fn vdb_name(&self) -> &str {
        &self.vdb_name
    }

    fn resolve_function(&self, name: &str) -> Option<UserFunction> {
        self.functions.get(&name.to_ascii_lowercase()).cloned()
    }
}

impl fmt::Debug for FunctionTable {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("FunctionTable")
            .field("vdb_name", &self.vdb_name)
            .field("functions", &self.functions.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vdb_display() {
        let vdb = VdbDescriptor::new("sales", 3).with_property("owner", "finance");
        assert_eq!(vdb.to_string(), "sales.3");
        assert_eq!(vdb.property("owner"), Some("finance"));
        assert_eq!(vdb.status, VdbStatus::Active);
    }

    #[test]
    fn test_subject_roles() {
        let subject = Subject::new("alice").with_role("analyst");
        assert!(subject.has_role("analyst"));
        assert!(!subject.has_role("admin"));
    }

    #[test]
    fn test_function_table_lookup_ignores_case() {
        let table = FunctionTable::new("sales").register("util.Double", |_, args| {
            let n = args.first().and_then(Value::as_f64).unwrap_or(0.0);
            Ok(Value::from(n * 2.0))
        });

        assert!(table.resolve_function("UTIL.DOUBLE").is_some());
        assert!(table.resolve_function("util.triple").is_none());
        assert_eq!(table.vdb_name(), "sales");
    }
}
