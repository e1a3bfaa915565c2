use serde_json::Value;
use vdbx_core::{ExecutionContext, Row, Stage, StageError};
use vdbx_policy::PermissionType;

/// Refuses the command unless the context's policies allow `action` on
/// `resource`. Row conditions of the granting policies are not evaluated
/// here; they are reported to the client as a warning.
pub struct PolicyGateStage {
    resource: String,
    action: PermissionType,
}

impl PolicyGateStage {
    pub fn new(resource: impl Into<String>, action: PermissionType) -> Self {
        Self {
            resource: resource.into(),
            action,
        }
    }

    pub fn read(resource: impl Into<String>) -> Self {
        Self::new(resource, PermissionType::Read)
    }
}

impl Stage for PolicyGateStage {
    fn id(&self) -> &'static str {
        "policy.gate.v1"
    }

    fn run(&self, rows: &[Row], ctx: &ExecutionContext) -> Result<Vec<Row>, StageError> {
        let verdict = ctx.check_access(&self.resource, self.action);
        if verdict.is_denied() {
            tracing::info!(
                user = ctx.user_name(),
                resource = %self.resource,
                action = %self.action,
                "access denied"
            );
            return Err(StageError::AccessDenied {
                resource: self.resource.clone(),
                verdict,
            });
        }

        if !verdict.conditions().is_empty() {
            ctx.add_warning(anyhow::anyhow!(
                "row conditions on {} not enforced by this stage: {}",
                self.resource,
                verdict.conditions().join(" AND ")
            ));
        }

        match verdict.mask() {
            Some(mask) => Ok(rows.iter().map(|row| mask_row(row, &self.resource, mask)).collect()),
            None => Ok(rows.to_vec()),
        }
    }
}

/// Replace the masked column's value with the mask expression text
fn mask_row(row: &Row, resource: &str, mask: &str) -> Row {
    let column = resource.rsplit('.').next().unwrap_or(resource);
    let mut row = row.clone();
    if let Some(obj) = row.as_object_mut() {
        if obj.contains_key(column) {
            obj.insert(column.to_string(), Value::String(mask.to_string()));
        }
    }
    row
}
