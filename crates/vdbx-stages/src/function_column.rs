use serde_json::Value;
use vdbx_core::{ExecutionContext, Row, Stage, StageError};

/// Evaluates a VDB-scoped user function per row and stores the result.
///
/// A function that fails on a row yields `null` for that row and a warning;
/// a function the VDB does not provide fails the command.
pub struct FunctionColumnStage {
    function: String,
    args: Vec<String>,
    column: String,
}

impl FunctionColumnStage {
    pub fn new(function: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            function: function.into(),
            args: Vec::new(),
            column: column.into(),
        }
    }

    /// Pass these row fields as arguments, in order
    pub fn with_args<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = fields.into_iter().map(Into::into).collect();
        self
    }
}

impl Stage for FunctionColumnStage {
    fn id(&self) -> &'static str {
        "function.column.v1"
    }

    fn deterministic(&self) -> bool {
        false
    }

    fn run(&self, rows: &[Row], ctx: &ExecutionContext) -> Result<Vec<Row>, StageError> {
        let resolver = ctx.vdb_resolver().ok_or_else(|| {
            StageError::Fatal(format!("no code resolver for vdb {}", ctx.vdb()))
        })?;
        let function = resolver.resolve_function(&self.function).ok_or_else(|| {
            StageError::Fatal(format!("function {} not found in vdb {}", self.function, ctx.vdb()))
        })?;

        let mut out = Vec::with_capacity(rows.len());
        for (i, row) in rows.iter().enumerate() {
            let args: Vec<Value> = self
                .args
                .iter()
                .map(|field| row.get(field).cloned().unwrap_or(Value::Null))
                .collect();

            let value = match function(ctx, &args) {
                Ok(value) => value,
                Err(err) => {
                    ctx.add_warning(err.context(format!("{} failed on row {}", self.function, i)));
                    Value::Null
                }
            };

            let mut row = row.clone();
            match row.as_object_mut() {
                Some(obj) => {
                    obj.insert(self.column.clone(), value);
                }
                None => {
                    return Err(StageError::Validation(format!(
                        "row {} is not an object, cannot add column {}",
                        i, self.column
                    )))
                }
            }
            out.push(row);
        }

        Ok(out)
    }
}
