use vdbx_core::{ExecutionContext, Row, Stage, StageError};

/// Truncates the result, warning the client when rows were cut
pub struct LimitStage {
    max_rows: usize,
}

impl LimitStage {
    pub fn new(max_rows: usize) -> Self {
        Self { max_rows }
    }
}

impl Stage for LimitStage {
    fn id(&self) -> &'static str {
        "limit.v1"
    }

    fn run(&self, rows: &[Row], ctx: &ExecutionContext) -> Result<Vec<Row>, StageError> {
        if rows.len() > self.max_rows {
            ctx.add_warning(anyhow::anyhow!(
                "result truncated to {} of {} rows",
                self.max_rows,
                rows.len()
            ));
        }
        Ok(rows.iter().take(self.max_rows).cloned().collect())
    }
}
