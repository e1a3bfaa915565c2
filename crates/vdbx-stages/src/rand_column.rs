use serde_json::Value;
use vdbx_core::{ExecutionContext, Row, Stage, StageError};

/// Adds a `RAND()` column. With a seed, the stream is reseeded once per
/// execution so every run of the command yields the same values.
pub struct RandColumnStage {
    column: String,
    seed: Option<i64>,
}

impl RandColumnStage {
    pub fn new(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            seed: None,
        }
    }

    pub fn seeded(column: impl Into<String>, seed: i64) -> Self {
        Self {
            column: column.into(),
            seed: Some(seed),
        }
    }
}

impl Stage for RandColumnStage {
    fn id(&self) -> &'static str {
        "rand.column.v1"
    }

    fn deterministic(&self) -> bool {
        self.seed.is_some()
    }

    fn run(&self, rows: &[Row], ctx: &ExecutionContext) -> Result<Vec<Row>, StageError> {
        let mut out = Vec::with_capacity(rows.len());

        for (i, row) in rows.iter().enumerate() {
            let value = match (i, self.seed) {
                (0, Some(seed)) => ctx.next_random_seeded(seed),
                _ => ctx.next_random(),
            };

            let mut row = row.clone();
            let Some(obj) = row.as_object_mut() else {
                return Err(StageError::Validation(format!(
                    "row {} is not an object, cannot add column {}",
                    i, self.column
                )));
            };
            obj.insert(self.column.clone(), Value::from(value));
            out.push(row);
        }

        Ok(out)
    }
}
