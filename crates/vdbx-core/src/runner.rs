//! Command Runner: drives stages through one execution of a command
//!
//! The runner is the engine-side collaborator of the context: it fires the
//! lifecycle events, counts reuses, turns recoverable stage failures into
//! warnings, and cuts the result into batches of the nominal size.

use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::Instrument;

use crate::context::ExecutionContext;
use crate::error::EngineError;
use crate::listener::CommandEvent;
use crate::stage::{Row, Stage, StageError};

/// What one stage did during one execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageReport {
    pub id: String,
    pub in_hash: String,
    pub out_hash: String,
    pub rows_in: usize,
    pub rows_out: usize,
    pub deterministic: bool,
    pub latency_ms: u64,
    /// Set when the stage failed recoverably and its input was passed on
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CommandOutcome {
    pub batches: Vec<Vec<Row>>,
    pub reports: Vec<StageReport>,
}

impl CommandOutcome {
    pub fn row_count(&self) -> usize {
        self.batches.iter().map(Vec::len).sum()
    }

    pub fn rows(&self) -> impl Iterator<Item = &Row> {
        self.batches.iter().flatten()
    }
}

pub struct CommandRunner {
    stages: Vec<Box<dyn Stage>>,
    pipeline_id: String,
}

impl CommandRunner {
    pub fn new(stages: Vec<Box<dyn Stage>>) -> Self {
        let pipeline_id = stages
            .iter()
            .map(|s| s.id().split('.').next().unwrap_or("?"))
            .collect::<Vec<_>>()
            .join("→");

        Self { stages, pipeline_id }
    }

    pub fn pipeline_id(&self) -> &str {
        &self.pipeline_id
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Execute once. `Closed` is dispatched whether or not a stage fails.
    pub async fn run(
        &self,
        ctx: &ExecutionContext,
        input: Vec<Row>,
    ) -> Result<CommandOutcome, EngineError> {
        let span = tracing::info_span!(
            "command",
            request_id = %ctx.request_id(),
            pipeline = %self.pipeline_id,
            reuse = ctx.reuse_count()
        );

        async move {
            ctx.dispatch(&CommandEvent::Started);
            let result = self.run_stages(ctx, input);
            ctx.dispatch(&CommandEvent::Closed);

            let (rows, reports) = result?;
            let batches = rows
                .chunks(ctx.processor_batch_size())
                .map(<[Row]>::to_vec)
                .collect();

            Ok(CommandOutcome { batches, reports })
        }
        .instrument(span)
        .await
    }

    /// Execute again on the same context, as a continuous or prepared
    /// execution does. Warnings not yet drained are kept.
    pub async fn rerun(
        &self,
        ctx: &ExecutionContext,
        input: Vec<Row>,
    ) -> Result<CommandOutcome, EngineError> {
        let count = ctx.mark_reused();
        ctx.dispatch(&CommandEvent::Reused { count });
        self.run(ctx, input).await
    }

    fn run_stages(
        &self,
        ctx: &ExecutionContext,
        input: Vec<Row>,
    ) -> Result<(Vec<Row>, Vec<StageReport>), EngineError> {
        let mut current = input;
        let mut reports = Vec::with_capacity(self.stages.len());

        for stage in &self.stages {
            let start = Instant::now();
            let in_hash = hash_rows(&current);
            let rows_in = current.len();

            let warning = match stage.run(&current, ctx) {
                Ok(rows) => {
                    current = rows;
                    None
                }
                Err(StageError::Recoverable(err)) => {
                    let err = err.context(format!("stage {} skipped", stage.id()));
                    let message = format!("{:#}", err);
                    ctx.add_warning(err);
                    Some(message)
                }
                Err(source) => {
                    tracing::error!(stage = stage.id(), error = %source, "stage failed");
                    return Err(EngineError::Stage {
                        stage: stage.id().to_string(),
                        source,
                    });
                }
            };

            let report = StageReport {
                id: stage.id().to_string(),
                in_hash,
                out_hash: hash_rows(&current),
                rows_in,
                rows_out: current.len(),
                deterministic: stage.deterministic(),
                latency_ms: start.elapsed().as_millis() as u64,
                warning,
            };
            tracing::debug!(
                stage = %report.id,
                rows_in = report.rows_in,
                rows_out = report.rows_out,
                latency_ms = report.latency_ms,
                "stage finished"
            );
            reports.push(report);
        }

        Ok((current, reports))
    }
}

fn hash_rows(rows: &[Row]) -> String {
    let mut hasher = blake3::Hasher::new();
    for row in rows {
        // Value serialization cannot fail.
        if let Ok(bytes) = serde_json::to_vec(row) {
            hasher.update(&bytes);
        }
        hasher.update(b"\n");
    }
    format!("blake3:{}", hasher.finalize())
}
