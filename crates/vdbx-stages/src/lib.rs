//! VDBX Stages: reference stages for the command runner.
//!
//! These stages stay small. Each one exercises a piece of the execution
//! context from inside a running command: access checks against the allowed
//! policies, the seedable random stream, VDB-scoped user functions, and the
//! warning list.
//!
//! # Pipeline Flow
//!
//! ```text
//! Rows → Policy Gate → RAND() Column → Limit → Batches
//!            ↓                ↓           ↓
//!        AccessDenied     seeded/lazy   warnings
//! ```
//!
//! [`FunctionColumnStage`] is not part of the prebuilt pipelines; add it to
//! [`default_stages`] when a command calls a VDB function per row.

mod function_column;
mod limit;
mod policy_gate;
mod rand_column;

pub use function_column::FunctionColumnStage;
pub use limit::LimitStage;
pub use policy_gate::PolicyGateStage;
pub use rand_column::RandColumnStage;

use vdbx_core::{CommandRunner, Stage};

/// Gate on read access to `resource`, add a `rand` column, cap at `max_rows`
pub fn read_pipeline(resource: &str, max_rows: usize) -> CommandRunner {
    CommandRunner::new(vec![
        Box::new(PolicyGateStage::read(resource)),
        Box::new(RandColumnStage::new("rand")),
        Box::new(LimitStage::new(max_rows)),
    ])
}

/// Same as [`read_pipeline`] with a fixed seed, so reruns are reproducible
pub fn reproducible_read_pipeline(resource: &str, max_rows: usize, seed: i64) -> CommandRunner {
    CommandRunner::new(vec![
        Box::new(PolicyGateStage::read(resource)),
        Box::new(RandColumnStage::seeded("rand", seed)),
        Box::new(LimitStage::new(max_rows)),
    ])
}

/// Stages in the order `gate → rand → limit`, for callers composing their own runner
pub fn default_stages(resource: &str, max_rows: usize) -> Vec<Box<dyn Stage>> {
    vec![
        Box::new(PolicyGateStage::read(resource)),
        Box::new(RandColumnStage::new("rand")),
        Box::new(LimitStage::new(max_rows)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use std::sync::Arc;
    use vdbx_core::{
        EngineError, ExecutionContext, FunctionTable, Row, StageError, VdbDescriptor, VdbResolver,
    };
    use vdbx_policy::{DataPolicy, Permission, PermissionType};

    fn readers() -> DataPolicy {
        DataPolicy::new("readers")
            .with_permission(
                Permission::new("sales.orders")
                    .allow(PermissionType::Read)
                    .with_condition("region = 'EU'"),
            )
            .with_permission(Permission::new("sales.orders.card").with_mask("****"))
    }

    fn context(policies: Vec<DataPolicy>) -> ExecutionContext {
        let mut builder = ExecutionContext::builder()
            .user_name("alice")
            .connection_id("conn-1")
            .request_id("conn-1.3")
            .vdb(VdbDescriptor::new("sales", 1))
            .processor_batch_size(2);
        for policy in policies {
            builder = builder.allow_policy(policy);
        }
        builder.build().unwrap()
    }

    fn rows(n: usize) -> Vec<Row> {
        (0..n).map(|i| json!({ "id": i, "card": "4111" })).collect()
    }

    #[test]
    fn test_policy_gate_denies_without_grant() {
        let ctx = context(vec![]);
        let err = PolicyGateStage::read("sales.orders").run(&rows(1), &ctx).unwrap_err();
        assert!(matches!(err, StageError::AccessDenied { .. }));
    }

    #[test]
    fn test_policy_gate_reports_conditions() {
        let ctx = context(vec![readers()]);
        let out = PolicyGateStage::read("sales.orders").run(&rows(2), &ctx).unwrap();

        assert_eq!(out, rows(2));
        let warnings = ctx.take_warnings();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].message().contains("region = 'EU'"));
    }

    #[test]
    fn test_policy_gate_applies_mask() {
        let ctx = context(vec![readers()]);
        let out = PolicyGateStage::read("sales.orders.card").run(&rows(1), &ctx).unwrap();
        assert_eq!(out[0]["card"], "****");
        assert_eq!(out[0]["id"], 0);
    }

    #[test]
    fn test_rand_column_seeded_is_reproducible() {
        let ctx = context(vec![]);
        let stage = RandColumnStage::seeded("r", 11);

        let first = stage.run(&rows(3), &ctx).unwrap();
        let second = stage.run(&rows(3), &ctx).unwrap();

        assert_eq!(first, second);
        assert!(stage.deterministic());
        assert!(!RandColumnStage::new("r").deterministic());
    }

    #[test]
    fn test_rand_column_rejects_scalar_rows() {
        let ctx = context(vec![]);
        let err = RandColumnStage::new("r").run(&[json!(1)], &ctx).unwrap_err();
        assert!(matches!(err, StageError::Validation(_)));
    }

    #[test]
    fn test_limit_warns_on_truncation() {
        let ctx = context(vec![]);
        let out = LimitStage::new(2).run(&rows(5), &ctx).unwrap();

        assert_eq!(out.len(), 2);
        assert_eq!(ctx.take_warnings()[0].message(), "result truncated to 2 of 5 rows");

        LimitStage::new(10).run(&rows(5), &ctx).unwrap();
        assert_eq!(ctx.warning_count(), 0);
    }

    #[test]
    fn test_function_column() {
        let resolver: Arc<dyn VdbResolver> = Arc::new(
            FunctionTable::new("sales").register("util.double", |_, args| {
                match args.first().and_then(Value::as_i64) {
                    Some(n) => Ok(json!(n * 2)),
                    None => Err(anyhow::anyhow!("expected a number")),
                }
            }),
        );
        let ctx = ExecutionContext::builder()
            .user_name("alice")
            .connection_id("conn-1")
            .request_id("conn-1.4")
            .vdb(VdbDescriptor::new("sales", 1))
            .vdb_resolver(&resolver)
            .build()
            .unwrap();

        let stage = FunctionColumnStage::new("util.double", "twice").with_args(["id"]);
        let input = vec![json!({ "id": 4 }), json!({ "id": "x" })];
        let out = stage.run(&input, &ctx).unwrap();

        assert_eq!(out[0]["twice"], 8);
        assert!(out[1]["twice"].is_null());
        assert_eq!(
            ctx.take_warnings()[0].detail(),
            "util.double failed on row 1: expected a number"
        );

        let missing = FunctionColumnStage::new("util.triple", "x").run(&input, &ctx);
        assert!(matches!(missing, Err(StageError::Fatal(_))));
    }

    #[tokio::test]
    async fn test_read_pipeline() {
        let ctx = context(vec![readers()]);
        let runner = read_pipeline("sales.orders", 3);

        let outcome = runner.run(&ctx, rows(5)).await.unwrap();

        assert_eq!(outcome.row_count(), 3);
        assert_eq!(outcome.batches.len(), 2);
        assert!(outcome.rows().all(|r| r.get("rand").is_some()));
        // conditions + truncation
        assert_eq!(ctx.warning_count(), 2);
    }

    #[tokio::test]
    async fn test_read_pipeline_denied() {
        let ctx = context(vec![]);
        let err = read_pipeline("sales.orders", 3).run(&ctx, rows(1)).await.unwrap_err();
        assert!(matches!(err, EngineError::Stage { .. }));
    }

    #[tokio::test]
    async fn test_reproducible_pipeline_across_reruns() {
        let ctx = context(vec![readers()]);
        let runner = reproducible_read_pipeline("sales.orders", 10, 99);

        let first = runner.run(&ctx, rows(4)).await.unwrap();
        let again = runner.rerun(&ctx, rows(4)).await.unwrap();

        let rand = |o: &vdbx_core::CommandOutcome| -> Vec<Value> {
            o.rows().map(|r| r["rand"].clone()).collect()
        };
        assert_eq!(rand(&first), rand(&again));
        assert_eq!(ctx.reuse_count(), 1);
    }

    #[test]
    fn test_default_stages_order() {
        let ids: Vec<&str> = default_stages("sales", 1).iter().map(|s| s.id()).collect();
        assert_eq!(ids, vec!["policy.gate.v1", "rand.column.v1", "limit.v1"]);
    }
}
