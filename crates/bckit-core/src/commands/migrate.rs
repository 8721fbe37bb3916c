use anyhow::Result;
use serde_json::json;

use super::index_status;
use crate::migrate::{self, MigrateFailure, MigratePlan, MigrateResult};
use crate::{CommandContext, ExecutionOutcome};

#[derive(Clone, Debug)]
pub struct MigrateRequest {
    pub mirror: String,
    pub upload: bool,
    pub force: bool,
}

pub fn migrate_layout(ctx: &CommandContext, request: MigrateRequest) -> Result<ExecutionOutcome> {
    let engine = match ctx.engine(&request.mirror) {
        Ok(engine) => engine,
        Err(outcome) => return Ok(outcome),
    };
    let report = migrate::run(
        &engine,
        MigratePlan {
            upload: request.upload,
            force: request.force,
        },
    )?;
    let details = json!({
        "mirror": engine.mirror().as_str(),
        "dry_run": report.dry_run,
        "candidates": report.candidates,
        "already_migrated": report.already_migrated,
        "migrated": report.migrated,
        "failed": report.failed,
        "keys": report.keys,
        "index": index_status(&report.index),
    });
    if report.dry_run {
        return Ok(ExecutionOutcome::success(
            format!(
                "{} specs would be migrated, {} already are (dry run; pass --upload)",
                report.candidates.len(),
                report.already_migrated
            ),
            details,
        ));
    }
    let signature_failures = report
        .failed
        .iter()
        .filter(|result| {
            matches!(
                result,
                MigrateResult::Failed {
                    reason: MigrateFailure::Signature,
                    ..
                }
            )
        })
        .count();
    let message = format!(
        "migrated {} of {} specs to the v3 layout",
        report.migrated.len(),
        report.candidates.len()
    );
    if signature_failures > 0 || report.index.is_failed() {
        Ok(ExecutionOutcome::failure(message, details))
    } else {
        Ok(ExecutionOutcome::success(message, details))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::context;
    use crate::testing::{hash, MirrorFixture};
    use crate::{CommandStatus, GlobalOptions};
    use time::OffsetDateTime;

    #[test]
    fn upload_then_rerun_is_a_no_op() -> Result<()> {
        let fixture = MirrorFixture::new();
        fixture.add_v2_spec(None, "zlib", &hash(1), OffsetDateTime::now_utc());
        let global = GlobalOptions::default();
        let ctx = context(&global, &fixture);
        let request = MigrateRequest {
            mirror: fixture.root().display().to_string(),
            upload: true,
            force: false,
        };
        let first = migrate_layout(&ctx, request.clone())?;
        assert_eq!(first.status, CommandStatus::Ok);
        assert_eq!(first.details["migrated"].as_array().map(Vec::len), Some(1));

        let second = migrate_layout(&ctx, request)?;
        assert_eq!(second.details["already_migrated"], 1);
        assert_eq!(second.details["migrated"].as_array().map(Vec::len), Some(0));
        Ok(())
    }
}
