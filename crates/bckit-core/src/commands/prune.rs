use std::path::PathBuf;

use anyhow::Result;
use bckit_domain::{KeepSet, Layout};
use serde_json::json;
use time::Date;

use super::{index_missing, index_status};
use crate::prune::{self, PruneMethod, PrunePlan, DEFAULT_SINCE_DAYS};
use crate::reports::read_hash_list;
use crate::{CommandContext, ExecutionOutcome};

#[derive(Clone, Debug)]
pub struct PruneRequest {
    pub mirror: String,
    pub method: PruneMethod,
    pub layout: Layout,
    pub since_days: Option<u32>,
    pub start_date: Option<Date>,
    pub keep_hashes: Option<PathBuf>,
    pub prune_hashes: Option<PathBuf>,
    pub output_dir: PathBuf,
    pub suffix: String,
    pub delete: bool,
    pub force: bool,
}

pub fn prune_mirror(ctx: &CommandContext, request: PruneRequest) -> Result<ExecutionOutcome> {
    if request.since_days.is_some() && request.start_date.is_some() {
        return Ok(ExecutionOutcome::user_error(
            "--since-days and --start-date are mutually exclusive",
            json!({ "hint": "pass only one way of choosing the cutoff" }),
        ));
    }
    let keep = match &request.keep_hashes {
        Some(path) => match KeepSet::from_file(path) {
            Ok(keep) => keep,
            Err(err) => return Ok(input_error(&err, "keep_hashes")),
        },
        None => KeepSet::new(),
    };
    let prune_hashes = match &request.prune_hashes {
        Some(path) => match read_hash_list(path) {
            Ok(hashes) => Some(hashes),
            Err(err) => return Ok(input_error(&err, "prune_hashes")),
        },
        None => None,
    };

    let engine = match ctx.engine(&request.mirror) {
        Ok(engine) => engine,
        Err(outcome) => return Ok(outcome),
    };
    let since_days = request.since_days.unwrap_or(DEFAULT_SINCE_DAYS);
    let plan = PrunePlan {
        method: request.method,
        layout: request.layout,
        cutoff: prune::cutoff(engine.now(), since_days, request.start_date),
        since_days,
        start_date: request.start_date,
        keep,
        keep_file: request.keep_hashes.clone(),
        prune_hashes,
        output_dir: request.output_dir.clone(),
        suffix: request.suffix.clone(),
        delete: request.delete,
        force: request.force,
    };
    let report = match prune::run(&engine, &plan) {
        Ok(report) => report,
        Err(err) => {
            return match index_missing(&err, engine.mirror().as_str()) {
                Some(outcome) => Ok(outcome),
                None => Err(err),
            }
        }
    };

    let mut details = json!({
        "mirror": engine.mirror().as_str(),
        "method": report.method,
        "cutoff": report.cutoff.map(|cutoff| cutoff.to_string()),
        "catalogued": report.catalogued,
        "prunable_hashes": report.prunable.len(),
        "prunable_objects": report.objects.len(),
        "prunable_bytes": report.pruned_bytes(),
        "warnings": report.warnings,
        "reports": report.reports,
        "dry_run": !request.delete,
        "index": index_status(&report.index),
    });
    let Some(deleted) = &report.deleted else {
        let message = format!(
            "{} prunable specs ({} objects, {} bytes) by {} pruning",
            report.prunable.len(),
            report.objects.len(),
            report.pruned_bytes(),
            report.method
        );
        return Ok(ExecutionOutcome::success(message, details));
    };

    details["deleted"] = json!(deleted);
    let message = format!(
        "deleted {} of {} objects for {} specs",
        deleted.deleted,
        deleted.requested,
        report.prunable.len()
    );
    if deleted.is_clean() && !report.index.is_failed() {
        Ok(ExecutionOutcome::success(message, details))
    } else {
        Ok(ExecutionOutcome::failure(message, details))
    }
}

fn input_error(err: &anyhow::Error, field: &str) -> ExecutionOutcome {
    ExecutionOutcome::user_error(
        format!("{err:#}"),
        json!({ "reason": "unreadable_input", "field": field }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::context;
    use crate::testing::{days_ago, hash, MirrorFixture};
    use crate::{CommandStatus, GlobalOptions};
    use time::macros::datetime;
    use time::OffsetDateTime;

    const NOW: OffsetDateTime = datetime!(2024-06-01 12:00 UTC);

    fn request(fixture: &MirrorFixture, method: PruneMethod) -> PruneRequest {
        PruneRequest {
            mirror: fixture.root().display().to_string(),
            method,
            layout: Layout::V2,
            since_days: None,
            start_date: None,
            keep_hashes: None,
            prune_hashes: None,
            output_dir: fixture.cache.path().join("out"),
            suffix: String::new(),
            delete: false,
            force: false,
        }
    }

    #[test]
    fn ten_hashes_three_kept_two_fresh_leaves_five() -> Result<()> {
        let fixture = MirrorFixture::new();
        for n in 0..10 {
            let age = if n >= 8 { 1 } else { 30 };
            fixture.add_v2_spec(None, &format!("pkg{n}"), &hash(n), days_ago(NOW, age));
        }
        let keep_file = fixture.cache.path().join("keep.txt");
        KeepSet::from_iter((0..3).map(hash)).write(&keep_file)?;

        let global = GlobalOptions::default();
        let ctx = context(&global, &fixture).with_now(NOW);
        let mut request = request(&fixture, PruneMethod::Direct);
        request.keep_hashes = Some(keep_file);
        let outcome = prune_mirror(&ctx, request)?;
        assert_eq!(outcome.status, CommandStatus::Ok);
        assert_eq!(outcome.details["prunable_hashes"], 5);
        assert_eq!(outcome.details["dry_run"], true);
        Ok(())
    }

    #[test]
    fn orphan_pruning_without_index_is_a_user_error() -> Result<()> {
        let fixture = MirrorFixture::new();
        fixture.add_v2_spec(None, "zlib", &hash(1), days_ago(NOW, 30));
        let global = GlobalOptions::default();
        let ctx = context(&global, &fixture).with_now(NOW);
        let outcome = prune_mirror(&ctx, request(&fixture, PruneMethod::Orphan))?;
        assert_eq!(outcome.status, CommandStatus::UserError);
        assert_eq!(outcome.details["reason"], "index_missing");
        Ok(())
    }

    #[test]
    fn index_pruning_deletes_registered_specs() -> Result<()> {
        let fixture = MirrorFixture::new();
        let doomed = fixture.add_v2_spec(None, "zlib", &hash(1), days_ago(NOW, 1));
        let kept = fixture.add_v2_spec(None, "cmake", &hash(2), days_ago(NOW, 1));
        fixture.write_index(None, &[(&doomed.hash, true), (&kept.hash, false)], NOW);

        let global = GlobalOptions::default();
        let ctx = context(&global, &fixture).with_now(NOW);
        let mut request = request(&fixture, PruneMethod::Index);
        request.delete = true;
        let outcome = prune_mirror(&ctx, request)?;
        assert_eq!(outcome.status, CommandStatus::Ok);
        assert_eq!(outcome.details["deleted"]["deleted"], 2);
        assert!(!fixture.exists(&doomed.archive_key));
        assert!(fixture.exists(&kept.archive_key));
        assert_eq!(fixture.indexer.calls().len(), 1);
        Ok(())
    }

    #[test]
    fn unreadable_keep_list_is_a_user_error() -> Result<()> {
        let fixture = MirrorFixture::new();
        let global = GlobalOptions::default();
        let ctx = context(&global, &fixture);
        let mut request = request(&fixture, PruneMethod::Direct);
        request.keep_hashes = Some(fixture.cache.path().join("missing.txt"));
        let outcome = prune_mirror(&ctx, request)?;
        assert_eq!(outcome.status, CommandStatus::UserError);
        assert_eq!(outcome.details["field"], "keep_hashes");
        Ok(())
    }
}
