use std::path::PathBuf;

use anyhow::Result;
use bckit_domain::Layout;
use serde_json::json;

use super::index_status;
use crate::publish::{self, PublishPlan};
use crate::{CommandContext, ExecutionOutcome};

#[derive(Clone, Debug)]
pub struct PublishRequest {
    pub mirror: String,
    pub layout: Layout,
    pub exclude: Vec<String>,
    pub key_url: Option<String>,
    pub workdir: Option<PathBuf>,
    pub upload: bool,
    pub force: bool,
}

pub fn publish_stacks(ctx: &CommandContext, request: PublishRequest) -> Result<ExecutionOutcome> {
    let key_url = request
        .key_url
        .clone()
        .or_else(|| ctx.config().public_key_url.clone());
    if request.upload && key_url.is_none() {
        return Ok(ExecutionOutcome::user_error(
            "publishing needs the URL of the trusted public key",
            json!({
                "reason": "missing_key_url",
                "hint": "pass --key-url or set BCKIT_PUBLIC_KEY_URL",
            }),
        ));
    }
    let engine = match ctx.engine(&request.mirror) {
        Ok(engine) => engine,
        Err(outcome) => return Ok(outcome),
    };
    let plan = PublishPlan {
        layout: request.layout,
        exclude: request.exclude.clone(),
        key_url,
        workdir: request
            .workdir
            .clone()
            .unwrap_or_else(|| ctx.config().cache_dir.join("publish")),
        upload: request.upload,
        force: request.force,
    };
    let report = publish::run(&engine, &plan)?;

    let details = json!({
        "mirror": engine.mirror().as_str(),
        "dry_run": report.dry_run,
        "missing": report.missing,
        "key_imported": report.key_imported,
        "published": report.published,
        "failed": report.failed,
        "index": index_status(&report.index),
    });
    if report.dry_run {
        return Ok(ExecutionOutcome::success(
            format!(
                "{} specs would be published (dry run; pass --upload)",
                report.missing.len()
            ),
            details,
        ));
    }
    let message = format!(
        "published {} of {} specs",
        report.published.len(),
        report.missing.len()
    );
    if report.signature_failures() > 0 {
        Ok(ExecutionOutcome::failure(
            format!("{message}; {} failed signature checks", report.signature_failures()),
            details,
        ))
    } else if report.index.is_failed() {
        Ok(ExecutionOutcome::failure(message, details))
    } else {
        Ok(ExecutionOutcome::success(message, details))
    }
}
