use std::path::PathBuf;

use anyhow::Result;
use bckit_domain::collect_lockfile_hashes;
use serde_json::json;

use crate::{CommandContext, ExecutionOutcome};

#[derive(Clone, Debug)]
pub struct KeepSetRequest {
    pub root: PathBuf,
    pub output: PathBuf,
}

pub fn keep_set(_ctx: &CommandContext, request: KeepSetRequest) -> Result<ExecutionOutcome> {
    if !request.root.is_dir() {
        return Ok(ExecutionOutcome::user_error(
            format!("{} is not a directory", request.root.display()),
            json!({
                "root": request.root.display().to_string(),
                "hint": "point keep-set at a directory containing spack.lock files",
            }),
        ));
    }
    let (keep, lockfiles) = collect_lockfile_hashes(&request.root)?;
    keep.write(&request.output)?;
    Ok(ExecutionOutcome::success(
        format!(
            "wrote {} hashes from {lockfiles} lockfiles to {}",
            keep.len(),
            request.output.display()
        ),
        json!({
            "root": request.root.display().to_string(),
            "output": request.output.display().to_string(),
            "lockfiles": lockfiles,
            "hashes": keep.len(),
        }),
    ))
}
