//! Rebuilding a mirror's index with the package tool.

use std::path::PathBuf;
use std::process::Command;

use anyhow::{anyhow, bail, Context, Result};
use serde::Serialize;
use tracing::{info, warn};

pub trait IndexRebuilder: Send + Sync {
    fn rebuild(&self, mirror_url: &str) -> Result<()>;
}

/// Runs `spack buildcache update-index <mirror>`.
#[derive(Debug, Clone, Default)]
pub struct SpackIndexRebuilder {
    program: Option<PathBuf>,
}

impl SpackIndexRebuilder {
    pub fn new(program: Option<PathBuf>) -> Self {
        Self { program }
    }

    fn program(&self) -> Result<PathBuf> {
        match &self.program {
            Some(program) => Ok(program.clone()),
            None => which::which("spack")
                .map_err(|_| anyhow!("`spack` was not found; install it or set BCKIT_SPACK")),
        }
    }
}

impl IndexRebuilder for SpackIndexRebuilder {
    fn rebuild(&self, mirror_url: &str) -> Result<()> {
        let program = self.program()?;
        info!(mirror = mirror_url, "rebuilding mirror index");
        let output = Command::new(&program)
            .args(["-d", "buildcache", "update-index", mirror_url])
            .output()
            .with_context(|| format!("failed to run {}", program.display()))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("spack buildcache update-index failed: {}", stderr.trim());
        }
        Ok(())
    }
}

/// What happened to the index after a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum IndexRebuild {
    /// Nothing changed membership, or the run was a dry run.
    Skipped,
    Rebuilt,
    Failed { message: String },
}

impl IndexRebuild {
    pub fn run(indexer: &dyn IndexRebuilder, mirror_url: &str) -> Self {
        match indexer.rebuild(mirror_url) {
            Ok(()) => Self::Rebuilt,
            Err(err) => {
                warn!(mirror = mirror_url, error = %format!("{err:#}"), "index rebuild failed");
                Self::Failed {
                    message: format!("{err:#}"),
                }
            }
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}
