//! Graduating specs from stack mirrors into the root mirror.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use bckit_domain::{join_key, BuiltSpec, Catalog, Layout, Manifest, MediaType};
use bckit_store::fetch_to_path;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::engine::Engine;
use crate::indexer::IndexRebuild;

const KEY_MARKER: &str = "public-key.imported";

/// A hash complete in some stack but not in the root mirror.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MissingSpec {
    pub hash: String,
    /// Stack the spec will be copied from.
    pub stack: String,
}

/// Hashes to graduate, sorted, each with the first stack (in name order) that
/// holds a complete copy.
pub fn find_missing(catalog: &Catalog) -> Vec<MissingSpec> {
    let mut missing: BTreeMap<&str, &str> = BTreeMap::new();
    for (stack, specs) in catalog.stacks() {
        for spec in specs.values().filter(|spec| spec.is_complete()) {
            let in_root = catalog
                .root()
                .get(&spec.hash)
                .is_some_and(BuiltSpec::is_complete);
            if !in_root {
                missing.entry(spec.hash.as_str()).or_insert(stack);
            }
        }
    }
    missing
        .into_iter()
        .map(|(hash, stack)| MissingSpec {
            hash: hash.to_string(),
            stack: stack.to_string(),
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureReason {
    Signature,
    Download,
    Copy,
    Manifest,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum PublishResult {
    Published {
        spec: String,
        stack: String,
        message: String,
    },
    Failed {
        hash: String,
        stack: String,
        reason: FailureReason,
        message: String,
    },
}

#[derive(Debug, Clone)]
pub struct PublishPlan {
    pub layout: Layout,
    pub exclude: Vec<String>,
    pub key_url: Option<String>,
    pub workdir: PathBuf,
    pub upload: bool,
    pub force: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct PublishReport {
    pub missing: Vec<MissingSpec>,
    pub dry_run: bool,
    /// `None` when the key step did not run.
    pub key_imported: Option<bool>,
    pub published: Vec<PublishResult>,
    pub failed: Vec<PublishResult>,
    pub index: IndexRebuild,
}

impl PublishReport {
    pub fn signature_failures(&self) -> usize {
        self.failed
            .iter()
            .filter(|result| {
                matches!(
                    result,
                    PublishResult::Failed {
                        reason: FailureReason::Signature,
                        ..
                    }
                )
            })
            .count()
    }
}

pub fn run(engine: &Engine, plan: &PublishPlan) -> Result<PublishReport> {
    let catalog = engine.catalog(plan.layout, &plan.exclude, plan.force)?;
    let missing = find_missing(&catalog);
    info!(
        missing = missing.len(),
        stacks = catalog.stack_names().len(),
        "specs missing from the root mirror"
    );

    let mut report = PublishReport {
        missing,
        dry_run: !plan.upload,
        key_imported: None,
        published: Vec::new(),
        failed: Vec::new(),
        index: IndexRebuild::Skipped,
    };
    if !plan.upload || report.missing.is_empty() {
        return Ok(report);
    }

    let key_url = plan
        .key_url
        .as_deref()
        .ok_or_else(|| anyhow!("no public key URL configured"))?;
    report.key_imported = Some(ensure_public_key(engine, key_url, &plan.workdir, plan.force)?);

    engine.pool().run(
        report.missing.clone(),
        |missing| publish_one(engine, &catalog, &missing),
        |result| match result {
            published @ PublishResult::Published { .. } => report.published.push(published),
            failed @ PublishResult::Failed { .. } => report.failed.push(failed),
        },
    );

    if !report.published.is_empty() {
        engine.invalidate_listing()?;
        report.index = IndexRebuild::run(engine.indexer(), engine.mirror().as_str());
    }
    info!(
        published = report.published.len(),
        failed = report.failed.len(),
        "publish complete"
    );
    Ok(report)
}

/// Download and trust the signing key once per work directory.
fn ensure_public_key(engine: &Engine, url: &str, workdir: &Path, force: bool) -> Result<bool> {
    let marker = workdir.join(KEY_MARKER);
    if !force && fs::read_to_string(&marker).is_ok_and(|seen| seen.trim() == url) {
        debug!(url, "public key already imported");
        return Ok(false);
    }
    let name = url
        .rsplit('/')
        .next()
        .filter(|name| !name.is_empty())
        .unwrap_or("public.key");
    let dest = workdir.join("keys").join(name);
    fetch_to_path(url, &dest, true)
        .with_context(|| format!("failed to download public key {url}"))?;
    engine
        .keyring()
        .import_key(&dest)
        .with_context(|| format!("failed to import public key {}", dest.display()))?;
    fs::write(&marker, url).with_context(|| format!("failed to write {}", marker.display()))?;
    info!(url, "imported public key");
    Ok(true)
}

/// One key to copy, in copy order.
struct Transfer {
    from: String,
    size: u64,
}

fn publish_one(engine: &Engine, catalog: &Catalog, missing: &MissingSpec) -> PublishResult {
    let fail = |reason: FailureReason, message: String| {
        if reason == FailureReason::Signature {
            error!(hash = %missing.hash, stack = %missing.stack, "{message}");
        } else {
            warn!(hash = %missing.hash, stack = %missing.stack, ?reason, "{message}");
        }
        PublishResult::Failed {
            hash: missing.hash.clone(),
            stack: missing.stack.clone(),
            reason,
            message,
        }
    };
    let Some(spec) = catalog
        .stack(&missing.stack)
        .and_then(|specs| specs.get(&missing.hash))
    else {
        return fail(FailureReason::Manifest, "spec vanished from the catalog".into());
    };
    let source = catalog.mirror_prefix(&missing.stack);
    let target = catalog.mirror_prefix("");

    let signed = match catalog.layout() {
        Layout::V2 => spec.meta.as_ref(),
        Layout::V3 => spec.manifest.as_ref(),
    };
    let Some(signed) = signed else {
        return fail(FailureReason::Manifest, "no signed metadata".into());
    };
    let text = match engine.store().get(&signed.key) {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(err) => return fail(FailureReason::Download, format!("{}: {err}", signed.key)),
    };
    let payload = match engine.keyring().verify(&text) {
        Ok(payload) => payload,
        Err(err) => return fail(FailureReason::Signature, format!("{}: {err}", signed.key)),
    };

    let mut transfers = Vec::new();
    match catalog.layout() {
        Layout::V2 => {
            let Some(archive) = &spec.archive else {
                return fail(FailureReason::Manifest, "no archive".into());
            };
            transfers.push(Transfer {
                from: archive.key.clone(),
                size: archive.size,
            });
        }
        Layout::V3 => {
            let manifest = match Manifest::parse(payload.as_bytes()) {
                Ok(manifest) => manifest,
                Err(err) => return fail(FailureReason::Manifest, format!("{}: {err}", signed.key)),
            };
            for media_type in [MediaType::Archive, MediaType::Spec] {
                let Some(record) = manifest.blob(media_type) else {
                    return fail(
                        FailureReason::Manifest,
                        format!("{} lists no {} blob", signed.key, media_type.as_str()),
                    );
                };
                transfers.push(Transfer {
                    from: record.key(&source),
                    size: record.content_length,
                });
            }
        }
    }
    transfers.push(Transfer {
        from: signed.key.clone(),
        size: signed.size,
    });

    for transfer in &transfers {
        let Some(to) = rebase(&transfer.from, &source, &target) else {
            return fail(
                FailureReason::Copy,
                format!("{} is outside {source}", transfer.from),
            );
        };
        debug!(from = %transfer.from, to = %to, size = transfer.size, "copying");
        if let Err(err) = engine.store().copy(&transfer.from, &to, transfer.size) {
            return fail(FailureReason::Copy, format!("{} -> {to}: {err}", transfer.from));
        }
    }
    PublishResult::Published {
        spec: spec.label(),
        stack: missing.stack.clone(),
        message: format!("copied {} objects", transfers.len()),
    }
}

fn rebase(key: &str, source: &str, target: &str) -> Option<String> {
    let rest = key.strip_prefix(source)?.strip_prefix('/')?;
    Some(join_key(target, rest))
}
