//! Converting a v2 mirror into the content-addressable v3 layout in place.
//!
//! For every complete v2 spec the archive is copied to its blob key, the spec
//! document is re-encoded as a gzip blob, and a signed manifest naming both is
//! written last. The manifest is the commit point: a spec without one has not
//! been migrated, whatever blobs already exist.

use std::io::{self, Write};

use anyhow::Result;
use bckit_domain::{
    blob_key, key_manifest_key, sha256_hex, spec_manifest_key, BlobRecord, BuiltSpec, Catalog,
    Layout, LayoutPatterns, Manifest, SpecDocument, ARCHIVE_MEDIA_TYPE, KEY_MEDIA_TYPE,
    SPEC_MEDIA_TYPE,
};
use bytes::Bytes;
use flate2::{Compression, GzBuilder};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::engine::Engine;
use crate::indexer::IndexRebuild;

#[derive(Debug, Clone, Copy)]
pub struct MigratePlan {
    pub upload: bool,
    pub force: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MigrateFailure {
    Signature,
    Download,
    Integrity,
    Upload,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum MigrateResult {
    Migrated {
        hash: String,
        manifest: String,
    },
    Failed {
        hash: String,
        reason: MigrateFailure,
        message: String,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct MigrateReport {
    pub dry_run: bool,
    /// Complete v2 specs still lacking a v3 manifest (all of them when forced).
    pub candidates: Vec<String>,
    /// Complete v2 specs that already have a manifest.
    pub already_migrated: usize,
    pub migrated: Vec<MigrateResult>,
    pub failed: Vec<MigrateResult>,
    /// Key manifests written.
    pub keys: Vec<String>,
    pub index: IndexRebuild,
}

pub fn run(engine: &Engine, plan: MigratePlan) -> Result<MigrateReport> {
    let listing = engine.listing(plan.force)?;
    let legacy = engine.catalog_from_listing(&listing, Layout::V2, &[], false)?;
    let current = engine.catalog_from_listing(&listing, Layout::V3, &[], false)?;

    let mut candidates: Vec<&BuiltSpec> = Vec::new();
    let mut already_migrated = 0;
    for spec in legacy.root().values().filter(|spec| spec.is_complete()) {
        let has_manifest = current
            .root()
            .get(&spec.hash)
            .is_some_and(|existing| existing.manifest.is_some());
        if has_manifest && !plan.force {
            already_migrated += 1;
        } else {
            candidates.push(spec);
        }
    }
    candidates.sort_by(|a, b| a.hash.cmp(&b.hash));
    info!(
        candidates = candidates.len(),
        already_migrated,
        upload = plan.upload,
        "migration candidates"
    );

    let mut report = MigrateReport {
        dry_run: !plan.upload,
        candidates: candidates.iter().map(|spec| spec.hash.clone()).collect(),
        already_migrated,
        migrated: Vec::new(),
        failed: Vec::new(),
        keys: Vec::new(),
        index: IndexRebuild::Skipped,
    };
    if !plan.upload {
        return Ok(report);
    }

    engine.pool().run(
        candidates,
        |spec| migrate_spec(engine, spec),
        |result| match result {
            migrated @ MigrateResult::Migrated { .. } => report.migrated.push(migrated),
            failed @ MigrateResult::Failed { .. } => report.failed.push(failed),
        },
    );

    if !report.migrated.is_empty() {
        report.keys = migrate_keys(engine, &legacy);
        engine.invalidate_listing()?;
        report.index = IndexRebuild::run(engine.indexer(), engine.mirror().as_str());
    }
    info!(
        migrated = report.migrated.len(),
        failed = report.failed.len(),
        keys = report.keys.len(),
        "migration complete"
    );
    Ok(report)
}

fn migrate_spec(engine: &Engine, spec: &BuiltSpec) -> MigrateResult {
    let fail = |reason: MigrateFailure, message: String| {
        if reason == MigrateFailure::Signature {
            error!(hash = %spec.hash, "{message}");
        } else {
            warn!(hash = %spec.hash, ?reason, "{message}");
        }
        MigrateResult::Failed {
            hash: spec.hash.clone(),
            reason,
            message,
        }
    };
    let (Some(meta), Some(archive)) = (&spec.meta, &spec.archive) else {
        return fail(MigrateFailure::Integrity, "spec is incomplete".into());
    };
    let store = engine.store();
    let prefix = engine.prefix();

    let signed = match store.get(&meta.key) {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(err) => return fail(MigrateFailure::Download, format!("{}: {err}", meta.key)),
    };
    let payload = match engine.keyring().verify(&signed) {
        Ok(payload) => payload,
        Err(err) => return fail(MigrateFailure::Signature, format!("{}: {err}", meta.key)),
    };
    let mut document = match SpecDocument::parse(&payload) {
        Ok(document) => document,
        Err(err) => return fail(MigrateFailure::Integrity, format!("{}: {err}", meta.key)),
    };
    let (checksum, node) = match (document.archive_checksum(), document.node(&spec.hash)) {
        (Ok(checksum), Ok(node)) => (checksum, node),
        (Err(err), _) | (_, Err(err)) => {
            return fail(MigrateFailure::Integrity, format!("{}: {err}", meta.key))
        }
    };
    document.strip_layout_version();
    let spec_blob = match gzip(&document.to_bytes()) {
        Ok(bytes) => bytes,
        Err(err) => return fail(MigrateFailure::Integrity, format!("compressing spec: {err}")),
    };
    let spec_checksum = sha256_hex(&spec_blob);

    let archive_record = BlobRecord {
        content_length: archive.size,
        media_type: ARCHIVE_MEDIA_TYPE.to_string(),
        compression: "gzip".to_string(),
        checksum_algorithm: checksum.algorithm.clone(),
        checksum: checksum.checksum.clone(),
    };
    let spec_record = BlobRecord {
        content_length: spec_blob.len() as u64,
        media_type: SPEC_MEDIA_TYPE.to_string(),
        compression: "gzip".to_string(),
        checksum_algorithm: "sha256".to_string(),
        checksum: spec_checksum,
    };
    let manifest = Manifest::new(vec![archive_record.clone(), spec_record.clone()]);
    let manifest_text = String::from_utf8_lossy(&manifest.to_json_bytes()).into_owned();
    let signed_manifest = match engine.keyring().clearsign(&manifest_text) {
        Ok(signed) => signed,
        Err(err) => return fail(MigrateFailure::Signature, format!("signing manifest: {err}")),
    };

    let archive_key = archive_record.key(prefix);
    let spec_key = spec_record.key(prefix);
    let manifest_key = spec_manifest_key(prefix, &node.name, &node.version, &spec.hash);
    debug!(hash = %spec.hash, archive = %archive_key, spec = %spec_key, "uploading blobs");
    if let Err(err) = store.copy(&archive.key, &archive_key, archive.size) {
        return fail(MigrateFailure::Upload, format!("{archive_key}: {err}"));
    }
    if let Err(err) = store.put(&spec_key, Bytes::from(spec_blob)) {
        return fail(MigrateFailure::Upload, format!("{spec_key}: {err}"));
    }
    if let Err(err) = store.put(&manifest_key, Bytes::from(signed_manifest.into_bytes())) {
        return fail(MigrateFailure::Upload, format!("{manifest_key}: {err}"));
    }
    MigrateResult::Migrated {
        hash: spec.hash.clone(),
        manifest: manifest_key,
    }
}

/// Re-publish each root public key as a blob with a signed key manifest.
fn migrate_keys(engine: &Engine, legacy: &Catalog) -> Vec<String> {
    let patterns = LayoutPatterns::new(Layout::V2, legacy.prefix());
    let store = engine.store();
    let prefix = engine.prefix();
    let mut written = Vec::new();
    for object in legacy.public_keys() {
        let Some(fingerprint) = patterns.classify_public_key(&object.key) else {
            continue;
        };
        let result = (|| -> Result<String> {
            let bytes = store.get(&object.key)?;
            let record = BlobRecord {
                content_length: bytes.len() as u64,
                media_type: KEY_MEDIA_TYPE.to_string(),
                compression: "none".to_string(),
                checksum_algorithm: "sha256".to_string(),
                checksum: sha256_hex(&bytes),
            };
            store.put(&record.key(prefix), bytes)?;
            let manifest = Manifest::new(vec![record]);
            let text = String::from_utf8_lossy(&manifest.to_json_bytes()).into_owned();
            let signed = engine.keyring().clearsign(&text)?;
            let key = key_manifest_key(prefix, &fingerprint);
            store.put(&key, Bytes::from(signed.into_bytes()))?;
            Ok(key)
        })();
        match result {
            Ok(key) => {
                debug!(fingerprint = %fingerprint, manifest = %key, "migrated public key");
                written.push(key);
            }
            Err(err) => warn!(fingerprint = %fingerprint, error = %format!("{err:#}"), "failed to migrate public key"),
        }
    }
    written
}

/// Gzip with a zero header timestamp so equal input gives equal blobs.
fn gzip(bytes: &[u8]) -> io::Result<Vec<u8>> {
    let mut encoder = GzBuilder::new()
        .mtime(0)
        .write(Vec::new(), Compression::default());
    encoder.write_all(bytes)?;
    encoder.finish()
}
