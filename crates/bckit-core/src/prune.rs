//! Deciding what is safe to delete from a mirror, and deleting it.
//!
//! A run goes through `BUILD_CATALOG`, `DETERMINE_PRUNABLE`, `PRUNE`, and
//! optionally `DELETE`. The strategy is picked once per run.

use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use bckit_domain::{BuiltSpec, KeepSet, Layout, MirrorIndex, ObjectRole, SpecMap, StoreObject};
use bckit_store::{delete_objects, DeleteReport, IndexDocument, WorkerPool};
use serde::{Deserialize, Serialize};
use serde_json::json;
use time::format_description::well_known::Rfc3339;
use time::{Date, Duration, OffsetDateTime, Time};
use tracing::{debug, info, warn};

use crate::engine::Engine;
use crate::indexer::IndexRebuild;
use crate::reports::{write_json, write_json_once, write_lines};

pub const DEFAULT_SINCE_DAYS: u32 = 14;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PruneMethod {
    Direct,
    Index,
    Orphan,
}

impl PruneMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Index => "index",
            Self::Orphan => "orphan",
        }
    }

    /// Tag recorded on every object this method selects.
    pub fn pruner_name(self) -> &'static str {
        match self {
            Self::Direct => "direct-pruner",
            Self::Index => "index-pruner",
            Self::Orphan => "orphan-pruner",
        }
    }
}

impl fmt::Display for PruneMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An object selected for deletion. Reporting only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PrunedObject {
    pub method: &'static str,
    pub hash: String,
    pub role: ObjectRole,
    pub object: StoreObject,
}

/// `start_date` at midnight UTC, or `now - since_days`.
pub fn cutoff(now: OffsetDateTime, since_days: u32, start_date: Option<Date>) -> OffsetDateTime {
    match start_date {
        Some(date) => date.with_time(Time::MIDNIGHT).assume_utc(),
        None => now - Duration::days(i64::from(since_days)),
    }
}

#[derive(Debug, Clone)]
pub enum Pruner {
    /// Anything not kept whose archive is older than the cutoff.
    Direct { keep: KeepSet, cutoff: OffsetDateTime },
    /// Anything the index lists as present that is not kept.
    Index { keep: KeepSet, index: MirrorIndex },
    /// Archives the index does not know about, and index entries without an archive.
    Orphan {
        index: MirrorIndex,
        cutoff: OffsetDateTime,
    },
}

impl Pruner {
    pub fn direct(keep: KeepSet, cutoff: OffsetDateTime) -> Self {
        Self::Direct { keep, cutoff }
    }

    pub fn index(keep: KeepSet, index: MirrorIndex) -> Self {
        Self::Index { keep, index }
    }

    /// Archives newer than the index cannot be judged against it, so the cutoff
    /// is pulled back to the index timestamp when the index is older.
    pub fn orphan(document: &IndexDocument, cutoff: OffsetDateTime) -> Self {
        let indexed_at = document.object.last_modified;
        let cutoff = if indexed_at < cutoff {
            warn!(
                index = %document.object.key,
                index_time = %indexed_at,
                requested_cutoff = %cutoff,
                "mirror index is older than the cutoff; using the index time instead"
            );
            indexed_at
        } else {
            cutoff
        };
        Self::Orphan {
            index: document.index.clone(),
            cutoff,
        }
    }

    pub fn method(&self) -> PruneMethod {
        match self {
            Self::Direct { .. } => PruneMethod::Direct,
            Self::Index { .. } => PruneMethod::Index,
            Self::Orphan { .. } => PruneMethod::Orphan,
        }
    }

    /// Effective cutoff, if the method uses one.
    pub fn cutoff(&self) -> Option<OffsetDateTime> {
        match self {
            Self::Direct { cutoff, .. } | Self::Orphan { cutoff, .. } => Some(*cutoff),
            Self::Index { .. } => None,
        }
    }

    /// Hashes this method considers prunable.
    pub fn determine_prunable(&self, specs: &SpecMap) -> BTreeSet<String> {
        match self {
            Self::Index { keep, index } => index
                .registered()
                .into_iter()
                .filter(|hash| !keep.contains(hash))
                .collect(),
            Self::Direct { .. } | Self::Orphan { .. } => specs
                .values()
                .filter(|spec| !self.select(spec).is_empty())
                .map(|spec| spec.hash.clone())
                .collect(),
        }
    }

    /// Objects of `spec` this method deletes.
    fn select<'a>(&self, spec: &'a BuiltSpec) -> Vec<(ObjectRole, &'a StoreObject)> {
        let with_meta = |archive: &'a StoreObject| {
            let mut objects = vec![(ObjectRole::Archive, archive)];
            objects.extend(
                spec.meta_objects()
                    .into_iter()
                    .map(|object| (ObjectRole::Meta, object)),
            );
            objects
        };
        match self {
            Self::Direct { keep, cutoff } => match &spec.archive {
                Some(archive) if !keep.contains(&spec.hash) && archive.last_modified <= *cutoff => {
                    with_meta(archive)
                }
                _ => Vec::new(),
            },
            Self::Index { keep, index } => {
                if keep.contains(&spec.hash) || !index.is_registered(&spec.hash) {
                    Vec::new()
                } else {
                    spec.objects()
                }
            }
            Self::Orphan { index, cutoff } => {
                let registered = index.is_registered(&spec.hash);
                match &spec.archive {
                    Some(archive) if !registered && archive.last_modified <= *cutoff => {
                        with_meta(archive)
                    }
                    Some(_) => Vec::new(),
                    None if registered => spec
                        .meta_objects()
                        .into_iter()
                        .map(|object| (ObjectRole::Meta, object))
                        .collect(),
                    None => Vec::new(),
                }
            }
        }
    }

    /// Classify every object of `specs` against `hashes` on the pool, then check
    /// that no pruned object leaves its counterpart behind.
    pub fn prune(
        &self,
        specs: &SpecMap,
        hashes: &BTreeSet<String>,
        pool: &WorkerPool,
    ) -> (Vec<PrunedObject>, Vec<String>) {
        let method = self.method().pruner_name();
        let mut pruned: Vec<PrunedObject> = pool
            .map(specs.values(), |spec| {
                if !hashes.contains(&spec.hash) {
                    return Vec::new();
                }
                self.select(spec)
                    .into_iter()
                    .map(|(role, object)| {
                        debug!(method, hash = %spec.hash, key = %object.key, "prunable object");
                        PrunedObject {
                            method,
                            hash: spec.hash.clone(),
                            role,
                            object: object.clone(),
                        }
                    })
                    .collect::<Vec<_>>()
            })
            .into_iter()
            .flatten()
            .collect();
        pruned.sort_by(|a, b| a.object.key.cmp(&b.object.key));

        let warnings = counterpart_violations(specs, &pruned);
        for warning in &warnings {
            warn!(method, "{warning}");
        }
        (pruned, warnings)
    }
}

fn counterpart_violations(specs: &SpecMap, pruned: &[PrunedObject]) -> Vec<String> {
    let keys: HashSet<&str> = pruned.iter().map(|p| p.object.key.as_str()).collect();
    let hashes: BTreeSet<&str> = pruned.iter().map(|p| p.hash.as_str()).collect();
    let mut warnings = Vec::new();
    for hash in hashes {
        let Some(spec) = specs.get(hash) else {
            continue;
        };
        let archive_pruned = spec
            .archive
            .as_ref()
            .map(|archive| keys.contains(archive.key.as_str()));
        let meta = spec.meta_objects();
        let meta_pruned = meta.iter().filter(|m| keys.contains(m.key.as_str())).count();
        match archive_pruned {
            Some(true) if meta_pruned < meta.len() => warnings.push(format!(
                "archive of {hash} is pruned but its metadata is kept"
            )),
            Some(false) if meta_pruned > 0 => warnings.push(format!(
                "metadata of {hash} is pruned but its archive is kept"
            )),
            _ => {}
        }
    }
    warnings
}

/// Inputs of one pruning run.
#[derive(Debug, Clone)]
pub struct PrunePlan {
    pub method: PruneMethod,
    pub layout: Layout,
    pub cutoff: OffsetDateTime,
    pub since_days: u32,
    pub start_date: Option<Date>,
    pub keep: KeepSet,
    pub keep_file: Option<PathBuf>,
    /// Skip `DETERMINE_PRUNABLE` and prune exactly these hashes.
    pub prune_hashes: Option<BTreeSet<String>>,
    pub output_dir: PathBuf,
    pub suffix: String,
    pub delete: bool,
    pub force: bool,
}

impl PrunePlan {
    fn report_path(&self, kind: &str, extension: &str) -> PathBuf {
        self.output_dir.join(format!(
            "{}-{kind}{}.{extension}",
            self.method.as_str(),
            self.suffix
        ))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportFiles {
    pub hashes: PathBuf,
    pub files: PathBuf,
    pub config: PathBuf,
    pub config_written: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct PruneReport {
    pub method: PruneMethod,
    #[serde(with = "time::serde::rfc3339::option")]
    pub cutoff: Option<OffsetDateTime>,
    pub catalogued: usize,
    pub prunable: BTreeSet<String>,
    pub objects: Vec<PrunedObject>,
    pub warnings: Vec<String>,
    pub deleted: Option<DeleteReport>,
    pub index: IndexRebuild,
    pub reports: ReportFiles,
}

impl PruneReport {
    pub fn pruned_bytes(&self) -> u64 {
        self.objects.iter().map(|p| p.object.size).sum()
    }
}

pub fn run(engine: &Engine, plan: &PrunePlan) -> Result<PruneReport> {
    info!(stage = "BUILD_CATALOG", method = %plan.method, mirror = %engine.mirror());
    let catalog = engine.catalog(plan.layout, &[], plan.force)?;
    let specs = catalog.root();

    let pruner = match plan.method {
        PruneMethod::Direct => Pruner::direct(plan.keep.clone(), plan.cutoff),
        PruneMethod::Index => Pruner::index(plan.keep.clone(), engine.index(plan.layout)?.index),
        PruneMethod::Orphan => Pruner::orphan(&engine.index(plan.layout)?, plan.cutoff),
    };

    let prunable = if let Some(hashes) = &plan.prune_hashes {
        info!(stage = "DETERMINE_PRUNABLE", skipped = true, hashes = hashes.len());
        hashes.clone()
    } else {
        info!(stage = "DETERMINE_PRUNABLE");
        pruner.determine_prunable(specs)
    };

    info!(stage = "PRUNE", hashes = prunable.len());
    let (objects, warnings) = pruner.prune(specs, &prunable, engine.pool());
    let reports = write_reports(engine, plan, &pruner, &prunable, &objects)?;

    let (deleted, index) = if plan.delete && !objects.is_empty() {
        info!(stage = "DELETE", objects = objects.len());
        let keys: Vec<String> = objects.iter().map(|p| p.object.key.clone()).collect();
        let store = engine.store();
        let report = delete_objects(store, &keys, engine.jobs(), store.max_batch_size());
        engine.invalidate_listing()?;
        let index = if report.deleted > 0 {
            IndexRebuild::run(engine.indexer(), engine.mirror().as_str())
        } else {
            IndexRebuild::Skipped
        };
        (Some(report), index)
    } else {
        (None, IndexRebuild::Skipped)
    };

    Ok(PruneReport {
        method: plan.method,
        cutoff: pruner.cutoff(),
        catalogued: specs.len(),
        prunable,
        objects,
        warnings,
        deleted,
        index,
        reports,
    })
}

fn write_reports(
    engine: &Engine,
    plan: &PrunePlan,
    pruner: &Pruner,
    prunable: &BTreeSet<String>,
    objects: &[PrunedObject],
) -> Result<ReportFiles> {
    if plan.output_dir.is_file() {
        bail!("{} is not a directory", plan.output_dir.display());
    }
    let hashes = plan.report_path("prunable-hashes", "json");
    let files = plan.report_path("prunable-files", "txt");
    let config = plan.report_path("config", "json");

    write_json(&hashes, prunable)?;
    write_lines(&files, objects.iter().map(|p| p.object.to_string()))?;
    let config_written = write_json_once(&config, &config_document(engine, plan, pruner))?;
    if !config_written {
        debug!(path = %config.display(), "run config already present");
    }
    Ok(ReportFiles {
        hashes,
        files,
        config,
        config_written,
    })
}

fn config_document(engine: &Engine, plan: &PrunePlan, pruner: &Pruner) -> serde_json::Value {
    let stamp = |at: OffsetDateTime| at.format(&Rfc3339).unwrap_or_default();
    json!({
        "mirror": engine.mirror().as_str(),
        "method": plan.method,
        "layout": plan.layout,
        "since_days": plan.since_days,
        "start_date": plan.start_date.map(|date| date.to_string()),
        "requested_cutoff": stamp(plan.cutoff),
        "cutoff": pruner.cutoff().map(stamp),
        "keep_hashes": plan.keep_file.as_deref().map(Path::display).map(|p| p.to_string()),
        "keep_count": plan.keep.len(),
        "prune_hashes_given": plan.prune_hashes.is_some(),
        "delete": plan.delete,
        "created_at": stamp(engine.now()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{days_ago, hash, MirrorFixture};
    use bckit_domain::{blob_key, sha256_hex, spec_manifest_key, CatalogBuilder, IndexEntry};
    use time::macros::datetime;

    const NOW: OffsetDateTime = datetime!(2024-06-01 12:00 UTC);

    fn object(key: &str, modified: OffsetDateTime) -> StoreObject {
        StoreObject::new("file:///m", key, 10, modified)
    }

    fn spec(hash: &str, meta: bool, archive: Option<OffsetDateTime>) -> BuiltSpec {
        let mut spec = BuiltSpec::new("", hash);
        if meta {
            spec.meta = Some(object(&format!("build_cache/x-{hash}.spec.json.sig"), NOW));
        }
        spec.archive = archive.map(|at| object(&format!("build_cache/x-{hash}.spack"), at));
        spec
    }

    fn specs(items: Vec<BuiltSpec>) -> SpecMap {
        items.into_iter().map(|s| (s.hash.clone(), s)).collect()
    }

    fn index(entries: &[(&str, bool)]) -> MirrorIndex {
        MirrorIndex::from_entries(entries.iter().map(|(hash, present)| {
            (
                (*hash).to_string(),
                IndexEntry {
                    spec: serde_json::Value::Null,
                    in_buildcache: *present,
                },
            )
        }))
    }

    #[test]
    fn direct_pruning_keeps_kept_and_fresh_hashes() {
        let cutoff = cutoff(NOW, 14, None);
        let mut items = Vec::new();
        for n in 0..10 {
            let modified = if n >= 8 { days_ago(NOW, 1) } else { days_ago(NOW, 30) };
            items.push(spec(&hash(n), true, Some(modified)));
        }
        let keep: KeepSet = (0..3).map(hash).collect();
        let specs = specs(items);
        let pruner = Pruner::direct(keep, cutoff);

        let prunable = pruner.determine_prunable(&specs);
        assert_eq!(prunable, (3..8).map(hash).collect::<BTreeSet<_>>());

        let pool = WorkerPool::new(3).unwrap();
        let (objects, warnings) = pruner.prune(&specs, &prunable, &pool);
        assert!(warnings.is_empty());
        assert_eq!(objects.len(), 10);
        assert!(objects.iter().all(|p| p.method == "direct-pruner"));
        assert!(objects
            .iter()
            .filter(|p| p.role == ObjectRole::Archive)
            .all(|p| p.object.last_modified <= cutoff));
    }

    #[test]
    fn fresh_archives_are_never_pruned_even_when_listed() {
        let specs = specs(vec![spec(&hash(1), true, Some(days_ago(NOW, 1)))]);
        let pruner = Pruner::direct(KeepSet::new(), cutoff(NOW, 14, None));
        let forced: BTreeSet<String> = [hash(1)].into();
        let pool = WorkerPool::new(1).unwrap();
        let (objects, _) = pruner.prune(&specs, &forced, &pool);
        assert!(objects.is_empty());
    }

    #[test]
    fn metadata_without_archive_is_not_direct_prunable() {
        let specs = specs(vec![spec(&hash(1), true, None)]);
        let pruner = Pruner::direct(KeepSet::new(), NOW);
        assert!(pruner.determine_prunable(&specs).is_empty());
    }

    #[test]
    fn index_pruning_ignores_timestamps() {
        let specs = specs(vec![
            spec(&hash(1), true, Some(days_ago(NOW, 0))),
            spec(&hash(2), true, Some(days_ago(NOW, 100))),
            spec(&hash(3), true, Some(days_ago(NOW, 100))),
        ]);
        let keep: KeepSet = [hash(2)].into_iter().collect();
        let h1 = hash(1);
        let h2 = hash(2);
        let h3 = hash(3);
        let pruner = Pruner::index(keep, index(&[(&h1, true), (&h2, true), (&h3, false)]));
        let prunable = pruner.determine_prunable(&specs);
        assert_eq!(prunable, BTreeSet::from([h1.clone()]));
        let pool = WorkerPool::new(2).unwrap();
        let (objects, _) = pruner.prune(&specs, &prunable, &pool);
        assert_eq!(objects.len(), 2);
        assert!(objects.iter().all(|p| p.hash == h1));
        assert_eq!(pruner.cutoff(), None);
    }

    #[test]
    fn orphan_pruning_is_symmetric() {
        let (registered_orphan, unregistered_old, unregistered_new, healthy) =
            (hash(1), hash(2), hash(3), hash(4));
        let specs = specs(vec![
            spec(&registered_orphan, true, None),
            spec(&unregistered_old, true, Some(days_ago(NOW, 30))),
            spec(&unregistered_new, false, Some(days_ago(NOW, 1))),
            spec(&healthy, true, Some(days_ago(NOW, 30))),
        ]);
        let document = IndexDocument {
            index: index(&[(&registered_orphan, true), (&healthy, true)]),
            object: object("build_cache/index.json", NOW),
        };
        let pruner = Pruner::orphan(&document, cutoff(NOW, 14, None));
        let prunable = pruner.determine_prunable(&specs);
        assert_eq!(
            prunable,
            BTreeSet::from([registered_orphan.clone(), unregistered_old.clone()])
        );

        let pool = WorkerPool::new(2).unwrap();
        let (objects, warnings) = pruner.prune(&specs, &prunable, &pool);
        assert!(warnings.is_empty());
        let for_hash = |h: &str| objects.iter().filter(|p| p.hash == h).count();
        assert_eq!(for_hash(&registered_orphan), 1);
        assert_eq!(for_hash(&unregistered_old), 2);
        for pruned in &objects {
            let spec = &specs[&pruned.hash];
            assert!(
                spec.archive.is_none() || !document.index.is_registered(&pruned.hash),
                "{} is registered and has an archive",
                pruned.hash
            );
        }
    }

    #[test]
    fn orphan_cutoff_falls_back_to_an_older_index() {
        let indexed_at = days_ago(NOW, 40);
        let document = IndexDocument {
            index: MirrorIndex::default(),
            object: object("build_cache/index.json", indexed_at),
        };
        let pruner = Pruner::orphan(&document, cutoff(NOW, 14, None));
        assert_eq!(pruner.cutoff(), Some(indexed_at));

        let specs = specs(vec![spec(&hash(1), false, Some(days_ago(NOW, 20)))]);
        assert!(pruner.determine_prunable(&specs).is_empty());
    }

    #[test]
    fn counterpart_check_flags_half_pruned_specs() {
        let specs = specs(vec![spec(&hash(1), true, Some(NOW))]);
        let only_archive = vec![PrunedObject {
            method: "direct-pruner",
            hash: hash(1),
            role: ObjectRole::Archive,
            object: specs[&hash(1)].archive.clone().unwrap(),
        }];
        assert_eq!(counterpart_violations(&specs, &only_archive).len(), 1);
    }

    #[test]
    fn start_date_overrides_since_days() {
        let date = Date::from_calendar_date(2024, time::Month::January, 2).unwrap();
        assert_eq!(cutoff(NOW, 14, Some(date)), datetime!(2024-01-02 0:00 UTC));
        assert_eq!(cutoff(NOW, 14, None), datetime!(2024-05-18 12:00 UTC));
    }

    fn plan(fixture: &MirrorFixture, method: PruneMethod, delete: bool) -> PrunePlan {
        PrunePlan {
            method,
            layout: Layout::V2,
            cutoff: cutoff(NOW, 14, None),
            since_days: 14,
            start_date: None,
            keep: KeepSet::new(),
            keep_file: None,
            prune_hashes: None,
            output_dir: fixture.cache.path().join("reports"),
            suffix: String::new(),
            delete,
            force: false,
        }
    }

    #[test]
    fn run_writes_reports_and_deletes_on_request() -> Result<()> {
        let fixture = MirrorFixture::new();
        let old = fixture.add_v2_spec(None, "zlib", &hash(1), days_ago(NOW, 30));
        let fresh = fixture.add_v2_spec(None, "cmake", &hash(2), days_ago(NOW, 1));
        let engine = fixture.engine().with_now(NOW);

        let mut dry = plan(&fixture, PruneMethod::Direct, false);
        dry.suffix = "-dry".into();
        let report = run(&engine, &dry)?;
        assert_eq!(report.prunable, BTreeSet::from([old.hash.clone()]));
        assert!(report.deleted.is_none());
        assert!(fixture.exists(&old.archive_key));
        let files = std::fs::read_to_string(&report.reports.files)?;
        assert_eq!(files.lines().count(), 2);
        assert!(report.reports.config_written);
        assert!(report
            .reports
            .hashes
            .ends_with("direct-prunable-hashes-dry.json"));

        let report = run(&engine, &plan(&fixture, PruneMethod::Direct, true))?;
        let deleted = report.deleted.expect("delete report");
        assert_eq!(deleted.deleted, 2);
        assert!(!fixture.exists(&old.archive_key));
        assert!(!fixture.exists(&old.meta_key));
        assert!(fixture.exists(&fresh.archive_key));
        assert_eq!(report.index, IndexRebuild::Rebuilt);
        assert_eq!(fixture.indexer.calls().len(), 1);

        let rerun = run(&engine, &plan(&fixture, PruneMethod::Direct, true))?;
        assert!(rerun.prunable.is_empty(), "listing was invalidated after delete");
        Ok(())
    }

    #[test]
    fn direct_pruning_of_a_v3_mirror_takes_the_manifest_and_both_blobs() -> Result<()> {
        let fixture = MirrorFixture::new();
        let old = fixture.add_v2_spec(None, "zlib", &hash(1), days_ago(NOW, 30));
        let kept = fixture.add_v2_spec(None, "cmake", &hash(2), days_ago(NOW, 30));
        let engine = fixture.engine().with_now(NOW);
        let migrated = crate::migrate::run(
            &engine,
            crate::migrate::MigratePlan {
                upload: true,
                force: false,
            },
        )?;
        assert_eq!(migrated.migrated.len(), 2);

        let mut plan = plan(&fixture, PruneMethod::Direct, true);
        plan.layout = Layout::V3;
        // migrated blobs carry the time they were written
        plan.cutoff = OffsetDateTime::now_utc() + Duration::days(1);
        plan.keep = KeepSet::from_iter([kept.hash.clone()]);
        let report = run(&engine, &plan)?;
        assert_eq!(report.prunable, BTreeSet::from([old.hash.clone()]));
        assert!(report.warnings.is_empty(), "{:?}", report.warnings);

        let manifest_key = spec_manifest_key("", "zlib", "1.0", &old.hash);
        let archive_blob = blob_key("", "sha256", &sha256_hex(&old.archive));
        let pruned: Vec<(ObjectRole, &str)> = report
            .objects
            .iter()
            .map(|p| (p.role, p.object.key.as_str()))
            .collect();
        assert_eq!(pruned.len(), 3);
        assert!(pruned.contains(&(ObjectRole::Meta, manifest_key.as_str())));
        assert!(pruned.contains(&(ObjectRole::Archive, archive_blob.as_str())));
        assert!(pruned.iter().any(|(role, key)| {
            *role == ObjectRole::Meta && key.starts_with("blobs/sha256/") && *key != archive_blob
        }));

        assert_eq!(report.deleted.expect("delete report").deleted, 3);
        assert!(!fixture.exists(&manifest_key));
        assert!(!fixture.exists(&archive_blob));
        assert!(fixture.exists(&old.archive_key), "v2 objects are left alone");
        assert!(fixture.exists(&spec_manifest_key("", "cmake", "1.0", &kept.hash)));
        Ok(())
    }

    #[test]
    fn prune_hashes_skip_determination() -> Result<()> {
        let fixture = MirrorFixture::new();
        fixture.add_v2_spec(None, "zlib", &hash(1), days_ago(NOW, 30));
        let other = fixture.add_v2_spec(None, "bzip2", &hash(2), days_ago(NOW, 30));
        let engine = fixture.engine().with_now(NOW);
        let mut plan = plan(&fixture, PruneMethod::Direct, false);
        plan.prune_hashes = Some(BTreeSet::from([other.hash.clone()]));
        let report = run(&engine, &plan)?;
        assert_eq!(report.prunable, BTreeSet::from([other.hash]));
        assert_eq!(report.objects.len(), 2);
        Ok(())
    }

    #[test]
    fn index_methods_need_an_index() {
        let fixture = MirrorFixture::new();
        fixture.add_v2_spec(None, "zlib", &hash(1), days_ago(NOW, 30));
        let engine = fixture.engine().with_now(NOW);
        let err = run(&engine, &plan(&fixture, PruneMethod::Orphan, false)).unwrap_err();
        assert!(err
            .downcast_ref::<bckit_store::StoreError>()
            .is_some_and(bckit_store::StoreError::is_not_found));
    }

    #[test]
    fn catalog_scenario_from_listing() {
        let listing = format!(
            "2024-01-01 00:00:00 1 build_cache/x-{h}.spec.json.sig\n\
             2024-01-01 00:00:00 1 build_cache/x-{h}.spack\n",
            h = hash(7)
        );
        let catalog = CatalogBuilder::new(Layout::V2, "", "file:///m")
            .build(std::io::Cursor::new(listing), Path::new("l"), None)
            .unwrap();
        let pruner = Pruner::direct(KeepSet::new(), NOW);
        assert_eq!(pruner.determine_prunable(catalog.root()).len(), 1);
    }
}
