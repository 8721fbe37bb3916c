//! Catalog of the specs present in a mirror and its stacks.
//!
//! A catalog is built in one pass over a flat listing and is never mutated
//! afterwards; a fresh listing means a fresh catalog.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use tracing::{debug, warn};

use crate::layout::{Layout, LayoutPatterns, MatchKind};
use crate::manifest::{Manifest, MediaType};
use crate::object::{parse_listing_line, ListingError, StoreObject};
use crate::spec::BuiltSpec;

pub type SpecMap = HashMap<String, BuiltSpec>;

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("failed to read listing {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Listing(#[from] ListingError),
}

/// A downloaded and parsed v3 manifest.
#[derive(Debug, Clone)]
pub struct ResolvedManifest {
    pub manifest: Manifest,
    /// Where the manifest was cached locally, if anywhere.
    pub local_path: Option<PathBuf>,
}

/// Fetches v3 manifests while a catalog is being built.
pub trait ManifestResolver: Sync {
    fn resolve(&self, manifest: &StoreObject) -> anyhow::Result<ResolvedManifest>;
}

#[derive(Debug, Clone, Default)]
pub struct Catalog {
    layout: Layout,
    prefix: String,
    root: SpecMap,
    stacks: BTreeMap<String, SpecMap>,
    public_keys: Vec<StoreObject>,
}

impl Catalog {
    pub fn layout(&self) -> Layout {
        self.layout
    }

    /// Mirror prefix the catalog was built for.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn root(&self) -> &SpecMap {
        &self.root
    }

    pub fn stack(&self, name: &str) -> Option<&SpecMap> {
        self.stacks.get(name)
    }

    /// Stacks in name order.
    pub fn stacks(&self) -> impl Iterator<Item = (&str, &SpecMap)> {
        self.stacks.iter().map(|(name, specs)| (name.as_str(), specs))
    }

    pub fn stack_names(&self) -> Vec<&str> {
        self.stacks.keys().map(String::as_str).collect()
    }

    /// Root-level public keys (`build_cache/_pgp/*.pub`).
    pub fn public_keys(&self) -> &[StoreObject] {
        &self.public_keys
    }

    /// Key prefix of a stack mirror, or of the root when `stack` is empty.
    pub fn mirror_prefix(&self, stack: &str) -> String {
        crate::layout::join_key(&self.prefix, stack)
            .trim_end_matches('/')
            .to_string()
    }

    fn get_or_insert(&mut self, stack: Option<&str>, hash: &str) -> &mut BuiltSpec {
        let specs = match stack {
            None => &mut self.root,
            Some(name) => self.stacks.entry(name.to_string()).or_default(),
        };
        specs
            .entry(hash.to_string())
            .or_insert_with(|| BuiltSpec::new(stack.unwrap_or_default(), hash))
    }

    fn specs_mut(&mut self) -> Vec<&mut BuiltSpec> {
        self.root
            .values_mut()
            .chain(self.stacks.values_mut().flat_map(HashMap::values_mut))
            .collect()
    }
}

/// Number of complete specs in a map.
pub fn complete_count(specs: &SpecMap) -> usize {
    specs.values().filter(|spec| spec.is_complete()).count()
}

/// Builds a [`Catalog`] from a listing.
#[derive(Debug, Clone)]
pub struct CatalogBuilder {
    patterns: LayoutPatterns,
    store_id: String,
    exclude: BTreeSet<String>,
}

impl CatalogBuilder {
    pub fn new(layout: Layout, prefix: &str, store_id: impl Into<String>) -> Self {
        Self {
            patterns: LayoutPatterns::new(layout, prefix),
            store_id: store_id.into(),
            exclude: BTreeSet::new(),
        }
    }

    /// Drop these stacks entirely.
    #[must_use]
    pub fn exclude<I, S>(mut self, stacks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude.extend(stacks.into_iter().map(Into::into));
        self
    }

    pub fn patterns(&self) -> &LayoutPatterns {
        &self.patterns
    }

    /// Build from a cached listing file.
    pub fn build_from_path(
        &self,
        path: &Path,
        resolver: Option<&dyn ManifestResolver>,
    ) -> Result<Catalog, CatalogError> {
        let file = File::open(path).map_err(|source| CatalogError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        self.build(BufReader::new(file), path, resolver)
    }

    /// Build from listing lines. `origin` only labels I/O errors.
    pub fn build<R: BufRead>(
        &self,
        reader: R,
        origin: &Path,
        resolver: Option<&dyn ManifestResolver>,
    ) -> Result<Catalog, CatalogError> {
        let mut objects = Vec::new();
        for (index, line) in reader.lines().enumerate() {
            let line = line.map_err(|source| CatalogError::Io {
                path: origin.to_path_buf(),
                source,
            })?;
            if line.trim().is_empty() {
                continue;
            }
            objects.push(parse_listing_line(&self.store_id, &line, index + 1)?);
        }
        Ok(self.build_from_objects(objects, resolver))
    }

    /// Build from already-listed objects.
    pub fn build_from_objects<I>(&self, objects: I, resolver: Option<&dyn ManifestResolver>) -> Catalog
    where
        I: IntoIterator<Item = StoreObject>,
    {
        let mut catalog = Catalog {
            layout: self.patterns.layout(),
            prefix: self.patterns.prefix().to_string(),
            ..Catalog::default()
        };
        let mut blobs = HashMap::new();

        for object in objects {
            if self.patterns.layout() == Layout::V2
                && self.patterns.classify_public_key(&object.key).is_some()
            {
                catalog.public_keys.push(object);
                continue;
            }
            if self.patterns.classify_blob(&object.key).is_some() {
                blobs.insert(object.key.clone(), object);
                continue;
            }
            let Some(matched) = self.patterns.classify(&object.key) else {
                continue;
            };
            if let Some(stack) = &matched.stack {
                if self.exclude.contains(stack) {
                    continue;
                }
            }
            let layout = self.patterns.layout();
            let spec = catalog.get_or_insert(matched.stack.as_deref(), &matched.hash);
            let slot = match (matched.kind, layout) {
                (MatchKind::Meta, Layout::V2) => &mut spec.meta,
                (MatchKind::Meta, Layout::V3) => &mut spec.manifest,
                (MatchKind::Archive, _) => &mut spec.archive,
            };
            if let Some(existing) = slot.as_ref() {
                debug!(
                    hash = %matched.hash,
                    kept = %existing.key,
                    ignored = %object.key,
                    "duplicate listing entry for spec"
                );
            } else {
                *slot = Some(object);
            }
        }

        if self.patterns.layout() == Layout::V3 {
            match resolver {
                Some(resolver) => self.resolve_manifests(&mut catalog, &blobs, resolver),
                None => debug!("no manifest resolver supplied; v3 specs stay unresolved"),
            }
        }

        debug!(
            layout = %catalog.layout,
            root = catalog.root.len(),
            stacks = catalog.stacks.len(),
            "catalog built"
        );
        catalog
    }

    fn resolve_manifests(
        &self,
        catalog: &mut Catalog,
        blobs: &HashMap<String, StoreObject>,
        resolver: &dyn ManifestResolver,
    ) {
        let patterns = &self.patterns;
        let mut specs = catalog.specs_mut();
        specs.par_iter_mut().for_each(|spec| {
            let Some(manifest) = spec.manifest.clone() else {
                return;
            };
            let resolved = match resolver.resolve(&manifest) {
                Ok(resolved) => resolved,
                Err(err) => {
                    warn!(key = %manifest.key, error = %err, "failed to resolve manifest");
                    return;
                }
            };
            let stack = (!spec.stack.is_empty()).then_some(spec.stack.as_str());
            let prefix = patterns.mirror_prefix(stack);
            let lookup = |media: MediaType| {
                resolved
                    .manifest
                    .blob(media)
                    .and_then(|record| blobs.get(&record.key(&prefix)))
                    .cloned()
            };
            spec.archive = lookup(MediaType::Archive);
            spec.meta = lookup(MediaType::Spec);
            spec.manifest_local_path = resolved.local_path;
            if !spec.is_complete() {
                debug!(
                    key = %manifest.key,
                    has_archive = spec.archive.is_some(),
                    has_spec = spec.meta.is_some(),
                    "manifest references blobs missing from the listing"
                );
            }
        });
    }
}
