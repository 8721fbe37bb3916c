//! The explicit run context shared by every operation.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use bckit_domain::{Catalog, CatalogBuilder, Layout, ManifestResolver};
use bckit_store::{get_index, IndexDocument, ListingCache, MirrorUrl, Store, WorkerPool};
use time::OffsetDateTime;
use tracing::info;

use crate::indexer::IndexRebuilder;
use crate::keyring::Keyring;
use crate::manifests::ManifestCache;

/// Everything an [`Engine`] needs besides its collaborators.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub mirror: MirrorUrl,
    pub cache_dir: PathBuf,
    pub jobs: usize,
}

pub struct Engine {
    store: Arc<dyn Store>,
    mirror: MirrorUrl,
    listings: ListingCache,
    manifest_dir: PathBuf,
    pool: WorkerPool,
    keyring: Arc<dyn Keyring>,
    indexer: Arc<dyn IndexRebuilder>,
    now: OffsetDateTime,
}

impl Engine {
    pub fn new(
        settings: EngineSettings,
        store: Arc<dyn Store>,
        keyring: Arc<dyn Keyring>,
        indexer: Arc<dyn IndexRebuilder>,
    ) -> Result<Self> {
        let pool = WorkerPool::new(settings.jobs).context("failed to start worker pool")?;
        Ok(Self {
            store,
            listings: ListingCache::new(settings.cache_dir.join("listings")),
            manifest_dir: settings.cache_dir.join("manifests"),
            mirror: settings.mirror,
            pool,
            keyring,
            indexer,
            now: OffsetDateTime::now_utc(),
        })
    }

    /// Pin the clock (cutoffs are computed from it).
    #[must_use]
    pub fn with_now(mut self, now: OffsetDateTime) -> Self {
        self.now = now;
        self
    }

    pub fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }

    pub fn mirror(&self) -> &MirrorUrl {
        &self.mirror
    }

    pub fn prefix(&self) -> &str {
        self.mirror.prefix()
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    pub fn jobs(&self) -> usize {
        self.pool.jobs()
    }

    pub fn keyring(&self) -> &dyn Keyring {
        self.keyring.as_ref()
    }

    pub fn indexer(&self) -> &dyn IndexRebuilder {
        self.indexer.as_ref()
    }

    pub fn now(&self) -> OffsetDateTime {
        self.now
    }

    pub fn manifest_dir(&self) -> &Path {
        &self.manifest_dir
    }

    /// Cached listing of the whole mirror.
    pub fn listing(&self, force: bool) -> Result<PathBuf> {
        self.listings
            .listing(self.store(), self.prefix(), force)
            .with_context(|| format!("failed to list {}", self.mirror))
    }

    pub fn invalidate_listing(&self) -> Result<bool> {
        self.listings
            .invalidate(self.store(), self.prefix())
            .with_context(|| format!("failed to invalidate the listing of {}", self.mirror))
    }

    /// Build the catalog of the mirror; v3 manifests are resolved on the worker pool.
    pub fn catalog(&self, layout: Layout, exclude: &[String], force: bool) -> Result<Catalog> {
        let listing = self.listing(force)?;
        self.catalog_from_listing(&listing, layout, exclude, true)
    }

    /// Build a catalog from an existing listing; `resolve` controls v3 manifest downloads.
    pub fn catalog_from_listing(
        &self,
        listing: &Path,
        layout: Layout,
        exclude: &[String],
        resolve: bool,
    ) -> Result<Catalog> {
        let builder = CatalogBuilder::new(layout, self.prefix(), self.store().id())
            .exclude(exclude.iter().cloned());
        let resolver = ManifestCache::new(self.store(), &self.manifest_dir);
        let resolver: Option<&dyn ManifestResolver> =
            (resolve && layout == Layout::V3).then_some(&resolver as &dyn ManifestResolver);
        let catalog = self
            .pool
            .install(|| builder.build_from_path(listing, resolver))
            .with_context(|| format!("failed to build catalog for {}", self.mirror))?;
        info!(
            mirror = %self.mirror,
            layout = %layout,
            root = catalog.root().len(),
            stacks = catalog.stack_names().len(),
            "catalog ready"
        );
        Ok(catalog)
    }

    pub fn index(&self, layout: Layout) -> Result<IndexDocument> {
        Ok(get_index(self.store(), self.prefix(), layout)?)
    }
}
