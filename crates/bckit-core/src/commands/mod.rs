//! Command handlers: one request type and one entry point per CLI command.

mod catalog;
mod index;
mod keepset;
mod migrate;
mod prune;
mod publish;

pub use catalog::{catalog_summary, CatalogRequest};
pub use index::{index_check, IndexCheckRequest};
pub use keepset::{keep_set, KeepSetRequest};
pub use migrate::{migrate_layout, MigrateRequest};
pub use prune::{prune_mirror, PruneRequest};
pub use publish::{publish_stacks, PublishRequest};

use bckit_store::StoreError;
use serde_json::json;

use crate::indexer::IndexRebuild;
use crate::outcome::ExecutionOutcome;

/// Maps a missing index to a user error; anything else is left to the caller.
fn index_missing(err: &anyhow::Error, mirror: &str) -> Option<ExecutionOutcome> {
    let store_err = err.downcast_ref::<StoreError>()?;
    if !matches!(store_err, StoreError::IndexNotFound { .. }) {
        return None;
    }
    Some(ExecutionOutcome::user_error(
        format!("{mirror} has no build-cache index"),
        json!({
            "mirror": mirror,
            "reason": "index_missing",
            "hint": "run `spack buildcache update-index` on the mirror first",
        }),
    ))
}

fn index_status(index: &IndexRebuild) -> serde_json::Value {
    serde_json::to_value(index).unwrap_or_default()
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use crate::config::{Config, EnvSnapshot, GlobalOptions};
    use crate::context::CommandContext;
    use crate::indexer::IndexRebuilder;
    use crate::keyring::Keyring;
    use crate::testing::MirrorFixture;

    pub(crate) fn context<'a>(
        global: &'a GlobalOptions,
        fixture: &MirrorFixture,
    ) -> CommandContext<'a> {
        let cache = fixture.cache.path().display().to_string();
        let config = Config::from_snapshot(&EnvSnapshot::testing(&[
            ("BCKIT_CACHE_DIR", cache.as_str()),
            ("BCKIT_JOBS", "2"),
        ]))
        .expect("config");
        CommandContext::with_collaborators(
            global,
            config,
            Arc::clone(&fixture.keyring) as Arc<dyn Keyring>,
            Arc::clone(&fixture.indexer) as Arc<dyn IndexRebuilder>,
        )
    }
}
