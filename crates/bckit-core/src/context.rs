use std::sync::Arc;

use anyhow::Result;
use bckit_store::MirrorUrl;
use serde_json::json;
use time::OffsetDateTime;
use tracing::debug;

use crate::config::{Config, GlobalOptions};
use crate::engine::{Engine, EngineSettings};
use crate::indexer::{IndexRebuilder, SpackIndexRebuilder};
use crate::keyring::{GpgKeyring, Keyring};
use crate::outcome::ExecutionOutcome;

/// Per-invocation state handed to every command handler.
pub struct CommandContext<'a> {
    pub global: &'a GlobalOptions,
    config: Config,
    keyring: Arc<dyn Keyring>,
    indexer: Arc<dyn IndexRebuilder>,
    now: Option<OffsetDateTime>,
}

impl<'a> CommandContext<'a> {
    /// Creates a context from the process environment, with gpg and spack as collaborators.
    ///
    /// # Errors
    /// Returns an error if the configuration cannot be derived from the environment.
    pub fn new(global: &'a GlobalOptions) -> Result<Self> {
        let config = Config::from_env()?.with_globals(global);
        let keyring = Arc::new(GpgKeyring::new(
            config.gpg.clone(),
            config.gnupg_home.clone(),
            config.signing_key.clone(),
        ));
        let indexer = Arc::new(SpackIndexRebuilder::new(config.spack.clone()));
        Ok(Self::with_collaborators(global, config, keyring, indexer))
    }

    pub fn with_collaborators(
        global: &'a GlobalOptions,
        config: Config,
        keyring: Arc<dyn Keyring>,
        indexer: Arc<dyn IndexRebuilder>,
    ) -> Self {
        Self {
            global,
            config,
            keyring,
            indexer,
            now: None,
        }
    }

    #[must_use]
    pub fn with_now(mut self, now: OffsetDateTime) -> Self {
        self.now = Some(now);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Open the mirror and build an engine for it. Problems with the mirror
    /// itself come back as a user-facing outcome.
    pub fn engine(&self, mirror: &str) -> Result<Engine, ExecutionOutcome> {
        let url = MirrorUrl::parse(mirror).map_err(|err| {
            ExecutionOutcome::user_error(
                err.to_string(),
                json!({
                    "mirror": mirror,
                    "reason": "invalid_mirror",
                    "hint": "use s3://<bucket>/<prefix>, file:///path, or a directory path",
                }),
            )
        })?;
        let store = url.open(&self.config.s3).map_err(|err| {
            ExecutionOutcome::user_error(
                format!("unable to open mirror {url}: {err}"),
                json!({
                    "mirror": url.as_str(),
                    "reason": "mirror_unavailable",
                    "hint": "check that the mirror exists and credentials are configured",
                }),
            )
        })?;
        debug!(mirror = %url, store = store.id(), jobs = self.config.jobs, "opened mirror");
        let settings = EngineSettings {
            mirror: url,
            cache_dir: self.config.cache_dir.clone(),
            jobs: self.config.jobs,
        };
        let engine = Engine::new(settings, store, self.keyring.clone(), self.indexer.clone())
            .map_err(|err| {
                ExecutionOutcome::failure(format!("{err:#}"), json!({ "mirror": mirror }))
            })?;
        Ok(match self.now {
            Some(now) => engine.with_now(now),
            None => engine,
        })
    }
}
