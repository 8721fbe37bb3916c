use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::thread;

use anyhow::{anyhow, Context, Result};
use bckit_store::{S3Options, DEFAULT_MULTIPART_THRESHOLD};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlobalOptions {
    pub quiet: bool,
    pub verbose: u8,
    pub trace: bool,
    pub json: bool,
    pub jobs: Option<usize>,
    pub cache_dir: Option<PathBuf>,
}

/// Process environment captured once per command.
#[derive(Debug, Clone)]
pub struct EnvSnapshot {
    vars: HashMap<String, String>,
}

impl EnvSnapshot {
    pub fn capture() -> Self {
        Self {
            vars: env::vars().collect(),
        }
    }

    pub fn var(&self, key: &str) -> Option<&str> {
        self.vars
            .get(key)
            .map(String::as_str)
            .filter(|value| !value.trim().is_empty())
    }

    pub fn testing(pairs: &[(&str, &str)]) -> Self {
        let vars = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Self { vars }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub cache_dir: PathBuf,
    pub jobs: usize,
    pub gpg: Option<PathBuf>,
    pub gnupg_home: Option<PathBuf>,
    pub signing_key: Option<String>,
    pub spack: Option<PathBuf>,
    pub public_key_url: Option<String>,
    pub s3: S3Options,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_snapshot(&EnvSnapshot::capture())
    }

    pub fn from_snapshot(snapshot: &EnvSnapshot) -> Result<Self> {
        let cache_dir = match snapshot.var("BCKIT_CACHE_DIR") {
            Some(path) => PathBuf::from(path),
            None => dirs_next::cache_dir()
                .map(|base| base.join("bckit"))
                .ok_or_else(|| anyhow!("unable to determine a cache directory; set BCKIT_CACHE_DIR"))?,
        };
        let jobs = match snapshot.var("BCKIT_JOBS") {
            Some(raw) => parse_jobs(raw).context("invalid BCKIT_JOBS")?,
            None => default_jobs(),
        };
        let multipart_threshold = match snapshot.var("BCKIT_MULTIPART_THRESHOLD") {
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .with_context(|| format!("invalid BCKIT_MULTIPART_THRESHOLD '{raw}'"))?,
            None => DEFAULT_MULTIPART_THRESHOLD,
        };
        Ok(Self {
            cache_dir,
            jobs,
            gpg: snapshot.var("BCKIT_GPG").map(PathBuf::from),
            gnupg_home: snapshot.var("GNUPGHOME").map(PathBuf::from),
            signing_key: snapshot.var("BCKIT_SIGNING_KEY").map(ToOwned::to_owned),
            spack: snapshot.var("BCKIT_SPACK").map(PathBuf::from),
            public_key_url: snapshot.var("BCKIT_PUBLIC_KEY_URL").map(ToOwned::to_owned),
            s3: S3Options {
                endpoint: snapshot.var("BCKIT_S3_ENDPOINT").map(ToOwned::to_owned),
                region: snapshot.var("BCKIT_S3_REGION").map(ToOwned::to_owned),
                multipart_threshold,
                ..S3Options::default()
            },
        })
    }

    /// Apply command-line overrides.
    #[must_use]
    pub fn with_globals(mut self, global: &GlobalOptions) -> Self {
        if let Some(jobs) = global.jobs {
            self.jobs = jobs.max(1);
        }
        if let Some(dir) = &global.cache_dir {
            self.cache_dir.clone_from(dir);
        }
        self
    }

    pub fn listing_dir(&self) -> PathBuf {
        self.cache_dir.join("listings")
    }

    pub fn manifest_dir(&self) -> PathBuf {
        self.cache_dir.join("manifests")
    }
}

fn parse_jobs(raw: &str) -> Result<usize> {
    let jobs: usize = raw.trim().parse()?;
    if jobs == 0 {
        return Err(anyhow!("job count must be at least 1"));
    }
    Ok(jobs)
}

fn default_jobs() -> usize {
    thread::available_parallelism().map_or(4, std::num::NonZeroUsize::get)
}
