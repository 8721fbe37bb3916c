//! Small-file downloads (trusted public keys) with bounded retries.

use std::fs;
use std::io::{Read, Write};
use std::path::Path;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use reqwest::blocking::Client;
use tempfile::NamedTempFile;
use tracing::{debug, warn};
use url::Url;

const USER_AGENT: &str = concat!("bckit-store/", env!("CARGO_PKG_VERSION"));
pub const DOWNLOAD_ATTEMPTS: usize = 3;
const HTTP_TIMEOUT: Duration = Duration::from_secs(60);

/// Download `source` (http(s), `file://`, or a local path) to `dest`.
///
/// Returns `false` without touching the network when `dest` already exists and
/// `force` is not set.
pub fn fetch_to_path(source: &str, dest: &Path, force: bool) -> Result<bool> {
    if dest.exists() && !force {
        debug!(dest = %dest.display(), "download already present");
        return Ok(false);
    }
    let parent = dest.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)
        .with_context(|| format!("failed to create {}", parent.display()))?;

    let mut last_err = None;
    for attempt in 1..=DOWNLOAD_ATTEMPTS {
        match fetch_once(source, parent) {
            Ok(tmp) => {
                tmp.persist(dest)
                    .map_err(|err| anyhow!("unable to persist {}: {err}", dest.display()))?;
                return Ok(true);
            }
            Err(err) => {
                warn!(source, attempt, error = %err, "download attempt failed");
                last_err = Some(err);
            }
        }
    }
    Err(last_err.unwrap_or_else(|| anyhow!("failed to download {source}; no attempts left")))
}

fn fetch_once(source: &str, dir: &Path) -> Result<NamedTempFile> {
    let mut tmp = NamedTempFile::new_in(dir)?;
    if let Some(local) = local_path(source) {
        let bytes =
            fs::read(&local).with_context(|| format!("failed to read {}", local.display()))?;
        tmp.write_all(&bytes)?;
        return Ok(tmp);
    }

    let client = http_client()?;
    let mut response = client
        .get(source)
        .send()
        .with_context(|| format!("failed to fetch {source}"))?
        .error_for_status()
        .with_context(|| format!("unexpected response for {source}"))?;
    let mut buffer = [0u8; 64 * 1024];
    loop {
        let read = response
            .read(&mut buffer)
            .with_context(|| format!("stream error for {source}"))?;
        if read == 0 {
            break;
        }
        tmp.write_all(&buffer[..read])?;
    }
    Ok(tmp)
}

fn local_path(source: &str) -> Option<std::path::PathBuf> {
    if !source.contains("://") {
        return Some(source.into());
    }
    Url::parse(source)
        .ok()
        .filter(|url| url.scheme() == "file")
        .and_then(|url| url.to_file_path().ok())
}

fn http_client() -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(HTTP_TIMEOUT)
        .build()
        .context("failed to build http client")
}
