//! Run documents written next to a pruning run.

use std::collections::BTreeSet;
use std::fs;
use std::io::Write;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use bckit_domain::KeepSet;
use serde::Serialize;
use tempfile::NamedTempFile;

pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.persist(path)
        .map_err(|err| anyhow!("unable to persist {}: {err}", path.display()))?;
    Ok(())
}

pub(crate) fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut bytes = serde_json::to_vec_pretty(value)?;
    bytes.push(b'\n');
    write_atomic(path, &bytes)
}

/// Write `value` unless `path` already exists. Returns whether it was written.
pub(crate) fn write_json_once<T: Serialize>(path: &Path, value: &T) -> Result<bool> {
    if path.exists() {
        return Ok(false);
    }
    write_json(path, value)?;
    Ok(true)
}

pub(crate) fn write_lines<I, S>(path: &Path, lines: I) -> Result<()>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut contents = String::new();
    for line in lines {
        contents.push_str(line.as_ref());
        contents.push('\n');
    }
    write_atomic(path, contents.as_bytes())
}

/// Read a hash list: a JSON array as written by a previous run, or one hash per line.
pub(crate) fn read_hash_list(path: &Path) -> Result<BTreeSet<String>> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read hash list {}", path.display()))?;
    if contents.trim_start().starts_with('[') {
        let hashes: Vec<String> = serde_json::from_str(&contents)
            .with_context(|| format!("hash list {} is not a JSON array", path.display()))?;
        return Ok(hashes.into_iter().collect());
    }
    Ok(KeepSet::parse(&contents).iter().map(str::to_string).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_lists_accept_json_and_plain_text() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let json_path = dir.path().join("hashes.json");
        write_json(&json_path, &vec!["b", "a"])?;
        assert_eq!(
            read_hash_list(&json_path)?,
            BTreeSet::from(["a".to_string(), "b".to_string()])
        );

        let text_path = dir.path().join("hashes.txt");
        write_lines(&text_path, ["c", "# note", "", "d"])?;
        assert_eq!(read_hash_list(&text_path)?.len(), 2);
        Ok(())
    }

    #[test]
    fn json_once_keeps_the_first_document() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("nested/config.json");
        assert!(write_json_once(&path, &serde_json::json!({"run": 1}))?);
        assert!(!write_json_once(&path, &serde_json::json!({"run": 2}))?);
        assert!(fs::read_to_string(&path)?.contains("\"run\": 1"));
        Ok(())
    }
}
