#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use filetime::{set_file_mtime, FileTime};
use serde_json::Value;
use tempfile::TempDir;

pub struct Mirror {
    pub root: TempDir,
    pub cache: TempDir,
}

pub struct SpecFiles {
    pub hash: String,
    pub meta: PathBuf,
    pub archive: PathBuf,
}

pub fn hash(n: usize) -> String {
    format!("{n:0>32}")
}

impl Mirror {
    pub fn new() -> Self {
        Self {
            root: tempfile::Builder::new()
                .prefix("bckit-mirror")
                .tempdir()
                .expect("mirror dir"),
            cache: tempfile::tempdir().expect("cache dir"),
        }
    }

    pub fn url(&self) -> String {
        self.root.path().display().to_string()
    }

    /// Lay out a v2 spec (metadata plus archive) aged `days` days.
    pub fn add_spec(&self, stack: Option<&str>, name: &str, n: usize, days: u64) -> SpecFiles {
        let hash = hash(n);
        let base = match stack {
            Some(stack) => self.root.path().join(stack).join("build_cache"),
            None => self.root.path().join("build_cache"),
        };
        let stem = format!("linux-ubuntu22.04-x86_64-gcc-12.3.0-{name}-1.0-{hash}");
        let meta = base.join(format!("{stem}.spec.json.sig"));
        let archive = base
            .join("linux-ubuntu22.04-x86_64")
            .join("gcc-12.3.0")
            .join(format!("{name}-1.0"))
            .join(format!("{stem}.spack"));
        write_aged(&meta, b"-----BEGIN PGP SIGNED MESSAGE-----\n", days);
        write_aged(&archive, b"archive", days);
        SpecFiles {
            hash,
            meta,
            archive,
        }
    }

    pub fn cmd(&self) -> Command {
        let mut cmd = cargo_bin_cmd!("bckit");
        cmd.env("BCKIT_CACHE_DIR", self.cache.path())
            .env_remove("BCKIT_PUBLIC_KEY_URL")
            .env_remove("BCKIT_JOBS")
            .env("BCKIT_SPACK", self.cache.path().join("no-spack"))
            .env("BCKIT_GPG", self.cache.path().join("no-gpg"))
            .env("NO_COLOR", "1");
        cmd
    }
}

pub fn write_aged(path: &Path, data: &[u8], days: u64) {
    fs::create_dir_all(path.parent().expect("parent")).expect("create dirs");
    fs::write(path, data).expect("write");
    let when = SystemTime::now() - Duration::from_secs(days * 24 * 60 * 60);
    set_file_mtime(path, FileTime::from_system_time(when)).expect("mtime");
}

pub fn parse_json(output: &[u8]) -> Value {
    serde_json::from_slice(output).expect("json envelope")
}
