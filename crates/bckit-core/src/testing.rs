//! Fakes and fixtures shared by the unit tests.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use bckit_domain::{assemble_clearsigned, parse_clearsigned, sha256_hex};
use bckit_store::{FsStore, MirrorUrl, Store};
use bytes::Bytes;
use filetime::{set_file_mtime, FileTime};
use serde_json::json;
use tempfile::TempDir;
use time::OffsetDateTime;

use crate::engine::{Engine, EngineSettings};
use crate::indexer::IndexRebuilder;
use crate::keyring::{Keyring, SignatureError};

/// Signs by embedding the SHA-256 of the payload as the signature body.
#[derive(Debug, Default)]
pub(crate) struct FakeKeyring {
    trusted: AtomicBool,
    pub(crate) imported: Mutex<Vec<PathBuf>>,
}

impl FakeKeyring {
    pub(crate) fn trusting() -> Self {
        let keyring = Self::default();
        keyring.trusted.store(true, Ordering::SeqCst);
        keyring
    }

    pub(crate) fn sign(payload: &str) -> String {
        assemble_clearsigned("SHA256", payload, &Self::signature(payload))
    }

    fn signature(payload: &str) -> String {
        format!(
            "-----BEGIN PGP SIGNATURE-----\n\n{}\n-----END PGP SIGNATURE-----",
            sha256_hex(payload.trim_end().as_bytes())
        )
    }
}

impl Keyring for FakeKeyring {
    fn import_key(&self, path: &Path) -> Result<(), SignatureError> {
        std::fs::metadata(path)?;
        self.imported
            .lock()
            .expect("keyring lock")
            .push(path.to_path_buf());
        self.trusted.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn verify(&self, signed: &str) -> Result<String, SignatureError> {
        let document = parse_clearsigned(signed)?;
        if !self.trusted.load(Ordering::SeqCst) {
            return Err(SignatureError::Invalid("no trusted key".into()));
        }
        let expected = sha256_hex(document.payload.trim_end().as_bytes());
        if !document.signature.contains(&expected) {
            return Err(SignatureError::Invalid("BAD signature".into()));
        }
        Ok(document.payload)
    }

    fn clearsign(&self, payload: &str) -> Result<String, SignatureError> {
        Ok(Self::sign(payload))
    }
}

#[derive(Debug, Default)]
pub(crate) struct RecordingIndexer {
    pub(crate) calls: Mutex<Vec<String>>,
}

impl RecordingIndexer {
    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("indexer lock").clone()
    }
}

impl IndexRebuilder for RecordingIndexer {
    fn rebuild(&self, mirror_url: &str) -> Result<()> {
        self.calls
            .lock()
            .expect("indexer lock")
            .push(mirror_url.to_string());
        Ok(())
    }
}

/// A v2 spec laid out in a fixture mirror.
#[derive(Debug, Clone)]
pub(crate) struct FixtureSpec {
    pub(crate) hash: String,
    pub(crate) meta_key: String,
    pub(crate) archive_key: String,
    pub(crate) archive: Vec<u8>,
}

/// A directory mirror with a fake keyring and index rebuilder.
pub(crate) struct MirrorFixture {
    pub(crate) mirror: TempDir,
    pub(crate) cache: TempDir,
    pub(crate) store: Arc<FsStore>,
    pub(crate) keyring: Arc<FakeKeyring>,
    pub(crate) indexer: Arc<RecordingIndexer>,
}

pub(crate) fn hash(n: usize) -> String {
    format!("{n:0>32}")
}

pub(crate) fn days_ago(now: OffsetDateTime, days: i64) -> OffsetDateTime {
    now - time::Duration::days(days)
}

impl MirrorFixture {
    pub(crate) fn new() -> Self {
        let mirror = tempfile::tempdir().expect("mirror dir");
        let cache = tempfile::tempdir().expect("cache dir");
        let store = Arc::new(FsStore::new(mirror.path()));
        Self {
            mirror,
            cache,
            store,
            keyring: Arc::new(FakeKeyring::trusting()),
            indexer: Arc::new(RecordingIndexer::default()),
        }
    }

    pub(crate) fn untrusted(mut self) -> Self {
        self.keyring = Arc::new(FakeKeyring::default());
        self
    }

    pub(crate) fn root(&self) -> &Path {
        self.mirror.path()
    }

    pub(crate) fn put(&self, key: &str, data: &[u8], modified: OffsetDateTime) {
        self.store
            .put(key, Bytes::copy_from_slice(data))
            .expect("fixture put");
        self.touch(key, modified);
    }

    pub(crate) fn touch(&self, key: &str, modified: OffsetDateTime) {
        set_file_mtime(
            self.root().join(key),
            FileTime::from_unix_time(modified.unix_timestamp(), 0),
        )
        .expect("fixture mtime");
    }

    pub(crate) fn exists(&self, key: &str) -> bool {
        self.root().join(key).is_file()
    }

    pub(crate) fn read(&self, key: &str) -> String {
        std::fs::read_to_string(self.root().join(key)).expect("fixture read")
    }

    /// Lay out a signed v2 spec (metadata plus archive) under `stack` (or the root).
    pub(crate) fn add_v2_spec(
        &self,
        stack: Option<&str>,
        name: &str,
        hash: &str,
        modified: OffsetDateTime,
    ) -> FixtureSpec {
        let base = stack.map_or(String::new(), |stack| format!("{stack}/"));
        let stem = format!("linux-ubuntu22.04-x86_64-gcc-12.3.0-{name}-1.0-{hash}");
        let archive = format!("archive of {name} {hash}").into_bytes();
        let payload = spec_payload(name, "1.0", hash, &archive);
        let meta_key = format!("{base}build_cache/{stem}.spec.json.sig");
        let archive_key =
            format!("{base}build_cache/linux-ubuntu22.04-x86_64/gcc-12.3.0/{name}-1.0/{stem}.spack");
        self.put(&meta_key, FakeKeyring::sign(&payload).as_bytes(), modified);
        self.put(&archive_key, &archive, modified);
        FixtureSpec {
            hash: hash.to_string(),
            meta_key,
            archive_key,
            archive,
        }
    }

    /// Write a v2 `index.json` registering `hashes`.
    pub(crate) fn write_index(
        &self,
        stack: Option<&str>,
        entries: &[(&str, bool)],
        modified: OffsetDateTime,
    ) {
        let installs: serde_json::Map<String, serde_json::Value> = entries
            .iter()
            .map(|(hash, in_buildcache)| {
                (
                    (*hash).to_string(),
                    json!({"spec": {"name": "pkg", "hash": hash}, "in_buildcache": in_buildcache}),
                )
            })
            .collect();
        let document = json!({"database": {"version": "7", "installs": installs}});
        let base = stack.map_or(String::new(), |stack| format!("{stack}/"));
        self.put(
            &format!("{base}build_cache/index.json"),
            document.to_string().as_bytes(),
            modified,
        );
    }

    pub(crate) fn write_key(&self, fingerprint: &str) -> PathBuf {
        let path = self.cache.path().join(format!("{fingerprint}.pub"));
        std::fs::write(&path, format!("PUBLIC KEY {fingerprint}")).expect("key");
        path
    }

    pub(crate) fn engine(&self) -> Engine {
        self.engine_over(self.root(), self.store.clone())
    }

    /// Engine treating one stack directory as a mirror of its own.
    pub(crate) fn stack_engine(&self, stack: &str) -> Engine {
        let root = self.root().join(stack);
        let store = Arc::new(FsStore::new(&root));
        self.engine_over(&root, store)
    }

    fn engine_over(&self, root: &Path, store: Arc<FsStore>) -> Engine {
        let settings = EngineSettings {
            mirror: MirrorUrl::parse(&root.display().to_string()).expect("mirror url"),
            cache_dir: self.cache.path().to_path_buf(),
            jobs: 4,
        };
        Engine::new(settings, store, self.keyring.clone(), self.indexer.clone()).expect("engine")
    }
}

/// Spec-file payload (unsigned) for a single-node spec.
pub(crate) fn spec_payload(name: &str, version: &str, hash: &str, archive: &[u8]) -> String {
    let document = json!({
        "spec": {
            "_meta": {"version": 5},
            "nodes": [{"name": name, "version": version, "hash": hash}]
        },
        "buildcache_layout_version": 2,
        "binary_cache_checksum": {"hash_algorithm": "sha256", "hash": sha256_hex(archive)}
    });
    serde_json::to_string_pretty(&document).expect("spec json")
}
