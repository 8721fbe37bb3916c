//! Mirror layout versions and the key patterns that recognise each one.

use std::fmt;
use std::str::FromStr;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Characters allowed in a spec hash.
const HASH: &str = "[a-z0-9]{32}";

/// Mirror layout generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Layout {
    /// Legacy per-hash files under `build_cache/`.
    #[default]
    V2,
    /// Content-addressable blobs indexed by signed per-spec manifests.
    V3,
}

impl Layout {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::V2 => "v2",
            Self::V3 => "v3",
        }
    }
}

impl fmt::Display for Layout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Layout {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "v2" | "2" => Ok(Self::V2),
            "v3" | "3" => Ok(Self::V3),
            other => Err(format!("unknown mirror layout '{other}' (expected v2 or v3)")),
        }
    }
}

/// What a matched listing line describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    /// Signed spec metadata (v2 `.spec.json.sig`) or the signed manifest (v3).
    Meta,
    /// Compressed build artifact (v2 `.spack`).
    Archive,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternMatch {
    pub kind: MatchKind,
    /// `None` for the root mirror.
    pub stack: Option<String>,
    pub hash: String,
}

/// Blob line recognised in a v3 listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobMatch {
    pub stack: Option<String>,
    pub algorithm: String,
    pub checksum: String,
}

/// The ordered pattern family for one layout, anchored at a mirror prefix.
///
/// Matching order is root-metadata, root-archive, stack-metadata, stack-archive;
/// the first pattern that matches classifies the line.
#[derive(Debug, Clone)]
pub struct LayoutPatterns {
    layout: Layout,
    prefix: String,
    root_meta: Regex,
    root_archive: Option<Regex>,
    stack_meta: Regex,
    stack_archive: Option<Regex>,
    blob: Regex,
    public_key: Regex,
}

impl LayoutPatterns {
    /// Build the pattern family for `layout` rooted at `prefix` (no trailing slash;
    /// empty for a bucket or directory root).
    pub fn new(layout: Layout, prefix: &str) -> Self {
        let prefix = prefix.trim_matches('/').to_string();
        let anchor = if prefix.is_empty() {
            "^".to_string()
        } else {
            format!("^{}/", regex::escape(&prefix))
        };
        let compile = |body: String| {
            Regex::new(&format!("{anchor}{body}")).expect("layout patterns are valid regexes")
        };
        let stack = "(?P<stack>[^/]+)/";
        let (root_meta, root_archive, stack_meta, stack_archive) = match layout {
            Layout::V2 => (
                compile(format!(r"build_cache/[^/]+-(?P<hash>{HASH})\.spec\.json\.sig$")),
                Some(compile(format!(
                    r"build_cache/(?:[^/]+/)*[^/]+-(?P<hash>{HASH})\.spack$"
                ))),
                compile(format!(
                    r"{stack}build_cache/[^/]+-(?P<hash>{HASH})\.spec\.json\.sig$"
                )),
                Some(compile(format!(
                    r"{stack}build_cache/(?:[^/]+/)*[^/]+-(?P<hash>{HASH})\.spack$"
                ))),
            ),
            Layout::V3 => (
                compile(format!(
                    r"v3/manifests/spec/(?:[^/]+/)*[^/]+-(?P<hash>{HASH})\.spec\.manifest\.json$"
                )),
                None,
                compile(format!(
                    r"{stack}v3/manifests/spec/(?:[^/]+/)*[^/]+-(?P<hash>{HASH})\.spec\.manifest\.json$"
                )),
                None,
            ),
        };
        Self {
            layout,
            blob: compile(format!(
                r"(?:{stack})?blobs/(?P<algo>[a-z0-9]+)/[0-9a-f]{{2}}/(?P<checksum>[0-9a-f]+)$"
            )),
            public_key: compile(r"build_cache/_pgp/(?P<fingerprint>[0-9A-Fa-f]+)\.pub$".into()),
            prefix,
            root_meta,
            root_archive,
            stack_meta,
            stack_archive,
        }
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Classify one key, first match wins.
    pub fn classify(&self, key: &str) -> Option<PatternMatch> {
        let root = |re: &Regex, kind| {
            re.captures(key).map(|caps| PatternMatch {
                kind,
                stack: None,
                hash: caps["hash"].to_string(),
            })
        };
        let stacked = |re: &Regex, kind| {
            re.captures(key).map(|caps| PatternMatch {
                kind,
                stack: Some(caps["stack"].to_string()),
                hash: caps["hash"].to_string(),
            })
        };
        root(&self.root_meta, MatchKind::Meta)
            .or_else(|| {
                self.root_archive
                    .as_ref()
                    .and_then(|re| root(re, MatchKind::Archive))
            })
            .or_else(|| stacked(&self.stack_meta, MatchKind::Meta))
            .or_else(|| {
                self.stack_archive
                    .as_ref()
                    .and_then(|re| stacked(re, MatchKind::Archive))
            })
    }

    /// Recognise a content-addressed blob key (v3 only).
    pub fn classify_blob(&self, key: &str) -> Option<BlobMatch> {
        if self.layout != Layout::V3 {
            return None;
        }
        self.blob.captures(key).map(|caps| BlobMatch {
            stack: caps.name("stack").map(|m| m.as_str().to_string()),
            algorithm: caps["algo"].to_string(),
            checksum: caps["checksum"].to_string(),
        })
    }

    /// Recognise a root-level v2 public key (`build_cache/_pgp/<fingerprint>.pub`).
    pub fn classify_public_key(&self, key: &str) -> Option<String> {
        self.public_key
            .captures(key)
            .map(|caps| caps["fingerprint"].to_string())
    }

    /// Key prefix for a stack (or the root when `stack` is `None`).
    pub fn mirror_prefix(&self, stack: Option<&str>) -> String {
        match (self.prefix.is_empty(), stack) {
            (true, None) => String::new(),
            (true, Some(stack)) => stack.to_string(),
            (false, None) => self.prefix.clone(),
            (false, Some(stack)) => format!("{}/{stack}", self.prefix),
        }
    }
}

/// Join a mirror prefix and a relative key.
pub fn join_key(prefix: &str, rest: &str) -> String {
    let prefix = prefix.trim_end_matches('/');
    let rest = rest.trim_start_matches('/');
    if prefix.is_empty() {
        rest.to_string()
    } else {
        format!("{prefix}/{rest}")
    }
}
