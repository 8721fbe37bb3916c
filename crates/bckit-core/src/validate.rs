//! Cross-checking a mirror index against what the mirror actually holds.

use std::collections::BTreeSet;

use bckit_domain::{MirrorIndex, SpecMap};
use serde::Serialize;
use tracing::warn;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IndexCheck {
    /// Registered as present but without a complete spec in the mirror.
    pub missing_from_mirror: BTreeSet<String>,
    /// Complete in the mirror but not registered.
    pub missing_from_index: BTreeSet<String>,
}

impl IndexCheck {
    pub fn is_consistent(&self) -> bool {
        self.missing_from_mirror.is_empty() && self.missing_from_index.is_empty()
    }
}

pub fn check_index(specs: &SpecMap, index: &MirrorIndex) -> IndexCheck {
    let complete: BTreeSet<&str> = specs
        .values()
        .filter(|spec| spec.is_complete())
        .map(|spec| spec.hash.as_str())
        .collect();
    let registered = index.registered();

    let check = IndexCheck {
        missing_from_mirror: registered
            .iter()
            .filter(|hash| !complete.contains(hash.as_str()))
            .cloned()
            .collect(),
        missing_from_index: complete
            .iter()
            .filter(|hash| !registered.contains(**hash))
            .map(|hash| (*hash).to_string())
            .collect(),
    };
    if !check.is_consistent() {
        warn!(
            missing_from_mirror = check.missing_from_mirror.len(),
            missing_from_index = check.missing_from_index.len(),
            "mirror index is out of date"
        );
    }
    check
}
