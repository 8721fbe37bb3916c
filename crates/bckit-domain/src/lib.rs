#![deny(clippy::all)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::must_use_candidate
)]

pub mod catalog;
pub mod clearsign;
pub mod index;
pub mod keepset;
pub mod layout;
pub mod manifest;
pub mod object;
pub mod spec;
pub mod specfile;

pub use catalog::{
    complete_count, Catalog, CatalogBuilder, CatalogError, ManifestResolver, ResolvedManifest,
    SpecMap,
};
pub use clearsign::{
    assemble_clearsigned, extract_signed_payload, parse_clearsigned, payload_or_plain,
    ClearsignError, Clearsigned,
};
pub use index::{IndexEntry, MirrorIndex};
pub use keepset::{collect_lockfile_hashes, KeepSet};
pub use layout::{join_key, BlobMatch, Layout, LayoutPatterns, MatchKind, PatternMatch};
pub use manifest::{
    blob_key, index_manifest_key, key_manifest_key, sha256_hex, spec_manifest_key, BlobRecord, Manifest,
    MediaType, ARCHIVE_MEDIA_TYPE, INDEX_MEDIA_TYPE, KEY_MEDIA_TYPE, SPEC_MEDIA_TYPE,
};
pub use object::{format_listing_line, parse_listing_line, ListingError, StoreObject};
pub use spec::{BuiltSpec, ObjectRole};
pub use specfile::{ArchiveChecksum, SpecDocument, SpecDocumentError, SpecNode};
