//! Object-store access for build-cache mirrors.

#![deny(clippy::all)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::must_use_candidate
)]

mod delete;
mod download;
mod error;
mod fs;
mod index;
mod listing;
mod mirror;
mod pool;
mod s3;
mod store;

pub use delete::{delete_objects, DeleteFailure, DeleteReport};
pub use download::{fetch_to_path, DOWNLOAD_ATTEMPTS};
pub use error::{MirrorUrlError, StoreError, StoreResult};
pub use fs::FsStore;
pub use index::{get_index, IndexDocument};
pub use listing::{listing_url, ListingCache};
pub use mirror::{MirrorLocation, MirrorUrl};
pub use pool::WorkerPool;
pub use s3::{S3Options, S3Store, DEFAULT_MULTIPART_THRESHOLD};
pub use store::{ObjectIter, Store};
