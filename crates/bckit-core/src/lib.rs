#![deny(clippy::all)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::must_use_candidate,
    clippy::module_name_repetitions
)]

pub mod commands;
mod config;
mod context;
mod engine;
mod indexer;
mod keyring;
mod manifests;
pub mod migrate;
mod outcome;
pub mod prune;
pub mod publish;
mod reports;
pub mod validate;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{Config, EnvSnapshot, GlobalOptions};
pub use context::CommandContext;
pub use engine::{Engine, EngineSettings};
pub use indexer::{IndexRebuild, IndexRebuilder, SpackIndexRebuilder};
pub use keyring::{GpgKeyring, Keyring, SignatureError};
pub use manifests::ManifestCache;
pub use outcome::{
    format_status_message, to_json_response, CommandGroup, CommandInfo, CommandStatus,
    ExecutionOutcome,
};
