pub mod archive;
pub mod check;
pub mod config;
pub mod error;
pub mod expand;
pub mod fingerprint;
pub mod ignore_rules;
pub mod listing;
pub mod runner;
pub mod store;
pub mod upload;

#[cfg(test)]
mod testing;

pub use config::{read_config, BackupOptions, BackupSpec, RawDocument};
pub use error::{Error, Result};
pub use expand::VarScope;
pub use fingerprint::Fingerprint;
pub use ignore_rules::IgnoreRules;
pub use listing::FileListing;
pub use runner::{BackupRunner, JobFailure, JobOutcome, JobState, RunSummary};
pub use store::{ObjectEntry, ObjectListing, RemoteStore, StoreType};
