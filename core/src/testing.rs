//! In-memory store for tests.

use crate::store::{ObjectListing, RemoteStore, StoreType};
use crate::{Error, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    List { bucket: String, prefix: String },
    Upload { bucket: String, key: String, path: PathBuf },
}

/// Answers listings from a canned response and records every call.
#[derive(Debug, Default)]
pub struct MemoryStore {
    pub listing: Mutex<Option<ObjectListing>>,
    pub fail_uploads: bool,
    pub fail_listings: bool,
    pub calls: Mutex<Vec<Call>>,
    /// Bytes of each uploaded file, captured at upload time.
    pub uploaded: Mutex<Vec<(String, Vec<u8>)>>,
}

impl MemoryStore {
    pub fn with_keys(keys: &[&str]) -> Self {
        Self {
            listing: Mutex::new(Some(ObjectListing::from_keys(keys.iter().copied()))),
            ..Default::default()
        }
    }

    pub fn with_listing(listing: ObjectListing) -> Self {
        Self {
            listing: Mutex::new(Some(listing)),
            ..Default::default()
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn upload_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::Upload { .. }))
            .count()
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn list_objects(&self, bucket: &str, prefix: &str) -> Result<ObjectListing> {
        self.calls.lock().unwrap().push(Call::List {
            bucket: bucket.to_string(),
            prefix: prefix.to_string(),
        });
        if self.fail_listings {
            return Err(Error::remote("listing refused"));
        }
        Ok(self
            .listing
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(ObjectListing::empty))
    }

    async fn upload_file(&self, bucket: &str, key: &str, local_path: &Path) -> Result<()> {
        self.calls.lock().unwrap().push(Call::Upload {
            bucket: bucket.to_string(),
            key: key.to_string(),
            path: local_path.to_path_buf(),
        });
        if self.fail_uploads {
            return Err(Error::remote("upload refused"));
        }
        let bytes = std::fs::read(local_path)?;
        self.uploaded.lock().unwrap().push((key.to_string(), bytes));
        Ok(())
    }

    fn store_type(&self) -> StoreType {
        StoreType::Local
    }
}
