use crate::Result;
use async_trait::async_trait;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreType {
    Local,
    S3,
}

/// One entry of a remote listing. Stores may return entries without a key;
/// callers skip those.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectEntry {
    pub key: Option<String>,
}

impl ObjectEntry {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: Some(key.into()),
        }
    }
}

/// A listing response. `contents` is `None` when the store answered without
/// the listing field at all, which is not the same as an empty listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectListing {
    pub contents: Option<Vec<ObjectEntry>>,
}

impl ObjectListing {
    pub fn from_keys<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            contents: Some(keys.into_iter().map(ObjectEntry::new).collect()),
        }
    }

    pub fn empty() -> Self {
        Self {
            contents: Some(Vec::new()),
        }
    }
}

/// The object store backups are uploaded to.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn list_objects(&self, bucket: &str, prefix: &str) -> Result<ObjectListing>;

    async fn upload_file(&self, bucket: &str, key: &str, local_path: &Path) -> Result<()>;

    fn store_type(&self) -> StoreType;

    /// Human-readable location of an object, used in log messages.
    fn describe(&self, bucket: &str, key: &str) -> String {
        format!("{}/{}", bucket, key)
    }
}
