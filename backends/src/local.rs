use async_trait::async_trait;
use stashbox_core::store::{ObjectEntry, ObjectListing, RemoteStore, StoreType};
use stashbox_core::{Error, Result};
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// A store on the local filesystem: each bucket is a directory under
/// `base_path` and each key a file path inside it.
pub struct LocalStore {
    base_path: PathBuf,
}

impl LocalStore {
    pub fn new<P: AsRef<Path>>(base_path: P) -> Self {
        Self {
            base_path: base_path.as_ref().to_path_buf(),
        }
    }

    fn bucket_path(&self, bucket: &str) -> Result<PathBuf> {
        check_relative(bucket)?;
        Ok(self.base_path.join(bucket))
    }

    fn full_path(&self, bucket: &str, key: &str) -> Result<PathBuf> {
        check_relative(key)?;
        Ok(self.bucket_path(bucket)?.join(key))
    }
}

/// Rejects names that would escape the store directory.
fn check_relative(name: &str) -> Result<()> {
    let path = Path::new(name);
    let escapes = name.is_empty()
        || path
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
    if escapes {
        return Err(Error::remote(format!("invalid object name {:?}", name)));
    }
    Ok(())
}

#[async_trait]
impl RemoteStore for LocalStore {
    async fn list_objects(&self, bucket: &str, prefix: &str) -> Result<ObjectListing> {
        let bucket_path = self.bucket_path(bucket)?;
        if !bucket_path.is_dir() {
            debug!("Bucket directory {} does not exist yet", bucket_path.display());
            return Ok(ObjectListing::empty());
        }

        let mut entries = Vec::new();
        let mut pending = vec![(bucket_path, String::new())];
        while let Some((dir, key_prefix)) = pending.pop() {
            let mut read_dir = fs::read_dir(&dir).await
                .map_err(|e| Error::remote(format!("Failed to list {}: {}", dir.display(), e)))?;
            while let Some(entry) = read_dir.next_entry().await? {
                let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                    continue;
                };
                let key = format!("{}{}", key_prefix, name);
                let file_type = entry.file_type().await?;
                if file_type.is_dir() {
                    pending.push((entry.path(), format!("{}/", key)));
                } else if key.starts_with(prefix) {
                    entries.push(ObjectEntry::new(key));
                }
            }
        }

        entries.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(ObjectListing {
            contents: Some(entries),
        })
    }

    async fn upload_file(&self, bucket: &str, key: &str, local_path: &Path) -> Result<()> {
        let full_path = self.full_path(bucket, key)?;
        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::copy(local_path, &full_path).await
            .map_err(|e| Error::remote(format!("Failed to write {}: {}", full_path.display(), e)))?;
        Ok(())
    }

    fn store_type(&self) -> StoreType {
        StoreType::Local
    }

    fn describe(&self, bucket: &str, key: &str) -> String {
        self.base_path.join(bucket).join(key).display().to_string()
    }
}
