use crate::check::join_key;
use crate::config::BackupOptions;
use crate::store::RemoteStore;
use crate::{Error, Result};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Where an archive was (or would have been) uploaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadTarget {
    pub bucket: String,
    pub key: String,
}

/// Sends local archives to the remote store.
pub struct Uploader {
    store: Arc<dyn RemoteStore>,
    dry_run: bool,
}

impl Uploader {
    pub fn new(store: Arc<dyn RemoteStore>, dry_run: bool) -> Self {
        Self { store, dry_run }
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Uploads `local_archive` to `[destination_subpath/]<file name>` in the
    /// configured bucket. In dry-run mode everything but the transfer happens.
    pub async fn upload(&self, local_archive: &Path, options: &BackupOptions) -> Result<UploadTarget> {
        let bucket = options.require_bucket()?;
        let key = destination_key(local_archive, options)?;
        let location = self.store.describe(bucket, &key);

        if self.dry_run {
            info!("DRY RUN: would upload {} to {}", local_archive.display(), location);
        } else {
            info!("Uploading {} to {}...", local_archive.display(), location);
            self.store.upload_file(bucket, &key, local_archive).await?;
            info!("Upload complete.");
        }

        Ok(UploadTarget {
            bucket: bucket.to_string(),
            key,
        })
    }
}

/// `[destination_subpath/]basename(local_archive)`.
pub fn destination_key(local_archive: &Path, options: &BackupOptions) -> Result<String> {
    let file_name = local_archive
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| {
            Error::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("archive path has no usable file name: {}", local_archive.display()),
            ))
        })?;
    Ok(join_key([options.destination_subpath(), Some(file_name)]))
}
