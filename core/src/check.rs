use crate::config::BackupOptions;
use crate::fingerprint::Fingerprint;
use crate::store::RemoteStore;
use crate::{Error, Result};
use tracing::{debug, warn};

/// Joins the non-empty parts with `/`.
pub(crate) fn join_key<'a>(parts: impl IntoIterator<Item = Option<&'a str>>) -> String {
    parts
        .into_iter()
        .flatten()
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

/// Prefix under which earlier archives of a backup are listed:
/// `[destination_subpath/][archive_prefix]`.
pub fn listing_prefix(options: &BackupOptions) -> String {
    join_key([options.destination_subpath(), options.archive_prefix()])
}

/// Keys of the archives already stored for a backup.
///
/// Entries without a key are skipped with a warning. A response without a
/// listing at all is an error.
pub async fn list_existing_archives(
    store: &dyn RemoteStore,
    options: &BackupOptions,
) -> Result<Vec<String>> {
    let bucket = options.require_bucket()?;
    let prefix = listing_prefix(options);
    debug!("Listing {}", store.describe(bucket, &prefix));

    let listing = store.list_objects(bucket, &prefix).await?;
    let contents = listing.contents.ok_or_else(|| {
        Error::remote(format!(
            "listing of {} has no contents field",
            store.describe(bucket, &prefix)
        ))
    })?;

    let mut keys = Vec::with_capacity(contents.len());
    for entry in contents {
        match entry.key {
            Some(key) => keys.push(key),
            None => warn!("Skipping listing entry without a key under {}", store.describe(bucket, &prefix)),
        }
    }
    Ok(keys)
}

/// Returns the first stored archive whose key embeds `fingerprint`.
pub async fn find_existing_archive(
    store: &dyn RemoteStore,
    options: &BackupOptions,
    fingerprint: &Fingerprint,
) -> Result<Option<String>> {
    let keys = list_existing_archives(store, options).await?;
    debug!("Found {} archives: {:?}", keys.len(), keys);
    Ok(keys.into_iter().find(|key| fingerprint.is_in(key)))
}
