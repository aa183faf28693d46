use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::Client;
use aws_sdk_s3::operation::list_objects_v2::ListObjectsV2Output;
use aws_sdk_s3::primitives::ByteStream;
use stashbox_core::store::{ObjectEntry, ObjectListing, RemoteStore, StoreType};
use stashbox_core::{Error, Result};
use std::future::Future;
use std::path::Path;
use tracing::debug;

pub struct S3Store {
    client: Client,
}

impl S3Store {
    /// Client configured from the standard AWS environment, profile and
    /// instance metadata chain.
    pub async fn new() -> Self {
        let config = aws_config::load_defaults(BehaviorVersion::latest()).await;
        Self {
            client: Client::new(&config),
        }
    }

    /// Same as [`S3Store::new`] but talking to an S3-compatible endpoint.
    pub async fn with_endpoint(endpoint: String) -> Self {
        let config = aws_config::defaults(BehaviorVersion::latest())
            .endpoint_url(endpoint)
            .load()
            .await;
        let s3_config = aws_sdk_s3::config::Builder::from(&config)
            .force_path_style(true)
            .build();
        Self {
            client: Client::from_conf(s3_config),
        }
    }
}

#[async_trait]
impl RemoteStore for S3Store {
    async fn list_objects(&self, bucket: &str, prefix: &str) -> Result<ObjectListing> {
        let listing = collect_pages(bucket, prefix, |token| {
            let request = self.client
                .list_objects_v2()
                .bucket(bucket)
                .prefix(prefix)
                .set_continuation_token(token);
            async move {
                request.send().await
                    .map_err(|e| Error::remote(format!("Failed to list s3://{}/{}: {}", bucket, prefix, e)))
            }
        })
        .await?;

        if let Some(entries) = &listing.contents {
            debug!("Listed {} objects under s3://{}/{}", entries.len(), bucket, prefix);
        }
        Ok(listing)
    }

    async fn upload_file(&self, bucket: &str, key: &str, local_path: &Path) -> Result<()> {
        let body = ByteStream::from_path(local_path)
            .await
            .map_err(|e| Error::remote(format!("Failed to read {}: {}", local_path.display(), e)))?;

        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(body)
            .send()
            .await
            .map_err(|e| Error::remote(format!("Failed to upload s3://{}/{}: {}", bucket, key, e)))?;

        Ok(())
    }

    fn store_type(&self) -> StoreType {
        StoreType::S3
    }

    fn describe(&self, bucket: &str, key: &str) -> String {
        format!("s3://{}/{}", bucket, key)
    }
}

/// Follows continuation tokens until the listing is complete. `fetch` gets
/// the token for the next page, `None` for the first.
async fn collect_pages<F, Fut>(bucket: &str, prefix: &str, mut fetch: F) -> Result<ObjectListing>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<ListObjectsV2Output>>,
{
    let mut entries = Vec::new();
    let mut continuation_token = None;

    loop {
        let page = fetch(continuation_token.take()).await?;

        match page.contents {
            Some(contents) => {
                entries.extend(contents.into_iter().map(|object| ObjectEntry { key: object.key }));
            }
            // S3 leaves out <Contents> for an empty page; a page claiming
            // keys without carrying them is malformed.
            None if page.key_count.unwrap_or(0) > 0 => {
                return Ok(ObjectListing { contents: None });
            }
            None => {}
        }

        if !page.is_truncated.unwrap_or(false) {
            break;
        }
        match page.next_continuation_token {
            Some(token) => continuation_token = Some(token),
            None => {
                return Err(Error::remote(format!(
                    "Truncated listing of s3://{}/{} without a continuation token",
                    bucket, prefix
                )));
            }
        }
    }

    Ok(ObjectListing {
        contents: Some(entries),
    })
}
