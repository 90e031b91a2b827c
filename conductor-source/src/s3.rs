//! Object-store backend built on aws-sdk-s3.
//!
//! Listing walks `ListObjectsV2` continuation tokens until the bucket stops
//! reporting truncation. Marking an object processed is a copy to the
//! sentinel-prefixed key followed by a delete of the original.

use std::future::Future;

use async_trait::async_trait;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::types::Object;
use aws_sdk_s3::Client;
use chrono::{DateTime, Utc};

use conductor_core::{S3Settings, WorkItem};

use crate::error::SourceError;
use crate::{marked_id, order_items, WorkSource};

/// Build a client from the ambient AWS credential chain plus `settings`.
pub async fn connect(settings: &S3Settings) -> Client {
    let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(Region::new(settings.region.clone()));
    if let Some(endpoint) = settings.endpoint.as_deref() {
        loader = loader.endpoint_url(endpoint);
    }
    let shared = loader.load().await;

    // S3-compatible stores behind a custom endpoint rarely serve virtual-hosted buckets.
    let config = aws_sdk_s3::config::Builder::from(&shared)
        .force_path_style(settings.endpoint.is_some())
        .build();
    Client::from_conf(config)
}

/// Objects under `prefix` in one bucket.
#[derive(Debug, Clone)]
pub struct S3Source {
    client: Client,
    bucket: String,
    prefix: String,
}

/// One `ListObjectsV2` response, reduced to what the listing loop needs.
#[derive(Debug, Default)]
pub(crate) struct Page {
    pub items: Vec<WorkItem>,
    pub next: Option<String>,
}

impl S3Source {
    pub fn new(client: Client, bucket: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
            prefix: prefix.into(),
        }
    }

    async fn fetch_page(&self, token: Option<String>) -> Result<Page, SourceError> {
        let resp = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(&self.prefix)
            .set_continuation_token(token)
            .send()
            .await
            .map_err(|err| self.store_err("list_objects_v2", err))?;

        let items = resp.contents().iter().filter_map(item_from_object).collect();

        let next = if resp.is_truncated().unwrap_or(false) {
            resp.next_continuation_token().map(str::to_string)
        } else {
            None
        };
        Ok(Page { items, next })
    }

    /// Copy `from` to `to` within the bucket, then delete `from`.
    pub async fn rename(&self, from: &str, to: &str) -> Result<(), SourceError> {
        self.client
            .copy_object()
            .bucket(&self.bucket)
            .copy_source(copy_source(&self.bucket, from))
            .key(to)
            .send()
            .await
            .map_err(|err| self.store_err("copy_object", err))?;
        self.delete(from).await?;
        tracing::info!(bucket = %self.bucket, from, to, "object renamed");
        Ok(())
    }

    pub async fn delete(&self, key: &str) -> Result<(), SourceError> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| self.store_err("delete_object", err))?;
        Ok(())
    }

    fn store_err<E>(&self, operation: &'static str, err: E) -> SourceError
    where
        E: std::error::Error,
    {
        SourceError::ObjectStore {
            bucket: self.bucket.clone(),
            operation,
            message: DisplayErrorContext(err).to_string(),
        }
    }
}

#[async_trait]
impl WorkSource for S3Source {
    async fn list(&self) -> Result<Vec<WorkItem>, SourceError> {
        let items = drain_pages(|token| self.fetch_page(token)).await?;
        tracing::debug!(
            bucket = %self.bucket,
            prefix = %self.prefix,
            objects = items.len(),
            "listed objects",
        );
        Ok(order_items(items))
    }

    async fn mark_processed(&self, item: &WorkItem) -> Result<(), SourceError> {
        self.rename(&item.id, &marked_id(&item.id)).await
    }
}

/// A listed object as a work item. Zero-byte "folder" placeholders are not
/// work; an object without a timestamp sorts as of the Unix epoch.
pub(crate) fn item_from_object(object: &Object) -> Option<WorkItem> {
    let key = object.key()?;
    if key.ends_with('/') {
        return None;
    }
    let last_modified = object
        .last_modified()
        .and_then(|ts| DateTime::<Utc>::from_timestamp(ts.secs(), ts.subsec_nanos()))
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
    Some(WorkItem::new(key, last_modified))
}

/// `x-amz-copy-source` value: the bucket, then the key percent-encoded one
/// segment at a time so `/` separators survive.
pub(crate) fn copy_source(bucket: &str, key: &str) -> String {
    let encoded: Vec<_> = key.split('/').map(urlencoding::encode).collect();
    format!("{bucket}/{}", encoded.join("/"))
}

/// Follow continuation tokens until a page comes back without one.
pub(crate) async fn drain_pages<F, Fut>(mut fetch: F) -> Result<Vec<WorkItem>, SourceError>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<Page, SourceError>>,
{
    let mut items = Vec::new();
    let mut token = None;
    loop {
        let page = fetch(token.take()).await?;
        items.extend(page.items);
        match page.next {
            Some(next) => token = Some(next),
            None => break,
        }
    }
    Ok(items)
}
