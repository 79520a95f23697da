//! Screenshot persistence: bucket resolution and screenshot upload
//!
//! Storage is opt-in. When no client is configured, or the bucket could not be
//! resolved, every operation here is a silent no-op.

use crate::browser::BrowserPage;
use crate::config::CheckerOptions;
use crate::environment::Environment;
use crate::error::StorageError;
use crate::metrics;
use crate::result::{ErrorKind, LinkError, ScreenshotOutput};
use crate::utils::screenshot_file_name;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Object-storage capability.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StorageClient: Send + Sync {
    async fn bucket_exists(&self, bucket: &str) -> Result<bool, StorageError>;

    async fn create_bucket(&self, bucket: &str) -> Result<(), StorageError>;

    async fn upload(&self, bucket: &str, path: &str, data: Vec<u8>) -> Result<(), StorageError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bucket {
    pub name: String,
}

/// Storage state for one run.
#[derive(Clone, Default)]
pub struct StorageContext {
    pub client: Option<Arc<dyn StorageClient>>,
    pub bucket: Option<Bucket>,
    pub uptime_id: String,
    pub execution_id: String,
    /// Folder inside the bucket, from the storage location.
    pub folder: String,
}

impl StorageContext {
    /// Context that never captures or uploads anything.
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Resolves the bucket once, before any link is verified.
    ///
    /// Returns the context plus any storage errors met on the way; those
    /// belong in the run-level error list.
    pub async fn resolve(
        client: Option<Arc<dyn StorageClient>>,
        environment: &dyn Environment,
        options: &CheckerOptions,
    ) -> (Self, Vec<LinkError>) {
        let storage_location = &options.screenshot_options.storage_location;
        let mut context = Self {
            client: None,
            bucket: None,
            uptime_id: environment.uptime_id(),
            execution_id: environment.execution_id(),
            folder: get_folder_name_from_storage_location(storage_location).to_string(),
        };

        let Some(client) = client else {
            return (context, Vec::new());
        };
        if !options.screenshots_enabled() {
            return (context, Vec::new());
        }

        let mut errors = Vec::new();
        match get_or_create_storage_bucket(client.as_ref(), environment, storage_location).await {
            Ok(bucket) => context.bucket = bucket,
            Err(e) => {
                warn!("Screenshots disabled for this run: {}", e);
                errors.push(e);
            }
        }
        context.client = Some(client);

        (context, errors)
    }

    pub fn is_enabled(&self) -> bool {
        self.client.is_some() && self.bucket.is_some()
    }
}

/// Returns everything after the first `/` of a storage location, or `""`.
pub fn get_folder_name_from_storage_location(storage_location: &str) -> &str {
    storage_location
        .split_once('/')
        .map(|(_, folder)| folder)
        .unwrap_or("")
}

/// Bucket named by a storage location, if it names one.
fn bucket_name_from_storage_location(storage_location: &str) -> Option<&str> {
    let name = storage_location.split('/').next().unwrap_or("").trim();
    (!name.is_empty()).then_some(name)
}

pub fn default_bucket_name(project_id: &str, region: &str) -> String {
    format!("{project_id}-synthetics-{region}")
}

/// Finds the screenshot bucket, creating it when it does not exist yet
///
/// * `Ok(Some(bucket))`: bucket exists or was created.
/// * `Ok(None)`: the default bucket name could not be derived because the
///   project id or region is unknown. The environment reports that itself.
/// * `Err(_)`: one `StorageValidationError` or `BucketCreationError`.
///
/// Creation is only attempted after the bucket was confirmed absent.
pub async fn get_or_create_storage_bucket(
    client: &dyn StorageClient,
    environment: &dyn Environment,
    storage_location: &str,
) -> Result<Option<Bucket>, LinkError> {
    let name = match bucket_name_from_storage_location(storage_location) {
        Some(name) => name.to_string(),
        None => {
            let project_id = environment.resolve_project_id().await;
            let region = environment.execution_region().await;
            match (project_id, region) {
                (Ok(project_id), Ok(region)) => default_bucket_name(&project_id, &region),
                (Err(e), _) | (_, Err(e)) => {
                    debug!("Default bucket name unavailable: {}", e);
                    return Ok(None);
                }
            }
        }
    };

    let exists = client.bucket_exists(&name).await.map_err(|e| {
        LinkError::new(
            ErrorKind::StorageValidationError,
            format!("Failed to validate storage bucket {name}: {e}"),
        )
    })?;

    if !exists {
        client.create_bucket(&name).await.map_err(|e| {
            LinkError::new(
                ErrorKind::BucketCreationError,
                format!("Failed to create storage bucket {name}: {e}"),
            )
        })?;
        info!("Created storage bucket {}", name);
    }

    Ok(Some(Bucket { name }))
}

/// Destination of a screenshot inside its bucket; empty segments are skipped.
pub fn screenshot_destination(
    folder: &str,
    uptime_id: &str,
    execution_id: &str,
    file_name: &str,
) -> String {
    [folder, uptime_id, execution_id, file_name]
        .iter()
        .map(|segment| segment.trim_matches('/'))
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

/// Captures the page and uploads it to the run's bucket
///
/// Never fails: a capture or upload failure is reported as a
/// `ScreenshotFileUploadError` with an empty destination path.
pub async fn upload_screenshot(
    page: &dyn BrowserPage,
    context: &StorageContext,
    target_url: &str,
) -> ScreenshotOutput {
    let (Some(client), Some(bucket)) = (&context.client, &context.bucket) else {
        return ScreenshotOutput::default();
    };

    let destination = screenshot_destination(
        &context.folder,
        &context.uptime_id,
        &context.execution_id,
        &screenshot_file_name(target_url),
    );

    let uploaded = match page.screenshot().await {
        Ok(data) => client
            .upload(&bucket.name, &destination, data)
            .await
            .map_err(|e| e.to_string()),
        Err(e) => Err(e.to_string()),
    };

    metrics::record_screenshot_upload(uploaded.is_ok());
    match uploaded {
        Ok(()) => {
            debug!("Uploaded screenshot to gs://{}/{}", bucket.name, destination);
            ScreenshotOutput::uploaded(destination)
        }
        Err(e) => {
            let page_url = page
                .current_url()
                .await
                .unwrap_or_else(|| target_url.to_string());
            warn!("Screenshot upload for {} failed: {}", page_url, e);
            ScreenshotOutput::failed(LinkError::new(
                ErrorKind::ScreenshotFileUploadError,
                format!(
                    "Failed to take and upload screenshot for {page_url}. Please reference server logs for further information."
                ),
            ))
        }
    }
}
