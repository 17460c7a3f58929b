use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, warn};

use super::client::ArchiveService;
use super::error::UploadError;
use super::schema::MetadataRecord;

/// Runs blocking archive calls on tokio's blocking pool.
#[derive(Clone)]
pub struct UploadExecutor {
    service: Arc<dyn ArchiveService>,
}

impl UploadExecutor {
    pub fn new(service: Arc<dyn ArchiveService>) -> Self {
        Self { service }
    }

    /// Any failure reads as "does not exist".
    pub async fn item_exists(&self, identifier: &str) -> bool {
        let service = Arc::clone(&self.service);
        let id = identifier.to_string();
        match tokio::task::spawn_blocking(move || service.item_exists(&id)).await {
            Ok(Ok(exists)) => exists,
            Ok(Err(e)) => {
                debug!(identifier, error = %e, "existence check failed, assuming free");
                false
            }
            Err(e) => {
                warn!(identifier, error = %e, "existence check task failed");
                false
            }
        }
    }

    pub async fn upload(
        &self,
        identifier: &str,
        files: Vec<PathBuf>,
        metadata: MetadataRecord,
    ) -> Result<(), UploadError> {
        let service = Arc::clone(&self.service);
        let id = identifier.to_string();
        let joined =
            tokio::task::spawn_blocking(move || service.upload(&id, &files, &metadata)).await;
        match joined {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(UploadError::Remote(format!("{e:#}"))),
            Err(e) => Err(UploadError::Remote(format!("upload task failed: {e}"))),
        }
    }
}
