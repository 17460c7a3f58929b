use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use futures_util::StreamExt;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;
use uuid::Uuid;

use super::error::UploadError;
use super::schema::AttachmentDescriptor;

/// Fetches attachment bytes from the chat platform into a local file.
#[async_trait]
pub trait AttachmentFetcher: Send + Sync {
    async fn fetch(&self, attachment: &AttachmentDescriptor, dest: &Path) -> Result<()>;
}

/// Streams attachments over HTTP(S).
#[derive(Default)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl AttachmentFetcher for HttpFetcher {
    async fn fetch(&self, attachment: &AttachmentDescriptor, dest: &Path) -> Result<()> {
        let resp = self
            .client
            .get(&attachment.url)
            .send()
            .await
            .with_context(|| format!("Failed to fetch {}", attachment.filename))?;
        if !resp.status().is_success() {
            bail!("Fetching {} returned {}", attachment.filename, resp.status());
        }

        let mut file = fs::File::create(dest)
            .await
            .with_context(|| format!("Failed to create {}", dest.display()))?;
        let mut body = resp.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk = chunk.context("Attachment download interrupted")?;
            file.write_all(&chunk).await.context("Failed to write attachment")?;
        }
        file.flush().await.context("Failed to write attachment")?;
        Ok(())
    }
}

/// Human-readable size for limit messages, e.g. `100MB`.
pub fn format_limit(bytes: u64) -> String {
    const MIB: u64 = 1024 * 1024;
    const KIB: u64 = 1024;
    if bytes >= MIB && bytes % MIB == 0 {
        format!("{}MB", bytes / MIB)
    } else if bytes >= KIB && bytes % KIB == 0 {
        format!("{}KB", bytes / KIB)
    } else {
        format!("{bytes} bytes")
    }
}

/// Reject the invocation before anything touches the network or disk.
pub fn validate_attachments(
    attachments: &[AttachmentDescriptor],
    max_count: usize,
    max_bytes: u64,
) -> Result<(), UploadError> {
    if attachments.is_empty() {
        return Err(UploadError::NoAttachments);
    }
    if attachments.len() > max_count {
        return Err(UploadError::TooManyAttachments {
            count: attachments.len(),
            limit: max_count,
        });
    }
    if let Some(oversized) = attachments.iter().find(|a| a.size > max_bytes) {
        return Err(UploadError::AttachmentTooLarge {
            filename: oversized.filename.clone(),
            limit: format_limit(max_bytes),
        });
    }
    Ok(())
}

/// Root under which each invocation gets its own scratch directory.
pub struct StagingArea {
    base_dir: PathBuf,
}

impl StagingArea {
    pub fn new(base_dir: &str) -> Result<Self> {
        let expanded = shellexpand::tilde(base_dir).to_string();
        Ok(Self {
            base_dir: PathBuf::from(expanded),
        })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Create a fresh `<base>/<uuid>` directory for one invocation.
    pub async fn open_batch(&self) -> Result<StagedBatch> {
        let dir = self.base_dir.join(Uuid::new_v4().to_string());
        fs::create_dir_all(&dir)
            .await
            .context("Failed to create staging directory")?;
        Ok(StagedBatch {
            dir,
            files: Vec::new(),
            purged: false,
        })
    }
}

/// A local copy of one attachment.
#[derive(Debug, Clone)]
pub struct StagedFile {
    pub path: PathBuf,
    pub attachment: AttachmentDescriptor,
}

/// Files staged for one invocation. Everything is removed on drop.
pub struct StagedBatch {
    dir: PathBuf,
    files: Vec<StagedFile>,
    purged: bool,
}

impl StagedBatch {
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Local path for an attachment name, confined to the batch directory.
    pub fn path_for(&self, filename: &str) -> PathBuf {
        let index = self.files.len() + 1;
        let name = Path::new(filename)
            .file_name()
            .and_then(|n| n.to_str())
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("attachment-{index}"));
        self.dir.join(name)
    }

    /// Fetch one attachment into the batch. A second attachment with the
    /// same name overwrites the first.
    pub async fn stage(
        &mut self,
        attachment: &AttachmentDescriptor,
        fetcher: &dyn AttachmentFetcher,
    ) -> Result<&StagedFile> {
        let path = self.path_for(&attachment.filename);
        fetcher.fetch(attachment, &path).await?;
        debug!(path = %path.display(), size = attachment.size, "staged attachment");
        self.files.push(StagedFile {
            path,
            attachment: attachment.clone(),
        });
        Ok(&self.files[self.files.len() - 1])
    }

    pub fn files(&self) -> &[StagedFile] {
        &self.files
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        self.files.iter().map(|f| f.path.clone()).collect()
    }

    /// Basenames as they will appear in the archive item.
    pub fn names(&self) -> Vec<String> {
        self.files
            .iter()
            .filter_map(|f| f.path.file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .collect()
    }

    /// Delete every staged file and the batch directory.
    pub async fn cleanup(mut self) {
        self.files.clear();
        if let Err(e) = fs::remove_dir_all(&self.dir).await {
            debug!(dir = %self.dir.display(), error = %e, "failed to remove staging directory");
        }
        self.purged = true;
    }

    /// Blocking fallback for batches dropped without `cleanup`.
    fn purge(&mut self) {
        if self.purged {
            return;
        }
        self.purged = true;
        for file in self.files.drain(..) {
            if file.path.exists() {
                if let Err(e) = std::fs::remove_file(&file.path) {
                    debug!(path = %file.path.display(), error = %e, "failed to remove staged file");
                }
            }
        }
        if let Err(e) = std::fs::remove_dir_all(&self.dir) {
            debug!(dir = %self.dir.display(), error = %e, "failed to remove staging directory");
        }
    }
}

impl Drop for StagedBatch {
    fn drop(&mut self) {
        self.purge();
    }
}
