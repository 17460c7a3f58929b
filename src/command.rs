//! `/upload` orchestration: validate, stage, pick an identifier, build
//! metadata, upload, clean up, report.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use crate::archive::identifier::{base_identifier, resolve, Resolution};
use crate::archive::metadata::{derive_date, describe_custom, parse_custom_metadata, MetadataInputs};
use crate::archive::storage::{validate_attachments, StagedBatch};
use crate::archive::{
    AttachmentFetcher, Invocation, MetadataAssembler, StagingArea, UploadError, UploadExecutor,
};

pub const DEFAULT_MAX_ATTACHMENTS: usize = 10;
pub const DEFAULT_MAX_ATTACHMENT_BYTES: u64 = 100 * 1024 * 1024;
pub const DEFAULT_DETAILS_URL: &str = "https://archive.org/details";

/// Outgoing side of one invocation.
#[async_trait]
pub trait Reply: Send + Sync {
    /// Prompt acknowledgment; the result follows in later messages.
    async fn acknowledge(&self) -> Result<()>;

    async fn send(&self, text: &str) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct UploadLimits {
    pub max_attachments: usize,
    pub max_attachment_bytes: u64,
}

impl Default for UploadLimits {
    fn default() -> Self {
        Self {
            max_attachments: DEFAULT_MAX_ATTACHMENTS,
            max_attachment_bytes: DEFAULT_MAX_ATTACHMENT_BYTES,
        }
    }
}

/// Handles `/upload`. Built once at startup and shared across invocations.
pub struct UploadCommand {
    staging: StagingArea,
    fetcher: Arc<dyn AttachmentFetcher>,
    executor: UploadExecutor,
    assembler: MetadataAssembler,
    limits: UploadLimits,
    details_url: String,
}

impl UploadCommand {
    pub fn new(
        staging: StagingArea,
        fetcher: Arc<dyn AttachmentFetcher>,
        executor: UploadExecutor,
        assembler: MetadataAssembler,
        limits: UploadLimits,
        details_url: &str,
    ) -> Self {
        Self {
            staging,
            fetcher,
            executor,
            assembler,
            limits,
            details_url: details_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn limits(&self) -> &UploadLimits {
        &self.limits
    }

    pub fn details_link(&self, identifier: &str) -> String {
        format!("{}/{}", self.details_url, identifier)
    }

    /// Run one invocation to completion and send the final message.
    ///
    /// Returns the identifier the item was uploaded under.
    pub async fn run(&self, invocation: &Invocation, reply: &dyn Reply) -> Result<String, UploadError> {
        if let Err(e) = reply.acknowledge().await {
            warn!(error = %e, "failed to acknowledge invocation");
        }
        info!(
            user = %invocation.user_name,
            files = invocation.attachments.len(),
            "upload requested"
        );

        let outcome = self.execute(invocation, reply).await;
        let message = match &outcome {
            Ok(identifier) => {
                success_message(invocation.attachments.len(), &self.details_link(identifier))
            }
            Err(e) if e.is_validation() => {
                info!(user = %invocation.user_name, reason = %e, "upload rejected");
                e.user_message()
            }
            Err(e) => {
                error!(user = %invocation.user_name, error = %e, "upload failed");
                e.user_message()
            }
        };
        notify(reply, &message).await;
        outcome
    }

    async fn execute(&self, invocation: &Invocation, reply: &dyn Reply) -> Result<String, UploadError> {
        validate_attachments(
            &invocation.attachments,
            self.limits.max_attachments,
            self.limits.max_attachment_bytes,
        )?;

        let mut batch = self
            .staging
            .open_batch()
            .await
            .map_err(|e| UploadError::Staging(format!("{e:#}")))?;
        let result = self.process(&mut batch, invocation, reply).await;
        batch.cleanup().await;
        result
    }

    async fn process(
        &self,
        batch: &mut StagedBatch,
        invocation: &Invocation,
        reply: &dyn Reply,
    ) -> Result<String, UploadError> {
        for attachment in &invocation.attachments {
            batch
                .stage(attachment, self.fetcher.as_ref())
                .await
                .map_err(|e| UploadError::Staging(format!("{e:#}")))?;
        }
        let count = batch.files().len();
        notify(reply, &format!("Uploading {count} file(s) to Archive.org...")).await;

        let filenames: Vec<&str> = invocation
            .attachments
            .iter()
            .map(|a| a.filename.as_str())
            .collect();
        let base = base_identifier(&filenames, &invocation.user_name);
        let Resolution {
            identifier,
            collided_with,
        } = resolve(&self.executor, &base).await;
        if let Some(taken) = collided_with {
            notify(
                reply,
                &format!("Identifier `{taken}` already exists, using `{identifier}` instead."),
            )
            .await;
        }

        let custom = parse_custom_metadata(invocation.custom_metadata.as_deref());
        if let Some(raw) = invocation.custom_metadata.as_deref() {
            if custom.is_empty() && !raw.trim().is_empty() {
                warn!(identifier = %identifier, raw, "custom metadata had no usable pairs");
                notify(
                    reply,
                    "Warning: custom metadata could not be parsed (expected `key=value` pairs separated by commas). Continuing without it.",
                )
                .await;
            } else if !custom.is_empty() {
                notify(
                    reply,
                    &format!("Adding custom metadata: {}", describe_custom(&custom)),
                )
                .await;
            }
        }

        let paths = batch.paths();
        let staged_names = batch.names();
        let date = derive_date(&paths).await;
        let record = self.assembler.assemble(MetadataInputs {
            filenames: &filenames,
            staged_names: &staged_names,
            uploader: &invocation.user_name,
            date,
            custom,
        });
        debug!(
            identifier = %identifier,
            metadata = %serde_json::to_string(&record).unwrap_or_default(),
            "assembled metadata"
        );

        self.executor.upload(&identifier, paths, record).await?;
        info!(identifier = %identifier, files = count, "upload complete");
        Ok(identifier)
    }
}

async fn notify(reply: &dyn Reply, text: &str) {
    if let Err(e) = reply.send(text).await {
        warn!(error = %e, "failed to send reply");
    }
}

fn success_message(file_count: usize, link: &str) -> String {
    if file_count == 1 {
        format!("File successfully uploaded to Archive.org! [View it here]({link})")
    } else {
        format!("Files successfully uploaded to Archive.org! [View them here]({link})")
    }
}

/// Reply text for `/ping`.
pub fn ping_message(latency: Duration) -> String {
    format!("Pong! `{}ms`", (latency.as_secs_f64() * 1000.0).round() as u64)
}
