use thiserror::Error;

/// Failures that end an upload invocation.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("No files attached. Please provide at least one file.")]
    NoAttachments,

    #[error("Too many files attached ({count}). At most {limit} files can be uploaded at once.")]
    TooManyAttachments { count: usize, limit: usize },

    #[error("File `{filename}` exceeds the {limit} limit.")]
    AttachmentTooLarge { filename: String, limit: String },

    #[error("{0}")]
    Staging(String),

    #[error("{0}")]
    Remote(String),
}

impl UploadError {
    /// Rejected before any file was staged.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            UploadError::NoAttachments
                | UploadError::TooManyAttachments { .. }
                | UploadError::AttachmentTooLarge { .. }
        )
    }

    /// Text shown to the invoking user as the final reply.
    pub fn user_message(&self) -> String {
        match self {
            UploadError::Staging(msg) => {
                format!("An error occurred while saving attachments: {msg}")
            }
            UploadError::Remote(msg) => format!("An error occurred during upload: {msg}"),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_messages_are_shown_verbatim() {
        let err = UploadError::AttachmentTooLarge {
            filename: "big.iso".into(),
            limit: "100MB".into(),
        };
        assert!(err.is_validation());
        assert_eq!(err.user_message(), "File `big.iso` exceeds the 100MB limit.");
        assert!(UploadError::NoAttachments
            .user_message()
            .contains("at least one file"));
    }

    #[test]
    fn remote_errors_are_prefixed() {
        let err = UploadError::Remote("503 Slow Down".into());
        assert!(!err.is_validation());
        assert_eq!(
            err.user_message(),
            "An error occurred during upload: 503 Slow Down"
        );
    }
}
