//! Internet Archive client.
//!
//! Existence checks go through the public metadata API; uploads use the
//! IA-S3 endpoint with one `PUT` per file and item metadata carried in
//! `x-archive-meta-*` headers. All calls are blocking and are expected to run
//! on a blocking-capable thread (see [`super::executor`]).

use anyhow::{bail, Context, Result};
use reqwest::blocking::{Body, Client};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use std::fs::File;
use std::path::PathBuf;
use tracing::{debug, info};

use super::mime::guess_mime_type;
use super::schema::{MetadataRecord, MetadataValue};

pub const DEFAULT_METADATA_URL: &str = "https://archive.org";
pub const DEFAULT_S3_URL: &str = "https://s3.us.archive.org";

/// Remote archive operations used by the upload pipeline.
pub trait ArchiveService: Send + Sync {
    /// `Ok(true)` only when the service positively reports the item.
    fn item_exists(&self, identifier: &str) -> Result<bool>;

    fn upload(&self, identifier: &str, files: &[PathBuf], metadata: &MetadataRecord) -> Result<()>;
}

/// IA-S3 key pair.
#[derive(Clone)]
pub struct IaCredentials {
    pub access_key: String,
    pub secret_key: String,
}

impl std::fmt::Debug for IaCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IaCredentials")
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .finish()
    }
}

pub struct IaClient {
    http: Client,
    credentials: Option<IaCredentials>,
    metadata_url: String,
    s3_url: String,
}

impl IaClient {
    /// Build the client. Must not be called from inside an async task.
    pub fn new(credentials: Option<IaCredentials>, metadata_url: &str, s3_url: &str) -> Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("ia-upload-bot/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            http,
            credentials,
            metadata_url: metadata_url.trim_end_matches('/').to_string(),
            s3_url: s3_url.trim_end_matches('/').to_string(),
        })
    }
}

impl ArchiveService for IaClient {
    fn item_exists(&self, identifier: &str) -> Result<bool> {
        let url = format!(
            "{}/metadata/{}",
            self.metadata_url,
            urlencoding::encode(identifier)
        );
        let resp = self
            .http
            .get(&url)
            .send()
            .context("Metadata lookup failed")?;
        if !resp.status().is_success() {
            bail!("Metadata lookup returned {}", resp.status());
        }
        let body: serde_json::Value = resp.json().context("Malformed metadata response")?;
        Ok(has_item_metadata(&body))
    }

    fn upload(&self, identifier: &str, files: &[PathBuf], metadata: &MetadataRecord) -> Result<()> {
        let credentials = self
            .credentials
            .as_ref()
            .context("Internet Archive credentials are not configured")?;
        let meta_headers = metadata_headers(metadata)?;
        let size_hint: u64 = files
            .iter()
            .filter_map(|p| std::fs::metadata(p).ok())
            .map(|m| m.len())
            .sum();

        for path in files {
            let name = path
                .file_name()
                .and_then(|n| n.to_str())
                .with_context(|| format!("Invalid file name: {}", path.display()))?;
            let file = File::open(path).with_context(|| format!("Failed to open {name}"))?;
            let len = file
                .metadata()
                .with_context(|| format!("Failed to stat {name}"))?
                .len();

            let url = format!("{}/{}/{}", self.s3_url, identifier, urlencoding::encode(name));
            let mut req = self
                .http
                .put(&url)
                .header(
                    AUTHORIZATION,
                    format!("LOW {}:{}", credentials.access_key, credentials.secret_key),
                )
                .header("x-amz-auto-make-bucket", "1")
                .header("x-archive-size-hint", size_hint.to_string())
                .header(CONTENT_TYPE, guess_mime_type(path));
            for (header, value) in &meta_headers {
                req = req.header(header.as_str(), value.as_str());
            }

            debug!(identifier, file = name, bytes = len, "uploading file");
            let resp = req
                .body(Body::sized(file, len))
                .send()
                .with_context(|| format!("Upload of {name} failed"))?;
            let status = resp.status();
            if !status.is_success() {
                let body = resp.text().unwrap_or_default();
                let reason = s3_error_message(&body).unwrap_or_else(|| status.to_string());
                bail!("Upload of {name} failed: {reason}");
            }
            info!(identifier, file = name, "uploaded file");
        }
        Ok(())
    }
}

/// The metadata API answers `{}` for unknown identifiers.
fn has_item_metadata(body: &serde_json::Value) -> bool {
    body.get("metadata")
        .and_then(|m| m.as_object())
        .is_some_and(|m| !m.is_empty())
}

fn encode_header_value(value: &str) -> String {
    if value.chars().all(|c| c.is_ascii() && !c.is_ascii_control()) {
        value.to_string()
    } else {
        format!("uri({})", urlencoding::encode(value))
    }
}

/// Translate a record into IA-S3 metadata headers.
///
/// Scalar values map to `x-archive-meta-{key}`; list values to
/// `x-archive-meta{NN}-{key}`. Underscores in keys are written as `--`.
/// Two keys that map to the same header name are an error.
pub fn metadata_headers(metadata: &MetadataRecord) -> Result<Vec<(String, String)>> {
    let mut headers = Vec::new();
    let mut seen: Vec<(String, &str)> = Vec::new();
    for (key, value) in metadata.iter() {
        if !key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            bail!("Invalid metadata key `{key}`: use letters, digits, `_` or `-`");
        }
        let name = key.to_ascii_lowercase().replace('_', "--");
        if let Some((_, earlier)) = seen.iter().find(|(n, _)| *n == name) {
            bail!("Metadata keys `{earlier}` and `{key}` name the same field");
        }
        seen.push((name.clone(), key));
        match value {
            MetadataValue::Single(v) => {
                headers.push((format!("x-archive-meta-{name}"), encode_header_value(v)));
            }
            MetadataValue::Many(values) => {
                for (i, v) in values.iter().enumerate() {
                    headers.push((format!("x-archive-meta{i:02}-{name}"), encode_header_value(v)));
                }
            }
        }
    }
    Ok(headers)
}

/// Pull `<Message>` out of an S3 XML error body.
fn s3_error_message(body: &str) -> Option<String> {
    let start = body.find("<Message>")? + "<Message>".len();
    let end = body[start..].find("</Message>")? + start;
    let message = body[start..end].trim();
    (!message.is_empty()).then(|| message.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn metadata_presence_decides_existence() {
        assert!(has_item_metadata(&json!({"metadata": {"identifier": "x"}})));
        assert!(!has_item_metadata(&json!({})));
        assert!(!has_item_metadata(&json!({"metadata": {}})));
        assert!(!has_item_metadata(&json!({"error": "nope"})));
    }

    #[test]
    fn headers_for_scalars_and_lists() {
        let mut record = MetadataRecord::new();
        record.set("title", "Photo 01.jpg");
        record.set("description", "line one\nline two");
        record.append("subject", "a");
        record.append("subject", "b");
        record.set("external_id", "x");

        let headers = metadata_headers(&record).unwrap();
        assert_eq!(
            headers,
            vec![
                ("x-archive-meta-title".to_string(), "Photo 01.jpg".to_string()),
                (
                    "x-archive-meta-description".to_string(),
                    "uri(line%20one%0Aline%20two)".to_string()
                ),
                ("x-archive-meta00-subject".to_string(), "a".to_string()),
                ("x-archive-meta01-subject".to_string(), "b".to_string()),
                ("x-archive-meta-external--id".to_string(), "x".to_string()),
            ]
        );
    }

    #[test]
    fn non_ascii_values_are_uri_encoded() {
        assert_eq!(encode_header_value("café"), "uri(caf%C3%A9)");
        assert_eq!(encode_header_value("plain"), "plain");
    }

    #[test]
    fn rejects_keys_that_cannot_be_headers() {
        let mut record = MetadataRecord::new();
        record.set("my key", "v");
        let err = metadata_headers(&record).unwrap_err();
        assert!(err.to_string().contains("my key"));
    }

    #[test]
    fn rejects_keys_that_share_a_header() {
        let mut record = MetadataRecord::new();
        record.set("title", "x.bin");
        record.set("Title", "Better");
        let err = metadata_headers(&record).unwrap_err();
        assert!(err.to_string().contains("`title` and `Title`"));

        let mut record = MetadataRecord::new();
        record.set("a_b", "1");
        record.set("a--b", "2");
        assert!(metadata_headers(&record).is_err());
    }

    #[test]
    fn extracts_s3_message() {
        let body = "<?xml version='1.0'?><Error><Code>SlowDown</Code><Message>Please reduce your request rate.</Message></Error>";
        assert_eq!(
            s3_error_message(body).as_deref(),
            Some("Please reduce your request rate.")
        );
        assert!(s3_error_message("not xml").is_none());
    }

    #[test]
    fn credentials_debug_is_redacted() {
        let creds = IaCredentials {
            access_key: "ak".into(),
            secret_key: "sk".into(),
        };
        let rendered = format!("{creds:?}");
        assert!(rendered.contains("ak"));
        assert!(!rendered.contains("\"sk\""));
    }
}
