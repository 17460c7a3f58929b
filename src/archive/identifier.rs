use std::sync::LazyLock;

use chrono::{DateTime, Local};
use regex::Regex;
use tracing::info;

use super::executor::UploadExecutor;

static ILLEGAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[^A-Za-z0-9._-]").expect("identifier character class is a valid regex")
});

/// Prefix for items holding more than one file.
pub const MULTI_FILE_PREFIX: &str = "discord-upload-";

/// Replace every character outside `[A-Za-z0-9._-]` with `_`. Case is kept.
pub fn sanitize(raw: &str) -> String {
    ILLEGAL.replace_all(raw, "_").into_owned()
}

/// Base identifier before the collision check.
pub fn base_identifier(filenames: &[&str], user_name: &str) -> String {
    match filenames {
        [single] => sanitize(single),
        _ => sanitize(&format!("{MULTI_FILE_PREFIX}{user_name}")),
    }
}

/// `{base}-YYYYMMDDHHMMSS`
pub fn timestamped(base: &str, now: DateTime<Local>) -> String {
    format!("{}-{}", base, now.format("%Y%m%d%H%M%S"))
}

/// Outcome of the collision check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub identifier: String,
    /// Set when `base` was already taken.
    pub collided_with: Option<String>,
}

impl Resolution {
    pub fn decide(base: &str, exists: bool, now: DateTime<Local>) -> Self {
        if exists {
            Self {
                identifier: timestamped(base, now),
                collided_with: Some(base.to_string()),
            }
        } else {
            Self {
                identifier: base.to_string(),
                collided_with: None,
            }
        }
    }
}

/// Check `base` against the archive and pick the identifier to upload under.
///
/// Not atomic with the upload that follows; two uploaders racing on the same
/// base can still collide.
pub async fn resolve(executor: &UploadExecutor, base: &str) -> Resolution {
    let exists = executor.item_exists(base).await;
    let resolution = Resolution::decide(base, exists, Local::now());
    if let Some(taken) = &resolution.collided_with {
        info!(base = %taken, identifier = %resolution.identifier, "identifier taken, using timestamped variant");
    }
    resolution
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn sanitize_replaces_illegal_characters() {
        assert_eq!(sanitize("Photo 01.jpg"), "Photo_01.jpg");
        assert_eq!(sanitize("a/b\\c:d"), "a_b_c_d");
        assert_eq!(sanitize("keep.these_-OK9"), "keep.these_-OK9");
    }

    #[test]
    fn sanitize_preserves_length_and_charset() {
        let inputs = ["", "!!!", "héllo wörld", "日本語.txt", "tab\there", "../../etc/passwd"];
        for input in inputs {
            let out = sanitize(input);
            assert_eq!(out.chars().count(), input.chars().count(), "{input:?}");
            assert!(
                out.chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')),
                "{out:?}"
            );
        }
        assert_eq!(sanitize(""), "");
        assert_eq!(sanitize("!!!"), "___");
    }

    #[test]
    fn base_identifier_uses_filename_or_user() {
        assert_eq!(base_identifier(&["My Report.PDF"], "alice"), "My_Report.PDF");
        assert_eq!(
            base_identifier(&["a.txt", "b.txt"], "Bob Smith"),
            "discord-upload-Bob_Smith"
        );
    }

    #[test]
    fn collision_appends_fourteen_digit_timestamp() {
        let now = Local.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        let resolution = Resolution::decide("item", true, now);
        assert_eq!(resolution.identifier, "item-20240309070501");
        assert_eq!(resolution.collided_with.as_deref(), Some("item"));

        let suffix = resolution.identifier.strip_prefix("item-").unwrap();
        assert_eq!(suffix.len(), 14);
        assert!(suffix.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn no_collision_keeps_base() {
        let resolution = Resolution::decide("item", false, Local::now());
        assert_eq!(resolution.identifier, "item");
        assert!(resolution.collided_with.is_none());
    }
}
