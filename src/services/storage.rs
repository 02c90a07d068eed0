//! Filesystem document store.
//!
//! Layout under the upload root:
//! - `{deal_id}/{unix_millis}-{original name}` for uploaded files
//! - `text-documents/{deal_id}/{type label}-{timestamp}.txt` for pasted text

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use std::path::{Path, PathBuf};

const TEXT_DOCUMENTS_DIR: &str = "text-documents";

/// A file written to the store.
#[derive(Debug, Clone)]
pub struct StoredFile {
    pub filename: String,
    pub path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct DocumentStorage {
    root: PathBuf,
}

impl DocumentStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Persist uploaded bytes for a deal.
    pub async fn save_upload(
        &self,
        deal_id: i32,
        original_name: &str,
        bytes: &[u8],
    ) -> Result<StoredFile> {
        let dir = self.root.join(deal_id.to_string());
        let filename = format!(
            "{}-{}",
            Utc::now().timestamp_millis(),
            sanitize_filename(original_name)
        );
        write_file(&dir, &filename, bytes).await
    }

    /// Persist pasted text for a deal.
    pub async fn save_text(&self, deal_id: i32, type_label: &str, text: &str) -> Result<StoredFile> {
        let dir = self.root.join(TEXT_DOCUMENTS_DIR).join(deal_id.to_string());
        let filename = text_document_filename(type_label, Utc::now());
        write_file(&dir, &filename, text.as_bytes()).await
    }

    /// Read a stored document as UTF-8 text.
    pub async fn read_text(&self, path: impl AsRef<Path>) -> Result<String> {
        let path = path.as_ref();
        tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read document {}", path.display()))
    }

    /// Remove one stored file.
    pub async fn remove_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        tokio::fs::remove_file(path)
            .await
            .with_context(|| format!("Failed to remove {}", path.display()))
    }

    /// Remove every file stored for a deal. Missing directories are fine.
    pub async fn remove_deal(&self, deal_id: i32) -> Result<()> {
        for dir in [
            self.root.join(deal_id.to_string()),
            self.root.join(TEXT_DOCUMENTS_DIR).join(deal_id.to_string()),
        ] {
            match tokio::fs::remove_dir_all(&dir).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(e).with_context(|| format!("Failed to remove {}", dir.display()))
                }
            }
        }
        Ok(())
    }
}

async fn write_file(dir: &Path, filename: &str, bytes: &[u8]) -> Result<StoredFile> {
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("Failed to create {}", dir.display()))?;

    let path = dir.join(filename);
    tokio::fs::write(&path, bytes)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;

    tracing::debug!(path = %path.display(), bytes = bytes.len(), "Document stored");

    Ok(StoredFile {
        filename: filename.to_string(),
        path,
    })
}

/// `{label}-{timestamp}.txt`, label with whitespace runs turned into `-`.
pub fn text_document_filename(type_label: &str, now: DateTime<Utc>) -> String {
    format!("{}-{}.txt", sanitize_label(type_label), timestamp_slug(now))
}

/// ISO-8601 UTC with millisecond precision, `:` and `.` replaced by `-`.
pub fn timestamp_slug(now: DateTime<Utc>) -> String {
    now.to_rfc3339_opts(SecondsFormat::Millis, true)
        .replace([':', '.'], "-")
}

/// Collapse whitespace into `-` and drop anything that could escape the directory.
pub fn sanitize_label(label: &str) -> String {
    let joined = label.split_whitespace().collect::<Vec<_>>().join("-");
    let cleaned: String = joined
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, '-' | '_' | '&'))
        .collect();
    if cleaned.is_empty() {
        "document".to_string()
    } else {
        cleaned
    }
}

/// Keep the original name readable while stripping directory components.
pub fn sanitize_filename(name: &str) -> String {
    let base = name
        .rsplit(|c: char| c == '/' || c == '\\')
        .next()
        .unwrap_or_default()
        .trim();
    let cleaned: String = base
        .chars()
        .map(|c| if c.is_control() { '_' } else { c })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn timestamp_slug_replaces_colons_and_periods() {
        let now = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap()
            + chrono::Duration::milliseconds(123);
        assert_eq!(timestamp_slug(now), "2024-03-09T14-05-07-123Z");
        assert_eq!(
            text_document_filename("rent roll", now),
            "rent-roll-2024-03-09T14-05-07-123Z.txt"
        );
    }

    #[test]
    fn labels_cannot_escape_the_directory() {
        assert_eq!(sanitize_label("../../etc passwd"), "etc-passwd");
        assert_eq!(sanitize_label("   "), "document");
        assert_eq!(sanitize_label("P&L  statement"), "P&L-statement");
    }

    #[test]
    fn filenames_lose_directory_components() {
        assert_eq!(sanitize_filename("../../secret.txt"), "secret.txt");
        assert_eq!(sanitize_filename("C:\\Users\\me\\Rent Roll.pdf"), "Rent Roll.pdf");
        assert_eq!(sanitize_filename(".."), "upload");
        assert_eq!(sanitize_filename(""), "upload");
    }

    #[tokio::test]
    async fn saves_and_reads_text_documents() {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = DocumentStorage::new(dir.path());

        let stored = storage
            .save_text(7, "rent roll", "Unit 1A | $1,250 | occupied")
            .await
            .expect("save should succeed");

        assert!(stored.filename.starts_with("rent-roll-"));
        assert!(stored.filename.ends_with(".txt"));
        assert!(stored.path.starts_with(dir.path().join("text-documents").join("7")));

        let text = storage.read_text(&stored.path).await.expect("read");
        assert_eq!(text, "Unit 1A | $1,250 | occupied");
    }

    #[tokio::test]
    async fn uploads_are_partitioned_by_deal() {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = DocumentStorage::new(dir.path());

        let stored = storage
            .save_upload(3, "T12.pdf", b"%PDF-1.7")
            .await
            .expect("save should succeed");

        assert!(stored.path.starts_with(dir.path().join("3")));
        assert!(stored.filename.ends_with("-T12.pdf"));
        assert_eq!(std::fs::read(&stored.path).unwrap(), b"%PDF-1.7");
    }

    #[tokio::test]
    async fn remove_deal_clears_both_trees_and_tolerates_missing_dirs() {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = DocumentStorage::new(dir.path());

        let upload = storage.save_upload(4, "a.pdf", b"a").await.unwrap();
        let text = storage.save_text(4, "lease", "b").await.unwrap();

        storage.remove_deal(4).await.expect("remove");
        assert!(!upload.path.exists());
        assert!(!text.path.exists());

        storage.remove_deal(99).await.expect("missing deal is not an error");
    }

    #[tokio::test]
    async fn reading_a_missing_file_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = DocumentStorage::new(dir.path());
        assert!(storage.read_text(dir.path().join("nope.txt")).await.is_err());
    }
}
