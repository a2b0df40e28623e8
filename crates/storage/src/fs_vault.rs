//! Filesystem-backed `Vault` (C3): a directory of plain-text files, each
//! opening with a fenced `key: value` metadata block followed by a body
//! (§4.3, §6). Grounded in the legacy `srs_sync.py`'s frontmatter
//! regex/shape, reimplemented as straightforward string splitting since the
//! header format here is a fixed fence, not general YAML.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use accord_domain::{DomainError, NoteType, Vault, VaultMetadata};
use accord_domain::srs::VaultPatch;

const FENCE: &str = "---";

pub struct FsVault {
    root: PathBuf,
}

impl FsVault {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(path)
    }
}

/// Splits a file's contents into `(header_lines, body)`. Returns an empty
/// header when the file has no fenced block at all.
fn split_frontmatter(contents: &str) -> (Vec<String>, String) {
    let mut lines = contents.lines();
    match lines.next() {
        Some(first) if first.trim() == FENCE => {}
        _ => return (Vec::new(), contents.to_string()),
    }

    let mut header = Vec::new();
    let mut closed = false;
    let mut rest = String::new();
    for line in lines.by_ref() {
        if line.trim() == FENCE {
            closed = true;
            break;
        }
        header.push(line.to_string());
    }
    if !closed {
        // Malformed: no closing fence. Treat the whole thing as body.
        return (Vec::new(), contents.to_string());
    }
    for line in lines {
        rest.push_str(line);
        rest.push('\n');
    }
    (header, rest)
}

fn parse_metadata(lines: &[String]) -> VaultMetadata {
    let mut meta = VaultMetadata::default();
    for line in lines {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim();
        let value = value.trim();
        match key {
            "srs_enabled" => meta.srs_enabled = value == "true",
            "srs_next_review" => meta.srs_next_review = NaiveDate::parse_from_str(value, "%Y-%m-%d").ok(),
            "srs_last_review" => meta.srs_last_review = NaiveDate::parse_from_str(value, "%Y-%m-%d").ok(),
            "srs_interval" => meta.srs_interval = value.parse().ok(),
            "srs_ease_factor" => meta.srs_ease_factor = value.parse().ok(),
            "srs_repetitions" => meta.srs_repetitions = value.parse().ok(),
            "type" => {
                meta.note_type = Some(match value {
                    "trail" => NoteType::Trail,
                    "moc" => NoteType::Moc,
                    "other" => NoteType::Other,
                    _ => NoteType::Idea,
                })
            }
            "title" => meta.title = Some(value.to_string()),
            other => meta.unknown.push((other.to_string(), value.to_string())),
        }
    }
    meta
}

/// Re-renders the header lines with the patched SRS keys, preserving every
/// unrecognised key exactly. Dates written `YYYY-MM-DD`, booleans lowercase,
/// ease factor to two decimals (§6).
fn render_header(existing: &[String], patch: &VaultPatch) -> Vec<String> {
    let mut out = Vec::new();
    let mut seen = std::collections::HashSet::new();

    for line in existing {
        let Some((key, _)) = line.split_once(':') else {
            out.push(line.clone());
            continue;
        };
        let key = key.trim();
        match key {
            "srs_enabled" | "srs_next_review" | "srs_last_review" | "srs_interval"
            | "srs_ease_factor" | "srs_repetitions" => {
                seen.insert(key.to_string());
            }
            _ => out.push(line.clone()),
        }
    }

    out.push(format!("srs_enabled: {}", patch.srs_enabled));
    out.push(format!(
        "srs_next_review: {}",
        patch.srs_next_review.format("%Y-%m-%d")
    ));
    out.push(format!(
        "srs_last_review: {}",
        patch.srs_last_review.format("%Y-%m-%d")
    ));
    out.push(format!("srs_interval: {}", patch.srs_interval));
    out.push(format!("srs_ease_factor: {:.2}", patch.srs_ease_factor));
    out.push(format!("srs_repetitions: {}", patch.srs_repetitions));
    out
}

#[async_trait]
impl Vault for FsVault {
    async fn read(&self, path: &str) -> Result<(VaultMetadata, String), DomainError> {
        let full = self.resolve(path);
        let contents = fs::read_to_string(&full)
            .await
            .map_err(|e| DomainError::transient(format!("reading {path}: {e}")))?;
        let (header, body) = split_frontmatter(&contents);
        Ok((parse_metadata(&header), body))
    }

    async fn update_metadata(&self, path: &str, patch: &VaultPatch) -> Result<(), DomainError> {
        let full = self.resolve(path);
        let contents = fs::read_to_string(&full)
            .await
            .map_err(|e| DomainError::transient(format!("reading {path}: {e}")))?;
        let (header, body) = split_frontmatter(&contents);
        let new_header = render_header(&header, patch);

        let mut rendered = String::new();
        rendered.push_str(FENCE);
        rendered.push('\n');
        for line in &new_header {
            rendered.push_str(line);
            rendered.push('\n');
        }
        rendered.push_str(FENCE);
        rendered.push('\n');
        rendered.push_str(&body);

        atomic_write(&full, rendered.as_bytes()).await
    }

    async fn list_files(&self, dir: &str) -> Result<Vec<String>, DomainError> {
        let base = if dir.is_empty() {
            self.root.clone()
        } else {
            self.root.join(dir)
        };
        let mut out = Vec::new();
        walk(&base, &self.root, &mut out)
            .await
            .map_err(|e| DomainError::transient(format!("listing {dir}: {e}")))?;
        Ok(out)
    }
}

fn walk<'a>(
    dir: &'a Path,
    root: &'a Path,
    out: &'a mut Vec<String>,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = std::io::Result<()>> + Send + 'a>> {
    Box::pin(async move {
        let mut entries = fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.is_dir() {
                walk(&path, root, out).await?;
            } else if path.extension().is_some_and(|ext| ext == "md") {
                if let Ok(relative) = path.strip_prefix(root) {
                    out.push(relative.to_string_lossy().into_owned());
                }
            }
        }
        Ok(())
    })
}

/// Atomic rename-from-temp-file write: write to a sibling temp file, flush,
/// then rename over the target so readers never observe a partial write.
async fn atomic_write(path: &Path, contents: &[u8]) -> Result<(), DomainError> {
    let tmp_path = path.with_extension("tmp-write");
    let mut file = fs::File::create(&tmp_path)
        .await
        .map_err(|e| DomainError::transient(format!("creating temp file: {e}")))?;
    file.write_all(contents)
        .await
        .map_err(|e| DomainError::transient(format!("writing temp file: {e}")))?;
    file.flush()
        .await
        .map_err(|e| DomainError::transient(format!("flushing temp file: {e}")))?;
    drop(file);
    fs::rename(&tmp_path, path)
        .await
        .map_err(|e| DomainError::transient(format!("renaming into place: {e}")))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trip_preserves_body_and_unknown_keys() {
        let dir = tempfile_dir();
        let path = dir.join("note.md");
        tokio::fs::write(
            &path,
            "---\nsrs_enabled: true\nsrs_next_review: 2026-02-12\nsrs_last_review: 2026-02-05\nsrs_interval: 7\nsrs_ease_factor: 2.50\nsrs_repetitions: 2\ncustom_key: keep-me\n---\nBody text here.\n",
        )
        .await
        .unwrap();

        let vault = FsVault::new(&dir);
        let (meta, body) = vault.read("note.md").await.unwrap();
        assert_eq!(body, "Body text here.\n");
        assert_eq!(meta.unknown, vec![("custom_key".to_string(), "keep-me".to_string())]);

        let patch = VaultPatch {
            srs_enabled: true,
            srs_next_review: NaiveDate::from_ymd_opt(2026, 2, 15).unwrap(),
            srs_last_review: NaiveDate::from_ymd_opt(2026, 2, 12).unwrap(),
            srs_interval: 3,
            srs_ease_factor: 2.6,
            srs_repetitions: 3,
        };
        vault.update_metadata("note.md", &patch).await.unwrap();

        let (meta2, body2) = vault.read("note.md").await.unwrap();
        assert_eq!(body2, body);
        assert_eq!(meta2.srs_next_review, Some(patch.srs_next_review));
        assert_eq!(meta2.unknown, vec![("custom_key".to_string(), "keep-me".to_string())]);

        tokio::fs::remove_dir_all(&dir).await.ok();
    }

    fn tempfile_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("accord-vault-test-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }
}
