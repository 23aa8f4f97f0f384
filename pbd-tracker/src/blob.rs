//! Evidence blob store
//!
//! Uploaded photos and evidence images live in the `uploads/` directory
//! under the root folder and are served at `/uploads/<name>`. Rows only hold
//! the URL string.
//!
//! Writes follow stage → commit → confirm:
//! 1. [`EvidenceStore::stage`] writes the file and returns a [`StagedBlob`]
//! 2. the caller commits the row(s) referencing [`StagedBlob::url`]
//! 3. the caller calls [`StagedBlob::commit`]
//!
//! A `StagedBlob` dropped without `commit` deletes its file, so any early
//! return between staging and the row commit compensates automatically.
//! Files left behind by a crash are removed by [`EvidenceStore::sweep_orphans`].

use sqlx::SqlitePool;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// URL prefix under which stored files are served
pub const URL_PREFIX: &str = "/uploads/";

const MAX_NAME_CHARS: usize = 64;

/// Directory-backed store for uploaded files
#[derive(Debug, Clone)]
pub struct EvidenceStore {
    dir: PathBuf,
}

impl EvidenceStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write `data` under a collision-resistant name
    ///
    /// Name layout: `<unix-millis>-<8 hex>-<sanitized original name>`.
    pub async fn stage(&self, original_name: &str, data: &[u8]) -> std::io::Result<StagedBlob> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let millis = chrono::Utc::now().timestamp_millis();
        let random = Uuid::new_v4().simple().to_string();
        let file_name = format!(
            "{}-{}-{}",
            millis,
            &random[..8],
            sanitize_file_name(original_name)
        );
        let path = self.dir.join(&file_name);

        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await?;

        // From here on the guard owns the path; a failed write removes it
        let staged = StagedBlob {
            path,
            url: format!("{}{}", URL_PREFIX, file_name),
            committed: false,
        };

        file.write_all(data).await?;
        file.sync_all().await?;

        debug!(url = %staged.url, bytes = data.len(), "Staged upload");
        Ok(staged)
    }

    /// Remove the file behind a stored URL (best effort)
    ///
    /// URLs that do not point into this store are ignored.
    pub async fn delete_url(&self, url: &str) {
        let Some(name) = file_name_from_url(url) else {
            debug!(url, "Not a stored upload URL, nothing to delete");
            return;
        };

        match tokio::fs::remove_file(self.dir.join(name)).await {
            Ok(()) => debug!(url, "Deleted upload"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(url, "Failed to delete upload: {}", e),
        }
    }

    /// Delete files no row references
    ///
    /// Files modified within `grace` are kept so in-flight requests are
    /// never raced. Returns the number of files removed.
    pub async fn sweep_orphans(
        &self,
        pool: &SqlitePool,
        grace: Duration,
    ) -> pbd_common::Result<usize> {
        let referenced: HashSet<String> = sqlx::query_scalar::<_, String>(
            "SELECT photo_url FROM students WHERE photo_url IS NOT NULL
             UNION
             SELECT evidence_url FROM assessments WHERE evidence_url IS NOT NULL",
        )
        .fetch_all(pool)
        .await?
        .iter()
        .filter_map(|url| file_name_from_url(url).map(str::to_string))
        .collect();

        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let now = SystemTime::now();
        let mut removed = 0;

        while let Some(entry) = entries.next_entry().await? {
            let metadata = entry.metadata().await?;
            if !metadata.is_file() {
                continue;
            }

            let name = entry.file_name().to_string_lossy().into_owned();
            if referenced.contains(&name) {
                continue;
            }

            let age = metadata
                .modified()
                .ok()
                .and_then(|modified| now.duration_since(modified).ok())
                .unwrap_or_default();
            if age < grace {
                continue;
            }

            match tokio::fs::remove_file(entry.path()).await {
                Ok(()) => {
                    info!(file = %name, "Removed orphaned upload");
                    removed += 1;
                }
                Err(e) => warn!(file = %name, "Failed to remove orphaned upload: {}", e),
            }
        }

        Ok(removed)
    }
}

/// A written file whose referencing row is not yet committed
///
/// Deletes the file on drop unless [`StagedBlob::commit`] was called.
#[derive(Debug)]
pub struct StagedBlob {
    path: PathBuf,
    url: String,
    committed: bool,
}

impl StagedBlob {
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Confirm the file: the referencing row is durable
    pub fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for StagedBlob {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(url = %self.url, "Discarded staged upload"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(url = %self.url, "Failed to discard staged upload: {}", e),
        }
    }
}

/// Reduce a client-supplied file name to a safe single path component
///
/// Keeps ASCII letters, digits, `.`, `-` and `_`; everything else becomes `_`.
pub fn sanitize_file_name(original: &str) -> String {
    let base = original
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();

    let cleaned: String = base
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '_' })
        .take(MAX_NAME_CHARS)
        .collect();

    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned.to_string()
    }
}

fn file_name_from_url(url: &str) -> Option<&str> {
    let name = url.strip_prefix(URL_PREFIX)?;
    let valid = !name.is_empty() && !name.contains(['/', '\\']) && name != "." && name != "..";
    valid.then_some(name)
}
