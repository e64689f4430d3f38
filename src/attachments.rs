//! Attachment storage — durable files on disk, addressable by path.

use std::path::PathBuf;

use rand::Rng;
use rand::distributions::Alphanumeric;
use tracing::debug;

use crate::error::StorageError;
use crate::store::AttachmentRef;

/// Length of the random filename prefix.
const ID_LEN: usize = 12;

/// File storage for inbound email attachments.
///
/// Filenames are collision-resistant: a random alphanumeric id joined to the
/// sanitized original name, so concurrent writes need no coordination.
pub struct AttachmentStore {
    root: PathBuf,
}

impl AttachmentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Persist one attachment. Returns the descriptor recorded on the
    /// communication row.
    pub async fn save(
        &self,
        original_name: &str,
        mime_type: &str,
        bytes: &[u8],
    ) -> Result<AttachmentRef, StorageError> {
        let id: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(ID_LEN)
            .map(char::from)
            .collect::<String>()
            .to_lowercase();
        let filename = format!("{id}-{}", sanitize_filename(original_name));
        let path = self.root.join(&filename);

        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| StorageError::Write {
                path: self.root.display().to_string(),
                source: e,
            })?;
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| StorageError::Write {
                path: path.display().to_string(),
                source: e,
            })?;

        debug!(filename = %filename, size = bytes.len(), "Attachment saved");

        Ok(AttachmentRef {
            filename,
            storage_path: path.display().to_string(),
            mime_type: mime_type.to_string(),
            size_bytes: bytes.len() as u64,
        })
    }
}

/// Sanitize an attachment filename: keep only `[A-Za-z0-9.-]`.
///
/// Falls back to `attachment` when nothing survives (e.g. an all-CJK name).
pub fn sanitize_filename(name: &str) -> String {
    let kept: String = name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '.' || *c == '-')
        .collect();
    if kept.is_empty() {
        "attachment".to_string()
    } else {
        kept
    }
}
