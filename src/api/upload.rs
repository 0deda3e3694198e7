//! File upload handling
//!
//! Stores avatar and thumbnail images sent as multipart fields. The field is
//! streamed to disk chunk by chunk while its size is counted, so the size
//! limit applies to the bytes actually received rather than any declared
//! length. A rejected upload leaves nothing behind.
//!
//! Files land in `<upload root>/<folder>/<millis>-<id>-<name>` and are
//! referenced by the relative path `uploads/<folder>/<file>`, which is also
//! the URL they are served under.

use axum::extract::multipart::Field;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::api::middleware::ApiError;
use crate::config::UploadConfig;

/// URL prefix under which the upload root is served
pub const UPLOADS_URL_PREFIX: &str = "uploads";

/// Upload destination
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadFolder {
    Avatar,
    Post,
}

impl UploadFolder {
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadFolder::Avatar => "avatar",
            UploadFolder::Post => "post",
        }
    }
}

/// A file written to the upload root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    /// Path stored in the database, e.g. `uploads/post/1700000000000-1a2b3c4d-a.png`
    pub relative_path: String,
    /// Location on disk
    pub disk_path: PathBuf,
    pub size: u64,
}

/// Stream a multipart file field into `folder`.
///
/// # Errors
///
/// `BAD_REQUEST` when the field has no filename, the extension is not
/// allowed, the body exceeds `max_file_size`, or the stream breaks.
pub async fn store_field(
    config: &UploadConfig,
    folder: UploadFolder,
    mut field: Field<'_>,
) -> Result<StoredFile, ApiError> {
    let original = field
        .file_name()
        .map(str::to_string)
        .filter(|name| !name.is_empty())
        .ok_or_else(|| ApiError::bad_request("Uploaded field is not a file"))?;

    if !config.is_extension_allowed(&original) {
        return Err(ApiError::with_details(
            "BAD_REQUEST",
            format!("Invalid file type: {}", original),
            serde_json::json!({ "allowed_extensions": config.allowed_extensions }),
        ));
    }

    let dir = config.path.join(folder.as_str());
    ensure_upload_dir(&dir).await?;

    let filename = generate_filename(&original);
    let disk_path = dir.join(&filename);

    let mut file = fs::File::create(&disk_path).await.map_err(|e| {
        tracing::error!("Failed to create {}: {}", disk_path.display(), e);
        ApiError::internal_error("Failed to save file")
    })?;

    let mut size: u64 = 0;
    let outcome: Result<(), ApiError> = async {
        loop {
            let chunk = match field.chunk().await {
                Ok(Some(chunk)) => chunk,
                Ok(None) => break,
                Err(e) => {
                    return Err(ApiError::bad_request(format!("Failed to read file: {}", e)));
                }
            };

            size += chunk.len() as u64;
            if size > config.max_file_size {
                return Err(ApiError::with_details(
                    "BAD_REQUEST",
                    format!("File too large. Maximum size: {} MB", config.max_file_size / 1024 / 1024),
                    serde_json::json!({ "max_file_size": config.max_file_size }),
                ));
            }

            file.write_all(&chunk).await.map_err(|e| {
                tracing::error!("Failed to write {}: {}", disk_path.display(), e);
                ApiError::internal_error("Failed to save file")
            })?;
        }

        file.flush().await.map_err(|e| {
            tracing::error!("Failed to flush {}: {}", disk_path.display(), e);
            ApiError::internal_error("Failed to save file")
        })
    }
    .await;

    drop(file);

    if let Err(e) = outcome {
        remove_quietly(&disk_path).await;
        return Err(e);
    }

    tracing::debug!(path = %disk_path.display(), size, "Stored upload");

    Ok(StoredFile {
        relative_path: format!("{}/{}/{}", UPLOADS_URL_PREFIX, folder.as_str(), filename),
        disk_path,
        size,
    })
}

/// Remove a stored file whose owning write failed
pub async fn discard(stored: &StoredFile) {
    remove_quietly(&stored.disk_path).await;
}

async fn remove_quietly(path: &Path) {
    if let Err(e) = fs::remove_file(path).await {
        tracing::warn!("Failed to remove {}: {}", path.display(), e);
    }
}

/// Ensure upload directory exists
async fn ensure_upload_dir(path: &Path) -> Result<(), ApiError> {
    fs::create_dir_all(path).await.map_err(|e| {
        tracing::error!("Failed to create upload dir {}: {}", path.display(), e);
        ApiError::internal_error("Failed to create upload directory")
    })
}

/// `{unix_millis}-{8 hex chars}-{sanitized original name}`
pub fn generate_filename(original: &str) -> String {
    let millis = chrono::Utc::now().timestamp_millis();
    let id = Uuid::new_v4().simple().to_string();
    format!("{}-{}-{}", millis, &id[..8], sanitize_filename(original))
}

/// Keep only the final path component and replace anything outside
/// `[A-Za-z0-9._-]` with `_`.
pub fn sanitize_filename(original: &str) -> String {
    let base = original
        .rsplit(|c: char| c == '/' || c == '\\')
        .next()
        .unwrap_or(original);

    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();

    // Never produce a hidden or relative name.
    let trimmed = cleaned.trim_start_matches('.');
    if trimmed.is_empty() {
        "file".to_string()
    } else {
        trimmed.to_string()
    }
}


#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn sanitized_names_are_safe(name in ".{0,64}") {
            let clean = sanitize_filename(&name);
            prop_assert!(!clean.is_empty());
            prop_assert!(!clean.starts_with('.'));
            prop_assert!(clean
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')));
        }
    }
}
