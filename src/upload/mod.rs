use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::info;

use crate::error::{AppError, AppResult};

/// Evidence attachments: images only.
const ALLOWED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];
const ALLOWED_CONTENT_TYPES: &[&str] = &["image/jpeg", "image/png"];

/// On-disk storage for customer evidence images, served back at a stable
/// public path under `/uploads`.
#[derive(Debug, Clone)]
pub struct UploadStore {
    dir: PathBuf,
}

impl UploadStore {
    pub async fn new(dir: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Store one image and return its public path. Both the file extension
    /// and the declared content type must be on the allow-list.
    pub async fn save_image(
        &self,
        file_name: &str,
        content_type: &str,
        bytes: &[u8],
    ) -> AppResult<String> {
        let extension = Path::new(file_name)
            .extension()
            .and_then(OsStr::to_str)
            .map(str::to_lowercase)
            .filter(|ext| ALLOWED_EXTENSIONS.contains(&ext.as_str()))
            .ok_or_else(|| AppError::Validation("Images only (jpg, jpeg, png).".to_string()))?;

        if !ALLOWED_CONTENT_TYPES.contains(&content_type) {
            return Err(AppError::Validation(
                "Images only (jpg, jpeg, png).".to_string(),
            ));
        }

        let stored_name = format!("image-{}.{}", Utc::now().timestamp_millis(), extension);
        tokio::fs::write(self.dir.join(&stored_name), bytes).await?;

        info!(file = %stored_name, size = bytes.len(), "Stored evidence image");
        Ok(format!("/uploads/{stored_name}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    async fn temp_store() -> UploadStore {
        let dir = std::env::temp_dir().join(format!("returns-uploads-{}", Uuid::new_v4()));
        UploadStore::new(dir).await.unwrap()
    }

    #[tokio::test]
    async fn stores_allowed_images_under_a_public_path() {
        let store = temp_store().await;
        let path = store
            .save_image("receipt.PNG", "image/png", b"not-really-a-png")
            .await
            .unwrap();

        assert!(path.starts_with("/uploads/image-"));
        assert!(path.ends_with(".png"));

        let on_disk = store.dir().join(path.trim_start_matches("/uploads/"));
        let contents = tokio::fs::read(on_disk).await.unwrap();
        assert_eq!(contents, b"not-really-a-png");
    }

    #[tokio::test]
    async fn rejects_disallowed_extensions() {
        let store = temp_store().await;
        let result = store.save_image("evil.gif", "image/png", b"gif").await;
        assert!(matches!(result, Err(AppError::Validation(_))));

        let result = store.save_image("no-extension", "image/png", b"x").await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn rejects_mismatched_content_types() {
        let store = temp_store().await;
        let result = store
            .save_image("receipt.png", "application/octet-stream", b"x")
            .await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }
}
