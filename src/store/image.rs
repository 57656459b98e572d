use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{Error, Result};

/// Metadata recorded for an uploaded image.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageRecord {
    /// Image identifier.
    pub id: String,
    /// Device the image belongs to. Not checked by the store.
    pub device_id: String,
    /// File extension including the dot, e.g. `.jpg`.
    pub image_type: String,
    /// Where the bytes were written.
    pub path: PathBuf,
}

/// Storage for uploaded device images.
#[tonic::async_trait]
pub trait ImageStore: Send + Sync {
    /// Persists `data` and returns the new image id.
    ///
    /// No size limit is applied here.
    async fn save(&self, device_id: &str, image_type: &str, data: &[u8]) -> Result<String>;

    /// Returns the metadata recorded for `image_id`.
    async fn find(&self, image_id: &str) -> Option<ImageRecord>;
}

/// Writes image bytes under a root folder and keeps their metadata in memory.
#[derive(Clone)]
pub struct DiskImageStore {
    folder: PathBuf,
    images: Arc<RwLock<HashMap<String, ImageRecord>>>,
}

impl DiskImageStore {
    /// Creates a store rooted at `folder`, creating the folder if needed.
    pub fn new(folder: impl Into<PathBuf>) -> Result<Self> {
        let folder = folder.into();
        std::fs::create_dir_all(&folder)?;

        Ok(Self {
            folder,
            images: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    /// Root folder the images are written to.
    pub fn folder(&self) -> &Path {
        &self.folder
    }
}

#[tonic::async_trait]
impl ImageStore for DiskImageStore {
    async fn save(&self, device_id: &str, image_type: &str, data: &[u8]) -> Result<String> {
        let image_id = Uuid::new_v4().to_string();
        let path = self.folder.join(format!("{image_id}{image_type}"));

        let mut file = File::create(&path)
            .await
            .map_err(|e| Error::Internal(format!("cannot create image file: {e}")))?;
        file.write_all(data)
            .await
            .map_err(|e| Error::Internal(format!("cannot write image to file: {e}")))?;
        file.flush()
            .await
            .map_err(|e| Error::Internal(format!("cannot write image to file: {e}")))?;

        // Bytes are on disk from here on; a failure below would leave the file behind.
        let mut images = self.images.write().await;
        images.insert(
            image_id.clone(),
            ImageRecord {
                id: image_id.clone(),
                device_id: device_id.to_string(),
                image_type: image_type.to_string(),
                path,
            },
        );

        Ok(image_id)
    }

    async fn find(&self, image_id: &str) -> Option<ImageRecord> {
        self.images.read().await.get(image_id).cloned()
    }
}
