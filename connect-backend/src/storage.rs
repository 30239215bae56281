//! Object storage: path-addressed blobs with public URLs.
//!
//! Backs avatar and post-media uploads. Uploads are upserts; the public
//! URL is derivable from the path alone, so callers can compute it before
//! or after uploading, as the platform allows.

use std::collections::HashMap;

use tokio::sync::RwLock;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

pub struct ObjectStore {
    objects: RwLock<HashMap<String, StoredObject>>,
    base_url: String,
}

impl ObjectStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            objects: RwLock::new(HashMap::new()),
            base_url: base_url.into(),
        }
    }

    /// Store (or replace) an object and return its public URL.
    pub async fn upload(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> String {
        self.objects.write().await.insert(
            path.to_owned(),
            StoredObject {
                bytes,
                content_type: content_type.to_owned(),
            },
        );
        log::debug!("storage: uploaded {path}");
        self.public_url(path)
    }

    pub fn public_url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }

    pub async fn download(&self, path: &str) -> Option<StoredObject> {
        self.objects.read().await.get(path).cloned()
    }
}
