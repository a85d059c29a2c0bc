use std::path::PathBuf;

use anyhow::Context;
use async_trait::async_trait;
use aws_config::{defaults, BehaviorVersion};
use aws_credential_types::Credentials;
use aws_sdk_s3::{
    config::{Builder as S3ConfigBuilder, Region},
    Client,
};
use aws_smithy_types::byte_stream::ByteStream;
use bytes::Bytes;
use tracing::debug;
use uuid::Uuid;

use crate::config::S3Config;

/// Where uploaded images (game covers, site banners) end up.
#[async_trait]
pub trait MediaStorage: Send + Sync {
    async fn put_object(&self, key: &str, body: Bytes, content_type: &str) -> anyhow::Result<()>;
    async fn delete_object(&self, key: &str) -> anyhow::Result<()>;
    /// URL clients use to fetch the object.
    fn public_url(&self, key: &str) -> String;
    /// Inverse of `public_url`, for URLs this storage produced.
    fn key_for_url(&self, url: &str) -> Option<String>;
}

/// An uploaded file as received from a multipart form.
pub struct Upload {
    pub body: Bytes,
    pub content_type: String,
}

pub fn ext_from_mime(ct: &str) -> Option<&'static str> {
    match ct {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/gif" => Some("gif"),
        "image/webp" => Some("webp"),
        _ => None,
    }
}

/// Stores `upload` under `prefix/` and returns its public URL.
pub async fn store_image(
    storage: &dyn MediaStorage,
    prefix: &str,
    upload: Upload,
) -> anyhow::Result<String> {
    let ext = ext_from_mime(&upload.content_type)
        .ok_or_else(|| anyhow::anyhow!("unsupported image type {}", upload.content_type))?;
    let key = format!("{}/{}.{}", prefix, Uuid::new_v4(), ext);
    storage
        .put_object(&key, upload.body, &upload.content_type)
        .await
        .with_context(|| format!("put_object {}", key))?;
    Ok(storage.public_url(&key))
}

#[derive(Clone)]
pub struct S3Storage {
    client: Client,
    bucket: String,
    public_url: String,
}

impl S3Storage {
    pub async fn new(cfg: &S3Config) -> anyhow::Result<Self> {
        let shared = defaults(BehaviorVersion::latest())
            .region(Region::new(cfg.region.clone()))
            .credentials_provider(Credentials::new(
                &cfg.access_key,
                &cfg.secret_key,
                None,
                None,
                "static",
            ))
            .endpoint_url(&cfg.endpoint)
            .load()
            .await;

        let conf = S3ConfigBuilder::from(&shared)
            .endpoint_url(&cfg.endpoint)
            .force_path_style(true)
            .build();

        Ok(Self {
            client: Client::from_conf(conf),
            bucket: cfg.bucket.clone(),
            public_url: cfg.public_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl MediaStorage for S3Storage {
    async fn put_object(&self, key: &str, body: Bytes, content_type: &str) -> anyhow::Result<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(body))
            .content_type(content_type)
            .send()
            .await
            .context("s3 put_object")?;
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> anyhow::Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .context("s3 delete_object")?;
        Ok(())
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.public_url, key)
    }

    fn key_for_url(&self, url: &str) -> Option<String> {
        url.strip_prefix(&self.public_url)
            .and_then(|rest| rest.strip_prefix('/'))
            .map(str::to_string)
    }
}

/// Writes objects under a local directory served at `/uploads`.
#[derive(Clone)]
pub struct DiskStorage {
    root: PathBuf,
    base_url: String,
}

impl DiskStorage {
    pub fn new(root: PathBuf, public_base_url: &str) -> Self {
        Self {
            root,
            base_url: format!("{}/uploads", public_base_url.trim_end_matches('/')),
        }
    }

    #[cfg(test)]
    pub fn root(&self) -> &PathBuf {
        &self.root
    }

    fn path_for(&self, key: &str) -> anyhow::Result<PathBuf> {
        anyhow::ensure!(
            !key.split('/').any(|seg| seg.is_empty() || seg == "." || seg == ".."),
            "invalid object key {key:?}"
        );
        Ok(self.root.join(key))
    }
}

#[async_trait]
impl MediaStorage for DiskStorage {
    async fn put_object(&self, key: &str, body: Bytes, _content_type: &str) -> anyhow::Result<()> {
        let path = self.path_for(key)?;
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .with_context(|| format!("create {}", dir.display()))?;
        }
        tokio::fs::write(&path, &body)
            .await
            .with_context(|| format!("write {}", path.display()))?;
        debug!(key, bytes = body.len(), "stored upload on disk");
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> anyhow::Result<()> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("remove {}", path.display())),
        }
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.base_url, key)
    }

    fn key_for_url(&self, url: &str) -> Option<String> {
        url.strip_prefix(&self.base_url)
            .and_then(|rest| rest.strip_prefix('/'))
            .map(str::to_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ext_from_mime() {
        assert_eq!(ext_from_mime("image/jpeg"), Some("jpg"));
        assert_eq!(ext_from_mime("image/jpg"), Some("jpg"));
        assert_eq!(ext_from_mime("image/png"), Some("png"));
        assert_eq!(ext_from_mime("image/gif"), Some("gif"));
        assert_eq!(ext_from_mime("image/webp"), Some("webp"));
        assert_eq!(ext_from_mime("application/octet-stream"), None);
    }

    #[tokio::test]
    async fn disk_storage_roundtrip_and_url_mapping() {
        let dir = tempfile::tempdir().unwrap();
        let storage = DiskStorage::new(dir.path().to_path_buf(), "http://localhost:8080/");

        let url = store_image(
            &storage,
            "games",
            Upload {
                body: Bytes::from_static(b"\x89PNG"),
                content_type: "image/png".into(),
            },
        )
        .await
        .unwrap();
        assert!(url.starts_with("http://localhost:8080/uploads/games/"));
        assert!(url.ends_with(".png"));

        let key = storage.key_for_url(&url).expect("own url maps back");
        assert!(storage.root().join(&key).exists());

        storage.delete_object(&key).await.unwrap();
        assert!(!storage.root().join(&key).exists());
        // deleting twice is fine
        storage.delete_object(&key).await.unwrap();

        assert!(storage.key_for_url("https://picsum.photos/seed/x/640/360").is_none());
    }

    #[tokio::test]
    async fn disk_storage_rejects_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let storage = DiskStorage::new(dir.path().to_path_buf(), "http://localhost");
        let err = storage
            .put_object("../escape.png", Bytes::from_static(b"x"), "image/png")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("invalid object key"));
    }

    #[tokio::test]
    async fn store_image_rejects_non_images() {
        let dir = tempfile::tempdir().unwrap();
        let storage = DiskStorage::new(dir.path().to_path_buf(), "http://localhost");
        let err = store_image(
            &storage,
            "games",
            Upload {
                body: Bytes::from_static(b"%PDF"),
                content_type: "application/pdf".into(),
            },
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("unsupported image type"));
    }
}
