use std::sync::Arc;

use crate::config::{AppConfig, MediaBackend, StoreBackend};
use crate::media::{DiskStorage, MediaStorage, S3Storage};
use crate::store::{LocalStore, PgStore, Store};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub config: Arc<AppConfig>,
    pub media: Arc<dyn MediaStorage>,
}

impl AppState {
    pub async fn init(config: AppConfig) -> anyhow::Result<Self> {
        let config = Arc::new(config);

        let store = match &config.store {
            StoreBackend::Postgres { database_url } => {
                let pg = PgStore::connect(database_url).await?;
                pg.migrate().await?;
                tracing::info!("using postgres store");
                Arc::new(pg) as Arc<dyn Store>
            }
            StoreBackend::Local { path: Some(path) } => {
                Arc::new(LocalStore::open(path.clone()).await?) as Arc<dyn Store>
            }
            StoreBackend::Local { path: None } => {
                tracing::warn!("using in-memory store; data is lost on restart");
                Arc::new(LocalStore::in_memory()) as Arc<dyn Store>
            }
        };

        let media = match &config.media {
            MediaBackend::Disk { dir } => {
                Arc::new(DiskStorage::new(dir.clone(), &config.public_base_url))
                    as Arc<dyn MediaStorage>
            }
            MediaBackend::S3(s3) => Arc::new(S3Storage::new(s3).await?) as Arc<dyn MediaStorage>,
        };

        Ok(Self::from_parts(store, config, media))
    }

    pub fn from_parts(
        store: Arc<dyn Store>,
        config: Arc<AppConfig>,
        media: Arc<dyn MediaStorage>,
    ) -> Self {
        Self {
            store,
            config,
            media,
        }
    }

    /// In-memory store and a media sink that accepts everything.
    #[cfg(test)]
    pub fn fake() -> Self {
        use async_trait::async_trait;
        use bytes::Bytes;

        #[derive(Clone)]
        struct FakeMedia;
        #[async_trait]
        impl MediaStorage for FakeMedia {
            async fn put_object(&self, _k: &str, _b: Bytes, _ct: &str) -> anyhow::Result<()> {
                Ok(())
            }
            async fn delete_object(&self, _k: &str) -> anyhow::Result<()> {
                Ok(())
            }
            fn public_url(&self, k: &str) -> String {
                format!("https://fake.local/{}", k)
            }
            fn key_for_url(&self, url: &str) -> Option<String> {
                url.strip_prefix("https://fake.local/").map(str::to_string)
            }
        }

        Self::from_parts(
            Arc::new(LocalStore::in_memory()),
            Arc::new(AppConfig::for_tests()),
            Arc::new(FakeMedia),
        )
    }
}
