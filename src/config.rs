use std::path::PathBuf;

use anyhow::Context;

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
}

/// Which persistence backend the process runs against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres { database_url: String },
    Local { path: Option<PathBuf> },
}

#[derive(Debug, Clone)]
pub struct S3Config {
    pub endpoint: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    pub region: String,
    /// Base URL objects are publicly reachable under.
    pub public_url: String,
}

#[derive(Debug, Clone)]
pub enum MediaBackend {
    Disk { dir: PathBuf },
    S3(S3Config),
}

#[derive(Debug, Clone)]
pub struct AdminSeed {
    pub email: String,
    pub password: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub store: StoreBackend,
    pub jwt: JwtConfig,
    pub media: MediaBackend,
    pub public_base_url: String,
    pub max_upload_bytes: usize,
    pub admin: AdminSeed,
}

const DEFAULT_TTL_MINUTES: i64 = 60 * 24 * 7;
const DEFAULT_MAX_UPLOAD_BYTES: usize = 5 * 1024 * 1024;

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let store = match env_or("STORE_BACKEND", "postgres").as_str() {
            "postgres" => StoreBackend::Postgres {
                database_url: std::env::var("DATABASE_URL")
                    .context("DATABASE_URL is required for the postgres backend")?,
            },
            "local" => StoreBackend::Local {
                path: Some(PathBuf::from(env_or("LOCAL_STORE_PATH", "./data/store.json"))),
            },
            other => anyhow::bail!("unknown STORE_BACKEND {other:?} (expected postgres or local)"),
        };

        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET").context("JWT_SECRET is required")?,
            issuer: env_or("JWT_ISSUER", "gamereviews"),
            audience: env_or("JWT_AUDIENCE", "gamereviews-users"),
            ttl_minutes: std::env::var("JWT_TTL_MINUTES")
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(DEFAULT_TTL_MINUTES),
        };

        let port = env_or("APP_PORT", "8080");
        let public_base_url = std::env::var("PUBLIC_BASE_URL")
            .unwrap_or_else(|_| format!("http://localhost:{port}"));

        let media = match env_or("MEDIA_BACKEND", "disk").as_str() {
            "disk" => MediaBackend::Disk {
                dir: PathBuf::from(env_or("UPLOAD_DIR", "./uploads")),
            },
            "s3" => {
                let endpoint = std::env::var("MINIO_ENDPOINT").context("MINIO_ENDPOINT")?;
                let bucket = std::env::var("MINIO_BUCKET").context("MINIO_BUCKET")?;
                let public_url = std::env::var("MINIO_PUBLIC_URL")
                    .unwrap_or_else(|_| format!("{}/{}", endpoint.trim_end_matches('/'), bucket));
                MediaBackend::S3(S3Config {
                    endpoint,
                    bucket,
                    access_key: std::env::var("MINIO_ACCESS_KEY").context("MINIO_ACCESS_KEY")?,
                    secret_key: std::env::var("MINIO_SECRET_KEY").context("MINIO_SECRET_KEY")?,
                    region: env_or("MINIO_REGION", "us-east-1"),
                    public_url,
                })
            }
            other => anyhow::bail!("unknown MEDIA_BACKEND {other:?} (expected disk or s3)"),
        };

        let max_upload_bytes = std::env::var("MAX_UPLOAD_BYTES")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(DEFAULT_MAX_UPLOAD_BYTES);

        let admin = AdminSeed {
            email: env_or("ADMIN_EMAIL", "admin@example.com"),
            password: std::env::var("ADMIN_PASSWORD").ok().filter(|p| !p.is_empty()),
        };

        Ok(Self {
            store,
            jwt,
            media,
            public_base_url,
            max_upload_bytes,
            admin,
        })
    }

    /// Config used by unit tests: in-memory store, throwaway secrets.
    #[cfg(test)]
    pub fn for_tests() -> Self {
        Self {
            store: StoreBackend::Local { path: None },
            jwt: JwtConfig {
                secret: "test-secret".into(),
                issuer: "test-issuer".into(),
                audience: "test-aud".into(),
                ttl_minutes: 5,
            },
            media: MediaBackend::Disk {
                dir: std::env::temp_dir().join("gamereviews-test-uploads"),
            },
            public_base_url: "http://localhost:8080".into(),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            admin: AdminSeed {
                email: "admin@example.com".into(),
                password: Some("admin123".into()),
            },
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
