use std::env;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use log::warn;
use minio::s3::{
    client::{Client, ClientBuilder},
    creds::StaticProvider,
    http::BaseUrl,
    segmented_bytes::SegmentedBytes,
    types::S3Api,
};
use uuid::Uuid;

pub type Storage = Arc<dyn FileStorage + Send + Sync>;

const BUCKET: &str = "campus-messenger";

/// Durable reference to an uploaded object.
#[derive(Clone, Debug)]
pub struct StoredFile {
    pub url: String,
    pub external_id: String,
}

/// Seam for the attachment uploader. Failures are per-call; the messaging
/// core treats them as non-fatal.
#[async_trait]
pub trait FileStorage {
    async fn upload(&self, data: Bytes, name: &str, folder: &str) -> super::Result<StoredFile>;
}

#[derive(Clone)]
pub struct S3 {
    client: Client,
    public_url: String,
}

#[async_trait]
impl FileStorage for S3 {
    async fn upload(&self, data: Bytes, name: &str, folder: &str) -> super::Result<StoredFile> {
        let external_id = format!("{folder}/{}_{name}", Uuid::new_v4());

        self.client
            .put_object(BUCKET, &external_id, SegmentedBytes::from(data))
            .send()
            .await?;

        Ok(StoredFile {
            url: format!("{}/{BUCKET}/{external_id}", self.public_url),
            external_id,
        })
    }
}

#[derive(Clone)]
struct Credentials {
    user: String,
    password: String,
}

impl Default for Credentials {
    fn default() -> Self {
        Self {
            user: String::from("minioadmin"),
            password: String::from("minioadmin"),
        }
    }
}

impl From<Credentials> for StaticProvider {
    fn from(c: Credentials) -> Self {
        Self::new(&c.user, &c.password, None)
    }
}

#[derive(Clone)]
pub struct Config {
    host: String,
    port: u16,
    credentials: Credentials,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: String::from("127.0.0.1"),
            port: 9000,
            credentials: Credentials::default(),
        }
    }
}

impl Config {
    pub fn env() -> Option<Self> {
        let host = env::var("MINIO_HOST").ok();
        let port = env::var("MINIO_PORT")
            .unwrap_or_else(|_| "9000".to_string())
            .parse()
            .ok();

        if let (Some(host), Some(port)) = (host, port) {
            let credentials = env::var("MINIO_USER")
                .and_then(|user| {
                    env::var("MINIO_PASSWORD").map(|password| Credentials { user, password })
                })
                .unwrap_or_default();

            Some(Self {
                host,
                port,
                credentials,
            })
        } else {
            warn!("MINIO env is not configured, attachments are disabled");
            None
        }
    }

    pub async fn connect(&self) -> super::Result<S3> {
        let public_url = format!("http://{}:{}", self.host, self.port);
        let base_url = format!("{public_url}/")
            .parse::<BaseUrl>()
            .unwrap_or_else(|e| panic!("Failed to connect to MINIO: {e}"));

        let provider = StaticProvider::from(self.credentials.clone());

        let client = ClientBuilder::new(base_url)
            .provider(Some(Box::new(provider)))
            .build()?;

        let exists = client.bucket_exists(BUCKET).send().await?.exists;

        if !exists {
            client.create_bucket(BUCKET).send().await?;
        }

        Ok(S3 { client, public_url })
    }
}
