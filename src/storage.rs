use anyhow::Context;
use aws_config::{defaults, BehaviorVersion};
use aws_credential_types::Credentials;
use aws_sdk_s3::{
    config::{Builder as S3ConfigBuilder, Region},
    Client,
};
use aws_smithy_types::byte_stream::ByteStream;
use axum::async_trait;
use bytes::Bytes;

use crate::config::MinioConfig;

#[async_trait]
pub trait StorageClient: Send + Sync {
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        content_type: &str,
    ) -> anyhow::Result<()>;

    /// Public URL of an uploaded object, stored on the user as their avatar.
    fn object_url(&self, bucket: &str, key: &str) -> String;
}

#[derive(Clone)]
pub struct Storage {
    client: Client,
    endpoint: String,
}

impl Storage {
    pub async fn new(cfg: &MinioConfig) -> anyhow::Result<Self> {
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
            endpoint: cfg.endpoint.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl StorageClient for Storage {
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        content_type: &str,
    ) -> anyhow::Result<()> {
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(body))
            .content_type(content_type)
            .send()
            .await
            .with_context(|| format!("s3 put_object {bucket}/{key}"))?;
        Ok(())
    }

    fn object_url(&self, bucket: &str, key: &str) -> String {
        format!("{}/{}/{}", self.endpoint, bucket, key)
    }
}

pub(crate) fn ext_from_mime(ct: &str) -> Option<&'static str> {
    match ct {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/webp" => Some("webp"),
        _ => None,
    }
}

#[cfg(test)]
pub(crate) mod fake {
    use std::sync::Mutex;

    use super::*;

    /// Records uploads instead of talking to S3.
    #[derive(Default)]
    pub struct FakeStorage {
        pub uploads: Mutex<Vec<(String, String, usize, String)>>,
    }

    #[async_trait]
    impl StorageClient for FakeStorage {
        async fn put_object(
            &self,
            bucket: &str,
            key: &str,
            body: Bytes,
            content_type: &str,
        ) -> anyhow::Result<()> {
            self.uploads.lock().unwrap().push((
                bucket.to_string(),
                key.to_string(),
                body.len(),
                content_type.to_string(),
            ));
            Ok(())
        }

        fn object_url(&self, bucket: &str, key: &str) -> String {
            format!("http://fake.local/{bucket}/{key}")
        }
    }
}
