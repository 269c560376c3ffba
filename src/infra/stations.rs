use anyhow::{Context, Result};
use async_trait::async_trait;
use station_tracker::catalog::{StationCatalog, parse_stations};
use station_tracker::ranker::Station;

/// Station list stored as a JSON array in an S3 object, in the same format
/// [`station_tracker::catalog::FileStationCatalog`] reads from disk.
pub struct S3StationCatalog {
    client: aws_sdk_s3::Client,
    bucket: String,
    key: String,
}

impl S3StationCatalog {
    pub fn new(client: aws_sdk_s3::Client, bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
            key: key.into(),
        }
    }
}

#[async_trait]
impl StationCatalog for S3StationCatalog {
    #[tracing::instrument(skip(self), fields(bucket = %self.bucket, key = %self.key))]
    async fn active_stations(&self) -> Result<Vec<Station>> {
        let object = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&self.key)
            .send()
            .await
            .with_context(|| format!("fetching s3://{}/{}", self.bucket, self.key))?;

        let bytes = object
            .body
            .collect()
            .await
            .context("reading station object body")?
            .into_bytes();

        parse_stations(&bytes)
    }
}
