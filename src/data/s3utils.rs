use std::{path::Path, time::Duration};

use async_trait::async_trait;
use rand::RngCore;
use s3::{Bucket, Region, creds::Credentials};
use url::Url;

use crate::{config::Config, data::encode::AspectRatio, error::Error, model::Video};

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Uploads the file at `source` as a new object under `key`.
    async fn put_object(&self, key: &str, source: &Path, content_type: &str)
    -> Result<(), Error>;

    /// Creates a URL granting read access to the object for the given duration.
    fn presign_get(&self, key: &str, expiry: Duration) -> Result<String, Error>;
}

pub struct S3ObjectStore {
    bucket: Bucket,
}

impl S3ObjectStore {
    pub fn new(bucket: Bucket) -> Self {
        Self { bucket }
    }

    pub fn from_config(config: &Config) -> Result<Self, Error> {
        let bucket = create_bucket(
            &config.s3_bucket,
            &config.s3_region,
            config.s3_endpoint.as_deref(),
            &config.s3_access_key,
            &config.s3_secret_key,
        )?;

        Ok(Self::new(bucket))
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn put_object(
        &self,
        key: &str,
        source: &Path,
        content_type: &str,
    ) -> Result<(), Error> {
        let mut file = tokio::fs::File::open(source)
            .await
            .map_err(|e| Error::IoError(format!("Failed to open {}: {e}", source.display())))?;

        log::info!("Starting S3 upload for {}", key);
        let now = std::time::Instant::now();
        let status = self
            .bucket
            .put_object_stream_with_content_type(&mut file, key, content_type)
            .await?;
        if status >= 300 {
            return Err(Error::S3ResponseError(status));
        }
        log::info!("Finished S3 upload for {} after {:?}", key, now.elapsed());

        Ok(())
    }

    fn presign_get(&self, key: &str, expiry: Duration) -> Result<String, Error> {
        let expiry_secs = u32::try_from(expiry.as_secs()).unwrap_or(u32::MAX);
        Ok(self.bucket.presign_get(key, expiry_secs, None)?)
    }
}

/// Creates the bucket handle for an AWS region, or for a custom S3-compatible endpoint
/// using path style addressing.
pub fn create_bucket(
    bucket_name: &str,
    region: &str,
    endpoint: Option<&str>,
    access_key: &str,
    secret_key: &str,
) -> Result<Bucket, Error> {
    let region = match endpoint {
        Some(endpoint) => Ok(Region::Custom {
            region: String::from(region),
            endpoint: String::from(endpoint),
        }),
        None => region
            .parse::<Region>()
            .map_err(|e| Error::ConfigError(format!("Invalid S3 region '{region}': {e}"))),
    }?;

    let credentials = Credentials {
        access_key: Some(String::from(access_key)),
        secret_key: Some(String::from(secret_key)),
        security_token: None,
        session_token: None,
        expiration: None,
    };

    Bucket::new(bucket_name, region, credentials)
        .map_err(|e| Error::ConfigError(format!("Invalid bucket '{bucket_name}': {e}")))
        .map(|b| {
            if endpoint.is_some() {
                b.with_path_style()
            } else {
                b
            }
        })
}

/// Returns a key of the form `<aspect prefix>/<random id>.<extension>`. The id is 32
/// random bytes encoded as unpadded url-safe base64.
pub fn generate_object_key(aspect_ratio: AspectRatio, extension: &str) -> String {
    let mut key = [0u8; 32];
    rand::rng().fill_bytes(&mut key);
    let file_name = data_encoding::BASE64URL_NOPAD.encode(&key);
    format!("{}/{}.{}", aspect_ratio.key_prefix(), file_name, extension)
}

/// Replaces the video's `video_url` with a presigned URL if it references an object
/// served by the distribution. Other URLs are returned unchanged.
pub fn sign_video(
    object_store: &dyn ObjectStore,
    distribution: &Url,
    expiry: Duration,
    mut video: Video,
) -> Result<Video, Error> {
    let key = match video
        .video_url
        .as_deref()
        .and_then(|url| object_key_for_url(distribution, url))
    {
        Some(key) => key,
        None => return Ok(video),
    };

    video.video_url = Some(object_store.presign_get(&key, expiry)?);
    Ok(video)
}

fn object_key_for_url(distribution: &Url, url: &str) -> Option<String> {
    let base = distribution.as_str().trim_end_matches('/');
    url.strip_prefix(base)
        .and_then(|rest| rest.strip_prefix('/'))
        .filter(|key| !key.is_empty())
        .map(String::from)
}
