use std::{path::PathBuf, str::FromStr, time::Duration};

use url::Url;

use crate::error::Error;

pub const DEFAULT_MAX_THUMBNAIL_UPLOAD_SIZE: u64 = 10 << 20;
pub const DEFAULT_MAX_VIDEO_UPLOAD_SIZE: u64 = 1 << 30;
/// S3 rejects presigned URLs valid for longer than 7 days.
const MAX_PRESIGN_EXPIRY_SECS: u64 = 604_800;

/// Settings read once at startup and shared read-only by all requests.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub cert_path: Option<String>,
    pub key_path: Option<String>,
    pub database_url: String,
    pub max_db_connections: usize,
    pub jwt_secret: String,
    pub assets_root: PathBuf,
    pub upload_temp_dir: PathBuf,
    pub s3_bucket: String,
    pub s3_region: String,
    pub s3_endpoint: Option<String>,
    pub s3_access_key: String,
    pub s3_secret_key: String,
    pub s3_cf_distribution: Url,
    pub video_url_expiry: Option<Duration>,
    pub ffmpeg_path: String,
    pub ffprobe_path: String,
    pub max_thumbnail_upload_size: u64,
    pub max_video_upload_size: u64,
}

impl Config {
    pub fn from_env() -> Result<Self, Error> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, Error> {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| {
                    Error::ConfigError(format!("Missing environment variable {key} must be set"))
                })
        };

        let video_url_expiry = parse_optional::<u64>(&lookup, "VIDEO_URL_EXPIRY_SECS")?
            .map(|secs| {
                if secs == 0 || secs > MAX_PRESIGN_EXPIRY_SECS {
                    Err(Error::ConfigError(format!(
                        "VIDEO_URL_EXPIRY_SECS must be between 1 and {MAX_PRESIGN_EXPIRY_SECS}"
                    )))
                } else {
                    Ok(Duration::from_secs(secs))
                }
            })
            .transpose()?;

        let s3_cf_distribution = Url::parse(&required("S3_CF_DISTRO")?)
            .map_err(|e| Error::ConfigError(format!("S3_CF_DISTRO is not a valid URL: {e}")))?;
        if s3_cf_distribution.cannot_be_a_base() {
            return Err(Error::ConfigError(String::from(
                "S3_CF_DISTRO cannot be used as a base URL",
            )));
        }

        Ok(Self {
            port: parse_required(&required("PORT")?, "PORT")?,
            cert_path: lookup("CERT_PATH"),
            key_path: lookup("KEY_PATH"),
            database_url: required("DATABASE_URL")?,
            max_db_connections: parse_optional(&lookup, "MAX_DB_CONNECTIONS")?.unwrap_or(25),
            jwt_secret: required("JWT_SECRET")?,
            assets_root: lookup("ASSETS_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("assets")),
            upload_temp_dir: lookup("UPLOAD_TEMP_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(std::env::temp_dir),
            s3_bucket: required("S3_BUCKET")?,
            s3_region: required("S3_REGION")?,
            s3_endpoint: lookup("S3_ENDPOINT").filter(|v| !v.is_empty()),
            s3_access_key: required("AWS_ACCESS_KEY_ID")?,
            s3_secret_key: required("AWS_SECRET_ACCESS_KEY")?,
            s3_cf_distribution,
            video_url_expiry,
            ffmpeg_path: lookup("FFMPEG_PATH").unwrap_or_else(|| String::from("ffmpeg")),
            ffprobe_path: lookup("FFPROBE_PATH").unwrap_or_else(|| String::from("ffprobe")),
            max_thumbnail_upload_size: parse_optional(&lookup, "MAX_THUMBNAIL_UPLOAD_SIZE")?
                .unwrap_or(DEFAULT_MAX_THUMBNAIL_UPLOAD_SIZE),
            max_video_upload_size: parse_optional(&lookup, "MAX_VIDEO_UPLOAD_SIZE")?
                .unwrap_or(DEFAULT_MAX_VIDEO_UPLOAD_SIZE),
        })
    }
}

fn parse_required<T: FromStr>(value: &str, key: &str) -> Result<T, Error> {
    value
        .trim()
        .parse::<T>()
        .map_err(|_| Error::ConfigError(format!("{key} var is not a valid value: '{value}'")))
}

fn parse_optional<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>, Error> {
    lookup(key)
        .map(|value| parse_required(&value, key))
        .transpose()
}
