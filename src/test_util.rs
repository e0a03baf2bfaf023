//! In-memory doubles for the repository, object store and media processor used by the
//! handler tests.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use parking_lot::Mutex;
use tempfile::TempDir;
use uuid::Uuid;

use crate::{
    AppState,
    auth::{Claims, TOKEN_ISSUER},
    config::Config,
    data::{
        encode::{AspectRatio, MediaProcessor, ProcessedFile, processed_path},
        s3utils::ObjectStore,
    },
    error::Error,
    model::Video,
    video::VideoRepository,
};

pub const TEST_JWT_SECRET: &str = "test-secret";

pub fn make_jwt(user_id: Uuid, secret: &str, valid_for: chrono::Duration) -> String {
    let now = Utc::now();
    let claims = Claims {
        iss: String::from(TOKEN_ISSUER),
        sub: user_id.to_string(),
        iat: now.timestamp() as usize,
        exp: (now + valid_for).timestamp() as usize,
    };

    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .unwrap()
}

pub fn bearer(user_id: Uuid) -> String {
    format!(
        "Bearer {}",
        make_jwt(user_id, TEST_JWT_SECRET, chrono::Duration::hours(1))
    )
}

pub fn video_owned_by(owner_id: Uuid) -> Video {
    let now = Utc::now();
    Video {
        id: Uuid::new_v4(),
        created_at: now,
        updated_at: now,
        title: String::from("Boots on the ground"),
        description: Some(String::from("A test video")),
        thumbnail_url: None,
        video_url: None,
        owner_id,
    }
}

/// Builds a multipart body holding a single file field.
pub fn multipart_body(
    boundary: &str,
    field: &str,
    filename: &str,
    content_type: Option<&str>,
    data: &[u8],
) -> Vec<u8> {
    let mut body = format!(
        "--{boundary}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\n"
    )
    .into_bytes();
    if let Some(content_type) = content_type {
        body.extend(format!("Content-Type: {content_type}\r\n").into_bytes());
    }
    body.extend(b"\r\n");
    body.extend(data);
    body.extend(format!("\r\n--{boundary}--\r\n").into_bytes());
    body
}

#[derive(Default)]
pub struct MemoryVideoRepository {
    videos: Mutex<HashMap<Uuid, Video>>,
    update_count: Mutex<usize>,
}

impl MemoryVideoRepository {
    pub fn insert(&self, video: Video) {
        self.videos.lock().insert(video.id, video);
    }

    pub fn get(&self, id: Uuid) -> Option<Video> {
        self.videos.lock().get(&id).cloned()
    }

    pub fn update_count(&self) -> usize {
        *self.update_count.lock()
    }
}

#[async_trait]
impl VideoRepository for MemoryVideoRepository {
    async fn get_video(&self, id: Uuid) -> Result<Video, Error> {
        self.get(id).ok_or(Error::InaccessibleVideoError(id))
    }

    async fn update_video(&self, video: &Video) -> Result<Video, Error> {
        let mut videos = self.videos.lock();
        let stored = videos
            .get_mut(&video.id)
            .ok_or_else(|| Error::QueryError(format!("video {} no longer exists", video.id)))?;
        stored.thumbnail_url = video.thumbnail_url.clone();
        stored.video_url = video.video_url.clone();
        stored.updated_at = Utc::now();
        *self.update_count.lock() += 1;
        Ok(stored.clone())
    }
}

/// Classifies every file as the configured aspect ratio and "remuxes" by copying.
pub struct FakeMediaProcessor {
    aspect_ratio: AspectRatio,
    fail_inspect: bool,
    fail_normalize: bool,
    inspected: Mutex<Vec<PathBuf>>,
    normalized: Mutex<Vec<PathBuf>>,
}

impl FakeMediaProcessor {
    pub fn new(aspect_ratio: AspectRatio) -> Self {
        Self {
            aspect_ratio,
            fail_inspect: false,
            fail_normalize: false,
            inspected: Mutex::new(Vec::new()),
            normalized: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_inspect() -> Self {
        Self {
            fail_inspect: true,
            ..Self::new(AspectRatio::Other)
        }
    }

    pub fn failing_normalize() -> Self {
        Self {
            fail_normalize: true,
            ..Self::new(AspectRatio::Other)
        }
    }

    pub fn inspect_count(&self) -> usize {
        self.inspected.lock().len()
    }

    pub fn normalize_count(&self) -> usize {
        self.normalized.lock().len()
    }
}

#[async_trait]
impl MediaProcessor for FakeMediaProcessor {
    async fn inspect(&self, path: &Path) -> Result<AspectRatio, Error> {
        assert!(path.exists(), "inspected file must be staged");
        self.inspected.lock().push(path.to_path_buf());
        if self.fail_inspect {
            return Err(Error::FfmpegProcessError(String::from(
                "ffprobe exited with status 1",
            )));
        }
        Ok(self.aspect_ratio)
    }

    async fn normalize(&self, path: &Path) -> Result<ProcessedFile, Error> {
        self.normalized.lock().push(path.to_path_buf());
        let processed = ProcessedFile::new(processed_path(path));
        tokio::fs::copy(path, processed.path())
            .await
            .map_err(|e| Error::IoError(e.to_string()))?;
        if self.fail_normalize {
            // partial output is left behind for the guard to remove
            return Err(Error::FfmpegProcessError(String::from(
                "ffmpeg exited with status 1",
            )));
        }
        Ok(processed)
    }
}

#[derive(Clone, Debug)]
pub struct StoredObject {
    pub key: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

#[derive(Default)]
pub struct RecordingObjectStore {
    fail: bool,
    uploads: Mutex<Vec<StoredObject>>,
}

impl RecordingObjectStore {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn uploads(&self) -> Vec<StoredObject> {
        self.uploads.lock().clone()
    }
}

#[async_trait]
impl ObjectStore for RecordingObjectStore {
    async fn put_object(
        &self,
        key: &str,
        source: &Path,
        content_type: &str,
    ) -> Result<(), Error> {
        let data = tokio::fs::read(source)
            .await
            .map_err(|e| Error::IoError(e.to_string()))?;
        if self.fail {
            return Err(Error::S3ResponseError(503));
        }

        self.uploads.lock().push(StoredObject {
            key: String::from(key),
            content_type: String::from(content_type),
            data,
        });
        Ok(())
    }

    fn presign_get(&self, key: &str, expiry: Duration) -> Result<String, Error> {
        Ok(format!(
            "https://signed.example.com/{key}?expires={}",
            expiry.as_secs()
        ))
    }
}

/// App state backed by the in-memory doubles, with temporary assets and upload directories.
pub struct TestContext {
    pub state: Arc<AppState>,
    pub videos: Arc<MemoryVideoRepository>,
    pub object_store: Arc<RecordingObjectStore>,
    pub media: Arc<FakeMediaProcessor>,
    pub assets_dir: TempDir,
    pub upload_dir: TempDir,
}

impl TestContext {
    pub fn new(media: FakeMediaProcessor, object_store: RecordingObjectStore) -> Self {
        Self::with_vars(media, object_store, &[])
    }

    pub fn with_vars(
        media: FakeMediaProcessor,
        object_store: RecordingObjectStore,
        vars: &[(&'static str, &str)],
    ) -> Self {
        let assets_dir = tempfile::tempdir().unwrap();
        let upload_dir = tempfile::tempdir().unwrap();

        let mut env = HashMap::from([
            ("PORT", String::from("8091")),
            ("DATABASE_URL", String::from("postgres://localhost/tubely")),
            ("JWT_SECRET", String::from(TEST_JWT_SECRET)),
            ("S3_BUCKET", String::from("tubely-videos")),
            ("S3_REGION", String::from("us-east-2")),
            ("AWS_ACCESS_KEY_ID", String::from("access")),
            ("AWS_SECRET_ACCESS_KEY", String::from("secret-key")),
            ("S3_CF_DISTRO", String::from("https://d1234.cloudfront.net")),
            (
                "ASSETS_ROOT",
                assets_dir.path().to_string_lossy().into_owned(),
            ),
            (
                "UPLOAD_TEMP_DIR",
                upload_dir.path().to_string_lossy().into_owned(),
            ),
        ]);
        for (key, value) in vars {
            env.insert(*key, String::from(*value));
        }
        let config = Config::from_lookup(|key| env.get(key).cloned()).unwrap();

        let videos = Arc::new(MemoryVideoRepository::default());
        let object_store = Arc::new(object_store);
        let media = Arc::new(media);
        let state = Arc::new(AppState {
            config,
            videos: videos.clone(),
            object_store: object_store.clone(),
            media: media.clone(),
        });

        Self {
            state,
            videos,
            object_store,
            media,
            assets_dir,
            upload_dir,
        }
    }

    pub fn insert_video(&self, owner_id: Uuid) -> Video {
        let video = video_owned_by(owner_id);
        self.videos.insert(video.clone());
        video
    }

    /// Number of staged or processed files left in the upload directory.
    pub fn leftover_uploads(&self) -> usize {
        std::fs::read_dir(self.upload_dir.path()).unwrap().count()
    }

    pub fn asset_files(&self) -> Vec<String> {
        let mut files = std::fs::read_dir(self.assets_dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect::<Vec<_>>();
        files.sort();
        files
    }
}
