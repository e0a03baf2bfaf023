use bytes::Bytes;
use futures::TryStream;
use mime::Mime;

use crate::{
    AppState,
    data::{
        assets::{thumbnail_file_name, thumbnail_path, thumbnail_url},
        s3utils::generate_object_key,
        staging::{UploadLimit, create_staging_file, stage_stream},
    },
    error::Error,
    model::Video,
    util::join_url,
};

const VIDEO_STAGING_PREFIX: &str = "tubely-upload";
const THUMBNAIL_STAGING_PREFIX: &str = ".thumbnail-";

/// Parses the content type of a multipart field, parameters are kept but ignored by callers.
pub fn parse_content_type(content_type: Option<&str>) -> Result<Mime, Error> {
    let content_type = content_type
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .ok_or(Error::MissingContentTypeError)?;

    content_type
        .parse::<Mime>()
        .map_err(|_| Error::InvalidContentTypeError(String::from(content_type)))
}

/// Only `video/mp4` uploads are accepted.
pub fn validate_video_content_type(content_type: Option<&str>) -> Result<Mime, Error> {
    let mime = parse_content_type(content_type)?;
    if mime.essence_str() != "video/mp4" {
        return Err(Error::UnsupportedMediaTypeError(String::from(
            mime.essence_str(),
        )));
    }

    Ok(mime)
}

/// Stages the uploaded video, remuxes it for fast-start playback and uploads the result to
/// the object store under a key prefixed with its aspect ratio. The video's `video_url`
/// is only persisted once the upload succeeded.
///
/// Local files are removed on every exit path, including the returned future being
/// dropped.
pub async fn upload_video<S>(
    state: &AppState,
    mut video: Video,
    content_type: Option<&str>,
    stream: &mut S,
    limit: &mut UploadLimit,
) -> Result<Video, Error>
where
    S: TryStream<Ok = Bytes> + Unpin,
    S::Error: std::fmt::Display,
{
    let mime = validate_video_content_type(content_type)?;
    let config = &state.config;

    let file = create_staging_file(&config.upload_temp_dir, VIDEO_STAGING_PREFIX, ".mp4")?;
    let staged = stage_stream(stream, limit, file).await?;
    log::info!(
        "Received {} bytes for video {}, starting processing",
        staged.size(),
        video.id
    );

    let aspect_ratio = state.media.inspect(staged.path()).await?;
    let processed = state.media.normalize(staged.path()).await?;
    drop(staged);

    let object_key = generate_object_key(aspect_ratio, mime.subtype().as_str());
    state
        .object_store
        .put_object(&object_key, processed.path(), mime.essence_str())
        .await?;
    drop(processed);

    video.video_url = Some(join_url(&config.s3_cf_distribution, &object_key)?.to_string());
    let video = state.videos.update_video(&video).await?;
    log::info!("Stored video {} as {} ({})", video.id, object_key, aspect_ratio);

    Ok(video)
}

/// Writes the thumbnail to `<assets root>/<video id>.<subtype>`, replacing an earlier
/// thumbnail of the same type, and persists its `/assets` URL.
pub async fn upload_thumbnail<S>(
    state: &AppState,
    mut video: Video,
    content_type: Option<&str>,
    stream: &mut S,
    limit: &mut UploadLimit,
) -> Result<Video, Error>
where
    S: TryStream<Ok = Bytes> + Unpin,
    S::Error: std::fmt::Display,
{
    let mime = parse_content_type(content_type)?;
    let config = &state.config;

    // staged next to the destination so the final rename stays on one filesystem
    let file = create_staging_file(&config.assets_root, THUMBNAIL_STAGING_PREFIX, "")?;
    let staged = stage_stream(stream, limit, file).await?;
    staged.set_world_readable()?;

    let file_name = thumbnail_file_name(video.id, mime.subtype().as_str());
    staged.persist(&thumbnail_path(&config.assets_root, &file_name))?;
    log::debug!("Stored thumbnail for video {} as {}", video.id, file_name);

    video.thumbnail_url = Some(thumbnail_url(&file_name));
    state.videos.update_video(&video).await
}
