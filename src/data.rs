use std::{fmt, sync::Arc};

use bytes::Bytes;
use futures::{Stream, TryStream, TryStreamExt};
use mime::Mime;
use mpart_async::server::MultipartStream;
use uuid::Uuid;
use warp::{Buf, Rejection, Reply};

use crate::{AppState, data::staging::UploadLimit, error::Error, model::Video};

pub mod assets;
pub mod encode;
pub mod s3utils;
pub mod staging;
pub mod up;

const THUMBNAIL_FIELD: &str = "thumbnail";
const VIDEO_FIELD: &str = "video";

pub async fn upload_thumbnail_handler(
    video_id: String,
    state: Arc<AppState>,
    user_id: Uuid,
    mime: Mime,
    body: impl Stream<Item = Result<impl Buf, warp::Error>> + Unpin,
) -> Result<impl Reply, Rejection> {
    let video = authorize_video(&state, &video_id, user_id).await?;
    log::info!("Uploading thumbnail for video {} by user {}", video.id, user_id);
    let mut limit = UploadLimit::new(state.config.max_thumbnail_upload_size);

    let mut stream = MultipartStream::new(
        get_boundary(&mime)?,
        body.map_ok(|mut buf| buf.copy_to_bytes(buf.remaining())),
    );

    while let Some(mut field) = stream
        .try_next()
        .await
        .map_err(|e| Error::InvalidFileError(e.to_string()))?
    {
        if field
            .name()
            .map_err(|e| Error::InvalidFileError(e.to_string()))?
            != THUMBNAIL_FIELD
        {
            drain_field(&mut field, &mut limit).await?;
            continue;
        }

        let content_type = field.content_type().ok().map(String::from);
        let video = up::upload_thumbnail(
            &state,
            video,
            content_type.as_deref(),
            &mut field,
            &mut limit,
        )
        .await?;
        return Ok(warp::reply::json(&video));
    }

    Err(warp::reject::custom(Error::MissingFormFieldError(
        THUMBNAIL_FIELD,
    )))
}

pub async fn upload_video_handler(
    video_id: String,
    state: Arc<AppState>,
    user_id: Uuid,
    mime: Mime,
    body: impl Stream<Item = Result<impl Buf, warp::Error>> + Unpin,
) -> Result<impl Reply, Rejection> {
    let video = authorize_video(&state, &video_id, user_id).await?;
    log::info!("Uploading video for video {} by user {}", video.id, user_id);
    let mut limit = UploadLimit::new(state.config.max_video_upload_size);

    let mut stream = MultipartStream::new(
        get_boundary(&mime)?,
        body.map_ok(|mut buf| buf.copy_to_bytes(buf.remaining())),
    );

    while let Some(mut field) = stream
        .try_next()
        .await
        .map_err(|e| Error::InvalidFileError(e.to_string()))?
    {
        if field
            .name()
            .map_err(|e| Error::InvalidFileError(e.to_string()))?
            != VIDEO_FIELD
        {
            drain_field(&mut field, &mut limit).await?;
            continue;
        }

        let content_type = field.content_type().ok().map(String::from);
        let video = up::upload_video(
            &state,
            video,
            content_type.as_deref(),
            &mut field,
            &mut limit,
        )
        .await?;
        return Ok(warp::reply::json(&video));
    }

    Err(warp::reject::custom(Error::MissingFormFieldError(VIDEO_FIELD)))
}

/// Returns the video record. If presigned URLs are enabled the returned `video_url`
/// grants temporary read access to the object, the stored record is not changed.
pub async fn get_video_handler(
    video_id: String,
    state: Arc<AppState>,
    user_id: Uuid,
) -> Result<impl Reply, Rejection> {
    let video = authorize_video(&state, &video_id, user_id).await?;

    let video = match state.config.video_url_expiry {
        Some(expiry) => s3utils::sign_video(
            state.object_store.as_ref(),
            &state.config.s3_cf_distribution,
            expiry,
            video,
        )?,
        None => video,
    };

    Ok(warp::reply::json(&video))
}

/// Loads the video and checks that it belongs to the authenticated user. Runs before any
/// part of the request body is read.
async fn authorize_video(state: &AppState, video_id: &str, user_id: Uuid) -> Result<Video, Error> {
    let video_id =
        Uuid::parse_str(video_id).map_err(|_| Error::InvalidIdError(String::from(video_id)))?;
    let video = state.videos.get_video(video_id).await?;

    if video.owner_id != user_id {
        log::debug!(
            "Rejecting access to video {} for user {}, owned by {}",
            video_id,
            user_id,
            video.owner_id
        );
        return Err(Error::NotOwnerError);
    }

    Ok(video)
}

fn get_boundary(mime: &Mime) -> Result<String, Error> {
    mime.get_param("boundary")
        .map(|v| v.to_string())
        .ok_or_else(|| Error::InvalidFileError(String::from("No mime boundary")))
}

/// Skips a field that is not the upload, its bytes still count against `limit`.
async fn drain_field<S>(field: &mut S, limit: &mut UploadLimit) -> Result<(), Error>
where
    S: TryStream<Ok = Bytes> + Unpin,
    S::Error: fmt::Display,
{
    while let Some(chunk) = field
        .try_next()
        .await
        .map_err(|e| Error::InvalidFileError(e.to_string()))?
    {
        limit.consume(chunk.len())?;
    }

    Ok(())
}
