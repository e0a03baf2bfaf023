use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;
use warp::{Rejection, Reply, hyper::StatusCode, reject::Reject};

#[allow(clippy::enum_variant_names)]
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid video id: '{0}'")]
    InvalidIdError(String),
    #[error("Failed to decode request header as valid utf8")]
    UtfEncodingError,
    #[error("The auth header is not formatted correctly (expected JWT 'Bearer ' header)")]
    InvalidAuthHeaderError,
    #[error("No auth header provided")]
    MissingAuthHeaderError,
    #[error("The JWT is not or no longer valid")]
    InvalidJwtError,
    #[error("You are not the owner of this video")]
    NotOwnerError,
    #[error("Video {0} does not exist")]
    InaccessibleVideoError(Uuid),
    #[error("The multipart form could not be read: {0}")]
    InvalidFileError(String),
    #[error("No multipart form field found for name '{0}'")]
    MissingFormFieldError(&'static str),
    #[error("Missing content type for uploaded file")]
    MissingContentTypeError,
    #[error("Invalid content type '{0}'")]
    InvalidContentTypeError(String),
    #[error("Unsupported media type '{0}', expected video/mp4")]
    UnsupportedMediaTypeError(String),
    #[error("Upload exceeds the maximum size of {0} bytes")]
    PayloadTooLargeError(u64),
    #[error("IO error: {0}")]
    IoError(String),
    #[error("Error in ffmpeg process: {0}")]
    FfmpegProcessError(String),
    #[error("Failed to parse ffprobe output: {0}")]
    FfprobeOutputError(String),
    #[error("Invalid media: {0}")]
    InvalidMediaError(String),
    #[error("S3 error: {0}")]
    S3Error(String),
    #[error("S3 responded with status {0}")]
    S3ResponseError(u16),
    #[error("Could not establish database connection")]
    DatabaseConnectionError,
    #[error("There has been an error executing a query: '{0}'")]
    QueryError(String),
    #[error("Invalid URL: {0}")]
    InvalidUrlError(String),
    #[error("Invalid configuration: {0}")]
    ConfigError(String),
}

impl Reject for Error {}

impl From<diesel::result::Error> for Error {
    fn from(e: diesel::result::Error) -> Self {
        Error::QueryError(e.to_string())
    }
}

impl From<s3::error::S3Error> for Error {
    fn from(e: s3::error::S3Error) -> Self {
        Error::S3Error(e.to_string())
    }
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::InvalidIdError(_)
            | Error::UtfEncodingError
            | Error::InvalidFileError(_)
            | Error::MissingFormFieldError(_)
            | Error::MissingContentTypeError
            | Error::InvalidContentTypeError(_) => StatusCode::BAD_REQUEST,
            Error::InvalidAuthHeaderError
            | Error::MissingAuthHeaderError
            | Error::InvalidJwtError
            | Error::NotOwnerError => StatusCode::UNAUTHORIZED,
            Error::InaccessibleVideoError(_) => StatusCode::NOT_FOUND,
            Error::PayloadTooLargeError(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Error::UnsupportedMediaTypeError(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Error::IoError(_)
            | Error::FfmpegProcessError(_)
            | Error::FfprobeOutputError(_)
            | Error::InvalidMediaError(_)
            | Error::S3Error(_)
            | Error::S3ResponseError(_)
            | Error::DatabaseConnectionError
            | Error::QueryError(_)
            | Error::InvalidUrlError(_)
            | Error::ConfigError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message returned to the client. Server errors only expose a generic description,
    /// the details are logged.
    pub fn public_message(&self) -> String {
        let message = match self {
            Error::IoError(_) => "Failed to store uploaded file",
            Error::FfmpegProcessError(_) => "Failed to process video",
            Error::FfprobeOutputError(_) | Error::InvalidMediaError(_) => {
                "Unable to determine video dimensions"
            }
            Error::S3Error(_) | Error::S3ResponseError(_) => "Failed to upload video",
            Error::DatabaseConnectionError | Error::QueryError(_) => {
                "Failed to update video metadata"
            }
            Error::InvalidUrlError(_) | Error::ConfigError(_) => "Internal server error",
            _ => return self.to_string(),
        };

        String::from(message)
    }
}

#[derive(Serialize, Debug)]
struct ErrorResponse {
    message: String,
    status: String,
}

/// Creates a Rejection response for the given error and logs internal server errors.
pub async fn handle_rejection(err: Rejection) -> Result<impl Reply, Rejection> {
    if let Some(e) = err.find::<Error>() {
        let code = e.status_code();
        if code.is_server_error() {
            log::error!("Encountered internal server error: {}", e);
        } else {
            log::debug!("Rejecting request with {}: {}", code, e);
        }

        let err_response = ErrorResponse {
            message: e.public_message(),
            status: code.to_string(),
        };

        let json = warp::reply::json(&err_response);

        Ok(warp::reply::with_status(json, code))
    } else {
        Err(err)
    }
}
