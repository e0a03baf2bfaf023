use std::{
    io::Seek,
    path::{Path, PathBuf},
};

use bytes::Bytes;
use futures::{TryStream, TryStreamExt};
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;

use crate::error::Error;

/// An upload written to local disk. The file is removed when this is dropped unless it
/// has been persisted.
#[derive(Debug)]
pub struct StagedFile {
    file: NamedTempFile,
    size: u64,
}

impl StagedFile {
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// `tempfile` creates files readable by the owner only, files served to others need
    /// mode 0644.
    #[cfg(unix)]
    pub fn set_world_readable(&self) -> Result<(), Error> {
        use std::os::unix::fs::PermissionsExt;

        self.file
            .as_file()
            .set_permissions(std::fs::Permissions::from_mode(0o644))
            .map_err(|e| {
                Error::IoError(format!(
                    "Failed to set permissions of {}: {e}",
                    self.path().display()
                ))
            })
    }

    #[cfg(not(unix))]
    pub fn set_world_readable(&self) -> Result<(), Error> {
        Ok(())
    }

    /// Atomically moves the staged file to `destination`, replacing any existing file.
    /// `destination` should be on the same filesystem as the staging directory.
    pub fn persist(self, destination: &Path) -> Result<PathBuf, Error> {
        self.file.persist(destination).map_err(|e| {
            Error::IoError(format!(
                "Failed to move staged file to {}: {}",
                destination.display(),
                e.error
            ))
        })?;
        Ok(destination.to_path_buf())
    }
}

pub fn create_staging_file(dir: &Path, prefix: &str, suffix: &str) -> Result<NamedTempFile, Error> {
    tempfile::Builder::new()
        .prefix(prefix)
        .suffix(suffix)
        .tempfile_in(dir)
        .map_err(|e| {
            Error::IoError(format!(
                "Failed to create staging file in {}: {e}",
                dir.display()
            ))
        })
}

/// Byte budget shared by all multipart fields of one request.
#[derive(Debug)]
pub struct UploadLimit {
    max_size: u64,
    received: u64,
}

impl UploadLimit {
    pub fn new(max_size: u64) -> Self {
        Self {
            max_size,
            received: 0,
        }
    }

    /// Counts `len` more bytes against the budget, failing with
    /// [`Error::PayloadTooLargeError`] once more than `max_size` bytes have been received.
    pub fn consume(&mut self, len: usize) -> Result<(), Error> {
        self.received += len as u64;
        if self.received > self.max_size {
            return Err(Error::PayloadTooLargeError(self.max_size));
        }
        Ok(())
    }
}

/// Writes the byte stream to `file`, counting every chunk against `limit`. The file is
/// rewound to the start before it is returned.
pub async fn stage_stream<S>(
    stream: &mut S,
    limit: &mut UploadLimit,
    mut file: NamedTempFile,
) -> Result<StagedFile, Error>
where
    S: TryStream<Ok = Bytes> + Unpin,
    S::Error: std::fmt::Display,
{
    let io_error = |e: std::io::Error| {
        Error::IoError(format!("Failed to write {}: {e}", file.path().display()))
    };
    let mut writer = tokio::fs::File::from_std(file.as_file().try_clone().map_err(io_error)?);

    let mut size: u64 = 0;
    while let Some(chunk) = stream
        .try_next()
        .await
        .map_err(|e| Error::InvalidFileError(e.to_string()))?
    {
        size += chunk.len() as u64;
        if let Err(e) = limit.consume(chunk.len()) {
            log::debug!("Aborting upload to {}: {e}", file.path().display());
            return Err(e);
        }
        writer.write_all(&chunk).await.map_err(io_error)?;
    }
    writer.flush().await.map_err(io_error)?;
    drop(writer);

    file.as_file_mut().rewind().map_err(|e| {
        Error::IoError(format!("Failed to rewind staged file: {e}"))
    })?;

    log::debug!("Staged {size} bytes at {}", file.path().display());
    Ok(StagedFile { file, size })
}
