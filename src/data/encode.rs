use std::{
    ffi::OsString,
    fmt,
    path::{Path, PathBuf},
    process::Output,
};

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;

use crate::error::Error;

/// Aspect ratio bucket of a video, derived from the dimensions of its first video stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AspectRatio {
    Landscape,
    Portrait,
    Other,
}

impl AspectRatio {
    /// `16:9` for ratios in (1.7, 1.8), `9:16` for ratios in (0.5, 0.6), anything else is
    /// `other`. The bounds are exclusive.
    pub fn classify(width: u32, height: u32) -> Result<Self, Error> {
        if height == 0 {
            return Err(Error::InvalidMediaError(String::from(
                "height cannot be zero",
            )));
        }

        let ratio = f64::from(width) / f64::from(height);
        if ratio > 1.7 && ratio < 1.8 {
            Ok(AspectRatio::Landscape)
        } else if ratio > 0.5 && ratio < 0.6 {
            Ok(AspectRatio::Portrait)
        } else {
            Ok(AspectRatio::Other)
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            AspectRatio::Landscape => "16:9",
            AspectRatio::Portrait => "9:16",
            AspectRatio::Other => "other",
        }
    }

    /// Object key prefix videos of this aspect ratio are stored under.
    pub fn key_prefix(&self) -> &'static str {
        match self {
            AspectRatio::Landscape => "landscape",
            AspectRatio::Portrait => "portrait",
            AspectRatio::Other => "other",
        }
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Output of [`MediaProcessor::normalize`]. The file is deleted when this is dropped.
#[derive(Debug)]
pub struct ProcessedFile {
    path: PathBuf,
}

impl ProcessedFile {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ProcessedFile {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => log::debug!("Removed processed file {}", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => log::error!(
                "Failed to remove processed file {}: {e}",
                self.path.display()
            ),
        }
    }
}

/// Path the fast-start copy of `path` is written to.
pub fn processed_path(path: &Path) -> PathBuf {
    let mut processed = OsString::from(path.as_os_str());
    processed.push(".processing");
    PathBuf::from(processed)
}

/// Inspection and container rewriting of local video files.
#[async_trait]
pub trait MediaProcessor: Send + Sync {
    async fn inspect(&self, path: &Path) -> Result<AspectRatio, Error>;

    /// Rewrites the container so the index metadata sits at the start of the file,
    /// without re-encoding. The source file is left untouched.
    async fn normalize(&self, path: &Path) -> Result<ProcessedFile, Error>;
}

/// [`MediaProcessor`] running the ffprobe and ffmpeg binaries. Child processes are killed
/// if the request is dropped while they are running.
pub struct FfmpegProcessor {
    ffprobe_path: String,
    ffmpeg_path: String,
}

impl FfmpegProcessor {
    pub fn new(ffprobe_path: String, ffmpeg_path: String) -> Self {
        Self {
            ffprobe_path,
            ffmpeg_path,
        }
    }
}

#[async_trait]
impl MediaProcessor for FfmpegProcessor {
    async fn inspect(&self, path: &Path) -> Result<AspectRatio, Error> {
        let mut command = Command::new(&self.ffprobe_path);
        command
            .args(["-v", "error", "-print_format", "json", "-show_streams"])
            .arg(path);
        let process_output = run_process("ffprobe", command).await?;

        let (width, height) = parse_probe_dimensions(&process_output.stdout)?;
        let aspect_ratio = AspectRatio::classify(width, height)?;
        log::debug!(
            "ffprobe reported {width}x{height} ({aspect_ratio}) for {}",
            path.display()
        );
        Ok(aspect_ratio)
    }

    async fn normalize(&self, path: &Path) -> Result<ProcessedFile, Error> {
        // created before spawning so partial output is removed on failure
        let processed = ProcessedFile::new(processed_path(path));

        let mut command = Command::new(&self.ffmpeg_path);
        command
            .args(["-v", "error", "-y", "-i"])
            .arg(path)
            .args(["-c", "copy", "-movflags", "faststart", "-f", "mp4"])
            .arg(processed.path());

        log::info!("Spawning ffmpeg process to remux {}", path.display());
        let now = std::time::Instant::now();
        run_process("ffmpeg", command).await?;
        log::info!(
            "Finished remux of {} after {:?}",
            path.display(),
            now.elapsed()
        );

        Ok(processed)
    }
}

async fn run_process(name: &str, mut command: Command) -> Result<Output, Error> {
    let process_output = command
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| Error::FfmpegProcessError(format!("Failed to spawn {name} process: {e}")))?;

    if !process_output.status.success() {
        let error_msg = String::from_utf8_lossy(&process_output.stderr);
        return Err(Error::FfmpegProcessError(format!(
            "{name} failed with status {}: {}",
            process_output.status,
            error_msg.trim()
        )));
    }

    Ok(process_output)
}

#[derive(Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
}

/// Extracts width and height of the first video stream from `ffprobe -show_streams`
/// JSON output.
pub fn parse_probe_dimensions(output: &[u8]) -> Result<(u32, u32), Error> {
    let probe = serde_json::from_slice::<FfprobeOutput>(output)
        .map_err(|e| Error::FfprobeOutputError(e.to_string()))?;

    let stream = probe
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or_else(|| Error::InvalidMediaError(String::from("no video stream found")))?;

    match (stream.width, stream.height) {
        (Some(width), Some(height)) => Ok((width, height)),
        _ => Err(Error::InvalidMediaError(String::from(
            "video stream has no dimensions",
        ))),
    }
}
