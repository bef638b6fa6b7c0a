//! Service configuration.
//!
//! All configuration is sourced from the environment once at process start.
//! Required values (`Bucket`, `AwsAccessKey`, `AwsSecretKey`, `AwsRegion`)
//! fail startup with a [`PipelineError::Config`] when absent; everything else
//! falls back to defaults from [`crate::constants`].
//!
//! Construction goes through an injectable lookup function so tests can pass
//! a map instead of mutating the process environment.

use std::path::PathBuf;
use std::time::Duration;

use crate::constants::{
    DEFAULT_FFMPEG_PATH, DEFAULT_FFMPEG_TIMEOUT_SECS, DEFAULT_FONT_PATH, DEFAULT_FONT_SIZE,
    DEFAULT_LISTEN_ADDR, DEFAULT_LOGO_PATH, DEFAULT_OVERLAY_OFFSET_X, DEFAULT_OVERLAY_OFFSET_Y,
    DEFAULT_PART_SIZE_BYTES, DEFAULT_PER_CHAR_WIDTH_PX, DEFAULT_PORT, DEFAULT_TRANSFER_CONCURRENCY,
    DEFAULT_VERTICAL_OFFSET_PX, DEFAULT_WORK_DIR,
};
use crate::error::PipelineError;

/// Caption tuning constants.
///
/// The per-character width and vertical offset are rough visual tuning for
/// the deployed logo/font combination, not measured text metrics. They are
/// configurable rather than hard-coded, but the defaults must stay as-is for
/// output compatibility with previously generated watermarks.
#[derive(Debug, Clone)]
pub struct CaptionConfig {
    /// Default font size in points when the request does not override it
    pub font_size: f32,
    /// Horizontal offset contributed by each caption character
    pub per_char_width_px: u32,
    /// Vertical offset of the caption from the top of the logo
    pub vertical_offset_px: u32,
}

impl Default for CaptionConfig {
    fn default() -> Self {
        Self {
            font_size: DEFAULT_FONT_SIZE,
            per_char_width_px: DEFAULT_PER_CHAR_WIDTH_PX,
            vertical_offset_px: DEFAULT_VERTICAL_OFFSET_PX,
        }
    }
}

/// Immutable service configuration, constructed once at startup and passed
/// by reference into every component that needs it.
#[derive(Debug, Clone)]
pub struct Config {
    /// Destination S3 bucket
    pub bucket: String,
    /// AWS access key (static credentials)
    pub access_key: String,
    /// AWS secret key (static credentials)
    pub secret_key: String,
    /// AWS region
    pub region: String,
    /// Custom S3 endpoint (MinIO, LocalStack). None means real AWS.
    pub endpoint: Option<String>,

    /// Listen address for the invocation endpoint
    pub listen_addr: String,
    /// Listen port for the invocation endpoint
    pub port: u16,

    /// Working directory for downloaded and generated files
    pub work_dir: PathBuf,
    /// Base logo image composited onto every asset
    pub logo_path: PathBuf,
    /// TrueType font used for caption rendering
    pub font_path: PathBuf,

    /// ffmpeg binary path or name
    pub ffmpeg_path: String,
    /// Hard timeout for a single ffmpeg invocation
    pub ffmpeg_timeout: Duration,
    /// Pixel offset of the logo overlay from the asset's top-left corner
    pub overlay_offset: (u32, u32),

    /// Part size for chunked S3 transfers, in bytes
    pub part_size: u64,
    /// Number of concurrent part transfers
    pub transfer_concurrency: usize,

    pub caption: CaptionConfig,
}

impl Config {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, PipelineError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary lookup function.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, PipelineError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let bucket = required(&lookup, "Bucket")?;
        let access_key = required(&lookup, "AwsAccessKey")?;
        let secret_key = required(&lookup, "AwsSecretKey")?;
        let region = required(&lookup, "AwsRegion")?;

        let endpoint = lookup("AwsEndpoint").filter(|v| !v.is_empty());

        let listen_addr =
            lookup("ListenAddr").unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_string());
        let port = parsed(&lookup, "Port", DEFAULT_PORT)?;

        let work_dir =
            PathBuf::from(lookup("WorkDir").unwrap_or_else(|| DEFAULT_WORK_DIR.to_string()));
        let logo_path =
            PathBuf::from(lookup("LogoPath").unwrap_or_else(|| DEFAULT_LOGO_PATH.to_string()));
        let font_path =
            PathBuf::from(lookup("FontPath").unwrap_or_else(|| DEFAULT_FONT_PATH.to_string()));

        let ffmpeg_path =
            lookup("FfmpegPath").unwrap_or_else(|| DEFAULT_FFMPEG_PATH.to_string());
        let ffmpeg_timeout = Duration::from_secs(parsed(
            &lookup,
            "FfmpegTimeoutSecs",
            DEFAULT_FFMPEG_TIMEOUT_SECS,
        )?);
        let overlay_offset = (
            parsed(&lookup, "OverlayOffsetX", DEFAULT_OVERLAY_OFFSET_X)?,
            parsed(&lookup, "OverlayOffsetY", DEFAULT_OVERLAY_OFFSET_Y)?,
        );

        let part_size = parsed(&lookup, "PartSizeBytes", DEFAULT_PART_SIZE_BYTES)?;
        let transfer_concurrency =
            parsed(&lookup, "TransferConcurrency", DEFAULT_TRANSFER_CONCURRENCY)?;

        let caption = CaptionConfig {
            font_size: parsed(&lookup, "CaptionFontSize", DEFAULT_FONT_SIZE)?,
            per_char_width_px: parsed(&lookup, "CaptionCharWidth", DEFAULT_PER_CHAR_WIDTH_PX)?,
            vertical_offset_px: parsed(
                &lookup,
                "CaptionVerticalOffset",
                DEFAULT_VERTICAL_OFFSET_PX,
            )?,
        };

        let config = Self {
            bucket,
            access_key,
            secret_key,
            region,
            endpoint,
            listen_addr,
            port,
            work_dir,
            logo_path,
            font_path,
            ffmpeg_path,
            ffmpeg_timeout,
            overlay_offset,
            part_size,
            transfer_concurrency,
            caption,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), PipelineError> {
        if self.part_size == 0 {
            return Err(PipelineError::Config(
                "PartSizeBytes must be greater than zero".to_string(),
            ));
        }
        if self.transfer_concurrency == 0 {
            return Err(PipelineError::Config(
                "TransferConcurrency must be greater than zero".to_string(),
            ));
        }
        if self.caption.font_size <= 0.0 {
            return Err(PipelineError::Config(
                "CaptionFontSize must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

fn required<F>(lookup: &F, name: &str) -> Result<String, PipelineError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(PipelineError::Config(format!(
            "environment variable '{}' is required but not set",
            name
        ))),
    }
}

fn parsed<F, T>(lookup: &F, name: &str, default: T) -> Result<T, PipelineError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(name) {
        Some(value) if !value.is_empty() => value.parse().map_err(|_| {
            PipelineError::Config(format!(
                "environment variable '{}' has invalid value '{}'",
                name, value
            ))
        }),
        _ => Ok(default),
    }
}
