// Constants module - centralized default values for configuration
//
// This module defines all default values used throughout the codebase.
// Using constants instead of magic numbers improves maintainability
// and makes it easier to understand and modify defaults.

// =============================================================================
// Storage key defaults
// =============================================================================

/// Prefix directory for watermarked objects: a source key `feed/sss.jpg`
/// is uploaded back as `watermark/feed/sss.jpg`.
pub const WATERMARK_PREFIX: &str = "watermark/";

// =============================================================================
// Server defaults
// =============================================================================

/// Default listen address
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0";

/// Default listen port
pub const DEFAULT_PORT: u16 = 8080;

// =============================================================================
// Filesystem defaults
// =============================================================================

/// Default working directory for downloaded and generated files
pub const DEFAULT_WORK_DIR: &str = "/tmp";

/// Default path of the base logo image
pub const DEFAULT_LOGO_PATH: &str = "assets/video-logo.png";

/// Default path of the caption font
pub const DEFAULT_FONT_PATH: &str = "assets/caption.ttf";

// =============================================================================
// Caption defaults
// =============================================================================

/// Default caption font size in points
pub const DEFAULT_FONT_SIZE: f32 = 15.0;

/// Approximate horizontal advance per caption character in pixels.
/// Rough visual tuning inherited from the original deployment, kept for
/// output compatibility rather than replaced with measured text metrics.
pub const DEFAULT_PER_CHAR_WIDTH_PX: u32 = 6;

/// Default vertical offset of the caption baseline area in pixels
pub const DEFAULT_VERTICAL_OFFSET_PX: u32 = 6;

// =============================================================================
// Compositing defaults
// =============================================================================

/// Default ffmpeg binary name (resolved via PATH)
pub const DEFAULT_FFMPEG_PATH: &str = "ffmpeg";

/// Default timeout for a single ffmpeg invocation in seconds
pub const DEFAULT_FFMPEG_TIMEOUT_SECS: u64 = 300;

/// Pixel offset of the logo overlay from the top-left corner
pub const DEFAULT_OVERLAY_OFFSET_X: u32 = 10;
pub const DEFAULT_OVERLAY_OFFSET_Y: u32 = 10;

// =============================================================================
// S3 transfer defaults
// =============================================================================

/// Default part size for chunked transfers (10 MiB)
pub const DEFAULT_PART_SIZE_BYTES: u64 = 10 * 1024 * 1024;

/// Default number of concurrent part transfers
pub const DEFAULT_TRANSFER_CONCURRENCY: usize = 4;
