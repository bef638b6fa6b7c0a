//! Logo overlay preparation: caption rendering and proportional resizing.
//!
//! These stages produce the (possibly captioned, possibly resized) logo image
//! that the compositor overlays onto the source asset. Each stage writes a
//! new file and returns its path; nothing mutates an existing asset, so
//! intermediate files may coexist on disk until the invocation's working
//! files are cleaned up.

pub mod color;
pub mod renderer;
pub mod resize;

pub use color::{color_or_default, parse_color, Color};
pub use renderer::{horizontal_offset, CaptionRenderer, CaptionSpec};
pub use resize::resize_to_height;

use std::path::PathBuf;

/// An image produced by a pipeline stage.
///
/// Owned by the stage that created it; superseded, not mutated, by the next
/// stage.
#[derive(Debug, Clone)]
pub struct RenderedAsset {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
}
