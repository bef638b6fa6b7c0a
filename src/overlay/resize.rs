//! Proportional logo resizing.
//!
//! Scales the logo to a target height, deriving the width from the source
//! aspect ratio. Resizing failures are recoverable: the pipeline falls back
//! to the unresized logo instead of aborting the request.

use std::num::NonZeroU32;
use std::path::Path;

use fast_image_resize::{FilterType, Image, PixelType, ResizeAlg, Resizer};
use uuid::Uuid;

use super::renderer::{load_rgba, write_png_atomic};
use super::RenderedAsset;
use crate::error::PipelineError;

/// Scale the image at `image_path` to `target_height`, preserving aspect
/// ratio, and write the result as a new PNG in `work_dir`.
///
/// The target width is `round(width * target_height / height)`. Resampling
/// uses a Lanczos3 convolution filter.
pub fn resize_to_height(
    image_path: &Path,
    target_height: u32,
    work_dir: &Path,
) -> Result<RenderedAsset, PipelineError> {
    if target_height == 0 {
        return Err(PipelineError::Resize(
            "target height must be greater than zero".to_string(),
        ));
    }

    let source = load_rgba(image_path)?;
    let (src_w, src_h) = (source.width(), source.height());

    let target_width = ((src_w as f64 * target_height as f64) / src_h as f64).round() as u32;

    let resized = resize_rgba(&source, target_width, target_height)?;

    let stem = image_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "logo".to_string());
    let output = work_dir.join(format!(
        "{}-h{}-{}.png",
        stem,
        target_height,
        Uuid::new_v4()
    ));
    write_png_atomic(&resized, &output).map_err(PipelineError::Resize)?;

    Ok(RenderedAsset {
        path: output,
        width: target_width,
        height: target_height,
    })
}

/// Resize an RGBA buffer with fast-image-resize using a Lanczos3 filter.
fn resize_rgba(
    source: &image::RgbaImage,
    target_w: u32,
    target_h: u32,
) -> Result<image::RgbaImage, PipelineError> {
    let src_width = NonZeroU32::new(source.width())
        .ok_or_else(|| PipelineError::Resize("source width is 0".to_string()))?;
    let src_height = NonZeroU32::new(source.height())
        .ok_or_else(|| PipelineError::Resize("source height is 0".to_string()))?;
    let dst_width = NonZeroU32::new(target_w)
        .ok_or_else(|| PipelineError::Resize("computed target width is 0".to_string()))?;
    let dst_height = NonZeroU32::new(target_h)
        .ok_or_else(|| PipelineError::Resize("target height is 0".to_string()))?;

    let src_image = Image::from_vec_u8(
        src_width,
        src_height,
        source.clone().into_raw(),
        PixelType::U8x4,
    )
    .map_err(|e| PipelineError::Resize(format!("failed to create source image: {:?}", e)))?;

    let mut dst_image = Image::new(dst_width, dst_height, PixelType::U8x4);

    let mut resizer = Resizer::new(ResizeAlg::Convolution(FilterType::Lanczos3));
    resizer
        .resize(&src_image.view(), &mut dst_image.view_mut())
        .map_err(|e| PipelineError::Resize(format!("resize operation failed: {:?}", e)))?;

    image::RgbaImage::from_raw(target_w, target_h, dst_image.into_vec())
        .ok_or_else(|| PipelineError::Resize("failed to create output image buffer".to_string()))
}
