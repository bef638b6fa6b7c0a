//! Caption rendering onto the logo image.
//!
//! Draws a username caption onto a copy of the base logo at a computed
//! offset and writes the result as a new PNG in the caller's output
//! directory. The
//! base logo file is never touched; output is written temp-then-rename so a
//! failed render leaves no partial file at the returned path.

use std::fs;
use std::path::{Path, PathBuf};

use ab_glyph::{Font, FontVec, PxScale, ScaleFont};
use image::{Rgba, RgbaImage};
use uuid::Uuid;

use super::color::{color_or_default, Color};
use super::RenderedAsset;
use crate::config::CaptionConfig;
use crate::error::PipelineError;

/// Horizontal caption offset: byte length of the caption times the fixed
/// per-character width. An approximation rather than text measurement,
/// reproduced as-is for output compatibility with existing watermarks.
pub fn horizontal_offset(text: &str, per_char_width_px: u32) -> u32 {
    text.len() as u32 * per_char_width_px
}

/// A caption fully resolved from request fields and configured tuning
/// constants. Constructed per request, consumed once by
/// [`CaptionRenderer::render`].
#[derive(Debug, Clone)]
pub struct CaptionSpec {
    pub text: String,
    pub font_size: f32,
    pub color: Color,
    pub x_offset: u32,
    pub y_offset: u32,
}

impl CaptionSpec {
    /// Resolve a caption from request fields.
    ///
    /// Empty or unusable size/color overrides degrade to configured
    /// defaults instead of failing the request.
    pub fn resolve(text: &str, font_size: &str, font_color: &str, tuning: &CaptionConfig) -> Self {
        let size = match font_size.parse::<f32>() {
            Ok(s) if s > 0.0 => s,
            _ => {
                if !font_size.is_empty() {
                    tracing::warn!(font_size, "unusable font size, using default");
                }
                tuning.font_size
            }
        };

        Self {
            text: text.to_string(),
            font_size: size,
            color: color_or_default(font_color),
            x_offset: horizontal_offset(text, tuning.per_char_width_px),
            y_offset: tuning.vertical_offset_px,
        }
    }
}

/// Renders captions onto the configured logo.
#[derive(Debug, Clone)]
pub struct CaptionRenderer {
    font_path: PathBuf,
}

impl CaptionRenderer {
    pub fn new(font_path: PathBuf) -> Self {
        Self { font_path }
    }

    /// Draw `spec` onto a copy of the image at `base_image` and write the
    /// result to a new file in `out_dir`.
    ///
    /// The output name carries a caption-derived stem (so repeated captions
    /// are easy to recognize) plus a per-invocation unique element (so
    /// concurrent invocations never clobber each other).
    pub fn render(
        &self,
        base_image: &Path,
        spec: &CaptionSpec,
        out_dir: &Path,
    ) -> Result<RenderedAsset, PipelineError> {
        if spec.text.is_empty() {
            return Err(PipelineError::Render(
                "cannot render an empty caption".to_string(),
            ));
        }

        let mut canvas = load_rgba(base_image)?;
        let font = self.load_font()?;

        draw_caption(&mut canvas, spec, &font);

        let output = out_dir.join(format!(
            "caption-{}-{}.png",
            file_stem_for(&spec.text),
            Uuid::new_v4()
        ));
        write_png_atomic(&canvas, &output).map_err(PipelineError::Render)?;

        Ok(RenderedAsset {
            width: canvas.width(),
            height: canvas.height(),
            path: output,
        })
    }

    fn load_font(&self) -> Result<FontVec, PipelineError> {
        let data = fs::read(&self.font_path).map_err(|e| {
            PipelineError::Render(format!(
                "failed to read font {}: {}",
                self.font_path.display(),
                e
            ))
        })?;
        FontVec::try_from_vec(data).map_err(|e| {
            PipelineError::Render(format!(
                "failed to parse font {}: {}",
                self.font_path.display(),
                e
            ))
        })
    }
}

/// Load and decode an image, mapping any failure to `AssetLoad`.
pub(crate) fn load_rgba(path: &Path) -> Result<RgbaImage, PipelineError> {
    let reader = image::io::Reader::open(path)
        .map_err(|e| PipelineError::asset_load(path.display(), e))?
        .with_guessed_format()
        .map_err(|e| PipelineError::asset_load(path.display(), e))?;
    let decoded = reader
        .decode()
        .map_err(|e| PipelineError::asset_load(path.display(), e))?;
    Ok(decoded.to_rgba8())
}

/// Encode a PNG with temp-then-rename discipline: no partial file is left
/// at the final path on failure.
pub(crate) fn write_png_atomic(image: &RgbaImage, output: &Path) -> Result<(), String> {
    let tmp = output.with_extension("png.tmp");
    if let Err(e) = image.save_with_format(&tmp, image::ImageFormat::Png) {
        let _ = fs::remove_file(&tmp);
        return Err(format!("failed to encode {}: {}", output.display(), e));
    }
    fs::rename(&tmp, output).map_err(|e| {
        let _ = fs::remove_file(&tmp);
        format!("failed to finalize {}: {}", output.display(), e)
    })
}

/// Rasterize the caption glyphs onto the canvas.
///
/// The baseline sits at `y_offset + ascent`; glyphs advance from `x_offset`
/// with kerning applied, alpha-blended for anti-aliasing.
fn draw_caption(canvas: &mut RgbaImage, spec: &CaptionSpec, font: &FontVec) {
    let scale = PxScale::from(spec.font_size);
    let scaled_font = font.as_scaled(scale);

    let canvas_width = canvas.width() as i32;
    let canvas_height = canvas.height() as i32;

    let baseline_y = spec.y_offset as f32 + scaled_font.ascent();
    let mut cursor_x = spec.x_offset as f32;
    let mut prev_glyph: Option<ab_glyph::GlyphId> = None;

    for c in spec.text.chars() {
        let glyph_id = scaled_font.glyph_id(c);

        if let Some(prev) = prev_glyph {
            cursor_x += scaled_font.kern(prev, glyph_id);
        }

        let glyph = glyph_id.with_scale_and_position(scale, ab_glyph::point(cursor_x, baseline_y));

        if let Some(outlined) = font.outline_glyph(glyph) {
            let bounds = outlined.px_bounds();

            outlined.draw(|px, py, coverage| {
                let x = px as i32 + bounds.min.x as i32;
                let y = py as i32 + bounds.min.y as i32;

                if x >= 0 && y >= 0 && x < canvas_width && y < canvas_height {
                    let alpha = (coverage.clamp(0.0, 1.0) * 255.0) as u8;
                    let pixel = Rgba([spec.color.r, spec.color.g, spec.color.b, alpha]);

                    let existing = canvas.get_pixel(x as u32, y as u32);
                    let blended = blend_pixels(*existing, pixel);
                    canvas.put_pixel(x as u32, y as u32, blended);
                }
            });
        }

        cursor_x += scaled_font.h_advance(glyph_id);
        prev_glyph = Some(glyph_id);
    }
}

/// Porter-Duff "over" blend of two RGBA pixels.
fn blend_pixels(bottom: Rgba<u8>, top: Rgba<u8>) -> Rgba<u8> {
    let top_alpha = top[3] as f32 / 255.0;
    let bottom_alpha = bottom[3] as f32 / 255.0;

    let out_alpha = top_alpha + bottom_alpha * (1.0 - top_alpha);

    if out_alpha < 0.001 {
        return Rgba([0, 0, 0, 0]);
    }

    let blend = |t: u8, b: u8| -> u8 {
        let t = t as f32 / 255.0;
        let b = b as f32 / 255.0;
        let result = (t * top_alpha + b * bottom_alpha * (1.0 - top_alpha)) / out_alpha;
        (result * 255.0) as u8
    };

    Rgba([
        blend(top[0], bottom[0]),
        blend(top[1], bottom[1]),
        blend(top[2], bottom[2]),
        (out_alpha * 255.0) as u8,
    ])
}

/// Filesystem-safe stem derived from the caption text.
fn file_stem_for(text: &str) -> String {
    let mut stem: String = text
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .take(24)
        .collect();
    if stem.is_empty() {
        stem.push_str("caption");
    }
    stem
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::overlay::test_support::{find_system_font, write_test_png};
    use tempfile::TempDir;

    fn tuning() -> CaptionConfig {
        CaptionConfig::default()
    }

    #[test]
    fn test_horizontal_offset_is_len_times_width() {
        for text in ["", "a", "bob", "somebody", "a longer caption"] {
            assert_eq!(horizontal_offset(text, 6), text.len() as u32 * 6);
        }
        assert_eq!(horizontal_offset("bob", 6), 18);
        assert_eq!(horizontal_offset("bob", 8), 24);
    }

    #[test]
    fn test_spec_resolve_defaults() {
        let spec = CaptionSpec::resolve("bob", "", "", &tuning());
        assert_eq!(spec.font_size, 15.0);
        assert_eq!(spec.color, Color::white());
        assert_eq!(spec.x_offset, 18);
        assert_eq!(spec.y_offset, 6);
    }

    #[test]
    fn test_spec_resolve_overrides() {
        let spec = CaptionSpec::resolve("bob", "20", "#F00", &tuning());
        assert_eq!(spec.font_size, 20.0);
        assert_eq!(spec.color, Color::new(255, 0, 0));
    }

    #[test]
    fn test_spec_resolve_degrades_bad_overrides() {
        let spec = CaptionSpec::resolve("bob", "huge", "neon", &tuning());
        assert_eq!(spec.font_size, 15.0);
        assert_eq!(spec.color, Color::white());

        let spec = CaptionSpec::resolve("bob", "-3", "", &tuning());
        assert_eq!(spec.font_size, 15.0);
    }

    #[test]
    fn test_file_stem_sanitized() {
        assert_eq!(file_stem_for("bob"), "bob");
        assert_eq!(file_stem_for("a b/c"), "a-b-c");
        assert_eq!(file_stem_for("日本"), "--");
        assert_eq!(file_stem_for(""), "caption");
    }

    #[test]
    fn test_render_missing_base_is_asset_load_error() {
        let dir = TempDir::new().unwrap();
        let renderer = CaptionRenderer::new(dir.path().join("font.ttf"));
        let spec = CaptionSpec::resolve("bob", "", "", &tuning());

        let err = renderer
            .render(&dir.path().join("missing.png"), &spec, dir.path())
            .unwrap_err();
        assert!(matches!(err, PipelineError::AssetLoad { .. }), "{err}");
    }

    #[test]
    fn test_render_corrupt_base_is_asset_load_error() {
        let dir = TempDir::new().unwrap();
        let base = dir.path().join("corrupt.png");
        std::fs::write(&base, b"definitely not a png").unwrap();

        let renderer = CaptionRenderer::new(dir.path().join("font.ttf"));
        let spec = CaptionSpec::resolve("bob", "", "", &tuning());

        let err = renderer.render(&base, &spec, dir.path()).unwrap_err();
        assert!(matches!(err, PipelineError::AssetLoad { .. }), "{err}");
    }

    #[test]
    fn test_render_missing_font_is_render_error_with_no_output() {
        let dir = TempDir::new().unwrap();
        let base = dir.path().join("logo.png");
        write_test_png(&base, 200, 60);

        let renderer = CaptionRenderer::new(dir.path().join("nope.ttf"));
        let spec = CaptionSpec::resolve("bob", "", "", &tuning());

        let err = renderer.render(&base, &spec, dir.path()).unwrap_err();
        assert!(matches!(err, PipelineError::Render(_)), "{err}");

        // Only the base image exists; no partial or temp output was left.
        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_render_empty_caption_rejected() {
        let dir = TempDir::new().unwrap();
        let renderer = CaptionRenderer::new(dir.path().join("font.ttf"));
        let mut spec = CaptionSpec::resolve("bob", "", "", &tuning());
        spec.text.clear();

        let err = renderer
            .render(&dir.path().join("logo.png"), &spec, dir.path())
            .unwrap_err();
        assert!(matches!(err, PipelineError::Render(_)));
    }

    #[test]
    fn test_render_draws_caption_and_leaves_base_untouched() {
        let Some(font) = find_system_font() else {
            eprintln!("no system font available, skipping render test");
            return;
        };

        let dir = TempDir::new().unwrap();
        let base = dir.path().join("logo.png");
        write_test_png(&base, 200, 60);
        let base_bytes = std::fs::read(&base).unwrap();

        let renderer = CaptionRenderer::new(font);
        let spec = CaptionSpec::resolve("bob", "", "", &tuning());

        let asset = renderer.render(&base, &spec, dir.path()).unwrap();
        assert_eq!((asset.width, asset.height), (200, 60));
        assert!(asset.path.exists());

        // Base image bytes unchanged
        assert_eq!(std::fs::read(&base).unwrap(), base_bytes);

        // Caption pixels differ from the solid background
        let rendered = image::open(&asset.path).unwrap().to_rgba8();
        let background = image::Rgba([40, 80, 160, 255]);
        assert!(rendered.pixels().any(|p| *p != background));

        // No temp file left behind
        assert!(!asset.path.with_extension("png.tmp").exists());
    }

    #[test]
    fn test_render_names_are_stable_but_unique() {
        let Some(font) = find_system_font() else {
            eprintln!("no system font available, skipping render test");
            return;
        };

        let dir = TempDir::new().unwrap();
        let base = dir.path().join("logo.png");
        write_test_png(&base, 200, 60);

        let renderer = CaptionRenderer::new(font);
        let spec = CaptionSpec::resolve("bob", "", "", &tuning());

        let first = renderer.render(&base, &spec, dir.path()).unwrap();
        let second = renderer.render(&base, &spec, dir.path()).unwrap();

        assert_ne!(first.path, second.path);
        for asset in [&first, &second] {
            let name = asset.path.file_name().unwrap().to_string_lossy();
            assert!(name.starts_with("caption-bob-"), "{name}");
        }
    }
}
