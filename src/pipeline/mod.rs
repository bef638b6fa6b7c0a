//! Watermark pipeline orchestration.
//!
//! Linear state machine per invocation, no retries, no shared state:
//! Received -> (SourceFetched) -> (CaptionRendered) -> (Resized) ->
//! Composited -> Uploaded -> Completed. Resize failure degrades to the
//! unresized logo; every other failure aborts the request. Every invocation
//! works in its own scratch directory, removed when the invocation finishes,
//! so concurrent invocations never collide and the working directory does
//! not accumulate intermediate files.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

use crate::compositor::Compositor;
use crate::config::Config;
use crate::error::PipelineError;
use crate::keys;
use crate::overlay::{resize_to_height, CaptionRenderer, CaptionSpec};
use crate::storage::ObjectStore;

/// Invocation input, matching the original event shape.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WatermarkRequest {
    #[serde(default)]
    pub channel: String,
    /// Optional caption text burned into the logo
    #[serde(default)]
    pub name: String,
    /// Source asset locator: full URL or bare storage key
    pub key: String,
    /// Target logo width; resize runs only when both dimensions are positive
    #[serde(default)]
    pub file_w: u32,
    /// Target logo height
    #[serde(default)]
    pub file_h: u32,
    /// Caption font size override in points
    #[serde(default)]
    pub fontsize: String,
    /// Caption font color override (hex or named)
    #[serde(default)]
    pub fontcolor: String,
}

/// Invocation output: the destination storage key of the watermarked asset.
#[derive(Debug, Clone, Serialize)]
pub struct WatermarkResponse {
    pub body: ResponseBody,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResponseBody {
    pub data: String,
}

impl WatermarkResponse {
    pub fn new(destination_key: String) -> Self {
        Self {
            body: ResponseBody {
                data: destination_key,
            },
        }
    }
}

/// Pipeline stage, logged on every failure to aid diagnosis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Received,
    SourceFetched,
    CaptionRendered,
    Resized,
    Composited,
    Uploaded,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Received => "received",
            Stage::SourceFetched => "source_fetched",
            Stage::CaptionRendered => "caption_rendered",
            Stage::Resized => "resized",
            Stage::Composited => "composited",
            Stage::Uploaded => "uploaded",
        };
        write!(f, "{}", name)
    }
}

/// Stateless request pipeline. One invocation owns one logical thread of
/// control; collaborators are injected so tests can run without ffmpeg or S3.
pub struct Pipeline {
    config: Arc<Config>,
    store: Arc<dyn ObjectStore>,
    compositor: Arc<dyn Compositor>,
    renderer: CaptionRenderer,
}

impl Pipeline {
    pub fn new(
        config: Arc<Config>,
        store: Arc<dyn ObjectStore>,
        compositor: Arc<dyn Compositor>,
    ) -> Self {
        let renderer = CaptionRenderer::new(config.font_path.clone());
        Self {
            config,
            store,
            compositor,
            renderer,
        }
    }

    /// Run one watermark invocation end to end and return the destination
    /// key of the uploaded result.
    ///
    /// All intermediate files (downloaded source, captioned and resized
    /// logos, composited output) live in a per-invocation scratch directory
    /// that is removed before returning, on success and on failure alike.
    pub async fn handle(
        &self,
        request: &WatermarkRequest,
    ) -> Result<WatermarkResponse, PipelineError> {
        if request.key.is_empty() {
            let e = PipelineError::InvalidRequest("source key is required".to_string());
            tracing::error!(stage = %Stage::Received, error = %e, "request failed");
            return Err(e);
        }

        let invocation = Uuid::new_v4();
        let scratch = self.config.work_dir.join(format!("job-{}", invocation));
        fs::create_dir_all(&scratch).map_err(|e| {
            PipelineError::Workspace(format!(
                "failed to create scratch directory {}: {}",
                scratch.display(),
                e
            ))
        })?;

        let result = self.run(request, &scratch).await;

        if let Err(e) = fs::remove_dir_all(&scratch) {
            tracing::warn!(
                path = %scratch.display(),
                error = %e,
                "failed to remove scratch directory"
            );
        }
        result
    }

    async fn run(
        &self,
        request: &WatermarkRequest,
        scratch: &Path,
    ) -> Result<WatermarkResponse, PipelineError> {
        let fallback = keys::base_name(&request.key);
        let source_key = keys::derive_source_key(&request.key, &fallback);
        let destination = keys::destination_key(&source_key);

        tracing::info!(
            key = %request.key,
            name = %request.name,
            destination = %destination,
            "watermark request received"
        );

        let source = self.acquire_source(request, scratch, &fallback).await?;
        let logo = self.prepare_logo(request, scratch)?;

        let output = scratch.join(&fallback);
        if let Err(e) = self
            .compositor
            .composite(&source, &logo, self.config.overlay_offset, &output)
            .await
        {
            tracing::error!(key = %request.key, stage = %Stage::Composited, error = %e, "request failed");
            return Err(e);
        }

        let bytes = match self.store.upload(&destination, &output).await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!(key = %request.key, stage = %Stage::Uploaded, error = %e, "request failed");
                return Err(e);
            }
        };

        tracing::info!(
            key = %request.key,
            destination = %destination,
            bytes,
            "watermark request completed"
        );
        Ok(WatermarkResponse::new(destination))
    }

    /// Resolve what the compositor should read as its primary input.
    ///
    /// Full URLs are handed to ffmpeg verbatim; a bare storage key is
    /// fetched from the object store into the scratch directory first.
    async fn acquire_source(
        &self,
        request: &WatermarkRequest,
        scratch: &Path,
        fallback: &str,
    ) -> Result<String, PipelineError> {
        if Url::parse(&request.key).is_ok() {
            return Ok(request.key.clone());
        }

        let local = scratch.join(format!("src-{}", fallback));
        match self.store.download(&request.key, &local).await {
            Ok(_) => Ok(local.to_string_lossy().into_owned()),
            Err(e) => {
                tracing::error!(key = %request.key, stage = %Stage::SourceFetched, error = %e, "request failed");
                Err(e)
            }
        }
    }

    /// Produce the logo the compositor overlays: the configured base logo,
    /// captioned when the request names a user, resized when the request
    /// carries target dimensions. Resize failure falls back to the
    /// pre-resize logo rather than aborting.
    fn prepare_logo(
        &self,
        request: &WatermarkRequest,
        scratch: &Path,
    ) -> Result<PathBuf, PipelineError> {
        let mut logo = self.config.logo_path.clone();

        if !request.name.is_empty() {
            let spec = CaptionSpec::resolve(
                &request.name,
                &request.fontsize,
                &request.fontcolor,
                &self.config.caption,
            );
            let rendered = match self.renderer.render(&self.config.logo_path, &spec, scratch) {
                Ok(rendered) => rendered,
                Err(e) => {
                    tracing::error!(key = %request.key, stage = %Stage::CaptionRendered, error = %e, "request failed");
                    return Err(e);
                }
            };
            tracing::debug!(
                path = %rendered.path.display(),
                x_offset = spec.x_offset,
                y_offset = spec.y_offset,
                "caption rendered"
            );
            logo = rendered.path;
        }

        if request.file_w > 0 && request.file_h > 0 {
            match resize_to_height(&logo, request.file_h, scratch) {
                Ok(asset) => logo = asset.path,
                Err(e) => {
                    tracing::warn!(
                        key = %request.key,
                        stage = %Stage::Resized,
                        error = %e,
                        "resize failed, continuing with unresized logo"
                    );
                }
            }
        } else if request.file_w > 0 || request.file_h > 0 {
            tracing::warn!(
                key = %request.key,
                file_w = request.file_w,
                file_h = request.file_h,
                "ignoring partial target dimensions"
            );
        }

        Ok(logo)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compositor::MockCompositor;
    use crate::overlay::test_support::{find_system_font, write_test_png};
    use crate::storage::MockObjectStore;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn test_config(dir: &TempDir) -> Arc<Config> {
        test_config_with(dir, |_| {})
    }

    fn test_config_with(dir: &TempDir, extra: impl FnOnce(&mut HashMap<String, String>)) -> Arc<Config> {
        let mut env = HashMap::new();
        env.insert("Bucket".to_string(), "media".to_string());
        env.insert("AwsAccessKey".to_string(), "ak".to_string());
        env.insert("AwsSecretKey".to_string(), "sk".to_string());
        env.insert("AwsRegion".to_string(), "us-east-1".to_string());
        env.insert(
            "WorkDir".to_string(),
            dir.path().to_string_lossy().into_owned(),
        );
        env.insert(
            "LogoPath".to_string(),
            dir.path().join("logo.png").to_string_lossy().into_owned(),
        );
        extra(&mut env);
        Arc::new(Config::from_lookup(|name| env.get(name).cloned()).unwrap())
    }

    fn pipeline(
        config: Arc<Config>,
        store: MockObjectStore,
        compositor: MockCompositor,
    ) -> Pipeline {
        Pipeline::new(config, Arc::new(store), Arc::new(compositor))
    }

    #[test]
    fn test_request_deserializes_original_event_shape() {
        let request: WatermarkRequest = serde_json::from_str(
            r#"{
                "channel": "app",
                "name": "bob",
                "key": "https://cdn/feed/b.jpg",
                "file_w": 100,
                "file_h": 50,
                "fontsize": "15",
                "fontcolor": "white"
            }"#,
        )
        .unwrap();
        assert_eq!(request.name, "bob");
        assert_eq!(request.key, "https://cdn/feed/b.jpg");
        assert_eq!((request.file_w, request.file_h), (100, 50));

        // All fields except the key are optional
        let request: WatermarkRequest = serde_json::from_str(r#"{"key": "a.jpg"}"#).unwrap();
        assert_eq!(request.name, "");
        assert_eq!(request.file_w, 0);
    }

    #[test]
    fn test_response_serializes_nested_body() {
        let response = WatermarkResponse::new("watermark/feed/b.jpg".to_string());
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["body"]["data"], "watermark/feed/b.jpg");
    }

    #[tokio::test]
    async fn test_url_source_without_caption_skips_caption_stage() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);
        write_test_png(&config.logo_path, 200, 60);
        let logo_path = config.logo_path.clone();

        let mut compositor = MockCompositor::new();
        compositor
            .expect_composite()
            .withf(move |source, overlay, offset, _output| {
                source == "https://cdn/video/a.mp4" && overlay == logo_path && *offset == (10, 10)
            })
            .times(1)
            .returning(|_, _, _, _| Ok(()));

        let mut store = MockObjectStore::new();
        store.expect_download().times(0);
        store
            .expect_upload()
            .withf(|key, _| key == "watermark/video/a.mp4")
            .times(1)
            .returning(|_, _| Ok(42));

        let pipeline = pipeline(config, store, compositor);
        let request = WatermarkRequest {
            key: "https://cdn/video/a.mp4".to_string(),
            ..Default::default()
        };

        let response = pipeline.handle(&request).await.unwrap();
        assert_eq!(response.body.data, "watermark/video/a.mp4");
    }

    #[tokio::test]
    async fn test_composite_failure_aborts_without_upload() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);
        write_test_png(&config.logo_path, 200, 60);

        let mut compositor = MockCompositor::new();
        compositor.expect_composite().times(1).returning(|_, _, _, _| {
            Err(PipelineError::Composite {
                diagnostic: "Invalid data found when processing input".to_string(),
            })
        });

        let mut store = MockObjectStore::new();
        store.expect_upload().times(0);

        let pipeline = pipeline(config, store, compositor);
        let request = WatermarkRequest {
            key: "https://cdn/video/a.mp4".to_string(),
            ..Default::default()
        };

        let err = pipeline.handle(&request).await.unwrap_err();
        assert!(matches!(err, PipelineError::Composite { .. }), "{err}");
    }

    #[tokio::test]
    async fn test_resize_failure_degrades_to_unresized_logo() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);
        // Undecodable logo: the resize stage fails, the pipeline proceeds
        // with the original file.
        std::fs::write(&config.logo_path, b"garbage bytes").unwrap();
        let logo_path = config.logo_path.clone();

        let mut compositor = MockCompositor::new();
        compositor
            .expect_composite()
            .withf(move |_, overlay, _, _| overlay == logo_path)
            .times(1)
            .returning(|_, _, _, _| Ok(()));

        let mut store = MockObjectStore::new();
        store
            .expect_upload()
            .times(1)
            .returning(|_, _| Ok(1));

        let pipeline = pipeline(config, store, compositor);
        let request = WatermarkRequest {
            key: "https://cdn/feed/b.jpg".to_string(),
            file_w: 100,
            file_h: 50,
            ..Default::default()
        };

        let response = pipeline.handle(&request).await.unwrap();
        assert_eq!(response.body.data, "watermark/feed/b.jpg");
    }

    #[tokio::test]
    async fn test_caption_and_resize_feed_compositor_a_scaled_logo() {
        let Some(font) = find_system_font() else {
            eprintln!("no system font available, skipping caption pipeline test");
            return;
        };

        let dir = TempDir::new().unwrap();
        let font_str = font.to_string_lossy().into_owned();
        let config = test_config_with(&dir, |env| {
            env.insert("FontPath".to_string(), font_str);
        });
        write_test_png(&config.logo_path, 200, 60);

        let mut compositor = MockCompositor::new();
        compositor
            .expect_composite()
            .withf(|_, overlay, _, _| {
                // 200x60 scaled to height 50 keeps the aspect ratio
                let logo = image::open(overlay).unwrap();
                (logo.width(), logo.height()) == (167, 50)
            })
            .times(1)
            .returning(|_, _, _, _| Ok(()));

        let mut store = MockObjectStore::new();
        store
            .expect_upload()
            .withf(|key, _| key == "watermark/feed/b.jpg")
            .times(1)
            .returning(|_, _| Ok(9));

        let pipeline = pipeline(config, store, compositor);
        let request = WatermarkRequest {
            name: "bob".to_string(),
            key: "https://cdn/feed/b.jpg".to_string(),
            file_w: 100,
            file_h: 50,
            ..Default::default()
        };

        let response = pipeline.handle(&request).await.unwrap();
        assert_eq!(response.body.data, "watermark/feed/b.jpg");
    }

    #[tokio::test]
    async fn test_bare_storage_key_is_downloaded_first() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);
        write_test_png(&config.logo_path, 200, 60);

        let mut store = MockObjectStore::new();
        store
            .expect_download()
            .withf(|key, _| key == "feed/sss.jpg")
            .times(1)
            .returning(|_, _| Ok(10));
        store
            .expect_upload()
            .withf(|key, _| key == "watermark/sss.jpg")
            .times(1)
            .returning(|_, _| Ok(10));

        let mut compositor = MockCompositor::new();
        compositor
            .expect_composite()
            .withf(|source, _, _, _| source.contains("src-") && source.ends_with("sss.jpg"))
            .times(1)
            .returning(|_, _, _, _| Ok(()));

        let pipeline = pipeline(config, store, compositor);
        let request = WatermarkRequest {
            key: "feed/sss.jpg".to_string(),
            ..Default::default()
        };

        let response = pipeline.handle(&request).await.unwrap();
        assert_eq!(response.body.data, "watermark/sss.jpg");
    }

    #[tokio::test]
    async fn test_download_failure_aborts_before_compositing() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);

        let mut store = MockObjectStore::new();
        store.expect_download().times(1).returning(|key, _| {
            Err(PipelineError::storage(
                crate::error::StoragePhase::Download,
                key,
                "NoSuchKey",
            ))
        });
        store.expect_upload().times(0);

        let mut compositor = MockCompositor::new();
        compositor.expect_composite().times(0);

        let pipeline = pipeline(config, store, compositor);
        let request = WatermarkRequest {
            key: "missing/object.mp4".to_string(),
            ..Default::default()
        };

        let err = pipeline.handle(&request).await.unwrap_err();
        assert!(matches!(err, PipelineError::Storage { .. }), "{err}");
    }

    #[tokio::test]
    async fn test_empty_key_rejected_before_any_work() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);

        let mut store = MockObjectStore::new();
        store.expect_download().times(0);
        store.expect_upload().times(0);
        let mut compositor = MockCompositor::new();
        compositor.expect_composite().times(0);

        let pipeline = pipeline(config, store, compositor);
        let err = pipeline
            .handle(&WatermarkRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidRequest(_)), "{err}");
    }

    fn remaining_files(dir: &TempDir) -> Vec<std::ffi::OsString> {
        let mut names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn test_completed_request_leaves_only_the_base_logo() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);
        write_test_png(&config.logo_path, 200, 60);

        let mut store = MockObjectStore::new();
        store.expect_download().times(1).returning(|_, dest| {
            std::fs::write(dest, b"source bytes").unwrap();
            Ok(12)
        });
        store.expect_upload().times(1).returning(|_, source| {
            assert!(source.exists(), "upload must see the composited file");
            Ok(10)
        });

        let mut compositor = MockCompositor::new();
        compositor
            .expect_composite()
            .times(1)
            .returning(|_, _, _, output| {
                std::fs::write(output, b"composited").unwrap();
                Ok(())
            });

        let pipeline = pipeline(config, store, compositor);
        let request = WatermarkRequest {
            key: "feed/sss.jpg".to_string(),
            ..Default::default()
        };

        pipeline.handle(&request).await.unwrap();
        assert_eq!(
            remaining_files(&dir),
            vec![std::ffi::OsString::from("logo.png")]
        );
    }

    #[tokio::test]
    async fn test_failed_request_leaves_only_the_base_logo() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);
        write_test_png(&config.logo_path, 200, 60);

        let mut store = MockObjectStore::new();
        store.expect_download().times(1).returning(|_, dest| {
            std::fs::write(dest, b"source bytes").unwrap();
            Ok(12)
        });
        store.expect_upload().times(0);

        let mut compositor = MockCompositor::new();
        compositor.expect_composite().times(1).returning(|_, _, _, _| {
            Err(PipelineError::Composite {
                diagnostic: "Invalid data found when processing input".to_string(),
            })
        });

        let pipeline = pipeline(config, store, compositor);
        let request = WatermarkRequest {
            key: "feed/sss.jpg".to_string(),
            ..Default::default()
        };

        pipeline.handle(&request).await.unwrap_err();
        assert_eq!(
            remaining_files(&dir),
            vec![std::ffi::OsString::from("logo.png")]
        );
    }
}
