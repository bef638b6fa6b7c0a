//! External compositing collaborator.
//!
//! Compositing is delegated to ffmpeg: the logo is overlaid onto the source
//! asset (image or video) at a fixed pixel offset. The tool is modeled as a
//! narrow trait so tests can swap it for a mock without spawning a process.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use crate::config::Config;
use crate::error::PipelineError;

/// Invokes the external compositing tool.
///
/// Contract: on success a usable output file exists at `output`; any
/// non-zero exit means no usable output and surfaces the tool's diagnostic
/// text. `offset` is in pixels from the top-left of the source asset.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Compositor: Send + Sync {
    async fn composite(
        &self,
        source: &str,
        overlay: &Path,
        offset: (u32, u32),
        output: &Path,
    ) -> Result<(), PipelineError>;
}

/// Shells out to ffmpeg with an overlay filter.
#[derive(Debug, Clone)]
pub struct FfmpegCompositor {
    binary: String,
    timeout: Duration,
}

impl FfmpegCompositor {
    pub fn new(config: &Config) -> Self {
        Self {
            binary: config.ffmpeg_path.clone(),
            timeout: config.ffmpeg_timeout,
        }
    }

    pub fn with_binary(binary: impl Into<String>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            timeout,
        }
    }
}

#[async_trait]
impl Compositor for FfmpegCompositor {
    async fn composite(
        &self,
        source: &str,
        overlay: &Path,
        offset: (u32, u32),
        output: &Path,
    ) -> Result<(), PipelineError> {
        let filter = format!("overlay={}:{}", offset.0, offset.1);

        let mut command = Command::new(&self.binary);
        command
            .arg("-i")
            .arg(source)
            .arg("-i")
            .arg(overlay)
            .arg("-filter_complex")
            .arg(&filter)
            .arg("-y")
            .arg(output)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        tracing::debug!(binary = %self.binary, source, overlay = %overlay.display(), %filter, "invoking compositor");

        let result = tokio::time::timeout(self.timeout, command.output())
            .await
            .map_err(|_| PipelineError::Composite {
                diagnostic: format!(
                    "{} timed out after {}s",
                    self.binary,
                    self.timeout.as_secs()
                ),
            })?
            .map_err(|e| PipelineError::Composite {
                diagnostic: format!("failed to spawn {}: {}", self.binary, e),
            })?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(PipelineError::Composite {
                diagnostic: format!("{} exited with {}: {}", self.binary, result.status, stderr.trim()),
            });
        }

        // A zero exit with no output file still means there is nothing to upload.
        if tokio::fs::metadata(output).await.is_err() {
            return Err(PipelineError::Composite {
                diagnostic: format!("{} produced no output file", self.binary),
            });
        }

        Ok(())
    }
}
