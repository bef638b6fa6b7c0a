//! Object storage gateway.
//!
//! Download/upload primitives over S3 with part-size and concurrency tuning
//! for large objects. Transfers above the configured part size are split
//! into concurrent ranged GETs / multipart PUTs; this parallelism lives
//! entirely inside the gateway, the pipeline above it stays sequential.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_credential_types::Credentials;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use aws_sdk_s3::Client;
use futures::stream::{self, StreamExt, TryStreamExt};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

use crate::config::Config;
use crate::error::{PipelineError, StoragePhase};

/// Download-by-key and upload-by-key primitives.
///
/// Both report the number of bytes transferred for observability.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Download an object to a local file, returning bytes transferred.
    async fn download(&self, key: &str, dest: &Path) -> Result<u64, PipelineError>;

    /// Upload a local file under the given key, returning bytes transferred.
    async fn upload(&self, key: &str, source: &Path) -> Result<u64, PipelineError>;
}

/// S3-backed [`ObjectStore`] using static credentials.
#[derive(Debug, Clone)]
pub struct S3Store {
    client: Client,
    bucket: String,
    part_size: u64,
    concurrency: usize,
}

impl S3Store {
    /// Build the S3 client from configuration. A custom endpoint switches
    /// the client to path-style addressing for MinIO/LocalStack.
    pub async fn new(config: &Config) -> Self {
        let credentials = Credentials::new(
            &config.access_key,
            &config.secret_key,
            None,
            None,
            "sukashi-static",
        );

        let shared = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .credentials_provider(credentials)
            .load()
            .await;

        let mut builder = aws_sdk_s3::config::Builder::from(&shared);
        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        Self {
            client: Client::from_conf(builder.build()),
            bucket: config.bucket.clone(),
            part_size: config.part_size,
            concurrency: config.transfer_concurrency,
        }
    }

    async fn download_ranged(
        &self,
        key: &str,
        dest: &Path,
        size: u64,
    ) -> Result<(), PipelineError> {
        let mut file = tokio::fs::File::create(dest)
            .await
            .map_err(|e| download_err(key, e))?;
        file.set_len(size).await.map_err(|e| download_err(key, e))?;

        let fetches = part_ranges(size, self.part_size).into_iter().map(|(start, len)| {
            let client = self.client.clone();
            let bucket = self.bucket.clone();
            let key = key.to_string();
            async move {
                let range = format!("bytes={}-{}", start, start + len - 1);
                let resp = client
                    .get_object()
                    .bucket(&bucket)
                    .key(&key)
                    .range(range)
                    .send()
                    .await
                    .map_err(|e| download_err(&key, DisplayErrorContext(&e)))?;
                let data = resp
                    .body
                    .collect()
                    .await
                    .map_err(|e| download_err(&key, e))?
                    .into_bytes();
                Ok::<_, PipelineError>((start, data))
            }
        });

        let mut chunks = stream::iter(fetches).buffer_unordered(self.concurrency);
        while let Some(chunk) = chunks.next().await {
            let (start, data) = chunk?;
            file.seek(SeekFrom::Start(start))
                .await
                .map_err(|e| download_err(key, e))?;
            file.write_all(&data)
                .await
                .map_err(|e| download_err(key, e))?;
        }
        file.flush().await.map_err(|e| download_err(key, e))?;
        Ok(())
    }

    async fn upload_multipart(
        &self,
        key: &str,
        source: &Path,
        size: u64,
    ) -> Result<(), PipelineError> {
        let created = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| upload_err(key, DisplayErrorContext(&e)))?;
        let upload_id = created
            .upload_id()
            .ok_or_else(|| upload_err(key, "multipart upload id missing from response"))?
            .to_string();

        match self.upload_parts(key, source, size, &upload_id).await {
            Ok(parts) => {
                let completed = CompletedMultipartUpload::builder()
                    .set_parts(Some(parts))
                    .build();
                self.client
                    .complete_multipart_upload()
                    .bucket(&self.bucket)
                    .key(key)
                    .upload_id(&upload_id)
                    .multipart_upload(completed)
                    .send()
                    .await
                    .map_err(|e| upload_err(key, DisplayErrorContext(&e)))?;
                Ok(())
            }
            Err(err) => {
                if let Err(abort_err) = self
                    .client
                    .abort_multipart_upload()
                    .bucket(&self.bucket)
                    .key(key)
                    .upload_id(&upload_id)
                    .send()
                    .await
                {
                    tracing::warn!(
                        key,
                        error = %DisplayErrorContext(&abort_err),
                        "failed to abort multipart upload"
                    );
                }
                Err(err)
            }
        }
    }

    async fn upload_parts(
        &self,
        key: &str,
        source: &Path,
        size: u64,
        upload_id: &str,
    ) -> Result<Vec<CompletedPart>, PipelineError> {
        let uploads = part_ranges(size, self.part_size)
            .into_iter()
            .enumerate()
            .map(|(index, (start, len))| {
                let client = self.client.clone();
                let bucket = self.bucket.clone();
                let key = key.to_string();
                let upload_id = upload_id.to_string();
                let source: PathBuf = source.to_path_buf();
                async move {
                    let part_number = index as i32 + 1;
                    let buf = read_range(&source, start, len)
                        .await
                        .map_err(|e| upload_err(&key, e))?;
                    let part = client
                        .upload_part()
                        .bucket(&bucket)
                        .key(&key)
                        .upload_id(&upload_id)
                        .part_number(part_number)
                        .body(ByteStream::from(buf))
                        .send()
                        .await
                        .map_err(|e| upload_err(&key, DisplayErrorContext(&e)))?;
                    let e_tag = part.e_tag().unwrap_or_default().to_string();
                    Ok::<_, PipelineError>((part_number, e_tag))
                }
            });

        let mut parts: Vec<(i32, String)> = stream::iter(uploads)
            .buffer_unordered(self.concurrency)
            .try_collect()
            .await?;
        parts.sort_by_key(|(number, _)| *number);

        Ok(parts
            .into_iter()
            .map(|(number, e_tag)| {
                CompletedPart::builder()
                    .part_number(number)
                    .e_tag(e_tag)
                    .build()
            })
            .collect())
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn download(&self, key: &str, dest: &Path) -> Result<u64, PipelineError> {
        let head = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| download_err(key, DisplayErrorContext(&e)))?;
        let size = head.content_length().unwrap_or(0).max(0) as u64;

        if size > self.part_size {
            self.download_ranged(key, dest, size).await?;
            tracing::info!(key, bytes = size, "download complete");
            return Ok(size);
        }

        let resp = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| download_err(key, DisplayErrorContext(&e)))?;
        let data = resp
            .body
            .collect()
            .await
            .map_err(|e| download_err(key, e))?
            .into_bytes();
        tokio::fs::write(dest, &data)
            .await
            .map_err(|e| download_err(key, e))?;

        let bytes = data.len() as u64;
        tracing::info!(key, bytes, "download complete");
        Ok(bytes)
    }

    async fn upload(&self, key: &str, source: &Path) -> Result<u64, PipelineError> {
        let size = tokio::fs::metadata(source)
            .await
            .map_err(|e| upload_err(key, e))?
            .len();

        if size > self.part_size {
            self.upload_multipart(key, source, size).await?;
        } else {
            let body = ByteStream::from_path(source)
                .await
                .map_err(|e| upload_err(key, e))?;
            self.client
                .put_object()
                .bucket(&self.bucket)
                .key(key)
                .body(body)
                .send()
                .await
                .map_err(|e| upload_err(key, DisplayErrorContext(&e)))?;
        }

        tracing::info!(key, bytes = size, "upload complete");
        Ok(size)
    }
}

fn download_err(key: &str, reason: impl std::fmt::Display) -> PipelineError {
    PipelineError::storage(StoragePhase::Download, key, reason)
}

fn upload_err(key: &str, reason: impl std::fmt::Display) -> PipelineError {
    PipelineError::storage(StoragePhase::Upload, key, reason)
}

async fn read_range(path: &Path, start: u64, len: u64) -> Result<Vec<u8>, std::io::Error> {
    let mut file = tokio::fs::File::open(path).await?;
    file.seek(SeekFrom::Start(start)).await?;
    let mut buf = vec![0u8; len as usize];
    file.read_exact(&mut buf).await?;
    Ok(buf)
}

/// Split `total` bytes into `(start, len)` ranges of at most `part_size`.
fn part_ranges(total: u64, part_size: u64) -> Vec<(u64, u64)> {
    let mut ranges = Vec::new();
    let mut start = 0;
    while start < total {
        let len = part_size.min(total - start);
        ranges.push((start, len));
        start += len;
    }
    ranges
}
