// Sukashi watermark service library
// Overlays a logo (optionally captioned with a username) onto S3-hosted
// video/image assets and re-uploads the result under a derived key.

pub mod compositor;
pub mod config;
pub mod constants;
pub mod error;
pub mod keys;
pub mod logging;
pub mod overlay;
pub mod pipeline;
pub mod server;
pub mod storage;
