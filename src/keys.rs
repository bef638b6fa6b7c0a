//! Storage key derivation.
//!
//! Maps a source locator (full URL or bare storage key) to the relative S3
//! key of the source asset, and from there to the destination key of the
//! watermarked copy. Derivation is deterministic and never fails: unparseable
//! locators degrade to the caller-provided fallback name.

use url::Url;

use crate::constants::WATERMARK_PREFIX;

/// Derive the relative storage key of the source asset.
///
/// Parses `locator` as a URL and takes its percent-decoded path component
/// with a single leading `/` stripped, so a source stored under a key with
/// spaces or non-ASCII characters maps back to that same key. When decoding
/// fails or yields nothing the encoded path is used instead; when parsing
/// fails the `fallback` name is returned unchanged, so the result is always
/// usable.
///
/// `derive_source_key("https://host/feed/sss.jpg", "sss.jpg")` yields
/// `"feed/sss.jpg"`, preserving the directory hierarchy beneath the source
/// so unrelated assets cannot collide.
pub fn derive_source_key(locator: &str, fallback: &str) -> String {
    let parsed = match Url::parse(locator) {
        Ok(url) => url,
        Err(_) => return fallback.to_string(),
    };

    let path = match urlencoding::decode(parsed.path()) {
        Ok(decoded) if !decoded.is_empty() => decoded.into_owned(),
        _ => parsed.path().to_string(),
    };
    path.strip_prefix('/').unwrap_or(&path).to_string()
}

/// Destination key of the watermarked copy: the source key under a fixed
/// prefix directory.
pub fn destination_key(source_key: &str) -> String {
    format!("{}{}", WATERMARK_PREFIX, source_key)
}

/// Last path segment of a locator, used as the fallback name and as the
/// local filename of the composited output.
pub fn base_name(locator: &str) -> String {
    let trimmed = locator.trim_end_matches('/');
    trimmed
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or(trimmed)
        .to_string()
}
