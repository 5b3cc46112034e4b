//! Original ↔ CDN WebP URL transcoding.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, trace, warn};
use url::Url;

use super::mapping_cache::MappingCache;
use crate::domain::entities::UrlDetails;
use crate::domain::errors::TranscodeError;

/// Host serving the WebP copies.
pub const DEFAULT_CDN_HOST: &str = "storage.cloud.google.com";

/// Bucket path under the CDN host. Starts and ends with `/`.
pub const DEFAULT_CDN_PATH_PREFIX: &str = "/cdn.ecarbon.kr/";

/// Path assumed in front of the filename when rebuilding an original URL.
pub const DEFAULT_ASSUMED_BASE_PATH: &str = "/";

/// Extensions tried, in order, when rebuilding an original URL.
pub const DEFAULT_ASSUMED_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// Schemes that never point at a fetchable image.
const INERT_SCHEMES: [&str; 4] = ["data:", "blob:", "javascript:", "about:"];

static IMAGE_URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^https://([^/]+)/(.+?)(?:\.(png|jpe?g)(?:\?.*)?$|[_=](png|jpe?g)(?:$|\?|&)|atchFileId=.*_(png|jpe?g)(?:$|\?|&))",
    )
    .expect("image URL pattern is valid")
});

/// Returns true for sources that must never be rewritten.
#[must_use]
pub fn is_inert_source(src: &str) -> bool {
    let src = src.trim();
    if src.is_empty() {
        return true;
    }
    let lower = src.to_ascii_lowercase();
    INERT_SCHEMES.iter().any(|scheme| lower.starts_with(scheme))
}

/// Percent-encodes the characters that would split a CDN path segment.
fn encode_segment(raw: &str) -> String {
    raw.replace('%', "%25")
        .replace('?', "%3F")
        .replace('&', "%26")
        .replace('=', "%3D")
}

/// Transcoder configuration.
#[derive(Debug, Clone)]
pub struct TranscoderConfig {
    /// CDN host.
    pub cdn_host: String,
    /// Bucket path under the CDN host.
    pub cdn_path_prefix: String,
    /// Default base path for rebuilt original URLs.
    pub assumed_base_path: String,
    /// Extensions tried when rebuilding original URLs.
    pub assumed_extensions: Vec<String>,
    /// Per-host base path overrides.
    pub base_path_overrides: HashMap<String, String>,
}

impl Default for TranscoderConfig {
    fn default() -> Self {
        Self {
            cdn_host: DEFAULT_CDN_HOST.to_string(),
            cdn_path_prefix: DEFAULT_CDN_PATH_PREFIX.to_string(),
            assumed_base_path: DEFAULT_ASSUMED_BASE_PATH.to_string(),
            assumed_extensions: DEFAULT_ASSUMED_EXTENSIONS
                .iter()
                .map(ToString::to_string)
                .collect(),
            base_path_overrides: HashMap::new(),
        }
    }
}

impl TranscoderConfig {
    /// Returns `https://{cdn_host}{cdn_path_prefix}`.
    #[must_use]
    pub fn cdn_url_prefix(&self) -> String {
        format!("https://{}{}", self.cdn_host, self.cdn_path_prefix)
    }

    /// Returns the normalized base path for an original host.
    ///
    /// The result always starts and ends with `/`.
    #[must_use]
    pub fn base_path_for(&self, host: &str) -> String {
        let bare_host = host.split('/').next().unwrap_or(host);
        let raw = self
            .base_path_overrides
            .get(bare_host)
            .unwrap_or(&self.assumed_base_path);

        let mut base = String::with_capacity(raw.len() + 2);
        if !raw.starts_with('/') {
            base.push('/');
        }
        base.push_str(raw);
        if !base.ends_with('/') {
            base.push('/');
        }
        base
    }
}

/// Derives CDN URLs from original image URLs and back.
#[derive(Debug)]
pub struct UrlTranscoder {
    config: TranscoderConfig,
    cache: MappingCache,
    enabled: bool,
}

impl UrlTranscoder {
    /// Creates an enabled transcoder with an empty mapping cache.
    #[must_use]
    pub fn new(config: TranscoderConfig) -> Self {
        Self {
            config,
            cache: MappingCache::new(),
            enabled: true,
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &TranscoderConfig {
        &self.config
    }

    /// Returns the mapping cache.
    #[must_use]
    pub const fn cache(&self) -> &MappingCache {
        &self.cache
    }

    /// Returns whether rewriting is switched on.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Switches rewriting on or off.
    pub fn set_enabled(&mut self, enabled: bool) {
        if self.enabled != enabled {
            debug!(enabled, "Transcoder state changed");
        }
        self.enabled = enabled;
    }

    /// Returns true if `url` already targets the CDN host.
    #[must_use]
    pub fn is_cdn_url(&self, url: &str) -> bool {
        url.contains(&self.config.cdn_host)
    }

    /// Maps an original image URL to its CDN WebP URL.
    ///
    /// Returns `None` when disabled, when `url` is already on the CDN,
    /// when it uses an inert scheme, or when it is not a recognised image URL.
    /// On success the pair is cached in both directions.
    pub fn to_cdn_url(&mut self, url: &str) -> Option<String> {
        let cdn_url = self.cdn_url_for(url)?;
        self.cache.insert_pair(url, &cdn_url);
        trace!(original = %url, cdn = %cdn_url, "Transcoded URL");
        Some(cdn_url)
    }

    /// Same mapping as [`Self::to_cdn_url`], leaving the cache untouched.
    #[must_use]
    pub fn cdn_url_for(&self, url: &str) -> Option<String> {
        if !self.enabled {
            return None;
        }
        if self.is_cdn_url(url) {
            trace!(url = %url, "Already a CDN URL, not transcoding");
            return None;
        }
        if is_inert_source(url) {
            return None;
        }

        self.derive_cdn_url(url).unwrap_or_else(|e| {
            warn!(error = %e, "Failed to transcode URL");
            None
        })
    }

    fn derive_cdn_url(&self, url: &str) -> Result<Option<String>, TranscodeError> {
        let Some(captures) = IMAGE_URL_RE.captures(url) else {
            return Ok(None);
        };
        let Some(host) = captures.get(1).map(|m| m.as_str()) else {
            return Ok(None);
        };

        let parsed = Url::parse(url).map_err(|e| TranscodeError::invalid_url(url, e.to_string()))?;

        // Queries carrying paths are dropped; they would nest segments.
        let query = match parsed.query() {
            Some(q) if !q.is_empty() && !q.contains('/') => format!("?{q}"),
            _ => String::new(),
        };
        let details = UrlDetails::from_url(&parsed);

        Ok(Some(format!(
            "{}{host}/{}{}.webp",
            self.config.cdn_url_prefix(),
            encode_segment(&query),
            encode_segment(&details.filename_base),
        )))
    }

    /// Rebuilds candidate original URLs from a CDN URL that failed to load.
    ///
    /// A cached pair is authoritative and returned alone. Otherwise one
    /// candidate per assumed extension is derived from the CDN path.
    /// Returns an empty list when `failed_cdn_url` is not shaped like one
    /// of our CDN URLs.
    #[must_use]
    pub fn reconstruct_original(&self, failed_cdn_url: &str) -> Vec<String> {
        if let Some(cached) = self.cache.lookup(failed_cdn_url) {
            debug!(original = %cached, "Using cached original URL");
            return vec![cached.to_string()];
        }

        let prefix = self.config.cdn_url_prefix();
        let Some(dynamic_part) = failed_cdn_url
            .strip_prefix(prefix.as_str())
            .filter(|_| failed_cdn_url.ends_with(".webp"))
        else {
            warn!(url = %failed_cdn_url, "URL does not match the CDN .webp pattern");
            return Vec::new();
        };

        let mut parts: Vec<&str> = dynamic_part.split('/').collect();
        if parts.len() < 2 {
            warn!(path = %dynamic_part, "CDN path is not <host>/<file>.webp");
            return Vec::new();
        }

        let file = parts.pop().unwrap_or_default();
        let stem = file.strip_suffix(".webp").unwrap_or(file);
        let host = parts.join("/");

        if host.is_empty() || stem.is_empty() {
            warn!(path = %dynamic_part, "Cannot parse host or filename from CDN path");
            return Vec::new();
        }

        let mut base_path = self.config.base_path_for(&host);
        if base_path == "/" && stem.starts_with('/') {
            base_path.clear();
        }

        self.config
            .assumed_extensions
            .iter()
            .map(|ext| format!("https://{host}{base_path}{stem}.{ext}"))
            .collect()
    }
}

impl Default for UrlTranscoder {
    fn default() -> Self {
        Self::new(TranscoderConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    const CDN: &str = "https://storage.cloud.google.com/cdn.ecarbon.kr/";

    #[test]
    fn test_basic_rewrite() {
        let mut transcoder = UrlTranscoder::default();
        let cdn = transcoder.to_cdn_url("https://img.example.com/a/b/photo.jpg");

        assert_eq!(
            cdn.as_deref(),
            Some("https://storage.cloud.google.com/cdn.ecarbon.kr/img.example.com/photo.webp")
        );
    }

    #[test_case("https://a.com/x/PHOTO.JPG", "a.com/PHOTO.webp" ; "uppercase_extension")]
    #[test_case("https://a.com/pic.jpeg?w=100", "a.com/%3Fw%3D100pic.webp" ; "query_encoded")]
    #[test_case("https://a.com/img.php?path=/x/y.png", "a.com/img.webp" ; "query_with_slash_dropped")]
    #[test_case(
        "https://a.com/download.do?atchFileId=FILE_0001_jpg&fileSn=1",
        "a.com/%3FatchFileId%3DFILE_0001_jpg%26fileSn%3D1download.webp" ;
        "attachment_id"
    )]
    #[test_case("https://a.com/view?file=name.png", "a.com/%3Ffile%3Dname.pngview.webp" ; "file_param")]
    fn test_rewrite_shapes(original: &str, expected_suffix: &str) {
        let mut transcoder = UrlTranscoder::default();
        assert_eq!(
            transcoder.to_cdn_url(original),
            Some(format!("{CDN}{expected_suffix}"))
        );
    }

    #[test_case("http://a.com/x.jpg" ; "plain_http")]
    #[test_case("https://a.com/x.gif" ; "other_extension")]
    #[test_case("data:image/png;base64,AAAA" ; "data_uri")]
    #[test_case("blob:https://a.com/123" ; "blob_uri")]
    #[test_case("https://storage.cloud.google.com/cdn.ecarbon.kr/a.com/x.webp" ; "cdn_url")]
    #[test_case("https://storage.cloud.google.com/other/x.jpg" ; "cdn_host_other_path")]
    fn test_no_rewrite(url: &str) {
        let mut transcoder = UrlTranscoder::default();
        assert_eq!(transcoder.to_cdn_url(url), None);
    }

    #[test]
    fn test_disabled_transcoder_never_rewrites() {
        let mut transcoder = UrlTranscoder::default();
        transcoder.set_enabled(false);
        assert_eq!(transcoder.to_cdn_url("https://a.com/x.jpg"), None);
        assert!(transcoder.cache().is_empty());
    }

    #[test]
    fn test_rewrite_is_cached_both_ways() {
        let mut transcoder = UrlTranscoder::default();
        let original = "https://a.com/x/y.png";
        let cdn = transcoder.to_cdn_url(original).unwrap();

        assert_eq!(transcoder.cache().lookup(original), Some(cdn.as_str()));
        assert_eq!(transcoder.cache().lookup(&cdn), Some(original));
        assert_eq!(transcoder.reconstruct_original(&cdn), vec![original.to_string()]);
    }

    #[test]
    fn test_reconstruct_without_cache() {
        let transcoder = UrlTranscoder::default();
        let candidates = transcoder.reconstruct_original(
            "https://storage.cloud.google.com/cdn.ecarbon.kr/img.example.com/photo.webp",
        );

        assert_eq!(
            candidates,
            vec![
                "https://img.example.com/photo.png",
                "https://img.example.com/photo.jpg",
                "https://img.example.com/photo.jpeg",
            ]
        );
    }

    #[test_case("https://other.cdn/x/a.com/photo.webp" ; "wrong_prefix")]
    #[test_case("https://storage.cloud.google.com/cdn.ecarbon.kr/a.com/photo.png" ; "not_webp")]
    #[test_case("https://storage.cloud.google.com/cdn.ecarbon.kr/photo.webp" ; "missing_host")]
    #[test_case("https://storage.cloud.google.com/cdn.ecarbon.kr/a.com/.webp" ; "empty_stem")]
    fn test_reconstruct_rejects(url: &str) {
        let transcoder = UrlTranscoder::default();
        assert!(transcoder.reconstruct_original(url).is_empty());
    }

    #[test]
    fn test_round_trip_recovers_host_and_stem() {
        let originals = [
            "https://img.example.com/a/b/photo.jpg",
            "https://shop.example.org/p/1/thumb.PNG",
            "https://x.io/deep/er/path/pic.jpeg",
        ];

        for original in originals {
            let cdn = UrlTranscoder::default().to_cdn_url(original).unwrap();
            let candidates = UrlTranscoder::default().reconstruct_original(&cdn);
            let details = UrlDetails::parse(original);

            assert!(
                candidates.iter().any(|c| {
                    let got = UrlDetails::parse(c);
                    got.domain == details.domain && got.filename_base == details.filename_base
                }),
                "no candidate for {original} in {candidates:?}"
            );
        }
    }

    #[test]
    fn test_base_path_override() {
        let mut config = TranscoderConfig::default();
        config
            .base_path_overrides
            .insert("img.example.com".to_string(), "images".to_string());
        config.assumed_extensions = vec!["png".to_string()];
        let transcoder = UrlTranscoder::new(config);

        let candidates = transcoder.reconstruct_original(
            "https://storage.cloud.google.com/cdn.ecarbon.kr/img.example.com/photo.webp",
        );
        assert_eq!(candidates, vec!["https://img.example.com/images/photo.png"]);
    }

    #[test_case("/", "/" ; "root")]
    #[test_case("assets", "/assets/" ; "bare")]
    #[test_case("/assets", "/assets/" ; "leading_only")]
    fn test_base_path_normalization(raw: &str, expected: &str) {
        let config = TranscoderConfig {
            assumed_base_path: raw.to_string(),
            ..TranscoderConfig::default()
        };
        assert_eq!(config.base_path_for("a.com"), expected);
    }

    #[test_case("", true ; "empty")]
    #[test_case("data:image/gif;base64,R0lG", true ; "data")]
    #[test_case("javascript:void(0)", true ; "script")]
    #[test_case("about:blank", true ; "about")]
    #[test_case("https://a.com/x.jpg", false ; "https")]
    fn test_inert_sources(src: &str, expected: bool) {
        assert_eq!(is_inert_source(src), expected);
    }
}
