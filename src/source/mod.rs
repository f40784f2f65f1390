use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

use crate::platforms::PlatformRegistry;
use crate::AcquireError;

/// Platform family an input belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Web,
    Bilibili,
    Douyin,
    Xiaohongshu,
    Xiaoyuzhou,
    /// Topic inputs, answered by a search
    Search,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Web => "web",
            Platform::Bilibili => "bilibili",
            Platform::Douyin => "douyin",
            Platform::Xiaohongshu => "xiaohongshu",
            Platform::Xiaoyuzhou => "xiaoyuzhou",
            Platform::Search => "search",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Platform::Web => "Web page",
            Platform::Bilibili => "Bilibili",
            Platform::Douyin => "Douyin",
            Platform::Xiaohongshu => "Xiaohongshu",
            Platform::Xiaoyuzhou => "Xiaoyuzhou FM",
            Platform::Search => "Topic search",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Url,
    Topic,
}

/// A classified and normalized input
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Source {
    /// Raw input, trimmed
    pub input: String,
    pub kind: SourceKind,
    pub platform: Platform,
    pub original_url: Option<String>,
    /// Always an absolute URL when `kind` is `url`
    pub canonical_url: Option<String>,
    /// Platform-native primary key, when one could be extracted
    pub identifier: Option<String>,
}

impl Source {
    /// Canonical URL for URL inputs, the topic text otherwise
    pub fn target(&self) -> &str {
        self.canonical_url.as_deref().unwrap_or(&self.input)
    }

    pub fn is_url(&self) -> bool {
        self.kind == SourceKind::Url
    }

    /// Re-run platform detection and normalization on an expanded URL, keeping the original input
    pub fn renormalize(&self, url: &str, registry: &PlatformRegistry) -> Option<Source> {
        if !is_url(url) {
            return None;
        }
        let mut expanded = classify_url(url, registry);
        expanded.input = self.input.clone();
        expanded.original_url = self.original_url.clone();
        Some(expanded)
    }
}

/// Whether `input` is an absolute http(s) URL with a host
pub fn is_url(input: &str) -> bool {
    match Url::parse(input.trim()) {
        Ok(url) => {
            matches!(url.scheme(), "http" | "https")
                && url.host_str().is_some_and(|host| !host.is_empty())
        }
        Err(_) => false,
    }
}

/// Decide kind and platform, and normalize platform URLs.
///
/// Only empty input is rejected; anything that is not an absolute http(s) URL is a topic.
pub fn classify(input: &str, registry: &PlatformRegistry) -> Result<Source, AcquireError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(AcquireError::Classification("input is empty".to_string()));
    }

    if !is_url(trimmed) {
        return Ok(Source {
            input: trimmed.to_string(),
            kind: SourceKind::Topic,
            platform: Platform::Search,
            original_url: None,
            canonical_url: None,
            identifier: None,
        });
    }

    Ok(classify_url(trimmed, registry))
}

fn classify_url(url: &str, registry: &PlatformRegistry) -> Source {
    let platform = crate::utils::host_of(url)
        .map(|host| registry.detect(&host))
        .unwrap_or(Platform::Web);

    let normalized = match registry.get(platform) {
        Some(strategy) => strategy.normalize(url),
        None => crate::platforms::Normalized::passthrough(url),
    };

    Source {
        input: url.to_string(),
        kind: SourceKind::Url,
        platform,
        original_url: Some(url.to_string()),
        canonical_url: Some(normalized.url),
        identifier: normalized.identifier,
    }
}
