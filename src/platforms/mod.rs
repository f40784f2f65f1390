use async_trait::async_trait;
use regex::Regex;
use std::path::Path;
use url::Url;

pub mod bilibili;
pub mod douyin;
pub mod scrape;
pub mod web;
pub mod xiaohongshu;
pub mod xiaoyuzhou;

use crate::context::RunContext;
use crate::fallback::StepError;
use crate::fetch::Page;
use crate::metadata::Metadata;
use crate::source::{Platform, Source};
use crate::subtitles::SubtitleReport;
use crate::utils::host_matches;

/// Where a platform-native identifier is read from
#[derive(Debug)]
enum IdLocation {
    /// Value of a query parameter, which must fully match the pattern
    Query(&'static str),
    /// First capture group of the pattern applied to the URL path
    Path,
    /// First capture group of the pattern applied to the whole URL
    Anywhere,
}

/// One declarative identifier extraction rule
#[derive(Debug)]
pub struct IdRule {
    location: IdLocation,
    pattern: Regex,
}

impl IdRule {
    pub fn query(key: &'static str, pattern: &str) -> Self {
        Self::build(IdLocation::Query(key), &format!("^(?:{pattern})$"))
    }

    pub fn path(pattern: &str) -> Self {
        Self::build(IdLocation::Path, pattern)
    }

    pub fn anywhere(pattern: &str) -> Self {
        Self::build(IdLocation::Anywhere, pattern)
    }

    // Rules are compile-time constants; a bad one is a programming error.
    fn build(location: IdLocation, pattern: &str) -> Self {
        Self {
            location,
            pattern: Regex::new(pattern).expect("valid id rule"),
        }
    }

    pub fn extract(&self, url: &Url) -> Option<String> {
        match &self.location {
            IdLocation::Query(key) => url
                .query_pairs()
                .find(|(name, _)| name == key)
                .map(|(_, value)| value.into_owned())
                .filter(|value| self.pattern.is_match(value)),
            IdLocation::Path => self.capture(url.path()),
            IdLocation::Anywhere => self.capture(url.as_str()),
        }
    }

    fn capture(&self, haystack: &str) -> Option<String> {
        let caps = self.pattern.captures(haystack)?;
        caps.get(1)
            .or_else(|| caps.get(0))
            .map(|m| m.as_str().to_string())
    }
}

/// First identifier produced by `rules`, in order
pub fn first_match(rules: &[IdRule], url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    rules.iter().find_map(|rule| rule.extract(&parsed))
}

/// Result of normalizing one URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Normalized {
    pub url: String,
    pub identifier: Option<String>,
}

impl Normalized {
    pub fn passthrough(url: &str) -> Self {
        Self {
            url: url.to_string(),
            identifier: None,
        }
    }
}

/// A playable media link and the strategy that produced it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaLink {
    pub url: String,
    pub via: String,
    /// Extra metadata learned while resolving (title, author, ids)
    pub title: Option<String>,
    pub author: Option<String>,
}

impl MediaLink {
    pub fn new(url: impl Into<String>, via: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            via: via.into(),
            title: None,
            author: None,
        }
    }
}

/// Per-platform acquisition behaviour, selected by [`Platform`] through the registry
#[async_trait]
pub trait PlatformStrategy: Send + Sync {
    fn platform(&self) -> Platform;

    /// Hosts owned by this platform; subdomains match on label boundaries
    fn domains(&self) -> &'static [&'static str];

    /// Hosts that only redirect to a long-form URL
    fn short_link_domains(&self) -> &'static [&'static str] {
        &[]
    }

    /// Whether subtitle and audio stages apply
    fn is_media(&self) -> bool;

    /// Ordered identifier rules; the first match wins
    fn id_rules(&self) -> &'static [IdRule] {
        &[]
    }

    /// Canonical URL for an identifier
    fn canonical_url(&self, identifier: &str) -> String;

    /// Length of the most specific owned domain matching `host`
    fn match_host(&self, host: &str) -> Option<usize> {
        self.domains()
            .iter()
            .filter(|domain| host_matches(host, domain))
            .map(|domain| domain.len())
            .max()
    }

    fn is_short_link(&self, url: &str) -> bool {
        crate::utils::host_of(url).is_some_and(|host| {
            self.short_link_domains()
                .iter()
                .any(|domain| host_matches(&host, domain))
        })
    }

    fn extract_id(&self, url: &str) -> Option<String> {
        first_match(self.id_rules(), url)
    }

    /// Canonical form of `url`; a URL without an identifier passes through unchanged
    fn normalize(&self, url: &str) -> Normalized {
        match self.extract_id(url) {
            Some(identifier) => Normalized {
                url: self.canonical_url(&identifier),
                identifier: Some(identifier),
            },
            None => Normalized::passthrough(url),
        }
    }

    /// Platform metadata; `None` when the platform has no metadata strategy at all.
    ///
    /// `reader` is the reader-proxy rendering the pipeline already fetched, if that succeeded.
    async fn resolve_metadata(
        &self,
        _ctx: &RunContext,
        _source: &Source,
        _reader: Option<Page>,
    ) -> Option<Metadata> {
        None
    }

    /// Pull existing subtitle tracks into `workdir` with the external downloader
    async fn extract_subtitles(
        &self,
        ctx: &RunContext,
        source: &Source,
        workdir: &Path,
    ) -> SubtitleReport {
        crate::subtitles::extract(ctx, source.target(), workdir).await
    }

    /// Transcript text embedded in the platform's own subtitle JSON
    async fn fetch_embedded_transcript(
        &self,
        _ctx: &RunContext,
        _metadata: &Metadata,
    ) -> Result<String, StepError> {
        Err(StepError::skipped("platform has no embedded subtitle tracks"))
    }

    /// Playable media link, when the platform hides it behind an indirection
    async fn resolve_media_link(
        &self,
        _ctx: &RunContext,
        _source: &Source,
        metadata: Option<&Metadata>,
    ) -> Result<MediaLink, StepError> {
        metadata
            .and_then(|meta| meta.media_url.clone())
            .map(|url| MediaLink::new(url, "metadata"))
            .ok_or_else(|| StepError::skipped("no media link in metadata"))
    }

    /// URLs handed to the downloader directly, in priority order
    fn download_variants(&self, _ctx: &RunContext, source: &Source) -> Vec<String> {
        unique_urls([source.canonical_url.clone(), source.original_url.clone()])
    }
}

/// Present URLs in order, without repeats
pub fn unique_urls(candidates: impl IntoIterator<Item = Option<String>>) -> Vec<String> {
    let mut urls: Vec<String> = Vec::new();
    for url in candidates.into_iter().flatten() {
        if !urls.contains(&url) {
            urls.push(url);
        }
    }
    urls
}

/// Registry of platform strategies, keyed by [`Platform`]
pub struct PlatformRegistry {
    strategies: Vec<Box<dyn PlatformStrategy>>,
}

impl PlatformRegistry {
    /// Create a registry with every built-in platform
    pub fn new() -> Self {
        let mut registry = Self {
            strategies: Vec::new(),
        };

        registry.register(Box::new(bilibili::BilibiliStrategy::new()));
        registry.register(Box::new(douyin::DouyinStrategy::new()));
        registry.register(Box::new(xiaohongshu::XiaohongshuStrategy::new()));
        registry.register(Box::new(xiaoyuzhou::XiaoyuzhouStrategy::new()));
        registry.register(Box::new(web::WebStrategy::new()));

        registry
    }

    /// Register a strategy, replacing any existing one for the same platform
    pub fn register(&mut self, strategy: Box<dyn PlatformStrategy>) {
        let platform = strategy.platform();
        self.strategies.retain(|existing| existing.platform() != platform);
        self.strategies.push(strategy);
    }

    /// Platform owning `host`; the longest matching domain wins, unknown hosts are web
    pub fn detect(&self, host: &str) -> Platform {
        let host = host.trim_end_matches('.').to_ascii_lowercase();
        self.strategies
            .iter()
            .filter_map(|strategy| strategy.match_host(&host).map(|len| (len, strategy.platform())))
            .max_by_key(|(len, _)| *len)
            .map(|(_, platform)| platform)
            .unwrap_or(Platform::Web)
    }

    pub fn get(&self, platform: Platform) -> Option<&dyn PlatformStrategy> {
        self.strategies
            .iter()
            .find(|strategy| strategy.platform() == platform)
            .map(|boxed| boxed.as_ref())
    }

    /// Registered platforms with their domains
    pub fn list_platforms(&self) -> Vec<(Platform, &'static [&'static str])> {
        let mut platforms: Vec<_> = self
            .strategies
            .iter()
            .map(|strategy| (strategy.platform(), strategy.domains()))
            .collect();
        platforms.sort_by_key(|(platform, _)| *platform);
        platforms
    }
}

impl Default for PlatformRegistry {
    fn default() -> Self {
        Self::new()
    }
}
