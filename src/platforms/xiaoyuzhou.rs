use async_trait::async_trait;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

use super::scrape::{self, absolute_https};
use super::{IdRule, MediaLink, PlatformStrategy};
use crate::context::RunContext;
use crate::fallback::{FallbackChain, StepError};
use crate::fetch::{FetchRequest, Page};
use crate::metadata::Metadata;
use crate::source::{Platform, Source};

static RULES: Lazy<Vec<IdRule>> =
    Lazy::new(|| vec![IdRule::path(r"/episode/([0-9a-zA-Z]+)")]);

static AUDIO_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#""url"\s*:\s*"(https?:[^"]+?\.(?:m4a|mp3|aac)[^"]*)""#).expect("valid audio regex")
});

static DURATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""duration"\s*:\s*(\d+)"#).expect("valid duration regex"));

/// Episode fields scraped from the episode page
#[derive(Debug, Default)]
struct EpisodePage {
    title: Option<String>,
    podcast: Option<String>,
    description: Option<String>,
    audio_url: Option<String>,
    cover: Option<String>,
    published_at: Option<DateTime<Utc>>,
    duration_sec: Option<u64>,
}

impl EpisodePage {
    fn parse(text: &str) -> Self {
        let audio_url = scrape::meta_content(text, "og:audio")
            .or_else(|| {
                AUDIO_URL
                    .captures(text)
                    .map(|caps| scrape::unescape_json(&caps[1]))
            })
            .map(|url| absolute_https(&url));

        let published_at = scrape::json_string_field(text, "pubDate")
            .or_else(|| scrape::json_string_field(text, "datePublished"))
            .and_then(|raw| DateTime::parse_from_rfc3339(&raw).ok())
            .map(|date| date.with_timezone(&Utc));

        let duration_sec = DURATION
            .captures(text)
            .and_then(|caps| caps[1].parse().ok());

        Self {
            title: scrape::meta_content(text, "og:title")
                .or_else(|| scrape::reader_title(text))
                .or_else(|| scrape::html_title(text, " | 小宇宙")),
            podcast: scrape::json_string_field(text, "author")
                .or_else(|| scrape::json_string_field(text, "nickname")),
            description: scrape::meta_content(text, "og:description")
                .or_else(|| scrape::meta_content(text, "description")),
            audio_url,
            cover: scrape::meta_content(text, "og:image"),
            published_at,
            duration_sec,
        }
    }

    fn is_usable(&self) -> bool {
        self.title.is_some() || self.audio_url.is_some()
    }

    fn apply(self, meta: &mut Metadata) {
        meta.title = self.title;
        meta.author = self.podcast;
        meta.description = self.description;
        meta.media_url = self.audio_url;
        meta.images.extend(self.cover);
        meta.published_at = self.published_at;
        meta.duration_sec = self.duration_sec;
        meta.content_type = Some("audio".to_string());
    }
}

/// Xiaoyuzhou FM podcast episodes; the audio enclosure is the download link
pub struct XiaoyuzhouStrategy;

impl XiaoyuzhouStrategy {
    pub fn new() -> Self {
        Self
    }

    fn parse_reader(reader: Option<Page>) -> Result<(EpisodePage, Vec<String>), StepError> {
        let page = reader.ok_or_else(|| StepError::failed("reader rendering unavailable"))?;
        let episode = EpisodePage::parse(&page.body);
        if !episode.is_usable() {
            return Err(StepError::failed("reader rendering has no episode title"));
        }
        Ok((episode, Vec::new()))
    }

    async fn scrape_episode_page(
        ctx: &RunContext,
        target: &str,
    ) -> Result<(EpisodePage, Vec<String>), StepError> {
        let request = FetchRequest::new(target)
            .header("User-Agent", ctx.config.http.mobile_user_agent.as_str());
        let fetched = ctx.http.fetch_text(&request, &ctx.deadline).await;
        let page = fetched.result?;
        let episode = EpisodePage::parse(&page.body);
        if !episode.is_usable() {
            return Err(StepError::failed("episode page has no title or audio"));
        }
        Ok((episode, fetched.notes))
    }
}

impl Default for XiaoyuzhouStrategy {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PlatformStrategy for XiaoyuzhouStrategy {
    fn platform(&self) -> Platform {
        Platform::Xiaoyuzhou
    }

    fn domains(&self) -> &'static [&'static str] {
        &["xiaoyuzhoufm.com"]
    }

    fn is_media(&self) -> bool {
        true
    }

    fn id_rules(&self) -> &'static [IdRule] {
        &RULES
    }

    fn canonical_url(&self, identifier: &str) -> String {
        format!("https://www.xiaoyuzhoufm.com/episode/{identifier}")
    }

    async fn resolve_metadata(
        &self,
        ctx: &RunContext,
        source: &Source,
        reader: Option<Page>,
    ) -> Option<Metadata> {
        let mut meta = Metadata::new(Platform::Xiaoyuzhou, source.target(), source.identifier.clone());
        let target = source.target();

        let result = FallbackChain::new("metadata")
            .step("reader-proxy", move || async move { Self::parse_reader(reader) })
            .step("episode-page", move || Self::scrape_episode_page(ctx, target))
            .run()
            .await;
        let summary = result.failure_summary();
        meta.attempts = result.attempts;

        match result.value {
            Some((episode, notes)) => {
                meta.notes = notes;
                episode.apply(&mut meta);
            }
            None => {
                meta.errors
                    .push(format!("all metadata strategies failed: {summary}"));
                meta.degradation_mode = true;
            }
        }
        Some(meta)
    }

    /// Enclosure from metadata, else from a fresh episode page fetch
    async fn resolve_media_link(
        &self,
        ctx: &RunContext,
        source: &Source,
        metadata: Option<&Metadata>,
    ) -> Result<MediaLink, StepError> {
        if let Some(url) = metadata.and_then(|meta| meta.media_url.clone()) {
            return Ok(MediaLink::new(url, "metadata"));
        }

        let (episode, _notes) = Self::scrape_episode_page(ctx, source.target()).await?;
        let mut link = MediaLink::new(
            episode
                .audio_url
                .ok_or_else(|| StepError::failed("episode page exposes no audio enclosure"))?,
            "episode-page",
        );
        link.title = episode.title;
        link.author = episode.podcast;
        Ok(link)
    }
}
