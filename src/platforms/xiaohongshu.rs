use async_trait::async_trait;
use once_cell::sync::Lazy;

use super::scrape::{self, absolute_https};
use super::{unique_urls, IdRule, PlatformStrategy};
use crate::context::RunContext;
use crate::fallback::{FallbackChain, StepError};
use crate::fetch::{FetchRequest, Page};
use crate::metadata::Metadata;
use crate::source::{Platform, Source};

const TITLE_SUFFIX: &str = " - 小红书";
const MAX_IMAGES: usize = 5;

static RULES: Lazy<Vec<IdRule>> = Lazy::new(|| {
    vec![
        IdRule::path(r"/explore/([0-9a-zA-Z]+)"),
        IdRule::path(r"/discovery/item/([0-9a-zA-Z]+)"),
        IdRule::query("note_id", r"[0-9a-zA-Z]+"),
    ]
});

/// Note fields scraped from a rendering of the note page
#[derive(Debug, Default, PartialEq)]
struct NotePage {
    title: Option<String>,
    description: Option<String>,
    author: Option<String>,
    images: Vec<String>,
    video_url: Option<String>,
}

impl NotePage {
    fn parse(text: &str) -> Self {
        let title = scrape::html_title(text, TITLE_SUFFIX)
            .or_else(|| scrape::meta_content(text, "og:title"))
            .or_else(|| scrape::reader_title(text))
            .or_else(|| scrape::json_string_field(text, "title"))
            .map(|title| title.strip_suffix(TITLE_SUFFIX).unwrap_or(&title).trim().to_string())
            .filter(|title| !title.is_empty() && !title.starts_with("小红书"));

        let video_url = scrape::json_string_field(text, "videoUrl")
            .or_else(|| scrape::json_string_field(text, "masterUrl"))
            .or_else(|| scrape::meta_content(text, "og:video"))
            .map(|url| absolute_https(&url));

        Self {
            title,
            description: scrape::json_string_field(text, "description")
                .or_else(|| scrape::json_string_field(text, "desc"))
                .or_else(|| scrape::meta_content(text, "description")),
            author: scrape::json_string_field(text, "authorName")
                .or_else(|| scrape::json_string_field(text, "nickname")),
            images: scrape::json_string_fields(text, "imageUrl", MAX_IMAGES)
                .into_iter()
                .map(|url| absolute_https(&url))
                .collect(),
            video_url,
        }
    }

    fn is_usable(&self) -> bool {
        self.title.is_some() || self.description.is_some()
    }

    fn content_type(&self) -> Option<&'static str> {
        if self.video_url.is_some() {
            Some("video")
        } else if !self.images.is_empty() {
            Some("image")
        } else {
            None
        }
    }
}

/// Xiaohongshu notes: reader proxy first, then the mobile-rendered page
pub struct XiaohongshuStrategy;

impl XiaohongshuStrategy {
    pub fn new() -> Self {
        Self
    }

    fn parse_reader(reader: Option<Page>) -> Result<(NotePage, Vec<String>), StepError> {
        let page = reader.ok_or_else(|| StepError::failed("reader rendering unavailable"))?;
        let note = NotePage::parse(&page.body);
        if !note.is_usable() {
            return Err(StepError::failed("reader rendering looks like a login wall"));
        }
        Ok((note, Vec::new()))
    }

    async fn scrape_mobile(ctx: &RunContext, target: &str) -> Result<(NotePage, Vec<String>), StepError> {
        let request = FetchRequest::new(target)
            .header("User-Agent", ctx.config.http.mobile_user_agent.as_str())
            .header("Referer", "https://www.xiaohongshu.com/");
        let fetched = ctx.http.fetch_text(&request, &ctx.deadline).await;
        let page = fetched.result?;
        let note = NotePage::parse(&page.body);
        if !note.is_usable() {
            return Err(StepError::failed("mobile page has no title or description"));
        }
        Ok((note, fetched.notes))
    }
}

impl Default for XiaohongshuStrategy {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PlatformStrategy for XiaohongshuStrategy {
    fn platform(&self) -> Platform {
        Platform::Xiaohongshu
    }

    fn domains(&self) -> &'static [&'static str] {
        &["xiaohongshu.com", "xhslink.com"]
    }

    fn short_link_domains(&self) -> &'static [&'static str] {
        &["xhslink.com"]
    }

    fn is_media(&self) -> bool {
        true
    }

    fn id_rules(&self) -> &'static [IdRule] {
        &RULES
    }

    fn canonical_url(&self, identifier: &str) -> String {
        format!("https://www.xiaohongshu.com/explore/{identifier}")
    }

    async fn resolve_metadata(
        &self,
        ctx: &RunContext,
        source: &Source,
        reader: Option<Page>,
    ) -> Option<Metadata> {
        let mut meta = Metadata::new(
            Platform::Xiaohongshu,
            source.target(),
            source.identifier.clone(),
        );
        // Share tokens in the original link sometimes unlock pages the canonical URL does not.
        let mobile_target = source.original_url.as_deref().unwrap_or(source.target());

        let result = FallbackChain::new("metadata")
            .step("reader-proxy", move || async move { Self::parse_reader(reader) })
            .step("mobile-page", move || Self::scrape_mobile(ctx, mobile_target))
            .run()
            .await;
        let summary = result.failure_summary();
        meta.attempts = result.attempts;

        match result.value {
            Some((note, notes)) => {
                meta.notes = notes;
                meta.content_type = note.content_type().map(str::to_string);
                meta.title = note.title;
                meta.description = note.description;
                meta.author = note.author;
                meta.images = note.images;
                meta.media_url = note.video_url;
            }
            None => {
                meta.errors
                    .push(format!("all metadata strategies failed: {summary}"));
                meta.degradation_mode = true;
            }
        }
        if let Some(id) = &source.identifier {
            meta.platform_ids.insert("note_id".to_string(), id.clone());
        }
        Some(meta)
    }

    fn download_variants(&self, _ctx: &RunContext, source: &Source) -> Vec<String> {
        unique_urls([
            source.original_url.clone(),
            source.canonical_url.clone(),
            source
                .identifier
                .as_deref()
                .map(|id| format!("https://www.xiaohongshu.com/discovery/item/{id}")),
        ])
    }
}
