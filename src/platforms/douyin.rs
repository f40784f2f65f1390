use async_trait::async_trait;
use once_cell::sync::Lazy;

use super::scrape::{self, absolute_https};
use super::{unique_urls, IdRule, MediaLink, PlatformStrategy};
use crate::audio::resolver;
use crate::context::RunContext;
use crate::fallback::{AttemptOutcome, FallbackChain, StepError};
use crate::fetch::{FetchRequest, Page};
use crate::metadata::Metadata;
use crate::source::{Platform, Source};

static RULES: Lazy<Vec<IdRule>> = Lazy::new(|| {
    vec![
        IdRule::path(r"/video/(\d{8,})"),
        IdRule::query("modal_id", r"\d{8,}"),
        IdRule::path(r"/note/(\d{8,})"),
    ]
});

/// Fields scraped from a Douyin page
#[derive(Debug, Default)]
struct DouyinPage {
    title: Option<String>,
    author: Option<String>,
    description: Option<String>,
    media_url: Option<String>,
    cover: Option<String>,
}

impl DouyinPage {
    fn parse(text: &str) -> Self {
        let title = scrape::meta_content(text, "og:title")
            .or_else(|| scrape::reader_title(text))
            .or_else(|| scrape::html_title(text, " - 抖音"))
            .or_else(|| scrape::json_string_field(text, "desc"));
        Self {
            title: title.filter(|title| title != "抖音"),
            author: scrape::json_string_field(text, "nickname"),
            description: scrape::meta_content(text, "description")
                .or_else(|| scrape::json_string_field(text, "desc")),
            media_url: scrape::json_string_field(text, "playApi")
                .or_else(|| scrape::json_string_field(text, "play_addr"))
                .map(|url| absolute_https(&url)),
            cover: scrape::meta_content(text, "og:image"),
        }
    }

    fn is_usable(&self) -> bool {
        self.title.is_some() || self.description.is_some()
    }
}

/// Douyin: no public API; reader proxy, then the mobile share page, plus an optional resolver service
pub struct DouyinStrategy;

impl DouyinStrategy {
    pub fn new() -> Self {
        Self
    }

    fn share_page_url(ctx: &RunContext, identifier: &str) -> String {
        format!(
            "{}/share/video/{identifier}/",
            ctx.config.platforms.douyin_share_base.trim_end_matches('/')
        )
    }

    fn parse_reader(reader: Option<Page>) -> Result<(DouyinPage, Vec<String>), StepError> {
        let page = reader.ok_or_else(|| StepError::failed("reader rendering unavailable"))?;
        let parsed = DouyinPage::parse(&page.body);
        if !parsed.is_usable() {
            return Err(StepError::failed("reader rendering has no title or description"));
        }
        Ok((parsed, Vec::new()))
    }

    async fn scrape_share_page(
        ctx: &RunContext,
        identifier: Option<&str>,
    ) -> Result<(DouyinPage, Vec<String>), StepError> {
        let identifier = identifier.ok_or_else(|| StepError::skipped("no video id for the share page"))?;
        let request = FetchRequest::new(Self::share_page_url(ctx, identifier))
            .header("User-Agent", ctx.config.http.mobile_user_agent.as_str())
            .header("Referer", "https://www.douyin.com/");
        let fetched = ctx.http.fetch_text(&request, &ctx.deadline).await;
        let page = fetched.result?;
        let parsed = DouyinPage::parse(&page.body);
        if !parsed.is_usable() {
            return Err(StepError::failed("share page has no title or description"));
        }
        Ok((parsed, fetched.notes))
    }
}

impl Default for DouyinStrategy {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PlatformStrategy for DouyinStrategy {
    fn platform(&self) -> Platform {
        Platform::Douyin
    }

    fn domains(&self) -> &'static [&'static str] {
        &["douyin.com", "iesdouyin.com", "v.douyin.com"]
    }

    fn short_link_domains(&self) -> &'static [&'static str] {
        &["v.douyin.com"]
    }

    fn is_media(&self) -> bool {
        true
    }

    fn id_rules(&self) -> &'static [IdRule] {
        &RULES
    }

    fn canonical_url(&self, identifier: &str) -> String {
        format!("https://www.douyin.com/video/{identifier}")
    }

    async fn resolve_metadata(
        &self,
        ctx: &RunContext,
        source: &Source,
        reader: Option<Page>,
    ) -> Option<Metadata> {
        let mut meta = Metadata::new(Platform::Douyin, source.target(), source.identifier.clone());
        let identifier = source.identifier.as_deref();

        let result = FallbackChain::new("metadata")
            .step("reader-proxy", move || async move { Self::parse_reader(reader) })
            .step("share-page", move || Self::scrape_share_page(ctx, identifier))
            .run()
            .await;
        let summary = result.failure_summary();
        meta.attempts = result.attempts;

        match result.value {
            Some((page, notes)) => {
                meta.notes = notes;
                meta.title = page.title;
                meta.author = page.author;
                meta.description = page.description;
                meta.media_url = page.media_url;
                meta.images.extend(page.cover);
                meta.content_type = Some("video".to_string());
            }
            None => {
                meta.errors
                    .push(format!("all metadata strategies failed: {summary}"));
                meta.degradation_mode = true;
            }
        }
        if let Some(id) = identifier {
            meta.platform_ids.insert("video_id".to_string(), id.to_string());
        }
        Some(meta)
    }

    async fn resolve_media_link(
        &self,
        ctx: &RunContext,
        source: &Source,
        metadata: Option<&Metadata>,
    ) -> Result<MediaLink, StepError> {
        let share_link = source.original_url.as_deref().unwrap_or(source.target());
        let scraped = metadata.and_then(|meta| meta.media_url.clone());

        let result = FallbackChain::new("media-link")
            .step("resolver-service", move || resolver::resolve(ctx, share_link))
            .step("scraped-media-url", move || async move {
                scraped
                    .map(|url| MediaLink::new(url, "scraped-media-url"))
                    .ok_or_else(|| StepError::skipped("page exposed no media URL"))
            })
            .run()
            .await;

        let summary = result.failure_summary();
        let any_failed = result
            .attempts
            .iter()
            .any(|attempt| matches!(attempt.outcome, AttemptOutcome::Failed(_)));
        result.value.ok_or_else(|| {
            if any_failed {
                StepError::failed(summary)
            } else {
                StepError::skipped(summary)
            }
        })
    }

    fn download_variants(&self, ctx: &RunContext, source: &Source) -> Vec<String> {
        unique_urls([
            source.canonical_url.clone(),
            source.identifier.as_deref().map(|id| Self::share_page_url(ctx, id)),
            source.original_url.clone(),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_share_page_fragments() {
        let html = r#"<html><head><title>测试视频 - 抖音</title>
            <meta name="description" content="一段描述"></head>
            <script>{"nickname":"作者","playApi":"\/\/aweme.test\/play\/?video_id=v1"}</script></html>"#;

        let page = DouyinPage::parse(html);
        assert_eq!(page.title.as_deref(), Some("测试视频"));
        assert_eq!(page.author.as_deref(), Some("作者"));
        assert_eq!(page.description.as_deref(), Some("一段描述"));
        assert_eq!(page.media_url.as_deref(), Some("https://aweme.test/play/?video_id=v1"));
        assert!(page.is_usable());
    }

    #[test]
    fn bare_site_title_is_not_usable() {
        let page = DouyinPage::parse("<title>抖音</title>");
        assert!(!page.is_usable());
    }

    #[test]
    fn reader_page_feeds_the_first_metadata_step() {
        let page = Page {
            url: "https://r.test/reader/x".into(),
            body: "Title: 一条视频\n\nMarkdown Content:\n...".into(),
        };
        let (parsed, notes) = DouyinStrategy::parse_reader(Some(page)).unwrap();
        assert_eq!(parsed.title.as_deref(), Some("一条视频"));
        assert!(notes.is_empty());

        assert!(matches!(
            DouyinStrategy::parse_reader(None),
            Err(StepError::Failed(_))
        ));
    }

    #[test]
    fn download_variants_are_ordered_and_unique() {
        let source = Source {
            input: "https://www.douyin.com/video/7301234567890123456".into(),
            kind: crate::source::SourceKind::Url,
            platform: Platform::Douyin,
            original_url: Some("https://www.douyin.com/video/7301234567890123456".into()),
            canonical_url: Some("https://www.douyin.com/video/7301234567890123456".into()),
            identifier: Some("7301234567890123456".into()),
        };

        let mut config = crate::config::Config::default();
        let ctx = RunContext::new(config.clone()).unwrap();
        assert_eq!(
            DouyinStrategy::new().download_variants(&ctx, &source),
            vec![
                "https://www.douyin.com/video/7301234567890123456".to_string(),
                "https://www.iesdouyin.com/share/video/7301234567890123456/".to_string(),
            ]
        );

        config.platforms.douyin_share_base = "http://127.0.0.1:9/".to_string();
        let ctx = RunContext::new(config).unwrap();
        assert_eq!(
            DouyinStrategy::new().download_variants(&ctx, &source)[1],
            "http://127.0.0.1:9/share/video/7301234567890123456/"
        );
    }
}
