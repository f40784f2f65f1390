use async_trait::async_trait;
use std::path::Path;

use super::PlatformStrategy;
use crate::context::RunContext;
use crate::source::{Platform, Source};
use crate::subtitles::SubtitleReport;

/// Generic web pages: readable rendering only, no metadata or media stages
pub struct WebStrategy;

impl WebStrategy {
    pub fn new() -> Self {
        Self
    }
}

impl Default for WebStrategy {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PlatformStrategy for WebStrategy {
    fn platform(&self) -> Platform {
        Platform::Web
    }

    fn domains(&self) -> &'static [&'static str] {
        &[]
    }

    fn is_media(&self) -> bool {
        false
    }

    fn canonical_url(&self, identifier: &str) -> String {
        identifier.to_string()
    }

    async fn extract_subtitles(
        &self,
        _ctx: &RunContext,
        _source: &Source,
        _workdir: &Path,
    ) -> SubtitleReport {
        SubtitleReport::skipped("web pages carry no subtitle tracks")
    }
}
