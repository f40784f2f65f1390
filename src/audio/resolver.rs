//! External media-link resolver service, run as a child process.
//!
//! The command receives the share link as its last argument and prints one JSON object:
//! `{"status": "success", "download_url": "...", "title": "...", "author": "...", "video_id": "..."}`.
//! The API key, when configured, is exported to that child only.

use serde::Deserialize;
use std::time::Duration;

use crate::context::RunContext;
use crate::fallback::StepError;
use crate::platforms::MediaLink;
use crate::process::{find_program, ToolInvocation};
use crate::utils::truncate;

#[derive(Debug, Deserialize)]
struct ResolverResponse {
    status: Option<String>,
    error: Option<String>,
    download_url: Option<String>,
    video_url: Option<String>,
    url: Option<String>,
    play_url: Option<String>,
    title: Option<String>,
    author: Option<String>,
}

impl ResolverResponse {
    fn media_url(&self) -> Option<&str> {
        [&self.download_url, &self.video_url, &self.url, &self.play_url]
            .into_iter()
            .flatten()
            .map(|url| url.trim())
            .find(|url| !url.is_empty())
    }
}

/// Ask the configured resolver for a playable link to `share_link`
pub async fn resolve(ctx: &RunContext, share_link: &str) -> Result<MediaLink, StepError> {
    let settings = &ctx.config.resolver;
    let configured = settings
        .command
        .as_deref()
        .ok_or_else(|| StepError::skipped("no resolver command configured"))?;
    let program = find_program(Some(configured), "")
        .ok_or_else(|| StepError::skipped(format!("resolver {} is not executable", configured.display())))?;

    let mut invocation = ToolInvocation::new(
        program,
        ctx.deadline.clamp(Duration::from_secs(settings.timeout_secs)),
    )
    .args(settings.args.iter())
    .arg(share_link);
    if let Some(key) = settings.api_key.as_deref().filter(|key| !key.is_empty()) {
        invocation = invocation.env(settings.api_key_env.as_str(), key);
    }

    let output = invocation.run().await?.into_success()?;
    parse_response(&output.stdout)
}

fn parse_response(stdout: &str) -> Result<MediaLink, StepError> {
    // Resolvers may log before the JSON; take the last line that parses.
    let response = stdout
        .lines()
        .rev()
        .map(str::trim)
        .filter(|line| line.starts_with('{'))
        .find_map(|line| serde_json::from_str::<ResolverResponse>(line).ok())
        .or_else(|| serde_json::from_str::<ResolverResponse>(stdout.trim()).ok())
        .ok_or_else(|| {
            StepError::failed(format!(
                "resolver printed no JSON object: {}",
                truncate(stdout.trim(), 200)
            ))
        })?;

    if response.status.as_deref() != Some("success") {
        return Err(StepError::failed(format!(
            "resolver failed: {}",
            response.error.as_deref().unwrap_or("unknown error")
        )));
    }

    let url = response
        .media_url()
        .ok_or_else(|| StepError::failed("no download URL in resolver response"))?
        .to_string();

    let mut link = MediaLink::new(url, "resolver-service");
    link.title = response.title;
    link.author = response.author;
    Ok(link)
}
