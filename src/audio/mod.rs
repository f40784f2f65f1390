//! Audio Acquisition: resolve a playable link, then hand URLs to the downloader in
//! priority order until one yields an audio file.

use std::path::{Path, PathBuf};

use crate::context::RunContext;
use crate::downloader::{newest_with_stem, Downloader, AUDIO_STEM};
use crate::fallback::{Attempt, FallbackChain, StepError};
use crate::metadata::Metadata;
use crate::platforms::{MediaLink, PlatformStrategy};
use crate::source::Source;

pub mod resolver;

/// Outcome of the audio stage
#[derive(Debug, Default)]
pub struct AudioReport {
    /// Extracted audio file
    pub path: Option<PathBuf>,
    /// URL the downloader succeeded with
    pub url: Option<String>,
    /// Link produced by the platform's media-link resolution, if any
    pub link: Option<MediaLink>,
    pub attempts: Vec<Attempt>,
    pub notes: Vec<String>,
    /// Why no audio was produced
    pub failure: Option<String>,
}

/// Resolve a media link, then try it and every platform URL variant with the downloader.
/// A downloader failure on every candidate is a hard failure for this run.
pub async fn acquire_audio(
    ctx: &RunContext,
    strategy: &dyn PlatformStrategy,
    source: &Source,
    metadata: Option<&Metadata>,
    downloader: &Downloader,
    outdir: &Path,
) -> AudioReport {
    let mut report = AudioReport::default();

    let resolved = strategy.resolve_media_link(ctx, source, metadata).await;
    report
        .attempts
        .push(Attempt::from_step("media-link", "resolve", &resolved));
    match resolved {
        Ok(link) => {
            tracing::info!(via = %link.via, "resolved media link");
            report.link = Some(link);
        }
        Err(StepError::Failed(reason)) => {
            report
                .notes
                .push(format!("Media link resolution failed: {reason}. Trying direct download."));
        }
        Err(StepError::Skipped(reason)) => {
            tracing::debug!("no media link resolved: {}", reason);
        }
    }

    let mut candidates: Vec<(String, String)> = Vec::new();
    if let Some(link) = &report.link {
        candidates.push(("resolved-link".to_string(), link.url.clone()));
    }
    for url in strategy.download_variants(ctx, source) {
        if !candidates.iter().any(|(_, seen)| *seen == url) {
            candidates.push((format!("direct:{url}"), url));
        }
    }

    if candidates.is_empty() {
        let reason = "no URL to download audio from".to_string();
        report.notes.push(format!("ASR fallback failed: {reason}."));
        report.failure = Some(reason);
        return report;
    }

    let mut chain = FallbackChain::new("audio-download");
    for (name, url) in candidates {
        chain = chain.step(name, move || download_one(ctx, downloader, url, outdir));
    }

    let result = chain.run().await;
    let summary = result.failure_summary();
    report.attempts.extend(result.attempts);

    match result.value {
        Some((url, path)) => {
            tracing::info!("Audio extracted to {}", path.display());
            report.url = Some(url);
            report.path = Some(path);
        }
        None => {
            report
                .notes
                .push(format!("ASR fallback failed to download audio: {summary}"));
            report.failure = Some(summary);
        }
    }
    report
}

async fn download_one(
    ctx: &RunContext,
    downloader: &Downloader,
    url: String,
    outdir: &Path,
) -> Result<(String, PathBuf), StepError> {
    downloader.extract_audio(&url, outdir, &ctx.deadline).await?;
    let path = newest_with_stem(outdir, AUDIO_STEM)
        .ok_or_else(|| StepError::failed("downloaded audio file not found"))?;
    Ok((url, path))
}
