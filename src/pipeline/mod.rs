//! Orchestrator: classify, normalize, then walk the acquisition stages for one input.
//!
//! Stages report into the [`Manifest`]; the run only aborts on classification failure or
//! an unusable output directory.

use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::context::RunContext;
use crate::fallback::{Attempt, AttemptOutcome, StepError};
use crate::fetch::search::search_topic;
use crate::manifest::{ArtifactRef, Manifest};
use crate::metadata::Metadata;
use crate::output;
use crate::platforms::{PlatformRegistry, PlatformStrategy};
use crate::source::{classify, Source, SourceKind};
use crate::transcribe::run_asr_fallback;
use crate::transcript::{Transcript, TranscriptSlot, TranscriptSource};
use crate::{AcquireError, Result};

const READ_FILE: &str = "source_read.md";
const SEARCH_FILE: &str = "source_search.md";
const TRANSCRIPT_FILE: &str = "transcript.txt";
const SUBTITLE_DIR: &str = "subtitles";

/// What a finished run left behind
#[derive(Debug)]
pub struct RunSummary {
    pub manifest: Manifest,
    pub manifest_path: PathBuf,
    pub transcript_path: Option<PathBuf>,
}

/// One acquisition pipeline. Runs are independent; concurrent runs need distinct output directories.
pub struct AcquisitionPipeline {
    config: Config,
    registry: PlatformRegistry,
    show_progress: bool,
}

impl AcquisitionPipeline {
    pub fn new(config: Config) -> Self {
        Self::with_registry(config, PlatformRegistry::new())
    }

    pub fn with_registry(config: Config, registry: PlatformRegistry) -> Self {
        Self {
            config,
            registry,
            show_progress: false,
        }
    }

    /// Show spinners for the download and transcription stages
    pub fn show_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn registry(&self) -> &PlatformRegistry {
        &self.registry
    }

    /// Run every applicable stage for `input` and write `manifest.json` into `outdir`
    pub async fn run(&self, input: &str, outdir: &Path, asr_fallback: bool) -> Result<RunSummary> {
        let source = classify(input, &self.registry)?;
        prepare_outdir(outdir)?;
        tracing::info!(kind = ?source.kind, platform = %source.platform, "Acquiring {}", source.target());

        let ctx = RunContext::new(self.config.clone())?;
        let mut manifest = Manifest::new(&source);

        let transcript_path = match source.kind {
            SourceKind::Topic => {
                self.run_topic(&ctx, &source, &mut manifest, outdir).await;
                None
            }
            SourceKind::Url => {
                self.run_url(&ctx, source, &mut manifest, outdir, asr_fallback)
                    .await
            }
        };

        let (manifest, manifest_path) = manifest.finalize(outdir)?;
        Ok(RunSummary {
            manifest,
            manifest_path,
            transcript_path,
        })
    }

    async fn run_topic(&self, ctx: &RunContext, source: &Source, manifest: &mut Manifest, outdir: &Path) {
        let digest = search_topic(
            &ctx.http,
            &source.input,
            ctx.config.run.max_candidates,
            &ctx.deadline,
        )
        .await;

        let used_fallback = digest
            .attempts
            .first()
            .is_some_and(|attempt| !attempt.succeeded());
        manifest.record_attempts(digest.attempts);
        manifest.notes(digest.notes);

        if let (Some(body), Some(via)) = (digest.body, digest.via) {
            if let Some(path) = save_text(manifest, outdir, SEARCH_FILE, &body) {
                manifest.set_path("source_search", path);
            }
            manifest.set_file("search_via", ArtifactRef::Url(via));
            if used_fallback {
                manifest.note("Reader search unavailable; used DuckDuckGo HTML fallback.");
            }
        }
        manifest.candidates = Some(digest.candidates);
        manifest.note(
            "Input is a topic name. Please pick or confirm a canonical source link before deep analysis.",
        );
    }

    async fn run_url(
        &self,
        ctx: &RunContext,
        mut source: Source,
        manifest: &mut Manifest,
        outdir: &Path,
        asr_fallback: bool,
    ) -> Option<PathBuf> {
        source = self.expand_short_link(ctx, source, manifest).await;

        let strategy = self.registry.get(source.platform);
        let is_media = strategy.is_some_and(|s| s.is_media());
        let display_name = source.platform.display_name();

        if source.canonical_url != source.original_url {
            manifest.note(format!(
                "Normalized URL for {}: {}",
                source.platform,
                source.target()
            ));
        }
        if is_media && source.identifier.is_none() {
            manifest.note(format!(
                "Could not extract a {display_name} identifier; using the link as given."
            ));
        }

        // Fetched once; platform scrapers parse this page before trying their own fallbacks.
        let read = ctx.http.fetch_readable(source.target(), &ctx.deadline).await;
        let reader_page = read.result.as_ref().ok().cloned();

        manifest.notes(read.notes);
        match read.result {
            Ok(page) => {
                manifest.record_attempts([Attempt::new("read", "reader-proxy", AttemptOutcome::Succeeded)]);
                if let Some(path) = save_text(manifest, outdir, READ_FILE, &page.body) {
                    manifest.set_path("source_read", path);
                }
                manifest.set_file("read_via", ArtifactRef::Url(ctx.http.reader_url(source.target())));
            }
            Err(err) => {
                let reason = err.to_string();
                manifest.record_attempts([Attempt::new("read", "reader-proxy", AttemptOutcome::Failed(reason.clone()))]);
                if is_media {
                    manifest.note(format!("Readable content fetch failed: {reason}"));
                } else {
                    manifest.note(format!(
                        "Fetch error: {reason}. No other acquisition path exists for web pages."
                    ));
                }
            }
        }

        let metadata = match strategy {
            Some(strategy) => strategy.resolve_metadata(ctx, &source, reader_page).await,
            None => None,
        };
        let metadata = metadata.map(|meta| self.record_metadata(meta, manifest, outdir));

        let strategy = match strategy {
            Some(strategy) if strategy.is_media() => strategy,
            _ => return None,
        };
        self.acquire_transcript(ctx, strategy, &source, metadata.as_ref(), manifest, outdir, asr_fallback)
            .await
    }

    /// Follow a short link when normalization found no identifier in it
    async fn expand_short_link(&self, ctx: &RunContext, source: Source, manifest: &mut Manifest) -> Source {
        let Some(strategy) = self.registry.get(source.platform) else {
            return source;
        };
        let Some(original) = source.original_url.as_deref() else {
            return source;
        };
        if source.identifier.is_some() || !strategy.is_short_link(original) {
            return source;
        }

        match ctx.http.resolve_final_url(original, &ctx.deadline).await {
            Ok(final_url) => match source.renormalize(&final_url, &self.registry) {
                Some(expanded) => {
                    manifest.note(format!("Expanded short link to {final_url}"));
                    manifest.update_source(&expanded);
                    expanded
                }
                None => {
                    manifest.note(format!("Short link resolved to a non-URL location: {final_url}"));
                    source
                }
            },
            Err(err) => {
                manifest.note(format!("Short link expansion failed: {err}"));
                source
            }
        }
    }

    fn record_metadata(&self, mut meta: Metadata, manifest: &mut Manifest, outdir: &Path) -> Metadata {
        let display_name = meta.platform.display_name();
        manifest.notes(std::mem::take(&mut meta.notes));
        manifest.record_attempts(meta.attempts.iter().cloned());

        let file_name = format!("{}_meta.json", meta.platform);
        match output::write_json(outdir, &file_name, &meta) {
            Ok(path) => manifest.set_path("platform_meta", path),
            Err(err) => manifest.note(format!("Could not write {file_name}: {err:#}")),
        }

        if meta.degradation_mode {
            manifest.note(format!(
                "{display_name} metadata unavailable; continuing in degradation mode."
            ));
        }
        if !meta.errors.is_empty() {
            manifest.note(format!(
                "{display_name} metadata had partial errors: {}",
                meta.errors.join("; ")
            ));
        }
        meta
    }

    #[allow(clippy::too_many_arguments)]
    async fn acquire_transcript(
        &self,
        ctx: &RunContext,
        strategy: &dyn PlatformStrategy,
        source: &Source,
        metadata: Option<&Metadata>,
        manifest: &mut Manifest,
        outdir: &Path,
        asr_fallback: bool,
    ) -> Option<PathBuf> {
        let mut slot = TranscriptSlot::default();

        if ctx.deadline.is_expired() {
            manifest.note("Run deadline reached before subtitle extraction; skipping remaining stages.");
        } else {
            let subtitles = strategy
                .extract_subtitles(ctx, source, &outdir.join(SUBTITLE_DIR))
                .await;
            manifest.record_attempts([Attempt::new("transcript", "subtitles", subtitles.outcome())]);
            manifest.set_file("subtitle_files", subtitles.files.clone());
            manifest.notes(subtitles.notes.iter().cloned());
            if let Some(transcript) = subtitles
                .transcript()
                .and_then(|text| Transcript::new(text, TranscriptSource::Subtitles))
            {
                slot.offer(transcript);
            }
        }

        if slot.is_empty() {
            if let Some(meta) = metadata {
                let embedded = strategy.fetch_embedded_transcript(ctx, meta).await;
                manifest.record_attempts([Attempt::from_step("transcript", "embedded-json", &embedded)]);
                match embedded {
                    Ok(text) => {
                        if let Some(transcript) = Transcript::new(text, TranscriptSource::EmbeddedJson) {
                            manifest.note("Transcript taken from the platform's subtitle JSON.");
                            slot.offer(transcript);
                        }
                    }
                    Err(StepError::Failed(reason)) => {
                        manifest.note(format!("Embedded subtitle fetch failed: {reason}"));
                    }
                    Err(StepError::Skipped(_)) => {}
                }
                if slot.is_empty() && meta.need_login_subtitle == Some(true) {
                    manifest.note(format!(
                        "{} reports that subtitles require login; they were not fetched.",
                        meta.platform.display_name()
                    ));
                }
            }
        }

        if slot.is_empty() {
            if asr_fallback {
                if ctx.deadline.is_expired() {
                    manifest.note("ASR fallback skipped: run deadline reached.");
                } else {
                    let asr = run_asr_fallback(ctx, strategy, source, metadata, outdir, self.show_progress).await;
                    tracing::info!(state = ?asr.state, "ASR fallback finished");
                    manifest.set_file("asr_audio", asr.audio_path.clone());
                    manifest.set_file("asr_json", asr.asr_json.clone());
                    manifest.record_attempts(asr.attempts);
                    manifest.notes(asr.notes);
                    manifest.asr_quality = asr.quality;
                    if let Some(transcript) = asr.transcript {
                        slot.offer(transcript);
                    }
                }
            } else {
                manifest.note("Transcript missing. Re-run with --asr-fallback for full audio transcription.");
            }
        }

        let Some(transcript) = slot.into_inner() else {
            manifest.set_file("transcript", ArtifactRef::Missing);
            return None;
        };
        let path = save_text(manifest, outdir, TRANSCRIPT_FILE, transcript.text());
        match &path {
            Some(path) => manifest.set_transcript(path, &transcript),
            None => manifest.set_file("transcript", ArtifactRef::Missing),
        }
        path
    }
}

/// Create `outdir` and prove it is writable
fn prepare_outdir(outdir: &Path) -> std::result::Result<(), AcquireError> {
    let probe = outdir.join(".write_probe");
    fs_err::create_dir_all(outdir)
        .and_then(|_| fs_err::write(&probe, b""))
        .and_then(|_| fs_err::remove_file(&probe))
        .map_err(|source| AcquireError::OutputDir {
            path: outdir.to_path_buf(),
            source,
        })
}

/// Write an artifact, turning a write failure into a note
fn save_text(manifest: &mut Manifest, outdir: &Path, name: &str, content: &str) -> Option<PathBuf> {
    match output::write_text(outdir, name, content) {
        Ok(path) => Some(path),
        Err(err) => {
            manifest.note(format!("Could not write {name}: {err:#}"));
            None
        }
    }
}
