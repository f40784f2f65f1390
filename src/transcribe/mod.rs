//! ASR Fallback: download audio, run the local speech-to-text runner and score the result.
//!
//! Runs as a small state machine whose terminal states are `Succeeded`, `Failed` and
//! `Skipped`. A missing downloader or runner is a skip, never an error.

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::audio;
use crate::config::AsrConfig;
use crate::context::RunContext;
use crate::downloader::Downloader;
use crate::fallback::{Attempt, AttemptOutcome};
use crate::metadata::Metadata;
use crate::output::spinner;
use crate::platforms::PlatformStrategy;
use crate::process::{is_executable, ToolError, ToolInvocation};
use crate::source::Source;
use crate::transcript::{Transcript, TranscriptSource};

pub mod processor;

use processor::{AsrOutput, QualityReport};

/// File the runner writes its JSON result to
pub const ASR_JSON_FILE: &str = "transcript_asr.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioState {
    Init,
    HasDownloadLink,
    DirectDownloadAttempt,
    Download,
    ExtractAudio,
    Transcribe,
    QualityAssess,
    Succeeded,
    Failed,
    Skipped,
}

impl AudioState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, AudioState::Succeeded | AudioState::Failed | AudioState::Skipped)
    }
}

/// Everything the ASR fallback produced, including how far it got
#[derive(Debug)]
pub struct AsrReport {
    pub state: AudioState,
    /// Every state entered, in order
    pub trail: Vec<AudioState>,
    pub runner: Option<PathBuf>,
    pub model: String,
    pub audio_path: Option<PathBuf>,
    pub asr_json: Option<PathBuf>,
    pub transcript: Option<Transcript>,
    pub quality: Option<QualityReport>,
    pub attempts: Vec<Attempt>,
    pub notes: Vec<String>,
}

impl AsrReport {
    fn new(model: &str) -> Self {
        Self {
            state: AudioState::Init,
            trail: vec![AudioState::Init],
            runner: None,
            model: model.to_string(),
            audio_path: None,
            asr_json: None,
            transcript: None,
            quality: None,
            attempts: Vec::new(),
            notes: Vec::new(),
        }
    }

    fn advance(&mut self, next: AudioState) {
        tracing::debug!(from = ?self.state, to = ?next, "asr state");
        self.state = next;
        self.trail.push(next);
    }

    fn skip(mut self, note: impl Into<String>) -> Self {
        let note = note.into();
        self.attempts
            .push(Attempt::new("asr", "transcribe", AttemptOutcome::Skipped(note.clone())));
        self.notes.push(note);
        self.advance(AudioState::Skipped);
        self
    }

    fn fail(mut self, note: impl Into<String>) -> Self {
        let note = note.into();
        self.attempts
            .push(Attempt::new("asr", "transcribe", AttemptOutcome::Failed(note.clone())));
        self.notes.push(note);
        self.advance(AudioState::Failed);
        self
    }
}

/// Locate the speech-to-text runner: explicit path, then well-known install paths, then PATH
pub fn find_runner(asr: &AsrConfig) -> Option<PathBuf> {
    if let Some(explicit) = &asr.runner {
        return is_executable(explicit).then(|| explicit.clone());
    }

    asr.runner_candidates
        .iter()
        .find(|candidate| is_executable(candidate))
        .cloned()
        .or_else(|| which::which(&asr.runner_name).ok())
}

/// Run the whole fallback for one source, writing audio and runner output into `outdir`
pub async fn run_asr_fallback(
    ctx: &RunContext,
    strategy: &dyn PlatformStrategy,
    source: &Source,
    metadata: Option<&Metadata>,
    outdir: &Path,
    show_progress: bool,
) -> AsrReport {
    let asr = &ctx.config.asr;
    let mut report = AsrReport::new(&asr.model);

    let downloader = match Downloader::locate(&ctx.config.tools) {
        Ok(downloader) => downloader,
        Err(_) => return report.skip("ASR fallback skipped: yt-dlp not found."),
    };

    // Checked before downloading so a missing runner costs nothing.
    let Some(runner) = find_runner(asr) else {
        return report.skip(format!(
            "ASR fallback skipped: speech-to-text runner not found. Expected {} or {} in PATH.",
            describe_candidates(asr),
            asr.runner_name
        ));
    };
    tracing::info!("Using ASR runner at {}", runner.display());
    report.runner = Some(runner.clone());

    let progress = spinner("Downloading audio...", show_progress);
    let acquired = audio::acquire_audio(ctx, strategy, source, metadata, &downloader, outdir).await;

    if let Some(link) = &acquired.link {
        report.advance(AudioState::HasDownloadLink);
        if acquired.url.as_deref() != Some(link.url.as_str()) {
            report.advance(AudioState::DirectDownloadAttempt);
        }
    } else {
        report.advance(AudioState::DirectDownloadAttempt);
    }
    report.attempts.extend(acquired.attempts);
    report.notes.extend(acquired.notes);

    let Some(audio_path) = acquired.path else {
        progress.finish_and_clear();
        tracing::warn!(
            "audio acquisition failed: {}",
            acquired.failure.as_deref().unwrap_or("unknown reason")
        );
        report.advance(AudioState::Failed);
        return report;
    };
    progress.finish_with_message("Audio downloaded");
    report.advance(AudioState::Download);
    report.advance(AudioState::ExtractAudio);
    report.audio_path = Some(audio_path.clone());

    report.advance(AudioState::Transcribe);
    let progress = spinner(format!("Transcribing with {}...", asr.model), show_progress);
    let invocation = runner_invocation(ctx, &runner, &audio_path, outdir);
    let json_path = outdir.join(ASR_JSON_FILE);
    let run = invocation.run().await;
    progress.finish_and_clear();

    match run.and_then(|output| output.into_success()) {
        Ok(_) => {}
        Err(ToolError::TimedOut { timeout, .. }) => {
            return report.fail(format!(
                "ASR fallback failed during transcription: runner timed out after {}s",
                timeout.as_secs()
            ));
        }
        Err(ToolError::Failed { stderr_tail, .. }) => {
            return report.fail(format!("ASR fallback failed during transcription: {stderr_tail}"));
        }
        Err(err) => {
            return report.fail(format!("ASR fallback failed during transcription: {err}"));
        }
    }

    if !json_path.is_file() {
        return report.fail(format!("ASR fallback failed: {ASR_JSON_FILE} not created."));
    }
    report.asr_json = Some(json_path.clone());

    let output = match AsrOutput::load(&json_path) {
        Ok(output) => output,
        Err(err) => return report.fail(format!("ASR fallback failed: invalid JSON output ({err:#}).")),
    };

    let text = output.transcript();
    let Some(transcript) = Transcript::new(text, TranscriptSource::Asr) else {
        return report.fail("ASR fallback completed but transcript text is empty.");
    };

    report.advance(AudioState::QualityAssess);
    let quality = processor::assess(
        &output,
        transcript.text(),
        &asr.language,
        &asr.quality,
        &asr.stronger_model,
    );
    tracing::info!(
        assessment = quality.assessment.as_str(),
        cjk_ratio = quality.cjk_ratio,
        chars = quality.text_length,
        "ASR transcript assessed"
    );
    report.notes.extend(quality.notes.iter().cloned());
    report.quality = Some(quality.clone());
    report.transcript = Some(transcript.with_quality(quality));
    report
        .attempts
        .push(Attempt::new("asr", "transcribe", AttemptOutcome::Succeeded));
    report.advance(AudioState::Succeeded);
    report
}

fn runner_invocation(ctx: &RunContext, runner: &Path, audio: &Path, outdir: &Path) -> ToolInvocation {
    let asr = &ctx.config.asr;
    let invocation = ToolInvocation::new(
        runner,
        ctx.deadline.clamp(Duration::from_secs(asr.timeout_secs)),
    )
    .arg(audio)
    .arg("--model")
    .arg(&asr.model)
    .arg("--beam-size")
    .arg(asr.beam_size.max(1).to_string())
    .args(["--vad", "-j", "-o"])
    .arg(outdir.join(ASR_JSON_FILE));

    let language = asr.language.trim();
    if language.is_empty() {
        invocation
    } else {
        invocation.arg("--language").arg(language)
    }
}

fn describe_candidates(asr: &AsrConfig) -> String {
    let mut paths: Vec<String> = asr.runner.iter().map(|p| p.display().to_string()).collect();
    paths.extend(asr.runner_candidates.iter().map(|p| p.display().to_string()));
    if paths.is_empty() {
        "a configured runner".to_string()
    } else {
        paths.join(", ")
    }
}
