//! `yt-dlp` wrapper: subtitle-only and audio-extraction modes.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::ToolsConfig;
use crate::context::Deadline;
use crate::process::{find_program, ToolError, ToolInvocation, ToolOutput};

const TOOL_NAME: &str = "yt-dlp";

/// Output template stem for audio downloads
pub const AUDIO_STEM: &str = "asr_audio";

/// Output template stem for subtitle downloads
pub const SUBTITLE_STEM: &str = "media";

/// External media downloader
#[derive(Debug, Clone)]
pub struct Downloader {
    program: PathBuf,
    subtitle_timeout: Duration,
    download_timeout: Duration,
    audio_format: String,
    audio_quality: String,
}

impl Downloader {
    /// Find yt-dlp at the configured path or on PATH
    pub fn locate(tools: &ToolsConfig) -> Result<Self, ToolError> {
        let program = find_program(tools.yt_dlp.as_deref(), TOOL_NAME).ok_or_else(|| {
            ToolError::Missing {
                tool: TOOL_NAME.to_string(),
            }
        })?;
        tracing::debug!("Using downloader at {}", program.display());

        Ok(Self {
            program,
            subtitle_timeout: Duration::from_secs(tools.subtitle_timeout_secs),
            download_timeout: Duration::from_secs(tools.download_timeout_secs),
            audio_format: tools.audio_format.clone(),
            audio_quality: tools.audio_quality.clone(),
        })
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Write every available subtitle track (manual and automatic) as SRT into `workdir`,
    /// without downloading the media. A non-zero exit is returned as output, not an error,
    /// since partial subtitle output is still worth collecting.
    pub async fn write_subtitles(
        &self,
        url: &str,
        workdir: &Path,
        deadline: &Deadline,
    ) -> Result<ToolOutput, ToolError> {
        let template = workdir.join(format!("{SUBTITLE_STEM}.%(ext)s"));
        ToolInvocation::new(&self.program, deadline.clamp(self.subtitle_timeout))
            .args([
                "--skip-download",
                "--write-subs",
                "--write-auto-subs",
                "--sub-langs",
                "all",
                "--convert-subs",
                "srt",
                "--no-playlist",
            ])
            .arg("-o")
            .arg(template)
            .arg(url)
            .run()
            .await
    }

    /// Download `url` and extract its audio as `<outdir>/asr_audio.<ext>`; non-zero exit is an error
    pub async fn extract_audio(
        &self,
        url: &str,
        outdir: &Path,
        deadline: &Deadline,
    ) -> Result<ToolOutput, ToolError> {
        let template = outdir.join(format!("{AUDIO_STEM}.%(ext)s"));
        ToolInvocation::new(&self.program, deadline.clamp(self.download_timeout))
            .args(["-x", "--audio-format"])
            .arg(&self.audio_format)
            .arg("--audio-quality")
            .arg(&self.audio_quality)
            .args(["--no-playlist", "--newline"])
            .arg("-o")
            .arg(template)
            .arg(url)
            .run()
            .await?
            .into_success()
    }
}

/// Most recently modified `<stem>.*` file in `dir`
pub fn newest_with_stem(dir: &Path, stem: &str) -> Option<PathBuf> {
    let prefix = format!("{stem}.");
    let entries = fs_err::read_dir(dir).ok()?;

    entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| {
            entry
                .file_name()
                .to_str()
                .is_some_and(|name| name.starts_with(&prefix) && !name.ends_with(".part"))
        })
        .filter_map(|entry| {
            let modified = entry.metadata().ok()?.modified().ok()?;
            Some((modified, entry.path()))
        })
        .max_by_key(|(modified, _)| *modified)
        .map(|(_, path)| path)
}
