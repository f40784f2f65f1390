//! Subtitle Extractor: pull existing tracks with the downloader and reduce them to plain text.

use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};

use crate::context::RunContext;
use crate::downloader::Downloader;
use crate::fallback::AttemptOutcome;
use crate::platforms::scrape::decode_entities;
use crate::process::ToolError;

const SUBTITLE_EXTENSIONS: &[&str] = &["srt", "vtt", "ass"];

static TIMESTAMP_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{1,2}:\d{2}:\d{2}").expect("valid timestamp regex"));

static INLINE_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").expect("valid tag regex"));

static OVERRIDE_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\\[^}]*\}").expect("valid override regex"));

/// How the subtitle stage ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubtitleStatus {
    /// Downloader missing or platform has no tracks
    Skipped(String),
    /// Downloader ran, nothing was written
    NoFiles,
    /// Files were written but held no text after cleaning
    EmptyAfterCleaning,
    Extracted,
    Failed(String),
}

/// Outcome of the subtitle stage
#[derive(Debug, Clone)]
pub struct SubtitleReport {
    pub status: SubtitleStatus,
    pub files: Vec<PathBuf>,
    /// Cleaned text, one `## <file>` section per track
    pub text: Option<String>,
    pub notes: Vec<String>,
}

impl SubtitleReport {
    pub fn skipped(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        Self {
            status: SubtitleStatus::Skipped(reason.clone()),
            files: Vec::new(),
            text: None,
            notes: vec![reason],
        }
    }

    fn failed(reason: String) -> Self {
        Self {
            status: SubtitleStatus::Failed(reason.clone()),
            files: Vec::new(),
            text: None,
            notes: vec![format!("Subtitle extraction failed: {reason}")],
        }
    }

    pub fn transcript(&self) -> Option<&str> {
        self.text.as_deref()
    }

    /// Outcome for the manifest's attempt list
    pub fn outcome(&self) -> AttemptOutcome {
        match &self.status {
            SubtitleStatus::Extracted => AttemptOutcome::Succeeded,
            SubtitleStatus::Skipped(reason) => AttemptOutcome::Skipped(reason.clone()),
            SubtitleStatus::NoFiles => AttemptOutcome::Failed("no subtitle files".to_string()),
            SubtitleStatus::EmptyAfterCleaning => {
                AttemptOutcome::Failed("subtitle files held no text".to_string())
            }
            SubtitleStatus::Failed(reason) => AttemptOutcome::Failed(reason.clone()),
        }
    }
}

/// Run the downloader in subtitle-only mode against `url` and clean whatever it writes to `workdir`
pub async fn extract(ctx: &RunContext, url: &str, workdir: &Path) -> SubtitleReport {
    let downloader = match Downloader::locate(&ctx.config.tools) {
        Ok(downloader) => downloader,
        Err(_) => return SubtitleReport::skipped("yt-dlp not found; skipped subtitle extraction."),
    };

    if let Err(err) = fs_err::create_dir_all(workdir) {
        return SubtitleReport::failed(err.to_string());
    }

    tracing::info!(url, "extracting subtitles");
    let exit_problem = match downloader.write_subtitles(url, workdir, &ctx.deadline).await {
        Ok(output) if output.success => None,
        Ok(output) => Some(format!(
            "yt-dlp exited with {}: {}",
            output.code.map_or_else(|| "a signal".to_string(), |c| c.to_string()),
            output.stderr_tail()
        )),
        Err(ToolError::Missing { .. }) => {
            return SubtitleReport::skipped("yt-dlp not found; skipped subtitle extraction.")
        }
        Err(err) => Some(err.to_string()),
    };

    let files = collect_subtitle_files(workdir);
    let mut notes = Vec::new();

    if files.is_empty() {
        notes.push(
            "yt-dlp ran but no subtitles found. Consider ASR fallback with --asr-fallback."
                .to_string(),
        );
        if let Some(problem) = exit_problem {
            notes.push(problem);
        }
        return SubtitleReport {
            status: SubtitleStatus::NoFiles,
            files,
            text: None,
            notes,
        };
    }

    let text = render_sections(&files);
    if text.is_empty() {
        notes.push("Subtitle files were present but contained no usable text.".to_string());
        return SubtitleReport {
            status: SubtitleStatus::EmptyAfterCleaning,
            files,
            text: None,
            notes,
        };
    }

    if exit_problem.is_some() {
        notes.push(
            "yt-dlp returned non-zero exit code but some subtitle output was captured."
                .to_string(),
        );
    }
    tracing::info!(files = files.len(), chars = text.chars().count(), "subtitles extracted");

    SubtitleReport {
        status: SubtitleStatus::Extracted,
        files,
        text: Some(text),
        notes,
    }
}

/// Subtitle files under `dir`, sorted by path
pub fn collect_subtitle_files(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = fs_err::read_dir(dir) else {
        return Vec::new();
    };

    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| SUBTITLE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        })
        .collect();
    files.sort();
    files
}

/// Cleaned text of every file under a `## <file name>` header; unreadable files get an inline marker
pub fn render_sections(files: &[PathBuf]) -> String {
    let mut blocks = Vec::new();
    for path in files {
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        match fs_err::read(path) {
            Ok(bytes) => {
                let raw = String::from_utf8_lossy(&bytes);
                let is_ass = path
                    .extension()
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("ass"));
                let cleaned = if is_ass {
                    clean_ass_text(&raw)
                } else {
                    clean_subtitle_text(&raw)
                };
                if !cleaned.is_empty() {
                    blocks.push(format!("## {name}\n\n{cleaned}"));
                }
            }
            Err(err) => {
                tracing::warn!("Could not read subtitle file {}: {}", path.display(), err);
                blocks.push(format!("## {name}\n\n[Failed to parse subtitle: {err}]"));
            }
        }
    }
    blocks.join("\n\n").trim().to_string()
}

/// Strip cue indices, timing lines, headers and inline markup from SRT/VTT text,
/// collapsing consecutive duplicate lines
pub fn clean_subtitle_text(raw: &str) -> String {
    collapse_duplicates(raw.lines().filter_map(clean_line)).join("\n")
}

/// Dialogue text of an ASS/SSA script, cleaned like SRT
pub fn clean_ass_text(raw: &str) -> String {
    let dialogue = raw.lines().filter_map(|line| {
        let rest = line.trim().strip_prefix("Dialogue:")?;
        // Text is the tenth field and may itself contain commas.
        rest.splitn(10, ',').nth(9).map(|text| text.replace("\\N", "\n"))
    });

    let lines: Vec<String> = dialogue
        .flat_map(|text| text.lines().map(str::to_string).collect::<Vec<_>>())
        .filter_map(|line| clean_line(&line))
        .collect();
    collapse_duplicates(lines).join("\n")
}

fn clean_line(line: &str) -> Option<String> {
    let line = line.trim().trim_start_matches('\u{feff}');
    if line.is_empty()
        || line.starts_with("WEBVTT")
        || line.starts_with("NOTE")
        || line.starts_with("Kind:")
        || line.starts_with("Language:")
        || line.chars().all(|c| c.is_ascii_digit())
        || line.contains("-->")
        || TIMESTAMP_LINE.is_match(line)
    {
        return None;
    }

    let stripped = INLINE_TAG.replace_all(line, "");
    let stripped = OVERRIDE_TAG.replace_all(&stripped, "");
    let text = decode_entities(&stripped);
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

/// Drop lines equal to the line right before them
pub fn collapse_duplicates<I, S>(lines: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out: Vec<String> = Vec::new();
    for line in lines {
        let line = line.as_ref();
        if out.last().map(String::as_str) != Some(line) {
            out.push(line.to_string());
        }
    }
    out
}
