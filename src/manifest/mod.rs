//! Manifest Builder: the run's ledger, mutated by each stage and written once at the end.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::fallback::Attempt;
use crate::source::{Platform, Source, SourceKind};
use crate::transcribe::processor::QualityReport;
use crate::transcript::{Transcript, TranscriptSource};

pub const MANIFEST_FILE: &str = "manifest.json";

/// Value of one `files` entry
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ArtifactRef {
    /// Stage ran but produced nothing (`null`)
    Missing,
    Path(PathBuf),
    List(Vec<PathBuf>),
    /// Remote location, e.g. the proxy URL used
    Url(String),
}

impl From<Option<PathBuf>> for ArtifactRef {
    fn from(path: Option<PathBuf>) -> Self {
        path.map_or(ArtifactRef::Missing, ArtifactRef::Path)
    }
}

/// Where the final transcript lives and where it came from
#[derive(Debug, Clone, Serialize)]
pub struct TranscriptRecord {
    pub path: PathBuf,
    pub source: TranscriptSource,
    pub chars: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct Manifest {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub input: String,
    pub kind: SourceKind,
    pub platform: Platform,
    pub normalized_input: String,
    pub files: BTreeMap<String, ArtifactRef>,
    pub notes: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub asr_quality: Option<QualityReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub candidates: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcript: Option<TranscriptRecord>,
    pub attempts: Vec<Attempt>,
}

impl Manifest {
    pub fn new(source: &Source) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: None,
            input: source.input.clone(),
            kind: source.kind,
            platform: source.platform,
            normalized_input: source.target().to_string(),
            files: BTreeMap::new(),
            notes: Vec::new(),
            asr_quality: None,
            candidates: None,
            transcript: None,
            attempts: Vec::new(),
        }
    }

    /// Refresh platform and normalized input after a short link was expanded
    pub fn update_source(&mut self, source: &Source) {
        self.platform = source.platform;
        self.normalized_input = source.target().to_string();
    }

    pub fn note(&mut self, note: impl Into<String>) {
        let note = note.into();
        tracing::info!("note: {}", note);
        self.notes.push(note);
    }

    pub fn notes<I, S>(&mut self, notes: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for note in notes {
            self.note(note);
        }
    }

    pub fn set_file(&mut self, name: &str, artifact: impl Into<ArtifactRef>) {
        self.files.insert(name.to_string(), artifact.into());
    }

    pub fn set_path(&mut self, name: &str, path: impl Into<PathBuf>) {
        self.set_file(name, ArtifactRef::Path(path.into()));
    }

    pub fn record_attempts(&mut self, attempts: impl IntoIterator<Item = Attempt>) {
        self.attempts.extend(attempts);
    }

    /// Point `files.transcript` and the transcript record at `path`
    pub fn set_transcript(&mut self, path: &Path, transcript: &Transcript) {
        self.set_path("transcript", path);
        self.transcript = Some(TranscriptRecord {
            path: path.to_path_buf(),
            source: transcript.source(),
            chars: transcript.chars(),
        });
    }

    /// Stamp the finish time and write `manifest.json` into `outdir`.
    /// Consumes the builder; the returned copy is for reporting only.
    pub fn finalize(mut self, outdir: &Path) -> Result<(Manifest, PathBuf)> {
        self.finished_at = Some(Utc::now());
        let path = outdir.join(MANIFEST_FILE);
        let content = serde_json::to_string_pretty(&self).context("Failed to serialize manifest")?;
        fs_err::write(&path, content)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        tracing::info!("Manifest written to {}", path.display());
        Ok((self, path))
    }
}

impl From<PathBuf> for ArtifactRef {
    fn from(path: PathBuf) -> Self {
        ArtifactRef::Path(path)
    }
}

impl From<Vec<PathBuf>> for ArtifactRef {
    fn from(paths: Vec<PathBuf>) -> Self {
        ArtifactRef::List(paths)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platforms::PlatformRegistry;
    use crate::source::classify;

    fn web_source() -> Source {
        classify("https://example.com/post", &PlatformRegistry::new()).unwrap()
    }

    #[test]
    fn missing_artifacts_serialize_as_null() {
        let mut manifest = Manifest::new(&web_source());
        manifest.set_file("transcript", ArtifactRef::Missing);
        manifest.set_file("subtitle_files", Vec::<PathBuf>::new());
        manifest.set_file("read_via", ArtifactRef::Url("https://r.jina.ai/x".into()));

        let value = serde_json::to_value(&manifest).unwrap();
        assert!(value["files"]["transcript"].is_null());
        assert_eq!(value["files"]["subtitle_files"], serde_json::json!([]));
        assert_eq!(value["files"]["read_via"], "https://r.jina.ai/x");
        assert_eq!(value["kind"], "url");
        assert_eq!(value["platform"], "web");
        assert!(value.get("asr_quality").is_none());
        assert!(value.get("transcript").is_none());
    }

    #[test]
    fn finalize_writes_once_with_finish_time() {
        let dir = tempfile::tempdir().unwrap();
        let mut manifest = Manifest::new(&web_source());
        manifest.note("Fetched readable content");

        let transcript = Transcript::new("hello", TranscriptSource::Subtitles).unwrap();
        manifest.set_transcript(&dir.path().join("transcript.txt"), &transcript);

        let (written, path) = manifest.finalize(dir.path()).unwrap();
        assert_eq!(path, dir.path().join(MANIFEST_FILE));
        assert!(written.finished_at.is_some());

        let value: serde_json::Value =
            serde_json::from_str(&fs_err::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["notes"][0], "Fetched readable content");
        assert_eq!(value["transcript"]["source"], "subtitles");
        assert_eq!(value["transcript"]["chars"], 5);
        assert!(value["files"]["transcript"].is_string());
    }
}
