use serde::{Deserialize, Serialize};

use crate::transcribe::processor::QualityReport;

/// Where transcript text came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TranscriptSource {
    Subtitles,
    EmbeddedJson,
    Asr,
}

impl TranscriptSource {
    /// Higher wins when two sources are available
    pub fn priority(&self) -> u8 {
        match self {
            TranscriptSource::Subtitles => 3,
            TranscriptSource::EmbeddedJson => 2,
            TranscriptSource::Asr => 1,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TranscriptSource::Subtitles => "subtitles",
            TranscriptSource::EmbeddedJson => "embedded-json",
            TranscriptSource::Asr => "asr",
        }
    }
}

impl std::fmt::Display for TranscriptSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Plain transcript text with provenance. Never edited in place, only replaced whole.
#[derive(Debug, Clone)]
pub struct Transcript {
    text: String,
    source: TranscriptSource,
    quality: Option<QualityReport>,
}

impl Transcript {
    /// `None` for whitespace-only text
    pub fn new(text: impl Into<String>, source: TranscriptSource) -> Option<Self> {
        let text = text.into().trim().to_string();
        (!text.is_empty()).then_some(Self {
            text,
            source,
            quality: None,
        })
    }

    pub fn with_quality(mut self, quality: QualityReport) -> Self {
        self.quality = Some(quality);
        self
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn source(&self) -> TranscriptSource {
        self.source
    }

    pub fn quality(&self) -> Option<&QualityReport> {
        self.quality.as_ref()
    }

    pub fn chars(&self) -> usize {
        self.text.chars().count()
    }
}

/// Holds at most one transcript; a candidate only replaces it when its source ranks higher
#[derive(Debug, Default)]
pub struct TranscriptSlot {
    current: Option<Transcript>,
}

impl TranscriptSlot {
    /// Offer a candidate; returns whether it was taken
    pub fn offer(&mut self, candidate: Transcript) -> bool {
        let replace = self
            .current
            .as_ref()
            .map_or(true, |held| candidate.source.priority() > held.source.priority());
        if replace {
            tracing::debug!(source = %candidate.source, chars = candidate.chars(), "transcript accepted");
            self.current = Some(candidate);
        }
        replace
    }

    pub fn get(&self) -> Option<&Transcript> {
        self.current.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.current.is_none()
    }

    pub fn into_inner(self) -> Option<Transcript> {
        self.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_text_is_not_a_transcript() {
        assert!(Transcript::new("  \n ", TranscriptSource::Asr).is_none());
    }

    #[test]
    fn higher_priority_replaces_lower_only() {
        let mut slot = TranscriptSlot::default();
        assert!(slot.offer(Transcript::new("asr text", TranscriptSource::Asr).unwrap()));
        assert!(slot.offer(Transcript::new("embedded", TranscriptSource::EmbeddedJson).unwrap()));
        assert!(slot.offer(Transcript::new("subs", TranscriptSource::Subtitles).unwrap()));
        assert!(!slot.offer(Transcript::new("late asr", TranscriptSource::Asr).unwrap()));
        assert!(!slot.offer(Transcript::new("again", TranscriptSource::Subtitles).unwrap()));

        let held = slot.get().unwrap();
        assert_eq!(held.text(), "subs");
        assert_eq!(held.source(), TranscriptSource::Subtitles);
    }

    #[test]
    fn sources_serialize_kebab_case() {
        let json = serde_json::to_string(&TranscriptSource::EmbeddedJson).unwrap();
        assert_eq!(json, "\"embedded-json\"");
    }
}
