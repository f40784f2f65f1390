use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::config::QualityThresholds;

/// JSON document written by the ASR runner
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AsrOutput {
    #[serde(default)]
    pub text: Option<String>,

    #[serde(default)]
    pub language: Option<String>,

    #[serde(default)]
    pub language_probability: Option<f64>,

    #[serde(default)]
    pub segments: Vec<AsrSegment>,
}

/// Individual segment with timing, when the runner emits them
#[derive(Debug, Clone, Deserialize)]
pub struct AsrSegment {
    #[serde(default)]
    pub start: f64,
    #[serde(default)]
    pub end: f64,
    #[serde(default)]
    pub text: String,
}

impl AsrOutput {
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = fs_err::read(path)?;
        let raw = String::from_utf8_lossy(&bytes);
        serde_json::from_str(&raw).with_context(|| format!("invalid JSON output in {}", path.display()))
    }

    /// Trimmed transcript text; falls back to joined segments when `text` is absent
    pub fn transcript(&self) -> String {
        match self.text.as_deref().map(str::trim) {
            Some(text) if !text.is_empty() => text.to_string(),
            _ => self
                .segments
                .iter()
                .map(|segment| segment.text.trim())
                .filter(|text| !text.is_empty())
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityGrade {
    High,
    Medium,
    Low,
}

impl QualityGrade {
    pub fn as_str(&self) -> &'static str {
        match self {
            QualityGrade::High => "high",
            QualityGrade::Medium => "medium",
            QualityGrade::Low => "low",
        }
    }
}

/// Plausibility assessment attached to an ASR transcript (`asr_quality` in the manifest)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityReport {
    pub assessment: QualityGrade,
    pub text_length: usize,
    pub cjk_ratio: f64,
    pub language: Option<String>,
    pub language_probability: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommended_model: Option<String>,
}

/// Whether `c` belongs to a Chinese, Japanese or Korean script
pub fn is_cjk(c: char) -> bool {
    matches!(c,
        '\u{4e00}'..='\u{9fff}'
        | '\u{3400}'..='\u{4dbf}'
        | '\u{f900}'..='\u{faff}'
        | '\u{3040}'..='\u{30ff}'
        | '\u{ac00}'..='\u{d7af}'
        | '\u{20000}'..='\u{2a6df}')
}

/// Fraction of characters in `text` that are CJK, rounded to four places
pub fn cjk_ratio(text: &str) -> f64 {
    let total = text.chars().count();
    if total == 0 {
        return 0.0;
    }
    let cjk = text.chars().filter(|c| is_cjk(*c)).count();
    ((cjk as f64 / total as f64) * 10_000.0).round() / 10_000.0
}

fn is_cjk_language(code: &str) -> bool {
    let code = code.trim().to_ascii_lowercase();
    ["zh", "ja", "ko", "yue", "cmn"]
        .iter()
        .any(|prefix| code == *prefix || code.starts_with(&format!("{prefix}-")) || code.starts_with(&format!("{prefix}_")))
}

/// Grade from the CJK ratio (when it applies) and the engine's language confidence
pub fn grade(
    cjk_ratio: Option<f64>,
    language_probability: Option<f64>,
    thresholds: &QualityThresholds,
) -> QualityGrade {
    let mut grade = match cjk_ratio {
        Some(ratio) if ratio < thresholds.cjk_low => QualityGrade::Low,
        Some(ratio) if ratio < thresholds.cjk_medium => QualityGrade::Medium,
        _ => QualityGrade::High,
    };
    if grade == QualityGrade::High
        && language_probability.is_some_and(|p| p < thresholds.min_language_confidence)
    {
        grade = QualityGrade::Medium;
    }
    grade
}

/// Score a transcript. The CJK check applies when the language hint is CJK, or when the
/// hint is empty and the engine detected a CJK language.
pub fn assess(
    output: &AsrOutput,
    text: &str,
    language_hint: &str,
    thresholds: &QualityThresholds,
    stronger_model: &str,
) -> QualityReport {
    let ratio = cjk_ratio(text);
    let checked_language = if language_hint.trim().is_empty() {
        output.language.clone().unwrap_or_default()
    } else {
        language_hint.trim().to_string()
    };
    let cjk_applies = is_cjk_language(&checked_language);

    let assessment = grade(
        cjk_applies.then_some(ratio),
        output.language_probability,
        thresholds,
    );

    let mut notes = Vec::new();
    let mut recommended_model = None;
    match assessment {
        QualityGrade::Low => {
            notes.push(format!(
                "ASR transcript quality looks low for {checked_language} (cjk_ratio={ratio}). Consider re-running with --asr-model {stronger_model}."
            ));
            recommended_model = Some(stronger_model.to_string());
        }
        QualityGrade::Medium if cjk_applies && ratio < thresholds.cjk_medium => {
            notes.push(format!(
                "ASR transcript has a modest CJK share for {checked_language} (cjk_ratio={ratio}); spot-check before relying on it."
            ));
        }
        QualityGrade::Medium => {
            notes.push(format!(
                "ASR language confidence is low ({}); spot-check before relying on it.",
                output
                    .language_probability
                    .map_or_else(|| "unknown".to_string(), |p| format!("{p:.2}"))
            ));
        }
        QualityGrade::High => {}
    }

    QualityReport {
        assessment,
        text_length: text.chars().count(),
        cjk_ratio: ratio,
        language: output.language.clone(),
        language_probability: output.language_probability,
        notes,
        recommended_model,
    }
}
