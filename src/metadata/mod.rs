use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::fallback::Attempt;
use crate::source::Platform;

/// Platform metadata, filled in incrementally by a resolver. Every field may be missing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metadata {
    pub platform: Platform,
    pub canonical_url: String,
    pub identifier: Option<String>,

    /// Secondary platform keys (aid, cid, video_id, ...)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub platform_ids: BTreeMap<String, String>,

    pub title: Option<String>,
    pub author: Option<String>,
    pub description: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub duration_sec: Option<u64>,

    /// Engagement counters keyed by the platform's own names
    #[serde(default)]
    pub stats: BTreeMap<String, i64>,

    #[serde(default)]
    pub tags: Vec<String>,

    /// Ordered by start time
    #[serde(default)]
    pub chapters: Vec<Chapter>,

    #[serde(default)]
    pub subtitle_tracks: Vec<SubtitleTrack>,

    pub need_login_subtitle: Option<bool>,

    /// `video`, `image` or `audio` when the page says so
    pub content_type: Option<String>,

    /// Playable media URL discovered while resolving
    pub media_url: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<String>,

    /// True when no strategy produced usable metadata
    pub degradation_mode: bool,

    /// Strategies tried, in order
    #[serde(default)]
    pub attempts: Vec<Attempt>,

    /// Partial failures that did not stop resolution
    #[serde(default)]
    pub errors: Vec<String>,

    /// Retry notes forwarded to the manifest
    #[serde(skip)]
    pub notes: Vec<String>,
}

impl Metadata {
    pub fn new(platform: Platform, canonical_url: impl Into<String>, identifier: Option<String>) -> Self {
        Self {
            platform,
            canonical_url: canonical_url.into(),
            identifier,
            platform_ids: BTreeMap::new(),
            title: None,
            author: None,
            description: None,
            published_at: None,
            duration_sec: None,
            stats: BTreeMap::new(),
            tags: Vec::new(),
            chapters: Vec::new(),
            subtitle_tracks: Vec::new(),
            need_login_subtitle: None,
            content_type: None,
            media_url: None,
            images: Vec::new(),
            degradation_mode: false,
            attempts: Vec::new(),
            errors: Vec::new(),
            notes: Vec::new(),
        }
    }

    pub fn set_published_unix(&mut self, secs: i64) {
        self.published_at = Utc.timestamp_opt(secs, 0).single();
    }

    /// Replace chapters, keeping them sorted by start time
    pub fn set_chapters(&mut self, mut chapters: Vec<Chapter>) {
        chapters.sort_by_key(|chapter| chapter.start_sec);
        self.chapters = chapters;
    }

    /// Tracks that point at a downloadable subtitle body
    pub fn fetchable_tracks(&self) -> impl Iterator<Item = &SubtitleTrack> {
        self.subtitle_tracks
            .iter()
            .filter(|track| track.url.as_deref().is_some_and(|url| !url.is_empty()))
    }
}

/// A named span of the media, with offsets in seconds and `HH:MM:SS`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chapter {
    pub title: Option<String>,
    pub start_sec: u64,
    pub end_sec: u64,
    pub start_hms: String,
    pub end_hms: String,
}

impl Chapter {
    pub fn new(title: Option<String>, start_sec: u64, end_sec: u64) -> Self {
        let end_sec = end_sec.max(start_sec);
        Self {
            title,
            start_sec,
            end_sec,
            start_hms: sec_to_hms(start_sec),
            end_hms: sec_to_hms(end_sec),
        }
    }
}

/// Language-tagged reference to a subtitle stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubtitleTrack {
    pub id: Option<i64>,
    pub language: Option<String>,
    pub label: Option<String>,
    pub url: Option<String>,
}

/// Format seconds as zero-padded `HH:MM:SS`
pub fn sec_to_hms(seconds: u64) -> String {
    let h = seconds / 3600;
    let m = (seconds % 3600) / 60;
    let s = seconds % 60;
    format!("{h:02}:{m:02}:{s:02}")
}
