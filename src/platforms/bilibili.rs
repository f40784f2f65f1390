use async_trait::async_trait;
use once_cell::sync::Lazy;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::BTreeMap;

use super::scrape::absolute_https;
use super::{IdRule, PlatformStrategy};
use crate::context::RunContext;
use crate::fallback::{Attempt, AttemptOutcome, StepError};
use crate::fetch::{FetchRequest, Page};
use crate::metadata::{Chapter, Metadata, SubtitleTrack};
use crate::source::{Platform, Source};

const STAGE: &str = "metadata";
const REFERER: &str = "https://www.bilibili.com/";

static RULES: Lazy<Vec<IdRule>> = Lazy::new(|| {
    vec![
        IdRule::query("bvid", r"BV[0-9A-Za-z]{10}"),
        IdRule::path(r"/video/(BV[0-9A-Za-z]{10})"),
        IdRule::path(r"/video/(av\d+)"),
        IdRule::anywhere(r"(BV[0-9A-Za-z]{10})"),
    ]
});

/// Standard `{code, message, data}` envelope of the public web API
#[derive(Debug, Deserialize)]
struct ApiEnvelope<T> {
    code: i64,
    #[serde(default)]
    message: String,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct ViewData {
    aid: Option<i64>,
    bvid: Option<String>,
    cid: Option<i64>,
    title: Option<String>,
    desc: Option<String>,
    pic: Option<String>,
    pubdate: Option<i64>,
    duration: Option<u64>,
    owner: Option<Owner>,
    #[serde(default)]
    stat: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct Owner {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TagItem {
    tag_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PlayerData {
    #[serde(default)]
    view_points: Vec<ViewPoint>,
    subtitle: Option<PlayerSubtitles>,
    need_login_subtitle: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct ViewPoint {
    #[serde(default)]
    from: u64,
    #[serde(default)]
    to: u64,
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PlayerSubtitles {
    #[serde(default)]
    subtitles: Vec<PlayerTrack>,
}

#[derive(Debug, Deserialize)]
struct PlayerTrack {
    id: Option<i64>,
    lan: Option<String>,
    lan_doc: Option<String>,
    subtitle_url: Option<String>,
}

/// Body of a subtitle track download
#[derive(Debug, Deserialize)]
struct SubtitleBody {
    #[serde(default)]
    body: Vec<SubtitleCue>,
}

#[derive(Debug, Deserialize)]
struct SubtitleCue {
    #[serde(default)]
    content: String,
}

/// Bilibili: stable public JSON API keyed by BVID
pub struct BilibiliStrategy;

impl BilibiliStrategy {
    pub fn new() -> Self {
        Self
    }

    fn api_base(ctx: &RunContext) -> &str {
        ctx.config.platforms.bilibili_api_base.trim_end_matches('/')
    }

    /// GET an API endpoint and unwrap its envelope. A non-zero code is an error carrying the code.
    async fn call_api<T: DeserializeOwned>(
        ctx: &RunContext,
        url: String,
    ) -> (Result<T, String>, Vec<String>) {
        let request = FetchRequest::new(url).header("Referer", REFERER);
        let fetched = ctx
            .http
            .fetch_json::<ApiEnvelope<T>>(&request, &ctx.deadline)
            .await;

        let result = match fetched.result {
            Err(err) => Err(err.to_string()),
            Ok(envelope) if envelope.code != 0 => Err(format!(
                "returned code={} message={}",
                envelope.code, envelope.message
            )),
            Ok(envelope) => envelope
                .data
                .ok_or_else(|| "response carried no data".to_string()),
        };
        (result, fetched.notes)
    }

    fn apply_view(meta: &mut Metadata, view: ViewData) -> (Option<i64>, Option<i64>) {
        if let Some(aid) = view.aid {
            meta.platform_ids.insert("aid".to_string(), aid.to_string());
        }
        if let Some(cid) = view.cid {
            meta.platform_ids.insert("cid".to_string(), cid.to_string());
        }
        if let Some(bvid) = view.bvid {
            meta.platform_ids.insert("bvid".to_string(), bvid);
        }

        meta.title = view.title;
        meta.description = view.desc.filter(|desc| !desc.trim().is_empty());
        meta.author = view.owner.and_then(|owner| owner.name);
        meta.duration_sec = view.duration;
        if let Some(pubdate) = view.pubdate {
            meta.set_published_unix(pubdate);
        }
        if let Some(pic) = view.pic {
            meta.images.push(absolute_https(&pic));
        }
        meta.stats = view
            .stat
            .into_iter()
            .filter_map(|(name, value)| value.as_i64().map(|count| (name, count)))
            .filter(|(name, _)| name != "aid")
            .collect();
        meta.content_type = Some("video".to_string());

        (view.aid, view.cid)
    }

    fn apply_player(meta: &mut Metadata, player: PlayerData) {
        meta.set_chapters(
            player
                .view_points
                .into_iter()
                .map(|point| Chapter::new(point.content, point.from, point.to))
                .collect(),
        );
        meta.subtitle_tracks = player
            .subtitle
            .map(|subtitle| subtitle.subtitles)
            .unwrap_or_default()
            .into_iter()
            .map(|track| SubtitleTrack {
                id: track.id,
                language: track.lan,
                label: track.lan_doc,
                url: track.subtitle_url.filter(|url| !url.is_empty()),
            })
            .collect();
        meta.need_login_subtitle = player.need_login_subtitle;
    }

    async fn fetch_tags(ctx: &RunContext, aid: i64) -> (Result<Vec<TagItem>, String>, Vec<String>) {
        let url = format!("{}/x/tag/archive/tags?aid={}", Self::api_base(ctx), aid);
        Self::call_api(ctx, url).await
    }

    async fn fetch_player(
        ctx: &RunContext,
        aid: i64,
        cid: Option<i64>,
    ) -> (Result<PlayerData, String>, Vec<String>) {
        let Some(cid) = cid else {
            return (Err("no cid in view data".to_string()), Vec::new());
        };
        let url = format!("{}/x/player/v2?aid={}&cid={}", Self::api_base(ctx), aid, cid);
        Self::call_api(ctx, url).await
    }
}

impl Default for BilibiliStrategy {
    fn default() -> Self {
        Self::new()
    }
}

/// Track whose language matches `hint`, else the first one with a URL
fn pick_track<'m>(metadata: &'m Metadata, hint: &str) -> Option<&'m SubtitleTrack> {
    let hint = hint.trim().to_ascii_lowercase();
    let by_language = (!hint.is_empty())
        .then(|| {
            metadata.fetchable_tracks().find(|track| {
                track
                    .language
                    .as_deref()
                    .is_some_and(|lan| lan.to_ascii_lowercase().contains(&hint))
            })
        })
        .flatten();
    by_language.or_else(|| metadata.fetchable_tracks().next())
}

#[async_trait]
impl PlatformStrategy for BilibiliStrategy {
    fn platform(&self) -> Platform {
        Platform::Bilibili
    }

    fn domains(&self) -> &'static [&'static str] {
        &["bilibili.com", "b23.tv"]
    }

    fn short_link_domains(&self) -> &'static [&'static str] {
        &["b23.tv"]
    }

    fn is_media(&self) -> bool {
        true
    }

    fn id_rules(&self) -> &'static [IdRule] {
        &RULES
    }

    fn canonical_url(&self, identifier: &str) -> String {
        format!("https://www.bilibili.com/video/{identifier}")
    }

    async fn resolve_metadata(
        &self,
        ctx: &RunContext,
        source: &Source,
        _reader: Option<Page>,
    ) -> Option<Metadata> {
        let mut meta = Metadata::new(Platform::Bilibili, source.target(), source.identifier.clone());

        let Some(id) = source.identifier.as_deref() else {
            meta.errors.push("No BVID detected from URL".to_string());
            meta.attempts.push(Attempt::new(
                STAGE,
                "view-api",
                AttemptOutcome::Skipped("no video id".to_string()),
            ));
            meta.degradation_mode = true;
            return Some(meta);
        };

        let query = match id.strip_prefix("av") {
            Some(aid) => format!("aid={aid}"),
            None => format!("bvid={id}"),
        };
        let view_url = format!("{}/x/web-interface/view?{}", Self::api_base(ctx), query);
        let (view, notes) = Self::call_api::<ViewData>(ctx, view_url).await;
        meta.notes.extend(notes);

        let view = match view {
            Ok(view) => view,
            Err(reason) => {
                tracing::warn!(id, "bilibili view api failed: {}", reason);
                meta.errors.push(format!("view api {reason}"));
                meta.attempts
                    .push(Attempt::new(STAGE, "view-api", AttemptOutcome::Failed(reason)));
                meta.degradation_mode = true;
                return Some(meta);
            }
        };
        meta.attempts
            .push(Attempt::new(STAGE, "view-api", AttemptOutcome::Succeeded));

        let (aid, cid) = Self::apply_view(&mut meta, view);
        let Some(aid) = aid else {
            meta.errors
                .push("view data has no aid; skipping tag and player lookups".to_string());
            return Some(meta);
        };

        // Independent lookups; each failure only affects its own fields.
        let ((tags, tag_notes), (player, player_notes)) =
            tokio::join!(Self::fetch_tags(ctx, aid), Self::fetch_player(ctx, aid, cid));
        meta.notes.extend(tag_notes);
        meta.notes.extend(player_notes);

        match tags {
            Ok(tags) => {
                meta.tags = tags.into_iter().filter_map(|tag| tag.tag_name).collect();
                meta.attempts
                    .push(Attempt::new(STAGE, "tag-api", AttemptOutcome::Succeeded));
            }
            Err(reason) => {
                meta.errors.push(format!("tag api {reason}"));
                meta.attempts
                    .push(Attempt::new(STAGE, "tag-api", AttemptOutcome::Failed(reason)));
            }
        }

        match player {
            Ok(player) => {
                Self::apply_player(&mut meta, player);
                meta.attempts
                    .push(Attempt::new(STAGE, "player-api", AttemptOutcome::Succeeded));
            }
            Err(reason) => {
                meta.errors.push(format!("player api {reason}"));
                meta.attempts
                    .push(Attempt::new(STAGE, "player-api", AttemptOutcome::Failed(reason)));
            }
        }

        tracing::info!(
            id,
            chapters = meta.chapters.len(),
            tracks = meta.subtitle_tracks.len(),
            tags = meta.tags.len(),
            "bilibili metadata resolved"
        );
        Some(meta)
    }

    async fn fetch_embedded_transcript(
        &self,
        ctx: &RunContext,
        metadata: &Metadata,
    ) -> Result<String, StepError> {
        let track = pick_track(metadata, &ctx.config.asr.language)
            .ok_or_else(|| StepError::skipped("no subtitle track with a URL"))?;
        let url = track
            .url
            .as_deref()
            .map(|url| match url.strip_prefix("//") {
                Some(rest) => format!("https://{rest}"),
                None => url.to_string(),
            })
            .ok_or_else(|| StepError::skipped("subtitle track has no URL"))?;

        let request = FetchRequest::new(url).header("Referer", REFERER);
        let body = ctx
            .http
            .fetch_json::<SubtitleBody>(&request, &ctx.deadline)
            .await
            .result?;

        let lines = crate::subtitles::collapse_duplicates(
            body.body
                .iter()
                .map(|cue| cue.content.trim())
                .filter(|line| !line.is_empty()),
        );
        if lines.is_empty() {
            return Err(StepError::failed("subtitle JSON contained no cues"));
        }
        Ok(lines.join("\n"))
    }
}
