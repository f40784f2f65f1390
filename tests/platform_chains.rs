mod common;

use omni_source::context::RunContext;
use omni_source::fallback::{Attempt, AttemptOutcome};
use omni_source::fetch::Page;
use omni_source::platforms::douyin::DouyinStrategy;
use omni_source::platforms::xiaohongshu::XiaohongshuStrategy;
use omni_source::platforms::xiaoyuzhou::XiaoyuzhouStrategy;
use omni_source::{AcquisitionPipeline, Platform, PlatformStrategy, Source, SourceKind};
use wiremock::matchers::{header, method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

const VIDEO_ID: &str = "7301234567890123456";

fn source(platform: Platform, url: String, identifier: Option<&str>) -> Source {
    Source {
        input: url.clone(),
        kind: SourceKind::Url,
        platform,
        original_url: Some(url.clone()),
        canonical_url: Some(url),
        identifier: identifier.map(str::to_string),
    }
}

fn douyin_source() -> Source {
    source(
        Platform::Douyin,
        format!("https://www.douyin.com/video/{VIDEO_ID}"),
        Some(VIDEO_ID),
    )
}

fn outcomes(attempts: &[Attempt]) -> Vec<(&str, &AttemptOutcome)> {
    attempts
        .iter()
        .map(|attempt| (attempt.strategy.as_str(), &attempt.outcome))
        .collect()
}

#[tokio::test]
async fn douyin_falls_back_to_the_share_page() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("/share/video/{VIDEO_ID}/")))
        .and(header("Referer", "https://www.douyin.com/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<html><head><title>深夜食堂 - 抖音</title></head>
            <script>{"nickname":"厨师","playApi":"\/\/aweme.test\/play\/?video_id=v1"}</script></html>"#,
        ))
        .expect(1)
        .mount(&server)
        .await;

    let ctx = RunContext::new(common::test_config(&server.uri())).unwrap();
    let meta = DouyinStrategy::new()
        .resolve_metadata(&ctx, &douyin_source(), None)
        .await
        .unwrap();

    assert_eq!(
        outcomes(&meta.attempts),
        vec![
            (
                "reader-proxy",
                &AttemptOutcome::Failed("reader rendering unavailable".to_string())
            ),
            ("share-page", &AttemptOutcome::Succeeded),
        ]
    );
    assert!(meta.attempts.iter().all(|attempt| attempt.stage == "metadata"));
    assert_eq!(meta.title.as_deref(), Some("深夜食堂"));
    assert_eq!(meta.author.as_deref(), Some("厨师"));
    assert_eq!(meta.media_url.as_deref(), Some("https://aweme.test/play/?video_id=v1"));
    assert_eq!(meta.platform_ids.get("video_id").map(String::as_str), Some(VIDEO_ID));
    assert!(!meta.degradation_mode);
}

#[tokio::test]
async fn douyin_reader_page_wins_without_touching_the_share_page() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path_regex("^/share/video/"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let ctx = RunContext::new(common::test_config(&server.uri())).unwrap();
    let reader = Page {
        url: format!("{}/reader/x", server.uri()),
        body: common::article_body("读者视图标题"),
    };
    let meta = DouyinStrategy::new()
        .resolve_metadata(&ctx, &douyin_source(), Some(reader))
        .await
        .unwrap();

    assert_eq!(
        outcomes(&meta.attempts),
        vec![
            ("reader-proxy", &AttemptOutcome::Succeeded),
            ("share-page", &AttemptOutcome::NotTried),
        ]
    );
    assert_eq!(meta.title.as_deref(), Some("读者视图标题"));
}

#[tokio::test]
async fn xiaohongshu_login_wall_falls_back_to_the_mobile_page() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/explore/64f0c0ffee"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<html><head><title>秋天的第一杯咖啡 - 小红书</title></head><script>
            {"desc":"手冲入门","nickname":"咖啡控","imageUrl":"http:\/\/sns-img.test\/1.jpg"}</script></html>"#,
        ))
        .expect(1)
        .mount(&server)
        .await;

    let ctx = RunContext::new(common::test_config(&server.uri())).unwrap();
    let note = source(
        Platform::Xiaohongshu,
        format!("{}/explore/64f0c0ffee", server.uri()),
        Some("64f0c0ffee"),
    );
    let login_wall = Page {
        url: format!("{}/reader/x", server.uri()),
        body: "<title>小红书 - 你的生活指南</title>".to_string(),
    };
    let meta = XiaohongshuStrategy::new()
        .resolve_metadata(&ctx, &note, Some(login_wall))
        .await
        .unwrap();

    assert_eq!(
        outcomes(&meta.attempts),
        vec![
            (
                "reader-proxy",
                &AttemptOutcome::Failed("reader rendering looks like a login wall".to_string())
            ),
            ("mobile-page", &AttemptOutcome::Succeeded),
        ]
    );
    assert_eq!(meta.title.as_deref(), Some("秋天的第一杯咖啡"));
    assert_eq!(meta.description.as_deref(), Some("手冲入门"));
    assert_eq!(meta.images, vec!["https://sns-img.test/1.jpg".to_string()]);
    assert_eq!(meta.content_type.as_deref(), Some("image"));
    assert_eq!(meta.platform_ids.get("note_id").map(String::as_str), Some("64f0c0ffee"));
}

#[tokio::test]
async fn xiaoyuzhou_reads_the_episode_page_when_the_reader_failed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/episode/abc123"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<html><head>
            <meta property="og:title" content="第7期：Rock &#39;n&#39; roll">
            <meta property="og:audio" content="https://media.xyzcdn.test/ep7.m4a">
            </head></html>"#,
        ))
        .expect(1)
        .mount(&server)
        .await;

    let ctx = RunContext::new(common::test_config(&server.uri())).unwrap();
    let episode = source(
        Platform::Xiaoyuzhou,
        format!("{}/episode/abc123", server.uri()),
        Some("abc123"),
    );
    let meta = XiaoyuzhouStrategy::new()
        .resolve_metadata(&ctx, &episode, None)
        .await
        .unwrap();

    assert_eq!(meta.attempts[0].strategy, "reader-proxy");
    assert!(matches!(meta.attempts[0].outcome, AttemptOutcome::Failed(_)));
    assert_eq!(meta.attempts[1].strategy, "episode-page");
    assert_eq!(meta.attempts[1].outcome, AttemptOutcome::Succeeded);
    assert_eq!(meta.title.as_deref(), Some("第7期：Rock 'n' roll"));
    assert_eq!(meta.media_url.as_deref(), Some("https://media.xyzcdn.test/ep7.m4a"));
    assert_eq!(meta.content_type.as_deref(), Some("audio"));
}

#[tokio::test]
async fn every_scraper_failing_puts_metadata_in_degradation_mode() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/episode/gone"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let ctx = RunContext::new(common::test_config(&server.uri())).unwrap();
    let episode = source(
        Platform::Xiaoyuzhou,
        format!("{}/episode/gone", server.uri()),
        Some("gone"),
    );
    let meta = XiaoyuzhouStrategy::new()
        .resolve_metadata(&ctx, &episode, None)
        .await
        .unwrap();

    assert!(meta.degradation_mode);
    assert!(meta.title.is_none());
    assert_eq!(meta.attempts.len(), 2);
    assert!(meta
        .attempts
        .iter()
        .all(|attempt| matches!(attempt.outcome, AttemptOutcome::Failed(_))));
    assert_eq!(meta.errors.len(), 1);
    assert!(meta.errors[0].starts_with("all metadata strategies failed: reader-proxy:"));
    assert!(meta.errors[0].contains("episode-page:"));
}

#[tokio::test]
async fn pipeline_fetches_the_reader_once_and_hands_it_to_the_scraper() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path_regex("^/reader/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(common::article_body("一条抖音视频")))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex("^/share/video/"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;
    let dir = tempfile::tempdir().unwrap();

    AcquisitionPipeline::new(common::test_config(&server.uri()))
        .run(&format!("https://www.douyin.com/video/{VIDEO_ID}"), dir.path(), false)
        .await
        .unwrap();

    let manifest = common::read_manifest(dir.path());
    let attempts: Vec<Attempt> = serde_json::from_value(manifest["attempts"].clone()).unwrap();
    let find = |stage: &str, strategy: &str| {
        attempts
            .iter()
            .find(|attempt| attempt.stage == stage && attempt.strategy == strategy)
            .map(|attempt| attempt.outcome.clone())
    };
    assert_eq!(find("read", "reader-proxy"), Some(AttemptOutcome::Succeeded));
    assert_eq!(find("metadata", "reader-proxy"), Some(AttemptOutcome::Succeeded));
    assert_eq!(find("metadata", "share-page"), Some(AttemptOutcome::NotTried));

    let meta: serde_json::Value = serde_json::from_str(
        &fs_err::read_to_string(dir.path().join("douyin_meta.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(meta["title"], "一条抖音视频");
}

#[tokio::test]
async fn pipeline_notes_degradation_when_no_scraper_succeeds() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    let dir = tempfile::tempdir().unwrap();

    AcquisitionPipeline::new(common::test_config(&server.uri()))
        .run(&format!("https://www.douyin.com/video/{VIDEO_ID}"), dir.path(), false)
        .await
        .unwrap();

    let manifest = common::read_manifest(dir.path());
    let notes: Vec<&str> = manifest["notes"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|note| note.as_str())
        .collect();
    assert!(notes.contains(&"Douyin metadata unavailable; continuing in degradation mode."));
    assert!(notes
        .iter()
        .any(|note| note.starts_with("Douyin metadata had partial errors: all metadata strategies failed")));
}

#[cfg(unix)]
#[tokio::test]
async fn failed_resolver_falls_through_to_direct_download_variants() {
    use omni_source::audio::acquire_audio;
    use omni_source::downloader::Downloader;

    let tools = tempfile::tempdir().unwrap();
    let resolver = common::write_script(
        tools.path(),
        "resolve-link",
        "echo '{\"status\":\"error\",\"error\":\"quota exceeded\"}'\nexit 0\n",
    );
    // Only the share-page URL is downloadable.
    let downloader = common::write_script(
        tools.path(),
        "yt-dlp",
        r#"out=""
prev=""
for a in "$@"; do
  if [ "$prev" = "-o" ]; then out="$a"; fi
  prev="$a"
  last="$a"
done
case "$last" in
  */share/video/*) ;;
  *) echo "ERROR: Unsupported URL: $last" >&2; exit 1 ;;
esac
base=$(printf '%s' "$out" | sed 's/\.%(ext)s$//')
printf 'ID3' > "$base.mp3"
exit 0
"#,
    );

    let share_base = "http://share.invalid";
    let mut config = common::test_config(share_base);
    config.resolver.command = Some(resolver);
    config.tools.yt_dlp = Some(downloader);
    let downloader = Downloader::locate(&config.tools).unwrap();
    let ctx = RunContext::new(config).unwrap();
    let outdir = tempfile::tempdir().unwrap();
    let source = douyin_source();

    let report = acquire_audio(
        &ctx,
        &DouyinStrategy::new(),
        &source,
        None,
        &downloader,
        outdir.path(),
    )
    .await;

    let share_url = format!("{share_base}/share/video/{VIDEO_ID}/");
    assert_eq!(report.url.as_deref(), Some(share_url.as_str()));
    assert!(report.path.as_deref().is_some_and(|path| path.exists()));
    assert!(report.link.is_none());
    assert!(report.failure.is_none());

    let steps: Vec<(&str, &str)> = report
        .attempts
        .iter()
        .map(|attempt| (attempt.stage.as_str(), attempt.strategy.as_str()))
        .collect();
    let canonical = format!("direct:{}", source.target());
    let share = format!("direct:{share_url}");
    assert_eq!(
        steps,
        vec![
            ("media-link", "resolve"),
            ("audio-download", canonical.as_str()),
            ("audio-download", share.as_str()),
        ]
    );
    assert!(matches!(
        &report.attempts[0].outcome,
        AttemptOutcome::Failed(reason) if reason.contains("resolver failed: quota exceeded")
    ));
    assert!(matches!(report.attempts[1].outcome, AttemptOutcome::Failed(_)));
    assert_eq!(report.attempts[2].outcome, AttemptOutcome::Succeeded);
    assert!(report
        .notes
        .iter()
        .any(|note| note.starts_with("Media link resolution failed:") && note.ends_with("Trying direct download.")));
}
