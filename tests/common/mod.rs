#![allow(dead_code)]

use std::path::{Path, PathBuf};

use omni_source::Config;

/// Long enough to clear the reader's stub-page threshold
pub fn article_body(title: &str) -> String {
    format!(
        "Title: {title}\n\nURL Source: https://example.com/article\n\nMarkdown Content:\n{}",
        "Rust makes systems programming approachable without giving up control. ".repeat(8)
    )
}

/// Config whose network endpoints point at `server_uri` and whose retries are quick
pub fn test_config(server_uri: &str) -> Config {
    let mut config = Config::default();
    config.http.retries = 0;
    config.http.backoff_base_ms = 5;
    config.http.backoff_max_ms = 20;
    config.http.timeout_secs = 5;
    config.http.reader_endpoint = format!("{server_uri}/reader/");
    config.http.search_endpoint = format!("{server_uri}/search/");
    config.http.fallback_search_url = format!("{server_uri}/html/?q={{query}}");
    config.platforms.bilibili_api_base = server_uri.to_string();
    config.platforms.douyin_share_base = server_uri.to_string();

    // Never pick up tools from the host machine.
    config.tools.yt_dlp = Some(PathBuf::from("/nonexistent/yt-dlp"));
    config.asr.runner = Some(PathBuf::from("/nonexistent/transcribe"));
    config.asr.runner_candidates = Vec::new();
    config.asr.runner_name = "omni-source-test-missing-runner".to_string();
    config
}

#[cfg(unix)]
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    fs_err::write(&path, format!("#!/bin/sh\n{body}")).unwrap();
    let mut permissions = fs_err::metadata(&path).unwrap().permissions();
    permissions.set_mode(0o755);
    fs_err::set_permissions(&path, permissions).unwrap();
    path
}

/// Shell prologue: `-o` template minus its `.%(ext)s` suffix in `$base`, the URL in `$last`
const OUTPUT_BASE: &str = r#"out=""
prev=""
mode=audio
for a in "$@"; do
  if [ "$prev" = "-o" ]; then out="$a"; fi
  if [ "$a" = "--skip-download" ]; then mode=subs; fi
  prev="$a"
  last="$a"
done
base=$(printf '%s' "$out" | sed 's/\.%(ext)s$//')
"#;

/// Fake yt-dlp: writes an SRT track in subtitle mode when `with_subtitles`, and an mp3 in audio mode
#[cfg(unix)]
pub fn fake_downloader(dir: &Path, with_subtitles: bool) -> PathBuf {
    let subtitles = if with_subtitles {
        r#"cat > "$base.zh.srt" <<'SRT'
1
00:00:01,000 --> 00:00:02,000
大家好

2
00:00:02,000 --> 00:00:03,000
大家好

3
00:00:03,000 --> 00:00:04,000
大家好

4
00:00:04,000 --> 00:00:05,000
<i>今天聊聊 Rust</i>
SRT
"#
    } else {
        ""
    };

    let body = format!(
        "{OUTPUT_BASE}\
if [ \"$mode\" = subs ]; then\n\
{subtitles}\
  exit 0\n\
fi\n\
echo \"$last\" >> \"$(dirname \"$base\")/downloads.log\"\n\
printf 'ID3' > \"$base.mp3\"\n\
exit 0\n"
    );
    write_script(dir, "yt-dlp", &body)
}

/// Fake ASR runner writing a Chinese transcript to the `-o` path
#[cfg(unix)]
pub fn fake_runner(dir: &Path) -> PathBuf {
    let body = r#"out=""
prev=""
for a in "$@"; do
  if [ "$prev" = "-o" ]; then out="$a"; fi
  prev="$a"
done
cat > "$out" <<'JSON'
{"text": "这是一段来自本地语音识别的测试转写文本，内容完整。", "language": "zh", "language_probability": 0.97}
JSON
exit 0
"#;
    write_script(dir, "transcribe", body)
}

pub fn read_manifest(outdir: &Path) -> serde_json::Value {
    let raw = fs_err::read_to_string(outdir.join("manifest.json")).unwrap();
    serde_json::from_str(&raw).unwrap()
}
