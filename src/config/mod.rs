use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cli::Cli;

const LOCAL_CONFIG_FILE: &str = "omni-source.yaml";
const APP_DIR: &str = "omni-source";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP behaviour shared by the reader proxy and platform APIs
    pub http: HttpConfig,

    /// Whole-run limits
    pub run: RunConfig,

    /// External tools and their subprocess timeouts
    pub tools: ToolsConfig,

    /// Local speech-to-text fallback
    pub asr: AsrConfig,

    /// Media-link resolver service (used by platforms that hide playable URLs)
    pub resolver: ResolverConfig,

    /// Platform endpoints
    pub platforms: PlatformsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Per-request timeout in seconds
    pub timeout_secs: u64,

    /// Retries after the first attempt; 0 sends each request once
    pub retries: u32,

    /// First backoff delay; doubles per attempt
    pub backoff_base_ms: u64,

    /// Upper bound for a single backoff delay
    pub backoff_max_ms: u64,

    /// Redirect hops followed before giving up
    pub max_redirects: usize,

    /// Reader bodies shorter than this are treated as anti-bot stubs
    pub min_body_chars: usize,

    pub user_agent: String,

    /// Mobile user agent used by scrape strategies
    pub mobile_user_agent: String,

    /// Prefix the canonical URL is appended to
    pub reader_endpoint: String,

    /// Prefix the url-encoded topic is appended to
    pub search_endpoint: String,

    /// Fallback search page, `{query}` is replaced by the url-encoded topic
    pub fallback_search_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Overall budget for one run; stages still running past it are abandoned
    pub deadline_secs: u64,

    /// Maximum candidate URLs extracted from a topic search
    pub max_candidates: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// Explicit downloader path; looked up on PATH when unset
    pub yt_dlp: Option<PathBuf>,

    pub subtitle_timeout_secs: u64,

    pub download_timeout_secs: u64,

    /// Audio format requested from the downloader
    pub audio_format: String,

    /// Downloader audio quality (0 = best)
    pub audio_quality: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AsrConfig {
    pub model: String,

    /// Language hint; empty means auto-detect
    pub language: String,

    pub beam_size: u32,

    /// Explicit runner path, checked before the well-known locations
    pub runner: Option<PathBuf>,

    /// Well-known install paths checked before PATH
    pub runner_candidates: Vec<PathBuf>,

    /// Executable name looked up on PATH
    pub runner_name: String,

    pub timeout_secs: u64,

    /// Model suggested when quality comes out low
    pub stronger_model: String,

    pub quality: QualityThresholds,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityThresholds {
    /// CJK ratio below this grades `low`
    pub cjk_low: f64,

    /// CJK ratio below this grades `medium`
    pub cjk_medium: f64,

    /// Detected-language confidence below this downgrades `high` to `medium`
    pub min_language_confidence: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Resolver executable; the share link is appended as the last argument
    pub command: Option<PathBuf>,

    pub args: Vec<String>,

    /// Secret handed to the resolver process only
    pub api_key: Option<String>,

    /// Environment variable name the secret is exposed under
    pub api_key_env: String,

    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformsConfig {
    pub bilibili_api_base: String,

    /// Host serving Douyin's mobile share pages (`/share/video/<id>/`)
    pub douyin_share_base: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            retries: 3,
            backoff_base_ms: 500,
            backoff_max_ms: 8_000,
            max_redirects: 5,
            min_body_chars: 200,
            user_agent: "Mozilla/5.0 omni-source/0.1".to_string(),
            mobile_user_agent: "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Mobile/15E148 Safari/604.1".to_string(),
            reader_endpoint: "https://r.jina.ai/".to_string(),
            search_endpoint: "https://s.jina.ai/".to_string(),
            fallback_search_url: "https://duckduckgo.com/html/?q={query}".to_string(),
        }
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            deadline_secs: 2 * 60 * 60,
            max_candidates: 5,
        }
    }
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            yt_dlp: None,
            subtitle_timeout_secs: 300,
            download_timeout_secs: 30 * 60,
            audio_format: "mp3".to_string(),
            audio_quality: "0".to_string(),
        }
    }
}

impl Default for AsrConfig {
    fn default() -> Self {
        let runner_candidates = dirs::home_dir()
            .map(|home| {
                vec![home
                    .join(".codex")
                    .join("skills")
                    .join("faster-whisper")
                    .join("scripts")
                    .join("transcribe")]
            })
            .unwrap_or_default();

        Self {
            model: "large-v3-turbo".to_string(),
            language: "zh".to_string(),
            beam_size: 5,
            runner: None,
            runner_candidates,
            runner_name: "transcribe".to_string(),
            timeout_secs: 60 * 60,
            stronger_model: "large-v3".to_string(),
            quality: QualityThresholds::default(),
        }
    }
}

impl Default for QualityThresholds {
    fn default() -> Self {
        Self {
            cjk_low: 0.05,
            cjk_medium: 0.08,
            min_language_confidence: 0.8,
        }
    }
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            command: None,
            args: Vec::new(),
            api_key: None,
            api_key_env: "DASHSCOPE_API_KEY".to_string(),
            timeout_secs: 120,
        }
    }
}

impl Default for PlatformsConfig {
    fn default() -> Self {
        Self {
            bilibili_api_base: "https://api.bilibili.com".to_string(),
            douyin_share_base: "https://www.iesdouyin.com".to_string(),
        }
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Config {
    /// Load configuration from an explicit path, the working directory, or the user config dir.
    /// Missing files fall back to defaults; unreadable or invalid files are errors.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let config_path = Self::config_path(explicit)?;

        if config_path.exists() {
            let content = fs_err::read_to_string(&config_path)
                .context("Failed to read config file")?;

            let config: Config = serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse config file {}", config_path.display()))?;

            config.validate()?;
            tracing::debug!("Loaded configuration from {}", config_path.display());
            Ok(config)
        } else {
            if explicit.is_some() {
                anyhow::bail!("Config file not found: {}", config_path.display());
            }
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self, explicit: Option<&Path>) -> Result<PathBuf> {
        let config_path = Self::config_path(explicit)?;

        if let Some(parent) = config_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs_err::create_dir_all(parent)?;
            }
        }

        let content = serde_yaml::to_string(self)
            .context("Failed to serialize config")?;

        fs_err::write(&config_path, content)
            .context("Failed to write config file")?;

        Ok(config_path)
    }

    /// Get configuration file path
    pub fn config_path(explicit: Option<&Path>) -> Result<PathBuf> {
        if let Some(path) = explicit {
            return Ok(path.to_path_buf());
        }

        // First try current directory for easy testing
        let local_config = PathBuf::from(LOCAL_CONFIG_FILE);
        if local_config.exists() {
            return Ok(local_config);
        }

        let config_dir = dirs::config_dir()
            .context("Could not determine config directory")?;

        Ok(config_dir.join(APP_DIR).join("config.yaml"))
    }

    /// Apply command-line overrides on top of the file/default values
    pub fn apply_cli(&mut self, cli: &Cli) {
        if let Some(timeout) = cli.timeout {
            self.http.timeout_secs = timeout;
        }
        if let Some(retry) = cli.retry {
            self.http.retries = retry;
        }
        if let Some(model) = &cli.asr_model {
            self.asr.model = model.clone();
        }
        if let Some(language) = &cli.asr_language {
            self.asr.language = language.trim().to_string();
        }
        if let Some(beam_size) = cli.asr_beam_size {
            self.asr.beam_size = beam_size.max(1);
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.http.max_redirects == 0 {
            anyhow::bail!("http.max_redirects must be at least 1");
        }
        if self.http.timeout_secs == 0 {
            anyhow::bail!("http.timeout_secs must be positive");
        }
        if self.asr.beam_size == 0 {
            anyhow::bail!("asr.beam_size must be at least 1");
        }

        let q = &self.asr.quality;
        for (name, value) in [
            ("cjk_low", q.cjk_low),
            ("cjk_medium", q.cjk_medium),
            ("min_language_confidence", q.min_language_confidence),
        ] {
            if !(0.0..=1.0).contains(&value) {
                anyhow::bail!("asr.quality.{} must be within [0, 1], got {}", name, value);
            }
        }
        if q.cjk_low > q.cjk_medium {
            anyhow::bail!(
                "asr.quality.cjk_low ({}) must not exceed cjk_medium ({})",
                q.cjk_low,
                q.cjk_medium
            );
        }

        url::Url::parse(&self.platforms.bilibili_api_base)
            .context("platforms.bilibili_api_base must be an absolute URL")?;
        url::Url::parse(&self.platforms.douyin_share_base)
            .context("platforms.douyin_share_base must be an absolute URL")?;

        Ok(())
    }

    /// Display current configuration
    pub fn display(&self) {
        println!("Current Configuration:");
        println!("  HTTP timeout: {}s", self.http.timeout_secs);
        println!("  HTTP retries: {}", self.http.retries);
        println!("  Redirect cap: {}", self.http.max_redirects);
        println!("  Reader endpoint: {}", self.http.reader_endpoint);
        println!("  Search endpoint: {}", self.http.search_endpoint);
        println!("  Run deadline: {}s", self.run.deadline_secs);
        match &self.tools.yt_dlp {
            Some(path) => println!("  Downloader: {}", path.display()),
            None => println!("  Downloader: yt-dlp (PATH)"),
        }
        println!("  ASR model: {}", self.asr.model);
        if self.asr.language.is_empty() {
            println!("  ASR language: auto-detect");
        } else {
            println!("  ASR language: {}", self.asr.language);
        }
        println!("  ASR beam size: {}", self.asr.beam_size);
        println!(
            "  ASR quality thresholds: cjk_low={} cjk_medium={} min_confidence={}",
            self.asr.quality.cjk_low,
            self.asr.quality.cjk_medium,
            self.asr.quality.min_language_confidence
        );
        match &self.resolver.command {
            Some(cmd) => println!("  Resolver: {}", cmd.display()),
            None => println!("  Resolver: not configured"),
        }
    }
}
