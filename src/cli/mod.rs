use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "fetch-source",
    about = "Omni Source - fetch a web page or media share link and produce a transcript plus manifest",
    version,
    long_about = "Classifies the input (URL or search topic), normalizes platform links (Bilibili, Douyin, Xiaohongshu, Xiaoyuzhou), fetches a readable rendering, resolves platform metadata, extracts subtitles and optionally falls back to local speech-to-text. Every step is recorded in manifest.json."
)]
pub struct Cli {
    /// URL or topic to acquire
    #[arg(
        long,
        value_name = "URL_OR_TOPIC",
        value_parser = non_blank,
        required_unless_present_any = ["list_platforms", "show_config", "init_config"]
    )]
    pub input: Option<String>,

    /// Output directory (must be distinct per concurrent run)
    #[arg(long, value_name = "DIR", default_value = "./omni_source_output")]
    pub outdir: PathBuf,

    /// HTTP timeout in seconds
    #[arg(long, value_name = "SECONDS")]
    pub timeout: Option<u64>,

    /// Retries per network fetch after the first attempt
    #[arg(long, value_name = "COUNT")]
    pub retry: Option<u32>,

    /// Run local ASR when no subtitles are available
    #[arg(long)]
    pub asr_fallback: bool,

    /// ASR model name passed to the runner
    #[arg(long, value_name = "NAME")]
    pub asr_model: Option<String>,

    /// ASR language hint, e.g. zh/en; an empty string enables auto-detection
    #[arg(long, value_name = "CODE")]
    pub asr_language: Option<String>,

    /// ASR beam size
    #[arg(long, value_name = "INT")]
    pub asr_beam_size: Option<u32>,

    /// Configuration file (YAML)
    #[arg(long, value_name = "FILE", env = "OMNI_SOURCE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Print the effective configuration and exit
    #[arg(long)]
    pub show_config: bool,

    /// Write the default configuration file and exit
    #[arg(long)]
    pub init_config: bool,

    /// List supported platforms and exit
    #[arg(long)]
    pub list_platforms: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Disable progress indicators and the manifest echo
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

fn non_blank(value: &str) -> Result<String, String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err("input must not be blank".to_string());
    }
    Ok(trimmed.to_string())
}
