use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::manifest::Manifest;

/// Write a text artifact into `outdir`, returning its path
pub fn write_text(outdir: &Path, name: &str, content: &str) -> Result<PathBuf> {
    let path = outdir.join(name);
    fs_err::write(&path, content)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    tracing::debug!("Wrote {} ({} bytes)", path.display(), content.len());
    Ok(path)
}

/// Write a pretty-printed JSON artifact into `outdir`, returning its path
pub fn write_json<T: Serialize>(outdir: &Path, name: &str, value: &T) -> Result<PathBuf> {
    let content = serde_json::to_string_pretty(value)
        .with_context(|| format!("Failed to serialize {name}"))?;
    write_text(outdir, name, &content)
}

/// Print the manifest to stdout followed by where it was written
pub fn print_manifest(manifest: &Manifest, path: &Path) -> Result<()> {
    let content = serde_json::to_string_pretty(manifest)
        .context("Failed to serialize manifest")?;
    println!("{}", content);
    println!("Manifest written to: {}", path.display());
    Ok(())
}

/// Spinner for a long-running stage; hidden when `visible` is false
pub fn spinner(message: impl Into<String>, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }

    let progress = ProgressBar::new_spinner();
    progress.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    progress.set_message(message.into());
    progress.enable_steady_tick(Duration::from_millis(120));
    progress
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artifacts_land_in_outdir() {
        let dir = tempfile::tempdir().unwrap();
        let text = write_text(dir.path(), "transcript.txt", "你好").unwrap();
        assert_eq!(fs_err::read_to_string(&text).unwrap(), "你好");

        let json = write_json(dir.path(), "meta.json", &serde_json::json!({"a": 1})).unwrap();
        let parsed: serde_json::Value =
            serde_json::from_str(&fs_err::read_to_string(json).unwrap()).unwrap();
        assert_eq!(parsed["a"], 1);
    }

    #[test]
    fn hidden_spinner_is_silent() {
        let progress = spinner("working", false);
        assert!(progress.is_hidden());
        progress.finish_and_clear();
    }
}
