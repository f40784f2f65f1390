use url::Url;

/// Last `max_chars` characters of `text`, on a char boundary
pub fn tail(text: &str, max_chars: usize) -> String {
    let count = text.chars().count();
    if count <= max_chars {
        return text.to_string();
    }
    text.chars().skip(count - max_chars).collect()
}

/// First `max_chars` characters of `text`, with an ellipsis when cut
pub fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(max_chars.saturating_sub(3)).collect();
    cut.push_str("...");
    cut
}

/// Lower-cased host of an absolute URL
pub fn host_of(url: &str) -> Option<String> {
    Url::parse(url)
        .ok()?
        .host_str()
        .map(|host| host.trim_end_matches('.').to_ascii_lowercase())
}

/// Whether `host` is `domain` itself or one of its subdomains
pub fn host_matches(host: &str, domain: &str) -> bool {
    host == domain
        || (host.len() > domain.len()
            && host.ends_with(domain)
            && host.as_bytes()[host.len() - domain.len() - 1] == b'.')
}

/// Check if the current environment has required tools
pub fn check_dependencies() -> Vec<String> {
    let mut missing = Vec::new();

    if which::which("yt-dlp").is_err() {
        missing.push("yt-dlp - required for subtitle extraction and audio download".to_string());
    }

    if which::which("ffmpeg").is_err() {
        missing.push("ffmpeg - required by yt-dlp to extract audio".to_string());
    }

    missing
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tail_respects_char_boundaries() {
        assert_eq!(tail("abcdef", 3), "def");
        assert_eq!(tail("ab", 10), "ab");
        assert_eq!(tail("你好世界", 2), "世界");
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a long description", 8), "a lon...");
    }

    #[test]
    fn test_host_matches_only_on_label_boundaries() {
        assert!(host_matches("bilibili.com", "bilibili.com"));
        assert!(host_matches("m.bilibili.com", "bilibili.com"));
        assert!(!host_matches("notbilibili.com", "bilibili.com"));
        assert!(!host_matches("bilibili.com.evil.io", "bilibili.com"));
    }
}
