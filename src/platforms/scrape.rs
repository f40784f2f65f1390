//! Field extraction from pages without a stable API: HTML meta tags and titles (parsed with
//! `scraper`), embedded JSON fragments and the reader proxy's `Title:` header.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};

static READER_TITLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^Title:\s*(.+?)\s*$").expect("valid reader title regex"));

static META: Lazy<Selector> = Lazy::new(|| Selector::parse("meta").expect("valid meta selector"));

static TITLE: Lazy<Selector> = Lazy::new(|| Selector::parse("title").expect("valid title selector"));

/// First `"key": "value"` string in embedded JSON, unescaped
pub fn json_string_field(text: &str, key: &str) -> Option<String> {
    json_string_fields(text, key, 1).into_iter().next()
}

/// Up to `limit` distinct non-empty `"key": "value"` strings, in document order
pub fn json_string_fields(text: &str, key: &str, limit: usize) -> Vec<String> {
    let pattern = format!(r#""{}"\s*:\s*"((?:[^"\\]|\\.)*)""#, regex::escape(key));
    let Ok(re) = Regex::new(&pattern) else {
        return Vec::new();
    };

    let mut values: Vec<String> = Vec::new();
    for caps in re.captures_iter(text) {
        if values.len() >= limit {
            break;
        }
        let value = unescape_json(&caps[1]);
        let value = value.trim();
        if !value.is_empty() && !values.iter().any(|known| known == value) {
            values.push(value.to_string());
        }
    }
    values
}

/// `content` of the first `<meta property=...>` or `<meta name=...>` with a non-blank value
pub fn meta_content(html: &str, property: &str) -> Option<String> {
    let document = Html::parse_document(html);
    document
        .select(&META)
        .filter(|element| {
            let meta = element.value();
            meta.attr("property") == Some(property) || meta.attr("name") == Some(property)
        })
        .filter_map(|element| element.value().attr("content"))
        .map(str::trim)
        .find(|value| !value.is_empty())
        .map(str::to_string)
}

/// Text of the `<title>` element, with `suffix` removed
pub fn html_title(html: &str, suffix: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let raw: String = document.select(&TITLE).next()?.text().collect();
    let title = raw.trim();
    let title = title.strip_suffix(suffix).unwrap_or(title).trim();
    (!title.is_empty()).then(|| title.to_string())
}

/// `Title:` header line of a reader-proxy rendering
pub fn reader_title(text: &str) -> Option<String> {
    let title = READER_TITLE.captures(text)?.get(1)?.as_str().trim();
    (!title.is_empty()).then(|| title.to_string())
}

/// Decode a JSON string body (without quotes); falls back to the raw text on bad escapes
pub fn unescape_json(raw: &str) -> String {
    serde_json::from_str::<String>(&format!("\"{raw}\"")).unwrap_or_else(|_| raw.to_string())
}

/// Decode every HTML character reference in `text`; markup in it is dropped
pub fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    Html::parse_fragment(text).root_element().text().collect()
}

/// Protocol-relative and `http:` media links upgraded to `https:`
pub fn absolute_https(url: &str) -> String {
    if let Some(rest) = url.strip_prefix("//") {
        format!("https://{rest}")
    } else if let Some(rest) = url.strip_prefix("http://") {
        format!("https://{rest}")
    } else {
        url.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_fields_are_unescaped_and_deduplicated() {
        let text = r#"{"title":"Line \"one\"你好","imageUrl":"https:\/\/a.test\/1.jpg","x":1,
                      "imageUrl": "https:\/\/a.test\/1.jpg", "imageUrl":"https:\/\/a.test\/2.jpg","imageUrl":""}"#;

        assert_eq!(json_string_field(text, "title").as_deref(), Some("Line \"one\"你好"));
        assert_eq!(
            json_string_fields(text, "imageUrl", 5),
            vec!["https://a.test/1.jpg".to_string(), "https://a.test/2.jpg".to_string()]
        );
        assert!(json_string_field(text, "missing").is_none());
    }

    #[test]
    fn meta_content_in_both_attribute_orders() {
        let html = r#"<head>
            <meta property="og:title" content="Episode &amp; more">
            <meta content="https://media.test/a.m4a" property="og:audio"/>
            <meta name="description" content="  ">
        </head>"#;

        assert_eq!(meta_content(html, "og:title").as_deref(), Some("Episode & more"));
        assert_eq!(meta_content(html, "og:audio").as_deref(), Some("https://media.test/a.m4a"));
        assert!(meta_content(html, "description").is_none());
    }

    #[test]
    fn titles() {
        let html = "<html><title>\n  My note - 小红书\n</title></html>";
        assert_eq!(html_title(html, " - 小红书").as_deref(), Some("My note"));

        let reader = "Title: A readable page\nURL Source: https://x.test\n\nMarkdown Content:\n...";
        assert_eq!(reader_title(reader).as_deref(), Some("A readable page"));
    }

    #[test]
    fn quotes_inside_attribute_values_survive() {
        let html = r#"<meta property="og:title" content="Rock 'n' roll history">
            <meta name='description' content='Say "hi"'>"#;

        assert_eq!(meta_content(html, "og:title").as_deref(), Some("Rock 'n' roll history"));
        assert_eq!(meta_content(html, "description").as_deref(), Some("Say \"hi\""));
    }

    #[test]
    fn numeric_and_named_entities_are_decoded() {
        assert_eq!(decode_entities("&#20320;&#22909; &#x4E16;&#x754C;"), "你好 世界");
        assert_eq!(decode_entities("Tom &amp; Jerry&hellip;"), "Tom & Jerry…");
        assert_eq!(decode_entities("no entities"), "no entities");

        let html = "<title>A &mdash; B &#8211; C</title>";
        assert_eq!(html_title(html, "").as_deref(), Some("A — B – C"));

        let meta = r#"<meta property="og:title" content="&#31532;42&#26399;">"#;
        assert_eq!(meta_content(meta, "og:title").as_deref(), Some("第42期"));
    }

    #[test]
    fn upgrades_media_links() {
        assert_eq!(absolute_https("//cdn.test/a.json"), "https://cdn.test/a.json");
        assert_eq!(absolute_https("http://cdn.test/a"), "https://cdn.test/a");
        assert_eq!(absolute_https("https://cdn.test/a"), "https://cdn.test/a");
    }
}
