use once_cell::sync::Lazy;
use regex::Regex;

use super::{FetchRequest, HttpFetcher};
use crate::context::Deadline;
use crate::fallback::{Attempt, FallbackChain, StepError};
use crate::utils::host_matches;

static UDDG_PARAM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"uddg=([^&"'\s>]+)"#).expect("valid uddg regex"));

static BARE_URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"https?://[^\s"'<>()\[\]]+"#).expect("valid url regex"));

/// Hosts that show up in search pages but are never the answer
const IGNORED_HOSTS: &[&str] = &["duckduckgo.com", "w3.org"];

/// Search digest for a topic input
#[derive(Debug, Default)]
pub struct SearchDigest {
    pub body: Option<String>,
    /// Endpoint that produced `body`
    pub via: Option<String>,
    pub candidates: Vec<String>,
    pub attempts: Vec<Attempt>,
    pub notes: Vec<String>,
}

/// Run the reader search, then the HTML search page, and pull candidate links out of the winner.
pub async fn search_topic(
    http: &HttpFetcher,
    topic: &str,
    max_candidates: usize,
    deadline: &Deadline,
) -> SearchDigest {
    let query = urlencoding::encode(topic).into_owned();
    let reader_url = format!("{}{}", http.settings().search_endpoint, query);
    let html_url = http.settings().fallback_search_url.replace("{query}", &query);
    let min_chars = http.settings().min_body_chars;

    let mut notes = Vec::new();
    let chain = FallbackChain::new("search")
        .step("reader-search", {
            let url = reader_url.clone();
            move || async move {
                let request = FetchRequest::new(url.clone()).min_body_chars(min_chars);
                let fetched = http.fetch_text(&request, deadline).await;
                let page = fetched.result.map_err(StepError::from)?;
                Ok((url, page.body, fetched.notes))
            }
        })
        .step("html-search", {
            let url = html_url.clone();
            move || async move {
                let request = FetchRequest::new(url.clone()).min_body_chars(min_chars);
                let fetched = http.fetch_text(&request, deadline).await;
                let page = fetched.result.map_err(StepError::from)?;
                Ok((url, page.body, fetched.notes))
            }
        });

    let result = chain.run().await;
    let attempts = result.attempts;
    let Some((via, body, retry_notes)) = result.value else {
        notes.push(format!("Topic search failed for '{}'", topic));
        return SearchDigest {
            attempts,
            notes,
            ..Default::default()
        };
    };
    notes.extend(retry_notes);

    let candidates = extract_candidate_urls(&body, max_candidates);
    tracing::info!(candidates = candidates.len(), via = %via, "topic search finished");

    SearchDigest {
        body: Some(body),
        via: Some(via),
        candidates,
        attempts,
        notes,
    }
}

/// Candidate result links: redirect targets (`uddg=`) first, then bare URLs, de-duplicated in order
pub fn extract_candidate_urls(body: &str, limit: usize) -> Vec<String> {
    let redirected = UDDG_PARAM.captures_iter(body).filter_map(|caps| {
        urlencoding::decode(&caps[1])
            .ok()
            .map(|decoded| decoded.into_owned())
    });
    let bare = BARE_URL
        .find_iter(body)
        .map(|m| m.as_str().trim_end_matches(['.', ',', ';']).to_string());

    let mut seen = Vec::new();
    for url in redirected.chain(bare) {
        if seen.len() >= limit {
            break;
        }
        if !is_candidate(&url) || seen.contains(&url) {
            continue;
        }
        seen.push(url);
    }
    seen
}

fn is_candidate(url: &str) -> bool {
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return false;
    }
    match crate::utils::host_of(url) {
        Some(host) => !IGNORED_HOSTS.iter().any(|ignored| host_matches(&host, ignored)),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redirect_targets_come_first_and_search_hosts_are_skipped() {
        let body = r#"
            <a href="https://duckduckgo.com/l/?uddg=https%3A%2F%2Fexample.com%2Fpost%3Fid%3D1&rut=abc">one</a>
            <a href="https://www.w3.org/1999/xhtml">ns</a>
            see also https://blog.example.org/article, and https://example.com/post?id=1
            <a href="//duckduckgo.com/l/?uddg=https%3A%2F%2Fnews.example.net%2Fstory">two</a>
        "#;

        let urls = extract_candidate_urls(body, 5);
        assert_eq!(
            urls,
            vec![
                "https://example.com/post?id=1".to_string(),
                "https://news.example.net/story".to_string(),
                "https://blog.example.org/article".to_string(),
            ]
        );
    }

    #[test]
    fn candidate_list_is_capped() {
        let body = (0..10)
            .map(|i| format!("https://site{i}.example.com/page "))
            .collect::<String>();
        assert_eq!(extract_candidate_urls(&body, 5).len(), 5);
        assert!(extract_candidate_urls(&body, 0).is_empty());
    }
}
