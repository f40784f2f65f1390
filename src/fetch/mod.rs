//! HTTP access for every network-facing stage.
//!
//! Redirects are followed by hand so the hop count can be capped and reported as
//! [`FetchError::TooManyRedirects`] instead of a generic client error. Whole fetches are
//! retried with capped exponential backoff, and every retry leaves a note for the manifest.

use reqwest::{header, redirect, Client};
use serde::de::DeserializeOwned;
use std::time::Duration;
use url::Url;

use crate::config::HttpConfig;
use crate::context::Deadline;
use crate::Result;

pub mod search;

#[derive(thiserror::Error, Debug)]
pub enum FetchError {
    #[error("Too many redirects (limit {limit}) starting at {url}")]
    TooManyRedirects { url: String, limit: usize },

    #[error("Redirect from {url} has no usable Location header")]
    InvalidRedirect { url: String },

    #[error("Invalid URL: {url}")]
    InvalidUrl { url: String },

    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    #[error("Body from {url} is too short ({len} < {min} chars)")]
    BodyTooShort { url: String, len: usize, min: usize },

    #[error("Request to {url} failed: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Run deadline exceeded before {url} could be fetched")]
    DeadlineExceeded { url: String },

    #[error("Invalid JSON from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

impl FetchError {
    /// Network errors, non-2xx statuses and stub bodies are worth another attempt.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            FetchError::Status { .. } | FetchError::BodyTooShort { .. } | FetchError::Network { .. }
        )
    }
}

/// A single GET with its headers and the minimum acceptable body length
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub min_body_chars: usize,
}

impl FetchRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: Vec::new(),
            min_body_chars: 1,
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn min_body_chars(mut self, min: usize) -> Self {
        self.min_body_chars = min.max(1);
        self
    }
}

/// Body plus the URL it was finally served from
#[derive(Debug, Clone)]
pub struct Page {
    pub url: String,
    pub body: String,
}

/// Outcome of a retried fetch together with the retry notes it produced
#[derive(Debug)]
pub struct Fetched<T> {
    pub result: std::result::Result<T, FetchError>,
    pub attempts: u32,
    pub notes: Vec<String>,
}

impl<T> Fetched<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> std::result::Result<U, FetchError>) -> Fetched<U> {
        Fetched {
            result: self.result.and_then(f),
            attempts: self.attempts,
            notes: self.notes,
        }
    }
}

/// Shared HTTP client with redirect, retry and deadline handling
pub struct HttpFetcher {
    client: Client,
    settings: HttpConfig,
}

impl HttpFetcher {
    pub fn new(settings: &HttpConfig) -> Result<Self> {
        let client = Client::builder()
            .redirect(redirect::Policy::none())
            .user_agent(settings.user_agent.clone())
            .build()?;

        Ok(Self {
            client,
            settings: settings.clone(),
        })
    }

    pub fn settings(&self) -> &HttpConfig {
        &self.settings
    }

    /// URL of the readability proxy rendering of `target`
    pub fn reader_url(&self, target: &str) -> String {
        format!("{}{}", self.settings.reader_endpoint, target)
    }

    /// Fetch the readable rendering of `target`, enforcing the stub-page threshold
    pub async fn fetch_readable(&self, target: &str, deadline: &Deadline) -> Fetched<Page> {
        let request = FetchRequest::new(self.reader_url(target))
            .min_body_chars(self.settings.min_body_chars);
        self.fetch_text(&request, deadline).await
    }

    /// GET with retries. Non-transient failures (redirect loops, bad URLs) are returned at once.
    pub async fn fetch_text(&self, request: &FetchRequest, deadline: &Deadline) -> Fetched<Page> {
        let max_attempts = self.settings.retries.saturating_add(1);
        let mut notes = Vec::new();
        let mut attempt = 0;

        loop {
            attempt += 1;
            let err = match self.fetch_once(request, deadline).await {
                Ok(page) => {
                    return Fetched {
                        result: Ok(page),
                        attempts: attempt,
                        notes,
                    }
                }
                Err(err) => err,
            };

            if !err.is_transient() || attempt >= max_attempts {
                return Fetched {
                    result: Err(err),
                    attempts: attempt,
                    notes,
                };
            }

            let delay = backoff_delay(
                Duration::from_millis(self.settings.backoff_base_ms),
                Duration::from_millis(self.settings.backoff_max_ms),
                attempt,
            );
            if delay >= deadline.remaining() {
                notes.push(format!(
                    "Attempt {}/{} for {} failed: {}; no time left before the run deadline",
                    attempt, max_attempts, request.url, err
                ));
                return Fetched {
                    result: Err(err),
                    attempts: attempt,
                    notes,
                };
            }

            tracing::warn!(
                url = %request.url,
                attempt,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                "fetch failed, retrying: {}",
                err
            );
            notes.push(format!(
                "Attempt {}/{} for {} failed: {}; retrying in {}ms",
                attempt,
                max_attempts,
                request.url,
                err,
                delay.as_millis()
            ));
            tokio::time::sleep(delay).await;
        }
    }

    /// GET + JSON decode with the same retry policy; decode errors are not retried.
    pub async fn fetch_json<T: DeserializeOwned>(
        &self,
        request: &FetchRequest,
        deadline: &Deadline,
    ) -> Fetched<T> {
        self.fetch_text(request, deadline).await.map(|page| {
            serde_json::from_str(&page.body).map_err(|source| FetchError::Decode {
                url: page.url,
                source,
            })
        })
    }

    /// Follow redirects from `url` and return where they end, whatever the final status.
    pub async fn resolve_final_url(
        &self,
        url: &str,
        deadline: &Deadline,
    ) -> std::result::Result<String, FetchError> {
        let request = FetchRequest::new(url);
        let (final_url, _response) = self.send_following_redirects(&request, deadline).await?;
        Ok(final_url.to_string())
    }

    /// One attempt: follow redirects, require 2xx and a long enough body
    pub async fn fetch_once(
        &self,
        request: &FetchRequest,
        deadline: &Deadline,
    ) -> std::result::Result<Page, FetchError> {
        let (final_url, response) = self.send_following_redirects(request, deadline).await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: final_url.to_string(),
            });
        }

        let body = response.text().await.map_err(|source| FetchError::Network {
            url: final_url.to_string(),
            source,
        })?;

        let len = body.trim().chars().count();
        if len < request.min_body_chars {
            return Err(FetchError::BodyTooShort {
                url: final_url.to_string(),
                len,
                min: request.min_body_chars,
            });
        }

        Ok(Page {
            url: final_url.to_string(),
            body,
        })
    }

    async fn send_following_redirects(
        &self,
        request: &FetchRequest,
        deadline: &Deadline,
    ) -> std::result::Result<(Url, reqwest::Response), FetchError> {
        let mut current = Url::parse(&request.url).map_err(|_| FetchError::InvalidUrl {
            url: request.url.clone(),
        })?;
        let mut hops = 0usize;

        loop {
            let timeout = deadline.clamp(self.settings.timeout());
            if timeout.is_zero() {
                return Err(FetchError::DeadlineExceeded {
                    url: current.to_string(),
                });
            }

            let mut builder = self.client.get(current.clone()).timeout(timeout);
            for (name, value) in &request.headers {
                builder = builder.header(name.as_str(), value.as_str());
            }

            let response = builder.send().await.map_err(|source| FetchError::Network {
                url: current.to_string(),
                source,
            })?;

            if !response.status().is_redirection() {
                return Ok((current, response));
            }

            let next = response
                .headers()
                .get(header::LOCATION)
                .and_then(|value| value.to_str().ok())
                .and_then(|location| current.join(location).ok())
                .ok_or_else(|| FetchError::InvalidRedirect {
                    url: current.to_string(),
                })?;

            hops += 1;
            if hops > self.settings.max_redirects {
                return Err(FetchError::TooManyRedirects {
                    url: request.url.clone(),
                    limit: self.settings.max_redirects,
                });
            }

            tracing::debug!(from = %current, to = %next, hops, "following redirect");
            current = next;
        }
    }
}

/// `base * 2^(attempt-1)`, capped at `max`
pub fn backoff_delay(base: Duration, max: Duration, attempt: u32) -> Duration {
    let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
    base.saturating_mul(factor).min(max)
}
