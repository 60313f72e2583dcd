use log::{debug, warn};
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::time::Duration;

use crate::errors::redact_query;
use crate::models::response::Response;
use crate::models::settings::{RateLimitSettings, SourceSettings};
use super::rate_limiter::RateLimiter;

const MAX_BODY_IN_MESSAGE: usize = 200;

/// The part every data source shares: one long-lived HTTP client, the base
/// URL, and the source's own rate limiter.
///
/// Requests go through [`get_json`](Self::get_json), which consults the
/// limiter before touching the network and maps every failure onto a
/// [`Response`] status.
#[derive(Debug)]
pub struct SourceClient {
    name: String,
    client: Client,
    base_url: String,
    timeout: Duration,
    rate_limiter: RateLimiter,
}

impl SourceClient {
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
        rate_limit: RateLimitSettings,
    ) -> Self {
        let name = name.into();
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                warn!("{name}: HTTP client setup failed ({e}), using defaults");
                Client::new()
            });
        Self {
            name,
            client,
            base_url: base_url.into(),
            timeout,
            rate_limiter: RateLimiter::from_settings(rate_limit),
        }
    }

    /// Build from source settings, falling back to the provider defaults.
    pub fn from_settings(
        name: impl Into<String>,
        settings: &SourceSettings,
        default_base_url: &str,
        default_rate_limit: RateLimitSettings,
    ) -> Self {
        Self::new(
            name,
            settings.base_url_or(default_base_url),
            settings.timeout(),
            settings.rate_limit_or(default_rate_limit),
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Applied to every request, including on the fallback client.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// GET `path` (relative to the base URL) and decode the JSON body as `T`.
    ///
    /// - limiter denial or HTTP 429 → `RateLimitExceeded` (no call on denial)
    /// - timeout, connect or send failure, unreadable body → `ConnectionError`
    /// - any other non-2xx status or an undecodable body → `OtherError`
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Response<T> {
        if !self.rate_limiter.admit() {
            warn!("{}: local rate limit reached, request not sent", self.name);
            return Response::rate_limit_exceeded(format!(
                "{}: rate limit of {} requests per {:?} reached",
                self.name,
                self.rate_limiter.max_requests(),
                self.rate_limiter.window()
            ));
        }

        let url = self.url(path);
        debug!("{}: GET {}", self.name, url);

        let request = self.client.get(&url).query(query).timeout(self.timeout);
        let resp = match request.send().await {
            Ok(resp) => resp,
            Err(e) => return self.transport_failure(e),
        };

        let status = resp.status();
        let body = match resp.text().await {
            Ok(body) => body,
            Err(e) => return self.transport_failure(e),
        };

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Response::rate_limit_exceeded(format!(
                "{}: provider rejected the request with HTTP 429",
                self.name
            ));
        }
        if !status.is_success() {
            return Response::other_error(format!(
                "{}: HTTP {}: {}",
                self.name,
                status.as_u16(),
                truncate(&body)
            ));
        }

        match serde_json::from_str(&body) {
            Ok(parsed) => Response::ok(parsed),
            Err(e) => Response::other_error(format!(
                "{}: unexpected response format: {e}",
                self.name
            )),
        }
    }

    fn transport_failure<T>(&self, e: reqwest::Error) -> Response<T> {
        let message = format!("{}: {}", self.name, redact_query(&e.to_string()));
        if e.is_timeout() || e.is_connect() || e.is_request() || e.is_body() {
            Response::connection_error(message)
        } else {
            Response::other_error(message)
        }
    }
}

fn truncate(body: &str) -> &str {
    match body.char_indices().nth(MAX_BODY_IN_MESSAGE) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}
