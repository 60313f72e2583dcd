use async_trait::async_trait;
use chrono::DateTime;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;

use crate::models::price::ExchangeRates;
use crate::models::request::LatestExchangeRatesRequest;
use crate::models::response::Response;
use crate::models::settings::{RateLimitSettings, SourceSettings};
use super::http::SourceClient;
use super::registry::SourceRegistry;
use super::traits::{DataSource, Processor};

pub const NAME: &str = "Open Exchange Rates";
const BASE_URL: &str = "https://openexchangerates.org/api";

/// Open Exchange Rates source for the latest fiat exchange rates.
///
/// - **Free tier**: 1000 requests/month, hourly updates.
/// - **Requires**: app id (settings key "openexchangerates").
/// - **Endpoint**: `/latest.json`
///
/// Used as a fallback behind Frankfurter. Errors arrive as
/// `{"error": true, "status": ..., "message": ..., "description": ...}`.
pub struct OpenExchangeRatesSource {
    http: SourceClient,
    app_id: String,
}

impl OpenExchangeRatesSource {
    pub fn new(app_id: impl Into<String>, settings: &SourceSettings) -> Self {
        Self {
            http: SourceClient::from_settings(NAME, settings, BASE_URL, Self::default_rate_limit()),
            app_id: app_id.into(),
        }
    }

    pub fn default_rate_limit() -> RateLimitSettings {
        RateLimitSettings::new(1000, 31 * 24 * 60 * 60)
    }

    pub fn client(&self) -> &SourceClient {
        &self.http
    }
}

// ── Open Exchange Rates API response types ──────────────────────────

#[derive(Deserialize)]
#[serde(untagged)]
enum LatestResponse {
    Error(ErrorBody),
    Rates(RatesBody),
}

#[derive(Deserialize)]
struct ErrorBody {
    error: bool,
    status: Option<u16>,
    message: Option<String>,
    description: Option<String>,
}

#[derive(Deserialize)]
struct RatesBody {
    timestamp: i64,
    base: String,
    rates: HashMap<String, f64>,
}

#[async_trait]
impl Processor<LatestExchangeRatesRequest, ExchangeRates> for OpenExchangeRatesSource {
    fn source_name(&self) -> &str {
        self.http.name()
    }

    async fn process(&self, request: &LatestExchangeRatesRequest) -> Response<ExchangeRates> {
        let base = request.base_currency.as_str();
        let resp: Response<LatestResponse> = self
            .http
            .get_json(
                "latest.json",
                &[("app_id", self.app_id.as_str()), ("base", base)],
            )
            .await;

        resp.and_then(|body| match body {
            LatestResponse::Error(err) => {
                let detail = err
                    .description
                    .or(err.message)
                    .unwrap_or_else(|| "unknown error".to_string());
                let message = format!("{NAME}: {detail}");
                if err.status == Some(429) {
                    Response::rate_limit_exceeded(message)
                } else if err.error {
                    Response::other_error(message)
                } else {
                    Response::other_error(format!("{NAME}: response for {base} carried no rates"))
                }
            }
            LatestResponse::Rates(body) => match DateTime::from_timestamp(body.timestamp, 0) {
                Some(time) => Response::ok(ExchangeRates {
                    base_currency: body.base.to_uppercase(),
                    time,
                    rates: body
                        .rates
                        .into_iter()
                        .map(|(currency, rate)| (currency.to_uppercase(), rate))
                        .collect(),
                }),
                None => Response::other_error(format!(
                    "{NAME}: invalid timestamp {} for {base}",
                    body.timestamp
                )),
            },
        })
    }
}

impl DataSource for OpenExchangeRatesSource {
    fn name(&self) -> &str {
        self.http.name()
    }

    fn register_capabilities(self: Arc<Self>, registry: &mut SourceRegistry) {
        registry.register::<LatestExchangeRatesRequest, ExchangeRates, _>(NAME, self);
    }
}
