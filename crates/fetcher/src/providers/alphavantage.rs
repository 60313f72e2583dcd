use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;

use crate::models::price::{InstrumentPrice, PricePoint};
use crate::models::request::{HistoricalDailyInstrumentPricesRequest, LatestInstrumentPriceRequest};
use crate::models::response::Response;
use crate::models::settings::{RateLimitSettings, SourceSettings};
use super::http::SourceClient;
use super::registry::SourceRegistry;
use super::traits::{DataSource, Processor};

pub const NAME: &str = "Alpha Vantage";
const BASE_URL: &str = "https://www.alphavantage.co";

/// Days of history covered by the compact output (100 trading days).
const COMPACT_WINDOW_DAYS: i64 = 140;

/// Alpha Vantage API source for instrument prices.
///
/// - **Free tier**: 5 requests/minute, 25 requests/day (across ALL endpoints).
/// - **Requires**: API key (settings key "alphavantage").
/// - **Coverage**: 100k+ global equity symbols.
///
/// Quota exhaustion is reported in the body of an HTTP 200 response
/// (`"Note"`, or `"Information"` with rate-limit wording), so every payload is
/// screened before decoding.
/// Daily closes are not split-adjusted on the free tier.
pub struct AlphaVantageSource {
    http: SourceClient,
    api_key: String,
}

impl AlphaVantageSource {
    pub fn new(api_key: impl Into<String>, settings: &SourceSettings) -> Self {
        Self {
            http: SourceClient::from_settings(NAME, settings, BASE_URL, Self::default_rate_limit()),
            api_key: api_key.into(),
        }
    }

    pub fn default_rate_limit() -> RateLimitSettings {
        RateLimitSettings::new(5, 60)
    }

    pub fn client(&self) -> &SourceClient {
        &self.http
    }

    /// Call the query endpoint and decode `T`, after screening the payload
    /// for Alpha Vantage's in-body error messages.
    async fn query<T: DeserializeOwned>(&self, params: &[(&str, &str)]) -> Response<T> {
        let mut query: Vec<(&str, &str)> = params.to_vec();
        query.push(("apikey", self.api_key.as_str()));

        let resp: Response<serde_json::Value> = self.http.get_json("query", &query).await;
        resp.and_then(|body| {
            if let Some(note) = body.get("Note").and_then(|v| v.as_str()) {
                return Response::rate_limit_exceeded(format!("{NAME}: {note}"));
            }
            if let Some(info) = body.get("Information").and_then(|v| v.as_str()) {
                return if is_quota_message(info) {
                    Response::rate_limit_exceeded(format!("{NAME}: {info}"))
                } else {
                    Response::other_error(format!("{NAME}: {info}"))
                };
            }
            if let Some(message) = body.get("Error Message").and_then(|v| v.as_str()) {
                return Response::other_error(format!("{NAME}: {message}"));
            }
            match serde_json::from_value(body) {
                Ok(parsed) => Response::ok(parsed),
                Err(e) => Response::other_error(format!("{NAME}: unexpected response format: {e}")),
            }
        })
    }
}

/// `"Information"` is also used for invalid keys and premium-only endpoints;
/// only the quota wording counts as a rate limit.
fn is_quota_message(info: &str) -> bool {
    let info = info.to_lowercase();
    ["rate limit", "call frequency", "requests per"]
        .iter()
        .any(|marker| info.contains(marker))
}

// ── Alpha Vantage API response types ────────────────────────────────

#[derive(Deserialize)]
struct GlobalQuoteResponse {
    #[serde(rename = "Global Quote")]
    global_quote: Option<GlobalQuote>,
}

#[derive(Deserialize)]
struct GlobalQuote {
    #[serde(rename = "05. price")]
    price: Option<String>,
}

#[derive(Deserialize)]
struct TimeSeriesResponse {
    #[serde(rename = "Time Series (Daily)")]
    time_series: Option<HashMap<String, DailyData>>,
}

#[derive(Deserialize)]
struct DailyData {
    #[serde(rename = "4. close")]
    close: String,
}

#[async_trait]
impl Processor<LatestInstrumentPriceRequest, InstrumentPrice> for AlphaVantageSource {
    fn source_name(&self) -> &str {
        self.http.name()
    }

    async fn process(&self, request: &LatestInstrumentPriceRequest) -> Response<InstrumentPrice> {
        let symbol = &request.symbol;
        let resp: Response<GlobalQuoteResponse> = self
            .query(&[("function", "GLOBAL_QUOTE"), ("symbol", symbol.as_str())])
            .await;

        resp.and_then(|body| {
            let Some(price_str) = body.global_quote.and_then(|q| q.price) else {
                return Response::other_error(format!("{NAME}: no quote data for {symbol}"));
            };
            match price_str.trim().parse::<f64>() {
                Ok(price) => Response::ok(InstrumentPrice {
                    symbol: symbol.clone(),
                    time: Utc::now(),
                    price,
                }),
                Err(e) => Response::other_error(format!(
                    "{NAME}: invalid price format for {symbol}: {e}"
                )),
            }
        })
    }
}

#[async_trait]
impl Processor<HistoricalDailyInstrumentPricesRequest, Vec<PricePoint>> for AlphaVantageSource {
    fn source_name(&self) -> &str {
        self.http.name()
    }

    async fn process(
        &self,
        request: &HistoricalDailyInstrumentPricesRequest,
    ) -> Response<Vec<PricePoint>> {
        let symbol = &request.symbol;
        let output_size = if (Utc::now() - request.from).num_days() > COMPACT_WINDOW_DAYS {
            "full"
        } else {
            "compact"
        };
        let resp: Response<TimeSeriesResponse> = self
            .query(&[
                ("function", "TIME_SERIES_DAILY"),
                ("symbol", symbol.as_str()),
                ("outputsize", output_size),
            ])
            .await;

        let (from, to) = (request.from.date_naive(), request.to.date_naive());
        resp.and_then(|body| {
            let Some(time_series) = body.time_series else {
                return Response::other_error(format!("{NAME}: no time series data for {symbol}"));
            };
            let mut points: Vec<PricePoint> = time_series
                .iter()
                .filter_map(|(date_str, data)| {
                    let date = NaiveDate::parse_from_str(date_str, "%Y-%m-%d").ok()?;
                    if date < from || date > to {
                        return None;
                    }
                    let price: f64 = data.close.trim().parse().ok()?;
                    Some(PricePoint {
                        time: date.and_hms_opt(0, 0, 0)?.and_utc(),
                        price,
                    })
                })
                .collect();
            points.sort_by_key(|p| p.time);
            Response::ok(points)
        })
    }
}

impl DataSource for AlphaVantageSource {
    fn name(&self) -> &str {
        self.http.name()
    }

    fn register_capabilities(self: Arc<Self>, registry: &mut SourceRegistry) {
        registry.register::<LatestInstrumentPriceRequest, InstrumentPrice, _>(NAME, self.clone());
        registry.register::<HistoricalDailyInstrumentPricesRequest, Vec<PricePoint>, _>(NAME, self);
    }
}
