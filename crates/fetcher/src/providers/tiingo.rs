use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Utc};
use serde::Deserialize;
use std::sync::Arc;

use crate::models::price::{InstrumentPrice, InstrumentSplit, PricePoint};
use crate::models::request::{
    HistoricalDailyInstrumentPricesRequest, InstrumentSplitsRequest, IntradayInstrumentPricesRequest,
    IntradayInterval, LatestInstrumentPriceRequest,
};
use crate::models::response::Response;
use crate::models::settings::{RateLimitSettings, SourceSettings};
use super::http::SourceClient;
use super::registry::SourceRegistry;
use super::traits::{DataSource, Processor};

pub const NAME: &str = "Tiingo";
const BASE_URL: &str = "https://api.tiingo.com";
const DATE_FORMAT: &str = "%Y-%m-%d";

/// Tiingo API source for instrument prices and splits.
///
/// - **Free tier**: 50 requests/hour, 1000 requests/day.
/// - **Requires**: API token (settings key "tiingo").
/// - **Endpoints**: `/iex/{ticker}` (latest), `/iex/{ticker}/prices`
///   (intraday), `/tiingo/daily/{ticker}/prices` (end of day, split factors).
///
/// Daily closes are split-adjusted here, so every historical price is
/// comparable with the latest one.
pub struct TiingoSource {
    http: SourceClient,
    token: String,
}

impl TiingoSource {
    pub fn new(token: impl Into<String>, settings: &SourceSettings) -> Self {
        Self {
            http: SourceClient::from_settings(NAME, settings, BASE_URL, Self::default_rate_limit()),
            token: token.into(),
        }
    }

    pub fn default_rate_limit() -> RateLimitSettings {
        RateLimitSettings::new(50, 60 * 60)
    }

    pub fn client(&self) -> &SourceClient {
        &self.http
    }

    async fn fetch_daily(
        &self,
        symbol: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Response<Vec<DailyPrice>> {
        let start = from.format(DATE_FORMAT).to_string();
        let end = to.format(DATE_FORMAT).to_string();
        self.http
            .get_json(
                &format!("tiingo/daily/{}/prices", symbol.to_lowercase()),
                &[
                    ("startDate", start.as_str()),
                    ("endDate", end.as_str()),
                    ("token", self.token.as_str()),
                ],
            )
            .await
    }
}

// ── Tiingo API response types ───────────────────────────────────────

#[derive(Deserialize)]
struct IexQuote {
    timestamp: DateTime<FixedOffset>,
    #[serde(rename = "tngoLast")]
    tngo_last: Option<f64>,
    last: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct DailyPrice {
    date: DateTime<FixedOffset>,
    close: f64,
    #[serde(rename = "splitFactor", default = "unit_factor")]
    split_factor: f64,
}

fn unit_factor() -> f64 {
    1.0
}

#[derive(Deserialize)]
struct IntradayPrice {
    date: DateTime<FixedOffset>,
    close: f64,
}

/// Split-adjust daily closes and return them oldest first.
///
/// Walks from the newest point to the oldest, dividing each close by the
/// product of every split factor seen so far. A point's own split factor
/// applies only to the points before it: on the split day the close is
/// already quoted post-split.
pub(crate) fn adjust_for_splits(mut prices: Vec<DailyPrice>) -> Vec<PricePoint> {
    prices.sort_by_key(|p| std::cmp::Reverse(p.date));

    let mut cumulative = 1.0;
    let mut points: Vec<PricePoint> = prices
        .into_iter()
        .map(|p| {
            let point = PricePoint {
                time: p.date.with_timezone(&Utc),
                price: p.close / cumulative,
            };
            if p.split_factor.is_finite() && p.split_factor > 0.0 {
                cumulative *= p.split_factor;
            }
            point
        })
        .collect();

    points.reverse();
    points
}

fn resample_freq(interval: IntradayInterval) -> &'static str {
    match interval {
        IntradayInterval::FiveMinutes => "5min",
        IntradayInterval::OneHour => "1hour",
    }
}

#[async_trait]
impl Processor<LatestInstrumentPriceRequest, InstrumentPrice> for TiingoSource {
    fn source_name(&self) -> &str {
        self.http.name()
    }

    async fn process(&self, request: &LatestInstrumentPriceRequest) -> Response<InstrumentPrice> {
        let symbol = &request.symbol;
        let resp: Response<Vec<IexQuote>> = self
            .http
            .get_json(
                &format!("iex/{}", symbol.to_lowercase()),
                &[("token", self.token.as_str())],
            )
            .await;

        resp.and_then(|quotes| {
            let Some(quote) = quotes.into_iter().next() else {
                return Response::other_error(format!("{NAME}: no quote data for {symbol}"));
            };
            match quote.tngo_last.or(quote.last) {
                Some(price) => Response::ok(InstrumentPrice {
                    symbol: symbol.clone(),
                    time: quote.timestamp.with_timezone(&Utc),
                    price,
                }),
                None => Response::other_error(format!("{NAME}: quote for {symbol} has no price")),
            }
        })
    }
}

#[async_trait]
impl Processor<HistoricalDailyInstrumentPricesRequest, Vec<PricePoint>> for TiingoSource {
    fn source_name(&self) -> &str {
        self.http.name()
    }

    async fn process(
        &self,
        request: &HistoricalDailyInstrumentPricesRequest,
    ) -> Response<Vec<PricePoint>> {
        self.fetch_daily(&request.symbol, request.from, request.to)
            .await
            .map(adjust_for_splits)
    }
}

#[async_trait]
impl Processor<IntradayInstrumentPricesRequest, Vec<PricePoint>> for TiingoSource {
    fn source_name(&self) -> &str {
        self.http.name()
    }

    async fn process(&self, request: &IntradayInstrumentPricesRequest) -> Response<Vec<PricePoint>> {
        let start = request.from.format(DATE_FORMAT).to_string();
        let end = request.to.format(DATE_FORMAT).to_string();
        let resp: Response<Vec<IntradayPrice>> = self
            .http
            .get_json(
                &format!("iex/{}/prices", request.symbol.to_lowercase()),
                &[
                    ("startDate", start.as_str()),
                    ("endDate", end.as_str()),
                    ("resampleFreq", resample_freq(request.interval)),
                    ("columns", "close"),
                    ("token", self.token.as_str()),
                ],
            )
            .await;

        resp.map(|prices| {
            let mut points: Vec<PricePoint> = prices
                .into_iter()
                .map(|p| PricePoint {
                    time: p.date.with_timezone(&Utc),
                    price: p.close,
                })
                .filter(|p| p.time >= request.from && p.time <= request.to)
                .collect();
            points.sort_by_key(|p| p.time);
            points
        })
    }
}

#[async_trait]
impl Processor<InstrumentSplitsRequest, Vec<InstrumentSplit>> for TiingoSource {
    fn source_name(&self) -> &str {
        self.http.name()
    }

    async fn process(&self, request: &InstrumentSplitsRequest) -> Response<Vec<InstrumentSplit>> {
        self.fetch_daily(&request.symbol, request.from, request.to)
            .await
            .map(|mut prices| {
                prices.sort_by_key(|p| p.date);
                prices
                    .into_iter()
                    .filter(|p| {
                        p.split_factor.is_finite()
                            && p.split_factor > 0.0
                            && (p.split_factor - 1.0).abs() > f64::EPSILON
                    })
                    .map(|p| InstrumentSplit::from_factor(p.date.with_timezone(&Utc), p.split_factor))
                    .collect()
            })
    }
}

impl DataSource for TiingoSource {
    fn name(&self) -> &str {
        self.http.name()
    }

    fn register_capabilities(self: Arc<Self>, registry: &mut SourceRegistry) {
        registry.register::<LatestInstrumentPriceRequest, InstrumentPrice, _>(NAME, self.clone());
        registry.register::<HistoricalDailyInstrumentPricesRequest, Vec<PricePoint>, _>(
            NAME,
            self.clone(),
        );
        registry.register::<IntradayInstrumentPricesRequest, Vec<PricePoint>, _>(NAME, self.clone());
        registry.register::<InstrumentSplitsRequest, Vec<InstrumentSplit>, _>(NAME, self);
    }
}
