use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use futures::future::join_all;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::models::price::ExchangeRates;
use crate::models::request::{HistoricalDailyExchangeRatesRequest, LatestExchangeRatesRequest};
use crate::models::response::Response;
use crate::models::settings::{RateLimitSettings, SourceSettings};
use super::http::SourceClient;
use super::range_split::{merge_sub_responses, split_date_range};
use super::registry::SourceRegistry;
use super::traits::{DataSource, Processor};

pub const NAME: &str = "Frankfurter";
const BASE_URL: &str = "https://api.frankfurter.dev/v1";
const DATE_FORMAT: &str = "%Y-%m-%d";

/// Longest range fetched by a single time-series call.
pub const MAX_DAYS_PER_CALL: u32 = 365;

/// Frankfurter API source for fiat currency exchange rates.
///
/// - **Free**: No API key, open-source.
/// - **Source**: European Central Bank (ECB) reference rates, business days only.
/// - **Endpoints**: `/latest`, `/{start}..{end}`
///
/// Long time series are split into chunks of at most [`MAX_DAYS_PER_CALL`]
/// days, fetched concurrently and merged.
pub struct FrankfurterSource {
    http: SourceClient,
}

impl FrankfurterSource {
    pub fn new(settings: &SourceSettings) -> Self {
        Self {
            http: SourceClient::from_settings(NAME, settings, BASE_URL, Self::default_rate_limit()),
        }
    }

    pub fn default_rate_limit() -> RateLimitSettings {
        RateLimitSettings::new(60, 60)
    }

    pub fn client(&self) -> &SourceClient {
        &self.http
    }

    async fn fetch_range(
        &self,
        base: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Response<Vec<ExchangeRates>> {
        let path = format!("{}..{}", from.format(DATE_FORMAT), to.format(DATE_FORMAT));
        let resp: Response<TimeSeriesResponse> = self.http.get_json(&path, &[("base", base)]).await;

        resp.map(|body| {
            let mut series: Vec<ExchangeRates> = body
                .rates
                .into_iter()
                .filter_map(|(date_str, rates)| {
                    let date = NaiveDate::parse_from_str(&date_str, DATE_FORMAT).ok()?;
                    // The API snaps the start to the previous business day.
                    if date < from || date > to {
                        return None;
                    }
                    Some(ExchangeRates {
                        base_currency: body.base.clone(),
                        time: midnight_utc(date)?,
                        rates: normalize_rates(rates),
                    })
                })
                .collect();
            series.sort_by_key(|r| r.time);
            series
        })
    }
}

impl Default for FrankfurterSource {
    fn default() -> Self {
        Self::new(&SourceSettings::default())
    }
}

// ── Frankfurter API response types ──────────────────────────────────

#[derive(Deserialize)]
struct LatestResponse {
    base: String,
    date: String,
    rates: HashMap<String, f64>,
}

#[derive(Deserialize)]
struct TimeSeriesResponse {
    base: String,
    rates: HashMap<String, HashMap<String, f64>>,
}

fn midnight_utc(date: NaiveDate) -> Option<DateTime<Utc>> {
    Some(date.and_hms_opt(0, 0, 0)?.and_utc())
}

fn normalize_rates(rates: HashMap<String, f64>) -> BTreeMap<String, f64> {
    rates
        .into_iter()
        .map(|(currency, rate)| (currency.to_uppercase(), rate))
        .collect()
}

#[async_trait]
impl Processor<LatestExchangeRatesRequest, ExchangeRates> for FrankfurterSource {
    fn source_name(&self) -> &str {
        self.http.name()
    }

    async fn process(&self, request: &LatestExchangeRatesRequest) -> Response<ExchangeRates> {
        let base = request.base_currency.as_str();
        let resp: Response<LatestResponse> = self.http.get_json("latest", &[("base", base)]).await;

        resp.and_then(|body| {
            let time = NaiveDate::parse_from_str(&body.date, DATE_FORMAT)
                .ok()
                .and_then(midnight_utc);
            match time {
                Some(time) => Response::ok(ExchangeRates {
                    base_currency: body.base.to_uppercase(),
                    time,
                    rates: normalize_rates(body.rates),
                }),
                None => Response::other_error(format!(
                    "{NAME}: invalid date '{}' in response for {base}",
                    body.date
                )),
            }
        })
    }
}

#[async_trait]
impl Processor<HistoricalDailyExchangeRatesRequest, Vec<ExchangeRates>> for FrankfurterSource {
    fn source_name(&self) -> &str {
        self.http.name()
    }

    async fn process(
        &self,
        request: &HistoricalDailyExchangeRatesRequest,
    ) -> Response<Vec<ExchangeRates>> {
        let base = request.base_currency.as_str();
        let chunks = split_date_range(
            request.from.date_naive(),
            request.to.date_naive(),
            MAX_DAYS_PER_CALL,
        );

        let calls = chunks
            .into_iter()
            .map(|(from, to)| self.fetch_range(base, from, to));
        let responses = join_all(calls).await;

        merge_sub_responses(NAME, responses)
    }
}

impl DataSource for FrankfurterSource {
    fn name(&self) -> &str {
        self.http.name()
    }

    fn register_capabilities(self: Arc<Self>, registry: &mut SourceRegistry) {
        registry.register::<LatestExchangeRatesRequest, ExchangeRates, _>(NAME, self.clone());
        registry.register::<HistoricalDailyExchangeRatesRequest, Vec<ExchangeRates>, _>(NAME, self);
    }
}
