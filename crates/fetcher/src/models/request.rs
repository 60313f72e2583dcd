use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::FetcherError;

/// What kind of data a request asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequestKind {
    /// Instrument prices (stocks, ETFs, crypto quoted as instruments).
    InstrumentPrice,
    /// Currency exchange rates.
    ExchangeRate,
    /// Instrument split history.
    InstrumentSplit,
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestKind::InstrumentPrice => write!(f, "InstrumentPrice"),
            RequestKind::ExchangeRate => write!(f, "ExchangeRate"),
            RequestKind::InstrumentSplit => write!(f, "InstrumentSplit"),
        }
    }
}

/// Sampling interval of intraday price requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IntradayInterval {
    FiveMinutes,
    OneHour,
}

impl IntradayInterval {
    pub fn as_duration(&self) -> chrono::Duration {
        match self {
            IntradayInterval::FiveMinutes => chrono::Duration::minutes(5),
            IntradayInterval::OneHour => chrono::Duration::hours(1),
        }
    }
}

/// Common behavior of every request shape.
pub trait FetcherRequest: fmt::Display + Send + Sync + 'static {
    fn kind(&self) -> RequestKind;

    /// Check the request is structurally valid. A failure is a caller bug.
    fn validate(&self) -> Result<(), FetcherError>;
}

fn check_code(field: &str, value: &str) -> Result<(), FetcherError> {
    if value.trim().is_empty() {
        return Err(FetcherError::InvalidRequest(format!("{field} must not be empty")));
    }
    Ok(())
}

fn check_range(from: DateTime<Utc>, to: DateTime<Utc>) -> Result<(), FetcherError> {
    if from > to {
        return Err(FetcherError::InvalidRequest(format!(
            "range start {from} is after range end {to}"
        )));
    }
    Ok(())
}

fn normalize_code(code: impl Into<String>) -> String {
    code.into().trim().to_uppercase()
}

// ── Instrument prices ───────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LatestInstrumentPriceRequest {
    pub symbol: String,
}

impl LatestInstrumentPriceRequest {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: normalize_code(symbol),
        }
    }
}

impl fmt::Display for LatestInstrumentPriceRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "latest price of {}", self.symbol)
    }
}

impl FetcherRequest for LatestInstrumentPriceRequest {
    fn kind(&self) -> RequestKind {
        RequestKind::InstrumentPrice
    }

    fn validate(&self) -> Result<(), FetcherError> {
        check_code("symbol", &self.symbol)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HistoricalDailyInstrumentPricesRequest {
    pub symbol: String,
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl HistoricalDailyInstrumentPricesRequest {
    pub fn new(symbol: impl Into<String>, from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self {
            symbol: normalize_code(symbol),
            from,
            to,
        }
    }
}

impl fmt::Display for HistoricalDailyInstrumentPricesRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "daily prices of {} from {} to {}",
            self.symbol,
            self.from.date_naive(),
            self.to.date_naive()
        )
    }
}

impl FetcherRequest for HistoricalDailyInstrumentPricesRequest {
    fn kind(&self) -> RequestKind {
        RequestKind::InstrumentPrice
    }

    fn validate(&self) -> Result<(), FetcherError> {
        check_code("symbol", &self.symbol)?;
        check_range(self.from, self.to)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IntradayInstrumentPricesRequest {
    pub symbol: String,
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub interval: IntradayInterval,
}

impl IntradayInstrumentPricesRequest {
    pub fn new(
        symbol: impl Into<String>,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        interval: IntradayInterval,
    ) -> Self {
        Self {
            symbol: normalize_code(symbol),
            from,
            to,
            interval,
        }
    }
}

impl fmt::Display for IntradayInstrumentPricesRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?} prices of {} from {} to {}",
            self.interval, self.symbol, self.from, self.to
        )
    }
}

impl FetcherRequest for IntradayInstrumentPricesRequest {
    fn kind(&self) -> RequestKind {
        RequestKind::InstrumentPrice
    }

    fn validate(&self) -> Result<(), FetcherError> {
        check_code("symbol", &self.symbol)?;
        check_range(self.from, self.to)
    }
}

// ── Exchange rates ──────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LatestExchangeRatesRequest {
    pub base_currency: String,
}

impl LatestExchangeRatesRequest {
    pub fn new(base_currency: impl Into<String>) -> Self {
        Self {
            base_currency: normalize_code(base_currency),
        }
    }
}

impl fmt::Display for LatestExchangeRatesRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "latest {} exchange rates", self.base_currency)
    }
}

impl FetcherRequest for LatestExchangeRatesRequest {
    fn kind(&self) -> RequestKind {
        RequestKind::ExchangeRate
    }

    fn validate(&self) -> Result<(), FetcherError> {
        check_code("base currency", &self.base_currency)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HistoricalDailyExchangeRatesRequest {
    pub base_currency: String,
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl HistoricalDailyExchangeRatesRequest {
    pub fn new(base_currency: impl Into<String>, from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self {
            base_currency: normalize_code(base_currency),
            from,
            to,
        }
    }
}

impl fmt::Display for HistoricalDailyExchangeRatesRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "daily {} exchange rates from {} to {}",
            self.base_currency,
            self.from.date_naive(),
            self.to.date_naive()
        )
    }
}

impl FetcherRequest for HistoricalDailyExchangeRatesRequest {
    fn kind(&self) -> RequestKind {
        RequestKind::ExchangeRate
    }

    fn validate(&self) -> Result<(), FetcherError> {
        check_code("base currency", &self.base_currency)?;
        check_range(self.from, self.to)
    }
}

// ── Splits ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstrumentSplitsRequest {
    pub symbol: String,
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl InstrumentSplitsRequest {
    pub fn new(symbol: impl Into<String>, from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self {
            symbol: normalize_code(symbol),
            from,
            to,
        }
    }
}

impl fmt::Display for InstrumentSplitsRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "splits of {} from {} to {}",
            self.symbol,
            self.from.date_naive(),
            self.to.date_naive()
        )
    }
}

impl FetcherRequest for InstrumentSplitsRequest {
    fn kind(&self) -> RequestKind {
        RequestKind::InstrumentSplit
    }

    fn validate(&self) -> Result<(), FetcherError> {
        check_code("symbol", &self.symbol)?;
        check_range(self.from, self.to)
    }
}
