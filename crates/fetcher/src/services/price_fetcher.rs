use chrono::{DateTime, Utc};
use log::warn;
use std::time::Duration;
use tokio::sync::watch;

use crate::errors::FetcherError;
use crate::models::price::{ExchangeRates, InstrumentPrice, InstrumentSplit, PricePoint};
use crate::models::request::{
    FetcherRequest, HistoricalDailyExchangeRatesRequest, HistoricalDailyInstrumentPricesRequest,
    InstrumentSplitsRequest, IntradayInstrumentPricesRequest, IntradayInterval,
    LatestExchangeRatesRequest, LatestInstrumentPriceRequest,
};
use crate::models::response::Response;
use crate::models::settings::FetcherSettings;
use crate::providers::registry::SourceRegistry;
use super::request_handler::RequestHandler;
use super::retry_policy::RetryPolicy;

/// Entry point for background jobs: latest-price polling, initial price
/// backfill, exchange-rate and split fetches.
///
/// Owns the capability map and the default retry policy and builds one
/// [`RequestHandler`] per call. `Err` is reserved for configuration and
/// programming errors (no source for a request type, malformed request);
/// every operational outcome comes back as a [`Response`].
pub struct PriceFetcher {
    registry: SourceRegistry,
    default_retry: RetryPolicy,
    attempt_timeout: Option<Duration>,
}

impl std::fmt::Debug for PriceFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PriceFetcher")
            .field("registry", &self.registry)
            .field("default_retry", &self.default_retry)
            .field("attempt_timeout", &self.attempt_timeout)
            .finish()
    }
}

impl PriceFetcher {
    pub fn new(registry: SourceRegistry, default_retry: RetryPolicy) -> Self {
        Self {
            registry,
            default_retry,
            attempt_timeout: None,
        }
    }

    /// Build every configured source and take the default retry policy from
    /// the settings.
    pub fn from_settings(settings: &FetcherSettings) -> Result<Self, FetcherError> {
        settings.validate()?;
        Ok(Self::new(
            SourceRegistry::from_settings(settings),
            RetryPolicy::from_secs(&settings.default_retry_secs),
        ))
    }

    /// Bound each individual source call (see
    /// [`RequestHandler::with_attempt_timeout`]).
    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = Some(timeout);
        self
    }

    pub fn registry(&self) -> &SourceRegistry {
        &self.registry
    }

    pub fn default_retry(&self) -> &RetryPolicy {
        &self.default_retry
    }

    /// Check if at least one source can serve `(Req, Res)`.
    pub fn has_source_for<Req: 'static, Res: 'static>(&self) -> bool {
        self.registry.supports::<Req, Res>()
    }

    /// Names of the sources able to serve `(Req, Res)`, in failover order.
    pub fn source_names<Req: 'static, Res: 'static>(&self) -> Vec<String> {
        self.registry.source_names_for::<Req, Res>()
    }

    /// Create the handler for one request without running it.
    pub fn handler<Req, Res>(
        &self,
        request: Req,
        retry_policy: RetryPolicy,
    ) -> Result<RequestHandler<Req, Res>, FetcherError>
    where
        Req: FetcherRequest,
        Res: Send + 'static,
    {
        let handler = RequestHandler::from_registry(request, &self.registry, retry_policy)?;
        Ok(match self.attempt_timeout {
            Some(timeout) => handler.with_attempt_timeout(timeout),
            None => handler,
        })
    }

    /// Fetch with the default retry policy.
    pub async fn handle<Req, Res>(&self, request: Req) -> Result<Response<Res>, FetcherError>
    where
        Req: FetcherRequest,
        Res: Send + 'static,
    {
        self.handle_with_policy(request, self.default_retry.clone()).await
    }

    pub async fn handle_with_policy<Req, Res>(
        &self,
        request: Req,
        retry_policy: RetryPolicy,
    ) -> Result<Response<Res>, FetcherError>
    where
        Req: FetcherRequest,
        Res: Send + 'static,
    {
        let handler = self.handler::<Req, Res>(request, retry_policy)?;
        let response = handler.handle().await;
        log_failure(handler.request(), &response);
        Ok(response)
    }

    /// Fetch with the default retry policy, abandoning the request once
    /// `shutdown` flips to `true`.
    pub async fn handle_until_shutdown<Req, Res>(
        &self,
        request: Req,
        shutdown: watch::Receiver<bool>,
    ) -> Result<Response<Res>, FetcherError>
    where
        Req: FetcherRequest,
        Res: Send + 'static,
    {
        let handler = self.handler::<Req, Res>(request, self.default_retry.clone())?;
        let response = handler.handle_until_shutdown(shutdown).await;
        log_failure(handler.request(), &response);
        Ok(response)
    }

    // ── Convenience wrappers, one per request shape ─────────────────

    pub async fn latest_price(
        &self,
        symbol: &str,
    ) -> Result<Response<InstrumentPrice>, FetcherError> {
        self.handle(LatestInstrumentPriceRequest::new(symbol)).await
    }

    pub async fn historical_daily_prices(
        &self,
        symbol: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Response<Vec<PricePoint>>, FetcherError> {
        self.handle(HistoricalDailyInstrumentPricesRequest::new(symbol, from, to))
            .await
    }

    pub async fn intraday_prices(
        &self,
        symbol: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        interval: IntradayInterval,
    ) -> Result<Response<Vec<PricePoint>>, FetcherError> {
        self.handle(IntradayInstrumentPricesRequest::new(symbol, from, to, interval))
            .await
    }

    pub async fn latest_exchange_rates(
        &self,
        base_currency: &str,
    ) -> Result<Response<ExchangeRates>, FetcherError> {
        self.handle(LatestExchangeRatesRequest::new(base_currency)).await
    }

    pub async fn historical_exchange_rates(
        &self,
        base_currency: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Response<Vec<ExchangeRates>>, FetcherError> {
        self.handle(HistoricalDailyExchangeRatesRequest::new(base_currency, from, to))
            .await
    }

    pub async fn splits(
        &self,
        symbol: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Response<Vec<InstrumentSplit>>, FetcherError> {
        self.handle(InstrumentSplitsRequest::new(symbol, from, to)).await
    }
}

fn log_failure<Req: FetcherRequest, Res>(request: &Req, response: &Response<Res>) {
    if !response.is_ok() {
        warn!(
            "Fetching {} failed with {}: {}",
            request,
            response.status(),
            response.error_message().unwrap_or("no error message")
        );
    }
}
