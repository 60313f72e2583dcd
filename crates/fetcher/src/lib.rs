//! Financial data fetching core for PortEval.
//!
//! A logical request ("latest price of AAPL", "daily USD rates for 2023")
//! is dispatched to one of several interchangeable data sources. Each source
//! owns its HTTP client and a sliding-window rate limiter; the
//! [`RequestHandler`] tries candidates in registration order, retries whole
//! rounds according to a [`RetryPolicy`], and always answers with a
//! [`Response`] envelope instead of an error.
//!
//! ```no_run
//! use porteval_fetcher::{FetcherSettings, PriceFetcher};
//!
//! # async fn run() -> Result<(), porteval_fetcher::FetcherError> {
//! let settings = FetcherSettings::from_file("fetcher.json")?;
//! let fetcher = PriceFetcher::from_settings(&settings)?;
//! let response = fetcher.latest_price("AAPL").await?;
//! if let Some(price) = response.result() {
//!     println!("{} = {}", price.symbol, price.price);
//! }
//! # Ok(())
//! # }
//! ```

pub mod errors;
pub mod models;
pub mod providers;
pub mod services;

pub use errors::FetcherError;
pub use models::price::{ExchangeRates, InstrumentPrice, InstrumentSplit, PricePoint};
pub use models::request::{
    FetcherRequest, HistoricalDailyExchangeRatesRequest, HistoricalDailyInstrumentPricesRequest,
    InstrumentSplitsRequest, IntradayInstrumentPricesRequest, IntradayInterval,
    LatestExchangeRatesRequest, LatestInstrumentPriceRequest, RequestKind,
};
pub use models::response::{Response, StatusCode};
pub use models::settings::{FetcherSettings, RateLimitSettings, SourceSettings};
pub use providers::rate_limiter::RateLimiter;
pub use providers::registry::SourceRegistry;
pub use providers::traits::{DataSource, Processor};
pub use services::price_fetcher::PriceFetcher;
pub use services::request_handler::RequestHandler;
pub use services::retry_policy::RetryPolicy;
