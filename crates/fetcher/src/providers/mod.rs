pub mod http;
pub mod range_split;
pub mod rate_limiter;
pub mod registry;
pub mod traits;

// API source implementations
pub mod alphavantage;
pub mod frankfurter;
pub mod open_exchange_rates;
pub mod tiingo;
