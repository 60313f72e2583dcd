pub mod price_fetcher;
pub mod request_handler;
pub mod retry_policy;
