use futures::FutureExt;
use log::{debug, info, warn};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use crate::errors::FetcherError;
use crate::models::request::FetcherRequest;
use crate::models::response::{Response, StatusCode};
use crate::providers::registry::SourceRegistry;
use crate::providers::traits::Processor;
use super::retry_policy::RetryPolicy;

/// Message of the response returned when a shutdown signal interrupts a
/// request.
pub const CANCELLED_MESSAGE: &str = "request cancelled";

/// Dispatches one logical request across its candidate sources.
///
/// Each round tries the sources strictly in order and stops at the first
/// `Ok` response. When a round ends without success, the handler sleeps for
/// the next interval of its [`RetryPolicy`] and starts over with the full
/// candidate list, since most failures (dropped connections, a rate-limit
/// window) are transient. Once the policy is exhausted it returns one
/// aggregated failure.
///
/// A source can never take the handler down: panics inside `process` are
/// caught and count as `OtherError` for that source.
pub struct RequestHandler<Req, Res>
where
    Req: FetcherRequest,
    Res: Send + 'static,
{
    request: Req,
    sources: Vec<Arc<dyn Processor<Req, Res>>>,
    retry_policy: RetryPolicy,
    attempt_timeout: Option<Duration>,
}

impl<Req, Res> RequestHandler<Req, Res>
where
    Req: FetcherRequest,
    Res: Send + 'static,
{
    /// Fails with [`FetcherError::NoSources`] when `sources` is empty and with
    /// [`FetcherError::InvalidRequest`] when the request is malformed. Both are
    /// caller bugs, not fetch failures.
    pub fn new(
        request: Req,
        sources: Vec<Arc<dyn Processor<Req, Res>>>,
        retry_policy: RetryPolicy,
    ) -> Result<Self, FetcherError> {
        if sources.is_empty() {
            return Err(FetcherError::no_sources::<Req, Res>());
        }
        request.validate()?;
        Ok(Self {
            request,
            sources,
            retry_policy,
            attempt_timeout: None,
        })
    }

    /// Build a handler whose candidates are every source registered for
    /// `(Req, Res)`, in registration order.
    pub fn from_registry(
        request: Req,
        registry: &SourceRegistry,
        retry_policy: RetryPolicy,
    ) -> Result<Self, FetcherError> {
        let sources = registry.sources_for::<Req, Res>()?;
        Self::new(request, sources, retry_policy)
    }

    /// Bound every single `process` call. An attempt that runs out of time
    /// counts as a `ConnectionError` for its source.
    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = Some(timeout);
        self
    }

    pub fn request(&self) -> &Req {
        &self.request
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    pub fn source_names(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.source_name()).collect()
    }

    /// Run rounds until a source succeeds or the retry policy runs out.
    pub async fn handle(&self) -> Response<Res> {
        let rounds = self.retry_policy.rounds();
        let mut last_errors: Vec<Option<String>> = vec![None; self.sources.len()];
        let mut only_connection_errors = true;

        for round in 0..rounds {
            if round > 0 {
                let wait = self.retry_policy.intervals()[round - 1];
                info!(
                    "No source could serve {} in round {}/{}, retrying in {:?}",
                    self.request, round, rounds, wait
                );
                tokio::time::sleep(wait).await;
            }

            for (idx, source) in self.sources.iter().enumerate() {
                let name = source.source_name();
                debug!("Requesting {} from {} (round {})", self.request, name, round + 1);

                let response = self.attempt(source.as_ref()).await;
                if response.is_ok() {
                    debug!("{} served {}", name, self.request);
                    return response;
                }

                let status = response.status();
                if matches!(status, StatusCode::OtherError | StatusCode::RateLimitExceeded) {
                    only_connection_errors = false;
                }
                let message = response.error_message().unwrap_or("no error message");
                debug!("{} failed to serve {}: {} ({})", name, self.request, status, message);
                last_errors[idx] = Some(format!("{name}: {status} ({message})"));
            }
        }

        let summary: Vec<String> = last_errors.into_iter().flatten().collect();
        let message = format!(
            "No source could satisfy {} after {} round(s): {}",
            self.request,
            rounds,
            summary.join("; ")
        );
        warn!("{message}");

        if only_connection_errors {
            Response::connection_error(message)
        } else {
            Response::other_error(message)
        }
    }

    /// Like [`handle`](Self::handle), but gives up as soon as `shutdown`
    /// becomes `true`. The in-flight source call and any pending back-off are
    /// dropped, and the response is an `OtherError` with
    /// [`CANCELLED_MESSAGE`].
    pub async fn handle_until_shutdown(&self, mut shutdown: watch::Receiver<bool>) -> Response<Res> {
        tokio::select! {
            biased;
            _ = wait_for_shutdown(&mut shutdown) => {
                info!("Shutdown requested, abandoning {}", self.request);
                Response::other_error(CANCELLED_MESSAGE)
            }
            response = self.handle() => response,
        }
    }

    async fn attempt(&self, source: &dyn Processor<Req, Res>) -> Response<Res> {
        let call = AssertUnwindSafe(source.process(&self.request)).catch_unwind();

        let outcome = match self.attempt_timeout {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    return Response::connection_error(format!(
                        "{}: no response within {:?}",
                        source.source_name(),
                        limit
                    ))
                }
            },
            None => call.await,
        };

        outcome.unwrap_or_else(|panic| {
            warn!(
                "{} panicked while serving {}: {}",
                source.source_name(),
                self.request,
                panic_message(panic.as_ref())
            );
            Response::other_error(format!(
                "{}: unexpected failure: {}",
                source.source_name(),
                panic_message(panic.as_ref())
            ))
        })
    }
}

/// Resolve once the flag is `true`. A dropped sender never signals.
async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic with a non-string payload".to_string()
    }
}
