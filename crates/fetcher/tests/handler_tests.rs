// ═══════════════════════════════════════════════════════════════════
// Request Handler Tests: failover order, retry rounds, aggregation,
// timeouts, panic containment, cancellation, PriceFetcher facade
// ═══════════════════════════════════════════════════════════════════

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use porteval_fetcher::services::request_handler::CANCELLED_MESSAGE;
use porteval_fetcher::{
    FetcherError, HistoricalDailyInstrumentPricesRequest, InstrumentPrice,
    LatestInstrumentPriceRequest, PriceFetcher, PricePoint, Processor, RequestHandler, Response,
    RetryPolicy, SourceRegistry, StatusCode,
};

// ═══════════════════════════════════════════════════════════════════
// Test Helpers: Scripted Sources
// ═══════════════════════════════════════════════════════════════════

/// What a scripted source does on one call.
#[derive(Clone, Copy)]
enum Step {
    Succeed(f64),
    Fail(StatusCode),
    Hang,
    Panic,
}

/// A source that follows a script, one step per call. The last step
/// repeats once the script runs out.
struct ScriptedSource {
    name: String,
    steps: Vec<Step>,
    calls: AtomicUsize,
}

impl ScriptedSource {
    fn new(name: &str, steps: Vec<Step>) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            steps,
            calls: AtomicUsize::new(0),
        })
    }

    fn always(name: &str, step: Step) -> Arc<Self> {
        Self::new(name, vec![step])
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

fn quote_time() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 5, 20, 0, 0).unwrap()
}

#[async_trait]
impl Processor<LatestInstrumentPriceRequest, InstrumentPrice> for ScriptedSource {
    fn source_name(&self) -> &str {
        &self.name
    }

    async fn process(&self, request: &LatestInstrumentPriceRequest) -> Response<InstrumentPrice> {
        let idx = self.calls.fetch_add(1, Ordering::SeqCst);
        let step = self.steps[idx.min(self.steps.len() - 1)];
        match step {
            Step::Succeed(price) => Response::ok(InstrumentPrice {
                symbol: request.symbol.clone(),
                time: quote_time(),
                price,
            }),
            Step::Fail(status) => Response::failure(status, format!("{} failed", self.name)),
            Step::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Response::other_error("woke up")
            }
            Step::Panic => panic!("{} blew up", self.name),
        }
    }
}

type PriceSource = Arc<dyn Processor<LatestInstrumentPriceRequest, InstrumentPrice>>;

fn sources(list: &[&Arc<ScriptedSource>]) -> Vec<PriceSource> {
    list.iter().map(|s| Arc::clone(*s) as PriceSource).collect()
}

fn aapl() -> LatestInstrumentPriceRequest {
    LatestInstrumentPriceRequest::new("AAPL")
}

fn handler(
    list: &[&Arc<ScriptedSource>],
    policy: RetryPolicy,
) -> RequestHandler<LatestInstrumentPriceRequest, InstrumentPrice> {
    RequestHandler::new(aapl(), sources(list), policy).unwrap()
}

// ═══════════════════════════════════════════════════════════════════
// Construction
// ═══════════════════════════════════════════════════════════════════

mod construction {
    use super::*;

    #[test]
    fn empty_candidate_list_is_configuration_error() {
        let result = RequestHandler::<LatestInstrumentPriceRequest, InstrumentPrice>::new(
            aapl(),
            Vec::new(),
            RetryPolicy::none(),
        );
        assert!(matches!(result, Err(FetcherError::NoSources { .. })));
    }

    #[test]
    fn unregistered_pair_fails_resolution() {
        let registry = SourceRegistry::new();
        let result = RequestHandler::<LatestInstrumentPriceRequest, InstrumentPrice>::from_registry(
            aapl(),
            &registry,
            RetryPolicy::none(),
        );
        match result {
            Err(FetcherError::NoSources { request, result }) => {
                assert_eq!(request, "LatestInstrumentPriceRequest");
                assert_eq!(result, "InstrumentPrice");
            }
            _ => panic!("expected NoSources"),
        }
    }

    #[test]
    fn invalid_request_is_rejected_before_any_call() {
        let a = ScriptedSource::always("A", Step::Succeed(1.0));
        let result = RequestHandler::new(
            LatestInstrumentPriceRequest::new("   "),
            sources(&[&a]),
            RetryPolicy::none(),
        );
        assert!(matches!(result, Err(FetcherError::InvalidRequest(_))));
        assert_eq!(a.calls(), 0);
    }

    #[test]
    fn inverted_range_is_rejected() {
        struct Never;

        #[async_trait]
        impl Processor<HistoricalDailyInstrumentPricesRequest, Vec<PricePoint>> for Never {
            fn source_name(&self) -> &str {
                "Never"
            }

            async fn process(
                &self,
                _request: &HistoricalDailyInstrumentPricesRequest,
            ) -> Response<Vec<PricePoint>> {
                Response::ok(Vec::new())
            }
        }

        let from = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();
        let to = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let request = HistoricalDailyInstrumentPricesRequest::new("AAPL", from, to);
        let never: Arc<dyn Processor<HistoricalDailyInstrumentPricesRequest, Vec<PricePoint>>> =
            Arc::new(Never);
        let result = RequestHandler::new(request, vec![never], RetryPolicy::none());
        assert!(matches!(result, Err(FetcherError::InvalidRequest(_))));
    }

    #[test]
    fn exposes_sources_in_given_order() {
        let a = ScriptedSource::always("A", Step::Succeed(1.0));
        let b = ScriptedSource::always("B", Step::Succeed(2.0));
        let h = handler(&[&b, &a], RetryPolicy::none());
        assert_eq!(h.source_names(), vec!["B", "A"]);
        assert_eq!(h.request().symbol, "AAPL");
    }
}

// ═══════════════════════════════════════════════════════════════════
// Failover within one round
// ═══════════════════════════════════════════════════════════════════

mod failover {
    use super::*;

    #[tokio::test]
    async fn skips_failing_sources_until_one_succeeds() {
        let conn = ScriptedSource::always("Conn", Step::Fail(StatusCode::ConnectionError));
        let other = ScriptedSource::always("Other", Step::Fail(StatusCode::OtherError));
        let good = ScriptedSource::always("Good", Step::Succeed(42.5));

        let response = handler(&[&conn, &other, &good], RetryPolicy::none()).handle().await;

        assert_eq!(response.status(), StatusCode::Ok);
        assert_eq!(response.result().unwrap().price, 42.5);
        assert_eq!(conn.calls(), 1);
        assert_eq!(other.calls(), 1);
        assert_eq!(good.calls(), 1);
    }

    #[tokio::test]
    async fn stops_at_first_success() {
        let first = ScriptedSource::always("First", Step::Succeed(1.0));
        let second = ScriptedSource::always("Second", Step::Succeed(2.0));

        let response = handler(&[&first, &second], RetryPolicy::none()).handle().await;

        assert_eq!(response.result().unwrap().price, 1.0);
        assert_eq!(second.calls(), 0);
    }

    #[tokio::test]
    async fn earlier_source_always_preferred() {
        let limited = ScriptedSource::new(
            "Limited",
            vec![Step::Fail(StatusCode::RateLimitExceeded), Step::Succeed(10.0)],
        );
        let spare = ScriptedSource::always("Spare", Step::Succeed(20.0));

        // First request falls through to the spare source...
        let h = handler(&[&limited, &spare], RetryPolicy::none());
        assert_eq!(h.handle().await.result().unwrap().price, 20.0);

        // ...the next one goes back to the first source.
        let h = handler(&[&limited, &spare], RetryPolicy::none());
        assert_eq!(h.handle().await.result().unwrap().price, 10.0);
        assert_eq!(spare.calls(), 1);
    }

    #[tokio::test]
    async fn panicking_source_counts_as_other_error() {
        let broken = ScriptedSource::always("Broken", Step::Panic);
        let good = ScriptedSource::always("Good", Step::Succeed(3.0));

        let response = handler(&[&broken, &good], RetryPolicy::none()).handle().await;
        assert!(response.is_ok());
        assert_eq!(broken.calls(), 1);

        let response = handler(&[&broken], RetryPolicy::none()).handle().await;
        assert_eq!(response.status(), StatusCode::OtherError);
        assert!(response.error_message().unwrap().contains("Broken blew up"));
    }

    #[tokio::test(start_paused = true)]
    async fn attempt_timeout_counts_as_connection_error() {
        let slow = ScriptedSource::always("Slow", Step::Hang);
        let good = ScriptedSource::always("Good", Step::Succeed(5.0));

        let response = handler(&[&slow, &good], RetryPolicy::none())
            .with_attempt_timeout(Duration::from_secs(2))
            .handle()
            .await;
        assert_eq!(response.result().unwrap().price, 5.0);

        let response = handler(&[&slow], RetryPolicy::none())
            .with_attempt_timeout(Duration::from_secs(2))
            .handle()
            .await;
        assert_eq!(response.status(), StatusCode::ConnectionError);
    }
}

// ═══════════════════════════════════════════════════════════════════
// Retry rounds
// ═══════════════════════════════════════════════════════════════════

mod retry_rounds {
    use super::*;

    #[tokio::test]
    async fn retry_recovers_transient_failure() {
        let flaky = ScriptedSource::new(
            "Flaky",
            vec![Step::Fail(StatusCode::ConnectionError), Step::Succeed(7.0)],
        );
        let dead = ScriptedSource::always("Dead", Step::Fail(StatusCode::OtherError));

        let policy = RetryPolicy::new([Duration::ZERO]);
        let response = handler(&[&flaky, &dead], policy).handle().await;

        assert_eq!(response.status(), StatusCode::Ok);
        assert_eq!(response.result().unwrap().price, 7.0);
        assert_eq!(flaky.calls(), 2);
        // Round 1 tried both, round 2 stopped at the first source.
        assert_eq!(dead.calls(), 1);
    }

    #[tokio::test]
    async fn no_retry_means_single_round() {
        let flaky = ScriptedSource::new(
            "Flaky",
            vec![Step::Fail(StatusCode::ConnectionError), Step::Succeed(7.0)],
        );

        let response = handler(&[&flaky], RetryPolicy::none()).handle().await;

        assert_eq!(response.status(), StatusCode::ConnectionError);
        assert_eq!(flaky.calls(), 1);
    }

    #[tokio::test]
    async fn every_round_retries_full_candidate_list() {
        let a = ScriptedSource::always("A", Step::Fail(StatusCode::ConnectionError));
        let b = ScriptedSource::always("B", Step::Fail(StatusCode::ConnectionError));

        let policy = RetryPolicy::new([Duration::ZERO, Duration::ZERO]);
        let response = handler(&[&a, &b], policy).handle().await;

        assert!(!response.is_ok());
        assert_eq!(a.calls(), 3);
        assert_eq!(b.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn waits_configured_intervals_between_rounds() {
        let a = ScriptedSource::always("A", Step::Fail(StatusCode::RateLimitExceeded));

        let policy = RetryPolicy::from_secs(&[10, 30]);
        let start = tokio::time::Instant::now();
        let response = handler(&[&a], policy).handle().await;

        assert_eq!(response.status(), StatusCode::OtherError);
        assert_eq!(a.calls(), 3);
        assert!(start.elapsed() >= Duration::from_secs(40));
    }

    #[test]
    fn policy_rounds() {
        assert_eq!(RetryPolicy::none().rounds(), 1);
        assert!(RetryPolicy::default().is_none());
        let policy = RetryPolicy::from_secs(&[1, 2, 3]);
        assert_eq!(policy.rounds(), 4);
        assert_eq!(policy.intervals()[2], Duration::from_secs(3));
    }
}

// ═══════════════════════════════════════════════════════════════════
// Aggregated failure
// ═══════════════════════════════════════════════════════════════════

mod aggregation {
    use super::*;

    #[tokio::test]
    async fn only_connection_errors_aggregate_to_connection_error() {
        let a = ScriptedSource::always("A", Step::Fail(StatusCode::ConnectionError));
        let b = ScriptedSource::always("B", Step::Fail(StatusCode::ConnectionError));

        let response = handler(&[&a, &b], RetryPolicy::none()).handle().await;

        assert_eq!(response.status(), StatusCode::ConnectionError);
        assert!(response.result().is_none());
    }

    #[tokio::test]
    async fn other_error_dominates() {
        let a = ScriptedSource::always("A", Step::Fail(StatusCode::ConnectionError));
        let b = ScriptedSource::always("B", Step::Fail(StatusCode::OtherError));

        let response = handler(&[&a, &b], RetryPolicy::none()).handle().await;
        assert_eq!(response.status(), StatusCode::OtherError);
    }

    #[tokio::test]
    async fn rate_limit_aggregates_to_other_error() {
        let a = ScriptedSource::always("A", Step::Fail(StatusCode::RateLimitExceeded));
        let b = ScriptedSource::always("B", Step::Fail(StatusCode::ConnectionError));

        let response = handler(&[&a, &b], RetryPolicy::none()).handle().await;
        assert_eq!(response.status(), StatusCode::OtherError);
    }

    #[tokio::test]
    async fn message_names_request_and_every_source() {
        let a = ScriptedSource::always("Alpha", Step::Fail(StatusCode::ConnectionError));
        let b = ScriptedSource::always("Beta", Step::Fail(StatusCode::OtherError));

        let response = handler(&[&a, &b], RetryPolicy::none()).handle().await;
        let message = response.error_message().unwrap();

        assert!(message.contains("latest price of AAPL"));
        assert!(message.contains("Alpha: ConnectionError"));
        assert!(message.contains("Beta: OtherError"));
    }
}

// ═══════════════════════════════════════════════════════════════════
// Cancellation
// ═══════════════════════════════════════════════════════════════════

mod cancellation {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn shutdown_aborts_in_flight_call() {
        let slow = ScriptedSource::always("Slow", Step::Hang);
        let never_reached = ScriptedSource::always("Later", Step::Succeed(1.0));
        let h = handler(&[&slow, &never_reached], RetryPolicy::none());
        let (tx, rx) = watch::channel(false);

        let (response, _) = tokio::join!(h.handle_until_shutdown(rx), async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            tx.send(true).unwrap();
        });

        assert_eq!(response.status(), StatusCode::OtherError);
        assert_eq!(response.error_message(), Some(CANCELLED_MESSAGE));
        assert_eq!(never_reached.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_skips_pending_back_off() {
        let a = ScriptedSource::always("A", Step::Fail(StatusCode::ConnectionError));
        let h = handler(&[&a], RetryPolicy::from_secs(&[600, 600]));
        let (tx, rx) = watch::channel(false);

        let start = tokio::time::Instant::now();
        let (response, _) = tokio::join!(h.handle_until_shutdown(rx), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            tx.send(true).unwrap();
        });

        assert_eq!(response.error_message(), Some(CANCELLED_MESSAGE));
        assert_eq!(a.calls(), 1);
        assert!(start.elapsed() < Duration::from_secs(600));
    }

    #[tokio::test]
    async fn already_shut_down_makes_no_calls() {
        let a = ScriptedSource::always("A", Step::Succeed(1.0));
        let (_tx, rx) = watch::channel(true);

        let response = handler(&[&a], RetryPolicy::none()).handle_until_shutdown(rx).await;

        assert_eq!(response.error_message(), Some(CANCELLED_MESSAGE));
        assert_eq!(a.calls(), 0);
    }

    #[tokio::test]
    async fn without_shutdown_completes_normally() {
        let a = ScriptedSource::always("A", Step::Succeed(9.0));
        let (tx, rx) = watch::channel(false);

        let response = handler(&[&a], RetryPolicy::none()).handle_until_shutdown(rx).await;
        drop(tx);

        assert_eq!(response.result().unwrap().price, 9.0);
    }
}

// ═══════════════════════════════════════════════════════════════════
// PriceFetcher: end to end through the registry
// ═══════════════════════════════════════════════════════════════════

mod price_fetcher {
    use super::*;

    fn fetcher(list: &[(&str, &Arc<ScriptedSource>)], policy: RetryPolicy) -> PriceFetcher {
        let mut registry = SourceRegistry::new();
        for (name, source) in list {
            registry.register::<LatestInstrumentPriceRequest, InstrumentPrice, _>(
                *name,
                Arc::clone(*source),
            );
        }
        PriceFetcher::new(registry, policy)
    }

    #[tokio::test]
    async fn latest_price_falls_back_to_second_source() {
        let a = ScriptedSource::always("A", Step::Fail(StatusCode::ConnectionError));
        let b = ScriptedSource::always("B", Step::Succeed(189.12));
        let fetcher = fetcher(&[("A", &a), ("B", &b)], RetryPolicy::none());

        let response = fetcher.latest_price("aapl").await.unwrap();

        assert_eq!(response.status(), StatusCode::Ok);
        let price = response.result().unwrap();
        assert_eq!(price.symbol, "AAPL");
        assert_eq!(price.price, 189.12);
        assert_eq!(price.time, quote_time());
    }

    #[tokio::test]
    async fn default_policy_is_applied() {
        let flaky = ScriptedSource::new(
            "Flaky",
            vec![Step::Fail(StatusCode::ConnectionError), Step::Succeed(1.5)],
        );
        let fetcher = fetcher(&[("Flaky", &flaky)], RetryPolicy::new([Duration::ZERO]));

        let response = fetcher.latest_price("MSFT").await.unwrap();
        assert!(response.is_ok());
        assert_eq!(flaky.calls(), 2);
    }

    #[tokio::test]
    async fn explicit_policy_overrides_default() {
        let flaky = ScriptedSource::new(
            "Flaky",
            vec![Step::Fail(StatusCode::ConnectionError), Step::Succeed(1.5)],
        );
        let fetcher = fetcher(&[("Flaky", &flaky)], RetryPolicy::new([Duration::ZERO]));

        let response: Response<InstrumentPrice> = fetcher
            .handle_with_policy(LatestInstrumentPriceRequest::new("MSFT"), RetryPolicy::none())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ConnectionError);
    }

    #[tokio::test]
    async fn missing_capability_is_error_not_response() {
        let a = ScriptedSource::always("A", Step::Succeed(1.0));
        let fetcher = fetcher(&[("A", &a)], RetryPolicy::none());

        let now = Utc::now();
        let result = fetcher.historical_daily_prices("AAPL", now, now).await;
        assert!(matches!(result, Err(FetcherError::NoSources { .. })));

        let result = fetcher.latest_exchange_rates("USD").await;
        assert!(matches!(result, Err(FetcherError::NoSources { .. })));
    }

    #[tokio::test]
    async fn attempt_timeout_propagates_to_handlers() {
        let slow = ScriptedSource::always("Slow", Step::Hang);
        let fetcher = fetcher(&[("Slow", &slow)], RetryPolicy::none())
            .with_attempt_timeout(Duration::from_millis(20));

        let response = fetcher.latest_price("AAPL").await.unwrap();
        assert_eq!(response.status(), StatusCode::ConnectionError);
    }

    #[test]
    fn reports_source_names() {
        let a = ScriptedSource::always("A", Step::Succeed(1.0));
        let b = ScriptedSource::always("B", Step::Succeed(1.0));
        let fetcher = fetcher(&[("A", &a), ("B", &b)], RetryPolicy::none());

        assert!(fetcher.has_source_for::<LatestInstrumentPriceRequest, InstrumentPrice>());
        assert_eq!(
            fetcher.source_names::<LatestInstrumentPriceRequest, InstrumentPrice>(),
            vec!["A".to_string(), "B".to_string()]
        );
    }
}
