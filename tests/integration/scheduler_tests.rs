//! End-to-end scheduling behavior with scripted fetchers and producers

use crate::common::*;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tidepool::config::SinkErrorPolicy;
use tidepool::crawler::ProducerError;
use tidepool::output::print_statistics;
use tidepool::state::HistoryOutcome;
use tidepool::{Admission, Artifact, Crawler, FetchOutcome, Output, TidepoolError, WorkItem};
use tokio::time::{timeout, Instant};

const LIMIT: Duration = Duration::from_secs(300);

fn start(
    config: tidepool::Config,
    fetcher: Arc<TestFetcher>,
    spider: Arc<TestSpider>,
    sink: Arc<RecordingSink>,
) -> Crawler {
    Crawler::builder(config)
        .fetcher(fetcher)
        .producer(spider)
        .sink(sink)
        .build()
        .unwrap()
}

async fn run_to_idle(crawler: &Crawler) {
    timeout(LIMIT, crawler.wait_idle())
        .await
        .expect("crawl did not go idle")
        .unwrap();
    crawler.flush_sinks().await;
}

#[tokio::test(start_paused = true)]
async fn test_follows_requests_and_collects_artifacts() {
    let fetcher = TestFetcher::succeeding();
    let spider = TestSpider::new("links", &["/"], |identity, item| {
        let mut out = vec![Output::from(page_artifact(item))];
        match item.target().path() {
            "/" => {
                out.push(request(identity, "/a").into());
                out.push(request(identity, "/b").into());
            }
            "/a" => out.push(request(identity, "/b").into()),
            _ => {}
        }
        Ok(out)
    });
    let sink = RecordingSink::new("pages");
    let crawler = start(test_config(4), fetcher.clone(), spider, sink.clone());

    let report = crawler.start_producers();
    assert_eq!(report.admitted, 1);
    run_to_idle(&crawler).await;

    assert_eq!(sink.paths(), vec!["/", "/a", "/b"]);
    assert_eq!(fetcher.attempts("/b"), 1);

    let stats = crawler.stats();
    assert_eq!(stats.completed, 3);
    assert_eq!(stats.duplicates, 1);
    assert_eq!(stats.fingerprints, 3);
    assert_eq!(stats.pending, 0);
    assert!(stats.quiescent);

    let saved = sink.saved();
    assert!(saved
        .iter()
        .all(|a| a.producer.as_deref() == Some(TestSpider::identity_of("links").as_str())));

    crawler.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_repeats_fetched_when_not_distinct() {
    let fetcher = TestFetcher::succeeding();
    let spider = TestSpider::new("repeat", &["/"], |identity, item| {
        if item.target().path() == "/" {
            Ok(vec![
                Output::from(request(identity, "/a")),
                Output::from(request(identity, "/a")),
            ])
        } else {
            Ok(vec![])
        }
    });
    let mut config = test_config(2);
    config.scheduler.distinct = false;
    let crawler = start(config, fetcher.clone(), spider, RecordingSink::new("unused"));

    crawler.start_producers();
    run_to_idle(&crawler).await;

    assert_eq!(fetcher.attempts("/a"), 2);
    assert_eq!(crawler.stats().duplicates, 0);

    crawler.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_concurrency_never_exceeds_cap() {
    let seeds: Vec<String> = (0..10).map(|i| format!("/p{}", i)).collect();
    let seed_refs: Vec<&str> = seeds.iter().map(String::as_str).collect();

    let fetcher = TestFetcher::with_delay(Duration::from_millis(100), |item, _| success(item));
    let spider = TestSpider::collecting("wide", &seed_refs);
    let sink = RecordingSink::new("pages");
    let crawler = start(test_config(3), fetcher.clone(), spider, sink.clone());

    crawler.start_producers();
    run_to_idle(&crawler).await;

    assert_eq!(sink.paths().len(), 10);
    assert!(fetcher.peak() <= 3);

    let stats = crawler.stats();
    assert_eq!(stats.peak_in_flight, 3);
    assert_eq!(stats.dispatched, 10);
    assert_eq!(stats.completed, 10);

    crawler.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_overflow_waits_in_queue() {
    let fetcher = TestFetcher::with_delay(Duration::from_secs(1), |item, _| success(item));
    let spider = TestSpider::collecting("slow", &["/1", "/2", "/3"]);
    let crawler = start(test_config(2), fetcher, spider, RecordingSink::new("pages"));

    crawler.start_producers();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let stats = crawler.stats();
    assert_eq!(stats.in_flight, 2);
    assert_eq!(stats.pending, 1);
    assert_eq!(crawler.in_flight_info().len(), 2);
    assert_eq!(crawler.pending_info()[0].target, format!("{}/3", BASE));

    run_to_idle(&crawler).await;
    assert_eq!(crawler.stats().completed, 3);

    crawler.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_request_interval_spaces_dispatches() {
    let fetcher = TestFetcher::succeeding();
    let spider = TestSpider::collecting("spaced", &["/1", "/2", "/3"]);
    let mut config = test_config(5);
    config.scheduler.request_interval = 100;
    let crawler = start(config, fetcher.clone(), spider, RecordingSink::new("pages"));

    let started = Instant::now();
    crawler.start_producers();
    run_to_idle(&crawler).await;

    assert!(started.elapsed() >= Duration::from_millis(200));
    assert_eq!(fetcher.order(), vec!["/1", "/2", "/3"]);

    crawler.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_timeout_budget_bounds_attempts() {
    let fetcher = TestFetcher::new(|_, _| FetchOutcome::timeout());
    let spider = TestSpider::collecting("flaky", &[]);
    let crawler = start(test_config(1), fetcher.clone(), spider, RecordingSink::new("pages"));

    let item = WorkItem::builder(
        format!("{}/slow", BASE),
        tidepool::Callback::new(TestSpider::identity_of("flaky"), "parse"),
    )
    .timeout_retries(2)
    .timeout_wait(Duration::from_millis(100))
    .build()
    .unwrap();
    assert_eq!(crawler.submit_request(item), Some(Admission::Admitted));
    run_to_idle(&crawler).await;

    assert_eq!(fetcher.attempts("/slow"), 3);

    let stats = crawler.stats();
    assert_eq!(stats.retried, 2);
    assert_eq!(stats.abandoned, 1);
    assert_eq!(stats.completed, 0);

    let history = crawler.history(10);
    assert_eq!(history.len(), 3);
    assert!(matches!(
        history.last().map(|e| &e.outcome),
        Some(HistoryOutcome::Abandoned { .. })
    ));

    crawler.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_configured_retry_settings_apply_to_new_items() {
    let seen_timeouts = Arc::new(std::sync::Mutex::new(Vec::new()));
    let seen = seen_timeouts.clone();
    let fetcher = TestFetcher::new(move |item, _| {
        seen.lock().unwrap().push(item.timeout());
        FetchOutcome::timeout()
    });
    let spider = TestSpider::collecting("strict", &[]);
    let mut config = test_config(1);
    config.retry.timeout_retries = 0;
    config.retry.timeout_wait = 20;
    config.retry.request_timeout = 750;
    let crawler = start(config, fetcher.clone(), spider, RecordingSink::new("pages"));

    let identity = TestSpider::identity_of("strict");
    crawler.submit_request(request(&identity, "/once"));
    let explicit = WorkItem::builder(
        format!("{}/twice", BASE),
        tidepool::Callback::new(identity.as_str(), "parse"),
    )
    .timeout_retries(1)
    .build()
    .unwrap();
    crawler.submit_request(explicit);
    run_to_idle(&crawler).await;

    assert_eq!(fetcher.attempts("/once"), 1);
    assert_eq!(fetcher.attempts("/twice"), 2);

    let stats = crawler.stats();
    assert_eq!(stats.abandoned, 2);
    assert_eq!(stats.retried, 1);
    assert!(seen_timeouts
        .lock()
        .unwrap()
        .iter()
        .all(|t| *t == Duration::from_millis(750)));

    crawler.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_jump_in_line_retries_at_head() {
    let fetcher = TestFetcher::new(|item, attempt| {
        if item.target().path() == "/a" && attempt == 1 {
            FetchOutcome::retry(Duration::ZERO, true)
        } else {
            success(item)
        }
    });
    let spider = TestSpider::collecting("order", &["/a", "/b", "/c"]);
    let crawler = start(test_config(1), fetcher.clone(), spider, RecordingSink::new("pages"));

    crawler.start_producers();
    run_to_idle(&crawler).await;

    assert_eq!(fetcher.order(), vec!["/a", "/a", "/b", "/c"]);
    crawler.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_plain_retry_goes_to_tail() {
    let fetcher = TestFetcher::new(|item, attempt| {
        if item.target().path() == "/a" && attempt == 1 {
            FetchOutcome::retry(Duration::ZERO, false)
        } else {
            success(item)
        }
    });
    let spider = TestSpider::collecting("order", &["/a", "/b", "/c"]);
    let crawler = start(test_config(1), fetcher.clone(), spider, RecordingSink::new("pages"));

    crawler.start_producers();
    run_to_idle(&crawler).await;

    assert_eq!(fetcher.order(), vec!["/a", "/b", "/c", "/a"]);
    assert_eq!(crawler.stats().retried, 1);
    crawler.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_fatal_outcome_abandons_item() {
    let fetcher = TestFetcher::new(|item, _| {
        if item.target().path() == "/gone" {
            FetchOutcome::fatal("HTTP 404")
        } else {
            success(item)
        }
    });
    let spider = TestSpider::collecting("mixed", &["/gone", "/here"]);
    let sink = RecordingSink::new("pages");
    let crawler = start(test_config(2), fetcher.clone(), spider, sink.clone());

    crawler.start_producers();
    run_to_idle(&crawler).await;

    assert_eq!(sink.paths(), vec!["/here"]);
    assert_eq!(fetcher.attempts("/gone"), 1);

    let stats = crawler.stats();
    assert_eq!(stats.completed, 1);
    assert_eq!(stats.abandoned, 1);
    assert_eq!(stats.success_rate(), 50.0);

    print_statistics(&stats, &crawler.history(10));
    crawler.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_stopped_execution_outcome_is_stale() {
    let fetcher = TestFetcher::with_delay(Duration::from_secs(1), |item, _| success(item));
    let spider = TestSpider::collecting("stop", &["/long"]);
    let sink = RecordingSink::new("pages");
    let crawler = start(test_config(1), fetcher.clone(), spider, sink.clone());

    crawler.start_producers();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let running = crawler.in_flight_info();
    assert_eq!(running.len(), 1);
    assert!(crawler.stop_item(running[0].id));
    assert!(!crawler.stop_item(running[0].id + 1000));

    run_to_idle(&crawler).await;

    assert_eq!(fetcher.attempts("/long"), 2);
    assert_eq!(sink.paths(), vec!["/long"]);

    let stats = crawler.stats();
    assert_eq!(stats.stale, 1);
    assert_eq!(stats.completed, 1);
    assert_eq!(stats.dispatched, 2);

    crawler.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_producer_failures_do_not_halt_the_crawl() {
    let fetcher = TestFetcher::succeeding();
    let spider = TestSpider::new("fragile", &["/boom", "/panic", "/ok"], |_, item| {
        match item.target().path() {
            "/boom" => Err(ProducerError::Other("bad markup".to_string())),
            "/panic" => panic!("producer bug"),
            _ => Ok(vec![Output::from(page_artifact(item))]),
        }
    });
    let sink = RecordingSink::new("pages");
    let crawler = start(test_config(3), fetcher, spider, sink.clone());

    crawler.start_producers();
    run_to_idle(&crawler).await;

    assert_eq!(sink.paths(), vec!["/ok"]);
    assert_eq!(crawler.stats().completed, 3);

    crawler.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_unregistered_producer_is_rejected() {
    let crawler = start(
        test_config(1),
        TestFetcher::succeeding(),
        TestSpider::collecting("known", &[]),
        RecordingSink::new("pages"),
    );

    let report = crawler.submit(vec![Output::from(request("Ghost|x", "/x"))], None);
    assert_eq!(report.rejected, 1);
    assert_eq!(report.admitted, 0);
    assert_eq!(crawler.submit_request(request("Ghost|x", "/y")), None);
    assert_eq!(crawler.stats().pending, 0);

    crawler.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_paused_scheduler_holds_work() {
    let fetcher = TestFetcher::succeeding();
    let spider = TestSpider::collecting("held", &["/1", "/2"]);
    let mut config = test_config(2);
    config.scheduler.start_paused = true;
    let crawler = start(config, fetcher.clone(), spider, RecordingSink::new("pages"));

    assert!(crawler.is_paused());
    crawler.start_producers();
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(fetcher.order().is_empty());
    assert_eq!(crawler.stats().pending, 2);

    crawler.resume();
    run_to_idle(&crawler).await;
    assert_eq!(fetcher.order().len(), 2);

    crawler.shutdown().await;
}

fn artifacts(paths: &[&str]) -> Vec<Output> {
    paths
        .iter()
        .map(|p| Output::from(Artifact::new(json!({ "path": p }))))
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_sink_errors_continue_by_default() {
    let failing = RecordingSink::refusing("failing", "/2");
    let healthy = RecordingSink::new("healthy");
    let crawler = Crawler::builder(test_config(1))
        .fetcher(TestFetcher::succeeding())
        .sink(failing.clone())
        .sink(healthy.clone())
        .build()
        .unwrap();

    let report = crawler.submit(artifacts(&["/1", "/2", "/3"]), None);
    assert_eq!(report.artifacts, 3);
    crawler.flush_sinks().await;

    assert_eq!(failing.paths(), vec!["/1", "/3"]);
    assert_eq!(healthy.paths(), vec!["/1", "/2", "/3"]);

    crawler.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_sink_stop_policy_silences_failing_sink() {
    let failing = RecordingSink::refusing("failing", "/2");
    let healthy = RecordingSink::new("healthy");
    let mut config = test_config(1);
    config.sinks.error_policy = SinkErrorPolicy::Stop;
    let crawler = Crawler::builder(config)
        .fetcher(TestFetcher::succeeding())
        .sink(failing.clone())
        .sink(healthy.clone())
        .build()
        .unwrap();

    crawler.submit(artifacts(&["/1", "/2", "/3"]), None);
    crawler.flush_sinks().await;

    assert_eq!(failing.paths(), vec!["/1"]);
    assert_eq!(healthy.paths(), vec!["/1", "/2", "/3"]);

    crawler.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_wait_after_shutdown_errors() {
    let mut config = test_config(1);
    config.scheduler.start_paused = true;
    let crawler = start(
        config,
        TestFetcher::succeeding(),
        TestSpider::collecting("late", &["/1"]),
        RecordingSink::new("pages"),
    );
    crawler.start_producers();
    crawler.shutdown().await;

    assert!(matches!(crawler.wait_idle().await, Err(TidepoolError::ShutDown)));
    assert!(matches!(
        crawler.save("unused", Default::default()).await,
        Err(TidepoolError::ShutDown)
    ));
}

#[test]
fn test_build_requires_runtime() {
    let result = Crawler::builder(test_config(1))
        .fetcher(TestFetcher::succeeding())
        .build();
    assert!(matches!(result, Err(TidepoolError::NoRuntime)));
}
