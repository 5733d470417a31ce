mod utils;
#[allow(unused)]
use utils::*;

use barrage::{FailureKind, InvalidConfigError, StatusClass};
use barrage::prelude::*;
use mock_service::MockService;
use std::collections::BTreeMap;
use std::time::Duration;

#[tokio::test]
#[ntest::timeout(20_000)]
async fn paced_run_against_fast_endpoint() {
    init();
    let service = MockService::spawn().await.unwrap();

    let config = RunConfig::new(service.url("/delay/ms/10"))
        .qps(5)
        .concurrency(10)
        .duration(Duration::from_secs(2));
    let results = start_run(config).unwrap().await.unwrap();
    let report = build_report(&results).unwrap();

    let total = report.total_requests;
    assert!((5..=15).contains(&total), "total = {total}");
    assert_eq!(report.error_rate, 0.);
    assert_eq!(report.status_codes, BTreeMap::from([(200, total)]));
    assert_eq!(report.latencies.len() as u64, total);
    assert!(report.latency.min >= 10.);
    assert!(report.latency.p50 <= report.latency.p99);
    assert_eq!(service.hits(), total);
}

#[tokio::test]
#[ntest::timeout(20_000)]
async fn unreachable_target_fails_every_request() {
    init();
    let addr = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap()
    };

    let config = RunConfig::new(format!("http://{addr}/"))
        .qps(5)
        .duration(Duration::from_secs(1));
    let results = start_run(config).unwrap().await.unwrap();
    let report = build_report(&results).unwrap();

    assert!(report.total_requests > 0);
    assert_eq!(report.error_rate, 1.);
    assert_eq!(report.failure_count, report.total_requests);
    assert_eq!(
        report.failures,
        BTreeMap::from([(FailureKind::Connect, report.total_requests)])
    );
    assert!(report.status_codes.is_empty());
    assert!(report.latencies.is_empty());
    assert_eq!(report.latency.p99, 0.);
}

#[tokio::test]
#[ntest::timeout(20_000)]
async fn concurrency_ceiling_holds_at_the_server() {
    init();
    let service = MockService::spawn().await.unwrap();

    let config = RunConfig::new(service.url("/delay/ms/300"))
        .qps(100)
        .concurrency(3)
        .duration(Duration::from_secs(1));
    let results = start_run(config).unwrap().await.unwrap();

    assert!(service.peak_in_flight() <= 3, "{:?}", service.stats());
    assert!(results.peak_concurrency <= 3);
    assert_eq!(service.stats().in_flight, 0);
    // 3 at a time at ~300ms each leaves room for roughly a dozen requests, not a hundred.
    assert!(results.total() <= 20, "total = {}", results.total());
    assert_eq!(results.failure_count(), 0);
}

#[tokio::test]
#[ntest::timeout(20_000)]
async fn error_statuses_count_as_successes() {
    init();
    let service = MockService::spawn().await.unwrap();

    for code in [404u16, 503] {
        let config = RunConfig::new(service.url(&format!("/status/{code}/delay/ms/1")))
            .qps(5)
            .duration(Duration::from_secs(1));
        let results = start_run(config).unwrap().await.unwrap();
        let report = build_report(&results).unwrap();

        assert_eq!(report.error_rate, 0.);
        assert_eq!(report.status_codes, BTreeMap::from([(code, report.total_requests)]));
        assert_eq!(report.status_classes().len(), 1);
    }

    let config = RunConfig::new(service.url("/status/404/delay/ms/1"))
        .qps(5)
        .duration(Duration::from_secs(1));
    let report = build_report(&start_run(config).unwrap().await.unwrap()).unwrap();
    assert_eq!(
        report.status_classes(),
        BTreeMap::from([(StatusClass::ClientError, report.total_requests)])
    );
}

#[tokio::test]
#[ntest::timeout(20_000)]
async fn rate_limited_responses_count_as_successes() {
    init();
    let service = MockService::spawn().await.unwrap();

    let config = RunConfig::new(service.url("/limited/1/delay/ms/0"))
        .qps(5)
        .duration(Duration::from_secs(2));
    let report = build_report(&start_run(config).unwrap().await.unwrap()).unwrap();

    assert_eq!(report.error_rate, 0.);
    assert_eq!(report.failure_count, 0);
    let ok = report.status_codes.get(&200).copied().unwrap_or_default();
    let limited = report.status_codes.get(&429).copied().unwrap_or_default();
    assert!(ok >= 1, "{:?}", report.status_codes);
    assert!(limited >= 1, "{:?}", report.status_codes);
    assert_eq!(ok + limited, report.total_requests, "{:?}", report.status_codes);
    assert_eq!(
        report.status_classes(),
        BTreeMap::from([
            (StatusClass::Success, ok),
            (StatusClass::ClientError, limited)
        ])
    );
    assert_eq!(service.hits(), report.total_requests);
}

#[tokio::test]
#[ntest::timeout(20_000)]
async fn post_sends_headers_and_body() {
    init();
    let service = MockService::spawn().await.unwrap();

    let config = RunConfig::new(service.url("/echo"))
        .method("POST")
        .header("Content-Type", "application/json")
        .header("X-Run", "barrage")
        .body(r#"{"key": "value"}"#)
        .qps(5)
        .duration(Duration::from_secs(1));
    let results = start_run(config).unwrap().await.unwrap();
    assert_eq!(results.failure_count(), 0);

    let captured = service.captured();
    assert_eq!(captured.len() as u64, results.total());
    for request in captured {
        assert_eq!(request.method.as_str(), "POST");
        assert_eq!(request.headers["content-type"], "application/json");
        assert_eq!(request.headers["x-run"], "barrage");
        assert_eq!(&request.body[..], br#"{"key": "value"}"#);
    }
}

#[tokio::test]
async fn invalid_config_sends_nothing() {
    init();
    let service = MockService::spawn().await.unwrap();

    let err = start_run(RunConfig::new(service.url("/delay/ms/1")).qps(0))
        .err()
        .unwrap();
    assert!(matches!(
        err,
        barrage::Error::InvalidConfig(InvalidConfigError::Qps(0))
    ));

    let err = start_run(
        RunConfig::new(service.url("/delay/ms/1")).duration(Duration::from_millis(10)),
    )
    .err()
    .unwrap();
    assert!(matches!(
        err,
        barrage::Error::InvalidConfig(InvalidConfigError::Duration(_))
    ));

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(service.hits(), 0);
}

#[test]
fn empty_results_have_no_report() {
    assert_eq!(build_report(&RunResults::default()), Err(NoData));
}

#[tokio::test]
#[ntest::timeout(20_000)]
async fn report_json_uses_expected_keys() {
    init();
    let service = MockService::spawn().await.unwrap();

    let config = RunConfig::new(service.url("/delay/ms/5"))
        .qps(5)
        .duration(Duration::from_secs(1));
    let report = build_report(&start_run(config).unwrap().await.unwrap()).unwrap();
    let json = serde_json::to_value(&report).unwrap();

    for key in [
        "total_requests",
        "error_rate",
        "avg_latency",
        "median_latency",
        "min_latency",
        "max_latency",
        "p50_latency",
        "p90_latency",
        "p95_latency",
        "p99_latency",
        "latencies",
        "status_codes",
        "elapsed_secs",
        "achieved_qps",
        "peak_concurrency",
    ] {
        assert!(json.get(key).is_some(), "missing {key} in {json}");
    }
    assert_eq!(json["status_codes"]["200"], report.total_requests);
}

#[tokio::test]
#[ntest::timeout(20_000)]
async fn metrics_are_exported() {
    let prometheus = init();
    let service = MockService::spawn().await.unwrap();

    let config = RunConfig::new(service.url("/delay/ms/1"))
        .qps(5)
        .duration(Duration::from_secs(1));
    start_run(config).unwrap().await.unwrap();

    let rendered = prometheus.render();
    assert!(rendered.contains("barrage_request_success"), "{rendered}");
    assert!(rendered.contains("barrage_request_latency_ms"), "{rendered}");
}

#[cfg(feature = "integration")]
mod integration {
    use super::*;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    #[ntest::timeout(60_000)]
    async fn sustains_high_rate() {
        init();
        let service = MockService::spawn().await.unwrap();

        let config = RunConfig::new(service.url("/delay/ms/5"))
            .qps(1_000)
            .concurrency(200)
            .duration(Duration::from_secs(10));
        let report = build_report(&start_run(config).unwrap().await.unwrap()).unwrap();

        assert!(dbg!(report.achieved_qps) >= 900.);
        assert!(dbg!(report.achieved_qps) <= 1_050.);
        assert_eq!(report.error_rate, 0.);
    }
}
