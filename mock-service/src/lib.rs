use axum::{
    body::Bytes,
    debug_handler,
    extract::{Path, State},
    http::{HeaderMap, Method, StatusCode},
    routing::{any, get},
    Json, Router,
};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use metrics::counter;
use serde::Serialize;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::{
    num::NonZeroU32,
    sync::{
        atomic::{AtomicU64, AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
#[allow(unused)]
use tracing::{debug, error, info};

/// Shared bookkeeping for one mock service instance.
#[derive(Default)]
pub struct MockState {
    hits: AtomicU64,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    captured: Mutex<Vec<CapturedRequest>>,
    limiters: Mutex<HashMap<u32, Arc<DefaultDirectRateLimiter>>>,
}

/// A request as seen by the `/echo` route.
#[derive(Clone, Debug)]
pub struct CapturedRequest {
    pub method: Method,
    pub headers: HeaderMap,
    pub body: Bytes,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Stats {
    pub hits: u64,
    pub in_flight: usize,
    pub peak_in_flight: usize,
}

impl MockState {
    fn enter(self: &Arc<Self>) -> InFlight {
        counter!("mock_service.requests").increment(1);
        self.hits.fetch_add(1, Ordering::Relaxed);
        let now = self.in_flight.fetch_add(1, Ordering::AcqRel) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::AcqRel);
        InFlight(self.clone())
    }

    pub fn stats(&self) -> Stats {
        Stats {
            hits: self.hits.load(Ordering::Relaxed),
            in_flight: self.in_flight.load(Ordering::Acquire),
            peak_in_flight: self.peak_in_flight.load(Ordering::Acquire),
        }
    }

    fn limiter(&self, max_qps: NonZeroU32) -> Arc<DefaultDirectRateLimiter> {
        let mut limiters = self.limiters.lock().unwrap_or_else(|e| e.into_inner());
        limiters
            .entry(max_qps.get())
            .or_insert_with(|| Arc::new(rate_limiter(max_qps)))
            .clone()
    }
}

struct InFlight(Arc<MockState>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}

pub fn router(state: Arc<MockState>) -> Router {
    Router::new()
        .route("/delay/ms/:delay_ms", any(delay))
        .route("/status/:code/delay/ms/:delay_ms", any(status))
        .route("/limited/:max_qps/delay/ms/:delay_ms", any(limited))
        .route("/echo", any(echo))
        .route("/stats", get(stats))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the mock routes on `addr` until the process exits.
pub async fn run(addr: SocketAddr) -> anyhow::Result<()> {
    let state = Arc::new(MockState::default());
    tokio::spawn(qps_measure_task(state.clone()));

    let listener = TcpListener::bind(&addr).await?;
    info!("Mock service listening on {}", listener.local_addr()?);
    axum::serve(listener, router(state)).await?;
    Ok(())
}

/// An in-process instance bound to an ephemeral port. The server stops when this is dropped.
pub struct MockService {
    addr: SocketAddr,
    state: Arc<MockState>,
    task: JoinHandle<()>,
}

impl MockService {
    pub async fn spawn() -> anyhow::Result<Self> {
        let state = Arc::new(MockState::default());
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let app = router(state.clone());
        let task = tokio::spawn(async move {
            if let Err(err) = axum::serve(listener, app).await {
                error!("Mock service stopped: {err}");
            }
        });
        debug!("Mock service spawned on {addr}");

        Ok(Self { addr, state, task })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn stats(&self) -> Stats {
        self.state.stats()
    }

    pub fn hits(&self) -> u64 {
        self.stats().hits
    }

    pub fn peak_in_flight(&self) -> usize {
        self.stats().peak_in_flight
    }

    /// Every request the `/echo` route has seen, oldest first.
    pub fn captured(&self) -> Vec<CapturedRequest> {
        self.state
            .captured
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl Drop for MockService {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[debug_handler]
async fn delay(State(state): State<Arc<MockState>>, Path(delay_ms): Path<u64>) {
    let _in_flight = state.enter();
    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
}

#[debug_handler]
async fn status(
    State(state): State<Arc<MockState>>,
    Path((code, delay_ms)): Path<(u16, u64)>,
) -> StatusCode {
    let _in_flight = state.enter();
    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    StatusCode::from_u16(code).unwrap_or(StatusCode::BAD_REQUEST)
}

#[debug_handler]
async fn limited(
    State(state): State<Arc<MockState>>,
    Path((max_qps, delay_ms)): Path<(u32, u64)>,
) -> Result<(), StatusCode> {
    let _in_flight = state.enter();
    let max_qps = NonZeroU32::new(max_qps).ok_or(StatusCode::BAD_REQUEST)?;
    tokio::time::sleep(Duration::from_millis(delay_ms)).await;

    match state.limiter(max_qps).check() {
        Ok(_) => Ok(()),
        Err(_) => {
            debug!("Over {max_qps} QPS; rejecting");
            Err(StatusCode::TOO_MANY_REQUESTS)
        }
    }
}

#[debug_handler]
async fn echo(
    State(state): State<Arc<MockState>>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> Bytes {
    let _in_flight = state.enter();
    state
        .captured
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .push(CapturedRequest {
            method,
            headers,
            body: body.clone(),
        });
    body
}

async fn stats(State(state): State<Arc<MockState>>) -> Json<Stats> {
    Json(state.stats())
}

/** Utils **/

pub fn rate_limiter(qps: NonZeroU32) -> DefaultDirectRateLimiter {
    RateLimiter::direct(Quota::per_second(qps))
}

/** QPS Printer **/

pub async fn qps_measure_task(state: Arc<MockState>) {
    let mut last = 0;
    loop {
        tokio::time::sleep(Duration::from_millis(1000)).await;
        let hits = state.stats().hits;
        info!("{} QPS", hits - last);
        last = hits;
    }
}
