//! Sync/async concurrency bridge
//!
//! Lets synchronous module code run bounded-concurrency async operations
//! (HTTP, DNS) on a persistent background event loop. Callers submit work
//! and block up to a wait ceiling; each module instance owns a bounded
//! semaphore limiting its in-flight operations, and every wrapped call
//! returns a uniform success/failure envelope instead of raising.

use futures::future::FutureExt;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::any::Any;
use std::future::Future;
use std::net::IpAddr;
use std::panic::AssertUnwindSafe;
use std::sync::mpsc::RecvTimeoutError;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::runtime::Runtime;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

/// Default wait ceiling for one submitted operation.
pub const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(300);

/// Default per-module in-flight operation bound.
pub const DEFAULT_PERMITS: usize = 10;

/// Bridge-level errors
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("bridge initialization failed: {0}")]
    Init(String),

    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("operation panicked: {0}")]
    Panicked(String),
}

/// Outcome envelope for one bridged operation: success data xor an error
/// string, plus the elapsed duration.
#[derive(Debug, Clone, Serialize)]
pub struct AsyncResult<T> {
    /// Success payload
    pub data: Option<T>,
    /// Failure message
    pub error: Option<String>,
    /// Elapsed wall-clock time, including queueing on the limiter
    pub duration: Duration,
}

impl<T> AsyncResult<T> {
    fn success(data: T, duration: Duration) -> Self {
        Self {
            data: Some(data),
            error: None,
            duration,
        }
    }

    fn failure(error: String, duration: Duration) -> Self {
        Self {
            data: None,
            error: Some(error),
            duration,
        }
    }

    /// Whether the operation succeeded.
    pub fn ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Per-caller bounded concurrency limiter. Excess operations wait for a
/// permit, they never fail.
#[derive(Debug, Clone)]
pub struct ConcurrencyLimiter {
    permits: usize,
    semaphore: Arc<Semaphore>,
}

impl ConcurrencyLimiter {
    /// Create a limiter with the given permit count (minimum 1).
    pub fn new(permits: usize) -> Self {
        let permits = permits.max(1);
        Self {
            permits,
            semaphore: Arc::new(Semaphore::new(permits)),
        }
    }

    /// Configured permit count.
    pub fn permits(&self) -> usize {
        self.permits
    }
}

impl Default for ConcurrencyLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_PERMITS)
    }
}

/// Request for the HTTP fetch wrapper.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    /// Absolute URL to fetch
    pub url: String,
    /// Per-request HTTP timeout
    pub timeout: Duration,
    /// Optional User-Agent override
    pub user_agent: Option<String>,
}

impl FetchRequest {
    /// Request with a 30 second HTTP timeout.
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            timeout: Duration::from_secs(30),
            user_agent: None,
        }
    }
}

/// Fetched HTTP response, body decoded as text.
#[derive(Debug, Clone, Serialize)]
pub struct FetchedPage {
    /// HTTP status code
    pub status: u16,
    /// Content-Type header, if present
    pub content_type: Option<String>,
    /// Response body
    pub body: String,
}

/// The sync/async bridge.
///
/// Owns a long-lived tokio runtime whose worker thread is the persistent
/// background event loop; synchronous callers submit futures and block up
/// to a bound for the result. Once submitted, work runs to completion or
/// its own timeout; there is no cooperative cancellation.
#[derive(Debug)]
pub struct AsyncBridge {
    runtime: Runtime,
    client: reqwest::Client,
}

static SHARED: OnceLock<Arc<AsyncBridge>> = OnceLock::new();

impl AsyncBridge {
    /// Create a bridge with its own background runtime. Prefer
    /// [`AsyncBridge::shared`] outside of tests.
    pub fn new() -> Result<Self, BridgeError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("osprey-bridge")
            .enable_all()
            .build()
            .map_err(|e| BridgeError::Init(e.to_string()))?;
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| BridgeError::Init(e.to_string()))?;
        Ok(Self { runtime, client })
    }

    /// The process-lifetime bridge, created lazily on first use.
    pub fn shared() -> Result<Arc<AsyncBridge>, BridgeError> {
        if let Some(bridge) = SHARED.get() {
            return Ok(Arc::clone(bridge));
        }
        let bridge = Arc::new(AsyncBridge::new()?);
        Ok(Arc::clone(SHARED.get_or_init(|| bridge)))
    }

    /// Submit a future to the background loop and block up to `wait` for
    /// its result. Expiry yields [`BridgeError::Timeout`]; the submitted
    /// work keeps running regardless.
    pub fn run<F, T>(&self, wait: Duration, future: F) -> Result<T, BridgeError>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = std::sync::mpsc::sync_channel(1);
        self.runtime.handle().spawn(async move {
            let _ = tx.send(future.await);
        });
        match rx.recv_timeout(wait) {
            Ok(value) => Ok(value),
            Err(RecvTimeoutError::Timeout) => {
                warn!("bridged operation missed its {:?} wait ceiling", wait);
                Err(BridgeError::Timeout(wait))
            }
            Err(RecvTimeoutError::Disconnected) => Err(BridgeError::Panicked(
                "task ended before sending a result".to_string(),
            )),
        }
    }

    /// Run a fallible future under the caller's limiter and convert every
    /// outcome (error, panic, timeout) into an [`AsyncResult`]; this never
    /// raises across the bridge.
    pub fn call<F, T, E>(
        &self,
        limiter: &ConcurrencyLimiter,
        wait: Duration,
        future: F,
    ) -> AsyncResult<T>
    where
        F: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: std::fmt::Display + Send + 'static,
    {
        let started = Instant::now();
        let semaphore = Arc::clone(&limiter.semaphore);
        let wrapped = async move {
            let _permit = semaphore.acquire_owned().await.ok();
            AssertUnwindSafe(future).catch_unwind().await
        };
        match self.run(wait, wrapped) {
            Ok(Ok(Ok(value))) => AsyncResult::success(value, started.elapsed()),
            Ok(Ok(Err(e))) => AsyncResult::failure(e.to_string(), started.elapsed()),
            Ok(Err(panic)) => AsyncResult::failure(panic_message(panic), started.elapsed()),
            Err(e) => AsyncResult::failure(e.to_string(), started.elapsed()),
        }
    }

    /// Fan a handler out over `items` under a call-scoped concurrency cap,
    /// on top of the caller's limiter. Every item's outcome is preserved in
    /// original input order; one item's failure never cancels or discards
    /// the others.
    pub fn run_batch<I, T, E, F, Fut>(
        &self,
        limiter: &ConcurrencyLimiter,
        wait: Duration,
        concurrency: usize,
        items: Vec<I>,
        handler: F,
    ) -> Vec<AsyncResult<T>>
    where
        I: Send + 'static,
        T: Send + 'static,
        E: std::fmt::Display + Send + 'static,
        F: Fn(I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let count = items.len();
        if count == 0 {
            return Vec::new();
        }
        let concurrency = concurrency.max(1);
        let started = Instant::now();
        let semaphore = Arc::clone(&limiter.semaphore);
        let handler = Arc::new(handler);
        debug!(items = count, concurrency, "running bridged batch");

        let item_futures = items.into_iter().map(move |item| {
            let handler = Arc::clone(&handler);
            let semaphore = Arc::clone(&semaphore);
            async move {
                let item_started = Instant::now();
                let _permit = semaphore.acquire_owned().await.ok();
                match AssertUnwindSafe(handler(item)).catch_unwind().await {
                    Ok(Ok(value)) => AsyncResult::success(value, item_started.elapsed()),
                    Ok(Err(e)) => AsyncResult::failure(e.to_string(), item_started.elapsed()),
                    Err(panic) => {
                        AsyncResult::failure(panic_message(panic), item_started.elapsed())
                    }
                }
            }
        });
        let batch = stream::iter(item_futures)
            .buffered(concurrency)
            .collect::<Vec<_>>();

        match self.run(wait, batch) {
            Ok(results) => results,
            Err(e) => {
                let message = e.to_string();
                (0..count)
                    .map(|_| AsyncResult::failure(message.clone(), started.elapsed()))
                    .collect()
            }
        }
    }

    /// HTTP fetch wrapper: uniform envelope, never raises.
    pub fn fetch_url(
        &self,
        limiter: &ConcurrencyLimiter,
        wait: Duration,
        request: FetchRequest,
    ) -> AsyncResult<FetchedPage> {
        let client = self.client.clone();
        self.call(limiter, wait, async move {
            let mut builder = client.get(&request.url).timeout(request.timeout);
            if let Some(agent) = &request.user_agent {
                builder = builder.header(reqwest::header::USER_AGENT, agent);
            }
            let response = builder.send().await.map_err(|e| e.to_string())?;
            let status = response.status().as_u16();
            let content_type = response
                .headers()
                .get(reqwest::header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(String::from);
            let body = response.text().await.map_err(|e| e.to_string())?;
            Ok::<_, String>(FetchedPage {
                status,
                content_type,
                body,
            })
        })
    }

    /// DNS resolve wrapper: uniform envelope, never raises.
    pub fn resolve_host(
        &self,
        limiter: &ConcurrencyLimiter,
        wait: Duration,
        host: String,
    ) -> AsyncResult<Vec<IpAddr>> {
        self.call(limiter, wait, async move {
            let addrs = tokio::net::lookup_host((host.as_str(), 0u16))
                .await
                .map_err(|e| e.to_string())?;
            let mut ips: Vec<IpAddr> = addrs.map(|addr| addr.ip()).collect();
            ips.sort();
            ips.dedup();
            Ok::<_, String>(ips)
        })
    }
}

/// Per-module view of the bridge: a shared bridge reference, the module's
/// own limiter, and the configured wait ceiling.
#[derive(Debug, Clone)]
pub struct BridgeHandle {
    bridge: Arc<AsyncBridge>,
    limiter: ConcurrencyLimiter,
    max_wait: Duration,
}

impl BridgeHandle {
    /// Create a handle with a fresh limiter of `permits` permits.
    pub fn new(bridge: Arc<AsyncBridge>, permits: usize, max_wait: Duration) -> Self {
        Self {
            bridge,
            limiter: ConcurrencyLimiter::new(permits),
            max_wait,
        }
    }

    /// This module's limiter.
    pub fn limiter(&self) -> &ConcurrencyLimiter {
        &self.limiter
    }

    /// Run one fallible operation under this module's limiter.
    pub fn call<F, T, E>(&self, future: F) -> AsyncResult<T>
    where
        F: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: std::fmt::Display + Send + 'static,
    {
        self.bridge.call(&self.limiter, self.max_wait, future)
    }

    /// Fan a handler out over items under a call-scoped cap.
    pub fn run_batch<I, T, E, F, Fut>(
        &self,
        concurrency: usize,
        items: Vec<I>,
        handler: F,
    ) -> Vec<AsyncResult<T>>
    where
        I: Send + 'static,
        T: Send + 'static,
        E: std::fmt::Display + Send + 'static,
        F: Fn(I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        self.bridge
            .run_batch(&self.limiter, self.max_wait, concurrency, items, handler)
    }

    /// Fetch a URL through the bridge.
    pub fn fetch_url(&self, request: FetchRequest) -> AsyncResult<FetchedPage> {
        self.bridge.fetch_url(&self.limiter, self.max_wait, request)
    }

    /// Resolve a hostname through the bridge.
    pub fn resolve_host(&self, host: &str) -> AsyncResult<Vec<IpAddr>> {
        self.bridge
            .resolve_host(&self.limiter, self.max_wait, host.to_string())
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("operation panicked: {}", message)
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("operation panicked: {}", message)
    } else {
        "operation panicked".to_string()
    }
}
