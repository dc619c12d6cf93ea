//! Resilience facade around problem fetches.

use std::error::Error;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::store::{Cache, StoreError};

use super::breaker::{BreakerError, CircuitBreaker, CircuitState};
use super::limiter::{CounterStore, LimiterError, SlidingWindowLimiter};
use super::queue::{BackpressureQueue, QueuedFetch};

/// Error type for the raw outbound call.
///
/// The transport contract: an HTTP 200 carrying a JSON object is
/// success, anything else is a failure for breaker and limiter
/// accounting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// Non-200 response.
    Status(u16),
    /// The call never completed.
    Transport(String),
    /// The response body was not a JSON object.
    Malformed(String),
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchError::Status(code) => write!(f, "unexpected status: {}", code),
            FetchError::Transport(msg) => write!(f, "transport error: {}", msg),
            FetchError::Malformed(msg) => write!(f, "malformed response: {}", msg),
        }
    }
}

impl Error for FetchError {}

/// The raw call to the problem-management service.
///
/// The HTTP client lives outside this crate; tests plug in fakes.
pub trait ProblemFetcher: Send + Sync {
    fn fetch_problem(&self, problem_id: u64) -> Result<serde_json::Value, FetchError>;
}

/// Error type for facade fetches.
#[derive(Debug)]
pub enum FacadeError {
    /// The downstream is unavailable and no cached copy exists.
    Unavailable,
    /// Admission was denied; the request is queued for the drain loop.
    /// A flow-control signal, not a hard failure.
    RateLimited,
    /// The rate limiter could not decide.
    Limiter(LimiterError),
    /// Local queue or cache storage failed.
    Store(StoreError),
    /// The breaker is closed and the call failed; the caller may retry.
    Upstream(FetchError),
}

impl fmt::Display for FacadeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FacadeError::Unavailable => {
                write!(f, "service unavailable and no cached data found")
            }
            FacadeError::RateLimited => write!(f, "rate limit exceeded, request queued"),
            FacadeError::Limiter(e) => write!(f, "{}", e),
            FacadeError::Store(e) => write!(f, "{}", e),
            FacadeError::Upstream(e) => write!(f, "{}", e),
        }
    }
}

impl Error for FacadeError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            FacadeError::Limiter(e) => Some(e),
            FacadeError::Store(e) => Some(e),
            FacadeError::Upstream(e) => Some(e),
            _ => None,
        }
    }
}

impl From<LimiterError> for FacadeError {
    fn from(err: LimiterError) -> Self {
        FacadeError::Limiter(err)
    }
}

impl From<StoreError> for FacadeError {
    fn from(err: StoreError) -> Self {
        FacadeError::Store(err)
    }
}

/// Breaker, limiter, backpressure queue, and cache fallback composed
/// around one outbound request shape.
///
/// The fetch path, in order:
/// 1. Breaker open: serve from cache or fail with
///    [`FacadeError::Unavailable`]; the downstream is never touched.
/// 2. Ask the limiter for real admission. Denied: queue the request and
///    return [`FacadeError::RateLimited`], signalling deferred
///    completion.
/// 3. Admitted: call through the breaker. Success lands in the cache
///    with a TTL and is returned.
/// 4. Failure with the breaker closed surfaces the raw error; with the
///    breaker open or half-open the cache fallback from step 1 applies.
pub struct ProblemFacade<F, C> {
    fetcher: F,
    breaker: CircuitBreaker,
    limiter: SlidingWindowLimiter<C>,
    queue: Arc<BackpressureQueue>,
    cache: Arc<dyn Cache>,
    cache_ttl: Duration,
}

impl<F, C> ProblemFacade<F, C> {
    pub fn new(
        fetcher: F,
        breaker: CircuitBreaker,
        limiter: SlidingWindowLimiter<C>,
        queue: Arc<BackpressureQueue>,
        cache: Arc<dyn Cache>,
    ) -> Self {
        Self {
            fetcher,
            breaker,
            limiter,
            queue,
            cache,
            cache_ttl: Duration::from_secs(600),
        }
    }

    /// Cache lifetime for fetched problems.
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// The limiter, for check-only probes by the drain loop.
    pub fn limiter(&self) -> &SlidingWindowLimiter<C> {
        &self.limiter
    }

    /// The backpressure queue feeding the drain loop.
    pub fn queue(&self) -> &Arc<BackpressureQueue> {
        &self.queue
    }

    /// The breaker's current state.
    pub fn breaker_state(&self) -> CircuitState {
        self.breaker.state()
    }
}

impl<F: ProblemFetcher, C: CounterStore> ProblemFacade<F, C> {
    pub fn fetch(
        &self,
        problem_id: u64,
        counterparty: &str,
    ) -> Result<serde_json::Value, FacadeError> {
        let cache_key = format!("problem:{}", problem_id);

        if self.breaker.state() == CircuitState::Open {
            debug!(problem_id, counterparty, "breaker open, trying cache");
            return self.from_cache(&cache_key);
        }

        if !self.limiter.admit(counterparty, false)? {
            self.queue
                .enqueue(counterparty, QueuedFetch { problem_id })?;
            debug!(problem_id, counterparty, "admission denied, request queued");
            return Err(FacadeError::RateLimited);
        }

        match self.breaker.call(|| self.fetcher.fetch_problem(problem_id)) {
            Ok(problem) => {
                if let Err(err) = self.cache.set(&cache_key, &problem.to_string(), self.cache_ttl)
                {
                    warn!(problem_id, error = %err, "failed to cache problem");
                }
                Ok(problem)
            }
            Err(BreakerError::Open) => self.from_cache(&cache_key),
            Err(BreakerError::Inner(err)) => {
                if self.breaker.state() == CircuitState::Closed {
                    Err(FacadeError::Upstream(err))
                } else {
                    warn!(problem_id, counterparty, error = %err,
                        "fetch failed with breaker degraded, trying cache");
                    self.from_cache(&cache_key)
                }
            }
        }
    }

    fn from_cache(&self, cache_key: &str) -> Result<serde_json::Value, FacadeError> {
        let cached = match self.cache.get(cache_key) {
            Ok(cached) => cached,
            Err(err) => {
                // A broken cache reads as a miss, the same as the
                // downstream being gone.
                warn!(cache_key, error = %err, "cache read failed");
                None
            }
        };

        cached
            .and_then(|body| serde_json::from_str(&body).ok())
            .ok_or(FacadeError::Unavailable)
    }
}
