use lru::LruCache;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::{
    num::NonZeroUsize,
    sync::{Arc, Mutex, PoisonError, RwLock},
    time::Duration,
};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::errors::{constants::*, Result, TtsError};

const REGEX_CACHE_CAPACITY: NonZeroUsize = match NonZeroUsize::new(DEFAULT_CACHE_SIZE) {
    Some(capacity) => capacity,
    None => NonZeroUsize::MIN,
};

/// Regex compilation cache to avoid recompiling the same patterns
static REGEX_CACHE: Lazy<RwLock<LruCache<String, Regex>>> =
    Lazy::new(|| RwLock::new(LruCache::new(REGEX_CACHE_CAPACITY)));

/// Circuit breaker states for provider calls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CircuitBreakerState {
    Closed,
    Open,
    HalfOpen,
}

/// Outcome of asking a breaker for permission to call its provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allowed,
    /// The single trial call allowed while half-open.
    Probe,
    Rejected,
}

/// Circuit breaker for handling provider failures.
///
/// Only service failures should be reported through [`CircuitBreaker::on_failure`];
/// rejected input is released with [`CircuitBreaker::release`] and leaves the
/// counter untouched.
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    pub name: String,
    pub state: CircuitBreakerState,
    pub failure_count: u32,
    pub last_failure_time: Option<Instant>,
    pub threshold: u32,
    pub timeout: Duration,
    probe_in_flight: bool,
    /// Bumped every time the breaker opens.
    generation: u64,
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            state: CircuitBreakerState::Closed,
            failure_count: 0,
            last_failure_time: None,
            threshold: CIRCUIT_BREAKER_FAILURE_THRESHOLD,
            timeout: Duration::from_secs(CIRCUIT_BREAKER_TIMEOUT_SECS),
            probe_in_flight: false,
            generation: 0,
        }
    }
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, threshold: u32, timeout: Duration) -> Self {
        Self {
            name: name.into(),
            threshold: threshold.max(1),
            timeout,
            ..Default::default()
        }
    }

    fn timeout_elapsed(&self) -> bool {
        match self.last_failure_time {
            Some(last_failure) => last_failure.elapsed() >= self.timeout,
            None => true,
        }
    }

    /// Read-only check; does not move the breaker into HalfOpen.
    pub fn can_execute(&self) -> bool {
        match self.state {
            CircuitBreakerState::Closed => true,
            CircuitBreakerState::Open => self.timeout_elapsed(),
            CircuitBreakerState::HalfOpen => !self.probe_in_flight,
        }
    }

    pub fn try_acquire(&mut self) -> Admission {
        match self.state {
            CircuitBreakerState::Closed => Admission::Allowed,
            CircuitBreakerState::Open => {
                if self.timeout_elapsed() {
                    self.state = CircuitBreakerState::HalfOpen;
                    self.probe_in_flight = true;
                    info!(breaker = %self.name, "Circuit breaker half-open, sending trial call");
                    Admission::Probe
                } else {
                    Admission::Rejected
                }
            }
            CircuitBreakerState::HalfOpen => {
                if self.probe_in_flight {
                    Admission::Rejected
                } else {
                    self.probe_in_flight = true;
                    Admission::Probe
                }
            }
        }
    }

    pub fn on_success(&mut self) {
        if self.state != CircuitBreakerState::Closed {
            info!(breaker = %self.name, "Circuit breaker closed");
        }
        self.failure_count = 0;
        self.state = CircuitBreakerState::Closed;
        self.last_failure_time = None;
        self.probe_in_flight = false;
    }

    pub fn on_failure(&mut self) {
        self.failure_count += 1;
        self.last_failure_time = Some(Instant::now());
        self.probe_in_flight = false;

        if self.state == CircuitBreakerState::HalfOpen {
            self.state = CircuitBreakerState::Open;
            self.generation += 1;
            warn!(breaker = %self.name, "Trial call failed, circuit breaker re-opened");
        } else if self.state == CircuitBreakerState::Closed && self.failure_count >= self.threshold
        {
            self.state = CircuitBreakerState::Open;
            self.generation += 1;
            warn!(
                breaker = %self.name,
                failures = self.failure_count,
                timeout_secs = self.timeout.as_secs(),
                "Circuit breaker opened"
            );
        } else {
            debug!(breaker = %self.name, failures = self.failure_count, "Provider failure recorded");
        }
    }

    /// Frees the trial slot without recording an outcome.
    pub fn release(&mut self) {
        self.probe_in_flight = false;
    }

    /// Whether an outcome from a call admitted as `admission` during
    /// `generation` still describes the breaker's current state.
    ///
    /// Ordinary calls only report into the closed period they started in;
    /// only the trial call may close or re-open a half-open breaker.
    fn is_current(&self, admission: Admission, generation: u64) -> bool {
        if generation != self.generation {
            return false;
        }
        match admission {
            Admission::Allowed => self.state == CircuitBreakerState::Closed,
            Admission::Probe => self.state == CircuitBreakerState::HalfOpen,
            Admission::Rejected => false,
        }
    }

    fn settle(&mut self, admission: Admission, generation: u64, success: bool) {
        if !self.is_current(admission, generation) {
            debug!(
                breaker = %self.name,
                state = ?self.state,
                success,
                "Ignoring outcome of a call admitted before the breaker changed state"
            );
            return;
        }
        if success {
            self.on_success();
        } else {
            self.on_failure();
        }
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        BreakerSnapshot {
            state: self.state,
            failure_count: self.failure_count,
            threshold: self.threshold,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BreakerSnapshot {
    pub state: CircuitBreakerState,
    pub failure_count: u32,
    pub threshold: u32,
}

/// A breaker shared between concurrent callers of one provider.
pub type SharedBreaker = Arc<Mutex<CircuitBreaker>>;

pub fn shared_breaker(breaker: CircuitBreaker) -> SharedBreaker {
    Arc::new(Mutex::new(breaker))
}

fn lock(breaker: &SharedBreaker) -> std::sync::MutexGuard<'_, CircuitBreaker> {
    breaker.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Permission to make one call through a breaker.
///
/// Dropping a permit without settling it releases a held trial slot, so an
/// abandoned call cannot wedge a half-open breaker.
#[derive(Debug)]
pub struct BreakerPermit {
    breaker: SharedBreaker,
    admission: Admission,
    generation: u64,
    settled: bool,
}

impl BreakerPermit {
    pub fn acquire(breaker: &SharedBreaker) -> Option<Self> {
        let (admission, generation) = {
            let mut guard = lock(breaker);
            (guard.try_acquire(), guard.generation)
        };
        if admission == Admission::Rejected {
            return None;
        }
        Some(Self {
            breaker: breaker.clone(),
            admission,
            generation,
            settled: false,
        })
    }

    pub fn is_probe(&self) -> bool {
        self.admission == Admission::Probe
    }

    pub fn success(mut self) {
        self.settled = true;
        lock(&self.breaker).settle(self.admission, self.generation, true);
    }

    pub fn failure(mut self) {
        self.settled = true;
        lock(&self.breaker).settle(self.admission, self.generation, false);
    }

    pub fn release(mut self) {
        self.settled = true;
        if self.admission == Admission::Probe {
            lock(&self.breaker).release();
        }
    }
}

impl Drop for BreakerPermit {
    fn drop(&mut self) {
        if !self.settled && self.admission == Admission::Probe {
            lock(&self.breaker).release();
        }
    }
}

pub fn breaker_snapshot(breaker: &SharedBreaker) -> BreakerSnapshot {
    lock(breaker).snapshot()
}

/// Cached regex compilation with error handling
pub fn get_cached_regex(pattern: &str) -> Result<Regex> {
    {
        let cache = REGEX_CACHE.read().unwrap_or_else(PoisonError::into_inner);
        if let Some(cached_regex) = cache.peek(pattern) {
            debug!(pattern = pattern, "Regex cache hit");
            return Ok(cached_regex.clone());
        }
    }

    debug!(pattern = pattern, "Regex cache miss, compiling");

    match Regex::new(pattern) {
        Ok(regex) => {
            {
                let mut cache = REGEX_CACHE.write().unwrap_or_else(PoisonError::into_inner);
                cache.put(pattern.to_string(), regex.clone());
            }
            Ok(regex)
        }
        Err(e) => {
            error!(pattern = pattern, error = %e, "Failed to compile regex");
            Err(TtsError::invalid_regex(format!("{}: {}", pattern, e)))
        }
    }
}
