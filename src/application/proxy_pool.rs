//! Egress proxy rotation with health tracking.
//!
//! All proxy state lives behind one lock and changes only through
//! [`ProxyPool::acquire`] and [`ProxyPool::release`]. A lease is exclusive:
//! while a proxy is leased no other caller receives it, so callers wait when
//! every healthy proxy is busy. A lease dropped without being released
//! (a panicking or aborted caller) goes back to the pool as a failure.

use crate::domain::entities::proxy::{Proxy, ProxyEndpoint, ProxyProtocol};
use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy)]
pub struct ProxyPoolConfig {
    /// Consecutive failures that put a proxy in quarantine.
    pub failure_threshold: u32,
    pub cooldown: Duration,
}

impl Default for ProxyPoolConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            cooldown: Duration::from_secs(300),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyOutcome {
    Success,
    Failure,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AcquireError {
    /// Every proxy is quarantined (or the pool is empty). Transient.
    #[error("proxy pool exhausted: every proxy is quarantined")]
    Exhausted,
}

/// Exclusive right to use one proxy until it is released.
pub struct ProxyLease {
    slot: usize,
    endpoint: ProxyEndpoint,
    pool: Option<Arc<Shared>>,
}

impl ProxyLease {
    pub fn endpoint(&self) -> &ProxyEndpoint {
        &self.endpoint
    }
}

impl fmt::Debug for ProxyLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyLease")
            .field("slot", &self.slot)
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

impl Drop for ProxyLease {
    fn drop(&mut self) {
        if let Some(pool) = self.pool.take() {
            warn!(proxy = %self.endpoint, "proxy lease dropped without release");
            pool.record(self.slot, ProxyOutcome::Failure);
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProxyStatus {
    pub address: String,
    pub protocol: ProxyProtocol,
    pub consecutive_failures: u32,
    /// Seconds of quarantine left, if quarantined.
    pub quarantined_for_secs: Option<u64>,
    pub in_use: bool,
}

struct Slot {
    proxy: Proxy,
    in_use: bool,
}

struct PoolState {
    slots: Vec<Slot>,
    cursor: usize,
}

enum Selection {
    Leased(usize, ProxyEndpoint),
    Exhausted,
    /// Healthy proxies exist but all are leased. Carries the earliest
    /// quarantine expiry, which may free up another candidate.
    Busy(Option<Instant>),
}

impl PoolState {
    fn select(&mut self, now: Instant) -> Selection {
        let n = self.slots.len();
        if self.slots.iter().all(|s| s.proxy.is_quarantined(now)) {
            return Selection::Exhausted;
        }
        for i in 0..n {
            let idx = (self.cursor + i) % n;
            let slot = &mut self.slots[idx];
            if slot.in_use || slot.proxy.is_quarantined(now) {
                continue;
            }
            if slot.proxy.quarantined_until.take().is_some() {
                info!(proxy = %slot.proxy.endpoint, "proxy quarantine elapsed");
            }
            slot.in_use = true;
            self.cursor = (idx + 1) % n;
            return Selection::Leased(idx, slot.proxy.endpoint.clone());
        }
        let next_expiry = self
            .slots
            .iter()
            .filter_map(|s| s.proxy.quarantined_until.filter(|until| *until > now))
            .min();
        Selection::Busy(next_expiry)
    }
}

struct Shared {
    state: Mutex<PoolState>,
    released: Notify,
    config: ProxyPoolConfig,
}

impl Shared {
    fn record(&self, slot: usize, outcome: ProxyOutcome) {
        {
            let mut state = self.state.lock();
            let threshold = self.config.failure_threshold;
            let cooldown = self.config.cooldown;
            let slot = &mut state.slots[slot];
            slot.in_use = false;
            match outcome {
                ProxyOutcome::Success => {
                    slot.proxy.consecutive_failures = 0;
                }
                ProxyOutcome::Failure => {
                    slot.proxy.consecutive_failures += 1;
                    if slot.proxy.consecutive_failures >= threshold {
                        slot.proxy.quarantined_until = Some(Instant::now() + cooldown);
                        warn!(
                            proxy = %slot.proxy.endpoint,
                            failures = slot.proxy.consecutive_failures,
                            cooldown_secs = cooldown.as_secs(),
                            "proxy quarantined"
                        );
                    }
                }
            }
        }
        self.released.notify_waiters();
    }
}

pub struct ProxyPool {
    shared: Arc<Shared>,
}

impl ProxyPool {
    pub fn new(endpoints: Vec<ProxyEndpoint>, config: ProxyPoolConfig) -> Self {
        let slots = endpoints
            .into_iter()
            .map(|e| Slot {
                proxy: Proxy::new(e),
                in_use: false,
            })
            .collect();
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(PoolState { slots, cursor: 0 }),
                released: Notify::new(),
                config,
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.shared.state.lock().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Leases the next healthy proxy in round-robin order.
    ///
    /// Waits while every healthy proxy is leased. Returns
    /// [`AcquireError::Exhausted`] when every proxy is quarantined.
    pub async fn acquire(&self) -> Result<ProxyLease, AcquireError> {
        loop {
            let notified = self.shared.released.notified();
            tokio::pin!(notified);
            // Register before inspecting state so a release in between is not lost.
            notified.as_mut().enable();

            let selection = self.shared.state.lock().select(Instant::now());
            let wake_at = match selection {
                Selection::Leased(slot, endpoint) => {
                    debug!(proxy = %endpoint, "proxy leased");
                    return Ok(ProxyLease {
                        slot,
                        endpoint,
                        pool: Some(self.shared.clone()),
                    });
                }
                Selection::Exhausted => return Err(AcquireError::Exhausted),
                Selection::Busy(wake_at) => wake_at,
            };

            match wake_at {
                Some(at) => {
                    tokio::select! {
                        _ = &mut notified => {}
                        _ = tokio::time::sleep_until(at) => {}
                    }
                }
                None => notified.await,
            }
        }
    }

    /// Returns a lease and records how the request through it went.
    pub fn release(&self, mut lease: ProxyLease, outcome: ProxyOutcome) {
        if let Some(pool) = lease.pool.take() {
            pool.record(lease.slot, outcome);
        }
    }

    pub fn snapshot(&self) -> Vec<ProxyStatus> {
        let now = Instant::now();
        self.shared
            .state
            .lock()
            .slots
            .iter()
            .map(|s| ProxyStatus {
                address: s.proxy.endpoint.address.clone(),
                protocol: s.proxy.endpoint.protocol,
                consecutive_failures: s.proxy.consecutive_failures,
                quarantined_for_secs: s
                    .proxy
                    .quarantined_until
                    .filter(|until| *until > now)
                    .map(|until| (until - now).as_secs()),
                in_use: s.in_use,
            })
            .collect()
    }
}
