use std::{
    sync::{Mutex, PoisonError},
    time::Duration,
};

use tokio::time::Instant;
use tracing::{info, warn};

use super::RpcError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug)]
struct BreakerInner {
    state: BreakerState,
    consecutive_overloads: u32,
    opened_at: Option<Instant>,
    trial_in_flight: bool,
}

/// Suspends node calls after repeated overload signals. Only overloads
/// count toward opening; after the cooldown a single trial call decides
/// whether to close again.
#[derive(Debug)]
pub struct CircuitBreaker {
    threshold: u32,
    cooldown: Duration,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(threshold: u32, cooldown: Duration) -> Self {
        Self {
            threshold,
            cooldown,
            inner: Mutex::new(BreakerInner {
                state: BreakerState::Closed,
                consecutive_overloads: 0,
                opened_at: None,
                trial_in_flight: false,
            }),
        }
    }

    pub fn state(&self) -> BreakerState {
        self.lock().state
    }

    /// Admission check made before every call. The returned guard must be
    /// resolved with [`Admission::record`]; a guard dropped unresolved counts
    /// as a failed call.
    pub fn try_acquire(&self) -> Result<Admission<'_>, RpcError> {
        let mut inner = self.lock();

        let trial = match inner.state {
            BreakerState::Closed => false,
            BreakerState::Open => {
                let cooled = inner
                    .opened_at
                    .is_none_or(|at| at.elapsed() >= self.cooldown);

                if !cooled {
                    return Err(RpcError::CircuitOpen);
                }

                info!("rpc circuit half-open, sending trial call");
                inner.state = BreakerState::HalfOpen;
                true
            }
            BreakerState::HalfOpen if inner.trial_in_flight => return Err(RpcError::CircuitOpen),
            BreakerState::HalfOpen => true,
        };

        if trial {
            inner.trial_in_flight = true;
        }

        Ok(Admission {
            breaker: self,
            trial,
            resolved: false,
        })
    }

    fn resolve(&self, trial: bool, overloaded: bool) {
        let mut inner = self.lock();

        if trial {
            inner.trial_in_flight = false;
        } else if inner.state != BreakerState::Closed {
            // calls admitted before the circuit opened don't decide its fate
            if overloaded {
                inner.consecutive_overloads = inner.consecutive_overloads.saturating_add(1);
            }
            return;
        }

        if overloaded {
            inner.consecutive_overloads = inner.consecutive_overloads.saturating_add(1);

            if trial || inner.consecutive_overloads >= self.threshold {
                warn!(
                    overloads = inner.consecutive_overloads,
                    cooldown = ?self.cooldown,
                    "rpc circuit opened"
                );
                inner.state = BreakerState::Open;
                inner.opened_at = Some(Instant::now());
            }
        } else {
            if trial {
                info!("rpc circuit closed");
            }

            inner.consecutive_overloads = 0;
            inner.state = BreakerState::Closed;
            inner.opened_at = None;
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BreakerInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A call let through by the breaker
#[derive(Debug)]
pub struct Admission<'a> {
    breaker: &'a CircuitBreaker,
    trial: bool,
    resolved: bool,
}

impl Admission<'_> {
    /// Record the outcome of the admitted call
    pub fn record(mut self, overloaded: bool) {
        self.resolved = true;
        self.breaker.resolve(self.trial, overloaded);
    }
}

impl Drop for Admission<'_> {
    fn drop(&mut self) {
        if !self.resolved && self.trial {
            warn!("rpc trial call abandoned, reopening circuit");
            self.breaker.resolve(true, true);
        }
    }
}
