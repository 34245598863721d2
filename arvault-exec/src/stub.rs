//! Stub implementations for testing.
//!
//! `StubTransfer` simulates an external payment rail without making real
//! calls. Outcomes can be scripted per attempt and a random delay can be
//! injected to force interleavings between concurrent exchanges.

use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use crate::error::ExecError;
use crate::ports::{TransferLeg, TransferPort, TransferReceipt};

/// Completed legs kept for inspection; older ones are dropped.
pub const COMPLETED_LEG_HISTORY: usize = 1024;

/// Scripted result for one future attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StubOutcome {
    /// The leg completes
    Succeed,
    /// The counterparty rejects the leg
    Reject,
    /// The rail is unreachable
    Unavailable,
}

// =============================================================================
// Stub Transfer
// =============================================================================

/// Stub transfer rail for testing.
///
/// Succeeds by default. Scripted outcomes are consumed in order, one per
/// attempt; `fail_all` overrides the script.
pub struct StubTransfer {
    /// Outcomes for the next attempts, consumed front first
    script: Mutex<VecDeque<StubOutcome>>,
    /// Reject every attempt while set
    fail_all: AtomicBool,
    /// Inclusive latency bounds applied to every attempt
    latency: (Duration, Duration),
    /// Receipt counter for generating references
    counter: AtomicU64,
    /// Most recent completed legs, oldest first
    completed: Mutex<VecDeque<TransferLeg>>,
}

impl StubTransfer {
    /// Create a stub that succeeds immediately.
    pub fn new() -> Self {
        Self::with_latency(Duration::ZERO, Duration::ZERO)
    }

    /// Create a stub that sleeps a random duration in `[min, max]` before each attempt.
    ///
    /// Bounds given in the wrong order are swapped.
    pub fn with_latency(min: Duration, max: Duration) -> Self {
        let latency = if min <= max { (min, max) } else { (max, min) };
        Self {
            script: Mutex::new(VecDeque::new()),
            fail_all: AtomicBool::new(false),
            latency,
            counter: AtomicU64::new(0),
            completed: Mutex::new(VecDeque::new()),
        }
    }

    /// Configure the next attempt to be rejected.
    pub fn set_fail_next(&self, fail: bool) {
        let mut script = recover(&self.script);
        script.clear();
        if fail {
            script.push_back(StubOutcome::Reject);
        }
    }

    /// Queue outcomes for the next attempts.
    pub fn script(&self, outcomes: impl IntoIterator<Item = StubOutcome>) {
        recover(&self.script).extend(outcomes);
    }

    /// Reject every attempt until cleared.
    pub fn set_fail_all(&self, fail: bool) {
        self.fail_all.store(fail, Ordering::SeqCst);
    }

    /// The last [`COMPLETED_LEG_HISTORY`] legs that completed, oldest first.
    pub fn completed(&self) -> Vec<TransferLeg> {
        recover(&self.completed).iter().cloned().collect()
    }

    fn next_outcome(&self) -> StubOutcome {
        if self.fail_all.load(Ordering::SeqCst) {
            return StubOutcome::Reject;
        }
        recover(&self.script).pop_front().unwrap_or(StubOutcome::Succeed)
    }

    fn next_delay(&self) -> Duration {
        let (min, max) = self.latency;
        if max.is_zero() {
            return Duration::ZERO;
        }
        rand::thread_rng().gen_range(min..=max)
    }
}

impl Default for StubTransfer {
    fn default() -> Self {
        Self::new()
    }
}

/// Lock a mutex, recovering the data if a previous holder panicked.
fn recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl TransferPort for StubTransfer {
    async fn attempt(&self, leg: &TransferLeg) -> Result<TransferReceipt, ExecError> {
        let delay = self.next_delay();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        match self.next_outcome() {
            StubOutcome::Reject => {
                return Err(ExecError::Rejected(format!("Simulated rejection of {}", leg)));
            },
            StubOutcome::Unavailable => {
                return Err(ExecError::Unavailable("Simulated transfer outage".to_string()));
            },
            StubOutcome::Succeed => {},
        }

        let seq = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        {
            let mut completed = recover(&self.completed);
            if completed.len() == COMPLETED_LEG_HISTORY {
                completed.pop_front();
            }
            completed.push_back(leg.clone());
        }

        tracing::debug!(reference = seq, leg = %leg, "Stub: transfer completed");
        Ok(TransferReceipt {
            reference: format!("STUB-{}", seq),
            leg: leg.clone(),
            completed_at: Utc::now(),
        })
    }

    async fn health_check(&self) -> Result<(), ExecError> {
        if self.fail_all.load(Ordering::SeqCst) {
            return Err(ExecError::Unavailable("Simulated health check failure".to_string()));
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
