//! Priority admission queue over either rate algorithm, plus the adaptive
//! back-off policy (spec §4.A).

use super::bucket::TokenBucket;
use super::window::FixedWindow;
use crate::model::Priority;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::Notify;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateAlgorithm {
    TokenBucket,
    FixedWindow,
}

#[derive(Debug, Clone, Copy)]
pub struct RateControllerConfig {
    pub algorithm: RateAlgorithm,
    pub max_rpm: u32,
}

impl Default for RateControllerConfig {
    fn default() -> Self {
        Self { algorithm: RateAlgorithm::TokenBucket, max_rpm: 60 }
    }
}

enum Algorithm {
    TokenBucket(TokenBucket),
    FixedWindow(FixedWindow),
}

impl Algorithm {
    fn try_consume(&mut self, max_rpm: u32) -> bool {
        match self {
            Algorithm::TokenBucket(b) => b.try_consume(max_rpm),
            Algorithm::FixedWindow(w) => w.try_consume(max_rpm),
        }
    }

    fn estimated_wait_ms(&mut self, max_rpm: u32) -> u64 {
        match self {
            Algorithm::TokenBucket(_) => TokenBucket::estimated_wait_ms(max_rpm),
            Algorithm::FixedWindow(w) => w.estimated_wait_ms(),
        }
    }

    fn reset(&mut self) {
        match self {
            Algorithm::TokenBucket(b) => b.reset(),
            Algorithm::FixedWindow(w) => w.reset(),
        }
    }
}

/// A pending `admit` call, ordered for the max-heap so that higher priority
/// sorts first and, within a priority, the earlier `seq` (enqueued first)
/// sorts first.
#[derive(Eq, PartialEq)]
struct Waiter {
    priority: Priority,
    seq: u64,
    id: u64,
}

impl Ord for Waiter {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority.cmp(&other.priority).then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for Waiter {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

struct Inner {
    algorithm: Algorithm,
    max_rpm: u32,
    consecutive_throttles: u32,
    pending: BinaryHeap<Waiter>,
    next_seq: u64,
    next_id: u64,
}

/// Admits outbound calls within a per-minute budget, fronted by a priority
/// queue and an adaptive back-off on sustained throttling.
pub struct RateController {
    inner: Mutex<Inner>,
    notify: Notify,
}

impl RateController {
    pub fn new(config: RateControllerConfig) -> Self {
        let algorithm = match config.algorithm {
            RateAlgorithm::TokenBucket => Algorithm::TokenBucket(TokenBucket::new(config.max_rpm)),
            RateAlgorithm::FixedWindow => Algorithm::FixedWindow(FixedWindow::new()),
        };
        Self {
            inner: Mutex::new(Inner {
                algorithm,
                max_rpm: config.max_rpm,
                consecutive_throttles: 0,
                pending: BinaryHeap::new(),
                next_seq: 0,
                next_id: 0,
            }),
            notify: Notify::new(),
        }
    }

    /// Resolves once the caller may proceed. Never fails except on explicit
    /// cancellation (spec §4.A: "admit never fails").
    pub async fn admit(&self, priority: Priority, cancel: &tokio_util::sync::CancellationToken) -> crate::error::CoreResult<()> {
        let id = {
            let mut inner = self.inner.lock().unwrap();
            let id = inner.next_id;
            inner.next_id += 1;
            let seq = inner.next_seq;
            inner.next_seq += 1;
            inner.pending.push(Waiter { priority, seq, id });
            id
        };

        loop {
            let wait_ms = {
                let mut inner = self.inner.lock().unwrap();
                let is_my_turn = inner.pending.peek().map(|w| w.id) == Some(id);
                if is_my_turn {
                    let max_rpm = inner.max_rpm;
                    if inner.algorithm.try_consume(max_rpm) {
                        inner.pending.pop();
                        self.notify.notify_waiters();
                        return Ok(());
                    }
                    Some(inner.algorithm.estimated_wait_ms(max_rpm).max(1))
                } else {
                    None
                }
            };

            let wait = wait_ms.map(Duration::from_millis).unwrap_or(Duration::from_millis(50));
            tokio::select! {
                _ = cancel.cancelled() => return Err(crate::error::CoreError::Cancelled),
                _ = self.notify.notified() => {}
                _ = tokio::time::sleep(wait) => {}
            }
        }
    }

    /// Resets the consecutive-throttle streak (spec §4.A).
    pub fn mark_completed(&self, _duration_ms: Option<u64>) {
        let mut inner = self.inner.lock().unwrap();
        inner.consecutive_throttles = 0;
    }

    /// After three consecutive calls, `maxRpm` is multiplicatively reduced by
    /// 0.8, floored at 1 (spec §4.A).
    pub fn mark_throttled(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.consecutive_throttles += 1;
        if inner.consecutive_throttles >= 3 {
            let reduced = ((inner.max_rpm as f64) * 0.8).floor().max(1.0) as u32;
            inner.max_rpm = reduced;
            inner.consecutive_throttles = 0;
            if let Algorithm::TokenBucket(b) = &mut inner.algorithm {
                b.set_capacity(reduced);
            }
        }
    }

    pub fn current_rpm(&self) -> u32 {
        self.inner.lock().unwrap().max_rpm
    }

    pub fn reset(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.algorithm.reset();
        inner.consecutive_throttles = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_util::sync::CancellationToken;

    #[tokio::test]
    async fn admits_within_budget_immediately() {
        let controller = RateController::new(RateControllerConfig { algorithm: RateAlgorithm::TokenBucket, max_rpm: 10 });
        let cancel = CancellationToken::new();
        for _ in 0..5 {
            controller.admit(Priority::Medium, &cancel).await.unwrap();
        }
    }

    #[tokio::test]
    async fn higher_priority_is_admitted_before_lower() {
        let controller = std::sync::Arc::new(RateController::new(RateControllerConfig {
            algorithm: RateAlgorithm::TokenBucket,
            max_rpm: 1,
        }));
        // Drain the single token up front.
        let cancel = CancellationToken::new();
        controller.admit(Priority::Low, &cancel).await.unwrap();

        let order = std::sync::Arc::new(Mutex::new(Vec::new()));
        let mut handles = Vec::new();
        for (priority, label) in [(Priority::Low, "low"), (Priority::Critical, "critical"), (Priority::Medium, "medium")] {
            let controller = controller.clone();
            let order = order.clone();
            let cancel = cancel.clone();
            handles.push(tokio::spawn(async move {
                controller.admit(priority, &cancel).await.unwrap();
                order.lock().unwrap().push(label);
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        let order = order.lock().unwrap();
        assert_eq!(order[0], "critical");
    }

    #[tokio::test]
    async fn adaptive_backoff_reduces_max_rpm_after_three_throttles() {
        let controller = RateController::new(RateControllerConfig { algorithm: RateAlgorithm::TokenBucket, max_rpm: 10 });
        controller.mark_throttled();
        controller.mark_throttled();
        assert_eq!(controller.current_rpm(), 10);
        controller.mark_throttled();
        assert_eq!(controller.current_rpm(), 8);
    }

    #[tokio::test]
    async fn mark_completed_resets_streak() {
        let controller = RateController::new(RateControllerConfig { algorithm: RateAlgorithm::TokenBucket, max_rpm: 10 });
        controller.mark_throttled();
        controller.mark_throttled();
        controller.mark_completed(Some(10));
        controller.mark_throttled();
        assert_eq!(controller.current_rpm(), 10);
    }

    #[tokio::test]
    async fn cancellation_aborts_admit() {
        let controller = RateController::new(RateControllerConfig { algorithm: RateAlgorithm::TokenBucket, max_rpm: 1 });
        let cancel = CancellationToken::new();
        controller.admit(Priority::Low, &cancel).await.unwrap();
        cancel.cancel();
        let err = controller.admit(Priority::Low, &cancel).await.unwrap_err();
        assert_eq!(err.code(), "cancelled");
    }
}
