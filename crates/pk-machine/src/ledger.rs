//! BallLedger — shared ball balance
//!
//! Several event sources touch the balance in the same tick (launcher debits,
//! start-hole and prize credits). Each mutation takes the lock once and
//! finishes its check-and-apply before releasing it.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Point-in-time copy of the ledger
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub balls: u32,
    pub in_count: u32,
    pub is_hit: bool,
}

/// Cloneable handle to the ball balance
#[derive(Debug, Clone, Default)]
pub struct BallLedger {
    inner: Arc<Mutex<LedgerSnapshot>>,
}

impl BallLedger {
    pub fn new(start_balls: u32) -> Self {
        Self {
            inner: Arc::new(Mutex::new(LedgerSnapshot {
                balls: start_balls,
                ..LedgerSnapshot::default()
            })),
        }
    }

    /// Debit `amount` balls. Fails without touching the balance when short.
    pub fn try_consume_ball(&self, amount: u32) -> bool {
        let mut state = self.inner.lock();
        match state.balls.checked_sub(amount) {
            Some(left) => {
                state.balls = left;
                true
            }
            None => {
                log::debug!(
                    "ledger debit rejected: need {} have {}",
                    amount,
                    state.balls
                );
                false
            }
        }
    }

    pub fn add_balls(&self, amount: u32) {
        if amount == 0 {
            return;
        }
        let mut state = self.inner.lock();
        state.balls = state.balls.saturating_add(amount);
    }

    pub fn add_in_count(&self, amount: u32) {
        if amount == 0 {
            return;
        }
        let mut state = self.inner.lock();
        state.in_count = state.in_count.saturating_add(amount);
    }

    pub fn set_hit(&self, is_hit: bool) {
        self.inner.lock().is_hit = is_hit;
    }

    pub fn balls(&self) -> u32 {
        self.inner.lock().balls
    }

    pub fn in_count(&self) -> u32 {
        self.inner.lock().in_count
    }

    pub fn is_hit(&self) -> bool {
        self.inner.lock().is_hit
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        *self.inner.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_debit_fails_closed() {
        let ledger = BallLedger::new(2);
        assert!(ledger.try_consume_ball(1));
        assert!(!ledger.try_consume_ball(5));
        assert_eq!(ledger.balls(), 1);
        assert!(ledger.try_consume_ball(1));
        assert!(!ledger.try_consume_ball(1));
        assert_eq!(ledger.balls(), 0);
    }

    #[test]
    fn test_clones_share_state() {
        let ledger = BallLedger::new(10);
        let other = ledger.clone();
        other.add_balls(5);
        other.add_in_count(2);
        other.set_hit(true);

        let snap = ledger.snapshot();
        assert_eq!(snap.balls, 15);
        assert_eq!(snap.in_count, 2);
        assert!(snap.is_hit);
    }

    #[test]
    fn test_concurrent_debits_never_overdraw() {
        let ledger = BallLedger::new(100);
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ledger = ledger.clone();
                thread::spawn(move || (0..50).filter(|_| ledger.try_consume_ball(1)).count())
            })
            .collect();

        let consumed: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(consumed, 100);
        assert_eq!(ledger.balls(), 0);
    }
}
