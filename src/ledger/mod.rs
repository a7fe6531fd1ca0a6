//! # Vacuum Energy Ledger
//!
//! A single conserved budget that every stochastic operation pays into.
//! A refused debit is backpressure, not an error: the caller drops the
//! step and nothing changes.
//!
//! Clones share the same pool. The balance sits behind a `parking_lot`
//! mutex so debits stay check-and-subtract atomic when rayon workers or
//! external field modules draw from the same pool.

pub mod entropy;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

pub use entropy::Entropy;

/// Shared handle to the vacuum pool.
#[derive(Debug, Clone)]
pub struct EnergyLedger {
    inner: Arc<LedgerInner>,
}

#[derive(Debug)]
struct LedgerInner {
    balance: Mutex<Totals>,
    refusals: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default)]
struct Totals {
    balance: f64,
    spent: f64,
    radiated: f64,
}

/// Point-in-time view of the ledger, for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub balance: f64,
    pub total_spent: f64,
    pub total_radiated: f64,
    pub refusals: u64,
}

impl EnergyLedger {
    /// Non-finite or negative initial balances start the pool empty.
    pub fn new(initial_balance: f64) -> Self {
        let balance = if initial_balance.is_finite() && initial_balance > 0.0 {
            initial_balance
        } else {
            0.0
        };
        Self {
            inner: Arc::new(LedgerInner {
                balance: Mutex::new(Totals { balance, ..Totals::default() }),
                refusals: AtomicU64::new(0),
            }),
        }
    }

    pub fn balance(&self) -> f64 {
        self.inner.balance.lock().balance
    }

    pub fn can_afford(&self, cost: f64) -> bool {
        valid_amount(cost) && self.inner.balance.lock().balance >= cost
    }

    /// Debit `cost` iff the pool covers it.
    pub fn try_spend_vacuum_energy(&self, cost: f64) -> bool {
        if !valid_amount(cost) {
            tracing::warn!(cost, "refusing malformed ledger debit");
            self.inner.refusals.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        let mut totals = self.inner.balance.lock();
        if totals.balance >= cost {
            totals.balance -= cost;
            totals.spent += cost;
            true
        } else {
            drop(totals);
            self.inner.refusals.fetch_add(1, Ordering::Relaxed);
            false
        }
    }

    /// Credit the pool. Malformed amounts are dropped.
    pub fn register_radiation(&self, amount: f64) {
        if !valid_amount(amount) {
            tracing::warn!(amount, "ignoring malformed radiation credit");
            return;
        }
        let mut totals = self.inner.balance.lock();
        totals.balance += amount;
        totals.radiated += amount;
    }

    pub fn refusals(&self) -> u64 {
        self.inner.refusals.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        let totals = *self.inner.balance.lock();
        LedgerSnapshot {
            balance: totals.balance,
            total_spent: totals.spent,
            total_radiated: totals.radiated,
            refusals: self.refusals(),
        }
    }
}

fn valid_amount(x: f64) -> bool {
    x.is_finite() && x >= 0.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spend_until_refused() {
        let ledger = EnergyLedger::new(1.0);
        assert!(ledger.try_spend_vacuum_energy(0.6));
        assert!(!ledger.try_spend_vacuum_energy(0.6));
        assert!((ledger.balance() - 0.4).abs() < 1e-12);
        assert_eq!(ledger.refusals(), 1);
    }

    #[test]
    fn test_exact_balance_is_affordable() {
        let ledger = EnergyLedger::new(0.25);
        assert!(ledger.can_afford(0.25));
        assert!(ledger.try_spend_vacuum_energy(0.25));
        assert_eq!(ledger.balance(), 0.0);
        assert!(!ledger.can_afford(f64::MIN_POSITIVE));
    }

    #[test]
    fn test_malformed_amounts_change_nothing() {
        let ledger = EnergyLedger::new(1.0);
        assert!(!ledger.try_spend_vacuum_energy(-1.0));
        assert!(!ledger.try_spend_vacuum_energy(f64::NAN));
        ledger.register_radiation(-5.0);
        ledger.register_radiation(f64::INFINITY);
        assert_eq!(ledger.balance(), 1.0);
    }

    #[test]
    fn test_clones_share_the_pool() {
        let a = EnergyLedger::new(1.0);
        let b = a.clone();
        assert!(b.try_spend_vacuum_energy(1.0));
        assert!(!a.can_afford(0.1));
        a.register_radiation(0.5);
        let snap = b.snapshot();
        assert_eq!(snap.balance, 0.5);
        assert_eq!(snap.total_spent, 1.0);
        assert_eq!(snap.total_radiated, 0.5);
    }

    #[test]
    fn test_concurrent_debits_never_overdraw() {
        let ledger = EnergyLedger::new(100.0);
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let l = ledger.clone();
                std::thread::spawn(move || (0..100).filter(|_| l.try_spend_vacuum_energy(1.0)).count())
            })
            .collect();
        let granted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(granted, 100);
        assert_eq!(ledger.balance(), 0.0);
    }
}
