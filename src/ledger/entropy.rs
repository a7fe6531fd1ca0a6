//! Ledger-gated randomness.
//!
//! Every uniform draw costs `draw_cost` from the vacuum pool. Multi-draw
//! requests are paid in one debit so a refused request consumes nothing.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::EnergyLedger;

#[derive(Debug, Clone)]
pub struct Entropy {
    rng: StdRng,
    ledger: EnergyLedger,
    draw_cost: f64,
    draws: u64,
    refused: u64,
}

impl Entropy {
    pub fn new(seed: u64, ledger: EnergyLedger, draw_cost: f64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            ledger,
            draw_cost,
            draws: 0,
            refused: 0,
        }
    }

    pub fn ledger(&self) -> &EnergyLedger {
        &self.ledger
    }

    pub fn draw_cost(&self) -> f64 {
        self.draw_cost
    }

    /// One uniform in `[0, 1)`, or `None` if the pool cannot pay.
    pub fn try_draw(&mut self) -> Option<f64> {
        self.try_draws::<1>().map(|[u]| u)
    }

    /// `N` uniforms in `[0, 1)`, paid atomically.
    pub fn try_draws<const N: usize>(&mut self) -> Option<[f64; N]> {
        if !self.ledger.try_spend_vacuum_energy(self.draw_cost * N as f64) {
            self.refused += 1;
            return None;
        }
        self.draws += N as u64;
        Some(std::array::from_fn(|_| self.rng.gen_range(0.0..1.0)))
    }

    /// Draws already granted.
    pub fn draws(&self) -> u64 {
        self.draws
    }

    /// Requests refused for lack of budget.
    pub fn refused(&self) -> u64 {
        self.refused
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_unit_budget_allows_one_draw() {
        let ledger = EnergyLedger::new(0.5);
        let mut entropy = Entropy::new(1, ledger.clone(), 0.5);
        assert!(entropy.try_draw().is_some());
        assert!(entropy.try_draw().is_none());
        assert_eq!(entropy.draws(), 1);
        assert_eq!(entropy.refused(), 1);
        assert_eq!(ledger.balance(), 0.0);
    }

    #[test]
    fn test_bundle_refusal_is_all_or_nothing() {
        let ledger = EnergyLedger::new(2.0);
        let mut entropy = Entropy::new(1, ledger.clone(), 1.0);
        assert!(entropy.try_draws::<3>().is_none());
        assert_eq!(ledger.balance(), 2.0);
        let [a, b] = entropy.try_draws::<2>().unwrap();
        assert!((0.0..1.0).contains(&a) && (0.0..1.0).contains(&b));
    }

    #[test]
    fn test_same_seed_same_stream() {
        let mut a = Entropy::new(9, EnergyLedger::new(10.0), 0.0);
        let mut b = Entropy::new(9, EnergyLedger::new(10.0), 0.0);
        assert_eq!(a.try_draws::<4>(), b.try_draws::<4>());
    }
}
