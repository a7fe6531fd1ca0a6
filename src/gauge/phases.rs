//! Oriented edge phases (gauge links).
//!
//! The gauge-field module owns these values; the core reads them for
//! Wilson loops and writes them only to redistribute flux. A link is
//! stored once, oriented `lo -> hi`, so `phase(j, i) == -phase(i, j)`.

use std::f64::consts::{PI, TAU};

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use crate::model::EdgeKey;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EdgePhases {
    links: HashMap<EdgeKey, f64>,
}

impl EdgePhases {
    pub fn new() -> Self {
        Self::default()
    }

    /// Phase transported from `i` to `j`. Absent links are trivial.
    pub fn phase(&self, i: usize, j: usize) -> f64 {
        match EdgeKey::new(i, j) {
            Some(k) => {
                let theta = self.links.get(&k).copied().unwrap_or(0.0);
                if i < j { theta } else { -theta }
            }
            None => 0.0,
        }
    }

    pub fn set(&mut self, i: usize, j: usize, theta: f64) {
        if let Some(k) = EdgeKey::new(i, j) {
            self.links.insert(k, if i < j { theta } else { -theta });
        }
    }

    /// Add `delta` to the phase transported from `i` to `j`.
    pub fn add(&mut self, i: usize, j: usize, delta: f64) {
        let current = self.phase(i, j);
        self.set(i, j, current + delta);
    }

    /// Drop the link, returning the phase from `i` to `j`.
    pub fn remove(&mut self, i: usize, j: usize) -> Option<f64> {
        let k = EdgeKey::new(i, j)?;
        self.links.remove(&k).map(|theta| if i < j { theta } else { -theta })
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }
}

/// Principal value in `(-π, π]`.
pub fn wrap_phase(theta: f64) -> f64 {
    if !theta.is_finite() {
        return 0.0;
    }
    let wrapped = (theta + PI).rem_euclid(TAU) - PI;
    if wrapped <= -PI { wrapped + TAU } else { wrapped }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_orientation() {
        let mut p = EdgePhases::new();
        p.set(3, 1, 0.4);
        assert!((p.phase(1, 3) + 0.4).abs() < 1e-12);
        assert!((p.phase(3, 1) - 0.4).abs() < 1e-12);
        p.add(1, 3, 0.1);
        assert!((p.phase(3, 1) - 0.3).abs() < 1e-12);
        assert_eq!(p.phase(0, 0), 0.0);
    }

    #[test]
    fn test_wrap_phase() {
        assert!((wrap_phase(TAU) - 0.0).abs() < 1e-12);
        assert!((wrap_phase(PI) - PI).abs() < 1e-12);
        assert!((wrap_phase(-PI) - PI).abs() < 1e-12);
        assert!((wrap_phase(3.0 * PI / 2.0) + PI / 2.0).abs() < 1e-12);
        assert_eq!(wrap_phase(f64::NAN), 0.0);
    }
}
