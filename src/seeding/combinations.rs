//! Odometer over the 5-layer hit Cartesian product.
//!
//! The iterator walks one index per strategy layer like a car odometer,
//! innermost layer as the most significant digit. Before a combination is
//! produced the digits are checked left to right; the first digit whose
//! prefix already violates a constraint (a taken hit, or a time spread
//! beyond the coincidence window) is bumped directly, skipping every
//! combination that shares the offending prefix.

use crate::config::SeedStrategy;
use crate::constants::{SeedHitIds, SEED_LAYERS};
use crate::hits::ownership::HitLedger;
use crate::hits::{HitBank, HitId};

/// Lazy, pruned enumeration of one strategy's seed hit sets.
pub struct SeedCombinations<'a> {
    per_layer: [&'a [HitId]; SEED_LAYERS],
    bank: &'a HitBank,
    /// When present, combinations containing taken hits are skipped.
    ledger: Option<&'a HitLedger>,
    max_spread: f64,
    idx: [usize; SEED_LAYERS],
    done: bool,
}

impl<'a> SeedCombinations<'a> {
    pub fn new(
        strategy: &SeedStrategy,
        bank: &'a HitBank,
        ledger: Option<&'a HitLedger>,
        max_spread: f64,
    ) -> Self {
        let per_layer: [&[HitId]; SEED_LAYERS] =
            core::array::from_fn(|digit| bank.on_layer(strategy.layers()[digit]));
        let done = per_layer.iter().any(|hits| hits.is_empty());
        Self {
            per_layer,
            bank,
            ledger,
            max_spread,
            idx: [0; SEED_LAYERS],
            done,
        }
    }

    /// First digit whose prefix cannot lead to a valid combination.
    fn first_violation(&self) -> Option<usize> {
        let mut t_min = f64::INFINITY;
        let mut t_max = f64::NEG_INFINITY;
        for digit in 0..SEED_LAYERS {
            let id = self.per_layer[digit][self.idx[digit]];
            if self.ledger.is_some_and(|ledger| ledger.is_taken(id)) {
                return Some(digit);
            }
            let t = self.bank.hit(id).time;
            t_min = t_min.min(t);
            t_max = t_max.max(t);
            if t_max - t_min > self.max_spread {
                return Some(digit);
            }
        }
        None
    }

    /// Bump `digit`, resetting everything below it and carrying upward on
    /// overflow. Exhausting the most significant digit ends the iteration.
    fn advance(&mut self, mut digit: usize) {
        for lower in digit + 1..SEED_LAYERS {
            self.idx[lower] = 0;
        }
        loop {
            self.idx[digit] += 1;
            if self.idx[digit] < self.per_layer[digit].len() {
                return;
            }
            self.idx[digit] = 0;
            if digit == 0 {
                self.done = true;
                return;
            }
            digit -= 1;
        }
    }
}

impl Iterator for SeedCombinations<'_> {
    type Item = SeedHitIds;

    fn next(&mut self) -> Option<SeedHitIds> {
        while !self.done {
            match self.first_violation() {
                Some(digit) => self.advance(digit),
                None => {
                    let combo = self
                        .idx
                        .iter()
                        .zip(&self.per_layer)
                        .map(|(&i, hits)| hits[i])
                        .collect();
                    self.advance(SEED_LAYERS - 1);
                    return Some(combo);
                }
            }
        }
        None
    }
}
