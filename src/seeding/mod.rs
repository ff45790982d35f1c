//! # Seed generation
//!
//! Seeds are 5-hit track starts drawn from fixed layer combinations
//! ([`crate::config::SeedStrategy`], 3 stereo + 2 axial). For one strategy
//! the generator enumerates the pruned Cartesian product of per-layer hits
//! ([`combinations::SeedCombinations`]), fits each combination through the
//! external [`SeedFitter`] and gates the result on curvature, slope and the
//! reference-plane projections.
//!
//! Surviving seeds are ordered by how close they point back to the
//! reference axis, so the cleanest starts claim hits first.

pub mod combinations;

use ordered_float::OrderedFloat;

use crate::config::{PatRecParams, SeedStrategy, TrialCuts};
use crate::constants::{SeedHitIds, SEED_LAYERS};
use crate::hits::ownership::HitLedger;
use crate::hits::HitBank;
use crate::kalman::{HelixState, SeedFitter, SeedHit};
use crate::seeding::combinations::SeedCombinations;
use crate::tracker::TrackerLayout;

/// One fitted, gate-passing track start.
#[derive(Debug, Clone)]
pub struct Seed {
    /// The five seed hits, ordered by strategy layer.
    pub hits: SeedHitIds,
    /// The strategy's layers, ascending.
    pub layers: [usize; SEED_LAYERS],
    /// Fitted helix at the reference surface.
    pub state: HelixState,
    /// Projected distance from the reference axis.
    pub drho: f64,
    /// Projected longitudinal offset.
    pub dz: f64,
    /// Index of the originating strategy in the configured table.
    pub strategy: usize,
}

/// Enumerate, fit and gate one strategy's seeds.
///
/// Arguments
/// -----------------
/// * `strategy_idx` / `strategy`: the combination being tried and its index
///   in the configured table.
/// * `ledger`: pass the event ledger to skip hits already owned by stored
///   tracks (second trial); `None` enumerates everything.
/// * `fitter`: the external 5-hit seed fit.
/// * `cuts`: the current trial's gates.
///
/// Return
/// ----------
/// * The surviving seeds, sorted by `|drho|` ascending; ties keep the
///   enumeration order of the combination odometer.
pub fn generate_seeds<F: SeedFitter>(
    strategy_idx: usize,
    strategy: &SeedStrategy,
    layout: &TrackerLayout,
    bank: &HitBank,
    ledger: Option<&HitLedger>,
    fitter: &F,
    cuts: &TrialCuts,
    params: &PatRecParams,
) -> Vec<Seed> {
    let mut seeds = Vec::new();

    for combo in SeedCombinations::new(strategy, bank, ledger, params.max_time_spread) {
        let seed_hits: [SeedHit<'_>; SEED_LAYERS] = core::array::from_fn(|d| SeedHit {
            module: layout.module(bank.module_of(combo[d])),
            hit: bank.hit(combo[d]),
        });

        let Some(fit) = fitter.fit(&seed_hits, params.reference_plane) else {
            continue;
        };

        // Strictly-below gates; NaN from a degenerate fit rejects.
        if !(fit.state.curvature().abs() < cuts.max_curvature)
            || !(fit.state.tan_lambda().abs() < cuts.max_tan_lambda)
            || !(fit.drho.abs() < cuts.max_drho)
            || !(fit.dz.abs() < cuts.max_dz)
        {
            continue;
        }

        seeds.push(Seed {
            hits: combo,
            layers: *strategy.layers(),
            state: fit.state,
            drho: fit.drho,
            dz: fit.dz,
            strategy: strategy_idx,
        });
    }

    seeds.sort_by_key(|seed| OrderedFloat(seed.drho.abs()));
    seeds
}
