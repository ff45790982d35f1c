//! # Pattern-recognition engine
//!
//! [`PatRec`] ties the whole chain together for one tracker half:
//!
//! * Overview:
//!     * build the per-event hit index,
//!     * run two seeding and extension trials, the second with looser
//!       cuts and with the first trial's hits off the table,
//!     * arbitrate each trial's candidates into the track store,
//!     * resolve the store globally into the final ordered track list.
//!
//! The engine owns the tracker geometry, the seed fitter and the track
//! model, and is reused across events; per-event state lives on the
//! stack of [`PatRec::run`].

use tracing::{debug, trace, warn};

use crate::arbitration::arbitrate;
use crate::candidates::lifecycle::{process_seed, SeedOutcome, TrialState};
use crate::config::PatRecParams;
use crate::hits::ownership::HitLedger;
use crate::hits::{Hit, HitBank};
use crate::kalman::{SeedFitter, SurfaceModel};
use crate::patrec_errors::PatRecError;
use crate::seeding::generate_seeds;
use crate::tracker::{TrackerHalf, TrackerLayout};
use crate::tracks::{resolver, Track, TrackStore};

/// One tracker half's pattern recognition, reusable across events.
#[derive(Debug)]
pub struct PatRec<F: SeedFitter, M: SurfaceModel> {
    layout: TrackerLayout,
    seed_fitter: F,
    model: M,
    params: PatRecParams,
}

impl<F: SeedFitter, M: SurfaceModel> PatRec<F, M> {
    /// Assemble an engine, checking every seeding strategy against the
    /// geometry.
    ///
    /// Arguments
    /// -----------------
    /// * `layout`: the half's module geometry, canonical order.
    /// * `seed_fitter`: initial-state estimator for five-hit seeds.
    /// * `model`: propagation, filtering and hit-selection collaborator.
    /// * `params`: validated parameter set.
    ///
    /// Return
    /// ----------
    /// * The engine, or [`PatRecError::InvalidStrategy`] when a strategy
    ///   leaves the layout or breaks the stereo split.
    pub fn new(
        layout: TrackerLayout,
        seed_fitter: F,
        model: M,
        params: PatRecParams,
    ) -> Result<Self, PatRecError> {
        for strategy in &params.strategies {
            strategy.validate_against(&layout)?;
        }
        Ok(Self {
            layout,
            seed_fitter,
            model,
            params,
        })
    }

    pub fn layout(&self) -> &TrackerLayout {
        &self.layout
    }

    pub fn params(&self) -> &PatRecParams {
        &self.params
    }

    /// Run pattern recognition over one event.
    ///
    /// Arguments
    /// -----------------
    /// * `hits_by_module`: one hit list per module, canonical module
    ///   order, matching the engine's layout.
    /// * `half` / `event_id`: provenance stamped on every output track.
    ///
    /// Return
    /// ----------
    /// * The resolved tracks, best quality first; an event with no hits
    ///   yields an empty list.
    pub fn run(
        &self,
        hits_by_module: &[Vec<Hit>],
        half: TrackerHalf,
        event_id: u64,
    ) -> Result<Vec<Track>, PatRecError> {
        let bank = match HitBank::build(&self.layout, hits_by_module) {
            Ok(bank) => bank,
            Err(err) => {
                warn!(event = event_id, %err, "event rejected");
                return Err(err);
            }
        };
        let mut ledger = HitLedger::new(bank.n_hits());
        let mut store = TrackStore::new(half, event_id);
        if bank.n_hits() == 0 {
            return Ok(Vec::new());
        }

        for (trial_idx, cuts) in self.params.trials.iter().enumerate() {
            let mut trial = TrialState::new();
            let mut n_seeds = 0usize;
            let mut n_committed = 0usize;
            let mut n_kept = 0usize;

            for (strategy_idx, strategy) in self.params.strategies.iter().enumerate() {
                // From the second trial on, hits already owned by a track
                // are dead for seeding.
                let seeds = generate_seeds(
                    strategy_idx,
                    strategy,
                    &self.layout,
                    &bank,
                    (trial_idx > 0).then_some(&ledger),
                    &self.seed_fitter,
                    cuts,
                    &self.params,
                );
                n_seeds += seeds.len();
                for seed in &seeds {
                    let outcome = process_seed(
                        seed,
                        &mut trial,
                        &mut ledger,
                        &mut store,
                        &self.model,
                        &self.layout,
                        &bank,
                        cuts,
                        &self.params,
                    );
                    match &outcome {
                        SeedOutcome::Committed(id) => {
                            n_committed += 1;
                            trace!(strategy = %strategy, track = %id, "seed committed early");
                        }
                        SeedOutcome::Kept(id) => {
                            n_kept += 1;
                            trace!(strategy = %strategy, candidate = %id, "candidate kept");
                        }
                        SeedOutcome::Rejected(reason) => {
                            trace!(strategy = %strategy, %reason, "seed rejected");
                        }
                    }
                }
            }

            arbitrate(
                &mut trial,
                &mut ledger,
                &mut store,
                &bank,
                cuts,
                &self.params,
            );
            ledger.clear_candidates();
            debug!(
                trial = trial_idx,
                seeds = n_seeds,
                committed = n_committed,
                kept = n_kept,
                stored = store.len(),
                "trial complete"
            );
        }

        let tracks = resolver::resolve(
            store.into_tracks(),
            &mut ledger,
            &bank,
            &self.layout,
            &self.model,
            &self.params,
        );
        debug!(event = event_id, tracks = tracks.len(), "event resolved");
        Ok(tracks)
    }
}
