//! Candidate acceptance pipeline.
//!
//! [`process_seed`] drives one seed from its 5-hit start to a final
//! disposition: committed to the track store right away, kept in the
//! trial arena for arbitration, or rejected with a
//! [`RejectReason`]. Rejection is the normal fate of most seeds and is
//! never an error.
//!
//! The pipeline, in order: ownership screen, outward extension with
//! initial quality gates, smoothing, inward extension, duplicate screen,
//! chi-square repair (drop the worst non-seed hit when that brings the
//! ratio under the gate), refit, orientation floors, smoothed repair,
//! re-screen after mutation, early commit of unambiguous candidates,
//! arena insertion.
//!
//! Two orderings are load-bearing: a candidate that duplicates an earlier
//! kept hit set is discarded without comparing quality, and an early
//! commit immediately evicts the committed hits from every kept
//! candidate, so the outcome of a trial depends on its seed order.

use std::fmt;

use ordered_float::OrderedFloat;
use smallvec::SmallVec;

use crate::config::{PatRecParams, TrialCuts};
use crate::constants::TrackHits;
use crate::hits::ownership::HitLedger;
use crate::hits::HitBank;
use crate::kalman::SurfaceModel;
use crate::seeding::Seed;
use crate::tracker::TrackerLayout;
use crate::tracks::{TrackId, TrackStore};

use super::extension::{extend_inward, extend_outward, refit, smooth, Extension};
use super::{CandidateId, TrackCandidate};

/// Why a seed was discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// A seed hit is already owned by a stored track.
    SeedHitTaken,
    /// The seed hits are all carried by an already-kept candidate.
    InsideKeptCandidate,
    /// The outward extension lost a seed hit or diverged.
    OutwardDiverged,
    /// Too few hits after the outward extension.
    TooFewInitialHits,
    /// Chi-square per hit over the gate right after the outward extension.
    InitialChi2TooHigh,
    /// The inward extension diverged.
    InwardDiverged,
    /// Same hit set as an earlier kept candidate.
    DuplicateHitSet,
    /// Below the trial's hit floor.
    TooFewHits,
    /// Chi-square per hit over the gate, not repairable by one removal.
    Chi2TooHigh,
    /// A refit pass failed.
    RefitFailed,
    /// Below the stereo or axial floor.
    BadStereoAxialSplit,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            RejectReason::SeedHitTaken => "seed hit already on a stored track",
            RejectReason::InsideKeptCandidate => "seed contained in a kept candidate",
            RejectReason::OutwardDiverged => "outward extension diverged",
            RejectReason::TooFewInitialHits => "too few hits after outward extension",
            RejectReason::InitialChi2TooHigh => "initial chi2 per hit over the gate",
            RejectReason::InwardDiverged => "inward extension diverged",
            RejectReason::DuplicateHitSet => "duplicate hit set",
            RejectReason::TooFewHits => "too few hits",
            RejectReason::Chi2TooHigh => "chi2 per hit over the gate",
            RejectReason::RefitFailed => "refit failed",
            RejectReason::BadStereoAxialSplit => "bad stereo/axial split",
        };
        f.write_str(text)
    }
}

/// Final disposition of one processed seed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedOutcome {
    /// Promoted straight to the track store.
    Committed(TrackId),
    /// Kept in the trial arena for arbitration.
    Kept(CandidateId),
    Rejected(RejectReason),
}

/// The kept candidates of one trial. Arena indices double as
/// [`CandidateId`]s; dead candidates stay in place with `good` cleared.
#[derive(Debug, Default)]
pub struct TrialState {
    pub kept: Vec<TrackCandidate>,
}

impl TrialState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn keep(&mut self, cand: TrackCandidate) -> CandidateId {
        let id = CandidateId(self.kept.len() as u32);
        self.kept.push(cand);
        id
    }
}

/// True when an earlier kept candidate carries exactly this hit set.
///
/// The newer candidate is the one discarded, whatever the two
/// chi-squares are.
pub(crate) fn has_duplicate(trial: &TrialState, signature: &TrackHits) -> bool {
    trial
        .kept
        .iter()
        .any(|kept| kept.good && kept.signature() == *signature)
}

/// Worst removable site: holds a hit, not on a seed layer, increment over
/// `min_inc` when given. Ties pick the outermost.
fn worst_droppable(cand: &TrackCandidate, min_inc: Option<f64>) -> Option<usize> {
    cand.sites
        .iter()
        .enumerate()
        .filter(|(_, site)| site.hit.is_some() && !cand.seed_layers.contains(&site.layer))
        .filter(|(_, site)| min_inc.map_or(true, |m| site.chi2_inc > m))
        .max_by_key(|(_, site)| OrderedFloat(site.chi2_inc))
        .map(|(idx, _)| idx)
}

/// Promote a finished candidate and evict its hits from every kept
/// candidate that cannot legally share them.
fn commit(
    cand: TrackCandidate,
    trial: &mut TrialState,
    ledger: &mut HitLedger,
    store: &mut TrackStore,
    bank: &HitBank,
    cuts: &TrialCuts,
    params: &PatRecParams,
) -> TrackId {
    let hits = cand.hits.clone();
    let track_id = store.promote(cand, ledger);

    for &hit in &hits {
        let owners: SmallVec<[CandidateId; 2]> =
            ledger.candidates_of(hit).iter().copied().collect();
        for cand_id in owners {
            let other = &mut trial.kept[cand_id.index()];
            if other.good && (other.n_taken + 1) as usize <= params.max_shared {
                other.n_taken += 1;
            } else {
                if let Some(site_idx) = other.site_with_hit(hit, bank) {
                    other.drop_site_hit(site_idx, bank, cuts.min_stereo, params.min_axial);
                }
                ledger.release_for_candidate(hit, cand_id);
            }
        }
    }
    track_id
}

/// Drive one seed through the acceptance pipeline.
///
/// Return
/// ----------
/// * [`SeedOutcome::Committed`] when the candidate was unambiguous enough
///   to be stored immediately, [`SeedOutcome::Kept`] when it enters the
///   arena, [`SeedOutcome::Rejected`] otherwise.
#[allow(clippy::too_many_arguments)]
pub fn process_seed<M: SurfaceModel>(
    seed: &Seed,
    trial: &mut TrialState,
    ledger: &mut HitLedger,
    store: &mut TrackStore,
    model: &M,
    layout: &TrackerLayout,
    bank: &HitBank,
    cuts: &TrialCuts,
    params: &PatRecParams,
) -> SeedOutcome {
    // Ownership screen.
    let inside = trial.kept.iter().any(|kept| {
        kept.good && seed.hits.iter().all(|id| kept.hits.contains(id))
    });
    if inside {
        return SeedOutcome::Rejected(RejectReason::InsideKeptCandidate);
    }
    if seed.hits.iter().any(|&id| ledger.is_taken(id)) {
        return SeedOutcome::Rejected(RejectReason::SeedHitTaken);
    }

    // Outward extension and initial gates.
    let mut cand = TrackCandidate::from_seed(seed, bank);
    let start = seed.state.inflated(params.covariance_inflation);
    if extend_outward(&mut cand, &start, model, layout, bank, ledger, params)
        == Extension::Aborted
    {
        return SeedOutcome::Rejected(RejectReason::OutwardDiverged);
    }
    if cand.n_hits() < params.min_hits_initial {
        return SeedOutcome::Rejected(RejectReason::TooFewInitialHits);
    }
    if cand.chi2_per_hit() > cuts.max_chi2_per_hit {
        return SeedOutcome::Rejected(RejectReason::InitialChi2TooHigh);
    }

    smooth(&mut cand, model, bank);

    if cand.seed_layers[0] > 0
        && extend_inward(&mut cand, model, layout, bank, ledger, params) == Extension::Aborted
    {
        return SeedOutcome::Rejected(RejectReason::InwardDiverged);
    }

    if has_duplicate(trial, &cand.signature()) {
        return SeedOutcome::Rejected(RejectReason::DuplicateHitSet);
    }

    if cand.n_hits() < cuts.min_hits {
        return SeedOutcome::Rejected(RejectReason::TooFewHits);
    }

    // One removal may repair the ratio; otherwise the candidate is out.
    let mut mutated = false;
    if cand.chi2_per_hit() > cuts.max_chi2_per_hit {
        let Some(worst) = worst_droppable(&cand, None) else {
            return SeedOutcome::Rejected(RejectReason::Chi2TooHigh);
        };
        let n = cand.n_hits();
        let repaired = (cand.chi2() - cand.sites[worst].chi2_inc) / (n - 1).max(1) as f64;
        if repaired > cuts.max_chi2_per_hit {
            return SeedOutcome::Rejected(RejectReason::Chi2TooHigh);
        }
        cand.drop_site_hit(worst, bank, cuts.min_stereo, params.min_axial);
        mutated = true;
    }

    if !refit(&mut cand, model, layout, bank, ledger, params) {
        return SeedOutcome::Rejected(RejectReason::RefitFailed);
    }

    if cand.n_stereo() < cuts.min_stereo || cand.n_axial() < params.min_axial {
        return SeedOutcome::Rejected(RejectReason::BadStereoAxialSplit);
    }

    smooth(&mut cand, model, bank);

    // Smoothed repair: only increments worth removing qualify.
    if cand.chi2_per_hit() > cuts.max_chi2_per_hit && cand.n_hits() > cuts.min_hits {
        if let Some(worst) = worst_droppable(&cand, Some(params.min_chi2_drop)) {
            cand.drop_site_hit(worst, bank, cuts.min_stereo, params.min_axial);
            if !refit(&mut cand, model, layout, bank, ledger, params) {
                return SeedOutcome::Rejected(RejectReason::RefitFailed);
            }
            smooth(&mut cand, model, bank);
            mutated = true;
        }
    }
    if !cand.good {
        return SeedOutcome::Rejected(RejectReason::BadStereoAxialSplit);
    }

    if mutated && has_duplicate(trial, &cand.signature()) {
        return SeedOutcome::Rejected(RejectReason::DuplicateHitSet);
    }

    // Unambiguous candidates go straight to the store.
    if cand.n_hits() > params.commit_hits
        && cand.chi2_s < params.commit_chi2
        && cand.n_stereo() > params.commit_stereo
    {
        if let Some(front) = cand.sites.first().and_then(|site| site.best_state()) {
            let origin = model.origin_params(front);
            if origin[0].abs() < cuts.max_drho && origin[3].abs() < cuts.max_dz {
                let track_id = commit(cand, trial, ledger, store, bank, cuts, params);
                return SeedOutcome::Committed(track_id);
            }
        }
    }

    let hits = cand.hits.clone();
    let id = trial.keep(cand);
    for &hit in &hits {
        ledger.claim_for_candidate(hit, id);
    }
    SeedOutcome::Kept(id)
}
