//! # Cross-candidate arbitration
//!
//! At the end of a trial the kept candidates compete for the hits they
//! claimed. The arbitrator ranks them, settles every contested hit,
//! re-checks the survivors' floors, prunes candidates that still share
//! too much, and promotes what is left to the track store in rank order.
//!
//! Hits are visited in ascending arena order and candidates in rank
//! order throughout, so the outcome is reproducible for identical input.

use std::cmp::Reverse;

use ordered_float::OrderedFloat;
use smallvec::SmallVec;

use crate::candidates::lifecycle::TrialState;
use crate::candidates::CandidateId;
use crate::config::{PatRecParams, TrialCuts};
use crate::hits::ownership::HitLedger;
use crate::hits::{HitBank, HitId};
use crate::tracks::TrackStore;

/// Candidate indices ranked best first: most hits, then lowest
/// chi-square, then insertion order.
fn ranked(trial: &TrialState) -> Vec<usize> {
    let mut order: Vec<usize> = (0..trial.kept.len())
        .filter(|&idx| trial.kept[idx].good)
        .collect();
    order.sort_by_key(|&idx| {
        let cand = &trial.kept[idx];
        (Reverse(cand.n_hits()), OrderedFloat(cand.chi2()), idx)
    });
    order
}

fn release_all(trial: &mut TrialState, ledger: &mut HitLedger, idx: usize) {
    let hits = trial.kept[idx].hits.clone();
    let id = CandidateId(idx as u32);
    for &hit in &hits {
        ledger.release_for_candidate(hit, id);
    }
}

/// Settle one trial's candidates and promote the survivors.
///
/// Stages
/// -----------------
/// 1. Rank the live candidates.
/// 2. For every hit with two or more live owners the best-ranked owner
///    keeps it; every other owner loses it when its increment exceeds
///    the shared chi-square bound or its residual exceeds half the
///    shared residual bound (in units of the hit uncertainty). Owners
///    under both bounds go on sharing.
/// 3. Candidates pushed below the trial's hit, stereo or axial floor are
///    dropped and their claims released.
/// 4. Worst first, candidates still sharing more hits than allowed, with
///    another live candidate or with a stored track, are dropped whole.
/// 5. Survivors are promoted in rank order, claiming their hits.
pub fn arbitrate(
    trial: &mut TrialState,
    ledger: &mut HitLedger,
    store: &mut TrackStore,
    bank: &HitBank,
    cuts: &TrialCuts,
    params: &PatRecParams,
) {
    let order = ranked(trial);
    let mut rank_of = vec![usize::MAX; trial.kept.len()];
    for (rank, &idx) in order.iter().enumerate() {
        rank_of[idx] = rank;
    }

    // Contested hits, arena order.
    for raw in 0..bank.n_hits() as u32 {
        let hit = HitId(raw);
        let owners: SmallVec<[CandidateId; 2]> = ledger
            .candidates_of(hit)
            .iter()
            .copied()
            .filter(|owner| trial.kept[owner.index()].good)
            .collect();
        if owners.len() < 2 {
            continue;
        }
        let Some(best) = owners.iter().copied().min_by_key(|owner| rank_of[owner.index()])
        else {
            continue;
        };

        let sigma = bank.hit(hit).sigma;
        for owner in owners {
            if owner == best {
                continue;
            }
            let cand = &mut trial.kept[owner.index()];
            let Some(site_idx) = cand.site_with_hit(hit, bank) else {
                ledger.release_for_candidate(hit, owner);
                continue;
            };
            let site = &cand.sites[site_idx];
            let over = site.chi2_inc > params.max_shared_chi2
                || site.resid.abs() / sigma > params.max_shared_resid / 2.0;
            if over {
                cand.drop_site_hit(site_idx, bank, cuts.min_stereo, params.min_axial);
                ledger.release_for_candidate(hit, owner);
            }
        }
    }

    // Floors, and claim cleanup for everything dead by now.
    for idx in 0..trial.kept.len() {
        let cand = &trial.kept[idx];
        let below = cand.n_hits() < cuts.min_hits
            || cand.n_stereo() < cuts.min_stereo
            || cand.n_axial() < params.min_axial;
        if !cand.good || below {
            trial.kept[idx].good = false;
            release_all(trial, ledger, idx);
        }
    }

    // Sharing-count prune, worst first so freed hits help better ones.
    for &idx in order.iter().rev() {
        if !trial.kept[idx].good {
            continue;
        }
        let shared = trial.kept[idx]
            .hits
            .iter()
            .filter(|&&hit| {
                ledger.n_track_owners(hit) >= 1 || ledger.n_candidate_owners(hit) > 1
            })
            .count();
        if shared > params.max_shared {
            trial.kept[idx].good = false;
            release_all(trial, ledger, idx);
        }
    }

    for &idx in &order {
        if trial.kept[idx].good {
            store.promote(trial.kept[idx].clone(), ledger);
        }
    }
}
