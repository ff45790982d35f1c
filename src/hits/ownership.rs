//! # Ownership ledger
//!
//! Bidirectional hit-ownership bookkeeping: which candidates claim a hit and
//! which stored tracks own it. The candidate and track sides are kept in two
//! id-to-id-set maps; a hit's `taken` flag (owned by at least one track) is
//! maintained alongside and consumed by hit pickup.
//!
//! Every claim and release goes through this ledger in the same call that
//! mutates the owning candidate or track, so the two directions never drift
//! apart.

use ahash::RandomState;
use smallvec::SmallVec;
use std::collections::HashMap;

use crate::candidates::CandidateId;
use crate::hits::HitId;
use crate::tracks::TrackId;

type OwnerMap<T> = HashMap<HitId, SmallVec<[T; 2]>, RandomState>;

/// Per-event hit ownership state.
#[derive(Debug, Default)]
pub struct HitLedger {
    cand_owners: OwnerMap<CandidateId>,
    track_owners: OwnerMap<TrackId>,
    taken: Vec<bool>,
}

impl HitLedger {
    pub fn new(n_hits: usize) -> Self {
        Self {
            cand_owners: HashMap::default(),
            track_owners: HashMap::default(),
            taken: vec![false; n_hits],
        }
    }

    // ---------------------------------------------------------------------------------------------
    // Candidate side
    // ---------------------------------------------------------------------------------------------

    pub fn claim_for_candidate(&mut self, hit: HitId, candidate: CandidateId) {
        let owners = self.cand_owners.entry(hit).or_default();
        if !owners.contains(&candidate) {
            owners.push(candidate);
        }
    }

    pub fn release_for_candidate(&mut self, hit: HitId, candidate: CandidateId) {
        if let Some(owners) = self.cand_owners.get_mut(&hit) {
            owners.retain(|c| *c != candidate);
            if owners.is_empty() {
                self.cand_owners.remove(&hit);
            }
        }
    }

    pub fn candidates_of(&self, hit: HitId) -> &[CandidateId] {
        self.cand_owners.get(&hit).map_or(&[], |owners| owners)
    }

    pub fn n_candidate_owners(&self, hit: HitId) -> usize {
        self.candidates_of(hit).len()
    }

    /// Drop every candidate claim. Called once a trial's candidates are
    /// promoted or discarded.
    pub fn clear_candidates(&mut self) {
        self.cand_owners.clear();
    }

    // ---------------------------------------------------------------------------------------------
    // Track side
    // ---------------------------------------------------------------------------------------------

    pub fn claim_for_track(&mut self, hit: HitId, track: TrackId) {
        let owners = self.track_owners.entry(hit).or_default();
        if !owners.contains(&track) {
            owners.push(track);
        }
        self.taken[hit.0 as usize] = true;
    }

    pub fn release_for_track(&mut self, hit: HitId, track: TrackId) {
        if let Some(owners) = self.track_owners.get_mut(&hit) {
            owners.retain(|t| *t != track);
            if owners.is_empty() {
                self.track_owners.remove(&hit);
                self.taken[hit.0 as usize] = false;
            }
        }
    }

    pub fn tracks_of(&self, hit: HitId) -> &[TrackId] {
        self.track_owners.get(&hit).map_or(&[], |owners| owners)
    }

    pub fn n_track_owners(&self, hit: HitId) -> usize {
        self.tracks_of(hit).len()
    }

    /// True once any stored track owns the hit.
    pub fn is_taken(&self, hit: HitId) -> bool {
        self.taken[hit.0 as usize]
    }

    /// Taken flags for a contiguous arena range, aligned with the module's
    /// hit slice handed to the prediction step.
    pub fn taken_flags(&self, range: std::ops::Range<usize>) -> &[bool] {
        &self.taken[range]
    }
}
