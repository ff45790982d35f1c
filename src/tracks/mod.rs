//! # Stored tracks
//!
//! Committed candidates become [`Track`]s in the per-event [`TrackStore`].
//! Promotion stamps the track id, claims every hit on the track side of the
//! ledger and thereby flips the hits' taken flags, which is how one trial's
//! results constrain the next.
//!
//! The cross-track cleanup that runs after both trials lives in
//! [`resolver`].

pub mod resolver;

use std::fmt;

use crate::candidates::TrackCandidate;
use crate::constants::TrackHits;
use crate::hits::ownership::HitLedger;
use crate::hits::{HitBank, HitId};
use crate::kalman::{MeasurementSite, TimeWindow};
use crate::tracker::TrackerHalf;

/// Per-event stable track handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TrackId(pub u32);

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "track#{}", self.0)
    }
}

/// One found track.
#[derive(Debug, Clone)]
pub struct Track {
    pub id: TrackId,
    pub half: TrackerHalf,
    pub event_id: u64,
    /// Visited module planes, ascending layer.
    pub sites: Vec<MeasurementSite>,
    /// Owned hits, in attach order.
    pub hits: TrackHits,
    /// Smoothed chi-square of the latest full fit.
    pub chi2: f64,
    pub t_min: f64,
    pub t_max: f64,
    /// Index of the strategy that seeded this track.
    pub strategy: usize,
}

impl Track {
    pub fn n_hits(&self) -> usize {
        self.hits.len()
    }

    pub fn n_stereo(&self) -> usize {
        self.sites
            .iter()
            .filter(|site| site.hit.is_some() && site.stereo)
            .count()
    }

    pub fn n_axial(&self) -> usize {
        self.sites
            .iter()
            .filter(|site| site.hit.is_some() && !site.stereo)
            .count()
    }

    pub fn chi2_per_hit(&self) -> f64 {
        self.chi2 / self.n_hits().max(1) as f64
    }

    pub fn time_window(&self, max_spread: f64) -> TimeWindow {
        TimeWindow::new(self.t_max - max_spread, self.t_min + max_spread)
    }

    /// The site currently holding `id`, if any.
    pub fn site_with_hit(&self, id: HitId, bank: &HitBank) -> Option<usize> {
        let module = bank.module_of(id);
        let local = bank.local_index(id);
        self.sites
            .iter()
            .position(|site| site.module == module && site.hit == Some(local))
    }

    /// Rebuild the hit time range from the owned hits.
    pub fn refresh_time_range(&mut self, bank: &HitBank) {
        self.t_min = f64::INFINITY;
        self.t_max = f64::NEG_INFINITY;
        for &id in &self.hits {
            let t = bank.hit(id).time;
            self.t_min = self.t_min.min(t);
            self.t_max = self.t_max.max(t);
        }
    }
}

/// The per-event collection of committed tracks.
#[derive(Debug)]
pub struct TrackStore {
    tracks: Vec<Track>,
    next_id: u32,
    half: TrackerHalf,
    event_id: u64,
}

impl TrackStore {
    pub fn new(half: TrackerHalf, event_id: u64) -> Self {
        Self {
            tracks: Vec::new(),
            next_id: 0,
            half,
            event_id,
        }
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    /// Turn a finished candidate into a stored track, claiming its hits.
    ///
    /// Claiming marks every hit taken, so later seeds and pickups are
    /// steered away from it.
    pub fn promote(&mut self, cand: TrackCandidate, ledger: &mut HitLedger) -> TrackId {
        let id = TrackId(self.next_id);
        self.next_id += 1;
        for &hit in &cand.hits {
            ledger.claim_for_track(hit, id);
        }
        self.tracks.push(Track {
            id,
            half: self.half,
            event_id: self.event_id,
            chi2: cand.chi2(),
            sites: cand.sites,
            hits: cand.hits,
            t_min: cand.t_min,
            t_max: cand.t_max,
            strategy: cand.strategy,
        });
        id
    }

    /// Hand the tracks over to the resolver.
    pub fn into_tracks(self) -> Vec<Track> {
        self.tracks
    }
}
