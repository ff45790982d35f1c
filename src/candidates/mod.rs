//! # Track candidates
//!
//! A [`TrackCandidate`] is one seed grown into a full track hypothesis: an
//! ascending-layer list of [`MeasurementSite`]s, the hits attached at them
//! and the running fit bookkeeping (filtered and smoothed chi-square, hit
//! time range, shared-hit count).
//!
//! Candidates are built locally while a seed walks the acceptance pipeline
//! and enter the trial arena only once kept; their [`CandidateId`] is the
//! arena index. Hit claims and releases are not handled here, the lifecycle
//! and arbitration stages drive the ledger.

pub mod extension;
pub mod lifecycle;

use std::fmt;

use crate::constants::{SeedHitIds, TrackHits, SEED_LAYERS};
use crate::hits::{HitBank, HitId};
use crate::kalman::{MeasurementSite, TimeWindow};
use crate::seeding::Seed;

/// Arena index of a kept candidate within its trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CandidateId(pub u32);

impl CandidateId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for CandidateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cand#{}", self.0)
    }
}

/// One seed grown into a track hypothesis.
#[derive(Debug, Clone)]
pub struct TrackCandidate {
    /// Visited module planes, ascending layer at all times.
    pub sites: Vec<MeasurementSite>,
    /// Attached hits, in attach order.
    pub hits: TrackHits,
    /// The five hits this candidate was seeded from; never dropped.
    pub seed_hits: SeedHitIds,
    /// The seed strategy's layers; hits on these stay pinned.
    pub seed_layers: [usize; SEED_LAYERS],
    /// Accumulated filtered chi-square.
    pub chi2_f: f64,
    /// Accumulated smoothed chi-square, valid while `smoothed`.
    pub chi2_s: f64,
    /// Earliest attached hit time.
    pub t_min: f64,
    /// Latest attached hit time.
    pub t_max: f64,
    /// Hits attached while already owned by a stored track, counted at
    /// attach time.
    pub n_taken: u32,
    /// A forward filter pass has run over the current site list.
    pub filtered: bool,
    /// A smoothing pass has run over the current site list.
    pub smoothed: bool,
    /// Cleared when hit removal pushes the candidate below its floors.
    pub good: bool,
    /// Index of the originating strategy in the configured table.
    pub strategy: usize,
}

impl TrackCandidate {
    /// Start a fresh candidate from a fitted seed. Sites and hits are
    /// filled by the outward extension; the hit time range already covers
    /// the five seed hits so pickup is time-gated from the first step.
    pub fn from_seed(seed: &Seed, bank: &HitBank) -> Self {
        let mut t_min = f64::INFINITY;
        let mut t_max = f64::NEG_INFINITY;
        for &id in &seed.hits {
            let t = bank.hit(id).time;
            t_min = t_min.min(t);
            t_max = t_max.max(t);
        }
        Self {
            sites: Vec::new(),
            hits: TrackHits::new(),
            seed_hits: seed.hits.clone(),
            seed_layers: seed.layers,
            chi2_f: 0.0,
            chi2_s: 0.0,
            t_min,
            t_max,
            n_taken: 0,
            filtered: false,
            smoothed: false,
            good: true,
            strategy: seed.strategy,
        }
    }

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

    /// Chi-square at the most refined completed stage.
    pub fn chi2(&self) -> f64 {
        if self.smoothed {
            self.chi2_s
        } else {
            self.chi2_f
        }
    }

    pub fn chi2_per_hit(&self) -> f64 {
        self.chi2() / self.n_hits().max(1) as f64
    }

    /// Window future hits must fall into to stay coincident with the hits
    /// already attached.
    pub fn time_window(&self, max_spread: f64) -> TimeWindow {
        TimeWindow::new(self.t_max - max_spread, self.t_min + max_spread)
    }

    /// The pinned seed hit of a layer, if this is a seed layer.
    pub fn seed_hit_on(&self, layer: usize) -> Option<HitId> {
        self.seed_layers
            .iter()
            .position(|&l| l == layer)
            .map(|d| self.seed_hits[d])
    }

    pub fn site_index(&self, layer: usize) -> Option<usize> {
        self.sites.iter().position(|site| site.layer == layer)
    }

    /// The site currently holding `id`, if any.
    pub fn site_with_hit(&self, id: HitId, bank: &HitBank) -> Option<usize> {
        let module = bank.module_of(id);
        let local = bank.local_index(id);
        self.sites
            .iter()
            .position(|site| site.module == module && site.hit == Some(local))
    }

    /// Hit ids in canonical order, the candidate's identity for duplicate
    /// detection.
    pub fn signature(&self) -> TrackHits {
        let mut sorted = self.hits.clone();
        sorted.sort_unstable();
        sorted
    }

    /// Detach the hit at `site_idx`, keeping the site as a crossed plane.
    /// The site must currently hold a hit.
    ///
    /// Both chi-square totals lose the site's increment and the hit time
    /// range is rebuilt from the remaining hits. When the removal pushes
    /// the stereo or axial count below its floor the candidate is marked
    /// not good.
    ///
    /// Return
    /// ----------
    /// * The detached hit id.
    pub fn drop_site_hit(
        &mut self,
        site_idx: usize,
        bank: &HitBank,
        min_stereo: usize,
        min_axial: usize,
    ) -> HitId {
        let site = &mut self.sites[site_idx];
        debug_assert!(site.hit.is_some());
        let local = site.hit.unwrap_or_default();
        let id = bank.id_at(site.module, local);

        self.chi2_f -= site.chi2_inc;
        self.chi2_s -= site.chi2_inc;
        site.clear_hit();
        self.hits.retain(|&mut h| h != id);

        self.t_min = f64::INFINITY;
        self.t_max = f64::NEG_INFINITY;
        for &h in &self.hits {
            let t = bank.hit(h).time;
            self.t_min = self.t_min.min(t);
            self.t_max = self.t_max.max(t);
        }

        if self.n_stereo() < min_stereo || self.n_axial() < min_axial {
            self.good = false;
        }
        id
    }
}
