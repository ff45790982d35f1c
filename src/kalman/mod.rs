//! # Kalman collaborator seam
//!
//! Pattern recognition owns the combinatorial search and the candidate
//! life cycle; the elementary state-estimation arithmetic lives behind the
//! two traits defined here and is supplied by the caller:
//!
//! - [`SeedFitter`] — the closed-form/linearized 5-hit seed fit.
//! - [`SurfaceModel`] — per-surface prediction, filtering, smoothing and
//!   hit selection.
//!
//! The engine fixes the *data* flowing through the seam (a 5-parameter
//! helix estimate with covariance, per-layer [`MeasurementSite`] records)
//! and interprets only what its gates need: curvature, slope and the
//! reference-point projections.

pub mod site;

pub use site::MeasurementSite;

use crate::constants::{HelixCov, HelixVec, SEED_LAYERS};
use crate::hits::Hit;
use crate::tracker::Module;

/// A linearized helix estimate with its covariance.
#[derive(Debug, Clone, PartialEq)]
pub struct HelixState {
    pub a: HelixVec,
    pub cov: HelixCov,
}

impl HelixState {
    pub fn new(a: HelixVec, cov: HelixCov) -> Self {
        Self { a, cov }
    }

    /// Signed distance of closest approach to the reference axis.
    pub fn drho(&self) -> f64 {
        self.a[0]
    }

    pub fn phi0(&self) -> f64 {
        self.a[1]
    }

    pub fn curvature(&self) -> f64 {
        self.a[2]
    }

    /// Longitudinal offset at the point of closest approach.
    pub fn dz(&self) -> f64 {
        self.a[3]
    }

    pub fn tan_lambda(&self) -> f64 {
        self.a[4]
    }

    /// Same estimate with the covariance scaled up, used to restart a fit
    /// without trusting the previous uncertainty.
    pub fn inflated(&self, factor: f64) -> Self {
        Self {
            a: self.a,
            cov: self.cov * factor,
        }
    }
}

/// Closed time-coincidence window on hit readout times.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeWindow {
    pub lo: f64,
    pub hi: f64,
}

impl TimeWindow {
    pub fn new(lo: f64, hi: f64) -> Self {
        Self { lo, hi }
    }

    pub fn unbounded() -> Self {
        Self {
            lo: f64::NEG_INFINITY,
            hi: f64::INFINITY,
        }
    }

    pub fn contains(&self, t: f64) -> bool {
        t >= self.lo && t <= self.hi
    }
}

/// Outcome of one prediction step at a module instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Propagation {
    /// Intersection found and a hit was attached.
    Attached,
    /// Intersection found, no acceptable hit (or pickup disabled).
    Empty,
    /// No geometric intersection with this module instance.
    Missed,
    /// Numerical failure; the candidate cannot be extended further.
    Diverged,
}

/// One seed hit with its module geometry, handed to the seed fit.
#[derive(Debug, Clone, Copy)]
pub struct SeedHit<'a> {
    pub module: &'a Module,
    pub hit: &'a Hit,
}

/// Result of a successful seed fit.
#[derive(Debug, Clone)]
pub struct SeedFit {
    /// Fitted helix at the reference surface.
    pub state: HelixState,
    /// Projected distance from the reference axis at the reference plane.
    pub drho: f64,
    /// Projected longitudinal offset at the reference plane.
    pub dz: f64,
}

/// The external 5-hit seed fit.
pub trait SeedFitter {
    /// Fit one hit per strategy layer into a linearized helix.
    ///
    /// Arguments
    /// -----------------
    /// * `hits`: the five seed hits, ordered by strategy layer.
    /// * `reference`: ordinate of the reference plane the projections are
    ///   quoted at.
    ///
    /// Return
    /// ----------
    /// * `Some(SeedFit)` on success, `None` when the fit fails (degenerate
    ///   hit configuration); failures are silently skipped upstream.
    fn fit(&self, hits: &[SeedHit<'_>; SEED_LAYERS], reference: f64) -> Option<SeedFit>;
}

/// Everything one prediction step may look at.
#[derive(Debug)]
pub struct PredictContext<'a> {
    /// State to propagate from; `None` restarts from the site's own record.
    pub from: Option<&'a HelixState>,
    /// Module the state was estimated at, `None` for the first step.
    pub from_module: Option<&'a Module>,
    /// Module instance being stepped onto.
    pub target: &'a Module,
    /// The target module's hits.
    pub hits: &'a [Hit],
    /// Aligned with `hits`: true when a stored track already owns the hit.
    pub taken: &'a [bool],
    /// Local index of a hit the site must take, overriding selection and
    /// the `pickup` flag (seed layers, refits of already-owned hits).
    pub pinned: Option<usize>,
    /// Whether a taken hit may still be attached.
    pub share_ok: bool,
    /// Whether new hits may be attached at all.
    pub pickup: bool,
    /// Whether further instances remain at this layer after a miss.
    pub more_instances: bool,
    /// Time-coincidence window new hits must fall into.
    pub window: TimeWindow,
}

/// The external per-surface filter/smooth arithmetic.
pub trait SurfaceModel {
    /// Propagate onto a module instance and, if allowed, select a hit.
    ///
    /// Updates the site's predicted state (and, when a hit is chosen, the
    /// site's hit index and residual).
    fn predict(&self, site: &mut MeasurementSite, ctx: &PredictContext<'_>) -> Propagation;

    /// Fold the site's chosen hit into the filtered state.
    ///
    /// Updates filtered state, chi-square increment and residual; returns
    /// false on numerical failure.
    fn filter(&self, site: &mut MeasurementSite, hits: &[Hit]) -> bool;

    /// Combine the site's filtered state with the next site's smoothed one.
    fn smooth(&self, site: &mut MeasurementSite, next: &MeasurementSite, hits: &[Hit]);

    /// Search the module for an attachable hit near the site's state.
    ///
    /// Arguments
    /// -----------------
    /// * `hits` / `taken`: the module's hits and their taken flags; taken
    ///   hits are never selected here.
    /// * `max_chi2_inc`: upper bound on the accepted chi-square increment.
    /// * `window`: time-coincidence window.
    /// * `exclude`: local index that must not be selected again.
    ///
    /// Return
    /// ----------
    /// * The selected local index after updating the site, or `None`.
    fn pick_hit(
        &self,
        site: &mut MeasurementSite,
        hits: &[Hit],
        taken: &[bool],
        max_chi2_inc: f64,
        window: TimeWindow,
        exclude: Option<usize>,
    ) -> Option<usize>;

    /// Detach the site's hit, resetting its contribution.
    fn unpick_hit(&self, site: &mut MeasurementSite);

    /// Extrapolate a state to the reference point; consumed by the
    /// impact-parameter gates.
    fn origin_params(&self, state: &HelixState) -> HelixVec;
}
