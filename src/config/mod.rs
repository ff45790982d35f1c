//! # Pattern recognition configuration
//!
//! All tunable cuts of the engine live in [`PatRecParams`], built through a
//! validating fluent builder. The two global trials each read their own
//! immutable [`TrialCuts`] value; nothing here is mutated once built.
//!
//! ## Overview
//!
//! - [`TrialCuts`] — the trial-indexed gates: curvature, slope, impact
//!   parameters, chi-square per hit, minimum hit and stereo counts.
//! - [`SeedStrategy`] — one ordered 5-layer combination seeds are drawn
//!   from (3 stereo + 2 axial).
//! - [`PatRecParams`] — trial cuts plus the global knobs: sharing limits,
//!   timing coincidence, pickup bounds, early-commit thresholds, final-fit
//!   iterations.
//!
//! ## Example
//!
//! ```rust
//! use patrec::config::PatRecParams;
//!
//! let params = PatRecParams::builder()
//!     .max_time_spread(24.0)
//!     .max_shared(1)
//!     .fit_iterations(3)
//!     .build()
//!     .unwrap();
//! assert_eq!(params.max_shared, 1);
//! ```

use std::cmp::Ordering::{Equal, Greater};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constants::SEED_LAYERS;
use crate::patrec_errors::PatRecError;
use crate::tracker::TrackerLayout;

/// The gates applied with trial-specific strength.
///
/// Trial 1 runs tight cuts; trial 2 reruns the surviving hits with looser
/// ones. Both trials read the same code paths, each with its own value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrialCuts {
    /// Seeds with `|curvature|` at or above this are rejected.
    pub max_curvature: f64,
    /// Seeds with `|tan-lambda|` at or above this are rejected.
    pub max_tan_lambda: f64,
    /// Bound on the projected distance from the reference axis.
    pub max_drho: f64,
    /// Bound on the projected longitudinal offset.
    pub max_dz: f64,
    /// Candidate chi-square per hit ceiling.
    pub max_chi2_per_hit: f64,
    /// Minimum hits a candidate must keep.
    pub min_hits: usize,
    /// Minimum stereo hits a candidate must keep.
    pub min_stereo: usize,
}

/// One fixed 5-layer seed combination.
///
/// Layers are listed in ascending order and must split 3 stereo + 2 axial
/// on the layout the engine runs with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedStrategy {
    layers: [usize; SEED_LAYERS],
}

impl SeedStrategy {
    pub const fn new(layers: [usize; SEED_LAYERS]) -> Self {
        Self { layers }
    }

    pub fn layers(&self) -> &[usize; SEED_LAYERS] {
        &self.layers
    }

    /// Innermost strategy layer; extension starts here.
    pub fn first_layer(&self) -> usize {
        self.layers[0]
    }

    pub fn contains(&self, layer: usize) -> bool {
        self.layers.contains(&layer)
    }

    /// Check the strategy against a concrete layout.
    ///
    /// Return
    /// ----------
    /// * `Ok(())` when all layers exist and the orientation split is exactly
    ///   3 stereo + 2 axial, [`PatRecError::InvalidStrategy`] otherwise.
    pub fn validate_against(&self, layout: &TrackerLayout) -> Result<(), PatRecError> {
        for &layer in &self.layers {
            if layer >= layout.n_layers() {
                return Err(PatRecError::InvalidStrategy(format!(
                    "{self} references layer {layer}, layout has {}",
                    layout.n_layers()
                )));
            }
        }
        let stereo = self
            .layers
            .iter()
            .filter(|&&layer| layout.is_stereo(layer))
            .count();
        if stereo != 3 {
            return Err(PatRecError::InvalidStrategy(format!(
                "{self} has {stereo} stereo layers, need exactly 3 stereo + 2 axial"
            )));
        }
        Ok(())
    }
}

impl fmt::Display for SeedStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{} {} {} {} {}]",
            self.layers[0], self.layers[1], self.layers[2], self.layers[3], self.layers[4]
        )
    }
}

/// The production seed table: every 5-layer combination tried per trial,
/// drawn up for a 14-layer stack with stereo on even layers.
pub const DEFAULT_STRATEGIES: [SeedStrategy; 15] = [
    SeedStrategy::new([6, 7, 8, 9, 10]),
    SeedStrategy::new([4, 5, 6, 7, 8]),
    SeedStrategy::new([5, 6, 8, 9, 10]),
    SeedStrategy::new([5, 6, 7, 8, 10]),
    SeedStrategy::new([3, 6, 8, 9, 10]),
    SeedStrategy::new([4, 5, 8, 9, 10]),
    SeedStrategy::new([4, 6, 7, 8, 9]),
    SeedStrategy::new([4, 6, 7, 9, 10]),
    SeedStrategy::new([2, 5, 8, 9, 12]),
    SeedStrategy::new([8, 10, 11, 12, 13]),
    SeedStrategy::new([6, 9, 10, 11, 12]),
    SeedStrategy::new([6, 7, 9, 10, 12]),
    SeedStrategy::new([2, 3, 4, 5, 6]),
    SeedStrategy::new([2, 4, 5, 6, 7]),
    SeedStrategy::new([6, 7, 8, 10, 11]),
];

/// Configuration for the pattern recognition engine.
///
/// Defaults
/// -----------------
/// Trial 1: `max_curvature = 4.0`, `max_tan_lambda = 0.12`,
/// `max_drho = 15.0`, `max_dz = 4.0`, `max_chi2_per_hit = 8.0`,
/// `min_hits = 7`, `min_stereo = 4`.
///
/// Trial 2: `max_curvature = 8.0`, `max_tan_lambda = 0.25`,
/// `max_drho = 25.0`, `max_dz = 10.0`, `max_chi2_per_hit = 16.0`,
/// `min_hits = 6`, `min_stereo = 3`.
///
/// * `min_hits_initial`: 5
/// * `min_axial`: 2
/// * `max_shared`: 2
/// * `max_time_spread`: 30.0
/// * `max_chi2_increment`: 10.0
/// * `min_chi2_drop`: 10.0
/// * `max_shared_chi2`: 8.0
/// * `max_shared_resid`: 20.0
/// * `commit_hits`: 9 (strictly more than)
/// * `commit_chi2`: 30.0
/// * `commit_stereo`: 4 (strictly more than)
/// * `fit_iterations`: 2
/// * `covariance_inflation`: 100.0
/// * `reference_plane`: 0.0
/// * `strategies`: [`DEFAULT_STRATEGIES`]
///
/// Notes & Validation
/// -----------------
/// * All chi-square and window bounds must be strictly positive.
/// * `min_hits_initial >= 5` and, per trial, `min_hits >= min_hits_initial`,
///   `min_stereo >= 3`; `min_axial >= 2` (a seed already carries that mix).
/// * `covariance_inflation >= 1`, `fit_iterations >= 1`.
/// * Strategy layer lists must be strictly ascending; the stereo/axial
///   split is checked against the layout when the engine is built.
///
/// See also
/// -----------------
/// * [`crate::engine::PatRec::new`] – consumes these parameters and
///   validates the strategies against the layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatRecParams {
    /// Per-trial gates, tried in order.
    pub trials: [TrialCuts; 2],

    // --- Candidate quality ---
    /// Minimum hits after the initial outward extension.
    pub min_hits_initial: usize,
    /// Minimum axial hits a candidate must keep (both trials).
    pub min_axial: usize,

    // --- Sharing / arbitration ---
    /// Maximum number of owners one hit may end up with.
    pub max_shared: usize,
    /// Chi-square increment above which a shared hit is stripped from the
    /// weaker owner.
    pub max_shared_chi2: f64,
    /// Residual bound (in sigma) whose half decides shared-hit eviction.
    pub max_shared_resid: f64,

    // --- Hit pickup ---
    /// Maximum spread of hit times on one candidate.
    pub max_time_spread: f64,
    /// Chi-square increment bound for picking up or substituting a hit.
    pub max_chi2_increment: f64,
    /// Smallest smoothed increment that qualifies a hit for removal.
    pub min_chi2_drop: f64,

    // --- Early commit ---
    /// A candidate with strictly more hits than this may commit early.
    pub commit_hits: usize,
    /// Smoothed chi-square ceiling for the early commit.
    pub commit_chi2: f64,
    /// Early commit needs strictly more stereo hits than this.
    pub commit_stereo: usize,

    // --- Fitting ---
    /// Full filter+smooth passes of the final track fit.
    pub fit_iterations: usize,
    /// Covariance scale factor applied when restarting a fit.
    pub covariance_inflation: f64,
    /// Ordinate of the reference plane seed projections are quoted at.
    pub reference_plane: f64,

    /// The seed layer combinations tried per trial.
    pub strategies: Vec<SeedStrategy>,
}

impl PatRecParams {
    /// Construct a new [`PatRecParams`] with the production default values.
    ///
    /// This is equivalent to calling [`PatRecParams::default()`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new [`PatRecParamsBuilder`] to configure custom cuts.
    ///
    /// # See also
    /// * [`PatRecParams`] – Holds all configuration for pattern recognition.
    pub fn builder() -> PatRecParamsBuilder {
        PatRecParamsBuilder::new()
    }

    /// The cuts of one trial.
    pub fn trial(&self, trial: usize) -> &TrialCuts {
        &self.trials[trial]
    }
}

impl Default for PatRecParams {
    fn default() -> Self {
        PatRecParams {
            trials: [
                TrialCuts {
                    max_curvature: 4.0,
                    max_tan_lambda: 0.12,
                    max_drho: 15.0,
                    max_dz: 4.0,
                    max_chi2_per_hit: 8.0,
                    min_hits: 7,
                    min_stereo: 4,
                },
                TrialCuts {
                    max_curvature: 8.0,
                    max_tan_lambda: 0.25,
                    max_drho: 25.0,
                    max_dz: 10.0,
                    max_chi2_per_hit: 16.0,
                    min_hits: 6,
                    min_stereo: 3,
                },
            ],

            min_hits_initial: 5,
            min_axial: 2,

            max_shared: 2,
            max_shared_chi2: 8.0,
            max_shared_resid: 20.0,

            max_time_spread: 30.0,
            max_chi2_increment: 10.0,
            min_chi2_drop: 10.0,

            commit_hits: 9,
            commit_chi2: 30.0,
            commit_stereo: 4,

            fit_iterations: 2,
            covariance_inflation: 100.0,
            reference_plane: 0.0,

            strategies: DEFAULT_STRATEGIES.to_vec(),
        }
    }
}

/// Builder for [`PatRecParams`], with validation.
#[derive(Debug, Clone)]
pub struct PatRecParamsBuilder {
    params: PatRecParams,
}

impl Default for PatRecParamsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PatRecParamsBuilder {
    /// Create a new builder initialized with default values.
    pub fn new() -> Self {
        Self {
            params: PatRecParams::default(),
        }
    }

    // --- Trial cuts ---
    pub fn trial_cuts(mut self, trial: usize, cuts: TrialCuts) -> Self {
        self.params.trials[trial] = cuts;
        self
    }

    // --- Candidate quality ---
    pub fn min_hits_initial(mut self, v: usize) -> Self {
        self.params.min_hits_initial = v;
        self
    }
    pub fn min_axial(mut self, v: usize) -> Self {
        self.params.min_axial = v;
        self
    }

    // --- Sharing / arbitration ---
    pub fn max_shared(mut self, v: usize) -> Self {
        self.params.max_shared = v;
        self
    }
    pub fn max_shared_chi2(mut self, v: f64) -> Self {
        self.params.max_shared_chi2 = v;
        self
    }
    pub fn max_shared_resid(mut self, v: f64) -> Self {
        self.params.max_shared_resid = v;
        self
    }

    // --- Hit pickup ---
    pub fn max_time_spread(mut self, v: f64) -> Self {
        self.params.max_time_spread = v;
        self
    }
    pub fn max_chi2_increment(mut self, v: f64) -> Self {
        self.params.max_chi2_increment = v;
        self
    }
    pub fn min_chi2_drop(mut self, v: f64) -> Self {
        self.params.min_chi2_drop = v;
        self
    }

    // --- Early commit ---
    pub fn commit_hits(mut self, v: usize) -> Self {
        self.params.commit_hits = v;
        self
    }
    pub fn commit_chi2(mut self, v: f64) -> Self {
        self.params.commit_chi2 = v;
        self
    }
    pub fn commit_stereo(mut self, v: usize) -> Self {
        self.params.commit_stereo = v;
        self
    }

    // --- Fitting ---
    pub fn fit_iterations(mut self, v: usize) -> Self {
        self.params.fit_iterations = v;
        self
    }
    pub fn covariance_inflation(mut self, v: f64) -> Self {
        self.params.covariance_inflation = v;
        self
    }
    pub fn reference_plane(mut self, v: f64) -> Self {
        self.params.reference_plane = v;
        self
    }

    // --- Seeding ---
    pub fn strategies(mut self, v: Vec<SeedStrategy>) -> Self {
        self.params.strategies = v;
        self
    }

    // ---- Numeric helpers for PartialOrd (handle NaN as invalid) ----

    /// Return true iff x > 0.0 and comparable (i.e., not NaN).
    #[inline]
    fn gt0(x: f64) -> bool {
        x.partial_cmp(&0.0) == Some(Greater)
    }

    /// Return true iff x >= 1.0 and comparable (i.e., not NaN).
    #[inline]
    fn ge1(x: f64) -> bool {
        matches!(x.partial_cmp(&1.0), Some(Greater) | Some(Equal))
    }

    /// Finalize the builder and produce a [`PatRecParams`] instance.
    ///
    /// Validation rules
    /// -----------------
    /// * Per trial: `max_curvature`, `max_tan_lambda`, `max_drho`, `max_dz`,
    ///   `max_chi2_per_hit` strictly positive; `min_hits >= min_hits_initial`;
    ///   `min_stereo >= 3`.
    /// * `min_hits_initial >= 5` (a seed already carries 5 hits) and
    ///   `min_axial >= 2`.
    /// * `max_time_spread`, `max_chi2_increment`, `min_chi2_drop`,
    ///   `max_shared_chi2`, `max_shared_resid`, `commit_chi2` strictly
    ///   positive.
    /// * `covariance_inflation >= 1`, `fit_iterations >= 1`,
    ///   `reference_plane` finite.
    /// * Strategy layer lists strictly ascending (the stereo/axial split is
    ///   layout-dependent and checked by the engine).
    ///
    /// Returns
    /// -----------------
    /// * `Ok(PatRecParams)` if all values are valid.
    /// * `Err(PatRecError::InvalidParameter)` otherwise.
    pub fn build(self) -> Result<PatRecParams, PatRecError> {
        let p = &self.params;

        for (trial, cuts) in p.trials.iter().enumerate() {
            if !Self::gt0(cuts.max_curvature)
                || !Self::gt0(cuts.max_tan_lambda)
                || !Self::gt0(cuts.max_drho)
                || !Self::gt0(cuts.max_dz)
                || !Self::gt0(cuts.max_chi2_per_hit)
            {
                return Err(PatRecError::InvalidParameter(format!(
                    "trial {trial} gates must be strictly positive"
                )));
            }
            if cuts.min_hits < p.min_hits_initial {
                return Err(PatRecError::InvalidParameter(format!(
                    "trial {trial}: min_hits must be >= min_hits_initial"
                )));
            }
            if cuts.min_stereo < 3 {
                return Err(PatRecError::InvalidParameter(format!(
                    "trial {trial}: min_stereo must be >= 3"
                )));
            }
        }

        if p.min_hits_initial < SEED_LAYERS {
            return Err(PatRecError::InvalidParameter(
                "min_hits_initial must be >= 5".into(),
            ));
        }
        if p.min_axial < 2 {
            return Err(PatRecError::InvalidParameter(
                "min_axial must be >= 2".into(),
            ));
        }

        if !Self::gt0(p.max_time_spread) {
            return Err(PatRecError::InvalidParameter(
                "max_time_spread must be > 0".into(),
            ));
        }
        if !Self::gt0(p.max_chi2_increment) {
            return Err(PatRecError::InvalidParameter(
                "max_chi2_increment must be > 0".into(),
            ));
        }
        if !Self::gt0(p.min_chi2_drop) {
            return Err(PatRecError::InvalidParameter(
                "min_chi2_drop must be > 0".into(),
            ));
        }
        if !Self::gt0(p.max_shared_chi2) {
            return Err(PatRecError::InvalidParameter(
                "max_shared_chi2 must be > 0".into(),
            ));
        }
        if !Self::gt0(p.max_shared_resid) {
            return Err(PatRecError::InvalidParameter(
                "max_shared_resid must be > 0".into(),
            ));
        }
        if !Self::gt0(p.commit_chi2) {
            return Err(PatRecError::InvalidParameter(
                "commit_chi2 must be > 0".into(),
            ));
        }

        if !Self::ge1(p.covariance_inflation) {
            return Err(PatRecError::InvalidParameter(
                "covariance_inflation must be >= 1".into(),
            ));
        }
        if p.fit_iterations == 0 {
            return Err(PatRecError::InvalidParameter(
                "fit_iterations must be >= 1".into(),
            ));
        }
        if !p.reference_plane.is_finite() {
            return Err(PatRecError::InvalidParameter(
                "reference_plane must be finite".into(),
            ));
        }

        for strategy in &p.strategies {
            let layers = strategy.layers();
            if !layers.windows(2).all(|pair| pair[0] < pair[1]) {
                return Err(PatRecError::InvalidParameter(format!(
                    "strategy {strategy} layers must be strictly ascending"
                )));
            }
        }

        Ok(self.params)
    }
}

impl fmt::Display for PatRecParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if f.alternate() {
            const PARAM_COL: usize = 44; // width reserved for "name = value"
            writeln!(f, "Pattern Recognition Parameters")?;
            writeln!(f, "------------------------------")?;

            macro_rules! line {
                ($fmt:expr, $val:expr, $comment:expr) => {{
                    let s = format!($fmt, $val);
                    let pad = if s.len() < PARAM_COL {
                        " ".repeat(PARAM_COL - s.len())
                    } else {
                        " ".to_string()
                    };
                    writeln!(f, "  {}{}# {}", s, pad, $comment)
                }};
            }

            for (trial, cuts) in self.trials.iter().enumerate() {
                writeln!(f, "[Trial {}]", trial + 1)?;
                line!("max_curvature   = {:.3}", cuts.max_curvature, "Seed gate")?;
                line!("max_tan_lambda  = {:.3}", cuts.max_tan_lambda, "Seed gate")?;
                line!(
                    "max_drho        = {:.3}",
                    cuts.max_drho,
                    "Reference-plane projection"
                )?;
                line!(
                    "max_dz          = {:.3}",
                    cuts.max_dz,
                    "Reference-plane projection"
                )?;
                line!(
                    "max_chi2_per_hit = {:.3}",
                    cuts.max_chi2_per_hit,
                    "Candidate quality ceiling"
                )?;
                line!("min_hits        = {}", cuts.min_hits, "Candidate floor")?;
                line!("min_stereo      = {}", cuts.min_stereo, "Candidate floor")?;
            }

            writeln!(f, "[Global]")?;
            line!(
                "min_hits_initial = {}",
                self.min_hits_initial,
                "After initial outward extension"
            )?;
            line!("min_axial       = {}", self.min_axial, "Candidate floor")?;
            line!("max_shared      = {}", self.max_shared, "Owners per hit")?;
            line!(
                "max_shared_chi2 = {:.3}",
                self.max_shared_chi2,
                "Shared-hit eviction bound"
            )?;
            line!(
                "max_shared_resid = {:.3}",
                self.max_shared_resid,
                "Shared-hit residual bound (sigma)"
            )?;
            line!(
                "max_time_spread = {:.3}",
                self.max_time_spread,
                "Hit time coincidence"
            )?;
            line!(
                "max_chi2_increment = {:.3}",
                self.max_chi2_increment,
                "Pickup / substitution bound"
            )?;
            line!(
                "min_chi2_drop   = {:.3}",
                self.min_chi2_drop,
                "Removal qualification"
            )?;
            line!("commit_hits     = {}", self.commit_hits, "Early commit")?;
            line!("commit_chi2     = {:.3}", self.commit_chi2, "Early commit")?;
            line!("commit_stereo   = {}", self.commit_stereo, "Early commit")?;
            line!("fit_iterations  = {}", self.fit_iterations, "Final fit")?;
            line!(
                "covariance_inflation = {:.1}",
                self.covariance_inflation,
                "Fit restart scale"
            )?;
            line!(
                "reference_plane = {:.3}",
                self.reference_plane,
                "Seed projection plane"
            )?;

            writeln!(f, "[Strategies]")?;
            for strategy in &self.strategies {
                writeln!(f, "  {strategy}")?;
            }
            Ok(())
        } else {
            write!(
                f,
                "PatRecParams(trials: {}, strategies: {}, max_shared: {})",
                self.trials.len(),
                self.strategies.len(),
                self.max_shared
            )
        }
    }
}
