//! Candidate extension, smoothing and refits.
//!
//! The walks here own the iteration over layers and module instances and
//! all candidate bookkeeping; the per-surface arithmetic is delegated to
//! the [`SurfaceModel`]. Layer handling:
//!
//! - A seed layer is pinned to its seed hit and restricted to that hit's
//!   module; losing it ends the candidate.
//! - A non-seed layer tries each module instance in turn. A geometric miss
//!   moves to the next instance; when every instance misses the layer is
//!   skipped without a site.
//! - An intersected module always yields a site, hitless when nothing
//!   acceptable is found there.
//!
//! Nothing in this file touches the ownership ledger beyond reading taken
//! flags.

use crate::config::PatRecParams;
use crate::hits::ownership::HitLedger;
use crate::hits::HitBank;
use crate::kalman::{
    HelixState, MeasurementSite, PredictContext, Propagation, SurfaceModel, TimeWindow,
};
use crate::tracker::{ModuleId, TrackerLayout};

use super::TrackCandidate;

/// Outcome of one directional extension walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extension {
    Completed,
    Aborted,
}

/// What one layer contributed to a walk.
enum LayerStep {
    Site(MeasurementSite),
    Skipped,
    Abort,
}

#[allow(clippy::too_many_arguments)]
fn step_layer<M: SurfaceModel>(
    cand: &TrackCandidate,
    layer: usize,
    current: &HelixState,
    prev_module: Option<ModuleId>,
    model: &M,
    layout: &TrackerLayout,
    bank: &HitBank,
    ledger: &HitLedger,
    params: &PatRecParams,
) -> LayerStep {
    let pinned_id = cand.seed_hit_on(layer);
    let stereo = layout.is_stereo(layer);

    let single;
    let instances: &[ModuleId] = match pinned_id {
        Some(id) => {
            single = [bank.module_of(id)];
            &single
        }
        None => layout.on_layer(layer),
    };

    for (k, &module_id) in instances.iter().enumerate() {
        let mut site = MeasurementSite::new(module_id, layer, stereo);
        let range = bank.range_of(module_id);
        let ctx = PredictContext {
            from: Some(current),
            from_module: prev_module.map(|m| layout.module(m)),
            target: layout.module(module_id),
            hits: bank.on_module(module_id),
            taken: ledger.taken_flags(range),
            pinned: pinned_id.map(|id| bank.local_index(id)),
            share_ok: (cand.n_taken as usize) < params.max_shared,
            pickup: true,
            more_instances: k + 1 < instances.len(),
            window: cand.time_window(params.max_time_spread),
        };
        match model.predict(&mut site, &ctx) {
            Propagation::Attached => {
                if !model.filter(&mut site, bank.on_module(module_id)) {
                    return LayerStep::Abort;
                }
                return LayerStep::Site(site);
            }
            Propagation::Empty => {
                if pinned_id.is_some() {
                    // The seed hit must stay attached.
                    return LayerStep::Abort;
                }
                site.filtered = site.predicted.clone();
                site.chi2_inc = 0.0;
                return LayerStep::Site(site);
            }
            Propagation::Missed => continue,
            Propagation::Diverged => return LayerStep::Abort,
        }
    }

    if pinned_id.is_some() {
        LayerStep::Abort
    } else {
        LayerStep::Skipped
    }
}

/// Fold a finished site into the candidate's running totals.
fn record_site(
    cand: &mut TrackCandidate,
    site: &MeasurementSite,
    bank: &HitBank,
    ledger: &HitLedger,
) {
    if let Some(local) = site.hit {
        let id = bank.id_at(site.module, local);
        cand.hits.push(id);
        cand.chi2_f += site.chi2_inc;
        let t = bank.hit(id).time;
        cand.t_min = cand.t_min.min(t);
        cand.t_max = cand.t_max.max(t);
        if ledger.is_taken(id) {
            cand.n_taken += 1;
        }
    }
}

/// Grow the candidate from its innermost seed layer to the outermost
/// layer of the layout, appending sites.
///
/// Arguments
/// -----------------
/// * `start`: the (inflated) seed state the filter starts from.
///
/// Return
/// ----------
/// * [`Extension::Aborted`] when a seed hit is unreachable or the filter
///   fails; the candidate is then discarded by the caller.
pub fn extend_outward<M: SurfaceModel>(
    cand: &mut TrackCandidate,
    start: &HelixState,
    model: &M,
    layout: &TrackerLayout,
    bank: &HitBank,
    ledger: &HitLedger,
    params: &PatRecParams,
) -> Extension {
    let mut current = start.clone();
    let mut prev_module: Option<ModuleId> = None;

    for layer in cand.seed_layers[0]..layout.n_layers() {
        match step_layer(
            cand,
            layer,
            &current,
            prev_module,
            model,
            layout,
            bank,
            ledger,
            params,
        ) {
            LayerStep::Site(site) => {
                record_site(cand, &site, bank, ledger);
                match site.filtered.clone() {
                    Some(state) => current = state,
                    None => return Extension::Aborted,
                }
                prev_module = Some(site.module);
                cand.sites.push(site);
            }
            LayerStep::Skipped => {}
            LayerStep::Abort => return Extension::Aborted,
        }
    }

    cand.filtered = true;
    cand.smoothed = false;
    Extension::Completed
}

/// Grow the candidate from just below its innermost site down to layer 0,
/// prepending sites. Starts from the innermost site's best state, without
/// covariance inflation.
pub fn extend_inward<M: SurfaceModel>(
    cand: &mut TrackCandidate,
    model: &M,
    layout: &TrackerLayout,
    bank: &HitBank,
    ledger: &HitLedger,
    params: &PatRecParams,
) -> Extension {
    let first = cand.seed_layers[0];
    let (mut current, mut prev_module) = match cand.sites.first() {
        Some(innermost) => match innermost.best_state() {
            Some(state) => (state.clone(), Some(innermost.module)),
            None => return Extension::Aborted,
        },
        None => return Extension::Aborted,
    };

    for layer in (0..first).rev() {
        match step_layer(
            cand,
            layer,
            &current,
            prev_module,
            model,
            layout,
            bank,
            ledger,
            params,
        ) {
            LayerStep::Site(site) => {
                record_site(cand, &site, bank, ledger);
                match site.filtered.clone() {
                    Some(state) => current = state,
                    None => return Extension::Aborted,
                }
                prev_module = Some(site.module);
                cand.sites.insert(0, site);
            }
            LayerStep::Skipped => {}
            LayerStep::Abort => return Extension::Aborted,
        }
    }

    cand.filtered = true;
    cand.smoothed = false;
    Extension::Completed
}

/// Run the smoother backwards over a site list.
///
/// The outermost site with a hit anchors the pass with its filtered state;
/// every earlier site is combined with its successor. Trailing hitless
/// sites keep no smoothed state. Returns the smoothed chi-square, summing
/// clamped per-hit increments.
pub(crate) fn smooth_sites<M: SurfaceModel>(
    sites: &mut [MeasurementSite],
    model: &M,
    bank: &HitBank,
) -> f64 {
    let Some(last) = sites.iter().rposition(|site| site.hit.is_some()) else {
        return 0.0;
    };
    let mut chi2 = 0.0;
    sites[last].smoothed = sites[last].filtered.clone();
    chi2 += sites[last].chi2_inc.max(0.0);

    for i in (0..last).rev() {
        let (head, tail) = sites.split_at_mut(i + 1);
        let site = &mut head[i];
        model.smooth(site, &tail[0], bank.on_module(site.module));
        if site.hit.is_some() {
            chi2 += site.chi2_inc.max(0.0);
        }
    }
    chi2
}

/// Smooth the candidate in place and refresh its smoothed chi-square.
pub fn smooth<M: SurfaceModel>(cand: &mut TrackCandidate, model: &M, bank: &HitBank) {
    cand.chi2_s = smooth_sites(&mut cand.sites, model, bank);
    cand.smoothed = true;
}

/// Refit the candidate over its current site list, re-selecting hits.
///
/// The filter restarts from the innermost site's best state with inflated
/// covariance. Seed layers stay pinned to their seed hits; every other
/// site re-picks its hit freely inside the pre-refit time window. The walk
/// follows the existing modules, so a miss cannot move to another
/// instance; instead the refit is truncated when enough of the candidate
/// is already rebuilt (more than 4 hits, more than 2 stereo) and fails
/// otherwise.
///
/// A freshly picked non-pinned hit whose increment dwarfs both the pickup
/// bound and the chi-square accumulated so far is dropped again in-pass,
/// keeping one outlier from steering the rest of the walk.
///
/// Return
/// ----------
/// * `true` on success, with hits, time range, shared count and filtered
///   chi-square rebuilt and smoothing invalidated.
pub fn refit<M: SurfaceModel>(
    cand: &mut TrackCandidate,
    model: &M,
    layout: &TrackerLayout,
    bank: &HitBank,
    ledger: &HitLedger,
    params: &PatRecParams,
) -> bool {
    let window = cand.time_window(params.max_time_spread);
    let Some(start) = cand.sites.first().and_then(|site| site.best_state()).cloned() else {
        return false;
    };
    let mut current = start.inflated(params.covariance_inflation);
    let mut prev_module: Option<ModuleId> = None;

    let old_sites = std::mem::take(&mut cand.sites);
    cand.hits.clear();
    cand.chi2_f = 0.0;
    cand.chi2_s = 0.0;
    cand.n_taken = 0;
    cand.t_min = f64::INFINITY;
    cand.t_max = f64::NEG_INFINITY;
    cand.filtered = false;
    cand.smoothed = false;

    let mut new_sites = Vec::with_capacity(old_sites.len());
    let mut hits_so_far = 0usize;
    let mut stereo_so_far = 0usize;

    for old in &old_sites {
        let pinned_id = cand.seed_hit_on(old.layer);
        let mut site = MeasurementSite::new(old.module, old.layer, old.stereo);
        let range = bank.range_of(old.module);
        let ctx = PredictContext {
            from: Some(&current),
            from_module: prev_module.map(|m| layout.module(m)),
            target: layout.module(old.module),
            hits: bank.on_module(old.module),
            taken: ledger.taken_flags(range),
            pinned: pinned_id.map(|id| bank.local_index(id)),
            share_ok: (cand.n_taken as usize) < params.max_shared,
            pickup: true,
            more_instances: false,
            window,
        };

        let ok = match model.predict(&mut site, &ctx) {
            Propagation::Attached => model.filter(&mut site, bank.on_module(old.module)),
            Propagation::Empty => {
                site.filtered = site.predicted.clone();
                site.chi2_inc = 0.0;
                true
            }
            Propagation::Missed | Propagation::Diverged => false,
        };
        if !ok {
            if stereo_so_far > 2 && hits_so_far > 4 {
                break;
            }
            cand.sites = new_sites;
            return false;
        }

        if site.hit.is_some()
            && pinned_id.is_none()
            && site.chi2_inc > 5.0 * params.max_chi2_increment
            && site.chi2_inc > cand.chi2_f
        {
            model.unpick_hit(&mut site);
            site.filtered = site.predicted.clone();
        }

        if let Some(local) = site.hit {
            let id = bank.id_at(site.module, local);
            cand.hits.push(id);
            cand.chi2_f += site.chi2_inc;
            let t = bank.hit(id).time;
            cand.t_min = cand.t_min.min(t);
            cand.t_max = cand.t_max.max(t);
            if ledger.is_taken(id) {
                cand.n_taken += 1;
            }
            hits_so_far += 1;
            if site.stereo {
                stereo_so_far += 1;
            }
        }

        match site.filtered.clone() {
            Some(state) => current = state,
            None => {
                cand.sites = new_sites;
                return false;
            }
        }
        prev_module = Some(site.module);
        new_sites.push(site);
    }

    cand.sites = new_sites;
    if hits_so_far == 0 {
        return false;
    }
    cand.filtered = true;
    true
}

/// The final track fit: `fit_iterations` filter and smooth passes over a
/// fixed hit assignment.
///
/// Every site with a hit stays pinned to it; nothing is re-selected. A
/// hitless site that the refitted trajectory no longer crosses is dropped
/// from the list. A pinned site that cannot be reached, a filter failure
/// or a divergence fails the whole fit.
///
/// Return
/// ----------
/// * The smoothed chi-square of the last pass, or `None` on failure.
pub fn final_fit<M: SurfaceModel>(
    sites: &mut Vec<MeasurementSite>,
    model: &M,
    layout: &TrackerLayout,
    bank: &HitBank,
    ledger: &HitLedger,
    params: &PatRecParams,
) -> Option<f64> {
    let mut chi2_s = 0.0;

    for _ in 0..params.fit_iterations {
        let start = sites.first().and_then(|site| site.best_state()).cloned()?;
        let mut current = start.inflated(params.covariance_inflation);
        let mut prev_module: Option<ModuleId> = None;
        let mut kept = Vec::with_capacity(sites.len());
        let mut any_hit = false;

        for old in sites.drain(..) {
            let pinned = old.hit;
            let mut site = MeasurementSite::new(old.module, old.layer, old.stereo);
            let range = bank.range_of(old.module);
            let ctx = PredictContext {
                from: Some(&current),
                from_module: prev_module.map(|m| layout.module(m)),
                target: layout.module(old.module),
                hits: bank.on_module(old.module),
                taken: ledger.taken_flags(range),
                pinned,
                share_ok: true,
                pickup: false,
                more_instances: false,
                window: TimeWindow::unbounded(),
            };
            match model.predict(&mut site, &ctx) {
                Propagation::Attached => {
                    if !model.filter(&mut site, bank.on_module(old.module)) {
                        return None;
                    }
                    any_hit = true;
                }
                Propagation::Empty => {
                    if pinned.is_some() {
                        return None;
                    }
                    site.filtered = site.predicted.clone();
                    site.chi2_inc = 0.0;
                }
                Propagation::Missed => {
                    if pinned.is_some() {
                        return None;
                    }
                    continue;
                }
                Propagation::Diverged => return None,
            }
            current = site.filtered.clone()?;
            prev_module = Some(site.module);
            kept.push(site);
        }

        if !any_hit {
            return None;
        }
        *sites = kept;
        chi2_s = smooth_sites(sites, model, bank);
    }

    Some(chi2_s)
}
