//! Shared test fixtures: a straight-line track model over equally spaced
//! planes, plus layout, event and seed builders.
//!
//! Planes sit at `y = 100 * (layer + 1)`. A track is a straight line
//! `x(y) = x0 + sx * y`, `z(y) = z0 + sz * y`; an axial module measures
//! `x`, a stereo module measures `x + TILT * z`. The helix slots map to
//! `[x0, sx, 0, z0, sz]` with the curvature slot pinned at zero, so the
//! production gates on curvature, slope and reference projections read
//! the line parameters directly.

use nalgebra::{Matrix4, RowVector5, Vector3, Vector4};

use crate::constants::{HelixCov, HelixVec, SeedHitIds, SEED_LAYERS};
use crate::hits::{Hit, HitBank};
use crate::kalman::{
    HelixState, MeasurementSite, PredictContext, Propagation, SeedFit, SeedFitter, SeedHit,
    SurfaceModel, TimeWindow,
};
use crate::seeding::Seed;
use crate::tracker::{Module, ModuleId, TrackerLayout};

/// Stereo measurement admixture of the longitudinal coordinate.
pub(crate) const TILT: f64 = 0.1;
/// Transverse acceptance half-width of every module.
pub(crate) const HALF_WIDTH: f64 = 200.0;

pub(crate) fn plane_y(layer: usize) -> f64 {
    (layer + 1) as f64 * 100.0
}

/// The exact measurement a line leaves on a plane.
pub(crate) fn measure(stereo: bool, y: f64, x0: f64, sx: f64, z0: f64, sz: f64) -> f64 {
    let x = x0 + sx * y;
    if stereo {
        x + TILT * (z0 + sz * y)
    } else {
        x
    }
}

fn h_row(stereo: bool, y: f64) -> RowVector5<f64> {
    if stereo {
        RowVector5::new(1.0, y, 0.0, TILT, TILT * y)
    } else {
        RowVector5::new(1.0, y, 0.0, 0.0, 0.0)
    }
}

/// Straight-line surface model with a scalar Kalman update per plane.
///
/// `fail_layers` forces a divergence on the named layers; `max_resid`
/// bounds pickup at predict time.
#[derive(Debug)]
pub(crate) struct LineModel {
    pub max_resid: f64,
    pub fail_layers: Vec<usize>,
}

impl Default for LineModel {
    fn default() -> Self {
        Self {
            max_resid: 5.0,
            fail_layers: Vec::new(),
        }
    }
}

impl SurfaceModel for LineModel {
    fn predict(&self, site: &mut MeasurementSite, ctx: &PredictContext<'_>) -> Propagation {
        if self.fail_layers.contains(&ctx.target.layer) {
            return Propagation::Diverged;
        }
        let Some(from) = ctx.from else {
            return Propagation::Diverged;
        };

        // Straight lines transport unchanged between planes.
        let y = plane_y(ctx.target.layer);
        let x = from.a[0] + from.a[1] * y;
        let inside = if ctx.target.instance == 0 && ctx.more_instances {
            (-HALF_WIDTH..0.0).contains(&x)
        } else if ctx.target.instance == 0 {
            (-HALF_WIDTH..=HALF_WIDTH).contains(&x)
        } else {
            (0.0..=HALF_WIDTH).contains(&x)
        };
        if !inside {
            return Propagation::Missed;
        }

        let h = h_row(ctx.target.stereo, y);
        let m_pred = (h * from.a)[(0, 0)];
        site.predicted = Some(from.clone());

        if let Some(local) = ctx.pinned {
            site.hit = Some(local);
            site.resid = ctx.hits[local].value - m_pred;
            return Propagation::Attached;
        }
        if !ctx.pickup {
            return Propagation::Empty;
        }

        let mut best: Option<(usize, f64)> = None;
        for (local, hit) in ctx.hits.iter().enumerate() {
            if !ctx.window.contains(hit.time) {
                continue;
            }
            if ctx.taken[local] && !ctx.share_ok {
                continue;
            }
            let r = hit.value - m_pred;
            if r.abs() > self.max_resid {
                continue;
            }
            if best.map_or(true, |(_, held)| r.abs() < held.abs()) {
                best = Some((local, r));
            }
        }
        match best {
            Some((local, r)) => {
                site.hit = Some(local);
                site.resid = r;
                Propagation::Attached
            }
            None => Propagation::Empty,
        }
    }

    fn filter(&self, site: &mut MeasurementSite, hits: &[Hit]) -> bool {
        let Some(pred) = site.predicted.clone() else {
            return false;
        };
        let Some(local) = site.hit else {
            site.filtered = Some(pred);
            site.chi2_inc = 0.0;
            return true;
        };

        let hit = hits[local];
        let h = h_row(site.stereo, plane_y(site.layer));
        let r = hit.value - (h * pred.a)[(0, 0)];
        let s = hit.sigma * hit.sigma + (h * pred.cov * h.transpose())[(0, 0)];
        if !(s > 0.0) {
            return false;
        }
        let gain = pred.cov * h.transpose() / s;
        let a = pred.a + gain * r;
        let cov = pred.cov - gain * (h * pred.cov);
        site.chi2_inc = r * r / s;
        site.resid = hit.value - (h * a)[(0, 0)];
        site.filtered = Some(HelixState::new(a, cov));
        true
    }

    fn smooth(&self, site: &mut MeasurementSite, next: &MeasurementSite, hits: &[Hit]) {
        let Some(next_s) = next.smoothed.clone() else {
            return;
        };
        // With identity transport the smoothed state is the outermost
        // filtered one everywhere.
        if let Some(local) = site.hit {
            let hit = hits[local];
            let h = h_row(site.stereo, plane_y(site.layer));
            let r = hit.value - (h * next_s.a)[(0, 0)];
            let r_cov =
                (hit.sigma * hit.sigma - (h * next_s.cov * h.transpose())[(0, 0)]).max(1e-12);
            site.chi2_inc = r * r / r_cov;
            site.resid = r;
        }
        site.smoothed = Some(next_s);
    }

    fn pick_hit(
        &self,
        site: &mut MeasurementSite,
        hits: &[Hit],
        taken: &[bool],
        max_chi2_inc: f64,
        window: TimeWindow,
        exclude: Option<usize>,
    ) -> Option<usize> {
        let state = site.best_state()?.clone();
        let h = h_row(site.stereo, plane_y(site.layer));
        let m_pred = (h * state.a)[(0, 0)];

        let mut best: Option<(usize, f64, f64)> = None;
        for (local, hit) in hits.iter().enumerate() {
            if taken[local] || Some(local) == exclude || !window.contains(hit.time) {
                continue;
            }
            let r = hit.value - m_pred;
            let s = hit.sigma * hit.sigma + (h * state.cov * h.transpose())[(0, 0)];
            if !(s > 0.0) {
                continue;
            }
            let chi2 = r * r / s;
            if chi2 > max_chi2_inc {
                continue;
            }
            if best.map_or(true, |(_, held, _)| r.abs() < held.abs()) {
                best = Some((local, r, chi2));
            }
        }
        let (local, r, chi2) = best?;
        site.hit = Some(local);
        site.resid = r;
        site.chi2_inc = chi2;
        Some(local)
    }

    fn unpick_hit(&self, site: &mut MeasurementSite) {
        site.clear_hit();
    }

    fn origin_params(&self, state: &HelixState) -> HelixVec {
        state.a
    }
}

/// Weighted least-squares line fit over the five seed hits.
#[derive(Debug)]
pub(crate) struct LineSeedFitter;

impl SeedFitter for LineSeedFitter {
    fn fit(&self, hits: &[SeedHit<'_>; SEED_LAYERS], _reference: f64) -> Option<SeedFit> {
        let mut normal = Matrix4::<f64>::zeros();
        let mut rhs = Vector4::<f64>::zeros();
        for seed_hit in hits {
            let y = plane_y(seed_hit.module.layer);
            let t = if seed_hit.module.stereo { TILT } else { 0.0 };
            let h = Vector4::new(1.0, y, t, t * y);
            let w = 1.0 / (seed_hit.hit.sigma * seed_hit.hit.sigma);
            normal += w * h * h.transpose();
            rhs += w * seed_hit.hit.value * h;
        }
        let cov4 = normal.try_inverse()?;
        let x = cov4 * rhs;

        // [x0, sx, z0, sz] into the helix slots, curvature left at zero.
        const MAP: [usize; 4] = [0, 1, 3, 4];
        let mut a = HelixVec::zeros();
        let mut cov = HelixCov::zeros();
        for (i, &p) in MAP.iter().enumerate() {
            a[p] = x[i];
            for (j, &q) in MAP.iter().enumerate() {
                cov[(p, q)] = cov4[(i, j)];
            }
        }
        Some(SeedFit {
            state: HelixState::new(a, cov),
            drho: x[0],
            dz: x[2],
        })
    }
}

/// One module per layer, stereo on even layers.
pub(crate) fn uniform_layout(n_layers: usize) -> TrackerLayout {
    let modules = (0..n_layers)
        .map(|layer| Module {
            layer,
            stereo: layer % 2 == 0,
            instance: 0,
        })
        .collect();
    TrackerLayout::new(modules).unwrap()
}

/// One module per layer, stereo on odd layers.
pub(crate) fn odd_stereo_layout(n_layers: usize) -> TrackerLayout {
    let modules = (0..n_layers)
        .map(|layer| Module {
            layer,
            stereo: layer % 2 == 1,
            instance: 0,
        })
        .collect();
    TrackerLayout::new(modules).unwrap()
}

/// One exact on-line hit per module.
pub(crate) fn line_hits(
    layout: &TrackerLayout,
    x0: f64,
    sx: f64,
    z0: f64,
    sz: f64,
    sigma: f64,
    time: f64,
) -> Vec<Vec<Hit>> {
    (0..layout.n_modules())
        .map(|m| {
            let module = layout.module(ModuleId(m as u32));
            let y = plane_y(module.layer);
            let value = measure(module.stereo, y, x0, sx, z0, sz);
            let position = Vector3::new(x0 + sx * y, y, z0 + sz * y);
            vec![Hit::new(value, sigma, time, position)]
        })
        .collect()
}

/// A seed over the given hit ids, fitted with [`LineSeedFitter`].
pub(crate) fn seed_from_ids(
    layout: &TrackerLayout,
    bank: &HitBank,
    layers: [usize; SEED_LAYERS],
    ids: SeedHitIds,
) -> Seed {
    let seed_hits: [SeedHit<'_>; SEED_LAYERS] = core::array::from_fn(|d| SeedHit {
        module: layout.module(bank.module_of(ids[d])),
        hit: bank.hit(ids[d]),
    });
    let fit = LineSeedFitter.fit(&seed_hits, 0.0).unwrap();
    Seed {
        hits: ids,
        layers,
        state: fit.state,
        drho: fit.drho,
        dz: fit.dz,
        strategy: 0,
    }
}

/// A seed over the first hit of each given layer.
pub(crate) fn fitted_seed(
    layout: &TrackerLayout,
    bank: &HitBank,
    layers: [usize; SEED_LAYERS],
) -> Seed {
    let ids: SeedHitIds = layers.iter().map(|&layer| bank.on_layer(layer)[0]).collect();
    seed_from_ids(layout, bank, layers, ids)
}
