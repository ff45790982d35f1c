//! Straight-line instrumentation for driving the engine through its public
//! interface: a line-track surface model, a least-squares seed fitter,
//! geometry and event builders, and checks on the output track list.
//!
//! Planes sit at `y = 100 * (layer + 1)`. A track is the line
//! `x(y) = x0 + sx * y`, `z(y) = z0 + sz * y`; axial modules measure `x`,
//! stereo modules `x + TILT * z`, and the helix slots carry
//! `[x0, sx, 0, z0, sz]` with the curvature slot pinned at zero.

use std::collections::HashMap;

use nalgebra::{Matrix4, RowVector5, Vector3, Vector4};

use patrec::config::PatRecParams;
use patrec::constants::{HelixCov, HelixVec, SEED_LAYERS};
use patrec::hits::{Hit, HitId};
use patrec::kalman::{
    HelixState, MeasurementSite, PredictContext, Propagation, SeedFit, SeedFitter, SeedHit,
    SurfaceModel, TimeWindow,
};
use patrec::tracker::{Module, ModuleId, TrackerLayout};
use patrec::tracks::Track;

/// Stereo measurement admixture of the longitudinal coordinate.
pub const TILT: f64 = 0.1;
/// Transverse acceptance half-width of every module.
pub const HALF_WIDTH: f64 = 200.0;

pub fn plane_y(layer: usize) -> f64 {
    (layer + 1) as f64 * 100.0
}

/// The exact measurement a line leaves on a plane.
pub fn measure(stereo: bool, y: f64, x0: f64, sx: f64, z0: f64, sz: f64) -> f64 {
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
pub struct LineModel {
    pub max_resid: f64,
}

impl Default for LineModel {
    fn default() -> Self {
        Self { max_resid: 5.0 }
    }
}

impl SurfaceModel for LineModel {
    fn predict(&self, site: &mut MeasurementSite, ctx: &PredictContext<'_>) -> Propagation {
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
pub struct LineSeedFitter;

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

/// The 14-layer stack the built-in seed table is drawn up for: one module
/// per layer, stereo on even layers.
pub fn full_layout() -> TrackerLayout {
    let modules = (0..14)
        .map(|layer| Module {
            layer,
            stereo: layer % 2 == 0,
            instance: 0,
        })
        .collect();
    TrackerLayout::new(modules).unwrap()
}

/// One exact on-line hit per module.
pub fn line_hits(
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

// ---------- output checks ----------

/// Tracks come out best first: banded chi-square per hit, then hit count,
/// then the raw ratio.
pub fn assert_quality_ordered(tracks: &[Track]) {
    for pair in tracks.windows(2) {
        let (a, b) = (&pair[0], &pair[1]);
        let band_a = (a.chi2_per_hit() / 0.5).floor();
        let band_b = (b.chi2_per_hit() / 0.5).floor();
        let ordered = band_a < band_b
            || (band_a == band_b && a.n_hits() > b.n_hits())
            || (band_a == band_b
                && a.n_hits() == b.n_hits()
                && a.chi2_per_hit() <= b.chi2_per_hit());
        assert!(
            ordered,
            "{} ({} hits, chi2/hit {:.3}) listed before {} ({} hits, chi2/hit {:.3})",
            a.id,
            a.n_hits(),
            a.chi2_per_hit(),
            b.id,
            b.n_hits(),
            b.chi2_per_hit()
        );
    }
}

/// Every output track satisfies the final hit, stereo and axial floors.
pub fn assert_respects_floors(tracks: &[Track], params: &PatRecParams) {
    let floor = params.trial(1);
    for track in tracks {
        assert!(
            track.n_hits() >= floor.min_hits,
            "{} has {} hits, floor is {}",
            track.id,
            track.n_hits(),
            floor.min_hits
        );
        assert!(
            track.n_stereo() >= floor.min_stereo,
            "{} has {} stereo hits, floor is {}",
            track.id,
            track.n_stereo(),
            floor.min_stereo
        );
        assert!(
            track.n_axial() >= params.min_axial,
            "{} has {} axial hits, floor is {}",
            track.id,
            track.n_axial(),
            params.min_axial
        );
    }
}

/// No two output tracks carry an identical hit set.
pub fn assert_distinct_hit_sets(tracks: &[Track]) {
    for (i, a) in tracks.iter().enumerate() {
        let mut hits_a: Vec<HitId> = a.hits.to_vec();
        hits_a.sort_unstable();
        for b in &tracks[i + 1..] {
            let mut hits_b: Vec<HitId> = b.hits.to_vec();
            hits_b.sort_unstable();
            assert_ne!(
                hits_a, hits_b,
                "{} and {} carry the same hit set",
                a.id, b.id
            );
        }
    }
}

/// Every track crosses each layer at most once, sites ascending.
pub fn assert_single_site_per_layer(tracks: &[Track]) {
    for track in tracks {
        assert!(
            track.sites.windows(2).all(|w| w[0].layer < w[1].layer),
            "{} visits some layer more than once",
            track.id
        );
    }
}

/// No track carries more shared hits than the sharing allowance.
pub fn assert_sharing_bounded(tracks: &[Track], max_shared: usize) {
    let mut owners: HashMap<HitId, usize> = HashMap::new();
    for track in tracks {
        for &hit in &track.hits {
            *owners.entry(hit).or_insert(0) += 1;
        }
    }
    for track in tracks {
        let shared = track.hits.iter().filter(|hit| owners[hit] > 1).count();
        assert!(
            shared <= max_shared,
            "{} shares {} hits, allowance is {}",
            track.id,
            shared,
            max_shared
        );
    }
}
