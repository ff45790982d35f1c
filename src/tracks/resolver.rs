//! # Global track resolution
//!
//! Once both trials have filled the store, the resolver settles the
//! event as a whole:
//!
//! * order the stored tracks by quality,
//! * settle every hit still shared between tracks, substituting a
//!   replacement hit where the module offers one,
//! * let every track sweep its hitless crossings for untaken hits,
//! * re-check the hit floors with the looser second-trial cuts,
//! * run the final fixed-assignment fit and drop tracks that fail it.
//!
//! Hits are visited in ascending arena order and tracks in quality
//! order, so the resolved list is reproducible for identical input.

use std::cmp::Reverse;

use itertools::Itertools;
use ordered_float::OrderedFloat;
use smallvec::SmallVec;

use crate::candidates::extension::final_fit;
use crate::config::PatRecParams;
use crate::hits::ownership::HitLedger;
use crate::hits::{HitBank, HitId};
use crate::kalman::SurfaceModel;
use crate::tracker::TrackerLayout;
use crate::tracks::Track;

/// Width of one chi-square-per-hit quality band. Tracks inside the same
/// band are ordered by hit count first, raw ratio second.
const QUALITY_BAND: f64 = 0.5;

fn quality_key(track: &Track) -> (OrderedFloat<f64>, Reverse<usize>, OrderedFloat<f64>, u32) {
    let ratio = track.chi2_per_hit();
    (
        OrderedFloat((ratio / QUALITY_BAND).floor()),
        Reverse(track.n_hits()),
        OrderedFloat(ratio),
        track.id.0,
    )
}

fn release_track(ledger: &mut HitLedger, track: &Track) {
    for &hit in &track.hits {
        ledger.release_for_track(hit, track.id);
    }
}

/// Resolve the stored tracks into the final event output.
///
/// Arguments
/// -----------------
/// * `tracks`: every track promoted during the trials.
/// * `ledger`: hit ownership; updated as hits move, so the final claims
///   mirror the returned tracks exactly.
/// * `model`: collaborator driving hit search and the final fit.
///
/// Return
/// ----------
/// * The surviving tracks, best quality first.
pub fn resolve<M: SurfaceModel>(
    mut tracks: Vec<Track>,
    ledger: &mut HitLedger,
    bank: &HitBank,
    layout: &TrackerLayout,
    model: &M,
    params: &PatRecParams,
) -> Vec<Track> {
    tracks.sort_by_key(quality_key);
    let width = tracks.iter().map(|t| t.id.0 as usize + 1).max().unwrap_or(0);
    let mut pos_of = vec![usize::MAX; width];
    for (pos, track) in tracks.iter().enumerate() {
        pos_of[track.id.0 as usize] = pos;
    }

    // Contested hits. An owner over the shared bound gives the hit up and
    // looks for a replacement on the same module; owners under the bound
    // go on sharing.
    for raw in 0..bank.n_hits() as u32 {
        let hit = HitId(raw);
        if ledger.n_track_owners(hit) < 2 {
            continue;
        }
        let owners: SmallVec<[crate::tracks::TrackId; 2]> = ledger
            .tracks_of(hit)
            .iter()
            .copied()
            .sorted_by_key(|id| pos_of[id.0 as usize])
            .collect();
        for owner in owners {
            let track = &mut tracks[pos_of[owner.0 as usize]];
            let Some(site_idx) = track.site_with_hit(hit, bank) else {
                ledger.release_for_track(hit, owner);
                continue;
            };
            let old_inc = track.sites[site_idx].chi2_inc;
            if old_inc <= params.max_shared_chi2 {
                continue;
            }
            ledger.release_for_track(hit, owner);
            let module = track.sites[site_idx].module;
            let range = bank.range_of(module);
            let window = track.time_window(params.max_time_spread);
            let picked = model.pick_hit(
                &mut track.sites[site_idx],
                bank.on_module(module),
                ledger.taken_flags(range),
                params.max_chi2_increment,
                window,
                Some(bank.local_index(hit)),
            );
            match picked {
                Some(new_local) => {
                    let new_id = bank.id_at(module, new_local);
                    ledger.claim_for_track(new_id, owner);
                    if let Some(pos) = track.hits.iter().position(|&h| h == hit) {
                        track.hits[pos] = new_id;
                    }
                    track.chi2 += track.sites[site_idx].chi2_inc - old_inc;
                }
                None => {
                    model.unpick_hit(&mut track.sites[site_idx]);
                    track.hits.retain(|h| *h != hit);
                    track.chi2 -= old_inc;
                }
            }
            track.refresh_time_range(bank);
        }
    }

    // Hitless crossings sweep untaken hits, best track first.
    for track in &mut tracks {
        for site_idx in 0..track.sites.len() {
            if track.sites[site_idx].hit.is_some() {
                continue;
            }
            let module = track.sites[site_idx].module;
            let range = bank.range_of(module);
            let window = track.time_window(params.max_time_spread);
            if let Some(local) = model.pick_hit(
                &mut track.sites[site_idx],
                bank.on_module(module),
                ledger.taken_flags(range),
                params.max_chi2_increment,
                window,
                None,
            ) {
                let id = bank.id_at(module, local);
                ledger.claim_for_track(id, track.id);
                track.hits.push(id);
                track.chi2 += track.sites[site_idx].chi2_inc;
                track.refresh_time_range(bank);
            }
        }
    }

    // Floors with the looser second-trial cuts, then the final fit.
    let floor = params.trial(1);
    let mut resolved = Vec::with_capacity(tracks.len());
    for mut track in tracks {
        let below = track.n_hits() < floor.min_hits
            || track.n_stereo() < floor.min_stereo
            || track.n_axial() < params.min_axial;
        if below {
            release_track(ledger, &track);
            continue;
        }
        match final_fit(&mut track.sites, model, layout, bank, ledger, params) {
            Some(chi2) => {
                track.chi2 = chi2;
                resolved.push(track);
            }
            None => release_track(ledger, &track),
        }
    }

    resolved.sort_by_key(quality_key);
    resolved
}
