//! # Hit index
//!
//! Per-event hit storage: all measurements of one tracker half in a flat
//! arena, module-major, built once per event and read-only afterwards.
//!
//! The arena order follows the canonical module order of the layout
//! (ascending layer, then instance), so a [`HitId`] doubles as the total
//! order used for canonical hit-set signatures.
//!
//! ## Overview
//!
//! - [`Hit`] — one 1-D strip measurement (value, uncertainty, time, global
//!   position for diagnostics).
//! - [`HitId`] — stable per-event handle, the addressable unit of ownership
//!   bookkeeping (see [`ownership`]).
//! - [`HitBank`] — the arena plus both lookup directions: per-module slices,
//!   per-layer id lists and the reverse (module, local index) → id map.

pub mod ownership;

use std::fmt;
use std::ops::Range;

use nalgebra::Vector3;

use crate::patrec_errors::PatRecError;
use crate::tracker::{ModuleId, TrackerLayout};

/// Stable per-event handle of one measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HitId(pub u32);

impl fmt::Display for HitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "hit#{}", self.0)
    }
}

/// One 1-D position reading on one module.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hit {
    /// Measured coordinate in the module frame.
    pub value: f64,
    /// Measurement uncertainty on `value`.
    pub sigma: f64,
    /// Readout time.
    pub time: f64,
    /// Global position, kept for diagnostics only.
    pub position: Vector3<f64>,
}

impl Hit {
    pub fn new(value: f64, sigma: f64, time: f64, position: Vector3<f64>) -> Self {
        Self {
            value,
            sigma,
            time,
            position,
        }
    }
}

/// The per-event hit arena and its lookup maps.
#[derive(Debug, Clone)]
pub struct HitBank {
    hits: Vec<Hit>,
    module_of: Vec<ModuleId>,
    layer_of: Vec<u16>,
    ranges: Vec<Range<u32>>,
    by_layer: Vec<Vec<HitId>>,
}

impl HitBank {
    /// Ingest one event's measurements.
    ///
    /// Arguments
    /// -----------------
    /// * `layout`: the tracker half geometry.
    /// * `hits_by_module`: one measurement list per module, aligned with the
    ///   layout's module order.
    ///
    /// Return
    /// ----------
    /// * The filled bank, or [`PatRecError::GeometryMismatch`] when the input
    ///   is not aligned with the layout. An event with no hits at all is
    ///   valid and yields an empty bank.
    pub fn build(layout: &TrackerLayout, hits_by_module: &[Vec<Hit>]) -> Result<Self, PatRecError> {
        if hits_by_module.len() != layout.n_modules() {
            return Err(PatRecError::GeometryMismatch {
                expected: layout.n_modules(),
                got: hits_by_module.len(),
            });
        }

        let total: usize = hits_by_module.iter().map(Vec::len).sum();
        let mut bank = Self {
            hits: Vec::with_capacity(total),
            module_of: Vec::with_capacity(total),
            layer_of: Vec::with_capacity(total),
            ranges: Vec::with_capacity(layout.n_modules()),
            by_layer: vec![Vec::new(); layout.n_layers()],
        };

        for (idx, module_hits) in hits_by_module.iter().enumerate() {
            let module_id = ModuleId(idx as u32);
            let layer = layout.module(module_id).layer;
            let start = bank.hits.len() as u32;
            for hit in module_hits {
                let id = HitId(bank.hits.len() as u32);
                bank.hits.push(*hit);
                bank.module_of.push(module_id);
                bank.layer_of.push(layer as u16);
                bank.by_layer[layer].push(id);
            }
            bank.ranges.push(start..bank.hits.len() as u32);
        }

        Ok(bank)
    }

    pub fn n_hits(&self) -> usize {
        self.hits.len()
    }

    pub fn hit(&self, id: HitId) -> &Hit {
        &self.hits[id.0 as usize]
    }

    pub fn module_of(&self, id: HitId) -> ModuleId {
        self.module_of[id.0 as usize]
    }

    pub fn layer_of(&self, id: HitId) -> usize {
        self.layer_of[id.0 as usize] as usize
    }

    /// All hits of a module as one contiguous slice.
    pub fn on_module(&self, module: ModuleId) -> &[Hit] {
        let range = self.range_of(module);
        &self.hits[range]
    }

    /// Arena index range of a module's hits.
    pub fn range_of(&self, module: ModuleId) -> Range<usize> {
        let range = &self.ranges[module.0 as usize];
        range.start as usize..range.end as usize
    }

    /// Reverse map: a module and a local index within it back to the handle.
    pub fn id_at(&self, module: ModuleId, local: usize) -> HitId {
        HitId(self.ranges[module.0 as usize].start + local as u32)
    }

    /// Local index of a hit within its module.
    pub fn local_index(&self, id: HitId) -> usize {
        let module = self.module_of[id.0 as usize];
        (id.0 - self.ranges[module.0 as usize].start) as usize
    }

    /// Hit ids on one layer, module-instance then local order.
    pub fn on_layer(&self, layer: usize) -> &[HitId] {
        &self.by_layer[layer]
    }
}

#[cfg(test)]
mod hit_bank_tests {
    use super::*;
    use crate::tracker::Module;

    fn layout() -> TrackerLayout {
        TrackerLayout::new(vec![
            Module {
                layer: 0,
                stereo: true,
                instance: 0,
            },
            Module {
                layer: 1,
                stereo: false,
                instance: 0,
            },
            Module {
                layer: 1,
                stereo: false,
                instance: 1,
            },
        ])
        .unwrap()
    }

    fn hit(value: f64) -> Hit {
        Hit::new(value, 0.1, 0.0, Vector3::zeros())
    }

    #[test]
    fn build_indexes_by_module_and_layer() {
        let layout = layout();
        let bank = HitBank::build(
            &layout,
            &[vec![hit(1.0), hit(2.0)], vec![hit(3.0)], vec![hit(4.0)]],
        )
        .unwrap();

        assert_eq!(bank.n_hits(), 4);
        assert_eq!(bank.on_module(ModuleId(0)).len(), 2);
        assert_eq!(bank.on_layer(1), &[HitId(2), HitId(3)]);
        assert_eq!(bank.module_of(HitId(3)), ModuleId(2));
        assert_eq!(bank.layer_of(HitId(3)), 1);
        assert_eq!(bank.id_at(ModuleId(2), 0), HitId(3));
        assert_eq!(bank.local_index(HitId(1)), 1);
        assert_eq!(bank.hit(HitId(2)).value, 3.0);
    }

    #[test]
    fn build_rejects_misaligned_input() {
        let layout = layout();
        let err = HitBank::build(&layout, &[vec![], vec![]]).unwrap_err();
        assert_eq!(
            err,
            PatRecError::GeometryMismatch {
                expected: 3,
                got: 2
            }
        );
    }

    #[test]
    fn empty_event_builds_an_empty_bank() {
        let layout = layout();
        let bank = HitBank::build(&layout, &[vec![], vec![], vec![]]).unwrap();
        assert_eq!(bank.n_hits(), 0);
        assert!(bank.on_layer(0).is_empty());
    }
}
