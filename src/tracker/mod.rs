//! # Tracker geometry
//!
//! Read-only description of the detector consumed by pattern recognition: an
//! ordered stack of measurement layers, each instrumented by one or two
//! side-by-side module instances, alternating between the two strip
//! orientations ("stereo" and "axial").
//!
//! The layout is built once and borrowed immutably by every event. Per-event
//! hit content lives in [`HitBank`](crate::hits::HitBank), never here.

use std::fmt;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::patrec_errors::PatRecError;

/// Index of a module inside a [`TrackerLayout`].
///
/// Module ids follow the layout order, which is canonical: ascending layer,
/// then ascending instance within the layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ModuleId(pub u32);

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "module#{}", self.0)
    }
}

/// Which half of the tracker an event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrackerHalf {
    Top,
    Bottom,
}

impl fmt::Display for TrackerHalf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackerHalf::Top => write!(f, "top"),
            TrackerHalf::Bottom => write!(f, "bottom"),
        }
    }
}

/// One physical module plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Module {
    /// Layer index, 0 at the reference end of the stack.
    pub layer: usize,
    /// Strip orientation of the layer this module sits on.
    pub stereo: bool,
    /// Instance index within the layer (side-by-side modules).
    pub instance: usize,
}

/// The ordered module stack of one tracker half.
///
/// Construction validates the canonical module order and layer consistency,
/// so every accessor can stay panic-free and index arithmetic stays trivial
/// (a module's id is its position, a layer's modules are contiguous).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackerLayout {
    modules: Vec<Module>,
    layers: Vec<SmallVec<[ModuleId; 2]>>,
}

impl TrackerLayout {
    /// Build a layout from its module list.
    ///
    /// Arguments
    /// -----------------
    /// * `modules`: all module planes of one tracker half, ordered by
    ///   ascending layer then ascending instance.
    ///
    /// Return
    /// ----------
    /// * The validated layout, or [`PatRecError::InvalidLayout`] when the
    ///   order is broken, a layer is empty or mixes orientations, or
    ///   instances are not numbered 0, 1, ... within their layer.
    pub fn new(modules: Vec<Module>) -> Result<Self, PatRecError> {
        if modules.is_empty() {
            return Err(PatRecError::InvalidLayout("no modules".into()));
        }
        let n_layers = modules.iter().map(|m| m.layer).max().unwrap_or(0) + 1;
        let mut layers: Vec<SmallVec<[ModuleId; 2]>> = vec![SmallVec::new(); n_layers];

        let mut previous: Option<&Module> = None;
        for (idx, module) in modules.iter().enumerate() {
            if let Some(prev) = previous {
                let ordered = module.layer > prev.layer
                    || (module.layer == prev.layer && module.instance > prev.instance);
                if !ordered {
                    return Err(PatRecError::InvalidLayout(format!(
                        "modules must be ordered by (layer, instance); broken at index {idx}"
                    )));
                }
            }
            let expected_instance = layers[module.layer].len();
            if module.instance != expected_instance {
                return Err(PatRecError::InvalidLayout(format!(
                    "layer {} instances must be numbered from 0, got {}",
                    module.layer, module.instance
                )));
            }
            if let Some(&first) = layers[module.layer].first() {
                if modules[first.0 as usize].stereo != module.stereo {
                    return Err(PatRecError::InvalidLayout(format!(
                        "layer {} mixes stereo and axial modules",
                        module.layer
                    )));
                }
            }
            layers[module.layer].push(ModuleId(idx as u32));
            previous = Some(module);
        }

        for (layer, ids) in layers.iter().enumerate() {
            if ids.is_empty() {
                return Err(PatRecError::InvalidLayout(format!(
                    "layer {layer} has no module"
                )));
            }
        }

        Ok(Self { modules, layers })
    }

    pub fn n_layers(&self) -> usize {
        self.layers.len()
    }

    pub fn n_modules(&self) -> usize {
        self.modules.len()
    }

    pub fn module(&self, id: ModuleId) -> &Module {
        &self.modules[id.0 as usize]
    }

    /// Module instances on a layer, ascending instance order.
    pub fn on_layer(&self, layer: usize) -> &[ModuleId] {
        &self.layers[layer]
    }

    pub fn is_stereo(&self, layer: usize) -> bool {
        let first = self.layers[layer][0];
        self.modules[first.0 as usize].stereo
    }
}
