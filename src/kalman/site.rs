//! Per-layer record of one extension step.

use crate::kalman::HelixState;
use crate::tracker::ModuleId;

/// One visited module plane of a candidate or track.
///
/// The site owns the state estimates produced at this surface and the chosen
/// hit, addressed by its local index within the module's hit slice. A site
/// with `hit == None` marks a crossed plane that contributed no measurement.
#[derive(Debug, Clone)]
pub struct MeasurementSite {
    pub module: ModuleId,
    pub layer: usize,
    pub stereo: bool,
    /// Local index of the chosen hit within the module's hits.
    pub hit: Option<usize>,
    pub predicted: Option<HelixState>,
    pub filtered: Option<HelixState>,
    pub smoothed: Option<HelixState>,
    /// Chi-square contribution of the chosen hit at the latest fit stage.
    pub chi2_inc: f64,
    /// Residual of the chosen hit at the latest fit stage.
    pub resid: f64,
}

impl MeasurementSite {
    pub fn new(module: ModuleId, layer: usize, stereo: bool) -> Self {
        Self {
            module,
            layer,
            stereo,
            hit: None,
            predicted: None,
            filtered: None,
            smoothed: None,
            chi2_inc: 0.0,
            resid: 0.0,
        }
    }

    /// The most refined state available at this site.
    pub fn best_state(&self) -> Option<&HelixState> {
        self.smoothed
            .as_ref()
            .or(self.filtered.as_ref())
            .or(self.predicted.as_ref())
    }

    /// Forget the chosen hit and its contribution, keeping the states.
    pub fn clear_hit(&mut self) {
        self.hit = None;
        self.chi2_inc = 0.0;
        self.resid = 0.0;
    }
}
