//! The single shared detection/calibration state.
//!
//! Calibration profiles, the fitted transform, the latest detection
//! results, the ROI, and telemetry all live in one `VisionState` behind one
//! mutex. Critical sections are a handful of field reads or writes, and any
//! snapshot taken under the lock is consistent across fields.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

use pickcam_color::ColorObject;
use pickcam_core::{AffineTransform, PixelPoint};

use crate::calibration::CalibrationProfile;
use crate::roi::RoiSelection;

/// Latest environment readings pushed by an external sensor collaborator.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySnapshot {
    pub temperature: f64,
    pub humidity: f64,
    pub fan_speed: f64,
}

/// Shared mutable state of the vision service.
#[derive(Default)]
pub struct VisionState {
    /// Stored calibration points, at most one per profile id.
    pub profiles: Vec<CalibrationProfile>,
    /// Pixel-to-robot mapping; `None` until a fit succeeds.
    pub transform: Option<AffineTransform>,
    /// Tracked marker centers from the most recent completed pass.
    pub marker_centers: BTreeMap<u32, PixelPoint>,
    /// Colored objects from the most recent completed pass.
    pub color_objects: Vec<ColorObject>,
    pub roi: RoiSelection,
    pub telemetry: TelemetrySnapshot,
}

pub type SharedVision = Arc<Mutex<VisionState>>;

/// Lock a mutex, recovering the guard when a panicking thread poisoned it.
/// The state is plain data and stays usable after a writer dies.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}
