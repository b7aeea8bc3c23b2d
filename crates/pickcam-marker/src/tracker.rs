//! Tracked-marker bookkeeping over raw detections.

use std::collections::BTreeMap;

use pickcam_core::{GrayImageView, PixelPoint};

use crate::{MarkerDetection, MarkerDetector};

/// Keeps only the physical marker this deployment tracks.
///
/// The work surface carries exactly one reference marker; anything else that
/// decodes in a frame (stray prints, markers of neighboring stations) is
/// dropped by id before it can reach the calibration flow.
pub struct MarkerTracker {
    detector: MarkerDetector,
    tracked_id: u32,
}

impl MarkerTracker {
    pub fn new(detector: MarkerDetector, tracked_id: u32) -> Self {
        Self {
            detector,
            tracked_id,
        }
    }

    pub fn tracked_id(&self) -> u32 {
        self.tracked_id
    }

    pub fn detector(&self) -> &MarkerDetector {
        &self.detector
    }

    /// Centers of visible tracked markers keyed by id.
    ///
    /// The map is empty when the tracked marker is not in view; it never
    /// contains foreign ids.
    pub fn locate(&self, gray: &GrayImageView<'_>) -> BTreeMap<u32, PixelPoint> {
        self.filter(&self.detector.detect(gray))
    }

    /// Same filtering over detections the caller already has.
    pub fn filter(&self, detections: &[MarkerDetection]) -> BTreeMap<u32, PixelPoint> {
        detections
            .iter()
            .filter(|d| d.id == self.tracked_id)
            .map(|d| (d.id, d.center))
            .collect()
    }
}
