//! The per-frame processing pass.
//!
//! One thread consumes the latest capture frame and produces everything the
//! rest of the service reads: tracked marker centers, located color
//! objects, and the annotated display copy. Results land in the shared
//! state in a single critical section per pass, so readers never observe a
//! half-updated pass.

use std::sync::Arc;
use std::time::Duration;

use pickcam_color::{prefilter, ColorLocator};
use pickcam_core::{draw_cross, draw_disc, draw_polyline_closed, Mask, Rgb, RgbFrame};
use pickcam_marker::MarkerTracker;

use crate::buffer::{FrameSlot, Slot};
use crate::shutdown::ShutdownToken;
use crate::state::{lock, SharedVision};

/// How long one pass waits for a fresh frame before reprocessing the last.
pub const FRAME_WAIT: Duration = Duration::from_millis(50);

const MARKER_OUTLINE: Rgb = [0, 255, 0];
const MARKER_CENTER: Rgb = [255, 0, 0];
const ORIGIN_CROSS: Rgb = [255, 0, 255];
const ROI_OUTLINE: Rgb = [0, 0, 0];

/// Output of one completed pass.
#[derive(Clone, Debug)]
pub struct ProcessedFrames {
    /// Annotated copy for the operator view.
    pub display: RgbFrame,
    /// The exact (masked, prefiltered) input the color stage analyzed.
    pub color_analysis: RgbFrame,
}

/// Latest processed output, published once per pass.
pub type ProcessedSlot = Slot<ProcessedFrames>;

pub struct Pipeline {
    state: SharedVision,
    frames: Arc<FrameSlot>,
    processed: Arc<ProcessedSlot>,
    tracker: MarkerTracker,
    locator: ColorLocator,
    shutdown: ShutdownToken,
}

impl Pipeline {
    pub fn new(
        state: SharedVision,
        frames: Arc<FrameSlot>,
        processed: Arc<ProcessedSlot>,
        tracker: MarkerTracker,
        locator: ColorLocator,
        shutdown: ShutdownToken,
    ) -> Self {
        Self {
            state,
            frames,
            processed,
            tracker,
            locator,
            shutdown,
        }
    }

    /// Process frames until shutdown. Runs on its own thread.
    pub fn run(&self) {
        let mut seen = 0u64;
        while !self.shutdown.is_triggered() {
            let (frame, seq) = self.frames.wait_newer(seen, FRAME_WAIT);
            seen = seq;
            // Nothing has ever been ingested; keep waiting.
            let Some(frame) = frame else { continue };
            self.process(&frame);
        }
    }

    /// One full pass over a frame.
    pub(crate) fn process(&self, frame: &RgbFrame) {
        let (roi, transform) = {
            let state = lock(&self.state);
            (state.roi.clone(), state.transform)
        };

        let prefiltered = prefilter(frame);
        let (marker_input, color_input, outline) = match roi.rasterize(frame.width, frame.height)
        {
            Some((mask, corners)) => (
                apply_mask(frame, &mask),
                apply_mask(&prefiltered, &mask),
                Some(corners),
            ),
            None => (frame.clone(), prefiltered, None),
        };

        let mut display = frame.clone();

        let gray = marker_input.to_gray();
        let detections = self.tracker.detector().detect(&gray.view());
        for detection in &detections {
            draw_polyline_closed(&mut display, &detection.corners, MARKER_OUTLINE, 1);
        }
        let centers = self.tracker.filter(&detections);
        for center in centers.values() {
            draw_disc(
                &mut display,
                center.x.round() as i32,
                center.y.round() as i32,
                5,
                MARKER_CENTER,
            );
        }

        let objects = self
            .locator
            .locate(&color_input, Some(&mut display), transform.as_ref());

        if let Some(corners) = outline {
            draw_polyline_closed(&mut display, &corners, ROI_OUTLINE, 2);
        }

        {
            let mut state = lock(&self.state);
            for profile in &state.profiles {
                draw_cross(
                    &mut display,
                    profile.origin_point.x.round() as i32,
                    profile.origin_point.y.round() as i32,
                    7,
                    ORIGIN_CROSS,
                );
            }
            state.marker_centers = centers;
            state.color_objects = objects;
        }

        self.processed.publish(ProcessedFrames {
            display,
            color_analysis: color_input,
        });
    }
}

/// Copy of `frame` with everything outside `mask` black.
fn apply_mask(frame: &RgbFrame, mask: &Mask) -> RgbFrame {
    let mut out = RgbFrame::new(frame.width, frame.height);
    for (i, &keep) in mask.data.iter().enumerate() {
        if keep != 0 {
            let at = i * 3;
            out.data[at..at + 3].copy_from_slice(&frame.data[at..at + 3]);
        }
    }
    out
}
