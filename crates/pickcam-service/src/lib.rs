//! The pickcam vision service.
//!
//! Wires the detection crates to the outside world: a capture ingest
//! listener, the per-frame processing pipeline, a paced relay toward the
//! viewer gateway, a JSON command endpoint, and the persistent calibration
//! store. [`Service::start`] brings the whole set up; everything runs on
//! plain threads around one shared state.

mod adjust;
mod buffer;
mod calibration;
mod command;
mod config;
mod ingest;
mod pipeline;
mod protocol;
mod relay;
mod roi;
mod service;
mod shutdown;
mod state;
mod wire;

pub use adjust::{ImageAdjust, ADJUST_STEP, BRIGHTNESS_LIMIT, STRENGTH_LIMIT};
pub use buffer::{FrameSlot, RelayRing, Slot, RELAY_RING_CAPACITY};
pub use calibration::{
    CalibrationError, CalibrationProfile, CalibrationStore, INLIER_THRESHOLD, MAX_PROFILE_ID,
    MIN_FIT_POINTS,
};
pub use command::CommandServer;
pub use config::{CommandConfig, ConfigError, RelayConfig, ServiceConfig, StreamConfig};
pub use ingest::IngestServer;
pub use pipeline::{Pipeline, ProcessedFrames, ProcessedSlot, FRAME_WAIT};
pub use protocol::{CalibratePayload, ColorReport, Request, Response, Status};
pub use relay::RelayClient;
pub use roi::{RoiSelection, ROI_ROTATE_STEP};
pub use service::{Service, ServiceError};
pub use shutdown::ShutdownToken;
pub use state::{SharedVision, TelemetrySnapshot, VisionState};
pub use wire::{read_message, write_message, WireError, MAX_MESSAGE_BYTES};
