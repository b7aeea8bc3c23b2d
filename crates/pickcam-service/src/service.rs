//! Service assembly: spawn, wire together, and tear down every loop.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use thiserror::Error;

use pickcam_color::ColorLocator;
use pickcam_core::{PixelPoint, RgbFrame};
use pickcam_marker::{MarkerDetector, MarkerTracker};

use crate::adjust::ImageAdjust;
use crate::buffer::{FrameSlot, RelayRing};
use crate::calibration::{CalibrationError, CalibrationStore};
use crate::command::{CommandContext, CommandServer};
use crate::config::ServiceConfig;
use crate::ingest::IngestServer;
use crate::pipeline::{Pipeline, ProcessedFrames, ProcessedSlot};
use crate::relay::RelayClient;
use crate::shutdown::ShutdownToken;
use crate::state::{lock, SharedVision, TelemetrySnapshot, VisionState};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("could not bind the {endpoint} endpoint on {addr}")]
    Bind {
        endpoint: &'static str,
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Calibration(#[from] CalibrationError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// The running vision service.
///
/// Owns the shared state and every loop thread. Dropping it without calling
/// [`Service::shutdown`] detaches the threads, so embedding code should
/// always shut it down explicitly.
pub struct Service {
    state: SharedVision,
    store: Arc<CalibrationStore>,
    processed: Arc<ProcessedSlot>,
    shutdown: ShutdownToken,
    ingest: IngestServer,
    command: CommandServer,
    pipeline: Option<JoinHandle<()>>,
    relay: Option<JoinHandle<()>>,
}

impl Service {
    /// Load calibration, bind both listeners, and start all loops.
    pub fn start(config: ServiceConfig) -> Result<Self, ServiceError> {
        let store = Arc::new(CalibrationStore::new(config.calibration_path.clone()));

        let mut initial = VisionState {
            profiles: store.load()?,
            ..VisionState::default()
        };
        if !initial.profiles.is_empty() {
            log::info!("loaded {} calibration profiles", initial.profiles.len());
            match store.finish(&mut initial) {
                Ok(message) => log::info!("startup calibration: {message}"),
                Err(e) => log::warn!("startup calibration not usable yet: {e}"),
            }
        }
        let state: SharedVision = Arc::new(Mutex::new(initial));

        let shutdown = ShutdownToken::new();
        let frames = Arc::new(FrameSlot::new());
        let ring = Arc::new(RelayRing::new());
        let processed = Arc::new(ProcessedSlot::new());

        let ingest = IngestServer::bind(
            &config.stream_addr(),
            Arc::clone(&frames),
            Arc::clone(&ring),
            shutdown.clone(),
        )
        .map_err(|source| ServiceError::Bind {
            endpoint: "capture",
            addr: config.stream_addr(),
            source,
        })?;

        let command = CommandServer::bind(
            &config.command_addr(),
            CommandContext {
                state: Arc::clone(&state),
                store: Arc::clone(&store),
                tracked_marker_id: config.tracked_marker_id,
            },
            shutdown.clone(),
        )
        .map_err(|source| ServiceError::Bind {
            endpoint: "command",
            addr: config.command_addr(),
            source,
        })?;

        let pipeline_worker = Pipeline::new(
            Arc::clone(&state),
            Arc::clone(&frames),
            Arc::clone(&processed),
            MarkerTracker::new(MarkerDetector::with_default_family(), config.tracked_marker_id),
            ColorLocator::new(config.locator.clone()),
            shutdown.clone(),
        );
        let pipeline = thread::Builder::new()
            .name("pipeline".to_string())
            .spawn(move || pipeline_worker.run())?;

        let relay = if config.relay.enabled {
            let client = RelayClient::new(config.relay.clone(), Arc::clone(&ring), shutdown.clone());
            Some(
                thread::Builder::new()
                    .name("relay".to_string())
                    .spawn(move || client.run())?,
            )
        } else {
            log::info!("frame relay disabled by configuration");
            None
        };

        Ok(Self {
            state,
            store,
            processed,
            shutdown,
            ingest,
            command,
            pipeline: Some(pipeline),
            relay,
        })
    }

    /// Shared state handle for embedding code (display, input handlers).
    pub fn state(&self) -> SharedVision {
        Arc::clone(&self.state)
    }

    pub fn ingest_addr(&self) -> SocketAddr {
        self.ingest.local_addr()
    }

    pub fn command_addr(&self) -> SocketAddr {
        self.command.local_addr()
    }

    /// Width and height of the capture feed, `(0, 0)` before the first frame.
    pub fn frame_dimensions(&self) -> (u32, u32) {
        self.ingest.frame_dimensions()
    }

    /// Display adjustment parameters.
    pub fn adjust(&self) -> &ImageAdjust {
        self.ingest.adjust()
    }

    /// Newest raw frame with display adjustments applied.
    pub fn adjusted_frame(&self) -> Option<RgbFrame> {
        self.ingest.adjusted_frame()
    }

    /// Newest completed processing output.
    pub fn processed(&self) -> &Arc<ProcessedSlot> {
        &self.processed
    }

    pub fn latest_processed(&self) -> Option<ProcessedFrames> {
        self.processed.latest()
    }

    pub fn set_telemetry(&self, snapshot: TelemetrySnapshot) {
        lock(&self.state).telemetry = snapshot;
    }

    /// Re-read the calibration file and refit the transform.
    pub fn reload_calibration(&self) -> Result<String, CalibrationError> {
        let mut state = lock(&self.state);
        self.store.reload(&mut state)
    }

    pub fn roi_begin(&self, at: PixelPoint) {
        lock(&self.state).roi.begin(at);
    }

    pub fn roi_drag(&self, to: PixelPoint) {
        lock(&self.state).roi.drag(to);
    }

    pub fn roi_confirm(&self) {
        lock(&self.state).roi.confirm();
    }

    pub fn roi_clear(&self) {
        lock(&self.state).roi.clear();
    }

    pub fn roi_rotate(&self, delta_deg: f64) {
        lock(&self.state).roi.rotate(delta_deg);
    }

    /// Stop every loop and wait for the threads to finish.
    ///
    /// All loops observe the token within their poll interval and every
    /// blocking socket operation they perform is bounded, so this returns
    /// promptly.
    pub fn shutdown(mut self) {
        log::info!("shutting down");
        self.shutdown.trigger();

        if let Some(handle) = self.pipeline.take() {
            if handle.join().is_err() {
                log::error!("pipeline thread panicked");
            }
        }
        if let Some(handle) = self.relay.take() {
            if handle.join().is_err() {
                log::error!("relay thread panicked");
            }
        }
        self.ingest.join();
        self.command.join();
        log::info!("all service loops stopped");
    }
}
