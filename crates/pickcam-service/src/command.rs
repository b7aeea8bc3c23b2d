//! JSON command endpoint: calibrate, color, sensor.
//!
//! Each connection carries one request and receives one response, always a
//! JSON object with `status` and `message`. Parse and validation problems
//! come back as structured errors on the wire rather than dropped
//! connections.

use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::calibration::{CalibrationError, CalibrationStore, MAX_PROFILE_ID};
use crate::protocol::{CalibratePayload, ColorReport, Request, Response};
use crate::shutdown::ShutdownToken;
use crate::state::{lock, SharedVision};

const ACCEPT_POLL: Duration = Duration::from_millis(100);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(2);
const MAX_REQUEST_BYTES: usize = 8 * 1024;

/// Everything a request handler needs.
pub(crate) struct CommandContext {
    pub state: SharedVision,
    pub store: Arc<CalibrationStore>,
    pub tracked_marker_id: u32,
}

/// Listener plus the accept loop thread it runs on.
pub struct CommandServer {
    local_addr: SocketAddr,
    accept: Option<JoinHandle<()>>,
}

impl CommandServer {
    pub(crate) fn bind(
        addr: &str,
        context: CommandContext,
        shutdown: ShutdownToken,
    ) -> io::Result<Self> {
        let listener = TcpListener::bind(addr)?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;
        log::info!("command endpoint listening on {local_addr}");

        let accept = thread::Builder::new()
            .name("command-accept".to_string())
            .spawn(move || accept_loop(listener, context, shutdown))?;

        Ok(Self {
            local_addr,
            accept: Some(accept),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Wait for the accept loop to finish. Meaningful only after the
    /// shutdown token fired.
    pub fn join(&mut self) {
        if let Some(handle) = self.accept.take() {
            if handle.join().is_err() {
                log::error!("command accept loop panicked");
            }
        }
    }
}

fn accept_loop(listener: TcpListener, context: CommandContext, shutdown: ShutdownToken) {
    let context = Arc::new(context);
    let mut workers: Vec<JoinHandle<()>> = Vec::new();

    while !shutdown.is_triggered() {
        workers.retain(|w| !w.is_finished());
        match listener.accept() {
            Ok((stream, peer)) => {
                log::debug!("command connection from {peer}");
                let ctx = Arc::clone(&context);
                match thread::Builder::new()
                    .name("command-worker".to_string())
                    .spawn(move || handle_connection(stream, &ctx))
                {
                    Ok(handle) => workers.push(handle),
                    Err(e) => log::error!("could not spawn command worker: {e}"),
                }
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                shutdown.wait(ACCEPT_POLL);
            }
            Err(e) => {
                log::warn!("command accept failed: {e}");
                shutdown.wait(Duration::from_secs(1));
            }
        }
    }

    // Workers are bounded by the request read timeout.
    for worker in workers {
        if worker.join().is_err() {
            log::error!("command worker panicked");
        }
    }
}

fn handle_connection(mut stream: TcpStream, context: &CommandContext) {
    let _ = stream.set_nonblocking(false);
    let _ = stream.set_read_timeout(Some(REQUEST_TIMEOUT));

    let response = match read_request(&mut stream) {
        Ok(value) => dispatch(value, context),
        Err(response) => response,
    };
    if !response.is_success() {
        log::warn!("command rejected: {}", response.message);
    }

    match serde_json::to_vec(&response) {
        Ok(bytes) => {
            if let Err(e) = stream.write_all(&bytes) {
                log::warn!("could not write command response: {e}");
            }
        }
        Err(e) => log::error!("could not serialize command response: {e}"),
    }
}

/// Accumulate bytes until they parse as one JSON value.
///
/// Stops at the peer's half-close, the read timeout, or the size cap;
/// whatever failed is already phrased as an error response.
fn read_request(stream: &mut TcpStream) -> Result<serde_json::Value, Response> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        match stream.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => {
                buf.extend_from_slice(&chunk[..n]);
                if buf.len() > MAX_REQUEST_BYTES {
                    return Err(Response::error(format!(
                        "request exceeds the {MAX_REQUEST_BYTES} byte limit"
                    )));
                }
                if let Ok(value) = serde_json::from_slice::<serde_json::Value>(&buf) {
                    return Ok(value);
                }
            }
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                break
            }
            Err(_) => break,
        }
    }
    if buf.is_empty() {
        Err(Response::error("empty request"))
    } else {
        Err(Response::error("request is not valid JSON"))
    }
}

fn dispatch(value: serde_json::Value, context: &CommandContext) -> Response {
    let request: Request = match serde_json::from_value(value.clone()) {
        Ok(request) => request,
        Err(_) => return describe_invalid_request(&value),
    };

    match request {
        Request::Calibrate { payload } => handle_calibrate(payload, context),
        Request::Color => handle_color(context),
        Request::Sensor => handle_sensor(context),
    }
}

/// Phrase why a syntactically valid JSON value is not a request.
fn describe_invalid_request(value: &serde_json::Value) -> Response {
    match value.get("type").and_then(serde_json::Value::as_str) {
        Some("calibrate") => Response::error(
            "payload for 'calibrate' must contain 'number' and 'robot_pos', or 'finish': true",
        ),
        Some(other) => Response::error(format!(
            "unknown request type '{other}', expected 'calibrate', 'color' or 'sensor'"
        )),
        None => Response::error("request is missing a 'type' field"),
    }
}

fn handle_calibrate(payload: CalibratePayload, context: &CommandContext) -> Response {
    match payload {
        CalibratePayload::Finish { finish: true } => {
            let mut state = lock(&context.state);
            match context.store.finish(&mut state) {
                Ok(message) => Response::success(message),
                Err(e) => Response::error(e.to_string()),
            }
        }
        CalibratePayload::Finish { finish: false } => Response::error(
            "payload for 'calibrate' must contain 'number' and 'robot_pos', or 'finish': true",
        ),
        CalibratePayload::Point { number, robot_pos } => {
            if number > MAX_PROFILE_ID {
                return Response::error(
                    CalibrationError::IdOutOfRange { id: number }.to_string(),
                );
            }
            let mut state = lock(&context.state);
            let Some(center) = state
                .marker_centers
                .get(&context.tracked_marker_id)
                .copied()
            else {
                return Response::error(format!(
                    "cannot teach profile {number}: marker {} is not currently visible",
                    context.tracked_marker_id
                ));
            };
            match context.store.upsert(&mut state, number, center, robot_pos) {
                Ok(message) => Response::success(message).with_id(number),
                Err(e) => Response::error(e.to_string()),
            }
        }
    }
}

fn handle_color(context: &CommandContext) -> Response {
    let reports: Vec<ColorReport> = {
        let state = lock(&context.state);
        state.color_objects.iter().map(ColorReport::from).collect()
    };
    let message = match reports.len() {
        0 => "no color objects in view".to_string(),
        n => format!("{n} color objects in view"),
    };
    Response::success(message).with_objects(reports)
}

fn handle_sensor(context: &CommandContext) -> Response {
    let telemetry = lock(&context.state).telemetry;
    Response::success("latest sensor snapshot").with_sensor(telemetry)
}
