//! Capture ingest: length-prefixed image frames over TCP.
//!
//! One camera client at a time. A new connection supersedes the old one:
//! the previous socket is shut down and its receive thread joined before
//! frames from the newcomer are accepted, and a generation counter keeps a
//! straggler from publishing after it is replaced.

use std::io;
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use pickcam_core::RgbFrame;

use crate::adjust::ImageAdjust;
use crate::buffer::{FrameSlot, RelayRing};
use crate::shutdown::ShutdownToken;
use crate::state::lock;
use crate::wire::{self, WireError};

const ACCEPT_POLL: Duration = Duration::from_millis(100);

struct IngestShared {
    slot: Arc<FrameSlot>,
    ring: Arc<RelayRing>,
    adjust: ImageAdjust,
    generation: AtomicU64,
    /// Width and height of the first decoded frame, zero until then.
    dimensions: Mutex<(u32, u32)>,
}

/// Listener plus the accept loop thread it runs on.
pub struct IngestServer {
    shared: Arc<IngestShared>,
    local_addr: SocketAddr,
    accept: Option<JoinHandle<()>>,
}

impl IngestServer {
    /// Bind the capture listener and start accepting.
    pub fn bind(
        addr: &str,
        slot: Arc<FrameSlot>,
        ring: Arc<RelayRing>,
        shutdown: ShutdownToken,
    ) -> io::Result<Self> {
        let listener = TcpListener::bind(addr)?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;
        log::info!("capture ingest listening on {local_addr}");

        let shared = Arc::new(IngestShared {
            slot,
            ring,
            adjust: ImageAdjust::new(),
            generation: AtomicU64::new(0),
            dimensions: Mutex::new((0, 0)),
        });

        let loop_shared = Arc::clone(&shared);
        let accept = thread::Builder::new()
            .name("ingest-accept".to_string())
            .spawn(move || accept_loop(listener, loop_shared, shutdown))?;

        Ok(Self {
            shared,
            local_addr,
            accept: Some(accept),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Width and height of the incoming feed, `(0, 0)` before the first
    /// frame decodes.
    pub fn frame_dimensions(&self) -> (u32, u32) {
        *lock(&self.shared.dimensions)
    }

    pub fn adjust(&self) -> &ImageAdjust {
        &self.shared.adjust
    }

    /// Newest decoded frame with the display adjustments applied.
    pub fn adjusted_frame(&self) -> Option<RgbFrame> {
        self.shared
            .slot
            .latest()
            .map(|frame| self.shared.adjust.apply(&frame))
    }

    /// Wait for the accept loop to finish. Meaningful only after the
    /// shutdown token fired.
    pub fn join(&mut self) {
        if let Some(handle) = self.accept.take() {
            if handle.join().is_err() {
                log::error!("ingest accept loop panicked");
            }
        }
    }
}

fn accept_loop(listener: TcpListener, shared: Arc<IngestShared>, shutdown: ShutdownToken) {
    let mut active: Option<(TcpStream, JoinHandle<()>)> = None;

    while !shutdown.is_triggered() {
        match listener.accept() {
            Ok((stream, peer)) => {
                log::info!("capture client connected from {peer}");
                supersede(&mut active);

                if let Err(e) = stream.set_nonblocking(false) {
                    log::warn!("could not configure capture socket: {e}");
                    continue;
                }
                let generation = shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
                let reader = match stream.try_clone() {
                    Ok(r) => r,
                    Err(e) => {
                        log::warn!("could not clone capture socket: {e}");
                        continue;
                    }
                };
                let rx_shared = Arc::clone(&shared);
                let rx_shutdown = shutdown.clone();
                match thread::Builder::new()
                    .name("ingest-rx".to_string())
                    .spawn(move || receive_loop(reader, generation, rx_shared, rx_shutdown))
                {
                    Ok(handle) => active = Some((stream, handle)),
                    Err(e) => log::error!("could not spawn capture receive thread: {e}"),
                }
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                shutdown.wait(ACCEPT_POLL);
            }
            Err(e) => {
                log::warn!("capture accept failed: {e}");
                shutdown.wait(Duration::from_secs(1));
            }
        }
    }

    supersede(&mut active);
}

/// Shut down the previous client socket and wait out its receive thread.
fn supersede(active: &mut Option<(TcpStream, JoinHandle<()>)>) {
    if let Some((stream, handle)) = active.take() {
        let _ = stream.shutdown(Shutdown::Both);
        if handle.join().is_err() {
            log::error!("capture receive thread panicked");
        }
    }
}

fn receive_loop(
    mut stream: TcpStream,
    generation: u64,
    shared: Arc<IngestShared>,
    shutdown: ShutdownToken,
) {
    loop {
        if shutdown.is_triggered() || shared.generation.load(Ordering::SeqCst) != generation {
            break;
        }
        let payload = match wire::read_message(&mut stream) {
            Ok(payload) => payload,
            Err(WireError::Oversized { len }) => {
                log::warn!("capture client sent a {len} byte message, closing the link");
                break;
            }
            Err(WireError::Io(e)) => {
                if !shutdown.is_triggered() {
                    log::info!("capture link closed: {e}");
                }
                break;
            }
        };

        let frame = match decode_frame(&payload) {
            Ok(frame) => frame,
            Err(e) => {
                log::warn!("undecodable capture frame ({} bytes): {e}", payload.len());
                continue;
            }
        };
        if shared.generation.load(Ordering::SeqCst) != generation {
            break;
        }

        {
            let mut dims = lock(&shared.dimensions);
            if *dims == (0, 0) {
                *dims = (frame.width as u32, frame.height as u32);
                log::info!("capture feed is {}x{}", dims.0, dims.1);
            }
        }
        shared.ring.push(frame.clone());
        shared.slot.publish(frame);
    }
}

fn decode_frame(bytes: &[u8]) -> Result<RgbFrame, image::ImageError> {
    let decoded = image::load_from_memory(bytes)?.to_rgb8();
    let (width, height) = decoded.dimensions();
    Ok(RgbFrame {
        width: width as usize,
        height: height as usize,
        data: decoded.into_raw(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn png_bytes(width: u32, height: u32, rgb: [u8; 3]) -> Vec<u8> {
        let img = image::RgbImage::from_pixel(width, height, image::Rgb(rgb));
        let mut bytes = Vec::new();
        img.write_to(
            &mut Cursor::new(&mut bytes),
            image::ImageFormat::Png,
        )
        .unwrap();
        bytes
    }

    #[test]
    fn decodes_an_encoded_frame() {
        let bytes = png_bytes(6, 4, [10, 200, 30]);
        let frame = decode_frame(&bytes).unwrap();
        assert_eq!((frame.width, frame.height), (6, 4));
        assert_eq!(frame.get(3, 2), [10, 200, 30]);
    }

    #[test]
    fn garbage_bytes_do_not_decode() {
        assert!(decode_frame(b"definitely not an image").is_err());
    }
}
