//! Paced frame forwarding to the upstream viewer relay.
//!
//! Frames leave the bounded ring as JPEG, wrapped in a base64 JSON envelope
//! and terminated by a newline. The loop self-paces off the relay's
//! acknowledgements: a normal ack keeps the steady interval, the "no
//! viewers" ack stretches the gap to the idle backoff, and errors tear the
//! connection down and wait out the error backoff before reconnecting.

use std::io::{self, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;

use base64::Engine;

use pickcam_core::RgbFrame;

use crate::buffer::RelayRing;
use crate::config::RelayConfig;
use crate::shutdown::ShutdownToken;

/// Handshake reply fragment that marks the secret as accepted.
const ACCESS_GRANTED: &str = "Access granted";
/// Exact ack message meaning nobody is watching the stream.
const NO_VIEWERS_MESSAGE: &str = "Video stream ignored, no WebRTC clients connected";
/// Wait between ring polls while no frame is queued.
const EMPTY_RING_POLL: Duration = Duration::from_millis(100);
/// Bounds for connect and handshake so shutdown is never stuck behind them.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

pub struct RelayClient {
    config: RelayConfig,
    ring: Arc<RelayRing>,
    shutdown: ShutdownToken,
}

impl RelayClient {
    pub fn new(config: RelayConfig, ring: Arc<RelayRing>, shutdown: ShutdownToken) -> Self {
        Self {
            config,
            ring,
            shutdown,
        }
    }

    /// Forward frames until shutdown. Runs on its own thread.
    pub fn run(&self) {
        let mut conn: Option<TcpStream> = None;
        let mut pause = Duration::ZERO;

        while !self.shutdown.wait(pause) {
            pause = EMPTY_RING_POLL;
            if self.ring.is_empty() {
                continue;
            }

            let mut stream = match conn.take() {
                Some(stream) => stream,
                None => match self.connect() {
                    Ok(stream) => stream,
                    Err(e) => {
                        log::warn!("relay connect to {} failed: {e}", self.config.addr());
                        pause = self.config.error_backoff();
                        continue;
                    }
                },
            };

            let Some(frame) = self.ring.pop() else {
                conn = Some(stream);
                continue;
            };

            let envelope = match encode_envelope(&frame, self.config.jpeg_quality) {
                Ok(envelope) => envelope,
                Err(e) => {
                    log::warn!("frame encode failed, skipping: {e}");
                    conn = Some(stream);
                    pause = Duration::ZERO;
                    continue;
                }
            };
            if envelope.len() > self.config.max_envelope_bytes {
                log::debug!(
                    "skipping {} byte envelope over the {} byte relay cap",
                    envelope.len(),
                    self.config.max_envelope_bytes
                );
                conn = Some(stream);
                pause = Duration::ZERO;
                continue;
            }

            if let Err(e) = stream.write_all(&envelope) {
                log::warn!("relay send failed: {e}");
                pause = self.config.error_backoff();
                continue;
            }
            pause = self.config.steady_interval();

            match read_ack(&mut stream, self.config.ack_timeout()) {
                Ok(Some(ack)) => {
                    if is_no_viewers_ack(&ack) {
                        log::debug!("relay reports no viewers, backing off");
                        pause = self.config.idle_backoff();
                    }
                    conn = Some(stream);
                }
                // No ack inside the window; the connection stays up.
                Ok(None) => conn = Some(stream),
                Err(e) => {
                    log::warn!("relay ack read failed: {e}");
                    pause = self.config.error_backoff();
                }
            }
        }
    }

    /// Connect and run the shared-secret handshake.
    fn connect(&self) -> io::Result<TcpStream> {
        let addr = self
            .config
            .addr()
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| {
                io::Error::new(io::ErrorKind::AddrNotAvailable, "relay address did not resolve")
            })?;
        let mut stream = TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT)?;
        stream.write_all(self.config.secret.as_bytes())?;

        stream.set_read_timeout(Some(CONNECT_TIMEOUT))?;
        let mut buf = [0u8; 256];
        let n = stream.read(&mut buf)?;
        let reply = String::from_utf8_lossy(&buf[..n]);
        if !reply.contains(ACCESS_GRANTED) {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("relay refused the shared secret: {}", reply.trim()),
            ));
        }
        stream.set_read_timeout(None)?;
        log::info!("relay connection to {} established", self.config.addr());
        Ok(stream)
    }
}

/// Read one newline-terminated ack within `timeout`.
///
/// `Ok(None)` means the window passed without a complete line, which is not
/// a connection fault. A closed or failed socket is an error.
fn read_ack(stream: &mut TcpStream, timeout: Duration) -> io::Result<Option<String>> {
    stream.set_read_timeout(Some(timeout))?;
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    let outcome = loop {
        match stream.read(&mut chunk) {
            Ok(0) => {
                break Err(io::Error::new(
                    io::ErrorKind::ConnectionAborted,
                    "relay closed while an ack was pending",
                ))
            }
            Ok(n) => {
                buf.extend_from_slice(&chunk[..n]);
                if buf.ends_with(b"\n") {
                    break Ok(Some(String::from_utf8_lossy(&buf).into_owned()));
                }
            }
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                break Ok(None)
            }
            Err(e) => break Err(e),
        }
    };
    stream.set_read_timeout(None)?;
    outcome
}

fn is_no_viewers_ack(raw: &str) -> bool {
    let Ok(ack) = serde_json::from_str::<serde_json::Value>(raw.trim()) else {
        return false;
    };
    ack.get("status").and_then(serde_json::Value::as_str) == Some("success")
        && ack.get("message").and_then(serde_json::Value::as_str) == Some(NO_VIEWERS_MESSAGE)
}

/// JPEG-encode a frame and wrap it in the newline-terminated JSON envelope.
fn encode_envelope(frame: &RgbFrame, quality: u8) -> Result<Vec<u8>, image::ImageError> {
    let mut jpeg = Vec::new();
    let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut jpeg, quality);
    encoder.encode(
        &frame.data,
        frame.width as u32,
        frame.height as u32,
        image::ExtendedColorType::Rgb8,
    )?;

    let payload = serde_json::json!({
        "type": "videostream",
        "data": [base64::engine::general_purpose::STANDARD.encode(&jpeg)],
    });
    let mut bytes = payload.to_string().into_bytes();
    bytes.push(b'\n');
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_is_one_json_line_with_decodable_data() {
        let mut frame = RgbFrame::new(16, 12);
        for y in 0..12 {
            for x in 0..16 {
                frame.set(x, y, [(x * 16) as u8, (y * 20) as u8, 128]);
            }
        }
        let envelope = encode_envelope(&frame, 60).unwrap();
        assert_eq!(envelope.last(), Some(&b'\n'));
        assert_eq!(envelope.iter().filter(|&&b| b == b'\n').count(), 1);

        let value: serde_json::Value = serde_json::from_slice(&envelope).unwrap();
        assert_eq!(value["type"], "videostream");
        let b64 = value["data"][0].as_str().unwrap();
        let jpeg = base64::engine::general_purpose::STANDARD.decode(b64).unwrap();
        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (16, 12));
    }

    #[test]
    fn only_the_exact_no_viewers_ack_matches() {
        assert!(is_no_viewers_ack(
            r#"{"status": "success", "message": "Video stream ignored, no WebRTC clients connected"}"#
        ));
        assert!(!is_no_viewers_ack(
            r#"{"status": "success", "message": "Video frame processed"}"#
        ));
        assert!(!is_no_viewers_ack(
            r#"{"status": "error", "message": "Video stream ignored, no WebRTC clients connected"}"#
        ));
        assert!(!is_no_viewers_ack("ok"));
    }
}
