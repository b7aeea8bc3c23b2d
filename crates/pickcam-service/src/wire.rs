//! Length-prefixed message framing on the capture socket.
//!
//! Every message is a big-endian `u32` byte count followed by exactly that
//! many payload bytes. The prefix is fixed-width regardless of platform, and
//! a hard cap rejects absurd lengths before any allocation happens.

use std::io::{Read, Write};

use thiserror::Error;

/// Upper bound on a single framed payload. Raw capture frames arrive as
/// encoded images, so anything past this is a desynchronized or hostile peer.
pub const MAX_MESSAGE_BYTES: u32 = 8 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum WireError {
    #[error("message length {len} exceeds the {MAX_MESSAGE_BYTES} byte cap")]
    Oversized { len: u64 },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Read one framed message, blocking until the full payload arrives.
pub fn read_message(reader: &mut impl Read) -> Result<Vec<u8>, WireError> {
    let mut prefix = [0u8; 4];
    reader.read_exact(&mut prefix)?;
    let len = u32::from_be_bytes(prefix);
    if len > MAX_MESSAGE_BYTES {
        return Err(WireError::Oversized {
            len: u64::from(len),
        });
    }
    let mut payload = vec![0u8; len as usize];
    reader.read_exact(&mut payload)?;
    Ok(payload)
}

/// Frame and write one message.
pub fn write_message(writer: &mut impl Write, payload: &[u8]) -> Result<(), WireError> {
    if payload.len() > MAX_MESSAGE_BYTES as usize {
        return Err(WireError::Oversized {
            len: payload.len() as u64,
        });
    }
    writer.write_all(&(payload.len() as u32).to_be_bytes())?;
    writer.write_all(payload)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn round_trips_a_message() {
        let mut buf = Vec::new();
        write_message(&mut buf, b"hello frame").unwrap();
        assert_eq!(&buf[..4], &11u32.to_be_bytes());

        let mut cursor = Cursor::new(buf);
        let payload = read_message(&mut cursor).unwrap();
        assert_eq!(payload, b"hello frame");
    }

    #[test]
    fn rejects_an_oversized_prefix_before_reading_the_body() {
        let mut buf = (MAX_MESSAGE_BYTES + 1).to_be_bytes().to_vec();
        buf.extend_from_slice(b"junk");
        let mut cursor = Cursor::new(buf);
        match read_message(&mut cursor) {
            Err(WireError::Oversized { len }) => {
                assert_eq!(len, u64::from(MAX_MESSAGE_BYTES) + 1);
            }
            other => panic!("expected Oversized, got {other:?}"),
        }
    }

    #[test]
    fn truncated_payload_is_an_io_error() {
        let mut buf = 10u32.to_be_bytes().to_vec();
        buf.extend_from_slice(b"short");
        let mut cursor = Cursor::new(buf);
        match read_message(&mut cursor) {
            Err(WireError::Io(e)) => {
                assert_eq!(e.kind(), std::io::ErrorKind::UnexpectedEof);
            }
            other => panic!("expected Io, got {other:?}"),
        }
    }

    #[test]
    fn refuses_to_write_past_the_cap() {
        let huge = vec![0u8; MAX_MESSAGE_BYTES as usize + 1];
        let mut sink = Vec::new();
        assert!(matches!(
            write_message(&mut sink, &huge),
            Err(WireError::Oversized { .. })
        ));
        assert!(sink.is_empty());
    }
}
