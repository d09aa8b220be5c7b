//! Wire format for the control and data channels.
//!
//! # Frame Format
//!
//! ```text
//! +------------------+------------------------+
//! | Length (4 bytes) | Body (Length bytes)    |
//! | u32 little-endian|                        |
//! +------------------+------------------------+
//! ```
//!
//! Both channels carry nothing but frames, except for the bulk bytes of the
//! legacy single-channel format (see [`crate::legacy`]).
//!
//! # Control Messages
//!
//! JSON objects tagged by `command`:
//! - `{"command":"prepare","transfer_id":..,"filename":..,"filesize":..}`
//! - `{"command":"status","transfer_id":..}`
//! - `{"command":"cancel","transfer_id":..}`
//!
//! Every request is answered with `{"status":..,"transfer_id":..}`.
//!
//! # Data Channel
//!
//! `{"transfer_id":..}` → `READY` → chunk frames → `COMPLETE` | `INCOMPLETE`.

use crate::error::{ProtocolError, Result};
use serde::{Deserialize, Serialize};
use std::io::{ErrorKind, Read, Write};

/// Largest frame body either side will accept (16 MiB).
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Data channel acknowledgements.
pub const READY: &[u8] = b"READY";
pub const COMPLETE: &[u8] = b"COMPLETE";
pub const INCOMPLETE: &[u8] = b"INCOMPLETE";

/// A control channel command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "lowercase")]
pub enum ControlRequest {
    /// Register (or re-register) a transfer before its data connection
    Prepare {
        transfer_id: String,
        filename: String,
        filesize: u64,
    },
    Status {
        transfer_id: String,
    },
    Cancel {
        transfer_id: String,
    },
}

impl ControlRequest {
    pub fn transfer_id(&self) -> &str {
        match self {
            ControlRequest::Prepare { transfer_id, .. }
            | ControlRequest::Status { transfer_id }
            | ControlRequest::Cancel { transfer_id } => transfer_id,
        }
    }
}

/// Reply to every control command.
///
/// `status` is a transfer state name, `"ready"`, `"cancelled"` or `"unknown"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlResponse {
    pub status: String,
    pub transfer_id: String,
}

/// First frame on a data connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataHandshake {
    pub transfer_id: String,
}

/// Write one length-prefixed frame.
pub fn write_frame<W: Write + ?Sized>(writer: &mut W, body: &[u8]) -> Result<()> {
    if body.len() > MAX_FRAME_LEN {
        return Err(ProtocolError::FrameTooLarge {
            len: body.len(),
            max: MAX_FRAME_LEN,
        }
        .into());
    }
    writer.write_all(&(body.len() as u32).to_le_bytes())?;
    writer.write_all(body)?;
    writer.flush()?;
    Ok(())
}

/// Read one length-prefixed frame.
///
/// Returns `Ok(None)` when the peer closed the stream cleanly at a frame
/// boundary. A stream that ends inside a frame is an I/O error.
pub fn read_frame<R: Read + ?Sized>(reader: &mut R) -> Result<Option<Vec<u8>>> {
    let mut len_buf = [0u8; 4];
    let mut filled = 0;
    while filled < len_buf.len() {
        match reader.read(&mut len_buf[filled..]) {
            Ok(0) if filled == 0 => return Ok(None),
            Ok(0) => return Err(std::io::Error::from(ErrorKind::UnexpectedEof).into()),
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }

    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MAX_FRAME_LEN {
        return Err(ProtocolError::FrameTooLarge {
            len,
            max: MAX_FRAME_LEN,
        }
        .into());
    }

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body)?;
    Ok(Some(body))
}

/// Serialize `message` as JSON and write it as one frame.
pub fn write_json<W: Write + ?Sized, T: Serialize>(writer: &mut W, message: &T) -> Result<()> {
    let body = serde_json::to_vec(message)?;
    write_frame(writer, &body)
}

/// Parse a frame body as a JSON message, mapping failures to `InvalidFrame`.
pub fn parse_json<T: for<'de> Deserialize<'de>>(body: &[u8]) -> Result<T> {
    serde_json::from_slice(body)
        .map_err(|e| ProtocolError::InvalidFrame(format!("{e}: {}", String::from_utf8_lossy(body))).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use std::io::Cursor;

    #[test]
    fn test_frame_layout() {
        let mut buf = Vec::new();
        write_frame(&mut buf, b"READY").unwrap();
        assert_eq!(buf, [5, 0, 0, 0, b'R', b'E', b'A', b'D', b'Y']);

        let mut cursor = Cursor::new(buf);
        assert_eq!(read_frame(&mut cursor).unwrap().unwrap(), b"READY");
        assert!(read_frame(&mut cursor).unwrap().is_none());
    }

    #[test]
    fn test_empty_frame_is_not_eof() {
        let mut buf = Vec::new();
        write_frame(&mut buf, b"").unwrap();

        let mut cursor = Cursor::new(buf);
        assert_eq!(read_frame(&mut cursor).unwrap(), Some(Vec::new()));
        assert_eq!(read_frame(&mut cursor).unwrap(), None);
    }

    #[test]
    fn test_truncated_frame_is_error() {
        let mut cursor = Cursor::new(vec![10, 0, 0, 0, 1, 2, 3]);
        assert!(matches!(read_frame(&mut cursor), Err(Error::Io(_))));

        let mut cursor = Cursor::new(vec![10, 0]);
        assert!(matches!(read_frame(&mut cursor), Err(Error::Io(_))));
    }

    #[test]
    fn test_oversized_frame_rejected() {
        let len = (MAX_FRAME_LEN as u32 + 1).to_le_bytes();
        let mut cursor = Cursor::new(len.to_vec());
        assert!(matches!(
            read_frame(&mut cursor),
            Err(Error::Protocol(ProtocolError::FrameTooLarge { .. }))
        ));
    }

    #[test]
    fn test_control_request_json() {
        let request: ControlRequest = parse_json(
            br#"{"command":"prepare","transfer_id":"t1","filename":"a.txt","filesize":100}"#,
        )
        .unwrap();
        assert_eq!(
            request,
            ControlRequest::Prepare {
                transfer_id: "t1".into(),
                filename: "a.txt".into(),
                filesize: 100,
            }
        );

        let cancel = serde_json::to_value(ControlRequest::Cancel {
            transfer_id: "t2".into(),
        })
        .unwrap();
        assert_eq!(cancel, serde_json::json!({"command": "cancel", "transfer_id": "t2"}));
    }

    #[test]
    fn test_unknown_command_is_invalid_frame() {
        let result: Result<ControlRequest> =
            parse_json(br#"{"command":"delete","transfer_id":"t1"}"#);
        assert!(matches!(
            result,
            Err(Error::Protocol(ProtocolError::InvalidFrame(_)))
        ));
    }
}
