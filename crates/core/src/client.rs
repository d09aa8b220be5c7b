//! Sending side of the dual-channel protocol.
//!
//! # Send Sequence
//!
//! 1. Encode the whole input in memory
//! 2. `prepare` on the control channel, expect `ready`
//! 3. Data handshake with the transfer id, expect `READY`
//! 4. Stream the payload in `buffer_size` chunks
//! 5. Expect `COMPLETE`
//!
//! Each data connection carries exactly one transfer; the client dials a new
//! one for every send after the first.

use crate::config::NetConfig;
use crate::connection::Connection;
use crate::error::{ProtocolError, Result};
use crate::huffman;
use crate::metrics::{Progress, TransferReport};
use crate::protocol::{ControlRequest, ControlResponse, DataHandshake, COMPLETE, READY};
use rand::Rng;
use std::path::Path;
use tracing::{debug, info};

pub struct Client {
    config: NetConfig,
    control: Connection,
    data: Option<Connection>,
}

impl Client {
    /// Dial the data channel, then the control channel.
    pub fn connect(config: &NetConfig) -> Result<Self> {
        config.validate()?;
        let data = Connection::connect(config, config.data_port)?;
        let control = Connection::connect(config, config.control_port)?;
        debug!(control = %control.peer_addr(), data = %data.peer_addr(), "client connected");

        Ok(Self {
            config: config.clone(),
            control,
            data: Some(data),
        })
    }

    /// Read, encode and send a file.
    pub fn send_file(&mut self, path: &Path) -> Result<TransferReport> {
        let data = std::fs::read(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.send_bytes(&name, &data)
    }

    /// Encode `data` and send it under `<stem>_encoded<ext>` derived from
    /// `name`.
    pub fn send_bytes(&mut self, name: &str, data: &[u8]) -> Result<TransferReport> {
        let transfer_id = new_transfer_id();
        let filename = encoded_name(name);
        let mut report = TransferReport::new(&transfer_id, &filename);

        let (payload, ratio) = huffman::encode(data)?;
        report.original_bytes = data.len() as u64;
        report.encoded_bytes = payload.len() as u64;
        debug!(%transfer_id, original = data.len(), encoded = payload.len(), ratio, "payload encoded");

        let response = self.request(&ControlRequest::Prepare {
            transfer_id: transfer_id.clone(),
            filename: filename.clone(),
            filesize: payload.len() as u64,
        })?;
        expect_status(&response, "ready")?;

        let mut conn = match self.data.take() {
            Some(conn) => conn,
            None => Connection::connect(&self.config, self.config.data_port)?,
        };

        conn.send_json(&DataHandshake {
            transfer_id: transfer_id.clone(),
        })?;
        let reply = conn
            .recv_frame()?
            .ok_or(ProtocolError::ConnectionClosed("data handshake"))?;
        expect_literal(&reply, READY)?;

        let mut progress = Progress::new(payload.len() as u64);
        for chunk in payload.chunks(self.config.buffer_size) {
            conn.send_frame(chunk)?;
            report.chunks_sent += 1;
            if let Some(percent) = progress.advance(chunk.len() as u64) {
                info!(%transfer_id, percent, sent = progress.done(), "sending");
            }
        }

        let reply = conn
            .recv_frame()?
            .ok_or(ProtocolError::ConnectionClosed("transfer acknowledgement"))?;
        conn.close();
        expect_literal(&reply, COMPLETE)?;

        report.complete();
        info!(
            %transfer_id,
            filename = %filename,
            bytes = report.original_bytes,
            ratio = format_args!("{:.2}%", report.compression_ratio()),
            "transfer complete"
        );
        Ok(report)
    }

    /// Server-side status of `transfer_id` (`"unknown"` if never prepared).
    pub fn status(&mut self, transfer_id: &str) -> Result<String> {
        let response = self.request(&ControlRequest::Status {
            transfer_id: transfer_id.to_string(),
        })?;
        Ok(response.status)
    }

    /// Ask the server to mark `transfer_id` cancelled.
    pub fn cancel(&mut self, transfer_id: &str) -> Result<String> {
        let response = self.request(&ControlRequest::Cancel {
            transfer_id: transfer_id.to_string(),
        })?;
        expect_status(&response, "cancelled")?;
        Ok(response.status)
    }

    fn request(&mut self, request: &ControlRequest) -> Result<ControlResponse> {
        self.control.send_json(request)?;
        self.control.recv_json("control request")
    }

    /// Close both channels.
    pub fn close(mut self) {
        if let Some(data) = self.data.take() {
            data.close();
        }
        self.control.close();
    }
}

/// Random 128-bit transfer id as 32 lowercase hex digits.
pub fn new_transfer_id() -> String {
    let id: u128 = rand::thread_rng().gen();
    format!("{id:032x}")
}

/// `report.txt` → `report_encoded.txt`; `archive` → `archive_encoded`.
pub fn encoded_name(name: &str) -> String {
    let path = Path::new(name);
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    match path.extension() {
        Some(ext) => format!("{stem}_encoded.{}", ext.to_string_lossy()),
        None => format!("{stem}_encoded"),
    }
}

fn expect_status(response: &ControlResponse, expected: &str) -> Result<()> {
    if response.status == expected {
        Ok(())
    } else {
        Err(ProtocolError::UnexpectedReply {
            expected: expected.to_string(),
            actual: response.status.clone(),
        }
        .into())
    }
}

fn expect_literal(reply: &[u8], expected: &[u8]) -> Result<()> {
    if reply == expected {
        Ok(())
    } else {
        Err(ProtocolError::UnexpectedReply {
            expected: String::from_utf8_lossy(expected).into_owned(),
            actual: String::from_utf8_lossy(reply).into_owned(),
        }
        .into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transfer_id_format() {
        let a = new_transfer_id();
        let b = new_transfer_id();
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn test_encoded_name() {
        assert_eq!(encoded_name("report.txt"), "report_encoded.txt");
        assert_eq!(encoded_name("archive"), "archive_encoded");
        assert_eq!(encoded_name("data.tar.gz"), "data.tar_encoded.gz");
    }

    #[test]
    fn test_expect_literal() {
        assert!(expect_literal(b"READY", READY).is_ok());
        assert!(matches!(
            expect_literal(b"INCOMPLETE", COMPLETE),
            Err(crate::Error::Protocol(ProtocolError::UnexpectedReply { .. }))
        ));
    }
}
