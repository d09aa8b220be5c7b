//! Data channel handler.
//!
//! # Exchange
//!
//! ```text
//! client                              server
//!   │ {"transfer_id": id}  ──────────►  │  unknown id: close, no reply
//!   │                      ◄──────────  │  READY      (status: receiving)
//!   │ chunk frames         ──────────►  │  appended to the destination file
//!   │                      ◄──────────  │  COMPLETE   (received → decoded | decode_failed)
//!   │                                   │  INCOMPLETE (short or overlong stream)
//! ```
//!
//! The transfer is complete when exactly `declared_size` bytes arrived. There
//! is no resumption: a dropped connection leaves the transfer `incomplete`.

use crate::connection::Connection;
use crate::error::Result;
use crate::huffman;
use crate::metrics::Progress;
use crate::protocol::{DataHandshake, COMPLETE, INCOMPLETE, READY};
use crate::registry::{self, TransferRecord, TransferRegistry, TransferStatus};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub struct DataHandler {
    registry: Arc<TransferRegistry>,
}

impl DataHandler {
    pub fn new(registry: Arc<TransferRegistry>) -> Self {
        Self { registry }
    }

    /// Run one data connection to completion.
    pub fn serve(&self, mut conn: Connection) {
        let peer = conn.peer_addr();
        match self.handle(&mut conn) {
            Ok((transfer_id, status)) => {
                info!(%peer, %transfer_id, %status, "data connection finished");
            }
            Err(e) => {
                warn!(%peer, error = %e, "data connection rejected");
            }
        }
        conn.close();
    }

    /// Handshake, receive and decode. Returns the final status.
    ///
    /// An invalid handshake or unknown transfer id is returned as an error
    /// before anything is written back to the peer.
    pub fn handle(&self, conn: &mut Connection) -> Result<(String, TransferStatus)> {
        let handshake: DataHandshake = conn.recv_json("data handshake")?;
        let record = self.registry.begin_receiving(&handshake.transfer_id)?;
        let transfer_id = record.transfer_id.clone();
        debug!(%transfer_id, declared_size = record.declared_size, "data handshake accepted");

        let status = match self.receive_payload(conn, &record) {
            Some(received) if received == record.declared_size => {
                self.registry.set_status(&transfer_id, TransferStatus::Received);
                let status = self.decode(&record);
                conn.send(COMPLETE);
                status
            }
            received => {
                warn!(
                    %transfer_id,
                    received = ?received,
                    declared = record.declared_size,
                    "transfer incomplete"
                );
                self.registry.set_status(&transfer_id, TransferStatus::Incomplete);
                conn.send(INCOMPLETE);
                TransferStatus::Incomplete
            }
        };

        Ok((transfer_id, status))
    }

    /// Stream chunks into the destination file. Returns the byte count, or
    /// `None` when the file could not be written or READY could not be sent.
    fn receive_payload(&self, conn: &mut Connection, record: &TransferRecord) -> Option<u64> {
        let mut file = match create_destination(&record.destination_path) {
            Ok(file) => file,
            Err(e) => {
                error!(
                    transfer_id = %record.transfer_id,
                    path = %record.destination_path.display(),
                    error = %e,
                    "cannot create destination file"
                );
                return None;
            }
        };

        if !conn.send(READY) {
            return None;
        }

        let mut progress = Progress::new(record.declared_size);
        while progress.done() < record.declared_size {
            let Some(chunk) = conn.receive() else {
                break;
            };
            if let Err(e) = file.write_all(&chunk) {
                error!(transfer_id = %record.transfer_id, error = %e, "write failed");
                return None;
            }
            let step = progress.advance(chunk.len() as u64);
            debug!(transfer_id = %record.transfer_id, received = progress.done(), "chunk received");
            if let Some(percent) = step {
                info!(transfer_id = %record.transfer_id, percent, received = progress.done(), "receiving");
            }
        }

        if let Err(e) = file.flush() {
            error!(transfer_id = %record.transfer_id, error = %e, "flush failed");
            return None;
        }
        Some(progress.done())
    }

    /// Decode the stored payload next to it and record the outcome.
    fn decode(&self, record: &TransferRecord) -> TransferStatus {
        let output = registry::decoded_path(&record.destination_path);
        let result = fs::read(&record.destination_path)
            .map_err(crate::Error::from)
            .and_then(|payload| huffman::decode(&payload))
            .and_then(|decoded| fs::write(&output, decoded).map_err(crate::Error::from));

        match result {
            Ok(()) => {
                info!(
                    transfer_id = %record.transfer_id,
                    path = %output.display(),
                    "payload decoded"
                );
                self.registry.mark_decoded(&record.transfer_id, output);
                TransferStatus::Decoded
            }
            Err(e) => {
                warn!(transfer_id = %record.transfer_id, error = %e, "decode failed");
                self.registry
                    .set_status(&record.transfer_id, TransferStatus::DecodeFailed);
                TransferStatus::DecodeFailed
            }
        }
    }
}

fn create_destination(path: &Path) -> std::io::Result<BufWriter<File>> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    Ok(BufWriter::new(File::create(path)?))
}
