//! Server-side transfer bookkeeping.
//!
//! # State Machine
//!
//! ```text
//! prepared ──► receiving ──► received ──► decoded
//!    │             │            └───────► decode_failed
//!    │             └──► incomplete
//!    └──(any state)──► cancelled
//! ```
//!
//! Records are created by `prepare`, mutated by the control and data
//! handlers, and never removed. Every access takes the single registry lock,
//! so operations on one id are linearizable.

use crate::error::{ProtocolError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lifecycle state of one transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferStatus {
    Prepared,
    Receiving,
    Received,
    Decoded,
    DecodeFailed,
    Incomplete,
    Cancelled,
}

impl TransferStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferStatus::Prepared => "prepared",
            TransferStatus::Receiving => "receiving",
            TransferStatus::Received => "received",
            TransferStatus::Decoded => "decoded",
            TransferStatus::DecodeFailed => "decode_failed",
            TransferStatus::Incomplete => "incomplete",
            TransferStatus::Cancelled => "cancelled",
        }
    }

    /// True once no further handler action is expected.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransferStatus::Decoded
                | TransferStatus::DecodeFailed
                | TransferStatus::Incomplete
                | TransferStatus::Cancelled
        )
    }
}

impl fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything the server knows about one transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRecord {
    pub transfer_id: String,

    /// Name as declared by the sender (unsanitized)
    pub filename: String,

    /// Payload size the data channel must deliver
    pub declared_size: u64,

    pub status: TransferStatus,

    /// Where the encoded payload is written
    pub destination_path: PathBuf,

    /// Set once the payload decoded successfully
    pub decoded_path: Option<PathBuf>,
}

/// Mutex-guarded map of transfer id → record.
///
/// Shared between handlers through `Arc<TransferRegistry>`.
#[derive(Debug)]
pub struct TransferRegistry {
    save_dir: PathBuf,
    transfers: Mutex<HashMap<String, TransferRecord>>,
}

impl TransferRegistry {
    pub fn new(save_dir: impl Into<PathBuf>) -> Self {
        Self {
            save_dir: save_dir.into(),
            transfers: Mutex::new(HashMap::new()),
        }
    }

    pub fn save_dir(&self) -> &Path {
        &self.save_dir
    }

    // A panicking handler must not take the registry down with it.
    fn lock(&self) -> MutexGuard<'_, HashMap<String, TransferRecord>> {
        self.transfers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register `transfer_id`, replacing any previous record with that id.
    pub fn prepare(&self, transfer_id: &str, filename: &str, declared_size: u64) -> TransferRecord {
        let record = TransferRecord {
            transfer_id: transfer_id.to_string(),
            filename: filename.to_string(),
            declared_size,
            status: TransferStatus::Prepared,
            destination_path: self.save_dir.join(destination_name(transfer_id, filename)),
            decoded_path: None,
        };
        self.lock().insert(transfer_id.to_string(), record.clone());
        record
    }

    /// Current status, or `None` for an unknown id.
    pub fn status(&self, transfer_id: &str) -> Option<TransferStatus> {
        self.lock().get(transfer_id).map(|r| r.status)
    }

    pub fn get(&self, transfer_id: &str) -> Option<TransferRecord> {
        self.lock().get(transfer_id).cloned()
    }

    /// Force `cancelled` regardless of the current state.
    ///
    /// Returns false when the id is unknown. A data handler already streaming
    /// this transfer is not interrupted and may overwrite the status later.
    pub fn cancel(&self, transfer_id: &str) -> bool {
        match self.lock().get_mut(transfer_id) {
            Some(record) => {
                record.status = TransferStatus::Cancelled;
                true
            }
            None => false,
        }
    }

    /// Claim a transfer for a data connection: mark it `receiving` and return
    /// a snapshot of the record.
    pub fn begin_receiving(&self, transfer_id: &str) -> Result<TransferRecord> {
        let mut transfers = self.lock();
        let record = transfers
            .get_mut(transfer_id)
            .ok_or_else(|| ProtocolError::UnknownTransfer(transfer_id.to_string()))?;
        record.status = TransferStatus::Receiving;
        Ok(record.clone())
    }

    /// Overwrite the status of a known transfer. Unknown ids are ignored.
    pub fn set_status(&self, transfer_id: &str, status: TransferStatus) {
        if let Some(record) = self.lock().get_mut(transfer_id) {
            record.status = status;
        }
    }

    /// Record a successful decode.
    pub fn mark_decoded(&self, transfer_id: &str, decoded_path: PathBuf) {
        if let Some(record) = self.lock().get_mut(transfer_id) {
            record.status = TransferStatus::Decoded;
            record.decoded_path = Some(decoded_path);
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

/// File name for an incoming payload: the final path component of the
/// declared name, or `<transfer_id>.huff` when it has none.
pub fn destination_name(transfer_id: &str, filename: &str) -> String {
    match Path::new(filename).file_name().and_then(|n| n.to_str()) {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => {
            let safe: String = transfer_id
                .chars()
                .map(|c| if c == '/' || c == '\\' { '_' } else { c })
                .collect();
            format!("{safe}.huff")
        }
    }
}

/// Sibling path for the decoded output: `_encoded` in the stem becomes
/// `_decoded`, otherwise `_decoded` is appended to the stem.
pub fn decoded_path(destination: &Path) -> PathBuf {
    let stem = destination
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let new_stem = if stem.contains("_encoded") {
        stem.replace("_encoded", "_decoded")
    } else {
        format!("{stem}_decoded")
    };

    let name = match destination.extension() {
        Some(ext) => format!("{new_stem}.{}", ext.to_string_lossy()),
        None => new_stem,
    };
    destination.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_prepare_and_status() {
        let registry = TransferRegistry::new("/srv/in");
        let record = registry.prepare("t1", "report_encoded.txt", 100);

        assert_eq!(record.status, TransferStatus::Prepared);
        assert_eq!(record.destination_path, PathBuf::from("/srv/in/report_encoded.txt"));
        assert_eq!(registry.status("t1"), Some(TransferStatus::Prepared));
        assert_eq!(registry.status("nope"), None);
    }

    #[test]
    fn test_prepare_is_an_upsert() {
        let registry = TransferRegistry::new("out");
        registry.prepare("t1", "a.bin", 10);
        registry.set_status("t1", TransferStatus::Incomplete);

        let record = registry.prepare("t1", "b.bin", 20);
        assert_eq!(registry.len(), 1);
        assert_eq!(record.status, TransferStatus::Prepared);
        assert_eq!(registry.get("t1").unwrap().declared_size, 20);
    }

    #[test]
    fn test_cancel_is_unconditional() {
        let registry = TransferRegistry::new("out");
        registry.prepare("t1", "a.bin", 10);
        registry.mark_decoded("t1", PathBuf::from("out/a_decoded.bin"));

        assert!(registry.cancel("t1"));
        assert_eq!(registry.status("t1"), Some(TransferStatus::Cancelled));
        assert!(!registry.cancel("missing"));
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn test_begin_receiving_unknown_id() {
        let registry = TransferRegistry::new("out");
        assert!(matches!(
            registry.begin_receiving("ghost"),
            Err(crate::Error::Protocol(ProtocolError::UnknownTransfer(_)))
        ));
    }

    #[test]
    fn test_full_lifecycle() {
        let registry = TransferRegistry::new("out");
        registry.prepare("t1", "a_encoded.bin", 10);

        let record = registry.begin_receiving("t1").unwrap();
        assert_eq!(record.status, TransferStatus::Receiving);

        registry.set_status("t1", TransferStatus::Received);
        registry.mark_decoded("t1", decoded_path(&record.destination_path));

        let record = registry.get("t1").unwrap();
        assert_eq!(record.status, TransferStatus::Decoded);
        assert!(record.status.is_terminal());
        assert_eq!(record.decoded_path, Some(PathBuf::from("out/a_decoded.bin")));
    }

    #[test]
    fn test_status_names() {
        assert_eq!(TransferStatus::DecodeFailed.to_string(), "decode_failed");
        assert_eq!(
            serde_json::to_string(&TransferStatus::DecodeFailed).unwrap(),
            "\"decode_failed\""
        );
        assert!(!TransferStatus::Received.is_terminal());
    }

    #[test]
    fn test_destination_name_strips_directories() {
        assert_eq!(destination_name("t1", "../../etc/passwd"), "passwd");
        assert_eq!(destination_name("t1", "dir/file.txt"), "file.txt");
        assert_eq!(destination_name("t1", ""), "t1.huff");
        assert_eq!(destination_name("t1", ".."), "t1.huff");
        assert_eq!(destination_name("a/b", "/"), "a_b.huff");
    }

    #[test]
    fn test_decoded_path_naming() {
        assert_eq!(
            decoded_path(Path::new("out/data_encoded.txt")),
            PathBuf::from("out/data_decoded.txt")
        );
        assert_eq!(
            decoded_path(Path::new("out/data.txt")),
            PathBuf::from("out/data_decoded.txt")
        );
        assert_eq!(decoded_path(Path::new("out/blob")), PathBuf::from("out/blob_decoded"));
    }

    #[test]
    fn test_concurrent_updates() {
        let registry = Arc::new(TransferRegistry::new("out"));
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || {
                    let id = format!("t{i}");
                    registry.prepare(&id, "f.bin", i);
                    registry.begin_receiving(&id).unwrap();
                    registry.set_status(&id, TransferStatus::Received);
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(registry.len(), 8);
        for i in 0..8 {
            assert_eq!(registry.status(&format!("t{i}")), Some(TransferStatus::Received));
        }
    }
}
