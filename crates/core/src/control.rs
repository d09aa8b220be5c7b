//! Control channel handler.
//!
//! Serves `prepare` / `status` / `cancel` commands on one connection until
//! the peer closes it. A frame that is not a valid command is logged and
//! skipped; the connection stays open.

use crate::connection::Connection;
use crate::protocol::{self, ControlRequest, ControlResponse};
use crate::registry::TransferRegistry;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Status reported for ids the registry has never seen.
pub const UNKNOWN_STATUS: &str = "unknown";

#[derive(Debug, Clone)]
pub struct ControlHandler {
    registry: Arc<TransferRegistry>,
}

impl ControlHandler {
    pub fn new(registry: Arc<TransferRegistry>) -> Self {
        Self { registry }
    }

    /// Apply one command to the registry and build its reply.
    pub fn handle_request(&self, request: &ControlRequest) -> ControlResponse {
        let status = match request {
            ControlRequest::Prepare {
                transfer_id,
                filename,
                filesize,
            } => {
                let record = self.registry.prepare(transfer_id, filename, *filesize);
                info!(
                    transfer_id = %transfer_id,
                    filename = %filename,
                    filesize,
                    destination = %record.destination_path.display(),
                    "transfer prepared"
                );
                "ready".to_string()
            }
            ControlRequest::Status { transfer_id } => self
                .registry
                .status(transfer_id)
                .map(|s| s.to_string())
                .unwrap_or_else(|| UNKNOWN_STATUS.to_string()),
            ControlRequest::Cancel { transfer_id } => {
                if self.registry.cancel(transfer_id) {
                    info!(transfer_id = %transfer_id, "transfer cancelled");
                } else {
                    debug!(transfer_id = %transfer_id, "cancel for unknown transfer");
                }
                "cancelled".to_string()
            }
        };

        ControlResponse {
            status,
            transfer_id: request.transfer_id().to_string(),
        }
    }

    /// Serve commands until the peer closes the connection.
    pub fn serve(&self, mut conn: Connection) {
        let peer = conn.peer_addr();
        debug!(%peer, "control connection opened");

        while let Some(frame) = conn.receive() {
            let request: ControlRequest = match protocol::parse_json(&frame) {
                Ok(request) => request,
                Err(e) => {
                    warn!(%peer, error = %e, "ignoring invalid control frame");
                    continue;
                }
            };
            debug!(%peer, ?request, "control request");

            let response = self.handle_request(&request);
            if let Err(e) = conn.send_json(&response) {
                warn!(%peer, error = %e, "failed to send control response");
                break;
            }
        }

        debug!(%peer, "control connection closed");
        conn.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::TransferStatus;

    fn handler() -> ControlHandler {
        ControlHandler::new(Arc::new(TransferRegistry::new("out")))
    }

    fn prepare(id: &str) -> ControlRequest {
        ControlRequest::Prepare {
            transfer_id: id.into(),
            filename: "data_encoded.bin".into(),
            filesize: 100,
        }
    }

    #[test]
    fn test_prepare_replies_ready() {
        let handler = handler();
        let response = handler.handle_request(&prepare("t1"));
        assert_eq!(response.status, "ready");
        assert_eq!(response.transfer_id, "t1");
        assert_eq!(handler.registry.status("t1"), Some(TransferStatus::Prepared));
    }

    #[test]
    fn test_status_of_known_and_unknown() {
        let handler = handler();
        handler.handle_request(&prepare("t1"));

        let status = |id: &str| {
            handler
                .handle_request(&ControlRequest::Status {
                    transfer_id: id.into(),
                })
                .status
        };
        assert_eq!(status("t1"), "prepared");
        assert_eq!(status("t2"), "unknown");
    }

    #[test]
    fn test_cancel_replies_cancelled_for_any_id() {
        let handler = handler();
        handler.handle_request(&prepare("t1"));

        for id in ["t1", "missing"] {
            let response = handler.handle_request(&ControlRequest::Cancel {
                transfer_id: id.into(),
            });
            assert_eq!(response.status, "cancelled");
        }
        assert_eq!(handler.registry.status("t1"), Some(TransferStatus::Cancelled));
        assert_eq!(handler.registry.status("missing"), None);
    }
}
