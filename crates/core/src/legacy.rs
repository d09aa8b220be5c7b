//! Legacy single-channel transfer.
//!
//! One connection carries one file: a header frame `"<filename>|<filesize>"`
//! followed immediately by exactly `filesize` raw (unframed) payload bytes.
//! There is no acknowledgement; the receiver decodes once the bytes are in.

use crate::config::NetConfig;
use crate::connection::Connection;
use crate::error::{ProtocolError, Result, TransportError};
use crate::huffman;
use crate::registry::{decoded_path, destination_name};
use crate::{client, tls};
use std::fmt;
use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Parsed `<filename>|<filesize>` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyHeader {
    pub filename: String,
    pub filesize: u64,
}

impl LegacyHeader {
    /// Parse a header frame. The size follows the last `|`, so file names
    /// may themselves contain one.
    pub fn parse(frame: &[u8]) -> Result<Self> {
        let invalid = || ProtocolError::InvalidLegacyHeader(String::from_utf8_lossy(frame).into_owned());

        let text = std::str::from_utf8(frame).map_err(|_| invalid())?;
        let (filename, size) = text.rsplit_once('|').ok_or_else(invalid)?;
        let filesize = size.trim().parse().map_err(|_| invalid())?;
        if filename.is_empty() {
            return Err(invalid().into());
        }

        Ok(Self {
            filename: filename.to_string(),
            filesize,
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.to_string().into_bytes()
    }
}

impl fmt::Display for LegacyHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.filename, self.filesize)
    }
}

/// Where a received legacy transfer ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyReceipt {
    pub header: LegacyHeader,
    pub encoded_path: PathBuf,
    pub decoded_path: PathBuf,
}

/// Encode `data` and send it as `<stem>_encoded<ext>` over `conn`.
pub fn send<W: Write>(conn: &mut W, name: &str, data: &[u8]) -> Result<LegacyHeader> {
    let (payload, ratio) = huffman::encode(data)?;
    let header = LegacyHeader {
        filename: client::encoded_name(name),
        filesize: payload.len() as u64,
    };

    crate::protocol::write_frame(conn, &header.to_bytes())?;
    conn.write_all(&payload)?;
    conn.flush()?;

    info!(header = %header, ratio, "legacy payload sent");
    Ok(header)
}

/// Receive one legacy transfer into `save_dir` and decode it.
///
/// # Errors
/// - `ProtocolError::InvalidLegacyHeader` for a malformed header
/// - `ProtocolError::ConnectionClosed` if fewer than `filesize` bytes arrive
/// - Codec errors if the payload does not decode
pub fn receive<R: Read>(conn: &mut R, save_dir: &Path) -> Result<LegacyReceipt> {
    let frame = crate::protocol::read_frame(conn)?
        .ok_or(ProtocolError::ConnectionClosed("legacy header"))?;
    let header = LegacyHeader::parse(&frame)?;
    debug!(header = %header, "legacy header received");

    fs::create_dir_all(save_dir)?;
    let encoded_path = save_dir.join(destination_name("legacy", &header.filename));
    let mut file = BufWriter::new(File::create(&encoded_path)?);
    let copied = io::copy(&mut conn.take(header.filesize), &mut file)?;
    file.flush()?;
    drop(file);
    if copied != header.filesize {
        if let Err(e) = fs::remove_file(&encoded_path) {
            warn!(path = %encoded_path.display(), error = %e, "cannot remove partial payload");
        }
        return Err(ProtocolError::ConnectionClosed("legacy payload").into());
    }

    let decoded = huffman::decode(&fs::read(&encoded_path)?)?;
    let decoded_path = decoded_path(&encoded_path);
    fs::write(&decoded_path, decoded)?;

    info!(
        encoded = %encoded_path.display(),
        decoded = %decoded_path.display(),
        "legacy transfer decoded"
    );
    Ok(LegacyReceipt {
        header,
        encoded_path,
        decoded_path,
    })
}

/// Dial `config.data_port` and send one file.
pub fn send_file(config: &NetConfig, path: &Path) -> Result<LegacyHeader> {
    config.validate()?;
    let data = fs::read(path)?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut conn = Connection::connect(config, config.data_port)?;
    let header = send(&mut conn, &name, &data)?;
    conn.close();
    Ok(header)
}

/// Listen on `config.data_port`, accept one connection and receive from it.
pub fn receive_one(config: &NetConfig) -> Result<LegacyReceipt> {
    config.validate_server()?;
    let tls = if config.tls.enabled {
        Some(tls::server_config(&config.tls)?)
    } else {
        None
    };

    let addr = config.data_addr();
    let listener = TcpListener::bind(&addr).map_err(|source| TransportError::Bind {
        addr: addr.clone(),
        source,
    })?;
    info!(%addr, "waiting for legacy transfer");

    let (sock, peer) = listener.accept()?;
    debug!(%peer, "legacy connection accepted");
    let mut conn = Connection::accept(sock, tls.as_ref())?;
    let receipt = receive(&mut conn, &config.save_directory)?;
    conn.close();
    Ok(receipt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use std::io::Cursor;

    #[test]
    fn test_header_round_trip() {
        let header = LegacyHeader {
            filename: "notes_encoded.txt".into(),
            filesize: 1234,
        };
        assert_eq!(header.to_string(), "notes_encoded.txt|1234");
        assert_eq!(LegacyHeader::parse(&header.to_bytes()).unwrap(), header);
    }

    #[test]
    fn test_header_with_pipe_in_name() {
        let header = LegacyHeader::parse(b"a|b.txt|7").unwrap();
        assert_eq!(header.filename, "a|b.txt");
        assert_eq!(header.filesize, 7);
    }

    #[test]
    fn test_invalid_headers() {
        for frame in [&b"no-separator"[..], b"file|", b"file|-3", b"|12", b"\xff\xfe|1"] {
            assert!(
                matches!(
                    LegacyHeader::parse(frame),
                    Err(Error::Protocol(ProtocolError::InvalidLegacyHeader(_)))
                ),
                "accepted {frame:?}"
            );
        }
    }

    #[test]
    fn test_send_then_receive() {
        let dir = tempfile::tempdir().unwrap();
        let data = b"legacy transfers still decode".repeat(10);

        let mut wire = Vec::new();
        let header = send(&mut wire, "old.log", &data).unwrap();
        assert_eq!(header.filename, "old_encoded.log");

        let receipt = receive(&mut Cursor::new(wire), dir.path()).unwrap();
        assert_eq!(receipt.header, header);
        assert!(receipt.decoded_path.ends_with("old_decoded.log"));
        assert_eq!(fs::read(&receipt.decoded_path).unwrap(), data);
    }

    #[test]
    fn test_short_payload_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut wire = Vec::new();
        send(&mut wire, "f.bin", b"some bytes to send").unwrap();
        wire.truncate(wire.len() - 3);

        assert!(matches!(
            receive(&mut Cursor::new(wire), dir.path()),
            Err(Error::Protocol(ProtocolError::ConnectionClosed("legacy payload")))
        ));
        assert!(!dir.path().join("f_encoded.bin").exists());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
