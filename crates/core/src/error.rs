//! Error types for HuffStream.
//!
//! Every fallible operation returns a structured error instead of panicking,
//! so a misbehaving peer only ever terminates its own connection.

use thiserror::Error;

/// Top-level error type for all operations in the system.
///
/// Each variant corresponds to a specific failure domain:
/// - Bit I/O: reading/writing bits from/to byte buffers
/// - Codec: payload parsing or Huffman decode failures
/// - Protocol: invalid control/data frames, unexpected replies
/// - Transport: socket or TLS failures
/// - Config: invalid settings or missing TLS material
#[derive(Debug, Error)]
pub enum Error {
    /// Bit I/O operation failed (e.g., reading past end of buffer)
    #[error("bit I/O error: {0}")]
    BitIo(#[from] BitIoError),

    /// Encoded payload could not be parsed or decoded
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// A peer sent something the protocol does not allow
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Socket or TLS failure
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Invalid configuration
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// File I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Bit-level I/O errors.
#[derive(Debug, Error)]
pub enum BitIoError {
    /// Attempted to read past the end of the buffer
    #[error("unexpected end of bit stream")]
    UnexpectedEof,

    /// Invalid bit count (more than 64 bits in one call)
    #[error("invalid bit count: {0}")]
    InvalidBitCount(usize),

    /// Requested a bit length longer than the underlying buffer
    #[error("bit length {bits} exceeds buffer of {bytes} bytes")]
    LengthOutOfRange { bits: usize, bytes: usize },
}

/// Codec errors raised while building, serializing or decoding payloads.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Payload does not start with the expected magic number
    #[error("invalid magic number: expected {expected:?}, got {actual:?}")]
    InvalidMagic { expected: [u8; 4], actual: [u8; 4] },

    /// Payload layout version is not understood
    #[error("unsupported payload version {0}")]
    UnsupportedVersion(u8),

    /// Payload is too short for its header or declared table
    #[error("payload too short: need at least {required} bytes, got {actual}")]
    Truncated { required: usize, actual: usize },

    /// Padding must be 0..=7
    #[error("invalid padding of {0} bits")]
    InvalidPadding(u8),

    /// CRC over the payload does not match
    #[error("CRC mismatch: expected {expected:#010x}, got {actual:#010x}")]
    Crc { expected: u32, actual: u32 },

    /// Code table is malformed (duplicate symbol, empty, trailing bytes)
    #[error("malformed code table: {0}")]
    MalformedTable(String),

    /// Code table is not prefix-free
    #[error("code for symbol {symbol:#04x} is a prefix of another code")]
    NotPrefixFree { symbol: u8 },

    /// Code length is zero or exceeds the supported maximum
    #[error("code length {length} outside 1..={max}")]
    CodeTooLong { length: usize, max: usize },

    /// Bitstream ended while a partial code was still unmatched
    #[error("bitstream exhausted with {pending} unmatched bits at position {position}")]
    TruncatedCode { pending: usize, position: usize },

    /// Accumulated bits grew past the longest code in the table
    #[error("invalid huffman code at bit position {position}")]
    InvalidCode { position: usize },

    /// Decoded length doesn't match the header
    #[error("decoded length mismatch: expected {expected}, got {actual}")]
    LengthMismatch { expected: u64, actual: u64 },
}

/// Protocol errors on the control and data channels.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Frame body is not a valid message for this channel
    #[error("invalid frame: {0}")]
    InvalidFrame(String),

    /// Declared frame length exceeds the configured ceiling
    #[error("frame of {len} bytes exceeds maximum {max}")]
    FrameTooLarge { len: usize, max: usize },

    /// Referenced transfer id is not registered
    #[error("unknown transfer id {0:?}")]
    UnknownTransfer(String),

    /// Peer answered with something other than what the exchange requires
    #[error("unexpected reply: expected {expected}, got {actual:?}")]
    UnexpectedReply { expected: String, actual: String },

    /// Peer closed the stream in the middle of an exchange
    #[error("connection closed by peer during {0}")]
    ConnectionClosed(&'static str),

    /// Legacy `<filename>|<filesize>` header is malformed
    #[error("invalid legacy header: {0:?}")]
    InvalidLegacyHeader(String),
}

/// Transport-level errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Could not establish a connection after all retries
    #[error("failed to connect to {addr} after {attempts} attempts: {source}")]
    ConnectFailed {
        addr: String,
        attempts: u32,
        #[source]
        source: std::io::Error,
    },

    /// TLS handshake or session failure
    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    /// Could not bind a listening socket
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Host name is not usable as a TLS server name
    #[error("invalid server name {0:?}")]
    InvalidServerName(String),
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A numeric setting is out of its valid range
    #[error("invalid value for {key}: {reason}")]
    InvalidValue { key: &'static str, reason: String },

    /// TLS is enabled but required key material is not configured
    #[error("TLS enabled but {0} is not configured")]
    MissingTlsMaterial(&'static str),

    /// TLS material could not be read or parsed
    #[error("unusable TLS material in {path}: {reason}")]
    InvalidTlsMaterial { path: String, reason: String },
}

/// Type alias for Result with our Error type
pub type Result<T> = std::result::Result<T, Error>;
