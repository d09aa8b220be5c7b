//! huffstream-core: Huffman coding with a dual-channel transfer protocol
//!
//! This library provides the core components of a file transfer system that:
//! - Compresses whole buffers with per-input Huffman code tables
//! - Ships self-describing payloads (metadata + packed bits)
//! - Negotiates transfers on a JSON control channel
//! - Streams payloads in chunks on a separate data channel
//! - Tracks every transfer's lifecycle on the server
//!
//! # Architecture
//!
//! The system is designed around clear module boundaries, leaves first:
//! - `bitio`: MSB-first bit packing and unpacking
//! - `huffman`: frequency model, tree builder, code table, encode/decode
//! - `payload`: versioned wire layout of an encoded payload
//! - `protocol`: frame format and control/data messages
//! - `registry`: transfer records and their state machine
//! - `control` / `data`: per-connection channel handlers
//! - `connection`, `tls`, `pool`: streams, dialing, bounded fan-out
//! - `server` / `client`: the two ends of a transfer
//! - `legacy`: single-channel `filename|size` transfers
//! - `config`, `metrics`: settings and per-transfer reports
//!
//! # Design Principles
//!
//! - **No panics**: All errors are structured and recoverable
//! - **Bounded fan-out**: Worker pools reject connections at capacity
//! - **Deterministic**: The same input always yields the same code table
//! - **Owned state**: The registry is an explicit service, never a global

pub mod bitio;
pub mod client;
pub mod config;
pub mod connection;
pub mod control;
pub mod data;
pub mod error;
pub mod huffman;
pub mod legacy;
pub mod metrics;
pub mod payload;
pub mod pool;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod tls;

// Re-export commonly used types
pub use client::Client;
pub use config::{NetConfig, TlsConfig};
pub use error::{Error, Result};
pub use huffman::{decode, encode};
pub use registry::{TransferRegistry, TransferStatus};
pub use server::Server;
