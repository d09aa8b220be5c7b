//! Encoded payload serialization.
//!
//! A payload carries its own metadata so the decoder needs nothing else:
//!
//! # Payload Format
//!
//! ```text
//! +---------------------+
//! | Magic (4 bytes)     |  "HUFS"
//! +---------------------+
//! | version (1)         |  layout version, currently 1
//! +---------------------+
//! | padding (1)         |  zero bits at the end of the packed bits (0..=7)
//! +---------------------+
//! | original_len (8)    |  u64 little-endian, bytes before encoding
//! +---------------------+
//! | table_len (4)       |  u32 little-endian, bytes of the code table
//! +---------------------+
//! | crc32 (4)           |  u32 little-endian
//! +---------------------+
//! | code table          |  symbol_count u16, then per symbol:
//! | (table_len bytes)   |  value u8, code_len u8, ceil(code_len/8) code bytes
//! +---------------------+
//! | packed bits         |  rest of the payload
//! +---------------------+
//! ```
//!
//! Everything up to the end of the code table is the payload metadata; the
//! table length makes the boundary with the packed bits explicit.
//!
//! # CRC Coverage
//!
//! The CRC32 covers version, padding, original_len, table_len, the table and
//! the packed bits.

use crate::error::{CodecError, Result};
use crate::huffman::{Code, CodeTable, EncodedPayload};

/// Magic number for payloads: "HUFS"
const MAGIC: [u8; 4] = *b"HUFS";

/// Current layout version
pub const VERSION: u8 = 1;

/// Size of the fixed header in bytes
pub const HEADER_SIZE: usize = 22;

impl EncodedPayload {
    /// Serialize into the self-describing wire layout.
    pub fn to_bytes(&self) -> Vec<u8> {
        let table = serialize_table(&self.code_table);
        let table_len = table.len() as u32;
        let crc32 = compute_crc(
            VERSION,
            self.padding_bits,
            self.original_len,
            table_len,
            &table,
            &self.packed_bits,
        );

        let mut bytes = Vec::with_capacity(HEADER_SIZE + table.len() + self.packed_bits.len());
        bytes.extend_from_slice(&MAGIC);
        bytes.push(VERSION);
        bytes.push(self.padding_bits);
        bytes.extend_from_slice(&self.original_len.to_le_bytes());
        bytes.extend_from_slice(&table_len.to_le_bytes());
        bytes.extend_from_slice(&crc32.to_le_bytes());
        bytes.extend_from_slice(&table);
        bytes.extend_from_slice(&self.packed_bits);
        bytes
    }

    /// Size of the serialized metadata (header plus code table).
    pub fn metadata_len(&self) -> usize {
        HEADER_SIZE + table_size(&self.code_table)
    }

    /// Parse a payload produced by [`EncodedPayload::to_bytes`].
    ///
    /// # Errors
    /// - `CodecError::Truncated` if the buffer is shorter than its header says
    /// - `CodecError::InvalidMagic` / `UnsupportedVersion` / `InvalidPadding`
    /// - `CodecError::Crc` if the checksum does not match
    /// - Table errors from [`CodeTable::from_codes`]
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(CodecError::Truncated {
                required: HEADER_SIZE,
                actual: bytes.len(),
            }
            .into());
        }

        let magic = read_array::<4>(bytes, 0);
        if magic != MAGIC {
            return Err(CodecError::InvalidMagic {
                expected: MAGIC,
                actual: magic,
            }
            .into());
        }

        let version = bytes[4];
        if version != VERSION {
            return Err(CodecError::UnsupportedVersion(version).into());
        }

        let padding_bits = bytes[5];
        if padding_bits > 7 {
            return Err(CodecError::InvalidPadding(padding_bits).into());
        }

        let original_len = u64::from_le_bytes(read_array::<8>(bytes, 6));
        let table_len = u32::from_le_bytes(read_array::<4>(bytes, 14));
        let crc32 = u32::from_le_bytes(read_array::<4>(bytes, 18));

        let table_end = HEADER_SIZE + table_len as usize;
        if bytes.len() < table_end {
            return Err(CodecError::Truncated {
                required: table_end,
                actual: bytes.len(),
            }
            .into());
        }

        let table = &bytes[HEADER_SIZE..table_end];
        let packed_bits = &bytes[table_end..];

        let computed = compute_crc(version, padding_bits, original_len, table_len, table, packed_bits);
        if computed != crc32 {
            return Err(CodecError::Crc {
                expected: crc32,
                actual: computed,
            }
            .into());
        }

        Ok(Self {
            padding_bits,
            original_len,
            code_table: parse_table(table)?,
            packed_bits: packed_bits.to_vec(),
        })
    }
}

fn read_array<const N: usize>(bytes: &[u8], offset: usize) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes[offset..offset + N]);
    out
}

fn code_bytes(code: &Code) -> usize {
    code.len().div_ceil(8)
}

fn table_size(table: &CodeTable) -> usize {
    2 + table.iter().map(|(_, code)| 2 + code_bytes(&code)).sum::<usize>()
}

/// Write the table as symbol_count followed by {value, len, bits} entries.
fn serialize_table(table: &CodeTable) -> Vec<u8> {
    let mut out = Vec::with_capacity(table_size(table));
    out.extend_from_slice(&(table.len() as u16).to_le_bytes());

    for (symbol, code) in table.iter() {
        let n = code_bytes(&code);
        // Left-align the code within its n bytes.
        let aligned = code.bits() << (n * 8 - code.len());
        out.push(symbol);
        out.push(code.len() as u8);
        out.extend_from_slice(&aligned.to_be_bytes()[8 - n..]);
    }

    out
}

fn parse_table(bytes: &[u8]) -> Result<CodeTable> {
    let truncated = || CodecError::MalformedTable("table ends mid-entry".into());

    if bytes.len() < 2 {
        return Err(truncated().into());
    }
    let count = u16::from_le_bytes([bytes[0], bytes[1]]) as usize;
    if count == 0 || count > 256 {
        return Err(CodecError::MalformedTable(format!("symbol count {count}")).into());
    }

    let mut entries = Vec::with_capacity(count);
    let mut pos = 2;
    for _ in 0..count {
        let header = bytes.get(pos..pos + 2).ok_or_else(truncated)?;
        let (symbol, len) = (header[0], header[1]);
        if len == 0 || len as usize > Code::MAX_LEN {
            return Err(CodecError::CodeTooLong {
                length: len as usize,
                max: Code::MAX_LEN,
            }
            .into());
        }
        pos += 2;

        let n = (len as usize).div_ceil(8);
        let raw = bytes.get(pos..pos + n).ok_or_else(truncated)?;
        let aligned = raw.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64);
        entries.push((symbol, Code::new(aligned >> (n * 8 - len as usize), len)?));
        pos += n;
    }

    if pos != bytes.len() {
        return Err(CodecError::MalformedTable(format!(
            "{} trailing bytes after {count} entries",
            bytes.len() - pos
        ))
        .into());
    }

    CodeTable::from_codes(entries)
}

/// Compute CRC32 over the protected fields.
fn compute_crc(
    version: u8,
    padding_bits: u8,
    original_len: u64,
    table_len: u32,
    table: &[u8],
    packed_bits: &[u8],
) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&[version, padding_bits]);
    hasher.update(&original_len.to_le_bytes());
    hasher.update(&table_len.to_le_bytes());
    hasher.update(table);
    hasher.update(packed_bits);
    hasher.finalize()
}
