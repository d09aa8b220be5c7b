//! Huffman encode/decode.
//!
//! `encode` composes the frequency model, tree builder, code table and bit
//! packer into a self-describing payload; `decode` reverses it.
//!
//! # Invariants
//! - `decode(&encode(x)?.0)? == x` for every byte sequence, including empty
//! - An empty input encodes to an empty payload
//! - `packed_bits.len() * 8 - padding_bits` equals the total code length of
//!   the input

use super::code::{Code, CodeTable};
use super::frequency::FrequencyTable;
use super::tree::HuffmanTree;
use crate::bitio::{BitPacker, BitUnpacker};
use crate::error::{CodecError, Result};

/// A Huffman-coded buffer together with everything needed to decode it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedPayload {
    /// Zero bits appended to the final byte (0..=7)
    pub padding_bits: u8,

    /// Length of the original input in bytes
    pub original_len: u64,

    /// Symbol → code assignments used for this payload
    pub code_table: CodeTable,

    /// Concatenated codes, MSB-first, zero-padded to a byte boundary
    pub packed_bits: Vec<u8>,
}

impl EncodedPayload {
    /// Encode `data`, or return `None` for an empty input.
    pub fn build(data: &[u8]) -> Result<Option<Self>> {
        let frequencies = FrequencyTable::from_bytes(data);
        let Some(tree) = HuffmanTree::build(&frequencies) else {
            return Ok(None);
        };
        let code_table = CodeTable::from_tree(&tree)?;

        let bit_len: u64 = code_table
            .iter()
            .map(|(symbol, code)| frequencies.count(symbol) * code.len() as u64)
            .sum();

        let mut packer = BitPacker::with_capacity_bits(bit_len as usize);
        for &byte in data {
            // Every input byte has a code: the table was built from this input.
            let code = code_table
                .get(byte)
                .ok_or(CodecError::InvalidCode { position: packer.bit_len() })?;
            packer.write_bits(code.bits(), code.len())?;
        }
        let (packed_bits, padding_bits) = packer.finish();

        Ok(Some(Self {
            padding_bits,
            original_len: data.len() as u64,
            code_table,
            packed_bits,
        }))
    }

    /// Number of meaningful bits in `packed_bits`.
    pub fn bit_len(&self) -> usize {
        (self.packed_bits.len() * 8).saturating_sub(self.padding_bits as usize)
    }

    /// Walk the bitstream and reproduce the original bytes.
    ///
    /// # Errors
    /// - `CodecError::InvalidCode` if the accumulated bits outgrow every code
    /// - `CodecError::TruncatedCode` if the stream ends inside a code
    /// - `CodecError::LengthMismatch` if the symbol count differs from the header
    pub fn unpack(&self) -> Result<Vec<u8>> {
        if self.padding_bits > 7 {
            return Err(CodecError::InvalidPadding(self.padding_bits).into());
        }

        let inverse = self.code_table.inverse();
        let mut unpacker = BitUnpacker::with_padding(&self.packed_bits, self.padding_bits)?;

        // The header is untrusted: never reserve more than one byte per bit.
        let capacity = (self.original_len as usize).min(unpacker.bits_remaining());
        let mut output = Vec::with_capacity(capacity);

        let mut bits = 0u64;
        let mut len = 0u8;
        while let Some(bit) = unpacker.next_bit() {
            bits = (bits << 1) | bit as u64;
            len += 1;

            if let Some(symbol) = inverse.lookup(&Code::raw(bits, len)) {
                output.push(symbol);
                bits = 0;
                len = 0;
            } else if len as usize >= inverse.max_len() {
                return Err(CodecError::InvalidCode {
                    position: unpacker.position(),
                }
                .into());
            }
        }

        if len > 0 {
            return Err(CodecError::TruncatedCode {
                pending: len as usize,
                position: unpacker.position(),
            }
            .into());
        }

        if output.len() as u64 != self.original_len {
            return Err(CodecError::LengthMismatch {
                expected: self.original_len,
                actual: output.len() as u64,
            }
            .into());
        }

        Ok(output)
    }
}

/// Space saved as a percentage of the original size.
///
/// Negative when the encoded form is larger; `0.0` for an empty input.
pub fn compression_ratio(original_len: usize, encoded_len: usize) -> f64 {
    if original_len == 0 {
        return 0.0;
    }
    (original_len as f64 - encoded_len as f64) / original_len as f64 * 100.0
}

/// Encode `data` into a serialized payload and report the compression ratio.
pub fn encode(data: &[u8]) -> Result<(Vec<u8>, f64)> {
    let Some(payload) = EncodedPayload::build(data)? else {
        return Ok((Vec::new(), 0.0));
    };
    let bytes = payload.to_bytes();
    let ratio = compression_ratio(data.len(), bytes.len());
    Ok((bytes, ratio))
}

/// Decode a serialized payload produced by [`encode`].
pub fn decode(payload: &[u8]) -> Result<Vec<u8>> {
    if payload.is_empty() {
        return Ok(Vec::new());
    }
    EncodedPayload::parse(payload)?.unpack()
}
