//! Bit packing and unpacking for Huffman bitstreams.
//!
//! `BitPacker` turns a sequence of variable-length codes into a padded byte
//! buffer; `BitUnpacker` walks that buffer back bit by bit. Both operate
//! MSB-first: the first code bit lands in the most significant bit of the
//! first byte.
//!
//! # Padding Rules
//! - The packer fills the final partial byte with zero bits and reports how
//!   many it added: `padding = (8 - bit_len % 8) % 8`.
//! - The unpacker is bounded to `bytes * 8 - padding` bits, so padding is
//!   never mistaken for data.
//!
//! # Example
//! ```
//! use huffstream_core::bitio::{BitPacker, BitUnpacker};
//!
//! let mut packer = BitPacker::new();
//! packer.write_bits(0b101, 3).unwrap();
//! packer.write_bits(0b11, 2).unwrap();
//! let (bytes, padding) = packer.finish();
//! assert_eq!(bytes, vec![0b1011_1000]);
//! assert_eq!(padding, 3);
//!
//! let mut unpacker = BitUnpacker::with_padding(&bytes, padding).unwrap();
//! assert_eq!(unpacker.read_bits(5).unwrap(), 0b10111);
//! assert!(unpacker.is_empty());
//! ```

use crate::error::{BitIoError, Result};

/// Accumulates bits MSB-first into a byte buffer.
///
/// # Invariants
/// - `pending` holds fewer than 8 bits, MSB-aligned
/// - `pending_len` is always < 8
#[derive(Debug, Clone, Default)]
pub struct BitPacker {
    bytes: Vec<u8>,
    pending: u8,
    pending_len: u8,
}

impl BitPacker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a packer whose output buffer can hold `bits` without growing.
    pub fn with_capacity_bits(bits: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(bits.div_ceil(8)),
            pending: 0,
            pending_len: 0,
        }
    }

    /// Append the lowest `count` bits of `value`, most significant first.
    ///
    /// # Errors
    /// Returns `BitIoError::InvalidBitCount` if count > 64.
    pub fn write_bits(&mut self, value: u64, count: usize) -> Result<()> {
        if count > 64 {
            return Err(BitIoError::InvalidBitCount(count).into());
        }

        let mut remaining = count;
        while remaining > 0 {
            let free = 8 - self.pending_len as usize;
            let take = remaining.min(free);
            let shift = remaining - take;
            let chunk = ((value >> shift) & ((1u64 << take) - 1)) as u8;

            self.pending |= chunk << (free - take);
            self.pending_len += take as u8;
            remaining -= take;

            if self.pending_len == 8 {
                self.bytes.push(self.pending);
                self.pending = 0;
                self.pending_len = 0;
            }
        }

        Ok(())
    }

    /// Total number of data bits written so far.
    pub fn bit_len(&self) -> usize {
        self.bytes.len() * 8 + self.pending_len as usize
    }

    /// Number of zero bits `finish` will append.
    pub fn padding_bits(&self) -> u8 {
        (8 - self.pending_len % 8) % 8
    }

    /// Flush the partial byte and return `(bytes, padding_bits)`.
    pub fn finish(mut self) -> (Vec<u8>, u8) {
        let padding = self.padding_bits();
        if self.pending_len > 0 {
            self.bytes.push(self.pending);
        }
        (self.bytes, padding)
    }
}

/// Reads bits MSB-first from a byte buffer, bounded to a logical bit length.
#[derive(Debug, Clone)]
pub struct BitUnpacker<'a> {
    data: &'a [u8],
    bit_len: usize,
    position: usize,
}

impl<'a> BitUnpacker<'a> {
    /// Read every bit of `data`.
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            bit_len: data.len() * 8,
            position: 0,
        }
    }

    /// Read `data` minus `padding` trailing bits.
    ///
    /// # Errors
    /// `BitIoError::LengthOutOfRange` if the padding is larger than the buffer.
    pub fn with_padding(data: &'a [u8], padding: u8) -> Result<Self> {
        let total = data.len() * 8;
        let padding = padding as usize;
        if padding > total {
            return Err(BitIoError::LengthOutOfRange {
                bits: padding,
                bytes: data.len(),
            }
            .into());
        }
        Ok(Self {
            data,
            bit_len: total - padding,
            position: 0,
        })
    }

    /// Read one bit, or `None` once the logical end is reached.
    pub fn next_bit(&mut self) -> Option<bool> {
        if self.position >= self.bit_len {
            return None;
        }
        let byte = self.data[self.position / 8];
        let bit = (byte >> (7 - self.position % 8)) & 1 == 1;
        self.position += 1;
        Some(bit)
    }

    /// Read up to 64 bits as an integer, first bit most significant.
    ///
    /// # Errors
    /// - `BitIoError::InvalidBitCount` if count > 64
    /// - `BitIoError::UnexpectedEof` if not enough bits remain
    pub fn read_bits(&mut self, count: usize) -> Result<u64> {
        if count > 64 {
            return Err(BitIoError::InvalidBitCount(count).into());
        }
        if count > self.bits_remaining() {
            return Err(BitIoError::UnexpectedEof.into());
        }

        let mut value = 0u64;
        for _ in 0..count {
            // Bounds checked above.
            let bit = self.next_bit().ok_or(BitIoError::UnexpectedEof)?;
            value = (value << 1) | bit as u64;
        }
        Ok(value)
    }

    pub fn bits_remaining(&self) -> usize {
        self.bit_len - self.position
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn is_empty(&self) -> bool {
        self.position >= self.bit_len
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_single_byte() {
        let mut packer = BitPacker::new();
        packer.write_bits(0b1011_0011, 8).unwrap();

        let (bytes, padding) = packer.finish();
        assert_eq!(bytes, vec![0b1011_0011]);
        assert_eq!(padding, 0);
    }

    #[test]
    fn test_padding_counts() {
        for bits in 0..=16usize {
            let mut packer = BitPacker::new();
            for _ in 0..bits {
                packer.write_bits(1, 1).unwrap();
            }
            let expected = ((8 - bits % 8) % 8) as u8;
            assert_eq!(packer.padding_bits(), expected, "bits={bits}");

            let (bytes, padding) = packer.finish();
            assert_eq!(padding, expected);
            assert_eq!(bytes.len() * 8 - padding as usize, bits);
        }
    }

    #[test]
    fn test_padding_is_zero_filled() {
        let mut packer = BitPacker::new();
        packer.write_bits(0b1, 1).unwrap();

        let (bytes, padding) = packer.finish();
        assert_eq!(bytes, vec![0b1000_0000]);
        assert_eq!(padding, 7);
    }

    #[test]
    fn test_codes_straddle_bytes() {
        let mut packer = BitPacker::new();
        packer.write_bits(0b110, 3).unwrap();
        packer.write_bits(0b0_1111, 5).unwrap();
        packer.write_bits(0b1010_1, 5).unwrap();

        let (bytes, padding) = packer.finish();
        assert_eq!(bytes, vec![0b1100_1111, 0b1010_1000]);
        assert_eq!(padding, 3);

        let mut unpacker = BitUnpacker::with_padding(&bytes, padding).unwrap();
        assert_eq!(unpacker.read_bits(3).unwrap(), 0b110);
        assert_eq!(unpacker.read_bits(5).unwrap(), 0b01111);
        assert_eq!(unpacker.read_bits(5).unwrap(), 0b10101);
        assert!(unpacker.is_empty());
    }

    #[test]
    fn test_unpacker_stops_before_padding() {
        let data = [0b1110_0000];
        let mut unpacker = BitUnpacker::with_padding(&data, 5).unwrap();

        assert_eq!(unpacker.bits_remaining(), 3);
        assert_eq!(unpacker.next_bit(), Some(true));
        assert_eq!(unpacker.next_bit(), Some(true));
        assert_eq!(unpacker.next_bit(), Some(true));
        assert_eq!(unpacker.next_bit(), None);
        assert!(unpacker.read_bits(1).is_err());
    }

    #[test]
    fn test_padding_larger_than_buffer() {
        assert!(BitUnpacker::with_padding(&[], 3).is_err());
    }

    #[test]
    fn test_64_bit_values() {
        let mut packer = BitPacker::with_capacity_bits(64);
        let val = 0x1234_5678_9ABC_DEF0u64;
        packer.write_bits(val, 64).unwrap();
        assert!(packer.write_bits(0, 65).is_err());

        let (bytes, _) = packer.finish();
        let mut unpacker = BitUnpacker::new(&bytes);
        assert_eq!(unpacker.read_bits(64).unwrap(), val);
    }
}
