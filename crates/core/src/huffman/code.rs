//! Code derivation and lookup.
//!
//! A [`CodeTable`] maps each symbol present in the input to a bitstring. It
//! is derived by walking the tree depth-first, appending `0` for the left
//! branch and `1` for the right. A tree made of a single leaf gets the
//! reserved code `"0"`, so every symbol always costs at least one bit.

use super::tree::HuffmanTree;
use crate::error::{CodecError, Result};
use std::collections::HashMap;
use std::fmt;

/// A bitstring of 1..=64 bits, stored right-aligned in `bits`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Code {
    bits: u64,
    len: u8,
}

impl Code {
    /// Longest code the codec will emit or accept.
    pub const MAX_LEN: usize = 64;

    /// Build a code from its `len` low-order bits.
    ///
    /// # Errors
    /// `CodecError::CodeTooLong` when `len` is 0 or above 64, and
    /// `CodecError::MalformedTable` when `bits` has bits set above `len`.
    pub fn new(bits: u64, len: u8) -> Result<Self> {
        let width = len as usize;
        if width == 0 || width > Self::MAX_LEN {
            return Err(CodecError::CodeTooLong {
                length: width,
                max: Self::MAX_LEN,
            }
            .into());
        }
        if width < 64 && bits >> width != 0 {
            return Err(CodecError::MalformedTable(format!(
                "code value {bits:#x} does not fit in {len} bits"
            ))
            .into());
        }
        Ok(Self { bits, len })
    }

    /// Parse a string of `'0'`/`'1'` characters.
    pub fn parse(text: &str) -> Result<Self> {
        if text.len() > Self::MAX_LEN {
            return Err(CodecError::CodeTooLong {
                length: text.len(),
                max: Self::MAX_LEN,
            }
            .into());
        }
        let mut bits = 0u64;
        for ch in text.chars() {
            let bit = match ch {
                '0' => 0,
                '1' => 1,
                other => {
                    return Err(CodecError::MalformedTable(format!(
                        "invalid bit character {other:?}"
                    ))
                    .into())
                }
            };
            bits = (bits << 1) | bit;
        }
        Self::new(bits, text.len() as u8)
    }

    /// Unchecked constructor for the decoder's accumulator.
    pub(crate) fn raw(bits: u64, len: u8) -> Self {
        Self { bits, len }
    }

    pub fn bits(&self) -> u64 {
        self.bits
    }

    pub fn len(&self) -> usize {
        self.len as usize
    }

    /// Always false: a code carries at least one bit.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// True if `self` is a prefix of `other` (equal codes count).
    pub fn is_prefix_of(&self, other: &Code) -> bool {
        self.len <= other.len && other.bits >> (other.len - self.len) == self.bits
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for i in (0..self.len).rev() {
            let bit = (self.bits >> i) & 1;
            write!(f, "{bit}")?;
        }
        Ok(())
    }
}

/// Bijective symbol ↔ code mapping for one payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeTable {
    codes: [Option<Code>; 256],
}

impl CodeTable {
    /// Derive the codes for every leaf of `tree`.
    ///
    /// # Errors
    /// `CodecError::CodeTooLong` if a leaf sits deeper than 64 levels.
    pub fn from_tree(tree: &HuffmanTree) -> Result<Self> {
        let mut codes = [None; 256];

        if let HuffmanTree::Leaf(symbol) = tree {
            codes[*symbol as usize] = Some(Code::raw(0, 1));
            return Ok(Self { codes });
        }

        // Explicit stack keeps deep, skewed trees off the call stack.
        let mut stack: Vec<(&HuffmanTree, u64, usize)> = vec![(tree, 0, 0)];
        while let Some((node, bits, len)) = stack.pop() {
            match node {
                HuffmanTree::Leaf(symbol) => {
                    codes[*symbol as usize] = Some(Code::raw(bits, len as u8));
                }
                HuffmanTree::Internal(left, right) => {
                    let child_len = len + 1;
                    if child_len > Code::MAX_LEN {
                        return Err(CodecError::CodeTooLong {
                            length: child_len,
                            max: Code::MAX_LEN,
                        }
                        .into());
                    }
                    stack.push((right, (bits << 1) | 1, child_len));
                    stack.push((left, bits << 1, child_len));
                }
            }
        }

        Ok(Self { codes })
    }

    /// Build a table from explicit assignments, as read from a payload.
    ///
    /// # Errors
    /// - `CodecError::MalformedTable` for an empty table or duplicate symbols
    /// - `CodecError::NotPrefixFree` if any code prefixes another
    pub fn from_codes(entries: impl IntoIterator<Item = (u8, Code)>) -> Result<Self> {
        let mut codes = [None; 256];
        for (symbol, code) in entries {
            if codes[symbol as usize].replace(code).is_some() {
                return Err(
                    CodecError::MalformedTable(format!("duplicate symbol {symbol:#04x}")).into(),
                );
            }
        }

        let table = Self { codes };
        if table.is_empty() {
            return Err(CodecError::MalformedTable("no symbols".into()).into());
        }
        if let Some(symbol) = table.first_prefix_violation() {
            return Err(CodecError::NotPrefixFree { symbol }.into());
        }
        Ok(table)
    }

    pub fn get(&self, symbol: u8) -> Option<Code> {
        self.codes[symbol as usize]
    }

    /// Number of symbols with a code.
    pub fn len(&self) -> usize {
        self.codes.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.iter().all(Option::is_none)
    }

    /// `(symbol, code)` pairs in ascending symbol order.
    pub fn iter(&self) -> impl Iterator<Item = (u8, Code)> + '_ {
        self.codes
            .iter()
            .enumerate()
            .filter_map(|(symbol, code)| code.map(|c| (symbol as u8, c)))
    }

    pub fn max_len(&self) -> usize {
        self.iter().map(|(_, c)| c.len()).max().unwrap_or(0)
    }

    pub fn is_prefix_free(&self) -> bool {
        self.first_prefix_violation().is_none()
    }

    fn first_prefix_violation(&self) -> Option<u8> {
        let entries: Vec<(u8, Code)> = self.iter().collect();
        for (i, (symbol, code)) in entries.iter().enumerate() {
            for (j, (_, other)) in entries.iter().enumerate() {
                if i != j && code.is_prefix_of(other) {
                    return Some(*symbol);
                }
            }
        }
        None
    }

    /// Bitstring → symbol lookup for the decoder.
    pub fn inverse(&self) -> InverseTable {
        InverseTable {
            symbols: self.iter().map(|(symbol, code)| (code, symbol)).collect(),
            max_len: self.max_len(),
        }
    }
}

/// Reverse mapping used while walking a bitstream.
#[derive(Debug, Clone)]
pub struct InverseTable {
    symbols: HashMap<Code, u8>,
    max_len: usize,
}

impl InverseTable {
    pub fn lookup(&self, code: &Code) -> Option<u8> {
        self.symbols.get(code).copied()
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::huffman::frequency::FrequencyTable;

    fn table_for(data: &[u8]) -> CodeTable {
        let tree = HuffmanTree::build(&FrequencyTable::from_bytes(data)).unwrap();
        CodeTable::from_tree(&tree).unwrap()
    }

    #[test]
    fn test_single_symbol_gets_reserved_zero() {
        let table = table_for(b"AAAAA");
        assert_eq!(table.len(), 1);
        assert_eq!(table.get(b'A').unwrap().to_string(), "0");
    }

    #[test]
    fn test_left_is_zero_right_is_one() {
        let table = table_for(b"abbcccc");
        assert_eq!(table.get(b'a').unwrap().to_string(), "00");
        assert_eq!(table.get(b'b').unwrap().to_string(), "01");
        assert_eq!(table.get(b'c').unwrap().to_string(), "1");
    }

    #[test]
    fn test_all_symbols_prefix_free() {
        let mut data: Vec<u8> = (0..=255).collect();
        data.extend(std::iter::repeat(b'e').take(500));
        data.extend(std::iter::repeat(b't').take(300));

        let table = table_for(&data);
        assert_eq!(table.len(), 256);
        assert!(table.is_prefix_free());
        assert!(table.get(b'e').unwrap().len() < table.get(0).unwrap().len());
    }

    #[test]
    fn test_code_parse_and_display() {
        let code = Code::parse("0110").unwrap();
        assert_eq!(code.bits(), 0b0110);
        assert_eq!(code.len(), 4);
        assert_eq!(code.to_string(), "0110");

        assert!(Code::parse("").is_err());
        assert!(Code::parse("012").is_err());
        assert!(Code::parse(&"1".repeat(65)).is_err());
    }

    #[test]
    fn test_code_new_rejects_overflowing_bits() {
        assert!(Code::new(0b100, 2).is_err());
        assert!(Code::new(u64::MAX, 64).is_ok());
    }

    #[test]
    fn test_prefix_relation() {
        let short = Code::parse("01").unwrap();
        let long = Code::parse("0110").unwrap();
        let other = Code::parse("10").unwrap();

        assert!(short.is_prefix_of(&long));
        assert!(!long.is_prefix_of(&short));
        assert!(!other.is_prefix_of(&long));
        assert!(short.is_prefix_of(&short));
    }

    #[test]
    fn test_from_codes_rejects_prefix_collision() {
        let result = CodeTable::from_codes([
            (b'a', Code::parse("0").unwrap()),
            (b'b', Code::parse("01").unwrap()),
        ]);
        assert!(matches!(
            result,
            Err(crate::Error::Codec(CodecError::NotPrefixFree { symbol: b'a' }))
        ));
    }

    #[test]
    fn test_from_codes_rejects_empty_and_duplicates() {
        assert!(CodeTable::from_codes(std::iter::empty()).is_err());
        assert!(CodeTable::from_codes([
            (b'a', Code::parse("0").unwrap()),
            (b'a', Code::parse("1").unwrap()),
        ])
        .is_err());
    }

    #[test]
    fn test_inverse_lookup() {
        let table = table_for(b"abbcccc");
        let inverse = table.inverse();

        assert_eq!(inverse.max_len(), 2);
        assert_eq!(inverse.lookup(&Code::parse("1").unwrap()), Some(b'c'));
        assert_eq!(inverse.lookup(&Code::parse("01").unwrap()), Some(b'b'));
        assert_eq!(inverse.lookup(&Code::parse("0").unwrap()), None);
    }
}
