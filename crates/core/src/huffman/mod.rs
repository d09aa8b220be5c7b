//! Huffman coding over byte symbols.
//!
//! The pipeline runs leaves-first:
//! - `frequency`: count byte occurrences in one input buffer
//! - `tree`: build the prefix tree with a min-priority queue
//! - `code`: derive the symbol → bitstring table by depth-first traversal
//! - `codec`: pack/unpack bitstreams and compose the above into
//!   `encode`/`decode`
//!
//! The code table is derived fresh for every input and shipped inside the
//! payload (see [`crate::payload`]), so the decoder never rebuilds the tree.

pub mod code;
pub mod codec;
pub mod frequency;
pub mod tree;

mod proptest;

pub use code::{Code, CodeTable};
pub use codec::{compression_ratio, decode, encode, EncodedPayload};
pub use frequency::FrequencyTable;
pub use tree::HuffmanTree;
