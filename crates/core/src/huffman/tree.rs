//! Huffman tree construction.
//!
//! Nodes are merged through a min-heap keyed on frequency. Equal frequencies
//! are broken by a sequence key so the tree shape never depends on heap
//! internals: a leaf's key is its symbol value, and internal nodes take keys
//! 256, 257, ... in the order they are created. The first node popped in each
//! merge becomes the left (`0`) child.

use super::frequency::FrequencyTable;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// A binary prefix tree over byte symbols.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HuffmanTree {
    Leaf(u8),
    Internal(Box<HuffmanTree>, Box<HuffmanTree>),
}

/// Heap entry: ordered so the lightest, earliest node pops first.
#[derive(Debug)]
struct QueueEntry {
    weight: u64,
    order: u32,
    node: HuffmanTree,
}

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.weight == other.weight && self.order == other.order
    }
}

impl Eq for QueueEntry {}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed for a min-heap.
        other
            .weight
            .cmp(&self.weight)
            .then_with(|| other.order.cmp(&self.order))
    }
}

impl HuffmanTree {
    /// Build the tree for a frequency table.
    ///
    /// Returns `None` for an empty table. A table with one distinct symbol
    /// yields a single leaf.
    pub fn build(frequencies: &FrequencyTable) -> Option<Self> {
        let mut heap: BinaryHeap<QueueEntry> = frequencies
            .iter()
            .map(|(symbol, weight)| QueueEntry {
                weight,
                order: symbol as u32,
                node: HuffmanTree::Leaf(symbol),
            })
            .collect();

        let mut next_order = 256u32;
        while heap.len() > 1 {
            let (Some(left), Some(right)) = (heap.pop(), heap.pop()) else {
                break;
            };
            heap.push(QueueEntry {
                weight: left.weight + right.weight,
                order: next_order,
                node: HuffmanTree::Internal(Box::new(left.node), Box::new(right.node)),
            });
            next_order += 1;
        }

        heap.pop().map(|entry| entry.node)
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, HuffmanTree::Leaf(_))
    }

    /// Number of leaves (distinct symbols).
    pub fn leaf_count(&self) -> usize {
        match self {
            HuffmanTree::Leaf(_) => 1,
            HuffmanTree::Internal(left, right) => left.leaf_count() + right.leaf_count(),
        }
    }

    /// Length of the longest root-to-leaf path.
    pub fn depth(&self) -> usize {
        match self {
            HuffmanTree::Leaf(_) => 0,
            HuffmanTree::Internal(left, right) => 1 + left.depth().max(right.depth()),
        }
    }
}
