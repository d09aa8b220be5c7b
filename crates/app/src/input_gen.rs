//! Seeded sample data for demos.
//!
//! The output is a sequence of blocks, each drawn from one of four shapes so
//! the compression ratio lands somewhere interesting:
//! - runs of a single byte
//! - log-like text from a small vocabulary
//! - short repeating byte patterns
//! - uniform noise

use rand::{seq::SliceRandom, Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::path::Path;

const BLOCK_SIZE: usize = 4096;

const WORDS: &[&str] = &[
    "transfer", "ready", "chunk", "payload", "decoded", "socket", "server", "client", "INFO",
    "WARN", "frame", "control", "data", "bytes", "the", "a", "of", "to",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Block {
    Run,
    Text,
    Pattern,
    Noise,
}

impl Block {
    fn pick(rng: &mut ChaCha8Rng) -> Self {
        match rng.gen_range(0..10) {
            0..=1 => Block::Run,
            2..=5 => Block::Text,
            6..=7 => Block::Pattern,
            _ => Block::Noise,
        }
    }

    fn fill(self, rng: &mut ChaCha8Rng, out: &mut Vec<u8>, len: usize) {
        let target = out.len() + len;
        match self {
            Block::Run => {
                let byte: u8 = rng.gen();
                out.resize(target, byte);
            }
            Block::Text => {
                while out.len() < target {
                    let word = WORDS.choose(rng).copied().unwrap_or("data");
                    out.extend_from_slice(word.as_bytes());
                    out.push(if rng.gen_ratio(1, 12) { b'\n' } else { b' ' });
                }
                out.truncate(target);
            }
            Block::Pattern => {
                let pattern: Vec<u8> = (0..rng.gen_range(3..=24)).map(|_| rng.gen()).collect();
                out.extend(pattern.iter().cycle().take(len));
            }
            Block::Noise => out.extend((0..len).map(|_| rng.gen::<u8>())),
        }
    }
}

/// Generate exactly `size` bytes, deterministic for a given `seed`.
pub fn sample_data(seed: u64, size: usize) -> Vec<u8> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut data = Vec::with_capacity(size);

    while data.len() < size {
        let len = (size - data.len()).min(BLOCK_SIZE);
        Block::pick(&mut rng).fill(&mut rng, &mut data, len);
    }
    data
}

/// Write `sample_data(seed, size)` to `path`.
pub fn write_sample(path: &Path, seed: u64, size: usize) -> std::io::Result<()> {
    std::fs::write(path, sample_data(seed, size))
}

/// Seed derived from the clock, for runs without `--seed`.
pub fn time_seed() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_sizes() {
        for size in [0, 1, 100, BLOCK_SIZE, BLOCK_SIZE + 1, 50_000] {
            assert_eq!(sample_data(7, size).len(), size);
        }
    }

    #[test]
    fn test_determinism() {
        assert_eq!(sample_data(12345, 20_000), sample_data(12345, 20_000));
        assert_ne!(sample_data(1, 20_000), sample_data(2, 20_000));
    }

    #[test]
    fn test_sample_round_trips_through_codec() {
        let data = sample_data(42, 32 * 1024);
        let (payload, _) = huffstream_core::encode(&data).unwrap();
        assert_eq!(huffstream_core::decode(&payload).unwrap(), data);
    }

    #[test]
    fn test_write_sample() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.bin");
        write_sample(&path, 9, 1000).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), sample_data(9, 1000));
    }
}
