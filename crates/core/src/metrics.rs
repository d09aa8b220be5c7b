//! Per-transfer metrics reported by the client.
//!
//! A [`TransferReport`] is filled in as a send progresses:
//! - Sizes before and after encoding
//! - Compression ratio (space saved, in percent)
//! - Chunk count on the data channel
//! - Timing
//!
//! The report is plain data; the client owns it on a single thread.

use crate::huffman::compression_ratio;
use std::time::{Duration, Instant};

/// Outcome of one completed send.
#[derive(Debug, Clone)]
pub struct TransferReport {
    pub transfer_id: String,

    /// Name announced to the server
    pub filename: String,

    /// When the send started
    pub start_time: Instant,

    /// When the server acknowledged the transfer
    pub end_time: Option<Instant>,

    /// Bytes before encoding
    pub original_bytes: u64,

    /// Payload bytes (metadata plus packed bits)
    pub encoded_bytes: u64,

    /// Chunk frames written to the data channel
    pub chunks_sent: u64,
}

impl TransferReport {
    pub fn new(transfer_id: impl Into<String>, filename: impl Into<String>) -> Self {
        Self {
            transfer_id: transfer_id.into(),
            filename: filename.into(),
            start_time: Instant::now(),
            end_time: None,
            original_bytes: 0,
            encoded_bytes: 0,
            chunks_sent: 0,
        }
    }

    /// Mark the transfer as acknowledged.
    pub fn complete(&mut self) {
        self.end_time = Some(Instant::now());
    }

    /// Total duration (or elapsed so far if not complete).
    pub fn duration(&self) -> Duration {
        match self.end_time {
            Some(end) => end.duration_since(self.start_time),
            None => self.start_time.elapsed(),
        }
    }

    /// Space saved in percent; negative when encoding grew the data.
    pub fn compression_ratio(&self) -> f64 {
        compression_ratio(self.original_bytes as usize, self.encoded_bytes as usize)
    }

    /// Original bytes per second.
    pub fn throughput_bps(&self) -> f64 {
        let secs = self.duration().as_secs_f64();
        if secs == 0.0 {
            0.0
        } else {
            self.original_bytes as f64 / secs
        }
    }

    /// Print a human-readable summary to stdout.
    pub fn print_summary(&self) {
        println!("\n=== Transfer Summary ===");
        println!("Transfer ID: {}", self.transfer_id);
        println!("Filename:    {}", self.filename);
        println!("Duration:    {} ms", self.duration().as_millis());
        println!();
        println!("Original: {} bytes ({:.2} MiB)", self.original_bytes, mib(self.original_bytes));
        println!("Encoded:  {} bytes ({:.2} MiB)", self.encoded_bytes, mib(self.encoded_bytes));
        println!("Ratio:    {:.2}% saved", self.compression_ratio());
        println!("Chunks:   {}", self.chunks_sent);
        println!("Throughput: {:.2} MB/s", self.throughput_bps() / 1_000_000.0);
        println!();
    }

    /// Export as `key=value` lines (for scripts and tests).
    pub fn export_text(&self) -> String {
        format!(
            "transfer_id={}\n\
             filename={}\n\
             duration_ms={}\n\
             original_bytes={}\n\
             encoded_bytes={}\n\
             compression_ratio={:.4}\n\
             chunks_sent={}\n",
            self.transfer_id,
            self.filename,
            self.duration().as_millis(),
            self.original_bytes,
            self.encoded_bytes,
            self.compression_ratio(),
            self.chunks_sent,
        )
    }
}

/// Byte progress toward a known total, reported in 10% steps.
#[derive(Debug, Clone)]
pub struct Progress {
    total: u64,
    done: u64,
    last_step: u64,
}

impl Progress {
    pub fn new(total: u64) -> Self {
        Self {
            total,
            done: 0,
            last_step: 0,
        }
    }

    /// Add `bytes` and return the new percentage if a 10% mark was crossed.
    pub fn advance(&mut self, bytes: u64) -> Option<u64> {
        self.done = self.done.saturating_add(bytes);
        if self.total == 0 {
            return None;
        }
        let step = (self.done.min(self.total) * 10 / self.total).min(10);
        if step > self.last_step {
            self.last_step = step;
            Some(step * 10)
        } else {
            None
        }
    }

    pub fn done(&self) -> u64 {
        self.done
    }
}

fn mib(bytes: u64) -> f64 {
    bytes as f64 / 1024.0 / 1024.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_creation() {
        let report = TransferReport::new("t1", "a_encoded.txt");
        assert!(report.end_time.is_none());
        assert!(report.duration().as_millis() < 100);
        assert_eq!(report.compression_ratio(), 0.0);
    }

    #[test]
    fn test_compression_ratio() {
        let mut report = TransferReport::new("t1", "a");
        report.original_bytes = 1000;
        report.encoded_bytes = 750;
        assert_eq!(report.compression_ratio(), 25.0);

        report.encoded_bytes = 1100;
        assert!(report.compression_ratio() < 0.0);
    }

    #[test]
    fn test_throughput() {
        let mut report = TransferReport::new("t1", "a");
        report.original_bytes = 1_000_000;
        std::thread::sleep(Duration::from_millis(20));
        report.complete();

        assert!(report.throughput_bps() > 0.0);
        assert!(report.duration() >= Duration::from_millis(20));
    }

    #[test]
    fn test_progress_steps() {
        let mut progress = Progress::new(100);
        assert_eq!(progress.advance(5), None);
        assert_eq!(progress.advance(5), Some(10));
        assert_eq!(progress.advance(35), Some(40));
        assert_eq!(progress.advance(1), None);
        assert_eq!(progress.advance(100), Some(100));
        assert_eq!(progress.advance(10), None);
        assert_eq!(progress.done(), 156);

        assert_eq!(Progress::new(0).advance(10), None);
    }

    #[test]
    fn test_export_text() {
        let mut report = TransferReport::new("abc", "f_encoded.bin");
        report.original_bytes = 1000;
        report.encoded_bytes = 500;
        report.chunks_sent = 2;

        let text = report.export_text();
        assert!(text.contains("transfer_id=abc"));
        assert!(text.contains("original_bytes=1000"));
        assert!(text.contains("compression_ratio=50.0000"));
        assert!(text.contains("chunks_sent=2"));
    }
}
