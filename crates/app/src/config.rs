//! Command-line configuration for the huffstream binary.
//!
//! Settings resolve in three layers: built-in defaults, then an optional JSON
//! config file (`--config`), then individual flags. The tool works with zero
//! arguments against `127.0.0.1:9001`/`9000`.

use clap::{Args, Parser, Subcommand};
use huffstream_core::{NetConfig, Result};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "huffstream",
    version,
    about = "Huffman-compressed file transfer over a control/data channel pair"
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

/// Flags shared by every subcommand.
#[derive(Debug, Clone, Default, Args)]
pub struct GlobalArgs {
    /// JSON config file; flags override its values
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Host to bind (server) or dial (client)
    #[arg(long, global = true)]
    pub host: Option<String>,

    #[arg(long, global = true, value_name = "PORT")]
    pub control_port: Option<u16>,

    #[arg(long, global = true, value_name = "PORT")]
    pub data_port: Option<u16>,

    /// Wrap both channels in TLS
    #[arg(long, global = true)]
    pub tls: bool,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the server until the process is terminated
    Serve {
        /// Directory for received and decoded files
        #[arg(long, value_name = "DIR")]
        save_dir: Option<PathBuf>,

        /// Worker threads (and queue slots) per channel
        #[arg(long)]
        max_connections: Option<usize>,
    },
    /// Send one file and print a transfer summary
    Send {
        file: PathBuf,

        /// Chunk size on the data channel
        #[arg(long, value_name = "BYTES")]
        buffer_size: Option<usize>,
    },
    /// Query the status of a transfer
    Status { transfer_id: String },
    /// Mark a transfer cancelled
    Cancel { transfer_id: String },
    /// Huffman-encode a file locally
    Encode { input: PathBuf, output: PathBuf },
    /// Decode a file produced by `encode`
    Decode { input: PathBuf, output: PathBuf },
    /// Write seeded sample data with mixed compressibility
    Sample {
        output: PathBuf,

        /// Random seed (default: time-based, printed)
        #[arg(long)]
        seed: Option<u64>,

        /// Size in bytes
        #[arg(long, default_value_t = 64 * 1024)]
        size: usize,
    },
    /// Send one file using the single-channel `filename|size` format
    LegacySend { file: PathBuf },
    /// Receive one legacy transfer on the data port
    LegacyReceive {
        #[arg(long, value_name = "DIR")]
        save_dir: Option<PathBuf>,
    },
}

impl GlobalArgs {
    /// Load the config file (if any) and apply the flags on top.
    pub fn resolve(&self) -> Result<NetConfig> {
        let base = match &self.config {
            Some(path) => NetConfig::load(path)?,
            None => NetConfig::default(),
        };
        Ok(self.overlay(base))
    }

    fn overlay(&self, mut config: NetConfig) -> NetConfig {
        if let Some(host) = &self.host {
            config.host = host.clone();
        }
        if let Some(port) = self.control_port {
            config.control_port = port;
        }
        if let Some(port) = self.data_port {
            config.data_port = port;
        }
        if self.tls {
            config.tls.enabled = true;
        }
        config
    }
}

/// Apply subcommand-specific overrides.
pub fn apply_command(config: &mut NetConfig, command: &Command) {
    match command {
        Command::Serve {
            save_dir,
            max_connections,
        } => {
            if let Some(dir) = save_dir {
                config.save_directory = dir.clone();
            }
            if let Some(n) = max_connections {
                config.max_connections = *n;
            }
        }
        Command::Send {
            buffer_size: Some(size),
            ..
        } => config.buffer_size = *size,
        Command::LegacyReceive {
            save_dir: Some(dir),
        } => config.save_directory = dir.clone(),
        _ => {}
    }
}

/// Print the resolved network settings.
pub fn print(config: &NetConfig) {
    println!("=== Configuration ===");
    println!("Control: {}", config.control_addr());
    println!("Data:    {}", config.data_addr());
    println!(
        "TLS:     {}",
        if config.tls.enabled { "enabled" } else { "disabled" }
    );
    println!("Buffer:  {} bytes", config.buffer_size);
    println!(
        "Retry:   {} attempts, {} ms apart",
        config.retry_attempts, config.retry_delay_ms
    );
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_without_flags() {
        let cli = Cli::try_parse_from(["huffstream", "status", "abc"]).unwrap();
        let config = cli.global.resolve().unwrap();

        assert_eq!(config, NetConfig::default());
        assert!(matches!(cli.command, Command::Status { ref transfer_id } if transfer_id == "abc"));
    }

    #[test]
    fn test_flags_override_defaults() {
        let cli = Cli::try_parse_from([
            "huffstream",
            "send",
            "notes.txt",
            "--host",
            "10.0.0.5",
            "--control-port",
            "7001",
            "--data-port",
            "7000",
            "--tls",
            "--buffer-size",
            "512",
            "-vv",
        ])
        .unwrap();

        let mut config = cli.global.resolve().unwrap();
        apply_command(&mut config, &cli.command);

        assert_eq!(config.host, "10.0.0.5");
        assert_eq!(config.control_port, 7001);
        assert_eq!(config.data_port, 7000);
        assert!(config.tls.enabled);
        assert_eq!(config.buffer_size, 512);
        assert_eq!(cli.global.verbose, 2);
    }

    #[test]
    fn test_flags_override_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"host": "192.168.1.9", "control_port": 6001, "retry_attempts": 9}}"#
        )
        .unwrap();

        let path = file.path().to_str().unwrap();
        let cli = Cli::try_parse_from([
            "huffstream",
            "--config",
            path,
            "--control-port",
            "6101",
            "serve",
            "--save-dir",
            "/tmp/incoming",
        ])
        .unwrap();

        let mut config = cli.global.resolve().unwrap();
        apply_command(&mut config, &cli.command);

        assert_eq!(config.host, "192.168.1.9");
        assert_eq!(config.control_port, 6101);
        assert_eq!(config.retry_attempts, 9);
        assert_eq!(config.data_port, 9000);
        assert_eq!(config.save_directory, PathBuf::from("/tmp/incoming"));
    }

    #[test]
    fn test_missing_config_file() {
        let args = GlobalArgs {
            config: Some(PathBuf::from("/definitely/not/here.json")),
            ..GlobalArgs::default()
        };
        assert!(args.resolve().is_err());
    }

    #[test]
    fn test_sample_defaults() {
        let cli = Cli::try_parse_from(["huffstream", "sample", "out.bin"]).unwrap();
        match cli.command {
            Command::Sample { seed, size, .. } => {
                assert_eq!(seed, None);
                assert_eq!(size, 64 * 1024);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_subcommand_is_rejected() {
        assert!(Cli::try_parse_from(["huffstream", "explode"]).is_err());
    }
}
