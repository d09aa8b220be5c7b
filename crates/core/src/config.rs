//! Network configuration shared by the server and the client.
//!
//! Every field has a default, so an empty JSON object (or no file at all)
//! yields a usable loopback setup. Files use flat keys with a nested `tls`
//! table:
//!
//! ```json
//! { "host": "0.0.0.0", "control_port": 9001, "tls": { "enabled": true } }
//! ```

use crate::error::{ConfigError, Result};
use crate::protocol::MAX_FRAME_LEN;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// TLS settings for both ends of a connection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TlsConfig {
    /// Wrap every stream in TLS
    pub enabled: bool,

    /// Client side: verify the server certificate against `cert_file`
    pub verify: bool,

    /// Server: certificate chain. Client with `verify`: trusted CA bundle.
    pub cert_file: Option<PathBuf>,

    /// Server private key
    pub key_file: Option<PathBuf>,
}

/// Host, ports, retry and buffer parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetConfig {
    /// Bind address for the server, dial address for the client
    pub host: String,

    pub control_port: u16,

    pub data_port: u16,

    pub tls: TlsConfig,

    /// Chunk size on the data channel
    pub buffer_size: usize,

    /// Connect attempts before giving up
    pub retry_attempts: u32,

    /// Fixed delay between connect attempts
    pub retry_delay_ms: u64,

    /// Worker threads and queued connections per server
    pub max_connections: usize,

    /// Where the server writes received and decoded files
    pub save_directory: PathBuf,
}

impl Default for NetConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            control_port: 9001,
            data_port: 9000,
            tls: TlsConfig::default(),
            buffer_size: 4096,
            retry_attempts: 3,
            retry_delay_ms: 1000,
            max_connections: 16,
            save_directory: PathBuf::from("received_files"),
        }
    }
}

impl NetConfig {
    /// Read a JSON config file. Missing keys keep their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn control_addr(&self) -> String {
        format!("{}:{}", self.host, self.control_port)
    }

    pub fn data_addr(&self) -> String {
        format!("{}:{}", self.host, self.data_port)
    }

    /// Check the values shared by both roles.
    ///
    /// Port 0 is allowed on both channels so tests can bind ephemeral ports.
    pub fn validate(&self) -> Result<()> {
        if self.buffer_size == 0 {
            return Err(invalid("buffer_size", "must be greater than zero"));
        }
        if self.buffer_size > MAX_FRAME_LEN {
            return Err(invalid(
                "buffer_size",
                format!("exceeds the maximum frame size of {MAX_FRAME_LEN} bytes"),
            ));
        }
        if self.retry_attempts == 0 {
            return Err(invalid("retry_attempts", "must be at least 1"));
        }
        if self.max_connections == 0 {
            return Err(invalid("max_connections", "must be greater than zero"));
        }
        if self.control_port != 0 && self.control_port == self.data_port {
            return Err(invalid(
                "data_port",
                format!("collides with control_port {}", self.control_port),
            ));
        }
        Ok(())
    }

    /// [`validate`](Self::validate) plus the server's TLS requirements.
    pub fn validate_server(&self) -> Result<()> {
        self.validate()?;
        if self.tls.enabled {
            if self.tls.cert_file.is_none() {
                return Err(ConfigError::MissingTlsMaterial("tls.cert_file").into());
            }
            if self.tls.key_file.is_none() {
                return Err(ConfigError::MissingTlsMaterial("tls.key_file").into());
            }
        }
        Ok(())
    }
}

fn invalid(key: &'static str, reason: impl Into<String>) -> crate::Error {
    ConfigError::InvalidValue {
        key,
        reason: reason.into(),
    }
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = NetConfig::default();
        assert_eq!(config.control_addr(), "127.0.0.1:9001");
        assert_eq!(config.data_addr(), "127.0.0.1:9000");
        assert_eq!(config.buffer_size, 4096);
        assert_eq!(config.retry_delay(), Duration::from_secs(1));
        assert!(!config.tls.enabled);
        assert!(config.validate_server().is_ok());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: NetConfig =
            serde_json::from_str(r#"{"control_port": 7001, "tls": {"enabled": true}}"#).unwrap();
        assert_eq!(config.control_port, 7001);
        assert_eq!(config.data_port, 9000);
        assert!(config.tls.enabled);
        assert!(!config.tls.verify);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"host": "0.0.0.0", "buffer_size": 512}}"#).unwrap();

        let config = NetConfig::load(file.path()).unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.buffer_size, 512);
    }

    #[test]
    fn test_load_rejects_bad_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        assert!(matches!(NetConfig::load(file.path()), Err(Error::Json(_))));
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        for key in ["buffer_size", "retry_attempts", "max_connections"] {
            let mut config = NetConfig::default();
            match key {
                "buffer_size" => config.buffer_size = 0,
                "retry_attempts" => config.retry_attempts = 0,
                _ => config.max_connections = 0,
            }
            assert!(matches!(
                config.validate(),
                Err(Error::Config(ConfigError::InvalidValue { key: k, .. })) if k == key
            ));
        }
    }

    #[test]
    fn test_validate_rejects_oversized_buffer() {
        let at_limit = NetConfig {
            buffer_size: MAX_FRAME_LEN,
            ..NetConfig::default()
        };
        assert!(at_limit.validate().is_ok());

        let oversized = NetConfig {
            buffer_size: 32 * 1024 * 1024,
            ..NetConfig::default()
        };
        assert!(matches!(
            oversized.validate(),
            Err(Error::Config(ConfigError::InvalidValue { key: "buffer_size", .. }))
        ));
    }

    #[test]
    fn test_validate_rejects_shared_port() {
        let config = NetConfig {
            control_port: 9000,
            ..NetConfig::default()
        };
        assert!(config.validate().is_err());

        let ephemeral = NetConfig {
            control_port: 0,
            data_port: 0,
            ..NetConfig::default()
        };
        assert!(ephemeral.validate().is_ok());
    }

    #[test]
    fn test_server_tls_requires_material() {
        let mut config = NetConfig::default();
        config.tls.enabled = true;
        assert!(matches!(
            config.validate_server(),
            Err(Error::Config(ConfigError::MissingTlsMaterial("tls.cert_file")))
        ));

        config.tls.cert_file = Some(PathBuf::from("cert.pem"));
        assert!(matches!(
            config.validate_server(),
            Err(Error::Config(ConfigError::MissingTlsMaterial("tls.key_file")))
        ));

        // The client side only needs the flag.
        assert!(config.validate().is_ok());
    }
}
