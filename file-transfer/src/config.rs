//! Tunable parameters shared by both transports.
//!
//! Both peers must agree on `packet_size`; everything else is local policy.
//! `window_size` bounds only what this side sends.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::TransferError;
use crate::packet::{DATAGRAM_HEADER_LEN, SEQ_SPACE};

/// Adjustable transfer parameters.
#[derive(Debug, Clone)]
pub struct TransferConfig {
    /// Fixed size of every packet on the wire (`PACKET_SIZE`).
    pub packet_size: usize,
    /// Maximum number of unacknowledged datagrams in flight (`WINDOW_SIZE`).
    pub window_size: usize,
    /// Age of the oldest unacknowledged datagram that triggers a
    /// retransmission pass.
    pub timeout: Duration,
    /// Upper bound on how long the sender waits between ack checks.
    pub poll_interval: Duration,
    /// Directory received files are written into.
    pub output_dir: PathBuf,
    /// Filename prefix for files received over the stream transport.
    pub stream_prefix: String,
    /// Filename prefix for files received over the datagram transport.
    pub datagram_prefix: String,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            packet_size: 1024,
            window_size: 100,
            timeout: Duration::from_secs(5),
            poll_interval: Duration::from_millis(50),
            output_dir: PathBuf::from("./downloads"),
            stream_prefix: "(tcp) ".to_string(),
            datagram_prefix: "(udp) ".to_string(),
        }
    }
}

impl TransferConfig {
    /// Check the invariants the protocol depends on.
    ///
    /// The window must be non-empty and at most half the sequence space, so
    /// an old and a new packet can never share a sequence number while
    /// either is outstanding.  A packet must hold at least one payload byte
    /// and its length must fit the 16-bit length field.
    pub fn validate(&self) -> Result<(), TransferError> {
        if self.window_size == 0 {
            return Err(TransferError::Config("window_size must be at least 1".into()));
        }
        if self.window_size > SEQ_SPACE / 2 {
            return Err(TransferError::Config(format!(
                "window_size {} exceeds half the sequence space ({})",
                self.window_size,
                SEQ_SPACE / 2
            )));
        }
        if self.packet_size <= DATAGRAM_HEADER_LEN {
            return Err(TransferError::Config(format!(
                "packet_size {} leaves no room for payload",
                self.packet_size
            )));
        }
        if self.packet_size > u16::MAX as usize {
            return Err(TransferError::Config(format!(
                "packet_size {} exceeds the 16-bit length field",
                self.packet_size
            )));
        }
        if self.poll_interval.is_zero() {
            return Err(TransferError::Config("poll_interval must be non-zero".into()));
        }
        Ok(())
    }

    /// Output path for a file received over the stream transport.
    pub fn stream_output_path(&self, name: &str) -> PathBuf {
        prefixed(&self.output_dir, &self.stream_prefix, name)
    }

    /// Output path for a file received over the datagram transport.
    pub fn datagram_output_path(&self, name: &str) -> PathBuf {
        prefixed(&self.output_dir, &self.datagram_prefix, name)
    }
}

fn prefixed(dir: &Path, prefix: &str, name: &str) -> PathBuf {
    dir.join(format!("{prefix}{name}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = TransferConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.window_size, 100);
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.poll_interval, Duration::from_millis(50));
    }

    #[test]
    fn zero_window_rejected() {
        let config = TransferConfig {
            window_size: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(TransferError::Config(_))));
    }

    #[test]
    fn window_larger_than_half_sequence_space_rejected() {
        let config = TransferConfig {
            window_size: SEQ_SPACE / 2 + 1,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = TransferConfig {
            window_size: SEQ_SPACE / 2,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn packet_size_bounds() {
        for bad in [0, DATAGRAM_HEADER_LEN, u16::MAX as usize + 1] {
            let config = TransferConfig {
                packet_size: bad,
                ..Default::default()
            };
            assert!(config.validate().is_err(), "packet_size {bad} accepted");
        }
    }

    #[test]
    fn output_paths_carry_transport_prefix() {
        let config = TransferConfig {
            output_dir: PathBuf::from("/tmp/out"),
            ..Default::default()
        };
        assert_eq!(config.stream_output_path("a.txt"), PathBuf::from("/tmp/out/(tcp) a.txt"));
        assert_eq!(config.datagram_output_path("a.txt"), PathBuf::from("/tmp/out/(udp) a.txt"));
    }
}
