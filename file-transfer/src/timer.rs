//! Retransmit timeout and ack-wait timing.
//!
//! Reliable delivery requires that unacknowledged datagrams are re-sent if
//! no ACK arrives within a bounded time.  This module provides
//! [`RetransmitTimer`], which answers two questions for the sender's
//! ack-wait loop:
//! - has the oldest outstanding packet been in flight longer than the
//!   timeout? (then run a retransmission pass)
//! - otherwise, how long to wait before checking again?
//!
//! The wait is condition-driven: it returns as soon as an ack is signalled,
//! and never later than `poll_interval`.  The timeout is fixed; there is no
//! RTT estimation or back-off.

use std::time::{Duration, Instant};

use tokio::sync::Notify;

use crate::config::TransferConfig;
use crate::sr_sender::SenderState;

/// Timeout parameters for one transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetransmitTimer {
    /// Age of the base packet that triggers a retransmission pass.
    pub timeout: Duration,
    /// Longest single wait between ack checks.
    pub poll_interval: Duration,
}

impl RetransmitTimer {
    pub fn new(timeout: Duration, poll_interval: Duration) -> Self {
        Self {
            timeout,
            poll_interval,
        }
    }

    pub fn from_config(config: &TransferConfig) -> Self {
        Self::new(config.timeout, config.poll_interval)
    }

    /// `true` when the packet at the sender's `base` has timed out.
    pub fn expired(&self, sender: &SenderState, now: Instant) -> bool {
        sender.is_timed_out(now, self.timeout)
    }

    /// Wait for an ack signal, or at most `poll_interval`.
    ///
    /// Returns `true` if woken by a signal.
    pub async fn wait(&self, signal: &Notify) -> bool {
        tokio::time::timeout(self.poll_interval, signal.notified())
            .await
            .is_ok()
    }
}

impl Default for RetransmitTimer {
    fn default() -> Self {
        Self::from_config(&TransferConfig::default())
    }
}
