//! Selective-repeat send-side state machine.
//!
//! [`SenderState`] maintains a sliding window of up to `window_size`
//! outstanding datagrams, each identified by a 16-bit sequence number.
//!
//! # Protocol contract
//!
//! - At most `window_size` packets may be outstanding at once.
//! - ACKs are **individual**: an ack for `K` acknowledges packet `K` only.
//!   The window's left edge (`base`) advances only once the packet at `base`
//!   itself has been acknowledged.
//! - On timeout of the packet at `base`, every outstanding packet that has
//!   not been acknowledged is resent (selective repeat, not go-back-N).
//! - Sequence numbers wrap modulo 2^16.  Because the window is never more
//!   than half the sequence space, `[base, next)` is unambiguous.
//!
//! This module only manages state; all socket I/O is the caller's
//! responsibility.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::packet::{pack_with_seq_number, PacketError, PacketType};
use crate::state::SendPhase;

// ---------------------------------------------------------------------------
// Outstanding
// ---------------------------------------------------------------------------

/// A single sent-but-unreleased packet occupying one slot of the window.
#[derive(Debug, Clone)]
pub struct Outstanding {
    /// The packed packet, exactly as first sent.
    pub packet: Vec<u8>,
    /// Type of the packet (for logging).
    pub packet_type: PacketType,
    /// Time of the most recent transmission.
    pub sent_at: Instant,
    /// Total number of times this packet has been transmitted.
    pub tx_count: u32,
    /// `true` once an ack for this sequence number has been observed.
    pub acked: bool,
}

// ---------------------------------------------------------------------------
// SenderState
// ---------------------------------------------------------------------------

/// Selective-repeat send-side state for one outgoing transfer.
///
/// # Sequence-number layout
///
/// ```text
///  base               next
///   │                   │
///  ─┼───────────────────┼──────────────────▶ seq space (mod 2^16)
///   │ <── outstanding ─▶│ <── sendable ───▶
/// ```
#[derive(Debug)]
pub struct SenderState {
    /// Oldest unreleased sequence number (left window edge).
    pub base: u16,

    /// Sequence number assigned to the next new packet.
    pub next: u16,

    /// Where the current transfer is in its lifecycle.
    pub phase: SendPhase,

    window_size: usize,

    /// Keys are exactly the sequence numbers in `[base, next)`.
    outstanding: HashMap<u16, Outstanding>,
}

impl SenderState {
    /// Create a new [`SenderState`] whose first packet will carry `seq_start`.
    pub fn new(seq_start: u16, window_size: usize) -> Self {
        assert!(window_size >= 1, "window_size must be at least 1");
        Self {
            base: seq_start,
            next: seq_start,
            phase: SendPhase::Idle,
            window_size,
            outstanding: HashMap::with_capacity(window_size),
        }
    }

    /// `true` when there is room for at least one more outstanding packet.
    pub fn has_room(&self) -> bool {
        self.outstanding.len() < self.window_size
    }

    /// Number of packets in `[base, next)`.
    pub fn in_flight(&self) -> usize {
        self.outstanding.len()
    }

    /// `true` while any packet is waiting to be released from the window.
    pub fn has_unacked(&self) -> bool {
        self.base != self.next
    }

    /// `true` when `seq` lies in `[base, next)`.
    pub fn in_window(&self, seq: u16) -> bool {
        seq.wrapping_sub(self.base) < self.next.wrapping_sub(self.base)
    }

    /// Pack `data` as a packet of `packet_type` at sequence number `next`,
    /// record it as outstanding at time `now`, and advance `next`.
    ///
    /// Returns the assigned sequence number and the bytes to hand to the
    /// transport.
    ///
    /// # Panics
    ///
    /// Panics in debug mode if the window is already full.  Check
    /// [`has_room`](Self::has_room) before calling.
    pub fn record_sent(
        &mut self,
        packet_type: PacketType,
        data: &[u8],
        packet_size: usize,
        now: Instant,
    ) -> Result<(u16, Vec<u8>), PacketError> {
        debug_assert!(
            self.has_room(),
            "record_sent called on a full window ({} / {})",
            self.outstanding.len(),
            self.window_size
        );
        let seq = self.next;
        let packet = pack_with_seq_number(packet_type, seq, data, packet_size)?;
        self.outstanding.insert(
            seq,
            Outstanding {
                packet: packet.clone(),
                packet_type,
                sent_at: now,
                tx_count: 1,
                acked: false,
            },
        );
        self.next = self.next.wrapping_add(1);
        Ok((seq, packet))
    }

    /// Apply an acknowledgment for `seq`.
    ///
    /// Returns `true` if this marked a previously unacknowledged slot.
    /// Duplicate acks and acks outside `[base, next)` are no-ops.
    pub fn on_ack(&mut self, seq: u16) -> bool {
        if !self.in_window(seq) {
            return false;
        }
        match self.outstanding.get_mut(&seq) {
            Some(entry) if !entry.acked => {
                entry.acked = true;
                true
            }
            _ => false,
        }
    }

    /// `true` if the packet at `seq` is outstanding and acknowledged.
    pub fn is_acked(&self, seq: u16) -> bool {
        self.outstanding.get(&seq).is_some_and(|e| e.acked)
    }

    /// `true` if the packet at `base` has been acknowledged.
    pub fn base_acked(&self) -> bool {
        self.has_unacked() && self.is_acked(self.base)
    }

    /// Release the acknowledged packet at `base` and slide the window by one.
    ///
    /// Returns the released entry, or `None` if `base` is not yet acked.
    pub fn advance_base(&mut self) -> Option<Outstanding> {
        if !self.base_acked() {
            return None;
        }
        let entry = self.outstanding.remove(&self.base);
        self.base = self.base.wrapping_add(1);
        entry
    }

    /// `true` when the packet at `base` was last sent more than `timeout`
    /// before `now`.
    pub fn is_timed_out(&self, now: Instant, timeout: Duration) -> bool {
        self.outstanding
            .get(&self.base)
            .is_some_and(|e| now.saturating_duration_since(e.sent_at) > timeout)
    }

    /// Selective-repeat sweep over `[base, next)`.
    ///
    /// Every slot that is neither acknowledged nor reported by
    /// `already_received` has its timestamp refreshed to `now` and its
    /// transmission count bumped; the packets to resend are returned in
    /// sequence order.
    pub fn retransmit_pass<F>(&mut self, now: Instant, already_received: F) -> Vec<(u16, Vec<u8>)>
    where
        F: Fn(u16) -> bool,
    {
        let mut resend = Vec::new();
        let mut seq = self.base;
        while seq != self.next {
            if let Some(entry) = self.outstanding.get_mut(&seq) {
                if !entry.acked && !already_received(seq) {
                    entry.sent_at = now;
                    entry.tx_count += 1;
                    resend.push((seq, entry.packet.clone()));
                }
            }
            seq = seq.wrapping_add(1);
        }
        resend
    }

    /// Look up the outstanding entry for `seq`.
    #[cfg(test)]
    fn entry(&self, seq: u16) -> Option<&Outstanding> {
        self.outstanding.get(&seq)
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
