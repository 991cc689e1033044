//! Selective-repeat receive-side reassembly.
//!
//! [`ReceiverState`] implements the receiver half of selective repeat:
//!
//! - Any `FileData` whose sequence number lies less than half the sequence
//!   space past the last flushed packet is **buffered**, in or out of order.
//!   The span does not depend on the local window: the peer's window bounds
//!   how much can actually be held.
//! - Buffered payloads are released strictly in sequence order, starting at
//!   `expected_base + 1`; a gap holds back everything after it.
//! - A sequence number is released at most once.  Re-deliveries of a
//!   buffered or already-released packet are recognised and dropped.
//!
//! The caller acknowledges every packet regardless of the outcome here and
//! writes released payloads to the output file.  This module never touches
//! the file or the socket.

use std::collections::BTreeMap;

use crate::packet::SEQ_SPACE;

/// Furthest distance past `expected_base` that still belongs to the current
/// transfer.  Anything further is an already-flushed duplicate.
pub const RECEIVE_SPAN: usize = SEQ_SPACE / 2;

/// How an arriving `FileData` was classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Accept {
    /// First copy of a packet inside the receive window; now buffered.
    Buffered,
    /// A copy of this sequence number is already buffered.
    Duplicate,
    /// Already released (a late duplicate behind `expected_base`).
    OutOfWindow,
}

/// Receive-side reassembly state for one incoming transfer.
#[derive(Debug)]
pub struct ReceiverState {
    /// Sequence number of the last packet released in order.  Initialised
    /// from the `FileStart` packet, which is the reassembly anchor.
    pub expected_base: u16,

    /// Payloads received but not yet released, keyed by sequence number.
    buffered: BTreeMap<u16, Vec<u8>>,
}

impl Default for ReceiverState {
    fn default() -> Self {
        Self::new()
    }
}

impl ReceiverState {
    pub fn new() -> Self {
        Self {
            expected_base: 0,
            buffered: BTreeMap::new(),
        }
    }

    /// Start reassembly for a transfer whose `FileStart` carried `seq`.
    ///
    /// Anything still buffered from a superseded transfer is discarded.
    pub fn anchor(&mut self, seq: u16) {
        self.expected_base = seq;
        self.buffered.clear();
    }

    /// Classify and, if new, buffer the payload of `FileData` packet `seq`.
    pub fn accept(&mut self, seq: u16, payload: &[u8]) -> Accept {
        let distance = seq.wrapping_sub(self.expected_base) as usize;
        if distance == 0 || distance >= RECEIVE_SPAN {
            return Accept::OutOfWindow;
        }
        if self.buffered.contains_key(&seq) {
            return Accept::Duplicate;
        }
        self.buffered.insert(seq, payload.to_vec());
        Accept::Buffered
    }

    /// Release every payload contiguous with `expected_base`, in order, and
    /// advance `expected_base` to the last one released.
    pub fn drain_ready(&mut self) -> Vec<Vec<u8>> {
        let mut ready = Vec::new();
        let mut seq = self.expected_base.wrapping_add(1);
        while let Some(payload) = self.buffered.remove(&seq) {
            ready.push(payload);
            self.expected_base = seq;
            seq = seq.wrapping_add(1);
        }
        ready
    }

    /// `true` if `seq` is buffered and waiting to be released.
    pub fn is_buffered(&self, seq: u16) -> bool {
        self.buffered.contains_key(&seq)
    }

    /// Number of payloads held back behind a gap.
    pub fn buffered_len(&self) -> usize {
        self.buffered.len()
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::seq::SliceRandom;
    use rand::SeedableRng;

    fn concat(chunks: Vec<Vec<u8>>) -> Vec<u8> {
        chunks.into_iter().flatten().collect()
    }

    #[test]
    fn initial_state() {
        let r = ReceiverState::new();
        assert_eq!(r.expected_base, 0);
        assert_eq!(r.buffered_len(), 0);
    }

    #[test]
    fn in_order_packets_release_immediately() {
        let mut r = ReceiverState::new();
        r.anchor(10);

        assert_eq!(r.accept(11, b"ab"), Accept::Buffered);
        assert_eq!(r.drain_ready(), vec![b"ab".to_vec()]);
        assert_eq!(r.expected_base, 11);

        assert_eq!(r.accept(12, b"cd"), Accept::Buffered);
        assert_eq!(r.drain_ready(), vec![b"cd".to_vec()]);
        assert_eq!(r.expected_base, 12);
    }

    #[test]
    fn gap_holds_back_later_packets() {
        let mut r = ReceiverState::new();
        r.anchor(0);

        assert_eq!(r.accept(3, b"3"), Accept::Buffered);
        assert_eq!(r.accept(2, b"2"), Accept::Buffered);
        assert!(r.drain_ready().is_empty());
        assert_eq!(r.expected_base, 0);
        assert!(r.is_buffered(2));

        assert_eq!(r.accept(1, b"1"), Accept::Buffered);
        assert_eq!(concat(r.drain_ready()), b"123");
        assert_eq!(r.expected_base, 3);
        assert_eq!(r.buffered_len(), 0);
        assert!(!r.is_buffered(2));
    }

    #[test]
    fn duplicate_while_buffered_not_stored_twice() {
        let mut r = ReceiverState::new();
        r.anchor(0);
        assert_eq!(r.accept(2, b"first"), Accept::Buffered);
        assert_eq!(r.accept(2, b"second"), Accept::Duplicate);
        r.accept(1, b"x");
        assert_eq!(concat(r.drain_ready()), b"xfirst");
    }

    #[test]
    fn duplicate_after_release_is_out_of_window() {
        let mut r = ReceiverState::new();
        r.anchor(0);
        r.accept(1, b"once");
        assert_eq!(r.drain_ready().len(), 1);

        assert_eq!(r.accept(1, b"once"), Accept::OutOfWindow);
        assert!(r.drain_ready().is_empty());
    }

    #[test]
    fn anchor_itself_is_not_data() {
        let mut r = ReceiverState::new();
        r.anchor(5);
        assert_eq!(r.accept(5, b"start"), Accept::OutOfWindow);
    }

    #[test]
    fn far_ahead_packets_buffered_up_to_half_space() {
        let mut r = ReceiverState::new();
        r.anchor(0);
        assert_eq!(r.accept(200, b"ahead"), Accept::Buffered);
        assert_eq!(r.accept(32767, b"edge"), Accept::Buffered);
        assert_eq!(r.accept(32768, b"behind"), Accept::OutOfWindow);
        assert_eq!(r.accept(65535, b"behind"), Accept::OutOfWindow);
    }

    #[test]
    fn anchor_discards_superseded_buffer() {
        let mut r = ReceiverState::new();
        r.anchor(0);
        r.accept(3, b"stale");
        r.anchor(100);
        assert_eq!(r.buffered_len(), 0);
        assert_eq!(r.expected_base, 100);
    }

    #[test]
    fn seq_wrap_around() {
        let mut r = ReceiverState::new();
        r.anchor(65533);
        r.accept(0, b"c");
        r.accept(65535, b"b");
        r.accept(65534, b"a");
        r.accept(1, b"d");
        assert_eq!(concat(r.drain_ready()), b"abcd");
        assert_eq!(r.expected_base, 1);
    }

    #[test]
    fn shuffled_duplicated_arrivals_flush_in_order() {
        const COUNT: u16 = 40;
        let mut rng = StdRng::seed_from_u64(7);

        for round in 0..20 {
            let start: u16 = 65520u16.wrapping_add(round);
            let mut arrivals: Vec<u16> = (1..=COUNT).collect();
            arrivals.extend((1..=COUNT).step_by(3));
            arrivals.shuffle(&mut rng);

            let mut r = ReceiverState::new();
            r.anchor(start);
            let mut out = Vec::new();
            for offset in arrivals {
                let seq = start.wrapping_add(offset);
                r.accept(seq, &offset.to_be_bytes());
                out.extend(concat(r.drain_ready()));
            }

            let expected: Vec<u8> = (1..=COUNT).flat_map(|o| o.to_be_bytes()).collect();
            assert_eq!(out, expected, "round {round}");
        }
    }
}
