//! Network simulator for deterministic testing.
//!
//! Real networks drop, reorder, and duplicate packets.  To exercise the
//! reliability mechanisms without depending on actual network conditions,
//! this module provides a [`SimulatedLink`]: a [`PacketSink`] that forwards
//! packets into an in-memory channel, applying a configurable fault model:
//!
//! | Fault            | Description                                          |
//! |------------------|------------------------------------------------------|
//! | Periodic drop    | Drop every `drop_every`-th packet offered.           |
//! | Packet loss      | Drop a packet with probability `loss_rate`.          |
//! | Duplication      | Deliver a packet twice.                              |
//! | Reordering       | Hold a packet back so the next one overtakes it.     |
//!
//! A duplicated packet is never also held back, so both copies always
//! arrive before anything sent after them.
//!
//! Rates outside `[0.0, 1.0]` are clamped; `NaN` counts as `0.0`.
//!
//! All randomness comes from a [`StdRng`] seeded by `seed`, so a failing
//! run replays exactly.

use std::io;
use std::sync::{Arc, Mutex};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::socket::PacketSink;

/// Configuration for the fault-injection model.
///
/// All probabilities are in the range `[0.0, 1.0]`.
#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    /// Drop the n-th, 2n-th, ... packet offered (1-based).
    pub drop_every: Option<usize>,
    /// Probability that any given packet is silently dropped.
    pub loss_rate: f64,
    /// Probability that a packet is delivered twice.
    pub duplicate_rate: f64,
    /// Probability that a packet is held back behind the next one.
    pub reorder_rate: f64,
    /// RNG seed.
    pub seed: u64,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        // No faults by default; the link is a transparent pass-through.
        Self {
            drop_every: None,
            loss_rate: 0.0,
            duplicate_rate: 0.0,
            reorder_rate: 0.0,
            seed: 0,
        }
    }
}

/// What the link did with the traffic offered to it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkStats {
    pub offered: usize,
    pub delivered: usize,
    pub dropped: usize,
    pub duplicated: usize,
    pub reordered: usize,
}

/// One direction of a simulated network path.
pub struct SimulatedLink {
    config: SimulatorConfig,
    tx: UnboundedSender<Vec<u8>>,
    rng: StdRng,
    held: Option<Vec<u8>>,
    /// Predicate over the packet bytes and its 1-based offer index; `true`
    /// drops it.  Applied before the random faults.
    filter: Option<Box<dyn FnMut(&[u8], usize) -> bool + Send>>,
    stats: Arc<Mutex<LinkStats>>,
}

/// Create a link and the receiving end of its channel.
pub fn link(mut config: SimulatorConfig) -> (SimulatedLink, UnboundedReceiver<Vec<u8>>) {
    config.loss_rate = probability(config.loss_rate);
    config.duplicate_rate = probability(config.duplicate_rate);
    config.reorder_rate = probability(config.reorder_rate);
    let (tx, rx) = mpsc::unbounded_channel();
    let link = SimulatedLink {
        rng: StdRng::seed_from_u64(config.seed),
        config,
        tx,
        held: None,
        filter: None,
        stats: Arc::new(Mutex::new(LinkStats::default())),
    };
    (link, rx)
}

fn probability(rate: f64) -> f64 {
    if rate.is_nan() {
        0.0
    } else {
        rate.clamp(0.0, 1.0)
    }
}

impl SimulatedLink {
    /// Install a targeted drop rule, e.g. "lose the ack for seq 6 three times".
    pub fn with_filter<F>(mut self, filter: F) -> Self
    where
        F: FnMut(&[u8], usize) -> bool + Send + 'static,
    {
        self.filter = Some(Box::new(filter));
        self
    }

    /// Shared handle to the link counters; stays readable after the link
    /// has been moved into a task.
    pub fn stats_handle(&self) -> Arc<Mutex<LinkStats>> {
        Arc::clone(&self.stats)
    }

    fn deliver(&self, packet: Vec<u8>, stats: &mut LinkStats) {
        // A closed receiver is a peer that has gone away: equivalent to loss.
        if self.tx.send(packet).is_ok() {
            stats.delivered += 1;
        }
    }
}

impl PacketSink for SimulatedLink {
    fn send(&mut self, packet: &[u8]) -> io::Result<()> {
        let stats_handle = Arc::clone(&self.stats);
        let mut stats = match stats_handle.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        stats.offered += 1;
        let index = stats.offered;

        let periodic = self.config.drop_every.is_some_and(|n| n > 0 && index % n == 0);
        let filtered = self.filter.as_mut().is_some_and(|f| f(packet, index));
        if periodic || filtered || self.rng.random_bool(self.config.loss_rate) {
            stats.dropped += 1;
            log::trace!("[sim] dropped packet #{index}");
            return Ok(());
        }

        let copies = if self.rng.random_bool(self.config.duplicate_rate) {
            stats.duplicated += 1;
            2
        } else {
            1
        };

        if copies == 1 && self.held.is_none() && self.rng.random_bool(self.config.reorder_rate) {
            stats.reordered += 1;
            self.held = Some(packet.to_vec());
            return Ok(());
        }

        for _ in 0..copies {
            self.deliver(packet.to_vec(), &mut stats);
        }
        if let Some(held) = self.held.take() {
            self.deliver(held, &mut stats);
        }
        Ok(())
    }
}
