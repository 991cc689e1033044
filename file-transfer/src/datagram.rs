//! Reliable file transfer over an unreliable datagram transport.
//!
//! # Architecture
//!
//! ```text
//!  send_file(path, sink)                    receive(packet, sink)
//!      │                                        │
//!      ▼                                        ▼
//!  ┌──────────────────────── DatagramTransfer ─────────────────────────┐
//!  │  Arc<Mutex<Shared>>                                               │
//!  │    ├── SenderState   (window, outstanding table, per-slot acks)   │
//!  │    ├── ReceiverState (reassembly buffer, expected_base)           │
//!  │    └── OutputFile    (open while a transfer is being received)    │
//!  │  Notify  ◀── signalled by every FileAck                           │
//!  └───────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A sender task calls [`DatagramTransfer::send_file`]; a receive-loop task
//! feeds every arriving datagram to [`DatagramTransfer::receive`] on a clone
//! of the same handle.  Acks flow from the receive loop to the sender
//! through the shared [`SenderState`] and the [`Notify`].
//!
//! # Ack wait
//!
//! Whenever the sender must wait for the packet at `base`:
//!
//! 1. lock; if `base` is acked, release it and return;
//! 2. else if `base` has been outstanding longer than the timeout, run a
//!    selective-repeat retransmission pass;
//! 3. unlock and wait for an ack signal, at most `poll_interval`.
//!
//! The lock is never held across a wait.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tokio::fs::File;
use tokio::io::BufReader;
use tokio::sync::{Mutex, Notify};

use crate::config::TransferConfig;
use crate::error::{base_name, sanitize_file_name, Result, TransferError};
use crate::fileio::{read_chunk, OutputFile};
use crate::packet::{
    datagram_payload_capacity, extract_seq_bytes, pack_with_raw_seq_bytes, unpack_datagram,
    PacketType, SeqBytes,
};
use crate::socket::PacketSink;
use crate::sr_receiver::{Accept, ReceiverState};
use crate::sr_sender::SenderState;
use crate::state::{ReceiveEvent, SendPhase};
use crate::timer::RetransmitTimer;

/// Counters for one completed [`DatagramTransfer::send_file`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SendReport {
    /// File bytes sent.
    pub bytes: u64,
    /// `FileData` packets sent, first transmissions only.
    pub data_packets: u64,
    /// `FileStart` + `FileEnd` packets sent, first transmissions only.
    pub control_packets: u64,
    /// Packets resent by retransmission passes.
    pub retransmissions: u64,
    /// Largest number of packets outstanding at once.
    pub peak_in_flight: usize,
}

#[derive(Debug)]
struct Shared {
    sender: SenderState,
    receiver: ReceiverState,
    output: Option<OutputFile>,
    /// Sequence number and raw name of the `FileStart` that opened `output`.
    start: Option<(u16, Vec<u8>)>,
}

/// One endpoint of the datagram transport, usable as sender, receiver or
/// both.  Clones share state.
#[derive(Debug, Clone)]
pub struct DatagramTransfer {
    shared: Arc<Mutex<Shared>>,
    ack_signal: Arc<Notify>,
    config: Arc<TransferConfig>,
    timer: RetransmitTimer,
}

impl DatagramTransfer {
    pub fn new(config: TransferConfig) -> Result<Self> {
        config.validate()?;
        let shared = Shared {
            sender: SenderState::new(0, config.window_size),
            receiver: ReceiverState::new(),
            output: None,
            start: None,
        };
        Ok(Self {
            shared: Arc::new(Mutex::new(shared)),
            ack_signal: Arc::new(Notify::new()),
            timer: RetransmitTimer::from_config(&config),
            config: Arc::new(config),
        })
    }

    pub fn config(&self) -> &TransferConfig {
        &self.config
    }

    /// Current phase of the outgoing transfer.
    pub async fn phase(&self) -> SendPhase {
        self.shared.lock().await.sender.phase
    }

    /// Path of the file currently being received, if any.
    pub async fn output_path(&self) -> Option<PathBuf> {
        let shared = self.shared.lock().await;
        shared.output.as_ref().map(|o| o.path().to_path_buf())
    }

    // -----------------------------------------------------------------------
    // Sender side
    // -----------------------------------------------------------------------

    /// Send the file at `path` and return once its `FileEnd` has been
    /// acknowledged.
    ///
    /// Acks must be delivered concurrently through [`receive`](Self::receive)
    /// on this handle or a clone of it.
    pub async fn send_file<S: PacketSink>(
        &self,
        path: impl AsRef<Path>,
        sink: &mut S,
    ) -> Result<SendReport> {
        let path = path.as_ref();
        let name = base_name(path)?;
        let mut file = BufReader::new(File::open(path).await?);
        let chunk_len = datagram_payload_capacity(self.config.packet_size);
        let mut report = SendReport::default();

        log::info!("[udp] sending {} as {name:?}", path.display());

        self.set_phase(SendPhase::AwaitStartAck).await;
        self.send_and_record(PacketType::FileStart, name.as_bytes(), sink, &mut report)
            .await?;
        report.control_packets += 1;
        self.wait_for_base_ack(sink, &mut report).await?;

        self.set_phase(SendPhase::Sending).await;
        let mut chunk = read_chunk(&mut file, chunk_len).await?;
        while !chunk.is_empty() {
            if self.has_room().await {
                self.send_and_record(PacketType::FileData, &chunk, sink, &mut report)
                    .await?;
                report.data_packets += 1;
                report.bytes += chunk.len() as u64;
                chunk = read_chunk(&mut file, chunk_len).await?;
            } else {
                // Window full: free exactly the oldest slot before sending more.
                self.wait_for_base_ack(sink, &mut report).await?;
            }
        }
        drop(file);

        self.set_phase(SendPhase::AwaitFinalAcks).await;
        while self.has_unacked().await {
            self.wait_for_base_ack(sink, &mut report).await?;
        }

        self.send_and_record(PacketType::FileEnd, &[], sink, &mut report)
            .await?;
        report.control_packets += 1;
        self.wait_for_base_ack(sink, &mut report).await?;
        self.set_phase(SendPhase::Done).await;

        log::info!(
            "[udp] sent {name:?}: {} bytes in {} data packets, {} retransmitted",
            report.bytes,
            report.data_packets,
            report.retransmissions
        );
        Ok(report)
    }

    /// Pack a packet at the next sequence number, send it and record it as
    /// outstanding.
    async fn send_and_record<S: PacketSink>(
        &self,
        packet_type: PacketType,
        data: &[u8],
        sink: &mut S,
        report: &mut SendReport,
    ) -> Result<u16> {
        let mut shared = self.shared.lock().await;
        let (seq, packet) =
            shared
                .sender
                .record_sent(packet_type, data, self.config.packet_size, Instant::now())?;
        sink.send(&packet)?;
        report.peak_in_flight = report.peak_in_flight.max(shared.sender.in_flight());
        log::debug!(
            "[udp] → {packet_type} seq={seq} len={} in_flight={}",
            data.len(),
            shared.sender.in_flight()
        );
        Ok(seq)
    }

    /// Block until the packet at `base` is acknowledged, retransmitting on
    /// timeout, then slide the window past it.
    async fn wait_for_base_ack<S: PacketSink>(
        &self,
        sink: &mut S,
        report: &mut SendReport,
    ) -> Result<()> {
        loop {
            {
                let mut shared = self.shared.lock().await;
                if let Some(entry) = shared.sender.advance_base() {
                    log::debug!(
                        "[udp] ← ACK {} released; base={} tx_count={}",
                        entry.packet_type,
                        shared.sender.base,
                        entry.tx_count
                    );
                    return Ok(());
                }

                let now = Instant::now();
                if self.timer.expired(&shared.sender, now) {
                    let Shared {
                        sender, receiver, ..
                    } = &mut *shared;
                    let resend = sender.retransmit_pass(now, |seq| receiver.is_buffered(seq));
                    log::debug!(
                        "[udp] timeout on seq={}; retransmitting {} packet(s)",
                        sender.base,
                        resend.len()
                    );
                    for (_, packet) in &resend {
                        sink.send(packet)?;
                    }
                    report.retransmissions += resend.len() as u64;
                }
            }
            if !self.timer.wait(&self.ack_signal).await {
                log::trace!("[udp] no ack within poll interval");
            }
        }
    }

    async fn set_phase(&self, phase: SendPhase) {
        self.shared.lock().await.sender.phase = phase;
    }

    async fn has_room(&self) -> bool {
        self.shared.lock().await.sender.has_room()
    }

    async fn has_unacked(&self) -> bool {
        self.shared.lock().await.sender.has_unacked()
    }

    // -----------------------------------------------------------------------
    // Receiver side
    // -----------------------------------------------------------------------

    /// Process one datagram from the transport.
    ///
    /// Every well-formed non-ack packet is acknowledged before anything
    /// else, duplicates included.  Malformed packets are rejected without
    /// an ack.
    pub async fn receive<S: PacketSink>(&self, packet: &[u8], sink: &mut S) -> Result<ReceiveEvent> {
        let pkt = unpack_datagram(packet)?;
        if pkt.packet_type != PacketType::FileAck {
            self.send_ack(extract_seq_bytes(packet)?, sink)?;
        }

        let mut shared = self.shared.lock().await;
        match pkt.packet_type {
            PacketType::FileStart => {
                // A repeat of the opening START is only harmless while nothing
                // has been released or buffered; otherwise it is a restart.
                let untouched = shared.receiver.expected_base == pkt.seq
                    && shared.receiver.buffered_len() == 0;
                let duplicate = untouched
                    && shared.output.is_some()
                    && shared
                        .start
                        .as_ref()
                        .is_some_and(|(seq, name)| *seq == pkt.seq && name == pkt.payload);
                if duplicate {
                    log::debug!("[udp] ← START seq={} (duplicate)", pkt.seq);
                    return Ok(ReceiveEvent::Started);
                }

                if let Some(stale) = shared.output.take() {
                    log::warn!(
                        "[udp] new START while {} is incomplete ({} bytes); closing it",
                        stale.path().display(),
                        stale.written()
                    );
                    stale.close().await?;
                }

                let name = sanitize_file_name(pkt.payload)?;
                let path = self.config.datagram_output_path(&name);
                shared.output = Some(OutputFile::create(path).await?);
                shared.start = Some((pkt.seq, pkt.payload.to_vec()));
                shared.receiver.anchor(pkt.seq);
                log::info!("[udp] ← START seq={} name={name:?}", pkt.seq);
                Ok(ReceiveEvent::Started)
            }

            PacketType::FileData => {
                let Shared {
                    receiver, output, ..
                } = &mut *shared;
                let out = output.as_mut().ok_or(TransferError::NoOpenFile)?;

                match receiver.accept(pkt.seq, pkt.payload) {
                    Accept::Buffered => {}
                    Accept::Duplicate => log::debug!("[udp] ← DATA seq={} (duplicate)", pkt.seq),
                    Accept::OutOfWindow => {
                        log::debug!("[udp] ← DATA seq={} outside receive window", pkt.seq)
                    }
                }
                for chunk in receiver.drain_ready() {
                    out.write(&chunk).await?;
                }
                log::debug!(
                    "[udp] ← DATA seq={} len={} expected_base={} held={}",
                    pkt.seq,
                    pkt.payload.len(),
                    receiver.expected_base,
                    receiver.buffered_len()
                );
                Ok(ReceiveEvent::DataWritten(pkt.seq))
            }

            PacketType::FileEnd => {
                if let Some(out) = shared.output.take() {
                    if shared.receiver.buffered_len() > 0 {
                        log::warn!(
                            "[udp] END with {} packet(s) still held behind a gap",
                            shared.receiver.buffered_len()
                        );
                    }
                    let (path, written) = out.close().await?;
                    log::info!("[udp] ← END; wrote {written} bytes to {}", path.display());
                }
                shared.start = None;
                Ok(ReceiveEvent::Finished)
            }

            PacketType::FileAck => {
                let fresh = shared.sender.on_ack(pkt.seq);
                drop(shared);
                if fresh {
                    log::debug!("[udp] ← ACK seq={}", pkt.seq);
                }
                self.ack_signal.notify_one();
                Ok(ReceiveEvent::AckObserved)
            }
        }
    }

    /// Send a `FileAck` echoing `seq_bytes` verbatim.  Fire-and-forget.
    pub fn send_ack<S: PacketSink>(&self, seq_bytes: SeqBytes, sink: &mut S) -> Result<()> {
        let ack = pack_with_raw_seq_bytes(PacketType::FileAck, seq_bytes, &[], self.config.packet_size)?;
        sink.send(&ack)?;
        log::trace!("[udp] → ACK seq={}", u16::from_be_bytes(seq_bytes));
        Ok(())
    }
}
