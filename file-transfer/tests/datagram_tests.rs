//! Integration tests for the reliable datagram engine.
//!
//! Each test runs a sending and a receiving `DatagramTransfer` in-process,
//! joined by two `SimulatedLink`s (data forward, acks backward).  The
//! receiver and the ack path each run in their own tokio task, so the
//! sender's ack-wait loop sees acks arrive concurrently, just as it would
//! over a socket.

use std::path::PathBuf;
use std::time::Duration;

use file_transfer::packet::{unpack_datagram, PacketType};
use file_transfer::simulator::{link, LinkStats, SimulatedLink, SimulatorConfig};
use file_transfer::state::SendPhase;
use file_transfer::{DatagramTransfer, SendReport, TransferConfig, TransferError};

// ---------------------------------------------------------------------------
// Helper
// ---------------------------------------------------------------------------

struct Outcome {
    report: SendReport,
    received: Vec<u8>,
    forward: LinkStats,
    phase: SendPhase,
}

fn fast_config(packet_size: usize, window_size: usize) -> TransferConfig {
    TransferConfig {
        packet_size,
        window_size,
        timeout: Duration::from_millis(30),
        poll_interval: Duration::from_millis(2),
        ..Default::default()
    }
}

fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 251) as u8).collect()
}

/// Send `data` from a fresh sender to a fresh receiver over the given links
/// and return what the receiver wrote.
async fn run_transfer(
    data: &[u8],
    config: TransferConfig,
    receiver_config: TransferConfig,
    mut forward: SimulatedLink,
    mut forward_rx: tokio::sync::mpsc::UnboundedReceiver<Vec<u8>>,
    mut backward: SimulatedLink,
    mut backward_rx: tokio::sync::mpsc::UnboundedReceiver<Vec<u8>>,
) -> Outcome {
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("payload.bin");
    tokio::fs::write(&src, data).await.unwrap();
    let out_dir = dir.path().join("out");
    tokio::fs::create_dir(&out_dir).await.unwrap();

    let sender = DatagramTransfer::new(config).unwrap();
    let receiver = DatagramTransfer::new(TransferConfig {
        output_dir: out_dir.clone(),
        ..receiver_config
    })
    .unwrap();

    let receive_task = tokio::spawn(async move {
        while let Some(packet) = forward_rx.recv().await {
            match receiver.receive(&packet, &mut backward).await {
                Ok(_) | Err(TransferError::NoOpenFile) => {}
                Err(e) => panic!("receiver failed: {e}"),
            }
        }
    });

    let ack_task = {
        let sender = sender.clone();
        tokio::spawn(async move {
            let mut no_reply = |_: &[u8]| -> std::io::Result<()> { Ok(()) };
            while let Some(packet) = backward_rx.recv().await {
                sender.receive(&packet, &mut no_reply).await.unwrap();
            }
        })
    };

    let forward_stats = forward.stats_handle();
    let report = tokio::time::timeout(Duration::from_secs(30), sender.send_file(&src, &mut forward))
        .await
        .expect("transfer timed out")
        .expect("send_file failed");
    let phase = sender.phase().await;

    drop(forward);
    receive_task.await.unwrap();
    ack_task.await.unwrap();

    let out: PathBuf = out_dir.join("(udp) payload.bin");
    let received = tokio::fs::read(&out).await.unwrap();
    let forward = *forward_stats.lock().unwrap();
    Outcome {
        report,
        received,
        forward,
        phase,
    }
}

async fn run_with(data: &[u8], config: TransferConfig, fwd: SimulatorConfig, back: SimulatorConfig) -> Outcome {
    let (forward, forward_rx) = link(fwd);
    let (backward, backward_rx) = link(back);
    run_transfer(data, config.clone(), config, forward, forward_rx, backward, backward_rx).await
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn clean_link_delivers_file() {
    let data = pattern(10_000);
    let out = run_with(
        &data,
        fast_config(128, 16),
        SimulatorConfig::default(),
        SimulatorConfig::default(),
    )
    .await;

    assert_eq!(out.received, data);
    assert_eq!(out.phase, SendPhase::Done);
    assert_eq!(out.report.bytes, 10_000);
    assert_eq!(out.report.data_packets, 10_000u64.div_ceil(123));
    assert_eq!(out.report.control_packets, 2);
    assert_eq!(out.report.retransmissions, 0);
}

/// 250 bytes at 64-byte packets, every 4th forward packet lost.
#[tokio::test]
async fn drop_every_fourth_packet() {
    let data = pattern(250);
    let out = run_with(
        &data,
        fast_config(64, 100),
        SimulatorConfig {
            drop_every: Some(4),
            ..Default::default()
        },
        SimulatorConfig::default(),
    )
    .await;

    assert_eq!(out.received, data);
    // ceil(250 / 59) data packets plus START and END.
    assert_eq!(out.report.data_packets, 5);
    assert!(out.report.data_packets + out.report.control_packets <= 7);
    assert!(out.report.retransmissions >= 1);
    assert!(out.forward.dropped >= 1);
}

/// The sender must not finish until the END ack gets through.
#[tokio::test]
async fn completion_waits_for_end_ack() {
    let data = pattern(250);
    let (forward, forward_rx) = link(SimulatorConfig::default());
    let (backward, backward_rx) = link(SimulatorConfig::default());

    // START = 0, DATA = 1..=5, END = 6.  Lose the first three acks for END.
    let mut lost = 0;
    let backward = backward.with_filter(move |packet, _| {
        let pkt = unpack_datagram(packet).unwrap();
        if pkt.packet_type == PacketType::FileAck && pkt.seq == 6 && lost < 3 {
            lost += 1;
            return true;
        }
        false
    });

    let config = fast_config(64, 100);
    let out = run_transfer(&data, config.clone(), config, forward, forward_rx, backward, backward_rx).await;

    assert_eq!(out.received, data);
    assert_eq!(out.phase, SendPhase::Done);
    assert!(out.report.retransmissions >= 3, "{:?}", out.report);
    // END itself was delivered four times.
    assert!(out.forward.delivered >= 1 + 5 + 4);
}

#[tokio::test]
async fn window_bounds_packets_in_flight() {
    let data = pattern(4_000);
    let out = run_with(
        &data,
        fast_config(64, 4),
        SimulatorConfig {
            loss_rate: 0.1,
            seed: 3,
            ..Default::default()
        },
        SimulatorConfig::default(),
    )
    .await;

    assert_eq!(out.received, data);
    assert!(out.report.peak_in_flight <= 4);
    assert_eq!(out.report.peak_in_flight, 4);
}

/// Windows are local settings; a receiver configured with a smaller one
/// must still buffer everything the sender has in flight behind a gap.
#[tokio::test]
async fn receiver_window_smaller_than_sender_window() {
    let data = pattern(3_000);
    let (forward, forward_rx) = link(SimulatorConfig::default());
    let (backward, backward_rx) = link(SimulatorConfig::default());

    // Lose the first copy of DATA seq 1, so seqs 2.. arrive ahead of a gap.
    let mut lost = false;
    let forward = forward.with_filter(move |packet, _| {
        let pkt = unpack_datagram(packet).unwrap();
        if pkt.packet_type == PacketType::FileData && pkt.seq == 1 && !lost {
            lost = true;
            return true;
        }
        false
    });

    let out = run_transfer(
        &data,
        fast_config(64, 16),
        fast_config(64, 4),
        forward,
        forward_rx,
        backward,
        backward_rx,
    )
    .await;

    assert_eq!(out.report.bytes, 3_000);
    assert_eq!(out.received.len(), 3_000);
    assert_eq!(out.received, data);
    assert!(out.report.retransmissions >= 1);
}

#[tokio::test]
async fn survives_loss_duplication_and_reordering() {
    for seed in [1u64, 2, 3] {
        let data = pattern(20_000);
        let faults = SimulatorConfig {
            loss_rate: 0.1,
            duplicate_rate: 0.1,
            reorder_rate: 0.2,
            seed,
            ..Default::default()
        };
        let back = SimulatorConfig {
            seed: seed + 100,
            ..faults.clone()
        };
        let out = run_with(&data, fast_config(128, 16), faults, back).await;

        assert_eq!(out.received, data, "seed {seed}");
        assert_eq!(out.phase, SendPhase::Done);
        assert!(out.report.peak_in_flight <= 16);
    }
}

#[tokio::test]
async fn empty_file_round_trip() {
    let out = run_with(
        &[],
        fast_config(64, 8),
        SimulatorConfig::default(),
        SimulatorConfig::default(),
    )
    .await;

    assert!(out.received.is_empty());
    assert_eq!(out.report.data_packets, 0);
    assert_eq!(out.report.control_packets, 2);
}

#[tokio::test]
async fn sequence_numbers_wrap_during_transfer() {
    // 70_000 packets of one byte each would be slow; use a tiny packet so
    // the transfer still crosses the 16-bit boundary in reasonable time.
    let data = pattern(66_000);
    let out = run_with(
        &data,
        fast_config(6, 256),
        SimulatorConfig::default(),
        SimulatorConfig::default(),
    )
    .await;

    assert_eq!(out.report.data_packets, 66_000);
    assert_eq!(out.received, data);
}
