//! End-to-end transfers over real sockets.
//!
//! These runners own the transport plumbing the engines leave out: binding,
//! the receive loop that feeds packets in, and deciding when a transfer is
//! over.

use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::Instant;

use crate::config::TransferConfig;
use crate::datagram::{DatagramTransfer, SendReport};
use crate::error::{Result, TransferError};
use crate::packet::{extract_seq_bytes, unpack_datagram, PacketType};
use crate::socket::DatagramSocket;
use crate::state::ReceiveEvent;
use crate::stream::{receive_all, StreamTransfer};

/// Send one file to `peer` over UDP.
pub async fn send_datagram_file(
    path: impl AsRef<Path>,
    peer: SocketAddr,
    config: TransferConfig,
) -> Result<SendReport> {
    let transfer = DatagramTransfer::new(config)?;
    let local: SocketAddr = if peer.is_ipv4() {
        ([0, 0, 0, 0], 0).into()
    } else {
        (std::net::Ipv6Addr::UNSPECIFIED, 0).into()
    };
    let socket = DatagramSocket::bind(local, transfer.config().packet_size).await?;
    log::info!("[udp] bound {} → {peer}", socket.local_addr);

    let ack_loop = {
        let transfer = transfer.clone();
        let socket = socket.clone();
        tokio::spawn(async move {
            let mut sink = socket.sink_to(peer);
            loop {
                match socket.recv_from().await {
                    Ok((packet, from)) if from == peer => {
                        if let Err(e) = transfer.receive(&packet, &mut sink).await {
                            log::warn!("[udp] bad packet from {from}: {e}");
                        }
                    }
                    Ok((_, from)) => log::debug!("[udp] ignoring datagram from {from}"),
                    Err(e) if is_transient(&e) => continue,
                    Err(e) => {
                        log::warn!("[udp] ack loop stopped: {e}");
                        break;
                    }
                }
            }
        })
    };

    let mut sink = socket.sink_to(peer);
    let result = transfer.send_file(path, &mut sink).await;
    ack_loop.abort();
    result
}

/// Receive one file over UDP on `socket`; returns the path written.
///
/// After the `FileEnd` the socket keeps answering retransmissions for twice
/// the timeout, so a lost final ack does not strand the sender.
pub async fn receive_datagram_file(
    socket: &DatagramSocket,
    config: TransferConfig,
) -> Result<PathBuf> {
    let transfer = DatagramTransfer::new(config)?;
    log::info!("[udp] listening on {}", socket.local_addr);

    let mut written = None;
    let path = loop {
        let (packet, from) = match socket.recv_from().await {
            Ok(recv) => recv,
            Err(e) if is_transient(&e) => continue,
            Err(e) => return Err(e.into()),
        };
        let mut sink = socket.sink_to(from);
        match transfer.receive(&packet, &mut sink).await {
            Ok(ReceiveEvent::Started) => written = transfer.output_path().await,
            Ok(ReceiveEvent::Finished) => {
                if let Some(path) = written.take() {
                    break path;
                }
            }
            Ok(_) => {}
            Err(TransferError::Packet(e)) => log::warn!("[udp] malformed packet from {from}: {e}"),
            Err(TransferError::NoOpenFile) => {
                log::warn!("[udp] data from {from} with no transfer in progress")
            }
            Err(e) => return Err(e),
        }
    };

    linger(socket, &transfer).await;
    Ok(path)
}

/// Re-acknowledge stray retransmissions until the socket has been quiet
/// long enough for the sender to have seen the final ack.
async fn linger(socket: &DatagramSocket, transfer: &DatagramTransfer) {
    let deadline = Instant::now() + transfer.config().timeout * 2;
    while let Ok(recv) = tokio::time::timeout_at(deadline, socket.recv_from()).await {
        let Ok((packet, from)) = recv else { continue };
        let Ok(pkt) = unpack_datagram(&packet) else { continue };
        if pkt.packet_type == PacketType::FileAck {
            continue;
        }
        if let Ok(seq_bytes) = extract_seq_bytes(&packet) {
            log::debug!("[udp] late {} seq={} from {from}; re-acking", pkt.packet_type, pkt.seq);
            if let Err(e) = transfer.send_ack(seq_bytes, &mut socket.sink_to(from)) {
                log::debug!("[udp] re-ack to {from} failed: {e}");
            }
        }
    }
}

/// Send one file to `addr` over TCP; returns the file bytes sent.
pub async fn send_stream_file(
    path: impl AsRef<Path>,
    addr: SocketAddr,
    config: TransferConfig,
) -> Result<u64> {
    let transfer = StreamTransfer::new(config)?;
    let mut stream = TcpStream::connect(addr).await?;
    log::info!("[tcp] connected to {addr}");
    let sent = transfer.send(path, &mut stream).await?;
    stream.shutdown().await?;
    Ok(sent)
}

/// Accept one connection on `listener` and receive one file from it.
pub async fn receive_stream_file(listener: &TcpListener, config: TransferConfig) -> Result<PathBuf> {
    let mut transfer = StreamTransfer::new(config)?;
    let (stream, from) = listener.accept().await?;
    log::info!("[tcp] accepted {from}");
    let mut reader = BufReader::new(stream);
    receive_all(&mut transfer, &mut reader).await
}

/// ICMP errors surfaced on a later `recv` by some platforms.
fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionRefused
    )
}
