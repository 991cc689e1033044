//! Transport adapters.
//!
//! [`PacketSink`] is the injected send function: the engine hands it one
//! packed packet at a time and never learns what carries it.  Any
//! `FnMut(&[u8]) -> io::Result<()>` closure is a sink.
//!
//! [`DatagramSocket`] is a thin wrapper around `tokio::net::UdpSocket` that
//! speaks fixed-size packets.  All protocol logic lives elsewhere; this
//! module owns only byte I/O.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::UdpSocket;

// ---------------------------------------------------------------------------
// PacketSink
// ---------------------------------------------------------------------------

/// Hands one packet to a transport.
pub trait PacketSink {
    fn send(&mut self, packet: &[u8]) -> io::Result<()>;
}

impl<F> PacketSink for F
where
    F: FnMut(&[u8]) -> io::Result<()>,
{
    fn send(&mut self, packet: &[u8]) -> io::Result<()> {
        self(packet)
    }
}

// ---------------------------------------------------------------------------
// DatagramSocket
// ---------------------------------------------------------------------------

/// A packet-oriented UDP socket.
///
/// Cloning is cheap and shares the underlying socket, so one task can
/// receive while another sends.
#[derive(Debug, Clone)]
pub struct DatagramSocket {
    /// Address this socket is bound to (filled in after OS assigns ephemeral port).
    pub local_addr: SocketAddr,
    inner: Arc<UdpSocket>,
    packet_size: usize,
}

impl DatagramSocket {
    /// Bind a new socket to `local_addr`.
    ///
    /// Passing `0.0.0.0:0` lets the OS choose an ephemeral port.
    pub async fn bind(local_addr: SocketAddr, packet_size: usize) -> io::Result<Self> {
        let inner = UdpSocket::bind(local_addr).await?;
        let local_addr = inner.local_addr()?;
        Ok(Self {
            local_addr,
            inner: Arc::new(inner),
            packet_size,
        })
    }

    /// Receive the next datagram.
    ///
    /// Datagrams longer than `packet_size` are truncated by the OS; shorter
    /// ones are returned as-is and left for the codec to reject.
    pub async fn recv_from(&self) -> io::Result<(Vec<u8>, SocketAddr)> {
        let mut buf = vec![0u8; self.packet_size];
        let (n, addr) = self.inner.recv_from(&mut buf).await?;
        buf.truncate(n);
        Ok((buf, addr))
    }

    /// A sink that sends every packet to `peer`.
    pub fn sink_to(&self, peer: SocketAddr) -> UdpSink {
        UdpSink {
            socket: Arc::clone(&self.inner),
            peer,
        }
    }
}

/// Fire-and-forget datagram sink bound to one peer.
#[derive(Debug, Clone)]
pub struct UdpSink {
    socket: Arc<UdpSocket>,
    peer: SocketAddr,
}

impl PacketSink for UdpSink {
    /// Send without waiting for socket readiness.
    ///
    /// A full send buffer is indistinguishable from packet loss to the
    /// protocol, so `WouldBlock` is logged and reported as success; the
    /// retransmission timer recovers the packet.
    fn send(&mut self, packet: &[u8]) -> io::Result<()> {
        match self.socket.try_send_to(packet, self.peer) {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                log::warn!("[udp] send buffer full; dropping packet to {}", self.peer);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}
