//! `file-transfer`: send a file over TCP as-is, or over UDP with a
//! selective-repeat reliability layer.
//!
//! # Architecture
//!
//! ```text
//!              ┌──────────────────┐            ┌──────────────────┐
//!   file ────▶ │ DatagramTransfer │  DATA/END  │ DatagramTransfer │ ────▶ file
//!              │   SenderState    │───────────▶│  ReceiverState   │
//!              │   (window, RTO)  │◀───────────│  (reassembly)    │
//!              └────────┬─────────┘    ACKs    └────────┬─────────┘
//!                       │ PacketSink                    │ PacketSink
//!              ┌────────▼─────────┐            ┌────────▼─────────┐
//!              │  DatagramSocket  │   UDP      │  DatagramSocket  │
//!              └──────────────────┘            └──────────────────┘
//!
//!   StreamTransfer ──START/DATA/sentinel──▶ TcpStream ──▶ StreamTransfer
//! ```
//!
//! Each module has a single responsibility:
//! - [`packet`]      — wire formats for both transports (pack / unpack)
//! - [`config`]      — tunable parameters and their validation
//! - [`error`]       — crate-wide error type
//! - [`state`]       — sender lifecycle and receive-event types
//! - [`sr_sender`]   — selective-repeat send window state
//! - [`sr_receiver`] — selective-repeat reassembly state
//! - [`timer`]       — retransmit timeout and ack-wait timing
//! - [`datagram`]    — the reliable datagram engine
//! - [`stream`]      — framed transfer over a reliable stream
//! - [`fileio`]      — output file handle and chunked reads
//! - [`socket`]      — `PacketSink` and the async UDP socket wrapper
//! - [`session`]     — end-to-end runners over real sockets
//! - [`simulator`]   — lossy/reordering link for tests

pub mod config;
pub mod datagram;
pub mod error;
pub mod fileio;
pub mod packet;
pub mod session;
pub mod simulator;
pub mod socket;
pub mod sr_receiver;
pub mod sr_sender;
pub mod state;
pub mod stream;
pub mod timer;

pub use config::TransferConfig;
pub use datagram::{DatagramTransfer, SendReport};
pub use error::{Result, TransferError};
pub use packet::PacketType;
pub use socket::PacketSink;
pub use stream::StreamTransfer;
