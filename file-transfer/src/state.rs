//! Transfer state types.
//!
//! [`SendPhase`] tracks where an outgoing datagram transfer is in its
//! lifecycle.  Transitions happen in [`crate::datagram`]; keeping the types
//! here lets the session layer and tests observe progress without reaching
//! into the engine.
//!
//! [`ReceiveEvent`] and [`StreamEvent`] are what the receive handlers report
//! back to the caller for each packet.

/// Lifecycle of an outgoing datagram transfer.
///
/// ```text
//  IDLE ──START sent──▶ AWAIT_START_ACK ──START acked──▶ SENDING
//    ▲                                                      │
//    │                                           file read  │
//    │                                              to EOF  ▼
//  DONE ◀──────────── END acked ◀───────────── AWAIT_FINAL_ACKS
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SendPhase {
    /// No transfer in progress.
    #[default]
    Idle,
    /// `FileStart` sent; nothing else is sent until it is acknowledged.
    AwaitStartAck,
    /// Streaming `FileData` while the window has room.
    Sending,
    /// File exhausted; draining the window and waiting for the `FileEnd` ack.
    AwaitFinalAcks,
    /// `FileEnd` acknowledged; the receiver has flushed every byte.
    Done,
}

impl std::fmt::Display for SendPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Outcome of feeding one datagram to [`crate::datagram::DatagramTransfer::receive`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiveEvent {
    /// A `FileStart` opened a new output file.
    Started,
    /// A `FileData` with this sequence number was accepted (or recognised as
    /// a duplicate); any newly contiguous data has been written.
    DataWritten(u16),
    /// A `FileEnd` closed the output file.
    Finished,
    /// A `FileAck` was applied to the sender side.
    AckObserved,
}

/// Outcome of feeding one packet to [`crate::stream::StreamTransfer::receive`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEvent {
    Started,
    DataWritten,
    Finished,
}
