//! Wire-format definitions for both transports.
//!
//! Every packet exchanged by either transport is a fixed-size buffer of
//! exactly `packet_size` bytes.  This module is responsible for:
//! - Defining the two on-wire layouts (stream-framed and datagram-framed).
//! - Packing a packet type, optional sequence number and payload into a
//!   zero-padded buffer.
//! - Unpacking a raw buffer back into its fields, returning errors for
//!   malformed or truncated input.
//!
//! No I/O happens here; this is pure data transformation.
//!
//! # Wire format
//!
//! All multi-byte integers are **big-endian**.
//!
//! Stream format (header = [`STREAM_HEADER_LEN`] = 3 bytes):
//!
//! ```text
//!  0               1               2
//!  0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+- ... -+
//! |     Type      |         Payload Length        | Payload, zero pad |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+- ... -+
//! ```
//!
//! Datagram format (header = [`DATAGRAM_HEADER_LEN`] = 5 bytes):
//!
//! ```text
//!  0               1               2               3               4
//!  0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 ...
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+- ...
//! |     Type      |        Sequence Number        |  Payload Length ...
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+- ...
//! ```
//!
//! followed by `length` payload bytes and zero padding up to `packet_size`.

use std::fmt;

/// Byte length of the stream-format header: type(1) + length(2).
pub const STREAM_HEADER_LEN: usize = 3;

/// Byte length of the datagram-format header: type(1) + seq(2) + length(2).
pub const DATAGRAM_HEADER_LEN: usize = 5;

/// Size of the sequence-number space (`MAX_ACK_NUM`).  Sequence numbers are
/// `u16` and wrap modulo this value.
pub const SEQ_SPACE: usize = 1 << 16;

// Byte offsets within the stream header.
const OFF_TYPE: usize = 0;
const OFF_STREAM_LEN: usize = 1;

// Byte offsets within the datagram header.
const OFF_SEQ: usize = 1;
const OFF_DATAGRAM_LEN: usize = 3;

/// The undecoded 2-byte sequence field, echoed verbatim in acknowledgments.
pub type SeqBytes = [u8; 2];

/// Closed set of packet types shared by both formats.
///
/// `FileAck` only appears on the datagram transport.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketType {
    /// Payload is the UTF-8 encoded base filename.
    FileStart = 0x00,
    /// Payload is a raw file chunk.
    FileData = 0x01,
    /// Empty payload; marks the end of the file.
    FileEnd = 0x02,
    /// Empty payload; the sequence field names the acknowledged packet.
    FileAck = 0x03,
}

impl TryFrom<u8> for PacketType {
    type Error = PacketError;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        match byte {
            0x00 => Ok(Self::FileStart),
            0x01 => Ok(Self::FileData),
            0x02 => Ok(Self::FileEnd),
            0x03 => Ok(Self::FileAck),
            other => Err(PacketError::UnknownType(other)),
        }
    }
}

impl fmt::Display for PacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::FileStart => "START",
            Self::FileData => "DATA",
            Self::FileEnd => "END",
            Self::FileAck => "ACK",
        };
        f.write_str(name)
    }
}

/// A decoded stream-format packet borrowing its payload from the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamPacket<'a> {
    pub packet_type: PacketType,
    pub payload: &'a [u8],
}

/// A decoded datagram-format packet borrowing its payload from the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatagramPacket<'a> {
    pub packet_type: PacketType,
    pub seq: u16,
    pub payload: &'a [u8],
}

/// Maximum payload a stream packet of `packet_size` bytes can carry.
pub fn stream_payload_capacity(packet_size: usize) -> usize {
    packet_size.saturating_sub(STREAM_HEADER_LEN)
}

/// Maximum payload a datagram packet of `packet_size` bytes can carry.
pub fn datagram_payload_capacity(packet_size: usize) -> usize {
    packet_size.saturating_sub(DATAGRAM_HEADER_LEN)
}

/// Pack a stream-format packet, zero-padded to exactly `packet_size` bytes.
///
/// Returns [`PacketError::PayloadTooLarge`] when
/// `data.len() + STREAM_HEADER_LEN > packet_size`.
pub fn pack_stream(
    packet_type: PacketType,
    data: &[u8],
    packet_size: usize,
) -> Result<Vec<u8>, PacketError> {
    let len = checked_len(data, STREAM_HEADER_LEN, packet_size)?;
    let mut buf = vec![0u8; packet_size];

    buf[OFF_TYPE] = packet_type as u8;
    buf[OFF_STREAM_LEN..OFF_STREAM_LEN + 2].copy_from_slice(&len.to_be_bytes());
    buf[STREAM_HEADER_LEN..STREAM_HEADER_LEN + data.len()].copy_from_slice(data);

    Ok(buf)
}

/// Unpack a stream-format packet.
///
/// Only the declared `length` bytes of payload are returned; padding is
/// never read.
pub fn unpack_stream(packet: &[u8]) -> Result<StreamPacket<'_>, PacketError> {
    if packet.len() < STREAM_HEADER_LEN {
        return Err(PacketError::BufferTooShort);
    }

    let packet_type = PacketType::try_from(packet[OFF_TYPE])?;
    let len = read_u16(packet, OFF_STREAM_LEN) as usize;
    let payload = packet
        .get(STREAM_HEADER_LEN..STREAM_HEADER_LEN + len)
        .ok_or(PacketError::LengthOverflow)?;

    Ok(StreamPacket {
        packet_type,
        payload,
    })
}

/// Pack a datagram-format packet carrying the integer sequence number `seq`.
pub fn pack_with_seq_number(
    packet_type: PacketType,
    seq: u16,
    data: &[u8],
    packet_size: usize,
) -> Result<Vec<u8>, PacketError> {
    pack_with_raw_seq_bytes(packet_type, seq.to_be_bytes(), data, packet_size)
}

/// Pack a datagram-format packet whose sequence field is copied verbatim
/// from `seq_bytes` (used to echo a received sequence field in an ack).
pub fn pack_with_raw_seq_bytes(
    packet_type: PacketType,
    seq_bytes: SeqBytes,
    data: &[u8],
    packet_size: usize,
) -> Result<Vec<u8>, PacketError> {
    let len = checked_len(data, DATAGRAM_HEADER_LEN, packet_size)?;
    let mut buf = vec![0u8; packet_size];

    buf[OFF_TYPE] = packet_type as u8;
    buf[OFF_SEQ..OFF_SEQ + 2].copy_from_slice(&seq_bytes);
    buf[OFF_DATAGRAM_LEN..OFF_DATAGRAM_LEN + 2].copy_from_slice(&len.to_be_bytes());
    buf[DATAGRAM_HEADER_LEN..DATAGRAM_HEADER_LEN + data.len()].copy_from_slice(data);

    Ok(buf)
}

/// Unpack a datagram-format packet.
pub fn unpack_datagram(packet: &[u8]) -> Result<DatagramPacket<'_>, PacketError> {
    if packet.len() < DATAGRAM_HEADER_LEN {
        return Err(PacketError::BufferTooShort);
    }

    let packet_type = PacketType::try_from(packet[OFF_TYPE])?;
    let seq = read_u16(packet, OFF_SEQ);
    let len = read_u16(packet, OFF_DATAGRAM_LEN) as usize;
    let payload = packet
        .get(DATAGRAM_HEADER_LEN..DATAGRAM_HEADER_LEN + len)
        .ok_or(PacketError::LengthOverflow)?;

    Ok(DatagramPacket {
        packet_type,
        seq,
        payload,
    })
}

/// Return the raw 2-byte sequence field of a datagram packet without
/// decoding it.
pub fn extract_seq_bytes(packet: &[u8]) -> Result<SeqBytes, PacketError> {
    if packet.len() < OFF_SEQ + 2 {
        return Err(PacketError::BufferTooShort);
    }
    Ok([packet[OFF_SEQ], packet[OFF_SEQ + 1]])
}

/// Validate that `data` fits behind a header of `header_len` bytes and
/// return its length as the 16-bit wire value.
fn checked_len(data: &[u8], header_len: usize, packet_size: usize) -> Result<u16, PacketError> {
    if data.len() + header_len > packet_size {
        return Err(PacketError::PayloadTooLarge {
            len: data.len(),
            capacity: packet_size.saturating_sub(header_len),
        });
    }
    u16::try_from(data.len()).map_err(|_| PacketError::PayloadTooLarge {
        len: data.len(),
        capacity: u16::MAX as usize,
    })
}

#[inline]
fn read_u16(buf: &[u8], off: usize) -> u16 {
    u16::from_be_bytes([buf[off], buf[off + 1]])
}

/// Errors that can arise when packing or unpacking a packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PacketError {
    /// Buffer shorter than the fixed header size.
    BufferTooShort,
    /// The declared payload length runs past the end of the buffer.
    LengthOverflow,
    /// Payload does not fit in one packet.
    PayloadTooLarge { len: usize, capacity: usize },
    /// The type byte is not one of the four known packet types.
    UnknownType(u8),
}

impl fmt::Display for PacketError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PacketError::BufferTooShort => write!(f, "buffer too short to contain a header"),
            PacketError::LengthOverflow => {
                write!(f, "declared payload length exceeds the packet buffer")
            }
            PacketError::PayloadTooLarge { len, capacity } => {
                write!(f, "payload of {len} bytes exceeds packet capacity of {capacity}")
            }
            PacketError::UnknownType(t) => write!(f, "unknown packet type 0x{t:02x}"),
        }
    }
}

impl std::error::Error for PacketError {}

#[cfg(test)]
mod tests {
    use super::*;

    const SIZE: usize = 64;

    #[test]
    fn stream_roundtrip() {
        let bytes = pack_stream(PacketType::FileData, b"hello", SIZE).unwrap();
        let pkt = unpack_stream(&bytes).unwrap();
        assert_eq!(pkt.packet_type, PacketType::FileData);
        assert_eq!(pkt.payload, b"hello");
    }

    #[test]
    fn datagram_roundtrip() {
        let bytes = pack_with_seq_number(PacketType::FileData, 4242, b"chunk", SIZE).unwrap();
        let pkt = unpack_datagram(&bytes).unwrap();
        assert_eq!(pkt.packet_type, PacketType::FileData);
        assert_eq!(pkt.seq, 4242);
        assert_eq!(pkt.payload, b"chunk");
    }

    #[test]
    fn packed_length_is_always_packet_size() {
        for n in [0usize, 1, 30, SIZE - DATAGRAM_HEADER_LEN] {
            let data = vec![0xabu8; n];
            assert_eq!(pack_with_seq_number(PacketType::FileData, 1, &data, SIZE).unwrap().len(), SIZE);
        }
        for n in [0usize, 1, SIZE - STREAM_HEADER_LEN] {
            let data = vec![0xcdu8; n];
            assert_eq!(pack_stream(PacketType::FileData, &data, SIZE).unwrap().len(), SIZE);
        }
    }

    #[test]
    fn datagram_payload_at_capacity_fits() {
        let data = vec![7u8; datagram_payload_capacity(SIZE)];
        let bytes = pack_with_seq_number(PacketType::FileData, 0, &data, SIZE).unwrap();
        assert_eq!(unpack_datagram(&bytes).unwrap().payload, &data[..]);
    }

    #[test]
    fn oversized_payload_rejected() {
        let data = vec![0u8; SIZE - DATAGRAM_HEADER_LEN + 1];
        assert_eq!(
            pack_with_seq_number(PacketType::FileData, 0, &data, SIZE),
            Err(PacketError::PayloadTooLarge {
                len: data.len(),
                capacity: SIZE - DATAGRAM_HEADER_LEN,
            })
        );
        let data = vec![0u8; SIZE - STREAM_HEADER_LEN + 1];
        assert!(matches!(
            pack_stream(PacketType::FileData, &data, SIZE),
            Err(PacketError::PayloadTooLarge { .. })
        ));
    }

    #[test]
    fn header_fields_big_endian_on_wire() {
        let bytes = pack_with_seq_number(PacketType::FileStart, 0x0102, b"abc", SIZE).unwrap();
        assert_eq!(bytes[OFF_TYPE], 0x00);
        assert_eq!(&bytes[OFF_SEQ..OFF_SEQ + 2], &[0x01, 0x02]);
        assert_eq!(&bytes[OFF_DATAGRAM_LEN..OFF_DATAGRAM_LEN + 2], &[0x00, 0x03]);
        assert_eq!(&bytes[DATAGRAM_HEADER_LEN..DATAGRAM_HEADER_LEN + 3], b"abc");
        assert!(bytes[DATAGRAM_HEADER_LEN + 3..].iter().all(|&b| b == 0));
    }

    #[test]
    fn raw_seq_bytes_match_integer_encoding() {
        let by_int = pack_with_seq_number(PacketType::FileAck, 513, b"", SIZE).unwrap();
        let by_raw = pack_with_raw_seq_bytes(PacketType::FileAck, [0x02, 0x01], b"", SIZE).unwrap();
        assert_eq!(by_int, by_raw);
        assert_eq!(extract_seq_bytes(&by_int).unwrap(), [0x02, 0x01]);
    }

    #[test]
    fn stream_end_sentinel_is_type_byte_then_zeros() {
        let bytes = pack_stream(PacketType::FileEnd, b"", SIZE).unwrap();
        assert_eq!(bytes.len(), SIZE);
        assert_eq!(bytes[0], PacketType::FileEnd as u8);
        assert!(bytes[1..].iter().all(|&b| b == 0));
    }

    #[test]
    fn unpack_ignores_padding() {
        let mut bytes = pack_stream(PacketType::FileData, b"xy", SIZE).unwrap();
        bytes[SIZE - 1] = 0xff;
        assert_eq!(unpack_stream(&bytes).unwrap().payload, b"xy");
    }

    #[test]
    fn declared_length_past_buffer_rejected() {
        let mut bytes = pack_with_seq_number(PacketType::FileData, 9, b"data", SIZE).unwrap();
        bytes[OFF_DATAGRAM_LEN..OFF_DATAGRAM_LEN + 2].copy_from_slice(&(SIZE as u16).to_be_bytes());
        assert_eq!(unpack_datagram(&bytes), Err(PacketError::LengthOverflow));

        let mut bytes = pack_stream(PacketType::FileData, b"data", SIZE).unwrap();
        bytes[OFF_STREAM_LEN..OFF_STREAM_LEN + 2].copy_from_slice(&u16::MAX.to_be_bytes());
        assert_eq!(unpack_stream(&bytes), Err(PacketError::LengthOverflow));
    }

    #[test]
    fn short_buffers_rejected() {
        assert_eq!(unpack_stream(&[]), Err(PacketError::BufferTooShort));
        assert_eq!(unpack_datagram(&[0x01, 0x00, 0x00, 0x00]), Err(PacketError::BufferTooShort));
        assert_eq!(extract_seq_bytes(&[0x03, 0x00]), Err(PacketError::BufferTooShort));
    }

    #[test]
    fn unknown_type_rejected() {
        let mut bytes = pack_stream(PacketType::FileData, b"", SIZE).unwrap();
        bytes[OFF_TYPE] = 0x7f;
        assert_eq!(unpack_stream(&bytes), Err(PacketError::UnknownType(0x7f)));
    }
}
