use std::path::Path;

use thiserror::Error;

use crate::packet::{PacketError, PacketType};

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Malformed packet: {0}")]
    Packet(#[from] PacketError),
    #[error("Invalid file name: {0:?}")]
    InvalidFileName(String),
    #[error("No output file is open")]
    NoOpenFile,
    #[error("Unexpected {0} packet")]
    UnexpectedPacket(PacketType),
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error("Transport closed")]
    Closed,
}

pub type Result<T> = std::result::Result<T, TransferError>;

/// Reduce a received file name to its final path component.
///
/// Names that would escape the output directory or are empty are rejected.
pub fn sanitize_file_name(raw: &[u8]) -> Result<String> {
    let name = std::str::from_utf8(raw)
        .map_err(|_| TransferError::InvalidFileName(String::from_utf8_lossy(raw).into_owned()))?;
    Path::new(name)
        .file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.is_empty())
        .map(str::to_owned)
        .ok_or_else(|| TransferError::InvalidFileName(name.to_owned()))
}

/// Base name of a local path, as sent in a `FileStart` packet.
pub fn base_name(path: &Path) -> Result<String> {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_owned)
        .ok_or_else(|| TransferError::InvalidFileName(path.display().to_string()))
}
