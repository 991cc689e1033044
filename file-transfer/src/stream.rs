//! File transfer over an already-reliable, ordered byte stream.
//!
//! The sender writes `FileStart`, one `FileData` per chunk, then the end
//! sentinel: a `FileEnd` packet whose body is all zeroes.  The receiver
//! applies packets in arrival order; there are no sequence numbers and no
//! acknowledgments because the transport already provides both.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use crate::config::TransferConfig;
use crate::error::{base_name, sanitize_file_name, Result, TransferError};
use crate::fileio::{read_chunk, OutputFile};
use crate::packet::{pack_stream, stream_payload_capacity, unpack_stream, PacketType};
use crate::state::StreamEvent;

/// One endpoint of the stream transport.
#[derive(Debug)]
pub struct StreamTransfer {
    config: Arc<TransferConfig>,
    output: Option<OutputFile>,
}

impl StreamTransfer {
    pub fn new(config: TransferConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config: Arc::new(config),
            output: None,
        })
    }

    pub fn config(&self) -> &TransferConfig {
        &self.config
    }

    /// Path of the file currently being received, if any.
    pub fn output_path(&self) -> Option<&Path> {
        self.output.as_ref().map(OutputFile::path)
    }

    /// Send the file at `path` and return the number of file bytes written.
    pub async fn send<W>(&self, path: impl AsRef<Path>, writer: &mut W) -> Result<u64>
    where
        W: AsyncWrite + Unpin,
    {
        let path = path.as_ref();
        let name = base_name(path)?;
        let mut file = BufReader::new(File::open(path).await?);
        let size = self.config.packet_size;
        let chunk_len = stream_payload_capacity(size);

        log::info!("[tcp] sending {} as {name:?}", path.display());
        writer
            .write_all(&pack_stream(PacketType::FileStart, name.as_bytes(), size)?)
            .await?;

        let mut sent = 0u64;
        loop {
            let chunk = read_chunk(&mut file, chunk_len).await?;
            if chunk.is_empty() {
                break;
            }
            writer
                .write_all(&pack_stream(PacketType::FileData, &chunk, size)?)
                .await?;
            sent += chunk.len() as u64;
            log::debug!("[tcp] → DATA len={}", chunk.len());
        }

        writer.write_all(&end_sentinel(size)?).await?;
        writer.flush().await?;
        log::info!("[tcp] sent {name:?}: {sent} bytes");
        Ok(sent)
    }

    /// Apply one packet from the stream.
    pub async fn receive(&mut self, packet: &[u8]) -> Result<StreamEvent> {
        let pkt = unpack_stream(packet)?;
        match pkt.packet_type {
            PacketType::FileStart => {
                if let Some(stale) = self.output.take() {
                    log::warn!(
                        "[tcp] new START while {} is incomplete; closing it",
                        stale.path().display()
                    );
                    stale.close().await?;
                }
                let name = sanitize_file_name(pkt.payload)?;
                let path = self.config.stream_output_path(&name);
                self.output = Some(OutputFile::create(path).await?);
                log::info!("[tcp] ← START name={name:?}");
                Ok(StreamEvent::Started)
            }
            PacketType::FileData => {
                let out = self.output.as_mut().ok_or(TransferError::NoOpenFile)?;
                out.write(pkt.payload).await?;
                log::debug!("[tcp] ← DATA len={}", pkt.payload.len());
                Ok(StreamEvent::DataWritten)
            }
            PacketType::FileEnd => {
                if let Some(out) = self.output.take() {
                    let (path, written) = out.close().await?;
                    log::info!("[tcp] ← END; wrote {written} bytes to {}", path.display());
                }
                Ok(StreamEvent::Finished)
            }
            PacketType::FileAck => Err(TransferError::UnexpectedPacket(PacketType::FileAck)),
        }
    }
}

/// The stream terminator: a `FileEnd` packet with a fully zeroed body.
pub fn end_sentinel(packet_size: usize) -> Result<Vec<u8>> {
    Ok(pack_stream(PacketType::FileEnd, &[], packet_size)?)
}

/// Read exactly one `packet_size` packet from `reader`.
///
/// Returns `Ok(None)` on a clean end of stream between packets; a stream
/// that ends mid-packet is an error.
pub async fn read_packet<R>(reader: &mut R, packet_size: usize) -> Result<Option<Vec<u8>>>
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; packet_size];
    let mut filled = 0;
    while filled < packet_size {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            if filled == 0 {
                return Ok(None);
            }
            return Err(TransferError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!("stream closed after {filled} of {packet_size} bytes"),
            )));
        }
        filled += n;
    }
    Ok(Some(buf))
}

/// Run the receive side until the end sentinel; returns the written path.
pub async fn receive_all<R>(transfer: &mut StreamTransfer, reader: &mut R) -> Result<PathBuf>
where
    R: AsyncRead + Unpin,
{
    let size = transfer.config.packet_size;
    let mut path = None;
    while let Some(packet) = read_packet(reader, size).await? {
        if let StreamEvent::Started = transfer.receive(&packet).await? {
            path = transfer.output_path().map(Path::to_path_buf);
        }
        if transfer.output.is_none() {
            if let Some(path) = path.take() {
                return Ok(path);
            }
        }
    }
    Err(TransferError::Closed)
}
