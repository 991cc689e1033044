//! File handle helpers shared by both transports.

use std::path::{Path, PathBuf};

use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt, BufWriter};

/// An output file owned by the active receive transfer.
#[derive(Debug)]
pub struct OutputFile {
    path: PathBuf,
    writer: BufWriter<File>,
    written: u64,
}

impl OutputFile {
    /// Create (or truncate) the file at `path`.
    pub async fn create(path: PathBuf) -> std::io::Result<Self> {
        let file = File::create(&path).await?;
        Ok(Self {
            path,
            writer: BufWriter::new(file),
            written: 0,
        })
    }

    pub async fn write(&mut self, data: &[u8]) -> std::io::Result<()> {
        self.writer.write_all(data).await?;
        self.written += data.len() as u64;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Bytes written so far.
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Flush buffered data and release the handle.
    pub async fn close(mut self) -> std::io::Result<(PathBuf, u64)> {
        self.writer.flush().await?;
        Ok((self.path, self.written))
    }
}

/// Read up to `len` bytes, stopping early only at end of file.
///
/// An empty result means the reader is exhausted.
pub async fn read_chunk<R>(reader: &mut R, len: usize) -> std::io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; len];
    let mut filled = 0;
    while filled < len {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    buf.truncate(filled);
    Ok(buf)
}
