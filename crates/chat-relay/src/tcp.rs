//! Stream transport implementation for the relay link
//!
//! Wraps any tokio byte stream; the TCP aliases are what the listener uses.

use crate::transport::{LineReader, RecordWriter};
use async_trait::async_trait;
use chat_relay_core::{RelayError, Result};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};

/// Longest inbound line accepted before the connection is dropped (64KB)
pub const MAX_LINE_LEN: usize = 64 * 1024;

/// Line read wrapper over a byte stream
pub struct LineReadWrapper<R>(pub BufReader<R>);

impl<R: AsyncRead + Unpin + Send> LineReadWrapper<R> {
    pub fn new(inner: R) -> Self {
        Self(BufReader::new(inner))
    }
}

#[async_trait]
impl<R: AsyncRead + Unpin + Send> LineReader for LineReadWrapper<R> {
    async fn read_line(&mut self) -> Result<Option<String>> {
        // Never buffer more than one byte past the cap
        let mut buf = Vec::new();
        let read = (&mut self.0)
            .take(MAX_LINE_LEN as u64 + 1)
            .read_until(b'\n', &mut buf)
            .await
            .map_err(|e| RelayError::Transport(format!("Read failed: {}", e)))?;

        if read == 0 {
            return Ok(None);
        }

        if buf.len() > MAX_LINE_LEN && buf.last() != Some(&b'\n') {
            return Err(RelayError::Transport(format!(
                "Line longer than {} bytes",
                MAX_LINE_LEN
            )));
        }

        if buf.last() == Some(&b'\n') {
            buf.pop();
        }
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }

        Ok(Some(String::from_utf8_lossy(&buf).into_owned()))
    }
}

/// Record write wrapper over a byte stream
pub struct RecordWriteWrapper<W>(pub W);

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> RecordWriter for RecordWriteWrapper<W> {
    async fn write_record(&mut self, record: &[u8]) -> Result<()> {
        self.0
            .write_all(record)
            .await
            .map_err(|e| RelayError::Transport(format!("Write failed: {}", e)))?;

        // Flush to ensure data is sent
        self.0
            .flush()
            .await
            .map_err(|e| RelayError::Transport(format!("Flush failed: {}", e)))?;

        Ok(())
    }

    async fn shutdown(&mut self) {
        let _ = self.0.shutdown().await;
    }
}

/// TCP read half as a line reader
pub type TcpLineReader = LineReadWrapper<OwnedReadHalf>;

/// TCP write half as a record writer
pub type TcpRecordWriter = RecordWriteWrapper<OwnedWriteHalf>;
