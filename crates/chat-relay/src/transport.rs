//! Transport abstractions for the relay link
//!
//! Provides LineReader/RecordWriter traits so the supervisor can drive
//! TCP sockets and in-memory streams the same way.

use crate::protocol::Accumulator;
use async_trait::async_trait;
use chat_relay_core::{InboundFrame, Result};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Trait for async reading of newline-delimited lines
#[async_trait]
pub trait LineReader: Send {
    /// Read the next line without its terminator
    /// Returns `None` once the peer closes the stream
    async fn read_line(&mut self) -> Result<Option<String>>;
}

/// Trait for async writing of complete wire records
#[async_trait]
pub trait RecordWriter: Send {
    /// Write one already-terminated record and flush it
    async fn write_record(&mut self, record: &[u8]) -> Result<()>;

    /// Close the write side of the transport
    async fn shutdown(&mut self);
}

/// Why a reader task stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReaderExit {
    /// Peer closed the stream
    Closed,
    /// Read failed
    Failed(String),
    /// Nobody is consuming frames any more
    Abandoned,
}

/// Background reader task for one connection
///
/// Owns the connection's accumulator, so partial frames die with the task.
/// Completed frames are pushed to `frame_tx` in arrival order.
pub async fn reader_task<R: LineReader>(
    mut reader: R,
    connection_id: u64,
    frame_tx: mpsc::UnboundedSender<InboundFrame>,
) -> ReaderExit {
    let mut accumulator = Accumulator::new();

    loop {
        match reader.read_line().await {
            Ok(Some(line)) => {
                debug!("[Peer→Bridge] conn={} line={}", connection_id, line);
                if let Some(frame) = accumulator.feed(&line) {
                    if frame_tx.send(frame).is_err() {
                        debug!("Frame channel closed, reader task exiting");
                        return ReaderExit::Abandoned;
                    }
                }
            }
            Ok(None) => {
                if !accumulator.is_empty() {
                    debug!(
                        "Connection {} closed with {} header lines pending",
                        connection_id,
                        accumulator.pending_lines()
                    );
                }
                return ReaderExit::Closed;
            }
            Err(e) => {
                warn!("Reader task for connection {} failed: {}", connection_id, e);
                return ReaderExit::Failed(e.to_string());
            }
        }
    }
}
