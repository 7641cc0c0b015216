//! Listener and single active connection
//!
//! A newly accepted peer always wins: the previous connection is shut down
//! and released before the new one is installed. Each connection has its own
//! reader and writer task; the slot lock is never held across socket I/O.

use crate::tcp::{LineReadWrapper, RecordWriteWrapper};
use crate::transport::{LineReader, RecordWriter, ReaderExit, reader_task};
use chat_relay_core::{InboundFrame, RelayError, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Split a peer address string at its last colon
///
/// Input without a colon yields the whole string and an empty port.
pub fn split_peer_address(peer: &str) -> (String, String) {
    match peer.rfind(':') {
        Some(position) => (peer[..position].to_string(), peer[position + 1..].to_string()),
        None => (peer.to_string(), String::new()),
    }
}

/// Identity of the active connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    pub id: u64,
    pub remote_address: String,
    pub remote_port: String,
}

/// Records queued per connection before the peer counts as stalled
pub const OUTBOX_CAPACITY: usize = 64;

/// The active peer connection
struct Connection {
    info: ConnectionInfo,
    /// Queue drained by the writer task
    outbox: mpsc::Sender<Vec<u8>>,
    /// Background reader task handle
    reader_handle: JoinHandle<()>,
    /// Background writer task handle
    writer_handle: JoinHandle<()>,
}

impl Connection {
    /// Stop both tasks; dropping the halves closes the transport
    fn close(self) {
        self.reader_handle.abort();
        self.writer_handle.abort();
    }
}

/// Background writer task for one connection
///
/// Socket writes happen here only, so a peer that stops reading stalls this
/// task and nothing else.
async fn writer_task<W: RecordWriter>(
    mut writer: W,
    connection_id: u64,
    mut outbox: mpsc::Receiver<Vec<u8>>,
) -> Result<()> {
    while let Some(record) = outbox.recv().await {
        writer.write_record(&record).await?;
    }
    debug!("Outbox for connection {} closed", connection_id);
    writer.shutdown().await;
    Ok(())
}

/// State shared with the accept loop and connection tasks
struct Shared {
    active: Mutex<Option<Connection>>,
    frame_tx: mpsc::UnboundedSender<InboundFrame>,
    next_id: AtomicU64,
}

impl Shared {
    async fn install_tcp(self: &Arc<Self>, peer: &str, stream: TcpStream) -> u64 {
        if let Err(e) = stream.set_nodelay(true) {
            warn!("Failed to set TCP_NODELAY: {}", e);
        }
        let (read_half, write_half) = stream.into_split();
        self.install(
            peer,
            LineReadWrapper::new(read_half),
            RecordWriteWrapper(write_half),
        )
        .await
    }

    async fn install<R, W>(self: &Arc<Self>, peer: &str, reader: R, writer: W) -> u64
    where
        R: LineReader + 'static,
        W: RecordWriter + 'static,
    {
        let (remote_address, remote_port) = split_peer_address(peer);
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);

        let mut active = self.active.lock().await;
        if let Some(old) = active.take() {
            let old_id = old.info.id;
            old.close();
            warn!("Terminated an old connection ({})", old_id);
        }

        let shared = Arc::clone(self);
        let frame_tx = self.frame_tx.clone();
        let reader_handle = tokio::spawn(async move {
            match reader_task(reader, id, frame_tx).await {
                ReaderExit::Closed => info!("Peer closed connection {}", id),
                ReaderExit::Failed(e) => warn!("Connection {} read failed: {}", id, e),
                ReaderExit::Abandoned => {}
            }
            if let Some(conn) = shared.take_if(id).await {
                conn.writer_handle.abort();
                debug!("Released connection {}", id);
            }
        });

        let (outbox, outbox_rx) = mpsc::channel(OUTBOX_CAPACITY);
        let shared = Arc::clone(self);
        let writer_handle = tokio::spawn(async move {
            if let Err(e) = writer_task(writer, id, outbox_rx).await {
                warn!("Evicting connection {} after write failure: {}", id, e);
                if let Some(conn) = shared.take_if(id).await {
                    conn.reader_handle.abort();
                }
            }
        });

        info!(
            "Accepted connection {} from {}:{}",
            id, remote_address, remote_port
        );
        *active = Some(Connection {
            info: ConnectionInfo {
                id,
                remote_address,
                remote_port,
            },
            outbox,
            reader_handle,
            writer_handle,
        });

        id
    }

    /// Take the active connection out if it is still `id`
    ///
    /// Called from the connection's own tasks; the caller aborts the other
    /// task and the remaining handle is dropped without aborting itself.
    async fn take_if(&self, id: u64) -> Option<Connection> {
        let mut active = self.active.lock().await;
        if active.as_ref().is_some_and(|c| c.info.id == id) {
            active.take()
        } else {
            None
        }
    }
}

struct Listening {
    local_addr: SocketAddr,
    handle: JoinHandle<()>,
}

/// Owns the listening socket and at most one peer connection
pub struct Supervisor {
    shared: Arc<Shared>,
    listener: Mutex<Option<Listening>>,
}

impl Supervisor {
    /// Create a supervisor that forwards completed frames to `frame_tx`
    pub fn new(frame_tx: mpsc::UnboundedSender<InboundFrame>) -> Self {
        Self {
            shared: Arc::new(Shared {
                active: Mutex::new(None),
                frame_tx,
                next_id: AtomicU64::new(1),
            }),
            listener: Mutex::new(None),
        }
    }

    /// Bind and start accepting; no-op while a listener is running
    pub async fn start(&self, address: &str, port: u16) -> Result<SocketAddr> {
        let mut guard = self.listener.lock().await;
        if let Some(listening) = guard.as_ref() {
            if !listening.handle.is_finished() {
                return Ok(listening.local_addr);
            }
        }

        let listener = TcpListener::bind((address, port))
            .await
            .map_err(|e| RelayError::Bind(format!("{}:{}: {}", address, port, e)))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| RelayError::Bind(format!("{}:{}: {}", address, port, e)))?;

        info!("Listening for relay peer on {}", local_addr);

        let shared = Arc::clone(&self.shared);
        let handle = tokio::spawn(accept_loop(listener, shared));
        *guard = Some(Listening { local_addr, handle });

        Ok(local_addr)
    }

    /// Install any byte stream pair as the active connection
    pub async fn attach<R, W>(&self, peer: &str, reader: R, writer: W) -> u64
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        self.shared
            .install(peer, LineReadWrapper::new(reader), RecordWriteWrapper(writer))
            .await
    }

    /// Queue a record for the active connection
    ///
    /// Without a connection this does nothing. Never waits on the socket: a
    /// peer whose queue is full, or whose writer has died, is evicted and
    /// the failure is returned to the caller.
    pub async fn send(&self, record: &[u8]) -> Result<()> {
        let mut active = self.shared.active.lock().await;
        let Some(conn) = active.as_ref() else {
            return Ok(());
        };

        let error = match conn.outbox.try_send(record.to_vec()) {
            Ok(()) => return Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => RelayError::Transport(format!(
                "connection {} stalled with {} records queued",
                conn.info.id, OUTBOX_CAPACITY
            )),
            Err(mpsc::error::TrySendError::Closed(_)) => {
                RelayError::Transport(format!("connection {} writer closed", conn.info.id))
            }
        };

        if let Some(conn) = active.take() {
            warn!("Evicting connection {}: {}", conn.info.id, error);
            conn.close();
        }
        Err(error)
    }

    /// Close the active connection, if any
    pub async fn disconnect(&self) {
        if let Some(conn) = self.shared.active.lock().await.take() {
            info!("Disconnecting connection {}", conn.info.id);
            conn.close();
        }
    }

    /// Stop listening and drop the active connection
    pub async fn stop(&self) {
        if let Some(listening) = self.listener.lock().await.take() {
            listening.handle.abort();
            info!("Stopped listening on {}", listening.local_addr);
        }
        self.disconnect().await;
    }

    /// Whether the accept loop is running
    pub async fn is_listening(&self) -> bool {
        self.listener
            .lock()
            .await
            .as_ref()
            .is_some_and(|l| !l.handle.is_finished())
    }

    /// Address the listener is bound to
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.lock().await.as_ref().map(|l| l.local_addr)
    }

    /// Identity of the active connection
    pub async fn connection(&self) -> Option<ConnectionInfo> {
        self.shared
            .active
            .lock()
            .await
            .as_ref()
            .map(|c| c.info.clone())
    }
}

async fn accept_loop(listener: TcpListener, shared: Arc<Shared>) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                info!("Received a connection from {}", peer);
                shared.install_tcp(&peer.to_string(), stream).await;
            }
            Err(e) => {
                // The listener reports unhealthy from here on
                error!("Accept failed, listener stopping: {}", e);
                break;
            }
        }
    }
}
