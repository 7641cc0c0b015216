//! Bridge facade: one bridge instance with its listener, connection and timer
//!
//! Host events are encoded and written to the active connection, if any.
//! Frames from the peer are broadcast to local participants.

use crate::heartbeat::{TickFuture, TimerSlot};
use crate::host::Host;
use crate::protocol::encode;
use crate::supervisor::{ConnectionInfo, Supervisor};
use chat_relay_core::{InboundFrame, OutboundEvent, RelayConfig, RelayError, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// A single bridge instance
pub struct Bridge {
    /// Instance number, unique per relay
    instance: u64,
    config: RelayConfig,
    host: Arc<dyn Host>,
    /// Listener and active connection
    supervisor: Supervisor,
    /// Pending heartbeat timer
    heartbeat: TimerSlot,
    stopped: AtomicBool,
    /// Inbound frame dispatch task
    forwarder: JoinHandle<()>,
}

impl Bridge {
    /// Create a bridge instance (not listening yet)
    pub fn new(instance: u64, config: RelayConfig, host: Arc<dyn Host>) -> Self {
        let (frame_tx, mut frame_rx) = mpsc::unbounded_channel::<InboundFrame>();

        let forward_host = Arc::clone(&host);
        let forwarder = tokio::spawn(async move {
            while let Some(frame) = frame_rx.recv().await {
                deliver(forward_host.as_ref(), &frame);
            }
            debug!("Frame channel closed, forwarder exiting");
        });

        Self {
            instance,
            config,
            host,
            supervisor: Supervisor::new(frame_tx),
            heartbeat: TimerSlot::new(),
            stopped: AtomicBool::new(false),
            forwarder,
        }
    }

    /// Bind the listener from configuration
    pub async fn start(&self) -> Result<SocketAddr> {
        info!(
            "Bridge {}: initializing server socket on {}",
            self.instance,
            self.config.listen_addr()
        );
        self.supervisor
            .start(&self.config.listen_address, self.config.listen_port)
            .await
    }

    /// Relay a participant join
    pub async fn notify_connect(&self, name: &str) -> Result<()> {
        self.send_event(&OutboundEvent::Connect {
            name: name.to_string(),
        })
        .await
    }

    /// Relay a participant leave
    pub async fn notify_disconnect(&self, name: &str) -> Result<()> {
        self.send_event(&OutboundEvent::Disconnect {
            name: name.to_string(),
        })
        .await
    }

    /// Relay a chat line; blank text is dropped
    pub async fn notify_message(&self, sender: &str, text: &str) -> Result<()> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(());
        }

        self.send_event(&OutboundEvent::Message {
            sender: sender.to_string(),
            text: text.to_string(),
        })
        .await
    }

    /// Send a heartbeat record
    ///
    /// Succeeds whether or not a peer is attached. A stalled or dead peer
    /// only gets evicted; the bridge itself is still alive. Fails only once
    /// the bridge has been stopped.
    pub async fn heartbeat(&self) -> Result<()> {
        match self.send_event(&OutboundEvent::Heartbeat).await {
            Err(e) if e.is_transport() => {
                warn!("Bridge {}: heartbeat write failed: {}", self.instance, e);
                Ok(())
            }
            other => other,
        }
    }

    /// Broadcast an inbound frame to local participants
    pub fn on_inbound_frame(&self, frame: &InboundFrame) {
        deliver(self.host.as_ref(), frame);
    }

    async fn send_event(&self, event: &OutboundEvent) -> Result<()> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(RelayError::Liveness(format!(
                "bridge {} is stopped",
                self.instance
            )));
        }

        let record = encode(event);
        debug!(
            "[Bridge→Peer] {}",
            String::from_utf8_lossy(&record).escape_debug()
        );
        self.supervisor.send(&record).await
    }

    /// Not stopped and the listener is still accepting
    pub async fn is_healthy(&self) -> bool {
        !self.stopped.load(Ordering::SeqCst) && self.supervisor.is_listening().await
    }

    /// Arm the heartbeat timer unless one is pending or the bridge is stopped
    pub async fn arm_heartbeat(&self, on_fire: TickFuture) -> bool {
        if self.stopped.load(Ordering::SeqCst) {
            return false;
        }
        self.heartbeat
            .arm(self.config.heartbeat_period(), on_fire)
            .await
    }

    /// Whether a heartbeat timer is pending
    pub async fn heartbeat_pending(&self) -> bool {
        self.heartbeat.is_pending().await
    }

    /// Tear down timer, listener and connection
    pub async fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        self.heartbeat.cancel().await;
        self.supervisor.stop().await;
        self.forwarder.abort();
        info!("Bridge {} stopped", self.instance);
    }

    pub fn instance(&self) -> u64 {
        self.instance
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Listener and connection owner
    pub fn supervisor(&self) -> &Supervisor {
        &self.supervisor
    }

    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.supervisor.local_addr().await
    }

    pub async fn connection(&self) -> Option<ConnectionInfo> {
        self.supervisor.connection().await
    }
}

fn deliver(host: &dyn Host, frame: &InboundFrame) {
    debug!(
        "Inbound {} frame from {} via {}",
        frame.message_type, frame.sender, frame.source
    );
    host.broadcast(&frame.broadcast_text());
}
