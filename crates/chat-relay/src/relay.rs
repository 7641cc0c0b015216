//! Relay: owner of the current bridge instance
//!
//! Holds at most one bridge, runs its heartbeat, and rebuilds it from
//! configuration whenever a tick finds it missing or unhealthy. Host event
//! hooks enter here.

use crate::bridge::Bridge;
use crate::heartbeat::{Pulse, TickFuture};
use crate::host::{Host, strip_audio_tag};
use chat_relay_core::{Participant, RelayConfig, Result};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Lifecycle owner for the bridge
pub struct Relay {
    config: RelayConfig,
    host: Arc<dyn Host>,
    /// The current bridge instance
    current: Mutex<Option<Arc<Bridge>>>,
    next_instance: AtomicU64,
    reinitializations: AtomicU64,
    shut_down: AtomicBool,
}

impl Relay {
    /// Create a relay; nothing listens until `initialize`
    pub fn new(config: RelayConfig, host: Arc<dyn Host>) -> Arc<Self> {
        Arc::new(Self {
            config,
            host,
            current: Mutex::new(None),
            next_instance: AtomicU64::new(1),
            reinitializations: AtomicU64::new(0),
            shut_down: AtomicBool::new(false),
        })
    }

    /// Bring up a bridge unless a healthy one already exists
    ///
    /// A bind failure is returned and no bridge is installed.
    pub async fn initialize(self: &Arc<Self>) -> Result<Arc<Bridge>> {
        self.shut_down.store(false, Ordering::SeqCst);

        // Check health without holding the slot so host hooks are not blocked
        let existing = self.current().await;
        if let Some(bridge) = existing.as_ref() {
            if bridge.is_healthy().await && bridge.heartbeat().await.is_ok() {
                return Ok(Arc::clone(bridge));
            }
        }

        let mut current = self.current.lock().await;
        if let Some(now) = current.as_ref() {
            if existing
                .as_ref()
                .is_none_or(|probed| probed.instance() != now.instance())
            {
                debug!("Bridge {} installed concurrently", now.instance());
                return Ok(Arc::clone(now));
            }
        }

        if let Some(old) = current.take() {
            old.stop().await;
        }

        let bridge = self.build();
        if let Err(e) = bridge.start().await {
            bridge.stop().await;
            return Err(e);
        }

        *current = Some(Arc::clone(&bridge));
        drop(current);

        self.arm(&bridge).await;
        Ok(bridge)
    }

    /// One heartbeat cycle
    ///
    /// `origin` is the instance whose timer fired; a fire from any other
    /// instance is ignored. `None` checks whatever is current.
    pub async fn tick(self: &Arc<Self>, origin: Option<u64>) -> Pulse {
        if self.shut_down.load(Ordering::SeqCst) {
            return Pulse::Ignored;
        }

        let bridge = {
            let mut current = self.current.lock().await;
            match (current.as_ref(), origin) {
                (Some(bridge), Some(origin)) if bridge.instance() != origin => {
                    debug!(
                        "Ignoring heartbeat from discarded bridge {} (current {})",
                        origin,
                        bridge.instance()
                    );
                    return Pulse::Ignored;
                }
                (Some(bridge), _) => Arc::clone(bridge),
                (None, _) => {
                    warn!("Heartbeat found no bridge, reinitializing");
                    self.reinitialize_locked(&mut current).await;
                    return Pulse::Reinitialized;
                }
            }
        };

        // Check health without holding the slot so host hooks are not blocked
        let failure = if !bridge.is_healthy().await {
            Some("listener is down".to_string())
        } else {
            bridge.heartbeat().await.err().map(|e| e.to_string())
        };

        if let Some(reason) = failure {
            let mut current = self.current.lock().await;
            if self.shut_down.load(Ordering::SeqCst)
                || current
                    .as_ref()
                    .is_some_and(|b| b.instance() != bridge.instance())
            {
                return Pulse::Ignored;
            }
            warn!(
                "Bridge {} failed its heartbeat ({}), reinitializing",
                bridge.instance(),
                reason
            );
            self.reinitialize_locked(&mut current).await;
            return Pulse::Reinitialized;
        }

        if self.arm(&bridge).await {
            Pulse::Rearmed
        } else {
            Pulse::AlreadyArmed
        }
    }

    /// Discard the current bridge and build a fresh one
    pub async fn reinitialize(self: &Arc<Self>) -> Arc<Bridge> {
        let mut current = self.current.lock().await;
        self.reinitialize_locked(&mut current).await
    }

    async fn reinitialize_locked(
        self: &Arc<Self>,
        current: &mut Option<Arc<Bridge>>,
    ) -> Arc<Bridge> {
        if let Some(old) = current.take() {
            old.stop().await;
        }

        let bridge = self.build();
        // An unbound bridge is still installed: it reports unhealthy and
        // the next tick tries again.
        if let Err(e) = bridge.start().await {
            error!("Bridge {} failed to listen: {}", bridge.instance(), e);
        }

        self.reinitializations.fetch_add(1, Ordering::SeqCst);
        *current = Some(Arc::clone(&bridge));
        self.arm(&bridge).await;
        info!("Bridge reinitialized as instance {}", bridge.instance());
        bridge
    }

    fn build(&self) -> Arc<Bridge> {
        let instance = self.next_instance.fetch_add(1, Ordering::SeqCst);
        Arc::new(Bridge::new(
            instance,
            self.config.clone(),
            Arc::clone(&self.host),
        ))
    }

    async fn arm(self: &Arc<Self>, bridge: &Bridge) -> bool {
        bridge
            .arm_heartbeat(scheduled_tick(Arc::downgrade(self), bridge.instance()))
            .await
    }

    /// Remove and stop the current bridge without rebuilding it
    pub async fn discard(&self) -> Option<Arc<Bridge>> {
        let old = self.current.lock().await.take();
        if let Some(bridge) = old.as_ref() {
            bridge.stop().await;
        }
        old
    }

    /// Stop the bridge and disable reinitialization
    pub async fn shutdown(&self) {
        self.shut_down.store(true, Ordering::SeqCst);
        self.discard().await;
        info!("Relay shut down");
    }

    /// The current bridge instance
    pub async fn current(&self) -> Option<Arc<Bridge>> {
        self.current.lock().await.clone()
    }

    /// Number of rebuilds driven by the heartbeat or `reinitialize`
    pub fn reinitializations(&self) -> u64 {
        self.reinitializations.load(Ordering::SeqCst)
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    // === Host hooks ===

    /// Match start: bring the bridge up if needed
    pub async fn on_match_started(self: &Arc<Self>) -> Result<()> {
        self.initialize().await.map(|_| ())
    }

    /// A participant joined; bots are not announced
    pub async fn on_participant_connected(&self, participant: &Participant) {
        if self.host.is_host_controlled(participant) {
            return;
        }
        if let Some(bridge) = self.current().await {
            if let Err(e) = bridge.notify_connect(&participant.name).await {
                warn!("Failed to relay connect of {}: {}", participant.name, e);
            }
        }
    }

    /// A participant left; bots are not announced
    pub async fn on_participant_disconnected(&self, participant: &Participant, reason: &str) {
        if self.host.is_host_controlled(participant) {
            return;
        }
        debug!("{} left: {}", participant.name, reason);
        if let Some(bridge) = self.current().await {
            if let Err(e) = bridge.notify_disconnect(&participant.name).await {
                warn!("Failed to relay disconnect of {}: {}", participant.name, e);
            }
        }
    }

    /// Chat line sent to everyone
    pub async fn on_chat_broadcast(&self, sender: &Participant, text: &str) {
        let text = strip_audio_tag(text, &self.config.audio_tag_marker);
        self.relay_message(sender, text).await;
    }

    /// Canned (key-bound) chat sent to everyone, relayed as `[keys] text`
    pub async fn on_canned_chat(&self, sender: &Participant, keys: &str, text: &str) {
        let text = strip_audio_tag(text, &self.config.audio_tag_marker);
        self.relay_message(sender, &format!("[{}] {}", keys, text))
            .await;
    }

    async fn relay_message(&self, sender: &Participant, text: &str) {
        if let Some(bridge) = self.current().await {
            if let Err(e) = bridge.notify_message(&sender.name, text).await {
                warn!("Failed to relay message from {}: {}", sender.name, e);
            }
        }
    }
}

fn scheduled_tick(relay: Weak<Relay>, instance: u64) -> TickFuture {
    Box::pin(async move {
        if let Some(relay) = relay.upgrade() {
            let pulse = relay.tick(Some(instance)).await;
            debug!("Heartbeat tick for bridge {}: {:?}", instance, pulse);
        }
    })
}
