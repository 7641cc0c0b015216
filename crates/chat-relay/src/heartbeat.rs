//! Heartbeat timer slot
//!
//! A bridge instance owns one slot. Arming is a no-op while a timer is
//! pending, so re-arming from several places never stacks timers. A timer
//! clears itself from the slot when it fires, before its callback runs,
//! which lets the callback arm the next period.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::sleep;

/// Callback run when a heartbeat timer fires
pub type TickFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Result of one heartbeat tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pulse {
    /// Bridge healthy, next timer armed
    Rearmed,
    /// Bridge healthy, a timer was already pending
    AlreadyArmed,
    /// Bridge missing or unhealthy, rebuilt from scratch
    Reinitialized,
    /// Fire from a discarded instance, or relay shut down
    Ignored,
}

struct Armed {
    token: u64,
    handle: JoinHandle<()>,
}

/// Pending-timer token for one bridge instance
pub struct TimerSlot {
    armed: Arc<Mutex<Option<Armed>>>,
    next_token: AtomicU64,
}

impl Default for TimerSlot {
    fn default() -> Self {
        Self::new()
    }
}

impl TimerSlot {
    pub fn new() -> Self {
        Self {
            armed: Arc::new(Mutex::new(None)),
            next_token: AtomicU64::new(1),
        }
    }

    /// Whether a timer is waiting to fire
    pub async fn is_pending(&self) -> bool {
        self.armed
            .lock()
            .await
            .as_ref()
            .is_some_and(|a| !a.handle.is_finished())
    }

    /// Schedule `on_fire` after `period` unless a timer is already pending
    ///
    /// Returns whether a new timer was scheduled.
    pub async fn arm(&self, period: Duration, on_fire: TickFuture) -> bool {
        let mut guard = self.armed.lock().await;
        if guard.as_ref().is_some_and(|a| !a.handle.is_finished()) {
            return false;
        }

        let token = self.next_token.fetch_add(1, Ordering::SeqCst);
        let slot = Arc::clone(&self.armed);
        let handle = tokio::spawn(async move {
            sleep(period).await;
            {
                let mut armed = slot.lock().await;
                if armed.as_ref().is_some_and(|a| a.token == token) {
                    armed.take();
                }
            }
            on_fire.await;
        });

        *guard = Some(Armed { token, handle });
        true
    }

    /// Cancel the pending timer; returns whether one was pending
    pub async fn cancel(&self) -> bool {
        match self.armed.lock().await.take() {
            Some(armed) => {
                armed.handle.abort();
                true
            }
            None => false,
        }
    }
}
