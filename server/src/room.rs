//! Room occupancy state machine.
//!
//! One bounce flips a free room to taken; a configured stretch of silence
//! hands it back. All mutation happens under a single async mutex so the
//! state, the pending countdown and the outgoing notification move as one
//! unit. Countdowns carry a generation number that is re-checked at fire
//! time, so a countdown racing a fresh bounce can never free a room that
//! was just refreshed.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::Serialize;
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::error::EventError;
use crate::events::{self, BounceReport};
use crate::notifier::Notifier;

/// Public view of the room, also the `GET /room-state` body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoomSnapshot {
    pub state: &'static str,
    pub last_state_change_time: f64,
}

struct RoomState {
    is_free: bool,
    last_state_change_time: f64,
}

impl RoomState {
    fn snapshot(&self) -> RoomSnapshot {
        RoomSnapshot {
            state: if self.is_free { "free" } else { "taken" },
            last_state_change_time: self.last_state_change_time,
        }
    }
}

struct Inner {
    room: RoomState,
    countdown_generation: u64,
    countdown: Option<JoinHandle<()>>,
}

/// Applies device events to the room and schedules the give-back countdown.
pub struct RoomController {
    inner: Arc<Mutex<Inner>>,
    notifier: Arc<dyn Notifier>,
    idle_timeout: Duration,
}

impl RoomController {
    /// A new room starts free.
    pub fn new(idle_timeout: Duration, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                room: RoomState {
                    is_free: true,
                    last_state_change_time: now_epoch(),
                },
                countdown_generation: 0,
                countdown: None,
            })),
            notifier,
            idle_timeout,
        }
    }

    /// Route one inbound event. Unknown and malformed events are rejected
    /// without touching the room.
    pub async fn handle_event(&self, event: Value) -> Result<(), EventError> {
        let Some(kind) = event.get("type").and_then(Value::as_str) else {
            return Err(EventError::MissingType);
        };
        match kind {
            events::BOUNCE_DETECTED => {
                let report: BounceReport =
                    serde_json::from_value(event.clone()).map_err(|source| {
                        EventError::BadPayload {
                            kind: events::BOUNCE_DETECTED,
                            source,
                        }
                    })?;
                self.handle_bounce(&report).await;
                Ok(())
            }
            other => Err(EventError::UnrecognizedType(other.to_string())),
        }
    }

    async fn handle_bounce(&self, report: &BounceReport) {
        let mut inner = self.inner.lock().await;
        tracing::info!(
            "room taken indication received: bounce #{} at device-ms {}",
            report.bounce_ctr,
            report.timestamp,
        );

        let was_free = inner.room.is_free;
        inner.room.is_free = false;
        inner.room.last_state_change_time = now_epoch();

        // Supersede any pending countdown before releasing the lock: bump
        // the generation and abort the sleeping task.
        inner.countdown_generation = inner.countdown_generation.wrapping_add(1);
        let generation = inner.countdown_generation;
        if let Some(handle) = inner.countdown.take() {
            handle.abort();
        }

        // Only the free-to-taken edge is announced; every further bounce
        // just keeps the room.
        if was_free {
            let snapshot = inner.room.snapshot();
            if let Err(e) = self.notifier.notify(&snapshot).await {
                tracing::error!("notify failed after taking the room: {}", e);
            }
        }

        inner.countdown = Some(self.spawn_countdown(generation));
    }

    fn spawn_countdown(&self, generation: u64) -> JoinHandle<()> {
        let inner = Arc::clone(&self.inner);
        let notifier = Arc::clone(&self.notifier);
        let idle = self.idle_timeout;
        tokio::spawn(async move {
            tokio::time::sleep(idle).await;
            let mut inner = inner.lock().await;
            // A fresh bounce may have superseded this countdown while it
            // was waiting for the lock; the generation check decides.
            if inner.countdown_generation != generation || inner.room.is_free {
                return;
            }
            inner.room.is_free = true;
            inner.room.last_state_change_time = now_epoch();
            inner.countdown = None;
            tracing::info!("no events for {:?}, room is free again", idle);
            let snapshot = inner.room.snapshot();
            if let Err(e) = notifier.notify(&snapshot).await {
                tracing::error!("notify failed after freeing the room: {}", e);
            }
        })
    }

    /// Current state, as served by `GET /room-state`.
    pub async fn room_state(&self) -> RoomSnapshot {
        self.inner.lock().await.room.snapshot()
    }
}

fn now_epoch() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}
