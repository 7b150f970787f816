//! Device orientation tracking
//!
//! The host UI rotates independently of the camera sensor, so every session's
//! texture metadata carries the current display rotation in quarter turns.
//! [`OrientationWatcher`] polls the activity on a fixed period and, whenever
//! the rotation changes, pushes a fresh texture-info event for every bound
//! session.
//!
//! The watcher takes the registry lock before it writes [`OrientationState`]
//! and keeps it while fanning out. Bind completion inserts its session under
//! the same lock and reads the state there, so a session inserted while a
//! poll is running either sees the new rotation or is part of the fan-out.

use crate::events::EventStream;
use crate::host::Activity;
use crate::message::texture_info_event;
use crate::registry::SessionRegistry;
use crate::CameraError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Display rotation as a multiple of 90 degrees, 0 to 3
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct QuarterTurns(u8);

impl QuarterTurns {
    pub const ZERO: QuarterTurns = QuarterTurns(0);

    /// Returns `None` when `value` is not in `0..=3`
    pub fn new(value: u8) -> Option<Self> {
        (value < 4).then_some(Self(value))
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for QuarterTurns {
    type Error = CameraError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
            .ok_or_else(|| CameraError::UnrecognizedEnum(format!("quarter turns {}", value)))
    }
}

impl From<QuarterTurns> for u8 {
    fn from(turns: QuarterTurns) -> Self {
        turns.0
    }
}

impl fmt::Display for QuarterTurns {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Last observed display rotation
///
/// Written only by the watcher while it holds the registry lock.
#[derive(Debug, Default)]
pub struct OrientationState {
    quarter_turns: AtomicU8,
}

impl OrientationState {
    pub fn new(initial: QuarterTurns) -> Self {
        Self {
            quarter_turns: AtomicU8::new(initial.get()),
        }
    }

    pub fn get(&self) -> QuarterTurns {
        QuarterTurns(self.quarter_turns.load(Ordering::Acquire))
    }

    /// Store `turns`, returning whether it differed from the previous value
    pub fn replace(&self, turns: QuarterTurns) -> bool {
        self.quarter_turns.swap(turns.get(), Ordering::AcqRel) != turns.get()
    }
}

/// Run one orientation poll
///
/// Returns `true` when the rotation changed and events were fanned out.
/// Failures reading the rotation are logged and skip the cycle.
pub async fn poll_orientation(
    activity: &dyn Activity,
    registry: &SessionRegistry,
    state: &OrientationState,
    events: &EventStream,
) -> bool {
    let turns = match activity.quarter_turns() {
        Ok(turns) => turns,
        Err(e) => {
            warn!("Skipping orientation poll: {}", e);
            return false;
        }
    };

    registry
        .with_sessions(|sessions| {
            if !state.replace(turns) {
                return false;
            }

            debug!(
                "Orientation changed to {} quarter turns, notifying {} session(s)",
                turns,
                sessions.len()
            );

            for session in sessions.values() {
                events.emit(&texture_info_event(session.key, session.texture_info(turns)));
            }
            true
        })
        .await
}

/// Background orientation polling task
///
/// Stopped explicitly with [`OrientationWatcher::stop`] or implicitly when
/// dropped.
pub struct OrientationWatcher {
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl OrientationWatcher {
    /// Spawn the polling loop on the current runtime
    pub fn spawn(
        activity: Arc<dyn Activity>,
        registry: SessionRegistry,
        state: Arc<OrientationState>,
        events: EventStream,
        period: Duration,
    ) -> Self {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();

        let handle = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        poll_orientation(activity.as_ref(), &registry, &state, &events).await;
                    }
                    _ = &mut shutdown_rx => {
                        info!("Orientation watcher shutting down");
                        break;
                    }
                }
            }
        });

        debug!("Orientation watcher started with period {:?}", period);

        Self {
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    /// Signal the loop to stop; it exits before its next poll
    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    /// Stop the loop and wait for it to exit
    pub async fn join(mut self) {
        self.stop();
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                warn!("Orientation watcher task failed: {}", e);
            }
        }
    }
}

impl Drop for OrientationWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}
