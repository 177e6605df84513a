//! Patch event bus: typed events from the orchestrator.
//!
//! A `tokio::sync::broadcast` channel carrying [`PatchEvent`] values. Hosts
//! subscribe for status displays or logs; with no subscribers events are
//! dropped.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Why an upkeep timer was torn down.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisarmReason {
    /// The page left the destination's host.
    HostChanged,
    /// A new navigation replaced the destination.
    Superseded,
    /// The destination does not ask for continuous patching.
    NotContinuous,
    /// The orchestrator was shut down.
    Shutdown,
}

/// Every event the orchestrator emits.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PatchEvent {
    // ── Navigation ────────────────────────
    /// A navigation to a destination was requested.
    NavigationStarted {
        destination: String,
        url: String,
        generation: u64,
    },
    /// The surface reported completion for a destination navigation.
    NavigationFinished {
        destination: String,
        success: bool,
        final_url: String,
    },

    // ── Patching ──────────────────────────
    /// A retry burst ran all of its attempts.
    BurstFinished {
        destination: String,
        generation: u64,
        attempts: u32,
    },
    /// A burst stopped early because a newer navigation took over.
    BurstSuperseded {
        destination: String,
        generation: u64,
        completed: u32,
    },
    /// One upkeep pass ran.
    UpkeepPass {
        destination: String,
        generation: u64,
    },

    // ── Upkeep timer ──────────────────────
    UpkeepArmed {
        destination: String,
        generation: u64,
    },
    UpkeepDisarmed {
        destination: String,
        reason: DisarmReason,
    },
}

/// Broadcast bus for [`PatchEvent`]s.
#[derive(Clone)]
pub struct PatchEventBus {
    sender: broadcast::Sender<PatchEvent>,
}

impl PatchEventBus {
    /// Create a new event bus with the given buffer capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Emit an event to all subscribers. Silently ignores if no subscribers.
    pub fn emit(&self, event: PatchEvent) {
        let _ = self.sender.send(event);
    }

    /// Subscribe to receive all future events.
    pub fn subscribe(&self) -> broadcast::Receiver<PatchEvent> {
        self.sender.subscribe()
    }
}

impl Default for PatchEventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

impl std::fmt::Debug for PatchEventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PatchEventBus")
            .field("subscribers", &self.sender.receiver_count())
            .finish()
    }
}
