//! Upkeep timer for destinations that keep re-inserting removed elements.
//!
//! The timer task never touches orchestrator state or the surface. Each tick
//! is handed to the owner loop as an [`OwnerEvent::UpkeepTick`] tagged with
//! the navigation generation the timer was armed for.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::owner::OwnerEvent;

/// A running upkeep timer. Dropping it stops the timer.
#[derive(Debug)]
pub struct UpkeepTimer {
    generation: u64,
    handle: JoinHandle<()>,
}

impl UpkeepTimer {
    /// Start ticking every `interval`; the first tick fires one interval from now.
    pub fn start(
        generation: u64,
        interval: Duration,
        owner: mpsc::UnboundedSender<OwnerEvent>,
    ) -> Self {
        let period = interval.max(Duration::from_millis(1));
        let handle = tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if owner.send(OwnerEvent::UpkeepTick { generation }).is_err() {
                    tracing::debug!("upkeep timer for generation {generation} lost its owner");
                    break;
                }
            }
        });
        Self { generation, handle }
    }

    /// Navigation generation this timer belongs to.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Stop the timer. Equivalent to dropping it.
    pub fn dispose(self) {}
}

impl Drop for UpkeepTimer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
