//! Owner loop: the single consumer of navigation events and upkeep ticks.
//!
//! Surface notifications and timer ticks arrive from other tasks. They are
//! funnelled through one channel so that only the owner decides when the
//! orchestrator acts on them.

use tokio::sync::mpsc;

use crate::orchestrator::{PatchOrchestrator, UpkeepOutcome};

/// Messages handled by the owner loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OwnerEvent {
    /// The surface finished a navigation (or an in-page route change).
    PageNavigated(String),
    /// The upkeep timer armed for `generation` fired.
    UpkeepTick { generation: u64 },
    Shutdown,
}

/// Drives an orchestrator from its event channel.
pub struct OwnerLoop {
    orchestrator: PatchOrchestrator,
    rx: mpsc::UnboundedReceiver<OwnerEvent>,
}

impl OwnerLoop {
    pub(crate) fn new(
        orchestrator: PatchOrchestrator,
        rx: mpsc::UnboundedReceiver<OwnerEvent>,
    ) -> Self {
        Self { orchestrator, rx }
    }

    /// Run until [`PatchOrchestrator::shutdown`] is called.
    pub async fn run(mut self) {
        tracing::debug!("Owner loop started");
        while let Some(event) = self.rx.recv().await {
            match event {
                OwnerEvent::PageNavigated(url) => {
                    dispatch_completion(&self.orchestrator, url).await
                }
                OwnerEvent::UpkeepTick { generation } => self.dispatch_upkeep(generation),
                OwnerEvent::Shutdown => break,
            }
        }
        tracing::debug!("Owner loop stopped");
    }

    fn dispatch_upkeep(&self, generation: u64) {
        let Some(claim) = self.orchestrator.try_claim_upkeep() else {
            tracing::trace!("Upkeep tick for generation {generation} dropped: pass still running");
            return;
        };
        tokio::spawn(async move {
            match claim.orchestrator().run_upkeep_pass(generation).await {
                Ok(UpkeepOutcome::Applied) => {
                    tracing::trace!("Upkeep pass applied (generation {generation})")
                }
                Ok(outcome) => tracing::trace!("Upkeep tick ignored: {outcome:?}"),
                Err(e) => tracing::debug!("Upkeep pass failed: {e}"),
            }
        });
    }
}

/// Settle a completion before the next event is read; only the burst runs in
/// the background.
async fn dispatch_completion(orchestrator: &PatchOrchestrator, url: String) {
    let (outcome, burst) = orchestrator.settle_completion(&url).await;
    tracing::trace!("Completion for {url}: {outcome:?}");
    let Some((destination, generation)) = burst else {
        return;
    };
    let orchestrator = orchestrator.clone();
    tokio::spawn(async move {
        if let Err(e) = orchestrator.run_burst(&destination, generation).await {
            tracing::warn!("Re-patch after navigation to {url} failed: {e}");
        }
    });
}

impl std::fmt::Debug for OwnerLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OwnerLoop").finish_non_exhaustive()
    }
}
