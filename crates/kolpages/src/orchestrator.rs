//! Navigation & DOM-patch orchestrator.
//!
//! Drives navigation to a [`Destination`], re-applies its removal directives
//! in a bounded retry burst after every completed navigation on the
//! destination host, and keeps an upkeep timer alive for destinations that
//! keep re-inserting removed content.
//!
//! Every directive pass (initial burst, re-navigation burst, upkeep tick)
//! runs under one guard, so passes never interleave. Work scheduled for an
//! older navigation generation is dropped instead of patching the new page.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinHandle;

use crate::events::{DisarmReason, PatchEvent, PatchEventBus};
use crate::executor::DirectiveExecutor;
use crate::host::{same_host, CacheBuster};
use crate::owner::{OwnerEvent, OwnerLoop};
use crate::state::{CompletionDecision, NavigationState};
use crate::surface::{NavigationEvent, RenderSurface, SurfaceSlot};
use crate::types::{Destination, NavigationOutcome, PatchError, PatchResult, PatchSettings};
use crate::upkeep::UpkeepTimer;

/// Result of handling a navigation-completed notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionOutcome {
    /// No destination is active.
    Idle,
    /// The page left the destination host; upkeep was stopped if it ran.
    Disarmed { was_armed: bool },
    /// Still on the destination host; the burst ran again.
    Reapplied { upkeep_armed: bool },
}

/// Result of one upkeep firing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpkeepOutcome {
    Applied,
    /// No destination is active.
    NoDestination,
    /// The timer belongs to an older navigation.
    Stale,
    /// The surface is currently on another host.
    HostMismatch,
}

/// How a run of attempts ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AttemptsRun {
    /// The destination has nothing to remove.
    Skipped,
    Completed(u32),
    /// A newer navigation started; stopped after this many attempts.
    Superseded(u32),
}

struct Inner {
    slot: SurfaceSlot,
    executor: DirectiveExecutor,
    settings: PatchSettings,
    state: Mutex<NavigationState>,
    pass_guard: Mutex<()>,
    owner_tx: mpsc::UnboundedSender<OwnerEvent>,
    forwarder: Mutex<Option<JoinHandle<()>>>,
    cache_buster: CacheBuster,
    events: PatchEventBus,
    upkeep_in_flight: AtomicBool,
}

/// Cheaply cloneable handle to the orchestrator.
#[derive(Clone)]
pub struct PatchOrchestrator {
    inner: Arc<Inner>,
}

impl PatchOrchestrator {
    /// Create an orchestrator and the owner loop that must be driven for
    /// navigation events and upkeep ticks to be processed.
    pub fn new(settings: PatchSettings) -> (Self, OwnerLoop) {
        let (owner_tx, owner_rx) = mpsc::unbounded_channel();
        let slot = SurfaceSlot::new();
        let orchestrator = Self {
            inner: Arc::new(Inner {
                executor: DirectiveExecutor::new(slot.clone()),
                slot,
                settings,
                state: Mutex::new(NavigationState::new()),
                pass_guard: Mutex::new(()),
                owner_tx,
                forwarder: Mutex::new(None),
                cache_buster: CacheBuster::new(),
                events: PatchEventBus::default(),
                upkeep_in_flight: AtomicBool::new(false),
            }),
        };
        let owner = OwnerLoop::new(orchestrator.clone(), owner_rx);
        (orchestrator, owner)
    }

    /// Create an orchestrator and spawn its owner loop on the current runtime.
    pub fn spawn(settings: PatchSettings) -> (Self, JoinHandle<()>) {
        let (orchestrator, owner) = Self::new(settings);
        let handle = tokio::spawn(owner.run());
        (orchestrator, handle)
    }

    pub fn settings(&self) -> &PatchSettings {
        &self.inner.settings
    }

    /// Executor for one-shot directives such as keyboard emulation.
    pub fn executor(&self) -> &DirectiveExecutor {
        &self.inner.executor
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PatchEvent> {
        self.inner.events.subscribe()
    }

    /// Attach the rendering surface and start listening for its completions.
    pub async fn attach(&self, surface: Arc<dyn RenderSurface>) {
        let events = surface.navigation_events();
        self.inner.slot.attach(surface).await;
        let handle = tokio::spawn(forward_navigation_events(
            events,
            self.inner.owner_tx.clone(),
        ));
        if let Some(previous) = self.inner.forwarder.lock().await.replace(handle) {
            previous.abort();
        }
        tracing::info!("Rendering surface attached");
    }

    pub async fn is_attached(&self) -> bool {
        self.inner.slot.is_attached().await
    }

    /// Navigate to a raw URL without patching. http(s) URLs are cache-busted.
    pub async fn navigate(&self, url: &str) -> PatchResult<NavigationOutcome> {
        let surface = self.inner.slot.get().await?;
        let target = self.inner.cache_buster.apply(url);
        Ok(navigate_surface(surface.as_ref(), &target).await)
    }

    /// Navigate to a destination, run the initial burst, and arm or disarm upkeep.
    ///
    /// Returns once the surface reports completion and the burst is done.
    /// Navigation failures are reported in the outcome; the burst runs anyway.
    pub async fn navigate_to(
        &self,
        destination: impl Into<Arc<Destination>>,
    ) -> PatchResult<NavigationOutcome> {
        let destination: Arc<Destination> = destination.into();
        if destination.url.trim().is_empty() {
            return Err(PatchError::InvalidDestination(format!(
                "destination '{}' has no url",
                destination.name
            )));
        }
        let surface = self.inner.slot.get().await?;

        let generation = {
            let mut state = self.inner.state.lock().await;
            let previous = state.destination();
            let (generation, timer) = state.begin(Arc::clone(&destination));
            if let (Some(timer), Some(previous)) = (timer, previous) {
                timer.dispose();
                tracing::info!("Upkeep stopped for '{}': superseded", previous.name);
                self.emit(PatchEvent::UpkeepDisarmed {
                    destination: previous.name.clone(),
                    reason: DisarmReason::Superseded,
                });
            }
            generation
        };

        let target = self.inner.cache_buster.apply(&destination.url);
        tracing::info!(
            "Navigating to '{}' ({target}), generation {generation}",
            destination.name
        );
        self.emit(PatchEvent::NavigationStarted {
            destination: destination.name.clone(),
            url: target.clone(),
            generation,
        });

        let outcome = navigate_surface(surface.as_ref(), &target).await;
        self.emit(PatchEvent::NavigationFinished {
            destination: destination.name.clone(),
            success: outcome.success,
            final_url: outcome.final_url.clone(),
        });

        {
            let mut state = self.inner.state.lock().await;
            if state.is_current(generation) {
                state.record_page(&outcome.final_url);
            }
        }

        self.run_burst(&destination, generation).await?;
        self.configure_upkeep(&destination, generation).await;
        Ok(outcome)
    }

    /// Handle a navigation-completed notification from the surface.
    ///
    /// Off-host completions stop upkeep; on-host completions (route changes,
    /// reloads) re-evaluate upkeep and then rerun the burst.
    pub async fn on_page_navigation_completed(
        &self,
        current_url: &str,
    ) -> PatchResult<CompletionOutcome> {
        let (outcome, burst) = self.settle_completion(current_url).await;
        if let Some((destination, generation)) = burst {
            self.run_burst(&destination, generation).await?;
        }
        Ok(outcome)
    }

    /// Record a completion and arm or disarm upkeep under one state lock.
    ///
    /// Returns the burst still owed to the page, if it stayed on the
    /// destination host. Completions must be settled in the order the
    /// surface reported them.
    pub(crate) async fn settle_completion(
        &self,
        current_url: &str,
    ) -> (CompletionOutcome, Option<(Arc<Destination>, u64)>) {
        let mut state = self.inner.state.lock().await;
        match state.on_completed(current_url) {
            CompletionDecision::Idle => (CompletionOutcome::Idle, None),
            CompletionDecision::HostChanged { destination } => {
                let was_armed = match state.disarm() {
                    Some(timer) => {
                        timer.dispose();
                        tracing::info!(
                            "Upkeep stopped for '{}': page moved to {current_url}",
                            destination.name
                        );
                        self.emit(PatchEvent::UpkeepDisarmed {
                            destination: destination.name.clone(),
                            reason: DisarmReason::HostChanged,
                        });
                        true
                    }
                    None => false,
                };
                (CompletionOutcome::Disarmed { was_armed }, None)
            }
            CompletionDecision::Reapply {
                destination,
                generation,
            } => {
                tracing::debug!(
                    "Navigation completed on '{}' host: {current_url}",
                    destination.name
                );
                let upkeep_armed = self.apply_upkeep_rule(&mut state, &destination, generation);
                (
                    CompletionOutcome::Reapplied { upkeep_armed },
                    Some((destination, generation)),
                )
            }
        }
    }

    /// One upkeep firing: a single zero-delay pass if the surface is still on
    /// the destination host. Never disarms the timer itself.
    pub async fn run_upkeep_pass(&self, generation: u64) -> PatchResult<UpkeepOutcome> {
        let destination = {
            let state = self.inner.state.lock().await;
            match state.destination_for(generation) {
                Some(destination) => destination,
                None if state.destination().is_none() => {
                    return Ok(UpkeepOutcome::NoDestination)
                }
                None => return Ok(UpkeepOutcome::Stale),
            }
        };

        let surface = self.inner.slot.get().await?;
        let current_url = surface.current_url().await;
        if !same_host(&destination.url, &current_url) {
            tracing::trace!(
                "Upkeep skipped for '{}': surface on {current_url}",
                destination.name
            );
            return Ok(UpkeepOutcome::HostMismatch);
        }

        match self
            .run_attempts(&destination, generation, 1, Duration::ZERO)
            .await?
        {
            AttemptsRun::Superseded(_) => Ok(UpkeepOutcome::Stale),
            AttemptsRun::Skipped | AttemptsRun::Completed(_) => {
                self.emit(PatchEvent::UpkeepPass {
                    destination: destination.name.clone(),
                    generation,
                });
                Ok(UpkeepOutcome::Applied)
            }
        }
    }

    /// Run a script on the current page. Execution failures yield `""`.
    pub async fn execute_script(&self, script: &str) -> PatchResult<String> {
        self.inner.executor.run_script(script).await
    }

    pub async fn go_back(&self) -> PatchResult<()> {
        let surface = self.inner.slot.get().await?;
        surface
            .go_back()
            .await
            .map_err(|e| PatchError::Surface(e.to_string()))
    }

    pub async fn reload(&self) -> PatchResult<()> {
        let surface = self.inner.slot.get().await?;
        surface
            .reload()
            .await
            .map_err(|e| PatchError::Surface(e.to_string()))
    }

    /// Best-effort current URL; empty when no surface is attached.
    pub async fn current_url(&self) -> String {
        match self.inner.slot.get().await {
            Ok(surface) => surface.current_url().await,
            Err(_) => String::new(),
        }
    }

    pub async fn current_destination(&self) -> Option<Arc<Destination>> {
        self.inner.state.lock().await.destination()
    }

    pub async fn current_generation(&self) -> u64 {
        self.inner.state.lock().await.generation()
    }

    pub async fn upkeep_armed(&self) -> bool {
        self.inner.state.lock().await.upkeep_armed()
    }

    /// Stop upkeep, stop listening to the surface, and end the owner loop.
    pub async fn shutdown(&self) {
        let (destination, timer) = {
            let mut state = self.inner.state.lock().await;
            (state.destination(), state.clear())
        };
        if let (Some(timer), Some(destination)) = (timer, destination) {
            timer.dispose();
            self.emit(PatchEvent::UpkeepDisarmed {
                destination: destination.name.clone(),
                reason: DisarmReason::Shutdown,
            });
        }
        if let Some(forwarder) = self.inner.forwarder.lock().await.take() {
            forwarder.abort();
        }
        self.inner.slot.detach().await;
        let _ = self.inner.owner_tx.send(OwnerEvent::Shutdown);
        tracing::info!("Patch orchestrator shut down");
    }

    /// Claim the single upkeep slot; `None` while a pass is still running.
    pub(crate) fn try_claim_upkeep(&self) -> Option<UpkeepClaim> {
        if self.inner.upkeep_in_flight.swap(true, Ordering::AcqRel) {
            return None;
        }
        Some(UpkeepClaim {
            orchestrator: self.clone(),
        })
    }

    fn emit(&self, event: PatchEvent) {
        self.inner.events.emit(event);
    }

    /// The configured burst: N attempts, each preceded by the burst delay.
    pub(crate) async fn run_burst(
        &self,
        destination: &Destination,
        generation: u64,
    ) -> PatchResult<()> {
        let settings = &self.inner.settings;
        match self
            .run_attempts(
                destination,
                generation,
                settings.burst_attempts,
                settings.burst_delay,
            )
            .await?
        {
            AttemptsRun::Skipped => {}
            AttemptsRun::Completed(attempts) => {
                tracing::debug!("Burst finished for '{}' ({attempts} attempts)", destination.name);
                self.emit(PatchEvent::BurstFinished {
                    destination: destination.name.clone(),
                    generation,
                    attempts,
                });
            }
            AttemptsRun::Superseded(completed) => {
                tracing::debug!(
                    "Burst for '{}' superseded after {completed} attempt(s)",
                    destination.name
                );
                self.emit(PatchEvent::BurstSuperseded {
                    destination: destination.name.clone(),
                    generation,
                    completed,
                });
            }
        }
        Ok(())
    }

    async fn run_attempts(
        &self,
        destination: &Destination,
        generation: u64,
        attempts: u32,
        delay: Duration,
    ) -> PatchResult<AttemptsRun> {
        if !destination.has_directives() {
            return Ok(AttemptsRun::Skipped);
        }

        let _pass = self.inner.pass_guard.lock().await;
        for attempt in 0..attempts {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            if !self.inner.state.lock().await.is_current(generation) {
                return Ok(AttemptsRun::Superseded(attempt));
            }
            let executor = &self.inner.executor;
            executor
                .apply_identifiers(&destination.id_directives)
                .await?;
            executor
                .apply_selectors(&destination.selector_directives)
                .await?;
        }
        Ok(AttemptsRun::Completed(attempts))
    }

    /// Re-evaluate upkeep for `generation` against the last known page.
    async fn configure_upkeep(&self, destination: &Destination, generation: u64) -> bool {
        let mut state = self.inner.state.lock().await;
        if !state.is_current(generation) {
            return false;
        }
        self.apply_upkeep_rule(&mut state, destination, generation)
    }

    /// Arm upkeep iff the destination is continuous and the last page the
    /// surface reported is on its host. Runs with the state lock held.
    fn apply_upkeep_rule(
        &self,
        state: &mut NavigationState,
        destination: &Destination,
        generation: u64,
    ) -> bool {
        let settings = &self.inner.settings;
        let disarm_reason = if !destination.wants_continuous(&settings.continuous_marker) {
            Some(DisarmReason::NotContinuous)
        } else if !state.page_on_destination_host() {
            Some(DisarmReason::HostChanged)
        } else {
            None
        };
        if let Some(reason) = disarm_reason {
            if let Some(timer) = state.disarm() {
                timer.dispose();
                tracing::info!("Upkeep stopped for '{}': {reason:?}", destination.name);
                self.emit(PatchEvent::UpkeepDisarmed {
                    destination: destination.name.clone(),
                    reason,
                });
            }
            return false;
        }

        if state.upkeep_armed_for(generation) {
            return true;
        }
        let timer = UpkeepTimer::start(
            generation,
            settings.upkeep_interval,
            self.inner.owner_tx.clone(),
        );
        if let Some(stale) = state.arm(timer) {
            stale.dispose();
        }
        tracing::info!(
            "Upkeep armed for '{}' every {:?}",
            destination.name,
            settings.upkeep_interval
        );
        self.emit(PatchEvent::UpkeepArmed {
            destination: destination.name.clone(),
            generation,
        });
        true
    }
}

impl std::fmt::Debug for PatchOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PatchOrchestrator")
            .field("settings", &self.inner.settings)
            .finish_non_exhaustive()
    }
}

/// Held while an upkeep pass runs; releases the slot on drop, including on panic.
pub(crate) struct UpkeepClaim {
    orchestrator: PatchOrchestrator,
}

impl UpkeepClaim {
    pub(crate) fn orchestrator(&self) -> &PatchOrchestrator {
        &self.orchestrator
    }
}

impl Drop for UpkeepClaim {
    fn drop(&mut self) {
        self.orchestrator
            .inner
            .upkeep_in_flight
            .store(false, Ordering::Release);
    }
}

async fn navigate_surface(surface: &dyn RenderSurface, target: &str) -> NavigationOutcome {
    match surface.navigate(target).await {
        Ok(outcome) => {
            if !outcome.success {
                tracing::warn!("Navigation to {target} reported failure");
            }
            outcome
        }
        Err(e) => {
            tracing::warn!("Navigation to {target} failed: {e:#}");
            NavigationOutcome {
                success: false,
                final_url: target.to_string(),
            }
        }
    }
}

async fn forward_navigation_events(
    mut events: broadcast::Receiver<NavigationEvent>,
    owner: mpsc::UnboundedSender<OwnerEvent>,
) {
    loop {
        match events.recv().await {
            Ok(event) => {
                if owner.send(OwnerEvent::PageNavigated(event.url)).is_err() {
                    break;
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!("Dropped {skipped} navigation event(s)");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
