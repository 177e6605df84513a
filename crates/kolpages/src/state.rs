//! Active navigation state owned by the orchestrator.

use std::sync::Arc;

use crate::types::Destination;
use crate::upkeep::UpkeepTimer;

/// What a navigation-completed notification means for the current state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionDecision {
    /// Nothing is being patched.
    Idle,
    /// The page left the destination host.
    HostChanged { destination: Arc<Destination> },
    /// Still on the destination host; patch again.
    Reapply {
        destination: Arc<Destination>,
        generation: u64,
    },
}

/// Current destination, its navigation generation, the last URL the surface
/// reported, and the upkeep timer.
///
/// The generation increases on every [`NavigationState::begin`]; anything
/// scheduled for an older generation is stale.
#[derive(Debug, Default)]
pub struct NavigationState {
    current: Option<Arc<Destination>>,
    generation: u64,
    page_url: Option<String>,
    upkeep: Option<UpkeepTimer>,
}

impl NavigationState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the destination and start a new generation.
    ///
    /// Returns the new generation and the timer that belonged to the previous
    /// destination, if one was armed. The caller drops it.
    pub fn begin(&mut self, destination: Arc<Destination>) -> (u64, Option<UpkeepTimer>) {
        let previous = self.upkeep.take();
        self.generation += 1;
        self.current = Some(destination);
        self.page_url = None;
        (self.generation, previous)
    }

    /// Remember where the surface is now.
    pub fn record_page(&mut self, url: &str) {
        self.page_url = Some(url.to_string());
    }

    /// Last URL the surface reported since the current navigation began.
    pub fn page_url(&self) -> Option<&str> {
        self.page_url.as_deref()
    }

    /// True if a destination is active and the last known page is on its host.
    /// An unknown page counts as off host.
    pub fn page_on_destination_host(&self) -> bool {
        match (&self.current, &self.page_url) {
            (Some(destination), Some(page)) => crate::host::same_host(&destination.url, page),
            _ => false,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_current(&self, generation: u64) -> bool {
        self.current.is_some() && self.generation == generation
    }

    pub fn destination(&self) -> Option<Arc<Destination>> {
        self.current.clone()
    }

    /// The destination, if `generation` is still current.
    pub fn destination_for(&self, generation: u64) -> Option<Arc<Destination>> {
        if self.is_current(generation) {
            self.current.clone()
        } else {
            None
        }
    }

    /// Record a completion for `current_url` and classify it.
    pub fn on_completed(&mut self, current_url: &str) -> CompletionDecision {
        let Some(destination) = self.current.clone() else {
            return CompletionDecision::Idle;
        };
        self.record_page(current_url);
        if crate::host::same_host(&destination.url, current_url) {
            CompletionDecision::Reapply {
                destination,
                generation: self.generation,
            }
        } else {
            CompletionDecision::HostChanged { destination }
        }
    }

    /// True if a live timer is armed for `generation`.
    pub fn upkeep_armed_for(&self, generation: u64) -> bool {
        self.upkeep
            .as_ref()
            .is_some_and(|t| t.generation() == generation && t.is_running())
    }

    pub fn upkeep_armed(&self) -> bool {
        self.upkeep.is_some()
    }

    /// Install a timer, returning whichever one it replaces.
    pub fn arm(&mut self, timer: UpkeepTimer) -> Option<UpkeepTimer> {
        self.upkeep.replace(timer)
    }

    /// Take the timer out so the caller can dispose of it.
    pub fn disarm(&mut self) -> Option<UpkeepTimer> {
        self.upkeep.take()
    }

    /// Forget the destination and stop upkeep.
    pub fn clear(&mut self) -> Option<UpkeepTimer> {
        self.current = None;
        self.page_url = None;
        self.upkeep.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn dest(url: &str) -> Arc<Destination> {
        Arc::new(Destination::new("site", url))
    }

    #[test]
    fn test_idle_without_destination() {
        let mut state = NavigationState::new();
        assert_eq!(state.on_completed("https://a.example/"), CompletionDecision::Idle);
        assert!(!state.is_current(0));
    }

    #[test]
    fn test_begin_bumps_generation() {
        let mut state = NavigationState::new();
        let (g1, _) = state.begin(dest("https://a.example/page"));
        let (g2, _) = state.begin(dest("https://b.example/page"));
        assert!(g2 > g1);
        assert!(state.is_current(g2));
        assert!(!state.is_current(g1));
        assert!(state.destination_for(g1).is_none());
    }

    #[test]
    fn test_on_completed_same_host_reapplies() {
        let mut state = NavigationState::new();
        let (generation, _) = state.begin(dest("https://a.example/page"));
        match state.on_completed("https://a.example/other?x=1") {
            CompletionDecision::Reapply { generation: g, .. } => assert_eq!(g, generation),
            other => panic!("unexpected decision: {other:?}"),
        }
    }

    #[test]
    fn test_on_completed_other_host() {
        let mut state = NavigationState::new();
        state.begin(dest("https://a.example/page"));
        assert!(matches!(
            state.on_completed("https://b.example/x"),
            CompletionDecision::HostChanged { .. }
        ));
        assert!(matches!(
            state.on_completed("garbage"),
            CompletionDecision::HostChanged { .. }
        ));
    }

    #[test]
    fn test_completion_records_last_known_page() {
        let mut state = NavigationState::new();
        state.begin(dest("https://a.example/page"));
        assert!(!state.page_on_destination_host());

        state.on_completed("https://a.example/next");
        assert!(state.page_on_destination_host());

        state.on_completed("https://b.example/x");
        assert_eq!(state.page_url(), Some("https://b.example/x"));
        assert!(!state.page_on_destination_host());

        state.begin(dest("https://b.example/"));
        assert_eq!(state.page_url(), None);
    }

    #[tokio::test]
    async fn test_begin_hands_back_previous_timer() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut state = NavigationState::new();
        let (g1, _) = state.begin(dest("https://a.example/"));
        state.arm(UpkeepTimer::start(g1, Duration::from_secs(1), tx));
        assert!(state.upkeep_armed_for(g1));

        let (g2, previous) = state.begin(dest("https://b.example/"));
        assert_eq!(previous.map(|t| t.generation()), Some(g1));
        assert!(!state.upkeep_armed());
        assert!(!state.upkeep_armed_for(g2));
    }

    #[tokio::test]
    async fn test_clear_forgets_destination() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut state = NavigationState::new();
        let (g, _) = state.begin(dest("https://a.example/"));
        state.arm(UpkeepTimer::start(g, Duration::from_secs(1), tx));
        assert!(state.clear().is_some());
        assert!(state.destination().is_none());
        assert_eq!(state.on_completed("https://a.example/"), CompletionDecision::Idle);
    }
}
