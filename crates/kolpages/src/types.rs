//! Core data types for destinations, directives, and patch timing.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Marker placed in `special_handling` for destinations that need continuous patching.
pub const CONTINUOUS_MARKER: &str = "continuous";

/// A configured site the kiosk can navigate to.
///
/// Immutable once navigation begins; the orchestrator holds it behind an `Arc`
/// and replaces it wholesale on every new navigation.
///
/// PascalCase keys (`Name`, `ElementsToRemove`, `TimerName`, ...) are accepted
/// as well as camelCase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Destination {
    #[serde(alias = "Name")]
    pub name: String,
    #[serde(alias = "Url")]
    pub url: String,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        alias = "SpecialHandling",
        alias = "timerName",
        alias = "TimerName"
    )]
    pub special_handling: Option<String>,
    /// Hidden destinations stay navigable but are not offered in site pickers.
    #[serde(default = "default_visible", rename = "isVisible", alias = "IsVisible")]
    pub visible: bool,
    /// Element ids removed on every pass, in configuration order.
    #[serde(default, rename = "elementsToRemove", alias = "ElementsToRemove")]
    pub id_directives: Vec<String>,
    /// CSS selectors removed on every pass, in configuration order.
    #[serde(
        default,
        rename = "elementsToRemoveSelectors",
        alias = "ElementsToRemoveSelectors"
    )]
    pub selector_directives: Vec<String>,
}

fn default_visible() -> bool {
    true
}

impl Destination {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            special_handling: None,
            visible: true,
            id_directives: Vec::new(),
            selector_directives: Vec::new(),
        }
    }

    pub fn with_special_handling(mut self, tag: impl Into<String>) -> Self {
        self.special_handling = Some(tag.into());
        self
    }

    pub fn with_ids<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.id_directives = ids.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_selectors<I, S>(mut self, selectors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.selector_directives = selectors.into_iter().map(Into::into).collect();
        self
    }

    /// True when there is nothing to remove, in which case no pass ever runs.
    pub fn has_directives(&self) -> bool {
        !self.id_directives.is_empty() || !self.selector_directives.is_empty()
    }

    /// Whether the destination's tag matches the continuous-patch marker.
    pub fn wants_continuous(&self, marker: &str) -> bool {
        self.special_handling
            .as_deref()
            .is_some_and(|tag| tag.trim().eq_ignore_ascii_case(marker))
    }

    /// All directives in application order: ids first, then selectors.
    pub fn directives(&self) -> Vec<RemovalDirective> {
        self.id_directives
            .iter()
            .map(|id| RemovalDirective::ById(id.clone()))
            .chain(
                self.selector_directives
                    .iter()
                    .map(|sel| RemovalDirective::BySelector(sel.clone())),
            )
            .collect()
    }
}

/// A single idempotent DOM removal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum RemovalDirective {
    ById(String),
    BySelector(String),
}

/// Result reported by the surface when a navigation completes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavigationOutcome {
    pub success: bool,
    pub final_url: String,
}

/// Timing and marker knobs for the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchSettings {
    /// Attempts per burst after a navigation completes.
    pub burst_attempts: u32,
    /// Delay before each burst attempt.
    pub burst_delay: Duration,
    /// Period of the upkeep timer.
    pub upkeep_interval: Duration,
    /// `special_handling` value that arms the upkeep timer.
    pub continuous_marker: String,
}

impl Default for PatchSettings {
    fn default() -> Self {
        Self {
            burst_attempts: 3,
            burst_delay: Duration::from_millis(400),
            upkeep_interval: Duration::from_secs(1),
            continuous_marker: CONTINUOUS_MARKER.to_string(),
        }
    }
}

/// Errors surfaced by the orchestrator.
#[derive(thiserror::Error, Debug)]
pub enum PatchError {
    #[error("Rendering surface not attached")]
    SurfaceNotReady,

    #[error("Surface error: {0}")]
    Surface(String),

    #[error("Invalid destination: {0}")]
    InvalidDestination(String),
}

/// Convenience result type.
pub type PatchResult<T> = Result<T, PatchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directives_order_ids_then_selectors() {
        let dest = Destination::new("Tora", "https://tora.example/home")
            .with_ids(["ad1", "ad2"])
            .with_selectors([".popup"]);
        assert_eq!(
            dest.directives(),
            vec![
                RemovalDirective::ById("ad1".into()),
                RemovalDirective::ById("ad2".into()),
                RemovalDirective::BySelector(".popup".into()),
            ]
        );
    }

    #[test]
    fn test_has_directives() {
        assert!(!Destination::new("a", "https://a.example").has_directives());
        assert!(Destination::new("a", "https://a.example")
            .with_selectors([".x"])
            .has_directives());
    }

    #[test]
    fn test_wants_continuous_is_case_insensitive() {
        let dest = Destination::new("Tora", "https://tora.example").with_special_handling("Continuous");
        assert!(dest.wants_continuous(CONTINUOUS_MARKER));
        assert!(!Destination::new("x", "https://x.example").wants_continuous(CONTINUOUS_MARKER));
        assert!(!Destination::new("x", "https://x.example")
            .with_special_handling("sticky")
            .wants_continuous(CONTINUOUS_MARKER));
    }

    #[test]
    fn test_destination_from_config_json() {
        let json = r#"{
            "name": "Tora",
            "url": "https://tora.example/home",
            "specialHandling": "continuous",
            "elementsToRemove": ["ad1"],
            "elementsToRemoveSelectors": [".popup"]
        }"#;
        let dest: Destination = serde_json::from_str(json).unwrap();
        assert_eq!(dest.name, "Tora");
        assert!(dest.visible);
        assert_eq!(dest.id_directives, vec!["ad1"]);
        assert_eq!(dest.selector_directives, vec![".popup"]);
        assert_eq!(dest.special_handling.as_deref(), Some("continuous"));
    }

    #[test]
    fn test_default_settings() {
        let s = PatchSettings::default();
        assert_eq!(s.burst_attempts, 3);
        assert_eq!(s.burst_delay, Duration::from_millis(400));
        assert_eq!(s.upkeep_interval, Duration::from_secs(1));
    }
}
