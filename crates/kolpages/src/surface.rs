//! Rendering surface abstraction.
//!
//! The orchestrator never renders anything itself. It drives a
//! [`RenderSurface`] (a browser tab, an embedded webview, a test double)
//! through this small contract.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, RwLock};

use crate::types::{NavigationOutcome, PatchError, PatchResult};

/// A navigation-completed notification from the surface.
///
/// Surfaces emit zero or more of these per navigation, including in-page
/// route changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavigationEvent {
    pub url: String,
    pub success: bool,
}

/// An embedded page-rendering component.
#[async_trait]
pub trait RenderSurface: Send + Sync {
    /// Navigate and resolve once the surface reports completion.
    async fn navigate(&self, url: &str) -> Result<NavigationOutcome>;
    /// Run a script in the page and return its JSON-encoded result.
    async fn execute_script(&self, script: &str) -> Result<String>;
    /// Current page URL, empty when the surface is not ready.
    async fn current_url(&self) -> String;
    /// Go back one history entry, if any.
    async fn go_back(&self) -> Result<()>;
    /// Reload the current page.
    async fn reload(&self) -> Result<()>;
    /// Subscribe to navigation-completed notifications.
    fn navigation_events(&self) -> broadcast::Receiver<NavigationEvent>;
}

/// Late-bound holder for the surface.
///
/// Hosts usually create the surface after the orchestrator exists, so every
/// call goes through the slot and fails with [`PatchError::SurfaceNotReady`]
/// until something is attached.
#[derive(Clone, Default)]
pub struct SurfaceSlot {
    inner: Arc<RwLock<Option<Arc<dyn RenderSurface>>>>,
}

impl SurfaceSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install (or replace) the surface.
    pub async fn attach(&self, surface: Arc<dyn RenderSurface>) {
        *self.inner.write().await = Some(surface);
    }

    /// Remove the surface, returning whatever was attached.
    pub async fn detach(&self) -> Option<Arc<dyn RenderSurface>> {
        self.inner.write().await.take()
    }

    pub async fn is_attached(&self) -> bool {
        self.inner.read().await.is_some()
    }

    /// The attached surface, or `SurfaceNotReady`.
    pub async fn get(&self) -> PatchResult<Arc<dyn RenderSurface>> {
        self.inner
            .read()
            .await
            .clone()
            .ok_or(PatchError::SurfaceNotReady)
    }
}

impl std::fmt::Debug for SurfaceSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SurfaceSlot").finish_non_exhaustive()
    }
}
