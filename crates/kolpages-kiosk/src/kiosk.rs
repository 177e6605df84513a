//! Kiosk session: one browser window, one orchestrator, one config.

use std::sync::Arc;

use tokio::task::JoinHandle;

use kolpages::{
    Destination, NavigationOutcome, PatchError, PatchOrchestrator, RenderSurface,
};

use crate::browser::ChromiumSurface;
use crate::config::KioskConfig;

/// Errors surfaced to the CLI.
#[derive(thiserror::Error, Debug)]
pub enum KioskError {
    #[error("Unknown site '{0}'. Run `kolpages sites` to list configured sites.")]
    UnknownSite(String),

    #[error(transparent)]
    Patch(#[from] PatchError),

    #[error(transparent)]
    Browser(#[from] anyhow::Error),
}

pub type KioskResult<T> = Result<T, KioskError>;

/// A running kiosk.
pub struct Kiosk {
    config: KioskConfig,
    orchestrator: PatchOrchestrator,
    owner: JoinHandle<()>,
    chromium: Option<Arc<ChromiumSurface>>,
}

impl Kiosk {
    /// Launch Chromium and wire it to a fresh orchestrator.
    pub async fn launch(config: KioskConfig) -> KioskResult<Self> {
        let chromium = Arc::new(ChromiumSurface::launch(&config.browser).await?);
        let mut kiosk = Self::with_surface(config, chromium.clone()).await;
        kiosk.chromium = Some(chromium);
        Ok(kiosk)
    }

    /// Build a kiosk around an already running surface.
    pub async fn with_surface(config: KioskConfig, surface: Arc<dyn RenderSurface>) -> Self {
        let (orchestrator, owner) =
            PatchOrchestrator::spawn(config.patching.to_patch_settings());
        orchestrator.attach(surface).await;
        Self {
            config,
            orchestrator,
            owner,
            chromium: None,
        }
    }

    pub fn config(&self) -> &KioskConfig {
        &self.config
    }

    pub fn orchestrator(&self) -> &PatchOrchestrator {
        &self.orchestrator
    }

    /// Open a configured site by name.
    pub async fn open(&self, name: &str) -> KioskResult<NavigationOutcome> {
        let site = self
            .config
            .find_site(name)
            .cloned()
            .ok_or_else(|| KioskError::UnknownSite(name.trim().to_string()))?;
        self.open_destination(site).await
    }

    pub async fn open_destination(&self, site: Destination) -> KioskResult<NavigationOutcome> {
        let outcome = self.orchestrator.navigate_to(site).await?;
        if !outcome.success {
            tracing::warn!("Navigation did not complete; final url {}", outcome.final_url);
        }
        Ok(outcome)
    }

    /// Stop the orchestrator and close the browser.
    pub async fn shutdown(self) -> KioskResult<()> {
        self.orchestrator.shutdown().await;
        if let Err(e) = self.owner.await {
            tracing::debug!("Owner loop ended abnormally: {e}");
        }
        if let Some(chromium) = self.chromium {
            chromium.close().await?;
        }
        Ok(())
    }
}
