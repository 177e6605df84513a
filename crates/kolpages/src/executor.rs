//! Directive executor: turns directives into best-effort script calls.

use crate::scripts;
use crate::surface::SurfaceSlot;
use crate::types::{PatchResult, RemovalDirective};

/// Applies removal directives and keyboard one-shots against the attached surface.
///
/// Script failures are logged and reported as an empty result: a missing
/// element is the normal steady state, not an error. The only error that
/// reaches callers is [`crate::PatchError::SurfaceNotReady`].
#[derive(Debug, Clone)]
pub struct DirectiveExecutor {
    slot: SurfaceSlot,
}

impl DirectiveExecutor {
    pub fn new(slot: SurfaceSlot) -> Self {
        Self { slot }
    }

    /// Run a script, mapping execution failures to `""`.
    pub async fn run_script(&self, script: &str) -> PatchResult<String> {
        let surface = self.slot.get().await?;
        match surface.execute_script(script).await {
            Ok(result) => Ok(result),
            Err(e) => {
                tracing::debug!("Script execution failed: {e:#}");
                Ok(String::new())
            }
        }
    }

    /// Apply one directive, discarding the result.
    pub async fn apply(&self, directive: &RemovalDirective) -> PatchResult<()> {
        if let RemovalDirective::BySelector(selector) = directive {
            if selector.trim().is_empty() {
                return Ok(());
            }
        }
        let result = self.run_script(&scripts::removal_script(directive)).await?;
        tracing::trace!(?directive, removed = %result, "directive applied");
        Ok(())
    }

    /// Remove elements by id, in order.
    pub async fn apply_identifiers(&self, identifiers: &[String]) -> PatchResult<()> {
        for id in identifiers {
            self.apply(&RemovalDirective::ById(id.clone())).await?;
        }
        Ok(())
    }

    /// Remove elements matching each selector, in order. Blank selectors are skipped.
    pub async fn apply_selectors(&self, selectors: &[String]) -> PatchResult<()> {
        for selector in selectors {
            self.apply(&RemovalDirective::BySelector(selector.clone()))
                .await?;
        }
        Ok(())
    }

    pub async fn remove_by_onclick(&self, value: &str) -> PatchResult<()> {
        self.run_script(&scripts::remove_by_onclick(value)).await?;
        Ok(())
    }

    pub async fn remove_by_href(&self, href: &str) -> PatchResult<()> {
        self.run_script(&scripts::remove_by_href(href)).await?;
        Ok(())
    }

    /// Append text to the focused input. Empty text is ignored.
    pub async fn insert_text(&self, text: &str) -> PatchResult<()> {
        if text.is_empty() {
            return Ok(());
        }
        self.run_script(&scripts::insert_text(text)).await?;
        Ok(())
    }

    pub async fn delete_last_character(&self) -> PatchResult<()> {
        self.run_script(&scripts::delete_last_character()).await?;
        Ok(())
    }

    pub async fn press_enter(&self) -> PatchResult<()> {
        self.run_script(&scripts::press_enter()).await?;
        Ok(())
    }
}
