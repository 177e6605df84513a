//! Chromium rendering surface using chromiumoxide.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::page::{
    EventFrameNavigated, EventNavigatedWithinDocument,
};
use chromiumoxide::page::Page;
use futures::StreamExt;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;

use kolpages::{scripts, NavigationEvent, NavigationOutcome, RenderSurface};

use crate::config::BrowserSettings;

const EVENT_BUFFER: usize = 64;

/// Find the Chromium binary path.
pub fn find_chromium(explicit: Option<&str>) -> Option<PathBuf> {
    // 1. Config file
    if let Some(p) = explicit {
        let path = PathBuf::from(p);
        if path.exists() {
            return Some(path);
        }
        tracing::warn!("Configured chromiumPath does not exist: {p}");
    }

    // 2. KOLPAGES_CHROMIUM_PATH env
    if let Ok(p) = std::env::var("KOLPAGES_CHROMIUM_PATH") {
        let path = PathBuf::from(&p);
        if path.exists() {
            return Some(path);
        }
    }

    // 3. System PATH
    for candidate in ["google-chrome", "chromium", "chromium-browser", "chrome"] {
        if let Ok(path) = which::which(candidate) {
            return Some(path);
        }
    }

    // 4. Common install locations
    let common: &[&str] = if cfg!(target_os = "macos") {
        &["/Applications/Google Chrome.app/Contents/MacOS/Google Chrome"]
    } else if cfg!(target_os = "windows") {
        &[
            r"C:\Program Files\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
        ]
    } else {
        &[]
    };
    common.iter().map(PathBuf::from).find(|p| p.exists())
}

/// A single Chromium window driven as a [`RenderSurface`].
pub struct ChromiumSurface {
    browser: Mutex<Browser>,
    page: Page,
    events: broadcast::Sender<NavigationEvent>,
    tasks: Vec<JoinHandle<()>>,
    profile_dir: PathBuf,
    navigation_timeout: Duration,
}

impl ChromiumSurface {
    /// Launch Chromium with a throwaway profile and open a blank page.
    pub async fn launch(settings: &BrowserSettings) -> Result<Self> {
        let chrome_path = find_chromium(settings.chromium_path.as_deref()).context(
            "Chromium not found. Set browser.chromiumPath or KOLPAGES_CHROMIUM_PATH.",
        )?;

        let profile_dir = std::env::temp_dir()
            .join("kolpages")
            .join("chromium")
            .join(uuid::Uuid::new_v4().simple().to_string());
        std::fs::create_dir_all(&profile_dir).with_context(|| {
            format!("failed to create profile dir {}", profile_dir.display())
        })?;

        let mut builder = BrowserConfig::builder()
            .chrome_executable(chrome_path)
            .user_data_dir(&profile_dir)
            .window_size(settings.window_width, settings.window_height)
            .viewport(None)
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--disable-extensions")
            .arg("--disable-translate")
            .arg("--noerrdialogs");
        if settings.headless {
            builder = builder.arg("--headless=new").arg("--disable-gpu");
        } else {
            builder = builder.with_head();
        }
        if settings.kiosk && !settings.headless {
            builder = builder.arg("--kiosk");
        }
        let config = builder
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build browser config: {e}"))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("failed to launch Chromium")?;

        let mut tasks = Vec::new();
        tasks.push(tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::trace!("CDP handler error: {e}");
                }
            }
        }));

        let page = browser
            .new_page("about:blank")
            .await
            .context("failed to create page")?;

        let (events, _) = broadcast::channel(EVENT_BUFFER);
        tasks.push(spawn_frame_listener(&page, events.clone()).await?);
        tasks.push(spawn_same_document_listener(&page, events.clone()).await?);

        tracing::info!("Chromium launched (profile {})", profile_dir.display());

        Ok(Self {
            browser: Mutex::new(browser),
            page,
            events,
            tasks,
            profile_dir,
            navigation_timeout: Duration::from_millis(settings.navigation_timeout_ms),
        })
    }

    /// Close the browser and delete the temporary profile.
    pub async fn close(&self) -> Result<()> {
        for task in &self.tasks {
            task.abort();
        }
        let mut browser = self.browser.lock().await;
        if let Err(e) = browser.close().await {
            tracing::debug!("Browser close failed: {e}");
        }
        let _ = browser.wait().await;
        if let Err(e) = std::fs::remove_dir_all(&self.profile_dir) {
            tracing::debug!(
                "Could not remove profile dir {}: {e}",
                self.profile_dir.display()
            );
        }
        Ok(())
    }
}

#[async_trait]
impl RenderSurface for ChromiumSurface {
    async fn navigate(&self, url: &str) -> Result<NavigationOutcome> {
        let result = tokio::time::timeout(self.navigation_timeout, self.page.goto(url)).await;

        match result {
            Ok(Ok(_)) => {
                let _ = self.page.wait_for_navigation().await;
                let final_url = self
                    .page
                    .url()
                    .await
                    .unwrap_or_default()
                    .unwrap_or_else(|| url.to_string());
                Ok(NavigationOutcome {
                    success: true,
                    final_url,
                })
            }
            Ok(Err(e)) => bail!("navigation failed: {e}"),
            Err(_) => bail!(
                "navigation timed out after {}ms",
                self.navigation_timeout.as_millis()
            ),
        }
    }

    async fn execute_script(&self, script: &str) -> Result<String> {
        let result = self
            .page
            .evaluate(script)
            .await
            .context("JS execution failed")?;
        Ok(result
            .value()
            .cloned()
            .unwrap_or(serde_json::Value::Null)
            .to_string())
    }

    async fn current_url(&self) -> String {
        self.page.url().await.ok().flatten().unwrap_or_default()
    }

    async fn go_back(&self) -> Result<()> {
        self.page
            .evaluate(scripts::history_back())
            .await
            .context("history.back failed")?;
        Ok(())
    }

    async fn reload(&self) -> Result<()> {
        self.page.reload().await.context("reload failed")?;
        Ok(())
    }

    fn navigation_events(&self) -> broadcast::Receiver<NavigationEvent> {
        self.events.subscribe()
    }
}

/// Forward top-level frame navigations.
async fn spawn_frame_listener(
    page: &Page,
    events: broadcast::Sender<NavigationEvent>,
) -> Result<JoinHandle<()>> {
    let mut stream = page
        .event_listener::<EventFrameNavigated>()
        .await
        .context("failed to subscribe to frame navigations")?;
    Ok(tokio::spawn(async move {
        while let Some(event) = stream.next().await {
            let event: Arc<EventFrameNavigated> = event;
            if event.frame.parent_id.is_some() {
                continue;
            }
            let url = match &event.frame.url_fragment {
                Some(fragment) => format!("{}{}", event.frame.url, fragment),
                None => event.frame.url.clone(),
            };
            let _ = events.send(NavigationEvent { url, success: true });
        }
    }))
}

/// Forward history API and fragment changes of the main frame.
async fn spawn_same_document_listener(
    page: &Page,
    events: broadcast::Sender<NavigationEvent>,
) -> Result<JoinHandle<()>> {
    let mut stream = page
        .event_listener::<EventNavigatedWithinDocument>()
        .await
        .context("failed to subscribe to in-document navigations")?;
    let page = page.clone();
    Ok(tokio::spawn(async move {
        while let Some(event) = stream.next().await {
            let main_frame = page.mainframe().await.ok().flatten();
            if main_frame.as_ref() != Some(&event.frame_id) {
                continue;
            }
            let _ = events.send(NavigationEvent {
                url: event.url.clone(),
                success: true,
            });
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[ignore] // Requires Chromium to be installed
    async fn test_chromium_navigate_and_patch() {
        let settings = BrowserSettings {
            headless: true,
            ..BrowserSettings::default()
        };
        let surface = ChromiumSurface::launch(&settings)
            .await
            .expect("failed to launch chromium");

        let outcome = surface
            .navigate("data:text/html,<div id='ad1'>ad</div><p class='popup'>x</p><h1>Hello</h1>")
            .await
            .expect("navigation failed");
        assert!(outcome.success);

        let removed = surface
            .execute_script(&scripts::remove_by_id("ad1"))
            .await
            .expect("script failed");
        assert_eq!(removed, "1");

        let remaining = surface
            .execute_script("document.querySelectorAll('#ad1').length")
            .await
            .expect("script failed");
        assert_eq!(remaining, "0");

        surface.close().await.expect("close failed");
    }
}
