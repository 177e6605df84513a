//! Browser backends for the kiosk window.

pub mod chromium;

pub use chromium::{find_chromium, ChromiumSurface};
