//! KolPages kiosk: curated third-party sites in a patched Chromium window.

pub mod browser;
pub mod config;
pub mod kiosk;
pub mod repl;

pub use config::{resolve_config_path, KioskConfig};
pub use kiosk::{Kiosk, KioskError, KioskResult};
