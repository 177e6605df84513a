//! KolPages: navigation and DOM-patch orchestration for a curated kiosk browser.

pub mod events;
pub mod executor;
pub mod host;
pub mod orchestrator;
pub mod owner;
pub mod scripts;
pub mod state;
pub mod surface;
pub mod types;
pub mod upkeep;

pub use events::{DisarmReason, PatchEvent, PatchEventBus};
pub use executor::DirectiveExecutor;
pub use host::{same_host, CacheBuster};
pub use orchestrator::{CompletionOutcome, PatchOrchestrator, UpkeepOutcome};
pub use owner::{OwnerEvent, OwnerLoop};
pub use surface::{NavigationEvent, RenderSurface, SurfaceSlot};
pub use types::*;
