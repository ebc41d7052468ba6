pub mod discovery;
pub mod render_coordinator;
pub mod target_registry;

pub use discovery::{build_target_specs, discover_apps};
pub use render_coordinator::{RenderCoordinator, RenderOutcome, RenderPolicy};
pub use target_registry::{RenderTarget, TargetRegistry, TargetStatus};
