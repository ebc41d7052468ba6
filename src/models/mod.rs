pub mod target;

pub use target::{RenderState, TargetSpec, LEGACY_ROUTE, LEGACY_TARGET};
