//! Scan pipeline: plugin ordering, hook phases and the chroot build

pub mod hooks;
pub mod orchestrator;
pub mod ordering;

pub use hooks::{Hook, HookContext, HookPhase};
pub use orchestrator::ScanPipeline;
pub use ordering::order_plugins;
