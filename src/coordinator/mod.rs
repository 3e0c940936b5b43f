//! Platform Coordinator
//!
//! Starts and stops the registry and scheduler together and runs the
//! background health and metrics loops.

#[allow(clippy::module_inception)]
pub mod coordinator;
pub mod state;

pub use coordinator::Coordinator;
pub use state::{PlatformInfo, PlatformSnapshot, PlatformStatus, PLATFORM_FEATURES};
