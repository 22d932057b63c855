//! Endpoint lifecycle and rotation
//!
//! This module provides:
//! - A round-robin cursor over the live endpoint pool
//! - The provisioner that creates one regional endpoint
//! - The reaper that deletes one endpoint, backing off while throttled
//! - The rotation manager that fans both out across regions

mod cursor;
mod manager;
mod provisioner;
mod reaper;

pub use cursor::RoundRobinCursor;
pub use manager::{RotationManager, RotationManagerBuilder, ScopeOutcome};
pub use provisioner::EndpointProvisioner;
pub use reaper::{EndpointReaper, DEFAULT_RETRY_DELAY};

use std::fmt;

/// Lifecycle of a [`RotationManager`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LifecycleState {
    #[default]
    Idle,
    Activating,
    Active,
    Deactivating,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Activating => "activating",
            Self::Active => "active",
            Self::Deactivating => "deactivating",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
