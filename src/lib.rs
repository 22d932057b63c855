//! IP Rotator - rotating HTTP access through regional API gateways
//!
//! Creates one short-lived API gateway per region in front of a target origin and
//! sends each outgoing request through the next gateway, so consecutive requests
//! reach the origin from different source addresses.
//!
//! ## Features
//!
//! - Parallel endpoint creation and teardown across regions
//! - Round-robin endpoint selection shared by concurrent callers
//! - Rate-limit aware deletion with fixed backoff
//! - Orphan sweep for gateways left behind by interrupted runs
//! - Local HTTP relay for clients that cannot embed the library

pub mod config;
pub mod error;
pub mod gateway;
pub mod models;
pub mod proxy;
pub mod rotation;
pub mod router;

pub use config::Config;
pub use error::{ProviderError, Result, RotatorError};
pub use models::{EndpointRecord, RegionSet};
pub use rotation::{LifecycleState, RotationManager, ScopeOutcome};
pub use router::RotatingClient;
