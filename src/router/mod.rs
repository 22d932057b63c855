//! Request routing
//!
//! Sends outgoing requests through the next endpoint of a [`RotationManager`].
//!
//! [`RotationManager`]: crate::rotation::RotationManager

mod client;

pub use client::{is_upgrade_request, rewrite_url, RotatingClient};
