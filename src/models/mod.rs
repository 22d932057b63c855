//! Data models

pub mod endpoint;
pub mod region;

pub use endpoint::{EndpointRecord, ENDPOINT_DOMAIN_SEGMENT};
pub use region::{RegionPreset, RegionSet, ALL_REGIONS, DEFAULT_REGIONS, EXTRA_REGIONS};
