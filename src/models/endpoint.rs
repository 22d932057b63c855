use std::fmt;
use std::sync::Arc;

/// Literal segment between the gateway identifier and the region in endpoint host names
pub const ENDPOINT_DOMAIN_SEGMENT: &str = "execute-api";

/// One provisioned regional proxy endpoint
///
/// Records are only built once the provider has assigned an identifier, and are
/// never mutated after being placed into the rotation pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointRecord {
    /// Gateway identifier assigned by the provider
    pub gateway_id: String,
    /// Region the gateway lives in
    pub region: String,
    /// Origin the gateway forwards to, shared by every record of a rotator
    pub target: Arc<str>,
}

impl EndpointRecord {
    pub fn new(gateway_id: impl Into<String>, region: impl Into<String>, target: Arc<str>) -> Self {
        Self {
            gateway_id: gateway_id.into(),
            region: region.into(),
            target,
        }
    }

    /// Public host name of the endpoint
    pub fn host(&self) -> String {
        format!(
            "{}.{}.{}.amazonaws.com",
            self.gateway_id, ENDPOINT_DOMAIN_SEGMENT, self.region
        )
    }
}

impl fmt::Display for EndpointRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.host(), self.target)
    }
}
