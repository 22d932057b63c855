//! Deletion of one endpoint

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, instrument, warn};

use crate::error::ProviderError;
use crate::gateway::GatewayConnector;
use crate::models::EndpointRecord;

/// Wait between deletion attempts while the provider is throttling
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Deletes endpoints, retrying for as long as the provider throttles
#[derive(Clone)]
pub struct EndpointReaper {
    connector: Arc<dyn GatewayConnector>,
    retry_delay: Duration,
}

impl EndpointReaper {
    pub fn new(connector: Arc<dyn GatewayConnector>) -> Self {
        Self {
            connector,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }

    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    pub fn retry_delay(&self) -> Duration {
        self.retry_delay
    }

    /// Delete `record`'s gateway
    ///
    /// Rate-limit errors are retried without bound after a fixed delay; any other
    /// error is returned immediately.
    #[instrument(skip(self, record), fields(region = %record.region, gateway_id = %record.gateway_id))]
    pub async fn delete(&self, record: &EndpointRecord) -> Result<(), ProviderError> {
        info!("Deleting endpoint in {}", record.region);

        let client = self.connector.connect(&record.region).await?;
        let mut throttled = 0u32;

        loop {
            match client.delete_gateway(&record.gateway_id).await {
                Ok(()) => {
                    info!("Deleted endpoint {}", record.host());
                    return Ok(());
                }
                Err(e) if e.is_rate_limited() => {
                    throttled += 1;
                    warn!(
                        "Deletion throttled (attempt {}), retrying in {}s",
                        throttled,
                        self.retry_delay.as_secs_f32()
                    );
                    tokio::time::sleep(self.retry_delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
