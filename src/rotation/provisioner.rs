//! Creation of one regional endpoint

use std::sync::Arc;

use tracing::{debug, info, instrument};

use crate::error::{ProviderError, INVALID_RESPONSE_CODE};
use crate::gateway::{GatewayConnector, GatewaySpec, STAGE_NAME};
use crate::models::EndpointRecord;

/// Creates proxy gateways in front of a fixed target origin
///
/// Every endpoint created here is a billable resource until an
/// [`EndpointReaper`](super::EndpointReaper) deletes it.
#[derive(Clone)]
pub struct EndpointProvisioner {
    connector: Arc<dyn GatewayConnector>,
    target: Arc<str>,
}

impl EndpointProvisioner {
    pub fn new(connector: Arc<dyn GatewayConnector>, target: Arc<str>) -> Self {
        Self { connector, target }
    }

    /// Create, stage and deploy a gateway in `region`
    #[instrument(skip(self), fields(target = %self.target))]
    pub async fn provision(&self, region: &str) -> Result<EndpointRecord, ProviderError> {
        info!("Creating endpoint in {}", region);

        // Connection is dropped on every return path below.
        let client = self.connector.connect(region).await?;

        let gateway_id = client
            .create_gateway(&GatewaySpec::http_proxy(self.target.as_ref()))
            .await?;
        if gateway_id.trim().is_empty() {
            return Err(ProviderError::new(
                INVALID_RESPONSE_CODE,
                None,
                "provider returned an empty gateway identifier",
            ));
        }
        let record = EndpointRecord::new(gateway_id, region, self.target.clone());

        match client.create_stage(&record.gateway_id, STAGE_NAME).await {
            Ok(()) => {}
            Err(e) if e.is_conflict() => {
                debug!(gateway_id = %record.gateway_id, "Stage {} already exists", STAGE_NAME);
            }
            Err(e) => return Err(e),
        }

        client
            .create_deployment(&record.gateway_id, STAGE_NAME)
            .await?;

        info!(gateway_id = %record.gateway_id, "Endpoint ready at {}", record.host());
        Ok(record)
    }
}
