//! In-memory gateway provider for tests
//!
//! Records every call and lets tests inject conflicts, throttling, failures and
//! multi-page listings per region.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{
    GatewayClient, GatewayConnector, GatewayPage, GatewaySpec, GatewaySummary, ProviderResult,
};
use crate::error::ProviderError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    Connect(String),
    CreateGateway { region: String, target: String },
    CreateStage { region: String, id: String },
    CreateDeployment { region: String, id: String },
    List { region: String, token: Option<String> },
    Delete { region: String, id: String },
}

#[derive(Default)]
struct State {
    next_id: usize,
    gateways: Vec<(String, GatewaySummary)>,
    calls: Vec<Call>,
    fail_create: HashSet<String>,
    empty_id: HashSet<String>,
    fail_deployment: HashSet<String>,
    fail_delete: HashSet<String>,
    stage_conflict: bool,
    rate_limits: HashMap<String, usize>,
    page_size: Option<usize>,
    create_delay: Option<Duration>,
}

#[derive(Clone, Default)]
pub(crate) struct FakeGateway {
    state: Arc<Mutex<State>>,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_create_in(self, region: &str) -> Self {
        self.state.lock().fail_create.insert(region.to_string());
        self
    }

    /// Answer creations in `region` with an empty identifier
    pub fn empty_id_in(self, region: &str) -> Self {
        self.state.lock().empty_id.insert(region.to_string());
        self
    }

    pub fn fail_deployment_in(self, region: &str) -> Self {
        self.state.lock().fail_deployment.insert(region.to_string());
        self
    }

    pub fn fail_delete_in(self, region: &str) -> Self {
        self.state.lock().fail_delete.insert(region.to_string());
        self
    }

    pub fn conflict_on_stage(self) -> Self {
        self.state.lock().stage_conflict = true;
        self
    }

    /// Throttle the next `times` deletions of `id`
    pub fn rate_limit_delete(self, id: &str, times: usize) -> Self {
        self.state.lock().rate_limits.insert(id.to_string(), times);
        self
    }

    pub fn with_page_size(self, size: usize) -> Self {
        self.state.lock().page_size = Some(size);
        self
    }

    pub fn with_create_delay(self, delay: Duration) -> Self {
        self.state.lock().create_delay = Some(delay);
        self
    }

    /// Add an existing gateway without recording a call
    pub fn seed(&self, region: &str, id: &str, name: &str) {
        self.state.lock().gateways.push((
            region.to_string(),
            GatewaySummary {
                id: id.to_string(),
                name: name.to_string(),
            },
        ));
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().calls.clone()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.state.lock().calls.iter().filter(|c| pred(c)).count()
    }

    pub fn live(&self, region: &str) -> Vec<GatewaySummary> {
        self.state
            .lock()
            .gateways
            .iter()
            .filter(|(r, _)| r == region)
            .map(|(_, g)| g.clone())
            .collect()
    }

    pub fn live_count(&self) -> usize {
        self.state.lock().gateways.len()
    }
}

#[async_trait]
impl GatewayConnector for FakeGateway {
    async fn connect(&self, region: &str) -> ProviderResult<Box<dyn GatewayClient>> {
        self.state.lock().calls.push(Call::Connect(region.to_string()));
        Ok(Box::new(FakeClient {
            region: region.to_string(),
            state: self.state.clone(),
        }))
    }
}

struct FakeClient {
    region: String,
    state: Arc<Mutex<State>>,
}

#[async_trait]
impl GatewayClient for FakeClient {
    fn region(&self) -> &str {
        &self.region
    }

    async fn create_gateway(&self, spec: &GatewaySpec) -> ProviderResult<String> {
        let delay = self.state.lock().create_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock();
        state.calls.push(Call::CreateGateway {
            region: self.region.clone(),
            target: spec.target.clone(),
        });
        if state.fail_create.contains(&self.region) {
            return Err(ProviderError::new(
                "AccessDeniedException",
                Some(403),
                format!("region {} is not enabled", self.region),
            ));
        }

        if state.empty_id.contains(&self.region) {
            return Ok(String::new());
        }

        state.next_id += 1;
        let id = format!("gw{}", state.next_id);
        state.gateways.push((
            self.region.clone(),
            GatewaySummary {
                id: id.clone(),
                name: spec.name.clone(),
            },
        ));
        Ok(id)
    }

    async fn create_stage(&self, gateway_id: &str, _stage_name: &str) -> ProviderResult<()> {
        let mut state = self.state.lock();
        state.calls.push(Call::CreateStage {
            region: self.region.clone(),
            id: gateway_id.to_string(),
        });
        if state.stage_conflict {
            return Err(ProviderError::conflict("Stage already exists"));
        }
        Ok(())
    }

    async fn create_deployment(&self, gateway_id: &str, _stage_name: &str) -> ProviderResult<()> {
        let mut state = self.state.lock();
        state.calls.push(Call::CreateDeployment {
            region: self.region.clone(),
            id: gateway_id.to_string(),
        });
        if state.fail_deployment.contains(&self.region) {
            return Err(ProviderError::new(
                "BadRequestException",
                Some(400),
                "deployment rejected",
            ));
        }
        Ok(())
    }

    async fn list_gateways(
        &self,
        page_token: Option<&str>,
        page_size: u32,
    ) -> ProviderResult<GatewayPage> {
        let mut state = self.state.lock();
        state.calls.push(Call::List {
            region: self.region.clone(),
            token: page_token.map(str::to_string),
        });

        let items: Vec<GatewaySummary> = state
            .gateways
            .iter()
            .filter(|(r, _)| *r == self.region)
            .map(|(_, g)| g.clone())
            .collect();
        let size = state.page_size.unwrap_or(page_size as usize).max(1);
        let start: usize = page_token.and_then(|t| t.parse().ok()).unwrap_or(0);
        let end = (start + size).min(items.len());

        Ok(GatewayPage {
            items: items.get(start..end).map(|s| s.to_vec()).unwrap_or_default(),
            next_token: (end < items.len()).then(|| end.to_string()),
        })
    }

    async fn delete_gateway(&self, gateway_id: &str) -> ProviderResult<()> {
        let mut state = self.state.lock();
        state.calls.push(Call::Delete {
            region: self.region.clone(),
            id: gateway_id.to_string(),
        });

        if state.fail_delete.contains(&self.region) {
            return Err(ProviderError::new(
                "BadRequestException",
                Some(400),
                format!("cannot delete {}", gateway_id),
            ));
        }
        if let Some(remaining) = state.rate_limits.get_mut(gateway_id) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(ProviderError::too_many_requests("Too Many Requests"));
            }
        }

        let before = state.gateways.len();
        let region = self.region.clone();
        state
            .gateways
            .retain(|(r, g)| !(*r == region && g.id == gateway_id));
        if state.gateways.len() == before {
            return Err(ProviderError::new(
                "NotFoundException",
                Some(404),
                format!("gateway {} not found", gateway_id),
            ));
        }
        Ok(())
    }
}
