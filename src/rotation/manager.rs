//! Rotation manager
//!
//! Owns the endpoint pool: builds it across all regions in parallel, hands out
//! endpoints in round-robin order, and tears everything down again.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use parking_lot::Mutex;
use tracing::{debug, info, instrument, warn};

use super::{EndpointProvisioner, EndpointReaper, LifecycleState, RoundRobinCursor};
use crate::config::normalize_target;
use crate::error::{EndpointFailure, RegionFailure, Result, RotatorError};
use crate::gateway::{GatewayConnector, GATEWAY_NAME, LIST_PAGE_SIZE};
use crate::models::{EndpointRecord, RegionSet};

/// Resets the lifecycle state to idle if an operation is abandoned midway
struct StateGuard<'a> {
    state: &'a Mutex<LifecycleState>,
    armed: bool,
}

impl<'a> StateGuard<'a> {
    fn new(state: &'a Mutex<LifecycleState>) -> Self {
        Self { state, armed: true }
    }

    fn finish(mut self, next: LifecycleState) {
        *self.state.lock() = next;
        self.armed = false;
    }
}

impl Drop for StateGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            *self.state.lock() = LifecycleState::Idle;
        }
    }
}

/// Result of [`RotationManager::with_active`]
#[derive(Debug)]
pub struct ScopeOutcome<T> {
    /// What the scoped closure returned
    pub output: T,
    /// Whether every endpoint was deleted afterwards
    pub teardown: Result<()>,
}

/// Manages a pool of regional proxy endpoints for one target origin
pub struct RotationManager {
    target: Arc<str>,
    regions: RegionSet,
    connector: Arc<dyn GatewayConnector>,
    provisioner: EndpointProvisioner,
    reaper: EndpointReaper,
    state: Mutex<LifecycleState>,
    cursor: RoundRobinCursor,
}

impl RotationManager {
    pub fn builder(
        target: impl Into<String>,
        connector: Arc<dyn GatewayConnector>,
    ) -> RotationManagerBuilder {
        RotationManagerBuilder::new(target, connector)
    }

    /// Normalised target origin, e.g. `https://example.com`
    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn regions(&self) -> &RegionSet {
        &self.regions
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.lock()
    }

    pub fn is_active(&self) -> bool {
        self.state() == LifecycleState::Active
    }

    /// Endpoints currently in the pool, in rotation order
    pub fn endpoints(&self) -> Vec<Arc<EndpointRecord>> {
        self.cursor.snapshot()
    }

    /// Create one endpoint per region and start rotating through them
    ///
    /// If any region fails, the endpoints that were created are deleted again
    /// before [`RotatorError::PartialActivation`] is returned.
    #[instrument(skip(self), fields(target = %self.target))]
    pub async fn activate(&self) -> Result<()> {
        {
            let mut state = self.state.lock();
            if *state != LifecycleState::Idle {
                return Err(RotatorError::InvalidState(*state));
            }
            *state = LifecycleState::Activating;
        }
        let guard = StateGuard::new(&self.state);

        info!("Activating {} regions: {}", self.regions.len(), self.regions);

        let results = join_all(self.regions.iter().map(|region| async move {
            (region, self.provisioner.provision(region).await)
        }))
        .await;

        let mut endpoints = Vec::with_capacity(results.len());
        let mut failures = Vec::new();
        for (region, result) in results {
            match result {
                Ok(record) => endpoints.push(record),
                Err(error) => {
                    warn!("Failed to create endpoint in {}: {}", region, error);
                    failures.push(RegionFailure {
                        region: region.to_string(),
                        error,
                    });
                }
            }
        }

        if !failures.is_empty() {
            warn!(
                "Activation failed in {} regions, deleting {} created endpoints",
                failures.len(),
                endpoints.len()
            );
            let cleanup_failures = self.reap_all(endpoints.iter()).await;
            guard.finish(LifecycleState::Idle);
            return Err(RotatorError::PartialActivation {
                failures,
                cleanup_failures,
                total: self.regions.len(),
            });
        }

        let count = endpoints.len();
        self.cursor.replace(endpoints);
        guard.finish(LifecycleState::Active);

        info!("Rotating through {} endpoints", count);
        Ok(())
    }

    /// Next endpoint in round-robin order
    ///
    /// # Panics
    ///
    /// Panics if the manager is not active.
    pub fn next(&self) -> Arc<EndpointRecord> {
        self.try_next()
            .expect("RotationManager::next called without an active endpoint pool")
    }

    /// Next endpoint in round-robin order, or `None` if the pool is empty
    pub fn try_next(&self) -> Option<Arc<EndpointRecord>> {
        let endpoint = self.cursor.next();
        if let Some(endpoint) = &endpoint {
            debug!(region = %endpoint.region, "Selected endpoint {}", endpoint.gateway_id);
        }
        endpoint
    }

    /// Delete every endpoint in the pool
    ///
    /// Every endpoint gets a deletion attempt; the pool is cleared even when some
    /// of them fail, and the failures are reported together.
    #[instrument(skip(self), fields(target = %self.target))]
    pub async fn deactivate(&self) -> Result<()> {
        {
            let mut state = self.state.lock();
            match *state {
                LifecycleState::Idle => return Ok(()),
                LifecycleState::Active => *state = LifecycleState::Deactivating,
                other => return Err(RotatorError::InvalidState(other)),
            }
        }
        let guard = StateGuard::new(&self.state);

        let pool = self.cursor.take();
        info!("Deactivating {} endpoints", pool.len());

        let failures = self.reap_all(pool.iter().map(Arc::as_ref)).await;
        guard.finish(LifecycleState::Idle);

        if failures.is_empty() {
            info!("All endpoints deleted");
            Ok(())
        } else {
            Err(RotatorError::AggregatedTeardown { failures })
        }
    }

    /// Activate, run `f`, and deactivate again whatever `f` returns
    ///
    /// Fails only when activation fails, in which case `f` never runs. Once `f`
    /// has run its output is always handed back, next to the teardown result.
    pub async fn with_active<F, Fut, T>(&self, f: F) -> Result<ScopeOutcome<T>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        self.activate().await?;
        let output = f().await;
        let teardown = self.deactivate().await;
        Ok(ScopeOutcome { output, teardown })
    }

    /// Delete every gateway this tool left behind in `region`
    ///
    /// Lists all gateways page by page and deletes those carrying the tool's
    /// display name, except endpoints in this manager's own live pool. Returns the
    /// number of gateways deleted.
    ///
    /// Refused while the pool is being built or torn down, since those
    /// endpoints are not in the pool yet and would look orphaned.
    #[instrument(skip(self))]
    pub async fn sweep_orphans(&self, region: &str) -> Result<usize> {
        let state = self.state();
        if matches!(
            state,
            LifecycleState::Activating | LifecycleState::Deactivating
        ) {
            return Err(RotatorError::InvalidState(state));
        }

        let live: HashSet<String> = self
            .cursor
            .snapshot()
            .iter()
            .filter(|r| r.region == region)
            .map(|r| r.gateway_id.clone())
            .collect();

        let orphans = {
            let client = self.connector.connect(region).await?;
            let mut orphans = Vec::new();
            let mut token: Option<String> = None;

            loop {
                let page = client.list_gateways(token.as_deref(), LIST_PAGE_SIZE).await?;
                orphans.extend(
                    page.items
                        .into_iter()
                        .filter(|g| g.name == GATEWAY_NAME && !live.contains(&g.id))
                        .map(|g| EndpointRecord::new(g.id, region, self.target.clone())),
                );

                match page.next_token {
                    Some(next) => token = Some(next),
                    None => break,
                }
            }
            orphans
        };

        info!("Found {} orphaned endpoints in {}", orphans.len(), region);

        let failures = self.reap_all(orphans.iter()).await;
        if failures.is_empty() {
            Ok(orphans.len())
        } else {
            Err(RotatorError::AggregatedTeardown { failures })
        }
    }

    /// Sweep every configured region in order, returning the total deleted
    pub async fn sweep_all_orphans(&self) -> Result<usize> {
        let mut total = 0;
        for region in self.regions.iter() {
            total += self.sweep_orphans(region).await?;
        }
        Ok(total)
    }

    /// Delete `records` concurrently, collecting every failure
    async fn reap_all<'a, I>(&self, records: I) -> Vec<EndpointFailure>
    where
        I: IntoIterator<Item = &'a EndpointRecord>,
    {
        let results = join_all(records.into_iter().map(|record| async move {
            (record, self.reaper.delete(record).await)
        }))
        .await;

        results
            .into_iter()
            .filter_map(|(record, result)| {
                result.err().map(|error| {
                    warn!(
                        "Failed to delete endpoint {} in {}: {}",
                        record.gateway_id, record.region, error
                    );
                    EndpointFailure {
                        region: record.region.clone(),
                        gateway_id: record.gateway_id.clone(),
                        error,
                    }
                })
            })
            .collect()
    }
}

/// Builder for creating a rotation manager
pub struct RotationManagerBuilder {
    target: String,
    connector: Arc<dyn GatewayConnector>,
    regions: RegionSet,
    retry_delay: Option<Duration>,
}

impl RotationManagerBuilder {
    pub fn new(target: impl Into<String>, connector: Arc<dyn GatewayConnector>) -> Self {
        Self {
            target: target.into(),
            connector,
            regions: RegionSet::default(),
            retry_delay: None,
        }
    }

    pub fn regions(mut self, regions: RegionSet) -> Self {
        self.regions = regions;
        self
    }

    /// Delay between deletion attempts while throttled
    pub fn retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = Some(retry_delay);
        self
    }

    pub fn build(self) -> Result<RotationManager> {
        let target: Arc<str> = Arc::from(normalize_target(&self.target)?);

        let mut reaper = EndpointReaper::new(self.connector.clone());
        if let Some(delay) = self.retry_delay {
            reaper = reaper.with_retry_delay(delay);
        }

        Ok(RotationManager {
            provisioner: EndpointProvisioner::new(self.connector.clone(), target.clone()),
            reaper,
            connector: self.connector,
            target,
            regions: self.regions,
            state: Mutex::new(LifecycleState::Idle),
            cursor: RoundRobinCursor::new(),
        })
    }
}
