//! In-process runtime
//!
//! Keeps containers in memory. Used by `RUNTIME=memory` to exercise the
//! webhook without a Docker daemon, and by tests, which can inject
//! failures into individual operations.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::{async_trait, ContainerRuntime};
use crate::error::{Result, ScalerError};
use crate::models::{ContainerSpec, ManagedInstance};

#[derive(Debug, Default)]
struct State {
    containers: Vec<ManagedInstance>,
    /// container id -> attached networks
    networks: HashMap<String, Vec<String>>,
    next_id: u64,
    stopped: Vec<String>,
}

/// Runtime that keeps containers in memory
#[derive(Debug)]
pub struct InMemoryRuntime {
    state: RwLock<State>,
    epoch: DateTime<Utc>,
    unreachable: AtomicBool,
    reject_binds: AtomicBool,
    fail_stops: AtomicBool,
    /// Runs that may succeed before every further run fails
    run_budget: AtomicUsize,
    failing_networks: RwLock<Vec<String>>,
    run_calls: AtomicUsize,
}

impl Default for InMemoryRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryRuntime {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(State::default()),
            epoch: Utc::now(),
            unreachable: AtomicBool::new(false),
            reject_binds: AtomicBool::new(false),
            fail_stops: AtomicBool::new(false),
            run_budget: AtomicUsize::new(usize::MAX),
            failing_networks: RwLock::new(Vec::new()),
            run_calls: AtomicUsize::new(0),
        }
    }

    /// Add a running container, as if started by something else
    pub async fn insert(
        &self,
        name: &str,
        image: &str,
        labels: HashMap<String, String>,
    ) -> ManagedInstance {
        let mut state = self.state.write().await;
        let instance = self.next_instance(&mut state, Some(name), image, labels, Vec::new());
        state.containers.push(instance.clone());
        instance
    }

    /// Every call fails as if the daemon could not be reached
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    /// Runs that request a bind mount fail
    pub fn set_reject_binds(&self, reject: bool) {
        self.reject_binds.store(reject, Ordering::SeqCst);
    }

    pub fn set_fail_stops(&self, fail: bool) {
        self.fail_stops.store(fail, Ordering::SeqCst);
    }

    /// Allow `n` more successful runs; every run after that fails
    pub fn fail_runs_after(&self, n: usize) {
        self.run_budget.store(n, Ordering::SeqCst);
    }

    pub async fn fail_network(&self, network: &str) {
        self.failing_networks.write().await.push(network.to_string());
    }

    pub async fn networks_of(&self, container_id: &str) -> Vec<String> {
        self.state
            .read()
            .await
            .networks
            .get(container_id)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn containers(&self) -> Vec<ManagedInstance> {
        self.state.read().await.containers.clone()
    }

    /// Containers that received a stop call, in order
    pub async fn stopped(&self) -> Vec<String> {
        self.state.read().await.stopped.clone()
    }

    /// Number of `run` calls, successful or not
    pub fn run_calls(&self) -> usize {
        self.run_calls.load(Ordering::SeqCst)
    }

    fn check_reachable(&self) -> Result<()> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(ScalerError::Runtime(
                "cannot connect to the container runtime".to_string(),
            ));
        }
        Ok(())
    }

    fn next_instance(
        &self,
        state: &mut State,
        name: Option<&str>,
        image: &str,
        labels: HashMap<String, String>,
        mounts: Vec<String>,
    ) -> ManagedInstance {
        state.next_id += 1;
        let seq = state.next_id;
        ManagedInstance {
            id: format!("{:012x}", seq),
            name: name
                .map(str::to_string)
                .unwrap_or_else(|| format!("replica-{}", seq)),
            // Strictly increasing so newest-first selection is deterministic
            created: self.epoch + chrono::Duration::seconds(seq as i64),
            image: image.to_string(),
            image_id: image.to_string(),
            labels,
            mounts,
        }
    }

    fn take_run_budget(&self) -> bool {
        self.run_budget
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl ContainerRuntime for InMemoryRuntime {
    async fn list_by_label(&self, key: &str, value: &str) -> Result<Vec<ManagedInstance>> {
        self.check_reachable()?;
        Ok(self
            .state
            .read()
            .await
            .containers
            .iter()
            .filter(|c| c.label(key) == Some(value))
            .cloned()
            .collect())
    }

    async fn image_tags(&self, image_id: &str) -> Result<Vec<String>> {
        self.check_reachable()?;
        let state = self.state.read().await;
        if state.containers.iter().any(|c| c.image_id == image_id) {
            Ok(vec![image_id.to_string()])
        } else {
            Err(ScalerError::Runtime(format!("no such image: {}", image_id)))
        }
    }

    async fn run(&self, spec: &ContainerSpec) -> Result<ManagedInstance> {
        self.run_calls.fetch_add(1, Ordering::SeqCst);
        self.check_reachable()?;
        if spec.bind.is_some() && self.reject_binds.load(Ordering::SeqCst) {
            return Err(ScalerError::Runtime(
                "bind mount source is not accessible".to_string(),
            ));
        }
        if !self.take_run_budget() {
            return Err(ScalerError::Runtime("container failed to start".to_string()));
        }

        let mounts = spec.bind.iter().map(|b| b.target.clone()).collect();
        let mut state = self.state.write().await;
        let instance =
            self.next_instance(&mut state, None, &spec.image, spec.labels.clone(), mounts);
        if let Some(network) = &spec.network {
            state
                .networks
                .insert(instance.id.clone(), vec![network.clone()]);
        }
        state.containers.push(instance.clone());
        Ok(instance)
    }

    async fn connect_network(&self, network: &str, container_id: &str) -> Result<()> {
        self.check_reachable()?;
        if self
            .failing_networks
            .read()
            .await
            .iter()
            .any(|n| n == network)
        {
            return Err(ScalerError::Runtime(format!("network {} not found", network)));
        }
        let mut state = self.state.write().await;
        if !state.containers.iter().any(|c| c.id == container_id) {
            return Err(ScalerError::Runtime(format!(
                "no such container: {}",
                container_id
            )));
        }
        state
            .networks
            .entry(container_id.to_string())
            .or_default()
            .push(network.to_string());
        Ok(())
    }

    async fn stop(&self, container_id: &str, _grace: Duration) -> Result<()> {
        self.check_reachable()?;
        if self.fail_stops.load(Ordering::SeqCst) {
            return Err(ScalerError::Runtime(format!(
                "cannot stop container {}: permission denied",
                container_id
            )));
        }
        let mut state = self.state.write().await;
        if !state.containers.iter().any(|c| c.id == container_id) {
            return Err(ScalerError::Runtime(format!(
                "no such container: {}",
                container_id
            )));
        }
        state.stopped.push(container_id.to_string());
        Ok(())
    }

    async fn remove(&self, container_id: &str) -> Result<()> {
        self.check_reachable()?;
        let mut state = self.state.write().await;
        let before = state.containers.len();
        state.containers.retain(|c| c.id != container_id);
        if state.containers.len() == before {
            return Err(ScalerError::Runtime(format!(
                "no such container: {}",
                container_id
            )));
        }
        state.networks.remove(container_id);
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        self.check_reachable()
    }
}
