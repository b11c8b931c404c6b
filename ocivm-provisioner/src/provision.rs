use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use ocivm_common::error::{Error, Result};
use ocivm_common::{
    DeploymentSummary, Instance, LifecycleState, NetworkInterface, ProvisionRequest,
    ProvisionResult,
};
use ocivm_providers::{LaunchSpec, ProviderClients};

use crate::clock::{Clock, SystemClock};
use crate::resolve;
use crate::services::lookup_interface;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Drives one instance from request to RUNNING: resolve image, network and
/// key, submit the launch, poll the provider-owned lifecycle at a fixed
/// interval, then discover the assigned addresses. Strictly sequential; the
/// caller is suspended for the whole wait.
pub struct Provisioner {
    clients: ProviderClients,
    clock: Arc<dyn Clock>,
    poll_interval: Duration,
    /// None polls until a terminal state; Some(budget) gives up with a
    /// Timeout once the budget is consumed. Timeout never terminates the
    /// instance server-side.
    max_wait: Option<Duration>,
    summary_path: Option<PathBuf>,
}

impl Provisioner {
    pub fn new(clients: ProviderClients) -> Self {
        Provisioner {
            clients,
            clock: Arc::new(SystemClock),
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_wait: None,
            summary_path: None,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_max_wait(mut self, max_wait: Option<Duration>) -> Self {
        self.max_wait = max_wait;
        self
    }

    /// Advisory JSON record of the provisioned instance; written best-effort
    /// after success, never read back.
    pub fn with_summary_path(mut self, path: Option<PathBuf>) -> Self {
        self.summary_path = path;
        self
    }

    pub async fn provision(&self, request: &ProvisionRequest) -> Result<ProvisionResult> {
        let image = resolve::resolve_image(
            self.clients.compute.as_ref(),
            &request.os_family,
            &request.os_version,
            &request.shape,
        )
        .await?;
        tracing::info!(image = %image.display_name, "image resolved");

        let target = resolve::resolve_network(
            self.clients.network.as_ref(),
            self.clients.identity.as_ref(),
            request.subnet_hint.as_deref(),
        )
        .await?;
        tracing::info!(subnet = %target.subnet_name, ad = %target.availability_domain, "network target resolved");

        let ssh_public_key = resolve::load_public_key(&request.ssh_key_path)?;

        // Flexible shapes take an explicit CPU/memory config; fixed shapes
        // reject one.
        let flexible = request.shape.ends_with(".Flex");
        let spec = LaunchSpec {
            display_name: request.display_name.clone(),
            availability_domain: target.availability_domain.clone(),
            image_id: image.id.clone(),
            shape: request.shape.clone(),
            subnet_id: target.subnet_id.clone(),
            ocpus: flexible.then_some(request.ocpus),
            memory_gb: flexible.then_some(request.memory_gb),
            ssh_public_key,
            assign_public_ip: request.assign_public_ip,
        };

        let submitted = self.clients.compute.launch_instance(&spec).await?;
        tracing::info!(instance = %submitted.id, "launch submitted, waiting for RUNNING");

        let running = self.wait_until_running(submitted).await?;
        let network_interface = lookup_interface(&self.clients, &running.id).await?;

        let ssh_target = network_interface
            .public_ip
            .as_deref()
            .or(network_interface.private_ip.as_deref())
            .unwrap_or("<no-ip>");
        let result = ProvisionResult {
            ssh_hint: format!("ssh ubuntu@{ssh_target}"),
            instance: running,
            network_interface,
        };
        self.write_summary(&result);
        Ok(result)
    }

    /// Fixed-interval poll over the provider-owned lifecycle. Terminates on
    /// the first RUNNING poll; a failed terminal state or an exhausted wait
    /// budget ends the wait without touching the instance.
    async fn wait_until_running(&self, submitted: Instance) -> Result<Instance> {
        if submitted.lifecycle_state == LifecycleState::Running {
            return Ok(submitted);
        }
        let mut waited = Duration::ZERO;
        loop {
            if let Some(budget) = self.max_wait {
                if waited >= budget {
                    return Err(Error::Timeout {
                        instance_id: submitted.id,
                        waited_secs: waited.as_secs(),
                    });
                }
            }
            let current = self.clients.compute.get_instance(&submitted.id).await?;
            match current.lifecycle_state {
                LifecycleState::Running => return Ok(current),
                state if state.is_failed_terminal() => {
                    return Err(Error::rejected(
                        "wait_for_running",
                        None,
                        format!("instance {} entered terminal state {state}", current.id),
                    ));
                }
                state => {
                    tracing::debug!(instance = %current.id, %state, "still provisioning");
                }
            }
            self.clock.sleep(self.poll_interval).await;
            waited += self.poll_interval;
        }
    }

    fn write_summary(&self, result: &ProvisionResult) {
        let Some(path) = &self.summary_path else {
            return;
        };
        let summary = DeploymentSummary {
            instance_id: result.instance.id.clone(),
            public_ip: result.network_interface.public_ip.clone(),
            shape: result.instance.shape.clone(),
            status: result.instance.lifecycle_state.as_str().to_string(),
            created_at: result.instance.time_created,
        };
        let write = serde_json::to_string_pretty(&summary)
            .map_err(|e| e.to_string())
            .and_then(|json| std::fs::write(path, json).map_err(|e| e.to_string()));
        if let Err(reason) = write {
            // Advisory only: a failed summary write never fails the provision.
            tracing::warn!(path = %path.display(), %reason, "could not write deployment summary");
        }
    }
}
