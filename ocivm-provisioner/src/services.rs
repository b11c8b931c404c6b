use chrono::Utc;
use serde::Serialize;

use ocivm_common::error::{Error, Result};
use ocivm_common::{
    Instance, InstanceSummary, NetworkInterface, Subnet, TerminationReceipt, Vcn,
};
use ocivm_providers::{Credentials, ProviderClients};

/// First attachment's interface detail. No attachment yet is the
/// provider-side attachment race: surfaced as IpUnavailable, the instance
/// itself is left alone.
pub(crate) async fn lookup_interface(
    clients: &ProviderClients,
    instance_id: &str,
) -> Result<NetworkInterface> {
    let attachments = clients.compute.list_vnic_attachments(instance_id).await?;
    let attachment = attachments.first().ok_or_else(|| Error::IpUnavailable {
        instance_id: instance_id.to_string(),
    })?;
    let vnic = clients.network.get_vnic(&attachment.vnic_id).await?;
    Ok(NetworkInterface {
        instance_id: instance_id.to_string(),
        public_ip: vnic.public_ip,
        private_ip: vnic.private_ip,
    })
}

/// All instances in scope, optionally filtered by exact lifecycle state
/// (wire form, case-sensitive). IP enrichment is best-effort per instance:
/// one instance's failed lookup leaves its ip unset instead of failing the
/// batch.
pub async fn list_instances(
    clients: &ProviderClients,
    state_filter: Option<&str>,
) -> Result<Vec<InstanceSummary>> {
    let instances = clients.compute.list_instances().await?;
    let mut summaries = Vec::new();
    for instance in instances {
        if let Some(filter) = state_filter {
            if instance.lifecycle_state.as_str() != filter {
                continue;
            }
        }
        let public_ip = match lookup_interface(clients, &instance.id).await {
            Ok(interface) => interface.public_ip,
            Err(err) => {
                tracing::debug!(instance = %instance.id, %err, "ip enrichment failed");
                None
            }
        };
        summaries.push(InstanceSummary {
            id: instance.id,
            display_name: instance.display_name,
            lifecycle_state: instance.lifecycle_state,
            shape: instance.shape,
            public_ip,
            time_created: instance.time_created,
        });
    }
    Ok(summaries)
}

/// Request termination. The current state is fetched first for the receipt,
/// so an unknown id fails with NotFound before any mutation is issued. The
/// provider call is asynchronous: this returns once termination is
/// requested, not once TERMINATED is reached.
pub async fn terminate_instance(
    clients: &ProviderClients,
    instance_id: &str,
) -> Result<TerminationReceipt> {
    let instance = clients.compute.get_instance(instance_id).await?;
    clients.compute.terminate_instance(instance_id).await?;
    tracing::info!(instance = %instance_id, previous = %instance.lifecycle_state, "termination requested");
    Ok(TerminationReceipt {
        instance_id: instance.id,
        display_name: instance.display_name,
        previous_state: instance.lifecycle_state,
        requested_at: Utc::now(),
    })
}

pub struct InstanceDetails {
    pub instance: Instance,
    /// None when the interface lookup failed; callers render N/A.
    pub network_interface: Option<NetworkInterface>,
}

/// Single-instance inspection with best-effort address lookup.
pub async fn instance_details(
    clients: &ProviderClients,
    instance_id: &str,
) -> Result<InstanceDetails> {
    let instance = clients.compute.get_instance(instance_id).await?;
    let network_interface = lookup_interface(clients, &instance.id).await.ok();
    Ok(InstanceDetails {
        instance,
        network_interface,
    })
}

pub struct NetworkListing {
    pub vcn: Vcn,
    pub subnets: Vec<Subnet>,
}

/// Every VCN in scope with its subnets.
pub async fn list_networks(clients: &ProviderClients) -> Result<Vec<NetworkListing>> {
    let vcns = clients.network.list_vcns().await?;
    let mut listings = Vec::new();
    for vcn in vcns {
        let subnets = clients.network.list_subnets(&vcn.id).await?;
        listings.push(NetworkListing { vcn, subnets });
    }
    Ok(listings)
}

#[derive(Debug, Serialize)]
pub struct ConfigReport {
    pub config_source: &'static str,
    pub region: String,
    pub tenancy_id: String,
    pub user_id: String,
    pub key_file: String,
    pub fingerprint: String,
    pub api_access: String,
}

/// Credential summary (identifiers truncated) plus a one-call API probe.
pub async fn check_config(clients: &ProviderClients, credentials: &Credentials) -> ConfigReport {
    let api_access = match clients.compute.list_instances().await {
        Ok(_) => "ok".to_string(),
        Err(err) => format!("error: {err}"),
    };
    ConfigReport {
        config_source: credentials.source.as_str(),
        region: credentials.region.clone(),
        tenancy_id: truncate(&credentials.tenancy, 50),
        user_id: truncate(&credentials.user, 50),
        key_file: credentials.key_file.clone(),
        fingerprint: truncate(&credentials.fingerprint, 20),
        api_access,
    }
}

fn truncate(value: &str, limit: usize) -> String {
    if value.len() <= limit {
        value.to_string()
    } else {
        format!("{}...", &value[..limit])
    }
}
