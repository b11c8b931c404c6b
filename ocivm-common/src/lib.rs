use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod error;

pub use error::{Error, RejectionHint};

// --- Enums ---

/// Provider-reported instance status. The provider owns this lifecycle;
/// we only read and wait on it.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LifecycleState {
    Provisioning,
    Starting,
    Running,
    Stopping,
    Stopped,
    Terminating,
    Terminated,
    Failed,
    /// States added by the provider after this enum was written.
    #[serde(other)]
    Unknown,
}

impl LifecycleState {
    /// Wire form of the state (`RUNNING`, `PROVISIONING`, ...).
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Provisioning => "PROVISIONING",
            LifecycleState::Starting => "STARTING",
            LifecycleState::Running => "RUNNING",
            LifecycleState::Stopping => "STOPPING",
            LifecycleState::Stopped => "STOPPED",
            LifecycleState::Terminating => "TERMINATING",
            LifecycleState::Terminated => "TERMINATED",
            LifecycleState::Failed => "FAILED",
            LifecycleState::Unknown => "UNKNOWN",
        }
    }

    /// True when polling can never reach RUNNING from here.
    pub fn is_failed_terminal(&self) -> bool {
        matches!(
            self,
            LifecycleState::Failed | LifecycleState::Terminating | LifecycleState::Terminated
        )
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// --- Entities (provider-owned, read at the boundary) ---

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Instance {
    pub id: String,
    pub display_name: String,
    pub shape: String,
    pub lifecycle_state: LifecycleState,
    pub availability_domain: Option<String>,
    pub time_created: Option<DateTime<Utc>>,
}

/// An image the workflow selects, never creates.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ImageRef {
    pub id: String,
    pub display_name: String,
    pub time_created: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Vcn {
    pub id: String,
    pub display_name: String,
    pub cidr_block: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Subnet {
    pub id: String,
    pub display_name: String,
    pub cidr_block: Option<String>,
    /// None for regional subnets; the resolver then falls back to the
    /// account's first availability domain.
    pub availability_domain: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AvailabilityDomain {
    pub name: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct VnicAttachment {
    pub id: String,
    pub instance_id: String,
    pub vnic_id: String,
}

/// Network-interface detail as the provider reports it.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Vnic {
    pub id: String,
    pub public_ip: Option<String>,
    pub private_ip: Option<String>,
}

/// Binding of an instance to its addresses within a subnet.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct NetworkInterface {
    pub instance_id: String,
    pub public_ip: Option<String>,
    pub private_ip: Option<String>,
}

// --- Workflow requests / results ---

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ProvisionRequest {
    pub display_name: String,
    pub shape: String,
    pub ocpus: f64,
    pub memory_gb: f64,
    pub os_family: String,
    pub os_version: String,
    pub ssh_key_path: String,
    /// Prefer the first subnet whose display name contains this
    /// (case-insensitive).
    pub subnet_hint: Option<String>,
    pub assign_public_ip: bool,
}

impl ProvisionRequest {
    /// Request with the original launcher defaults: 1 OCPU / 6 GB ARM flex
    /// Ubuntu 22.04 and the default ssh key.
    pub fn with_defaults(display_name: impl Into<String>) -> Self {
        ProvisionRequest {
            display_name: display_name.into(),
            shape: "VM.Standard.A1.Flex".to_string(),
            ocpus: 1.0,
            memory_gb: 6.0,
            os_family: "Canonical Ubuntu".to_string(),
            os_version: "22.04".to_string(),
            ssh_key_path: "~/.ssh/id_rsa.pub".to_string(),
            subnet_hint: None,
            assign_public_ip: true,
        }
    }
}

/// Where the instance will land: first VCN, chosen subnet, derived AD.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct NetworkTarget {
    pub vcn_id: String,
    pub subnet_id: String,
    pub subnet_name: String,
    pub availability_domain: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ProvisionResult {
    pub instance: Instance,
    pub network_interface: NetworkInterface,
    pub ssh_hint: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct InstanceSummary {
    pub id: String,
    pub display_name: String,
    pub lifecycle_state: LifecycleState,
    pub shape: String,
    /// None when IP enrichment failed for this instance; rendered as "N/A".
    pub public_ip: Option<String>,
    pub time_created: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TerminationReceipt {
    pub instance_id: String,
    pub display_name: String,
    pub previous_state: LifecycleState,
    pub requested_at: DateTime<Utc>,
}

/// Advisory one-shot record written after a successful provision.
/// Never read back by the workflow.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DeploymentSummary {
    pub instance_id: String,
    pub public_ip: Option<String>,
    pub shape: String,
    pub status: String,
    pub created_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_state_wire_roundtrip() {
        for (wire, state) in [
            ("\"PROVISIONING\"", LifecycleState::Provisioning),
            ("\"RUNNING\"", LifecycleState::Running),
            ("\"TERMINATED\"", LifecycleState::Terminated),
            ("\"FAILED\"", LifecycleState::Failed),
        ] {
            let parsed: LifecycleState = serde_json::from_str(wire).unwrap();
            assert_eq!(parsed, state);
            assert_eq!(serde_json::to_string(&state).unwrap(), wire);
        }
    }

    #[test]
    fn unknown_states_do_not_break_decoding() {
        let parsed: LifecycleState = serde_json::from_str("\"CREATING_IMAGE\"").unwrap();
        assert_eq!(parsed, LifecycleState::Unknown);
        assert_eq!(parsed.as_str(), "UNKNOWN");
    }

    #[test]
    fn failed_terminal_states() {
        assert!(LifecycleState::Failed.is_failed_terminal());
        assert!(LifecycleState::Terminated.is_failed_terminal());
        assert!(!LifecycleState::Provisioning.is_failed_terminal());
        assert!(!LifecycleState::Running.is_failed_terminal());
    }
}
