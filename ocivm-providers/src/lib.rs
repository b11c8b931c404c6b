use std::sync::Arc;

use async_trait::async_trait;
use ocivm_common::error::Result;
use ocivm_common::{
    AvailabilityDomain, ImageRef, Instance, Subnet, Vcn, Vnic, VnicAttachment,
};

pub mod config;
mod signer;

pub mod oci;

#[cfg(feature = "mock")]
pub mod mock;

pub use config::{CredentialSource, Credentials};
pub use oci::OciClient;

/// Image candidate query. `shape` narrows to images compatible with one
/// compute shape; the resolver drops it on the widening retry.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageFilter {
    pub os_family: String,
    pub os_version: String,
    pub shape: Option<String>,
}

/// Fully composed launch request: resolved image, resolved network target,
/// loaded key material, caller parameters. `ocpus`/`memory_gb` are only set
/// for flexible shapes; fixed shapes launch without a shape config.
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    pub display_name: String,
    pub availability_domain: String,
    pub image_id: String,
    pub shape: String,
    pub subnet_id: String,
    pub ocpus: Option<f64>,
    pub memory_gb: Option<f64>,
    pub ssh_public_key: String,
    pub assign_public_ip: bool,
}

#[async_trait]
pub trait ComputeApi: Send + Sync {
    async fn list_images(&self, filter: &ImageFilter) -> Result<Vec<ImageRef>>;
    async fn launch_instance(&self, spec: &LaunchSpec) -> Result<Instance>;
    async fn get_instance(&self, instance_id: &str) -> Result<Instance>;
    async fn list_instances(&self) -> Result<Vec<Instance>>;
    async fn list_vnic_attachments(&self, instance_id: &str) -> Result<Vec<VnicAttachment>>;
    /// Asynchronous on the provider side: returns once termination is
    /// requested, not once TERMINATED is reached.
    async fn terminate_instance(&self, instance_id: &str) -> Result<()>;
}

#[async_trait]
pub trait NetworkApi: Send + Sync {
    async fn list_vcns(&self) -> Result<Vec<Vcn>>;
    async fn list_subnets(&self, vcn_id: &str) -> Result<Vec<Subnet>>;
    async fn get_vnic(&self, vnic_id: &str) -> Result<Vnic>;
}

#[async_trait]
pub trait IdentityApi: Send + Sync {
    async fn list_availability_domains(&self) -> Result<Vec<AvailabilityDomain>>;
}

/// The provider handles the workflow talks to. Built once at process start
/// from resolved credentials and passed in by the caller; no module-level
/// globals.
#[derive(Clone)]
pub struct ProviderClients {
    pub compute: Arc<dyn ComputeApi>,
    pub network: Arc<dyn NetworkApi>,
    pub identity: Arc<dyn IdentityApi>,
}

impl ProviderClients {
    pub fn from_credentials(credentials: &Credentials) -> Result<Self> {
        let client = Arc::new(OciClient::new(credentials.clone())?);
        Ok(ProviderClients {
            compute: client.clone(),
            network: client.clone(),
            identity: client,
        })
    }
}
