//! In-memory provider for workflow tests: scripted lifecycle transitions,
//! deterministic ids, call recording. No wall clock, no network.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use ocivm_common::error::{Error, Result};
use ocivm_common::{
    AvailabilityDomain, ImageRef, Instance, LifecycleState, Subnet, Vcn, Vnic, VnicAttachment,
};

use crate::{ComputeApi, IdentityApi, ImageFilter, LaunchSpec, NetworkApi, ProviderClients};

struct MockImage {
    image: ImageRef,
    os_family: String,
    os_version: String,
    /// None means compatible with every shape filter.
    shapes: Option<Vec<String>>,
}

struct MockInstance {
    instance: Instance,
    /// States returned by successive `get_instance` polls; the last state
    /// sticks once the schedule is drained.
    schedule: VecDeque<LifecycleState>,
    polls: usize,
    vnic: Option<Vnic>,
    attachment_missing: bool,
    vnic_lookup_fails: bool,
}

#[derive(Default)]
struct State {
    images: Vec<MockImage>,
    vcns: Vec<Vcn>,
    subnets: HashMap<String, Vec<Subnet>>,
    availability_domains: Vec<AvailabilityDomain>,
    instances: HashMap<String, MockInstance>,
    listing_order: Vec<String>,
    next_id: usize,
    launch_error: Option<(u16, String)>,
    next_schedule: Vec<LifecycleState>,
    withhold_next_vnic: bool,
    image_queries: Vec<ImageFilter>,
    launches: Vec<LaunchSpec>,
    terminate_calls: Vec<String>,
}

pub struct MockCloud {
    state: Mutex<State>,
}

impl Default for MockCloud {
    fn default() -> Self {
        Self::new()
    }
}

impl MockCloud {
    pub fn new() -> Self {
        MockCloud {
            state: Mutex::new(State::default()),
        }
    }

    pub fn clients(self: &Arc<Self>) -> ProviderClients {
        ProviderClients {
            compute: self.clone(),
            network: self.clone(),
            identity: self.clone(),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    // --- Fixture setup ---

    pub fn add_image(
        &self,
        id: &str,
        display_name: &str,
        os_family: &str,
        os_version: &str,
        shapes: Option<Vec<&str>>,
    ) {
        self.lock().images.push(MockImage {
            image: ImageRef {
                id: id.to_string(),
                display_name: display_name.to_string(),
                time_created: Some(chrono::Utc::now()),
            },
            os_family: os_family.to_string(),
            os_version: os_version.to_string(),
            shapes: shapes.map(|s| s.into_iter().map(str::to_string).collect()),
        });
    }

    pub fn add_vcn(&self, id: &str, display_name: &str) {
        self.lock().vcns.push(Vcn {
            id: id.to_string(),
            display_name: display_name.to_string(),
            cidr_block: Some("10.0.0.0/16".to_string()),
        });
    }

    pub fn add_subnet(
        &self,
        vcn_id: &str,
        id: &str,
        display_name: &str,
        availability_domain: Option<&str>,
    ) {
        self.lock()
            .subnets
            .entry(vcn_id.to_string())
            .or_default()
            .push(Subnet {
                id: id.to_string(),
                display_name: display_name.to_string(),
                cidr_block: Some("10.0.1.0/24".to_string()),
                availability_domain: availability_domain.map(str::to_string),
            });
    }

    pub fn add_availability_domain(&self, name: &str) {
        self.lock().availability_domains.push(AvailabilityDomain {
            name: name.to_string(),
        });
    }

    /// Lifecycle states the next launched instance will report on successive
    /// polls. Unset means the instance is RUNNING on the first poll.
    pub fn schedule_lifecycle(&self, states: Vec<LifecycleState>) {
        self.lock().next_schedule = states;
    }

    pub fn fail_next_launch(&self, status: u16, message: &str) {
        self.lock().launch_error = Some((status, message.to_string()));
    }

    /// The next launched instance gets no VNIC attachment (provider-side
    /// attachment race).
    pub fn withhold_next_vnic(&self) {
        self.lock().withhold_next_vnic = true;
    }

    /// Pre-existing instance for list/terminate tests.
    pub fn seed_instance(&self, id: &str, display_name: &str, state: LifecycleState, public_ip: Option<&str>) {
        let mut guard = self.lock();
        let vnic = Vnic {
            id: format!("{id}.vnic"),
            public_ip: public_ip.map(str::to_string),
            private_ip: Some("10.0.1.5".to_string()),
        };
        guard.instances.insert(
            id.to_string(),
            MockInstance {
                instance: Instance {
                    id: id.to_string(),
                    display_name: display_name.to_string(),
                    shape: "VM.Standard.A1.Flex".to_string(),
                    lifecycle_state: state,
                    availability_domain: Some("mock:AD-1".to_string()),
                    time_created: Some(chrono::Utc::now()),
                },
                schedule: VecDeque::new(),
                polls: 0,
                vnic: Some(vnic),
                attachment_missing: false,
                vnic_lookup_fails: false,
            },
        );
        guard.listing_order.push(id.to_string());
    }

    /// Make IP enrichment fail for one seeded instance.
    pub fn break_ip_lookup(&self, instance_id: &str) {
        if let Some(entry) = self.lock().instances.get_mut(instance_id) {
            entry.vnic_lookup_fails = true;
        }
    }

    // --- Assertions ---

    pub fn image_queries(&self) -> Vec<ImageFilter> {
        self.lock().image_queries.clone()
    }

    pub fn launches(&self) -> Vec<LaunchSpec> {
        self.lock().launches.clone()
    }

    pub fn terminate_calls(&self) -> Vec<String> {
        self.lock().terminate_calls.clone()
    }

    /// Instance ids in listing order (seeded and launched).
    pub fn instance_ids(&self) -> Vec<String> {
        self.lock().listing_order.clone()
    }

    pub fn polls(&self, instance_id: &str) -> usize {
        self.lock()
            .instances
            .get(instance_id)
            .map(|e| e.polls)
            .unwrap_or(0)
    }
}

#[async_trait]
impl ComputeApi for MockCloud {
    async fn list_images(&self, filter: &ImageFilter) -> Result<Vec<ImageRef>> {
        let mut guard = self.lock();
        guard.image_queries.push(filter.clone());
        Ok(guard
            .images
            .iter()
            .filter(|entry| {
                entry.os_family == filter.os_family
                    && entry.os_version == filter.os_version
                    && match (&filter.shape, &entry.shapes) {
                        (Some(wanted), Some(supported)) => supported.contains(wanted),
                        _ => true,
                    }
            })
            .map(|entry| entry.image.clone())
            .collect())
    }

    async fn launch_instance(&self, spec: &LaunchSpec) -> Result<Instance> {
        let mut guard = self.lock();
        if let Some((status, message)) = guard.launch_error.take() {
            return Err(Error::rejected("launch_instance", Some(status), message));
        }
        guard.launches.push(spec.clone());

        guard.next_id += 1;
        let id = format!("ocid1.instance.oc1..mock{:04}", guard.next_id);
        let instance = Instance {
            id: id.clone(),
            display_name: spec.display_name.clone(),
            shape: spec.shape.clone(),
            lifecycle_state: LifecycleState::Provisioning,
            availability_domain: Some(spec.availability_domain.clone()),
            time_created: Some(chrono::Utc::now()),
        };
        let schedule: VecDeque<LifecycleState> = std::mem::take(&mut guard.next_schedule).into();
        let attachment_missing = std::mem::take(&mut guard.withhold_next_vnic);
        let vnic = Vnic {
            id: format!("{id}.vnic"),
            public_ip: spec
                .assign_public_ip
                .then(|| format!("203.0.113.{}", guard.next_id)),
            private_ip: Some(format!("10.0.1.{}", guard.next_id)),
        };
        guard.instances.insert(
            id.clone(),
            MockInstance {
                instance: instance.clone(),
                schedule,
                polls: 0,
                vnic: Some(vnic),
                attachment_missing,
                vnic_lookup_fails: false,
            },
        );
        guard.listing_order.push(id);
        Ok(instance)
    }

    async fn get_instance(&self, instance_id: &str) -> Result<Instance> {
        let mut guard = self.lock();
        let entry = guard
            .instances
            .get_mut(instance_id)
            .ok_or_else(|| Error::not_found("instance", instance_id))?;
        entry.polls += 1;
        if let Some(next) = entry.schedule.pop_front() {
            entry.instance.lifecycle_state = next;
        }
        Ok(entry.instance.clone())
    }

    async fn list_instances(&self) -> Result<Vec<Instance>> {
        let guard = self.lock();
        Ok(guard
            .listing_order
            .iter()
            .filter_map(|id| guard.instances.get(id))
            .map(|entry| entry.instance.clone())
            .collect())
    }

    async fn list_vnic_attachments(&self, instance_id: &str) -> Result<Vec<VnicAttachment>> {
        let guard = self.lock();
        let Some(entry) = guard.instances.get(instance_id) else {
            return Ok(Vec::new());
        };
        if entry.attachment_missing {
            return Ok(Vec::new());
        }
        Ok(entry
            .vnic
            .iter()
            .map(|vnic| VnicAttachment {
                id: format!("{instance_id}.attachment"),
                instance_id: instance_id.to_string(),
                vnic_id: vnic.id.clone(),
            })
            .collect())
    }

    async fn terminate_instance(&self, instance_id: &str) -> Result<()> {
        let mut guard = self.lock();
        let entry = guard
            .instances
            .get_mut(instance_id)
            .ok_or_else(|| Error::not_found("instance", instance_id))?;
        entry.instance.lifecycle_state = LifecycleState::Terminating;
        guard.terminate_calls.push(instance_id.to_string());
        Ok(())
    }
}

#[async_trait]
impl NetworkApi for MockCloud {
    async fn list_vcns(&self) -> Result<Vec<Vcn>> {
        Ok(self.lock().vcns.clone())
    }

    async fn list_subnets(&self, vcn_id: &str) -> Result<Vec<Subnet>> {
        Ok(self.lock().subnets.get(vcn_id).cloned().unwrap_or_default())
    }

    async fn get_vnic(&self, vnic_id: &str) -> Result<Vnic> {
        let guard = self.lock();
        let entry = guard
            .instances
            .values()
            .find(|e| e.vnic.as_ref().is_some_and(|v| v.id == vnic_id))
            .ok_or_else(|| Error::not_found("vnic", vnic_id))?;
        if entry.vnic_lookup_fails {
            return Err(Error::Transport {
                operation: "get_vnic",
                message: "connection reset".to_string(),
            });
        }
        Ok(entry.vnic.clone().unwrap_or(Vnic {
            id: vnic_id.to_string(),
            public_ip: None,
            private_ip: None,
        }))
    }
}

#[async_trait]
impl IdentityApi for MockCloud {
    async fn list_availability_domains(&self) -> Result<Vec<AvailabilityDomain>> {
        Ok(self.lock().availability_domains.clone())
    }
}
