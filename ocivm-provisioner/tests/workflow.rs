//! Workflow tests against the in-memory mock provider: no wall clock
//! (recording Clock), no network, scripted lifecycle transitions.

use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use ocivm_common::error::Error;
use ocivm_common::{LifecycleState, ProvisionRequest, RejectionHint};
use ocivm_provisioner::clock::Clock;
use ocivm_provisioner::resolve::{resolve_image, resolve_network};
use ocivm_provisioner::{services, Provisioner};
use ocivm_providers::mock::MockCloud;

/// Records requested sleeps and returns immediately.
struct InstantClock {
    sleeps: Mutex<Vec<Duration>>,
}

impl InstantClock {
    fn new() -> Arc<Self> {
        Arc::new(InstantClock {
            sleeps: Mutex::new(Vec::new()),
        })
    }

    fn count(&self) -> usize {
        self.sleeps.lock().unwrap().len()
    }
}

#[async_trait]
impl Clock for InstantClock {
    async fn sleep(&self, duration: Duration) {
        self.sleeps.lock().unwrap().push(duration);
    }
}

fn ssh_key_file() -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAA test@host").unwrap();
    file
}

fn ubuntu_request(key_path: &str) -> ProvisionRequest {
    ProvisionRequest {
        display_name: "test-1".to_string(),
        shape: "VM.Standard.A1.Flex".to_string(),
        ocpus: 2.0,
        memory_gb: 8.0,
        os_family: "Canonical Ubuntu".to_string(),
        os_version: "22.04".to_string(),
        ssh_key_path: key_path.to_string(),
        subnet_hint: Some("public".to_string()),
        assign_public_ip: true,
    }
}

/// One image, one VCN with two subnets (one named "public-subnet"): the
/// provision lands on the public subnet and reaches RUNNING after exactly
/// the scheduled number of polls.
#[tokio::test]
async fn round_trip_provision() {
    let cloud = Arc::new(MockCloud::new());
    cloud.add_image(
        "ocid1.image.oc1..ubuntu",
        "Canonical-Ubuntu-22.04-aarch64",
        "Canonical Ubuntu",
        "22.04",
        Some(vec!["VM.Standard.A1.Flex"]),
    );
    cloud.add_vcn("ocid1.vcn.oc1..main", "main-vcn");
    cloud.add_subnet("ocid1.vcn.oc1..main", "ocid1.subnet.oc1..private", "private-subnet", Some("mock:AD-1"));
    cloud.add_subnet("ocid1.vcn.oc1..main", "ocid1.subnet.oc1..public", "public-subnet", Some("mock:AD-1"));
    cloud.schedule_lifecycle(vec![
        LifecycleState::Provisioning,
        LifecycleState::Provisioning,
        LifecycleState::Running,
    ]);

    let key = ssh_key_file();
    let clock = InstantClock::new();
    let provisioner = Provisioner::new(cloud.clients()).with_clock(clock.clone());
    let result = provisioner
        .provision(&ubuntu_request(key.path().to_str().unwrap()))
        .await
        .unwrap();

    assert_eq!(result.instance.lifecycle_state, LifecycleState::Running);
    assert!(result.network_interface.public_ip.is_some());
    assert!(result.ssh_hint.starts_with("ssh ubuntu@"));

    let launches = cloud.launches();
    assert_eq!(launches.len(), 1);
    assert_eq!(launches[0].subnet_id, "ocid1.subnet.oc1..public");
    assert_eq!(launches[0].ocpus, Some(2.0));
    assert_eq!(launches[0].memory_gb, Some(8.0));
    assert!(launches[0].ssh_public_key.starts_with("ssh-ed25519"));

    // Three scheduled states, three polls, and one sleep between each pair.
    assert_eq!(cloud.polls(&result.instance.id), 3);
    assert_eq!(clock.count(), 2);
}

#[tokio::test]
async fn subnet_hint_wins_regardless_of_enumeration_order() {
    for reversed in [false, true] {
        let cloud = Arc::new(MockCloud::new());
        cloud.add_vcn("vcn-1", "main");
        if reversed {
            cloud.add_subnet("vcn-1", "sub-public", "Public-Subnet", Some("AD-1"));
            cloud.add_subnet("vcn-1", "sub-private", "private", Some("AD-1"));
        } else {
            cloud.add_subnet("vcn-1", "sub-private", "private", Some("AD-1"));
            cloud.add_subnet("vcn-1", "sub-public", "Public-Subnet", Some("AD-1"));
        }
        let clients = cloud.clients();
        let target = resolve_network(clients.network.as_ref(), clients.identity.as_ref(), Some("public"))
            .await
            .unwrap();
        assert_eq!(target.subnet_id, "sub-public");
    }
}

#[tokio::test]
async fn unmatched_hint_falls_back_to_first_subnet() {
    let cloud = Arc::new(MockCloud::new());
    cloud.add_vcn("vcn-1", "main");
    cloud.add_subnet("vcn-1", "sub-a", "alpha", Some("AD-1"));
    cloud.add_subnet("vcn-1", "sub-b", "beta", Some("AD-1"));
    let clients = cloud.clients();
    let target = resolve_network(clients.network.as_ref(), clients.identity.as_ref(), Some("gamma"))
        .await
        .unwrap();
    assert_eq!(target.subnet_id, "sub-a");
}

#[tokio::test]
async fn regional_subnet_derives_ad_from_identity_listing() {
    let cloud = Arc::new(MockCloud::new());
    cloud.add_vcn("vcn-1", "main");
    cloud.add_subnet("vcn-1", "sub-regional", "regional", None);
    cloud.add_availability_domain("phx:AD-2");
    let clients = cloud.clients();
    let target = resolve_network(clients.network.as_ref(), clients.identity.as_ref(), None)
        .await
        .unwrap();
    assert_eq!(target.availability_domain, "phx:AD-2");
}

#[tokio::test]
async fn empty_image_set_widens_exactly_once() {
    let cloud = Arc::new(MockCloud::new());
    // x86-only image: invisible through the ARM shape filter.
    cloud.add_image(
        "ocid1.image.oc1..x86",
        "Canonical-Ubuntu-22.04-amd64",
        "Canonical Ubuntu",
        "22.04",
        Some(vec!["VM.Standard.E2.1"]),
    );
    let clients = cloud.clients();
    let image = resolve_image(
        clients.compute.as_ref(),
        "Canonical Ubuntu",
        "22.04",
        "VM.Standard.A1.Flex",
    )
    .await
    .unwrap();
    assert_eq!(image.id, "ocid1.image.oc1..x86");

    let queries = cloud.image_queries();
    assert_eq!(queries.len(), 2);
    assert_eq!(queries[0].shape.as_deref(), Some("VM.Standard.A1.Flex"));
    assert_eq!(queries[1].shape, None);
}

#[tokio::test]
async fn no_image_at_all_is_not_found_after_one_retry() {
    let cloud = Arc::new(MockCloud::new());
    let clients = cloud.clients();
    let err = resolve_image(clients.compute.as_ref(), "Canonical Ubuntu", "22.04", "VM.Standard.A1.Flex")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound { .. }));
    assert_eq!(cloud.image_queries().len(), 2);
}

#[tokio::test]
async fn zero_wait_budget_times_out_before_any_poll() {
    let cloud = Arc::new(MockCloud::new());
    cloud.add_image("img", "ubuntu", "Canonical Ubuntu", "22.04", None);
    cloud.add_vcn("vcn-1", "main");
    cloud.add_subnet("vcn-1", "sub-1", "public-subnet", Some("AD-1"));
    cloud.schedule_lifecycle(vec![LifecycleState::Running]);

    let key = ssh_key_file();
    let clock = InstantClock::new();
    let provisioner = Provisioner::new(cloud.clients())
        .with_clock(clock.clone())
        .with_max_wait(Some(Duration::ZERO));
    let err = provisioner
        .provision(&ubuntu_request(key.path().to_str().unwrap()))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Timeout { .. }));
    let ids = cloud.instance_ids();
    assert_eq!(ids.len(), 1);
    assert_eq!(cloud.polls(&ids[0]), 0);
    assert_eq!(clock.count(), 0);
    // The instance is left alone server-side.
    assert!(cloud.terminate_calls().is_empty());
}

#[tokio::test]
async fn failed_terminal_state_stops_polling() {
    let cloud = Arc::new(MockCloud::new());
    cloud.add_image("img", "ubuntu", "Canonical Ubuntu", "22.04", None);
    cloud.add_vcn("vcn-1", "main");
    cloud.add_subnet("vcn-1", "sub-1", "public-subnet", Some("AD-1"));
    cloud.schedule_lifecycle(vec![LifecycleState::Provisioning, LifecycleState::Failed]);

    let key = ssh_key_file();
    let provisioner = Provisioner::new(cloud.clients()).with_clock(InstantClock::new());
    let err = provisioner
        .provision(&ubuntu_request(key.path().to_str().unwrap()))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Rejected { .. }));
    let ids = cloud.instance_ids();
    assert_eq!(cloud.polls(&ids[0]), 2);
}

#[tokio::test]
async fn quota_rejection_surfaces_hint() {
    let cloud = Arc::new(MockCloud::new());
    cloud.add_image("img", "ubuntu", "Canonical Ubuntu", "22.04", None);
    cloud.add_vcn("vcn-1", "main");
    cloud.add_subnet("vcn-1", "sub-1", "public-subnet", Some("AD-1"));
    cloud.fail_next_launch(400, "LimitExceeded: service limit for VM.Standard.A1.Flex quota reached");

    let key = ssh_key_file();
    let provisioner = Provisioner::new(cloud.clients()).with_clock(InstantClock::new());
    let err = provisioner
        .provision(&ubuntu_request(key.path().to_str().unwrap()))
        .await
        .unwrap_err();

    match &err {
        Error::Rejected { hint, message, .. } => {
            assert_eq!(*hint, RejectionHint::Quota);
            assert!(message.contains("LimitExceeded"));
        }
        other => panic!("expected Rejected, got {other:?}"),
    }
    assert!(err.to_string().contains("quota"));
}

#[tokio::test]
async fn missing_attachment_is_soft_ip_failure() {
    let cloud = Arc::new(MockCloud::new());
    cloud.add_image("img", "ubuntu", "Canonical Ubuntu", "22.04", None);
    cloud.add_vcn("vcn-1", "main");
    cloud.add_subnet("vcn-1", "sub-1", "public-subnet", Some("AD-1"));
    cloud.schedule_lifecycle(vec![LifecycleState::Running]);
    cloud.withhold_next_vnic();

    let key = ssh_key_file();
    let provisioner = Provisioner::new(cloud.clients()).with_clock(InstantClock::new());
    let err = provisioner
        .provision(&ubuntu_request(key.path().to_str().unwrap()))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::IpUnavailable { .. }));
    // Running instance is not rolled back.
    assert!(cloud.terminate_calls().is_empty());
}

#[tokio::test]
async fn list_filters_exact_state_and_tolerates_ip_failures() {
    let cloud = Arc::new(MockCloud::new());
    cloud.seed_instance("i-1", "worker-1", LifecycleState::Running, Some("203.0.113.7"));
    cloud.seed_instance("i-2", "worker-2", LifecycleState::Running, Some("203.0.113.8"));
    cloud.seed_instance("i-3", "worker-3", LifecycleState::Stopped, None);
    cloud.break_ip_lookup("i-2");
    let clients = cloud.clients();

    let running = services::list_instances(&clients, Some("RUNNING")).await.unwrap();
    assert_eq!(running.len(), 2);
    assert_eq!(running[0].public_ip.as_deref(), Some("203.0.113.7"));
    // The broken lookup degrades to no ip rather than failing the batch.
    assert_eq!(running[1].public_ip, None);

    // Exact, case-sensitive match against the wire form.
    let lowercase = services::list_instances(&clients, Some("running")).await.unwrap();
    assert!(lowercase.is_empty());

    let all = services::list_instances(&clients, None).await.unwrap();
    assert_eq!(all.len(), 3);
}

#[tokio::test]
async fn terminate_unknown_id_mutates_nothing() {
    let cloud = Arc::new(MockCloud::new());
    cloud.seed_instance("i-1", "worker-1", LifecycleState::Running, None);
    let clients = cloud.clients();

    let err = services::terminate_instance(&clients, "i-unknown").await.unwrap_err();
    assert!(matches!(err, Error::NotFound { .. }));
    assert!(cloud.terminate_calls().is_empty());
}

#[tokio::test]
async fn terminate_reports_previous_state() {
    let cloud = Arc::new(MockCloud::new());
    cloud.seed_instance("i-1", "worker-1", LifecycleState::Running, None);
    let clients = cloud.clients();

    let receipt = services::terminate_instance(&clients, "i-1").await.unwrap();
    assert_eq!(receipt.previous_state, LifecycleState::Running);
    assert_eq!(receipt.display_name, "worker-1");
    assert_eq!(cloud.terminate_calls(), vec!["i-1".to_string()]);
}

#[tokio::test]
async fn summary_file_is_written_after_success() {
    let cloud = Arc::new(MockCloud::new());
    cloud.add_image("img", "ubuntu", "Canonical Ubuntu", "22.04", None);
    cloud.add_vcn("vcn-1", "main");
    cloud.add_subnet("vcn-1", "sub-1", "public-subnet", Some("AD-1"));
    cloud.schedule_lifecycle(vec![LifecycleState::Running]);

    let key = ssh_key_file();
    let dir = tempfile::tempdir().unwrap();
    let summary_path = dir.path().join("deployment.json");
    let provisioner = Provisioner::new(cloud.clients())
        .with_clock(InstantClock::new())
        .with_summary_path(Some(summary_path.clone()));
    let result = provisioner
        .provision(&ubuntu_request(key.path().to_str().unwrap()))
        .await
        .unwrap();

    let written: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&summary_path).unwrap()).unwrap();
    assert_eq!(written["instance_id"], result.instance.id.as_str());
    assert_eq!(written["status"], "RUNNING");
}
