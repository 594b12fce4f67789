//! End-to-end command flows against the in-memory provider.

use std::time::Duration;

use fleetctl_core::mock::{MockConfig, MockProvider};
use fleetctl_core::ops::{self, PollOptions, Reporter};
use fleetctl_core::{FleetError, Instance, InstanceState, LaunchSpec, SpotRequest, CLUSTER_TAG};

fn fast_poll() -> PollOptions {
    PollOptions {
        interval: Duration::from_millis(2),
        spot_wait_rounds: 3,
    }
}

fn spec() -> LaunchSpec {
    LaunchSpec {
        ami: "ami-9abea4fb".into(),
        instance_type: "t2.medium".into(),
        key_name: Some("test-key".into()),
        security_group: Some("sg-1".into()),
    }
}

#[derive(Default)]
struct RecordingReporter {
    fulfilled: Vec<String>,
    waits: usize,
    active: Vec<String>,
}

impl Reporter for RecordingReporter {
    fn spot_fulfilled(&mut self, request: &SpotRequest) {
        self.fulfilled.push(request.id.clone());
    }

    fn spot_waiting(&mut self, _pending: &[String]) {
        self.waits += 1;
    }

    fn instance_active(&mut self, instance: &Instance) {
        self.active.push(instance.id.clone());
    }
}

#[tokio::test]
async fn test_create_cluster_tags_and_reports_every_member() {
    let mock = MockProvider::new();
    let mut reporter = RecordingReporter::default();

    let members = ops::create_cluster(&mock, "exp-7", &spec(), 3, &fast_poll(), &mut reporter)
        .await
        .unwrap();

    assert_eq!(members.len(), 3);
    assert_eq!(reporter.active.len(), 3);
    for member in &members {
        assert_eq!(member.tag(CLUSTER_TAG), Some("exp-7"));
        assert_eq!(
            member.name(),
            Some(format!("exp-7-{}", member.id).as_str())
        );
        assert_eq!(member.state, InstanceState::Running);
        assert!(member.public_dns.is_some());
    }
}

#[tokio::test]
async fn test_create_converges_with_slow_reachability() {
    let mock = MockProvider::with_config(MockConfig {
        reachability_polls: 3,
        ..MockConfig::default()
    });
    let mut reporter = RecordingReporter::default();

    let members = ops::create_cluster(&mock, "slow", &spec(), 2, &fast_poll(), &mut reporter)
        .await
        .unwrap();

    assert_eq!(members.len(), 2);
    assert_eq!(reporter.active.len(), 2);
}

#[tokio::test]
async fn test_create_refuses_existing_cluster() {
    let mock = MockProvider::new();
    mock.seed_instance("exp-7", InstanceState::Running);

    let err = ops::create_cluster(
        &mock,
        "exp-7",
        &spec(),
        2,
        &fast_poll(),
        &mut fleetctl_core::NullReporter,
    )
    .await
    .unwrap_err();

    assert!(matches!(
        err,
        FleetError::ClusterExists { count: 1, .. }
    ));
}

#[tokio::test]
async fn test_create_ignores_terminated_leftovers() {
    let mock = MockProvider::new();
    mock.seed_instance("exp-7", InstanceState::Terminated);

    let members = ops::create_cluster(
        &mock,
        "exp-7",
        &spec(),
        1,
        &fast_poll(),
        &mut fleetctl_core::NullReporter,
    )
    .await
    .unwrap();

    assert_eq!(members.len(), 1);
}

#[tokio::test]
async fn test_spot_cluster_fulfills_and_tags() {
    let mock = MockProvider::with_config(MockConfig {
        spot_fulfill_after: Some(1),
        ..MockConfig::default()
    });
    let mut reporter = RecordingReporter::default();

    let members =
        ops::create_spot_cluster(&mock, "spot-1", &spec(), 2, 0.5, &fast_poll(), &mut reporter)
            .await
            .unwrap();

    assert_eq!(members.len(), 2);
    assert_eq!(reporter.fulfilled.len(), 2);
    assert!(reporter.waits >= 1);
    for member in &members {
        assert_eq!(member.tag(CLUSTER_TAG), Some("spot-1"));
    }
}

#[tokio::test]
async fn test_spot_timeout_cancels_requests_and_terminates_instances() {
    // one request fulfills, the other never does
    let mock = MockProvider::with_config(MockConfig {
        spot_fulfill_after: Some(0),
        spot_fulfill_limit: Some(1),
        ..MockConfig::default()
    });
    let mut reporter = RecordingReporter::default();

    let err =
        ops::create_spot_cluster(&mock, "spot-2", &spec(), 2, 0.1, &fast_poll(), &mut reporter)
            .await
            .unwrap_err();

    assert!(matches!(err, FleetError::SpotTimeout { attempts: 3 }));
    assert_eq!(reporter.fulfilled.len(), 1);

    // the fulfilled instance was rolled back
    let states = mock.instance_states();
    assert_eq!(states.len(), 1);
    assert_eq!(states[0].1, InstanceState::Terminated);

    // every request ended up cancelled
    for (_, status) in mock.spot_states() {
        assert!(
            status.contains("cancel") || status.contains("fulfilled"),
            "unexpected spot status {status}"
        );
    }
    let members = ops::active_members(&mock, "spot-2").await.unwrap();
    assert!(members.is_empty());
}

#[tokio::test]
async fn test_destroy_requires_members() {
    let mock = MockProvider::new();
    let err = ops::destroy_cluster(&mock, "ghost").await.unwrap_err();
    assert!(matches!(err, FleetError::EmptyCluster { .. }));
}

#[tokio::test]
async fn test_destroy_terminates_all_members() {
    let mock = MockProvider::new();
    mock.seed_instance("exp-7", InstanceState::Running);
    mock.seed_instance("exp-7", InstanceState::Stopped);

    let after = ops::destroy_cluster(&mock, "exp-7").await.unwrap();
    // the refreshed view excludes terminated members
    assert!(after.is_empty());
    for (_, state) in mock.instance_states() {
        assert_eq!(state, InstanceState::Terminated);
    }
}

#[tokio::test]
async fn test_stop_and_start_cycle() {
    let mock = MockProvider::new();
    let id = mock.seed_instance("exp-7", InstanceState::Running);

    ops::stop_cluster(&mock, "exp-7").await.unwrap();
    assert_eq!(
        mock.get_instance(&id).unwrap().state,
        InstanceState::Stopped
    );

    let started = ops::start_cluster(&mock, "exp-7").await.unwrap();
    assert_eq!(started.len(), 1);
    assert_eq!(started[0].state, InstanceState::Running);
    assert!(started[0].public_dns.is_some());
}

#[tokio::test]
async fn test_describe_reports_reachability_per_member() {
    let mock = MockProvider::new();
    mock.seed_instance("exp-7", InstanceState::Running);
    mock.seed_instance("exp-7", InstanceState::Stopped);

    let described = ops::describe_cluster(&mock, "exp-7").await.unwrap();
    assert_eq!(described.len(), 2);

    let running = described
        .iter()
        .find(|(i, _)| i.state == InstanceState::Running)
        .unwrap();
    assert!(running.1.passed());
    let stopped = described
        .iter()
        .find(|(i, _)| i.state == InstanceState::Stopped)
        .unwrap();
    assert_eq!(stopped.1, fleetctl_core::Reachability::Unknown);
}

#[tokio::test]
async fn test_hosts_skips_members_without_dns() {
    let mock = MockProvider::new();
    mock.seed_instance("exp-7", InstanceState::Running);
    mock.seed_instance("exp-7", InstanceState::Stopped);

    let hosts = ops::cluster_hosts(&mock, "exp-7").await.unwrap();
    assert_eq!(hosts.len(), 1);
    assert!(hosts[0].starts_with("ec2-mock-"));
}
