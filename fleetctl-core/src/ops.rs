//! Command orchestration: the query → act → poll → report sequence behind
//! each CLI command.
//!
//! Every function here is a short linear flow over a [`CloudProvider`]; the
//! only loops are the fixed-interval polls used while spot requests fulfill
//! and while fresh instances come up.

use std::collections::HashSet;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, warn};

use crate::cluster::{member_tags, Instance, InstanceState, LaunchSpec, Reachability, SpotRequest};
use crate::error::{FleetError, Result};
use crate::provider::CloudProvider;

/// Polling cadence for spot fulfillment and instance readiness
#[derive(Debug, Clone)]
pub struct PollOptions {
    /// Delay between provider queries
    pub interval: Duration,
    /// Rounds to wait for spot fulfillment before giving up
    pub spot_wait_rounds: u32,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            spot_wait_rounds: 10,
        }
    }
}

/// Progress callbacks for the long-running flows. All methods default to
/// no-ops; the CLI installs a printing implementation.
pub trait Reporter {
    /// A spot request was fulfilled and its instance tagged
    fn spot_fulfilled(&mut self, _request: &SpotRequest) {}

    /// A polling round passed with these requests still pending
    fn spot_waiting(&mut self, _pending: &[String]) {}

    /// An instance became running + addressable + reachable for the first time
    fn instance_active(&mut self, _instance: &Instance) {}
}

/// Reporter that swallows all progress events
pub struct NullReporter;

impl Reporter for NullReporter {}

/// Cluster members that are not terminated, i.e. everything a command acts on
pub async fn active_members(
    provider: &dyn CloudProvider,
    cluster: &str,
) -> Result<Vec<Instance>> {
    let instances = provider.list_cluster_instances(cluster).await?;
    Ok(instances
        .into_iter()
        .filter(|i| !i.state.is_terminated())
        .collect())
}

/// Fail if the cluster name is already in use by live instances
async fn ensure_cluster_absent(provider: &dyn CloudProvider, cluster: &str) -> Result<()> {
    let existing = active_members(provider, cluster).await?;
    if existing.is_empty() {
        Ok(())
    } else {
        Err(FleetError::ClusterExists {
            cluster: cluster.to_string(),
            count: existing.len(),
        })
    }
}

/// Create an on-demand cluster: launch, tag, then wait for every member to
/// become reachable. Returns the final member list.
pub async fn create_cluster(
    provider: &dyn CloudProvider,
    cluster: &str,
    spec: &LaunchSpec,
    count: u32,
    poll: &PollOptions,
    reporter: &mut dyn Reporter,
) -> Result<Vec<Instance>> {
    ensure_cluster_absent(provider, cluster).await?;

    let ids = provider.launch_instances(spec, count).await?;
    debug!(cluster, launched = ids.len(), "instances launched");
    for id in &ids {
        provider.tag_instance(id, &member_tags(cluster, id)).await?;
    }

    wait_until_active(provider, cluster, poll, reporter).await
}

/// Create a spot cluster: place requests, poll fulfillment with a bounded
/// number of rounds, tag each instance as its request fulfills, then wait for
/// reachability. On timeout every request is cancelled and every instance
/// created so far is terminated.
pub async fn create_spot_cluster(
    provider: &dyn CloudProvider,
    cluster: &str,
    spec: &LaunchSpec,
    count: u32,
    max_price: f64,
    poll: &PollOptions,
    reporter: &mut dyn Reporter,
) -> Result<Vec<Instance>> {
    ensure_cluster_absent(provider, cluster).await?;

    let request_ids = provider
        .request_spot_instances(spec, count, max_price)
        .await?;
    debug!(cluster, requests = request_ids.len(), "spot requests placed");

    let mut pending: Vec<String> = request_ids.clone();
    let mut created: Vec<String> = Vec::new();
    let mut rounds = 0u32;

    sleep(poll.interval).await;
    loop {
        let results = provider.describe_spot_requests(&pending).await?;
        for request in &results {
            if request.fulfilled() {
                pending.retain(|id| id != &request.id);
                let instance_id = request
                    .instance_id
                    .as_deref()
                    .ok_or_else(|| FleetError::decode("fulfilled spot request without instance id"))?;
                provider
                    .tag_instance(instance_id, &member_tags(cluster, instance_id))
                    .await?;
                created.push(instance_id.to_string());
                reporter.spot_fulfilled(request);
            }
        }

        if pending.is_empty() {
            break;
        }
        reporter.spot_waiting(&pending);

        rounds += 1;
        if rounds >= poll.spot_wait_rounds {
            warn!(
                cluster,
                pending = pending.len(),
                created = created.len(),
                "spot fulfillment timed out, rolling back"
            );
            provider.cancel_spot_requests(&request_ids).await?;
            if !created.is_empty() {
                provider.terminate_instances(&created).await?;
            }
            return Err(FleetError::SpotTimeout { attempts: rounds });
        }
        sleep(poll.interval).await;
    }

    wait_until_active(provider, cluster, poll, reporter).await
}

/// Poll the cluster at a fixed interval until every member is `running`, has
/// a public DNS name, and passes the provider's system reachability check.
/// Each member is reported exactly once, the first time it qualifies.
pub async fn wait_until_active(
    provider: &dyn CloudProvider,
    cluster: &str,
    poll: &PollOptions,
    reporter: &mut dyn Reporter,
) -> Result<Vec<Instance>> {
    let members = active_members(provider, cluster).await?;
    let all_ids: HashSet<String> = members.iter().map(|i| i.id.clone()).collect();
    let mut active_ids: HashSet<String> = HashSet::new();

    loop {
        let members = active_members(provider, cluster).await?;
        for instance in &members {
            if active_ids.contains(&instance.id) {
                continue;
            }
            let reachable = provider.instance_reachability(&instance.id).await?;
            if instance.state == InstanceState::Running
                && instance.public_dns.is_some()
                && reachable.passed()
            {
                active_ids.insert(instance.id.clone());
                reporter.instance_active(instance);
            }
        }
        if active_ids == all_ids {
            return Ok(members);
        }
        sleep(poll.interval).await;
    }
}

/// Terminate every live member. Returns the post-termination view so callers
/// can print the shutting-down states.
pub async fn destroy_cluster(
    provider: &dyn CloudProvider,
    cluster: &str,
) -> Result<Vec<Instance>> {
    let members = active_members(provider, cluster).await?;
    if members.is_empty() {
        return Err(FleetError::EmptyCluster {
            cluster: cluster.to_string(),
        });
    }
    let ids: Vec<String> = members.iter().map(|i| i.id.clone()).collect();
    provider.terminate_instances(&ids).await?;
    active_members(provider, cluster).await
}

/// Stop every live member and return the refreshed view
pub async fn stop_cluster(provider: &dyn CloudProvider, cluster: &str) -> Result<Vec<Instance>> {
    let members = active_members(provider, cluster).await?;
    if members.is_empty() {
        return Err(FleetError::EmptyCluster {
            cluster: cluster.to_string(),
        });
    }
    let ids: Vec<String> = members.iter().map(|i| i.id.clone()).collect();
    provider.stop_instances(&ids).await?;
    active_members(provider, cluster).await
}

/// Start every live member and return the refreshed view
pub async fn start_cluster(provider: &dyn CloudProvider, cluster: &str) -> Result<Vec<Instance>> {
    let members = active_members(provider, cluster).await?;
    if members.is_empty() {
        return Err(FleetError::EmptyCluster {
            cluster: cluster.to_string(),
        });
    }
    let ids: Vec<String> = members.iter().map(|i| i.id.clone()).collect();
    provider.start_instances(&ids).await?;
    active_members(provider, cluster).await
}

/// Member list paired with each member's current reachability
pub async fn describe_cluster(
    provider: &dyn CloudProvider,
    cluster: &str,
) -> Result<Vec<(Instance, Reachability)>> {
    let members = active_members(provider, cluster).await?;
    let mut described = Vec::with_capacity(members.len());
    for instance in members {
        let reachability = provider.instance_reachability(&instance.id).await?;
        described.push((instance, reachability));
    }
    Ok(described)
}

/// Public DNS names of all live members. Members without a DNS name yet are
/// skipped so the output stays usable in scripts.
pub async fn cluster_hosts(provider: &dyn CloudProvider, cluster: &str) -> Result<Vec<String>> {
    let members = active_members(provider, cluster).await?;
    Ok(members
        .into_iter()
        .filter_map(|i| i.public_dns)
        .collect())
}
