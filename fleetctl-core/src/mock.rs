//! In-memory [`CloudProvider`] used by the orchestration test suites.
//!
//! Instances and spot requests live in a `RwLock`-guarded map; fulfillment
//! and reachability are driven by poll counters so tests can script how many
//! rounds each flow takes. Kept as a plain module (not feature-gated) so
//! integration tests in dependent crates can use it without feature plumbing.

use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::cluster::{
    Instance, InstanceState, LaunchSpec, Reachability, SpotRequest, Tag, CLUSTER_TAG,
};
use crate::error::{FleetError, Result};
use crate::provider::CloudProvider;

/// Knobs controlling how the mock behaves over successive polls
#[derive(Debug, Clone)]
pub struct MockConfig {
    /// Reachability polls an instance must receive before reporting `passed`
    pub reachability_polls: u32,
    /// Describe rounds before a spot request fulfills; `None` never fulfills
    pub spot_fulfill_after: Option<u32>,
    /// Cap on how many spot requests ever fulfill; `None` means all of them
    pub spot_fulfill_limit: Option<usize>,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            reachability_polls: 0,
            spot_fulfill_after: Some(0),
            spot_fulfill_limit: None,
        }
    }
}

struct MockInstance {
    instance: Instance,
    reach_polls: u32,
}

struct MockSpot {
    request: SpotRequest,
    instance_type: String,
    rounds: u32,
}

#[derive(Default)]
struct State {
    instances: BTreeMap<String, MockInstance>,
    spots: BTreeMap<String, MockSpot>,
    next_id: u64,
    fulfilled: usize,
}

pub struct MockProvider {
    config: MockConfig,
    state: RwLock<State>,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockProvider {
    pub fn new() -> Self {
        Self::with_config(MockConfig::default())
    }

    pub fn with_config(config: MockConfig) -> Self {
        Self {
            config,
            state: RwLock::new(State::default()),
        }
    }

    fn dns_for(n: u64) -> String {
        format!("ec2-mock-{}.compute.example.com", n)
    }

    fn make_instance(state: &mut State, instance_type: &str) -> String {
        state.next_id += 1;
        let n = state.next_id;
        let id = format!("i-{:08x}", n);
        let instance = Instance {
            id: id.clone(),
            instance_type: instance_type.to_string(),
            state: InstanceState::Running,
            public_dns: Some(Self::dns_for(n)),
            public_ip: Some(format!("198.51.100.{}", n % 250 + 1)),
            availability_zone: Some("us-west-2a".to_string()),
            key_name: None,
            launch_time: None,
            tags: Vec::new(),
        };
        state.instances.insert(
            id.clone(),
            MockInstance {
                instance,
                reach_polls: 0,
            },
        );
        id
    }

    /// Seed a pre-existing cluster member (for collision and lifecycle tests)
    pub fn seed_instance(&self, cluster: &str, state: InstanceState) -> String {
        let mut guard = self.lock_write();
        let id = Self::make_instance(&mut guard, "t2.medium");
        let member = guard.instances.get_mut(&id).expect("just inserted");
        member.instance.state = state;
        member.instance.tags = crate::cluster::member_tags(cluster, &id);
        if state != InstanceState::Running {
            member.instance.public_dns = None;
            member.instance.public_ip = None;
        }
        id
    }

    /// Current lifecycle state of every instance the mock knows about
    pub fn instance_states(&self) -> Vec<(String, InstanceState)> {
        self.lock_read()
            .instances
            .values()
            .map(|m| (m.instance.id.clone(), m.instance.state))
            .collect()
    }

    /// Current (state, status-code) of every spot request
    pub fn spot_states(&self) -> Vec<(String, String)> {
        self.lock_read()
            .spots
            .values()
            .map(|s| {
                (
                    s.request.id.clone(),
                    s.request.status_code.clone().unwrap_or_default(),
                )
            })
            .collect()
    }

    pub fn get_instance(&self, id: &str) -> Option<Instance> {
        self.lock_read()
            .instances
            .get(id)
            .map(|m| m.instance.clone())
    }

    fn lock_read(&self) -> std::sync::RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_write(&self) -> std::sync::RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl CloudProvider for MockProvider {
    async fn list_cluster_instances(&self, cluster: &str) -> Result<Vec<Instance>> {
        Ok(self
            .lock_read()
            .instances
            .values()
            .filter(|m| m.instance.tag(CLUSTER_TAG) == Some(cluster))
            .map(|m| m.instance.clone())
            .collect())
    }

    async fn launch_instances(&self, spec: &LaunchSpec, count: u32) -> Result<Vec<String>> {
        let mut state = self.lock_write();
        Ok((0..count)
            .map(|_| Self::make_instance(&mut state, &spec.instance_type))
            .collect())
    }

    async fn request_spot_instances(
        &self,
        spec: &LaunchSpec,
        count: u32,
        _max_price: f64,
    ) -> Result<Vec<String>> {
        let mut state = self.lock_write();
        let mut ids = Vec::with_capacity(count as usize);
        for _ in 0..count {
            state.next_id += 1;
            let id = format!("sir-{:08x}", state.next_id);
            state.spots.insert(
                id.clone(),
                MockSpot {
                    request: SpotRequest {
                        id: id.clone(),
                        state: "open".to_string(),
                        status_code: Some("pending-evaluation".to_string()),
                        instance_id: None,
                    },
                    instance_type: spec.instance_type.clone(),
                    rounds: 0,
                },
            );
            ids.push(id);
        }
        Ok(ids)
    }

    async fn describe_spot_requests(&self, ids: &[String]) -> Result<Vec<SpotRequest>> {
        let mut state = self.lock_write();
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            let fulfilled_so_far = state.fulfilled;
            // split borrow: take what we need before mutating the maps
            let (should_fulfill, instance_type) = match state.spots.get_mut(id) {
                Some(spot) => {
                    spot.rounds += 1;
                    let eligible = spot.request.instance_id.is_none()
                        && spot.request.state == "open"
                        && self
                            .config
                            .spot_fulfill_after
                            .map(|after| spot.rounds > after)
                            .unwrap_or(false)
                        && self
                            .config
                            .spot_fulfill_limit
                            .map(|limit| fulfilled_so_far < limit)
                            .unwrap_or(true);
                    (eligible, spot.instance_type.clone())
                }
                None => {
                    return Err(FleetError::api(
                        "InvalidSpotInstanceRequestID.NotFound",
                        format!("spot request '{}' does not exist", id),
                    ))
                }
            };

            if should_fulfill {
                let instance_id = Self::make_instance(&mut state, &instance_type);
                state.fulfilled += 1;
                let spot = state.spots.get_mut(id).expect("spot present");
                spot.request.state = "active".to_string();
                spot.request.status_code = Some("fulfilled".to_string());
                spot.request.instance_id = Some(instance_id);
            }
            out.push(state.spots[id].request.clone());
        }
        Ok(out)
    }

    async fn cancel_spot_requests(&self, ids: &[String]) -> Result<()> {
        let mut state = self.lock_write();
        for id in ids {
            if let Some(spot) = state.spots.get_mut(id) {
                if spot.request.instance_id.is_none() {
                    spot.request.state = "cancelled".to_string();
                    spot.request.status_code = Some("canceled-before-fulfillment".to_string());
                } else {
                    spot.request.state = "cancelled".to_string();
                }
            }
        }
        Ok(())
    }

    async fn tag_instance(&self, instance_id: &str, tags: &[Tag]) -> Result<()> {
        let mut state = self.lock_write();
        let member = state.instances.get_mut(instance_id).ok_or_else(|| {
            FleetError::api(
                "InvalidInstanceID.NotFound",
                format!("instance '{}' does not exist", instance_id),
            )
        })?;
        for tag in tags {
            match member.instance.tags.iter_mut().find(|t| t.key == tag.key) {
                Some(existing) => existing.value = tag.value.clone(),
                None => member.instance.tags.push(tag.clone()),
            }
        }
        Ok(())
    }

    async fn start_instances(&self, ids: &[String]) -> Result<()> {
        let mut state = self.lock_write();
        for id in ids {
            let n = id.trim_start_matches("i-");
            let n = u64::from_str_radix(n, 16).unwrap_or(0);
            if let Some(member) = state.instances.get_mut(id) {
                if member.instance.state == InstanceState::Stopped {
                    member.instance.state = InstanceState::Running;
                    member.instance.public_dns = Some(Self::dns_for(n));
                    member.reach_polls = 0;
                }
            }
        }
        Ok(())
    }

    async fn stop_instances(&self, ids: &[String]) -> Result<()> {
        let mut state = self.lock_write();
        for id in ids {
            if let Some(member) = state.instances.get_mut(id) {
                if member.instance.state == InstanceState::Running {
                    member.instance.state = InstanceState::Stopped;
                    member.instance.public_dns = None;
                    member.instance.public_ip = None;
                }
            }
        }
        Ok(())
    }

    async fn terminate_instances(&self, ids: &[String]) -> Result<()> {
        let mut state = self.lock_write();
        for id in ids {
            if let Some(member) = state.instances.get_mut(id) {
                member.instance.state = InstanceState::Terminated;
                member.instance.public_dns = None;
                member.instance.public_ip = None;
            }
        }
        Ok(())
    }

    async fn instance_reachability(&self, instance_id: &str) -> Result<Reachability> {
        let mut state = self.lock_write();
        let member = match state.instances.get_mut(instance_id) {
            Some(m) => m,
            None => return Ok(Reachability::Unknown),
        };
        if member.instance.state != InstanceState::Running {
            return Ok(Reachability::Unknown);
        }
        member.reach_polls += 1;
        if member.reach_polls > self.config.reachability_polls {
            Ok(Reachability::Passed)
        } else {
            Ok(Reachability::Initializing)
        }
    }
}
