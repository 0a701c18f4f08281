//! Topologies and the runner that exercises node pairs over them

use crate::auth::AuthReport;
use crate::config::HandshakeConfig;
use crate::error::{HandshakeError, Result};
use crate::latency::{serialize_secs, LatencyRecorder};
use crate::node::{Node, NodeHandle};
use crate::session::{AuthenticationOutcome, HandshakeSession};
use crate::transport::Network;
use crate::types::{NodeId, Stage};
use crypto::KeyExchangeBackend;
use futures::future::join_all;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Nodes plus the undirected edges that count as direct links
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Topology {
    nodes: BTreeSet<NodeId>,
    edges: BTreeSet<(NodeId, NodeId)>,
}

fn edge(a: &NodeId, b: &NodeId) -> (NodeId, NodeId) {
    if a <= b {
        (a.clone(), b.clone())
    } else {
        (b.clone(), a.clone())
    }
}

impl Topology {
    pub fn new() -> Self {
        Self::default()
    }

    /// Nodes linked one after another: `a - b - c`
    pub fn chain<I, T>(ids: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<NodeId>,
    {
        let ids: Vec<NodeId> = ids.into_iter().map(Into::into).collect();
        let mut topology = Self::new();
        for id in &ids {
            topology.add_node(id.clone());
        }
        for link in ids.windows(2) {
            topology.connect(&link[0], &link[1]);
        }
        topology
    }

    pub fn add_node(&mut self, id: impl Into<NodeId>) {
        self.nodes.insert(id.into());
    }

    /// Add an undirected edge, registering both ends. Self-loops are ignored.
    pub fn connect(&mut self, a: &NodeId, b: &NodeId) {
        if a == b {
            return;
        }
        self.nodes.insert(a.clone());
        self.nodes.insert(b.clone());
        self.edges.insert(edge(a, b));
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.nodes.contains(id)
    }

    pub fn is_adjacent(&self, a: &NodeId, b: &NodeId) -> bool {
        self.edges.contains(&edge(a, b))
    }

    pub fn nodes(&self) -> impl Iterator<Item = &NodeId> {
        self.nodes.iter()
    }

    pub fn edges(&self) -> impl Iterator<Item = &(NodeId, NodeId)> {
        self.edges.iter()
    }

    pub fn neighbors(&self, id: &NodeId) -> BTreeSet<NodeId> {
        self.edges
            .iter()
            .filter_map(|(a, b)| {
                if a == id {
                    Some(b.clone())
                } else if b == id {
                    Some(a.clone())
                } else {
                    None
                }
            })
            .collect()
    }

    /// Network with every node registered and online. Needs a tokio runtime.
    pub fn network(&self) -> Network {
        Network::builder().nodes(self.nodes.iter().cloned()).build()
    }
}

/// How the runner schedules independent pairs
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub enum SchedulePolicy {
    /// One session after another
    #[default]
    Sequential,
    /// One task per pair, joined at the end
    Concurrent,
}

/// Outcome of one pair's session
#[derive(Clone, Debug, Serialize)]
pub struct PairReport {
    pub initiator: NodeId,
    pub responder: NodeId,
    /// Whether the pair shares a direct edge
    pub adjacent: bool,
    pub success: bool,
    pub stages: Vec<Stage>,
    pub outcome: Option<AuthenticationOutcome>,
    pub auth: Option<AuthReport>,
    pub error: Option<String>,
    #[serde(serialize_with = "serialize_secs")]
    pub elapsed: Duration,
    pub latency: LatencyRecorder,
}

impl PairReport {
    fn failed(initiator: NodeId, responder: NodeId, adjacent: bool, error: String) -> Self {
        Self {
            initiator,
            responder,
            adjacent,
            success: false,
            stages: Vec::new(),
            outcome: None,
            auth: None,
            error: Some(error),
            elapsed: Duration::ZERO,
            latency: LatencyRecorder::new(),
        }
    }
}

/// Aggregate of a whole run
#[derive(Clone, Debug, Serialize)]
pub struct RunReport {
    pub backend: &'static str,
    pub policy: SchedulePolicy,
    pub pairs: Vec<PairReport>,
    /// Every pair's records, merged in requested pair order
    pub latency: LatencyRecorder,
    #[serde(serialize_with = "serialize_secs")]
    pub total: Duration,
}

impl RunReport {
    pub fn all_succeeded(&self) -> bool {
        !self.pairs.is_empty() && self.pairs.iter().all(|pair| pair.success)
    }

    pub fn failures(&self) -> impl Iterator<Item = &PairReport> {
        self.pairs.iter().filter(|pair| !pair.success)
    }
}

/// Drives one [`HandshakeSession`] per requested pair
pub struct TopologyRunner {
    topology: Topology,
    network: Network,
    nodes: BTreeMap<NodeId, NodeHandle>,
    backend: Arc<dyn KeyExchangeBackend>,
    config: HandshakeConfig,
    policy: SchedulePolicy,
}

impl TopologyRunner {
    /// Build the topology's network and nodes. Needs a tokio runtime.
    pub fn new(topology: Topology, backend: Arc<dyn KeyExchangeBackend>, config: HandshakeConfig) -> Self {
        let network = topology.network();
        Self::with_network(topology, network, backend, config)
    }

    /// Use a prepared network, e.g. one with offline nodes
    pub fn with_network(
        topology: Topology,
        network: Network,
        backend: Arc<dyn KeyExchangeBackend>,
        config: HandshakeConfig,
    ) -> Self {
        let nodes = topology
            .nodes()
            .map(|id| {
                let mut node = Node::new(id.clone());
                for peer in topology.neighbors(id) {
                    node.add_neighbor(peer);
                }
                (id.clone(), node.into_handle())
            })
            .collect();
        Self {
            topology,
            network,
            nodes,
            backend,
            config,
            policy: SchedulePolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: SchedulePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    pub fn node(&self, id: &NodeId) -> Option<&NodeHandle> {
        self.nodes.get(id)
    }

    /// Run every pair. Per-pair failures are reported, not returned;
    /// only a malformed pair list is an error.
    pub async fn run(&self, pairs: &[(NodeId, NodeId)]) -> Result<RunReport> {
        validate_pairs(pairs)?;
        tracing::info!(
            pairs = pairs.len(),
            backend = self.backend.name(),
            policy = ?self.policy,
            "starting topology run"
        );

        let started = Instant::now();
        let reports = match self.policy {
            SchedulePolicy::Sequential => {
                let mut reports = Vec::with_capacity(pairs.len());
                for (initiator, responder) in pairs {
                    reports.push(self.pair_task(initiator, responder).await);
                }
                reports
            }
            SchedulePolicy::Concurrent => {
                let handles: Vec<_> = pairs
                    .iter()
                    .map(|(initiator, responder)| tokio::spawn(self.pair_task(initiator, responder)))
                    .collect();
                join_all(handles)
                    .await
                    .into_iter()
                    .zip(pairs)
                    .map(|(joined, (initiator, responder))| {
                        joined.unwrap_or_else(|err| {
                            PairReport::failed(
                                initiator.clone(),
                                responder.clone(),
                                self.topology.is_adjacent(initiator, responder),
                                format!("session task aborted: {err}"),
                            )
                        })
                    })
                    .collect()
            }
        };
        let total = started.elapsed();

        let mut latency = LatencyRecorder::new();
        for report in &reports {
            latency.merge(&report.latency);
        }

        let report = RunReport {
            backend: self.backend.name(),
            policy: self.policy,
            pairs: reports,
            latency,
            total,
        };
        tracing::info!(
            succeeded = report.pairs.iter().filter(|p| p.success).count(),
            failed = report.failures().count(),
            total = ?total,
            "topology run finished"
        );
        Ok(report)
    }

    /// Owned future for one pair, so it can be spawned
    fn pair_task(
        &self,
        initiator: &NodeId,
        responder: &NodeId,
    ) -> impl std::future::Future<Output = PairReport> + Send + 'static {
        let adjacent = self.topology.is_adjacent(initiator, responder);
        let handles = (self.nodes.get(initiator).cloned(), self.nodes.get(responder).cloned());
        let (initiator, responder) = (initiator.clone(), responder.clone());
        let network = self.network.clone();
        let backend = self.backend.clone();
        let config = self.config.clone();

        async move {
            let (initiator_node, responder_node) = match handles {
                (Some(i), Some(r)) => (i, r),
                (None, _) => {
                    let err = HandshakeError::UnknownNode(initiator.clone());
                    return PairReport::failed(initiator, responder, adjacent, err.to_string());
                }
                (_, None) => {
                    let err = HandshakeError::UnknownNode(responder.clone());
                    return PairReport::failed(initiator, responder, adjacent, err.to_string());
                }
            };

            let mut session = match HandshakeSession::new(
                &network,
                initiator_node,
                responder_node,
                backend,
                config,
            ) {
                Ok(session) => session,
                Err(err) => return PairReport::failed(initiator, responder, adjacent, err.to_string()),
            };

            let result = session.run().await;
            PairReport {
                initiator,
                responder,
                adjacent,
                success: result.is_ok(),
                stages: session.history().to_vec(),
                outcome: session.outcome(),
                auth: session.auth_report(),
                error: result.err().map(|err| err.to_string()),
                elapsed: session.elapsed().unwrap_or_default(),
                latency: session.latency().clone(),
            }
        }
    }
}

fn validate_pairs(pairs: &[(NodeId, NodeId)]) -> Result<()> {
    let mut seen = HashSet::new();
    for (a, b) in pairs {
        if a == b {
            return Err(HandshakeError::InvalidPair(format!("{a} paired with itself")));
        }
        if !seen.insert(edge(a, b)) {
            return Err(HandshakeError::InvalidPair(format!("{a}-{b} listed twice")));
        }
    }
    Ok(())
}
