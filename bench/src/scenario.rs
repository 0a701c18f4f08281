//! Repeated topology runs with per-record summaries

use crate::stats::{KeySummary, LatencyTable};
use anyhow::{bail, Result};
use crypto::KeyExchangeBackend;
use pq_handshake::{HandshakeConfig, NodeId, RunReport, SchedulePolicy, Topology, TopologyRunner};
use serde::Serialize;
use std::sync::Arc;

pub struct Scenario {
    pub topology: Topology,
    pub pairs: Vec<(NodeId, NodeId)>,
    pub backend: Arc<dyn KeyExchangeBackend>,
    pub config: HandshakeConfig,
    pub policy: SchedulePolicy,
    pub iterations: usize,
    pub warmup: usize,
}

#[derive(Debug, Serialize)]
pub struct ScenarioReport {
    pub iterations: usize,
    pub warmup: usize,
    /// Measured runs in which every pair authenticated
    pub successful_runs: usize,
    /// The final measured run
    pub last: RunReport,
    /// Per-record summaries across measured runs, in seconds
    pub summaries: Vec<KeySummary>,
}

impl ScenarioReport {
    pub fn all_succeeded(&self) -> bool {
        self.successful_runs == self.iterations
    }
}

/// Default pair list: every consecutive pair, plus first with last
pub fn default_pairs(nodes: &[NodeId]) -> Vec<(NodeId, NodeId)> {
    let mut pairs: Vec<_> = nodes
        .windows(2)
        .map(|w| (w[0].clone(), w[1].clone()))
        .collect();
    if let (Some(first), Some(last)) = (nodes.first(), nodes.last()) {
        if nodes.len() > 2 {
            pairs.push((first.clone(), last.clone()));
        }
    }
    pairs
}

impl Scenario {
    /// Each iteration gets a fresh network and fresh nodes
    pub async fn run(&self) -> Result<ScenarioReport> {
        if self.iterations == 0 {
            bail!("iterations must be greater than zero");
        }
        if self.pairs.is_empty() {
            bail!("no node pairs to run");
        }

        for round in 0..self.warmup {
            let report = self.once().await?;
            tracing::debug!(round, ok = report.all_succeeded(), "warm-up run");
        }

        let mut table = LatencyTable::new();
        let mut successful_runs = 0;
        let mut last = None;
        for _ in 0..self.iterations {
            let report = self.once().await?;
            if report.all_succeeded() {
                successful_runs += 1;
            }
            table.add(&report.latency);
            last = Some(report);
        }

        let Some(last) = last else {
            bail!("no measured runs");
        };
        Ok(ScenarioReport {
            iterations: self.iterations,
            warmup: self.warmup,
            successful_runs,
            last,
            summaries: table.summaries(),
        })
    }

    async fn once(&self) -> Result<RunReport> {
        let runner = TopologyRunner::new(self.topology.clone(), self.backend.clone(), self.config.clone())
            .with_policy(self.policy);
        Ok(runner.run(&self.pairs).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crypto::X25519Backend;

    fn ids(names: &[&str]) -> Vec<NodeId> {
        names.iter().map(|n| NodeId::from(*n)).collect()
    }

    #[test]
    fn default_pairs_close_the_chain() {
        let pairs = default_pairs(&ids(&["Alice", "Bob", "Cathy"]));
        let rendered: Vec<_> = pairs.iter().map(|(a, b)| format!("{a}-{b}")).collect();
        assert_eq!(rendered, ["Alice-Bob", "Bob-Cathy", "Alice-Cathy"]);
    }

    #[test]
    fn two_nodes_give_one_pair() {
        assert_eq!(default_pairs(&ids(&["Alice", "Bob"])).len(), 1);
        assert!(default_pairs(&ids(&["Alice"])).is_empty());
    }

    #[tokio::test]
    async fn repeated_runs_are_summarised() {
        let nodes = ids(&["Alice", "Bob", "Cathy"]);
        let scenario = Scenario {
            topology: Topology::chain(nodes.clone()),
            pairs: default_pairs(&nodes),
            backend: Arc::new(X25519Backend::new()),
            config: HandshakeConfig::fast(),
            policy: SchedulePolicy::Concurrent,
            iterations: 3,
            warmup: 1,
        };
        let report = scenario.run().await.unwrap();

        assert!(report.all_succeeded());
        assert_eq!(report.last.pairs.len(), 3);
        assert!(report
            .summaries
            .iter()
            .all(|s| s.summary.samples == 3));
        assert!(report
            .summaries
            .iter()
            .any(|s| s.key == "handshake_total Alice<->Cathy"));
    }
}
