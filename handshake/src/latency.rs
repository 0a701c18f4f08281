//! Stage-duration accumulation keyed by (stage, link)

use crate::types::LinkLabel;
use serde::{Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

pub const PK_TRANSMISSION: &str = "pk_transmission";
pub const CT_TRANSMISSION: &str = "ct_transmission";
pub const KEYGEN_CPU: &str = "keygen_cpu";
pub const ENCAP_CPU: &str = "encap_cpu";
pub const DECAP_CPU: &str = "decap_cpu";
pub const COMPUTE_SS_CPU: &str = "compute_ss_cpu";
pub const HANDSHAKE_TOTAL: &str = "handshake_total";

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct LatencyKey {
    pub stage: String,
    pub link: LinkLabel,
}

impl fmt::Display for LatencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.stage, self.link)
    }
}

/// One dumped record, durations as fractional seconds
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LatencyEntry {
    pub stage: String,
    pub link: LinkLabel,
    pub seconds: f64,
}

/// Insertion-ordered latency records.
///
/// Re-recording an existing key overwrites its duration but keeps its
/// original position.
#[derive(Clone, Debug, Default)]
pub struct LatencyRecorder {
    records: Vec<(LatencyKey, Duration)>,
    index: HashMap<LatencyKey, usize>,
}

impl LatencyRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, stage: impl Into<String>, link: LinkLabel, elapsed: Duration) {
        let key = LatencyKey {
            stage: stage.into(),
            link,
        };
        match self.index.get(&key) {
            Some(&slot) => self.records[slot].1 = elapsed,
            None => {
                self.index.insert(key.clone(), self.records.len());
                self.records.push((key, elapsed));
            }
        }
    }

    pub fn get(&self, stage: &str, link: &LinkLabel) -> Option<Duration> {
        self.records
            .iter()
            .find(|(key, _)| key.stage == stage && &key.link == link)
            .map(|(_, elapsed)| *elapsed)
    }

    /// Records in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&LatencyKey, Duration)> {
        self.records.iter().map(|(key, elapsed)| (key, *elapsed))
    }

    pub fn dump(&self) -> Vec<LatencyEntry> {
        self.iter()
            .map(|(key, elapsed)| LatencyEntry {
                stage: key.stage.clone(),
                link: key.link.clone(),
                seconds: elapsed.as_secs_f64(),
            })
            .collect()
    }

    /// Append another recorder's records, in its order
    pub fn merge(&mut self, other: &LatencyRecorder) {
        for (key, elapsed) in other.iter() {
            self.record(key.stage.clone(), key.link.clone(), elapsed);
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl Serialize for LatencyRecorder {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.dump())
    }
}

/// Serialize a duration as fractional seconds
pub(crate) fn serialize_secs<S: Serializer>(elapsed: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(elapsed.as_secs_f64())
}
