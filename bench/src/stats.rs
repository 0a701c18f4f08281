//! Sample summaries for repeated measurements

use pq_handshake::LatencyRecorder;
use serde::Serialize;
use std::collections::HashMap;

/// Mean, median and 95th percentile of a sample set
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Summary {
    pub samples: usize,
    pub mean: f64,
    pub median: f64,
    pub p95: f64,
}

impl Summary {
    /// Median is `sorted[n / 2]`; p95 is `sorted[floor(0.95 n) - 1]`, falling
    /// back to the largest sample when that index would be negative.
    pub fn from_samples(samples: &[f64]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }
        let mut sorted = samples.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));
        let n = sorted.len();
        let p95_index = ((n as f64 * 0.95) as usize)
            .checked_sub(1)
            .unwrap_or(n - 1)
            .min(n - 1);

        Some(Self {
            samples: n,
            mean: sorted.iter().sum::<f64>() / n as f64,
            median: sorted[n / 2],
            p95: sorted[p95_index],
        })
    }

    /// Same summary with every value multiplied by `factor`
    pub fn scaled(self, factor: f64) -> Self {
        Self {
            mean: self.mean * factor,
            median: self.median * factor,
            p95: self.p95 * factor,
            ..self
        }
    }
}

/// Per-key samples collected across repeated runs, in first-seen order
#[derive(Debug, Default)]
pub struct LatencyTable {
    keys: Vec<String>,
    samples: HashMap<String, Vec<f64>>,
}

#[derive(Clone, Debug, Serialize)]
pub struct KeySummary {
    pub key: String,
    /// Seconds
    pub summary: Summary,
}

impl LatencyTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, recorder: &LatencyRecorder) {
        for (key, elapsed) in recorder.iter() {
            let key = key.to_string();
            if !self.samples.contains_key(&key) {
                self.keys.push(key.clone());
            }
            self.samples
                .entry(key)
                .or_default()
                .push(elapsed.as_secs_f64());
        }
    }

    pub fn summaries(&self) -> Vec<KeySummary> {
        self.keys
            .iter()
            .filter_map(|key| {
                let summary = Summary::from_samples(self.samples.get(key)?)?;
                Some(KeySummary {
                    key: key.clone(),
                    summary,
                })
            })
            .collect()
    }
}
