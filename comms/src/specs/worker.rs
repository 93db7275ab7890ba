use serde::{Deserialize, Serialize};

use super::{LearnerSpec, NodeSpec};

/// The accumulate run over the weights at the end of every pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncSpec {
    Sum,
    #[default]
    Average,
    WeightedAverage,
}

fn one() -> usize {
    1
}

fn default_ring_size() -> usize {
    256
}

fn default_holdout_period() -> u64 {
    10
}

/// Bootstrap specification for a worker instance.
///
/// A worker without a `node` trains alone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct WorkerSpec {
    #[serde(default)]
    pub learner: LearnerSpec,
    #[serde(default)]
    pub node: Option<NodeSpec>,
    #[serde(default)]
    pub sync: SyncSpec,
    #[serde(default = "one")]
    pub passes: usize,
    #[serde(default = "one")]
    pub threads: usize,
    #[serde(default = "default_ring_size")]
    pub ring_size: usize,
    /// Every `holdout_period`th example is held out, `0` disables holdout.
    #[serde(default = "default_holdout_period")]
    pub holdout_period: u64,
}

impl Default for WorkerSpec {
    fn default() -> Self {
        Self {
            learner: LearnerSpec::default(),
            node: None,
            sync: SyncSpec::default(),
            passes: 1,
            threads: 1,
            ring_size: default_ring_size(),
            holdout_period: default_holdout_period(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_spec_from_json() {
        let json = r#"{
            "learner": { "loss": "logistic", "optimizer": { "pistol": {} } },
            "node": { "master": "master", "unique_id": 9, "total": 3, "node": 2 },
            "sync": "weighted_average",
            "passes": 4
        }"#;

        let spec: WorkerSpec = serde_json::from_str(json).unwrap();

        assert_eq!(spec.sync, SyncSpec::WeightedAverage);
        assert_eq!(spec.passes, 4);
        assert_eq!(spec.threads, 1);
        assert_eq!(spec.node.unwrap().node, 2);
        assert_eq!(spec.learner.loss, "logistic");
    }
}
