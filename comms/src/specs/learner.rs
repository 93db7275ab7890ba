use serde::{Deserialize, Serialize};

/// The specification for the learning rule.
///
/// FTRL family variants left without `alpha` or `beta` take the variant's defaults.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizerSpec {
    Ftrl {
        alpha: Option<f32>,
        beta: Option<f32>,
    },
    Pistol {
        alpha: Option<f32>,
        beta: Option<f32>,
    },
    Coin {
        alpha: Option<f32>,
        beta: Option<f32>,
    },
    GradientDescent {
        learning_rate: f32,
        #[serde(default)]
        adaptive: bool,
    },
}

impl Default for OptimizerSpec {
    fn default() -> Self {
        Self::Ftrl {
            alpha: None,
            beta: None,
        }
    }
}

fn default_num_bits() -> u32 {
    18
}

fn default_loss() -> String {
    "squared".into()
}

/// The specification for a `Learner`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LearnerSpec {
    #[serde(default = "default_num_bits")]
    pub num_bits: u32,
    #[serde(default = "default_loss")]
    pub loss: String,
    /// Quantile's tau.
    #[serde(default)]
    pub loss_parameter: Option<f32>,
    #[serde(default)]
    pub optimizer: OptimizerSpec,
    #[serde(default)]
    pub l1: f32,
    #[serde(default)]
    pub l2: f32,
    #[serde(default)]
    pub interactions: Vec<String>,
    #[serde(default)]
    pub full_name_interactions: Vec<String>,
    #[serde(default)]
    pub leave_duplicate_interactions: bool,
    /// Generate every ordering of wildcard interactions instead of combinations.
    #[serde(default)]
    pub permutations: bool,
    #[serde(default)]
    pub add_constant: bool,
    #[serde(default)]
    pub early_terminate: u64,
}

impl Default for LearnerSpec {
    fn default() -> Self {
        Self {
            num_bits: default_num_bits(),
            loss: default_loss(),
            loss_parameter: None,
            optimizer: OptimizerSpec::default(),
            l1: 0.,
            l2: 0.,
            interactions: Vec::new(),
            full_name_interactions: Vec::new(),
            leave_duplicate_interactions: false,
            permutations: false,
            add_constant: false,
            early_terminate: 0,
        }
    }
}
