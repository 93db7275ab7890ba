use serde::{Deserialize, Serialize};

/// One namespace of an already hashed example.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct NamespaceSpec {
    /// The namespace index, usually the first byte of its name.
    pub index: u8,
    /// The full name, hashed for full name interactions.
    #[serde(default)]
    pub name: Option<String>,
    /// `(hash, value)` pairs.
    pub features: Vec<(u64, f32)>,
}

/// An already hashed example record, one per line of a worker's data file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ExampleSpec {
    #[serde(default)]
    pub label: Option<f32>,
    #[serde(default)]
    pub initial: f32,
    #[serde(default = "unit_weight")]
    pub weight: f32,
    #[serde(default)]
    pub test_only: bool,
    pub namespaces: Vec<NamespaceSpec>,
}

fn unit_weight() -> f32 {
    1.
}
