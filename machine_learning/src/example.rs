use crate::{Features, MlErr, Result};

/// Namespaces are addressed by a single byte.
pub type NamespaceIndex = u8;

pub const NUM_NAMESPACES: usize = 256;

/// The namespace holding the bias feature.
pub const CONSTANT_NAMESPACE: NamespaceIndex = 128;

/// The hash of the bias feature.
pub const CONSTANT: u64 = 11_650_396;

/// A cost attached to a class of a cost sensitive label.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassCost {
    pub class_index: u32,
    pub cost: f32,
}

/// A logged action of a contextual bandit label.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActionCost {
    pub action: u32,
    pub cost: f32,
    pub probability: f32,
}

/// The label payload of an example, its shape depends on the task.
#[derive(Debug, Clone, PartialEq)]
pub enum Label {
    Simple { label: Option<f32>, initial: f32 },
    Multiclass { label: u32 },
    CostSensitive(Vec<ClassCost>),
    ContextualBandit(Vec<ActionCost>),
}

impl Default for Label {
    fn default() -> Self {
        Self::Simple {
            label: None,
            initial: 0.,
        }
    }
}

impl Label {
    /// A scalar regression/classification label.
    pub fn simple(label: f32) -> Self {
        Self::Simple {
            label: Some(label),
            initial: 0.,
        }
    }

    /// The scalar label, if this is a labeled simple example.
    pub fn scalar(&self) -> Option<f32> {
        match self {
            Label::Simple { label, .. } => *label,
            _ => None,
        }
    }

    /// The initial prediction offset of a simple label.
    pub fn initial(&self) -> f32 {
        match self {
            Label::Simple { initial, .. } => *initial,
            _ => 0.,
        }
    }

    /// The cost of `action` in a cost sensitive or contextual bandit label.
    ///
    /// Cost sensitive labels match `action` against their class indices.
    ///
    /// # Returns
    /// `LabelIndexOutOfBounds` if the label has no such action, `Unsupported` for other label kinds.
    pub fn cost_of(&self, action: u32) -> Result<f32> {
        let (cost, len) = match self {
            Label::CostSensitive(costs) => (
                costs.iter().find(|c| c.class_index == action).map(|c| c.cost),
                costs.len(),
            ),
            Label::ContextualBandit(costs) => (
                costs.iter().find(|c| c.action == action).map(|c| c.cost),
                costs.len(),
            ),
            _ => return Err(MlErr::Unsupported("cost lookup on a label without costs")),
        };

        cost.ok_or(MlErr::LabelIndexOutOfBounds { index: action, len })
    }
}

/// One example flowing through prediction and learning.
#[derive(Debug, Clone)]
pub struct Example {
    /// Active namespaces in insertion order.
    pub indices: Vec<NamespaceIndex>,
    pub feature_space: Box<[Features]>,
    pub label: Label,
    pub weight: f32,
    /// Holdout examples are predicted and scored but never learned from.
    pub test_only: bool,

    pub partial_prediction: f32,
    pub pred: f32,
    pub loss: f32,
    pub num_features: usize,
    pub num_features_from_interactions: usize,
}

impl Default for Example {
    fn default() -> Self {
        Self {
            indices: Vec::new(),
            feature_space: (0..NUM_NAMESPACES).map(|_| Features::new()).collect(),
            label: Label::default(),
            weight: 1.,
            test_only: false,
            partial_prediction: 0.,
            pred: 0.,
            loss: 0.,
            num_features: 0,
            num_features_from_interactions: 0,
        }
    }
}

impl Example {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the bucket of `namespace_index`, registering it as active and
    /// opening an extent for `namespace_hash`.
    ///
    /// The caller closes the extent with `Features::end_ns_extent` once done pushing.
    pub fn get_or_create_feature_group(
        &mut self,
        namespace_hash: u64,
        namespace_index: NamespaceIndex,
    ) -> &mut Features {
        if !self.indices.contains(&namespace_index) {
            self.indices.push(namespace_index);
        }

        let fs = &mut self.feature_space[namespace_index as usize];
        fs.start_ns_extent(namespace_hash);
        fs
    }

    /// Adds the bias feature.
    pub fn add_constant(&mut self) {
        let fs = self.get_or_create_feature_group(CONSTANT, CONSTANT_NAMESPACE);
        fs.push_back(1., CONSTANT);
        fs.end_ns_extent();
    }

    /// The amount of linear features over every active namespace.
    pub fn linear_len(&self) -> usize {
        self.active().map(|(_, fs)| fs.len()).sum()
    }

    /// Iterates the active namespaces and their features.
    pub fn active(&self) -> impl Iterator<Item = (NamespaceIndex, &Features)> {
        self.indices
            .iter()
            .map(|&ns| (ns, &self.feature_space[ns as usize]))
    }

    /// Resets the example for reuse without releasing its buffers.
    pub fn clear(&mut self) {
        for &ns in &self.indices {
            self.feature_space[ns as usize].clear();
        }

        self.indices.clear();
        self.label = Label::default();
        self.weight = 1.;
        self.test_only = false;
        self.partial_prediction = 0.;
        self.pred = 0.;
        self.loss = 0.;
        self.num_features = 0;
        self.num_features_from_interactions = 0;
    }
}

/// A free list of cleared examples.
#[derive(Debug, Default)]
pub struct ExamplePool {
    free: Vec<Example>,
}

impl ExamplePool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes a cleared example out of the pool, allocating one if it's empty.
    pub fn acquire(&mut self) -> Example {
        self.free.pop().unwrap_or_default()
    }

    /// Clears `ex` and keeps it for a later `acquire`.
    pub fn release(&mut self, mut ex: Example) {
        ex.clear();
        self.free.push(ex);
    }

    pub fn len(&self) -> usize {
        self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.free.is_empty()
    }
}
