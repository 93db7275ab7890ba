//! The serde specifications every process of the system is configured with.

pub mod example;
pub mod learner;
pub mod node;
pub mod worker;

pub use example::{ExampleSpec, NamespaceSpec};
pub use learner::{LearnerSpec, OptimizerSpec};
pub use node::{DEFAULT_MASTER_PORT, NodeSpec};
pub use worker::{SyncSpec, WorkerSpec};
