pub mod error;
pub mod example;
pub mod features;
pub mod ftrl;
pub mod gradient_descent;
pub mod hash;
pub mod interactions;
pub mod learner;
pub mod loss;
pub mod persistence;
pub mod shared_data;
pub mod weights;

pub use error::{MlErr, Result};
pub use example::{Example, ExamplePool, Label};
pub use features::Features;
pub use ftrl::{Ftrl, FtrlVariant};
pub use gradient_descent::GradientDescent;
pub use interactions::InteractionsGenerator;
pub use learner::{Learner, LearnerBase};
pub use loss::Loss;
pub use shared_data::SharedData;
pub use weights::DenseWeights;
