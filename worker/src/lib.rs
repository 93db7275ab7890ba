pub mod accumulate;
pub mod builder;
pub mod config;
pub mod error;
pub mod ring;
pub mod threaded;
pub mod worker;

pub use builder::build_learner;
pub use error::{Result, WorkerErr};
pub use ring::ExampleRing;
pub use worker::{ExampleFeed, PassReport, Worker};
