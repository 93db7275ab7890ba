use comms::{
    AllReduceSession, SessionCache,
    specs::{ExampleSpec, SyncSpec, WorkerSpec},
};
use log::{debug, info};
use machine_learning::{
    Example, ExamplePool, Learner, SharedData, persistence::ResumeState,
    shared_data::HoldoutOutcome,
};

use crate::{
    accumulate::{accumulate, accumulate_avg, accumulate_scalar, accumulate_weighted_avg},
    builder::fill_example,
    error::Result,
    threaded::train_threaded,
};

/// The examples of a pass and how to turn them into `Example`s.
#[derive(Debug, Clone, Copy)]
pub struct ExampleFeed<'a> {
    examples: &'a [ExampleSpec],
    add_constant: bool,
    holdout_period: u64,
}

impl<'a> ExampleFeed<'a> {
    /// Creates a new `ExampleFeed`.
    ///
    /// # Args
    /// * `examples` - The hashed records.
    /// * `add_constant` - Whether every example gets the bias feature.
    /// * `holdout_period` - Every `holdout_period`th example is held out, `0` disables holdout.
    pub fn new(examples: &'a [ExampleSpec], add_constant: bool, holdout_period: u64) -> Self {
        Self {
            examples,
            add_constant,
            holdout_period,
        }
    }

    pub fn len(&self) -> usize {
        self.examples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.examples.is_empty()
    }

    /// Fills `ex` with the `i`th record.
    pub fn fill(&self, ex: &mut Example, i: usize) {
        fill_example(ex, &self.examples[i], self.add_constant);

        if self.holdout_period > 0 && (i as u64 + 1) % self.holdout_period == 0 {
            ex.test_only = true;
        }
    }
}

/// What a finished pass looked like.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PassReport {
    pub pass: usize,
    pub average_loss: f64,
    /// The holdout loss over every node of the group.
    pub holdout_loss: Option<f32>,
    pub outcome: HoldoutOutcome,
}

/// Online training runtime, optionally synchronized with a group of workers.
pub struct Worker {
    spec: WorkerSpec,
    learner: Box<dyn Learner>,
    sd: SharedData,
    sessions: SessionCache,
}

impl Worker {
    /// Creates a new `Worker`.
    ///
    /// # Args
    /// * `spec` - The worker's configuration.
    /// * `learner` - The model to train, usually built out of `spec.learner`.
    ///
    /// # Returns
    /// A new worker instance.
    pub fn new(spec: WorkerSpec, learner: Box<dyn Learner>) -> Self {
        let mut sd = SharedData::new();
        learner.loss().configure_label_range(&mut sd);

        Self {
            spec,
            learner,
            sd,
            sessions: SessionCache::new(),
        }
    }

    pub fn learner(&self) -> &dyn Learner {
        self.learner.as_ref()
    }

    pub fn shared_data(&self) -> &SharedData {
        &self.sd
    }

    pub fn into_learner(self) -> Box<dyn Learner> {
        self.learner
    }

    /// Trains over `examples` for the configured amount of passes.
    ///
    /// Holdout only happens with more than one pass. Training stops early once
    /// the learner reports the holdout loss stopped improving.
    ///
    /// # Args
    /// * `examples` - This worker's share of the data.
    ///
    /// # Returns
    /// A report per pass run.
    pub async fn run(&mut self, examples: &[ExampleSpec]) -> Result<Vec<PassReport>> {
        let holdout_period = if self.spec.passes > 1 {
            self.spec.holdout_period
        } else {
            0
        };
        let feed = ExampleFeed::new(examples, self.spec.learner.add_constant, holdout_period);

        let mut reports = Vec::with_capacity(self.spec.passes);

        for pass in 0..self.spec.passes {
            if self.spec.threads > 1 {
                train_threaded(
                    self.learner.as_mut(),
                    &mut self.sd,
                    &feed,
                    self.spec.threads,
                    self.spec.ring_size,
                )?;
            } else {
                self.train_pass(&feed);
            }

            let (holdout_loss, done) = self.end_pass().await?;
            let report = PassReport {
                pass,
                average_loss: self.sd.average_loss(),
                holdout_loss,
                outcome: self.sd.last_holdout,
            };

            info!(
                pass = pass,
                average_loss = report.average_loss;
                "pass finished"
            );
            reports.push(report);

            if done {
                info!("holdout loss stopped improving, stopping after pass {pass}");
                break;
            }
        }

        Ok(reports)
    }

    fn train_pass(&mut self, feed: &ExampleFeed<'_>) {
        let mut pool = ExamplePool::new();

        for i in 0..feed.len() {
            let mut ex = pool.acquire();
            feed.fill(&mut ex, i);
            self.learner.learn(&mut self.sd, &mut ex);
            pool.release(ex);
        }
    }

    /// Synchronizes the group and closes the pass' holdout accounting.
    ///
    /// # Returns
    /// The pass' holdout loss and whether training should stop.
    async fn end_pass(&mut self) -> Result<(Option<f32>, bool)> {
        let mut holdout_loss = self.sd.holdout_pass_loss();

        if let Some(node) = &self.spec.node {
            let session = self.sessions.session(node).await?;
            sync(session, self.learner.as_mut(), self.spec.sync).await?;

            let loss = self.sd.holdout_sum_loss_since_last_pass as f32;
            let weight = self.sd.weighted_holdout_examples_since_last_pass as f32;
            let loss = accumulate_scalar(session, loss).await?;
            let weight = accumulate_scalar(session, weight).await?;
            holdout_loss = (weight > 0.).then(|| loss / weight);
        }

        let outcome = self.sd.summarize_holdout(holdout_loss);
        debug!("holdout outcome {outcome:?}");

        Ok((holdout_loss, self.learner.end_pass(&self.sd)))
    }
}

/// Runs the accumulate `mode` selects over `learner`'s weights.
///
/// `Sum` and `Average` merge every slot the learner trains from, along with its
/// running state, so the merged model keeps learning the same way on every node.
pub async fn sync(
    session: &mut AllReduceSession,
    learner: &mut dyn Learner,
    mode: SyncSpec,
) -> Result<()> {
    let slots = learner.sync_slots();

    match mode {
        SyncSpec::Sum => {
            for offset in slots {
                accumulate(session, learner.weights_mut(), offset).await?;
            }
            sync_running_state(session, learner, false).await
        }
        SyncSpec::Average => {
            for offset in slots {
                accumulate_avg(session, learner.weights_mut(), offset).await?;
            }
            sync_running_state(session, learner, true).await
        }
        SyncSpec::WeightedAverage => {
            let adaptive = learner.is_adaptive();
            let normalized_idx = learner.normalized_idx();
            accumulate_weighted_avg(session, learner.weights_mut(), adaptive, normalized_idx).await
        }
    }
}

/// Sums, or averages, the running state that lives outside the weights.
async fn sync_running_state(
    session: &mut AllReduceSession,
    learner: &mut dyn Learner,
    average: bool,
) -> Result<()> {
    let state = learner.resume_state();
    let mut buf = [
        state.total_weight as f32,
        state.normalized_sum_norm_x as f32,
        1.,
    ];
    session.all_reduce(&mut buf).await?;

    let [total_weight, normalized_sum_norm_x, nodes] = buf;
    let scale = if average { nodes } else { 1. };

    learner.restore(ResumeState {
        total_weight: (total_weight / scale) as f64,
        normalized_sum_norm_x: (normalized_sum_norm_x / scale) as f64,
        ..state
    });

    Ok(())
}
