use std::{
    io::{Read, Write},
    ops::Range,
};

use log::warn;

use crate::{
    DenseWeights, Example, InteractionsGenerator, Loss, Result, SharedData,
    persistence::{self, ResumeState},
    shared_data::HoldoutOutcome,
};

/// An online learner over a strided weight array.
pub trait Learner: Send {
    fn name(&self) -> &'static str;

    /// Computes `ex.partial_prediction` and the finalized `ex.pred` without learning.
    fn predict(&mut self, sd: &SharedData, ex: &mut Example);

    /// Predicts on `ex` and, unless it's a holdout or unlabeled example, learns from it.
    ///
    /// The example's loss is accounted into `sd` either way.
    fn learn(&mut self, sd: &mut SharedData, ex: &mut Example);

    /// Closes a pass over the data.
    ///
    /// # Returns
    /// `true` if the holdout loss stopped improving for long enough to stop training.
    fn end_pass(&mut self, sd: &SharedData) -> bool;

    fn weights(&self) -> &DenseWeights;

    fn weights_mut(&mut self) -> &mut DenseWeights;

    fn loss(&self) -> Loss;

    /// Whether slot `1` holds a per feature adaptive accumulator.
    fn is_adaptive(&self) -> bool {
        false
    }

    /// The slot holding the per feature normalizer, if any.
    fn normalized_idx(&self) -> Option<usize> {
        None
    }

    /// The slots a learner trains from, every one of them has to be merged
    /// for a synchronized model to keep learning the same way on every node.
    fn sync_slots(&self) -> Range<usize> {
        0..1
    }

    /// The running state that isn't part of the weights.
    fn resume_state(&self) -> ResumeState;

    fn restore(&mut self, state: ResumeState);

    fn boxed_clone(&self) -> Box<dyn Learner>;

    /// Writes the model into `writer`, with every slot and the running state if `resume` is set.
    fn save(&self, writer: &mut dyn Write, resume: bool) -> Result<()> {
        let state = resume.then(|| self.resume_state());
        persistence::save_model(writer, self.weights(), state.as_ref())
    }

    /// Reads a model saved with `save`.
    ///
    /// # Returns
    /// A `ResumeUnavailable` error if `resume` is requested but the model has no running state.
    fn load(&mut self, reader: &mut dyn Read, resume: bool) -> Result<()> {
        if let Some(state) = persistence::load_model(reader, self.weights_mut(), resume)? {
            self.restore(state);
        }

        Ok(())
    }
}

impl Clone for Box<dyn Learner> {
    fn clone(&self) -> Self {
        self.boxed_clone()
    }
}

/// Clamps a raw prediction into the observed label range.
pub fn finalize_prediction(sd: &SharedData, ret: f32) -> f32 {
    if ret.is_nan() {
        warn!("NaN prediction in example {}, forcing 0.0", sd.example_number + 1);
        return 0.;
    }

    if ret > sd.max_label {
        sd.max_label
    } else if ret < sd.min_label {
        sd.min_label
    } else {
        ret
    }
}

/// The configuration and bookkeeping every learner shares.
#[derive(Debug, Clone)]
pub struct LearnerBase {
    pub loss: Loss,
    pub interactions: InteractionsGenerator,
    /// Passes without holdout improvement before stopping, `0` disables early stopping.
    pub early_terminate: u64,
    pub no_win_counter: u64,
}

impl LearnerBase {
    pub fn new(loss: Loss, interactions: InteractionsGenerator, early_terminate: u64) -> Self {
        Self {
            loss,
            interactions,
            early_terminate,
            no_win_counter: 0,
        }
    }

    /// Calls `f(value, index)` for every linear and interacted feature of `ex`.
    ///
    /// # Returns
    /// The amount of interacted features.
    pub fn foreach_feature<F: FnMut(f32, u64)>(&self, ex: &Example, mut f: F) -> usize {
        for (_, fs) in ex.active() {
            for (value, index) in fs.iter() {
                f(value, index);
            }
        }

        self.interactions.foreach(ex, f)
    }

    /// The dot product of slot `0` with the features of `ex`, plus the label's initial value.
    pub fn inline_predict(&self, weights: &DenseWeights, ex: &mut Example) -> f32 {
        let mut dot = ex.label.initial();
        let interacted = self.foreach_feature(ex, |x, i| dot += weights.slot(i)[0] * x);

        ex.num_features_from_interactions = interacted;
        ex.num_features = ex.linear_len() + interacted;
        dot
    }

    /// Registers the label and namespaces of `ex` before it's predicted on.
    pub fn prepare(&mut self, sd: &mut SharedData, ex: &Example) {
        if let Some(label) = ex.label.scalar() {
            sd.observe_label(label);
        }

        self.interactions.update(ex);
    }

    /// Whether `ex` should update the weights.
    pub fn trains_on(ex: &Example) -> bool {
        !ex.test_only && ex.label.scalar().is_some() && ex.weight > 0.
    }

    /// Computes the loss of the finished example and accounts it.
    pub fn account(&self, sd: &mut SharedData, ex: &mut Example) {
        let label = ex.label.scalar();
        ex.loss = label.map_or(0., |y| self.loss.get_loss(sd, ex.pred, y) * ex.weight);
        sd.update(
            ex.test_only,
            label.is_some(),
            ex.loss,
            ex.weight,
            ex.num_features,
        );
    }

    /// Updates the early stopping counter out of the last holdout summary.
    pub fn end_pass(&mut self, sd: &SharedData) -> bool {
        match sd.last_holdout {
            HoldoutOutcome::Improved => self.no_win_counter = 0,
            HoldoutOutcome::NoWin => self.no_win_counter += 1,
            HoldoutOutcome::NoData => {}
        }

        self.early_terminate > 0 && self.no_win_counter >= self.early_terminate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn predictions_are_clamped_and_nan_is_zeroed() {
        let sd = SharedData {
            min_label: -1.0,
            max_label: 1.0,
            ..SharedData::default()
        };

        assert_eq!(finalize_prediction(&sd, 3.0), 1.0);
        assert_eq!(finalize_prediction(&sd, -3.0), -1.0);
        assert_eq!(finalize_prediction(&sd, 0.5), 0.5);
        assert_eq!(finalize_prediction(&sd, f32::NAN), 0.0);
    }

    #[test]
    fn early_stop_after_consecutive_misses() {
        let mut base = LearnerBase::new(Loss::Squared, InteractionsGenerator::default(), 2);
        let mut sd = SharedData::default();

        sd.summarize_holdout(Some(1.0));
        assert!(!base.end_pass(&sd));
        sd.summarize_holdout(Some(2.0));
        assert!(!base.end_pass(&sd));
        sd.summarize_holdout(Some(2.0));
        assert!(base.end_pass(&sd));
    }
}
