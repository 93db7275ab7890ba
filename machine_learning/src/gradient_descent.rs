use log::warn;

use crate::{
    DenseWeights, Example, LearnerBase, Loss, SharedData,
    learner::{Learner, finalize_prediction},
    persistence::ResumeState,
};

/// Gradient descent optimization algorithm over hashed features.
///
/// When `adaptive`, slot `1` of every feature accumulates its squared gradients
/// and scales the feature's step AdaGrad style.
#[derive(Debug, Clone)]
pub struct GradientDescent {
    learning_rate: f32,
    adaptive: bool,
    weights: DenseWeights,
    base: LearnerBase,
}

impl GradientDescent {
    /// Returns a new `GradientDescent`.
    ///
    /// # Arguments
    /// * `learning_rate` - The *length* of the steps taken on `learn`.
    /// * `adaptive` - Whether to keep per feature learning rates.
    /// * `num_bits` - The weight table holds `2^num_bits` features.
    /// * `base` - Loss, interactions and early stopping.
    pub fn new(learning_rate: f32, adaptive: bool, num_bits: u32, base: LearnerBase) -> Self {
        let stride_shift = if adaptive { 1 } else { 0 };

        Self {
            learning_rate,
            adaptive,
            weights: DenseWeights::new(num_bits, stride_shift),
            base,
        }
    }

    /// The per feature step multiplier.
    fn rate_decay(adaptive: bool, w: &[f32]) -> f32 {
        match adaptive {
            false => 1.,
            true if w[1] > 0. => 1. / w[1].sqrt(),
            true => 0.,
        }
    }

    /// Updates the parameters according to the algorithm's learning rule, that is, making a step in
    /// the opposite direction of the gradient, never overshooting the label.
    fn update(&mut self, sd: &SharedData, ex: &Example, label: f32) {
        let adaptive = self.adaptive;
        let loss = self.base.loss;

        if adaptive {
            let grad_sq = loss.get_square_grad(ex.pred, label) * ex.weight;
            self.base.foreach_feature(ex, |x, i| {
                self.weights.slot_mut(i)[1] += grad_sq * x * x;
            });
        }

        let mut pred_per_update = 0f32;
        self.base.foreach_feature(ex, |x, i| {
            pred_per_update += x * x * Self::rate_decay(adaptive, self.weights.slot(i));
        });

        if pred_per_update <= 0. {
            return;
        }

        let update_scale = self.learning_rate * ex.weight;
        let update = loss.get_update(ex.pred, label, update_scale, pred_per_update);
        if !update.is_finite() {
            warn!(example = sd.example_number + 1; "non finite update skipped");
            return;
        }

        self.base.foreach_feature(ex, |x, i| {
            let w = self.weights.slot_mut(i);
            let decay = Self::rate_decay(adaptive, w);
            w[0] += update * x * decay;
        });
    }
}

impl Learner for GradientDescent {
    fn name(&self) -> &'static str {
        if self.adaptive {
            "adaptive_gradient_descent"
        } else {
            "gradient_descent"
        }
    }

    fn predict(&mut self, sd: &SharedData, ex: &mut Example) {
        let raw = self.base.inline_predict(&self.weights, ex);
        ex.partial_prediction = raw;
        ex.pred = finalize_prediction(sd, raw);
    }

    fn learn(&mut self, sd: &mut SharedData, ex: &mut Example) {
        self.base.prepare(sd, ex);
        self.predict(sd, ex);

        if let Some(label) = ex.label.scalar()
            && LearnerBase::trains_on(ex)
        {
            self.update(sd, ex, label);
        }

        self.base.account(sd, ex);
    }

    fn end_pass(&mut self, sd: &SharedData) -> bool {
        self.base.end_pass(sd)
    }

    fn weights(&self) -> &DenseWeights {
        &self.weights
    }

    fn weights_mut(&mut self) -> &mut DenseWeights {
        &mut self.weights
    }

    fn loss(&self) -> Loss {
        self.base.loss
    }

    fn is_adaptive(&self) -> bool {
        self.adaptive
    }

    fn resume_state(&self) -> ResumeState {
        ResumeState {
            no_win_counter: self.base.no_win_counter,
            ..ResumeState::default()
        }
    }

    fn restore(&mut self, state: ResumeState) {
        self.base.no_win_counter = state.no_win_counter;
    }

    fn boxed_clone(&self) -> Box<dyn Learner> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{InteractionsGenerator, Label};

    fn gd(adaptive: bool) -> GradientDescent {
        let base = LearnerBase::new(Loss::Squared, InteractionsGenerator::default(), 0);
        GradientDescent::new(0.5, adaptive, 4, base)
    }

    fn example() -> Example {
        let mut ex = Example::new();
        let fs = ex.get_or_create_feature_group(0, b'a');
        fs.push_back(1.0, 5);
        fs.end_ns_extent();
        ex.label = Label::simple(1.0);
        ex
    }

    #[test]
    fn plain_step_is_importance_safe() {
        let mut learner = gd(false);
        learner.learn(&mut SharedData::new(), &mut example());

        let expected = 1.0 - (-1.0f32).exp();
        assert_eq!(learner.weights().stride(), 1);
        assert!((learner.weights().slot(5)[0] - expected).abs() < 1e-6);
    }

    #[test]
    fn adaptive_step_is_scaled_by_gradient_history() {
        let mut learner = gd(true);
        learner.learn(&mut SharedData::new(), &mut example());

        let slots = learner.weights().slot(5);
        assert_eq!(slots[1], 4.0);

        // pred_per_update = 0.5, update = (1 - e^-0.5) / 0.5, step = update * 0.5.
        let expected = 1.0 - (-0.5f32).exp();
        assert!((slots[0] - expected).abs() < 1e-6);
        assert!(learner.is_adaptive());
    }

    #[test]
    fn repeated_learning_reduces_loss() {
        let mut learner = gd(true);
        let mut sd = SharedData::new();

        let mut first = example();
        learner.learn(&mut sd, &mut first);
        for _ in 0..20 {
            learner.learn(&mut sd, &mut example());
        }

        let mut last = example();
        learner.learn(&mut sd, &mut last);
        assert!(last.loss < first.loss);
    }
}
