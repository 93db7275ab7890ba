use std::ops::Range;

use log::warn;

use crate::{
    DenseWeights, Example, LearnerBase, Loss, SharedData,
    learner::{Learner, finalize_prediction},
    persistence::ResumeState,
};

// Per feature slots.
const W_XT: usize = 0;
const W_ZT: usize = 1;
const W_G2: usize = 2;
const W_MX: usize = 3;
const W_WE: usize = 4;
const W_MG: usize = 5;

/// The members of the follow the regularized leader family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FtrlVariant {
    /// FTRL-proximal with l1/l2 regularization.
    Proximal,
    /// Parameter free stochastic learning.
    Pistol,
    /// Coin betting without a fixed learning rate.
    CoinBetting,
}

impl FtrlVariant {
    pub fn stride_shift(self) -> u32 {
        match self {
            FtrlVariant::Proximal | FtrlVariant::Pistol => 2,
            FtrlVariant::CoinBetting => 3,
        }
    }

    /// The `(alpha, beta)` used when none are configured.
    pub fn defaults(self) -> (f32, f32) {
        match self {
            FtrlVariant::Proximal => (0.005, 0.1),
            FtrlVariant::Pistol => (1.0, 0.5),
            FtrlVariant::CoinBetting => (4.0, 1.0),
        }
    }

    /// The slots `learn` reads its state from.
    pub fn state_slots(self) -> Range<usize> {
        match self {
            FtrlVariant::Proximal => W_XT..W_G2 + 1,
            FtrlVariant::Pistol => W_XT..W_MX + 1,
            FtrlVariant::CoinBetting => W_XT..W_MG + 1,
        }
    }

    fn name(self) -> &'static str {
        match self {
            FtrlVariant::Proximal => "ftrl",
            FtrlVariant::Pistol => "pistol",
            FtrlVariant::CoinBetting => "coin",
        }
    }
}

/// Closed form FTRL-proximal step of one feature.
fn inner_update_proximal(w: &mut [f32], x: f32, update: f32, alpha: f32, beta: f32, l1: f32, l2: f32) {
    let gradient = update * x;
    let ng2 = w[W_G2] + gradient * gradient;
    let sqrt_ng2 = ng2.sqrt();
    let sigma = (sqrt_ng2 - w[W_G2].sqrt()) / alpha;

    w[W_ZT] += gradient - sigma * w[W_XT];
    w[W_G2] = ng2;

    let sign = if w[W_ZT] < 0. { -1. } else { 1. };
    let fabs_zt = w[W_ZT] * sign;

    w[W_XT] = if fabs_zt <= l1 {
        0.
    } else {
        let step = 1. / (l2 + (beta + sqrt_ng2) / alpha);
        step * sign * (l1 - fabs_zt)
    };
}

/// Updates the magnitude bound and weight of one feature, returning its weight.
fn inner_update_pistol_state(w: &mut [f32], x: f32, alpha: f32, beta: f32) -> f32 {
    let fabs_x = x.abs();
    if fabs_x > w[W_MX] {
        w[W_MX] = fabs_x;
    }

    w[W_XT] = if w[W_MX] > 0. {
        let squared_theta = w[W_ZT] * w[W_ZT];
        let tmp = 1. / (alpha * w[W_MX] * (w[W_G2] + w[W_MX]));
        w[W_G2].sqrt() * beta * w[W_ZT] * crate::loss::corrected_exp(squared_theta / 2. * tmp) * tmp
    } else {
        0.
    };

    w[W_XT]
}

fn inner_update_pistol_post(w: &mut [f32], x: f32, update: f32) {
    let gradient = update * x;
    w[W_ZT] -= gradient;
    w[W_G2] += gradient.abs();
}

/// The bet of one feature given the largest magnitude seen for it.
fn coin_bet(w: &[f32], w_mx: f32, alpha: f32) -> f32 {
    let scale = w[W_MG] * w_mx;
    if scale > 0. {
        (alpha + w[W_WE]) / (scale * (scale + w[W_G2])) * w[W_ZT]
    } else {
        0.
    }
}

fn inner_coin_betting_update(w: &mut [f32], x: f32, update: f32, beta: f32, alpha: f32, average: f32) {
    let fabs_x = x.abs();
    let gradient = update * x;

    if fabs_x > w[W_MX] {
        w[W_MX] = fabs_x;
    }

    let fabs_update = update.abs();
    if fabs_update > w[W_MG] {
        w[W_MG] = fabs_update.max(beta);
    }

    // The bet is recomputed in case the bounds just grew.
    w[W_XT] = coin_bet(w, w[W_MX], alpha);
    w[W_ZT] -= gradient;
    w[W_G2] += gradient.abs();
    w[W_WE] -= gradient * w[W_XT];
    w[W_XT] /= average;
}

/// Follow the regularized leader learners.
#[derive(Debug, Clone)]
pub struct Ftrl {
    variant: FtrlVariant,
    alpha: f32,
    beta: f32,
    l1: f32,
    l2: f32,
    weights: DenseWeights,
    base: LearnerBase,

    total_weight: f64,
    normalized_sum_norm_x: f64,
}

impl Ftrl {
    /// Creates a new `Ftrl` learner with zeroed weights.
    ///
    /// # Arguments
    /// * `variant` - Which update rule to use, it also fixes the stride.
    /// * `alpha`, `beta` - The variant's hyperparameters.
    /// * `l1`, `l2` - Regularization, only used by `Proximal`.
    /// * `num_bits` - The weight table holds `2^num_bits` features.
    /// * `base` - Loss, interactions and early stopping.
    pub fn new(
        variant: FtrlVariant,
        (alpha, beta): (f32, f32),
        (l1, l2): (f32, f32),
        num_bits: u32,
        base: LearnerBase,
    ) -> Self {
        Self {
            variant,
            alpha,
            beta,
            l1,
            l2,
            weights: DenseWeights::new(num_bits, variant.stride_shift()),
            base,
            total_weight: 0.,
            normalized_sum_norm_x: 0.,
        }
    }

    pub fn variant(&self) -> FtrlVariant {
        self.variant
    }

    fn set_prediction(sd: &SharedData, ex: &mut Example, raw: f32, interacted: usize) {
        ex.partial_prediction = raw;
        ex.pred = finalize_prediction(sd, raw);
        ex.num_features_from_interactions = interacted;
        ex.num_features = ex.linear_len() + interacted;
    }

    fn learn_proximal(&mut self, sd: &SharedData, ex: &mut Example, label: f32) {
        self.predict(sd, ex);

        let update = self.base.loss.first_derivative(sd, ex.pred, label) * ex.weight;
        let (alpha, beta, l1, l2) = (self.alpha, self.beta, self.l1, self.l2);

        self.base.foreach_feature(ex, |x, i| {
            inner_update_proximal(self.weights.slot_mut(i), x, update, alpha, beta, l1, l2)
        });
    }

    fn learn_pistol(&mut self, sd: &SharedData, ex: &mut Example, label: f32) {
        let (alpha, beta) = (self.alpha, self.beta);

        let mut raw = ex.label.initial();
        let interacted = self.base.foreach_feature(ex, |x, i| {
            raw += inner_update_pistol_state(self.weights.slot_mut(i), x, alpha, beta) * x;
        });
        Self::set_prediction(sd, ex, raw, interacted);

        let update = self.base.loss.first_derivative(sd, ex.pred, label) * ex.weight;
        self.base.foreach_feature(ex, |x, i| {
            inner_update_pistol_post(self.weights.slot_mut(i), x, update)
        });
    }

    fn learn_coin_betting(&mut self, sd: &SharedData, ex: &mut Example, label: f32) {
        let (alpha, beta) = (self.alpha, self.beta);

        let mut raw = 0.;
        let mut normalized_squared_norm_x = 0.;
        let weights = &self.weights;
        let interacted = self.base.foreach_feature(ex, |x, i| {
            let w = weights.slot(i);
            let w_mx = w[W_MX].max(x.abs());

            raw += coin_bet(w, w_mx, alpha) * x;
            if w_mx > 0. {
                let x_normalized = x / w_mx;
                normalized_squared_norm_x += x_normalized * x_normalized;
            }
        });

        let normalized_sum_norm_x =
            self.normalized_sum_norm_x + ex.weight as f64 * normalized_squared_norm_x as f64;

        if normalized_sum_norm_x > f32::MAX as f64 {
            warn!(
                example = sd.example_number + 1;
                "normalized squared norm overflow, the example is ignored for training"
            );

            ex.weight = 0.;
            let average = self.average_squared_norm_x();
            Self::set_prediction(sd, ex, raw / average + ex.label.initial(), interacted);
            return;
        }

        self.normalized_sum_norm_x = normalized_sum_norm_x;
        self.total_weight += ex.weight as f64;

        let average = self.average_squared_norm_x();
        Self::set_prediction(sd, ex, raw / average + ex.label.initial(), interacted);

        let update = self.base.loss.first_derivative(sd, ex.pred, label) * ex.weight;
        self.base.foreach_feature(ex, |x, i| {
            inner_coin_betting_update(self.weights.slot_mut(i), x, update, beta, alpha, average)
        });
    }

    fn average_squared_norm_x(&self) -> f32 {
        if self.total_weight > 0. {
            ((self.normalized_sum_norm_x + 1e-6) / self.total_weight) as f32
        } else {
            1.
        }
    }
}

impl Learner for Ftrl {
    fn name(&self) -> &'static str {
        self.variant.name()
    }

    fn predict(&mut self, sd: &SharedData, ex: &mut Example) {
        let raw = self.base.inline_predict(&self.weights, ex);
        ex.partial_prediction = raw;
        ex.pred = finalize_prediction(sd, raw);
    }

    fn learn(&mut self, sd: &mut SharedData, ex: &mut Example) {
        self.base.prepare(sd, ex);

        match ex.label.scalar() {
            Some(label) if LearnerBase::trains_on(ex) => match self.variant {
                FtrlVariant::Proximal => self.learn_proximal(sd, ex, label),
                FtrlVariant::Pistol => self.learn_pistol(sd, ex, label),
                FtrlVariant::CoinBetting => self.learn_coin_betting(sd, ex, label),
            },
            _ => self.predict(sd, ex),
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

    fn sync_slots(&self) -> Range<usize> {
        self.variant.state_slots()
    }

    fn resume_state(&self) -> ResumeState {
        ResumeState {
            total_weight: self.total_weight,
            normalized_sum_norm_x: self.normalized_sum_norm_x,
            no_win_counter: self.base.no_win_counter,
        }
    }

    fn restore(&mut self, state: ResumeState) {
        self.total_weight = state.total_weight;
        self.normalized_sum_norm_x = state.normalized_sum_norm_x;
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

    fn ftrl(variant: FtrlVariant, l1: f32) -> Ftrl {
        let base = LearnerBase::new(Loss::Squared, InteractionsGenerator::default(), 0);
        Ftrl::new(variant, variant.defaults(), (l1, 0.), 4, base)
    }

    fn example(x: f32, label: f32) -> Example {
        let mut ex = Example::new();
        let fs = ex.get_or_create_feature_group(0, b'a');
        fs.push_back(x, 3);
        fs.end_ns_extent();
        ex.label = Label::simple(label);
        ex
    }

    #[test]
    fn strides_per_variant() {
        assert_eq!(ftrl(FtrlVariant::Proximal, 0.).weights().stride(), 4);
        assert_eq!(ftrl(FtrlVariant::Pistol, 0.).weights().stride(), 4);
        assert_eq!(ftrl(FtrlVariant::CoinBetting, 0.).weights().stride(), 8);
    }

    #[test]
    fn proximal_step_matches_closed_form() {
        let mut learner = ftrl(FtrlVariant::Proximal, 0.);
        let mut sd = SharedData::new();
        let mut ex = example(1.0, 1.0);

        learner.learn(&mut sd, &mut ex);

        // Zero prediction, squared loss gradient is -2.
        let (alpha, beta) = FtrlVariant::Proximal.defaults();
        let slots = learner.weights().slot(3);
        assert_eq!(slots[W_ZT], -2.0);
        assert_eq!(slots[W_G2], 4.0);
        assert!((slots[W_XT] - 2.0 * alpha / (beta + 2.0)).abs() < 1e-7);
        assert_eq!(sd.example_number, 1);
        assert_eq!(ex.loss, 1.0);
    }

    #[test]
    fn proximal_step_carries_the_previous_weight() {
        let (alpha, beta, l1, l2) = (0.5, 1.0, 0.1, 0.2);
        let mut w = [0.5, -1.0, 4.0, 0.0];

        // Gradient 1 takes g2 from 4 to 5, sigma = (sqrt(5) - 2) / alpha.
        inner_update_proximal(&mut w, 2.0, 0.5, alpha, beta, l1, l2);

        let sqrt5 = 5f32.sqrt();
        let zt = 2.0 - sqrt5;
        let xt = (zt.abs() - l1) / (l2 + (beta + sqrt5) / alpha);

        assert_eq!(w[W_G2], 5.0);
        assert!((w[W_ZT] - zt).abs() < 1e-6);
        assert!((w[W_XT] - xt).abs() < 1e-6);
        assert!((w[W_XT] - 0.020_393_466).abs() < 1e-6);
        assert_eq!(w[3], 0.0);
    }

    #[test]
    fn proximal_l1_threshold_applies_to_the_accumulated_gradient() {
        let mut w = [0.5, -1.0, 4.0, 0.0];
        inner_update_proximal(&mut w, 2.0, 0.5, 0.5, 1.0, 0.3, 0.2);

        assert_eq!(w[W_XT], 0.0);
        assert!(w[W_ZT] < 0.0);
    }

    #[test]
    fn every_state_slot_is_synchronized() {
        assert_eq!(ftrl(FtrlVariant::Proximal, 0.).sync_slots(), 0..3);
        assert_eq!(ftrl(FtrlVariant::Pistol, 0.).sync_slots(), 0..4);
        assert_eq!(ftrl(FtrlVariant::CoinBetting, 0.).sync_slots(), 0..6);

        for variant in [FtrlVariant::Proximal, FtrlVariant::Pistol, FtrlVariant::CoinBetting] {
            let learner = ftrl(variant, 0.);
            assert!(learner.sync_slots().end <= learner.weights().stride());
        }
    }

    #[test]
    fn proximal_l1_zeroes_small_weights() {
        let mut learner = ftrl(FtrlVariant::Proximal, 5.0);
        let mut sd = SharedData::new();

        learner.learn(&mut sd, &mut example(1.0, 1.0));
        assert_eq!(learner.weights().slot(3)[W_XT], 0.0);
        assert_eq!(learner.weights().slot(3)[W_ZT], -2.0);
    }

    #[test]
    fn pistol_fuses_state_update_and_prediction() {
        let mut learner = ftrl(FtrlVariant::Pistol, 0.);
        let mut sd = SharedData::new();

        let mut first = example(1.0, 1.0);
        learner.learn(&mut sd, &mut first);
        assert_eq!(first.partial_prediction, 0.0);

        let mut second = example(1.0, 1.0);
        learner.learn(&mut sd, &mut second);

        let expected = 2f32.sqrt() * 0.5 * 2.0 * (2.0f32 / 3.0).exp() / 3.0;
        assert!((second.partial_prediction - expected).abs() < 1e-5);
    }

    #[test]
    fn coin_betting_converges_on_a_constant_target() {
        let mut learner = ftrl(FtrlVariant::CoinBetting, 0.);
        let mut sd = SharedData::new();

        for _ in 0..10 {
            learner.learn(&mut sd, &mut example(1.0, 1.0));
        }

        let mut ex = example(1.0, 1.0);
        learner.predict(&sd, &mut ex);
        assert!((ex.pred - 1.0).abs() < 1e-3);
    }

    #[test]
    fn coin_betting_overflow_skips_the_example() {
        let mut learner = ftrl(FtrlVariant::CoinBetting, 0.);
        learner.restore(ResumeState {
            total_weight: 1.0,
            normalized_sum_norm_x: f32::MAX as f64,
            no_win_counter: 0,
        });

        let mut sd = SharedData::new();
        let mut ex = example(1.0, 1.0);
        learner.learn(&mut sd, &mut ex);

        assert_eq!(ex.weight, 0.0);
        assert!(learner.weights().as_slice().iter().all(|&w| w == 0.0));
        assert_eq!(learner.resume_state().total_weight, 1.0);
    }

    #[test]
    fn holdout_examples_are_not_learned() {
        let mut learner = ftrl(FtrlVariant::Proximal, 0.);
        let mut sd = SharedData::new();
        let mut ex = example(1.0, 1.0);
        ex.test_only = true;

        learner.learn(&mut sd, &mut ex);

        assert!(learner.weights().as_slice().iter().all(|&w| w == 0.0));
        assert_eq!(sd.holdout_pass_loss(), Some(1.0));
    }
}
