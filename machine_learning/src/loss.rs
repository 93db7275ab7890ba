use crate::{MlErr, Result, SharedData};

/// `exp` with the exponent clamped so the result stays finite in `f32`.
#[inline]
pub fn corrected_exp(exponent: f32) -> f32 {
    exponent.min(88.).exp()
}

/// Approximates `W(exp(x)) - x`, where `W` is the Lambert W function.
///
/// The absolute error is below `9e-5`.
pub fn wexpmx(x: f32) -> f32 {
    let x = x as f64;

    let w = if x >= 1. {
        0.86 * x + 0.01
    } else {
        (0.8 * x - 0.65).exp()
    };
    let r = if x >= 1. {
        x - w.ln() - w
    } else {
        0.2 * x + 0.65 - w
    };
    let t = 1. + w;
    let u = 2. * t * (t + 2. * r / 3.);

    (w * (1. + r / t * (u - r) / (u - 2. * r)) - x) as f32
}

/// The loss functions a learner can minimise.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Loss {
    /// Squared loss, clamped to the observed label range.
    Squared,
    /// Plain squared loss.
    Classic,
    Hinge,
    Logistic,
    /// Pinball loss for the `tau` quantile.
    Quantile { tau: f32 },
    Poisson,
}

impl Loss {
    /// Looks a loss up by its name, ignoring case.
    ///
    /// # Arguments
    /// * `name` - One of `squared`, `classic`, `hinge`, `logistic`, `quantile`,
    ///   `pinball`, `absolute` or `poisson`.
    /// * `parameter` - The quantile of `quantile`/`pinball`, `0.5` when omitted.
    ///
    /// # Returns
    /// The loss or an `UnknownLoss` error.
    pub fn from_name(name: &str, parameter: Option<f32>) -> Result<Self> {
        let loss = match name.to_ascii_lowercase().as_str() {
            "squared" => Loss::Squared,
            "classic" => Loss::Classic,
            "hinge" => Loss::Hinge,
            "logistic" => Loss::Logistic,
            "quantile" | "pinball" => Loss::Quantile {
                tau: parameter.unwrap_or(0.5),
            },
            "absolute" => Loss::Quantile { tau: 0.5 },
            "poisson" => Loss::Poisson,
            _ => return Err(MlErr::UnknownLoss(name.to_string())),
        };

        Ok(loss)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Loss::Squared => "squared",
            Loss::Classic => "classic",
            Loss::Hinge => "hinge",
            Loss::Logistic => "logistic",
            Loss::Quantile { .. } => "quantile",
            Loss::Poisson => "poisson",
        }
    }

    /// Sets the prediction clamp range some losses need.
    pub fn configure_label_range(&self, sd: &mut SharedData) {
        if matches!(self, Loss::Logistic | Loss::Poisson) {
            sd.min_label = -50.;
            sd.max_label = 50.;
        }
    }

    pub fn get_loss(&self, sd: &SharedData, prediction: f32, label: f32) -> f32 {
        match *self {
            Loss::Squared => {
                let (min, max) = (sd.min_label, sd.max_label);
                if prediction <= max && prediction >= min {
                    (prediction - label) * (prediction - label)
                } else if prediction < min {
                    if label == min {
                        0.
                    } else {
                        (label - min) * (label - min) + 2. * (label - min) * (min - prediction)
                    }
                } else if label == max {
                    0.
                } else {
                    (max - label) * (max - label) + 2. * (max - label) * (prediction - max)
                }
            }
            Loss::Classic => (prediction - label) * (prediction - label),
            Loss::Hinge => (1. - label * prediction).max(0.),
            Loss::Logistic => {
                let z = -label * prediction;
                if z > 0. {
                    z + (-z).exp().ln_1p()
                } else {
                    z.exp().ln_1p()
                }
            }
            Loss::Quantile { tau } => {
                let e = label - prediction;
                if e > 0. { tau * e } else { -(1. - tau) * e }
            }
            Loss::Poisson => {
                let exp_prediction = prediction.exp();
                2. * (label * ((label + 1e-6).ln() - prediction) - (label - exp_prediction))
            }
        }
    }

    /// The importance aware update, the step in the direction of `label`.
    ///
    /// # Arguments
    /// * `update_scale` - Learning rate times importance weight.
    /// * `pred_per_update` - How much the prediction moves per unit of update.
    pub fn get_update(
        &self,
        prediction: f32,
        label: f32,
        update_scale: f32,
        pred_per_update: f32,
    ) -> f32 {
        match *self {
            Loss::Squared => {
                if update_scale * pred_per_update < 1e-6 {
                    // First order expansion of 1 - exp(-x) around 0.
                    return 2. * (label - prediction) * update_scale;
                }

                (label - prediction) * (1. - corrected_exp(-2. * update_scale * pred_per_update))
                    / pred_per_update
            }
            Loss::Classic => 2. * (label - prediction) * update_scale,
            Loss::Hinge => {
                if label * prediction >= 1. {
                    return 0.;
                }

                let err = 1. - label * prediction;
                label
                    * if update_scale * pred_per_update < err {
                        update_scale
                    } else {
                        err / pred_per_update
                    }
            }
            Loss::Logistic => {
                let d = corrected_exp(label * prediction);
                if update_scale * pred_per_update < 1e-6 {
                    return label * update_scale / (1. + d);
                }

                let x = update_scale * pred_per_update + label * prediction + d;
                let w = wexpmx(x);
                -(label * w + prediction) / pred_per_update
            }
            Loss::Quantile { tau } => {
                let err = label - prediction;
                if err == 0. {
                    return 0.;
                }

                let normal = update_scale * pred_per_update;
                if err > 0. {
                    if tau * normal < err {
                        tau * update_scale
                    } else {
                        err / pred_per_update
                    }
                } else if -(1. - tau) * normal > err {
                    (tau - 1.) * update_scale
                } else {
                    err / pred_per_update
                }
            }
            Loss::Poisson => {
                let exp_prediction = prediction.exp();
                if label > 0. {
                    label * update_scale
                        - (exp_prediction * (label * update_scale * pred_per_update).exp_m1()
                            / label)
                            .ln_1p()
                            / pred_per_update
                } else {
                    -(exp_prediction * update_scale * pred_per_update).ln_1p() / pred_per_update
                }
            }
        }
    }

    /// The plain gradient step, without importance invariance.
    pub fn get_unsafe_update(&self, prediction: f32, label: f32, update_scale: f32) -> f32 {
        match *self {
            Loss::Squared | Loss::Classic => 2. * (label - prediction) * update_scale,
            Loss::Hinge => {
                if label * prediction >= 1. {
                    0.
                } else {
                    label * update_scale
                }
            }
            Loss::Logistic => label * update_scale / (1. + corrected_exp(label * prediction)),
            Loss::Quantile { tau } => {
                let err = label - prediction;
                if err == 0. {
                    0.
                } else if err > 0. {
                    tau * update_scale
                } else {
                    -(1. - tau) * update_scale
                }
            }
            Loss::Poisson => (label - prediction.exp()) * update_scale,
        }
    }

    /// The squared gradient, used by adaptive learning rates.
    pub fn get_square_grad(&self, prediction: f32, label: f32) -> f32 {
        match *self {
            Loss::Squared | Loss::Classic => 4. * (prediction - label) * (prediction - label),
            Loss::Poisson => {
                let d = prediction.exp() - label;
                d * d
            }
            _ => {
                let d = self.first_derivative(&SharedData::default(), prediction, label);
                d * d
            }
        }
    }

    pub fn first_derivative(&self, sd: &SharedData, prediction: f32, label: f32) -> f32 {
        match *self {
            Loss::Squared => {
                let prediction = prediction.clamp(sd.min_label, sd.max_label.max(sd.min_label));
                2. * (prediction - label)
            }
            Loss::Classic => 2. * (prediction - label),
            Loss::Hinge => {
                if label * prediction >= 1. {
                    0.
                } else {
                    -label
                }
            }
            Loss::Logistic => -label / (1. + corrected_exp(label * prediction)),
            Loss::Quantile { tau } => {
                let e = label - prediction;
                if e == 0. {
                    0.
                } else if e > 0. {
                    -tau
                } else {
                    1. - tau
                }
            }
            Loss::Poisson => prediction.exp() - label,
        }
    }

    pub fn second_derivative(&self, sd: &SharedData, prediction: f32, _label: f32) -> f32 {
        match *self {
            Loss::Squared => {
                if prediction <= sd.max_label && prediction >= sd.min_label {
                    2.
                } else {
                    0.
                }
            }
            Loss::Classic => 2.,
            Loss::Hinge | Loss::Quantile { .. } => 0.,
            Loss::Logistic => {
                let p = 1. / (1. + corrected_exp(prediction));
                p * (1. - p)
            }
            Loss::Poisson => prediction.exp(),
        }
    }

    /// The importance weight that would move `prediction` to the other side of the label range.
    ///
    /// # Returns
    /// An `Unsupported` error for the poisson loss.
    pub fn get_reverting_weight(&self, sd: &SharedData, prediction: f32, eta_t: f32) -> Result<f32> {
        let t = 0.5 * (sd.min_label + sd.max_label);
        let alternative = if prediction > t {
            sd.min_label
        } else {
            sd.max_label
        };

        let weight = match *self {
            Loss::Squared => ((alternative - prediction) / (alternative - t)).ln() / eta_t,
            Loss::Classic => (t - prediction) / ((alternative - prediction) * eta_t),
            Loss::Hinge => prediction.abs() / eta_t,
            Loss::Logistic => {
                let z = -prediction.abs();
                (1. - z - corrected_exp(z)) / eta_t
            }
            Loss::Quantile { tau } => {
                let v = if prediction > t { -(1. - tau) } else { tau };
                (t - prediction) / (eta_t * v)
            }
            Loss::Poisson => {
                return Err(MlErr::Unsupported(
                    "reverting weight is not defined for the poisson loss",
                ));
            }
        };

        Ok(weight)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sd(min: f32, max: f32) -> SharedData {
        SharedData {
            min_label: min,
            max_label: max,
            ..SharedData::default()
        }
    }

    /// Solves `w + ln(w) = x` for `w = W(exp(x))` with newton steps.
    fn exact_wexpmx(x: f64) -> f64 {
        let mut w = if x > 1. { x } else { x.exp() };
        for _ in 0..100 {
            w -= (w + w.ln() - x) / (1. + 1. / w);
        }
        w - x
    }

    #[test]
    fn factory_is_case_insensitive() {
        assert_eq!(Loss::from_name("SQUARED", None).unwrap(), Loss::Squared);
        assert_eq!(
            Loss::from_name("pinball", Some(0.9)).unwrap(),
            Loss::Quantile { tau: 0.9 }
        );
        assert_eq!(
            Loss::from_name("quantile", None).unwrap(),
            Loss::Quantile { tau: 0.5 }
        );
        assert_eq!(
            Loss::from_name("Absolute", Some(0.1)).unwrap(),
            Loss::Quantile { tau: 0.5 }
        );
        assert!(matches!(
            Loss::from_name("cubic", None),
            Err(MlErr::UnknownLoss(name)) if name == "cubic"
        ));
    }

    #[test]
    fn wexpmx_branch_points() {
        for x in [-2.0f32, -0.5, 0.999, 1.0, 1.001, 5.0] {
            let approx = wexpmx(x) as f64;
            let exact = exact_wexpmx(x as f64);
            assert!(
                (approx - exact).abs() < 1e-4,
                "wexpmx({x}) = {approx}, expected {exact}"
            );
        }
    }

    #[test]
    fn logistic_is_stable_over_large_margins() {
        let loss = Loss::Logistic;
        let mut sd = SharedData::default();
        loss.configure_label_range(&mut sd);

        for margin in (-1000..=1000).step_by(25) {
            let p = margin as f32;
            for label in [-1.0, 1.0] {
                assert!(loss.get_loss(&sd, p, label).is_finite());
                assert!(loss.first_derivative(&sd, p, label).is_finite());
                assert!(loss.second_derivative(&sd, p, label).is_finite());
                assert!(loss.get_update(p, label, 0.5, 1.0).is_finite());
                assert!(loss.get_unsafe_update(p, label, 0.5).is_finite());
            }
        }

        // Large margins in the wrong direction grow linearly.
        assert!((loss.get_loss(&sd, -1000.0, 1.0) - 1000.0).abs() < 1e-3);
        assert!(loss.get_loss(&sd, 1000.0, 1.0) < 1e-6);
    }

    #[test]
    fn squared_loss_is_clamped_to_label_range() {
        let sd = sd(0.0, 1.0);
        let loss = Loss::Squared;

        assert_eq!(loss.get_loss(&sd, 0.5, 1.0), 0.25);
        assert_eq!(loss.get_loss(&sd, 2.0, 1.0), 0.0);
        assert_eq!(loss.get_loss(&sd, -1.0, 1.0), 1.0 + 2.0);
        assert_eq!(loss.first_derivative(&sd, 3.0, 0.0), 2.0);
        assert_eq!(loss.second_derivative(&sd, 3.0, 0.0), 0.0);
    }

    #[test]
    fn squared_update_approaches_its_expansion() {
        let loss = Loss::Squared;
        let tiny = loss.get_update(0.0, 1.0, 1e-7, 1.0);
        assert_eq!(tiny, 2e-7);

        let safe = loss.get_update(0.0, 1.0, 0.1, 1.0);
        let unsafe_ = loss.get_unsafe_update(0.0, 1.0, 0.1);
        assert!(safe < unsafe_);
        assert!((safe - (1.0 - (-0.2f32).exp())).abs() < 1e-6);
    }

    #[test]
    fn hinge_and_quantile_updates() {
        assert_eq!(Loss::Hinge.get_loss(&sd(-1., 1.), 2.0, 1.0), 0.0);
        assert_eq!(Loss::Hinge.get_update(0.5, 1.0, 10.0, 1.0), 0.5);
        assert_eq!(Loss::Hinge.get_update(0.5, 1.0, 0.1, 1.0), 0.1);

        let q = Loss::Quantile { tau: 0.25 };
        assert_eq!(q.get_loss(&sd(0., 1.), 0.0, 4.0), 1.0);
        assert_eq!(q.get_loss(&sd(0., 1.), 4.0, 0.0), 3.0);
        assert_eq!(q.first_derivative(&sd(0., 1.), 0.0, 1.0), -0.25);
    }

    #[test]
    fn poisson_has_no_reverting_weight() {
        let sd = sd(-50., 50.);
        assert!(Loss::Poisson.get_reverting_weight(&sd, 0.0, 0.1).is_err());
        assert!(Loss::Hinge.get_reverting_weight(&sd, 2.0, 0.5).is_ok());
        assert_eq!(Loss::Poisson.first_derivative(&sd, 0.0, 3.0), -2.0);
    }
}
