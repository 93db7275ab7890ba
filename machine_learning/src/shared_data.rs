/// How the holdout loss of the last pass compared to the best one so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HoldoutOutcome {
    #[default]
    NoData,
    Improved,
    NoWin,
}

/// Running statistics of a learner: label range, loss and holdout accounting.
#[derive(Debug, Clone, PartialEq)]
pub struct SharedData {
    pub min_label: f32,
    pub max_label: f32,

    /// Importance weighted amount of examples seen, holdout included.
    pub t: f64,
    pub example_number: u64,
    pub total_features: u64,
    pub sum_loss: f64,
    pub weighted_labeled_examples: f64,
    pub weighted_unlabeled_examples: f64,

    pub holdout_sum_loss: f64,
    pub weighted_holdout_examples: f64,
    pub holdout_sum_loss_since_last_pass: f64,
    pub weighted_holdout_examples_since_last_pass: f64,
    pub holdout_best_loss: f64,
    pub holdout_best_pass: u64,
    pub last_holdout: HoldoutOutcome,

    pub current_pass: u64,
}

impl Default for SharedData {
    fn default() -> Self {
        Self {
            min_label: 0.,
            max_label: 0.,
            t: 0.,
            example_number: 0,
            total_features: 0,
            sum_loss: 0.,
            weighted_labeled_examples: 0.,
            weighted_unlabeled_examples: 0.,
            holdout_sum_loss: 0.,
            weighted_holdout_examples: 0.,
            holdout_sum_loss_since_last_pass: 0.,
            weighted_holdout_examples_since_last_pass: 0.,
            holdout_best_loss: f64::MAX,
            holdout_best_pass: 0,
            last_holdout: HoldoutOutcome::NoData,
            current_pass: 0,
        }
    }
}

impl SharedData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Widens the prediction clamp range to contain `label`.
    pub fn observe_label(&mut self, label: f32) {
        self.min_label = self.min_label.min(label);
        self.max_label = self.max_label.max(label);
    }

    /// Accounts one finished example.
    ///
    /// # Arguments
    /// * `test_only` - Whether the example belongs to the holdout set.
    /// * `labeled` - Whether the example carried a label.
    /// * `loss` - The importance weighted loss of the example.
    /// * `weight` - The importance weight of the example.
    /// * `num_features` - Linear plus interacted features of the example.
    pub fn update(&mut self, test_only: bool, labeled: bool, loss: f32, weight: f32, num_features: usize) {
        self.t += weight as f64;

        if test_only && labeled {
            self.weighted_holdout_examples += weight as f64;
            self.holdout_sum_loss += loss as f64;
            self.holdout_sum_loss_since_last_pass += loss as f64;
            self.weighted_holdout_examples_since_last_pass += weight as f64;
            return;
        }

        if labeled {
            self.weighted_labeled_examples += weight as f64;
        } else {
            self.weighted_unlabeled_examples += weight as f64;
        }

        self.sum_loss += loss as f64;
        self.total_features += num_features as u64;
        self.example_number += 1;
    }

    /// The average training loss so far.
    pub fn average_loss(&self) -> f64 {
        if self.weighted_labeled_examples > 0. {
            self.sum_loss / self.weighted_labeled_examples
        } else {
            0.
        }
    }

    /// The average holdout loss of the pass in progress, `None` if no holdout example was seen.
    pub fn holdout_pass_loss(&self) -> Option<f32> {
        (self.weighted_holdout_examples_since_last_pass > 0.).then(|| {
            (self.holdout_sum_loss_since_last_pass / self.weighted_holdout_examples_since_last_pass)
                as f32
        })
    }

    /// Closes the holdout accounting of the current pass.
    ///
    /// # Arguments
    /// * `this_loss` - The pass' holdout loss, usually `holdout_pass_loss`
    ///   averaged over every node of the cluster.
    ///
    /// # Returns
    /// How the pass compared with the best one so far, also kept in `last_holdout`.
    pub fn summarize_holdout(&mut self, this_loss: Option<f32>) -> HoldoutOutcome {
        self.holdout_sum_loss_since_last_pass = 0.;
        self.weighted_holdout_examples_since_last_pass = 0.;

        self.last_holdout = match this_loss {
            Some(loss) if (loss as f64) < self.holdout_best_loss => {
                self.holdout_best_loss = loss as f64;
                self.holdout_best_pass = self.current_pass;
                HoldoutOutcome::Improved
            }
            Some(_) => HoldoutOutcome::NoWin,
            None => HoldoutOutcome::NoData,
        };

        self.current_pass += 1;
        self.last_holdout
    }
}
