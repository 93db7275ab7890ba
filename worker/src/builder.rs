use comms::specs::{ExampleSpec, LearnerSpec, OptimizerSpec};
use log::debug;
use machine_learning::{
    Example, Ftrl, FtrlVariant, GradientDescent, InteractionsGenerator, Label, Learner,
    LearnerBase, Loss, hash::hash_namespace,
};

use crate::error::Result;

/// Builds a `Learner` out of a `LearnerSpec`.
///
/// # Args
/// * `spec` - The learner's configuration.
///
/// # Returns
/// The boxed learner, or an error if the loss or an interaction is malformed.
pub fn build_learner(spec: &LearnerSpec) -> Result<Box<dyn Learner>> {
    let loss = Loss::from_name(&spec.loss, spec.loss_parameter)?;
    let interactions = InteractionsGenerator::parse(
        &spec.interactions,
        &spec.full_name_interactions,
        spec.leave_duplicate_interactions,
        spec.permutations,
    )?;
    let base = LearnerBase::new(loss, interactions, spec.early_terminate);

    let ftrl = |variant: FtrlVariant, alpha: Option<f32>, beta: Option<f32>| {
        let (default_alpha, default_beta) = variant.defaults();
        let hyper = (alpha.unwrap_or(default_alpha), beta.unwrap_or(default_beta));
        Ftrl::new(variant, hyper, (spec.l1, spec.l2), spec.num_bits, base.clone())
    };

    let learner: Box<dyn Learner> = match spec.optimizer {
        OptimizerSpec::Ftrl { alpha, beta } => Box::new(ftrl(FtrlVariant::Proximal, alpha, beta)),
        OptimizerSpec::Pistol { alpha, beta } => Box::new(ftrl(FtrlVariant::Pistol, alpha, beta)),
        OptimizerSpec::Coin { alpha, beta } => {
            Box::new(ftrl(FtrlVariant::CoinBetting, alpha, beta))
        }
        OptimizerSpec::GradientDescent {
            learning_rate,
            adaptive,
        } => Box::new(GradientDescent::new(
            learning_rate,
            adaptive,
            spec.num_bits,
            base.clone(),
        )),
    };

    debug!(num_bits = spec.num_bits; "built {} learner", learner.name());
    Ok(learner)
}

/// Fills `ex` with the already hashed record `spec`.
pub fn fill_example(ex: &mut Example, spec: &ExampleSpec, add_constant: bool) {
    ex.label = Label::Simple {
        label: spec.label,
        initial: spec.initial,
    };
    ex.weight = spec.weight;
    ex.test_only = spec.test_only;

    for ns in &spec.namespaces {
        let ns_hash = ns.name.as_deref().map_or(ns.index as u64, hash_namespace);
        let fs = ex.get_or_create_feature_group(ns_hash, ns.index);
        for &(index, value) in &ns.features {
            fs.push_back(value, index);
        }
        fs.end_ns_extent();
    }

    if add_constant {
        ex.add_constant();
    }
}

#[cfg(test)]
mod tests {
    use comms::specs::NamespaceSpec;

    use super::*;

    #[test]
    fn optimizers_pick_their_learner() {
        let mut spec = LearnerSpec {
            num_bits: 4,
            ..LearnerSpec::default()
        };
        assert_eq!(build_learner(&spec).unwrap().name(), "ftrl");

        spec.optimizer = OptimizerSpec::Coin {
            alpha: None,
            beta: None,
        };
        assert_eq!(build_learner(&spec).unwrap().weights().stride(), 8);

        spec.optimizer = OptimizerSpec::GradientDescent {
            learning_rate: 0.5,
            adaptive: true,
        };
        let learner = build_learner(&spec).unwrap();
        assert!(learner.is_adaptive());
        assert_eq!(learner.weights().stride(), 2);
    }

    #[test]
    fn bad_loss_and_interactions_are_rejected() {
        let spec = LearnerSpec {
            loss: "nope".into(),
            ..LearnerSpec::default()
        };
        assert!(build_learner(&spec).is_err());

        let spec = LearnerSpec {
            full_name_interactions: vec!["a||b".into()],
            ..LearnerSpec::default()
        };
        assert!(build_learner(&spec).is_err());
    }

    #[test]
    fn records_fill_examples() {
        let spec = ExampleSpec {
            label: Some(2.0),
            initial: 0.5,
            weight: 3.0,
            test_only: true,
            namespaces: vec![NamespaceSpec {
                index: b'a',
                name: Some("age".into()),
                features: vec![(7, 1.5), (9, -1.0)],
            }],
        };

        let mut ex = Example::new();
        fill_example(&mut ex, &spec, true);

        assert_eq!(ex.label.scalar(), Some(2.0));
        assert_eq!(ex.label.initial(), 0.5);
        assert_eq!(ex.weight, 3.0);
        assert!(ex.test_only);
        assert_eq!(ex.linear_len(), 3);
        assert_eq!(ex.feature_space[b'a' as usize].indices(), &[7, 9]);
    }
}
