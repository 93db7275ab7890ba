mod common;

use comms::specs::{
    ExampleSpec, LearnerSpec, NamespaceSpec, OptimizerSpec, SyncSpec, WorkerSpec,
};
use futures::future::try_join_all;
use rand::{Rng, SeedableRng, rngs::StdRng};
use machine_learning::Example;
use worker::{Worker, build_learner, builder::fill_example};

/// `y = 2 * x1 - x2` over two namespaces, with a bias.
fn dataset(seed: u64, n: usize) -> Vec<ExampleSpec> {
    let mut rng = StdRng::seed_from_u64(seed);

    (0..n)
        .map(|_| {
            let x1: f32 = rng.random_range(-1.0..1.0);
            let x2: f32 = rng.random_range(-1.0..1.0);

            ExampleSpec {
                label: Some(2. * x1 - x2),
                initial: 0.,
                weight: 1.,
                test_only: false,
                namespaces: vec![
                    NamespaceSpec {
                        index: b'a',
                        name: Some("alpha".into()),
                        features: vec![(11, x1)],
                    },
                    NamespaceSpec {
                        index: b'b',
                        name: Some("beta".into()),
                        features: vec![(23, x2)],
                    },
                ],
            }
        })
        .collect()
}

fn spec(optimizer: OptimizerSpec, sync: SyncSpec, passes: usize) -> WorkerSpec {
    WorkerSpec {
        learner: LearnerSpec {
            num_bits: 8,
            optimizer,
            add_constant: true,
            ..LearnerSpec::default()
        },
        sync,
        passes,
        ..WorkerSpec::default()
    }
}

const GD: OptimizerSpec = OptimizerSpec::GradientDescent {
    learning_rate: 0.5,
    adaptive: false,
};

#[tokio::test]
async fn lone_worker_learns() {
    let spec = spec(GD, SyncSpec::Average, 3);
    let learner = build_learner(&spec.learner).unwrap();
    let mut worker = Worker::new(spec, learner);

    let reports = worker.run(&dataset(1, 500)).await.unwrap();

    assert_eq!(reports.len(), 3);
    assert!(reports.iter().all(|r| r.holdout_loss.is_some()));
    assert!(reports[2].holdout_loss < reports[0].holdout_loss);

    let w = worker.learner().weights();
    assert!((w.slot(11)[0] - 2.).abs() < 0.2);
    assert!((w.slot(23)[0] + 1.).abs() < 0.2);
}

#[tokio::test]
async fn threaded_worker_learns() {
    let spec = WorkerSpec {
        threads: 3,
        ring_size: 16,
        ..spec(GD, SyncSpec::Average, 4)
    };
    let learner = build_learner(&spec.learner).unwrap();
    let mut worker = Worker::new(spec, learner);

    worker.run(&dataset(2, 900)).await.unwrap();

    let w = worker.learner().weights();
    assert!((w.slot(11)[0] - 2.).abs() < 0.3);
    assert_eq!(worker.shared_data().current_pass, 4);
}

#[tokio::test(flavor = "multi_thread")]
async fn synchronized_workers_agree() {
    const NODES: u64 = 3;
    let master = common::master(1).await;

    let mut workers: Vec<Worker> = (0..NODES)
        .map(|node| {
            let spec = WorkerSpec {
                node: Some(common::node_spec(&master, 77, NODES, node)),
                ..spec(GD, SyncSpec::Average, 2)
            };
            let learner = build_learner(&spec.learner).unwrap();
            Worker::new(spec, learner)
        })
        .collect();

    let shards: Vec<_> = (0..NODES).map(|node| dataset(10 + node, 300)).collect();

    let reports = try_join_all(
        workers
            .iter_mut()
            .zip(&shards)
            .map(|(worker, shard)| worker.run(shard)),
    )
    .await
    .unwrap();

    let first = workers[0].learner().weights();
    for worker in &workers[1..] {
        assert_eq!(worker.learner().weights(), first);
    }

    // Every node closes the pass with the group's holdout loss.
    for pass in 0..2 {
        let loss = reports[0][pass].holdout_loss;
        assert!(loss.is_some());
        assert!(reports.iter().all(|r| r[pass].holdout_loss == loss));
    }
}

/// Trains a group on opposite targets, then checks the merged models keep
/// agreeing after learning the same example.
async fn assert_merged_models_stay_together(optimizer: OptimizerSpec, unique_id: u64) {
    const NODES: u64 = 2;
    let master = common::master(1).await;

    let mut workers: Vec<Worker> = (0..NODES)
        .map(|node| {
            let spec = WorkerSpec {
                node: Some(common::node_spec(&master, unique_id, NODES, node)),
                ..spec(optimizer, SyncSpec::Average, 1)
            };
            let learner = build_learner(&spec.learner).unwrap();
            Worker::new(spec, learner)
        })
        .collect();

    let shards: Vec<Vec<ExampleSpec>> = (0..NODES)
        .map(|node| {
            let sign = if node == 0 { 1. } else { -1. };
            dataset(30 + node, 100)
                .into_iter()
                .map(|ex| ExampleSpec {
                    label: ex.label.map(|y| sign * y),
                    ..ex
                })
                .collect()
        })
        .collect();

    try_join_all(
        workers
            .iter_mut()
            .zip(&shards)
            .map(|(worker, shard)| worker.run(shard)),
    )
    .await
    .unwrap();

    let first = workers[0].learner().weights().clone();
    assert_eq!(workers[1].learner().weights(), &first);
    assert!(first.as_slice().iter().any(|&w| w != 0.));

    let sd = workers[0].shared_data().clone();
    let mut learners: Vec<_> = workers.into_iter().map(Worker::into_learner).collect();

    let shared = &dataset(99, 1)[0];
    for learner in &mut learners {
        let mut ex = Example::new();
        fill_example(&mut ex, shared, true);
        learner.learn(&mut sd.clone(), &mut ex);
    }

    assert_eq!(learners[0].weights(), learners[1].weights());
    assert_eq!(
        learners[0].resume_state().total_weight,
        learners[1].resume_state().total_weight
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn ftrl_models_are_merged_on_their_whole_state() {
    assert_merged_models_stay_together(
        OptimizerSpec::Ftrl {
            alpha: None,
            beta: None,
        },
        80,
    )
    .await;
}

#[tokio::test(flavor = "multi_thread")]
async fn pistol_models_are_merged_on_their_whole_state() {
    assert_merged_models_stay_together(
        OptimizerSpec::Pistol {
            alpha: None,
            beta: None,
        },
        81,
    )
    .await;
}

#[tokio::test(flavor = "multi_thread")]
async fn coin_models_are_merged_on_their_whole_state() {
    assert_merged_models_stay_together(
        OptimizerSpec::Coin {
            alpha: None,
            beta: None,
        },
        82,
    )
    .await;
}

#[tokio::test(flavor = "multi_thread")]
async fn weighted_average_over_adaptive_learners() {
    const NODES: u64 = 2;
    let master = common::master(1).await;
    let adaptive = OptimizerSpec::GradientDescent {
        learning_rate: 0.5,
        adaptive: true,
    };

    let mut workers: Vec<Worker> = (0..NODES)
        .map(|node| {
            let spec = WorkerSpec {
                node: Some(common::node_spec(&master, 78, NODES, node)),
                ..spec(adaptive, SyncSpec::WeightedAverage, 1)
            };
            let learner = build_learner(&spec.learner).unwrap();
            Worker::new(spec, learner)
        })
        .collect();

    let shards: Vec<_> = (0..NODES).map(|node| dataset(20 + node, 200)).collect();

    try_join_all(
        workers
            .iter_mut()
            .zip(&shards)
            .map(|(worker, shard)| worker.run(shard)),
    )
    .await
    .unwrap();

    let (a, b) = (workers[0].learner().weights(), workers[1].learner().weights());
    assert_eq!(a, b);
    assert!(a.slot(11)[0] > 0.5);
    assert!(a.slot(23)[0] < -0.2);
}
