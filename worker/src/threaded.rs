use std::{io, thread};

use log::debug;
use machine_learning::{Example, Learner, SharedData, persistence::ResumeState};
use rayon::prelude::*;

use crate::{
    error::{Result, WorkerErr},
    ring::ExampleRing,
    worker::ExampleFeed,
};

/// Trains one pass over `feed` with `threads` learner copies fed through an example ring.
///
/// Every copy sees every example but only learns from the ones whose sequence
/// number falls in its share. At the end of the pass the copies are averaged
/// back into `learner` and their statistics merged into `sd`.
///
/// # Args
/// * `learner` - The model to train.
/// * `sd` - The model's statistics.
/// * `feed` - The pass' examples.
/// * `threads` - The amount of consumer threads.
/// * `ring_size` - The amount of examples in flight.
pub fn train_threaded(
    learner: &mut dyn Learner,
    sd: &mut SharedData,
    feed: &ExampleFeed<'_>,
    threads: usize,
    ring_size: usize,
) -> Result<()> {
    let threads = threads.max(1);
    let ring = ExampleRing::new(ring_size, threads);

    let trained = thread::scope(|s| {
        let handles: Vec<_> = (0..threads)
            .map(|id| {
                let mut local = learner.boxed_clone();
                let mut local_sd = sd.clone();
                let ring = &ring;

                s.spawn(move || {
                    let mut cursor = 0;
                    let mut scratch = Example::new();

                    while let Some(lease) = ring.next(&mut cursor) {
                        if lease.seq() % threads as u64 != id as u64 {
                            continue;
                        }

                        scratch.clone_from(&*lease);
                        drop(lease);
                        local.learn(&mut local_sd, &mut scratch);
                    }

                    (local, local_sd)
                })
            })
            .collect();

        for i in 0..feed.len() {
            let mut ex = ring.acquire();
            feed.fill(&mut ex, i);
            ring.push(ex);
        }
        ring.close();

        handles
            .into_iter()
            .map(|handle| handle.join())
            .collect::<std::result::Result<Vec<_>, _>>()
    })
    .map_err(|_| WorkerErr::Io(io::Error::other("a training thread panicked")))?;

    let start = sd.clone();
    for (_, part) in &trained {
        merge_stats(sd, &start, part);
    }

    let copies: Vec<_> = trained.into_iter().map(|(copy, _)| copy).collect();
    average_into(learner, &copies)?;

    debug!(threads = threads, examples = feed.len(); "threaded pass finished");
    Ok(())
}

/// Adds what `part` accounted since `start` into `total`.
fn merge_stats(total: &mut SharedData, start: &SharedData, part: &SharedData) {
    total.min_label = total.min_label.min(part.min_label);
    total.max_label = total.max_label.max(part.max_label);

    total.t += part.t - start.t;
    total.example_number += part.example_number - start.example_number;
    total.total_features += part.total_features - start.total_features;
    total.sum_loss += part.sum_loss - start.sum_loss;
    total.weighted_labeled_examples +=
        part.weighted_labeled_examples - start.weighted_labeled_examples;
    total.weighted_unlabeled_examples +=
        part.weighted_unlabeled_examples - start.weighted_unlabeled_examples;

    total.holdout_sum_loss += part.holdout_sum_loss - start.holdout_sum_loss;
    total.weighted_holdout_examples +=
        part.weighted_holdout_examples - start.weighted_holdout_examples;
    total.holdout_sum_loss_since_last_pass +=
        part.holdout_sum_loss_since_last_pass - start.holdout_sum_loss_since_last_pass;
    total.weighted_holdout_examples_since_last_pass += part
        .weighted_holdout_examples_since_last_pass
        - start.weighted_holdout_examples_since_last_pass;
}

/// Replaces every slot of `learner` with its mean over `copies`.
///
/// The additive running state is summed the same way the statistics are.
pub fn average_into(learner: &mut dyn Learner, copies: &[Box<dyn Learner>]) -> Result<()> {
    if copies.is_empty() {
        return Ok(());
    }

    let expected = learner.weights().len() * learner.weights().stride();
    let slices: Vec<&[f32]> = copies.iter().map(|c| c.weights().as_slice()).collect();

    if let Some(bad) = slices.iter().find(|s| s.len() != expected) {
        return Err(WorkerErr::LengthMismatch {
            what: "learner copy",
            got: bad.len(),
            expected,
        });
    }

    let n = slices.len() as f32;
    learner
        .weights_mut()
        .as_mut_slice()
        .par_iter_mut()
        .enumerate()
        .for_each(|(i, w)| *w = slices.iter().map(|s| s[i]).sum::<f32>() / n);

    let start = learner.resume_state();
    let mut state = start;
    for copy in copies {
        let part = copy.resume_state();
        state.total_weight += part.total_weight - start.total_weight;
        state.normalized_sum_norm_x += part.normalized_sum_norm_x - start.normalized_sum_norm_x;
    }
    learner.restore(ResumeState {
        no_win_counter: start.no_win_counter,
        ..state
    });

    Ok(())
}
