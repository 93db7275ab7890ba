//! Collective operations over a learner's weights, built on `all_reduce`.
//!
//! Every node of the group must make the same sequence of calls with weights
//! of the same geometry, otherwise the reductions desynchronize.

use comms::AllReduceSession;
use log::{debug, warn};
use machine_learning::DenseWeights;
use rayon::prelude::*;

use crate::error::{Result, WorkerErr};

/// Sums slot `offset` of every logical weight over the group.
///
/// # Args
/// * `session` - The node's all reduce session.
/// * `weights` - The local weights, overwritten with the sums.
/// * `offset` - The slot to sum, smaller than the stride.
pub async fn accumulate(
    session: &mut AllReduceSession,
    weights: &mut DenseWeights,
    offset: usize,
) -> Result<()> {
    let mut local = weights.gather(offset)?;
    session.all_reduce(&mut local).await?;
    weights.scatter(offset, &local)?;
    Ok(())
}

/// Sums `value` over the group.
pub async fn accumulate_scalar(session: &mut AllReduceSession, value: f32) -> Result<f32> {
    let mut buf = [value];
    session.all_reduce(&mut buf).await?;
    Ok(buf[0])
}

/// Averages slot `offset` of every logical weight over the group.
///
/// The amount of nodes is learned by summing `1.0` first.
pub async fn accumulate_avg(
    session: &mut AllReduceSession,
    weights: &mut DenseWeights,
    offset: usize,
) -> Result<()> {
    let nodes = accumulate_scalar(session, 1.).await?;

    let mut local = weights.gather(offset)?;
    session.all_reduce(&mut local).await?;
    local.par_iter_mut().for_each(|w| *w /= nodes);
    weights.scatter(offset, &local)?;

    debug!(nodes = nodes; "averaged slot {offset}");
    Ok(())
}

/// Averages adaptive weights over the group, weighting every node's weight by its confidence.
///
/// Slot `1` holds a feature's accumulated squared gradients. Every node rescales
/// its slots by `local / global` confidence, so the sum over the group is the
/// confidence weighted average. Features no node has confidence in are zeroed.
///
/// # Args
/// * `session` - The node's all reduce session.
/// * `weights` - The local weights, overwritten with the average.
/// * `adaptive` - Whether slot `1` holds a confidence, if it doesn't the call does nothing.
/// * `normalized_idx` - A normalizer slot rescaled along with the weight.
pub async fn accumulate_weighted_avg(
    session: &mut AllReduceSession,
    weights: &mut DenseWeights,
    adaptive: bool,
    normalized_idx: Option<usize>,
) -> Result<()> {
    if !adaptive {
        warn!("weighted averaging needs an adaptive model, weights left as they are");
        return Ok(());
    }

    let stride = weights.stride();
    if let Some(idx) = normalized_idx
        && idx >= stride
    {
        return Err(WorkerErr::LengthMismatch {
            what: "normalized slot",
            got: idx,
            expected: stride,
        });
    }

    let mut global = weights.gather(1)?;
    session.all_reduce(&mut global).await?;

    weights
        .as_mut_slice()
        .par_chunks_exact_mut(stride)
        .zip(global.par_iter())
        .for_each(|(w, &total)| {
            if total > 0. {
                let ratio = w[1] / total;
                w[0] *= ratio;
                w[1] *= ratio;
                if let Some(idx) = normalized_idx {
                    w[idx] *= ratio;
                }
            } else {
                w[0] = 0.;
            }
        });

    session.all_reduce(weights.as_mut_slice()).await?;
    Ok(())
}
