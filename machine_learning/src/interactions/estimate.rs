use super::{ExtentTerm, generate::TermFeatures};
use crate::example::{Example, NamespaceIndex};

fn choose(n: u64, k: u64) -> u64 {
    if k > n {
        return 0;
    }

    let k = k.min(n - k);
    (0..k).fold(1, |acc, i| acc * (n - i) / (i + 1))
}

/// Count and squared value sum of the features a block of `order` identical
/// terms generates in combination mode.
fn block_estimate(term: &TermFeatures, order: usize) -> (u64, f32) {
    let n = term.len() as u64;
    let k = order as u64;
    let m = term.values.iter().filter(|&&v| v != 1.).count() as u64;

    let count = if m == 0 {
        choose(n, k)
    } else {
        (0..=k)
            .map(|l| choose(l + m - 1, l) * choose(n - m, k - l))
            .sum()
    };

    // Unit features are drawn at most once (elementary symmetric polynomial),
    // the rest with repetition (complete homogeneous polynomial).
    let mut coef = vec![0f64; order + 1];
    coef[0] = 1.;
    for &v in term.values.iter() {
        let x = (v * v) as f64;
        if v == 1. {
            for l in (1..=order).rev() {
                coef[l] += coef[l - 1] * x;
            }
        } else {
            for l in 1..=order {
                coef[l] += coef[l - 1] * x;
            }
        }
    }

    (count, coef[order] as f32)
}

fn estimate_terms<T: PartialEq>(
    keys: &[T],
    terms: &[TermFeatures],
    permutations: bool,
) -> (u64, f32) {
    if permutations {
        return terms
            .iter()
            .fold((1, 1.), |(count, sum_sq), term| {
                (count * term.len() as u64, sum_sq * term.sum_sq())
            });
    }

    let mut count = 1;
    let mut sum_sq = 1.;
    let mut i = 0;

    while i < keys.len() {
        let order = keys[i..].iter().take_while(|&k| *k == keys[i]).count();
        let (c, s) = block_estimate(&terms[i], order);
        count *= c;
        sum_sq *= s;
        i += order;
    }

    (count, sum_sq)
}

/// Computes how many features `interactions` would generate on `ex` and the sum
/// of their squared values, without generating them.
///
/// # Returns
/// A `(count, sum_sq)` tuple equal to materialising the interactions.
pub fn estimate_interacted_features(
    ex: &Example,
    interactions: &[Vec<NamespaceIndex>],
    extent_interactions: &[Vec<ExtentTerm>],
    permutations: bool,
) -> (usize, f32) {
    let mut count = 0;
    let mut sum_sq = 0.;

    for interaction in interactions {
        let terms: Vec<_> = interaction
            .iter()
            .map(|&ns| TermFeatures::namespace(ex, ns))
            .collect();
        let (c, s) = estimate_terms(interaction, &terms, permutations);
        count += c;
        sum_sq += s;
    }

    for interaction in extent_interactions {
        let terms: Vec<_> = interaction
            .iter()
            .map(|&term| TermFeatures::extent(ex, term))
            .collect();
        let (c, s) = estimate_terms(interaction, &terms, permutations);
        count += c;
        sum_sq += s;
    }

    (count as usize, sum_sq)
}
