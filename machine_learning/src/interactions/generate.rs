use std::borrow::Cow;

use super::ExtentTerm;
use crate::{
    example::{Example, NamespaceIndex},
    hash::FNV_PRIME,
};

/// The features one interaction term draws from.
///
/// Namespace terms borrow the whole bucket, extent terms gather the ranges of their hash.
#[derive(Debug, Clone)]
pub(crate) struct TermFeatures<'a> {
    pub values: Cow<'a, [f32]>,
    pub indices: Cow<'a, [u64]>,
}

impl<'a> TermFeatures<'a> {
    pub fn namespace(ex: &'a Example, ns: NamespaceIndex) -> Self {
        let fs = &ex.feature_space[ns as usize];
        Self {
            values: Cow::Borrowed(fs.values()),
            indices: Cow::Borrowed(fs.indices()),
        }
    }

    pub fn extent(ex: &'a Example, (ns, hash): ExtentTerm) -> Self {
        let fs = &ex.feature_space[ns as usize];
        let mut ranges = fs.extent_ranges(hash).peekable();

        // A single occurrence is contiguous and can be borrowed.
        if let Some(first) = ranges.next()
            && ranges.peek().is_none()
        {
            return Self {
                values: Cow::Borrowed(&fs.values()[first.clone()]),
                indices: Cow::Borrowed(&fs.indices()[first]),
            };
        }

        let mut values = Vec::new();
        let mut indices = Vec::new();
        for range in fs.extent_ranges(hash) {
            values.extend_from_slice(&fs.values()[range.clone()]);
            indices.extend_from_slice(&fs.indices()[range]);
        }

        Self {
            values: Cow::Owned(values),
            indices: Cow::Owned(indices),
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn sum_sq(&self) -> f32 {
        self.values.iter().map(|v| v * v).sum()
    }
}

/// Walks the cross product of `terms`, calling `f(value, index)` for every generated feature.
///
/// `same_as_prev[l]` tells whether term `l` is the same as term `l - 1`. In
/// combination mode such a term starts at the position chosen one level up,
/// skipping that position when its value is `1.0`.
///
/// # Returns
/// The amount of generated features.
pub(crate) fn cross_product<F: FnMut(f32, u64)>(
    terms: &[TermFeatures],
    same_as_prev: &[bool],
    permutations: bool,
    f: &mut F,
) -> usize {
    if terms.is_empty() || terms.iter().any(|t| t.len() == 0) {
        return 0;
    }

    let mut count = 0;
    walk(terms, same_as_prev, permutations, 0, 0, 1., 0, f, &mut count);
    count
}

#[allow(clippy::too_many_arguments)]
fn walk<F: FnMut(f32, u64)>(
    terms: &[TermFeatures],
    same_as_prev: &[bool],
    permutations: bool,
    level: usize,
    start: usize,
    value: f32,
    halfhash: u64,
    f: &mut F,
    count: &mut usize,
) {
    let term = &terms[level];
    let last = level + 1 == terms.len();
    let begin = if !permutations && level > 0 && same_as_prev[level] {
        start
    } else {
        0
    };

    for i in begin..term.len() {
        let v = value * term.values[i];
        let h = if level == 0 {
            term.indices[i]
        } else {
            halfhash ^ term.indices[i]
        };

        if last {
            f(v, h);
            *count += 1;
            continue;
        }

        let next_start = if term.values[i] == 1. { i + 1 } else { i };
        walk(
            terms,
            same_as_prev,
            permutations,
            level + 1,
            next_start,
            v,
            FNV_PRIME.wrapping_mul(h),
            f,
            count,
        );
    }
}

fn same_as_prev<T: PartialEq>(term: &[T]) -> Vec<bool> {
    (0..term.len())
        .map(|l| l > 0 && term[l] == term[l - 1])
        .collect()
}

/// Calls `f(value, index)` for every feature generated by `interactions` and
/// `extent_interactions` on `ex`.
///
/// # Returns
/// The amount of generated features.
pub fn foreach_interacted_feature<F: FnMut(f32, u64)>(
    ex: &Example,
    interactions: &[Vec<NamespaceIndex>],
    extent_interactions: &[Vec<ExtentTerm>],
    permutations: bool,
    mut f: F,
) -> usize {
    let mut count = 0;

    for interaction in interactions {
        let terms: Vec<_> = interaction
            .iter()
            .map(|&ns| TermFeatures::namespace(ex, ns))
            .collect();
        count += cross_product(&terms, &same_as_prev(interaction), permutations, &mut f);
    }

    for interaction in extent_interactions {
        let terms: Vec<_> = interaction
            .iter()
            .map(|&term| TermFeatures::extent(ex, term))
            .collect();
        count += cross_product(&terms, &same_as_prev(interaction), permutations, &mut f);
    }

    count
}

#[cfg(test)]
mod tests {
    use super::*;

    fn example(groups: &[(NamespaceIndex, &[(f32, u64)])]) -> Example {
        let mut ex = Example::new();
        for &(ns, feats) in groups {
            let fs = ex.get_or_create_feature_group(ns as u64, ns);
            for &(v, i) in feats {
                fs.push_back(v, i);
            }
            fs.end_ns_extent();
        }
        ex
    }

    fn collect(ex: &Example, interactions: &[Vec<u8>], permutations: bool) -> Vec<(f32, u64)> {
        let mut out = Vec::new();
        foreach_interacted_feature(ex, interactions, &[], permutations, |v, i| out.push((v, i)));
        out
    }

    #[test]
    fn quadratic_indices_are_fnv_chained() {
        let ex = example(&[(b'a', &[(2.0, 3)]), (b'b', &[(0.5, 5), (1.0, 7)])]);
        let out = collect(&ex, &[b"ab".to_vec()], false);

        assert_eq!(
            out,
            vec![
                (1.0, FNV_PRIME.wrapping_mul(3) ^ 5),
                (2.0, FNV_PRIME.wrapping_mul(3) ^ 7)
            ]
        );
    }

    #[test]
    fn cubic_chains_twice() {
        let ex = example(&[(b'a', &[(1.0, 1)]), (b'b', &[(1.0, 2)]), (b'c', &[(3.0, 4)])]);
        let out = collect(&ex, &[b"abc".to_vec()], false);

        let h = FNV_PRIME.wrapping_mul(FNV_PRIME.wrapping_mul(1) ^ 2) ^ 4;
        assert_eq!(out, vec![(3.0, h)]);
    }

    #[test]
    fn self_interaction_skips_unit_diagonal() {
        let ex = example(&[(b'a', &[(1.0, 1), (2.0, 2), (1.0, 3)])]);

        let combos = collect(&ex, &[b"aa".to_vec()], false);
        // Pairs i < j plus the diagonal of the non unit feature.
        assert_eq!(combos.len(), 3 + 1);
        assert!(combos.contains(&(4.0, FNV_PRIME.wrapping_mul(2) ^ 2)));
        assert!(!combos.contains(&(1.0, FNV_PRIME.wrapping_mul(1) ^ 1)));

        let perms = collect(&ex, &[b"aa".to_vec()], true);
        assert_eq!(perms.len(), 9);
    }

    #[test]
    fn extent_terms_cross_matching_ranges() {
        let mut ex = Example::new();
        let fs = ex.get_or_create_feature_group(100, b'u');
        fs.push_back(1.0, 1);
        fs.end_ns_extent();
        let fs = ex.get_or_create_feature_group(200, b'u');
        fs.push_back(1.0, 2);
        fs.end_ns_extent();
        let fs = ex.get_or_create_feature_group(100, b'u');
        fs.push_back(2.0, 3);
        fs.end_ns_extent();

        let mut out = Vec::new();
        let count =
            foreach_interacted_feature(&ex, &[], &[vec![(b'u', 100), (b'u', 200)]], false, |v, i| {
                out.push((v, i))
            });

        assert_eq!(count, 2);
        assert_eq!(
            out,
            vec![
                (1.0, FNV_PRIME.wrapping_mul(1) ^ 2),
                (2.0, FNV_PRIME.wrapping_mul(3) ^ 2)
            ]
        );
    }

    #[test]
    fn empty_namespace_generates_nothing() {
        let ex = example(&[(b'a', &[(1.0, 1)])]);
        assert!(collect(&ex, &[b"ab".to_vec()], false).is_empty());
    }
}
