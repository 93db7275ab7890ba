use std::collections::BTreeSet;

use super::WILDCARD_NAMESPACE;
use crate::example::NamespaceIndex;

/// Every ascending `k`-tuple over the positions of `set`, repeats allowed.
///
/// Yields `C(m + k - 1, k)` tuples for a set of `m` elements.
pub fn combinations_with_repetition<T: Copy>(set: &[T], k: usize) -> Vec<Vec<T>> {
    let mut out = Vec::new();
    if set.is_empty() && k > 0 {
        return out;
    }

    let mut positions = vec![0usize; k];
    loop {
        out.push(positions.iter().map(|&p| set[p]).collect());

        // Bump the rightmost position that can still grow and reset the tail to it.
        let Some(level) = positions.iter().rposition(|&p| p + 1 < set.len()) else {
            return out;
        };

        let next = positions[level] + 1;
        positions[level..].fill(next);
    }
}

/// Every ordered `k`-tuple over `set`, `m^k` of them.
pub fn permutations_with_repetition<T: Copy>(set: &[T], k: usize) -> Vec<Vec<T>> {
    let mut out = Vec::new();
    if set.is_empty() && k > 0 {
        return out;
    }

    let mut positions = vec![0usize; k];
    loop {
        out.push(positions.iter().map(|&p| set[p]).collect());

        let Some(level) = positions.iter().rposition(|&p| p + 1 < set.len()) else {
            return out;
        };

        positions[level] += 1;
        positions[level + 1..].fill(0);
    }
}

/// Expands the wildcards of `template` over the `active` namespaces.
///
/// Fixed namespaces keep their template position. Wildcards are expanded as
/// permutations when duplicates are left, combinations otherwise.
pub fn compile_interaction(
    template: &[NamespaceIndex],
    active: &BTreeSet<NamespaceIndex>,
    leave_duplicate: bool,
) -> Vec<Vec<NamespaceIndex>> {
    let wildcards = template
        .iter()
        .filter(|&&ns| ns == WILDCARD_NAMESPACE)
        .count();
    let active: Vec<_> = active.iter().copied().collect();

    let fills = if leave_duplicate {
        permutations_with_repetition(&active, wildcards)
    } else {
        combinations_with_repetition(&active, wildcards)
    };

    fills
        .into_iter()
        .map(|fill| {
            let mut fill = fill.into_iter();
            template
                .iter()
                .filter_map(|&ns| match ns {
                    WILDCARD_NAMESPACE => fill.next(),
                    ns => Some(ns),
                })
                .collect()
        })
        .collect()
}

/// Compiles every template against the `active` namespaces.
///
/// Templates without wildcards pass through untouched. Unless `leave_duplicate`
/// is set, the result is deduplicated with `sort_and_filter_duplicate_interactions`.
pub fn compile_interactions(
    templates: &[Vec<NamespaceIndex>],
    active: &BTreeSet<NamespaceIndex>,
    leave_duplicate: bool,
) -> Vec<Vec<NamespaceIndex>> {
    let mut compiled = Vec::with_capacity(templates.len());

    for template in templates {
        if template.contains(&WILDCARD_NAMESPACE) {
            compiled.extend(compile_interaction(template, active, leave_duplicate));
        } else {
            compiled.push(template.clone());
        }
    }

    if !leave_duplicate {
        sort_and_filter_duplicate_interactions(&mut compiled, true);
    }

    compiled
}

/// A tuple whose sorted form has a repeated namespace, or that is trivially sorted,
/// is generated in its sorted form.
fn must_be_left_sorted<T: PartialEq>(sorted: &[T]) -> bool {
    sorted.len() <= 1 || sorted.windows(2).any(|w| w[0] == w[1])
}

/// Removes interactions that are equal as unordered multisets and canonicalises
/// tuples with repeated namespaces.
///
/// # Arguments
/// * `interactions` - Rewritten in place, surviving entries keep their original order.
/// * `filter_duplicates` - Whether to drop later duplicates at all.
///
/// # Returns
/// The amount of removed interactions and the amount replaced by their sorted form.
pub fn sort_and_filter_duplicate_interactions<T: Ord + Clone>(
    interactions: &mut Vec<Vec<T>>,
    filter_duplicates: bool,
) -> (usize, usize) {
    let mut seen = BTreeSet::new();
    let mut kept = Vec::with_capacity(interactions.len());
    let mut sorted_cnt = 0;
    let before = interactions.len();

    for original in interactions.drain(..) {
        let mut sorted = original.clone();
        sorted.sort();

        if filter_duplicates && !seen.insert(sorted.clone()) {
            continue;
        }

        if must_be_left_sorted(&sorted) {
            if sorted != original {
                sorted_cnt += 1;
            }
            kept.push(sorted);
        } else {
            kept.push(original);
        }
    }

    *interactions = kept;
    (before - interactions.len(), sorted_cnt)
}

#[cfg(test)]
mod tests {
    use rand::{Rng, SeedableRng, rngs::StdRng};

    use super::*;

    fn choose(n: usize, k: usize) -> usize {
        (0..k).fold(1, |acc, i| acc * (n - i) / (i + 1))
    }

    #[test]
    fn combination_count_and_partition() {
        let set = [b'a', b'b', b'c', b'd'];

        for k in 0..=4 {
            let combos = combinations_with_repetition(&set, k);
            assert_eq!(combos.len(), choose(set.len() + k - 1, k));

            // Every tuple is ascending and appears once.
            let distinct: BTreeSet<_> = combos.iter().cloned().collect();
            assert_eq!(distinct.len(), combos.len());
            assert!(combos.iter().all(|c| c.windows(2).all(|w| w[0] <= w[1])));
        }
    }

    #[test]
    fn permutations_cover_every_tuple() {
        let set = [1u8, 2, 3];
        let perms = permutations_with_repetition(&set, 3);
        assert_eq!(perms.len(), 27);

        let distinct: BTreeSet<_> = perms.iter().cloned().collect();
        assert_eq!(distinct.len(), 27);

        // Sorting every permutation lands exactly on the combinations.
        let sorted: BTreeSet<_> = perms
            .into_iter()
            .map(|mut p| {
                p.sort();
                p
            })
            .collect();
        let combos: BTreeSet<_> = combinations_with_repetition(&set, 3).into_iter().collect();
        assert_eq!(sorted, combos);
    }

    #[test]
    fn wildcards_are_spliced_around_fixed_namespaces() {
        let active = BTreeSet::from([b'a', b'b']);

        let combos = compile_interaction(b"x:", &active, false);
        assert_eq!(combos, vec![b"xa".to_vec(), b"xb".to_vec()]);

        let combos = compile_interaction(b"::", &active, false);
        assert_eq!(combos, vec![b"aa".to_vec(), b"ab".to_vec(), b"bb".to_vec()]);

        let perms = compile_interaction(b":x:", &active, true);
        assert_eq!(perms.len(), 4);
        assert!(perms.contains(&b"bxa".to_vec()));
    }

    #[test]
    fn duplicates_are_removed_keeping_first_occurrence() {
        let mut interactions = vec![
            b"ba".to_vec(),
            b"ab".to_vec(),
            b"aba".to_vec(),
            b"c".to_vec(),
            b"baa".to_vec(),
        ];

        let (removed, sorted) = sort_and_filter_duplicate_interactions(&mut interactions, true);

        assert_eq!(
            interactions,
            vec![b"ba".to_vec(), b"aab".to_vec(), b"c".to_vec()]
        );
        assert_eq!(removed, 2);
        assert_eq!(sorted, 1);
    }

    #[test]
    fn sort_and_filter_is_idempotent() {
        let mut rng = StdRng::seed_from_u64(42);

        for _ in 0..200 {
            let len = rng.random_range(0..12);
            let mut interactions: Vec<Vec<u8>> = (0..len)
                .map(|_| {
                    let k = rng.random_range(1..4);
                    (0..k).map(|_| rng.random_range(b'a'..b'e')).collect()
                })
                .collect();

            sort_and_filter_duplicate_interactions(&mut interactions, true);
            let once = interactions.clone();

            let (removed, sorted) = sort_and_filter_duplicate_interactions(&mut interactions, true);
            assert_eq!(interactions, once);
            assert_eq!((removed, sorted), (0, 0));
        }
    }
}
