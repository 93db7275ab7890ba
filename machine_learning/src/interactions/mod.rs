mod compile;
mod estimate;
mod generate;
mod parse;

use std::collections::BTreeSet;

use log::debug;

pub use compile::{
    combinations_with_repetition, compile_interaction, compile_interactions,
    permutations_with_repetition, sort_and_filter_duplicate_interactions,
};
pub use estimate::estimate_interacted_features;
pub use generate::foreach_interacted_feature;
pub use parse::{ExtentTerm, WILDCARD_NAMESPACE, parse_full_name_interaction, parse_interaction};

use crate::{
    Result,
    example::{CONSTANT_NAMESPACE, Example, NamespaceIndex},
};

/// Keeps the concrete interactions of a learner in sync with the namespaces seen so far.
#[derive(Debug, Clone, Default)]
pub struct InteractionsGenerator {
    templates: Vec<Vec<NamespaceIndex>>,
    leave_duplicate: bool,
    permutations: bool,
    seen: BTreeSet<NamespaceIndex>,

    interactions: Vec<Vec<NamespaceIndex>>,
    extent_interactions: Vec<Vec<ExtentTerm>>,
}

impl InteractionsGenerator {
    /// Creates a new `InteractionsGenerator`.
    ///
    /// # Arguments
    /// * `templates` - Namespace byte interactions, possibly holding wildcards.
    /// * `extent_interactions` - Full name interactions, used as given.
    /// * `leave_duplicate` - Keeps interactions that are equal as multisets.
    /// * `permutations` - Generates every ordering of self interactions.
    pub fn new(
        templates: Vec<Vec<NamespaceIndex>>,
        mut extent_interactions: Vec<Vec<ExtentTerm>>,
        leave_duplicate: bool,
        permutations: bool,
    ) -> Self {
        if !leave_duplicate {
            sort_and_filter_duplicate_interactions(&mut extent_interactions, true);
        }

        let seen = BTreeSet::new();
        let interactions = compile_interactions(&templates, &seen, leave_duplicate);

        Self {
            templates,
            leave_duplicate,
            permutations,
            seen,
            interactions,
            extent_interactions,
        }
    }

    /// Builds a generator out of textual interaction specs.
    ///
    /// # Returns
    /// A `MalformedInteraction` error if any spec can't be parsed.
    pub fn parse<S: AsRef<str>>(
        interactions: &[S],
        full_name_interactions: &[S],
        leave_duplicate: bool,
        permutations: bool,
    ) -> Result<Self> {
        let templates = interactions
            .iter()
            .map(|s| parse_interaction(s.as_ref()))
            .collect::<Result<_>>()?;
        let extents = full_name_interactions
            .iter()
            .map(|s| parse_full_name_interaction(s.as_ref()))
            .collect::<Result<_>>()?;

        Ok(Self::new(templates, extents, leave_duplicate, permutations))
    }

    /// Registers the namespaces of `ex`, recompiling the wildcard templates if a new one shows up.
    pub fn update(&mut self, ex: &Example) {
        let mut grew = false;
        for &ns in &ex.indices {
            if ns != CONSTANT_NAMESPACE && !ex.feature_space[ns as usize].is_empty() {
                grew |= self.seen.insert(ns);
            }
        }

        if grew && self.templates.iter().any(|t| t.contains(&WILDCARD_NAMESPACE)) {
            self.interactions = compile_interactions(&self.templates, &self.seen, self.leave_duplicate);
            debug!(namespaces = self.seen.len(), interactions = self.interactions.len(); "recompiled interactions");
        }
    }

    pub fn interactions(&self) -> &[Vec<NamespaceIndex>] {
        &self.interactions
    }

    pub fn extent_interactions(&self) -> &[Vec<ExtentTerm>] {
        &self.extent_interactions
    }

    /// Calls `f(value, index)` for every feature generated on `ex`.
    pub fn foreach<F: FnMut(f32, u64)>(&self, ex: &Example, f: F) -> usize {
        foreach_interacted_feature(
            ex,
            &self.interactions,
            &self.extent_interactions,
            self.permutations,
            f,
        )
    }

    /// The `(count, sum_sq)` of the features `foreach` would generate on `ex`.
    pub fn estimate(&self, ex: &Example) -> (usize, f32) {
        estimate_interacted_features(
            ex,
            &self.interactions,
            &self.extent_interactions,
            self.permutations,
        )
    }

    pub fn is_empty(&self) -> bool {
        self.interactions.is_empty() && self.extent_interactions.is_empty()
    }
}
