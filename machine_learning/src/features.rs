use std::ops::Range;

/// Records where one occurrence of a namespace begins and ends inside a `Features` bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NamespaceExtent {
    pub begin_index: usize,
    pub end_index: usize,
    pub hash: u64,
}

impl NamespaceExtent {
    pub fn range(&self) -> Range<usize> {
        self.begin_index..self.end_index
    }
}

/// A sparse bucket of `(value, index)` features belonging to one namespace slot of an example.
///
/// The backing vectors are reused across examples, `clear` never frees them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Features {
    values: Vec<f32>,
    indices: Vec<u64>,
    extents: Vec<NamespaceExtent>,
    open_extent: Option<(usize, u64)>,
    pub sum_feat_sq: f32,
}

impl Features {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn indices(&self) -> &[u64] {
        &self.indices
    }

    pub fn extents(&self) -> &[NamespaceExtent] {
        &self.extents
    }

    /// Iterates the `(value, index)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (f32, u64)> + '_ {
        self.values.iter().copied().zip(self.indices.iter().copied())
    }

    /// Appends a feature outside of any namespace extent.
    pub fn push_back(&mut self, value: f32, index: u64) {
        self.values.push(value);
        self.indices.push(index);
        self.sum_feat_sq += value * value;
    }

    /// Appends a feature into the extent of `ns_hash`.
    ///
    /// Extends the last extent when it has the same hash and ends right here,
    /// otherwise a new extent is started.
    pub fn push_back_in(&mut self, value: f32, index: u64, ns_hash: u64) {
        let at = self.len();

        match self.extents.last_mut() {
            Some(last) if last.hash == ns_hash && last.end_index == at => last.end_index += 1,
            _ => self.extents.push(NamespaceExtent {
                begin_index: at,
                end_index: at + 1,
                hash: ns_hash,
            }),
        }

        self.push_back(value, index);
    }

    /// Marks the beginning of a run of features belonging to `ns_hash`.
    ///
    /// An already open extent is closed first.
    pub fn start_ns_extent(&mut self, ns_hash: u64) {
        if self.open_extent.is_some() {
            self.end_ns_extent();
        }

        self.open_extent = Some((self.len(), ns_hash));
    }

    /// Closes the open extent at the current length.
    ///
    /// Zero width extents are dropped and an extent adjacent to a previous one
    /// of the same hash is merged into it.
    pub fn end_ns_extent(&mut self) {
        let Some((begin_index, hash)) = self.open_extent.take() else {
            return;
        };

        let end_index = self.len();
        if begin_index == end_index {
            return;
        }

        match self.extents.last_mut() {
            Some(last) if last.hash == hash && last.end_index == begin_index => {
                last.end_index = end_index;
            }
            _ => self.extents.push(NamespaceExtent {
                begin_index,
                end_index,
                hash,
            }),
        }
    }

    /// The ranges of every extent recorded for `ns_hash`.
    pub fn extent_ranges(&self, ns_hash: u64) -> impl Iterator<Item = Range<usize>> + '_ {
        self.extents
            .iter()
            .filter(move |extent| extent.hash == ns_hash)
            .map(NamespaceExtent::range)
    }

    /// Empties the bucket keeping its allocations.
    pub fn clear(&mut self) {
        self.values.clear();
        self.indices.clear();
        self.extents.clear();
        self.open_extent = None;
        self.sum_feat_sq = 0.;
    }

    /// Rolls the bucket back to its first `pos` features.
    pub fn truncate_to(&mut self, pos: usize) {
        let removed = self.values.get(pos..).unwrap_or_default();
        let removed_sum_sq = removed.iter().map(|v| v * v).sum();
        self.truncate_to_with_sum(pos, removed_sum_sq);
    }

    /// Rolls the bucket back to its first `pos` features when the caller already
    /// knows the squared sum of the removed section.
    pub fn truncate_to_with_sum(&mut self, pos: usize, removed_sum_sq: f32) {
        if pos >= self.len() {
            return;
        }

        self.sum_feat_sq -= removed_sum_sq;
        self.values.truncate(pos);
        self.indices.truncate(pos);

        while self.extents.last().is_some_and(|e| e.begin_index >= pos) {
            self.extents.pop();
        }

        if let Some(last) = self.extents.last_mut() {
            last.end_index = last.end_index.min(pos);
        }

        if let Some((begin, _)) = self.open_extent.as_mut() {
            *begin = (*begin).min(pos);
        }
    }

    /// Sorts the features by masked index, ties broken by value.
    ///
    /// Extents no longer describe contiguous occurrences afterwards and are dropped.
    ///
    /// # Returns
    /// `false` if there was nothing to sort.
    pub fn sort(&mut self, mask: u64) -> bool {
        if self.is_empty() {
            return false;
        }

        let mut order: Vec<usize> = (0..self.len()).collect();
        order.sort_by(|&a, &b| {
            let (ia, ib) = (self.indices[a] & mask, self.indices[b] & mask);
            ia.cmp(&ib)
                .then_with(|| self.values[a].total_cmp(&self.values[b]))
        });

        self.values = order.iter().map(|&i| self.values[i]).collect();
        self.indices = order.iter().map(|&i| self.indices[i]).collect();
        self.extents.clear();
        self.open_extent = None;
        true
    }

    /// Drops every feature whose masked index equals the one before it, keeping the first.
    ///
    /// Expects the bucket to be sorted with the same mask.
    pub fn unique(&mut self, mask: u64) {
        let mut kept = 0;

        for i in 0..self.len() {
            if kept > 0 && self.indices[kept - 1] & mask == self.indices[i] & mask {
                continue;
            }

            self.values[kept] = self.values[i];
            self.indices[kept] = self.indices[i];
            kept += 1;
        }

        self.values.truncate(kept);
        self.indices.truncate(kept);
        self.extents.retain(|e| e.end_index <= kept);
        self.sum_feat_sq = self.values.iter().map(|v| v * v).sum();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_back_accumulates_squared_sum() {
        let mut fs = Features::new();
        fs.push_back(2.0, 1);
        fs.push_back(-3.0, 2);

        assert_eq!(fs.len(), 2);
        assert_eq!(fs.sum_feat_sq, 13.0);
    }

    #[test]
    fn adjacent_same_hash_extents_merge() {
        let mut fs = Features::new();
        fs.push_back_in(1.0, 1, 10);
        fs.push_back_in(1.0, 2, 10);
        fs.push_back_in(1.0, 3, 20);

        fs.start_ns_extent(20);
        fs.push_back(1.0, 4);
        fs.end_ns_extent();

        fs.start_ns_extent(30);
        fs.end_ns_extent();

        assert_eq!(
            fs.extents(),
            &[
                NamespaceExtent {
                    begin_index: 0,
                    end_index: 2,
                    hash: 10
                },
                NamespaceExtent {
                    begin_index: 2,
                    end_index: 4,
                    hash: 20
                },
            ]
        );
    }

    #[test]
    fn truncation_shrinks_and_prunes_extents() {
        let mut fs = Features::new();
        for i in 0..3 {
            fs.push_back_in(1.0, i, 10);
        }
        for i in 3..6 {
            fs.push_back_in(2.0, i, 20);
        }

        fs.truncate_to(4);
        assert_eq!(fs.len(), 4);
        assert_eq!(fs.extents()[1].range(), 3..4);
        assert_eq!(fs.sum_feat_sq, 3.0 + 4.0);

        fs.truncate_to(3);
        assert_eq!(fs.extents().len(), 1);
        assert_eq!(fs.extents()[0].range(), 0..3);

        fs.truncate_to(1);
        assert_eq!(fs.extents()[0].range(), 0..1);
        assert!(fs.extents().iter().all(|e| e.end_index <= fs.len()));
    }

    #[test]
    fn clear_keeps_capacity() {
        let mut fs = Features::new();
        for i in 0..64 {
            fs.push_back(1.0, i);
        }

        let capacity = fs.values.capacity();
        fs.clear();

        assert!(fs.is_empty());
        assert_eq!(fs.sum_feat_sq, 0.0);
        assert_eq!(fs.values.capacity(), capacity);
    }

    #[test]
    fn sort_and_unique_by_masked_index() {
        let mut fs = Features::new();
        fs.push_back(3.0, 0x15);
        fs.push_back(1.0, 0x02);
        fs.push_back(2.0, 0x05);
        fs.push_back(0.5, 0x12);

        assert!(fs.sort(0x0f));
        assert_eq!(fs.indices(), &[0x12, 0x02, 0x05, 0x15]);
        assert_eq!(fs.values(), &[0.5, 1.0, 2.0, 3.0]);

        fs.unique(0x0f);
        assert_eq!(fs.indices(), &[0x12, 0x05]);
        assert_eq!(fs.sum_feat_sq, 0.25 + 4.0);
    }
}
