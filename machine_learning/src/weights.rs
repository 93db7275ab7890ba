use rayon::prelude::*;

use crate::{MlErr, Result};

/// A flat, power-of-two sized weight array where every logical feature owns
/// `stride` consecutive slots.
///
/// Slot `0` always holds the weight used for prediction, the remaining slots
/// are free for the optimizer's per-feature state.
#[derive(Debug, Clone, PartialEq)]
pub struct DenseWeights {
    num_bits: u32,
    stride_shift: u32,
    weights: Vec<f32>,
}

impl DenseWeights {
    /// Creates a new zeroed `DenseWeights`.
    ///
    /// # Arguments
    /// * `num_bits` - The logical length is `2^num_bits`.
    /// * `stride_shift` - Every logical feature owns `2^stride_shift` slots.
    ///
    /// # Returns
    /// A new `DenseWeights` instance.
    pub fn new(num_bits: u32, stride_shift: u32) -> Self {
        let len = (1usize << num_bits) << stride_shift;

        Self {
            num_bits,
            stride_shift,
            weights: vec![0.; len],
        }
    }

    /// The amount of logical weights, `2^num_bits`.
    pub fn len(&self) -> usize {
        1 << self.num_bits
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    pub fn num_bits(&self) -> u32 {
        self.num_bits
    }

    pub fn stride_shift(&self) -> u32 {
        self.stride_shift
    }

    pub fn stride(&self) -> usize {
        1 << self.stride_shift
    }

    /// The mask applied to a feature hash to obtain its logical index.
    pub fn mask(&self) -> u64 {
        (1u64 << self.num_bits) - 1
    }

    /// Maps a feature hash into the physical offset of its first slot.
    #[inline]
    pub fn strided_index(&self, index: u64) -> usize {
        ((index & self.mask()) as usize) << self.stride_shift
    }

    /// The slots of the feature with hash `index`.
    #[inline]
    pub fn slot(&self, index: u64) -> &[f32] {
        let start = self.strided_index(index);
        &self.weights[start..start + self.stride()]
    }

    /// The mutable slots of the feature with hash `index`.
    #[inline]
    pub fn slot_mut(&mut self, index: u64) -> &mut [f32] {
        let start = self.strided_index(index);
        let stride = self.stride();
        &mut self.weights[start..start + stride]
    }

    /// The whole flat buffer, `len() * stride()` floats.
    pub fn as_slice(&self) -> &[f32] {
        &self.weights
    }

    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        &mut self.weights
    }

    /// Iterates the slots of every logical weight in index order.
    pub fn iter_slots(&self) -> impl Iterator<Item = &[f32]> {
        self.weights.chunks_exact(self.stride())
    }

    pub fn iter_slots_mut(&mut self) -> impl Iterator<Item = &mut [f32]> {
        let stride = self.stride();
        self.weights.chunks_exact_mut(stride)
    }

    /// Copies slot `offset` of every logical weight into a dense vector.
    ///
    /// # Returns
    /// A `SizeMismatch` error if `offset` isn't smaller than the stride.
    pub fn gather(&self, offset: usize) -> Result<Vec<f32>> {
        self.check_offset(offset)?;

        Ok(self
            .weights
            .par_chunks_exact(self.stride())
            .map(|slots| slots[offset])
            .collect())
    }

    /// Writes `values` back into slot `offset` of every logical weight.
    ///
    /// # Returns
    /// A `SizeMismatch` error if `values` isn't `len()` long or `offset` is out of the stride.
    pub fn scatter(&mut self, offset: usize, values: &[f32]) -> Result<()> {
        self.check_offset(offset)?;

        if values.len() != self.len() {
            return Err(MlErr::SizeMismatch {
                a: "values",
                b: "weights",
                got: values.len(),
                expected: self.len(),
            });
        }

        let stride = self.stride();
        self.weights
            .par_chunks_exact_mut(stride)
            .zip(values)
            .for_each(|(slots, v)| slots[offset] = *v);

        Ok(())
    }

    /// Sets slot `offset` of every logical weight to `value`.
    pub fn fill_slot(&mut self, offset: usize, value: f32) -> Result<()> {
        self.check_offset(offset)?;
        let stride = self.stride();
        self.weights
            .par_chunks_exact_mut(stride)
            .for_each(|slots| slots[offset] = value);
        Ok(())
    }

    fn check_offset(&self, offset: usize) -> Result<()> {
        if offset >= self.stride() {
            return Err(MlErr::SizeMismatch {
                a: "offset",
                b: "stride",
                got: offset,
                expected: self.stride(),
            });
        }

        Ok(())
    }
}
