use std::io::{Read, Write};

use crate::{DenseWeights, MlErr, Result};

const MAGIC: [u8; 4] = *b"OLMW";
const VERSION: u32 = 1;

/// The running state of a learner that a resumable model carries besides its slots.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ResumeState {
    pub total_weight: f64,
    pub normalized_sum_norm_x: f64,
    pub no_win_counter: u64,
}

fn read_array<const N: usize>(reader: &mut dyn Read) -> Result<[u8; N]> {
    let mut buf = [0; N];
    reader.read_exact(&mut buf)?;
    Ok(buf)
}

fn read_u32(reader: &mut dyn Read) -> Result<u32> {
    read_array(reader).map(u32::from_ne_bytes)
}

fn read_u64(reader: &mut dyn Read) -> Result<u64> {
    read_array(reader).map(u64::from_ne_bytes)
}

fn read_f64(reader: &mut dyn Read) -> Result<f64> {
    read_array(reader).map(f64::from_ne_bytes)
}

fn check(what: &'static str, got: u64, expected: u64) -> Result<()> {
    if got != expected {
        return Err(MlErr::IncompatibleModel {
            what,
            got,
            expected,
        });
    }

    Ok(())
}

/// Writes `weights` into `writer` in native byte order.
///
/// # Arguments
/// * `weights` - Only logical weights with a nonzero slot are written.
/// * `resume` - When given, every slot and the running state are written,
///   otherwise only slot `0`.
pub fn save_model(
    writer: &mut dyn Write,
    weights: &DenseWeights,
    resume: Option<&ResumeState>,
) -> Result<()> {
    writer.write_all(&MAGIC)?;
    writer.write_all(&VERSION.to_ne_bytes())?;
    writer.write_all(&weights.num_bits().to_ne_bytes())?;
    writer.write_all(&weights.stride_shift().to_ne_bytes())?;
    writer.write_all(&[resume.is_some() as u8])?;

    let Some(state) = resume else {
        let nonzero: Vec<_> = weights
            .iter_slots()
            .enumerate()
            .filter(|(_, slots)| slots[0] != 0.)
            .collect();

        writer.write_all(&(nonzero.len() as u64).to_ne_bytes())?;
        for (index, slots) in nonzero {
            writer.write_all(&(index as u64).to_ne_bytes())?;
            writer.write_all(&slots[0].to_ne_bytes())?;
        }

        return Ok(writer.flush()?);
    };

    writer.write_all(&state.total_weight.to_ne_bytes())?;
    writer.write_all(&state.normalized_sum_norm_x.to_ne_bytes())?;
    writer.write_all(&state.no_win_counter.to_ne_bytes())?;

    let nonzero: Vec<_> = weights
        .iter_slots()
        .enumerate()
        .filter(|(_, slots)| slots.iter().any(|&w| w != 0.))
        .collect();

    writer.write_all(&(nonzero.len() as u64).to_ne_bytes())?;
    for (index, slots) in nonzero {
        writer.write_all(&(index as u64).to_ne_bytes())?;
        writer.write_all(bytemuck::cast_slice(slots))?;
    }

    Ok(writer.flush()?)
}

/// Reads a model written by `save_model` into `weights`, zeroing every slot not in the file.
///
/// # Arguments
/// * `resume` - Whether the caller wants the running state back.
///
/// # Returns
/// The running state if it was requested, `ResumeUnavailable` if it was
/// requested but the model doesn't carry one, `IncompatibleModel` if the
/// geometry doesn't match `weights`.
pub fn load_model(
    reader: &mut dyn Read,
    weights: &mut DenseWeights,
    resume: bool,
) -> Result<Option<ResumeState>> {
    let magic: [u8; 4] = read_array(reader)?;
    check(
        "magic",
        u32::from_be_bytes(magic) as u64,
        u32::from_be_bytes(MAGIC) as u64,
    )?;
    check("version", read_u32(reader)? as u64, VERSION as u64)?;
    check("num_bits", read_u32(reader)? as u64, weights.num_bits() as u64)?;
    check(
        "stride_shift",
        read_u32(reader)? as u64,
        weights.stride_shift() as u64,
    )?;

    let resumable = read_array::<1>(reader)?[0] != 0;
    if resume && !resumable {
        return Err(MlErr::ResumeUnavailable);
    }

    weights.as_mut_slice().fill(0.);
    let len = weights.len() as u64;

    let state = if resumable {
        Some(ResumeState {
            total_weight: read_f64(reader)?,
            normalized_sum_norm_x: read_f64(reader)?,
            no_win_counter: read_u64(reader)?,
        })
    } else {
        None
    };

    let count = read_u64(reader)?;
    let mut slots = vec![0f32; if resumable { weights.stride() } else { 1 }];

    for _ in 0..count {
        let index = read_u64(reader)?;
        if index >= len {
            return Err(MlErr::IncompatibleModel {
                what: "weight index",
                got: index,
                expected: len,
            });
        }

        reader.read_exact(bytemuck::cast_slice_mut(slots.as_mut_slice()))?;

        let target = weights.slot_mut(index);
        if resume {
            target.copy_from_slice(&slots);
        } else {
            target[0] = slots[0];
        }
    }

    Ok(state.filter(|_| resume))
}
