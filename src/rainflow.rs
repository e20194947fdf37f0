//! Rainflow cycle extraction: bin-quantized reversal detection, the
//! four-point closed-cycle rule with residue handling, and range-count
//! aggregation.

use std::collections::HashMap;

use crate::error::{EngineError, Result};
use crate::numeric::{find_min_max, linspace};

/// Default bin budget for reversal quantization.
pub const DEFAULT_BINS: usize = 4096;

/// Everything one rainflow pass produces for a signal.
#[derive(Debug, Clone, Default)]
pub struct RainflowOutput {
    /// Reversal values after quantization.
    pub reversals: Vec<f64>,
    /// Positions of the reversals in the raw sample sequence.
    pub rev_idx: Vec<usize>,
    /// Closed cycles as flattened `[start, end, start, end, …]` pairs.
    pub cycles: Vec<f64>,
    /// Open reversals left on the stack, kept for cross-event joining.
    pub residuals: Vec<f64>,
}

/// Turning-point detection over a bin-quantized copy of the signal.
///
/// The signal range is divided into `bins + 1` quantization levels spanning
/// `min..max`; every sample snaps to its level midpoint before plateaus are
/// collapsed and sign changes extracted. Quantization makes equal-range
/// cycles compare exactly during aggregation.
pub fn reversals(signal: &[f64], bins: usize) -> (Vec<f64>, Vec<usize>) {
    let n = signal.len();
    if n < 2 {
        return (signal.to_vec(), (0..n).collect());
    }
    let (min, max) = find_min_max(signal);
    if min == max {
        return (vec![signal[0], signal[n - 1]], vec![0, n - 1]);
    }

    let dy = (max - min) / (2.0 * bins as f64);
    let bounds = linspace(min - dy, max + dy, bins + 2);
    let y0 = bounds[0];
    let w = bounds[1] - bounds[0];
    let top = bins as isize + 1;
    let z: Vec<f64> = signal
        .iter()
        .map(|&s| {
            let idx = (((s - y0) / w).floor() as isize).clamp(0, top);
            y0 + (idx as f64 + 0.5) * w
        })
        .collect();

    // Plateau compression: keep each position where the quantized value
    // changes, plus the position just after the last change.
    let mut candidates: Vec<usize> = Vec::new();
    for j in 0..n - 1 {
        if z[j + 1] != z[j] {
            candidates.push(j);
        }
    }
    if candidates.is_empty() {
        return (vec![z[0], z[n - 1]], vec![0, n - 1]);
    }
    let terminal = candidates[candidates.len() - 1] + 1;
    candidates.push(terminal);

    let mut values = Vec::with_capacity(candidates.len());
    let mut indices = Vec::with_capacity(candidates.len());
    values.push(z[candidates[0]]);
    indices.push(candidates[0]);
    for i in 1..candidates.len() - 1 {
        let d_prev = z[candidates[i]] - z[candidates[i - 1]];
        let d_next = z[candidates[i + 1]] - z[candidates[i]];
        if d_prev * d_next < 0.0 {
            values.push(z[candidates[i]]);
            indices.push(candidates[i]);
        }
    }
    // The terminal candidate always closes the sequence.
    values.push(z[terminal]);
    indices.push(terminal);
    (values, indices)
}

/// Four-point closed-cycle extraction.
///
/// Walks the reversal sequence with a stack; whenever the inner range of the
/// last four entries is enclosed by both neighbours, the inner pair leaves
/// the stack as one closed cycle. Returns the flattened `(start, end)` pairs
/// and the residue left on the stack.
pub fn count_cycles(reversal_values: &[f64]) -> (Vec<f64>, Vec<f64>) {
    let mut stack: Vec<f64> = Vec::with_capacity(reversal_values.len());
    let mut cycles = Vec::new();
    for &r in reversal_values {
        stack.push(r);
        while stack.len() >= 4 {
            let m = stack.len();
            let (s0, s1, s2, s3) = (stack[m - 4], stack[m - 3], stack[m - 2], stack[m - 1]);
            let d1 = (s1 - s0).abs();
            let d2 = (s2 - s1).abs();
            let d3 = (s3 - s2).abs();
            if d2 <= d1 && d2 <= d3 {
                cycles.push(s1);
                cycles.push(s2);
                // Keep the outer points; the inner pair closed.
                stack.remove(m - 3);
                stack.remove(m - 3);
            } else {
                break;
            }
        }
    }
    (cycles, stack)
}

/// Joins two reversal sequences so the combined sequence still alternates.
///
/// Both inputs must alternate already. A sequence shorter than two entries
/// carries no direction and is appended as-is. Equal endpoints across the
/// seam (`t1 = 0`) cannot be joined and surface as
/// [`EngineError::RepeatedEndpoint`].
pub fn concatenate_reversals(a: &[f64], b: &[f64]) -> Result<Vec<f64>> {
    if a.is_empty() {
        return Ok(b.to_vec());
    }
    if b.is_empty() {
        return Ok(a.to_vec());
    }
    if a.len() < 2 || b.len() < 2 {
        let mut out = a.to_vec();
        out.extend_from_slice(b);
        return Ok(out);
    }

    let d_a_end = a[a.len() - 1] - a[a.len() - 2];
    let d_b_start = b[1] - b[0];
    let d_join = b[0] - a[a.len() - 1];
    let t1 = d_a_end * d_b_start;
    let t2 = d_a_end * d_join;

    let mut out = Vec::with_capacity(a.len() + b.len());
    if t1 > 0.0 && t2 < 0.0 {
        out.extend_from_slice(a);
        out.extend_from_slice(b);
    } else if t1 > 0.0 && t2 >= 0.0 {
        out.extend_from_slice(&a[..a.len() - 1]);
        out.extend_from_slice(&b[1..]);
    } else if t1 < 0.0 && t2 >= 0.0 {
        out.extend_from_slice(a);
        out.extend_from_slice(&b[1..]);
    } else if t1 < 0.0 && t2 < 0.0 {
        out.extend_from_slice(&a[..a.len() - 1]);
        out.extend_from_slice(b);
    } else {
        return Err(EngineError::RepeatedEndpoint);
    }
    Ok(out)
}

/// Full rainflow pass over a raw signal.
///
/// With `close_residuals` the residue is joined to itself and counted a
/// second time; the extra cycles extend the cycle sequence while the residue
/// is preserved untouched for cross-event aggregation.
pub fn rainflow_counting(
    samples: &[f64],
    close_residuals: bool,
    bins: usize,
) -> Result<RainflowOutput> {
    let (reversal_values, rev_idx) = reversals(samples, bins);
    let (mut cycles, residuals) = count_cycles(&reversal_values);
    if close_residuals && residuals.len() >= 2 {
        let joined = concatenate_reversals(&residuals, &residuals)?;
        let (extra, _) = count_cycles(&joined);
        cycles.extend(extra);
    }
    Ok(RainflowOutput {
        reversals: reversal_values,
        rev_idx,
        cycles,
        residuals,
    })
}

/// Aggregates closed cycles into a flat `[range, count, …]` sequence sorted
/// by range descending. Each cycle contributes `repetitions` to its range's
/// count, so counts are positive reals.
pub fn count_range_cycles(cycles: &[f64], repetitions: f64) -> Result<Vec<f64>> {
    if cycles.len() % 2 != 0 {
        return Err(EngineError::OddCycleSequence(cycles.len()));
    }
    let mut counts: HashMap<u64, f64> = HashMap::new();
    for pair in cycles.chunks_exact(2) {
        let range = (pair[1] - pair[0]).abs();
        *counts.entry(range.to_bits()).or_insert(0.0) += repetitions;
    }
    Ok(sorted_flat(counts))
}

/// Re-aggregates a flat range-count sequence, merging duplicate ranges and
/// restoring the descending sort.
pub fn count_unique_ranges(range_counts: &[f64]) -> Vec<f64> {
    let mut counts: HashMap<u64, f64> = HashMap::new();
    for pair in range_counts.chunks_exact(2) {
        *counts.entry(pair[0].to_bits()).or_insert(0.0) += pair[1];
    }
    sorted_flat(counts)
}

// Ranges are keyed by their bit pattern; they come out of identical
// quantization arithmetic, so equal ranges are bit-equal.
fn sorted_flat(counts: HashMap<u64, f64>) -> Vec<f64> {
    let mut pairs: Vec<(f64, f64)> = counts
        .into_iter()
        .map(|(bits, count)| (f64::from_bits(bits), count))
        .collect();
    pairs.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap());
    let mut flat = Vec::with_capacity(pairs.len() * 2);
    for (range, count) in pairs {
        flat.push(range);
        flat.push(count);
    }
    flat
}
