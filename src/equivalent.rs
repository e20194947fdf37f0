//! Equivalent block-signal reduction: a columnar rainflow table, a
//! max-rectangle block partition, a range-scaling loop and mean clipping
//! compress a full cycle histogram into a handful of blocks that reproduce
//! its Miner damage.

use serde::Serialize;

use crate::error::{EngineError, Result};
use crate::numeric::find_min_max;

/// Eight parallel columns, one row per input closed cycle.
#[derive(Debug, Clone, Default)]
pub struct RainflowTable {
    pub range: Vec<f64>,
    pub damage_of_cycle: Vec<f64>,
    pub cumul_damage: Vec<f64>,
    pub cycle_index: Vec<f64>,
    pub perc_cumul_damage: Vec<f64>,
    pub max_of_cycle: Vec<f64>,
    pub cycle_repets: Vec<f64>,
    pub min_of_cycle: Vec<f64>,
}

impl RainflowTable {
    /// Flattens per-channel cycle sequences into one columnar table.
    ///
    /// `rf_list[i]` is the flattened `[peak, valley, …]` cycle sequence of
    /// signal `i` and `repetitions[i]` the repetition count applied to each
    /// of its cycles: `damage_of_cycle = r · range^slope`.
    pub fn parse_all(rf_list: &[Vec<f64>], repetitions: &[f64], slope: f64) -> Result<Self> {
        if rf_list.len() != repetitions.len() {
            return Err(EngineError::LengthMismatch {
                cycles: rf_list.len(),
                repetitions: repetitions.len(),
            });
        }
        let rows: usize = rf_list.iter().map(|c| c.len() / 2).sum();
        let mut table = RainflowTable {
            range: Vec::with_capacity(rows),
            damage_of_cycle: Vec::with_capacity(rows),
            cumul_damage: vec![0.0; rows],
            cycle_index: Vec::with_capacity(rows),
            perc_cumul_damage: vec![0.0; rows],
            max_of_cycle: Vec::with_capacity(rows),
            cycle_repets: Vec::with_capacity(rows),
            min_of_cycle: Vec::with_capacity(rows),
        };
        let mut index = 0usize;
        for (cycles, &r) in rf_list.iter().zip(repetitions.iter()) {
            if cycles.len() % 2 != 0 {
                return Err(EngineError::OddCycleSequence(cycles.len()));
            }
            for pair in cycles.chunks_exact(2) {
                let (peak, valley) = (pair[0], pair[1]);
                let range = (peak - valley).abs();
                table.range.push(range);
                table.damage_of_cycle.push(r * range.powf(slope));
                table.cycle_index.push(index as f64);
                table.max_of_cycle.push(peak.max(valley));
                table.min_of_cycle.push(peak.min(valley));
                table.cycle_repets.push(r);
                index += 1;
            }
        }
        Ok(table)
    }

    pub fn len(&self) -> usize {
        self.range.len()
    }

    pub fn is_empty(&self) -> bool {
        self.range.is_empty()
    }

    /// Reorders all eight columns ascending by range and fills the damage
    /// prefix sums. Returns the total Miner damage.
    pub fn sort_ascending_by_range(&mut self) -> f64 {
        let mut perm: Vec<usize> = (0..self.len()).collect();
        perm.sort_by(|&a, &b| self.range[a].partial_cmp(&self.range[b]).unwrap());

        let reorder = |col: &[f64]| -> Vec<f64> { perm.iter().map(|&i| col[i]).collect() };
        self.range = reorder(&self.range);
        self.damage_of_cycle = reorder(&self.damage_of_cycle);
        self.cycle_index = reorder(&self.cycle_index);
        self.max_of_cycle = reorder(&self.max_of_cycle);
        self.cycle_repets = reorder(&self.cycle_repets);
        self.min_of_cycle = reorder(&self.min_of_cycle);

        let total: f64 = self.damage_of_cycle.iter().sum();
        let mut acc = 0.0;
        for i in 0..self.len() {
            acc += self.damage_of_cycle[i];
            self.cumul_damage[i] = acc;
            self.perc_cumul_damage[i] = if total > 0.0 {
                self.damage_of_cycle[i] / total
            } else {
                0.0
            };
        }
        total
    }
}

/// One row of the reduced signal.
#[derive(Debug, Clone, Serialize)]
pub struct EquivalentBlock {
    pub range: f64,
    pub mean: f64,
    pub repetition: f64,
    pub percent_damage: f64,
    pub block_damage: f64,
    pub adjusted_mean: f64,
}

/// Reduces rainflow histograms to an ordered sequence of damage blocks.
///
/// The blocks jointly reproduce the input's Miner damage; their repetitions
/// are scaled up until the signal carries at least `min_num_of_cycles`
/// cycles. Inputs with fewer weighted cycles than the floor are rejected
/// before any scaling.
pub fn eq_dmg_signal(
    rf_list: &[Vec<f64>],
    repetitions: &[f64],
    blocks_number: usize,
    min_num_of_cycles: f64,
    slope: f64,
) -> Result<Vec<EquivalentBlock>> {
    let mut table = RainflowTable::parse_all(rf_list, repetitions, slope)?;
    let have: f64 = table.cycle_repets.iter().sum();
    if have < min_num_of_cycles {
        return Err(EngineError::InsufficientCycles {
            have,
            need: min_num_of_cycles,
        });
    }

    let total_damage = table.sort_ascending_by_range();
    let n = table.len();
    if n < 2 {
        return Ok(Vec::new());
    }

    // Block partition: repeatedly split the span whose damage-by-height
    // rectangle is largest, lifting the cut-off cycles by the rectangle
    // height so later searches see the updated profile.
    let range_top = table.range[n - 1];
    let mut bounds = vec![0usize, n - 1];
    for _ in 0..blocks_number.saturating_sub(1) {
        let mut best: Option<(usize, f64, usize, f64)> = None;
        for pair in bounds.windows(2) {
            let (lo, hi) = (pair[0], pair[1]);
            let mut damage_of_block = 0.0;
            for a in lo + 1..hi {
                damage_of_block += table.damage_of_cycle[a];
                let score = damage_of_block * (range_top - table.range[a]);
                if best.map_or(true, |(_, _, _, s)| score > s) {
                    best = Some((a, range_top - table.range[a], lo, score));
                }
            }
        }
        let Some((division, height, lower, _)) = best else {
            break;
        };
        // The division row keeps its range: it becomes the representative
        // range of the block below it. Only the cycles underneath are lifted
        // so later searches see the covered profile.
        for idx in lower + 1..division {
            table.range[idx] += height;
        }
        bounds.push(division);
        bounds.sort_unstable();
    }

    // Build one block per boundary span (lo, hi].
    let mut blocks = Vec::with_capacity(bounds.len() - 1);
    for pair in bounds.windows(2) {
        let (lo, hi) = (pair[0], pair[1]);
        let mut block_damage = 0.0;
        let mut mean_acc = 0.0;
        let mut final_range = 0.0;
        for i in lo + 1..=hi {
            block_damage += table.damage_of_cycle[i];
            final_range = table.range[i];
            mean_acc += table.max_of_cycle[i] - table.range[i] / 2.0;
        }
        let block_mean = mean_acc / (hi - lo) as f64;
        blocks.push(EquivalentBlock {
            range: final_range,
            mean: block_mean,
            repetition: block_damage / final_range.powf(slope),
            percent_damage: 100.0 * block_damage / total_damage,
            block_damage,
            adjusted_mean: block_mean,
        });
    }

    // Shrink block ranges until the repetitions reach the cycle floor. The
    // first block compounds the shrink every pass; middle blocks follow only
    // while they stay above the midpoint to their original neighbour; the
    // last block is pinned to the full signal span.
    let snapshot = blocks.clone();
    let (global_min, _) = find_min_max(&table.min_of_cycle);
    let (_, global_max) = find_min_max(&table.max_of_cycle);
    let nb = blocks.len();
    let mut scale = 1.0f64;
    while blocks.iter().map(|b| b.repetition).sum::<f64>() <= min_num_of_cycles && scale > 0.0 {
        scale -= 1.0e-4;
        blocks[0].range *= scale;
        for k in 1..nb.saturating_sub(1) {
            let candidate = blocks[k].range * scale;
            let mid = (snapshot[k - 1].range + snapshot[k].range) / 2.0;
            if candidate >= mid {
                blocks[k].range = candidate;
            }
        }
        let last = nb - 1;
        blocks[last].range = global_max - global_min;
        blocks[last].mean = global_max;
        blocks[last].adjusted_mean = global_max - blocks[last].range / 2.0;
        for b in blocks.iter_mut() {
            b.repetition = b.block_damage / b.range.powf(slope);
            b.percent_damage = 100.0 * b.block_damage / total_damage;
        }
    }

    // Clip every block's mean so its excursion stays inside the envelope
    // spanned by the last block.
    let last = &blocks[nb - 1];
    let signal_min = last.mean - last.range;
    let signal_max = last.mean;
    for b in blocks.iter_mut() {
        if b.adjusted_mean - b.range / 2.0 < signal_min {
            b.adjusted_mean = b.range / 2.0 + signal_min;
        }
        if b.adjusted_mean + b.range / 2.0 > signal_max {
            b.adjusted_mean = signal_max - b.range / 2.0;
        }
    }

    // Highest-range block first.
    blocks.reverse();
    Ok(blocks)
}
