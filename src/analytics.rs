//! Cumulative cycle/damage curves and the level-crossing distribution.

use serde::Serialize;

use crate::error::Result;
use crate::numeric::{calc_damage, find_min_max, linspace, weighted_mean};
use crate::rainflow::count_unique_ranges;
use crate::equivalent::RainflowTable;

/// Step-function arrays for a cumulative spectrum plot.
///
/// All arrays have length `n + 1`: the leading entries are sentinels
/// (`ncum[0] = 1`, `dcum[0] = 0`, `range[0]` duplicated) so the curve can be
/// drawn on a logarithmic cycle axis.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CumulativeData {
    pub range: Vec<f64>,
    pub ncum: Vec<f64>,
    pub dcum: Vec<f64>,
    pub total_damage: f64,
}

/// Builds cumulative cycle counts and cumulative damage percentages from a
/// flat range-count sequence.
///
/// Pairs at or below `max_range · gate_percent / 100` are discarded before
/// aggregation; the total damage is the Miner sum of what survives.
pub fn cumulative_rainflow_data(
    range_counts: &[f64],
    slope: f64,
    gate_percent: f64,
) -> CumulativeData {
    let mut max_range = 0.0f64;
    for pair in range_counts.chunks_exact(2) {
        if pair[0] > max_range {
            max_range = pair[0];
        }
    }
    let threshold = max_range * gate_percent / 100.0;
    let mut kept = Vec::with_capacity(range_counts.len());
    for pair in range_counts.chunks_exact(2) {
        if pair[0] > threshold {
            kept.push(pair[0]);
            kept.push(pair[1]);
        }
    }
    let aggregated = count_unique_ranges(&kept);
    let n = aggregated.len() / 2;
    let total_damage = calc_damage(slope, &aggregated);

    let mut range = Vec::with_capacity(n + 1);
    let mut ncum = Vec::with_capacity(n + 1);
    let mut dcum = Vec::with_capacity(n + 1);
    ncum.push(1.0);
    dcum.push(0.0);
    // The first range repeats so the arrays align as a step function.
    range.push(aggregated.first().copied().unwrap_or(0.0));
    for pair in aggregated.chunks_exact(2) {
        range.push(pair[0]);
        ncum.push(ncum.last().unwrap() + pair[1]);
        let damage = pair[0].powf(slope) * pair[1];
        let share = if total_damage > 0.0 {
            100.0 * damage / total_damage
        } else {
            0.0
        };
        dcum.push(dcum.last().unwrap() + share);
    }
    CumulativeData {
        range,
        ncum,
        dcum,
        total_damage,
    }
}

/// Weighted level-crossing distribution over a group's closed cycles.
///
/// Cycle maxima and minima form a 2N sample set weighted by repetitions.
/// Two `bin_count`-edge regions span minimum→mean and mean→maximum; each
/// sample lands in its containing bin by linear edge search. The low region
/// is cumulated left-to-right, the high region right-to-left, and the fused
/// curve gets a sentinel count of 1 and a duplicated boundary edge at both
/// ends, ready for log-scale step plotting.
///
/// Returns `(lc_cum, lc_level)`, both of length `2·bin_count + 2`.
pub fn level_crossing(
    rf_list: &[Vec<f64>],
    repetitions: &[f64],
    bin_count: usize,
) -> Result<(Vec<f64>, Vec<f64>)> {
    let table = RainflowTable::parse_all(rf_list, repetitions, 1.0)?;
    let n = table.len();
    if n == 0 || bin_count == 0 {
        return Ok((Vec::new(), Vec::new()));
    }

    let mut values = Vec::with_capacity(2 * n);
    values.extend_from_slice(&table.max_of_cycle);
    values.extend_from_slice(&table.min_of_cycle);
    let mut weights = Vec::with_capacity(2 * n);
    weights.extend_from_slice(&table.cycle_repets);
    weights.extend_from_slice(&table.cycle_repets);

    let mean = weighted_mean(&values, &weights);
    let (vmin, vmax) = find_min_max(&values);

    let low_edges = linspace(vmin, mean, bin_count);
    let high_edges = linspace(mean, vmax, bin_count);
    let mut low_hist = vec![0.0; bin_count];
    let mut high_hist = vec![0.0; bin_count];
    for (&v, &w) in values.iter().zip(weights.iter()) {
        if v <= mean {
            if let Some(bin) = low_edges.iter().position(|&edge| v <= edge) {
                low_hist[bin] += w;
            }
        } else {
            let mut bin = None;
            for (j, &edge) in high_edges.iter().enumerate() {
                if v >= edge {
                    bin = Some(j);
                }
            }
            if let Some(bin) = bin {
                high_hist[bin] += w;
            }
        }
    }

    let mut lc_cum = Vec::with_capacity(2 * bin_count + 2);
    let mut lc_level = Vec::with_capacity(2 * bin_count + 2);
    lc_cum.push(1.0);
    lc_level.push(vmin);
    // Crossings below the mean accumulate from the lowest level upward.
    let mut acc = 0.0;
    for (h, &edge) in low_hist.iter().zip(low_edges.iter()) {
        acc += h;
        lc_cum.push(acc);
        lc_level.push(edge);
    }
    // Crossings above the mean accumulate from the highest level downward.
    let mut high_cum = vec![0.0; bin_count];
    let mut acc = 0.0;
    for j in (0..bin_count).rev() {
        acc += high_hist[j];
        high_cum[j] = acc;
    }
    for (c, &edge) in high_cum.iter().zip(high_edges.iter()) {
        lc_cum.push(*c);
        lc_level.push(edge);
    }
    lc_cum.push(1.0);
    lc_level.push(vmax);
    Ok((lc_cum, lc_level))
}
