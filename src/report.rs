//! Report types written by the batch orchestrator: one JSON document per
//! channel group plus a plain-text run summary.

use serde::Serialize;

use crate::analytics::CumulativeData;
use crate::channel::Channel;
use crate::equivalent::EquivalentBlock;
use crate::numeric::format_file_size;

/// Everything the analytics produce for one channel group.
#[derive(Debug, Serialize)]
pub struct GroupReport {
    pub group: String,
    /// Miner sum over the ungated range counts.
    pub total_damage: f64,
    pub cumulative: CumulativeData,
    pub level_crossing: LevelCrossingCurve,
    /// Absent when the group holds fewer cycles than the configured floor.
    pub equivalent_signal: Option<Vec<EquivalentBlock>>,
}

/// The fused level-crossing step curve, cum over level.
#[derive(Debug, Serialize)]
pub struct LevelCrossingCurve {
    pub cum: Vec<f64>,
    pub level: Vec<f64>,
}

/// One line of the per-file decode summary.
#[derive(Debug, Serialize)]
pub struct FileSummary {
    pub path: String,
    pub hash: String,
    pub size_bytes: u64,
    pub channels: usize,
    pub event: String,
    pub repetitions: u32,
}

impl FileSummary {
    pub fn size(&self) -> String {
        format_file_size(self.size_bytes)
    }
}

/// Renders a fixed-width channel table for terminal output.
pub fn channel_table(channels: &[Channel]) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "{:>4}  {:<24} {:<8} {:>10} {:>12} {:>12}\n",
        "no", "name", "units", "samples", "min", "max"
    ));
    for channel in channels {
        out.push_str(&format!(
            "{:>4}  {:<24} {:<8} {:>10} {:>12.4} {:>12.4}\n",
            channel.number,
            channel.name,
            channel.units,
            channel.samples().len(),
            channel.min,
            channel.max
        ));
    }
    out
}

/// Renders the equivalent signal as a fixed-width block table.
pub fn block_table(blocks: &[EquivalentBlock]) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "{:>3}  {:>12} {:>12} {:>14} {:>10} {:>12}\n",
        "blk", "range", "mean", "repetitions", "dmg %", "adj. mean"
    ));
    for (i, block) in blocks.iter().enumerate() {
        out.push_str(&format!(
            "{:>3}  {:>12.4} {:>12.4} {:>14.1} {:>10.3} {:>12.4}\n",
            i + 1,
            block.range,
            block.mean,
            block.repetition,
            block.percent_damage,
            block.adjusted_mean
        ));
    }
    out
}
