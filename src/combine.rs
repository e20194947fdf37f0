//! Cross-event aggregation: channels recorded in different files under the
//! same name are merged into one cycle spectrum, with their open residues
//! joined, repeated and counted as a whole.

use serde::{Deserialize, Serialize};

use crate::channel::Channel;
use crate::error::Result;
use crate::rainflow::{
    concatenate_reversals, count_range_cycles, count_unique_ranges, rainflow_counting,
    DEFAULT_BINS,
};

/// Maps a source file to the number of times its measurement repeats in the
/// assembled duty cycle. Read-only input to the aggregator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub name: String,
    /// Opaque identifier matching [`Channel::file_hash`].
    pub file_hash: String,
    pub repetitions: u32,
}

/// Result of merging one channel group.
#[derive(Debug, Clone, Default)]
pub struct CombinedRainflow {
    /// Closed cycles recovered from the joined residues, counted with
    /// multiplier 1. Kept so the equivalent-signal builder can treat them as
    /// one more cycle sequence in the group.
    pub residual_cycles: Vec<f64>,
    /// Flat `[range, count, …]` over all channels and the residue closure,
    /// aggregated and sorted by range descending.
    pub range_counts: Vec<f64>,
}

/// Merges the rainflow output of channels sharing a name.
///
/// Every channel must already hold an open-residue rainflow cache (counted
/// with its own repetition weight). The residues are joined back-to-back,
/// each repeated per its file's event, and the joined sequence is counted
/// with closure; those extra cycles enter the combined spectrum unweighted.
pub fn combine_channels_range_counts(
    channels: &[&Channel],
    events: &[Event],
) -> Result<CombinedRainflow> {
    let mut range_counts: Vec<f64> = Vec::new();
    let mut joined: Vec<f64> = Vec::new();

    for channel in channels {
        range_counts.extend_from_slice(channel.range_counts());

        let repetitions = channel
            .file_hash
            .as_deref()
            .and_then(|hash| events.iter().find(|e| e.file_hash == hash))
            .map(|e| e.repetitions)
            // A file without an event keeps the weight its rainflow ran with.
            .unwrap_or_else(|| channel.applied_repetitions().max(1));

        let residue = channel.residuals();
        if residue.len() < 2 {
            continue;
        }
        for _ in 0..repetitions {
            joined = concatenate_reversals(&joined, residue)?;
        }
    }

    let mut residual_cycles = Vec::new();
    if joined.len() >= 2 {
        let closed = rainflow_counting(&joined, true, DEFAULT_BINS)?;
        residual_cycles = closed.cycles;
        let extra = count_range_cycles(&residual_cycles, 1.0)?;
        range_counts.extend_from_slice(&extra);
    }

    Ok(CombinedRainflow {
        residual_cycles,
        range_counts: count_unique_ranges(&range_counts),
    })
}
