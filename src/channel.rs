//! A single decoded signal and its cached rainflow state.

use crate::error::Result;
use crate::numeric::{calc_damage, find_min_max};
use crate::rainflow::{count_range_cycles, rainflow_counting};

/// One channel of a decoded time-history file.
///
/// The channel owns its raw samples and caches the output of the last
/// rainflow pass; [`Channel::damage`] reads that cache. A channel is a
/// unique-owner container: decode fills the samples, rainflow fills the
/// cached state, nothing else mutates it.
#[derive(Debug, Clone)]
pub struct Channel {
    /// 1-based channel number within its source file.
    pub number: usize,
    pub name: String,
    pub units: String,
    /// Scale factor the raw stored integers were multiplied with.
    pub scale: f64,
    /// Sample interval in seconds.
    pub dt: f64,
    pub filename: Option<String>,
    /// Opaque identifier of the source file, matching [`crate::combine::Event`].
    pub file_hash: Option<String>,
    samples: Vec<f64>,
    pub min: f64,
    pub max: f64,
    applied_repetitions: u32,
    reversals: Vec<f64>,
    rev_idx: Vec<usize>,
    cycles: Vec<f64>,
    residuals: Vec<f64>,
    range_counts: Vec<f64>,
}

impl Channel {
    pub fn new(
        number: usize,
        name: &str,
        units: &str,
        scale: f64,
        dt: f64,
        filename: Option<String>,
        file_hash: Option<String>,
    ) -> Self {
        Channel {
            number,
            name: name.to_owned(),
            units: units.to_owned(),
            scale,
            dt,
            filename,
            file_hash,
            samples: Vec::new(),
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            applied_repetitions: 0,
            reversals: Vec::new(),
            rev_idx: Vec::new(),
            cycles: Vec::new(),
            residuals: Vec::new(),
            range_counts: Vec::new(),
        }
    }

    pub fn set_samples(&mut self, samples: Vec<f64>) {
        self.samples = samples;
    }

    pub fn samples(&self) -> &[f64] {
        &self.samples
    }

    /// Refreshes the cached min/max from the raw samples.
    pub fn set_min_max(&mut self) {
        let (min, max) = find_min_max(&self.samples);
        self.min = min;
        self.max = max;
    }

    /// Runs the rainflow engine over the raw samples and caches the result.
    ///
    /// A second call discards the previous cache. The range counts are
    /// weighted by `repetitions`; leave `close_residuals` off when the
    /// residue is headed for cross-event aggregation.
    pub fn rainflow(&mut self, repetitions: u32, close_residuals: bool, bins: usize) -> Result<()> {
        let out = rainflow_counting(&self.samples, close_residuals, bins)?;
        self.range_counts = count_range_cycles(&out.cycles, repetitions as f64)?;
        self.reversals = out.reversals;
        self.rev_idx = out.rev_idx;
        self.cycles = out.cycles;
        self.residuals = out.residuals;
        self.applied_repetitions = repetitions;
        Ok(())
    }

    /// Miner damage sum of the cached range counts.
    pub fn damage(&self, slope: f64) -> f64 {
        calc_damage(slope, &self.range_counts)
    }

    /// Replaces the cached closed-cycle sequence, e.g. with the synthetic
    /// residual cycles produced by cross-event aggregation.
    pub fn set_rainflow_cycles(&mut self, cycles: Vec<f64>) {
        self.cycles = cycles;
    }

    /// Multiplies all samples and the scale factor in place.
    pub fn scale_value(&mut self, factor: f64) {
        for v in &mut self.samples {
            *v *= factor;
        }
        self.scale *= factor;
        if !self.samples.is_empty() {
            self.set_min_max();
        }
    }

    /// Drops the cached rainflow state and the applied repetition count.
    pub fn clear_rf(&mut self) {
        self.reversals.clear();
        self.rev_idx.clear();
        self.cycles.clear();
        self.residuals.clear();
        self.range_counts.clear();
        self.applied_repetitions = 0;
    }

    pub fn applied_repetitions(&self) -> u32 {
        self.applied_repetitions
    }

    pub fn reversals(&self) -> &[f64] {
        &self.reversals
    }

    pub fn rev_idx(&self) -> &[usize] {
        &self.rev_idx
    }

    pub fn cycles(&self) -> &[f64] {
        &self.cycles
    }

    pub fn residuals(&self) -> &[f64] {
        &self.residuals
    }

    pub fn range_counts(&self) -> &[f64] {
        &self.range_counts
    }
}
