//! A module for validating and managing batch-job configurations.

use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::Path;

use evalexpr::{eval_with_context, ContextWithMutableVariables, HashMapContext, Value};
use regex::Regex;

/// Represents an error that can occur during validation of configuration data.
#[derive(Debug)]
pub struct ValidationError {
    message: String,
}

impl ValidationError {
    /// Creates a new `ValidationError` with a given message.
    fn new(message: &str) -> ValidationError {
        ValidationError {
            message: message.to_owned(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Top-level configuration for one batch analysis run.
#[derive(Debug, Deserialize)]
pub struct Config {
    pub job: Job,
    pub files: Vec<FileEntry>,
    /// Optional regular expression; only channels whose name matches are
    /// analyzed.
    #[serde(default)]
    pub channel_filter: Option<String>,
    /// Named constants available to the `scales` expressions.
    #[serde(default)]
    pub parameters: HashMap<String, f64>,
    /// Per-channel scale expressions, e.g. `WF_LEFT: "2 * g"`.
    #[serde(default)]
    pub scales: HashMap<String, String>,
    pub output: Output,
}

/// Analysis settings shared by every file of the run.
#[derive(Debug, Deserialize)]
pub struct Job {
    /// Wöhler slope applied in every Miner sum.
    pub slope: f64,
    /// Gate in percent of the maximum range; smaller cycles are discarded
    /// from the cumulative spectrum.
    #[serde(default)]
    pub gate: f64,
    /// Bin budget for reversal quantization.
    #[serde(default = "default_bins")]
    pub bins: usize,
    /// Close each channel's residue when channels are analyzed alone.
    #[serde(default = "default_true")]
    pub close_residuals: bool,
    /// Merge channels sharing a name across files before the analytics.
    #[serde(default)]
    pub combine_events: bool,
    /// Block count of the equivalent signal.
    #[serde(default = "default_blocks")]
    pub blocks: usize,
    /// Cycle floor the equivalent signal must reach.
    #[serde(default = "default_min_cycles")]
    pub min_cycles: f64,
}

fn default_bins() -> usize {
    crate::rainflow::DEFAULT_BINS
}

fn default_true() -> bool {
    true
}

fn default_blocks() -> usize {
    5
}

fn default_min_cycles() -> f64 {
    1.0e5
}

/// One RPC-III input file and the event it represents.
#[derive(Debug, Deserialize)]
pub struct FileEntry {
    pub path: String,
    /// Event name, used in reports.
    pub name: String,
    /// How many times this measurement repeats in the duty cycle.
    pub repetitions: u32,
}

#[derive(Debug, Deserialize)]
pub struct Output {
    pub dir: String,
    /// Re-emit the scaled channels as a short-integer RPC-III file.
    #[serde(default)]
    pub write_rpc: bool,
}

impl Config {
    /// Validates the entire configuration.
    ///
    /// This method checks the validity of each component of the configuration
    /// and ensures all required conditions are met.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.job.validate()?;
        if self.files.is_empty() {
            return Err(ValidationError::new("files must not be empty"));
        }
        for file in &self.files {
            file.validate()?;
        }
        if let Some(pattern) = &self.channel_filter {
            Regex::new(pattern).map_err(|e| {
                ValidationError::new(&format!("channel_filter is not a valid pattern: {}", e))
            })?;
        }
        self.validate_parameters_and_scales()?;
        if self.output.dir.trim().is_empty() {
            return Err(ValidationError::new("output dir must not be empty"));
        }
        Ok(())
    }

    /// Validates parameter names and scale expressions against predefined
    /// naming rules.
    fn validate_parameters_and_scales(&self) -> Result<(), ValidationError> {
        let re = Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_]*$").unwrap();
        for (key, value) in &self.parameters {
            if !re.is_match(key) {
                return Err(ValidationError::new(&format!(
                    "Invalid parameter name: {}",
                    key
                )));
            }
            if value.is_nan() {
                return Err(ValidationError::new(&format!(
                    "parameter value must be a number, got {}",
                    value
                )));
            }
        }
        for (channel, expression) in &self.scales {
            if channel.trim().is_empty() {
                return Err(ValidationError::new("scale channel name must not be empty"));
            }
            if expression.trim().is_empty() {
                return Err(ValidationError::new(&format!(
                    "Scale expression is empty for: {}",
                    channel
                )));
            }
        }
        // Expressions must actually evaluate against the parameters.
        self.evaluate_scales()?;
        Ok(())
    }

    /// Evaluates every scale expression against the `parameters` context.
    ///
    /// # Returns
    ///
    /// Returns a map from channel name to the numeric scale factor, or a
    /// `ValidationError` naming the expression that failed.
    pub fn evaluate_scales(&self) -> Result<HashMap<String, f64>, ValidationError> {
        let mut context = HashMapContext::new();
        for (key, value) in &self.parameters {
            if context.set_value(key.clone(), (*value).into()).is_err() {
                return Err(ValidationError::new(&format!(
                    "Failed to insert parameter '{}' into context",
                    key
                )));
            }
        }

        let mut results = HashMap::new();
        for (channel, expression) in &self.scales {
            match eval_with_context(expression, &context) {
                Ok(Value::Int(i)) => {
                    results.insert(channel.clone(), i as f64);
                }
                Ok(Value::Float(f)) => {
                    results.insert(channel.clone(), f);
                }
                Ok(other) => {
                    return Err(ValidationError::new(&format!(
                        "Scale expression for '{}' is not numeric: {:?}",
                        channel, other
                    )));
                }
                Err(e) => {
                    return Err(ValidationError::new(&format!(
                        "Failed to evaluate scale expression for '{}': {}",
                        channel, e
                    )));
                }
            }
        }
        Ok(results)
    }
}

impl Job {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.slope <= 0.0 {
            return Err(ValidationError::new(&format!(
                "slope must be greater than 0.0, got {}",
                self.slope
            )));
        }
        if !(0.0..=100.0).contains(&self.gate) {
            return Err(ValidationError::new(&format!(
                "gate must be between 0.0 and 100.0, got {}",
                self.gate
            )));
        }
        if self.bins < 2 {
            return Err(ValidationError::new(&format!(
                "bins must be at least 2, got {}",
                self.bins
            )));
        }
        if self.blocks < 2 {
            return Err(ValidationError::new(&format!(
                "blocks must be at least 2, got {}",
                self.blocks
            )));
        }
        if self.min_cycles <= 0.0 {
            return Err(ValidationError::new(&format!(
                "min_cycles must be greater than 0.0, got {}",
                self.min_cycles
            )));
        }
        Ok(())
    }
}

impl FileEntry {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.path.trim().is_empty() {
            return Err(ValidationError::new("file path must not be empty"));
        }
        if !Path::new(&self.path).exists() {
            return Err(ValidationError::new(&format!(
                "input file does not exist: {}",
                self.path
            )));
        }
        if self.name.trim().is_empty() {
            return Err(ValidationError::new("event name must not be empty"));
        }
        if self.repetitions == 0 {
            return Err(ValidationError::new(&format!(
                "repetitions must be greater than 0, got {}",
                self.repetitions
            )));
        }
        Ok(())
    }
}

/// Loads the configuration from a YAML file.
///
/// # Errors
///
/// This function will return an error if reading or parsing the
/// configuration file fails.
pub fn load_config<P: AsRef<Path>>(config_path: P) -> Result<Config, Box<dyn std::error::Error>> {
    let content = fs::read_to_string(config_path)?;
    let config: Config = serde_yaml::from_str(&content)?;
    Ok(config)
}
