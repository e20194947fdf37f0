//! Durability-signal processing engine: RPC-III decoding and encoding,
//! rainflow cycle counting with residue handling, cross-event aggregation,
//! cumulative and level-crossing analytics, and equivalent block-signal
//! reduction.
//!
//! The core is single-threaded and batch oriented: the caller hands file
//! bytes to [`RpcFile`], runs [`Channel::rainflow`] per channel, and feeds
//! the cached cycle spectra to the analytics and the builder. All hot loops
//! work over contiguous `f64` sequences.
//!
//! # Example
//!
//! ```
//! use durasig::{calc_damage, count_range_cycles, rainflow_counting, DEFAULT_BINS};
//!
//! let signal = [0.0, 2.0, -1.0, 3.0, -2.0, 4.0, -3.0, 5.0];
//! let out = rainflow_counting(&signal, true, DEFAULT_BINS).unwrap();
//! let counts = count_range_cycles(&out.cycles, 10.0).unwrap();
//! assert!(calc_damage(5.0, &counts) > 0.0);
//! ```

pub mod analytics;
pub mod channel;
pub mod combine;
pub mod equivalent;
pub mod error;
pub mod numeric;
pub mod rainflow;
pub mod report;
pub mod rpc;

#[cfg(feature = "cli")]
pub mod app_logic;
#[cfg(feature = "cli")]
pub mod config;

pub use analytics::{cumulative_rainflow_data, level_crossing, CumulativeData};
pub use channel::Channel;
pub use combine::{combine_channels_range_counts, CombinedRainflow, Event};
pub use equivalent::{eq_dmg_signal, EquivalentBlock, RainflowTable};
pub use error::{EngineError, Result};
pub use numeric::calc_damage;
pub use rainflow::{
    count_range_cycles, count_unique_ranges, rainflow_counting, RainflowOutput, DEFAULT_BINS,
};
pub use rpc::{DataType, HeaderValue, RpcFile};
