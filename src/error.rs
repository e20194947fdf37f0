//! Error types for the signal-processing engine.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, EngineError>;

/// Failure modes surfaced by the rainflow engine and the builders.
///
/// The RPC-III codec does not use these for content errors; it accumulates
/// diagnostic strings on [`crate::rpc::RpcFile::errors`] and reports failure
/// through the boolean result of `parse`.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("malformed header: {0}")]
    MalformedHeader(String),

    #[error("data size mismatch: expected {expected} data bytes, got {got}")]
    SizeMismatch { expected: usize, got: usize },

    #[error("cycle sequence has odd length {0}")]
    OddCycleSequence(usize),

    #[error("got {cycles} cycle sequences but {repetitions} repetition counts")]
    LengthMismatch { cycles: usize, repetitions: usize },

    #[error("cannot join reversal sequences over a repeated endpoint")]
    RepeatedEndpoint,

    #[error("signal carries {have} cycles, fewer than the required {need}")]
    InsufficientCycles { have: f64, need: f64 },
}
