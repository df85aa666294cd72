// THEORY:
// Every fallible operation in the engine happens at a configuration boundary:
// setup, reset, or loading a config file. The per-pixel pipeline itself is a
// total function over correctly sized buffers, so nothing in the hot loop
// returns an error. Backpressure is a drop policy, not a failure, and never
// shows up here.

use thiserror::Error;

/// Errors reported by `DepthPipeline` setup, reset and configuration.
#[derive(Error, Debug)]
pub enum FilterError {
    #[error("frame dimensions must be non-zero (got {width}x{height})")]
    ZeroDimension { width: u32, height: u32 },

    #[error("frame buffer holds {actual} samples, expected {expected}")]
    FrameSizeMismatch { expected: usize, actual: usize },

    #[error("gradient resolution {resolution} does not evenly divide a {width}x{height} frame")]
    ResolutionNotDivisor { resolution: u32, width: u32, height: u32 },

    #[error("at least one averaging slot is required")]
    NoAveragingSlots,

    #[error("depth range far clip {far} must lie beyond near clip {near}")]
    InvalidDepthRange { near: f32, far: f32 },

    #[error("invalid filter configuration: {0}")]
    InvalidConfig(#[from] toml::de::Error),
}

/// Errors reported by the streaming runtime around the pipeline worker.
#[derive(Error, Debug)]
pub enum StreamError {
    #[error("pipeline setup failed: {0}")]
    Setup(#[from] FilterError),

    #[error("the depth filter worker has stopped")]
    Closed,

    #[error("the depth filter worker panicked: {0}")]
    Join(#[from] tokio::task::JoinError),
}
