// THEORY:
// This file is the entry point for the `sandbox_depth` library crate. It turns a
// noisy stream of 8-bit depth frames from a sensor hanging over a sandbox into
// two products a renderer and a water simulation can use:
//
// 1.  **Filtered frames**: every pixel averaged over a short history and only
//     updated when the average is statistically stable, then lightly smoothed.
// 2.  **Gradient fields**: a coarse grid of surface slopes, one vector per cell,
//     that tells water which way is downhill.
//
// `DepthPipeline` is the synchronous engine for callers that own their own
// frame loop. `StreamingPipeline` runs the same engine on a tokio worker behind
// latest-value mailboxes, so a fast sensor never waits on a slow consumer.

pub mod config;
pub mod core_modules;
pub mod error;
pub mod pipeline;
pub mod stream_pipeline;

pub use config::FilterConfig;
pub use core_modules::filtered_frame::FilteredFrame;
pub use core_modules::gradient_field::GradientField;
pub use error::{FilterError, StreamError};
pub use pipeline::{DepthPipeline, FrameDiagnostics};
pub use stream_pipeline::{
    ConfigHandle, FilteredFrames, FrameProducer, GradientFields, Published, StreamingPipeline,
    Submission,
};
