// THEORY:
// The `FilteredFrame` is the per-frame product of the temporal and spatial
// layers: one float per pixel, same geometry as the raw frame. It is a "dumb"
// container, replaced wholesale every frame and moved to consumers by value.
//
// Renderers that still speak the sensor's 8-bit convention get a quantised copy
// through `to_raw_bytes`; `value_range` gives a colour map the band of depths
// actually present, ignoring zero (no data) pixels.

use crate::core_modules::depth_sample::{FrameDimensions, RawSample};
use crate::error::FilterError;

#[derive(Debug, Clone, PartialEq)]
pub struct FilteredFrame {
    dimensions: FrameDimensions,
    data: Vec<f32>,
}

impl FilteredFrame {
    pub fn new(dimensions: FrameDimensions, data: Vec<f32>) -> Result<Self, FilterError> {
        dimensions.check_len(data.len())?;
        Ok(Self { dimensions, data })
    }

    pub fn dimensions(&self) -> FrameDimensions {
        self.dimensions
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn into_vec(self) -> Vec<f32> {
        self.data
    }

    pub fn get(&self, x: u32, y: u32) -> f32 {
        self.data[self.dimensions.index(x, y)]
    }

    /// Smallest non-zero and largest value in the frame, or `None` for a frame
    /// with no data at all.
    pub fn value_range(&self) -> Option<(f32, f32)> {
        self.data
            .iter()
            .copied()
            .filter(|&v| v != 0.0)
            .fold(None, |range, v| match range {
                None => Some((v, v)),
                Some((low, high)) => Some((low.min(v), high.max(v))),
            })
    }

    /// Rounds every value into the 8-bit raw-depth convention.
    pub fn to_raw_bytes(&self) -> Vec<RawSample> {
        self.data
            .iter()
            .map(|&v| v.round().clamp(0.0, 255.0) as RawSample)
            .collect()
    }
}
