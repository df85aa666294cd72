// THEORY:
// The `depth_sample` module is the most fundamental unit of the engine. It holds
// the "dumb" value types that every other stage speaks: the raw 8-bit sample,
// the frame geometry, and the gate that decides whether a sample is usable.
//
// Key principles:
// 1.  **Double-encoded invalid marker**: the sensor pipeline reports "no depth"
//     as either `0` or `255`. Both are invalid, always. The ring buffer writes
//     `255` for samples it deliberately forgets, so `255` doubles as the
//     "nothing stored here" marker.
// 2.  **Flat addressing**: all per-pixel buffers are flat vectors indexed by
//     `y * width + x`. `FrameDimensions` is the only place that arithmetic lives.

use crate::error::FilterError;

/// One raw depth reading from the sensor.
pub type RawSample = u8;

/// Marker stored in the averaging ring for "no sample in this slot".
pub const INVALID_MARKER: RawSample = 255;
/// The sensor's "too close / no return" value.
pub const NO_RETURN: RawSample = 0;

/// True for samples strictly inside `(0, 255)`.
#[inline]
pub fn is_valid_sample(sample: RawSample) -> bool {
    sample != NO_RETURN && sample != INVALID_MARKER
}

/// Immutable frame geometry, fixed at setup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameDimensions {
    width: u32,
    height: u32,
}

impl FrameDimensions {
    pub fn new(width: u32, height: u32) -> Result<Self, FilterError> {
        if width == 0 || height == 0 {
            return Err(FilterError::ZeroDimension { width, height });
        }
        Ok(Self { width, height })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    #[inline]
    pub fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }

    /// Fails unless `len` matches the frame's pixel count.
    pub fn check_len(&self, len: usize) -> Result<(), FilterError> {
        let expected = self.pixel_count();
        if len == expected {
            Ok(())
        } else {
            Err(FilterError::FrameSizeMismatch { expected, actual: len })
        }
    }
}

/// Accepts samples inside a configurable inclusive band, never `0` or `255`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleGate {
    low: RawSample,
    high: RawSample,
}

impl SampleGate {
    pub fn new((low, high): (RawSample, RawSample)) -> Self {
        Self {
            low: low.max(NO_RETURN + 1),
            high: high.min(INVALID_MARKER - 1),
        }
    }

    #[inline]
    pub fn accepts(&self, sample: RawSample) -> bool {
        sample >= self.low && sample <= self.high
    }
}

impl Default for SampleGate {
    fn default() -> Self {
        Self::new((1, 254))
    }
}
