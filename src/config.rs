// THEORY:
// `FilterConfig` is the single knob panel of the engine. It is a plain data
// struct with public fields so that it can be built literally, deserialised
// from TOML, or edited field-by-field through the pipeline setters. Fields fall
// into two groups:
//
// 1.  **Per-frame parameters** (stability thresholds, hysteresis, smoothing,
//     gradient clamp): read fresh on every `filter` call.
// 2.  **Layout parameters** (averaging depth, gradient resolution, depth range,
//     valid raw interval): the buffers were shaped or accumulated under them, so
//     a change only becomes safe after the buffers are reset.

use crate::core_modules::depth_sample::FrameDimensions;
use crate::core_modules::gradient_field::GradientField;
use crate::core_modules::stability::StabilityCriteria;
use crate::error::FilterError;
use serde::{Deserialize, Serialize};

/// Configuration for the `DepthPipeline`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Number of raw frames kept per pixel in the averaging ring.
    pub num_averaging_slots: usize,
    /// Minimum number of valid samples in the ring before a pixel can be stable.
    pub min_num_samples: u32,
    /// Maximum variance (in squared raw units) for a pixel to be stable.
    pub max_variance: u32,
    /// Amount a stable mean must move before the reported value follows it.
    pub hysteresis: f32,
    /// Keep reporting the last stable value for unstable pixels.
    pub retain_valids: bool,
    /// Value reported for unstable pixels when `retain_valids` is off.
    pub instable_value: f32,
    pub spatial_filter_enabled: bool,
    /// Number of (column, row) smoothing repetitions.
    pub spatial_filter_passes: u32,
    /// Pixels per gradient cell along each axis.
    pub gradient_resolution: u32,
    /// Sensor clipping planes `(near, far)`.
    pub depth_range: (f32, f32),
    pub max_gradient_magnitude: f32,
    /// Inclusive band of raw samples accepted as valid. `0` and `255` are
    /// rejected whatever this says.
    pub valid_raw_range: (u8, u8),
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            num_averaging_slots: 20,
            min_num_samples: 10,
            max_variance: 2,
            hysteresis: 0.1,
            retain_valids: true,
            instable_value: 0.0,
            spatial_filter_enabled: true,
            spatial_filter_passes: 2,
            gradient_resolution: 10,
            depth_range: (500.0, 4000.0),
            max_gradient_magnitude: 10.0,
            valid_raw_range: (1, 254),
        }
    }
}

impl FilterConfig {
    /// A short-window filter that marks holes instead of filling them, for
    /// consumers that need to know where the sensor currently sees nothing
    /// (water or hand detection over the sand).
    pub fn hole_marking() -> Self {
        Self {
            num_averaging_slots: 10,
            min_num_samples: 5,
            max_variance: 3,
            retain_valids: false,
            instable_value: 2047.0,
            spatial_filter_enabled: false,
            ..Self::default()
        }
    }

    /// Parses a TOML document. Missing keys keep their default values.
    pub fn from_toml_str(source: &str) -> Result<Self, FilterError> {
        let config: FilterConfig = toml::from_str(source)?;
        config.validate_depth_range()?;
        Ok(config)
    }

    pub fn stability_criteria(&self) -> StabilityCriteria {
        StabilityCriteria {
            min_num_samples: self.min_num_samples,
            max_variance: self.max_variance,
            hysteresis: self.hysteresis,
            retain_valids: self.retain_valids,
            instable_value: self.instable_value,
        }
    }

    /// Distance between the clipping planes, used to scale gradients.
    pub fn depth_span(&self) -> f32 {
        self.depth_range.1 - self.depth_range.0
    }

    pub fn validate_depth_range(&self) -> Result<(), FilterError> {
        let (near, far) = self.depth_range;
        if far > near {
            Ok(())
        } else {
            Err(FilterError::InvalidDepthRange { near, far })
        }
    }

    /// Checks every setting the pipeline buffers depend on against the frame
    /// geometry.
    pub fn validate(&self, dimensions: FrameDimensions) -> Result<(), FilterError> {
        self.validate_depth_range()?;
        if self.num_averaging_slots == 0 {
            return Err(FilterError::NoAveragingSlots);
        }
        GradientField::check_resolution(dimensions, self.gradient_resolution)
    }

    /// True when switching to `other` invalidates the accumulated buffers.
    pub fn layout_differs(&self, other: &FilterConfig) -> bool {
        self.num_averaging_slots != other.num_averaging_slots
            || self.gradient_resolution != other.gradient_resolution
            || self.depth_range != other.depth_range
            || self.valid_raw_range != other.valid_raw_range
    }
}
