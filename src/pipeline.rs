// THEORY:
// The `pipeline` module is the synchronous top-level API of the engine. A
// `DepthPipeline` owns every per-pixel buffer and runs the fixed three-stage
// pass over one raw frame at a time:
//
//   1. Temporal: each raw sample enters its pixel's averaging ring and the
//      stability classifier produces the pixel's output value.
//   2. Spatial: the optional separable smoother blurs the output frame in place.
//   3. Gradient: the smoothed frame is reduced to a coarse slope field.
//
// The pass is deterministic given the buffers and the configuration, touches no
// global state, and never fails once setup has validated the geometry. It is not
// safe to share: whoever calls `filter` owns the pipeline. The streaming runtime
// in `stream_pipeline` wraps it in a dedicated worker task.

use crate::config::FilterConfig;
use crate::core_modules::depth_sample::{FrameDimensions, SampleGate};
use crate::core_modules::filtered_frame::FilteredFrame;
use crate::core_modules::gradient_field::GradientField;
use crate::core_modules::ring_statistics::{PixelStatistics, RingStatistics};
use crate::core_modules::spatial_smoother;
use crate::core_modules::stability::{self, PixelState, StableValueBuffer};
use crate::error::FilterError;
use tracing::{debug, info};

// Re-export key data structures for the public API.
pub use crate::core_modules::stability::StabilityCriteria;

/// Per-frame counts of what the stability classifier decided.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameDiagnostics {
    /// Stable pixels whose reported value moved this frame.
    pub updated: usize,
    /// Stable pixels held inside the hysteresis band.
    pub held: usize,
    /// Unstable pixels reporting their last stable value.
    pub retained: usize,
    /// Unstable pixels reporting the sentinel.
    pub instable: usize,
}

impl FrameDiagnostics {
    fn record(&mut self, state: PixelState) {
        match state {
            PixelState::Updated => self.updated += 1,
            PixelState::Held => self.held += 1,
            PixelState::Retained => self.retained += 1,
            PixelState::Instable => self.instable += 1,
        }
    }

    pub fn stable(&self) -> usize {
        self.updated + self.held
    }
}

/// The buffers whose shape depends on layout parameters.
struct Buffers {
    ring: RingStatistics,
    stable_values: StableValueBuffer,
    gradients: GradientField,
}

impl Buffers {
    fn allocate(dimensions: FrameDimensions, config: &FilterConfig) -> Result<Self, FilterError> {
        let pixel_count = dimensions.pixel_count();
        Ok(Self {
            ring: RingStatistics::new(pixel_count, config.num_averaging_slots)?,
            stable_values: StableValueBuffer::new(pixel_count),
            gradients: GradientField::new(dimensions, config.gradient_resolution)?,
        })
    }
}

/// The depth-frame filtering and gradient-field engine.
pub struct DepthPipeline {
    dimensions: FrameDimensions,
    config: FilterConfig,
    buffers: Buffers,
    diagnostics: FrameDiagnostics,
    frames_processed: u64,
}

impl DepthPipeline {
    /// Validates the geometry and configuration and allocates every buffer.
    pub fn setup(width: u32, height: u32, config: FilterConfig) -> Result<Self, FilterError> {
        let dimensions = FrameDimensions::new(width, height)?;
        config.validate_depth_range()?;
        let buffers = Buffers::allocate(dimensions, &config)?;
        info!(
            width,
            height,
            averaging_slots = config.num_averaging_slots,
            gradient_resolution = config.gradient_resolution,
            "depth pipeline ready"
        );
        Ok(Self {
            dimensions,
            config,
            buffers,
            diagnostics: FrameDiagnostics::default(),
            frames_processed: 0,
        })
    }

    /// Runs one raw frame through the temporal, spatial and gradient stages.
    pub fn filter(&mut self, raw_frame: &[u8]) -> Result<(FilteredFrame, &GradientField), FilterError> {
        self.dimensions.check_len(raw_frame.len())?;

        let gate = SampleGate::new(self.config.valid_raw_range);
        let criteria = self.config.stability_criteria();
        let buffers = &mut self.buffers;
        let mut output = vec![0.0f32; raw_frame.len()];
        let mut diagnostics = FrameDiagnostics::default();

        // Pixels are independent, so ingest and classify share one sweep.
        for (index, (&sample, out)) in raw_frame.iter().zip(output.iter_mut()).enumerate() {
            buffers.ring.ingest(index, sample, &gate, criteria.retain_valids);
            let stats = buffers.ring.statistics(index);
            let (value, state) =
                stability::classify(&stats, buffers.stable_values.get_mut(index), &criteria);
            *out = value;
            diagnostics.record(state);
        }
        buffers.ring.advance();

        if self.config.spatial_filter_enabled {
            spatial_smoother::smooth(&mut output, self.dimensions, self.config.spatial_filter_passes);
        }

        let frame = FilteredFrame::new(self.dimensions, output)?;
        buffers.gradients.extract(
            &frame,
            self.config.depth_span(),
            self.config.max_gradient_magnitude,
        );

        self.diagnostics = diagnostics;
        self.frames_processed += 1;
        debug!(
            frame = self.frames_processed,
            stable = diagnostics.stable(),
            updated = diagnostics.updated,
            retained = diagnostics.retained,
            instable = diagnostics.instable,
            "filtered depth frame"
        );

        Ok((frame, &self.buffers.gradients))
    }

    /// Reallocates every buffer from the current configuration. On error the
    /// previous buffers stay in place.
    pub fn reset_buffers(&mut self) -> Result<(), FilterError> {
        self.config.validate_depth_range()?;
        self.buffers = Buffers::allocate(self.dimensions, &self.config)?;
        self.diagnostics = FrameDiagnostics::default();
        info!(
            averaging_slots = self.config.num_averaging_slots,
            gradient_resolution = self.config.gradient_resolution,
            near = self.config.depth_range.0,
            far = self.config.depth_range.1,
            "depth pipeline buffers reset"
        );
        Ok(())
    }

    /// Replaces the whole configuration, resetting buffers when a layout
    /// parameter changed. Returns whether a reset happened.
    pub fn apply_config(&mut self, config: FilterConfig) -> Result<bool, FilterError> {
        config.validate_depth_range()?;
        if !self.config.layout_differs(&config) {
            self.config = config;
            return Ok(false);
        }
        let buffers = Buffers::allocate(self.dimensions, &config)?;
        self.buffers = buffers;
        self.config = config;
        self.diagnostics = FrameDiagnostics::default();
        info!(
            averaging_slots = self.config.num_averaging_slots,
            gradient_resolution = self.config.gradient_resolution,
            "depth pipeline reconfigured"
        );
        Ok(true)
    }

    /// Sets the clipping planes used to scale gradients. Statistics gathered
    /// under the old range are kept until `reset_buffers`.
    pub fn set_depth_range(&mut self, near: f32, far: f32) -> Result<(), FilterError> {
        if far <= near {
            return Err(FilterError::InvalidDepthRange { near, far });
        }
        self.config.depth_range = (near, far);
        Ok(())
    }

    pub fn set_stable_parameters(&mut self, min_num_samples: u32, max_variance: u32) {
        self.config.min_num_samples = min_num_samples;
        self.config.max_variance = max_variance;
    }

    pub fn set_min_num_samples(&mut self, min_num_samples: u32) {
        self.config.min_num_samples = min_num_samples;
    }

    pub fn set_max_variance(&mut self, max_variance: u32) {
        self.config.max_variance = max_variance;
    }

    pub fn set_hysteresis(&mut self, hysteresis: f32) {
        self.config.hysteresis = hysteresis;
    }

    pub fn set_retain_valids(&mut self, retain_valids: bool) {
        self.config.retain_valids = retain_valids;
    }

    pub fn set_instable_value(&mut self, instable_value: f32) {
        self.config.instable_value = instable_value;
    }

    pub fn set_spatial_filter(&mut self, enabled: bool) {
        self.config.spatial_filter_enabled = enabled;
    }

    pub fn set_spatial_filter_passes(&mut self, passes: u32) {
        self.config.spatial_filter_passes = passes;
    }

    pub fn set_max_gradient_magnitude(&mut self, magnitude: f32) {
        self.config.max_gradient_magnitude = magnitude;
    }

    pub fn set_valid_raw_range(&mut self, low: u8, high: u8) {
        self.config.valid_raw_range = (low, high);
    }

    /// Takes effect on the next `reset_buffers`.
    pub fn set_num_averaging_slots(&mut self, slots: usize) {
        self.config.num_averaging_slots = slots;
    }

    /// Takes effect on the next `reset_buffers`.
    pub fn set_gradient_resolution(&mut self, resolution: u32) {
        self.config.gradient_resolution = resolution;
    }

    pub fn config(&self) -> &FilterConfig {
        &self.config
    }

    pub fn dimensions(&self) -> FrameDimensions {
        self.dimensions
    }

    pub fn gradient_field(&self) -> &GradientField {
        &self.buffers.gradients
    }

    pub fn statistics(&self, x: u32, y: u32) -> PixelStatistics {
        self.buffers.ring.statistics(self.dimensions.index(x, y))
    }

    pub fn recomputed_statistics(&self, x: u32, y: u32) -> PixelStatistics {
        self.buffers.ring.recompute(self.dimensions.index(x, y))
    }

    pub fn stable_value(&self, x: u32, y: u32) -> f32 {
        self.buffers.stable_values.get(self.dimensions.index(x, y))
    }

    pub fn stable_values(&self) -> &[f32] {
        self.buffers.stable_values.values()
    }

    pub fn slot_index(&self) -> usize {
        self.buffers.ring.slot_index()
    }

    /// Averaging depth of the live ring, which can lag the configuration
    /// until the next reset.
    pub fn active_averaging_slots(&self) -> usize {
        self.buffers.ring.num_slots()
    }

    pub fn diagnostics(&self) -> FrameDiagnostics {
        self.diagnostics
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames_processed
    }
}
