// THEORY:
// The `RingStatistics` store is the memory of the temporal layer. For every pixel
// it keeps the last N raw samples (one per averaging slot) together with three
// running accumulators: how many of those samples are valid, their sum, and the
// sum of their squares.
//
// Key architectural principles:
// 1.  **Incremental, never recomputed**: every write to a slot adds the new
//     sample's contribution and subtracts the evicted one. The accumulators
//     therefore always equal a full recomputation over the ring, at O(1) cost
//     per pixel whatever the window length.
// 2.  **Invalid marker contributes nothing**: all slots start at `255`. Warm-up
//     after setup or reset is not special-cased; evicting a marker simply
//     subtracts nothing.
// 3.  **Slot-major layout**: the ring is one flat buffer of
//     `num_slots * pixel_count` bytes, slot `s` occupying
//     `[s * pixel_count, (s + 1) * pixel_count)`. One slot is written per frame
//     and the slot index only ever moves forward.

use crate::core_modules::depth_sample::{INVALID_MARKER, RawSample, SampleGate};
use crate::error::FilterError;

/// Running accumulators for one pixel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PixelStatistics {
    pub valid_count: u32,
    pub sum: u64,
    pub sum_squares: u64,
}

impl PixelStatistics {
    #[inline]
    fn add(&mut self, sample: RawSample) {
        let value = sample as u64;
        self.valid_count += 1;
        self.sum += value;
        self.sum_squares += value * value;
    }

    #[inline]
    fn remove(&mut self, sample: RawSample) {
        let value = sample as u64;
        self.valid_count -= 1;
        self.sum -= value;
        self.sum_squares -= value * value;
    }

    /// Mean of the valid samples, if there are any.
    pub fn mean(&self) -> Option<f32> {
        (self.valid_count > 0).then(|| self.sum as f32 / self.valid_count as f32)
    }
}

/// Per-pixel sliding window of raw samples with running statistics.
pub struct RingStatistics {
    samples: Vec<RawSample>,
    statistics: Vec<PixelStatistics>,
    pixel_count: usize,
    num_slots: usize,
    slot_index: usize,
}

impl RingStatistics {
    pub fn new(pixel_count: usize, num_slots: usize) -> Result<Self, FilterError> {
        if num_slots == 0 {
            return Err(FilterError::NoAveragingSlots);
        }
        Ok(Self {
            samples: vec![INVALID_MARKER; num_slots * pixel_count],
            statistics: vec![PixelStatistics::default(); pixel_count],
            pixel_count,
            num_slots,
            slot_index: 0,
        })
    }

    /// Writes `new_sample` into the current slot of `pixel_index` and returns
    /// the sample it replaced.
    ///
    /// An accepted sample is stored and counted. A rejected one either stores
    /// the invalid marker (dropping whatever was evicted) or, with
    /// `retain_valids`, leaves the slot and its contribution in place.
    #[inline]
    pub fn ingest(
        &mut self,
        pixel_index: usize,
        new_sample: RawSample,
        gate: &SampleGate,
        retain_valids: bool,
    ) -> RawSample {
        let slot = self.slot_index * self.pixel_count + pixel_index;
        let old_sample = self.samples[slot];
        let stats = &mut self.statistics[pixel_index];

        if gate.accepts(new_sample) {
            self.samples[slot] = new_sample;
            stats.add(new_sample);
            if old_sample != INVALID_MARKER {
                stats.remove(old_sample);
            }
        } else if !retain_valids {
            self.samples[slot] = INVALID_MARKER;
            if old_sample != INVALID_MARKER {
                stats.remove(old_sample);
            }
        }

        old_sample
    }

    /// Moves to the next averaging slot. Called once per processed frame.
    pub fn advance(&mut self) {
        self.slot_index += 1;
        if self.slot_index == self.num_slots {
            self.slot_index = 0;
        }
    }

    #[inline]
    pub fn statistics(&self, pixel_index: usize) -> PixelStatistics {
        self.statistics[pixel_index]
    }

    /// The samples currently held for one pixel, in slot order.
    pub fn history(&self, pixel_index: usize) -> impl Iterator<Item = RawSample> + '_ {
        self.samples
            .iter()
            .skip(pixel_index)
            .step_by(self.pixel_count)
            .copied()
    }

    /// Statistics rebuilt from the ring contents alone.
    pub fn recompute(&self, pixel_index: usize) -> PixelStatistics {
        let mut stats = PixelStatistics::default();
        for sample in self.history(pixel_index) {
            if sample != INVALID_MARKER {
                stats.add(sample);
            }
        }
        stats
    }

    pub fn slot_index(&self) -> usize {
        self.slot_index
    }

    pub fn num_slots(&self) -> usize {
        self.num_slots
    }

    pub fn pixel_count(&self) -> usize {
        self.pixel_count
    }
}
