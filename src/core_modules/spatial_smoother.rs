// THEORY:
// A cheap separable low-pass over the filtered frame. Each pass runs a (1,2,1)/4
// kernel down every column, then along every row, in place. The first and last
// sample of a line have only one neighbour and use (2*self + neighbour)/3.
//
// The filter walks each line keeping a rolling copy of the previous sample's
// value from before this pass touched it, so a line is filtered as a true
// three-tap kernel without a scratch buffer. Across lines and passes it is
// strictly in place: the row pass reads what the column pass wrote, and the
// second repetition reads the first. Repeating twice approximates a wider blur.
//
// The smoother knows nothing about invalid values. Sentinel pixels are smoothed
// like any other number.

use crate::core_modules::depth_sample::FrameDimensions;

/// Runs `passes` column-then-row smoothing repetitions over `data` in place.
pub fn smooth(data: &mut [f32], dimensions: FrameDimensions, passes: u32) {
    let width = dimensions.width() as usize;
    let height = dimensions.height() as usize;
    debug_assert_eq!(data.len(), width * height);

    for _ in 0..passes {
        for x in 0..width {
            smooth_line(data, x, width, height);
        }
        for y in 0..height {
            smooth_line(data, y * width, 1, width);
        }
    }
}

/// Filters the `len` samples at `start, start + stride, ...`.
fn smooth_line(data: &mut [f32], start: usize, stride: usize, len: usize) {
    if len < 2 {
        return;
    }
    let at = |i: usize| start + i * stride;

    let mut last = data[at(0)];
    data[at(0)] = (data[at(0)] * 2.0 + data[at(1)]) / 3.0;

    for i in 1..len - 1 {
        let current = data[at(i)];
        data[at(i)] = (last + current * 2.0 + data[at(i + 1)]) * 0.25;
        last = current;
    }

    let end = at(len - 1);
    data[end] = (last + data[end] * 2.0) / 3.0;
}
