// THEORY:
// The `GradientField` is the spatial summary handed to the simulation layer. It
// chops the filtered frame into square cells of `resolution` pixels and stores
// one slope vector per cell, a coarse "which way does the sand fall" map.
//
// Key principles:
// 1.  **Edge differencing**: a cell's horizontal slope compares its left and right
//     border columns row by row; the vertical slope compares its top and bottom
//     border rows column by column. Only pairs where both ends are non-zero
//     count, and the sum is averaged over the valid pairs and the cell size.
// 2.  **Sticky cells**: real frames have holes. When a cell has no valid pair
//     along either axis, it keeps last frame's vector rather than snapping to
//     zero, so agents do not suddenly lose their force field.
// 3.  **Bounded force**: slopes are scaled by the depth span between the
//     clipping planes and then clamped to a maximum magnitude, direction kept.

use crate::core_modules::depth_sample::FrameDimensions;
use crate::core_modules::filtered_frame::FilteredFrame;
use crate::error::FilterError;
use glam::Vec2;

/// Coarse grid of slope vectors, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct GradientField {
    cols: u32,
    rows: u32,
    resolution: u32,
    vectors: Vec<Vec2>,
}

impl GradientField {
    /// Allocates a zeroed field. `resolution` must evenly divide both frame
    /// dimensions.
    pub fn new(dimensions: FrameDimensions, resolution: u32) -> Result<Self, FilterError> {
        Self::check_resolution(dimensions, resolution)?;
        let (width, height) = (dimensions.width(), dimensions.height());
        let cols = width / resolution;
        let rows = height / resolution;
        Ok(Self {
            cols,
            rows,
            resolution,
            vectors: vec![Vec2::ZERO; (cols * rows) as usize],
        })
    }

    pub fn check_resolution(dimensions: FrameDimensions, resolution: u32) -> Result<(), FilterError> {
        let (width, height) = (dimensions.width(), dimensions.height());
        if resolution == 0 || width % resolution != 0 || height % resolution != 0 {
            return Err(FilterError::ResolutionNotDivisor {
                resolution,
                width,
                height,
            });
        }
        Ok(())
    }

    pub fn cols(&self) -> u32 {
        self.cols
    }

    pub fn rows(&self) -> u32 {
        self.rows
    }

    pub fn resolution(&self) -> u32 {
        self.resolution
    }

    pub fn vectors(&self) -> &[Vec2] {
        &self.vectors
    }

    pub fn get(&self, cx: u32, cy: u32) -> Vec2 {
        self.vectors[(cy * self.cols + cx) as usize]
    }

    /// Updates every cell that has enough data from `frame`.
    pub fn extract(&mut self, frame: &FilteredFrame, depth_span: f32, max_magnitude: f32) {
        let width = frame.dimensions().width() as usize;
        let data = frame.as_slice();
        for cy in 0..self.rows {
            for cx in 0..self.cols {
                if let Some(slope) = self.cell_slope(data, width, cx, cy) {
                    let gradient = (slope * depth_span).clamp_length_max(max_magnitude);
                    self.vectors[(cy * self.cols + cx) as usize] = gradient;
                }
            }
        }
    }

    /// Raw slope of one cell, or `None` when either axis has no valid pair.
    fn cell_slope(&self, data: &[f32], width: usize, cx: u32, cy: u32) -> Option<Vec2> {
        let r = self.resolution as usize;
        let x0 = cx as usize * r;
        let y0 = cy as usize * r;
        let x_right = x0 + r - 1;
        let y_bottom = y0 + r - 1;

        let mut horizontal = 0.0f32;
        let mut horizontal_count = 0u32;
        for y in y0..y0 + r {
            let left = data[y * width + x0];
            let right = data[y * width + x_right];
            if left != 0.0 && right != 0.0 {
                horizontal += left - right;
                horizontal_count += 1;
            }
        }

        let mut vertical = 0.0f32;
        let mut vertical_count = 0u32;
        for x in x0..x0 + r {
            let top = data[y0 * width + x];
            let bottom = data[y_bottom * width + x];
            if top != 0.0 && bottom != 0.0 {
                vertical += top - bottom;
                vertical_count += 1;
            }
        }

        if horizontal_count == 0 || vertical_count == 0 {
            return None;
        }
        let r = r as f32;
        Some(Vec2::new(
            horizontal / (r * horizontal_count as f32),
            vertical / (r * vertical_count as f32),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(width: u32, height: u32, f: impl Fn(u32, u32) -> f32) -> FilteredFrame {
        let dims = FrameDimensions::new(width, height).unwrap();
        let data = (0..height)
            .flat_map(|y| (0..width).map(move |x| (x, y)))
            .map(|(x, y)| f(x, y))
            .collect();
        FilteredFrame::new(dims, data).unwrap()
    }

    #[test]
    fn resolution_must_divide_frame() {
        let dims = FrameDimensions::new(20, 15).unwrap();
        assert!(GradientField::new(dims, 5).is_ok());
        assert!(matches!(
            GradientField::new(dims, 10),
            Err(FilterError::ResolutionNotDivisor { resolution: 10, .. })
        ));
        assert!(GradientField::new(dims, 0).is_err());
    }

    #[test]
    fn grid_size_follows_resolution() {
        let field = GradientField::new(FrameDimensions::new(640, 480).unwrap(), 10).unwrap();
        assert_eq!((field.cols(), field.rows()), (64, 48));
        assert_eq!(field.vectors().len(), 64 * 48);
    }

    #[test]
    fn flat_surface_has_zero_slope() {
        let f = frame(8, 8, |_, _| 100.0);
        let mut field = GradientField::new(f.dimensions(), 4).unwrap();
        field.extract(&f, 1.0, 100.0);
        assert!(field.vectors().iter().all(|v| *v == Vec2::ZERO));
    }

    #[test]
    fn ramp_produces_scaled_slope() {
        // Depth rises by 1 per column; left minus right over a 4-wide cell is -3.
        let f = frame(4, 4, |x, _| 10.0 + x as f32);
        let mut field = GradientField::new(f.dimensions(), 4).unwrap();
        field.extract(&f, 2.0, 100.0);
        let g = field.get(0, 0);
        // (-3 * 4 rows) / (4 * 4) * 2 = -1.5
        assert!((g.x + 1.5).abs() < 1e-5);
        assert_eq!(g.y, 0.0);
    }

    #[test]
    fn invalid_pairs_are_skipped() {
        // Left edge of row 0 is a hole; the remaining three rows still count.
        let f = frame(4, 4, |x, y| if x == 0 && y == 0 { 0.0 } else { 10.0 + x as f32 });
        let mut field = GradientField::new(f.dimensions(), 4).unwrap();
        field.extract(&f, 1.0, 100.0);
        let g = field.get(0, 0);
        // (-3 * 3) / (4 * 3) = -0.75
        assert!((g.x + 0.75).abs() < 1e-5);
    }

    #[test]
    fn cell_without_horizontal_pairs_keeps_previous_vector() {
        let ramp = frame(4, 4, |x, _| 10.0 + x as f32);
        let mut field = GradientField::new(ramp.dimensions(), 4).unwrap();
        field.extract(&ramp, 1.0, 100.0);
        let before = field.get(0, 0);
        assert_ne!(before, Vec2::ZERO);

        // The whole left column drops out.
        let holed = frame(4, 4, |x, y| if x == 0 { 0.0 } else { 50.0 + y as f32 });
        field.extract(&holed, 1.0, 100.0);
        assert_eq!(field.get(0, 0), before);
    }

    #[test]
    fn cell_without_vertical_pairs_keeps_previous_vector() {
        let ramp = frame(4, 4, |x, y| 10.0 + x as f32 + 2.0 * y as f32);
        let mut field = GradientField::new(ramp.dimensions(), 4).unwrap();
        field.extract(&ramp, 1.0, 100.0);
        let before = field.get(0, 0);
        assert_ne!(before.y, 0.0);

        // Horizontal pairs survive in the top rows, but the bottom row is gone.
        let holed = frame(4, 4, |x, y| if y == 3 { 0.0 } else { 90.0 - x as f32 });
        field.extract(&holed, 1.0, 100.0);
        assert_eq!(field.get(0, 0), before);
    }

    #[test]
    fn long_vectors_are_clamped_keeping_direction() {
        let f = frame(4, 4, |x, y| 10.0 + 3.0 * x as f32 + 4.0 * y as f32);
        let mut field = GradientField::new(f.dimensions(), 4).unwrap();
        field.extract(&f, 100.0, 5.0);
        let g = field.get(0, 0);
        assert!((g.length() - 5.0).abs() < 1e-4);
        let unclamped = Vec2::new(-3.0 * 3.0 / 4.0, -4.0 * 3.0 / 4.0).normalize();
        assert!((g.normalize() - unclamped).length() < 1e-5);
    }

    #[test]
    fn short_vectors_are_not_rescaled() {
        let f = frame(4, 4, |x, _| 10.0 + x as f32);
        let mut field = GradientField::new(f.dimensions(), 4).unwrap();
        field.extract(&f, 1.0, 10.0);
        assert!((field.get(0, 0).length() - 0.75).abs() < 1e-5);
    }
}
