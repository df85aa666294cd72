// Bridges between engine frames and the `image` crate, for replaying recorded
// depth frames and dumping filtered output for inspection.

pub mod image_helper {
    use crate::core_modules::depth_sample::RawSample;
    use crate::core_modules::filtered_frame::FilteredFrame;
    use image::{GrayImage, ImageEncoder, Luma};
    use std::path::Path;

    /// Quantises a filtered frame into an 8-bit grayscale image.
    pub fn to_gray_image(frame: &FilteredFrame) -> GrayImage {
        let dims = frame.dimensions();
        let bytes = frame.to_raw_bytes();
        let width = dims.width();
        GrayImage::from_fn(dims.width(), dims.height(), |x, y| {
            Luma([bytes[(y * width + x) as usize]])
        })
    }

    /// Raw samples of a recorded grayscale depth image, row-major.
    pub fn raw_frame_from_image(image: &GrayImage) -> Vec<RawSample> {
        image.as_raw().clone()
    }

    pub fn save(path: impl AsRef<Path>, frame: &FilteredFrame) -> Result<(), image::ImageError> {
        let output = std::fs::File::create(path)?;
        let encoder = image::codecs::png::PngEncoder::new(output);
        let dims = frame.dimensions();

        encoder.write_image(
            &frame.to_raw_bytes(),
            dims.width(),
            dims.height(),
            image::ExtendedColorType::L8,
        )?;

        Ok(())
    }
}
