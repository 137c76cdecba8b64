use image::{DynamicImage, RgbImage};
use imageproc::filter::median_filter;

const CONTRAST_BOOST: f32 = 20.0;
const UNSHARPEN_SIGMA: f32 = 1.0;
const UNSHARPEN_THRESHOLD: i32 = 2;
const SATURATION_BOOST: f32 = 1.1;
// 3x3 window
const MEDIAN_RADIUS: u32 = 1;

pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage, image::ImageError> {
    image::load_from_memory(bytes)
}

/// Contrast boost, mild sharpening, a saturation lift and median denoising
/// ahead of classification.
pub fn enhance_image(image: &DynamicImage) -> DynamicImage {
    let sharpened = DynamicImage::ImageRgb8(image.to_rgb8())
        .adjust_contrast(CONTRAST_BOOST)
        .unsharpen(UNSHARPEN_SIGMA, UNSHARPEN_THRESHOLD)
        .to_rgb8();
    let saturated = boost_saturation(sharpened, SATURATION_BOOST);
    DynamicImage::ImageRgb8(remove_speckles(&saturated))
}

/// Pushes each channel away from the pixel's luma by `factor`.
fn boost_saturation(mut image: RgbImage, factor: f32) -> RgbImage {
    for pixel in image.pixels_mut() {
        let [r, g, b] = pixel.0.map(f32::from);
        let luma = 0.299 * r + 0.587 * g + 0.114 * b;
        pixel.0 = [r, g, b].map(|c| (luma + factor * (c - luma)).round().clamp(0.0, 255.0) as u8);
    }
    image
}

fn remove_speckles(image: &RgbImage) -> RgbImage {
    median_filter(image, MEDIAN_RADIUS, MEDIAN_RADIUS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;

    #[test]
    fn decodes_png_and_rejects_garbage() {
        let image = RgbImage::from_pixel(8, 6, Rgb([120, 60, 30]));
        let mut bytes = Vec::new();
        DynamicImage::ImageRgb8(image)
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();

        let decoded = decode_image(&bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (8, 6));
        assert!(decode_image(b"definitely not an image").is_err());
    }

    #[test]
    fn enhancement_keeps_dimensions() {
        let image = DynamicImage::ImageRgb8(RgbImage::from_fn(16, 9, |x, y| {
            Rgb([(x * 10) as u8, (y * 20) as u8, 128])
        }));
        let enhanced = enhance_image(&image);
        assert_eq!((enhanced.width(), enhanced.height()), (16, 9));
    }

    #[test]
    fn isolated_salt_pixel_is_smoothed_away() {
        let mut image = RgbImage::from_pixel(9, 9, Rgb([40, 90, 40]));
        image.put_pixel(4, 4, Rgb([255, 255, 255]));

        let smoothed = remove_speckles(&image);
        assert_eq!(*smoothed.get_pixel(4, 4), Rgb([40, 90, 40]));
        assert!(smoothed.pixels().all(|p| *p == Rgb([40, 90, 40])));
    }

    #[test]
    fn saturation_boost_spreads_channels_and_keeps_greys() {
        let mut image = RgbImage::new(2, 1);
        image.put_pixel(0, 0, Rgb([200, 100, 50]));
        image.put_pixel(1, 0, Rgb([128, 128, 128]));

        let boosted = boost_saturation(image, 1.1);
        let [r, g, b] = boosted.get_pixel(0, 0).0;
        assert!(r > 200 && b < 50);
        assert_eq!(g, 98);
        assert_eq!(*boosted.get_pixel(1, 0), Rgb([128, 128, 128]));
    }
}
