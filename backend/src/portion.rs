//! Portion-size heuristic based on the area of the dominant foreground region.

use image::DynamicImage;
use ndarray::Array2;
use std::collections::VecDeque;

/// Multiplier used when no region can be measured.
pub const DEFAULT_MULTIPLIER: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PortionEstimate {
    pub multiplier: f64,
    /// Largest region area over image area, `None` when nothing was found.
    pub relative_area: Option<f64>,
}

impl Default for PortionEstimate {
    fn default() -> Self {
        Self {
            multiplier: DEFAULT_MULTIPLIER,
            relative_area: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PortionEstimator {
    foreground_threshold: u8,
}

impl PortionEstimator {
    pub fn new(foreground_threshold: u8) -> Self {
        Self {
            foreground_threshold,
        }
    }

    pub fn estimate(&self, image: &DynamicImage) -> PortionEstimate {
        let intensity = intensity_map(image);
        let total_area = intensity.len();
        if total_area == 0 {
            return PortionEstimate::default();
        }

        match largest_region_area(&intensity, self.foreground_threshold) {
            0 => PortionEstimate::default(),
            area => {
                let relative_area = area as f64 / total_area as f64;
                PortionEstimate {
                    multiplier: multiplier_for(relative_area),
                    relative_area: Some(relative_area),
                }
            }
        }
    }
}

pub fn multiplier_for(relative_area: f64) -> f64 {
    if relative_area > 0.6 {
        1.5
    } else if relative_area > 0.3 {
        1.0
    } else if relative_area > 0.1 {
        0.7
    } else {
        0.5
    }
}

fn intensity_map(image: &DynamicImage) -> Array2<u8> {
    let gray = image.to_luma8();
    let (width, height) = gray.dimensions();
    Array2::from_shape_fn((height as usize, width as usize), |(y, x)| {
        gray.get_pixel(x as u32, y as u32)[0]
    })
}

/// Pixel count of the largest 4-connected region brighter than `threshold`.
fn largest_region_area(intensity: &Array2<u8>, threshold: u8) -> usize {
    let (height, width) = intensity.dim();
    let mut visited = Array2::from_elem((height, width), false);
    let mut queue = VecDeque::new();
    let mut largest = 0;

    for y in 0..height {
        for x in 0..width {
            if visited[[y, x]] || intensity[[y, x]] <= threshold {
                continue;
            }
            visited[[y, x]] = true;
            queue.push_back((y, x));
            let mut area = 0;

            while let Some((cy, cx)) = queue.pop_front() {
                area += 1;
                let neighbours = [
                    (cy.wrapping_sub(1), cx),
                    (cy + 1, cx),
                    (cy, cx.wrapping_sub(1)),
                    (cy, cx + 1),
                ];
                for (ny, nx) in neighbours {
                    if ny < height
                        && nx < width
                        && !visited[[ny, nx]]
                        && intensity[[ny, nx]] > threshold
                    {
                        visited[[ny, nx]] = true;
                        queue.push_back((ny, nx));
                    }
                }
            }
            largest = largest.max(area);
        }
    }
    largest
}
