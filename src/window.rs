use crate::quantize;

use image::RgbaImage;
use ndarray::{Array3, ArrayView2};

const OPAQUE: u32 = 0xFF00_0000;

/// A set of visualization window level parameters
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct WindowLevel {
    width: f64,
    center: f64,
}

impl WindowLevel {
    /// Create a window, flooring `width` at 1
    pub fn new(width: f64, center: f64) -> Self {
        let mut window = Self { width: 1.0, center };
        window.set_width(width);
        window
    }

    /// Window covering the whole intensity range of `data`: the width is
    /// `max - min` and the center is `(max + min)` floor-divided by 2.
    pub fn auto(data: &Array3<i32>) -> Option<Self> {
        let min = i64::from(*data.iter().min()?);
        let max = i64::from(*data.iter().max()?);
        Some(Self::new((max - min) as f64, (max + min).div_euclid(2) as f64))
    }

    pub fn width(&self) -> f64 {
        self.width
    }

    pub fn center(&self) -> f64 {
        self.center
    }

    /// Set the width. Values below 1 (and NaN) are stored as 1.
    pub fn set_width(&mut self, width: f64) -> f64 {
        self.width = if width >= 1.0 { width } else { 1.0 };
        self.width
    }

    pub fn set_center(&mut self, center: f64) {
        self.center = center;
    }

    /// `(left, right)` edges of the linear ramp
    pub fn bounds(&self) -> (f64, f64) {
        let half = self.width / 2.0;
        (self.center - half, self.center + half)
    }

    /// Display intensity of one calibrated value
    #[inline]
    pub fn intensity(&self, value: i32, invert: bool) -> u8 {
        let (left, right) = self.bounds();
        let value = f64::from(value);
        let (below, above) = if invert { (255.0, 0.0) } else { (0.0, 255.0) };
        let level = if value < left {
            below
        } else if value > right {
            above
        } else if invert {
            255.0 * (right - value) / (right - left)
        } else {
            255.0 * (value - left) / (right - left)
        };
        quantize::to_display(level)
    }
}

impl Default for WindowLevel {
    fn default() -> Self {
        Self::new(1000.0, 0.0)
    }
}

/// Pack a grey level as `0xAARRGGBB` with full alpha and `R = G = B`.
#[inline]
pub fn pack_gray(intensity: u8) -> u32 {
    let i = u32::from(intensity);
    OPAQUE | (i << 16) | (i << 8) | i
}

/// A rendered slice, one packed `0xAARRGGBB` word per pixel in row-major order
#[derive(Debug, Clone, PartialEq)]
pub struct PackedImage {
    width: u32,
    height: u32,
    pixels: Vec<u32>,
}

impl PackedImage {
    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u32] {
        &self.pixels
    }

    pub fn into_pixels(self) -> Vec<u32> {
        self.pixels
    }

    pub fn get_pixel(&self, x: u32, y: u32) -> Option<u32> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.pixels.get((y * self.width + x) as usize).copied()
    }

    /// Unpack into an RGBA image, e.g. for saving
    pub fn to_rgba_image(&self) -> Option<RgbaImage> {
        let bytes: Vec<u8> = self
            .pixels
            .iter()
            .flat_map(|&p| {
                let [a, r, g, b] = p.to_be_bytes();
                [r, g, b, a]
            })
            .collect();
        RgbaImage::from_raw(self.width, self.height, bytes)
    }
}

pub struct WindowTransform;

impl WindowTransform {
    /// Render one `(rows, columns)` plane through the window
    pub fn render(plane: &ArrayView2<'_, i32>, window: &WindowLevel, invert: bool) -> PackedImage {
        let (height, width) = plane.dim();
        let pixels = plane
            .iter()
            .map(|&v| pack_gray(window.intensity(v, invert)))
            .collect();
        PackedImage {
            width: width as u32,
            height: height as u32,
            pixels,
        }
    }
}
