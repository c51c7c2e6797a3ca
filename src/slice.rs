use crate::enums::Polarity;

use ndarray::{ArrayD, ArrayViewD};

/// Linear conversion from stored pixel values to calibrated units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Calibration {
    pub slope: f64,
    pub intercept: f64,
    pub polarity: Polarity,
}

impl Calibration {
    pub fn new(slope: f64, intercept: f64, polarity: Polarity) -> Self {
        Self {
            slope,
            intercept,
            polarity,
        }
    }

    #[inline]
    pub fn apply(&self, value: f64) -> f64 {
        value * self.slope + self.intercept
    }
}

impl Default for Calibration {
    fn default() -> Self {
        Self::new(1.0, 0.0, Polarity::Positive)
    }
}

/// One source image as handed over by the file-format layer.
///
/// `pixels` holds the decoded stored values in one of these layouts:
///  - `(rows, columns)` for a single plane
///  - `(frames, rows, columns)` for a multi-frame image
///  - `(rows, columns, 3)` for an RGB plane (`samples_per_pixel == Some(3)`)
///
/// Optional fields mirror attributes that may be absent from the source.
#[derive(Debug, Clone, Default)]
pub struct SourceSlice {
    pub modality: String,
    pub pixels: Option<ArrayD<f64>>,
    pub number_of_frames: Option<u32>,
    pub rows: Option<u32>,
    pub columns: Option<u32>,
    pub pixel_spacing: Option<[f64; 2]>,
    pub image_plane_pixel_spacing: Option<[f64; 2]>,
    pub slice_thickness: Option<f64>,
    pub samples_per_pixel: Option<u16>,
    pub rescale_slope: Option<f64>,
    pub rescale_intercept: Option<f64>,
    pub rescale_type: Option<String>,
    pub pixel_intensity_relationship: Option<String>,
    pub pixel_intensity_relationship_sign: Option<i32>,
    /// Stored pixel bytes (little-endian u16) written back after an
    /// aggregation or scaling command.
    pub pixel_data: Option<Vec<u8>>,
}

impl SourceSlice {
    /// Single plane slice with the given modality
    pub fn from_plane(modality: &str, plane: ArrayD<f64>) -> Self {
        let shape = plane.shape().to_vec();
        Self {
            modality: modality.to_owned(),
            rows: shape.first().map(|&r| r as u32),
            columns: shape.get(1).map(|&c| c as u32),
            pixels: Some(plane),
            ..Default::default()
        }
    }

    pub fn pixels(&self) -> Option<ArrayViewD<'_, f64>> {
        self.pixels.as_ref().map(|p| p.view())
    }

    /// Declared frame count, treating an absent attribute as one frame
    pub fn frames(&self) -> u32 {
        self.number_of_frames.unwrap_or(1)
    }

    /// Calibration of this slice. Slope defaults to 1 and intercept to 0.
    /// Without an explicit relationship sign the polarity follows the sign of
    /// the slope.
    pub fn calibration(&self) -> Calibration {
        let slope = self.rescale_slope.unwrap_or(1.0);
        let intercept = self.rescale_intercept.unwrap_or(0.0);
        let polarity = self
            .pixel_intensity_relationship_sign
            .map(Polarity::from_sign)
            .unwrap_or_else(|| Polarity::from_slope(slope));
        Calibration::new(slope, intercept, polarity)
    }

    /// Replace the stored pixels with re-quantized values.
    ///
    /// `stored` is either `(rows, columns)` or `(frames, rows, columns)`.
    pub fn store_pixels(&mut self, stored: ArrayD<u16>) {
        let shape = stored.shape().to_vec();
        let (frames, rows, columns) = match shape.as_slice() {
            [rows, columns] => (None, *rows, *columns),
            [frames, rows, columns] => (Some(*frames), *rows, *columns),
            _ => {
                log::warn!("Refusing to store pixels with shape {shape:?}");
                return;
            }
        };

        let values: Vec<u16> = stored.iter().copied().collect();
        let bytes: Vec<u8> = if cfg!(target_endian = "little") {
            bytemuck::cast_slice::<u16, u8>(values.as_slice()).to_vec()
        } else {
            values.iter().flat_map(|v| v.to_le_bytes()).collect()
        };

        self.rows = Some(rows as u32);
        self.columns = Some(columns as u32);
        self.samples_per_pixel = Some(1);
        if frames.is_some() || self.number_of_frames.is_some() {
            self.number_of_frames = Some(frames.unwrap_or(1) as u32);
        }
        self.pixels = Some(stored.mapv(f64::from));
        self.pixel_data = Some(bytes);
    }

    /// Attach a new calibration after aggregation. The relationship tag and
    /// sign are only filled in when the source did not state them.
    pub fn store_calibration(&mut self, calibration: Calibration) {
        self.pixel_intensity_relationship
            .get_or_insert_with(|| "LIN".to_owned());
        self.pixel_intensity_relationship_sign
            .get_or_insert(calibration.polarity.sign());
        self.rescale_slope = Some(calibration.slope);
        self.rescale_intercept = Some(calibration.intercept);
        self.rescale_type = Some("CU".to_owned());
    }
}
