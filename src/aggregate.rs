//! Whole-volume commands: collapsing the planes (sum, average) and scaling.
//!
//! Each command reads the current volume, writes the re-quantized pixels back
//! onto the retained source slices and returns the replacement volume.

use crate::enums::{AveragePolicy, Polarity};
use crate::quantize;
use crate::slice::{Calibration, SourceSlice};
use crate::volume::Volume;

use ndarray::{Array2, Axis, Zip};

const STORED_MAX: f64 = u16::MAX as f64;

pub struct Aggregator;

impl Aggregator {
    /// Sum the calibrated planes into a single plane.
    ///
    /// The sum is recalibrated so that it spans the full u16 range; only the
    /// first slice is kept and receives the new calibration.
    pub fn sum(volume: &Volume, slices: &mut Vec<SourceSlice>) -> Option<Volume> {
        let (total, polarity) = Self::calibrated_sum(volume, slices)?;
        let (stored, calibration) = Self::recalibrate(&total, polarity);
        log::info!(
            "Summed {} plane(s): slope {}, intercept {}, polarity {:?}",
            volume.depth(),
            calibration.slope,
            calibration.intercept,
            calibration.polarity
        );
        Some(Self::collapse(volume, slices, stored, Some(calibration)))
    }

    /// Average the planes into a single plane.
    ///
    /// With [`AveragePolicy::Raw`] the stored intensities are averaged and the
    /// calibration is left untouched. With [`AveragePolicy::Calibrated`] the
    /// calibrated planes are averaged and recalibrated like [`Self::sum`].
    pub fn average(
        volume: &Volume,
        slices: &mut Vec<SourceSlice>,
        policy: AveragePolicy,
    ) -> Option<Volume> {
        let depth = volume.depth();
        match policy {
            AveragePolicy::Raw => {
                let mean = volume.data().mapv(f64::from).mean_axis(Axis(2))?;
                let stored = mean.mapv(quantize::to_stored);
                log::info!("Averaged {depth} plane(s)");
                Some(Self::collapse(volume, slices, stored, None))
            }
            AveragePolicy::Calibrated => {
                let (total, polarity) = Self::calibrated_sum(volume, slices)?;
                let mean = total / depth as f64;
                let (stored, calibration) = Self::recalibrate(&mean, polarity);
                log::info!(
                    "Averaged {depth} calibrated plane(s): slope {}, intercept {}",
                    calibration.slope,
                    calibration.intercept
                );
                Some(Self::collapse(volume, slices, stored, Some(calibration)))
            }
        }
    }

    /// Calibration applying to plane `index`. A multi-frame volume shares the
    /// calibration of its single slice.
    fn calibration_for(slices: &[SourceSlice], index: usize) -> Calibration {
        slices
            .get(index)
            .or_else(|| slices.first())
            .map(SourceSlice::calibration)
            .unwrap_or_default()
    }

    /// Elementwise sum of `value * slope + intercept` over all planes, with the
    /// polarity of the last plane.
    fn calibrated_sum(volume: &Volume, slices: &[SourceSlice]) -> Option<(Array2<f64>, Polarity)> {
        let (rows, columns, depth) = volume.dim();
        if depth == 0 {
            return None;
        }

        let mut total = Array2::<f64>::zeros((rows, columns));
        let mut polarity = Polarity::default();
        for (i, plane) in volume.data().axis_iter(Axis(2)).enumerate() {
            let calibration = Self::calibration_for(slices, i);
            Zip::from(&mut total)
                .and(&plane)
                .for_each(|t, &v| *t += calibration.apply(f64::from(v)));
            polarity = calibration.polarity;
        }
        Some((total, polarity))
    }

    /// Map `image` onto `[0, 65535]` and return the stored values with the
    /// calibration that converts them back.
    ///
    /// Positive polarity anchors the intercept at the minimum, negative
    /// polarity at the maximum. A flat image gets a unit slope.
    pub fn recalibrate(image: &Array2<f64>, polarity: Polarity) -> (Array2<u16>, Calibration) {
        let (min, max) = image
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));

        let (intercept, slope) = match polarity {
            Polarity::Positive => (min, (max - min) / STORED_MAX),
            Polarity::Negative => (max, (min - max) / STORED_MAX),
        };
        let slope = if slope != 0.0 && slope.is_finite() {
            slope
        } else {
            log::debug!("Flat aggregate image, using unit slope");
            f64::from(polarity.sign())
        };

        let stored = image.mapv(|v| quantize::to_stored((v - intercept) / slope));
        (stored, Calibration::new(slope, intercept, polarity))
    }

    fn collapse(
        volume: &Volume,
        slices: &mut Vec<SourceSlice>,
        stored: Array2<u16>,
        calibration: Option<Calibration>,
    ) -> Volume {
        let data = stored.mapv(i32::from).insert_axis(Axis(2));
        slices.truncate(1);
        if let Some(first) = slices.first_mut() {
            first.store_pixels(stored.into_dyn());
            if let Some(calibration) = calibration {
                first.store_calibration(calibration);
            }
        }
        Volume::new(data, volume.spacing, false)
    }
}

pub struct Scaler;

impl Scaler {
    /// Multiply every voxel by `factor` and store the products as u16.
    ///
    /// Returns `None` and leaves everything untouched unless `factor` is a
    /// finite positive number.
    pub fn scale(volume: &Volume, slices: &mut [SourceSlice], factor: f64) -> Option<Volume> {
        if !(factor.is_finite() && factor > 0.0) {
            log::warn!("Ignoring scale factor {factor}");
            return None;
        }

        let scaled = volume.data().mapv(|v| f64::from(v) * factor);
        let stored = scaled.mapv(quantize::to_stored);

        if volume.multiframe {
            if let Some(first) = slices.first_mut() {
                first.store_pixels(stored.permuted_axes([2, 0, 1]).into_dyn());
            }
        } else {
            for (slice, plane) in slices.iter_mut().zip(stored.axis_iter(Axis(2))) {
                slice.store_pixels(plane.to_owned().into_dyn());
            }
        }

        log::info!("Scaled {} plane(s) by {factor}", volume.depth());
        Some(Volume::new(
            scaled.mapv(quantize::to_intensity),
            volume.spacing,
            volume.multiframe,
        ))
    }
}
