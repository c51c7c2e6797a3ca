use crate::{enums::Modality, quantize, slice::SourceSlice, volume::Volume};

use ndarray::{Array3, ArrayView2, ArrayView3, Axis, Ix2, Ix3, Zip, s};
use thiserror::Error;

const LUMA_WEIGHTS: [f64; 3] = [0.2989, 0.5870, 0.1140];

#[derive(Debug, Error, PartialEq)]
pub enum IngestError {
    #[error("No slices given")]
    NoSlices,

    #[error("Unsupported modality: {0:?}")]
    UnsupportedModality(String),

    #[error("Missing pixel data")]
    MissingPixelData,

    #[error("Unsupported pixel layout (rank {rank}, {samples} samples per pixel)")]
    UnsupportedLayout { rank: usize, samples: u16 },

    #[error("Inconsistent image dimensions")]
    InconsistentDimensions,
}

/// How the source slices map onto the canonical `(rows, columns, depth)`
/// volume. Selected from the first slice's array rank and channel count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestStrategy {
    /// Each slice holds one `(rows, columns)` plane.
    Planes,
    /// Each slice holds one `(rows, columns, 3)` RGB plane, reduced to luma.
    Color,
    /// The first slice holds every frame as `(frames, rows, columns)`.
    MultiFrame { frames: usize },
}

impl IngestStrategy {
    pub fn select(first: &SourceSlice) -> Result<Self, IngestError> {
        let pixels = first.pixels().ok_or(IngestError::MissingPixelData)?;
        let samples = first.samples_per_pixel.unwrap_or(1);
        let rank = pixels.ndim();

        if first.frames() > 1 {
            let declared = first.frames() as usize;
            return match pixels.shape() {
                [frames, _, _] if *frames == declared => Ok(Self::MultiFrame { frames: declared }),
                [_, _, _] => Err(IngestError::InconsistentDimensions),
                _ => Err(IngestError::UnsupportedLayout { rank, samples }),
            };
        }

        match (rank, samples) {
            (2, _) => Ok(Self::Planes),
            (3, 3) => Ok(Self::Color),
            (3, _) => Ok(Self::MultiFrame {
                frames: pixels.shape()[0],
            }),
            _ => Err(IngestError::UnsupportedLayout { rank, samples }),
        }
    }

    /// Number of planes the canonical volume will have
    pub fn depth(&self, slices: &[SourceSlice]) -> usize {
        match self {
            Self::Planes | Self::Color => slices.len(),
            Self::MultiFrame { frames } => *frames,
        }
    }

    fn build(&self, slices: &[SourceSlice]) -> Result<Array3<i32>, IngestError> {
        match self {
            Self::Planes => {
                let planes = slices
                    .iter()
                    .map(plane_of)
                    .collect::<Result<Vec<_>, _>>()?;
                stack_planes(&planes, |dst, plane| {
                    Zip::from(dst)
                        .and(plane)
                        .for_each(|d, &v| *d = quantize::to_intensity(v));
                })
            }
            Self::Color => {
                let planes = slices
                    .iter()
                    .map(rgb_of)
                    .collect::<Result<Vec<_>, _>>()?;
                let planes_2d: Vec<_> = planes.iter().map(|p| p.index_axis(Axis(2), 0)).collect();
                let mut volume = stack_planes(&planes_2d, |_, _| {})?;
                for (i, rgb) in planes.iter().enumerate() {
                    Zip::from(volume.slice_mut(s![.., .., i]))
                        .and(rgb.lanes(Axis(2)))
                        .for_each(|d, px| *d = quantize::to_intensity(luma(px[0], px[1], px[2])));
                }
                Ok(volume)
            }
            Self::MultiFrame { .. } => {
                let frames = slices[0]
                    .pixels()
                    .ok_or(IngestError::MissingPixelData)?
                    .into_dimensionality::<Ix3>()
                    .map_err(|_| IngestError::InconsistentDimensions)?;
                Ok(frames
                    .permuted_axes([1, 2, 0])
                    .mapv(quantize::to_intensity))
            }
        }
    }
}

#[inline]
fn luma(r: f64, g: f64, b: f64) -> f64 {
    r * LUMA_WEIGHTS[0] + g * LUMA_WEIGHTS[1] + b * LUMA_WEIGHTS[2]
}

fn plane_of(slice: &SourceSlice) -> Result<ArrayView2<'_, f64>, IngestError> {
    slice
        .pixels()
        .ok_or(IngestError::MissingPixelData)?
        .into_dimensionality::<Ix2>()
        .map_err(|_| IngestError::InconsistentDimensions)
}

fn rgb_of(slice: &SourceSlice) -> Result<ArrayView3<'_, f64>, IngestError> {
    let rgb = slice
        .pixels()
        .ok_or(IngestError::MissingPixelData)?
        .into_dimensionality::<Ix3>()
        .map_err(|_| IngestError::InconsistentDimensions)?;
    if rgb.shape()[2] < 3 {
        return Err(IngestError::InconsistentDimensions);
    }
    Ok(rgb)
}

/// Allocate a `(rows, columns, depth)` volume and fill each plane with `fill`
fn stack_planes<F>(planes: &[ArrayView2<'_, f64>], mut fill: F) -> Result<Array3<i32>, IngestError>
where
    F: FnMut(ndarray::ArrayViewMut2<'_, i32>, &ArrayView2<'_, f64>),
{
    let (rows, columns) = planes[0].dim();
    if planes.iter().any(|plane| plane.dim() != (rows, columns)) {
        return Err(IngestError::InconsistentDimensions);
    }

    let mut volume = Array3::<i32>::zeros((rows, columns, planes.len()));
    for (i, plane) in planes.iter().enumerate() {
        fill(volume.slice_mut(s![.., .., i]), plane);
    }
    Ok(volume)
}

pub struct SliceIngestor;

impl SliceIngestor {
    /// Build the canonical volume from an ordered list of slices
    ///
    /// # Arguments
    ///
    /// * `slices` - Source slices in display order
    /// * `modalities` - Modalities accepted for the first slice
    ///
    /// # Errors
    ///
    /// Returns error if the modality is not accepted, pixel data is missing
    /// or the slices do not share one layout
    pub fn ingest(slices: &[SourceSlice], modalities: &[Modality]) -> Result<Volume, IngestError> {
        let first = slices.first().ok_or(IngestError::NoSlices)?;

        let supported = first
            .modality
            .parse::<Modality>()
            .is_ok_and(|modality| modalities.contains(&modality));
        if !supported {
            return Err(IngestError::UnsupportedModality(first.modality.clone()));
        }

        let strategy = IngestStrategy::select(first)?;
        log::debug!(
            "Ingesting {} slice(s) as {:?} into {} plane(s)",
            slices.len(),
            strategy,
            strategy.depth(slices)
        );

        let data = strategy.build(slices)?;
        let spacing = Self::get_spacing(first);
        let multiframe = matches!(strategy, IngestStrategy::MultiFrame { .. });

        Ok(Volume::new(data, spacing, multiframe))
    }

    /// Physical voxel size `(row_mm, col_mm, depth_mm)`.
    ///
    /// Pixel spacing with a slice thickness wins, then image plane pixel
    /// spacing with unit depth, then `(1, 1, 1)`.
    pub fn get_spacing(slice: &SourceSlice) -> (f64, f64, f64) {
        let positive = |v: f64| v.is_finite() && v > 0.0;

        if let (Some([row, col]), Some(thickness)) = (slice.pixel_spacing, slice.slice_thickness) {
            if positive(row) && positive(col) && positive(thickness) {
                return (row, col, thickness);
            }
            log::debug!("Ignoring non-positive pixel spacing ({row}, {col}, {thickness})");
        }

        if let Some([row, col]) = slice.image_plane_pixel_spacing {
            if positive(row) && positive(col) {
                return (row, col, 1.0);
            }
            log::debug!("Ignoring non-positive image plane pixel spacing ({row}, {col})");
        }

        (1.0, 1.0, 1.0)
    }
}
