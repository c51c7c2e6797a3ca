use crate::aggregate::{Aggregator, Scaler};
use crate::enums::{AveragePolicy, Modality};
use crate::ingest::SliceIngestor;
use crate::slice::SourceSlice;
use crate::window::{PackedImage, WindowLevel, WindowTransform};

use ndarray::Array3;
use ndarray::ArrayView2;
use ndarray::Axis;

/// Canonical intensity volume laid out as `(rows, columns, depth)`.
#[derive(Debug, Clone)]
pub struct Volume {
    data: Array3<i32>,
    pub spacing: (f64, f64, f64),
    /// Voxel edge coordinates per dimension, `dim + 1` entries each.
    pub axes: [Vec<f64>; 3],
    /// Built from one multi-frame slice rather than one slice per plane.
    pub multiframe: bool,
}

impl Volume {
    pub fn new(data: Array3<i32>, spacing: (f64, f64, f64), multiframe: bool) -> Self {
        let (rows, columns, depth) = data.dim();
        let axes = [
            Self::axis(rows, spacing.0),
            Self::axis(columns, spacing.1),
            Self::axis(depth, spacing.2),
        ];
        Self {
            data,
            spacing,
            axes,
            multiframe,
        }
    }

    fn axis(len: usize, spacing: f64) -> Vec<f64> {
        (0..=len).map(|i| i as f64 * spacing).collect()
    }

    /// Get the dimensions of the volume (rows, columns, depth)
    pub fn dim(&self) -> (usize, usize, usize) {
        self.data.dim()
    }

    pub fn depth(&self) -> usize {
        self.data.len_of(Axis(2))
    }

    /// Get a reference to the underlying data
    pub fn data(&self) -> &Array3<i32> {
        &self.data
    }

    pub fn get_slice(&self, index: usize) -> Option<ArrayView2<'_, i32>> {
        (index < self.depth()).then(|| self.data.index_axis(Axis(2), index))
    }
}

/// Settings of a [`VolumeModel`]
#[derive(Debug, Clone)]
pub struct ImagerOptions {
    /// Modalities accepted at load time
    pub modalities: Vec<Modality>,
    pub average: AveragePolicy,
    /// Window in effect before the first auto-window
    pub initial_window: WindowLevel,
}

impl Default for ImagerOptions {
    fn default() -> Self {
        Self {
            modalities: Modality::ALL.to_vec(),
            average: AveragePolicy::default(),
            initial_window: WindowLevel::default(),
        }
    }
}

/// The loaded series together with its view state.
///
/// A model whose slices could not be ingested is empty: it renders nothing and
/// ignores commands.
#[derive(Debug, Clone)]
pub struct VolumeModel {
    slices: Vec<SourceSlice>,
    volume: Option<Volume>,
    index: usize,
    window: WindowLevel,
    invert: bool,
    options: ImagerOptions,
}

impl VolumeModel {
    pub fn new(slices: Vec<SourceSlice>) -> Self {
        Self::with_options(slices, ImagerOptions::default())
    }

    pub fn with_options(slices: Vec<SourceSlice>, options: ImagerOptions) -> Self {
        let volume = match SliceIngestor::ingest(&slices, &options.modalities) {
            Ok(volume) => {
                log::info!("Loaded volume {:?} with spacing {:?}", volume.dim(), volume.spacing);
                Some(volume)
            }
            Err(err) => {
                log::warn!("No volume loaded: {err}");
                None
            }
        };

        let mut model = Self {
            slices,
            index: volume.as_ref().map_or(0, |v| v.depth() / 2),
            volume,
            window: options.initial_window,
            invert: false,
            options,
        };
        model.auto_window();
        model
    }

    pub fn is_loaded(&self) -> bool {
        self.volume.is_some()
    }

    pub fn volume(&self) -> Option<&Volume> {
        self.volume.as_ref()
    }

    pub fn slices(&self) -> &[SourceSlice] {
        &self.slices
    }

    pub fn into_slices(self) -> Vec<SourceSlice> {
        self.slices
    }

    pub fn options(&self) -> &ImagerOptions {
        &self.options
    }

    /// Number of planes, 0 when nothing is loaded
    pub fn depth(&self) -> usize {
        self.volume.as_ref().map_or(0, Volume::depth)
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Select the displayed plane, clamped into `[0, depth - 1]`
    pub fn set_index(&mut self, index: i64) -> usize {
        let last = self.depth().saturating_sub(1);
        self.index = index.clamp(0, last as i64) as usize;
        self.index
    }

    pub fn window(&self) -> WindowLevel {
        self.window
    }

    pub fn window_width(&self) -> f64 {
        self.window.width()
    }

    /// Set the window width, floored at 1
    pub fn set_window_width(&mut self, width: f64) -> f64 {
        self.window.set_width(width)
    }

    pub fn window_center(&self) -> f64 {
        self.window.center()
    }

    pub fn set_window_center(&mut self, center: f64) {
        self.window.set_center(center);
    }

    pub fn invert(&self) -> bool {
        self.invert
    }

    pub fn set_invert(&mut self, invert: bool) {
        self.invert = invert;
    }

    /// Render plane `index` through the current window
    pub fn get_image(&self, index: usize) -> Option<PackedImage> {
        let plane = self.volume.as_ref()?.get_slice(index)?;
        Some(WindowTransform::render(&plane, &self.window, self.invert))
    }

    pub fn get_current_image(&self) -> Option<PackedImage> {
        self.get_image(self.index)
    }

    /// Fit the window to the intensity range of the whole volume
    pub fn auto_window(&mut self) {
        if let Some(window) = self.volume.as_ref().and_then(|v| WindowLevel::auto(v.data())) {
            self.window = window;
        }
    }

    /// Collapse all planes into their calibrated sum
    pub fn sum_images(&mut self) {
        let Some(volume) = self.volume.as_ref() else {
            return;
        };
        if let Some(summed) = Aggregator::sum(volume, &mut self.slices) {
            self.replace_collapsed(summed);
        }
    }

    /// Collapse all planes into their mean
    pub fn avg_images(&mut self) {
        let Some(volume) = self.volume.as_ref() else {
            return;
        };
        if let Some(mean) = Aggregator::average(volume, &mut self.slices, self.options.average) {
            self.replace_collapsed(mean);
        }
    }

    /// Multiply every voxel by `factor`
    pub fn scale_images(&mut self, factor: f64) {
        let Some(volume) = self.volume.as_ref() else {
            return;
        };
        if let Some(scaled) = Scaler::scale(volume, &mut self.slices, factor) {
            self.volume = Some(scaled);
            self.auto_window();
        }
    }

    fn replace_collapsed(&mut self, volume: Volume) {
        self.volume = Some(volume);
        self.set_index(0);
        self.auto_window();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn stack(depth: usize) -> VolumeModel {
        let slices = (0..depth)
            .map(|i| {
                let plane = Array2::from_elem((2, 2), (i * 10) as f64);
                SourceSlice::from_plane("CT", plane.into_dyn())
            })
            .collect();
        VolumeModel::new(slices)
    }

    #[test]
    fn opens_mid_stack_with_auto_window() {
        let model = stack(5);
        assert_eq!(model.index(), 2);
        assert_eq!(model.window_width(), 40.0);
        assert_eq!(model.window_center(), 20.0);
        assert!(!model.invert());
    }

    #[test]
    fn index_is_clamped() {
        let mut model = stack(4);
        assert_eq!(model.set_index(4), 3);
        assert_eq!(model.set_index(-5), 0);
        assert_eq!(model.set_index(2), 2);
        assert_eq!(model.index(), 2);
    }

    #[test]
    fn window_width_is_floored() {
        let mut model = stack(2);
        assert_eq!(model.set_window_width(0.0), 1.0);
        assert_eq!(model.set_window_width(-3.0), 1.0);
        model.set_window_center(-12.5);
        assert_eq!(model.window_center(), -12.5);
    }

    #[test]
    fn axes_follow_spacing() {
        let mut slice = SourceSlice::from_plane("CT", Array2::<f64>::zeros((2, 3)).into_dyn());
        slice.pixel_spacing = Some([0.5, 2.0]);
        slice.slice_thickness = Some(3.0);
        let model = VolumeModel::new(vec![slice]);
        let volume = model.volume().unwrap();

        assert_eq!(volume.axes[0], vec![0.0, 0.5, 1.0]);
        assert_eq!(volume.axes[1], vec![0.0, 2.0, 4.0, 6.0]);
        assert_eq!(volume.axes[2], vec![0.0, 3.0]);
    }

    #[test]
    fn empty_model_is_inert() {
        let mut model = VolumeModel::new(vec![SourceSlice::from_plane(
            "SR",
            Array2::<f64>::zeros((2, 2)).into_dyn(),
        )]);

        assert!(!model.is_loaded());
        assert!(model.get_current_image().is_none());
        assert_eq!(model.set_index(7), 0);
        assert_eq!(model.window_width(), 1000.0);

        model.sum_images();
        model.avg_images();
        model.scale_images(2.0);
        assert!(model.volume().is_none());
        assert_eq!(model.slices().len(), 1);
    }

    #[test]
    fn flat_volume_keeps_a_usable_window() {
        let model = VolumeModel::new(vec![SourceSlice::from_plane(
            "CT",
            Array2::<f64>::from_elem((2, 2), 7.0).into_dyn(),
        )]);
        assert_eq!(model.window_width(), 1.0);
        assert_eq!(model.window_center(), 7.0);
        assert!(model.get_current_image().is_some());
    }

    #[test]
    fn invert_flips_rendering() {
        let mut model = stack(3);
        let plain = model.get_image(0).unwrap();
        model.set_invert(true);
        let inverted = model.get_image(0).unwrap();

        assert_eq!(plain.pixels()[0], 0xFF00_0000);
        assert_eq!(inverted.pixels()[0], 0xFFFF_FFFF);
        assert!(model.get_image(3).is_none());
    }
}
