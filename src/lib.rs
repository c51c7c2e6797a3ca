//! # DICOM-imager library
//!
//! This crate turns the slices of a radiological image series (CT, NM, PET,
//! RT images, ...) into one calibrated intensity volume and renders any plane
//! of it through a brightness/contrast window.
//!
//! Slices are handed over as [`SourceSlice`] values, either built directly or
//! read from DICOM objects with the [`VolumeLoader`]. The [`VolumeModel`]
//! ingests them into a `(rows, columns, depth)` volume of signed 32-bit
//! intensities and keeps the view state next to it:
//!  - current plane index, clamped to the volume
//!  - window width (never below 1) and center
//!  - inversion flag
//!
//! Besides rendering, the model can collapse the series into a single plane:
//!  - sum, with each slice's rescale slope/intercept applied and the result
//!    recalibrated into the full u16 range
//!  - average, either of the stored values or of the calibrated values
//!  - scaling of all intensities by a constant factor
//!
//! The new pixels and calibration are written back onto the retained slices
//! so they can be stored again.
//!
//! Rendered planes are packed as `0xAARRGGBB` words with `R = G = B` and full
//! alpha, the layout expected by 32-bit RGB display surfaces.
//!
//! # Examples
//!
//! ## Rendering the middle plane of a series
//!
//! ```no_run
//! # use dicom_imager::{ImagerOptions, SortBy, VolumeLoader};
//! let series =
//!     VolumeLoader::load_from_directory("dicom", SortBy::InstanceNumber, ImagerOptions::default())
//!         .expect("should have loaded files from directory");
//! let image = series
//!     .model
//!     .get_current_image()
//!     .expect("should have rendered the middle plane");
//! image
//!     .to_rgba_image()
//!     .expect("should have matching buffer size")
//!     .save("result.png")
//!     .expect("should have written the image");
//! ```
//!
//! ## Summing a series of planes
//!
//! ```
//! # use dicom_imager::{SourceSlice, VolumeModel};
//! # use ndarray::array;
//! let slices = vec![
//!     SourceSlice::from_plane("NM", array![[10.0, 20.0]].into_dyn()),
//!     SourceSlice::from_plane("NM", array![[5.0, 15.0]].into_dyn()),
//! ];
//! let mut model = VolumeModel::new(slices);
//! model.sum_images();
//!
//! assert_eq!(model.depth(), 1);
//! assert_eq!(model.slices()[0].rescale_intercept, Some(15.0));
//! ```

pub mod aggregate;
pub mod enums;
pub mod ingest;
pub mod quantize;
pub mod shared;
pub mod slice;
pub mod volume;
pub mod volume_loader;
pub mod window;

pub use enums::{AveragePolicy, Modality, Polarity, SortBy};
pub use ingest::{IngestError, IngestStrategy, SliceIngestor};
pub use shared::SharedVolumeModel;
pub use slice::{Calibration, SourceSlice};
pub use volume::{ImagerOptions, Volume, VolumeModel};
pub use volume_loader::{LoadedSeries, VolumeLoader, VolumeLoaderError};
pub use window::{PackedImage, WindowLevel, WindowTransform};
