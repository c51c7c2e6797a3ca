use crate::{
    enums::SortBy,
    slice::SourceSlice,
    volume::{ImagerOptions, VolumeModel},
};

use dicom::{
    core::{DataElement, PrimitiveValue, Tag, VR},
    object::{FileDicomObject, InMemDicomObject, open_file},
    pixeldata::{ConvertOptions, ModalityLutOption, PixelDecoder, VoiLutOption},
    transfer_syntax::entries::EXPLICIT_VR_LITTLE_ENDIAN,
};
use dicom_dictionary_std::tags;
use ndarray::{ArrayD, Axis, s};
use rayon::prelude::*;
use std::{
    fs,
    ops::Deref,
    path::{Path, PathBuf},
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VolumeLoaderError {
    #[error("No valid DICOM images found")]
    NoValidImages,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("DICOM error: {0}")]
    Dicom(#[from] dicom::object::ReadError),

    #[error("DICOM write error: {0}")]
    Write(#[from] dicom::object::WriteError),

    #[error("Pixel data error: {0}")]
    PixelData(#[from] dicom::pixeldata::Error),
}

/// DICOM objects of a series and the model built from them.
pub struct LoadedSeries {
    pub objects: Vec<FileDicomObject<InMemDicomObject>>,
    pub model: VolumeModel,
}

impl LoadedSeries {
    /// Write the retained slices back onto their objects and drop the objects
    /// whose slices were discarded by an aggregation.
    ///
    /// Objects that receive new pixel data are switched to Explicit VR Little
    /// Endian, the encoding of the rewritten bytes.
    pub fn sync(&mut self) {
        let slices = self.model.slices();
        self.objects.truncate(slices.len());
        for (object, slice) in self.objects.iter_mut().zip(slices) {
            if slice.pixel_data.is_some() {
                object.meta_mut().set_transfer_syntax(&EXPLICIT_VR_LITTLE_ENDIAN);
            }
            slice.write_to_dicom(object);
        }
    }

    /// Write the objects as numbered .dcm files into `directory`
    ///
    /// # Errors
    ///
    /// Returns error if the directory cannot be created or a file cannot be
    /// written
    pub fn save_to_directory(
        &self,
        directory: impl AsRef<Path>,
    ) -> Result<Vec<PathBuf>, VolumeLoaderError> {
        let directory = directory.as_ref();
        fs::create_dir_all(directory)?;

        let mut written = Vec::with_capacity(self.objects.len());
        for (i, object) in self.objects.iter().enumerate() {
            let path = directory.join(format!("{i:04}.dcm"));
            object.write_to_file(&path)?;
            written.push(path);
        }
        log::info!("Wrote {} file(s) to {}", written.len(), directory.display());
        Ok(written)
    }
}

impl SourceSlice {
    /// Read attributes and decoded pixel data from a DICOM object.
    ///
    /// An object without PixelData yields a slice without pixels.
    ///
    /// # Errors
    ///
    /// Returns error if the pixel data is present but cannot be decoded
    pub fn from_dicom(
        object: &FileDicomObject<InMemDicomObject>,
    ) -> Result<Self, VolumeLoaderError> {
        let mut slice = Self::from_dicom_attributes(object);
        if object.element(tags::PIXEL_DATA).is_ok() {
            slice.pixels = Some(VolumeLoader::decode_pixels(object)?);
        }
        Ok(slice)
    }

    /// Read every attribute except the pixel data
    pub fn from_dicom_attributes(object: &InMemDicomObject) -> Self {
        Self {
            modality: read_str(object, tags::MODALITY).unwrap_or_default(),
            pixels: None,
            number_of_frames: read_u32(object, tags::NUMBER_OF_FRAMES),
            rows: read_u32(object, tags::ROWS),
            columns: read_u32(object, tags::COLUMNS),
            pixel_spacing: read_pair(object, tags::PIXEL_SPACING),
            image_plane_pixel_spacing: read_pair(object, tags::IMAGE_PLANE_PIXEL_SPACING),
            slice_thickness: read_f64(object, tags::SLICE_THICKNESS),
            samples_per_pixel: read_u32(object, tags::SAMPLES_PER_PIXEL)
                .and_then(|samples| u16::try_from(samples).ok()),
            rescale_slope: read_f64(object, tags::RESCALE_SLOPE),
            rescale_intercept: read_f64(object, tags::RESCALE_INTERCEPT),
            rescale_type: read_str(object, tags::RESCALE_TYPE),
            pixel_intensity_relationship: read_str(object, tags::PIXEL_INTENSITY_RELATIONSHIP),
            pixel_intensity_relationship_sign: read_i32(
                object,
                tags::PIXEL_INTENSITY_RELATIONSHIP_SIGN,
            ),
            pixel_data: None,
        }
    }

    /// Write re-quantized pixels and calibration back onto a DICOM object.
    ///
    /// Pixel attributes are only touched once [`SourceSlice::store_pixels`]
    /// has produced new pixel data. The bytes are little-endian and
    /// uncompressed; [`LoadedSeries::sync`] sets the matching transfer syntax
    /// on file objects.
    pub fn write_to_dicom(&self, object: &mut InMemDicomObject) {
        if let Some(bytes) = &self.pixel_data {
            object.put(DataElement::new(
                tags::PIXEL_DATA,
                VR::OW,
                PrimitiveValue::from(bytes.clone()),
            ));
            put_us(object, tags::SAMPLES_PER_PIXEL, 1);
            put_us(object, tags::BITS_ALLOCATED, 16);
            put_us(object, tags::BITS_STORED, 16);
            put_us(object, tags::HIGH_BIT, 15);
            put_us(object, tags::PIXEL_REPRESENTATION, 0);
            object.remove_element(tags::PLANAR_CONFIGURATION);

            let monochrome = read_str(object, tags::PHOTOMETRIC_INTERPRETATION)
                .is_some_and(|pi| pi.starts_with("MONOCHROME"));
            if !monochrome {
                put_str(object, tags::PHOTOMETRIC_INTERPRETATION, VR::CS, "MONOCHROME2");
            }

            if let Some(rows) = self.rows {
                put_us(object, tags::ROWS, rows as u16);
            }
            if let Some(columns) = self.columns {
                put_us(object, tags::COLUMNS, columns as u16);
            }
            if let Some(frames) = self.number_of_frames {
                put_str(object, tags::NUMBER_OF_FRAMES, VR::IS, &frames.to_string());
            }
        }

        if let Some(slope) = self.rescale_slope {
            put_str(object, tags::RESCALE_SLOPE, VR::DS, &format_ds(slope));
        }
        if let Some(intercept) = self.rescale_intercept {
            put_str(object, tags::RESCALE_INTERCEPT, VR::DS, &format_ds(intercept));
        }
        if let Some(rescale_type) = &self.rescale_type {
            put_str(object, tags::RESCALE_TYPE, VR::LO, rescale_type);
        }
        if let Some(relationship) = &self.pixel_intensity_relationship {
            put_str(object, tags::PIXEL_INTENSITY_RELATIONSHIP, VR::CS, relationship);
        }
        if let Some(sign) = self.pixel_intensity_relationship_sign {
            object.put(DataElement::new(
                tags::PIXEL_INTENSITY_RELATIONSHIP_SIGN,
                VR::SS,
                PrimitiveValue::from(sign as i16),
            ));
        }
    }
}

fn read_str(object: &InMemDicomObject, tag: Tag) -> Option<String> {
    let value = object.element(tag).ok()?.to_str().ok()?;
    Some(value.trim().to_owned())
}

fn read_f64(object: &InMemDicomObject, tag: Tag) -> Option<f64> {
    object.element(tag).ok()?.to_float64().ok()
}

fn read_u32(object: &InMemDicomObject, tag: Tag) -> Option<u32> {
    object.element(tag).ok()?.to_int::<u32>().ok()
}

fn read_i32(object: &InMemDicomObject, tag: Tag) -> Option<i32> {
    object.element(tag).ok()?.to_int::<i32>().ok()
}

fn read_pair(object: &InMemDicomObject, tag: Tag) -> Option<[f64; 2]> {
    let values = object.element(tag).ok()?.to_multi_float64().ok()?;
    Some([*values.first()?, *values.get(1)?])
}

fn put_us(object: &mut InMemDicomObject, tag: Tag, value: u16) {
    object.put(DataElement::new(tag, VR::US, PrimitiveValue::from(value)));
}

fn put_str(object: &mut InMemDicomObject, tag: Tag, vr: VR, value: &str) {
    object.put(DataElement::new(tag, vr, PrimitiveValue::from(value)));
}

/// Decimal string for a DS attribute, which holds at most 16 characters.
/// Long values fall back to the most precise exponent form that fits.
fn format_ds(value: f64) -> String {
    let plain = value.to_string();
    if plain.len() <= 16 {
        return plain;
    }
    (0..=9)
        .rev()
        .map(|precision| format!("{value:.precision$e}"))
        .find(|exp| exp.len() <= 16)
        .unwrap_or(plain)
}

pub struct VolumeLoader;

impl VolumeLoader {
    /// Load a series from DICOM objects
    ///
    /// # Arguments
    ///
    /// * `dicom_objects` - DICOM file objects of one series
    /// * `sort_by` - Method to sort the slices
    /// * `options` - Settings for the resulting model
    ///
    /// # Errors
    ///
    /// Returns error if no object carries pixel data or pixel data cannot be
    /// decoded. Objects without pixel data (structure sets, plans, ...) are
    /// skipped. Objects that decode but cannot form a volume give an empty
    /// model.
    pub fn load_from_dicom_objects(
        mut dicom_objects: Vec<FileDicomObject<InMemDicomObject>>,
        sort_by: SortBy,
        options: ImagerOptions,
    ) -> Result<LoadedSeries, VolumeLoaderError> {
        let total = dicom_objects.len();
        dicom_objects.retain(|object| object.element(tags::PIXEL_DATA).is_ok());
        if dicom_objects.len() < total {
            log::info!("Skipped {} object(s) without pixel data", total - dicom_objects.len());
        }
        if dicom_objects.is_empty() {
            return Err(VolumeLoaderError::NoValidImages);
        }

        Self::sort_objects(&mut dicom_objects, &sort_by);

        let slices = dicom_objects
            .par_iter()
            .map(SourceSlice::from_dicom)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(LoadedSeries {
            objects: dicom_objects,
            model: VolumeModel::with_options(slices, options),
        })
    }

    /// Load a series from file paths
    pub fn load_from_file_paths(
        paths: &[impl AsRef<Path> + Sync],
        sort_by: SortBy,
        options: ImagerOptions,
    ) -> Result<LoadedSeries, VolumeLoaderError> {
        let objects: Result<Vec<_>, _> = paths
            .par_iter()
            .map(|path| open_file(path.as_ref()))
            .collect();

        Self::load_from_dicom_objects(objects?, sort_by, options)
    }

    /// Load a series from a directory containing .dcm files
    pub fn load_from_directory(
        path: impl AsRef<Path>,
        sort_by: SortBy,
        options: ImagerOptions,
    ) -> Result<LoadedSeries, VolumeLoaderError> {
        let paths: Vec<_> = fs::read_dir(path.as_ref())?
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| {
                path.extension()
                    .and_then(|s| s.to_str())
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("dcm"))
            })
            .collect();

        if paths.is_empty() {
            return Err(VolumeLoaderError::NoValidImages);
        }

        log::debug!("Reading {} file(s) from {}", paths.len(), path.as_ref().display());
        Self::load_from_file_paths(&paths, sort_by, options)
    }

    /// Sort objects in display order.
    ///
    /// Objects lacking the sort attribute go first and keep their relative
    /// order. [`SortBy::ImagePositionPatient`] sorts descending by reversing
    /// the result, so there they go last, in reverse order.
    pub fn sort_objects<T>(objects: &mut [T], sort_by: &SortBy)
    where
        T: Deref<Target = InMemDicomObject>,
    {
        if matches!(sort_by, SortBy::None) {
            return;
        }

        objects.sort_by(|a, b| {
            let a = Self::get_sort_order(a, sort_by);
            let b = Self::get_sort_order(b, sort_by);
            a.partial_cmp(&b).unwrap_or(std::cmp::Ordering::Equal)
        });

        if matches!(sort_by, SortBy::ImagePositionPatient) {
            objects.reverse();
        }
    }

    fn get_sort_order(dicom_object: &InMemDicomObject, sort_by: &SortBy) -> Option<f32> {
        match sort_by {
            SortBy::ImagePositionPatient => {
                let pos = dicom_object
                    .element(tags::IMAGE_POSITION_PATIENT)
                    .ok()?
                    .to_multi_float32()
                    .ok()?;
                pos.get(2).copied()
            }
            SortBy::TablePosition => dicom_object
                .element(tags::TABLE_POSITION)
                .ok()?
                .to_float32()
                .ok(),
            SortBy::InstanceNumber => dicom_object
                .element(tags::INSTANCE_NUMBER)
                .ok()?
                .to_int::<i32>()
                .ok()
                .map(|n| n as f32),
            SortBy::None => None,
        }
    }

    /// Decode stored pixel values without modality or VOI LUT.
    ///
    /// The `(frames, rows, columns, samples)` array is reduced to the
    /// [`SourceSlice`] layouts: a single grey frame becomes `(rows, columns)`,
    /// grey frames become `(frames, rows, columns)` and a single colour frame
    /// becomes `(rows, columns, samples)`.
    fn decode_pixels(
        dicom_object: &FileDicomObject<InMemDicomObject>,
    ) -> Result<ArrayD<f64>, VolumeLoaderError> {
        let pixel_data = dicom_object.decode_pixel_data()?;
        let options = ConvertOptions::new()
            .with_modality_lut(ModalityLutOption::None)
            .with_voi_lut(VoiLutOption::Identity);
        let array = pixel_data.to_ndarray_with_options::<f64>(&options)?;

        let (frames, _, _, samples) = array.dim();
        Ok(match (frames, samples) {
            (1, 1) => array.slice_move(s![0, .., .., 0]).into_dyn(),
            (_, 1) => array.slice_move(s![.., .., .., 0]).into_dyn(),
            (1, _) => array.index_axis_move(Axis(0), 0).into_dyn(),
            _ => array.into_dyn(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enums::Polarity;
    use crate::slice::Calibration;
    use approx::assert_relative_eq;
    use dicom::object::{FileMetaTable, FileMetaTableBuilder};
    use dicom::transfer_syntax::entries::RLE_LOSSLESS;
    use ndarray::Array2;

    fn element(tag: Tag, vr: VR, value: PrimitiveValue) -> DataElement<InMemDicomObject> {
        DataElement::new(tag, vr, value)
    }

    fn strs(values: &[&str]) -> PrimitiveValue {
        PrimitiveValue::Strs(values.iter().map(|v| v.to_string()).collect())
    }

    fn meta(transfer_syntax: &str) -> FileMetaTable {
        FileMetaTableBuilder::new()
            .transfer_syntax(transfer_syntax)
            .media_storage_sop_class_uid("1.2.840.10008.5.1.4.1.1.2")
            .media_storage_sop_instance_uid("1.2.826.0.1.3680043.2.1125.1")
            .build()
            .unwrap()
    }

    fn file_object(modality: &str) -> FileDicomObject<InMemDicomObject> {
        let meta = meta(EXPLICIT_VR_LITTLE_ENDIAN.uid());
        let mut object = FileDicomObject::new_empty_with_meta(meta);
        put_str(&mut object, tags::MODALITY, VR::CS, modality);
        object
    }

    /// Uncompressed 16-bit greyscale object with `frames` frames of
    /// `rows x columns` pixels
    fn image_object(
        instance: i32,
        frames: Option<u32>,
        (rows, columns): (u16, u16),
        values: &[u16],
    ) -> FileDicomObject<InMemDicomObject> {
        let mut object = file_object("CT");
        put_str(&mut object, tags::INSTANCE_NUMBER, VR::IS, &instance.to_string());
        put_str(&mut object, tags::PHOTOMETRIC_INTERPRETATION, VR::CS, "MONOCHROME2");
        put_us(&mut object, tags::ROWS, rows);
        put_us(&mut object, tags::COLUMNS, columns);
        put_us(&mut object, tags::SAMPLES_PER_PIXEL, 1);
        put_us(&mut object, tags::BITS_ALLOCATED, 16);
        put_us(&mut object, tags::BITS_STORED, 16);
        put_us(&mut object, tags::HIGH_BIT, 15);
        put_us(&mut object, tags::PIXEL_REPRESENTATION, 0);
        if let Some(frames) = frames {
            put_str(&mut object, tags::NUMBER_OF_FRAMES, VR::IS, &frames.to_string());
        }
        let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        object.put(element(tags::PIXEL_DATA, VR::OW, PrimitiveValue::from(bytes)));
        object
    }

    fn instance_numbers(objects: &[FileDicomObject<InMemDicomObject>]) -> Vec<i32> {
        objects
            .iter()
            .map(|o| read_i32(o, tags::INSTANCE_NUMBER).unwrap())
            .collect()
    }

    #[test]
    fn reads_attributes() {
        let object = InMemDicomObject::from_element_iter([
            element(tags::MODALITY, VR::CS, PrimitiveValue::from("CT")),
            element(tags::ROWS, VR::US, PrimitiveValue::from(2_u16)),
            element(tags::COLUMNS, VR::US, PrimitiveValue::from(3_u16)),
            element(tags::PIXEL_SPACING, VR::DS, strs(&["0.5", "0.75"])),
            element(tags::SLICE_THICKNESS, VR::DS, PrimitiveValue::from("2.5")),
            element(tags::RESCALE_SLOPE, VR::DS, PrimitiveValue::from("1")),
            element(tags::RESCALE_INTERCEPT, VR::DS, PrimitiveValue::from("-1024")),
        ]);
        let slice = SourceSlice::from_dicom_attributes(&object);

        assert_eq!(slice.modality, "CT");
        assert_eq!(slice.rows, Some(2));
        assert_eq!(slice.columns, Some(3));
        assert_eq!(slice.pixel_spacing, Some([0.5, 0.75]));
        assert_eq!(slice.slice_thickness, Some(2.5));
        assert_eq!(slice.rescale_intercept, Some(-1024.0));
        assert_eq!(slice.number_of_frames, None);
        assert!(slice.pixels.is_none());
    }

    #[test]
    fn empty_slice_thickness_reads_as_absent() {
        let object = InMemDicomObject::from_element_iter([element(
            tags::SLICE_THICKNESS,
            VR::DS,
            PrimitiveValue::from(""),
        )]);
        assert_eq!(SourceSlice::from_dicom_attributes(&object).slice_thickness, None);
    }

    #[test]
    fn writes_back_pixels_and_calibration() {
        let mut slice = SourceSlice::from_plane("CT", Array2::<f64>::zeros((1, 2)).into_dyn());
        let stored = Array2::from_shape_vec((1, 2), vec![3_u16, 256]).unwrap();
        slice.store_pixels(stored.into_dyn());
        slice.store_calibration(Calibration::new(20.0 / 65535.0, 15.0, Polarity::Positive));

        let mut object = InMemDicomObject::from_element_iter([element(
            tags::PHOTOMETRIC_INTERPRETATION,
            VR::CS,
            PrimitiveValue::from("RGB"),
        )]);
        slice.write_to_dicom(&mut object);

        let bytes = object.element(tags::PIXEL_DATA).unwrap().to_bytes().unwrap();
        assert_eq!(bytes.as_ref(), &[3, 0, 0, 1]);
        assert_eq!(read_u32(&object, tags::ROWS), Some(1));
        assert_eq!(read_u32(&object, tags::COLUMNS), Some(2));
        assert_eq!(read_u32(&object, tags::BITS_ALLOCATED), Some(16));
        assert_eq!(
            read_str(&object, tags::PHOTOMETRIC_INTERPRETATION).as_deref(),
            Some("MONOCHROME2")
        );
        assert_eq!(read_f64(&object, tags::RESCALE_INTERCEPT), Some(15.0));
        let slope = read_f64(&object, tags::RESCALE_SLOPE).unwrap();
        assert_relative_eq!(slope, 20.0 / 65535.0, max_relative = 1e-8);
        assert_eq!(read_str(&object, tags::RESCALE_TYPE).as_deref(), Some("CU"));
        assert_eq!(
            read_str(&object, tags::PIXEL_INTENSITY_RELATIONSHIP).as_deref(),
            Some("LIN")
        );
        assert_eq!(read_i32(&object, tags::PIXEL_INTENSITY_RELATIONSHIP_SIGN), Some(1));
    }

    #[test]
    fn untouched_slice_writes_nothing() {
        let slice = SourceSlice::from_plane("CT", Array2::<f64>::zeros((1, 1)).into_dyn());
        let mut object = InMemDicomObject::new_empty();
        slice.write_to_dicom(&mut object);
        assert!(object.element(tags::PIXEL_DATA).is_err());
        assert!(object.element(tags::RESCALE_SLOPE).is_err());
    }

    #[test]
    fn decimal_strings_fit_sixteen_characters() {
        assert_eq!(format_ds(15.0), "15");
        assert_eq!(format_ds(-1024.5), "-1024.5");
        let long = format_ds(-20.0 / 65535.0);
        assert!(long.len() <= 16, "{long}");
        assert_relative_eq!(long.parse::<f64>().unwrap(), -20.0 / 65535.0, max_relative = 1e-8);
    }

    #[test]
    fn decimal_strings_with_three_digit_exponents_fit() {
        for value in [-1.234567890123e-300, -3.05e-124, 6.02214076e123, f64::MIN_POSITIVE] {
            let text = format_ds(value);
            assert!(text.len() <= 16, "{text}");
            assert_relative_eq!(text.parse::<f64>().unwrap(), value, max_relative = 1e-7);
        }
    }

    #[test]
    fn sorts_by_instance_number() {
        let object = |n: &str| {
            Box::new(InMemDicomObject::from_element_iter([element(
                tags::INSTANCE_NUMBER,
                VR::IS,
                PrimitiveValue::from(n),
            )]))
        };
        let mut objects = vec![object("3"), object("1"), object("2")];
        VolumeLoader::sort_objects(&mut objects, &SortBy::InstanceNumber);

        let order: Vec<_> = objects
            .iter()
            .map(|o| read_i32(o, tags::INSTANCE_NUMBER).unwrap())
            .collect();
        assert_eq!(order, vec![1, 2, 3]);
    }

    #[test]
    fn sorts_by_image_position_descending_with_missing_last() {
        let object = |z: Option<&str>| {
            let mut object = InMemDicomObject::new_empty();
            if let Some(z) = z {
                object.put(element(tags::IMAGE_POSITION_PATIENT, VR::DS, strs(&["0", "0", z])));
            }
            Box::new(object)
        };
        let mut objects = vec![object(None), object(Some("1")), object(Some("3"))];
        VolumeLoader::sort_objects(&mut objects, &SortBy::ImagePositionPatient);

        let order: Vec<_> = objects
            .iter()
            .map(|o| VolumeLoader::get_sort_order(o, &SortBy::ImagePositionPatient))
            .collect();
        assert_eq!(order, vec![Some(3.0_f32), Some(1.0), None]);
    }

    #[test]
    fn decodes_single_and_multi_frame_layouts() {
        let single = image_object(1, None, (2, 2), &[1, 2, 3, 4]);
        let slice = SourceSlice::from_dicom(&single).unwrap();
        let pixels = slice.pixels().unwrap();
        assert_eq!(pixels.shape(), &[2, 2]);
        assert_eq!(pixels[&[1, 0][..]], 3.0);
        assert_eq!(slice.modality, "CT");

        let values: Vec<u16> = (0..12).collect();
        let multi = image_object(1, Some(3), (2, 2), &values);
        let slice = SourceSlice::from_dicom(&multi).unwrap();
        let pixels = slice.pixels().unwrap();
        assert_eq!(pixels.shape(), &[3, 2, 2]);
        assert_eq!(pixels[&[2, 1, 1][..]], 11.0);
        assert_eq!(slice.number_of_frames, Some(3));
    }

    #[test]
    fn skips_objects_without_pixel_data() {
        let mut structure_set = file_object("RTSTRUCT");
        put_str(&mut structure_set, tags::SERIES_DESCRIPTION, VR::LO, "contours");
        let objects = vec![
            image_object(2, None, (1, 2), &[5, 15]),
            structure_set,
            image_object(1, None, (1, 2), &[10, 20]),
        ];

        let series = VolumeLoader::load_from_dicom_objects(
            objects,
            SortBy::InstanceNumber,
            ImagerOptions::default(),
        )
        .unwrap();

        assert!(series.model.is_loaded());
        assert_eq!(series.model.depth(), 2);
        assert_eq!(series.model.slices().len(), 2);
        assert_eq!(instance_numbers(&series.objects), vec![1, 2]);

        let only_contours = vec![file_object("RTSTRUCT")];
        let result = VolumeLoader::load_from_dicom_objects(
            only_contours,
            SortBy::InstanceNumber,
            ImagerOptions::default(),
        );
        assert!(matches!(result, Err(VolumeLoaderError::NoValidImages)));
    }

    #[test]
    fn summed_series_is_saved_and_reopened() {
        let objects = vec![
            image_object(2, None, (1, 2), &[5, 15]),
            image_object(1, None, (1, 2), &[10, 20]),
        ];
        let mut series = VolumeLoader::load_from_dicom_objects(
            objects,
            SortBy::InstanceNumber,
            ImagerOptions::default(),
        )
        .unwrap();
        series.model.sum_images();
        series.sync();
        assert_eq!(series.objects.len(), 1);

        let dir = tempfile::tempdir().unwrap();
        let written = series.save_to_directory(dir.path()).unwrap();
        assert_eq!(written.len(), 1);
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);

        let reopened = open_file(&written[0]).unwrap();
        assert_eq!(reopened.meta().transfer_syntax(), EXPLICIT_VR_LITTLE_ENDIAN.uid());
        let bytes = reopened.element(tags::PIXEL_DATA).unwrap().to_bytes().unwrap();
        assert_eq!(&bytes[..2], &[0, 0]);
        assert!(u16::from_le_bytes([bytes[2], bytes[3]]) >= 65534);
        assert_eq!(read_f64(&reopened, tags::RESCALE_INTERCEPT), Some(15.0));
        let slope = read_f64(&reopened, tags::RESCALE_SLOPE).unwrap();
        assert_relative_eq!(slope, 20.0 / 65535.0, max_relative = 1e-8);
        assert_eq!(read_str(&reopened, tags::RESCALE_TYPE).as_deref(), Some("CU"));

        let slice = SourceSlice::from_dicom(&reopened).unwrap();
        let calibration = slice.calibration();
        let pixels = slice.pixels().unwrap();
        assert_relative_eq!(calibration.apply(pixels[&[0, 0][..]]), 15.0, epsilon = 1e-3);
        assert_relative_eq!(calibration.apply(pixels[&[0, 1][..]]), 35.0, epsilon = 1e-3);
    }

    #[test]
    fn rewritten_pixels_switch_to_explicit_little_endian() {
        let compressed = || {
            let mut object = FileDicomObject::new_empty_with_meta(meta(RLE_LOSSLESS.uid()));
            put_str(&mut object, tags::MODALITY, VR::CS, "CT");
            object
        };
        let plane = || SourceSlice::from_plane("CT", Array2::from_elem((2, 2), 7.0).into_dyn());

        let mut untouched = LoadedSeries {
            objects: vec![compressed()],
            model: VolumeModel::new(vec![plane()]),
        };
        untouched.sync();
        assert_eq!(untouched.objects[0].meta().transfer_syntax(), RLE_LOSSLESS.uid());

        let mut scaled = LoadedSeries {
            objects: vec![compressed()],
            model: VolumeModel::new(vec![plane()]),
        };
        scaled.model.scale_images(2.0);
        scaled.sync();
        let object = &scaled.objects[0];
        assert_eq!(object.meta().transfer_syntax(), EXPLICIT_VR_LITTLE_ENDIAN.uid());
        let bytes = object.element(tags::PIXEL_DATA).unwrap().to_bytes().unwrap();
        assert_eq!(bytes.as_ref(), &[14, 0, 14, 0, 14, 0, 14, 0]);
    }
}
