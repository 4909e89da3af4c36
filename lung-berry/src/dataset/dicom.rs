//! 单个 DICOM 文件的读取与 HU 转换.

use crate::{PrepError, Result};
use dicom::dictionary_std::tags;
use dicom::object::{open_file, DefaultDicomObject, OpenFileOptions};
use dicom::pixeldata::{ConvertOptions, ModalityLutOption, PixelDecoder};
use ndarray::Array2;
use std::path::{Path, PathBuf};

/// 单张 DICOM 切片的元信息.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SliceMeta {
    /// 切片在病人坐标系中的 z 位置 (毫米). 取 `ImagePositionPatient[2]`,
    /// 缺失时取 `SliceLocation`.
    pub z_position: f64,

    /// 像素间距 `(row, column)`, 即 `(h, w)` 方向, 以毫米为单位.
    pub pixel_spacing: (f64, f64),

    /// 层厚 (毫米).
    pub slice_thickness: Option<f64>,

    /// `InstanceNumber`.
    pub instance_number: Option<i32>,

    /// `SOPInstanceUID`.
    pub sop_uid: String,

    /// `SeriesInstanceUID`.
    pub series_uid: String,

    /// `PatientID`.
    pub patient_id: String,

    /// `Modality`, 如 `CT`.
    pub modality: String,

    /// 图像行数.
    pub rows: usize,

    /// 图像列数.
    pub columns: usize,

    /// `RescaleSlope`, 缺省为 1.
    pub slope: f64,

    /// `RescaleIntercept`, 缺省为 0.
    pub intercept: f64,
}

/// 已转换为 HU 的单张 DICOM 切片.
#[derive(Debug, Clone)]
pub struct DicomSlice {
    /// 文件路径.
    pub path: PathBuf,

    /// 元信息.
    pub meta: SliceMeta,

    /// `(h, w)` 形状的 HU 值.
    pub hu: Array2<f32>,
}

fn dicom_err(path: &Path, e: impl std::fmt::Display) -> PrepError {
    PrepError::Dicom {
        path: path.to_owned(),
        message: e.to_string(),
    }
}

fn get_str(obj: &DefaultDicomObject, tag: dicom::core::Tag) -> Option<String> {
    let s = obj.element(tag).ok()?.to_str().ok()?;
    Some(s.trim_matches(|c: char| c.is_whitespace() || c == '\0').to_owned())
}

fn get_f64(obj: &DefaultDicomObject, tag: dicom::core::Tag) -> Option<f64> {
    obj.element(tag).ok()?.to_float64().ok()
}

fn get_multi_f64(obj: &DefaultDicomObject, tag: dicom::core::Tag) -> Option<Vec<f64>> {
    obj.element(tag).ok()?.to_multi_float64().ok()
}

fn get_int<T>(obj: &DefaultDicomObject, tag: dicom::core::Tag) -> Option<T>
where
    T: Clone + num::NumCast + std::str::FromStr<Err = std::num::ParseIntError>,
{
    obj.element(tag).ok()?.to_int::<T>().ok()
}

fn parse_meta(obj: &DefaultDicomObject, path: &Path) -> Result<SliceMeta> {
    let missing = |tag| PrepError::MissingTag {
        path: path.to_owned(),
        tag,
    };

    let z_position = get_multi_f64(obj, tags::IMAGE_POSITION_PATIENT)
        .and_then(|v| v.get(2).copied())
        .or_else(|| get_f64(obj, tags::SLICE_LOCATION))
        .ok_or_else(|| missing("ImagePositionPatient"))?;

    let pixel_spacing = match get_multi_f64(obj, tags::PIXEL_SPACING).as_deref() {
        Some([row, col, ..]) => (*row, *col),
        Some([both]) => (*both, *both),
        _ => return Err(missing("PixelSpacing")),
    };

    let rows: u32 = get_int(obj, tags::ROWS).ok_or_else(|| missing("Rows"))?;
    let columns: u32 = get_int(obj, tags::COLUMNS).ok_or_else(|| missing("Columns"))?;

    Ok(SliceMeta {
        z_position,
        pixel_spacing,
        slice_thickness: get_f64(obj, tags::SLICE_THICKNESS),
        instance_number: get_int(obj, tags::INSTANCE_NUMBER),
        sop_uid: get_str(obj, tags::SOP_INSTANCE_UID).unwrap_or_default(),
        series_uid: get_str(obj, tags::SERIES_INSTANCE_UID).unwrap_or_default(),
        patient_id: get_str(obj, tags::PATIENT_ID).unwrap_or_default(),
        modality: get_str(obj, tags::MODALITY).unwrap_or_default(),
        rows: rows as usize,
        columns: columns as usize,
        slope: get_f64(obj, tags::RESCALE_SLOPE).unwrap_or(1.0),
        intercept: get_f64(obj, tags::RESCALE_INTERCEPT).unwrap_or(0.0),
    })
}

/// 只读取 `path` 处 DICOM 文件的元信息, 不解码像素数据.
pub fn read_dicom_meta<P: AsRef<Path>>(path: P) -> Result<SliceMeta> {
    let path = path.as_ref();
    let obj = OpenFileOptions::new()
        .read_until(tags::PIXEL_DATA)
        .open_file(path)
        .map_err(|e| dicom_err(path, e))?;
    parse_meta(&obj, path)
}

/// 读取 `path` 处的 DICOM 文件并转换为 HU.
///
/// 像素按存储值读取 (不应用 modality LUT), 再按
/// `hu = raw * RescaleSlope + RescaleIntercept` 转换.
pub fn read_dicom_slice<P: AsRef<Path>>(path: P) -> Result<DicomSlice> {
    let path = path.as_ref();
    let obj = open_file(path).map_err(|e| dicom_err(path, e))?;
    let meta = parse_meta(&obj, path)?;

    let pixels = obj.decode_pixel_data().map_err(|e| dicom_err(path, e))?;
    let options = ConvertOptions::new().with_modality_lut(ModalityLutOption::None);
    let raw: Vec<f32> = pixels
        .to_vec_frame_with_options(0, &options)
        .map_err(|e| dicom_err(path, e))?;

    let expected = vec![meta.rows, meta.columns];
    if raw.len() != meta.rows * meta.columns {
        return Err(PrepError::ShapeMismatch(expected, vec![raw.len()]));
    }
    let hu = Array2::from_shape_vec((meta.rows, meta.columns), raw)
        .map_err(|_| PrepError::ShapeMismatch(expected, vec![meta.rows * meta.columns]))?;
    let hu = to_hu(hu, meta.slope, meta.intercept);

    Ok(DicomSlice {
        path: path.to_owned(),
        meta,
        hu,
    })
}

/// `raw * slope + intercept`.
#[inline]
pub fn to_hu(mut raw: Array2<f32>, slope: f64, intercept: f64) -> Array2<f32> {
    let (slope, intercept) = (slope as f32, intercept as f32);
    raw.mapv_inplace(|v| v * slope + intercept);
    raw
}
