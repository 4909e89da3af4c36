//! 影像组学特征.
//!
//! 特征名与 pyradiomics 保持一致, 形如 `original_<类别>_<特征>`. 二维输入被视为
//! z 方向只有一层的体数据.

mod first_order;
mod glcm;
mod shape;

pub use first_order::first_order_features;
pub use glcm::glcm_features;
pub use shape::shape_features;

use crate::consts::gray::is_foreground;
use crate::{PrepError, Result};
use ndarray::{ArrayView2, ArrayView3, Axis, Zip};
use std::fmt;

/// 保持插入顺序的 `特征名 -> 值` 表.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FeatureVector {
    entries: Vec<(String, f64)>,
}

impl FeatureVector {
    /// 空表.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// 插入 `original_{class}_{name}`.
    pub fn insert(&mut self, class: &str, name: &str, value: f64) {
        self.entries.push((format!("original_{class}_{name}"), value));
    }

    /// 按全名查询.
    pub fn get(&self, key: &str) -> Option<f64> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|&(_, v)| v)
    }

    /// 特征个数.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// 是否为空.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 按插入顺序迭代.
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// 追加另一张表.
    pub fn extend(&mut self, other: FeatureVector) {
        self.entries.extend(other.entries);
    }
}

impl fmt::Display for FeatureVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (k, v) in self.iter() {
            writeln!(f, "{k}: {v}")?;
        }
        Ok(())
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for FeatureVector {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for (k, v) in self.iter() {
            map.serialize_entry(k, &v)?;
        }
        map.end()
    }
}

/// 特征提取参数.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RadiomicsSettings {
    /// 灰度离散化的箱宽.
    pub bin_width: f64,

    /// 是否计算一阶统计特征.
    pub first_order: bool,

    /// 是否计算形状特征.
    pub shape: bool,

    /// 是否计算灰度共生矩阵特征.
    pub glcm: bool,
}

impl Default for RadiomicsSettings {
    /// 箱宽 25, 启用全部特征类别.
    fn default() -> Self {
        Self {
            bin_width: 25.0,
            first_order: true,
            shape: true,
            glcm: true,
        }
    }
}

/// 按固定箱宽离散化.
///
/// 下界为 `min - min mod bin_width` (向下取整到箱宽的倍数), 返回值从 1 开始.
#[derive(Copy, Clone, Debug)]
pub(crate) struct Binning {
    low: f64,
    width: f64,
}

impl Binning {
    pub(crate) fn new<I: IntoIterator<Item = f64>>(values: I, width: f64) -> Self {
        let min = values.into_iter().fold(f64::INFINITY, f64::min);
        let min = if min.is_finite() { min } else { 0.0 };
        Self {
            low: min - min.rem_euclid(width),
            width,
        }
    }

    #[inline]
    pub(crate) fn level(&self, v: f64) -> usize {
        ((v - self.low) / self.width).floor() as usize + 1
    }
}

/// 从 `scan` 中由 `mask` 前景覆盖的区域提取特征.
///
/// `spacing` 为 `[z, h, w]` 方向的体素边长 (毫米). 形状不一致时返回
/// [`PrepError::ShapeMismatch`], 掩码为空时返回 [`PrepError::EmptyMask`],
/// 前景内有 NaN 或无穷大时返回 [`PrepError::NonFinite`].
pub fn extract_radiomics(
    scan: ArrayView3<f32>,
    mask: ArrayView3<u8>,
    spacing: [f64; 3],
    settings: &RadiomicsSettings,
) -> Result<FeatureVector> {
    if scan.shape() != mask.shape() {
        return Err(PrepError::ShapeMismatch(
            scan.shape().to_vec(),
            mask.shape().to_vec(),
        ));
    }
    let roi = mask.mapv(is_foreground);
    let mut values = Vec::new();
    Zip::from(&scan).and(&roi).for_each(|&v, &m| {
        if m {
            values.push(v as f64);
        }
    });
    if values.is_empty() {
        return Err(PrepError::EmptyMask);
    }
    let non_finite = values.iter().filter(|v| !v.is_finite()).count();
    if non_finite > 0 {
        return Err(PrepError::NonFinite(non_finite));
    }

    let mut ans = FeatureVector::new();
    if settings.first_order {
        let voxel = spacing.iter().product();
        ans.extend(first_order_features(&values, voxel, settings.bin_width));
    }
    if settings.shape {
        ans.extend(shape_features(roi.view(), spacing));
    }
    if settings.glcm {
        ans.extend(glcm_features(scan, roi.view(), settings.bin_width));
    }
    Ok(ans)
}

/// 二维版本的 [`extract_radiomics`]. `spacing` 为 `(h, w)` 方向的像素边长,
/// z 方向边长取 1.
pub fn extract_radiomics_2d(
    scan: ArrayView2<f32>,
    mask: ArrayView2<u8>,
    (dh, dw): (f64, f64),
    settings: &RadiomicsSettings,
) -> Result<FeatureVector> {
    extract_radiomics(
        scan.insert_axis(Axis(0)),
        mask.insert_axis(Axis(0)),
        [1.0, dh, dw],
        settings,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array2, Array3};

    #[test]
    fn test_binning() {
        let b = Binning::new([-30.0, 10.0, 60.0], 25.0);
        assert_eq!(b.low, -50.0);
        assert_eq!(b.level(-30.0), 1);
        assert_eq!(b.level(-25.0), 2);
        assert_eq!(b.level(60.0), 5);
    }

    #[test]
    fn test_errors() {
        let s = RadiomicsSettings::default();
        let scan = Array3::<f32>::zeros((1, 4, 4));
        let mask = Array3::<u8>::zeros((1, 4, 5));
        assert!(matches!(
            extract_radiomics(scan.view(), mask.view(), [1.0; 3], &s),
            Err(PrepError::ShapeMismatch(..))
        ));
        let mask = Array3::<u8>::zeros((1, 4, 4));
        assert!(matches!(
            extract_radiomics(scan.view(), mask.view(), [1.0; 3], &s),
            Err(PrepError::EmptyMask)
        ));

        // 前景外的 NaN 不影响计算.
        let mut scan = Array3::<f32>::zeros((1, 4, 4));
        scan[(0, 0, 0)] = f32::NAN;
        let mut mask = Array3::<u8>::zeros((1, 4, 4));
        mask[(0, 1, 1)] = 1;
        assert!(extract_radiomics(scan.view(), mask.view(), [1.0; 3], &s).is_ok());

        scan[(0, 1, 1)] = f32::INFINITY;
        mask[(0, 0, 0)] = 1;
        assert!(matches!(
            extract_radiomics(scan.view(), mask.view(), [1.0; 3], &s),
            Err(PrepError::NonFinite(2))
        ));
    }

    #[test]
    fn test_extract_2d_names() {
        let scan = Array2::from_shape_fn((8, 8), |(h, w)| (h * 10 + w * 3) as f32);
        let mut mask = Array2::<u8>::zeros((8, 8));
        mask.slice_mut(ndarray::s![2..6, 2..6]).fill(1);
        let f = extract_radiomics_2d(scan.view(), mask.view(), (0.5, 0.5), &Default::default())
            .unwrap();
        assert_eq!(f.get("original_firstorder_Minimum"), Some(26.0));
        assert_eq!(f.get("original_shape_VoxelVolume"), Some(16.0 * 0.25));
        assert!(f.get("original_glcm_Contrast").is_some());
        assert!(f.iter().next().unwrap().0.starts_with("original_firstorder_"));
        assert!(f.to_string().contains("original_glcm_JointEnergy: "));
    }
}
