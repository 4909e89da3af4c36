//! 肺实质分割.
//!
//! 流程: 标准化, 去除极值, 中值滤波, 各向异性扩散, 一维 k-means 阈值,
//! 腐蚀/膨胀, 8-连通区域筛选, 最后再做一次膨胀得到肺部掩码.
//! 返回掩码与滤波后图像的乘积.

mod filter;
mod kmeans;
mod morph;

pub use filter::{anisotropic_diffusion, median_filter, Conductance, DiffusionParams};
pub use kmeans::{kmeans_threshold, kmeans_two_1d};
pub use morph::{dilate, erode};

use crate::consts::gray::{MASK_BACKGROUND, MASK_FOREGROUND};
use crate::{Connectivity, CtVolume, OwnedMaskSlice, PrepError, Region, Result};
use log::trace;
use ndarray::{s, Array2, Array3, ArrayView2, Axis};

/// 参考图像边长. 区域筛选的像素阈值按实际图像尺寸等比缩放.
const REFERENCE_SIZE: f64 = 512.0;

/// 计算阈值所用的中心区域 `[100, 400)`.
const MIDDLE: (usize, usize) = (100, 400);

const ERODE_SIZE: (usize, usize) = (4, 4);
const DILATE_SIZE: (usize, usize) = (10, 10);

/// 按 512x512 图像给出的区域筛选条件, 对应于
/// `r1 - r0 < 475 && c1 - c0 < 475 && r0 > 40 && r1 < 472`.
fn is_lung_region(region: &Region, (h, w): (usize, usize)) -> bool {
    let sh = h as f64 / REFERENCE_SIZE;
    let sw = w as f64 / REFERENCE_SIZE;
    let (r0, _, r1, _) = region.bbox;
    (region.bbox_height() as f64) < 475.0 * sh
        && (region.bbox_width() as f64) < 475.0 * sw
        && (r0 as f64) > 40.0 * sh
        && (r1 as f64) < 472.0 * sh
}

/// 标准化: 减去均值, 除以总体标准差.
fn standardize(img: ArrayView2<f32>) -> Result<Array2<f32>> {
    let n = img.len() as f64;
    if n == 0.0 {
        return Err(PrepError::ZeroVariance);
    }
    let mean = img.iter().map(|&v| v as f64).sum::<f64>() / n;
    let var = img.iter().map(|&v| (v as f64 - mean).powi(2)).sum::<f64>() / n;
    let std = var.sqrt();
    if std.is_nan() || std <= 0.0 {
        return Err(PrepError::ZeroVariance);
    }
    Ok(img.mapv(|v| ((v as f64 - mean) / std) as f32))
}

/// 肺部掩码与滤波后的图像.
#[derive(Clone, Debug)]
pub struct LungSegmentation {
    /// 肺部掩码, 前景为 [`MASK_FOREGROUND`].
    pub mask: OwnedMaskSlice,

    /// 标准化并滤波后的图像.
    pub filtered: Array2<f32>,

    /// k-means 阈值.
    pub threshold: f64,
}

impl LungSegmentation {
    /// `mask * filtered`.
    pub fn masked(&self) -> Array2<f32> {
        let mask = self.mask.as_immut();
        let mut ans = self.filtered.clone();
        ndarray::Zip::from(&mut ans)
            .and(mask.array_view())
            .for_each(|v, &m| {
                if m == MASK_BACKGROUND {
                    *v = 0.0;
                }
            });
        ans
    }
}

/// 计算单张切片的肺部掩码.
///
/// 图像标准差为 0 (如纯色图像) 时返回 [`PrepError::ZeroVariance`].
pub fn lung_mask(img: ArrayView2<f32>) -> Result<LungSegmentation> {
    let (h, w) = img.dim();
    let mut std_img = standardize(img)?;

    // 中心区域为空 (小图像) 时退化为整幅图像.
    let (r0, r1) = (MIDDLE.0.min(h), MIDDLE.1.min(h));
    let (c0, c1) = (MIDDLE.0.min(w), MIDDLE.1.min(w));
    let middle_range = if r0 < r1 && c0 < c1 {
        s![r0..r1, c0..c1]
    } else {
        s![.., ..]
    };

    let middle_mean = {
        let middle = std_img.slice(&middle_range);
        middle.iter().map(|&v| v as f64).sum::<f64>() / middle.len() as f64
    } as f32;
    let max = std_img.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let min = std_img.iter().copied().fold(f32::INFINITY, f32::min);
    std_img.mapv_inplace(|v| if v == max || v == min { middle_mean } else { v });

    let filtered = median_filter(std_img.view(), 3);
    let filtered = anisotropic_diffusion(filtered.view(), DiffusionParams::default());

    let threshold = kmeans_threshold(std_img.slice(&middle_range).iter().copied())
        .ok_or(PrepError::ZeroVariance)?;
    trace!("lung threshold {threshold:.4}");

    let binary = filtered.mapv(|v| {
        if (v as f64) < threshold {
            MASK_FOREGROUND
        } else {
            MASK_BACKGROUND
        }
    });
    let eroded = erode(binary.view(), ERODE_SIZE);
    let mut regions = OwnedMaskSlice::from_raw(dilate(eroded.view(), DILATE_SIZE));
    let kept = regions
        .as_mutable()
        .retain_regions(Connectivity::Eight, |r| is_lung_region(r, (h, w)));
    trace!("{kept} lung regions kept");
    let mask = OwnedMaskSlice::from_raw(dilate(regions.as_immut().array_view(), DILATE_SIZE));

    Ok(LungSegmentation {
        mask,
        filtered,
        threshold,
    })
}

/// 分割单张切片的肺实质, 返回 `mask * filtered_img`.
#[inline]
pub fn segment_lung(img: ArrayView2<f32>) -> Result<Array2<f32>> {
    Ok(lung_mask(img)?.masked())
}

/// 逐层分割整个体数据. 启用 `rayon` 时并行执行.
pub fn segment_volume(volume: &CtVolume) -> Result<Array3<f32>> {
    let data = volume.data();

    #[cfg(feature = "rayon")]
    let slices: Vec<Array2<f32>> = {
        use rayon::iter::{IntoParallelIterator, ParallelIterator};
        data.axis_iter(Axis(0))
            .into_par_iter()
            .map(segment_lung)
            .collect::<Result<_>>()?
    };

    #[cfg(not(feature = "rayon"))]
    let slices: Vec<Array2<f32>> = data
        .axis_iter(Axis(0))
        .map(segment_lung)
        .collect::<Result<_>>()?;

    let mut ans = Array3::<f32>::zeros(data.dim());
    for (mut dst, src) in ans.axis_iter_mut(Axis(0)).zip(slices.iter()) {
        dst.assign(src);
    }
    Ok(ans)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::VolumeGeometry;

    /// 128x128 合成胸部切片: 体外空气, 体部软组织, 两片低密度肺.
    fn phantom() -> Array2<f32> {
        Array2::from_shape_fn((128, 128), |(h, w)| {
            let (y, x) = (h as f64 - 64.0, w as f64 - 64.0);
            let body = (y / 56.0).powi(2) + (x / 60.0).powi(2) <= 1.0;
            let left = ((y + 4.0) / 30.0).powi(2) + ((x + 26.0) / 16.0).powi(2) <= 1.0;
            let right = ((y + 4.0) / 30.0).powi(2) + ((x - 26.0) / 16.0).powi(2) <= 1.0;
            if !body {
                -1000.0
            } else if left || right {
                -850.0 + ((h * 7 + w * 3) % 11) as f32
            } else {
                40.0 + ((h * 5 + w) % 9) as f32
            }
        })
    }

    #[test]
    fn test_standardize() {
        let img = ndarray::array![[1.0f32, 3.0], [1.0, 3.0]];
        let s = standardize(img.view()).unwrap();
        assert_eq!(s, ndarray::array![[-1.0f32, 1.0], [-1.0, 1.0]]);
        assert!(matches!(
            standardize(Array2::<f32>::zeros((4, 4)).view()),
            Err(PrepError::ZeroVariance)
        ));
    }

    #[test]
    fn test_region_filter_scaled() {
        let region = |bbox| Region {
            label: 1,
            bbox,
            pixels: vec![],
        };
        assert!(is_lung_region(&region((50, 10, 400, 200)), (512, 512)));
        // 贴近顶部.
        assert!(!is_lung_region(&region((10, 10, 400, 200)), (512, 512)));
        // 几乎覆盖整幅图像.
        assert!(!is_lung_region(&region((41, 0, 471, 500)), (512, 512)));
        // 256 图像上阈值减半.
        assert!(!is_lung_region(&region((50, 10, 240, 100)), (256, 256)));
        assert!(is_lung_region(&region((25, 10, 200, 100)), (256, 256)));
    }

    #[test]
    fn test_segment_phantom() {
        let img = phantom();
        let seg = lung_mask(img.view()).unwrap();
        let mask = seg.mask.as_immut();
        // 两片肺的中心属于掩码, 体外空气与纵隔不属于.
        assert_eq!(mask[(60, 38)], MASK_FOREGROUND);
        assert_eq!(mask[(60, 90)], MASK_FOREGROUND);
        assert_eq!(mask[(2, 2)], MASK_BACKGROUND);
        assert_eq!(mask[(100, 64)], MASK_BACKGROUND);

        let out = segment_lung(img.view()).unwrap();
        assert_eq!(out.dim(), (128, 128));
        assert_eq!(out[(2, 2)], 0.0);
        assert_ne!(out[(60, 38)], 0.0);
    }

    #[test]
    fn test_segment_volume() {
        let img = phantom();
        let mut data = Array3::<f32>::zeros((2, 128, 128));
        data.index_axis_mut(Axis(0), 0).assign(&img);
        data.index_axis_mut(Axis(0), 1).assign(&img);
        let g = VolumeGeometry::regular(2, (128, 128), (0.7, 0.7), 2.5);
        let v = CtVolume::from_parts(data, g).unwrap();
        let out = segment_volume(&v).unwrap();
        assert_eq!(out.dim(), (2, 128, 128));
        assert_eq!(out.index_axis(Axis(0), 0), out.index_axis(Axis(0), 1));

        let flat = CtVolume::from_parts(
            Array3::zeros((1, 8, 8)),
            VolumeGeometry::regular(1, (8, 8), (1.0, 1.0), 1.0),
        )
        .unwrap();
        assert!(segment_volume(&flat).is_err());
    }
}
