//! LIDC-IDRI 放射科医生结节标注.
//!
//! 每位放射科医生对应一个阅片会话 ([`ReadingSession`]), 每个会话包含若干结节标注
//! ([`Annotation`]). 每个标注由若干层轮廓 ([`Contour`]) 与九项主观评分
//! ([`Characteristics`]) 组成.
//!
//! 标注的几何量 (掩码, 体积, 表面积, 直径) 都依赖所在序列的
//! [`VolumeGeometry`], 因此以参数形式传入.

use crate::{Idx2d, Idx3d, VolumeGeometry};
use ndarray::{Array2, Array3, Axis};

mod cluster;
mod consensus;
mod malignancy;
mod xml;

pub use cluster::{cluster_annotations, contour_distance, ClusterOptions, Nodule};
pub use consensus::{consensus, Consensus};
pub use malignancy::{
    calculate_malignancy, median_high, CancerLabel, MeanProperties, NoduleSummary,
};
pub use xml::{parse_lidc_xml, parse_lidc_xml_str, LidcXml, ReadingSession};

/// 放射科医生对结节的九项主观评分, 取值多为 1 到 5.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Characteristics {
    /// 检测难度.
    pub subtlety: u8,
    /// 内部结构.
    pub internal_structure: u8,
    /// 钙化, 取值 1 到 6.
    pub calcification: u8,
    /// 球形度.
    pub sphericity: u8,
    /// 边缘.
    pub margin: u8,
    /// 分叶.
    pub lobulation: u8,
    /// 毛刺.
    pub spiculation: u8,
    /// 质地.
    pub texture: u8,
    /// 恶性程度.
    pub malignancy: u8,
}

/// 单层轮廓.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Contour {
    /// 轮廓所在切片的 z 位置 (毫米).
    pub z: f64,

    /// 轮廓所在切片的 SOP UID.
    pub sop_uid: String,

    /// `true` 表示轮廓包围结节, `false` 表示轮廓内部应被挖去.
    pub inclusion: bool,

    /// 轮廓点 `(h, w)`, 依次相连, 首尾闭合.
    pub points: Vec<Idx2d>,
}

/// 闭区间三维包围盒.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Bbox3d {
    /// z 方向 `[min, max]`.
    pub z: (usize, usize),
    /// h 方向 `[min, max]`.
    pub h: (usize, usize),
    /// w 方向 `[min, max]`.
    pub w: (usize, usize),
}

impl Bbox3d {
    /// 包围盒形状 `(z, h, w)`.
    #[inline]
    pub fn shape(&self) -> (usize, usize, usize) {
        (
            self.z.1 - self.z.0 + 1,
            self.h.1 - self.h.0 + 1,
            self.w.1 - self.w.0 + 1,
        )
    }

    /// 同时包含 `self` 与 `other` 的最小包围盒.
    pub fn union(&self, other: &Bbox3d) -> Bbox3d {
        let u = |a: (usize, usize), b: (usize, usize)| (a.0.min(b.0), a.1.max(b.1));
        Bbox3d {
            z: u(self.z, other.z),
            h: u(self.h, other.h),
            w: u(self.w, other.w),
        }
    }

    /// 在三个方向上都向外扩展 `pad` 个体素, 并截断到 `(len_z, height, width)` 大小的体数据内.
    pub fn pad(&self, pad: usize, (len_z, height, width): Idx3d) -> Bbox3d {
        let grow = |(lo, hi): (usize, usize), len: usize| {
            let hi = hi.saturating_add(pad).min(len.saturating_sub(1));
            (lo.saturating_sub(pad).min(hi), hi)
        };
        Bbox3d {
            z: grow(self.z, len_z),
            h: grow(self.h, height),
            w: grow(self.w, width),
        }
    }
}

/// 单个标注的扁平属性记录.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AnnotationProperties {
    /// 体积 (立方毫米).
    pub volume: f64,
    /// 表面积 (平方毫米).
    pub surface_area: f64,
    /// 恶性程度.
    pub malignancy: f64,
    /// 球形度.
    pub sphericity: f64,
    /// 质地.
    pub texture: f64,
    /// 钙化.
    pub calcification: f64,
    /// 内部结构.
    pub internal_structure: f64,
    /// 边缘.
    pub margin: f64,
    /// 毛刺.
    pub spiculation: f64,
    /// 检测难度.
    pub subtlety: f64,
    /// 最大直径 (毫米).
    pub diameter: f64,
    /// 分叶.
    pub lobulation: f64,
}

/// 一位放射科医生对一个结节的标注.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Annotation {
    /// 放射科医生 ID.
    pub reader_id: String,

    /// 该医生为结节起的 ID, 仅在同一会话内唯一.
    pub nodule_id: String,

    /// 主观评分.
    pub characteristics: Characteristics,

    /// 各层轮廓.
    pub contours: Vec<Contour>,
}

/// 在 `layer` 上画出 `a` 到 `b` 的线段 (含端点). 坐标已减去包围盒原点,
/// 可能越界, 越界的点被忽略.
fn draw_segment(layer: &mut Array2<bool>, a: (i64, i64), b: (i64, i64)) {
    let steps = (b.0 - a.0).abs().max((b.1 - a.1).abs()).max(1);
    let (h, w) = layer.dim();
    for t in 0..=steps {
        let y = a.0 as f64 + (b.0 - a.0) as f64 * t as f64 / steps as f64;
        let x = a.1 as f64 + (b.1 - a.1) as f64 * t as f64 / steps as f64;
        let (y, x) = (y.round() as i64, x.round() as i64);
        if (0..h as i64).contains(&y) && (0..w as i64).contains(&x) {
            layer[(y as usize, x as usize)] = true;
        }
    }
}

/// 扫描线填充多边形 `pts` (首尾闭合), 边界像素同样算作内部.
fn fill_polygon(layer: &mut Array2<bool>, pts: &[(i64, i64)]) {
    let (h, w) = layer.dim();
    let n = pts.len();
    let mut xs = Vec::with_capacity(8);
    for y in 0..h as i64 {
        xs.clear();
        for i in 0..n {
            let (y0, x0) = pts[i];
            let (y1, x1) = pts[(i + 1) % n];
            if (y0 <= y && y < y1) || (y1 <= y && y < y0) {
                xs.push(x0 as f64 + (y - y0) as f64 * (x1 - x0) as f64 / (y1 - y0) as f64);
            }
        }
        xs.sort_by(f64::total_cmp);
        for pair in xs.chunks_exact(2) {
            let lo = (pair[0].ceil() as i64).max(0);
            let hi = (pair[1].floor() as i64).min(w as i64 - 1);
            for x in lo..=hi {
                layer[(y as usize, x as usize)] = true;
            }
        }
    }
    for i in 0..n {
        draw_segment(layer, pts[i], pts[(i + 1) % n]);
    }
}

impl Annotation {
    /// 每层轮廓所在的切片索引. 优先按 SOP UID 匹配, 否则取 z 位置最近的切片.
    pub fn contour_slice_indices(&self, geometry: &VolumeGeometry) -> Vec<usize> {
        self.contours
            .iter()
            .map(|c| {
                geometry
                    .slice_of_sop(&c.sop_uid)
                    .or_else(|| geometry.nearest_slice(c.z))
                    .unwrap_or(0)
            })
            .collect()
    }

    /// 全部轮廓点的闭区间包围盒. 无轮廓点时返回 `None`.
    pub fn bbox(&self, geometry: &VolumeGeometry) -> Option<Bbox3d> {
        let ks = self.contour_slice_indices(geometry);
        let mut ans: Option<Bbox3d> = None;
        for (c, &k) in self.contours.iter().zip(ks.iter()) {
            for &(h, w) in c.points.iter() {
                let pt = Bbox3d {
                    z: (k, k),
                    h: (h, h),
                    w: (w, w),
                };
                ans = Some(ans.map_or(pt, |b| b.union(&pt)));
            }
        }
        let (len_z, height, width) = geometry.shape();
        ans.map(|b| b.pad(0, (len_z.max(1), height.max(1), width.max(1))))
    }

    /// 在 `bbox` 范围内计算布尔掩码, 形状为 `bbox.shape()`.
    ///
    /// 包含轮廓被填充 (含边界), 随后挖去排除轮廓的内部 (不含边界).
    pub fn boolean_mask(&self, geometry: &VolumeGeometry, bbox: &Bbox3d) -> Array3<bool> {
        let shape = bbox.shape();
        let mut mask = Array3::from_elem(shape, false);
        let ks = self.contour_slice_indices(geometry);
        let mut exclusions = Array3::from_elem(shape, false);

        for (c, &k) in self.contours.iter().zip(ks.iter()) {
            if k < bbox.z.0 || k > bbox.z.1 || c.points.is_empty() {
                continue;
            }
            let pts: Vec<(i64, i64)> = c
                .points
                .iter()
                .map(|&(h, w)| (h as i64 - bbox.h.0 as i64, w as i64 - bbox.w.0 as i64))
                .collect();
            let target = if c.inclusion {
                &mut mask
            } else {
                &mut exclusions
            };
            let mut layer = target.index_axis_mut(Axis(0), k - bbox.z.0).to_owned();
            if c.inclusion {
                fill_polygon(&mut layer, &pts);
            } else {
                let mut hole = Array2::from_elem(layer.dim(), false);
                fill_polygon(&mut hole, &pts);
                let mut edge = Array2::from_elem(layer.dim(), false);
                for i in 0..pts.len() {
                    draw_segment(&mut edge, pts[i], pts[(i + 1) % pts.len()]);
                }
                ndarray::Zip::from(&mut layer)
                    .and(&hole)
                    .and(&edge)
                    .for_each(|l, &h, &e| *l |= h && !e);
            }
            target.index_axis_mut(Axis(0), k - bbox.z.0).assign(&layer);
        }

        ndarray::Zip::from(&mut mask)
            .and(&exclusions)
            .for_each(|m, &e| *m &= !e);
        mask
    }

    /// 在自身包围盒内的掩码. 无轮廓时返回 `None`.
    pub fn own_mask(&self, geometry: &VolumeGeometry) -> Option<(Bbox3d, Array3<bool>)> {
        let bbox = self.bbox(geometry)?;
        Some((bbox, self.boolean_mask(geometry, &bbox)))
    }

    /// 体积 (立方毫米): 掩码体素个数乘以单个体素体积.
    pub fn volume(&self, geometry: &VolumeGeometry) -> f64 {
        let Some((_, mask)) = self.own_mask(geometry) else {
            return 0.0;
        };
        let (ph, pw) = geometry.pixel_spacing();
        let n = mask.iter().filter(|&&v| v).count();
        n as f64 * ph * pw * geometry.slice_spacing()
    }

    /// 表面积 (平方毫米): 掩码所有暴露在外的体素面的面积之和.
    pub fn surface_area(&self, geometry: &VolumeGeometry) -> f64 {
        let Some((_, mask)) = self.own_mask(geometry) else {
            return 0.0;
        };
        let (ph, pw) = geometry.pixel_spacing();
        exposed_face_area(&mask, [geometry.slice_spacing(), ph, pw])
    }

    /// 最大直径 (毫米): 所有包含轮廓中, 同层轮廓点两两之间的最大水平距离.
    pub fn diameter(&self, geometry: &VolumeGeometry) -> f64 {
        let (ph, pw) = geometry.pixel_spacing();
        let mut ans = 0.0f64;
        for c in self.contours.iter().filter(|c| c.inclusion) {
            for (i, &(h0, w0)) in c.points.iter().enumerate() {
                for &(h1, w1) in c.points[i + 1..].iter() {
                    let dh = (h0 as f64 - h1 as f64) * ph;
                    let dw = (w0 as f64 - w1 as f64) * pw;
                    ans = ans.max(dh.hypot(dw));
                }
            }
        }
        ans
    }

    /// 掩码质心 `(z, h, w)`, 以体素索引为单位. 掩码为空时返回 `None`.
    pub fn centroid(&self, geometry: &VolumeGeometry) -> Option<[f64; 3]> {
        let (bbox, mask) = self.own_mask(geometry)?;
        let mut sum = [0.0f64; 3];
        let mut n = 0usize;
        for ((z, h, w), _) in mask.indexed_iter().filter(|&(_, &v)| v) {
            sum[0] += (z + bbox.z.0) as f64;
            sum[1] += (h + bbox.h.0) as f64;
            sum[2] += (w + bbox.w.0) as f64;
            n += 1;
        }
        (n > 0).then(|| sum.map(|s| s / n as f64))
    }

    /// 扁平属性记录.
    pub fn properties(&self, geometry: &VolumeGeometry) -> AnnotationProperties {
        let c = &self.characteristics;
        AnnotationProperties {
            volume: self.volume(geometry),
            surface_area: self.surface_area(geometry),
            malignancy: c.malignancy as f64,
            sphericity: c.sphericity as f64,
            texture: c.texture as f64,
            calcification: c.calcification as f64,
            internal_structure: c.internal_structure as f64,
            margin: c.margin as f64,
            spiculation: c.spiculation as f64,
            subtlety: c.subtlety as f64,
            diameter: self.diameter(geometry),
            lobulation: c.lobulation as f64,
        }
    }
}

/// 体素面面积之和: 某前景体素的 6 个面中, 邻居为背景或越界的面被计入.
/// `spacing` 为 `[z, h, w]` 方向的体素边长.
pub(crate) fn exposed_face_area<'a, M>(mask: M, [dz, dh, dw]: [f64; 3]) -> f64
where
    M: Into<ndarray::ArrayView3<'a, bool>>,
{
    let mask = mask.into();
    let (nz, nh, nw) = mask.dim();
    let fg = |z: isize, h: isize, w: isize| {
        z >= 0
            && h >= 0
            && w >= 0
            && (z as usize) < nz
            && (h as usize) < nh
            && (w as usize) < nw
            && mask[(z as usize, h as usize, w as usize)]
    };
    let mut area = 0.0;
    for ((z, h, w), _) in mask.indexed_iter().filter(|&(_, &v)| v) {
        let (z, h, w) = (z as isize, h as isize, w as isize);
        for (dz0, dh0, dw0, face) in [
            (-1, 0, 0, dh * dw),
            (1, 0, 0, dh * dw),
            (0, -1, 0, dz * dw),
            (0, 1, 0, dz * dw),
            (0, 0, -1, dz * dh),
            (0, 0, 1, dz * dh),
        ] {
            if !fg(z + dz0, h + dh0, w + dw0) {
                area += face;
            }
        }
    }
    area
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// 边长为 `side` 的正方形轮廓, 左上角位于 `(h, w)`.
    pub(crate) fn square(z: f64, sop: &str, (h, w): Idx2d, side: usize) -> Contour {
        let mut points = vec![];
        for i in 0..side {
            points.push((h, w + i));
        }
        for i in 0..side {
            points.push((h + i, w + side - 1));
        }
        for i in (0..side).rev() {
            points.push((h + side - 1, w + i));
        }
        for i in (0..side).rev() {
            points.push((h + i, w));
        }
        points.dedup();
        Contour {
            z,
            sop_uid: sop.to_owned(),
            inclusion: true,
            points,
        }
    }

    pub(crate) fn geometry() -> VolumeGeometry {
        VolumeGeometry::new(
            "LIDC-IDRI-0001",
            "1.1",
            (32, 32),
            (0.5, 0.5),
            1.0,
            (0..8).map(|k| k as f64).collect(),
            (0..8).map(|k| format!("sop-{k}")).collect(),
        )
    }

    pub(crate) fn cube_annotation(
        reader: &str,
        origin: Idx2d,
        side: usize,
        zs: &[usize],
    ) -> Annotation {
        Annotation {
            reader_id: reader.to_owned(),
            nodule_id: "n1".to_owned(),
            characteristics: Characteristics {
                malignancy: 4,
                sphericity: 3,
                ..Default::default()
            },
            contours: zs
                .iter()
                .map(|&k| square(k as f64, &format!("sop-{k}"), origin, side))
                .collect(),
        }
    }

    #[test]
    fn test_bbox_and_mask() {
        let g = geometry();
        let a = cube_annotation("r1", (4, 6), 5, &[2, 3]);
        let bbox = a.bbox(&g).unwrap();
        assert_eq!(
            bbox,
            Bbox3d {
                z: (2, 3),
                h: (4, 8),
                w: (6, 10)
            }
        );
        let m = a.boolean_mask(&g, &bbox);
        assert_eq!(m.dim(), (2, 5, 5));
        assert!(m.iter().all(|&v| v));
    }

    #[test]
    fn test_exclusion_contour() {
        let g = geometry();
        let mut a = cube_annotation("r1", (0, 0), 9, &[1]);
        let mut hole = square(1.0, "sop-1", (2, 2), 5);
        hole.inclusion = false;
        a.contours.push(hole);
        let bbox = a.bbox(&g).unwrap();
        let m = a.boolean_mask(&g, &bbox);
        // 5x5 洞的内部 3x3 被挖去.
        assert_eq!(m.iter().filter(|&&v| v).count(), 81 - 9);
        assert!(!m[(0, 4, 4)]);
        assert!(m[(0, 2, 2)]);
    }

    #[test]
    fn test_volume_surface_diameter() {
        let g = geometry();
        let a = cube_annotation("r1", (4, 4), 4, &[0, 1, 2, 3]);
        // 4x4x4 体素, 每个 0.5 * 0.5 * 1.0.
        assert!((a.volume(&g) - 64.0 * 0.25).abs() < 1e-9);
        // 上下面: 2 * 16 * 0.25; 侧面: 4 * 16 * 0.5.
        assert!((a.surface_area(&g) - (8.0 + 32.0)).abs() < 1e-9);
        // 正方形对角线 3 * sqrt(2) 像素.
        assert!((a.diameter(&g) - 3.0 * 2f64.sqrt() * 0.5).abs() < 1e-9);
        let c = a.centroid(&g).unwrap();
        assert!((c[0] - 1.5).abs() < 1e-9 && (c[1] - 5.5).abs() < 1e-9);
    }

    #[test]
    fn test_bbox_helpers() {
        let b = Bbox3d {
            z: (1, 2),
            h: (10, 12),
            w: (3, 5),
        };
        let p = b.pad(512, (8, 16, 16));
        assert_eq!(p.z, (0, 7));
        assert_eq!(p.h, (0, 15));
        assert_eq!(p.w, (0, 15));
        let p = b.pad(1, (8, 16, 16));
        assert_eq!((p.z, p.h, p.w), ((0, 3), (9, 13), (2, 6)));
        assert_eq!(b.shape(), (2, 3, 3));
    }

    #[test]
    fn test_properties() {
        let g = geometry();
        let a = cube_annotation("r1", (4, 4), 4, &[0]);
        let p = a.properties(&g);
        assert_eq!(p.malignancy, 4.0);
        assert_eq!(p.sphericity, 3.0);
        assert!(p.volume > 0.0);
    }
}
