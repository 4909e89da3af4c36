use std::collections::BTreeMap;
use std::ops::{Index, IndexMut};
use std::path::{Path, PathBuf};

use log::{debug, info};
use ndarray::{s, Array3, ArrayView, ArrayView3, ArrayViewMut, Axis, Ix3};

use crate::annotation::Bbox3d;
use crate::dataset::dicom::{read_dicom_meta, read_dicom_slice, SliceMeta};
use crate::{Idx2d, Idx3d, PrepError, Result};

pub mod slice;
pub mod window;

pub use slice::{
    Connectivity, ImgWriteRaw, ImgWriteVis, MaskSlice, MaskSliceMut, OwnedMaskSlice,
    OwnedScanSlice, Region, ScanSlice, ScanSliceMut,
};

#[cfg(feature = "plot")]
pub use slice::ImgDisplay;

pub use window::{CtWindow, HuRange};

/// CT 序列的空间信息.
///
/// 所有长度以毫米为单位. 切片按 z 位置升序排列.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VolumeGeometry {
    patient_id: String,
    series_uid: String,
    slice_shape: Idx2d,
    pixel_spacing: (f64, f64),
    slice_thickness: f64,
    slice_spacing: f64,
    slice_zs: Vec<f64>,
    sop_uids: Vec<String>,
}

/// 相邻 z 位置差的中位数. 少于两层时返回 `None`.
fn median_spacing(zs: &[f64]) -> Option<f64> {
    let mut diffs: Vec<f64> = zs.windows(2).map(|p| (p[1] - p[0]).abs()).collect();
    if diffs.is_empty() {
        return None;
    }
    diffs.sort_by(f64::total_cmp);
    let n = diffs.len();
    Some(if n % 2 == 1 {
        diffs[n / 2]
    } else {
        (diffs[n / 2 - 1] + diffs[n / 2]) / 2.0
    })
}

impl VolumeGeometry {
    /// 构建空间信息. `slice_zs` 必须已经升序排列.
    ///
    /// 层间距取相邻 z 位置差的中位数; 只有一层或层间距为 0 时退化为层厚.
    pub fn new(
        patient_id: impl Into<String>,
        series_uid: impl Into<String>,
        slice_shape: Idx2d,
        pixel_spacing: (f64, f64),
        slice_thickness: f64,
        slice_zs: Vec<f64>,
        sop_uids: Vec<String>,
    ) -> Self {
        let slice_spacing = median_spacing(&slice_zs)
            .filter(|&d| d > 0.0)
            .unwrap_or(slice_thickness);
        Self {
            patient_id: patient_id.into(),
            series_uid: series_uid.into(),
            slice_shape,
            pixel_spacing,
            slice_thickness,
            slice_spacing,
            slice_zs,
            sop_uids,
        }
    }

    /// 无 DICOM 来源的规则网格: 第 `k` 层位于 `k * slice_thickness`.
    pub fn regular(
        len_z: usize,
        slice_shape: Idx2d,
        pixel_spacing: (f64, f64),
        slice_thickness: f64,
    ) -> Self {
        let zs = (0..len_z).map(|k| k as f64 * slice_thickness).collect();
        Self::new("", "", slice_shape, pixel_spacing, slice_thickness, zs, vec![])
    }

    /// 患者 ID.
    #[inline]
    pub fn patient_id(&self) -> &str {
        &self.patient_id
    }

    /// 序列 UID.
    #[inline]
    pub fn series_uid(&self) -> &str {
        &self.series_uid
    }

    /// 水平切片形状 `(h, w)`.
    #[inline]
    pub fn slice_shape(&self) -> Idx2d {
        self.slice_shape
    }

    /// 切片个数.
    #[inline]
    pub fn len_z(&self) -> usize {
        self.slice_zs.len()
    }

    /// 体数据形状 `(z, h, w)`.
    #[inline]
    pub fn shape(&self) -> Idx3d {
        let (h, w) = self.slice_shape;
        (self.len_z(), h, w)
    }

    /// 水平像素间距 `(h, w)`.
    #[inline]
    pub fn pixel_spacing(&self) -> (f64, f64) {
        self.pixel_spacing
    }

    /// 层厚.
    #[inline]
    pub fn slice_thickness(&self) -> f64 {
        self.slice_thickness
    }

    /// 层间距.
    #[inline]
    pub fn slice_spacing(&self) -> f64 {
        self.slice_spacing
    }

    /// 各层 z 位置, 升序.
    #[inline]
    pub fn slice_zs(&self) -> &[f64] {
        &self.slice_zs
    }

    /// 各层 SOP UID. 与 `slice_zs` 一一对应, 可能为空.
    #[inline]
    pub fn sop_uids(&self) -> &[String] {
        &self.sop_uids
    }

    /// 与 `z` 距离最近的切片索引. 无切片时返回 `None`.
    pub fn nearest_slice(&self, z: f64) -> Option<usize> {
        self.slice_zs
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| (*a - z).abs().total_cmp(&(*b - z).abs()))
            .map(|(i, _)| i)
    }

    /// `sop_uid` 对应的切片索引.
    pub fn slice_of_sop(&self, sop_uid: &str) -> Option<usize> {
        self.sop_uids.iter().position(|s| s == sop_uid)
    }
}

/// 3D CT 体数据的共用属性和部分通用操作.
pub trait VolumeAttr {
    /// 获取空间信息.
    fn geometry(&self) -> &VolumeGeometry;

    /// 获取数据形状大小 `(z, h, w)`.
    fn shape(&self) -> Idx3d;

    /// 获取数据水平切片形状大小.
    #[inline]
    fn slice_shape(&self) -> Idx2d {
        let (_, h, w) = self.shape();
        (h, w)
    }

    /// 获取水平切片个数.
    #[inline]
    fn len_z(&self) -> usize {
        self.shape().0
    }

    /// 获取数据体素个数.
    #[inline]
    fn size(&self) -> usize {
        let (z, h, w) = self.shape();
        z * h * w
    }

    /// 检查索引是否合法.
    #[inline]
    fn check(&self, (z0, h0, w0): &Idx3d) -> bool {
        let (z, h, w) = self.shape();
        *z0 < z && *h0 < h && *w0 < w
    }

    /// 获取单个体素分辨率. 分别代表空间 (相邻切片方向),
    /// 高 (自然图像的垂直方向), 宽 (自然图像的水平方向).
    #[inline]
    fn pix_dim(&self) -> [f64; 3] {
        let g = self.geometry();
        let (h, w) = g.pixel_spacing();
        [g.slice_spacing(), h, w]
    }

    /// 获取体素的实际体积值, 以立方毫米为单位.
    #[inline]
    fn voxel(&self) -> f64 {
        self.pix_dim().iter().product()
    }

    /// 获取水平切片方向的像素实际面积值, 以平方毫米为单位.
    #[inline]
    fn slice_pixel(&self) -> f64 {
        self.pix_dim().iter().skip(1).product()
    }
}

/// 单个 CT 序列的 HU 体数据, 按 `(z, h, w)` 存储.
#[derive(Debug, Clone)]
pub struct CtVolume {
    geometry: Box<VolumeGeometry>,
    data: Array3<f32>,
}

impl VolumeAttr for CtVolume {
    #[inline]
    fn geometry(&self) -> &VolumeGeometry {
        &self.geometry
    }

    #[inline]
    fn shape(&self) -> Idx3d {
        self.data.dim()
    }
}

impl Index<Idx3d> for CtVolume {
    type Output = f32;

    #[inline]
    fn index(&self, index: Idx3d) -> &Self::Output {
        &self.data[index]
    }
}

impl IndexMut<Idx3d> for CtVolume {
    #[inline]
    fn index_mut(&mut self, index: Idx3d) -> &mut Self::Output {
        &mut self.data[index]
    }
}

impl CtVolume {
    /// 由 HU 数据与空间信息构建. 数据形状必须与 `geometry` 一致.
    pub fn from_parts(data: Array3<f32>, geometry: VolumeGeometry) -> Result<Self> {
        let (z, h, w) = data.dim();
        let (gh, gw) = geometry.slice_shape();
        if (z, h, w) != (geometry.len_z(), gh, gw) {
            return Err(PrepError::ShapeMismatch(
                vec![z, h, w],
                vec![geometry.len_z(), gh, gw],
            ));
        }
        Ok(Self {
            geometry: Box::new(geometry),
            data,
        })
    }

    /// 计算由 `it` 给出的所有索引对应的 CT HU 值的平均值.
    /// `it` 为空时返回 NaN.
    ///
    /// 如果存在越界索引, 则程序 panic.
    pub fn mean_hu<I: IntoIterator<Item = Idx3d>>(&self, it: I) -> f64 {
        let mut count = 0u64;
        let mut hu = 0.0;
        for pos in it.into_iter() {
            count += 1;
            hu += self[pos] as f64;
        }
        hu / (count as f64)
    }

    /// 就地将 HU 值截断到 `range`.
    #[inline]
    pub fn clip_hu(&mut self, range: HuRange) {
        range.clip_array(&mut self.data);
    }

    /// 返回按 `range` 归一化到 `[0, 1]` 的拷贝.
    pub fn normalized(&self, range: HuRange) -> Array3<f32> {
        let mut ans = self.data.clone();
        range.normalize_array(&mut ans);
        ans
    }

    /// 截取 `bbox` (闭区间) 范围内的体数据视图.
    ///
    /// 当 `bbox` 越界时 panic.
    #[inline]
    pub fn crop(&self, bbox: &Bbox3d) -> ArrayView3<'_, f32> {
        self.data.slice(s![
            bbox.z.0..=bbox.z.1,
            bbox.h.0..=bbox.h.1,
            bbox.w.0..=bbox.w.1
        ])
    }

    /// 与 `z` (毫米) 距离最近的切片索引.
    #[inline]
    pub fn nearest_slice(&self, z: f64) -> Option<usize> {
        self.geometry.nearest_slice(z)
    }

    /// 获取 3D 扫描 z 空间的第 `z_index` 层切片视图.
    ///
    /// 当 `z_index` 越界时 panic.
    #[inline]
    pub fn slice_at(&self, z_index: usize) -> ScanSlice<'_> {
        ScanSlice::new(self.data.index_axis(Axis(0), z_index))
    }

    /// 获取 3D 扫描 z 空间的第 `z_index` 层可变切片视图.
    ///
    /// 当 `z_index` 越界时 panic.
    #[inline]
    pub fn slice_at_mut(&mut self, z_index: usize) -> ScanSliceMut<'_> {
        ScanSliceMut::new(self.data.index_axis_mut(Axis(0), z_index))
    }

    /// 获取能按升序迭代 3D 扫描水平不可变切片的迭代器.
    #[inline]
    pub fn slice_iter(&self) -> impl ExactSizeIterator<Item = ScanSlice> {
        self.data.axis_iter(Axis(0)).map(ScanSlice::new)
    }

    /// 获取能按升序迭代 3D 扫描水平可变切片的迭代器.
    #[inline]
    pub fn slice_iter_mut(&mut self) -> impl ExactSizeIterator<Item = ScanSliceMut> {
        self.data.axis_iter_mut(Axis(0)).map(ScanSliceMut::new)
    }

    /// 获得数据的一份不可变 shallow copy.
    #[inline]
    pub fn data(&self) -> ArrayView<'_, f32, Ix3> {
        self.data.view()
    }

    /// 获得数据的一份可变 shallow copy.
    #[inline]
    pub fn data_mut(&mut self) -> ArrayViewMut<'_, f32, Ix3> {
        self.data.view_mut()
    }

    /// 取出 HU 数据.
    #[inline]
    pub fn into_raw(self) -> Array3<f32> {
        self.data
    }
}

cfg_if::cfg_if! {
    if #[cfg(feature = "rayon")] {
        use rayon::iter::{IndexedParallelIterator, IntoParallelIterator, ParallelIterator};
    }
}

/// 并发操作部分
#[cfg(feature = "rayon")]
impl CtVolume {
    /// 借助 `rayon`, 并行地对每个水平不可变切片实施 `op` 操作.
    /// 该操作会同时携带 z 方向索引信息.
    pub fn par_for_each_indexed_slice<F>(&self, op: F)
    where
        F: Fn(usize, ScanSlice) + Sync + Send,
    {
        self.data()
            .axis_iter(Axis(0))
            .into_par_iter()
            .enumerate()
            .for_each(|(i, v)| {
                op(i, ScanSlice::new(v));
            });
    }

    /// 借助 `rayon`, 并行地对每个水平可变切片实施 `op` 操作.
    pub fn par_for_each_slice_mut<F>(&mut self, op: F)
    where
        F: Fn(ScanSliceMut) + Sync + Send,
    {
        self.data_mut()
            .axis_iter_mut(Axis(0))
            .into_par_iter()
            .for_each(|v| {
                op(ScanSliceMut::new(v));
            });
    }

    /// 借助 `rayon`, 并行地就地截断 HU 值.
    pub fn par_clip_hu(&mut self, range: HuRange) {
        self.par_for_each_slice_mut(|mut s| range.clip_array(&mut s.data_mut()));
    }
}

/// 递归收集 `dir` 下所有非 XML 文件.
fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_files(&path, out)?;
        } else if !path
            .extension()
            .is_some_and(|e| e.eq_ignore_ascii_case("xml"))
        {
            out.push(path);
        }
    }
    Ok(())
}

/// 从 `dir` 目录树中组装 CT 体数据.
///
/// 1. 递归遍历, 忽略无法解析为 DICOM 的文件;
/// 2. 按序列 UID 分组, 只保留 `Modality == CT` 的序列;
/// 3. 若有多个序列, 取切片最多的那个;
/// 4. 按 z 位置排序 (相同时按 InstanceNumber);
/// 5. 所有切片的行列数必须一致.
///
/// 没有任何 CT 序列时返回 [`PrepError::ScanNotFound`], 行列数不一致时返回
/// [`PrepError::ShapeMismatch`].
pub fn load_series<P: AsRef<Path>>(dir: P) -> Result<CtVolume> {
    let dir = dir.as_ref();
    let mut files = vec![];
    collect_files(dir, &mut files)?;
    files.sort();

    let mut series: BTreeMap<String, Vec<(PathBuf, SliceMeta)>> = BTreeMap::new();
    for path in files {
        match read_dicom_meta(&path) {
            Ok(meta) if meta.modality.eq_ignore_ascii_case("CT") => {
                series
                    .entry(meta.series_uid.clone())
                    .or_default()
                    .push((path, meta));
            }
            Ok(meta) => debug!("skip {path:?}: modality `{}`", meta.modality),
            Err(e) => debug!("skip {path:?}: {e}"),
        }
    }

    let mut chosen: Option<Vec<(PathBuf, SliceMeta)>> = None;
    for (uid, slices) in series {
        debug!("series {uid}: {} slices", slices.len());
        if chosen.as_ref().map_or(true, |c| slices.len() > c.len()) {
            chosen = Some(slices);
        }
    }
    let mut slices = chosen.ok_or_else(|| PrepError::ScanNotFound(dir.display().to_string()))?;
    slices.sort_by(|(_, a), (_, b)| {
        a.z_position
            .total_cmp(&b.z_position)
            .then(a.instance_number.cmp(&b.instance_number))
    });

    let first = &slices[0].1;
    let (rows, columns) = (first.rows, first.columns);
    if let Some((path, m)) = slices
        .iter()
        .find(|(_, m)| (m.rows, m.columns) != (rows, columns))
    {
        debug!("{path:?} has {}x{} pixels", m.rows, m.columns);
        return Err(PrepError::ShapeMismatch(
            vec![rows, columns],
            vec![m.rows, m.columns],
        ));
    }
    let mut data = Array3::<f32>::zeros((slices.len(), rows, columns));
    for (k, (path, _)) in slices.iter().enumerate() {
        let sli = read_dicom_slice(path)?;
        if sli.hu.dim() != (rows, columns) {
            return Err(PrepError::ShapeMismatch(
                vec![rows, columns],
                sli.hu.shape().to_vec(),
            ));
        }
        data.index_axis_mut(Axis(0), k).assign(&sli.hu);
    }

    let geometry = VolumeGeometry::new(
        first.patient_id.clone(),
        first.series_uid.clone(),
        (rows, columns),
        first.pixel_spacing,
        first.slice_thickness.unwrap_or(first.pixel_spacing.0),
        slices.iter().map(|(_, m)| m.z_position).collect(),
        slices.iter().map(|(_, m)| m.sop_uid.clone()).collect(),
    );
    info!(
        "loaded series {} of {}: {:?}",
        geometry.series_uid(),
        geometry.patient_id(),
        data.dim()
    );
    CtVolume::from_parts(data, geometry)
}
