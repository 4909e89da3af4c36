use super::iter::{neighbour4, neighbour8, PosIter};
use crate::consts::gray::*;
use crate::{Area2d, Areas2d, Idx2d, Predicate};
use ndarray::iter::Iter;
use ndarray::{Array2, ArrayView2, ArrayViewMut2, Ix2};
use std::collections::{HashSet, VecDeque};
use std::ops::{Index, IndexMut};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 连通规则.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Connectivity {
    /// 上下左右 4-邻接.
    Four,

    /// 包括对角线的 8-邻接.
    Eight,
}

/// 掩码上的一个连通区域, 以及它的统计信息.
#[derive(Clone, Debug)]
pub struct Region {
    /// 区域标号, 从 1 开始, 按行优先扫描顺序分配.
    pub label: usize,

    /// 包围盒 `(min_h, min_w, max_h, max_w)`, 右下角不包含在内.
    pub bbox: (usize, usize, usize, usize),

    /// 区域内全部像素索引.
    pub pixels: Area2d,
}

impl Region {
    /// 区域面积 (像素个数).
    #[inline]
    pub fn area(&self) -> usize {
        self.pixels.len()
    }

    /// 包围盒高度.
    #[inline]
    pub fn bbox_height(&self) -> usize {
        self.bbox.2 - self.bbox.0
    }

    /// 包围盒宽度.
    #[inline]
    pub fn bbox_width(&self) -> usize {
        self.bbox.3 - self.bbox.1
    }
}

/// 不可变、借用的二维掩码切片.
pub struct MaskSlice<'a> {
    /// 底层数据的轻量级视图.
    data: ArrayView2<'a, u8>,
}

impl Index<Idx2d> for MaskSlice<'_> {
    type Output = u8;

    #[inline]
    fn index(&self, index: Idx2d) -> &Self::Output {
        &self.data[index]
    }
}

/// 可变、借用的二维掩码切片.
pub struct MaskSliceMut<'a> {
    /// 底层数据的轻量级视图.
    data: ArrayViewMut2<'a, u8>,
}

/// 可变方法集合.
impl<'a> MaskSliceMut<'a> {
    /// 将 `it` 中的每个索引对应的像素改为 `new`.
    pub fn fill_batch<I: IntoIterator<Item = Idx2d>>(&mut self, it: I, new: u8) {
        for pos in it.into_iter() {
            self[pos] = new;
        }
    }

    /// 只保留满足 `keep` 的前景区域, 其它前景区域全部涂为背景.
    ///
    /// 返回被保留的区域个数.
    pub fn retain_regions<F>(&mut self, connectivity: Connectivity, mut keep: F) -> usize
    where
        F: FnMut(&Region) -> bool,
    {
        let mut kept = 0;
        for region in self.regions(connectivity) {
            if keep(&region) {
                kept += 1;
            } else {
                self.fill_batch(region.pixels, MASK_BACKGROUND);
            }
        }
        kept
    }
}

impl Index<Idx2d> for MaskSliceMut<'_> {
    type Output = u8;

    #[inline]
    fn index(&self, index: Idx2d) -> &Self::Output {
        &self.data[index]
    }
}

impl IndexMut<Idx2d> for MaskSliceMut<'_> {
    #[inline]
    fn index_mut(&mut self, index: Idx2d) -> &mut Self::Output {
        &mut self.data[index]
    }
}

/// mask 不可变方法集合.
macro_rules! impl_mask_slice_immut {
    ($life: lifetime, $slice: ty, $array: ty) => {
        /// 不可变方法集合.
        impl<$life> $slice {
            /// 直接初始化.
            #[inline]
            pub(crate) fn new(data: $array) -> Self {
                Self { data }
            }

            /// 获得 **底层** 数据的一份不可变 shallow copy.
            #[inline]
            pub fn array_view(&self) -> ArrayView2<u8> {
                self.data.view()
            }

            /// 获取可以迭代图像像素的迭代器.
            #[inline]
            pub fn iter(&self) -> Iter<'_, u8, Ix2> {
                self.data.iter()
            }

            /// 获取给定位置 (高, 宽) 的像素值. 越界时返回 `None`.
            #[inline]
            pub fn get(&self, pos: Idx2d) -> Option<&u8> {
                self.data.get(pos)
            }

            /// 该图是否为全背景图?
            #[inline]
            pub fn is_background(&self) -> bool {
                self.data.iter().copied().all(is_background)
            }

            /// 图像的分辨率 (高, 宽).
            #[inline]
            pub fn shape(&self) -> Idx2d {
                self.data.dim()
            }

            /// 图像的像素个数.
            #[inline]
            pub fn size(&self) -> usize {
                let (h, w) = self.shape();
                h * w
            }

            /// 判断一个索引是否合法 (未越界).
            #[inline]
            pub fn check(&self, (h, w): Idx2d) -> bool {
                let (h_len, w_len) = self.shape();
                h < h_len && w < w_len
            }

            /// 统计图像中前景像素总个数.
            #[inline]
            pub fn foreground_count(&self) -> usize {
                self.data.iter().filter(|&p| is_foreground(*p)).count()
            }

            /// 克隆自己, 获得一个拥有所有权的切片对象.
            pub fn to_owned(&self) -> OwnedMaskSlice {
                OwnedMaskSlice {
                    data: self.data.to_owned(),
                }
            }

            /// 获得图像的高.
            #[inline]
            pub fn height(&self) -> usize {
                self.shape().0
            }

            /// 获得图像的宽.
            #[inline]
            pub fn width(&self) -> usize {
                self.shape().1
            }

            /// 获得 `pos` 的 4-邻域像素索引. 保证返回的索引都不越界.
            pub fn n4_positions(&self, pos: Idx2d) -> Vec<Idx2d> {
                neighbour4(pos)
                    .into_iter()
                    .filter(|p| self.check(*p))
                    .collect()
            }

            /// 获得 `pos` 的 8-邻域像素索引. 保证返回的索引都不越界.
            pub fn n8_positions(&self, pos: Idx2d) -> Vec<Idx2d> {
                neighbour8(pos)
                    .into_iter()
                    .filter(|p| self.check(*p))
                    .collect()
            }

            /// 以行优先规则, 获取能迭代图像所有索引的迭代器.
            #[inline]
            pub fn pos_iter(&self) -> impl Iterator<Item = Idx2d> {
                PosIter::new(self.shape())
            }

            /// 以行优先规则, 获取能迭代图像所有 `(索引, 像素值)` 的迭代器.
            #[inline]
            pub fn indexed_iter(&self) -> impl Iterator<Item = (Idx2d, &u8)> {
                self.data.indexed_iter()
            }

            /// 按照 `connectivity` 规则获取所有区域. 两个像素 `p1` 和 `p2` 属于同一个区域,
            /// 当且仅当存在一条从 `p1` 到 `p2` 的相邻路径, 且路径上的所有像素
            /// (包括 `p1` 和 `p2`) 都满足谓词 `pred`.
            ///
            /// 区域按其首个像素的行优先顺序排列.
            pub fn areas(&self, pred: Predicate, connectivity: Connectivity) -> Areas2d {
                let mut ans = Areas2d::with_capacity(1);
                let mut bfs_q = VecDeque::with_capacity(4);
                let mut set = HashSet::with_capacity(16);

                for pos in self.pos_iter() {
                    if set.contains(&pos) || !pred(self[pos]) {
                        continue;
                    }
                    bfs_q.push_back(pos);
                    set.insert(pos);
                    let mut this_area = Area2d::with_capacity(1);
                    while let Some(cur_pos) = bfs_q.pop_front() {
                        this_area.push(cur_pos);
                        let neighbours = match connectivity {
                            Connectivity::Four => self.n4_positions(cur_pos),
                            Connectivity::Eight => self.n8_positions(cur_pos),
                        };
                        for neigh in neighbours {
                            if pred(self[neigh]) && set.insert(neigh) {
                                bfs_q.push_back(neigh);
                            }
                        }
                    }
                    ans.push(this_area);
                }
                ans
            }

            /// 按照 `connectivity` 规则获得图像中所有前景区域.
            #[inline]
            pub fn foreground_areas(&self, connectivity: Connectivity) -> Areas2d {
                self.areas(is_foreground, connectivity)
            }

            /// 对前景做连通区域标记, 并计算每个区域的包围盒.
            pub fn regions(&self, connectivity: Connectivity) -> Vec<Region> {
                self.foreground_areas(connectivity)
                    .into_iter()
                    .enumerate()
                    .map(|(i, pixels)| {
                        let mut bbox = (usize::MAX, usize::MAX, 0, 0);
                        for &(h, w) in pixels.iter() {
                            bbox.0 = bbox.0.min(h);
                            bbox.1 = bbox.1.min(w);
                            bbox.2 = bbox.2.max(h + 1);
                            bbox.3 = bbox.3.max(w + 1);
                        }
                        Region {
                            label: i + 1,
                            bbox,
                            pixels,
                        }
                    })
                    .collect()
            }
        }
    };
}

impl_mask_slice_immut!('a, MaskSlice<'a>, ArrayView2<'a, u8>);
impl_mask_slice_immut!('a, MaskSliceMut<'a>, ArrayViewMut2<'a, u8>);

/// 拥有所有权的二维掩码切片.
///
/// `OwnedMaskSlice` 仅提供到 `MaskSlice` 和 `MaskSliceMut`
/// 的轻量转换和底层数据移动, 不提供任何其它方法.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Clone, Debug)]
pub struct OwnedMaskSlice {
    data: Array2<u8>,
}

impl OwnedMaskSlice {
    /// 从已有的二维数组直接构建.
    #[inline]
    pub fn from_raw(data: Array2<u8>) -> Self {
        Self { data }
    }

    /// 获得不可变切片引用.
    #[inline]
    pub fn as_immut(&self) -> MaskSlice<'_> {
        MaskSlice::new(self.data.view())
    }

    /// 获得可变切片引用.
    #[inline]
    pub fn as_mutable(&mut self) -> MaskSliceMut<'_> {
        MaskSliceMut::new(self.data.view_mut())
    }

    /// 直接获得底层数据.
    #[inline]
    pub fn into_raw(self) -> Array2<u8> {
        self.data
    }
}

/// 不可变、借用的二维水平 CT 扫描切片.
pub struct ScanSlice<'a> {
    /// 底层数据的轻量级视图, 借用于 [`crate::CtVolume`].
    data: ArrayView2<'a, f32>,
}

impl Index<Idx2d> for ScanSlice<'_> {
    type Output = f32;

    #[inline]
    fn index(&self, index: Idx2d) -> &Self::Output {
        &self.data[index]
    }
}

/// 可变、借用的二维水平 CT 扫描切片.
pub struct ScanSliceMut<'a> {
    /// 底层数据的轻量级视图, 借用于 [`crate::CtVolume`].
    data: ArrayViewMut2<'a, f32>,
}

/// 可变方法集合.
impl<'a> ScanSliceMut<'a> {
    /// 获得数据的一份可变 shallow copy.
    #[inline]
    pub fn data_mut(&mut self) -> ArrayViewMut2<f32> {
        self.data.view_mut()
    }
}

impl Index<Idx2d> for ScanSliceMut<'_> {
    type Output = f32;

    #[inline]
    fn index(&self, index: Idx2d) -> &Self::Output {
        &self.data[index]
    }
}

impl IndexMut<Idx2d> for ScanSliceMut<'_> {
    #[inline]
    fn index_mut(&mut self, index: Idx2d) -> &mut Self::Output {
        &mut self.data[index]
    }
}

/// scan 不可变方法集合.
macro_rules! impl_scan_slice_immut {
    ($life: lifetime, $scan: ty, $array: ty) => {
        /// 不可变方法集合.
        impl<$life> $scan {
            /// 直接初始化.
            #[inline]
            pub(crate) fn new(data: $array) -> Self {
                Self { data }
            }

            /// 获得数据的一份不可变 shallow copy.
            #[inline]
            pub fn data(&self) -> ArrayView2<f32> {
                self.data.view()
            }

            /// 获取可以迭代图像像素的迭代器.
            #[inline]
            pub fn iter(&self) -> Iter<'_, f32, Ix2> {
                self.data.iter()
            }

            /// 获取给定位置 (高, 宽) 的像素值. 越界时返回 `None`.
            #[inline]
            pub fn get(&self, pos: Idx2d) -> Option<&f32> {
                self.data.get(pos)
            }

            /// 图像的分辨率 (高, 宽).
            #[inline]
            pub fn shape(&self) -> Idx2d {
                self.data.dim()
            }

            /// 图像的像素个数.
            #[inline]
            pub fn size(&self) -> usize {
                let (h, w) = self.shape();
                h * w
            }

            /// 克隆自己, 获得一个拥有所有权的切片对象.
            pub fn to_owned(&self) -> OwnedScanSlice {
                OwnedScanSlice {
                    data: self.data.to_owned(),
                }
            }

            /// 以行优先规则, 获取能迭代图像所有 `(索引, CT HU 值)` 的迭代器.
            #[inline]
            pub fn indexed_iter(&self) -> impl Iterator<Item = (Idx2d, &f32)> {
                self.data.indexed_iter()
            }

            /// 计算由 `it` 给出的所有索引对应的 CT HU 值的平均值.
            /// `it` 为空时返回 NaN.
            ///
            /// 如果存在越界索引, 则程序 panic.
            pub fn mean_hu<I: IntoIterator<Item = Idx2d>>(&self, it: I) -> f64 {
                let mut count = 0u64;
                let mut hu = 0.0;
                for pos in it.into_iter() {
                    count += 1;
                    hu += self[pos] as f64;
                }
                hu / (count as f64)
            }
        }
    };
}

impl_scan_slice_immut!('a, ScanSlice<'a>, ArrayView2<'a, f32>);
impl_scan_slice_immut!('a, ScanSliceMut<'a>, ArrayViewMut2<'a, f32>);

/// 拥有所有权的二维水平 CT 扫描切片.
///
/// `OwnedScanSlice` 仅提供到 `ScanSlice` 和 `ScanSliceMut`
/// 的轻量转换和底层数据移动, 不提供任何其它方法.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct OwnedScanSlice {
    data: Array2<f32>,
}

impl OwnedScanSlice {
    /// 从已有的二维数组直接构建.
    #[inline]
    pub fn from_raw(data: Array2<f32>) -> Self {
        Self { data }
    }

    /// 获得不可变切片引用.
    #[inline]
    pub fn as_immutable(&self) -> ScanSlice<'_> {
        ScanSlice::new(self.data.view())
    }

    /// 获得可变切片引用.
    #[inline]
    pub fn as_mutable(&mut self) -> ScanSliceMut<'_> {
        ScanSliceMut::new(self.data.view_mut())
    }

    /// 直接获得底层数据.
    #[inline]
    pub fn into_raw(self) -> Array2<f32> {
        self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_regions_eight_connectivity() {
        let m = OwnedMaskSlice::from_raw(array![
            [1u8, 0, 0, 0, 0],
            [0, 1, 0, 0, 1],
            [0, 0, 0, 0, 1],
            [0, 0, 0, 0, 0],
        ]);
        let s = m.as_immut();

        // 对角相连的两个像素在 4-邻接下不连通.
        assert_eq!(s.foreground_areas(Connectivity::Four).len(), 3);

        let regions = s.regions(Connectivity::Eight);
        assert_eq!(regions.len(), 2);
        assert_eq!(regions[0].label, 1);
        assert_eq!(regions[0].bbox, (0, 0, 2, 2));
        assert_eq!(regions[0].area(), 2);
        assert_eq!(regions[1].bbox, (1, 4, 3, 5));
        assert_eq!(regions[1].bbox_height(), 2);
        assert_eq!(regions[1].bbox_width(), 1);
    }

    #[test]
    fn test_retain_regions() {
        let mut m = OwnedMaskSlice::from_raw(array![
            [1u8, 1, 0, 0],
            [1, 1, 0, 1],
            [0, 0, 0, 0],
        ]);
        let kept = m
            .as_mutable()
            .retain_regions(Connectivity::Eight, |r| r.area() > 1);
        assert_eq!(kept, 1);
        assert_eq!(m.as_immut().foreground_count(), 4);
        assert_eq!(m.as_immut()[(1, 3)], MASK_BACKGROUND);
    }

    #[test]
    fn test_scan_mean_hu() {
        let s = OwnedScanSlice::from_raw(array![[-1000.0f32, 0.0], [40.0, 60.0]]);
        let s = s.as_immutable();
        assert_eq!(s.mean_hu([(1, 0), (1, 1)]), 50.0);
        assert!(s.mean_hu(std::iter::empty()).is_nan());
    }
}
