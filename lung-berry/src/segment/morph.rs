//! 矩形结构元素的二维灰度形态学操作.
//!
//! 越界像素不参与计算.

use ndarray::{Array2, ArrayView2, Axis};

/// 沿 `axis` 对每个位置取 `[i + lo, i + hi]` 窗口内的极值. 越界部分被忽略.
fn extreme_along(img: ArrayView2<u8>, axis: Axis, lo: isize, hi: isize, max: bool) -> Array2<u8> {
    let mut out = img.to_owned();
    let n = img.len_of(axis) as isize;
    for (src, mut dst) in img.lanes(axis).into_iter().zip(out.lanes_mut(axis)) {
        for i in 0..n {
            let a = (i + lo).max(0);
            let b = (i + hi).min(n - 1);
            let window = (a..=b).map(|k| src[k as usize]);
            let v = if max { window.max() } else { window.min() };
            // 窗口至少包含 i 自身.
            dst[i as usize] = v.unwrap_or(src[i as usize]);
        }
    }
    out
}

/// 大小为 `size` 的结构元素相对于原点的偏移范围 `[-(size / 2), size - 1 - size / 2]`.
#[inline]
fn footprint_range(size: usize) -> (isize, isize) {
    let half = (size / 2) as isize;
    (-half, size as isize - 1 - half)
}

/// 以 `(kh, kw)` 全 1 矩形为结构元素腐蚀.
pub fn erode(img: ArrayView2<u8>, (kh, kw): (usize, usize)) -> Array2<u8> {
    let (h_lo, h_hi) = footprint_range(kh.max(1));
    let (w_lo, w_hi) = footprint_range(kw.max(1));
    let rows = extreme_along(img, Axis(1), w_lo, w_hi, false);
    extreme_along(rows.view(), Axis(0), h_lo, h_hi, false)
}

/// 以 `(kh, kw)` 全 1 矩形为结构元素膨胀. 使用镜像后的结构元素,
/// 即偏移范围为 `[-(size - 1 - size / 2), size / 2]`.
pub fn dilate(img: ArrayView2<u8>, (kh, kw): (usize, usize)) -> Array2<u8> {
    let (h_lo, h_hi) = footprint_range(kh.max(1));
    let (w_lo, w_hi) = footprint_range(kw.max(1));
    let rows = extreme_along(img, Axis(1), -w_hi, -w_lo, true);
    extreme_along(rows.view(), Axis(0), -h_hi, -h_lo, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_footprint_range() {
        assert_eq!(footprint_range(3), (-1, 1));
        assert_eq!(footprint_range(4), (-2, 1));
        assert_eq!(footprint_range(10), (-5, 4));
        assert_eq!(footprint_range(1), (0, 0));
    }

    #[test]
    fn test_dilate_single_pixel() {
        let mut img = Array2::<u8>::zeros((7, 7));
        img[(3, 3)] = 1;
        let out = dilate(img.view(), (4, 4));
        // 镜像偏移为 [-1, 2], 单点扩散到行列 [1, 4].
        assert_eq!(out.iter().filter(|&&v| v == 1).count(), 16);
        assert_eq!(out[(1, 1)], 1);
        assert_eq!(out[(4, 4)], 1);
        assert_eq!(out[(5, 5)], 0);
    }

    #[test]
    fn test_erode_then_dilate() {
        let img = array![
            [0u8, 0, 0, 0, 0],
            [0, 1, 1, 1, 0],
            [0, 1, 1, 1, 0],
            [0, 1, 1, 1, 0],
            [0, 0, 0, 0, 0]
        ];
        let e = erode(img.view(), (3, 3));
        assert_eq!(e.iter().filter(|&&v| v == 1).count(), 1);
        assert_eq!(e[(2, 2)], 1);
        let d = dilate(e.view(), (3, 3));
        assert_eq!(d, img);
    }

    #[test]
    fn test_border_ignored() {
        let img = Array2::<u8>::ones((3, 3));
        assert_eq!(erode(img.view(), (4, 4)), img);
    }
}
