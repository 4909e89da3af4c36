//! 一维 2-均值聚类.

/// 对 `values` 做 2 类一维 k-means, 返回升序排列的两个聚类中心.
///
/// 中心从最小值和最大值开始, 反复执行 Lloyd 迭代直到各点归属不再变化.
/// 与两个中心距离相等的点归入较小的中心. NaN 被忽略.
/// 没有有限值时返回 `None`.
pub fn kmeans_two_1d<I>(values: I) -> Option<(f64, f64)>
where
    I: IntoIterator<Item = f32>,
{
    let values: Vec<f64> = values
        .into_iter()
        .filter(|v| !v.is_nan())
        .map(f64::from)
        .collect();
    let (mut lo, mut hi) = values
        .iter()
        .fold(None, |acc: Option<(f64, f64)>, &v| match acc {
            None => Some((v, v)),
            Some((a, b)) => Some((a.min(v), b.max(v))),
        })?;

    let mut labels = vec![false; values.len()];
    // Lloyd 迭代在有限步内收敛, 上限只是保险.
    for iter in 0..300 {
        let mut changed = false;
        let (mut sum_lo, mut n_lo, mut sum_hi, mut n_hi) = (0.0, 0usize, 0.0, 0usize);
        for (v, label) in values.iter().zip(labels.iter_mut()) {
            let is_hi = (v - hi).abs() < (v - lo).abs();
            changed |= is_hi != *label;
            *label = is_hi;
            if is_hi {
                sum_hi += v;
                n_hi += 1;
            } else {
                sum_lo += v;
                n_lo += 1;
            }
        }
        if n_lo > 0 {
            lo = sum_lo / n_lo as f64;
        }
        if n_hi > 0 {
            hi = sum_hi / n_hi as f64;
        }
        if !changed && iter > 0 {
            break;
        }
    }
    Some(if lo <= hi { (lo, hi) } else { (hi, lo) })
}

/// 两个聚类中心的均值, 用作二值化阈值.
#[inline]
pub fn kmeans_threshold<I>(values: I) -> Option<f64>
where
    I: IntoIterator<Item = f32>,
{
    kmeans_two_1d(values).map(|(a, b)| (a + b) / 2.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_clusters() {
        let v = [0.0f32, 1.0, 2.0, 10.0, 11.0, 12.0];
        let (a, b) = kmeans_two_1d(v).unwrap();
        assert!((a - 1.0).abs() < 1e-9);
        assert!((b - 11.0).abs() < 1e-9);
        assert!((kmeans_threshold(v).unwrap() - 6.0).abs() < 1e-9);
    }

    #[test]
    fn test_degenerate() {
        assert_eq!(kmeans_two_1d(std::iter::empty()), None);
        assert_eq!(kmeans_two_1d([f32::NAN]), None);
        assert_eq!(kmeans_two_1d([4.0f32, 4.0]), Some((4.0, 4.0)));
    }

    #[test]
    fn test_unbalanced() {
        // 初始中心为 0 和 100, 第一轮后高类中心是 100, 低类中心约为 2.
        let mut v = vec![0.0f32; 50];
        v.extend([1.0, 2.0, 3.0, 100.0]);
        let (a, b) = kmeans_two_1d(v).unwrap();
        assert!(a < 1.0);
        assert_eq!(b, 100.0);
    }
}
