//! 灰度共生矩阵 (GLCM) 特征.
//!
//! 在 13 个三维方向 (距离 1) 上分别构建对称的共生矩阵, 每个方向计算一组特征后取平均.
//! 不存在体素对的方向 (如单层图像的 z 方向) 被忽略.

use super::first_order::EPS;
use super::{Binning, FeatureVector};
use ndarray::{ArrayView3, Zip};
use std::collections::BTreeMap;

const CLASS: &str = "glcm";

const NAMES: [&str; 20] = [
    "Autocorrelation",
    "ClusterProminence",
    "ClusterShade",
    "ClusterTendency",
    "Contrast",
    "Correlation",
    "DifferenceAverage",
    "DifferenceEntropy",
    "DifferenceVariance",
    "Id",
    "Idm",
    "Idmn",
    "Idn",
    "InverseVariance",
    "JointAverage",
    "JointEnergy",
    "JointEntropy",
    "MaximumProbability",
    "SumEntropy",
    "SumSquares",
];

/// 字典序为正的 13 个邻接方向.
fn directions() -> impl Iterator<Item = [isize; 3]> {
    itertools::iproduct!(-1..=1isize, -1..=1isize, -1..=1isize)
        .map(|(z, h, w)| [z, h, w])
        .filter(|&d| d > [0, 0, 0])
}

fn entropy<'a, I: IntoIterator<Item = &'a f64>>(probs: I) -> f64 {
    -probs.into_iter().map(|p| p * (p + EPS).log2()).sum::<f64>()
}

/// 单个方向上归一化共生矩阵 `p` 的特征, 顺序与 [`NAMES`] 一致.
///
/// `gray[i]` 为第 `i` 行对应的灰度级.
fn matrix_features(p: &[f64], gray: &[f64]) -> [f64; NAMES.len()] {
    let ng = gray.len();
    let cells = || {
        (0..ng).flat_map(move |i| (0..ng).map(move |j| (gray[i], gray[j], p[i * ng + j])))
    };

    let px: Vec<f64> = (0..ng).map(|i| p[i * ng..(i + 1) * ng].iter().sum()).collect();
    let ux: f64 = px.iter().zip(gray).map(|(p, g)| p * g).sum();
    // 对称矩阵: py = px, uy = ux.
    let var_x: f64 = px.iter().zip(gray).map(|(p, g)| p * (g - ux).powi(2)).sum();

    let mut sum_dist = BTreeMap::<u64, f64>::new();
    let mut diff_dist = BTreeMap::<u64, f64>::new();
    for (i, j, v) in cells() {
        *sum_dist.entry((i + j) as u64).or_default() += v;
        *diff_dist.entry((i - j).abs() as u64).or_default() += v;
    }
    let diff = || diff_dist.iter().map(|(&k, &v)| (k as f64, v));
    let nf = ng as f64;
    let da: f64 = diff().map(|(k, v)| k * v).sum();

    let moment = |n: i32| cells().map(|(i, j, v)| (i + j - 2.0 * ux).powi(n) * v).sum::<f64>();
    let autocorrelation: f64 = cells().map(|(i, j, v)| i * j * v).sum();
    let correlation = if var_x > 0.0 {
        (autocorrelation - ux * ux) / var_x
    } else {
        1.0
    };

    [
        autocorrelation,
        moment(4),
        moment(3),
        moment(2),
        cells().map(|(i, j, v)| (i - j).powi(2) * v).sum(),
        correlation,
        da,
        entropy(diff_dist.values()),
        diff().map(|(k, v)| (k - da).powi(2) * v).sum(),
        diff().map(|(k, v)| v / (1.0 + k)).sum(),
        diff().map(|(k, v)| v / (1.0 + k * k)).sum(),
        diff().map(|(k, v)| v / (1.0 + k * k / (nf * nf))).sum(),
        diff().map(|(k, v)| v / (1.0 + k / nf)).sum(),
        diff().filter(|&(k, _)| k > 0.0).map(|(k, v)| v / (k * k)).sum(),
        ux,
        p.iter().map(|v| v * v).sum(),
        entropy(p.iter()),
        p.iter().copied().fold(0.0, f64::max),
        entropy(sum_dist.values()),
        var_x,
    ]
}

/// `roi` 内离散化灰度的 GLCM 特征. `roi` 内的体素值必须全部为有限值.
pub fn glcm_features(scan: ArrayView3<f32>, roi: ArrayView3<bool>, bin_width: f64) -> FeatureVector {
    let mut values = vec![];
    Zip::from(&scan).and(&roi).for_each(|&v, &m| {
        if m {
            values.push(v as f64);
        }
    });
    let binning = Binning::new(values.iter().copied(), bin_width);
    let levels = Zip::from(&scan)
        .and(&roi)
        .map_collect(|&v, &m| if m { binning.level(v as f64) } else { 0 });

    let max_level = levels.iter().copied().max().unwrap_or(0);
    let mut present = vec![false; max_level + 1];
    for &l in levels.iter().filter(|&&l| l > 0) {
        present[l] = true;
    }
    let gray: Vec<f64> = (1..=max_level)
        .filter(|&l| present[l])
        .map(|l| l as f64)
        .collect();
    let mut index = vec![0usize; max_level + 1];
    for (i, &g) in gray.iter().enumerate() {
        index[g as usize] = i;
    }
    let ng = gray.len();

    let (nz, nh, nw) = levels.dim();
    let mut acc = [0.0; NAMES.len()];
    let mut used = 0usize;
    for d in directions() {
        let mut mat = vec![0.0f64; ng * ng];
        for ((z, h, w), &l) in levels.indexed_iter().filter(|&(_, &l)| l > 0) {
            let (z1, h1, w1) = (z as isize + d[0], h as isize + d[1], w as isize + d[2]);
            if z1 < 0 || h1 < 0 || w1 < 0 {
                continue;
            }
            let (z1, h1, w1) = (z1 as usize, h1 as usize, w1 as usize);
            if z1 >= nz || h1 >= nh || w1 >= nw || levels[(z1, h1, w1)] == 0 {
                continue;
            }
            let (i, j) = (index[l], index[levels[(z1, h1, w1)]]);
            mat[i * ng + j] += 1.0;
            mat[j * ng + i] += 1.0;
        }
        let total: f64 = mat.iter().sum();
        if total == 0.0 {
            continue;
        }
        mat.iter_mut().for_each(|v| *v /= total);
        for (a, f) in acc.iter_mut().zip(matrix_features(&mat, &gray)) {
            *a += f;
        }
        used += 1;
    }

    let mut ans = FeatureVector::new();
    for (name, a) in NAMES.iter().zip(acc) {
        let v = if used == 0 { f64::NAN } else { a / used as f64 };
        ans.insert(CLASS, name, v);
    }
    ans
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array3};

    fn get(f: &FeatureVector, name: &str) -> f64 {
        f.get(&format!("original_glcm_{name}")).unwrap()
    }

    #[test]
    fn test_directions() {
        let d: Vec<_> = directions().collect();
        assert_eq!(d.len(), 13);
        assert!(d.contains(&[0, 0, 1]));
        assert!(d.contains(&[1, -1, -1]));
        assert!(!d.contains(&[0, 0, -1]));
    }

    #[test]
    fn test_two_levels() {
        let scan = array![[[0.0f32, 30.0], [0.0, 30.0]]];
        let roi = Array3::from_elem((1, 2, 2), true);
        let f = glcm_features(scan.view(), roi.view(), 25.0);
        assert_eq!(f.len(), NAMES.len());
        // 四个平面内方向中有三个的灰度对不同.
        assert!((get(&f, "Contrast") - 0.75).abs() < 1e-12);
        assert!((get(&f, "JointEnergy") - 0.5).abs() < 1e-12);
        assert!((get(&f, "JointAverage") - 1.5).abs() < 1e-12);
        assert!((get(&f, "DifferenceAverage") - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_uniform_and_single_voxel() {
        let scan = Array3::from_elem((2, 3, 3), 10.0f32);
        let roi = Array3::from_elem((2, 3, 3), true);
        let f = glcm_features(scan.view(), roi.view(), 25.0);
        assert_eq!(get(&f, "Contrast"), 0.0);
        assert_eq!(get(&f, "Correlation"), 1.0);
        assert_eq!(get(&f, "JointEnergy"), 1.0);
        assert_eq!(get(&f, "Idn"), 1.0);

        let mut roi = Array3::from_elem((2, 3, 3), false);
        roi[(0, 1, 1)] = true;
        let f = glcm_features(scan.view(), roi.view(), 25.0);
        assert!(get(&f, "Contrast").is_nan());
    }
}
