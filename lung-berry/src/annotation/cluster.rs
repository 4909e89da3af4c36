//! 把多位放射科医生的标注聚类为结节.

use super::Annotation;
use crate::consts::MAX_ANNOTATORS;
use crate::VolumeGeometry;
use log::{debug, warn};
use std::collections::VecDeque;

/// 同一个物理结节的全部标注, 每位放射科医生至多一个.
pub type Nodule = Vec<Annotation>;

/// 聚类参数.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ClusterOptions {
    /// 初始距离阈值 (毫米). `None` 表示取水平像素间距.
    pub tol: Option<f64>,

    /// 某个簇标注过多时, 阈值的收缩倍率.
    pub factor: f64,

    /// 阈值下限.
    pub min_tol: f64,
}

impl Default for ClusterOptions {
    fn default() -> Self {
        Self {
            tol: None,
            factor: 0.9,
            min_tol: 0.1,
        }
    }
}

/// 两个标注的轮廓点之间的最小欧氏距离 (毫米).
///
/// 水平坐标乘以像素间距, z 取轮廓的 z 位置. 任一标注无轮廓点时返回无穷大.
pub fn contour_distance(a: &Annotation, b: &Annotation, geometry: &VolumeGeometry) -> f64 {
    let (ph, pw) = geometry.pixel_spacing();
    let physical = |ann: &Annotation| -> Vec<[f64; 3]> {
        ann.contours
            .iter()
            .flat_map(|c| {
                c.points
                    .iter()
                    .map(move |&(h, w)| [c.z, h as f64 * ph, w as f64 * pw])
            })
            .collect()
    };
    let (pa, pb) = (physical(a), physical(b));
    let mut best = f64::INFINITY;
    for p in pa.iter() {
        for q in pb.iter() {
            let d2 = (p[0] - q[0]).powi(2) + (p[1] - q[1]).powi(2) + (p[2] - q[2]).powi(2);
            best = best.min(d2);
        }
    }
    best.sqrt()
}

/// 以 `adjacent` 为邻接关系求连通分量, 按首个成员的下标排序.
fn connected_components<F>(n: usize, adjacent: F) -> Vec<Vec<usize>>
where
    F: Fn(usize, usize) -> bool,
{
    let mut seen = vec![false; n];
    let mut ans = vec![];
    for start in 0..n {
        if seen[start] {
            continue;
        }
        seen[start] = true;
        let mut comp = vec![];
        let mut q = VecDeque::from([start]);
        while let Some(i) = q.pop_front() {
            comp.push(i);
            for j in 0..n {
                if !seen[j] && adjacent(i, j) {
                    seen[j] = true;
                    q.push_back(j);
                }
            }
        }
        comp.sort_unstable();
        ans.push(comp);
    }
    ans
}

/// 把 `anns` 聚类为结节.
///
/// 两个标注相邻, 当且仅当它们的轮廓距离不超过阈值; 结节即相邻关系的连通分量.
/// 若某个结节的标注多于 [`MAX_ANNOTATORS`] 且阈值仍大于下限,
/// 则把阈值乘以 `factor` 后重新聚类.
pub fn cluster_annotations(
    anns: &[Annotation],
    geometry: &VolumeGeometry,
    options: ClusterOptions,
) -> Vec<Nodule> {
    let n = anns.len();
    let mut dist = vec![0.0f64; n * n];
    for i in 0..n {
        for j in i + 1..n {
            let d = contour_distance(&anns[i], &anns[j], geometry);
            dist[i * n + j] = d;
            dist[j * n + i] = d;
        }
    }

    let mut tol = options.tol.unwrap_or(geometry.pixel_spacing().0);
    let mut comps = connected_components(n, |i, j| dist[i * n + j] <= tol);
    while comps.iter().any(|c| c.len() > MAX_ANNOTATORS) && tol > options.min_tol {
        tol *= options.factor;
        comps = connected_components(n, |i, j| dist[i * n + j] <= tol);
    }
    if comps.iter().any(|c| c.len() > MAX_ANNOTATORS) {
        warn!(
            "clustering stopped at tolerance {tol:.3}mm with a nodule of more than \
             {MAX_ANNOTATORS} annotations"
        );
    }
    debug!("{n} annotations -> {} nodules (tol {tol:.3}mm)", comps.len());

    comps
        .into_iter()
        .map(|c| c.into_iter().map(|i| anns[i].clone()).collect())
        .collect()
}
