//! 形状特征. 体积按体素计数, 表面积按暴露的体素面计算.

use super::FeatureVector;
use crate::annotation::exposed_face_area;
use ndarray::ArrayView3;
use std::f64::consts::PI;

const CLASS: &str = "shape";

/// 对称 3x3 矩阵的特征值, 升序.
pub(crate) fn symmetric_eigenvalues(a: [[f64; 3]; 3]) -> [f64; 3] {
    let p1 = a[0][1].powi(2) + a[0][2].powi(2) + a[1][2].powi(2);
    if p1 == 0.0 {
        let mut d = [a[0][0], a[1][1], a[2][2]];
        d.sort_unstable_by(|x, y| x.total_cmp(y));
        return d;
    }
    let q = (a[0][0] + a[1][1] + a[2][2]) / 3.0;
    let p2 = (a[0][0] - q).powi(2) + (a[1][1] - q).powi(2) + (a[2][2] - q).powi(2) + 2.0 * p1;
    let p = (p2 / 6.0).sqrt();
    let mut b = a;
    for (i, row) in b.iter_mut().enumerate() {
        for (j, v) in row.iter_mut().enumerate() {
            *v = (*v - if i == j { q } else { 0.0 }) / p;
        }
    }
    let det = b[0][0] * (b[1][1] * b[2][2] - b[1][2] * b[2][1])
        - b[0][1] * (b[1][0] * b[2][2] - b[1][2] * b[2][0])
        + b[0][2] * (b[1][0] * b[2][1] - b[1][1] * b[2][0]);
    let phi = (det / 2.0).clamp(-1.0, 1.0).acos() / 3.0;
    let largest = q + 2.0 * p * phi.cos();
    let smallest = q + 2.0 * p * (phi + 2.0 * PI / 3.0).cos();
    [smallest, 3.0 * q - largest - smallest, largest]
}

/// 是否有 6-邻域的背景体素 (含图像外).
fn on_surface(mask: &ArrayView3<bool>, (z, h, w): (usize, usize, usize)) -> bool {
    let (nz, nh, nw) = mask.dim();
    z == 0
        || h == 0
        || w == 0
        || z + 1 == nz
        || h + 1 == nh
        || w + 1 == nw
        || !mask[(z - 1, h, w)]
        || !mask[(z + 1, h, w)]
        || !mask[(z, h - 1, w)]
        || !mask[(z, h + 1, w)]
        || !mask[(z, h, w - 1)]
        || !mask[(z, h, w + 1)]
}

fn axis_length(eig: f64) -> f64 {
    if eig < 0.0 {
        f64::NAN
    } else {
        4.0 * eig.sqrt()
    }
}

/// `roi` 的形状特征. `spacing` 为 `[z, h, w]` 方向的体素边长.
pub fn shape_features(roi: ArrayView3<bool>, spacing: [f64; 3]) -> FeatureVector {
    let [dz, dh, dw] = spacing;
    let coords: Vec<(usize, usize, usize)> = roi
        .indexed_iter()
        .filter(|&(_, &v)| v)
        .map(|(idx, _)| idx)
        .collect();
    let n = coords.len() as f64;
    let physical = |(z, h, w): (usize, usize, usize)| [z as f64 * dz, h as f64 * dh, w as f64 * dw];

    let volume = n * dz * dh * dw;
    let area = exposed_face_area(roi, spacing);

    let mut centre = [0.0; 3];
    for &c in coords.iter() {
        for (m, p) in centre.iter_mut().zip(physical(c)) {
            *m += p / n;
        }
    }
    let mut cov = [[0.0; 3]; 3];
    for &c in coords.iter() {
        let p = physical(c);
        for i in 0..3 {
            for j in 0..3 {
                cov[i][j] += (p[i] - centre[i]) * (p[j] - centre[j]) / n;
            }
        }
    }
    let [least, minor, major] =
        symmetric_eigenvalues(cov).map(|e| if e.abs() < 1e-12 { 0.0 } else { e });

    let surface: Vec<_> = coords
        .iter()
        .copied()
        .filter(|&c| on_surface(&roi, c))
        .collect();
    let (mut d3, mut d_slice, mut d_row, mut d_col) = (0.0f64, 0.0f64, 0.0f64, 0.0f64);
    for (i, &a) in surface.iter().enumerate() {
        let pa = physical(a);
        for &b in surface[i + 1..].iter() {
            let pb = physical(b);
            let d = ((pa[0] - pb[0]).powi(2) + (pa[1] - pb[1]).powi(2) + (pa[2] - pb[2]).powi(2))
                .sqrt();
            d3 = d3.max(d);
            if a.0 == b.0 {
                d_slice = d_slice.max(d);
            }
            if a.1 == b.1 {
                d_row = d_row.max(d);
            }
            if a.2 == b.2 {
                d_col = d_col.max(d);
            }
        }
    }

    let ratio = |x: f64| if major > 0.0 { (x / major).sqrt() } else { f64::NAN };
    let mut ans = FeatureVector::new();
    ans.insert(CLASS, "Elongation", ratio(minor));
    ans.insert(CLASS, "Flatness", ratio(least));
    ans.insert(CLASS, "LeastAxisLength", axis_length(least));
    ans.insert(CLASS, "MajorAxisLength", axis_length(major));
    ans.insert(CLASS, "Maximum2DDiameterColumn", d_col);
    ans.insert(CLASS, "Maximum2DDiameterRow", d_row);
    ans.insert(CLASS, "Maximum2DDiameterSlice", d_slice);
    ans.insert(CLASS, "Maximum3DDiameter", d3);
    ans.insert(CLASS, "MinorAxisLength", axis_length(minor));
    ans.insert(CLASS, "Sphericity", (36.0 * PI * volume * volume).cbrt() / area);
    ans.insert(CLASS, "SurfaceArea", area);
    ans.insert(CLASS, "SurfaceVolumeRatio", area / volume);
    ans.insert(CLASS, "VoxelVolume", volume);
    ans
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{s, Array3};

    fn get(f: &FeatureVector, name: &str) -> f64 {
        f.get(&format!("original_shape_{name}")).unwrap()
    }

    #[test]
    fn test_eigenvalues() {
        let e = symmetric_eigenvalues([[3.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 2.0]]);
        assert_eq!(e, [1.0, 2.0, 3.0]);
        // [[2,1,0],[1,2,0],[0,0,5]] 的特征值为 1, 3, 5.
        let e = symmetric_eigenvalues([[2.0, 1.0, 0.0], [1.0, 2.0, 0.0], [0.0, 0.0, 5.0]]);
        for (a, b) in e.iter().zip([1.0, 3.0, 5.0]) {
            assert!((a - b).abs() < 1e-9, "{e:?}");
        }
    }

    #[test]
    fn test_cube() {
        let mut m = Array3::from_elem((5, 5, 5), false);
        m.slice_mut(s![1..4, 1..4, 1..4]).fill(true);
        let f = shape_features(m.view(), [1.0, 1.0, 1.0]);
        assert_eq!(get(&f, "VoxelVolume"), 27.0);
        assert_eq!(get(&f, "SurfaceArea"), 54.0);
        assert!((get(&f, "Maximum3DDiameter") - 12f64.sqrt()).abs() < 1e-9);
        assert!((get(&f, "Maximum2DDiameterSlice") - 8f64.sqrt()).abs() < 1e-9);
        assert!((get(&f, "Elongation") - 1.0).abs() < 1e-9);
        assert!((get(&f, "Flatness") - 1.0).abs() < 1e-9);
        let sphericity = get(&f, "Sphericity");
        assert!(sphericity > 0.0 && sphericity < 1.0);
    }

    #[test]
    fn test_rod_spacing() {
        let m = Array3::from_elem((1, 1, 4), true);
        let f = shape_features(m.view(), [2.0, 1.0, 0.5]);
        assert_eq!(get(&f, "VoxelVolume"), 4.0);
        assert!((get(&f, "Maximum3DDiameter") - 1.5).abs() < 1e-9);
        assert_eq!(get(&f, "Flatness"), 0.0);
        assert_eq!(get(&f, "Elongation"), 0.0);
        assert_eq!(get(&f, "LeastAxisLength"), 0.0);
    }
}
