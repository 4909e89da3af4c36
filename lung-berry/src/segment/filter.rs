//! 二维图像滤波.

use ndarray::{Array2, ArrayView2, Axis, Zip};

/// 按 "reflect" 模式 (`d c b a | a b c d | d c b a`) 把可能越界的索引折回 `[0, n)`.
#[inline]
fn reflect(i: isize, n: usize) -> usize {
    let n = n as isize;
    let period = 2 * n;
    let i = i.rem_euclid(period);
    (if i < n { i } else { period - 1 - i }) as usize
}

/// `size x size` 中值滤波, 边界按 reflect 模式延拓.
///
/// 窗口原点位于 `size / 2`. 偶数大小时取排序后第 `size * size / 2` 个值.
pub fn median_filter(img: ArrayView2<f32>, size: usize) -> Array2<f32> {
    let (h, w) = img.dim();
    if h == 0 || w == 0 || size == 0 {
        return img.to_owned();
    }
    let half = (size / 2) as isize;
    let mut window = Vec::with_capacity(size * size);
    Array2::from_shape_fn((h, w), |(i, j)| {
        window.clear();
        for di in 0..size as isize {
            let y = reflect(i as isize + di - half, h);
            for dj in 0..size as isize {
                let x = reflect(j as isize + dj - half, w);
                window.push(img[(y, x)]);
            }
        }
        let mid = window.len() / 2;
        *window.select_nth_unstable_by(mid, f32::total_cmp).1
    })
}

/// 各向异性扩散的传导函数.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Conductance {
    /// `exp(-(d / kappa)^2)`, 偏好高对比度边缘.
    Exponential,

    /// `1 / (1 + (d / kappa)^2)`, 偏好宽区域.
    Quadratic,

    /// Tukey 双权函数, `|d| > kappa` 时为 0.
    Tukey,
}

impl Conductance {
    #[inline]
    fn eval(&self, d: f32, kappa: f32) -> f32 {
        let r = d / kappa;
        match self {
            Self::Exponential => (-(r * r)).exp(),
            Self::Quadratic => 1.0 / (1.0 + r * r),
            Self::Tukey => {
                if d.abs() <= kappa {
                    let t = 1.0 - r * r;
                    0.5 * t * t
                } else {
                    0.0
                }
            }
        }
    }
}

/// Perona-Malik 各向异性扩散参数.
#[derive(Copy, Clone, Debug)]
pub struct DiffusionParams {
    /// 迭代次数.
    pub niter: usize,
    /// 传导系数.
    pub kappa: f32,
    /// 步长, 不超过 0.25 时数值稳定.
    pub gamma: f32,
    /// 传导函数.
    pub conductance: Conductance,
}

impl Default for DiffusionParams {
    /// `niter = 1`, `kappa = 50`, `gamma = 0.1`, 指数传导.
    fn default() -> Self {
        Self {
            niter: 1,
            kappa: 50.0,
            gamma: 0.1,
            conductance: Conductance::Exponential,
        }
    }
}

/// Perona-Malik 各向异性扩散, 体素间距为 1.
///
/// 每次迭代中, 沿每个轴取前向差分 `d` (最后一行/列保持上次的值, 初始为 0),
/// 计算通量 `m = g(d) * d`, 再令 `m[1..] = diff(m)`, 最后
/// `out += gamma * sum(m)`.
pub fn anisotropic_diffusion(img: ArrayView2<f32>, params: DiffusionParams) -> Array2<f32> {
    let mut out = img.to_owned();
    let mut deltas = [Array2::<f32>::zeros(out.dim()), Array2::<f32>::zeros(out.dim())];
    let DiffusionParams {
        niter,
        kappa,
        gamma,
        conductance,
    } = params;

    for _ in 0..niter {
        let mut update = Array2::<f32>::zeros(out.dim());
        for (axis, delta) in deltas.iter_mut().enumerate() {
            let ax = Axis(axis);
            let n = out.len_of(ax);
            if n < 2 {
                continue;
            }
            {
                let lo = out.slice_axis(ax, (0..n - 1).into());
                let hi = out.slice_axis(ax, (1..n).into());
                let mut d = delta.slice_axis_mut(ax, (0..n - 1).into());
                Zip::from(&mut d)
                    .and(&lo)
                    .and(&hi)
                    .for_each(|d, &a, &b| *d = b - a);
            }

            let flux = delta.mapv(|d| conductance.eval(d, kappa) * d);
            // m[1..] = m[1..] - m[..-1], m[0] 不变.
            let mut m = flux.clone();
            {
                let prev = flux.slice_axis(ax, (0..n - 1).into());
                let mut tail = m.slice_axis_mut(ax, (1..n).into());
                Zip::from(&mut tail).and(&prev).for_each(|t, &p| *t -= p);
            }
            update += &m;
        }
        out.scaled_add(gamma, &update);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_reflect() {
        assert_eq!(reflect(-1, 4), 0);
        assert_eq!(reflect(-2, 4), 1);
        assert_eq!(reflect(4, 4), 3);
        assert_eq!(reflect(5, 4), 2);
        assert_eq!(reflect(2, 1), 0);
    }

    #[test]
    fn test_median_filter() {
        let img = array![
            [1.0f32, 1.0, 1.0, 1.0],
            [1.0, 9.0, 1.0, 1.0],
            [1.0, 1.0, 1.0, 1.0]
        ];
        let out = median_filter(img.view(), 3);
        assert!(out.iter().all(|&v| v == 1.0));

        let img = array![[0.0f32, 5.0], [5.0, 5.0]];
        // (0, 0) 的窗口: 0 0 5 / 0 0 5 / 5 5 5.
        assert_eq!(median_filter(img.view(), 3)[(0, 0)], 5.0);
    }

    #[test]
    fn test_diffusion_constant_image() {
        let img = Array2::from_elem((5, 6), 3.0f32);
        let out = anisotropic_diffusion(img.view(), DiffusionParams::default());
        assert_eq!(out, img);
    }

    #[test]
    fn test_diffusion_one_dim_step() {
        // 单行: 只有 w 方向有差分.
        let img = array![[0.0f32, 10.0, 10.0]];
        let out = anisotropic_diffusion(img.view(), DiffusionParams::default());
        let g = (-(10.0f32 / 50.0).powi(2)).exp() * 10.0;
        // delta = [10, 0, 0], m = [g, 0, 0], diff -> [g, -g, 0].
        assert!((out[(0, 0)] - 0.1 * g).abs() < 1e-5);
        assert!((out[(0, 1)] - (10.0 - 0.1 * g)).abs() < 1e-5);
        assert_eq!(out[(0, 2)], 10.0);
    }

    #[test]
    fn test_conductance() {
        assert_eq!(Conductance::Exponential.eval(0.0, 50.0), 1.0);
        assert_eq!(Conductance::Quadratic.eval(50.0, 50.0), 0.5);
        assert_eq!(Conductance::Tukey.eval(60.0, 50.0), 0.0);
    }
}
