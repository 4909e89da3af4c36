//! 一阶统计特征.

use super::{Binning, FeatureVector};
use ordered_float::OrderedFloat;

const CLASS: &str = "firstorder";

/// 避免 `log2(0)`.
pub(crate) const EPS: f64 = 2.220446049250313e-16;

/// 线性插值分位数, `sorted` 升序且非空.
fn percentile(sorted: &[f64], q: f64) -> f64 {
    let pos = q / 100.0 * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

fn mean_abs_dev(values: &[f64]) -> f64 {
    let m = mean(values);
    values.iter().map(|v| (v - m).abs()).sum::<f64>() / values.len() as f64
}

/// 计算 ROI 内体素值 `values` 的一阶统计特征.
///
/// `voxel` 为单个体素的体积, `bin_width` 为直方图箱宽. `values` 不能为空,
/// 且必须全部为有限值, 否则程序 panic.
pub fn first_order_features(values: &[f64], voxel: f64, bin_width: f64) -> FeatureVector {
    let n = values.len() as f64;
    let mut sorted = values.to_vec();
    sorted.sort_unstable_by_key(|&v| OrderedFloat(v));

    let binning = Binning::new(sorted.iter().copied(), bin_width);
    let levels = sorted
        .last()
        .map_or(0, |&v| binning.level(v));
    let mut hist = vec![0usize; levels + 1];
    for &v in values {
        hist[binning.level(v)] += 1;
    }
    let probs: Vec<f64> = hist
        .iter()
        .filter(|&&c| c > 0)
        .map(|&c| c as f64 / n)
        .collect();

    let energy: f64 = values.iter().map(|v| v * v).sum();
    let mu = mean(values);
    let moment = |k: i32| values.iter().map(|v| (v - mu).powi(k)).sum::<f64>() / n;
    let m2 = moment(2);
    let (skewness, kurtosis) = if m2 == 0.0 {
        (0.0, 0.0)
    } else {
        (moment(3) / m2.powf(1.5), moment(4) / (m2 * m2))
    };

    let p10 = percentile(&sorted, 10.0);
    let p90 = percentile(&sorted, 90.0);
    let robust: Vec<f64> = sorted
        .iter()
        .copied()
        .filter(|&v| v >= p10 && v <= p90)
        .collect();

    let mut ans = FeatureVector::new();
    ans.insert(CLASS, "10Percentile", p10);
    ans.insert(CLASS, "90Percentile", p90);
    ans.insert(CLASS, "Energy", energy);
    ans.insert(
        CLASS,
        "Entropy",
        -probs.iter().map(|p| p * (p + EPS).log2()).sum::<f64>(),
    );
    ans.insert(
        CLASS,
        "InterquartileRange",
        percentile(&sorted, 75.0) - percentile(&sorted, 25.0),
    );
    ans.insert(CLASS, "Kurtosis", kurtosis);
    ans.insert(CLASS, "Maximum", sorted[sorted.len() - 1]);
    ans.insert(CLASS, "MeanAbsoluteDeviation", mean_abs_dev(values));
    ans.insert(CLASS, "Mean", mu);
    ans.insert(CLASS, "Median", percentile(&sorted, 50.0));
    ans.insert(CLASS, "Minimum", sorted[0]);
    ans.insert(CLASS, "Range", sorted[sorted.len() - 1] - sorted[0]);
    ans.insert(CLASS, "RobustMeanAbsoluteDeviation", mean_abs_dev(&robust));
    ans.insert(CLASS, "RootMeanSquared", (energy / n).sqrt());
    ans.insert(CLASS, "Skewness", skewness);
    ans.insert(CLASS, "TotalEnergy", voxel * energy);
    ans.insert(CLASS, "Uniformity", probs.iter().map(|p| p * p).sum());
    ans.insert(CLASS, "Variance", m2);
    ans
}
