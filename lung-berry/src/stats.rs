//! 标注属性统计与可视化.

use crate::annotation::{Annotation, AnnotationProperties};
use crate::dataset::PatientScan;
use crate::{PrepError, Result, VolumeAttr, VolumeGeometry};
use itertools::Itertools;
use log::{debug, info, warn};
use ordered_float::OrderedFloat;
use plotters::coord::Shift;
use plotters::prelude::*;
use std::path::Path;

/// 全部标注的各项属性, 每项一个列表.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AnnotationStats {
    /// 球形度.
    pub sphericities: Vec<f64>,
    /// 体积 (立方毫米).
    pub volumes: Vec<f64>,
    /// 表面积 (平方毫米).
    pub surface_areas: Vec<f64>,
    /// 质地.
    pub textures: Vec<f64>,
    /// 恶性程度.
    pub malignancies: Vec<f64>,
    /// 钙化.
    pub calcifications: Vec<f64>,
    /// 内部结构.
    pub internal_structures: Vec<f64>,
    /// 边缘.
    pub margins: Vec<f64>,
    /// 毛刺.
    pub spiculations: Vec<f64>,
    /// 检测难度.
    pub subtleties: Vec<f64>,
    /// 直径 (毫米).
    pub diameters: Vec<f64>,
    /// 分叶.
    pub lobulations: Vec<f64>,
}

impl AnnotationStats {
    /// 空统计.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加一条属性记录.
    pub fn push(&mut self, p: &AnnotationProperties) {
        self.sphericities.push(p.sphericity);
        self.volumes.push(p.volume);
        self.surface_areas.push(p.surface_area);
        self.textures.push(p.texture);
        self.malignancies.push(p.malignancy);
        self.calcifications.push(p.calcification);
        self.internal_structures.push(p.internal_structure);
        self.margins.push(p.margin);
        self.spiculations.push(p.spiculation);
        self.subtleties.push(p.subtlety);
        self.diameters.push(p.diameter);
        self.lobulations.push(p.lobulation);
    }

    /// 收集 `anns` 的属性.
    pub fn extend_annotations<'a, I>(&mut self, anns: I, geometry: &VolumeGeometry)
    where
        I: IntoIterator<Item = &'a Annotation>,
    {
        for a in anns {
            self.push(&a.properties(geometry));
        }
    }

    /// 收集一个患者全部结节的全部标注.
    pub fn extend_patient(&mut self, patient: &PatientScan) {
        let g = patient.volume().geometry();
        for nodule in patient.nodules() {
            self.extend_annotations(nodule, g);
        }
    }

    /// 遍历加载器中的全部患者. 加载失败的患者被跳过.
    pub fn from_loader<I>(loader: I) -> Self
    where
        I: IntoIterator<Item = (String, Result<PatientScan>)>,
    {
        let mut ans = Self::new();
        for (pid, patient) in loader {
            match patient {
                Ok(p) => ans.extend_patient(&p),
                Err(e) => warn!("skip {pid}: {e}"),
            }
        }
        info!("collected {} annotations", ans.len());
        ans
    }

    /// 标注个数.
    #[inline]
    pub fn len(&self) -> usize {
        self.volumes.len()
    }

    /// 是否为空.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.volumes.is_empty()
    }
}

/// 直方图: `edges.len() == counts.len() + 1`.
#[derive(Clone, Debug, PartialEq)]
pub struct Histogram {
    /// 区间边界.
    pub edges: Vec<f64>,
    /// 各区间计数.
    pub counts: Vec<usize>,
}

/// 以 `linspace(0, max, bins)` 为边界的直方图, 最后一个区间为闭区间.
///
/// 最大值不为正时边界取 `linspace(0, 1, bins)`.
///
/// # 注意
///
/// `bins` 至少为 2, 否则程序 panic.
pub fn histogram(values: &[f64], bins: usize) -> Histogram {
    assert!(bins >= 2);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let hi = if max > 0.0 { max } else { 1.0 };
    let step = hi / (bins - 1) as f64;
    let mut edges: Vec<f64> = (0..bins).map(|i| i as f64 * step).collect();
    edges[bins - 1] = hi;

    let mut counts = vec![0; bins - 1];
    for &v in values {
        if !(0.0..=hi).contains(&v) {
            continue;
        }
        let i = edges.partition_point(|&e| e <= v).min(bins - 1);
        counts[i - 1] += 1;
    }
    Histogram { edges, counts }
}

/// 升序排列的不同取值及其出现次数. NaN 被忽略.
pub fn value_counts(values: &[f64]) -> Vec<(f64, usize)> {
    values
        .iter()
        .copied()
        .filter(|v| !v.is_nan())
        .map(OrderedFloat)
        .sorted_unstable()
        .dedup_with_count()
        .map(|(n, v)| (v.0, n))
        .collect()
}

fn plot_err<E: std::error::Error + Send + Sync>(e: DrawingAreaErrorKind<E>) -> PrepError {
    PrepError::Plot(e.to_string())
}

/// 条形图面板. `bars` 为 `(左端, 右端, 高度)`.
///
/// `plotters` 编译时没有字体后端, 绘制任何文字都会 panic.
/// 因此面板只包含条形与基线, 面板名只写入日志.
fn bar_panel<DB: DrawingBackend>(
    area: &DrawingArea<DB, Shift>,
    name: &str,
    bars: &[(f64, f64, usize)],
    color: RGBColor,
) -> Result<()>
where
    DB::ErrorType: 'static,
{
    let x0 = bars.iter().map(|b| b.0).fold(0.0, f64::min);
    let x1 = bars.iter().map(|b| b.1).fold(1.0, f64::max);
    let top = bars.iter().map(|b| b.2).max().unwrap_or(0).max(1) as f64 * 1.1;

    let mut chart = ChartBuilder::on(area)
        .margin(20)
        .build_cartesian_2d(x0..x1, 0.0..top)
        .map_err(plot_err)?;
    chart
        .draw_series(
            bars.iter()
                .map(|&(l, r, c)| Rectangle::new([(l, 0.0), (r, c as f64)], color.filled())),
        )
        .map_err(plot_err)?;
    chart
        .draw_series(LineSeries::new([(x0, 0.0), (x1, 0.0)], BLACK.stroke_width(2)))
        .map_err(plot_err)?;
    debug!("panel `{name}`: {} bars on [{x0:.2}, {x1:.2}]", bars.len());
    Ok(())
}

fn count_bars(values: &[f64]) -> Vec<(f64, f64, usize)> {
    value_counts(values)
        .into_iter()
        .map(|(v, n)| (v - 0.4, v + 0.4, n))
        .collect()
}

fn hist_bars(values: &[f64]) -> Vec<(f64, f64, usize)> {
    let h = histogram(values, 20);
    h.edges
        .windows(2)
        .zip(h.counts)
        .map(|(e, n)| (e[0], e[1], n))
        .collect()
}

/// 把标注属性统计画成 4x2 面板的 PNG 图像.
pub fn plot_annotation_stats<P: AsRef<Path>>(stats: &AnnotationStats, path: P) -> Result<()> {
    let root = BitMapBackend::new(path.as_ref(), (1200, 1600)).into_drawing_area();
    root.fill(&WHITE).map_err(plot_err)?;

    let panels = root.split_evenly((4, 2));
    let specs = [
        ("Sphericity", count_bars(&stats.sphericities), RGBColor(135, 206, 235)),
        ("Volume", hist_bars(&stats.volumes), RGBColor(144, 238, 144)),
        ("Surface Area", hist_bars(&stats.surface_areas), RGBColor(240, 128, 128)),
        ("Diameter", hist_bars(&stats.diameters), RGBColor(173, 216, 230)),
        ("Texture (1-5)", count_bars(&stats.textures), RGBColor(255, 182, 193)),
        ("Malignancy (1-5)", count_bars(&stats.malignancies), RGBColor(211, 211, 211)),
        ("Calcification", count_bars(&stats.calcifications), RGBColor(255, 165, 0)),
        ("Internal Structure", count_bars(&stats.internal_structures), RGBColor(128, 0, 128)),
    ];
    for (area, (name, bars, color)) in panels.iter().zip(specs.iter()) {
        bar_panel(area, name, bars, *color)?;
    }
    root.present().map_err(plot_err)?;
    info!("annotation statistics saved to {:?}", path.as_ref());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::lidc::tests::patient;

    #[test]
    fn test_histogram() {
        let h = histogram(&[0.0, 1.0, 2.0, 2.0, 4.0], 5);
        assert_eq!(h.edges, vec![0.0, 1.0, 2.0, 3.0, 4.0]);
        assert_eq!(h.counts, vec![1, 1, 2, 1]);

        let h = histogram(&[], 3);
        assert_eq!(h.edges, vec![0.0, 0.5, 1.0]);
        assert_eq!(h.counts, vec![0, 0]);

        let h = histogram(&[-1.0, 0.0], 3);
        assert_eq!(h.counts, vec![1, 0]);
    }

    #[test]
    fn test_value_counts() {
        let v = value_counts(&[3.0, 1.0, 3.0, f64::NAN, 5.0, 3.0]);
        assert_eq!(v, vec![(1.0, 1), (3.0, 3), (5.0, 1)]);
        assert!(value_counts(&[]).is_empty());
    }

    #[test]
    fn test_collect_stats() {
        let p = patient();
        let mut stats = AnnotationStats::new();
        stats.extend_patient(&p);
        assert_eq!(stats.len(), 4);
        assert!(stats.malignancies.iter().all(|&m| m == 4.0));

        let loader = vec![
            ("LIDC-IDRI-0001".to_owned(), Ok(patient())),
            ("LIDC-IDRI-0002".to_owned(), Err(PrepError::ScanNotFound("x".into()))),
        ];
        assert_eq!(AnnotationStats::from_loader(loader), stats);
    }

    #[test]
    fn test_plot() {
        let dir = tempfile::tempdir().unwrap();
        let mut stats = AnnotationStats::new();
        stats.extend_patient(&patient());
        let out = dir.path().join("stats.png");
        plot_annotation_stats(&stats, &out).unwrap();
        let img = image::open(&out).unwrap();
        assert_eq!((img.width(), img.height()), (1200, 1600));
        let img = img.to_rgb8();
        // 恶性程度全部为 4, 对应面板至少有一个条形.
        assert!(img.pixels().any(|p| p.0 == [211, 211, 211]));

        // 空统计也能画出来.
        let empty = dir.path().join("empty.png");
        plot_annotation_stats(&AnnotationStats::new(), &empty).unwrap();
        assert!(empty.is_file());
    }
}
