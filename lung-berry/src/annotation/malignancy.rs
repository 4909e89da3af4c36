//! 恶性程度共识与结节属性汇总.

use super::{Annotation, AnnotationProperties};
use crate::consts::MALIGNANCY_THRESHOLD;
use crate::{PrepError, Result, VolumeGeometry};
use log::info;
use std::fmt;

/// 偏高中位数: 长度为奇数时取中间值, 为偶数时取中间两个值中较大者.
///
/// `values` 为空时返回 [`PrepError::EmptyInput`].
pub fn median_high<T: Ord + Copy>(values: &[T]) -> Result<T> {
    if values.is_empty() {
        return Err(PrepError::EmptyInput);
    }
    let mut sorted = values.to_vec();
    sorted.sort_unstable();
    Ok(sorted[sorted.len() / 2])
}

/// 结节的良恶性标签.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CancerLabel {
    /// 恶性程度评分低于 3.
    Benign,

    /// 恶性程度评分高于 3.
    Malignant,

    /// 恶性程度评分恰为 3, 留给半监督学习.
    Ambiguous,
}

impl CancerLabel {
    /// 由恶性程度评分得到标签.
    pub fn from_score(score: u8) -> Self {
        use std::cmp::Ordering::*;
        match score.cmp(&MALIGNANCY_THRESHOLD) {
            Greater => Self::Malignant,
            Less => Self::Benign,
            Equal => Self::Ambiguous,
        }
    }

    /// 二值标签. `Ambiguous` 返回 `None`.
    #[inline]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Benign => Some(false),
            Self::Malignant => Some(true),
            Self::Ambiguous => None,
        }
    }
}

/// `True`, `False` 或 `Ambiguous`, 与元信息表中的写法一致.
impl fmt::Display for CancerLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Benign => "False",
            Self::Malignant => "True",
            Self::Ambiguous => "Ambiguous",
        };
        f.write_str(s)
    }
}

/// 结节的恶性程度: 各标注恶性程度评分的偏高中位数, 以及对应的标签.
///
/// `nodule` 为空时返回 [`PrepError::EmptyNodule`].
pub fn calculate_malignancy(nodule: &[Annotation]) -> Result<(u8, CancerLabel)> {
    let scores: Vec<u8> = nodule
        .iter()
        .map(|a| a.characteristics.malignancy)
        .collect();
    let score = median_high(&scores).map_err(|_| PrepError::EmptyNodule)?;
    Ok((score, CancerLabel::from_score(score)))
}

/// 结节各项属性的均值. 恶性程度取偏高中位数.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MeanProperties {
    /// 平均体积.
    pub mean_volume: f64,
    /// 平均表面积.
    pub mean_surface_area: f64,
    /// 恶性程度偏高中位数.
    pub mean_malignancy: f64,
    /// 平均球形度.
    pub mean_sphericity: f64,
    /// 平均质地.
    pub mean_texture: f64,
    /// 平均钙化.
    pub mean_calcification: f64,
    /// 平均内部结构.
    pub mean_internal_structure: f64,
    /// 平均边缘.
    pub mean_margin: f64,
    /// 平均毛刺.
    pub mean_spiculation: f64,
    /// 平均检测难度.
    pub mean_subtlety: f64,
    /// 平均直径.
    pub mean_diameter: f64,
    /// 平均分叶.
    pub mean_lobulation: f64,
}

/// "平均结节": 一个结节全部标注的属性汇总.
#[derive(Clone, Debug)]
pub struct NoduleSummary {
    nodule_id: usize,
    properties: Vec<AnnotationProperties>,
}

impl NoduleSummary {
    /// 计算 `nodule` 中每个标注的属性.
    pub fn new(nodule_id: usize, nodule: &[Annotation], geometry: &VolumeGeometry) -> Self {
        Self::from_properties(
            nodule_id,
            nodule.iter().map(|a| a.properties(geometry)).collect(),
        )
    }

    /// 由已经算好的属性构建.
    #[inline]
    pub fn from_properties(nodule_id: usize, properties: Vec<AnnotationProperties>) -> Self {
        Self {
            nodule_id,
            properties,
        }
    }

    /// 结节编号.
    #[inline]
    pub fn nodule_id(&self) -> usize {
        self.nodule_id
    }

    /// 标注个数.
    #[inline]
    pub fn len(&self) -> usize {
        self.properties.len()
    }

    /// 是否不含标注.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    /// 各项属性的均值. 结节为空时全部为 0.
    pub fn annot_info(&self) -> MeanProperties {
        if self.is_empty() {
            return MeanProperties::default();
        }
        let mean = |f: fn(&AnnotationProperties) -> f64| {
            self.properties.iter().map(f).sum::<f64>() / self.len() as f64
        };
        let malignancies: Vec<u8> = self
            .properties
            .iter()
            .map(|p| p.malignancy as u8)
            .collect();
        MeanProperties {
            mean_volume: mean(|p| p.volume),
            mean_surface_area: mean(|p| p.surface_area),
            mean_malignancy: median_high(&malignancies).map_or(0.0, |m| m as f64),
            mean_sphericity: mean(|p| p.sphericity),
            mean_texture: mean(|p| p.texture),
            mean_calcification: mean(|p| p.calcification),
            mean_internal_structure: mean(|p| p.internal_structure),
            mean_margin: mean(|p| p.margin),
            mean_spiculation: mean(|p| p.spiculation),
            mean_subtlety: mean(|p| p.subtlety),
            mean_diameter: mean(|p| p.diameter),
            mean_lobulation: mean(|p| p.lobulation),
        }
    }

    /// 第 `n` 个标注 (从 1 开始) 的属性.
    pub fn annotation(&self, n: usize) -> Result<&AnnotationProperties> {
        let ans = n
            .checked_sub(1)
            .and_then(|i| self.properties.get(i))
            .ok_or(PrepError::AnnotationIndex {
                index: n,
                len: self.len(),
            })?;
        info!("accessing annotation number {n} of nodule {}", self.nodule_id);
        Ok(ans)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::tests::{cube_annotation, geometry};

    fn with_malignancy(m: u8) -> Annotation {
        let mut a = cube_annotation("r", (4, 4), 4, &[1]);
        a.characteristics.malignancy = m;
        a
    }

    #[test]
    fn test_median_high() {
        assert_eq!(median_high(&[1, 3, 5]).unwrap(), 3);
        assert_eq!(median_high(&[1, 3, 5, 7]).unwrap(), 5);
        assert_eq!(median_high(&[4, 2]).unwrap(), 4);
        assert_eq!(median_high(&[2]).unwrap(), 2);
        assert!(matches!(median_high::<u8>(&[]), Err(PrepError::EmptyInput)));
    }

    #[test]
    fn test_calculate_malignancy() {
        let nodule: Vec<_> = [2, 4, 5, 3].into_iter().map(with_malignancy).collect();
        assert_eq!(
            calculate_malignancy(&nodule).unwrap(),
            (4, CancerLabel::Malignant)
        );

        let nodule: Vec<_> = [1, 2, 3].into_iter().map(with_malignancy).collect();
        assert_eq!(
            calculate_malignancy(&nodule).unwrap(),
            (2, CancerLabel::Benign)
        );

        let nodule: Vec<_> = [3, 3, 2, 4].into_iter().map(with_malignancy).collect();
        let (m, label) = calculate_malignancy(&nodule).unwrap();
        assert_eq!((m, label), (3, CancerLabel::Ambiguous));
        assert_eq!(label.to_string(), "Ambiguous");
        assert_eq!(label.as_bool(), None);
        assert_eq!(CancerLabel::Malignant.to_string(), "True");

        assert!(calculate_malignancy(&[]).is_err());
    }

    #[test]
    fn test_nodule_summary() {
        let g = geometry();
        let nodule: Vec<_> = [2, 5].into_iter().map(with_malignancy).collect();
        let s = NoduleSummary::new(1, &nodule, &g);
        let info = s.annot_info();
        assert_eq!(info.mean_malignancy, 5.0);
        assert_eq!(info.mean_sphericity, 3.0);
        assert!((info.mean_volume - 16.0 * 0.25).abs() < 1e-9);

        assert_eq!(s.annotation(2).unwrap().malignancy, 5.0);
        assert!(matches!(
            s.annotation(0),
            Err(PrepError::AnnotationIndex { index: 0, len: 2 })
        ));
        assert!(s.annotation(3).is_err());

        let empty = NoduleSummary::from_properties(2, vec![]);
        assert_eq!(empty.annot_info(), MeanProperties::default());
    }
}
