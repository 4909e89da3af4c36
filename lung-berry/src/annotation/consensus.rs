//! 多标注共识掩码.

use super::{Annotation, Bbox3d};
use crate::{PrepError, Result, VolumeGeometry};
use ndarray::{Array3, Zip};

/// 一个结节的共识结果.
#[derive(Clone, Debug)]
pub struct Consensus {
    /// 共识掩码, 形状为 `bbox.shape()`.
    pub mask: Array3<bool>,

    /// 共识掩码在体数据中的闭区间包围盒.
    pub bbox: Bbox3d,

    /// 每个标注在 `bbox` 内的掩码.
    pub masks: Vec<Array3<bool>>,
}

impl Consensus {
    /// 共识掩码的前景体素个数.
    #[inline]
    pub fn foreground_count(&self) -> usize {
        self.mask.iter().filter(|&&v| v).count()
    }
}

/// 计算结节 `nodule` 的共识掩码.
///
/// 包围盒为各标注包围盒之并, 在三个方向上扩展 `pad` 个体素后截断到体数据范围内.
/// 至少 `clevel` 比例的标注覆盖的体素才属于共识掩码.
///
/// `nodule` 为空或不含任何轮廓点时返回 [`PrepError::EmptyNodule`].
pub fn consensus(
    nodule: &[Annotation],
    geometry: &VolumeGeometry,
    clevel: f64,
    pad: usize,
) -> Result<Consensus> {
    let bbox = nodule
        .iter()
        .filter_map(|a| a.bbox(geometry))
        .reduce(|a, b| a.union(&b))
        .ok_or(PrepError::EmptyNodule)?
        .pad(pad, geometry.shape());

    let masks: Vec<Array3<bool>> = nodule
        .iter()
        .map(|a| a.boolean_mask(geometry, &bbox))
        .collect();

    let mut votes = Array3::<u32>::zeros(bbox.shape());
    for m in masks.iter() {
        Zip::from(&mut votes).and(m).for_each(|v, &b| *v += b as u32);
    }
    let n = masks.len() as f64;
    let mask = votes.mapv(|v| v as f64 / n >= clevel);

    Ok(Consensus { mask, bbox, masks })
}
