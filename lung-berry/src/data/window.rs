use crate::consts::{
    HU_MAX, HU_MIN, LUNG_WINDOW_LEVEL, LUNG_WINDOW_WIDTH, MEDIASTINAL_WINDOW_LEVEL,
    MEDIASTINAL_WINDOW_WIDTH,
};
use crate::{PrepError, Result};
use ndarray::{ArrayBase, DataMut, Dimension};

/// CT 窗口, 包含窗位 (window level) 和窗宽 (window width).
///
/// 该窗口是只读的. 若要修改窗口参数, 你应该创建新的实例.
#[derive(Copy, Clone, Debug)]
pub struct CtWindow {
    level: f32,
    width: f32,
}

impl CtWindow {
    /// 构建 CT 窗.
    ///
    /// `level` 和 `width` 必须在合理范围内, 否则返回 `None`.
    pub fn new(level: f32, width: f32) -> Option<CtWindow> {
        if (-1e5..=1e5).contains(&level) && 0.0 < width && width <= 1e5 {
            Some(Self { level, width })
        } else {
            None
        }
    }

    /// 构建一个便于展示肺实质与结节的 CT 窗口. 该窗口的窗位为
    /// -600, 窗宽为 1500.
    #[inline]
    pub const fn from_lung_visual() -> CtWindow {
        Self {
            level: LUNG_WINDOW_LEVEL,
            width: LUNG_WINDOW_WIDTH,
        }
    }

    /// 构建纵隔窗. 该窗口的窗位为 40, 窗宽为 400.
    #[inline]
    pub const fn from_mediastinal_visual() -> CtWindow {
        Self {
            level: MEDIASTINAL_WINDOW_LEVEL,
            width: MEDIASTINAL_WINDOW_WIDTH,
        }
    }

    /// 窗下限.
    #[inline]
    pub fn lower_bound(&self) -> f32 {
        self.level - self.width / 2.0
    }

    /// 窗上限.
    #[inline]
    pub fn upper_bound(&self) -> f32 {
        self.level + self.width / 2.0
    }

    /// 窗位.
    #[inline]
    pub fn level(&self) -> f32 {
        self.level
    }

    /// 窗宽.
    #[inline]
    pub fn width(&self) -> f32 {
        self.width
    }

    /// 求在当前 CT 窗设置下, `ct` HU 值对应的灰度图像素整数值 (0 <= value <= 255)
    ///
    /// 如果 `ct` 无意义 (如 inf, NaN), 则返回 `None`.
    pub fn eval(&self, ct: f32) -> Option<u8> {
        if !ct.is_finite() {
            return None;
        }
        let lb = self.lower_bound();
        if ct <= lb {
            Some(u8::MIN)
        } else if ct >= self.upper_bound() {
            Some(u8::MAX)
        } else {
            // 255, not 256.
            Some((((ct - lb) / self.width()) * 255.0) as u8)
        }
    }
}

/// HU 值的截断/归一化区间 `[min, max]`.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct HuRange {
    min: f32,
    max: f32,
}

impl Default for HuRange {
    /// `[-1000, 400]`, 即空气到骨骼.
    #[inline]
    fn default() -> Self {
        Self {
            min: HU_MIN,
            max: HU_MAX,
        }
    }
}

impl HuRange {
    /// 构建区间. 要求两端有限且 `min < max`.
    pub fn new(min: f32, max: f32) -> Result<Self> {
        if min.is_finite() && max.is_finite() && min < max {
            Ok(Self { min, max })
        } else {
            Err(PrepError::InvalidRange(min as f64, max as f64))
        }
    }

    /// 区间下限.
    #[inline]
    pub fn min(&self) -> f32 {
        self.min
    }

    /// 区间上限.
    #[inline]
    pub fn max(&self) -> f32 {
        self.max
    }

    /// 将 `hu` 截断到 `[min, max]`. NaN 原样返回.
    #[inline]
    pub fn clip(&self, hu: f32) -> f32 {
        hu.clamp(self.min, self.max)
    }

    /// 将 `hu` 线性映射到 `[0, 1]`, 区间外的值被压到端点.
    #[inline]
    pub fn normalize(&self, hu: f32) -> f32 {
        ((hu - self.min) / (self.max - self.min)).clamp(0.0, 1.0)
    }

    /// 就地截断整个数组.
    pub fn clip_array<S, D>(&self, data: &mut ArrayBase<S, D>)
    where
        S: DataMut<Elem = f32>,
        D: Dimension,
    {
        data.mapv_inplace(|v| self.clip(v));
    }

    /// 就地归一化整个数组.
    pub fn normalize_array<S, D>(&self, data: &mut ArrayBase<S, D>)
    where
        S: DataMut<Elem = f32>,
        D: Dimension,
    {
        data.mapv_inplace(|v| self.normalize(v));
    }
}
