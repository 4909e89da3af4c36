//! 通用常量.

/// 单通道颜色与掩码像素值.
pub mod gray {
    /// 掩码中背景的像素值.
    pub const MASK_BACKGROUND: u8 = 0;

    /// 掩码中前景 (肺实质或结节) 的像素值.
    pub const MASK_FOREGROUND: u8 = 1;

    /// 单通道黑色.
    pub const BLACK: u8 = 0b_0000_0000;

    /// 单通道暗灰色.
    pub const DARK_GRAY: u8 = 0b_0100_0000;

    /// 单通道灰色.
    pub const GRAY: u8 = 0b_1000_0000;

    /// 单通道亮灰色.
    pub const LIGHT_GRAY: u8 = 0b_1100_0000;

    /// 单通道白色.
    pub const WHITE: u8 = 0b_1111_1111;

    /// 像素是否是前景?
    #[inline]
    pub const fn is_foreground(p: u8) -> bool {
        p != MASK_BACKGROUND
    }

    /// 像素是否是背景?
    #[inline]
    pub const fn is_background(p: u8) -> bool {
        matches!(p, MASK_BACKGROUND)
    }
}

/// HU 截断下限, 空气的典型值.
pub const HU_MIN: f32 = -1000.0;

/// HU 截断上限, 骨骼的典型值.
pub const HU_MAX: f32 = 400.0;

/// 肺窗窗位.
pub const LUNG_WINDOW_LEVEL: f32 = -600.0;

/// 肺窗窗宽.
pub const LUNG_WINDOW_WIDTH: f32 = 1500.0;

/// 纵隔窗窗位.
pub const MEDIASTINAL_WINDOW_LEVEL: f32 = 40.0;

/// 纵隔窗窗宽.
pub const MEDIASTINAL_WINDOW_WIDTH: f32 = 400.0;

/// 共识掩码的一致程度: 至少一半的标注覆盖的体素才算结节.
pub const CONSENSUS_LEVEL: f64 = 0.5;

/// 共识包围盒在三个方向上的扩展量. 512 意味着覆盖全部切片与整张图像.
pub const CONSENSUS_PAD: usize = 512;

/// 导出切片时, 掩码前景像素个数不大于该值的切片会被跳过.
pub const MASK_THRESHOLD: usize = 8;

/// 恶性程度评分的分界值. 高于它为恶性, 低于它为良性, 等于它为不确定.
pub const MALIGNANCY_THRESHOLD: u8 = 3;

/// 单个结节最多的标注个数 (每位放射科医生至多一个).
pub const MAX_ANNOTATORS: usize = 4;

/// LIDC-IDRI 数据集患者个数.
pub const LIDC_IDRI_PATIENT_LEN: u32 = 1010;
