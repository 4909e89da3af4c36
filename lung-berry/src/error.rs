//! 运行时错误.

use std::io;
use std::path::PathBuf;

/// 预处理流程中可能出现的全部错误.
#[derive(Debug, thiserror::Error)]
pub enum PrepError {
    /// 底层 I/O 错误.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// 无法打开或解码 DICOM 文件.
    #[error("DICOM error in {path:?}: {message}")]
    Dicom {
        /// 出错文件.
        path: PathBuf,
        /// 底层错误描述.
        message: String,
    },

    /// DICOM 文件缺少必要的属性.
    #[error("DICOM file {path:?} has no `{tag}` attribute")]
    MissingTag {
        /// 出错文件.
        path: PathBuf,
        /// 缺少的属性名.
        tag: &'static str,
    },

    /// XML 标注文件语法错误.
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    /// XML 标注文件内容不合法 (如无法解析的数值).
    #[error("malformed annotation: {0}")]
    Annotation(String),

    /// npy 文件写入错误.
    #[error("npy write error: {0}")]
    Npy(#[from] ndarray_npy::WriteNpyError),

    /// 图像编码错误.
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    /// 绘图后端错误.
    #[error("plotting error: {0}")]
    Plot(String),

    /// 给定患者不存在 CT 扫描.
    #[error("no scan found for patient ID {0}")]
    ScanNotFound(String),

    /// 结节不含任何标注.
    #[error("nodule has no annotations")]
    EmptyNodule,

    /// 对空序列求统计量.
    #[error("statistic of an empty sequence")]
    EmptyInput,

    /// 掩码不含任何前景体素.
    #[error("mask has no foreground voxel")]
    EmptyMask,

    /// 掩码前景内含有 NaN 或无穷大体素.
    #[error("{0} non-finite voxel(s) inside the mask")]
    NonFinite(usize),

    /// 标注序号越界 (从 1 开始计数).
    #[error("annotation number {index} out of range 1..={len}")]
    AnnotationIndex {
        /// 请求的序号.
        index: usize,
        /// 标注总数.
        len: usize,
    },

    /// 数据形状不一致.
    #[error("shape mismatch: {0:?} vs {1:?}")]
    ShapeMismatch(Vec<usize>, Vec<usize>),

    /// 数值范围不合法.
    #[error("invalid range: [{0}, {1}]")]
    InvalidRange(f64, f64),

    /// 图像标准差为 0, 无法标准化.
    #[error("image has zero variance")]
    ZeroVariance,
}

/// 预处理运行时结果.
pub type Result<T> = std::result::Result<T, PrepError>;
