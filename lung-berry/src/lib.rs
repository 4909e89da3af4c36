#![warn(missing_docs)] // <= 合适时移除它.

//! 核心库. 提供 LIDC-IDRI 数据集肺部 CT 扫描 (DICOM) 和放射科医生结节标注 (XML)
//! 的结构化信息与基础预处理算法.
//!
//! 该 crate 目前仅提供 `safe` 接口.
//!
//! # 注意
//!
//! 1. 该 crate 目前主要负责处理 LIDC-IDRI 数据, 没有对其它源的数据进行直接适配
//!   (但如果新数据按照 LIDC-IDRI 模式进行组织, 也可以工作).
//! 2. 所有存储在磁盘上的输入 (DICOM, XML) 出错时均返回 [`PrepError`],
//!   不会 panic. 仅当调用方违反文档中写明的前置条件时程序才会 panic.
//!
//! # 功能
//!
//! ### DICOM 读取与 HU 转换 ✅
//!
//! `HU = 像素值 * RescaleSlope + RescaleIntercept`, 缺省时斜率为 1, 截距为 0.
//! 随后可按 `[-1000, 400]` 截断并归一化到 `[0, 1]`.
//!
//! 实现位于 `lung-berry/src/dataset/dicom.rs` 和 `lung-berry/src/data/window.rs`.
//!
//! ### 肺实质分割 ✅
//!
//! 标准化, 中值滤波, 各向异性扩散, 一维 k-means 阈值, 形态学腐蚀/膨胀,
//! 8-连通区域筛选.
//!
//! 实现位于 `lung-berry/src/segment`.
//!
//! ### 结节标注 ✅
//!
//! 1. 解析 LIDC XML 标注, 每位放射科医生一个阅片会话. ✅
//! 2. 按轮廓最小距离把标注聚类为结节 (每个结节最多 4 个标注). ✅
//! 3. 多标注共识掩码 (50% 一致). ✅
//! 4. 恶性程度的 "偏高中位数" 与良/恶/不确定标签. ✅
//!
//! 实现位于 `lung-berry/src/annotation`.
//!
//! ### 结节切片导出 ✅
//!
//! 每个结节的每一层切片, 按 `.npy` 格式分别存储图像与掩码, 并生成元信息表.
//!
//! 实现位于 `lung-berry/src/export.rs`.
//!
//! ### 影像组学特征 ✅
//!
//! 一阶统计, 三维形状, 灰度共生矩阵 (GLCM).
//!
//! 实现位于 `lung-berry/src/features`.
//!
//! ### 标注统计与可视化 ✅
//!
//! 实现位于 `lung-berry/src/stats.rs`.

/// 二维索引 `(h, w)`, 同时也可一定程度上用作非负整数向量.
pub type Idx2d = (usize, usize);

/// 三维索引 `(z, h, w)`, 同时也可一定程度上用作非负整数向量.
pub type Idx3d = (usize, usize, usize);

type Area2d = Vec<Idx2d>;
type Areas2d = Vec<Area2d>;
type Predicate = fn(u8) -> bool;

/// CT 体数据与切片的基础数据结构.
mod data;

mod error;

pub use data::{
    load_series, Connectivity, CtVolume, CtWindow, HuRange, ImgWriteRaw, ImgWriteVis, MaskSlice,
    MaskSliceMut, OwnedMaskSlice, OwnedScanSlice, Region, ScanSlice, ScanSliceMut, VolumeAttr,
    VolumeGeometry,
};

#[cfg(feature = "plot")]
pub use data::ImgDisplay;

pub use error::{PrepError, Result};

pub mod annotation;
pub mod consts;
pub mod dataset;
pub mod export;
pub mod features;
pub mod prelude;
pub mod segment;
pub mod stats;
