//! 图片展示模块, 主要用于调试.
//!
//! # 注意
//!
//! 需要 `plot` feature.

use crate::{Idx2d, MaskSlice, MaskSliceMut, ScanSlice, ScanSliceMut};
use ndarray::{Array2, ArrayView2, CowArray, Ix2};
use opencv::core::{Scalar, Size, CV_8UC1};
use opencv::highgui::{imshow, wait_key};
use opencv::prelude::{Mat, MatTrait};
use std::time::Duration;

/// 表明一个可以在窗口中可视化的对象.
pub trait ImgDisplay {
    /// 展示对象.
    fn show(&self) -> opencv::Result<()>;

    /// 同 `show()`, 但在之后自动等待一次用户按键输入.
    fn show_and_wait(&self) -> opencv::Result<i32> {
        self.show()?;
        wait_key(0)
    }

    /// 同 `show()`, 但在之后自动等待给定时间.
    fn show_and_wait_for(&self, d: Duration) -> opencv::Result<i32> {
        self.show()?;
        let ms = d.as_millis().min(i32::MAX as u128);
        wait_key(ms as i32)
    }
}

/// 以 `shape` 分辨率构造单通道矩阵, 每个像素由 `pixel` 给出.
fn to_opencv_mat<F>((h, w): Idx2d, pixel: F) -> opencv::Result<Mat>
where
    F: Fn(Idx2d) -> u8,
{
    let mut mat =
        Mat::new_size_with_default(Size::new(w as i32, h as i32), CV_8UC1, Scalar::from(0))?;
    for i in 0..h {
        for j in 0..w {
            *mat.at_2d_mut::<u8>(i as i32, j as i32)? = pixel((i, j));
        }
    }
    Ok(mat)
}

fn mask_to_opencv_mat(data: ArrayView2<u8>) -> opencv::Result<Mat> {
    to_opencv_mat(data.dim(), |pos| super::save::pretty(data[pos]))
}

/// 肺窗 (窗位 -600, 窗宽 1500).
fn scan_to_opencv_mat(data: ArrayView2<f32>) -> opencv::Result<Mat> {
    const WINDOW: crate::CtWindow = crate::CtWindow::from_lung_visual();
    to_opencv_mat(data.dim(), |pos| WINDOW.eval(data[pos]).unwrap_or(0))
}

macro_rules! impl_mask {
    (Slice, {$($slice: ty),+}) => {
        $(
            /// 背景显示为黑色, 前景显示为白色.
            impl ImgDisplay for $slice {
                fn show(&self) -> opencv::Result<()> {
                    imshow("Image", &mask_to_opencv_mat(self.array_view())?)
                }
            }
        )+
    };
    (Array, {$($array: ty),+}) => {
        $(
            /// 背景显示为黑色, 前景显示为白色.
            impl ImgDisplay for $array {
                fn show(&self) -> opencv::Result<()> {
                    imshow("Image", &mask_to_opencv_mat(self.view())?)
                }
            }
        )+
    };
}

macro_rules! impl_scan {
    ({$($scan: ty),+}) => {
        $(
            /// 可视化扫描.
            impl ImgDisplay for $scan {
                fn show(&self) -> opencv::Result<()> {
                    imshow("Image", &scan_to_opencv_mat(self.data())?)
                }
            }
        )+
    };
}

impl_mask!(Slice, {MaskSlice<'_>, MaskSliceMut<'_>});
impl_mask!(Array, {Array2<u8>, CowArray<'_, u8, Ix2>, ArrayView2<'_, u8>});
impl_scan!({ScanSlice<'_>, ScanSliceMut<'_>});
