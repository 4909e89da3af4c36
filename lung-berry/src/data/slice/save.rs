//! 图像的持久化存储.

use crate::{CtWindow, MaskSlice, MaskSliceMut, ScanSlice, ScanSliceMut};
use image::ImageResult;
use std::path::Path;

/// 表明一个可以通过 **可视化友好** 模式持久化存储的图像对象.
///
/// `ImgWriteVis` trait 的意图是, 图像将以 "可视化友好"
/// 的方式保存, 而不是 "as is" 的方式. 这意味着, 对于 `MaskSlice`, `MaskSliceMut`
/// 这类仅存在 0, 1 像素值的图像, 在保存时会映射到肉眼较易能区分的形式;
/// 对于 `ScanSlice`, `ScanSliceMut` 这类以 CT HU 值存储的扫描,
/// 在保存时会用肺窗规范化.
pub trait ImgWriteVis {
    /// 按照一定的可视化规则将图片保存到 `path` 路径.
    fn save<P: AsRef<Path>>(&self, path: P) -> ImageResult<()>;
}

/// 表明一个可以通过 **按原样** 模式持久化存储的图像对象.
///
/// 对于 `MaskSlice`, `MaskSliceMut` 这类图像可以直接存储,
/// 但面对 `ScanSlice`, `ScanSliceMut` 这类以 CT HU 值存储的扫描无能为力.
pub trait ImgWriteRaw {
    /// 按原样将图片保存到 `path` 路径.
    fn save_raw<P: AsRef<Path>>(&self, path: P) -> ImageResult<()>;
}

/// 使像素更有利于单通道可视化: 背景为黑色, 其余为白色.
#[inline]
pub(crate) fn pretty(label: u8) -> u8 {
    use crate::consts::gray::*;
    if is_background(label) {
        BLACK
    } else {
        WHITE
    }
}

macro_rules! impl_mask_vis {
    ($($slice: ty),+) => {
        $(
            /// 会将背景/前景像素分别映射为黑色/白色.
            impl ImgWriteVis for $slice {
                fn save<P: AsRef<Path>>(&self, path: P) -> ImageResult<()> {
                    let (height, width) = self.shape();
                    let mut buf = image::GrayImage::new(width as u32, height as u32);
                    for ((h, w), &pix) in self.indexed_iter() {
                        buf.put_pixel(w as u32, h as u32, image::Luma([pretty(pix)]));
                    }
                    buf.save(path)
                }
            }
        )+
    };
}

macro_rules! impl_mask_raw {
    ($($slice: ty),+) => {
        $(
            /// 按原样存储.
            impl ImgWriteRaw for $slice {
                fn save_raw<P: AsRef<Path>>(&self, path: P) -> ImageResult<()> {
                    let (height, width) = self.shape();
                    let mut buf = image::GrayImage::new(width as u32, height as u32);
                    for ((h, w), &pix) in self.indexed_iter() {
                        buf.put_pixel(w as u32, h as u32, image::Luma([pix]));
                    }
                    buf.save(path)
                }
            }
        )+
    };
}

macro_rules! impl_scan_vis {
    ($($scan: ty),+) => {
        $(
            impl $scan {
                /// 用 `window` 把 HU 值映射为灰度并保存为图片.
                /// 无意义的 HU 值 (NaN) 被画成黑色.
                pub fn save_windowed<P: AsRef<Path>>(
                    &self,
                    path: P,
                    window: CtWindow,
                ) -> ImageResult<()> {
                    let (height, width) = self.shape();
                    let mut buf = image::GrayImage::new(width as u32, height as u32);
                    for ((h, w), &hu) in self.indexed_iter() {
                        let gray = window.eval(hu).unwrap_or(crate::consts::gray::BLACK);
                        buf.put_pixel(w as u32, h as u32, image::Luma([gray]));
                    }
                    buf.save(path)
                }
            }

            /// 窗位 -600, 窗宽 1500.
            impl ImgWriteVis for $scan {
                #[inline]
                fn save<P: AsRef<Path>>(&self, path: P) -> ImageResult<()> {
                    self.save_windowed(path, CtWindow::from_lung_visual())
                }
            }
        )+
    };
}

impl_mask_vis!(MaskSlice<'_>, MaskSliceMut<'_>);
impl_scan_vis!(ScanSlice<'_>, ScanSliceMut<'_>);
impl_mask_raw!(MaskSlice<'_>, MaskSliceMut<'_>);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{OwnedMaskSlice, OwnedScanSlice};
    use ndarray::array;

    #[test]
    fn test_save_mask_and_scan() {
        let dir = tempfile::tempdir().unwrap();
        let mask = OwnedMaskSlice::from_raw(array![[0u8, 1], [1, 0]]);
        let scan = OwnedScanSlice::from_raw(array![[-1350.0f32, 150.0], [f32::NAN, -600.0]]);

        let vis = dir.path().join("mask.png");
        mask.as_immut().save(&vis).unwrap();
        let img = image::open(&vis).unwrap().into_luma8();
        assert_eq!(img.get_pixel(1, 0).0, [255]);
        assert_eq!(img.get_pixel(0, 0).0, [0]);

        let raw = dir.path().join("raw.png");
        mask.as_immut().save_raw(&raw).unwrap();
        let img = image::open(&raw).unwrap().into_luma8();
        assert_eq!(img.get_pixel(0, 1).0, [1]);

        let ct = dir.path().join("scan.png");
        scan.as_immutable().save(&ct).unwrap();
        let img = image::open(&ct).unwrap().into_luma8();
        assert_eq!(img.get_pixel(1, 0).0, [255]);
        assert_eq!(img.get_pixel(0, 1).0, [0]);

        let soft = dir.path().join("soft.png");
        scan.as_immutable()
            .save_windowed(&soft, CtWindow::from_mediastinal_visual())
            .unwrap();
        let img = image::open(&soft).unwrap().into_luma8();
        // 纵隔窗 [-160, 240].
        assert_eq!(img.get_pixel(1, 0).0, [197]);
        assert_eq!(img.get_pixel(1, 1).0, [0]);
    }
}
