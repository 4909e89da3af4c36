//! CT scan/mask 切片对象的操作.

mod core;
mod iter;
mod save;

pub use core::{
    Connectivity, MaskSlice, MaskSliceMut, OwnedMaskSlice, OwnedScanSlice, Region, ScanSlice,
    ScanSliceMut,
};

pub use save::{ImgWriteRaw, ImgWriteVis};

cfg_if::cfg_if! {
    if #[cfg(feature = "plot")] {
        mod plot;

        pub use plot::ImgDisplay;
    }
}
