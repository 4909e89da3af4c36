//! 🫁欢迎光临🩻
//!
//! 涵盖了本 crate 一系列常用的功能.

pub use crate::{Idx2d, Idx3d};

pub use crate::data::{
    ImgWriteRaw, ImgWriteVis, MaskSlice, MaskSliceMut, OwnedMaskSlice, OwnedScanSlice, ScanSlice,
    ScanSliceMut,
};
pub use crate::data::{load_series, CtVolume, CtWindow, HuRange, VolumeAttr, VolumeGeometry};

#[cfg(feature = "plot")]
pub use crate::data::ImgDisplay;

pub use crate::consts::gray::{MASK_BACKGROUND, MASK_FOREGROUND};
pub use crate::consts::{CONSENSUS_LEVEL, CONSENSUS_PAD, LIDC_IDRI_PATIENT_LEN};

pub use crate::annotation::{
    calculate_malignancy, cluster_annotations, consensus, Annotation, CancerLabel, Nodule,
    NoduleSummary,
};
pub use crate::dataset::home_dataset_dir_with;
pub use crate::dataset::{self, full_patient_loader, patient_loader, PatientScan};
pub use crate::export::{process_nodule_images_masks, ExportConfig};
pub use crate::features::{extract_radiomics, FeatureVector, RadiomicsSettings};
pub use crate::segment::segment_lung;

pub use crate::PrepError;
