//! 数据集操作.

use std::path::{Path, PathBuf};

pub mod dicom;
pub mod lidc;

pub use lidc::{full_patient_loader, patient_loader, PatientLoader, PatientScan, ScanSummary};

/// LIDC-IDRI 患者目录名, 形如 `LIDC-IDRI-0001`.
#[inline]
pub fn patient_id(n: u32) -> String {
    format!("LIDC-IDRI-{n:04}")
}

/// 获取 `{用户主目录}/dataset/LIDC-IDRI` 目录.
pub fn home_dataset_dir() -> Option<PathBuf> {
    let mut ans = dirs::home_dir()?;
    ans.push("dataset");
    ans.push("LIDC-IDRI");
    Some(ans)
}

/// 获取 `{用户主目录}/dataset/LIDC-IDRI` 目录下给定继续项组成的全路径.
pub fn home_dataset_dir_with<P: AsRef<Path>, I: IntoIterator<Item = P>>(it: I) -> Option<PathBuf> {
    let mut ans = home_dataset_dir()?;
    ans.extend(it);
    Some(ans)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patient_id() {
        assert_eq!(patient_id(1), "LIDC-IDRI-0001");
        assert_eq!(patient_id(1010), "LIDC-IDRI-1010");
    }

    #[test]
    fn test_home_dir_with() {
        if let Some(base) = home_dataset_dir() {
            assert!(base.ends_with("dataset/LIDC-IDRI"));
            let p = home_dataset_dir_with(["LIDC-IDRI-0001"]).unwrap();
            assert_eq!(p, base.join("LIDC-IDRI-0001"));
        }
    }
}
