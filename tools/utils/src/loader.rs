//! 对 `lung-berry::dataset` 的更一层封装. 提供更直接的数据集加载器.

use lung_berry::dataset::{self, PatientLoader};
use lung_berry::Result;
use std::env;
use std::path::{Path, PathBuf};

/// 数据集根目录的环境变量名.
pub const DATASET_ENV: &str = "LIDC_IDRI_DIR";

/// 获取 LIDC-IDRI 数据集根目录.
///
/// 1. 若 `explicit` 非空, 则返回其值;
/// 2. 否则若环境变量 `$LIDC_IDRI_DIR` 非空, 则返回其值;
/// 3. 否则返回 `$HOME/dataset/LIDC-IDRI`. 无法确定主目录时返回 `None`.
pub fn dataset_dir(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(p) = explicit {
        return Some(p.to_owned());
    }
    match env::var(DATASET_ENV) {
        Ok(d) if !d.is_empty() => Some(PathBuf::from(d)),
        _ => dataset::home_dataset_dir(),
    }
}

/// 获取按编号加载的患者数据加载器. `ids` 为空时加载全部患者.
pub fn patient_loader<P: AsRef<Path>>(path: P, ids: &[u32]) -> Result<PatientLoader> {
    if ids.is_empty() {
        dataset::full_patient_loader(path)
    } else {
        Ok(dataset::patient_loader(ids.iter().copied(), path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_wins() {
        let p = Path::new("/data/LIDC-IDRI");
        assert_eq!(dataset_dir(Some(p)), Some(p.to_owned()));
    }

    #[test]
    fn test_patient_loader() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("LIDC-IDRI-0005")).unwrap();
        assert_eq!(patient_loader(dir.path(), &[]).unwrap().len(), 1);
        assert_eq!(patient_loader(dir.path(), &[1, 2, 3]).unwrap().len(), 3);
    }
}
