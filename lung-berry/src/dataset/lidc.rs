//! LIDC-IDRI 患者数据: 一个 CT 序列及其全部 XML 标注.
//!
//! 提供迭代器风格的数据集获取模式.

use crate::annotation::{cluster_annotations, parse_lidc_xml, Annotation, ClusterOptions, Nodule};
use crate::consts::LIDC_IDRI_PATIENT_LEN;
use crate::dataset::patient_id;
use crate::{load_series, CtVolume, Idx3d, PrepError, Result, VolumeAttr};
use log::{debug, info};
use std::cell::OnceCell;
use std::fmt;
use std::path::{Path, PathBuf};

/// 递归收集 `dir` 下的全部 `.xml` 文件.
fn collect_xml(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_xml(&path, out)?;
        } else if path
            .extension()
            .is_some_and(|e| e.eq_ignore_ascii_case("xml"))
        {
            out.push(path);
        }
    }
    Ok(())
}

/// 单个患者的 CT 扫描与标注.
#[derive(Debug)]
pub struct PatientScan {
    patient_id: String,
    volume: CtVolume,
    annotations: Vec<Annotation>,
    nodules: OnceCell<Vec<Nodule>>,
}

impl PatientScan {
    /// 打开 `root/pid` 目录下的患者数据.
    ///
    /// 读取切片最多的 CT 序列, 以及序列 UID 与之相同 (或未写明 UID) 的全部 XML 标注.
    /// 不存在 CT 序列时返回 [`PrepError::ScanNotFound`].
    pub fn open<P: AsRef<Path>>(root: P, pid: &str) -> Result<Self> {
        let dir = root.as_ref().join(pid);
        if !dir.is_dir() {
            return Err(PrepError::ScanNotFound(pid.to_owned()));
        }
        let volume = load_series(&dir).map_err(|e| match e {
            PrepError::ScanNotFound(_) => PrepError::ScanNotFound(pid.to_owned()),
            e => e,
        })?;

        let mut files = vec![];
        collect_xml(&dir, &mut files)?;
        files.sort();
        let mut annotations = vec![];
        for path in files {
            let xml = parse_lidc_xml(&path)?;
            match xml.series_uid.as_deref() {
                Some(uid) if uid != volume.geometry().series_uid() => {
                    debug!("skip {path:?}: series {uid}");
                }
                _ => annotations.extend(xml.annotations().cloned()),
            }
        }
        info!("{pid}: {} annotations", annotations.len());

        Ok(Self::from_parts(pid, volume, annotations))
    }

    /// 由已经读取的体数据和标注构建.
    pub fn from_parts<S: Into<String>>(
        patient_id: S,
        volume: CtVolume,
        annotations: Vec<Annotation>,
    ) -> Self {
        Self {
            patient_id: patient_id.into(),
            volume,
            annotations,
            nodules: OnceCell::new(),
        }
    }

    /// 患者 ID.
    #[inline]
    pub fn patient_id(&self) -> &str {
        &self.patient_id
    }

    /// CT 体数据.
    #[inline]
    pub fn volume(&self) -> &CtVolume {
        &self.volume
    }

    /// 全部放射科医生的全部标注.
    #[inline]
    pub fn annotations(&self) -> &[Annotation] {
        &self.annotations
    }

    /// 按默认参数聚类得到的结节. 首次调用时计算.
    pub fn nodules(&self) -> &[Nodule] {
        self.nodules.get_or_init(|| {
            cluster_annotations(
                &self.annotations,
                self.volume.geometry(),
                ClusterOptions::default(),
            )
        })
    }

    /// 结节个数.
    #[inline]
    pub fn nodule_count(&self) -> usize {
        self.nodules().len()
    }

    /// 扫描概况.
    pub fn summary(&self) -> ScanSummary {
        let g = self.volume.geometry();
        ScanSummary {
            patient_id: self.patient_id.clone(),
            series_uid: g.series_uid().to_owned(),
            nodule_count: self.nodule_count(),
            annotation_count: self.annotations.len(),
            shape: self.volume.shape(),
            pixel_spacing: g.pixel_spacing(),
            slice_thickness: g.slice_thickness(),
        }
    }
}

/// 患者扫描概况.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ScanSummary {
    /// 患者 ID.
    pub patient_id: String,
    /// 序列 UID.
    pub series_uid: String,
    /// 结节个数.
    pub nodule_count: usize,
    /// 标注个数.
    pub annotation_count: usize,
    /// `(z, h, w)`.
    pub shape: Idx3d,
    /// `(h, w)` 方向像素间距 (毫米).
    pub pixel_spacing: (f64, f64),
    /// 层厚 (毫米).
    pub slice_thickness: f64,
}

impl fmt::Display for ScanSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (z, h, w) = self.shape;
        writeln!(f, "Patient ID: {}", self.patient_id)?;
        writeln!(f, "Series UID: {}", self.series_uid)?;
        writeln!(
            f,
            "Nodules: {} ({} annotations)",
            self.nodule_count, self.annotation_count
        )?;
        writeln!(f, "Dimensions: {z} x {h} x {w}")?;
        writeln!(
            f,
            "Pixel spacing: {:.4} x {:.4} mm",
            self.pixel_spacing.0, self.pixel_spacing.1
        )?;
        write!(f, "Slice thickness: {:.4} mm", self.slice_thickness)
    }
}

/// 从指定编号和数据集根目录创建患者数据 ([`PatientScan`]) 加载器.
///
/// # 注意
///
/// 1. `root` 必须是目录, 否则程序 panic.
/// 2. 编号 `n` 对应 `root` 下的 `LIDC-IDRI-{n:04}` 目录. 目录或 CT 序列不存在时,
///   加载器在迭代时会返回 `Result::Error`.
pub fn patient_loader<I: IntoIterator<Item = u32>, P: AsRef<Path>>(
    ids: I,
    root: P,
) -> PatientLoader {
    let root = root.as_ref().to_owned();
    assert!(root.is_dir());

    let mut data: Vec<String> = ids.into_iter().map(patient_id).collect();
    data.reverse();

    PatientLoader {
        root,
        data_rev: data,
    }
}

/// 从数据集根目录创建加载器, 按名称序迭代 `root` 下全部 `LIDC-IDRI-*` 目录.
///
/// `root` 不是目录时返回 [`PrepError::Io`] (`NotFound`).
pub fn full_patient_loader<P: AsRef<Path>>(root: P) -> Result<PatientLoader> {
    let root = root.as_ref().to_owned();
    if !root.is_dir() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("dataset root {} is not a directory", root.display()),
        )
        .into());
    }

    let mut data = Vec::with_capacity(LIDC_IDRI_PATIENT_LEN as usize);
    for entry in std::fs::read_dir(&root)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with("LIDC-IDRI-") && entry.path().is_dir() {
            data.push(name);
        }
    }
    data.sort_unstable_by(|a, b| b.cmp(a));

    Ok(PatientLoader {
        root,
        data_rev: data,
    })
}

/// 患者数据加载器.
#[derive(Debug)]
pub struct PatientLoader {
    root: PathBuf,
    data_rev: Vec<String>,
}

impl Iterator for PatientLoader {
    type Item = (String, Result<PatientScan>);

    fn next(&mut self) -> Option<Self::Item> {
        let pid = self.data_rev.pop()?;
        let data = PatientScan::open(&self.root, &pid);
        Some((pid, data))
    }
}

impl ExactSizeIterator for PatientLoader {
    #[inline]
    fn len(&self) -> usize {
        self.data_rev.len()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::annotation::tests::{cube_annotation, geometry};
    use ndarray::Array3;

    /// 含两个结节的合成患者: 第一个结节三人标注, 第二个结节一人标注.
    pub(crate) fn patient() -> PatientScan {
        let g = geometry();
        let data = Array3::from_shape_fn((8, 32, 32), |(z, h, w)| {
            (z as f32) * 10.0 - 500.0 + ((h + w) % 7) as f32
        });
        let volume = CtVolume::from_parts(data, g).unwrap();
        let annotations = vec![
            cube_annotation("r1", (4, 4), 4, &[1, 2, 3]),
            cube_annotation("r2", (4, 5), 4, &[1, 2, 3]),
            cube_annotation("r3", (5, 4), 4, &[2, 3]),
            cube_annotation("r1", (20, 20), 5, &[5, 6]),
        ];
        PatientScan::from_parts("LIDC-IDRI-0001", volume, annotations)
    }

    #[test]
    fn test_nodules_cached() {
        let p = patient();
        assert_eq!(p.nodule_count(), 2);
        assert!(std::ptr::eq(p.nodules(), p.nodules()));
        assert_eq!(p.nodules()[0].len(), 3);
    }

    #[test]
    fn test_summary() {
        let s = patient().summary();
        assert_eq!(s.nodule_count, 2);
        assert_eq!(s.annotation_count, 4);
        assert_eq!(s.shape, (8, 32, 32));
        let text = s.to_string();
        assert!(text.starts_with("Patient ID: LIDC-IDRI-0001\n"));
        assert!(text.contains("Dimensions: 8 x 32 x 32"));
        assert!(text.contains("Slice thickness: 1.0000 mm"));
    }

    #[test]
    fn test_open_missing() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            PatientScan::open(dir.path(), "LIDC-IDRI-0042"),
            Err(PrepError::ScanNotFound(p)) if p == "LIDC-IDRI-0042"
        ));
        std::fs::create_dir(dir.path().join("LIDC-IDRI-0042")).unwrap();
        assert!(matches!(
            PatientScan::open(dir.path(), "LIDC-IDRI-0042"),
            Err(PrepError::ScanNotFound(p)) if p == "LIDC-IDRI-0042"
        ));
    }

    #[test]
    fn test_loaders() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["LIDC-IDRI-0003", "LIDC-IDRI-0001", "other"] {
            std::fs::create_dir(dir.path().join(name)).unwrap();
        }
        std::fs::write(dir.path().join("LIDC-IDRI-0002"), b"file").unwrap();

        let loader = full_patient_loader(dir.path()).unwrap();
        assert_eq!(loader.len(), 2);
        let ids: Vec<String> = loader
            .map(|(pid, r)| {
                assert!(r.is_err());
                pid
            })
            .collect();
        assert_eq!(ids, vec!["LIDC-IDRI-0001", "LIDC-IDRI-0003"]);

        let ids: Vec<String> = patient_loader([7, 2], dir.path()).map(|(p, _)| p).collect();
        assert_eq!(ids, vec!["LIDC-IDRI-0007", "LIDC-IDRI-0002"]);
    }

    #[test]
    fn test_full_loader_bad_root() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing");
        assert!(matches!(
            full_patient_loader(&missing),
            Err(PrepError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound
        ));

        let file = dir.path().join("LIDC-IDRI-0001");
        std::fs::write(&file, b"file").unwrap();
        assert!(matches!(full_patient_loader(&file), Err(PrepError::Io(_))));
    }
}
