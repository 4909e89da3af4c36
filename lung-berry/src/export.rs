//! 结节切片导出.
//!
//! 每个结节的共识掩码逐层切片, 图像与掩码分别保存为 `.npy` 文件,
//! 并为每一对文件生成一条元信息记录.

use crate::annotation::{calculate_malignancy, consensus, CancerLabel};
use crate::consts::{CONSENSUS_LEVEL, CONSENSUS_PAD, MASK_THRESHOLD};
use crate::dataset::PatientScan;
use crate::segment::segment_lung;
use crate::{Result, VolumeAttr};
use log::{debug, info};
use ndarray::{Array2, ArrayView2, Axis};
use ndarray_npy::write_npy;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// 导出参数.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ExportConfig {
    /// 图像根目录, 每个患者一个子目录.
    pub image_dir: PathBuf,

    /// 掩码根目录, 每个患者一个子目录.
    pub mask_dir: PathBuf,

    /// 掩码前景像素数不超过该值的切片被跳过.
    pub mask_threshold: usize,

    /// 共识比例.
    pub clevel: f64,

    /// 共识包围盒在三个方向上的扩展体素数.
    pub pad: usize,

    /// 是否在保存前分割肺实质.
    pub segment_lungs: bool,

    /// 无结节患者导出的空白切片数. 0 表示不导出.
    pub clean_slices: usize,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            image_dir: PathBuf::from("data/image"),
            mask_dir: PathBuf::from("data/mask"),
            mask_threshold: MASK_THRESHOLD,
            clevel: CONSENSUS_LEVEL,
            pad: CONSENSUS_PAD,
            segment_lungs: false,
            clean_slices: 0,
        }
    }
}

/// 一对导出文件的元信息.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MetaRecord {
    /// 患者 ID 的后 4 位.
    pub patient_id: String,
    /// 结节序号, 从 0 开始.
    pub nodule_no: usize,
    /// 切片在共识包围盒内的序号.
    pub slice_no: usize,
    /// 图像文件名 (不含扩展名).
    pub original_image: String,
    /// 掩码文件名 (不含扩展名).
    pub mask_image: String,
    /// 恶性程度评分.
    pub malignancy: u8,
    /// 良恶性标签.
    pub cancer_label: CancerLabel,
    /// 是否为无结节患者的空白切片.
    pub is_clean: bool,
}

/// 取末尾 4 个字符.
fn short_id(pid: &str) -> &str {
    let start = pid
        .char_indices()
        .rev()
        .nth(3)
        .map_or(0, |(i, _)| i);
    &pid[start..]
}

/// 处理单张图像切片: 负零替换为零, 按需分割肺实质.
fn prepare_slice(img: ArrayView2<f32>, segment_lungs: bool) -> Result<Array2<f32>> {
    let mut img = img.mapv(|v| if v == 0.0 { 0.0 } else { v });
    if segment_lungs {
        img = segment_lung(img.view())?;
    }
    Ok(img)
}

/// 导出患者 `patient` 全部结节的图像/掩码切片, 返回元信息记录.
///
/// 文件名形如 `0001_NI000_slice002.npy` (图像, `f32`) 与
/// `0001_MA000_slice002.npy` (掩码, `bool`), 其中层号是共识包围盒内的层号.
/// 默认的 `pad` 让包围盒覆盖全部切片, 此时层号即体数据中的绝对层号.
///
/// 患者没有结节且 `config.clean_slices > 0` 时, 导出前若干层切片与空掩码
/// (`_CN001`/`_CM001`).
pub fn process_nodule_images_masks(
    patient: &PatientScan,
    config: &ExportConfig,
) -> Result<Vec<MetaRecord>> {
    let pid = patient.patient_id();
    let short = short_id(pid);
    let image_dir = config.image_dir.join(pid);
    let mask_dir = config.mask_dir.join(pid);
    fs::create_dir_all(&image_dir)?;
    fs::create_dir_all(&mask_dir)?;

    let volume = patient.volume();
    let geometry = volume.geometry();
    let mut records = vec![];

    for (n, nodule) in patient.nodules().iter().enumerate() {
        let c = consensus(nodule, geometry, config.clevel, config.pad)?;
        let crop = volume.crop(&c.bbox);
        let (malignancy, cancer_label) = calculate_malignancy(nodule)?;
        debug!("{pid} nodule {n}: {} slices", c.mask.len_of(Axis(0)));

        for (s, (mask, img)) in c
            .mask
            .axis_iter(Axis(0))
            .zip(crop.axis_iter(Axis(0)))
            .enumerate()
        {
            if mask.iter().filter(|&&v| v).count() <= config.mask_threshold {
                continue;
            }
            let img = prepare_slice(img, config.segment_lungs)?;
            let nodule_name = format!("{short}_NI{n:03}_slice{s:03}");
            let mask_name = format!("{short}_MA{n:03}_slice{s:03}");
            write_npy(image_dir.join(format!("{nodule_name}.npy")), &img)?;
            write_npy(mask_dir.join(format!("{mask_name}.npy")), &mask)?;

            records.push(MetaRecord {
                patient_id: short.to_owned(),
                nodule_no: n,
                slice_no: s,
                original_image: nodule_name,
                mask_image: mask_name,
                malignancy,
                cancer_label,
                is_clean: false,
            });
        }
    }

    if patient.nodule_count() == 0 && config.clean_slices > 0 {
        let mask = Array2::from_elem(volume.slice_shape(), false);
        for (s, img) in volume
            .data()
            .axis_iter(Axis(0))
            .take(config.clean_slices)
            .enumerate()
        {
            let img = prepare_slice(img, config.segment_lungs)?;
            let nodule_name = format!("{short}_CN001_slice{s:03}");
            let mask_name = format!("{short}_CM001_slice{s:03}");
            write_npy(image_dir.join(format!("{nodule_name}.npy")), &img)?;
            write_npy(mask_dir.join(format!("{mask_name}.npy")), &mask)?;

            records.push(MetaRecord {
                patient_id: short.to_owned(),
                nodule_no: 0,
                slice_no: s,
                original_image: nodule_name,
                mask_image: mask_name,
                malignancy: 0,
                cancer_label: CancerLabel::Benign,
                is_clean: true,
            });
        }
    }

    info!("processing for patient {pid} completed: {} slices", records.len());
    Ok(records)
}

/// 把元信息记录写为带表头的 CSV 文件.
pub fn write_meta_csv<P: AsRef<Path>>(path: P, records: &[MetaRecord]) -> Result<()> {
    let mut w = BufWriter::new(fs::File::create(path)?);
    writeln!(
        w,
        "patient_id,nodule_no,slice_no,original_image,mask_image,malignancy,is_cancer,is_clean"
    )?;
    for r in records {
        writeln!(
            w,
            "{},{},{:03},{},{},{},{},{}",
            r.patient_id,
            r.nodule_no,
            r.slice_no,
            r.original_image,
            r.mask_image,
            r.malignancy,
            r.cancer_label,
            if r.is_clean { "True" } else { "False" },
        )?;
    }
    w.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::lidc::tests::patient;
    use crate::CtVolume;
    use ndarray::Array3;
    use ndarray_npy::read_npy;

    fn config(dir: &Path) -> ExportConfig {
        ExportConfig {
            image_dir: dir.join("image"),
            mask_dir: dir.join("mask"),
            ..Default::default()
        }
    }

    #[test]
    fn test_short_id() {
        assert_eq!(short_id("LIDC-IDRI-0078"), "0078");
        assert_eq!(short_id("78"), "78");
    }

    #[test]
    fn test_export_nodules() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path());
        let records = process_nodule_images_masks(&patient(), &cfg).unwrap();

        // 第一个结节 3 层, 第二个结节 2 层.
        assert_eq!(records.len(), 5);
        assert!(records.iter().all(|r| !r.is_clean && r.malignancy == 4));
        // 切片编号为体数据中的绝对层号.
        assert_eq!(records[0].original_image, "0001_NI000_slice001");
        assert_eq!(records[2].slice_no, 3);
        assert_eq!(records[3].original_image, "0001_NI001_slice005");
        assert_eq!(records[4].mask_image, "0001_MA001_slice006");
        assert_eq!(records[0].cancer_label, CancerLabel::Malignant);

        let img: Array2<f32> = read_npy(
            cfg.image_dir
                .join("LIDC-IDRI-0001")
                .join("0001_NI000_slice001.npy"),
        )
        .unwrap();
        // 包围盒扩展到整张切片.
        assert_eq!(img.dim(), (32, 32));
        let mask: Array2<bool> = read_npy(
            cfg.mask_dir
                .join("LIDC-IDRI-0001")
                .join("0001_MA000_slice001.npy"),
        )
        .unwrap();
        assert_eq!(mask.iter().filter(|&&v| v).count(), 12);

        let csv = dir.path().join("meta.csv");
        write_meta_csv(&csv, &records).unwrap();
        let text = fs::read_to_string(&csv).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 6);
        assert!(lines[0].starts_with("patient_id,nodule_no"));
        assert_eq!(
            lines[1],
            "0001,0,001,0001_NI000_slice001,0001_MA000_slice001,4,True,False"
        );
    }

    #[test]
    fn test_export_threshold() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = ExportConfig {
            mask_threshold: 12,
            ..config(dir.path())
        };
        let records = process_nodule_images_masks(&patient(), &cfg).unwrap();
        // 第一个结节的首层恰好 12 个像素, 被跳过.
        assert_eq!(records.len(), 4);
        assert_eq!(records[0].slice_no, 2);
    }

    #[test]
    fn test_export_clean() {
        let dir = tempfile::tempdir().unwrap();
        let p = patient();
        let empty = PatientScan::from_parts(
            "LIDC-IDRI-0002",
            CtVolume::from_parts(
                Array3::from_elem((8, 32, 32), -0.0f32),
                p.volume().geometry().clone(),
            )
            .unwrap(),
            vec![],
        );
        let none = process_nodule_images_masks(&empty, &config(dir.path())).unwrap();
        assert!(none.is_empty());

        let cfg = ExportConfig {
            clean_slices: 3,
            ..config(dir.path())
        };
        let records = process_nodule_images_masks(&empty, &cfg).unwrap();
        assert_eq!(records.len(), 3);
        assert!(records.iter().all(|r| r.is_clean));
        assert_eq!(records[2].original_image, "0002_CN001_slice002");
        let img: Array2<f32> = read_npy(
            cfg.image_dir
                .join("LIDC-IDRI-0002")
                .join("0002_CN001_slice000.npy"),
        )
        .unwrap();
        assert!(img.iter().all(|v| v.is_sign_positive()));
    }
}
