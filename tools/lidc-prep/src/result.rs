//! 命令输出.

use lung_berry::annotation::{CancerLabel, MeanProperties};
use lung_berry::dataset::ScanSummary;
use lung_berry::features::FeatureVector;
use lung_berry::Idx3d;
use serde::Serialize;
use std::io::{self, Write};

const S4: &str = "    ";

/// HU 转换结果.
#[derive(Debug, Serialize)]
pub struct HuReport {
    pub patient_id: String,
    pub shape: Idx3d,
    pub raw_min: f32,
    pub raw_max: f32,
    pub mean_clipped: f64,
}

impl HuReport {
    pub fn describe_into<W: Write>(&self, w: &mut W) -> io::Result<()> {
        let (z, h, w_) = self.shape;
        writeln!(w, "Patient `{}`:", self.patient_id)?;
        writeln!(w, "{S4}Dimensions: {z} x {h} x {w_}")?;
        writeln!(w, "{S4}Raw HU range: [{}, {}]", self.raw_min, self.raw_max)?;
        write!(w, "{S4}Mean clipped HU: {:.3}", self.mean_clipped)
    }
}

/// 单个结节的特征.
#[derive(Debug, Serialize)]
pub struct FeatureRecord<'a> {
    pub patient_id: &'a str,
    pub nodule_no: usize,
    pub malignancy: u8,
    pub cancer_label: CancerLabel,
    pub features: FeatureVector,
}

/// 单个结节的概况.
#[derive(Debug, Serialize)]
pub struct NoduleReport {
    pub nodule_no: usize,
    pub annotations: usize,
    pub malignancy: u8,
    pub cancer_label: CancerLabel,
    pub mean: MeanProperties,
}

/// 患者概况.
#[derive(Debug, Serialize)]
pub struct SummaryReport {
    pub scan: ScanSummary,
    pub nodules: Vec<NoduleReport>,
}

impl SummaryReport {
    /// 将概况以文本形式写进 `w` 中.
    pub fn describe_into<W: Write>(&self, w: &mut W) -> io::Result<()> {
        writeln!(w, "{}", self.scan)?;
        for n in self.nodules.iter() {
            writeln!(
                w,
                "Nodule {} ({} annotations): malignancy {} ({})",
                n.nodule_no, n.annotations, n.malignancy, n.cancer_label
            )?;
            writeln!(w, "{S4}Mean volume: {:.3} mm^3", n.mean.mean_volume)?;
            writeln!(
                w,
                "{S4}Mean surface area: {:.3} mm^2",
                n.mean.mean_surface_area
            )?;
            writeln!(w, "{S4}Mean diameter: {:.3} mm", n.mean.mean_diameter)?;
            writeln!(w, "{S4}Mean sphericity: {:.3}", n.mean.mean_sphericity)?;
            writeln!(w, "{S4}Mean texture: {:.3}", n.mean.mean_texture)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan() -> ScanSummary {
        ScanSummary {
            patient_id: "LIDC-IDRI-0001".into(),
            series_uid: "1.2".into(),
            nodule_count: 1,
            annotation_count: 4,
            shape: (133, 512, 512),
            pixel_spacing: (0.7, 0.7),
            slice_thickness: 2.5,
        }
    }

    #[test]
    fn test_describe_summary() {
        let r = SummaryReport {
            scan: scan(),
            nodules: vec![NoduleReport {
                nodule_no: 0,
                annotations: 4,
                malignancy: 5,
                cancer_label: CancerLabel::Malignant,
                mean: MeanProperties::default(),
            }],
        };
        let mut buf = vec![];
        r.describe_into(&mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("Nodule 0 (4 annotations): malignancy 5 (True)"));
        assert!(text.contains("Dimensions: 133 x 512 x 512"));

        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["nodules"][0]["cancer_label"], "Malignant");
        assert_eq!(json["scan"]["nodule_count"], 1);
    }

    #[test]
    fn test_describe_hu() {
        let r = HuReport {
            patient_id: "LIDC-IDRI-0001".into(),
            shape: (2, 3, 4),
            raw_min: -2048.0,
            raw_max: 3071.0,
            mean_clipped: -512.25,
        };
        let mut buf = vec![];
        r.describe_into(&mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.ends_with("Mean clipped HU: -512.250"));
    }
}
