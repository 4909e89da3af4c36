//! 各子命令的实际运行函数.

use crate::result::{FeatureRecord, HuReport, NoduleReport, SummaryReport};
use log::{info, warn};
use lung_berry::annotation::{calculate_malignancy, consensus, NoduleSummary};
use lung_berry::consts::{CONSENSUS_LEVEL, CONSENSUS_PAD};
use lung_berry::dataset::{self, PatientScan};
use lung_berry::export::{process_nodule_images_masks, write_meta_csv, ExportConfig};
use lung_berry::features::{extract_radiomics, RadiomicsSettings};
use lung_berry::segment::{lung_mask, segment_volume};
use lung_berry::stats::{plot_annotation_stats, AnnotationStats};
use lung_berry::{load_series, CtVolume, CtWindow, HuRange, ImgWriteVis, VolumeAttr};
use ndarray_npy::write_npy;
use std::error::Error;
use std::io::{self, Write};
use std::path::Path;
use utils::loader;

pub type RunResult<T> = Result<T, Box<dyn Error>>;

fn open_volume(root: &Path, n: u32) -> RunResult<CtVolume> {
    Ok(load_series(root.join(dataset::patient_id(n)))?)
}

/// 取 `slice` 或者中间层, 并检查越界.
fn pick_slice(volume: &CtVolume, slice: Option<usize>) -> RunResult<usize> {
    let k = slice.unwrap_or(volume.len_z() / 2);
    if k >= volume.len_z() {
        return Err(format!("slice {k} out of range 0..{}", volume.len_z()).into());
    }
    Ok(k)
}

/// 依次处理加载成功的患者, 加载失败的患者被跳过.
fn for_each_patient<F>(root: &Path, ids: &[u32], mut op: F) -> RunResult<()>
where
    F: FnMut(PatientScan) -> RunResult<()>,
{
    for (pid, patient) in loader::patient_loader(root, ids)? {
        match patient {
            Ok(p) => op(p)?,
            Err(e) => warn!("skip {pid}: {e}"),
        }
    }
    Ok(())
}

pub fn hu(
    root: &Path,
    n: u32,
    npy: Option<&Path>,
    png: Option<(&Path, CtWindow)>,
    slice: Option<usize>,
) -> RunResult<()> {
    let mut volume = open_volume(root, n)?;
    let raw_min = volume.data().iter().copied().fold(f32::INFINITY, f32::min);
    let raw_max = volume.data().iter().copied().fold(f32::NEG_INFINITY, f32::max);

    let range = HuRange::default();
    volume.par_clip_hu(range);
    let report = HuReport {
        patient_id: dataset::patient_id(n),
        shape: volume.shape(),
        raw_min,
        raw_max,
        mean_clipped: volume.data().iter().map(|&v| v as f64).sum::<f64>() / volume.size() as f64,
    };

    if let Some((png, window)) = png {
        let k = pick_slice(&volume, slice)?;
        volume.slice_at(k).save_windowed(png, window)?;
        info!("slice {k} saved to {png:?}");
    }
    if let Some(npy) = npy {
        write_npy(npy, &volume.normalized(range))?;
        info!("normalised volume saved to {npy:?}");
    }

    let mut out = io::stdout().lock();
    report.describe_into(&mut out)?;
    writeln!(out)?;
    Ok(())
}

pub fn segment(
    root: &Path,
    n: u32,
    slice: Option<usize>,
    all: bool,
    out: &Path,
) -> RunResult<()> {
    let volume = open_volume(root, n)?;
    if all {
        let masked = segment_volume(&volume)?;
        write_npy(out, &masked)?;
        println!("Segmented {} slices into {out:?}", volume.len_z());
    } else {
        let k = pick_slice(&volume, slice)?;
        let seg = lung_mask(volume.slice_at(k).data())?;
        let mask = seg.mask.as_immut();
        mask.save(out)?;
        println!(
            "Slice {k}: threshold {:.4}, {} lung pixels, mask saved to {out:?}",
            seg.threshold,
            mask.foreground_count()
        );
    }
    Ok(())
}

pub fn extract(
    root: &Path,
    ids: &[u32],
    config: &ExportConfig,
    meta_path: &Path,
) -> RunResult<()> {
    let mut records = vec![];
    for_each_patient(root, ids, |p| {
        records.extend(process_nodule_images_masks(&p, config)?);
        Ok(())
    })?;
    if let Some(parent) = meta_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    write_meta_csv(meta_path, &records)?;
    println!("Exported {} slice pairs, meta saved to {meta_path:?}", records.len());
    Ok(())
}

pub fn features(root: &Path, ids: &[u32], bin_width: f64) -> RunResult<()> {
    let settings = RadiomicsSettings {
        bin_width,
        ..Default::default()
    };
    let mut out = io::stdout().lock();
    for_each_patient(root, ids, |p| {
        let volume = p.volume();
        for (n, nodule) in p.nodules().iter().enumerate() {
            let c = consensus(nodule, volume.geometry(), CONSENSUS_LEVEL, CONSENSUS_PAD)?;
            let mask = c.mask.mapv(u8::from);
            let features = extract_radiomics(
                volume.crop(&c.bbox),
                mask.view(),
                volume.pix_dim(),
                &settings,
            )?;
            let (malignancy, cancer_label) = calculate_malignancy(nodule)?;
            let record = FeatureRecord {
                patient_id: p.patient_id(),
                nodule_no: n,
                malignancy,
                cancer_label,
                features,
            };
            writeln!(out, "{}", serde_json::to_string(&record)?)?;
        }
        Ok(())
    })
}

pub fn stats(root: &Path, ids: &[u32], out: &Path) -> RunResult<()> {
    let stats = AnnotationStats::from_loader(loader::patient_loader(root, ids)?);
    plot_annotation_stats(&stats, out)?;
    println!("Plotted {} annotations into {out:?}", stats.len());
    Ok(())
}

pub fn summary(root: &Path, ids: &[u32], json: bool) -> RunResult<()> {
    let mut out = io::stdout().lock();
    for_each_patient(root, ids, |p| {
        let g = p.volume().geometry();
        let mut nodules = vec![];
        for (n, nodule) in p.nodules().iter().enumerate() {
            let (malignancy, cancer_label) = calculate_malignancy(nodule)?;
            nodules.push(NoduleReport {
                nodule_no: n,
                annotations: nodule.len(),
                malignancy,
                cancer_label,
                mean: NoduleSummary::new(n, nodule, g).annot_info(),
            });
        }
        let report = SummaryReport {
            scan: p.summary(),
            nodules,
        };
        if json {
            writeln!(out, "{}", serde_json::to_string_pretty(&report)?)?;
        } else {
            report.describe_into(&mut out)?;
            utils::sep_to(&mut out)?;
        }
        Ok(())
    })
}
