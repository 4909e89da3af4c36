//! LIDC-IDRI 预处理命令行工具.

mod result;
mod runner;

use clap::{Args, Parser, Subcommand};
use log::LevelFilter;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "lidc-prep",
    about = "Preprocess LIDC-IDRI lung CT scans and nodule annotations",
    version
)]
struct Cli {
    /// Dataset root (defaults to $LIDC_IDRI_DIR, then ~/dataset/LIDC-IDRI)
    #[arg(short = 'd', long = "dataset", global = true)]
    dataset: Option<PathBuf>,

    /// Number of worker threads (defaults to all cores)
    #[arg(short = 'j', long = "jobs", global = true)]
    jobs: Option<usize>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

/// 患者编号. 为空时表示全部患者.
#[derive(Args, Debug, Clone)]
struct Patients {
    /// Patient numbers, e.g. `-p 1 -p 78` for LIDC-IDRI-0001 and LIDC-IDRI-0078
    #[arg(short = 'p', long = "patient")]
    ids: Vec<u32>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Convert a scan to clipped HU and report its statistics
    Hu {
        /// Patient number
        patient: u32,
        /// Save the clipped volume normalised to [0, 1] as .npy
        #[arg(long)]
        npy: Option<PathBuf>,
        /// Save one slice as PNG (lung window unless --mediastinal)
        #[arg(long)]
        png: Option<PathBuf>,
        /// Slice index for --png (defaults to the middle slice)
        #[arg(long)]
        slice: Option<usize>,
        /// Use the mediastinal window (level 40, width 400) for --png
        #[arg(long, requires = "png")]
        mediastinal: bool,
    },

    /// Segment lung parenchyma
    Segment {
        /// Patient number
        patient: u32,
        /// Slice index (defaults to the middle slice)
        #[arg(long)]
        slice: Option<usize>,
        /// Segment every slice and save the masked volume as .npy
        #[arg(long, conflicts_with = "slice")]
        all: bool,
        /// Output path (.png mask for one slice, .npy for --all)
        #[arg(short = 'o', long)]
        out: PathBuf,
    },

    /// Export per-nodule image/mask slices and the meta CSV
    Extract {
        #[command(flatten)]
        patients: Patients,
        /// Output directory holding `image/`, `mask/` and `meta.csv`
        #[arg(short = 'o', long, default_value = "data")]
        out: PathBuf,
        /// Skip slices whose mask has at most this many pixels
        #[arg(long, default_value_t = lung_berry::consts::MASK_THRESHOLD)]
        mask_threshold: usize,
        /// Segment the lungs before saving image slices
        #[arg(long)]
        segment_lungs: bool,
        /// Leading slices to export for patients without nodules
        #[arg(long, default_value_t = 0)]
        clean_slices: usize,
    },

    /// Extract radiomics features of every nodule as JSON lines
    Features {
        #[command(flatten)]
        patients: Patients,
        /// Bin width of the grey-level discretisation
        #[arg(long, default_value_t = 25.0)]
        bin_width: f64,
    },

    /// Plot annotation statistics over the dataset
    Stats {
        #[command(flatten)]
        patients: Patients,
        /// Output PNG
        #[arg(short = 'o', long, default_value = "annotation_stats.png")]
        out: PathBuf,
    },

    /// Print scan and nodule summaries
    Summary {
        #[command(flatten)]
        patients: Patients,
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
}

fn init_logger(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    if let Err(e) = simple_logger::SimpleLogger::new()
        .with_level(level)
        .env()
        .init()
    {
        eprintln!("Logger initialisation failed: {e}");
    }
}

fn main() -> runner::RunResult<()> {
    let cli = Cli::parse();
    init_logger(cli.verbose);

    rayon::ThreadPoolBuilder::new()
        .num_threads(cli.jobs.unwrap_or_else(utils::cpus))
        .build_global()?;

    let root = utils::loader::dataset_dir(cli.dataset.as_deref())
        .ok_or("cannot determine the dataset directory")?;
    if !root.is_dir() {
        return Err(format!("Not a directory: {}", root.display()).into());
    }

    match cli.command {
        Command::Hu {
            patient,
            npy,
            png,
            slice,
            mediastinal,
        } => {
            let window = if mediastinal {
                utils::mediastinal_window()
            } else {
                utils::lung_window()
            };
            let png = png.as_deref().map(|p| (p, window));
            runner::hu(&root, patient, npy.as_deref(), png, slice)
        }
        Command::Segment {
            patient,
            slice,
            all,
            out,
        } => runner::segment(&root, patient, slice, all, &out),
        Command::Extract {
            patients,
            out,
            mask_threshold,
            segment_lungs,
            clean_slices,
        } => {
            let config = lung_berry::export::ExportConfig {
                image_dir: out.join("image"),
                mask_dir: out.join("mask"),
                mask_threshold,
                segment_lungs,
                clean_slices,
                ..Default::default()
            };
            runner::extract(&root, &patients.ids, &config, &out.join("meta.csv"))
        }
        Command::Features {
            patients,
            bin_width,
        } => runner::features(&root, &patients.ids, bin_width),
        Command::Stats { patients, out } => runner::stats(&root, &patients.ids, &out),
        Command::Summary { patients, json } => runner::summary(&root, &patients.ids, json),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_extract() {
        let cli = Cli::try_parse_from([
            "lidc-prep", "-vv", "extract", "-p", "1", "-p", "78", "--clean-slices", "5",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Command::Extract {
                patients,
                mask_threshold,
                clean_slices,
                ..
            } => {
                assert_eq!(patients.ids, vec![1, 78]);
                assert_eq!(mask_threshold, 8);
                assert_eq!(clean_slices, 5);
            }
            c => panic!("unexpected command {c:?}"),
        }
    }

    #[test]
    fn test_parse_hu_window() {
        let cli =
            Cli::try_parse_from(["lidc-prep", "hu", "7", "--png", "a.png", "--mediastinal"])
                .unwrap();
        match cli.command {
            Command::Hu {
                patient,
                png,
                mediastinal,
                ..
            } => {
                assert_eq!(patient, 7);
                assert_eq!(png, Some(PathBuf::from("a.png")));
                assert!(mediastinal);
            }
            c => panic!("unexpected command {c:?}"),
        }
        // 没有 --png 时窗口无意义.
        assert!(Cli::try_parse_from(["lidc-prep", "hu", "7", "--mediastinal"]).is_err());
    }

    #[test]
    fn test_segment_conflict() {
        assert!(Cli::try_parse_from([
            "lidc-prep", "segment", "1", "--all", "--slice", "3", "-o", "x.npy"
        ])
        .is_err());
    }
}
