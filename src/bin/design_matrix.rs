use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::PathBuf;

use neurodm::{
    load_variables, read_tsv, write_design_matrix_tsv, CollectionConfig, Kind, Level, RunInfo,
};

#[derive(Parser)]
#[command(
    name = "design_matrix",
    about = "Build a long-format design matrix from BIDS-style event tables"
)]
struct Args {
    /// events.tsv files, one per run (order must match --runs)
    #[arg(long, required = true, num_args = 1..)]
    events: Vec<PathBuf>,

    /// JSON sidecar: an array with one run descriptor per events file
    /// ({"entities": {...}, "duration": s, "tr": s, "n_vols": n})
    #[arg(long)]
    runs: PathBuf,

    /// participants.tsv for subject-level variables
    #[arg(long)]
    participants: Option<PathBuf>,

    /// Default densification rate in Hz
    #[arg(long, default_value_t = 10.0)]
    sampling_rate: f64,

    /// Densify all event variables before extraction
    #[arg(long)]
    dense: bool,

    /// Resample dense variables to this rate (Hz)
    #[arg(long)]
    resample: Option<f64>,

    /// Comma-separated variable names to keep (default: all)
    #[arg(long)]
    columns: Option<String>,

    /// Output TSV path
    #[arg(long)]
    output: PathBuf,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let run_info: Vec<RunInfo> = serde_json::from_str(
        &std::fs::read_to_string(&args.runs).context("reading run descriptors")?,
    )
    .context("parsing run descriptors")?;
    if run_info.len() != args.events.len() {
        bail!(
            "{} run descriptors for {} event tables",
            run_info.len(),
            args.events.len()
        );
    }

    let mut runs = Vec::with_capacity(args.events.len());
    for (path, info) in args.events.iter().zip(run_info) {
        let table = read_tsv(path).with_context(|| format!("reading {}", path.display()))?;
        runs.push((info, table));
    }
    let participants = match &args.participants {
        Some(p) => {
            Some(read_tsv(p).with_context(|| format!("reading {}", p.display()))?)
        }
        None => None,
    };

    let config = CollectionConfig {
        sampling_rate: args.sampling_rate,
        default_duration: None,
    };
    let mut dataset = load_variables(&runs, participants.as_ref(), config)?;

    let coll = dataset
        .collection_mut(Level::Run)
        .context("no run-level collection")?;
    println!("Loaded {} variables across {} runs", coll.len(), runs.len());

    if let Some(rate) = args.resample {
        coll.resample(rate, args.dense, Kind::Linear)?;
    } else if args.dense {
        let rate = coll.sampling_rate();
        coll.resample(rate, true, Kind::Linear)?;
    }

    let columns: Option<Vec<String>> = args
        .columns
        .as_ref()
        .map(|c| c.split(',').map(|s| s.trim().to_string()).collect());
    let dm = coll.get_design_matrix(columns.as_deref(), &[], &[])?;
    println!(
        "Design matrix: {} rows × {} columns",
        dm.len(),
        dm.column_names().len()
    );

    write_design_matrix_tsv(&dm, &args.output)?;
    println!("Written → {}", args.output.display());
    Ok(())
}
