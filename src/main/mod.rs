use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use env_logger::Env;
use log::info;
use methbins::{
    config::RunConfig,
    pipeline::run_bam,
    pool::{DEFAULT_CHUNK_SIZE, DEFAULT_THREADS},
    postprocess::{Thresholds, DEFAULT_HIGH_THRESHOLD, DEFAULT_LOW_THRESHOLD},
    prelude::{MethBinsError, SequenceFilter},
    seqlens::PRIMARY_PREFIX,
    Position,
};

const INFO: &str = "\
methbins: per-bin CpG methylation matrices and density-specific imputation
usage: methbins [options] <bin_size> <input.bam>

Tiles the genome into bins of <bin_size> bp, extracts a read-by-CpG matrix
for every bin of an indexed, coordinate-sorted Bismark BAM file, and imputes
missing calls in bins with 2 to 5 CpGs.
";

#[derive(Parser)]
#[clap(name = "methbins")]
#[clap(about = INFO)]
struct Cli {
    #[arg(short, long, action = clap::ArgAction::Count)]
    debug: u8,

    /// size of the genomic bins, in basepairs
    #[arg(required = true)]
    bin_size: Position,

    /// an indexed, coordinate-sorted BAM file with Bismark XM tags
    #[arg(required = true)]
    input: PathBuf,

    /// only process this sequence
    #[arg(short, long)]
    chromosome: Option<String>,

    /// output directory (default: the input file's directory)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// number of worker threads
    #[arg(short, long, default_value_t = DEFAULT_THREADS)]
    threads: usize,

    /// number of bins handed to a worker at a time
    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
    chunk_size: usize,

    /// seconds between progress reports
    #[arg(long, default_value_t = 60)]
    progress_interval: u64,

    /// keep only sequences whose name starts with this prefix
    #[arg(long, default_value = PRIMARY_PREFIX)]
    prefix: String,

    /// keep all sequences, including scaffolds and contigs
    #[arg(long, conflicts_with = "prefix")]
    all_sequences: bool,

    /// a TSV genome file of sequence names and lengths to use instead of the BAM header
    #[arg(long)]
    seqlens: Option<PathBuf>,

    /// predictions at or below this are unmethylated
    #[arg(long, default_value_t = DEFAULT_LOW_THRESHOLD)]
    low_threshold: f64,

    /// predictions at or above this are methylated
    #[arg(long, default_value_t = DEFAULT_HIGH_THRESHOLD)]
    high_threshold: f64,
}

impl Cli {
    fn into_config(self) -> Result<RunConfig, MethBinsError> {
        let defaults = RunConfig::new(self.bin_size, &self.input)?;
        let sequence_filter = if self.all_sequences {
            SequenceFilter::All
        } else {
            SequenceFilter::Prefix(self.prefix)
        };
        RunConfig {
            output_dir: self.output.unwrap_or(defaults.output_dir.clone()),
            chromosome: self.chromosome,
            threads: self.threads,
            chunk_size: self.chunk_size,
            progress_interval: Duration::from_secs(self.progress_interval),
            sequence_filter,
            seqlens_path: self.seqlens,
            thresholds: Thresholds::new(self.low_threshold, self.high_threshold)?,
            ..defaults
        }
        .validate()
    }
}

fn init_logging(debug: u8) {
    let level = match debug {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(level)).init();
}

fn run() -> Result<(), MethBinsError> {
    let cli = Cli::parse();
    init_logging(cli.debug);

    let config = cli.into_config()?;
    info!(
        "Binning {} in {} bp bins, writing to {}",
        config.input.display(),
        config.bin_size,
        config.output_dir.display()
    );

    let output = run_bam(&config)?;
    let (summary, report) = output.into_parts();
    info!("Run summary:\n{}", summary);
    if !report.is_empty() {
        info!("Issues:\n{}", report);
    }
    Ok(())
}

fn main() {
    match run() {
        Ok(_) => {}
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}
