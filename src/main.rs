use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;
use log::{error, info};

use unique_ips::config::{default_workers, DEFAULT_CHUNK_SIZE, DEFAULT_PADDING, DEFAULT_QUEUE_DEPTH};
use unique_ips::{count_unique, ChunkSource, MappedFile, PositionalFile, ScanConfig, ScanError, ScanSummary};

#[derive(Parser, Debug)]
#[command(name = "rust-unique-ips")]
#[command(about = "Counts the distinct IPv4 addresses in a file, one per line", long_about = None)]
struct Args {
    /// Input file, one dotted-decimal IPv4 address per line
    file: PathBuf,

    /// Worker threads [default: available parallelism]
    #[arg(short, long)]
    workers: Option<NonZeroUsize>,

    /// Bytes per chunk handed to a worker
    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
    chunk_size: usize,

    /// Bytes read past each chunk to finish its last line; must exceed 19
    #[arg(long, default_value_t = DEFAULT_PADDING)]
    padding: usize,

    /// Queued chunk offsets per worker
    #[arg(long, default_value_t = DEFAULT_QUEUE_DEPTH)]
    queue_depth: usize,

    /// Memory-map the file instead of reading it with positional reads
    #[arg(long)]
    mmap: bool,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<(), ScanError> {
    let config = ScanConfig {
        chunk_size: args.chunk_size,
        padding: args.padding,
        workers: args.workers.unwrap_or_else(default_workers),
        queue_depth: args.queue_depth,
    };
    config.validate()?;

    if args.mmap {
        let source = MappedFile::open(&args.file)?;
        timed_count(&source, &config)
    } else {
        let source = PositionalFile::open(&args.file)?;
        timed_count(&source, &config)
    }
}

fn timed_count(source: &impl ChunkSource, config: &ScanConfig) -> Result<(), ScanError> {
    let start = Instant::now();
    let ScanSummary { unique, stats } = count_unique(source, config)?;
    let elapsed = start.elapsed();

    println!("Unique IPs: {unique}");
    println!("Time taken: {elapsed:?}");
    info!(
        "{} workers scanned {} bytes in {} chunks: {} valid lines, {} invalid lines",
        config.workers, stats.bytes, stats.chunks, stats.valid_lines, stats.invalid_lines
    );
    Ok(())
}
