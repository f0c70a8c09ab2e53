use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::{Parser, Subcommand};
use crossbeam_channel::Receiver;
use parz_core::{
    Archiver, BrowseSpec, CancelHandle, ChannelSink, CompressionSpec, DecompressionSpec, Event, ProcessingResult,
    ProcessingSpec, ResultType, SystemWorkload,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "parz",
    version,
    about = "Parallel block archiver",
    long_about = "Create, extend, inspect and extract .parz archives using all CPU cores."
)]
struct Cli {
    /// Print the final result as JSON on stdout instead of a summary.
    #[arg(long, global = true, default_value_t = false)]
    json: bool,

    /// Log pipeline diagnostics to stderr (overridden by RUST_LOG).
    #[arg(short, long, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Pack files and directories into a new archive.
    #[command(visible_alias = "c")]
    Compress {
        /// Archive to create; must not exist yet.
        archive: PathBuf,

        /// Files or directories to pack.
        #[arg(required = true)]
        sources: Vec<PathBuf>,

        /// Block size (supports suffixes K/M/G, e.g. 64K, 4M). Defaults to 4M.
        #[arg(long, value_parser = parse_block_size)]
        block_size: Option<u32>,

        /// Number of worker threads (defaults to CPU count).
        #[arg(long, default_value_t = num_cpus::get())]
        threads: usize,
    },
    /// Add files and directories to an existing archive.
    #[command(visible_aliases = ["add", "a"])]
    Append {
        /// Existing archive to extend.
        archive: PathBuf,

        /// Files or directories to add. Paths already in the archive are skipped.
        #[arg(required = true)]
        sources: Vec<PathBuf>,

        /// Block size; must match the archive's own block size when given.
        #[arg(long, value_parser = parse_block_size)]
        block_size: Option<u32>,

        /// Number of worker threads (defaults to CPU count).
        #[arg(long, default_value_t = num_cpus::get())]
        threads: usize,
    },
    /// Restore objects from an archive.
    #[command(visible_alias = "d")]
    Decompress {
        /// Archive to read.
        archive: PathBuf,

        /// Output file, or an existing directory to restore into.
        target: PathBuf,

        /// Paths inside the archive to restore (all objects when omitted and
        /// the target is a directory).
        inside_paths: Vec<String>,

        /// Number of worker threads (defaults to CPU count).
        #[arg(long, default_value_t = num_cpus::get())]
        threads: usize,
    },
    /// List the objects stored in an archive.
    #[command(visible_aliases = ["b", "open", "o"])]
    Browse {
        /// Archive to inspect.
        archive: PathBuf,
    },
}

fn main() {
    match run() {
        Ok(result) if result.is_success() => {}
        Ok(_) => std::process::exit(1),
        Err(error) => {
            eprintln!("error: {error}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<ResultType, Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let spec = build_spec(cli.command)?;
    tracing::debug!(mode = %spec.mode(), archive = %spec.archive_path().display(), "starting run");

    let (sink, receiver) = ChannelSink::new();
    let show_progress = !cli.json;
    let printer = thread::Builder::new()
        .name("parz-events".to_string())
        .spawn(move || print_events(receiver, show_progress))?;

    let result = {
        let archiver = Archiver::new(Arc::new(sink), Arc::new(SystemWorkload::new()));
        let cancel = archiver.cancel_handle();
        ctrlc::set_handler(move || interrupt(&cancel))?;
        archiver.run(spec)
    };
    // Dropping the archiver releases the last sender, which ends the printer.
    if printer.join().is_err() {
        tracing::warn!("event printer thread panicked");
    }

    if cli.json {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        serde_json::to_writer_pretty(&mut out, &result)?;
        writeln!(out)?;
    } else {
        print_summary(&result);
    }

    Ok(result.result)
}

/// Ctrl-C stops the current object and skips the rest; the process then
/// exits through the normal failed-run path.
fn interrupt(cancel: &CancelHandle) {
    if !cancel.is_canceled() {
        eprintln!("\ncanceling...");
    }
    cancel.cancel();
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    // A second initialisation only happens in tests and is harmless.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

fn build_spec(command: Commands) -> Result<ProcessingSpec, Box<dyn std::error::Error>> {
    let spec = match command {
        Commands::Compress {
            archive,
            sources,
            block_size,
            threads,
        } => ProcessingSpec::Compress(compression_spec(archive, &sources, block_size, threads)?),
        Commands::Append {
            archive,
            sources,
            block_size,
            threads,
        } => ProcessingSpec::Append(compression_spec(archive, &sources, block_size, threads)?),
        Commands::Decompress {
            archive,
            target,
            inside_paths,
            threads,
        } => ProcessingSpec::Decompress(
            DecompressionSpec::new(archive, target)
                .with_inside_paths(inside_paths)
                .with_threads(threads),
        ),
        Commands::Browse { archive } => ProcessingSpec::Browse(BrowseSpec::new(archive)),
    };
    Ok(spec)
}

fn compression_spec(
    archive: PathBuf,
    sources: &[PathBuf],
    block_size: Option<u32>,
    threads: usize,
) -> Result<CompressionSpec, Box<dyn std::error::Error>> {
    let spec = CompressionSpec::from_sources(archive, sources)?.with_threads(threads);
    Ok(match block_size {
        Some(block_size) => spec.with_block_size(block_size),
        None => spec,
    })
}

fn print_events(receiver: Receiver<Event>, show_progress: bool) {
    let mut progress_open = false;
    for event in receiver {
        match event {
            Event::Progress {
                percent_hundredths,
                workload,
            } => {
                if !show_progress {
                    continue;
                }
                eprint!(
                    "\r\x1b[2K[{:6.2}%] cpu {:>3}% | disk rd {:>3}% wr {:>3}%",
                    f64::from(percent_hundredths) / 100.0,
                    workload.cpu_percent,
                    workload.read_percent,
                    workload.write_percent,
                );
                let _ = io::stderr().flush();
                progress_open = true;
            }
            other => {
                if progress_open {
                    eprintln!();
                    progress_open = false;
                }
                match other {
                    Event::Message(text) => eprintln!("{text}"),
                    Event::Warning(text) => eprintln!("warning: {text}"),
                    Event::Error(text) => eprintln!("error: {text}"),
                    Event::TaskResult(task) => {
                        let state = if task.is_canceled {
                            "canceled".to_string()
                        } else {
                            task.result.to_string()
                        };
                        eprintln!("{}: {state}", task.inside_path);
                        for error in task.errors() {
                            eprintln!("  {error}");
                        }
                    }
                    Event::Progress { .. } => {}
                }
            }
        }
    }
    if progress_open {
        eprintln!();
    }
}

fn print_summary(result: &ProcessingResult) {
    if let Some(archive) = &result.archive {
        println!(
            "{:>12}  {:>12}  {:>7}  path",
            "original", "compressed", "ratio"
        );
        for object in &archive.objects {
            println!(
                "{:>12}  {:>12}  {:>7}  {}",
                format_bytes(object.original_size),
                format_bytes(object.compressed_size),
                format_ratio(object.compressed_size, object.original_size),
                object.inside_path,
            );
        }
        println!(
            "{} object(s), {} total, block size {}",
            archive.len(),
            format_bytes(archive.total_original_size()),
            format_bytes(u64::from(archive.block_size)),
        );
        println!("result: {}", result.result);
        return;
    }

    let original = result.total_original_size();
    let compressed = result.total_compressed_size();
    let workload = result.average_workload();

    println!("{} {}", result.mode, result.result);
    println!("  objects: {}", result.tasks.len());
    println!("  original bytes: {}", format_bytes(original));
    println!("  compressed bytes: {}", format_bytes(compressed));
    println!("  ratio: {}", format_ratio(compressed, original));
    println!("  elapsed: {}", format_duration(result.total_duration()));
    println!(
        "  workload: cpu {}% | disk read {}% | disk write {}%",
        workload.cpu_percent, workload.read_percent, workload.write_percent
    );
    if !result.warnings.is_empty() {
        println!("  warnings: {}", result.warnings.len());
    }
    let failed = result
        .tasks
        .iter()
        .filter(|task| task.result == ResultType::Failed)
        .count();
    if failed > 0 {
        println!("  failed objects: {failed}");
    }
}

fn parse_block_size(value: &str) -> Result<u32, String> {
    let size = parse_size(value)?;
    if size == 0 {
        return Err("block size must be greater than zero".to_string());
    }
    u32::try_from(size)
        .ok()
        .filter(|size| *size <= i32::MAX as u32)
        .ok_or_else(|| format!("block size too large: {value}"))
}

fn parse_size(value: &str) -> Result<usize, String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err("size cannot be empty".to_string());
    }

    let split_at = trimmed
        .find(|ch: char| !ch.is_ascii_digit())
        .unwrap_or(trimmed.len());
    let (num_part, suffix_part) = trimmed.split_at(split_at);
    if num_part.is_empty() {
        return Err(format!("invalid size: {value}"));
    }

    let base: usize = num_part
        .parse()
        .map_err(|_| format!("invalid size number: {value}"))?;

    let multiplier = match suffix_part.trim().to_ascii_lowercase().as_str() {
        "" | "b" => 1usize,
        "k" | "kb" => 1024usize,
        "m" | "mb" => 1024usize * 1024usize,
        "g" | "gb" => 1024usize * 1024usize * 1024usize,
        other => {
            return Err(format!("invalid size suffix '{other}' in '{value}'"));
        }
    };

    base.checked_mul(multiplier)
        .ok_or_else(|| format!("size overflow: {value}"))
}

fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0usize;
    while value >= 1024.0 && unit + 1 < UNITS.len() {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} {}", UNITS[unit])
    } else {
        format!("{value:.2} {}", UNITS[unit])
    }
}

fn format_ratio(compressed: u64, original: u64) -> String {
    if original == 0 {
        return "-".to_string();
    }
    format!("{:.1}%", compressed as f64 / original as f64 * 100.0)
}

fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let millis = duration.subsec_millis();
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{hours:02}:{minutes:02}:{seconds:02}")
    } else if minutes > 0 {
        format!("{minutes:02}:{seconds:02}")
    } else {
        format!("{seconds}.{millis:03}s")
    }
}
