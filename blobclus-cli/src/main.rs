//! blobclus CLI: multi-pass blob clustering of event files.
//!
//! Reads events written as JSON point-cloud trees, merges the live clusters
//! of every event and writes the result back as JSON lines.
#![allow(clippy::uninlined_format_args, clippy::too_many_lines)]

use blobclus_algorithms::{run_clustering_batch, MergePass, PipelineConfig, PointTree};
use blobclus_io::{EventFileReader, EventFileWriter, DEFAULT_OUTPATH};
use clap::{Parser, Subcommand};
use log::{error, info};
use std::path::{Path, PathBuf};
use std::time::Instant;
use thiserror::Error;

/// Result type for CLI operations.
type Result<T> = std::result::Result<T, CliError>;

/// CLI error types.
#[derive(Error, Debug)]
enum CliError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("I/O error: {0}")]
    BlobclusIo(#[from] blobclus_io::Error),

    #[error("Core error: {0}")]
    Core(#[from] blobclus_core::Error),

    #[error("Thread pool error: {0}")]
    ThreadPool(String),

    #[error("Invalid config {path}: {source}")]
    Config {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Blob clustering of LArTPC imaging events.
#[derive(Parser)]
#[command(name = "blobclus")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Verbose output (debug logging)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Cluster every event of an event file
    Process {
        /// Input event file
        input: PathBuf,

        /// Output event file
        #[arg(short, long)]
        output: PathBuf,

        /// Pipeline configuration (JSON); defaults are used when omitted
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Output datapath pattern, `%d` is replaced by the event ident
        #[arg(long, default_value = DEFAULT_OUTPATH)]
        outpath: String,

        /// Worker threads for event-level parallelism (default: all cores)
        #[arg(short = 'j', long)]
        threads: Option<usize>,
    },

    /// Show per-event tree sizes of an event file
    Info {
        /// Input event file
        input: PathBuf,
    },

    /// Print the pass schedule
    Schedule {
        /// Live cluster count after the close pass
        #[arg(short = 'n', long, default_value = "0")]
        clusters: usize,

        /// Pipeline configuration (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

/// Loads and validates a pipeline configuration.
fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    let config = match path {
        Some(path) => {
            let text = std::fs::read_to_string(path)?;
            serde_json::from_str(&text).map_err(|source| CliError::Config {
                path: path.to_path_buf(),
                source,
            })?
        }
        None => PipelineConfig::default(),
    };
    config.validate()?;
    Ok(config)
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    match cli.command {
        Commands::Process {
            input,
            output,
            config,
            outpath,
            threads,
        } => {
            let config = load_config(config.as_deref())?;
            if let Some(n) = threads {
                rayon::ThreadPoolBuilder::new()
                    .num_threads(n)
                    .build_global()
                    .map_err(|err| CliError::ThreadPool(err.to_string()))?;
            }
            let start = Instant::now();

            let reader = EventFileReader::open(&input)?;
            info!("reading {} ({} bytes)", input.display(), reader.len());

            let mut idents = Vec::new();
            let mut events: Vec<(PointTree, PointTree)> = Vec::new();
            let mut failed = 0usize;
            for record in reader.events() {
                let record = record?;
                let ident = record.ident;
                match record.into_trees() {
                    Ok(trees) => {
                        idents.push(ident);
                        events.push(trees);
                    }
                    Err(err) => {
                        error!("event {}: {}", ident, err);
                        failed += 1;
                    }
                }
            }

            let num_events = events.len();
            let results = run_clustering_batch(events, &config);

            let mut writer = EventFileWriter::create(&output)?.with_outpath(outpath);
            let (mut clusters_in, mut clusters_out) = (0usize, 0usize);
            for (ident, result) in idents.into_iter().zip(results) {
                match result {
                    Ok((live, dead, report)) => {
                        clusters_in += report.initial_clusters;
                        clusters_out += report.final_clusters;
                        if cli.verbose {
                            eprintln!(
                                "  event {}: {} -> {} clusters, {} round(s)",
                                ident, report.initial_clusters, report.final_clusters, report.rounds
                            );
                        }
                        writer.write_event(ident, &live, &dead)?;
                    }
                    Err(err) => {
                        error!("event {}: {}", ident, err);
                        failed += 1;
                    }
                }
            }
            writer.flush()?;

            let elapsed = start.elapsed();
            println!(
                "Processed {} event(s) in {:.2}s",
                num_events,
                elapsed.as_secs_f64()
            );
            println!("Clusters: {} -> {}", clusters_in, clusters_out);
            println!("Written: {} to {}", writer.written(), output.display());
            if failed > 0 {
                println!("Failed: {}", failed);
            }
        }

        Commands::Info { input } => {
            let reader = EventFileReader::open(&input)?;
            println!("File: {}", input.display());
            println!("Size: {} bytes", reader.len());
            println!(
                "{:>8} {:>10} {:>10} {:>12} {:>10} {:>10}",
                "ident", "live clus", "live blobs", "live points", "dead clus", "dead blobs"
            );
            println!("{:-<65}", "");
            let mut count = 0usize;
            for record in reader.events() {
                let record = record?;
                let live = record.live.summary();
                let dead = record.dead.summary();
                println!(
                    "{:>8} {:>10} {:>10} {:>12} {:>10} {:>10}",
                    record.ident, live.clusters, live.blobs, live.points, dead.clusters, dead.blobs
                );
                count += 1;
            }
            println!("Events: {}", count);
        }

        Commands::Schedule { clusters, config } => {
            let config = load_config(config.as_deref())?;
            println!(
                "{} extension round(s) for {} clusters",
                config.rounds_for(clusters),
                clusters
            );
            for (i, pass) in config.schedule(clusters).iter().enumerate() {
                println!("{:>3}  {}", i + 1, pass.name());
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_partial_config_keeps_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{"rounds": {{"busy_threshold": 10}}}}"#).unwrap();
        file.flush().unwrap();

        let config = load_config(Some(file.path())).unwrap();
        assert_eq!(config.rounds.busy_threshold, 10);
        assert_eq!(config.rounds.rounds, 3);
        assert_eq!(config.close, PipelineConfig::default().close);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{"rounds": {{"rounds": 0}}}}"#).unwrap();
        file.flush().unwrap();
        assert!(matches!(
            load_config(Some(file.path())),
            Err(CliError::Core(blobclus_core::Error::Config(_)))
        ));

        let mut bad = NamedTempFile::new().unwrap();
        write!(bad, "not json").unwrap();
        bad.flush().unwrap();
        assert!(matches!(
            load_config(Some(bad.path())),
            Err(CliError::Config { .. })
        ));
    }
}
