//! `cratedig` command-line interface
//!
//! ```bash
//! cratedig index ~/Samples
//! cratedig reanalyze --engine spectral
//! cratedig search "dusty vinyl kick" --top-k 20 --min-bpm 85 --max-bpm 95
//! ```

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};

use cratedig::engine::PROFILE_ENGINE_TAG;
use cratedig::search::filter::{BPM_FILTER_MAX, DURATION_FILTER_MAX};
use cratedig::{
    AnalysisEngine, ClapEncoder, ExternalEngine, Indexer, JobRunner, LibraryConfig,
    ProfileEngine, ProgressObserver, ReanalysisMode, Reanalyzer, SearchEngine, SearchFilter,
    SpectralEngine, SqliteStore, StoreError,
};

#[derive(Parser)]
#[command(name = "cratedig")]
#[command(about = "Search your sample library by description, tempo and key")]
#[command(version)]
struct Cli {
    /// SQLite database holding the index
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    /// Collection inside the database
    #[arg(long, global = true)]
    collection: Option<String>,

    /// Directory with the CLAP ONNX models and tokenizer
    #[arg(long, global = true)]
    models: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Add new samples under a directory to the index
    Index {
        /// Directory to scan recursively
        dir: PathBuf,

        #[command(flatten)]
        engine: EngineArgs,
    },
    /// Recompute tempo and key of indexed samples
    Reanalyze {
        #[command(flatten)]
        engine: EngineArgs,

        /// Re-analyze every sample, not only incomplete ones
        #[arg(long)]
        force: bool,
    },
    /// Search the index with a text description
    Search {
        /// Description of the sound
        query: String,

        /// Number of results
        #[arg(long, default_value_t = 10)]
        top_k: usize,

        #[command(flatten)]
        filter: FilterArgs,
    },
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
enum EngineKind {
    /// HPSS + chroma profile correlation
    Profile,
    /// Multi-feature rhythm + HPCP
    Spectral,
    /// External analyzer program
    External,
}

#[derive(Args)]
struct EngineArgs {
    /// Tempo and key engine
    #[arg(long, value_enum, default_value_t = EngineKind::Profile)]
    engine: EngineKind,

    /// Analyzer program for `--engine external`
    #[arg(long)]
    program: Option<PathBuf>,

    /// Tag stamped by the external engine
    #[arg(long, default_value = "external")]
    tag: String,
}

#[derive(Args)]
struct FilterArgs {
    /// Regex the filename must match (case-insensitive)
    #[arg(long)]
    include: Option<String>,
    /// Regex the filename must not match (case-insensitive)
    #[arg(long)]
    exclude: Option<String>,
    /// File extension
    #[arg(long)]
    format: Option<String>,
    /// Exact key label, e.g. "A min"
    #[arg(long)]
    key: Option<String>,
    /// Lowest BPM (samples without tempo always pass)
    #[arg(long, default_value_t = 0.0)]
    min_bpm: f32,
    /// Highest BPM
    #[arg(long, default_value_t = BPM_FILTER_MAX)]
    max_bpm: f32,
    /// Lowest similarity percentage
    #[arg(long, default_value_t = 0.0)]
    min_similarity: f32,
    /// Highest similarity percentage
    #[arg(long, default_value_t = 100.0)]
    max_similarity: f32,
    /// Shortest duration in seconds
    #[arg(long, default_value_t = 0.0)]
    min_duration: f32,
    /// Longest duration in seconds
    #[arg(long, default_value_t = DURATION_FILTER_MAX)]
    max_duration: f32,
}

impl From<FilterArgs> for SearchFilter {
    fn from(args: FilterArgs) -> Self {
        SearchFilter {
            min_similarity: args.min_similarity,
            max_similarity: args.max_similarity,
            include: args.include,
            exclude: args.exclude,
            format: args.format,
            min_bpm: args.min_bpm,
            max_bpm: args.max_bpm,
            key: args.key,
            min_duration_secs: args.min_duration,
            max_duration_secs: args.max_duration,
        }
    }
}

/// Prints status lines and an updating percentage on stderr
struct ConsoleProgress;

impl ProgressObserver for ConsoleProgress {
    fn progress(&self, percent: u8) {
        let mut stderr = std::io::stderr();
        let _ = write!(stderr, "\r{:3}%", percent);
        if percent >= 100 {
            let _ = writeln!(stderr);
        }
        let _ = stderr.flush();
    }

    fn status(&self, message: &str) {
        eprintln!("{}", message);
    }
}

fn build_engine(args: &EngineArgs, config: &LibraryConfig) -> Result<Arc<dyn AnalysisEngine>> {
    Ok(match args.engine {
        EngineKind::Profile => Arc::new(ProfileEngine::new(config.analysis.clone())),
        EngineKind::Spectral => Arc::new(
            SpectralEngine::new(config.analysis.clone()).context("invalid spectral engine settings")?,
        ),
        EngineKind::External => {
            let Some(program) = &args.program else {
                bail!("--engine external needs --program");
            };
            Arc::new(ExternalEngine::new(program, args.tag.clone()))
        }
    })
}

fn open_store(path: &Path, collection: &str) -> Result<Arc<SqliteStore>> {
    match SqliteStore::open(path, collection) {
        Ok(store) => Ok(Arc::new(store)),
        Err(StoreError::NotFound(p)) => {
            bail!("no sample store at {}; run `cratedig index <dir>` first", p.display())
        }
        Err(e) => Err(e).context("cannot open sample store"),
    }
}

fn load_encoder(config: &LibraryConfig) -> Result<Arc<ClapEncoder>> {
    let encoder = ClapEncoder::load(&config.model_dir, config.embedding.clone())
        .with_context(|| format!("cannot load CLAP model from {}", config.model_dir.display()))?;
    Ok(Arc::new(encoder))
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let mut config = LibraryConfig::default();
    if let Some(store) = cli.store {
        config.store_path = store;
    }
    if let Some(collection) = cli.collection {
        config.collection = collection;
    }
    if let Some(models) = cli.models {
        config.model_dir = models;
    }

    let runner = JobRunner::new();
    match cli.command {
        Command::Index { dir, engine } => {
            let engine = build_engine(&engine, &config)?;
            let store = Arc::new(
                SqliteStore::create(&config.store_path, &config.collection)
                    .context("cannot create sample store")?,
            );
            let encoder = load_encoder(&config)?;
            let indexer = Indexer::new(store, encoder, engine, config);

            let summary = runner
                .spawn("index", Arc::new(ConsoleProgress), move |progress| {
                    indexer.index(&dir, progress)
                })?
                .join()?;
            println!(
                "Indexed {} new samples ({} found, {} already indexed, {} outside duration limit, {} failed)",
                summary.indexed,
                summary.discovered,
                summary.skipped_duplicate,
                summary.skipped_duration,
                summary.failed
            );
        }
        Command::Reanalyze { engine, force } => {
            let mode = match engine.engine {
                EngineKind::Spectral => ReanalysisMode::Upgrade {
                    replaces: PROFILE_ENGINE_TAG.to_string(),
                },
                _ => ReanalysisMode::Refresh,
            };
            let engine = build_engine(&engine, &config)?;
            let store = open_store(&config.store_path, &config.collection)?;
            let reanalyzer = Reanalyzer::new(store, engine, config.write_batch_size);

            let updated = runner
                .spawn("reanalyze", Arc::new(ConsoleProgress), move |progress| {
                    reanalyzer.run(&mode, force, progress)
                })?
                .join()?;
            println!("Updated {} samples", updated);
        }
        Command::Search { query, top_k, filter } => {
            let store = open_store(&config.store_path, &config.collection)?;
            let encoder = load_encoder(&config)?;
            let search = SearchEngine::new(store, encoder);

            let results = search.search(&query, top_k, &filter.into())?;
            if results.is_empty() {
                println!("No results match your filters.");
            }
            for result in results {
                let meta = &result.metadata;
                let bpm = meta.bpm().map(|b| format!("{:.0}", b)).unwrap_or_else(|| "-".into());
                let key = meta.key().unwrap_or("-");
                println!(
                    "{:5.1}% {:<9}  {}  | BPM: {} | Key: {} | {}",
                    result.similarity,
                    result.band(),
                    meta.filename,
                    bpm,
                    key,
                    meta.analysis_engine
                );
                println!("        {}", result.path);
            }
        }
    }
    Ok(())
}
