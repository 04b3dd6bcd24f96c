#![deny(unsafe_code)]

mod commands;
mod exit_code;
mod output;

use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use bucketfs_core::{
    CancelFlag, Config, ErrorCategory, LocalStore, MultiRootStore, PathError, RemoteStore,
    Session, SessionError, StoreError, TransferError,
};

use crate::commands::{cat, diff, du, find, get, info, ls, mirror, peek, put, stat, tree};
use crate::exit_code::CommandFailure;

/// Browse and transfer objects in a prefix-delimited store as if it were a filesystem
#[derive(Parser)]
#[command(name = "bucketfs")]
#[command(author, version)]
#[command(propagate_version = true)]
#[command(after_help = "EXAMPLES:
    # List a directory-backed bucket
    bucketfs --store ~/buckets/photos ls -l 2024/

    # Several roots side by side
    bucketfs --store photos=~/buckets/photos --store logs=/var/log/app tree --depth 2

    # Download every gzip in a directory, 32 at a time
    bucketfs --store ~/buckets/logs --workers 32 get 'archive/*.gz' ./out

    # Mirror a prefix, skipping big files
    bucketfs --store ~/buckets/site mirror assets ./assets --max-size 10MB --exclude '*.psd'
")]
struct Cli {
    /// Store root: DIR, or NAME=DIR (repeat for several roots)
    #[arg(long = "store", short = 's', value_name = "[NAME=]DIR", env = "BUCKETFS_STORE", global = true)]
    stores: Vec<String>,

    /// Concurrent remote requests for crawls and transfers
    #[arg(long, short = 'j', global = true)]
    workers: Option<usize>,

    /// Listing cache TTL in seconds (0 disables caching)
    #[arg(long, value_name = "SECS", global = true)]
    ttl: Option<u64>,

    /// Disable the listing cache and its persistence
    #[arg(long, global = true)]
    no_cache: bool,

    /// Directory for the persisted listing cache
    #[arg(long, value_name = "DIR", env = "BUCKETFS_CACHE_DIR", global = true)]
    cache_dir: Option<PathBuf>,

    /// Configuration file (default: platform config dir)
    #[arg(long, value_name = "FILE", env = "BUCKETFS_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress progress bars and non-essential output
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List directory contents
    Ls(ls::Args),

    /// Show a directory tree
    Tree(tree::Args),

    /// Summarize disk usage per directory
    Du(du::Args),

    /// Find files whose name matches a pattern
    Find(find::Args),

    /// Download an object, or every match of a wildcard pattern
    Get(get::Args),

    /// Download a whole prefix, preserving structure
    Mirror(mirror::Args),

    /// Upload a local file
    Put(put::Args),

    /// Print an object to stdout
    Cat(cat::Args),

    /// Print the first bytes of an object
    Peek(peek::Args),

    /// Show object metadata
    Stat(stat::Args),

    /// Compare two files, local or remote
    Diff(diff::Args),

    /// Show store statistics, permissions and cache contents
    Info(info::Args),
}

/// Options shared by every command.
#[derive(Clone, Copy)]
pub struct GlobalOptions {
    pub quiet: bool,
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::from(exit_code::SUCCESS),
        Err(e) => {
            let code = categorize_error(&e);

            let args: Vec<String> = std::env::args().collect();
            let is_quiet = args.iter().any(|a| a == "-q" || a == "--quiet");
            if !is_quiet {
                eprintln!("Error: {e:#}");
            }

            ExitCode::from(code)
        }
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    let (config, config_error) = load_config(&cli);
    if !cli.quiet {
        setup_tracing(cli.verbose.max(u8::from(config.general.verbose)));
    }
    if let Some(e) = config_error {
        if cli.config.is_some() {
            return Err(e).context("Failed to load the configuration file");
        }
        tracing::warn!("Ignoring config file: {e:#}");
    }

    let store = open_store(&cli.stores)?;
    let cancel = CancelFlag::new();
    install_interrupt_handler(&cancel);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start the async runtime")?;

    let session = Session::new(store, config).with_cancel(cancel.clone());
    let global = GlobalOptions { quiet: cli.quiet };
    let result = runtime.block_on(dispatch(&session, cli.command, global));

    match session.shutdown() {
        Ok(Some(path)) => tracing::debug!("Saved listing cache to {}", path.display()),
        Ok(None) => {}
        Err(e) => tracing::warn!("Failed to save listing cache: {e}"),
    }

    result
}

async fn dispatch(session: &Session, command: Commands, global: GlobalOptions) -> Result<()> {
    match command {
        Commands::Ls(args) => ls::execute(session, &args).await,
        Commands::Tree(args) => tree::execute(session, &args, global).await,
        Commands::Du(args) => du::execute(session, &args, global).await,
        Commands::Find(args) => find::execute(session, &args, global).await,
        Commands::Get(args) => get::execute(session, &args, global).await,
        Commands::Mirror(args) => mirror::execute(session, &args, global).await,
        Commands::Put(args) => put::execute(session, &args, global).await,
        Commands::Cat(args) => cat::execute(session, &args).await,
        Commands::Peek(args) => peek::execute(session, &args).await,
        Commands::Stat(args) => stat::execute(session, &args).await,
        Commands::Diff(args) => diff::execute(session, &args).await,
        Commands::Info(args) => info::execute(session, &args, global).await,
    }
}

/// Load the config file and apply command-line overrides.
///
/// A config error is returned next to the defaults so it can be logged once
/// tracing is up.
fn load_config(cli: &Cli) -> (Config, Option<anyhow::Error>) {
    let path = cli.config.clone().or_else(Config::default_path);
    let (mut config, error) = match path {
        Some(path) => match Config::load(&path) {
            Ok(config) => (config, None),
            Err(e) => (Config::default(), Some(anyhow::Error::new(e))),
        },
        None => (Config::default(), None),
    };

    if let Some(workers) = cli.workers {
        config = config.with_workers(workers);
    }
    if let Some(ttl) = cli.ttl {
        config = config.with_cache_ttl(std::time::Duration::from_secs(ttl));
    }
    if let Some(dir) = &cli.cache_dir {
        config = config.with_cache_dir(dir);
    }
    if cli.no_cache {
        config = config
            .with_cache_ttl(std::time::Duration::ZERO)
            .with_persist(false);
    }
    (config, error)
}

/// Build the store from `--store` arguments.
///
/// A single unnamed directory is opened directly; anything else becomes a
/// multi-root store, unnamed entries taking their directory's name.
fn open_store(specs: &[String]) -> Result<Arc<dyn RemoteStore>> {
    match specs {
        [] => anyhow::bail!("No store given. Pass --store DIR or set BUCKETFS_STORE"),
        [single] if !single.contains('=') => {
            let store = LocalStore::open(single)
                .with_context(|| format!("Failed to open store at {single}"))?;
            Ok(Arc::new(store))
        }
        _ => {
            let mut multi = MultiRootStore::new();
            for spec in specs {
                let (name, dir) = match spec.split_once('=') {
                    Some((name, dir)) => (name.to_string(), dir),
                    None => (default_root_name(Path::new(spec))?, spec.as_str()),
                };
                let store = LocalStore::open(dir)
                    .with_context(|| format!("Failed to open store at {dir}"))?;
                multi
                    .add_root(name, Arc::new(store))
                    .with_context(|| format!("Invalid store specification: {spec}"))?;
            }
            Ok(Arc::new(multi))
        }
    }
}

fn default_root_name(dir: &Path) -> Result<String> {
    dir.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .with_context(|| format!("Cannot derive a root name from {}, use NAME=DIR", dir.display()))
}

/// Ctrl-C requests cancellation; running crawls and transfers stop at the
/// next item boundary.
fn install_interrupt_handler(cancel: &CancelFlag) {
    let cancel = cancel.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        eprintln!("\nInterrupted, finishing in-flight requests...");
        cancel.cancel();
    }) {
        tracing::warn!("Failed to install Ctrl-C handler: {e}");
    }
}

/// Set up tracing/logging based on verbosity level
fn setup_tracing(verbose: u8) {
    let filter = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with_writer(io::stderr)
        .init();
}

/// Map an error chain to an exit code using typed downcasting.
fn categorize_error(e: &anyhow::Error) -> u8 {
    for cause in e.chain() {
        if let Some(failure) = cause.downcast_ref::<CommandFailure>() {
            return failure.exit_code();
        }

        let category = if let Some(err) = cause.downcast_ref::<SessionError>() {
            Some(ErrorCategory::from(err))
        } else if let Some(err) = cause.downcast_ref::<StoreError>() {
            Some(ErrorCategory::from(err))
        } else if let Some(err) = cause.downcast_ref::<PathError>() {
            Some(ErrorCategory::from(err))
        } else if let Some(err) = cause.downcast_ref::<TransferError>() {
            Some(ErrorCategory::from(err))
        } else {
            cause.downcast_ref::<io::Error>().map(ErrorCategory::from)
        };
        if let Some(category) = category {
            return exit_code::for_category(category);
        }
    }
    exit_code::GENERAL_ERROR
}
