//! # tome
//!
//! Indexes a vault of markdown notes: tags, previews, display metadata and
//! feature images are extracted for every document and kept in a SQLite
//! cache, so that only files changed since the last run are processed again.
//!
//! ```bash
//! # Index a vault (only changed files are processed)
//! tome index ~/Notes
//!
//! # Throw away everything and index again
//! tome rebuild ~/Notes
//!
//! # Forget one kind of content
//! tome clear feature_image
//! ```

use clap::{Parser, Subcommand};
use derive_more::{Display, Error};
use exn::{OptionExt, ResultExt};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tome_cache::{ContentCache, Database};
use tome_config::Settings;
use tome_extract::ContentKind;
use tome_index::ContentPipeline;
use tome_render::{RasterizerRegistry, RenderCache};
use tome_storage::backend::LocalStore;
use tracing_subscriber::EnvFilter;

type Result<T> = std::result::Result<T, exn::Exn<ErrorKind>>;

#[derive(Debug, Display, Error)]
enum ErrorKind {
    #[display("could not load configuration")]
    Config,
    #[display("could not open vault")]
    Vault,
    #[display("could not open cache database")]
    Database,
    #[display("no {_0} configured and no data directory available")]
    MissingPath(#[error(not(source))] &'static str),
    #[display("indexing failed")]
    Index,
}

#[derive(Parser)]
#[command(name = "tome", version, about = "Incremental content indexer for markdown vaults")]
struct Cli {
    /// Configuration file, merged over the one in the config directory
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Cache database (overrides `paths.database`)
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    /// Render directory (overrides `paths.renders`)
    #[arg(long, global = true)]
    renders: Option<PathBuf>,

    /// Process everything but write nothing to the cache
    #[arg(long, global = true)]
    dry_run: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Bring the cache up to date with the vault
    Index {
        /// Vault root directory
        vault: PathBuf,
    },
    /// Clear every cached field, then index the whole vault
    Rebuild {
        /// Vault root directory
        vault: PathBuf,
    },
    /// Clear one kind of content from the cache
    Clear {
        /// One of: tags, preview, metadata, feature_image
        kind: ContentKind,
    },
}

struct Context {
    settings: Settings,
    cache: Arc<dyn ContentCache + Send + Sync>,
    renders: RenderCache,
    database: Database,
}

async fn context(cli: &Cli) -> Result<Context> {
    let mut settings = Settings::load(cli.config.as_deref()).or_raise(|| ErrorKind::Config)?;
    if let Some(database) = &cli.database {
        settings.paths.database = Some(database.clone());
    }
    if let Some(renders) = &cli.renders {
        settings.paths.renders = Some(renders.clone());
    }
    let path = settings.paths.database().ok_or_raise(|| ErrorKind::MissingPath("database"))?;
    let renders = settings.paths.renders().ok_or_raise(|| ErrorKind::MissingPath("render directory"))?;
    tracing::debug!(database = %path.display(), renders = %renders.display(), "opening cache");
    let database = Database::connect(&path).await.or_raise(|| ErrorKind::Database)?;
    let cache = Arc::new(database.repository(cli.dry_run));
    Ok(Context { settings, cache, renders: RenderCache::new(renders), database })
}

async fn index(context: Context, vault: PathBuf, rebuild: bool) -> Result<()> {
    let store = Arc::new(LocalStore::new("vault", &vault).or_raise(|| ErrorKind::Vault)?);
    let rasterizers = RasterizerRegistry::from_settings(
        store.clone(),
        &context.settings.rasterizers,
        context.settings.feature_image.render_size,
    );
    let pipeline = ContentPipeline::new(store, context.cache, context.renders, rasterizers, context.settings);
    let files = match rebuild {
        true => pipeline.rebuild().await,
        false => pipeline.index_all().await,
    }
    .or_raise(|| ErrorKind::Index)?;

    tokio::select! {
        () = pipeline.wait_idle() => tracing::info!(files, "vault indexed"),
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("interrupted; unfinished batches are discarded");
            pipeline.stop();
        },
    }
    context.database.close().await;
    Ok(())
}

async fn clear(context: Context, kind: ContentKind) -> Result<()> {
    context.cache.clear_field(kind).await.or_raise(|| ErrorKind::Database)?;
    if kind == ContentKind::FeatureImage {
        context.renders.purge().await.or_raise(|| ErrorKind::Index)?;
    }
    tracing::info!(%kind, "cleared");
    context.database.close().await;
    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    let context = context(&cli).await?;
    match cli.command {
        Command::Index { vault } => index(context, vault, false).await,
        Command::Rebuild { vault } => index(context, vault, true).await,
        Command::Clear { kind } => clear(context, kind).await,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();

    match run(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{e:?}");
            ExitCode::FAILURE
        },
    }
}
