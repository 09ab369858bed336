//! shelf-itunes - audiobook import from a media player library export
//!
//! Subcommands:
//! - `validate`: report what an import would see, without touching the catalog
//! - `import` / `resume`: run a checkpointed import job
//! - `sync`: reconcile the catalog with a newer export
//! - `write-back`: write catalog file locations back into the export
//! - `watch`: poll the export and sync whenever it changes
//!
//! This binary attaches no metadata enricher or organizer. Jobs that ask for
//! enrichment or reorganizing record the request in their parameters and log
//! the skipped phase; a program embedding the library supplies both through
//! `JobExecutor::with_enricher` and `JobExecutor::with_organizer`.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use shelf_common::config::{self, TomlConfig};
use shelf_common::events::EventBus;
use shelf_itunes::db::SqliteCatalog;
use shelf_itunes::export::find_library_file;
use shelf_itunes::fingerprint::LibraryWatcher;
use shelf_itunes::models::{ImportMode, JobParams, JobStatusRegistry};
use shelf_itunes::services::{
    validate_export, JobExecutor, JobReporter, Sha256Hasher, SyncReconciler, SyncRequest,
    WriteBackEngine, WriteBackRequest,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

const EVENT_BUS_CAPACITY: usize = 256;

/// Command-line arguments for shelf-itunes
#[derive(Parser, Debug)]
#[command(name = "shelf-itunes")]
#[command(about = "Import audiobooks from a Library.xml export into the shelf catalog")]
#[command(version)]
struct Args {
    /// Configuration file (defaults to the platform config dir)
    #[arg(short, long, env = "SHELF_CONFIG")]
    config: Option<PathBuf>,

    /// Root folder holding the catalog database
    #[arg(short, long, env = "SHELF_ROOT_FOLDER")]
    root_folder: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Report tracks, groups and missing files without importing
    Validate {
        #[arg(short, long)]
        library: Option<PathBuf>,
    },
    /// Start an import job
    Import(ImportArgs),
    /// Resume a canceled or interrupted import job
    Resume { job_id: String },
    /// Reconcile the catalog with the export
    Sync {
        #[arg(short, long)]
        library: Option<PathBuf>,
        /// Sync even if the export looks unchanged
        #[arg(long)]
        force: bool,
    },
    /// Write catalog locations for the given books back into the export
    WriteBack {
        #[arg(short, long)]
        library: Option<PathBuf>,
        #[arg(required = true)]
        book_ids: Vec<Uuid>,
        /// Overwrite even if the export changed since the last sync
        #[arg(long)]
        force: bool,
        #[arg(long)]
        no_backup: bool,
        /// Only print warnings; do not modify the export
        #[arg(long)]
        dry_run: bool,
    },
    /// Poll the export and sync on every change
    Watch {
        #[arg(short, long)]
        library: Option<PathBuf>,
    },
}

#[derive(clap::Args, Debug)]
struct ImportArgs {
    #[arg(short, long)]
    library: Option<PathBuf>,
    /// Job id; a fresh one is generated when omitted
    #[arg(long)]
    job_id: Option<String>,
    #[arg(long, value_enum, default_value_t = ModeArg::Import)]
    mode: ModeArg,
    #[arg(long)]
    skip_duplicates: bool,
    #[arg(long)]
    import_playlists: bool,
    /// Run the metadata enrichment phase (needs an enricher)
    #[arg(long)]
    enrich_metadata: bool,
    /// Reorganize after import regardless of mode (needs an organizer)
    #[arg(long)]
    auto_organize: bool,
    /// Keep files where they are; suppresses reorganizing
    #[arg(long)]
    preserve_location: bool,
}

impl ImportArgs {
    fn job_params(&self, library: PathBuf, config: &TomlConfig) -> JobParams {
        let mut params = JobParams::new(library);
        params.import_mode = self.mode.into();
        params.path_mappings = config.itunes.path_mappings.clone();
        params.skip_duplicates = self.skip_duplicates;
        params.import_playlists = self.import_playlists;
        params.enrich_metadata = self.enrich_metadata;
        params.auto_organize = self.auto_organize;
        params.preserve_location = self.preserve_location;
        params
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ModeArg {
    Organized,
    Import,
    Organize,
}

impl From<ModeArg> for ImportMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Organized => ImportMode::Organized,
            ModeArg::Import => ImportMode::Import,
            ModeArg::Organize => ImportMode::Organize,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = args.config.clone().or_else(config::default_config_path);
    let toml_config = match &config_path {
        Some(path) => config::load_toml_config(path)?,
        None => TomlConfig::default(),
    };
    shelf_common::logging::init_tracing(&toml_config.logging)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        git = env!("SHELF_GIT_HASH"),
        built = env!("SHELF_BUILD_TIMESTAMP"),
        "Starting shelf-itunes"
    );

    let root_folder = config::resolve_root_folder(args.root_folder.as_deref(), &toml_config);
    std::fs::create_dir_all(&root_folder)
        .with_context(|| format!("Failed to create root folder {}", root_folder.display()))?;
    let db_path = toml_config.database_path(&root_folder);
    info!(database = %db_path.display(), "Opening catalog");

    let catalog = Arc::new(
        SqliteCatalog::open(&db_path)
            .await
            .context("Failed to open catalog database")?,
    );
    let event_bus = Arc::new(EventBus::new(EVENT_BUS_CAPACITY));

    match args.command {
        Command::Validate { library } => {
            let library = library_path(library, &toml_config)?;
            let report = validate_export(&library, &toml_config.itunes.path_mappings).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }

        Command::Import(import) => {
            let library = library_path(import.library.clone(), &toml_config)?;
            let params = import.job_params(library, &toml_config);

            if params.enrich_metadata || params.runs_organize() {
                warn!("No enricher or organizer is attached to this binary, those phases will be skipped");
            }

            let job_id = import.job_id.unwrap_or_else(|| Uuid::new_v4().to_string());
            info!(job_id = %job_id, "Starting import job");

            let executor = executor(&catalog, &event_bus, &toml_config);
            let reporter = cancellable_reporter(&job_id, &event_bus);
            let outcome = executor.run_import(&job_id, params, &reporter).await?;
            println!("{}", outcome.summary);
        }

        Command::Resume { job_id } => {
            let executor = executor(&catalog, &event_bus, &toml_config);
            let reporter = cancellable_reporter(&job_id, &event_bus);
            let outcome = executor.resume(&job_id, &reporter).await?;
            println!("{}", outcome.summary);
        }

        Command::Sync { library, force } => {
            let mut request = SyncRequest::new(library_path(library, &toml_config)?);
            request.path_mappings = toml_config.itunes.path_mappings.clone();
            request.force = force;

            let reconciler = SyncReconciler::new(
                catalog.clone(),
                Arc::new(Sha256Hasher),
                toml_config.import.clone(),
            );
            let reporter = cancellable_reporter("sync", &event_bus);
            let summary = reconciler.sync(&request, &reporter).await?;
            println!("{}", summary.message());
        }

        Command::WriteBack {
            library,
            book_ids,
            force,
            no_backup,
            dry_run,
        } => {
            let engine = WriteBackEngine::new(catalog.clone(), Arc::clone(&event_bus));
            let updates = engine.updates_for_books(&book_ids).await?;

            let mut request = WriteBackRequest::new(library_path(library, &toml_config)?, updates);
            request.path_mappings = toml_config.itunes.path_mappings.clone();
            request.create_backup = toml_config.itunes.create_backup && !no_backup;
            request.force_overwrite = force;

            if dry_run {
                for warning in engine.preview(&request).await? {
                    println!("{}", warning);
                }
            } else {
                let result = engine.write_back(&request).await?;
                println!("{}", result.message);
                if let Some(backup) = result.backup_path {
                    println!("Backup: {}", backup.display());
                }

                if let (Some(itl_path), true) = (&toml_config.itunes.itl_path, toml_config.itunes.itl_write_back) {
                    let updated = engine
                        .write_back_itl(itl_path, &request.updates, &request.path_mappings)
                        .await?;
                    println!("Binary library: updated {} locations", updated);
                }
            }
        }

        Command::Watch { library } => {
            let library = library_path(library, &toml_config)?;
            watch(&library, catalog, &toml_config).await?;
        }
    }

    Ok(())
}

/// Export path: CLI argument, then config, then the platform's usual places
fn library_path(cli_arg: Option<PathBuf>, config: &TomlConfig) -> Result<PathBuf> {
    cli_arg
        .or_else(|| config.itunes.library_xml_path.clone())
        .or_else(find_library_file)
        .context("No library export given, configured, or found in the usual locations")
}

fn executor(catalog: &Arc<SqliteCatalog>, event_bus: &Arc<EventBus>, config: &TomlConfig) -> JobExecutor {
    JobExecutor::new(
        catalog.clone(),
        Arc::new(Sha256Hasher),
        Arc::clone(event_bus),
        JobStatusRegistry::new(),
        config.import.clone(),
    )
}

/// Reporter whose token is canceled on Ctrl+C
fn cancellable_reporter(job_id: &str, event_bus: &Arc<EventBus>) -> JobReporter {
    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Received Ctrl+C, canceling after the current item");
                cancel.cancel();
            }
        }
    });
    JobReporter::new(job_id, Arc::clone(event_bus)).with_cancel_token(cancel)
}

async fn watch(library: &Path, catalog: Arc<SqliteCatalog>, config: &TomlConfig) -> Result<()> {
    let interval = Duration::from_secs(config.itunes.watch_interval_secs.max(1));
    let watcher = LibraryWatcher::spawn(library, interval);
    let reconciler = SyncReconciler::new(catalog, Arc::new(Sha256Hasher), config.import.clone());
    let event_bus = Arc::new(EventBus::new(EVENT_BUS_CAPACITY));
    let reporter = cancellable_reporter("watch", &event_bus);
    let cancel = reporter.cancel_token();

    info!(library = %library.display(), interval_secs = interval.as_secs(), "Watching library export");

    let mut request = SyncRequest::new(library);
    request.path_mappings = config.itunes.path_mappings.clone();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
        if !watcher.has_changed() {
            continue;
        }
        watcher.clear_changed();

        match reconciler.sync(&request, &reporter).await {
            Ok(summary) => info!("{}", summary.message()),
            Err(e) => tracing::warn!(error = %e, "Sync after export change failed"),
        }
    }

    watcher.stop().await;
    info!("Watcher stopped");
    Ok(())
}
