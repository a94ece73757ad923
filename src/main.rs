use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, level_filters::LevelFilter, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use sheetmusic_catalog::asset_cache::{AssetCache, HttpAssetFetcher, SqliteCacheStorage};
use sheetmusic_catalog::catalog_store::{filter_records, sort_records, SortKey};
use sheetmusic_catalog::config::{self, AppConfig};
use sheetmusic_catalog::server::ServerConfig;
use sheetmusic_catalog::timestamps::format_timestamp;
use sheetmusic_catalog::{
    run_server, Clock, ExportMode, NewRecord, Record, RecordStore, RequestsLoggingLevel,
    SqliteRecordStore, SqliteWatermarkStore, SyncEngine, SystemClock,
};

fn parse_path(s: &str) -> Result<PathBuf> {
    let original_path = PathBuf::from(s);
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
struct CliArgs {
    /// Path to a TOML configuration file. Values in the file override CLI arguments.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Directory holding catalog.db, state.db and assets.db.
    #[clap(long, value_parser = parse_path)]
    pub db_dir: Option<PathBuf>,

    /// The port the offline shell server listens on.
    #[clap(short, long, default_value_t = 8080)]
    pub port: u16,

    /// The level of logging to perform on each request.
    #[clap(long, default_value = "path")]
    pub logging_level: RequestsLoggingLevel,

    /// Timeout in seconds for network fetches of shell assets.
    #[clap(long, default_value_t = 10)]
    pub fetch_timeout_sec: u64,

    /// URL the application shell is served from.
    #[clap(long)]
    pub asset_origin: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Adds a score to the catalog.
    Add {
        #[clap(long)]
        title: String,
        #[clap(long, default_value = "")]
        composer: String,
        #[clap(long, default_value = "")]
        arranger: String,
        #[clap(long, default_value = "")]
        publisher: String,
        #[clap(long, default_value = "")]
        voicing: String,
        #[clap(long, default_value = "")]
        liturgical_season: String,
        /// Comma separated.
        #[clap(long, value_delimiter = ',')]
        tags: Vec<String>,
        #[clap(long)]
        year_published: Option<String>,
        #[clap(long, default_value = "")]
        last_performed_date: String,
        #[clap(long)]
        license_count: Option<String>,
        #[clap(long, default_value = "")]
        notes: String,
    },

    /// Lists scores, optionally filtered by a search query.
    List {
        query: Option<String>,
        #[clap(long, value_enum, default_value_t = SortKey::Title)]
        sort: SortKey,
    },

    /// Writes a snapshot file into the given directory.
    Export {
        #[clap(long, value_enum, default_value_t = ExportMode::Full)]
        mode: ExportMode,
        #[clap(long, value_parser = parse_path, default_value = ".")]
        out_dir: PathBuf,
    },

    /// Merges a snapshot file into the catalog.
    Import {
        #[clap(value_parser = parse_path)]
        file: PathBuf,
    },

    /// Brings every database up to the current schema.
    Migrate,

    /// Serves the application shell with offline caching.
    Serve,
}

impl From<&CliArgs> for config::CliConfig {
    fn from(args: &CliArgs) -> Self {
        config::CliConfig {
            db_dir: args.db_dir.clone(),
            port: args.port,
            logging_level: args.logging_level.clone(),
            fetch_timeout_sec: args.fetch_timeout_sec,
            asset_origin: args.asset_origin.clone(),
        }
    }
}

fn describe(record: &Record) -> String {
    let mut line = record.title.clone();
    if !record.composer.is_empty() {
        line.push_str(&format!(" - {}", record.composer));
    }
    if let Some(year) = record.year_published {
        line.push_str(&format!(" ({})", year));
    }
    if !record.voicing.is_empty() {
        line.push_str(&format!(" [{}]", record.voicing));
    }
    if !record.tags.is_empty() {
        line.push_str(&format!(" #{}", record.tags.join(" #")));
    }
    line
}

async fn open_store(app_config: &AppConfig) -> Result<Arc<SqliteRecordStore>> {
    let store = SqliteRecordStore::open(app_config.catalog_db_path())
        .await
        .context("Catalog store unavailable")?;
    Ok(Arc::new(store))
}

async fn sync_engine(app_config: &AppConfig) -> Result<SyncEngine> {
    let store = open_store(app_config).await?;
    let watermark = SqliteWatermarkStore::open(app_config.state_db_path()).await?;
    Ok(SyncEngine::new(
        store,
        Arc::new(watermark),
        Arc::new(SystemClock),
    ))
}

async fn serve(app_config: &AppConfig) -> Result<()> {
    let storage = SqliteCacheStorage::open(app_config.assets_db_path()).await?;
    let fetcher = HttpAssetFetcher::new(app_config.fetch_timeout_sec)?;
    let cache = Arc::new(AssetCache::new(
        app_config.assets.cache_config(),
        Arc::new(storage),
        Arc::new(fetcher),
    ));

    match cache.install().await {
        Ok(()) => {
            let deleted = cache.activate().await?;
            if !deleted.is_empty() {
                info!("Removed {} stale asset cache(s)", deleted.len());
            }
        }
        Err(err) => warn!(
            "Asset cache {} could not be installed and none is stored, serving without offline support: {:#}",
            cache.cache_name(),
            err
        ),
    }

    run_server(
        cache,
        ServerConfig {
            requests_logging_level: app_config.logging_level.clone(),
            port: app_config.port,
            origin: app_config.assets.origin.clone(),
        },
    )
    .await
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .context("Failed to initialize logging")?;

    // Load TOML config if provided
    let file_config = match &cli_args.config {
        Some(path) => {
            info!("Loading configuration from {:?}", path);
            Some(config::FileConfig::load(path)?)
        }
        None => None,
    };

    // Resolve final configuration (TOML overrides CLI)
    let cli_config: config::CliConfig = (&cli_args).into();
    let app_config = AppConfig::resolve(&cli_config, file_config)?;
    info!("Using db_dir {:?}", app_config.db_dir);

    match cli_args.command {
        Command::Serve => serve(&app_config).await?,
        Command::Add {
            title,
            composer,
            arranger,
            publisher,
            voicing,
            liturgical_season,
            tags,
            year_published,
            last_performed_date,
            license_count,
            notes,
        } => {
            let now = format_timestamp(&SystemClock.now());
            let record = NewRecord {
                title,
                composer,
                arranger,
                publisher,
                voicing,
                liturgical_season,
                tags,
                year_published,
                last_performed_date,
                license_count,
                notes,
            }
            .into_record(&now);
            let store = open_store(&app_config).await?;
            store.insert(&record).await?;
            println!("Added {} ({}).", describe(&record), record.id);
        }
        Command::List { query, sort } => {
            let store = open_store(&app_config).await?;
            let records = store.list_all().await?;
            let records = filter_records(records, query.as_deref().unwrap_or_default());
            let records = sort_records(records, sort);
            if records.is_empty() {
                println!("No scores found.");
            }
            for record in &records {
                println!("{}", describe(record));
            }
        }
        Command::Export { mode, out_dir } => {
            let engine = sync_engine(&app_config).await?;
            match engine.export_to_dir(mode, &out_dir).await {
                Ok(outcome) => {
                    println!("{}", outcome.status_message());
                    if let Some(path) = outcome.path {
                        println!("{}", path.display());
                    }
                }
                Err(err) => {
                    error!("Export failed: {}", err);
                    println!("Export failed: {}", err);
                    std::process::exit(1);
                }
            }
        }
        Command::Import { file } => {
            let engine = sync_engine(&app_config).await?;
            match engine.import_file(&file).await {
                Ok(report) => println!("{}", report.status_message()),
                Err(err) => {
                    error!("Import failed: {}", err);
                    println!("Import failed: {}", err);
                    std::process::exit(1);
                }
            }
        }
        Command::Migrate => {
            let store = open_store(&app_config).await?;
            let migration = store.migrate().await?;
            println!(
                "Catalog database at version {} (opened at {}).",
                migration.to_version,
                store.migration().from_version
            );
            SqliteWatermarkStore::open(app_config.state_db_path()).await?;
            SqliteCacheStorage::open(app_config.assets_db_path()).await?;
            println!("State and asset databases are up to date.");
        }
    }

    Ok(())
}
