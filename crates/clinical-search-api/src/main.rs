use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use clinical_search_api::{router, ApiConfig, AppState};
use clinical_search_core::{
    CodeStore, CsvSeeder, Database, DrugCatalog, SearchEngine, SqliteStore, TieredSearchEngine,
};

#[derive(Parser)]
#[command(name = "clinical-search")]
#[command(about = "Clinical code and drug search service")]
struct Cli {
    /// SQLite database path
    #[arg(long, global = true, env = "CLINICAL_SEARCH_DB")]
    db: Option<PathBuf>,

    /// Disable the fuzzy tier
    #[arg(long, global = true)]
    no_fuzzy: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server
    Serve {
        /// Address to bind
        #[arg(long, env = "CLINICAL_SEARCH_ADDR")]
        addr: Option<String>,
    },
    /// Import ICD-10 codes from a CSV file
    Seed {
        csv: PathBuf,
        /// Field delimiter
        #[arg(long, default_value_t = ',')]
        delimiter: char,
    },
    /// Search from the command line, printing tier and score
    Search {
        query: String,
        #[arg(long)]
        limit: Option<u32>,
        /// Search the drug library instead of ICD-10
        #[arg(long)]
        drugs: bool,
    },
    /// Look up one ICD-10 code
    Lookup { code: String },
    /// Rebuild the trigram index from the base tables
    Reindex {
        /// Run an integrity check afterwards
        #[arg(long)]
        check: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            EnvFilter::from_default_env()
                .add_directive("clinical_search_core=info".parse()?)
                .add_directive("clinical_search_api=info".parse()?)
                .add_directive("tower_http=info".parse()?),
        )
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let mut config = ApiConfig::from_env()?;
    if let Some(db) = cli.db {
        config.db_path = db;
    }
    if cli.no_fuzzy {
        config.apply_search(|c| c.with_fuzzy(false));
    }

    match cli.command {
        Commands::Serve { addr } => {
            if let Some(addr) = addr {
                config.addr = addr;
            }
            serve(config).await
        }
        Commands::Seed { csv, delimiter } => {
            let delimiter = u8::try_from(delimiter)
                .ok()
                .filter(u8::is_ascii)
                .context("delimiter must be a single ASCII character")?;
            let mut db = Database::open(&config.db_path)
                .with_context(|| format!("opening {}", config.db_path.display()))?;
            let report = CsvSeeder::new()
                .with_delimiter(delimiter)
                .seed_file(&mut db, &csv)
                .with_context(|| format!("seeding from {}", csv.display()))?;
            println!("{}", report.to_json()?);
            Ok(())
        }
        Commands::Search {
            query,
            limit,
            drugs,
        } => {
            let store = Arc::new(SqliteStore::open(&config.db_path)?);
            if drugs {
                let catalog = DrugCatalog::with_config(store, config.drugs)?;
                for ranked in catalog.search_ranked(&query, limit)? {
                    let drug = ranked.item;
                    println!(
                        "{:?}\t{:.3}\t{}\t{}\t{}\t{}",
                        ranked.tier,
                        ranked.score,
                        drug.id,
                        drug.name,
                        drug.presentation.unwrap_or_default(),
                        drug.strength.unwrap_or_default()
                    );
                }
            } else {
                let engine = TieredSearchEngine::with_config(store, config.icd10)?;
                for ranked in engine.search_ranked(&query, limit)? {
                    println!(
                        "{:?}\t{:.3}\t{}\t{}",
                        ranked.tier, ranked.score, ranked.item.code, ranked.item.description
                    );
                }
            }
            Ok(())
        }
        Commands::Lookup { code } => {
            let engine = TieredSearchEngine::new(SqliteStore::open(&config.db_path)?);
            match engine.get_by_code(&code)? {
                Some(entry) => {
                    println!("{}", serde_json::to_string_pretty(&entry)?);
                    Ok(())
                }
                None => bail!("ICD10 code not found: {}", code),
            }
        }
        Commands::Reindex { check } => {
            let db = Database::open(&config.db_path)?;
            db.rebuild_search_index()?;
            if check {
                db.check_search_index()?;
                println!("search index ok");
            }
            Ok(())
        }
    }
}

async fn serve(config: ApiConfig) -> anyhow::Result<()> {
    let store = SqliteStore::open(&config.db_path)
        .with_context(|| format!("opening {}", config.db_path.display()))?;
    tracing::info!(
        db = %config.db_path.display(),
        capabilities = ?store.capabilities(),
        "storage ready"
    );

    let state = AppState::from_store(Arc::new(store), &config)?;
    let app = router(state);

    let listener = TcpListener::bind(&config.addr).await?;
    tracing::info!("-- Clinical search listening on {}", config.addr);

    axum::serve(listener, app).await?;
    Ok(())
}
