//! BOQ pricing command-line tool
//!
//! Works against the file-backed store configured in `[storage] data_dir`.
//!
//! ```sh
//! # Load a quantity baseline for a tender
//! boq import --tender T-100 --items items.json
//!
//! # Price it from explicit cost inputs, or from the tender's resource sheet
//! boq price --base <base-id> --inputs costs.json
//! boq price --base <base-id> --tender T-100
//!
//! # Compare, approve and re-check versions
//! boq diff --base <base-id> --from 1 --to 2
//! boq approve --priced <priced-id> --by "Site QS"
//! boq verify --priced <priced-id>
//!
//! # Validate config without touching storage
//! boq --check
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{error, info};

use boq_pricing::domain::{
    BaseItem, CostInput, DefaultPercentages, ItemResources, NewBase, NewBaseItem, RepositoryProvider,
    SnapshotMeta,
};
use boq_pricing::infrastructure::storage::MigrationRegistry;
use boq_pricing::{
    default_config_path, init_tracing, AppConfig, FileAdapter, PricingService, StorageManager,
    StorageRepositoryProvider, TenderPricingResolver, TenderPricingStore,
};

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

/// Price bills of quantities and keep a verifiable history of every version.
#[derive(Parser, Debug)]
#[command(
    name = "boq",
    version,
    about = "Versioned BOQ pricing with integrity snapshots",
    long_about = "Prices bill-of-quantities baselines, stores every priced version, \
                  diffs versions and seals approved ones with SHA-256 snapshots.\n\n\
                  Default config: ~/.config/boq-pricing/config.toml"
)]
struct Cli {
    /// Path to the configuration file (TOML).
    #[arg(short, long, env = "BOQ_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Override the storage directory.
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Override the log level (trace, debug, info, warn, error).
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Validate the configuration file and exit.
    #[arg(long)]
    check: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write the effective configuration to the config path.
    InitConfig,
    /// Create a new active base for a tender from a JSON array of items.
    Import {
        #[arg(long)]
        tender: String,
        #[arg(long)]
        items: PathBuf,
    },
    /// List the bases of a tender.
    Bases {
        #[arg(long)]
        tender: String,
    },
    /// Price a base and store the result as a new version.
    Price {
        #[arg(long)]
        base: String,
        /// JSON array of cost inputs.
        #[arg(long, conflicts_with = "tender")]
        inputs: Option<PathBuf>,
        /// Derive cost inputs from the tender's stored resource sheet.
        #[arg(long)]
        tender: Option<String>,
    },
    /// List every priced version of a base.
    Versions {
        #[arg(long)]
        base: String,
    },
    /// Diff two versions of a base.
    Diff {
        #[arg(long)]
        base: String,
        #[arg(long)]
        from: u32,
        #[arg(long)]
        to: u32,
    },
    /// Diff a version against the last approved one before it.
    DiffApproved {
        #[arg(long)]
        priced: String,
    },
    /// Approve a priced version and seal it with a snapshot.
    Approve {
        #[arg(long)]
        priced: String,
        #[arg(long)]
        by: String,
        #[arg(long)]
        note: Option<String>,
    },
    /// Recompute a sealed version's hashes and compare with its snapshot.
    Verify {
        #[arg(long)]
        priced: String,
    },
    /// Delete old versions according to `[retention] keep_last`.
    Prune {
        #[arg(long)]
        base: String,
    },
    /// Tender resource sheets.
    #[command(subcommand)]
    Tender(TenderCommand),
    /// Storage statistics.
    Stats,
}

#[derive(Subcommand, Debug)]
enum TenderCommand {
    /// Print the stored resource sheet.
    Show {
        #[arg(long)]
        tender: String,
    },
    /// Merge a JSON object of `baseItemId -> resources` into the sheet.
    Import {
        #[arg(long)]
        tender: String,
        #[arg(long)]
        file: PathBuf,
    },
    /// Replace the tender's default percentages.
    Defaults {
        #[arg(long)]
        tender: String,
        #[arg(long)]
        administrative: f64,
        #[arg(long)]
        operational: f64,
        #[arg(long)]
        profit: f64,
    },
}

struct App {
    storage: StorageManager,
    repos: Arc<StorageRepositoryProvider>,
    pricing: PricingService,
    tenders: TenderPricingStore,
}

impl App {
    async fn open(config: &AppConfig) -> CliResult<Self> {
        let data_dir = config.data_dir();
        info!("Using storage at {}", data_dir.display());

        let storage = StorageManager::builder(Arc::new(FileAdapter::new(data_dir)))
            .config(config.storage_config())
            .migrations(Arc::new(MigrationRegistry::new()))
            .legacy_resolver(Arc::new(TenderPricingResolver))
            .build();
        storage.initialize().await?;

        let repos = Arc::new(StorageRepositoryProvider::new(storage.clone()));
        let pricing = PricingService::new(repos.clone(), config.engine_config())
            .with_retention(config.retention());
        let tenders = TenderPricingStore::new(storage.clone(), config.pricing.default_percentages);

        Ok(Self {
            storage,
            repos,
            pricing,
            tenders,
        })
    }

    async fn run(&self, command: Command) -> CliResult<()> {
        match command {
            // Handled before storage is opened
            Command::InitConfig => Ok(()),
            Command::Import { tender, items } => {
                let items: Vec<NewBaseItem> = read_json(&items)?;
                let base = self.repos.bases().create(NewBase::active(tender)).await?;
                let created: Vec<BaseItem> = self.repos.bases().create_items(&base.id, items).await?;
                print_json(&serde_json::json!({ "base": base, "items": created.len() }))
            }
            Command::Bases { tender } => print_json(&self.repos.bases().list_by_tender(&tender).await?),
            Command::Price { base, inputs, tender } => {
                let inputs: Vec<CostInput> = match (inputs, tender) {
                    (Some(path), _) => read_json(&path)?,
                    (None, Some(tender)) => self.tenders.load(&tender).await?.cost_inputs(),
                    (None, None) => return Err("either --inputs or --tender is required".into()),
                };
                print_json(&self.pricing.price_base(&base, &inputs).await?)
            }
            Command::Versions { base } => print_json(&self.repos.priced().list_versions(&base).await?),
            Command::Diff { base, from, to } => print_json(&self.pricing.diff_versions(&base, from, to).await?),
            Command::DiffApproved { priced } => {
                print_json(&self.pricing.diff_against_approved(&priced).await?)
            }
            Command::Approve { priced, by, note } => {
                let mut meta = SnapshotMeta::approved_by(by);
                meta.note = note;
                print_json(&self.pricing.approve(&priced, meta).await?)
            }
            Command::Verify { priced } => {
                self.pricing.verify(&priced).await?;
                println!("Integrity verified for {priced}");
                Ok(())
            }
            Command::Prune { base } => print_json(&self.pricing.apply_retention(&base).await?),
            Command::Tender(TenderCommand::Show { tender }) => print_json(&self.tenders.load(&tender).await?),
            Command::Tender(TenderCommand::Import { tender, file }) => {
                let sheet: BTreeMap<String, ItemResources> = read_json(&file)?;
                let mut record = self.tenders.load(&tender).await?;
                for (base_item_id, resources) in sheet {
                    record.upsert(base_item_id, resources);
                }
                print_json(&self.tenders.save(record).await?)
            }
            Command::Tender(TenderCommand::Defaults {
                tender,
                administrative,
                operational,
                profit,
            }) => {
                let percentages = DefaultPercentages {
                    administrative,
                    operational,
                    profit,
                };
                print_json(&self.tenders.update_default_percentages(&tender, percentages).await?)
            }
            Command::Stats => print_json(&self.storage.stats().await?),
        }
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> CliResult<T> {
    let raw = std::fs::read_to_string(path).map_err(|e| format!("{}: {e}", path.display()))?;
    Ok(serde_json::from_str(&raw).map_err(|e| format!("{}: {e}", path.display()))?)
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> CliResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> CliResult<()> {
    let cli = Cli::parse();

    // ── Load configuration ─────────────────────────────────────
    let config_path = cli.config.clone().unwrap_or_else(default_config_path);

    let mut config = match AppConfig::load(&config_path) {
        Ok(mut cfg) => {
            if let Some(ref level) = cli.log_level {
                cfg.logging.level = level.clone();
            }
            init_tracing(&cfg);
            info!("Configuration loaded from {}", config_path.display());
            cfg
        }
        Err(e) => {
            if cli.check {
                eprintln!("Configuration is invalid: {e}");
                std::process::exit(1);
            }
            tracing_subscriber::fmt()
                .with_env_filter(tracing_subscriber::EnvFilter::new(
                    cli.log_level.as_deref().unwrap_or("info"),
                ))
                .with_writer(std::io::stderr)
                .init();
            error!("Failed to load config from {}: {}", config_path.display(), e);
            error!("Using default configuration.");
            AppConfig::default()
        }
    };

    // ── Apply CLI overrides ────────────────────────────────────
    if let Some(dir) = cli.data_dir {
        info!("CLI override: data_dir = {}", dir.display());
        config.storage.data_dir = Some(dir);
    }

    // ── Config validation mode ─────────────────────────────────
    if cli.check {
        println!("Configuration is valid");
        println!("   Config file : {}", config_path.display());
        println!("   Data dir    : {}", config.data_dir().display());
        println!("   VAT rate    : {}", config.pricing.vat_rate);
        println!(
            "   Retention   : {}",
            config
                .retention
                .keep_last
                .map(|n| format!("keep last {n}"))
                .unwrap_or_else(|| "keep all".to_string())
        );
        println!("   Log level   : {}", config.logging.level);
        return Ok(());
    }

    let Some(command) = cli.command else {
        return Err("no command given, see --help".into());
    };

    if let Command::InitConfig = command {
        config.save(&config_path)?;
        println!("Wrote {}", config_path.display());
        return Ok(());
    }

    let app = App::open(&config).await?;
    let result = app.run(command).await;

    // Deferred writes must land even when the command failed.
    app.storage.close().await?;
    result
}
