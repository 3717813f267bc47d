use anyhow::Context;
use catalog_client::{CatalogClient, ClientConfig, DEFAULT_URL, ReqwestFetcher};
use catalog_core::prelude::*;
use catalog_fs::FileSystemStore;
use catalog_opendal::OpendalStore;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "catalog")]
#[command(about = "CLI for the data catalog: load asset data and manage versions")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Catalog service URL
    #[arg(short, long, env = "CATALOG_URL", default_value = DEFAULT_URL)]
    url: String,

    #[arg(short, long, env = "CATALOG_TOKEN")]
    token: Option<String>,

    /// Per-request timeout in seconds
    #[arg(long, default_value_t = 30)]
    timeout: u64,

    /// Objects downloaded in parallel
    #[arg(long, default_value_t = 4)]
    concurrency: usize,
}

#[derive(Clone, Copy, ValueEnum)]
enum Output {
    Csv,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Load an asset's data and print it
    GetData {
        asset_id: String,

        /// Load the objects recorded by this version instead of the live container
        #[arg(long)]
        version: Option<String>,

        #[arg(short, long, value_enum, default_value = "csv")]
        output: Output,

        /// Read the asset record from a local JSON file instead of the service
        #[arg(long)]
        asset_file: Option<PathBuf>,

        /// Serve object store containers from directories below this root
        #[arg(long)]
        fs_root: Option<PathBuf>,
    },
    /// Show one version of an asset
    GetVersion { asset_id: String, name: String },
    /// List the versions of an asset
    ListVersions {
        asset_id: String,

        /// list, dict or dataframe
        #[arg(short, long, default_value = "list")]
        format: ListFormat,
    },
    /// Record the asset's current state as a new version
    CreateVersion { asset_id: String },
    DeleteVersion { asset_id: String, name: String },
}

fn print_table(table: &Table, output: Output) -> anyhow::Result<()> {
    match output {
        Output::Csv => print!("{}", table.to_csv(b',')?),
        Output::Json => println!("{}", serde_json::to_string_pretty(table)?),
    }
    Ok(())
}

async fn get_data<S: ObjectStore>(
    client: CatalogClient,
    store: S,
    http: ReqwestFetcher,
    config: FetchConfig,
    asset: &Asset,
    version: Option<&str>,
) -> anyhow::Result<Table> {
    let fetcher = DataFetcher::new(client, store, http).with_config(config);
    Ok(fetcher.asset(asset).get_data(version).await?)
}

async fn load_asset(
    client: &CatalogClient,
    asset_id: &str,
    asset_file: Option<PathBuf>,
) -> anyhow::Result<Asset> {
    let Some(path) = asset_file else {
        return Ok(client.get_asset(asset_id).await?);
    };

    let raw = tokio::fs::read_to_string(&path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    let response: AssetResponse =
        serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?;
    let mut asset = Asset::from_response(response);
    if asset.id.is_empty() {
        asset.id = asset_id.to_string();
    }
    Ok(asset)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let timeout = Duration::from_secs(cli.timeout);
    let client = CatalogClient::from_config(ClientConfig {
        base_url: cli.url.clone(),
        token: cli.token.clone(),
        timeout: Some(timeout),
    })?;
    let config = FetchConfig {
        max_concurrency: cli.concurrency.max(1),
        request_timeout: Some(timeout),
    };

    // Version commands only need the id; the store and http fetcher are never touched.
    let versions = DataFetcher::new(client.clone(), OpendalStore::azblob(), ReqwestFetcher::new())
        .with_config(config.clone());

    match cli.command {
        Commands::GetData {
            asset_id,
            version,
            output,
            asset_file,
            fs_root,
        } => {
            let asset = load_asset(&client, &asset_id, asset_file).await?;
            let http = ReqwestFetcher::with_timeout(timeout)?;
            eprintln!("🔍 Loading data for asset '{}'...", asset.id);

            let table = match fs_root {
                Some(root) => {
                    let store = FileSystemStore::new(root);
                    get_data(client, store, http, config, &asset, version.as_deref()).await?
                }
                None => {
                    let store = OpendalStore::azblob().with_timeout(timeout);
                    get_data(client, store, http, config, &asset, version.as_deref()).await?
                }
            };

            eprintln!("✅ Loaded {} rows.", table.num_rows());
            print_table(&table, output)?;
        }
        Commands::GetVersion { asset_id, name } => {
            let asset = Asset {
                id: asset_id,
                ..Default::default()
            };
            let version = versions.asset(&asset).get_version(&name).await?;
            println!("{}", serde_json::to_string_pretty(&version)?);
        }
        Commands::ListVersions { asset_id, format } => {
            let asset = Asset {
                id: asset_id,
                ..Default::default()
            };
            match versions.asset(&asset).list_versions(format).await? {
                VersionListing::List(list) => {
                    println!("{}", serde_json::to_string_pretty(&list)?)
                }
                VersionListing::Map(map) => println!("{}", serde_json::to_string_pretty(&map)?),
                VersionListing::Table(table) => print_table(&table, Output::Csv)?,
            }
        }
        Commands::CreateVersion { asset_id } => {
            let asset = Asset {
                id: asset_id,
                ..Default::default()
            };
            let version = versions.asset(&asset).create_version().await?;
            eprintln!("✅ Created version '{}'.", version.name);
            println!("{}", serde_json::to_string_pretty(&version)?);
        }
        Commands::DeleteVersion { asset_id, name } => {
            let asset = Asset {
                id: asset_id,
                ..Default::default()
            };
            versions.asset(&asset).delete_version(&name).await?;
            println!("🗑️ Deleted version '{name}' of asset '{}'.", asset.id);
        }
    }

    Ok(())
}
