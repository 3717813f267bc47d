use data_catalog::prelude::*;
use std::env;
use std::time::Duration;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    // Config
    let base_url = env::var("CATALOG_URL").unwrap_or_else(|_| "http://localhost:8080".to_string());
    let token = env::var("CATALOG_TOKEN").ok();
    let asset_id = env::var("CATALOG_ASSET").expect("CATALOG_ASSET required");
    let version = env::var("CATALOG_VERSION").ok();

    let client = CatalogClient::from_config(ClientConfig {
        base_url,
        token,
        ..Default::default()
    })
    .expect("Failed to build catalog client");

    let asset = client
        .get_asset(&asset_id)
        .await
        .expect("Failed to read asset record");

    // Credentials come from the asset's location parameters on every call.
    let store = OpendalStore::azblob().with_timeout(Duration::from_secs(60));
    let fetcher = DataFetcher::new(client, store, ReqwestFetcher::new()).with_config(FetchConfig {
        max_concurrency: 8,
        ..Default::default()
    });

    let handle = fetcher.asset(&asset);
    let table = handle
        .get_data(version.as_deref())
        .await
        .expect("Failed to load asset data");

    println!("Loaded {} rows from '{}'", table.num_rows(), asset.name);

    let versions = handle
        .list_versions(ListFormat::Table)
        .await
        .expect("Failed to list versions");
    if let VersionListing::Table(listing) = versions {
        print!("{}", listing.to_csv(b',').expect("Failed to write csv"));
    }
}
