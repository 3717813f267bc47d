use data_catalog::prelude::*;
use std::env;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let url = env::var("CATALOG_DEMO_URL").unwrap_or_else(|_| {
        "https://people.sc.fsu.edu/~jburkardt/data/csv/addresses.csv".to_string()
    });

    // Url locations never touch versions or containers, so in-memory stand-ins do.
    let fetcher = DataFetcher::new(MemoryVersions::new(), MemoryStore::new(), ReqwestFetcher::new());

    let asset = Asset::new("demo", "csv", Location::new("url", [(keys::URL, url.as_str())]));

    let table = fetcher
        .asset(&asset)
        .get_data(None)
        .await
        .expect("Failed to load asset data");

    println!("{} rows, columns {:?}", table.num_rows(), table.columns());
    print!("{}", table.to_csv(b',').expect("Failed to write csv"));
}
