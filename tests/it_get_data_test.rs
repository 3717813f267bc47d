use catalog_fs::FileSystemStore;
use catalog_mock::{MemoryHttp, MemoryStore, MemoryVersions};
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use data_catalog::prelude::*;
use std::time::Duration;

const ACCOUNT: &str = "https://acc.blob.core.windows.net";
const CONTAINER: &str = "sales";

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()
}

fn container() -> ObjectStoreLocation {
    ObjectStoreLocation::new(ACCOUNT, CONTAINER).with_account_key("K")
}

fn blob_asset(format: &str) -> Asset {
    Asset::new(
        "blob-1",
        format,
        Location::new(
            LocationType::ObjectStore,
            [
                (keys::ACCOUNT_URL, ACCOUNT),
                (keys::CONTAINER_NAME, CONTAINER),
                (keys::ACCOUNT_KEY, "K"),
            ],
        ),
    )
}

fn url_asset(url: &str) -> Asset {
    Asset::new("url-1", "csv", Location::new("url", [(keys::URL, url)]))
}

struct Harness {
    versions: MemoryVersions,
    store: MemoryStore,
    http: MemoryHttp,
    fetcher: DataFetcher<MemoryVersions, MemoryStore, MemoryHttp>,
}

fn harness() -> Harness {
    let versions = MemoryVersions::new();
    let store = MemoryStore::new();
    let http = MemoryHttp::new();
    let fetcher = DataFetcher::new(versions.clone(), store.clone(), http.clone());
    Harness {
        versions,
        store,
        http,
        fetcher,
    }
}

fn version(name: &str, entries: &[(&str, DateTime<Utc>)]) -> Version {
    Version {
        id: name.trim_start_matches('v').to_string(),
        name: name.to_string(),
        created_at: Some(t0()),
        contents: entries
            .iter()
            .map(|(name, last_modified)| ContentEntry {
                name: name.to_string(),
                last_modified: *last_modified,
            })
            .collect(),
    }
}

fn column(table: &Table, name: &str) -> Vec<i64> {
    table
        .iter_rows()
        .filter_map(|row| row.get(name).and_then(Value::as_i64))
        .collect()
}

#[tokio::test]
async fn url_asset_is_fetched_and_parsed() {
    let h = harness();
    h.http.serve("http://data.test/prices.csv", "a,b\n1,2\n3,4\n");

    let table = h
        .fetcher
        .get_data(&url_asset("http://data.test/prices.csv"), None)
        .await
        .unwrap();

    assert_eq!(table.columns(), ["a", "b"]);
    assert_eq!(table.num_rows(), 2);
    assert_eq!(column(&table, "a"), [1, 3]);
    assert_eq!(table.get(1, "b"), Some(&Value::Int(4)));
    assert_eq!(h.http.requests(), ["http://data.test/prices.csv"]);
}

#[tokio::test]
async fn sniffed_delimiter_matches_explicit_parse() {
    let text = "a;b\n1;2\n3;4\n";
    let h = harness();
    h.http.serve("http://data.test/semi.csv", text);

    let table = h
        .fetcher
        .get_data(&url_asset("http://data.test/semi.csv"), None)
        .await
        .unwrap();

    assert_eq!(table, data_catalog::format::parse_csv_with(text, b';').unwrap());
}

#[tokio::test]
async fn parsed_table_writes_back_the_same_rows() {
    let text = "a,b\n1,2\n3,4\n";
    let h = harness();
    h.http.serve("http://data.test/prices.csv", text);

    let table = h
        .fetcher
        .get_data(&url_asset("http://data.test/prices.csv"), None)
        .await
        .unwrap();

    assert_eq!(table.to_csv(b',').unwrap(), text);
}

#[tokio::test]
async fn written_back_csv_keeps_source_spelling() {
    let samples = [
        "id,amount,ok\n007,1.50,TRUE\n008,2.25,FALSE\n",
        "delta;exp;name\n+5;1e3;x\n-2;2e3;y\n",
        "a\tb\n1\t2.5\n\t3.0\n",
    ];
    for (i, text) in samples.into_iter().enumerate() {
        let url = format!("http://data.test/sample-{i}.csv");
        let h = harness();
        h.http.serve(&url, text);

        let table = h.fetcher.get_data(&url_asset(&url), None).await.unwrap();
        let delimiter = data_catalog::format::sniff_delimiter(text);
        assert_eq!(table.to_csv(delimiter).unwrap(), text);
    }
}

#[tokio::test]
async fn version_is_ignored_for_url_assets() {
    let h = harness();
    h.http.serve("http://data.test/prices.csv", "a\n1\n");

    let table = h
        .fetcher
        .get_data(&url_asset("http://data.test/prices.csv"), Some("v9"))
        .await
        .unwrap();
    assert_eq!(table.num_rows(), 1);
}

#[tokio::test]
async fn missing_url_resource_is_not_found() {
    let h = harness();
    let err = h
        .fetcher
        .get_data(&url_asset("http://data.test/gone.csv"), None)
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::NotFound { location_type: LocationType::Url, .. }));
}

#[tokio::test]
async fn unversioned_fetch_concatenates_every_listed_object() {
    let h = harness();
    h.store.put(&container(), "part-0.csv", "x\n1\n2\n");
    h.store.put(&container(), "part-1.csv", "x\n3\n");
    h.store.put(&container(), "part-2.csv", "x\n4\n5\n6\n");

    let table = h.fetcher.get_data(&blob_asset("csv"), None).await.unwrap();

    assert_eq!(table.num_rows(), 6);
    assert_eq!(column(&table, "x"), [1, 2, 3, 4, 5, 6]);
}

#[tokio::test]
async fn empty_container_gives_empty_table() {
    let h = harness();
    let table = h.fetcher.get_data(&blob_asset("csv"), None).await.unwrap();
    assert!(table.is_empty());
}

#[tokio::test]
async fn versioned_fetch_keeps_manifest_order() {
    let h = harness();
    for (name, body) in [("a.csv", "x\n1\n"), ("b.csv", "x\n2\n"), ("c.csv", "x\n3\n")] {
        h.store.put_at(&container(), name, body, t0());
    }
    h.store
        .delay(&container(), "c.csv", Duration::from_millis(100));
    h.versions.insert(
        "blob-1",
        version("v1", &[("c.csv", t0()), ("a.csv", t0()), ("b.csv", t0())]),
    );

    let table = h
        .fetcher
        .get_data(&blob_asset("csv"), Some("v1"))
        .await
        .unwrap();

    assert_eq!(column(&table, "x"), [3, 1, 2]);
    // The delayed object finished last but is still first in the table.
    assert_eq!(h.store.downloads().last().map(String::as_str), Some("c.csv"));
}

#[tokio::test]
async fn versioned_fetch_only_reads_recorded_objects() {
    let h = harness();
    h.store.put_at(&container(), "a.csv", "x\n1\n", t0());
    h.store.put_at(&container(), "new.csv", "x\n99\n", t0());
    h.versions.insert("blob-1", version("v1", &[("a.csv", t0())]));

    let table = h
        .fetcher
        .get_data(&blob_asset("csv"), Some("v1"))
        .await
        .unwrap();
    assert_eq!(column(&table, "x"), [1]);
}

#[tokio::test]
async fn modified_object_makes_version_stale() {
    let h = harness();
    h.store.put_at(&container(), "a.csv", "x\n1\n", t0());
    h.store
        .put_at(&container(), "b.csv", "x\n2\n", t0() + ChronoDuration::hours(1));
    h.versions
        .insert("blob-1", version("v1", &[("a.csv", t0()), ("b.csv", t0())]));

    let err = h
        .fetcher
        .get_data(&blob_asset("csv"), Some("v1"))
        .await
        .unwrap_err();

    match err {
        FetchError::StaleOrMissingVersion {
            version,
            object,
            reason: StaleReason::ModifiedAfter { watermark, .. },
            ..
        } => {
            assert_eq!(version, "v1");
            assert_eq!(object, "b.csv");
            assert_eq!(watermark, t0());
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(h.store.downloads().is_empty());
}

#[tokio::test]
async fn object_older_than_watermark_is_accepted() {
    let h = harness();
    h.store
        .put_at(&container(), "a.csv", "x\n1\n", t0() - ChronoDuration::days(1));
    h.versions.insert("blob-1", version("v1", &[("a.csv", t0())]));

    let table = h
        .fetcher
        .get_data(&blob_asset("csv"), Some("v1"))
        .await
        .unwrap();
    assert_eq!(table.num_rows(), 1);
}

#[tokio::test]
async fn deleted_object_makes_version_stale() {
    let h = harness();
    h.store.put_at(&container(), "a.csv", "x\n1\n", t0());
    h.versions
        .insert("blob-1", version("v1", &[("a.csv", t0()), ("gone.csv", t0())]));

    let err = h
        .fetcher
        .get_data(&blob_asset("csv"), Some("v1"))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        FetchError::StaleOrMissingVersion { ref object, reason: StaleReason::Missing, .. } if object == "gone.csv"
    ));
    assert!(h.store.downloads().is_empty());
}

#[tokio::test]
async fn unknown_version_is_not_found() {
    let h = harness();
    let err = h
        .fetcher
        .get_data(&blob_asset("csv"), Some("v404"))
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::NotFound { ref what, .. } if what.contains("v404")));
}

#[tokio::test]
async fn missing_credentials_fail_before_any_store_call() {
    let h = harness();
    let asset = Asset::new(
        "blob-1",
        "csv",
        Location::new(
            "objectStore",
            [(keys::ACCOUNT_URL, ACCOUNT), (keys::CONTAINER_NAME, CONTAINER)],
        ),
    );

    let err = h.fetcher.get_data(&asset, None).await.unwrap_err();

    assert!(matches!(
        err,
        FetchError::MissingConfiguration { key: "accountKey", location_type: LocationType::ObjectStore, .. }
    ));
    assert_eq!(h.store.calls(), 0);
}

#[tokio::test]
async fn expired_sas_token_falls_back_to_account_key() {
    let h = harness();
    h.store.put(&container(), "a.csv", "x\n1\n");
    let asset = Asset::new(
        "blob-1",
        "csv",
        Location::new(
            "azureblob",
            [
                (keys::ACCOUNT_URL, ACCOUNT),
                (keys::CONTAINER_NAME, CONTAINER),
                (keys::SAS_TOKEN, "sv=old"),
                (keys::EXPIRY_TIME, "2000-01-01T00:00:00Z"),
                (keys::ACCOUNT_KEY, "K"),
            ],
        ),
    );

    let table = h.fetcher.get_data(&asset, None).await.unwrap();
    assert_eq!(table.num_rows(), 1);
}

#[tokio::test]
async fn malformed_expiry_is_invalid_configuration() {
    let h = harness();
    let asset = Asset::new(
        "blob-1",
        "csv",
        Location::new(
            "objectStore",
            [
                (keys::ACCOUNT_URL, ACCOUNT),
                (keys::CONTAINER_NAME, CONTAINER),
                (keys::SAS_TOKEN, "sv=x"),
                (keys::EXPIRY_TIME, "tomorrow"),
            ],
        ),
    );

    let err = h.fetcher.get_data(&asset, None).await.unwrap_err();
    assert!(matches!(err, FetchError::InvalidConfiguration { key: "expiryTime", .. }));
    assert_eq!(h.store.calls(), 0);
}

#[tokio::test]
async fn asset_without_location_is_rejected() {
    let h = harness();
    let asset = Asset {
        id: "bare".into(),
        format: Some("csv".into()),
        ..Default::default()
    };
    let err = h.fetcher.get_data(&asset, None).await.unwrap_err();
    assert!(matches!(err, FetchError::MissingLocation { ref asset_id } if asset_id == "bare"));
}

#[tokio::test]
async fn unknown_location_type_is_rejected() {
    let h = harness();
    let asset = Asset::new("ftp-1", "csv", Location::new("ftp", [("host", "x")]));
    let err = h.fetcher.get_data(&asset, None).await.unwrap_err();
    assert!(matches!(
        err,
        FetchError::UnsupportedLocationType { ref location_type, .. } if location_type == "ftp"
    ));
}

#[tokio::test]
async fn unsupported_format_fails_before_io() {
    let h = harness();
    h.http.serve("http://data.test/p.parquet", "PAR1");
    let mut asset = url_asset("http://data.test/p.parquet");
    asset.format = Some("parquet".into());

    let err = h.fetcher.get_data(&asset, None).await.unwrap_err();

    assert!(matches!(err, FetchError::UnsupportedFormat { ref format, .. } if format == "parquet"));
    assert!(h.http.requests().is_empty());
}

#[tokio::test]
async fn malformed_object_names_the_object() {
    let h = harness();
    h.store.put(&container(), "good.json", r#"[{"x": 1}]"#);
    h.store.put(&container(), "bad.json", "{not json");

    let err = h.fetcher.get_data(&blob_asset("json"), None).await.unwrap_err();
    assert!(matches!(err, FetchError::ParseError { ref object, .. } if object == "bad.json"));
}

#[tokio::test]
async fn first_failure_cancels_slower_downloads() {
    let h = harness();
    h.store.put(&container(), "slow.json", r#"[{"x": 1}]"#);
    h.store.put(&container(), "bad.json", "{not json");
    h.store
        .delay(&container(), "slow.json", Duration::from_secs(2));

    let started = std::time::Instant::now();
    let err = h.fetcher.get_data(&blob_asset("json"), None).await.unwrap_err();

    assert!(started.elapsed() < Duration::from_millis(500), "{:?}", started.elapsed());
    assert!(matches!(err, FetchError::ParseError { ref object, .. } if object == "bad.json"));
    assert_eq!(h.store.downloads(), ["bad.json"]);
}

#[tokio::test]
async fn slow_download_times_out() {
    let h = harness();
    h.store.put(&container(), "a.csv", "x\n1\n");
    h.store
        .delay(&container(), "a.csv", Duration::from_millis(500));
    let fetcher = h.fetcher.clone().with_config(FetchConfig {
        max_concurrency: 2,
        request_timeout: Some(Duration::from_millis(20)),
    });

    let err = fetcher.get_data(&blob_asset("csv"), None).await.unwrap_err();
    assert!(matches!(err, FetchError::TransferError { ref object, .. } if object == "a.csv"));
}

#[tokio::test]
async fn handle_manages_versions() {
    let h = harness();
    let asset = blob_asset("csv");
    let handle = h.fetcher.asset(&asset);

    let first = handle.create_version().await.unwrap();
    let second = handle.create_version().await.unwrap();
    assert_eq!(first.name, "v1");
    assert_eq!(handle.get_version("v2").await.unwrap(), second);

    match handle.list_versions(ListFormat::Map).await.unwrap() {
        VersionListing::Map(map) => {
            assert_eq!(map.keys().collect::<Vec<_>>(), ["1", "2"]);
        }
        other => panic!("expected a map, got {other:?}"),
    }

    handle.delete_version("v1").await.unwrap();
    match handle.list_versions(ListFormat::Table).await.unwrap() {
        VersionListing::Table(table) => {
            assert_eq!(table.num_rows(), 1);
            assert_eq!(table.get(0, "name"), Some(&Value::from("v2")));
        }
        other => panic!("expected a table, got {other:?}"),
    }

    assert!(matches!(
        handle.delete_version("v1").await,
        Err(VersionError::NotFound { .. })
    ));
}

#[tokio::test]
async fn filesystem_store_serves_containers() {
    let dir = tempfile::tempdir().unwrap();
    let data = dir.path().join(CONTAINER);
    std::fs::create_dir_all(&data).unwrap();
    std::fs::write(data.join("a.csv"), "x|y\n1|a\n").unwrap();
    std::fs::write(data.join("b.csv"), "x|y\n2|b\n").unwrap();

    let versions = MemoryVersions::new();
    versions.insert(
        "blob-1",
        version(
            "v1",
            &[("b.csv", Utc::now() + ChronoDuration::days(1))],
        ),
    );
    let fetcher = DataFetcher::new(
        versions,
        FileSystemStore::new(dir.path()),
        MemoryHttp::new(),
    );

    let all = fetcher.get_data(&blob_asset("csv"), None).await.unwrap();
    assert_eq!(column(&all, "x"), [1, 2]);

    let pinned = fetcher
        .get_data(&blob_asset("csv"), Some("v1"))
        .await
        .unwrap();
    assert_eq!(pinned.get(0, "y"), Some(&Value::from("b")));
}
