use crate::table::{Table, Value};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

/// A recorded version of an asset: the objects it was made of and the
/// last-modified watermark each of them had when the version was created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Version {
    #[serde(default)]
    pub id: String,

    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,

    /// Ordered; fetched tables are concatenated in this order.
    #[serde(default)]
    pub contents: Vec<ContentEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentEntry {
    pub name: String,
    pub last_modified: DateTime<Utc>,
}

/// Shape requested from [`crate::asset::AssetHandle::list_versions`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ListFormat {
    #[default]
    List,
    Map,
    Table,
}

impl FromStr for ListFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "list" => Ok(Self::List),
            "dict" | "map" => Ok(Self::Map),
            "dataframe" | "table" => Ok(Self::Table),
            other => Err(format!(
                "unknown output format `{other}`, expected list, dict or dataframe"
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum VersionListing {
    List(Vec<Version>),
    /// Keyed by version id, or by name for versions without one.
    Map(BTreeMap<String, Version>),
    /// One row per version: `id`, `name`, `createdAt`, `contents`.
    Table(Table),
}

impl VersionListing {
    pub fn build(versions: Vec<Version>, format: ListFormat) -> Self {
        match format {
            ListFormat::List => Self::List(versions),
            ListFormat::Map => Self::Map(
                versions
                    .into_iter()
                    .map(|v| {
                        let key = if v.id.is_empty() { &v.name } else { &v.id };
                        (key.clone(), v)
                    })
                    .collect(),
            ),
            ListFormat::Table => {
                let columns = ["id", "name", "createdAt", "contents"]
                    .map(String::from)
                    .to_vec();
                let rows = versions
                    .into_iter()
                    .map(|v| {
                        vec![
                            Value::String(v.id),
                            Value::String(v.name),
                            v.created_at
                                .map(|t| Value::String(t.to_rfc3339()))
                                .unwrap_or(Value::Null),
                            Value::Int(v.contents.len() as i64),
                        ]
                    })
                    .collect();
                Self::Table(Table::from_rows(columns, rows))
            }
        }
    }
}
