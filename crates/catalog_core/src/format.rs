//! Turning raw bytes into a [`Table`].
//!
//! CSV dialects are not declared by the catalog, so the field delimiter is
//! sniffed from the content before parsing. JSON tables are accepted in any
//! of the common orientations (records, split, columns, values).

use crate::error::FormatError;
use crate::table::{Table, Value};
use serde_json::Value as Json;
use std::fmt;
use std::str::FromStr;

const CSV: &str = "csv";
const JSON: &str = "json";

/// Delimiters tried by [`sniff_delimiter`], in order of preference.
pub const CANDIDATE_DELIMITERS: [u8; 5] = [b',', b';', b'\t', b'|', b':'];

const SNIFF_LINES: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataFormat {
    Csv,
    Json,
}

impl DataFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Csv => CSV,
            Self::Json => JSON,
        }
    }
}

impl FromStr for DataFormat {
    type Err = FormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            CSV => Ok(Self::Csv),
            JSON => Ok(Self::Json),
            _ => Err(FormatError::Unsupported(s.to_string())),
        }
    }
}

impl fmt::Display for DataFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parses `data` according to `format`.
pub fn parse(data: &[u8], format: DataFormat) -> Result<Table, FormatError> {
    match format {
        DataFormat::Csv => parse_csv(data),
        DataFormat::Json => parse_json(data),
    }
}

fn decode<'a>(data: &'a [u8], format: &'static str) -> Result<&'a str, FormatError> {
    let text = std::str::from_utf8(data).map_err(|e| FormatError::parse(format, e))?;
    Ok(text.strip_prefix('\u{feff}').unwrap_or(text))
}

/// Counts `delimiter` outside of double-quoted sections.
fn count_unquoted(line: &str, delimiter: u8) -> usize {
    let mut in_quotes = false;
    let mut count = 0;
    for &b in line.as_bytes() {
        if b == b'"' {
            in_quotes = !in_quotes;
        } else if b == delimiter && !in_quotes {
            count += 1;
        }
    }
    count
}

/// Guesses the field delimiter of delimited text.
///
/// A candidate that occurs the same non-zero number of times on every sampled
/// line wins; among those the most frequent is picked. Without a consistent
/// candidate the one present on the most lines is used. Text in which no
/// candidate occurs is a single column, and `,` is returned.
pub fn sniff_delimiter(text: &str) -> u8 {
    let lines: Vec<&str> = text
        .lines()
        .filter(|l| !l.trim().is_empty())
        .take(SNIFF_LINES)
        .collect();

    let mut consistent: Option<(u8, usize)> = None;
    let mut fallback: Option<(u8, usize, usize)> = None;

    for delimiter in CANDIDATE_DELIMITERS {
        let counts: Vec<usize> = lines
            .iter()
            .map(|l| count_unquoted(l, delimiter))
            .collect();
        let Some(&first) = counts.first() else {
            continue;
        };

        if first > 0 && counts.iter().all(|&c| c == first) {
            if consistent.is_none_or(|(_, best)| first > best) {
                consistent = Some((delimiter, first));
            }
            continue;
        }

        let present = counts.iter().filter(|&&c| c > 0).count();
        let total: usize = counts.iter().sum();
        if present > 0
            && fallback.is_none_or(|(_, p, t)| (present, total) > (p, t))
        {
            fallback = Some((delimiter, present, total));
        }
    }

    consistent
        .map(|(d, _)| d)
        .or(fallback.map(|(d, _, _)| d))
        .unwrap_or(b',')
}

fn parse_csv(data: &[u8]) -> Result<Table, FormatError> {
    let text = decode(data, CSV)?;
    let delimiter = sniff_delimiter(text);
    parse_csv_with(text, delimiter)
}

/// Parses delimited text with an explicit delimiter.
pub fn parse_csv_with(text: &str, delimiter: u8) -> Result<Table, FormatError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .from_reader(text.as_bytes());

    let headers = reader.headers().map_err(|e| FormatError::parse(CSV, e))?;
    let columns = unique_columns(headers.iter());

    let mut cells: Vec<Vec<String>> = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| FormatError::parse(CSV, e))?;
        cells.push(record.iter().map(str::to_string).collect());
    }

    let kinds: Vec<CellKind> = (0..columns.len())
        .map(|i| CellKind::infer(cells.iter().map(|row| row[i].as_str())))
        .collect();

    let rows = cells
        .into_iter()
        .map(|row| {
            row.into_iter()
                .zip(&kinds)
                .map(|(cell, kind)| kind.convert(cell))
                .collect()
        })
        .collect();

    Ok(Table::from_rows(columns, rows))
}

/// Renames repeated headers `a, a, a` to `a, a.1, a.2`.
fn unique_columns<'a>(headers: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut columns: Vec<String> = Vec::new();
    for header in headers {
        let mut name = header.to_string();
        let mut n = 0;
        while columns.contains(&name) {
            n += 1;
            name = format!("{header}.{n}");
        }
        columns.push(name);
    }
    columns
}

/// Column type inferred from every non-empty cell of a CSV column.
///
/// A typed kind is only chosen when every cell renders back to exactly its
/// source text, so `007`, `1.50` or `TRUE` keep the column as text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CellKind {
    Int,
    Float,
    Bool,
    Text,
}

impl CellKind {
    fn infer<'a>(cells: impl Iterator<Item = &'a str>) -> Self {
        let (mut int, mut float, mut boolean) = (true, true, true);
        let mut seen = false;
        for cell in cells.filter(|c| !c.is_empty()) {
            seen = true;
            int &= cell.parse::<i64>().is_ok_and(|v| v.to_string() == cell);
            float &= cell
                .parse::<f64>()
                .is_ok_and(|v| v.is_finite() && Value::Float(v).to_string() == cell);
            boolean &= parse_bool(cell).is_some();
        }

        match (seen, int, float, boolean) {
            (false, ..) => Self::Text,
            (_, true, ..) => Self::Int,
            (_, _, true, _) => Self::Float,
            (_, _, _, true) => Self::Bool,
            _ => Self::Text,
        }
    }

    fn convert(self, cell: String) -> Value {
        if cell.is_empty() {
            return Value::Null;
        }
        match self {
            Self::Int => cell.parse().map(Value::Int).unwrap_or(Value::String(cell)),
            Self::Float => cell.parse().map(Value::Float).unwrap_or(Value::String(cell)),
            Self::Bool => parse_bool(&cell).map(Value::Bool).unwrap_or(Value::String(cell)),
            Self::Text => Value::String(cell),
        }
    }
}

fn parse_bool(cell: &str) -> Option<bool> {
    match cell {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

fn parse_json(data: &[u8]) -> Result<Table, FormatError> {
    let text = decode(data, JSON)?;
    let doc: Json = serde_json::from_str(text).map_err(|e| FormatError::parse(JSON, e))?;

    match doc {
        Json::Array(items) => {
            if items.iter().all(Json::is_object) {
                Ok(from_records(items))
            } else if items.iter().all(Json::is_array) {
                Ok(from_values(items))
            } else {
                Err(FormatError::parse(
                    JSON,
                    "array elements must be all objects or all arrays",
                ))
            }
        }
        Json::Object(map) if map.contains_key("columns") && map.contains_key("data") => {
            from_split(map)
        }
        Json::Object(map) => from_columns(map),
        other => Err(FormatError::parse(
            JSON,
            format!("expected an array or object, found {}", kind_of(&other)),
        )),
    }
}

fn kind_of(value: &Json) -> &'static str {
    match value {
        Json::Null => "null",
        Json::Bool(_) => "a boolean",
        Json::Number(_) => "a number",
        Json::String(_) => "a string",
        Json::Array(_) => "an array",
        Json::Object(_) => "an object",
    }
}

fn to_value(json: Json) -> Value {
    match json {
        Json::Null => Value::Null,
        Json::Bool(b) => Value::Bool(b),
        Json::Number(n) => n
            .as_i64()
            .map(Value::Int)
            .or_else(|| n.as_f64().map(Value::Float))
            .unwrap_or_else(|| Value::String(n.to_string())),
        Json::String(s) => Value::String(s),
        nested @ (Json::Array(_) | Json::Object(_)) => Value::String(nested.to_string()),
    }
}

/// `[{"a": 1, "b": 2}, ...]`
fn from_records(items: Vec<Json>) -> Table {
    let mut columns: Vec<String> = Vec::new();
    for item in &items {
        if let Json::Object(map) = item {
            for key in map.keys() {
                if !columns.contains(key) {
                    columns.push(key.clone());
                }
            }
        }
    }

    let rows = items
        .into_iter()
        .map(|item| match item {
            Json::Object(mut map) => columns
                .iter()
                .map(|c| map.remove(c).map(to_value).unwrap_or(Value::Null))
                .collect(),
            _ => Vec::new(),
        })
        .collect();

    Table::from_rows(columns, rows)
}

/// `[[1, 2], [3, 4]]`
fn from_values(items: Vec<Json>) -> Table {
    let width = items
        .iter()
        .filter_map(Json::as_array)
        .map(Vec::len)
        .max()
        .unwrap_or(0);
    let columns = (0..width).map(|i| i.to_string()).collect();

    let rows = items
        .into_iter()
        .map(|item| match item {
            Json::Array(values) => values.into_iter().map(to_value).collect(),
            _ => Vec::new(),
        })
        .collect();

    Table::from_rows(columns, rows)
}

/// `{"columns": [...], "data": [[...], ...]}`
fn from_split(mut map: serde_json::Map<String, Json>) -> Result<Table, FormatError> {
    let columns = match map.remove("columns") {
        Some(Json::Array(cols)) => cols
            .into_iter()
            .map(|c| match c {
                Json::String(s) => s,
                other => other.to_string(),
            })
            .collect(),
        _ => return Err(FormatError::parse(JSON, "`columns` must be an array")),
    };

    let Some(Json::Array(data)) = map.remove("data") else {
        return Err(FormatError::parse(JSON, "`data` must be an array"));
    };

    let rows = data
        .into_iter()
        .map(|row| match row {
            Json::Array(values) => Ok(values.into_iter().map(to_value).collect()),
            other => Err(FormatError::parse(
                JSON,
                format!("`data` rows must be arrays, found {}", kind_of(&other)),
            )),
        })
        .collect::<Result<Vec<Vec<Value>>, _>>()?;

    Ok(Table::from_rows(columns, rows))
}

/// `{"a": {"0": 1, "1": 2}, ...}` or `{"a": [1, 2], ...}`
fn from_columns(map: serde_json::Map<String, Json>) -> Result<Table, FormatError> {
    let mut index: Vec<String> = Vec::new();
    let mut columns: Vec<(String, Vec<(String, Json)>)> = Vec::with_capacity(map.len());

    for (name, column) in map {
        let cells: Vec<(String, Json)> = match column {
            Json::Object(cells) => cells.into_iter().collect(),
            Json::Array(cells) => cells
                .into_iter()
                .enumerate()
                .map(|(i, v)| (i.to_string(), v))
                .collect(),
            other => {
                return Err(FormatError::parse(
                    JSON,
                    format!("column `{name}` must be an object or array, found {}", kind_of(&other)),
                ));
            }
        };
        for (key, _) in &cells {
            if !index.contains(key) {
                index.push(key.clone());
            }
        }
        columns.push((name, cells));
    }

    let names = columns.iter().map(|(name, _)| name.clone()).collect();
    let mut rows = vec![vec![Value::Null; columns.len()]; index.len()];
    for (col, (_, cells)) in columns.into_iter().enumerate() {
        for (key, value) in cells {
            if let Some(row) = index.iter().position(|k| *k == key) {
                rows[row][col] = to_value(value);
            }
        }
    }

    Ok(Table::from_rows(names, rows))
}
