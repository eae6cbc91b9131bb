pub mod api;
pub mod links;
pub mod stats;
pub mod table;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::browser::DriverError;
use crate::fetch::{DownloadedFile, FetchError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Unit {
    Percentage,
    Dollars,
    Time,
    Count,
    Ratio,
}

impl Unit {
    pub fn as_str(self) -> &'static str {
        match self {
            Unit::Percentage => "percentage",
            Unit::Dollars => "dollars",
            Unit::Time => "time",
            Unit::Count => "count",
            Unit::Ratio => "ratio",
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One statistic pulled out of a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub category: String,
    /// 1-based, unique within `category`.
    pub index: u32,
    pub description: String,
    /// Digits as they appeared (commas stripped), or `"N/A"`.
    pub value: String,
    pub unit: Unit,
}

/// Generic columnar data: API rows, scraped tables, samples.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Table { headers, rows }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

pub fn synth_headers(n: usize) -> Vec<String> {
    (1..=n).map(|i| format!("Column_{i}")).collect()
}

/// What a stage hands back to the orchestrator.
#[derive(Debug)]
pub enum Payload {
    Records(Vec<Record>),
    Table(Table),
    Api { table: Table, raw_json: String },
    /// `index` is the 1-based position of the winning candidate link.
    Download { index: usize, file: DownloadedFile },
    Sample(Table),
    /// The stage ran cleanly but found nothing.
    Empty,
}

impl Payload {
    pub fn is_empty(&self) -> bool {
        match self {
            Payload::Records(records) => records.is_empty(),
            Payload::Table(table) | Payload::Sample(table) => table.is_empty(),
            Payload::Api { table, .. } => table.is_empty(),
            Payload::Download { file, .. } => file.bytes == 0,
            Payload::Empty => true,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Payload::Records(records) => records.len(),
            Payload::Table(table) | Payload::Sample(table) => table.rows.len(),
            Payload::Api { table, .. } => table.rows.len(),
            Payload::Download { .. } => 1,
            Payload::Empty => 0,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Driver(#[from] DriverError),
    #[error("parse error: {0}")]
    Parse(String),
    #[error("stage needs a page driver but none is available")]
    NoDriver,
}
