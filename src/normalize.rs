//! Payload → output artifacts.

use crate::extract::{synth_headers, Payload, Record, Table};
use crate::fetch::DownloadedFile;

pub const RECORD_COLUMNS: [&str; 5] = ["category", "statistic_number", "description", "value", "unit"];

pub fn records_to_table(records: &[Record]) -> Table {
    let rows = records
        .iter()
        .map(|r| {
            vec![
                r.category.clone(),
                r.index.to_string(),
                r.description.clone(),
                r.value.clone(),
                r.unit.to_string(),
            ]
        })
        .collect();
    Table::new(RECORD_COLUMNS.iter().map(|c| c.to_string()).collect(), rows)
}

/// Make every row as wide as the widest of headers and rows. Missing headers
/// get `Column_{i}` names, short rows are padded with empty cells.
pub fn normalize_widths(table: &mut Table) {
    let width = table
        .rows
        .iter()
        .map(Vec::len)
        .chain(std::iter::once(table.headers.len()))
        .max()
        .unwrap_or(0);

    if table.headers.len() < width {
        let synthetic = synth_headers(width);
        table.headers.extend(synthetic.into_iter().skip(table.headers.len()));
    }
    for row in &mut table.rows {
        row.resize(width, String::new());
    }
}

#[derive(Debug)]
pub enum Content {
    Csv(Table),
    /// Written verbatim.
    Json(String),
    /// Already on disk next to its destination; only needs renaming.
    File(DownloadedFile),
}

#[derive(Debug)]
pub struct Artifact {
    pub file_name: String,
    pub content: Content,
}

impl Artifact {
    fn csv(file_name: String, mut table: Table) -> Self {
        normalize_widths(&mut table);
        Artifact {
            file_name,
            content: Content::Csv(table),
        }
    }

    /// Where the bytes came from, for downloaded files.
    pub fn origin(&self) -> Option<&str> {
        match &self.content {
            Content::File(f) => Some(f.url.as_str()),
            Content::Csv(_) | Content::Json(_) => None,
        }
    }

    pub fn rows(&self) -> Option<usize> {
        match &self.content {
            Content::Csv(t) => Some(t.rows.len()),
            Content::Json(_) | Content::File(_) => None,
        }
    }
}

/// Map a winning payload to the files it should produce, named from `base`.
pub fn artifacts(base: &str, payload: Payload) -> Vec<Artifact> {
    match payload {
        Payload::Records(records) => vec![Artifact::csv(format!("{base}.csv"), records_to_table(&records))],
        Payload::Table(table) => vec![Artifact::csv(format!("{base}_tabla.csv"), table)],
        Payload::Api { table, raw_json } => vec![
            Artifact::csv(format!("{base}_API.csv"), table),
            Artifact {
                file_name: format!("{base}_API.json"),
                content: Content::Json(raw_json),
            },
        ],
        Payload::Download { index, file } => vec![Artifact {
            file_name: format!("{base}_web_{index}.{}", file.kind.extension()),
            content: Content::File(file),
        }],
        Payload::Sample(table) => vec![Artifact::csv(format!("{base}_sample.csv"), table)],
        Payload::Empty => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::Unit;
    use crate::fetch::FileKind;

    fn names(artifacts: &[Artifact]) -> Vec<&str> {
        artifacts.iter().map(|a| a.file_name.as_str()).collect()
    }

    #[test]
    fn records_become_five_columns() {
        let t = records_to_table(&[Record {
            category: "Key Findings".into(),
            index: 1,
            description: "40% of homes".into(),
            value: "40".into(),
            unit: Unit::Percentage,
        }]);
        assert_eq!(t.headers, RECORD_COLUMNS);
        assert_eq!(t.rows[0], vec!["Key Findings", "1", "40% of homes", "40", "percentage"]);
    }

    #[test]
    fn ragged_rows_are_squared_off() {
        let mut t = Table::new(
            vec!["A".into()],
            vec![vec!["1".into(), "2".into(), "3".into()], vec!["x".into()]],
        );
        normalize_widths(&mut t);
        assert_eq!(t.headers, vec!["A", "Column_2", "Column_3"]);
        assert_eq!(t.rows[1], vec!["x", "", ""]);
    }

    #[test]
    fn file_names_follow_the_payload() {
        let table = || Table::new(vec!["A".into()], vec![vec!["1".into()]]);
        assert_eq!(names(&artifacts("base", Payload::Records(Vec::new()))), vec!["base.csv"]);
        assert_eq!(names(&artifacts("base", Payload::Table(table()))), vec!["base_tabla.csv"]);
        assert_eq!(names(&artifacts("base", Payload::Sample(table()))), vec!["base_sample.csv"]);
        assert_eq!(
            names(&artifacts(
                "base",
                Payload::Api {
                    table: table(),
                    raw_json: "{}".into()
                }
            )),
            vec!["base_API.csv", "base_API.json"]
        );
        assert!(artifacts("base", Payload::Empty).is_empty());
    }

    #[test]
    fn download_keeps_index_and_extension() {
        let dir = tempfile::tempdir().unwrap();
        let file = DownloadedFile {
            url: "https://portal.test/rows.xlsx".into(),
            kind: FileKind::Xlsx,
            bytes: 10,
            file: tempfile::NamedTempFile::new_in(dir.path()).unwrap(),
        };
        let out = artifacts("Activos", Payload::Download { index: 3, file });
        assert_eq!(names(&out), vec!["Activos_web_3.xlsx"]);
        assert_eq!(out[0].rows(), None);
        assert_eq!(out[0].origin(), Some("https://portal.test/rows.xlsx"));
    }
}
