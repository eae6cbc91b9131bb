//! Atomic file output: every write goes to a temp file in the destination
//! directory and is renamed into place.

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tempfile::NamedTempFile;
use tracing::info;

use crate::extract::Table;
use crate::normalize::{Artifact, Content};
use crate::orchestrator::{AttemptSummary, SourceKind};

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("writing {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("writing CSV {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("writing JSON {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> SinkError + '_ {
    move |source| SinkError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn staging_file(path: &Path) -> Result<NamedTempFile, SinkError> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    NamedTempFile::new_in(dir).map_err(io_error(path))
}

fn commit(tmp: NamedTempFile, path: &Path) -> Result<(), SinkError> {
    tmp.persist(path).map_err(|e| SinkError::Io {
        path: path.to_path_buf(),
        source: e.error,
    })?;
    Ok(())
}

/// UTF-8, header row first, LF line endings.
pub fn write_csv(path: &Path, table: &Table) -> Result<(), SinkError> {
    let csv_error = |source| SinkError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let mut tmp = staging_file(path)?;
    {
        let mut wtr = csv::WriterBuilder::new()
            .terminator(csv::Terminator::Any(b'\n'))
            .from_writer(tmp.as_file_mut());
        wtr.write_record(&table.headers).map_err(csv_error)?;
        for row in &table.rows {
            wtr.write_record(row).map_err(csv_error)?;
        }
        wtr.flush().map_err(io_error(path))?;
    }
    commit(tmp, path)
}

pub fn write_text(path: &Path, body: &str) -> Result<(), SinkError> {
    let mut tmp = staging_file(path)?;
    tmp.write_all(body.as_bytes()).map_err(io_error(path))?;
    commit(tmp, path)
}

pub fn write_artifact(dir: &Path, artifact: Artifact) -> Result<PathBuf, SinkError> {
    let path = dir.join(&artifact.file_name);
    match artifact.content {
        Content::Csv(table) => write_csv(&path, &table)?,
        Content::Json(raw) => write_text(&path, &raw)?,
        Content::File(downloaded) => commit(downloaded.file, &path)?,
    }
    info!("Wrote {}", path.display());
    Ok(path)
}

/// Summary of one run, written next to the data it describes.
#[derive(Debug, Serialize)]
pub struct Manifest {
    pub source: String,
    pub title: String,
    pub winner: Option<SourceKind>,
    pub synthetic: bool,
    pub rows: Option<usize>,
    /// Link the winning download came from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
    pub files: Vec<String>,
    pub attempts: Vec<AttemptSummary>,
    pub finished_at: DateTime<Utc>,
}

pub fn write_manifest(path: &Path, manifest: &Manifest) -> Result<(), SinkError> {
    let body = serde_json::to_string_pretty(manifest).map_err(|source| SinkError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    write_text(path, &body)?;
    info!("Wrote manifest {}", path.display());
    Ok(())
}

// ── Tests ──
