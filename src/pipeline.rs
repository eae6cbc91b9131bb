//! One source, end to end: driver setup, fallback plan, output files.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{info, warn};

use crate::browser::{ChromiumDriver, PageDriver, SnapshotDriver};
use crate::extract::stats::Vocabulary;
use crate::fetch::HttpFetcher;
use crate::normalize::{self, Artifact};
use crate::orchestrator::strategies::{ApiStrategy, LinksStrategy, PageStrategy, SampleStrategy, TableStrategy};
use crate::orchestrator::{AttemptSummary, ExtractionAttempt, Orchestrator, RunContext, SourceKind, Strategy};
use crate::settings::Settings;
use crate::sink::{self, Manifest};
use crate::sources::{PortalSource, Source};
use crate::utils::{clean_text, safe_title};

#[derive(Debug)]
pub struct RunSummary {
    pub title: String,
    pub winner: Option<SourceKind>,
    pub rows: Option<usize>,
    pub files: Vec<PathBuf>,
    pub manifest: PathBuf,
    pub attempts: Vec<AttemptSummary>,
}

pub fn plan_for(source: &Source) -> Result<Vec<Box<dyn Strategy>>> {
    let sample = Box::new(SampleStrategy { table: source.sample() });
    let plan: Vec<Box<dyn Strategy>> = match source {
        Source::StatsPage(s) => vec![
            Box::new(PageStrategy {
                url: s.url.to_string(),
                vocab: Vocabulary::new(s.count_words)
                    .with_context(|| format!("bad count vocabulary for {}", s.name))?,
            }),
            sample,
        ],
        Source::Portal(p) => vec![
            Box::new(ApiStrategy {
                url: p.api_url.to_string(),
            }),
            Box::new(TableStrategy {
                web_url: p.web_url.to_string(),
            }),
            Box::new(LinksStrategy {
                web_url: p.web_url.to_string(),
            }),
            sample,
        ],
    };
    Ok(plan)
}

/// Chromium unless disabled or unavailable; HTTP snapshots otherwise.
async fn open_driver(settings: &Settings, fetcher: &HttpFetcher, no_browser: bool) -> Box<dyn PageDriver> {
    if no_browser {
        info!("Browser disabled, reading pages as static HTML");
        return Box::new(SnapshotDriver::http(fetcher.clone()));
    }
    match ChromiumDriver::launch(settings).await {
        Ok(driver) => Box::new(driver),
        Err(e) => {
            warn!("{}; falling back to static HTML", e);
            Box::new(SnapshotDriver::http(fetcher.clone()))
        }
    }
}

async fn first_heading(driver: &mut dyn PageDriver) -> Option<String> {
    for selector in ["h1", "h2"] {
        let Ok(found) = driver.find_all(selector).await else {
            continue;
        };
        for el in &found {
            if let Ok(text) = driver.read_text(el).await {
                let text = clean_text(&text);
                if !text.is_empty() {
                    return Some(text);
                }
            }
        }
    }
    None
}

/// Navigate to the portal page and take its first heading as the title.
async fn portal_title(driver: &mut dyn PageDriver, portal: &PortalSource) -> String {
    if let Err(e) = driver.navigate(portal.web_url).await {
        warn!("Could not load {}: {}", portal.web_url, e);
        return portal.fallback_title.to_string();
    }
    match first_heading(driver).await {
        Some(title) => {
            info!("Dataset title: {}", title);
            title
        }
        None => {
            info!("No heading found, using {}", portal.fallback_title);
            portal.fallback_title.to_string()
        }
    }
}

/// Everything a run needs that can fail before a browser is opened.
struct Prepared {
    fetcher: HttpFetcher,
    plan: Vec<Box<dyn Strategy>>,
}

fn prepare(source: &Source, settings: &Settings, out_dir: &Path) -> Result<Prepared> {
    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("creating output directory {}", out_dir.display()))?;
    Ok(Prepared {
        fetcher: HttpFetcher::new(settings)?,
        plan: plan_for(source)?,
    })
}

pub async fn run(source: &Source, settings: &Settings, out_dir: &Path, no_browser: bool) -> Result<RunSummary> {
    let prepared = prepare(source, settings, out_dir)?;
    let driver = match source {
        Source::StatsPage(_) => None,
        Source::Portal(_) => Some(open_driver(settings, &prepared.fetcher, no_browser).await),
    };
    execute(source, out_dir, prepared, driver).await
}

/// Run the plan with a driver supplied by the caller. The driver is closed
/// on every path, before any output is written.
pub async fn run_with_driver(
    source: &Source,
    settings: &Settings,
    out_dir: &Path,
    mut driver: Option<Box<dyn PageDriver>>,
) -> Result<RunSummary> {
    match prepare(source, settings, out_dir) {
        Ok(prepared) => execute(source, out_dir, prepared, driver).await,
        Err(e) => {
            close_driver(&mut driver).await;
            Err(e)
        }
    }
}

async fn close_driver(driver: &mut Option<Box<dyn PageDriver>>) {
    if let Some(d) = driver.as_mut() {
        if let Err(e) = d.close().await {
            warn!("Closing page driver failed: {}", e);
        }
    }
}

async fn execute(
    source: &Source,
    out_dir: &Path,
    prepared: Prepared,
    mut driver: Option<Box<dyn PageDriver>>,
) -> Result<RunSummary> {
    let Prepared { fetcher, plan } = prepared;

    let title = match (source, driver.as_mut()) {
        (Source::StatsPage(s), _) => s.dataset_name.to_string(),
        (Source::Portal(p), Some(d)) => portal_title(d.as_mut(), p).await,
        (Source::Portal(p), None) => p.fallback_title.to_string(),
    };
    let base = safe_title(&title);
    info!("Running {} as {:?}", source.name(), base);

    let report = {
        let mut ctx = RunContext {
            fetcher: &fetcher,
            driver: match driver.as_mut() {
                Some(d) => Some(d.as_mut()),
                None => None,
            },
            out_dir,
        };
        Orchestrator::new(plan).run(&mut ctx).await
    };

    close_driver(&mut driver).await;
    drop(driver);

    let mut files = Vec::new();
    let mut rows = None;
    let mut download_url = None;
    let winner = match report.winner {
        Some(ExtractionAttempt { source: kind, payload }) => {
            let artifacts = normalize::artifacts(&base, payload);
            rows = artifacts.iter().find_map(Artifact::rows);
            download_url = artifacts.iter().find_map(Artifact::origin).map(str::to_string);
            for artifact in artifacts {
                files.push(sink::write_artifact(out_dir, artifact)?);
            }
            Some(kind)
        }
        None => None,
    };

    let manifest_path = out_dir.join(format!("{base}_manifest.json"));
    let manifest = Manifest {
        source: source.name().to_string(),
        title: title.clone(),
        winner,
        synthetic: winner.is_some_and(SourceKind::is_synthetic),
        rows,
        download_url,
        files: files
            .iter()
            .filter_map(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .collect(),
        attempts: report.attempts.clone(),
        finished_at: Utc::now(),
    };
    sink::write_manifest(&manifest_path, &manifest)?;

    Ok(RunSummary {
        title,
        winner,
        rows,
        files,
        manifest: manifest_path,
        attempts: report.attempts,
    })
}

// ── Tests ──
