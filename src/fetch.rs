use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Response, StatusCode};
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::settings::Settings;

const ACCEPT_HTML: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";
const ACCEPT_JSON: &str = "application/json, text/plain, */*";

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("network error fetching {url}: {reason}")]
    Network { url: String, reason: String },
    #[error("access forbidden for {url}: {reason}")]
    Forbidden { url: String, reason: String },
    #[error("timed out fetching {url}")]
    Timeout { url: String },
}

impl FetchError {
    fn from_reqwest(url: &str, e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FetchError::Timeout { url: url.to_string() }
        } else {
            FetchError::Network {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Html,
    Json,
}

#[derive(Debug, Clone)]
pub struct FetchResult {
    pub url: String,
    pub status: u16,
    pub content_kind: ContentKind,
    pub body: String,
}

/// Spreadsheet formats a download link may point at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Csv,
    Xlsx,
    Xls,
}

impl FileKind {
    pub fn extension(self) -> &'static str {
        match self {
            FileKind::Csv => "csv",
            FileKind::Xlsx => "xlsx",
            FileKind::Xls => "xls",
        }
    }

    /// URL path suffix wins; the Content-Type header is only consulted when
    /// the path says nothing.
    pub fn infer(url: &str, content_type: Option<&str>) -> Option<FileKind> {
        let path = url::Url::parse(url)
            .map(|u| u.path().to_lowercase())
            .unwrap_or_else(|_| url.to_lowercase());
        if path.ends_with(".csv") {
            return Some(FileKind::Csv);
        }
        if path.ends_with(".xlsx") {
            return Some(FileKind::Xlsx);
        }
        if path.ends_with(".xls") {
            return Some(FileKind::Xls);
        }

        let ct = content_type?.to_lowercase();
        if ct.contains("text/csv") || ct.contains("application/csv") {
            Some(FileKind::Csv)
        } else if ct.contains("spreadsheetml.sheet") {
            Some(FileKind::Xlsx)
        } else if ct.contains("application/vnd.ms-excel") {
            Some(FileKind::Xls)
        } else {
            None
        }
    }
}

/// A candidate file streamed to a temp file next to its final destination.
#[derive(Debug)]
pub struct DownloadedFile {
    pub url: String,
    pub kind: FileKind,
    pub bytes: u64,
    pub file: NamedTempFile,
}

#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("rejected {url}: {reason}")]
    Rejected { url: String, reason: String },
    #[error("could not stage download from {url}: {source}")]
    Io {
        url: String,
        #[source]
        source: std::io::Error,
    },
}

/// At most one request per `delay` to any given host.
#[derive(Debug)]
struct Throttle {
    delay: Duration,
    last: Mutex<HashMap<String, Instant>>,
}

impl Throttle {
    fn new(delay: Duration) -> Self {
        Throttle {
            delay,
            last: Mutex::new(HashMap::new()),
        }
    }

    async fn wait(&self, url: &str) {
        if self.delay.is_zero() {
            return;
        }
        let host = url::Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_default();

        let mut last = self.last.lock().await;
        if let Some(prev) = last.get(&host) {
            let ready_at = *prev + self.delay;
            if ready_at > Instant::now() {
                debug!("Throttling {} until next slot", host);
                tokio::time::sleep_until(ready_at).await;
            }
        }
        last.insert(host, Instant::now());
    }
}

/// HTTP side of page access: static pages, the JSON API, and file downloads.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    throttle: Arc<Throttle>,
}

impl HttpFetcher {
    pub fn new(settings: &Settings) -> Result<Self, FetchError> {
        let mut headers = HeaderMap::new();
        headers.insert(header::ACCEPT, HeaderValue::from_static(ACCEPT_HTML));
        if let Ok(lang) = HeaderValue::from_str(&settings.accept_language) {
            headers.insert(header::ACCEPT_LANGUAGE, lang);
        }

        let client = reqwest::Client::builder()
            .user_agent(settings.user_agent.clone())
            .default_headers(headers)
            .timeout(settings.timeout())
            .build()
            .map_err(|e| FetchError::from_reqwest("<client>", e))?;

        Ok(HttpFetcher {
            client,
            throttle: Arc::new(Throttle::new(settings.request_delay())),
        })
    }

    /// One GET; 401/403 are reported as `Forbidden`, other failures as `Network`.
    pub async fn fetch_page(&self, url: &str) -> Result<FetchResult, FetchError> {
        self.throttle.wait(url).await;
        info!("GET {}", url);
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(url, e))?;
        check_status(url, resp.status())?;
        read_body(url, resp).await
    }

    /// GET the API; on 401/403 try once more as POST. A second refusal or a
    /// body that does not parse as JSON means the API is not usable.
    pub async fn fetch_api(&self, url: &str) -> Result<FetchResult, FetchError> {
        self.throttle.wait(url).await;
        info!("API GET {}", url);
        let resp = self
            .client
            .get(url)
            .header(header::ACCEPT, ACCEPT_JSON)
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(url, e))?;

        let resp = if is_refusal(resp.status()) {
            info!("API refused GET ({}), trying POST", resp.status());
            self.throttle.wait(url).await;
            let retry = self
                .client
                .post(url)
                .header(header::ACCEPT, ACCEPT_JSON)
                .json(&serde_json::json!({}))
                .send()
                .await
                .map_err(|e| FetchError::from_reqwest(url, e))?;
            if is_refusal(retry.status()) {
                return Err(FetchError::Forbidden {
                    url: url.to_string(),
                    reason: format!("GET and POST both refused ({})", retry.status()),
                });
            }
            retry
        } else {
            resp
        };

        check_status(url, resp.status())?;
        let mut result = read_body(url, resp).await?;
        if serde_json::from_str::<serde_json::Value>(&result.body).is_err() {
            return Err(FetchError::Forbidden {
                url: url.to_string(),
                reason: "response body is not JSON".to_string(),
            });
        }
        result.content_kind = ContentKind::Json;
        Ok(result)
    }

    /// Stream a candidate file into a temp file inside `dir`.
    ///
    /// The kind is decided from the headers before any of the body is read,
    /// so unrecognized content is rejected without downloading it.
    pub async fn download(&self, url: &str, dir: &Path) -> Result<DownloadedFile, DownloadError> {
        self.throttle.wait(url).await;
        info!("Downloading {}", url);
        let resp = self
            .client
            .get(url)
            .header(header::ACCEPT, "*/*")
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(url, e))?;
        check_status(url, resp.status())?;

        let content_type = resp
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let kind = FileKind::infer(url, content_type.as_deref()).ok_or_else(|| {
            DownloadError::Rejected {
                url: url.to_string(),
                reason: format!(
                    "unrecognized content type {}",
                    content_type.as_deref().unwrap_or("<none>")
                ),
            }
        })?;

        let io_err = |source| DownloadError::Io {
            url: url.to_string(),
            source,
        };
        let tmp = NamedTempFile::new_in(dir).map_err(io_err)?;
        let mut out = tokio::fs::File::from_std(tmp.reopen().map_err(io_err)?);

        let pb = match resp.content_length() {
            Some(len) => ProgressBar::new(len),
            None => ProgressBar::new_spinner(),
        };
        if let Ok(style) =
            ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] {bytes} ({bytes_per_sec}) {msg}")
        {
            pb.set_style(style);
        }
        pb.set_message(url.to_string());

        let mut bytes = 0u64;
        let mut stream = resp.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| FetchError::from_reqwest(url, e))?;
            out.write_all(&chunk).await.map_err(io_err)?;
            bytes += chunk.len() as u64;
            pb.set_position(bytes);
        }
        out.flush().await.map_err(io_err)?;
        pb.finish_and_clear();

        if bytes == 0 {
            return Err(DownloadError::Rejected {
                url: url.to_string(),
                reason: "empty body".to_string(),
            });
        }

        info!("Downloaded {} bytes ({}) from {}", bytes, kind.extension(), url);
        Ok(DownloadedFile {
            url: url.to_string(),
            kind,
            bytes,
            file: tmp,
        })
    }
}

fn is_refusal(status: StatusCode) -> bool {
    status == StatusCode::FORBIDDEN || status == StatusCode::UNAUTHORIZED
}

fn check_status(url: &str, status: StatusCode) -> Result<(), FetchError> {
    if is_refusal(status) {
        Err(FetchError::Forbidden {
            url: url.to_string(),
            reason: format!("HTTP {}", status.as_u16()),
        })
    } else if !status.is_success() {
        Err(FetchError::Network {
            url: url.to_string(),
            reason: format!("HTTP {}", status.as_u16()),
        })
    } else {
        Ok(())
    }
}

async fn read_body(url: &str, resp: Response) -> Result<FetchResult, FetchError> {
    let status = resp.status().as_u16();
    let content_kind = match resp.headers().get(header::CONTENT_TYPE) {
        Some(ct) if ct.to_str().unwrap_or_default().contains("json") => ContentKind::Json,
        _ => ContentKind::Html,
    };
    let body = resp
        .text()
        .await
        .map_err(|e| FetchError::from_reqwest(url, e))?;
    Ok(FetchResult {
        url: url.to_string(),
        status,
        content_kind,
        body,
    })
}

// ── Tests ──
