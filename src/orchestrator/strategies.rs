use async_trait::async_trait;
use tracing::{debug, info, warn};
use url::Url;

use super::{RunContext, SourceKind, Strategy};
use crate::browser::{DriverError, PageDriver};
use crate::extract::stats::Vocabulary;
use crate::extract::{api, links, stats, table, ExtractError, Payload, Table};
use crate::fetch::ContentKind;

/// Open-data JSON API.
pub struct ApiStrategy {
    pub url: String,
}

#[async_trait(?Send)]
impl Strategy for ApiStrategy {
    fn kind(&self) -> SourceKind {
        SourceKind::Api
    }

    async fn attempt(&mut self, ctx: &mut RunContext<'_>) -> Result<Payload, ExtractError> {
        let result = ctx.fetcher.fetch_api(&self.url).await?;
        let table = api::decode(&result.body)?;
        Ok(Payload::Api {
            table,
            raw_json: result.body,
        })
    }
}

/// Static statistics page, regex-extracted.
pub struct PageStrategy {
    pub url: String,
    pub vocab: Vocabulary,
}

#[async_trait(?Send)]
impl Strategy for PageStrategy {
    fn kind(&self) -> SourceKind {
        SourceKind::WebPage
    }

    async fn attempt(&mut self, ctx: &mut RunContext<'_>) -> Result<Payload, ExtractError> {
        let page = ctx.fetcher.fetch_page(&self.url).await?;
        if page.content_kind != ContentKind::Html {
            return Err(ExtractError::Parse(format!("{} did not return HTML", page.url)));
        }
        let records = stats::extract(&page.body, &self.vocab);
        info!("Extracted {} statistics from {}", records.len(), page.url);
        Ok(Payload::Records(records))
    }
}

async fn ensure_page(driver: &mut dyn PageDriver, url: &str) -> Result<(), DriverError> {
    if driver.current_url() != Some(url) {
        driver.navigate(url).await?;
    }
    Ok(())
}

/// First table on the rendered portal page.
pub struct TableStrategy {
    pub web_url: String,
}

#[async_trait(?Send)]
impl Strategy for TableStrategy {
    fn kind(&self) -> SourceKind {
        SourceKind::WebTable
    }

    async fn attempt(&mut self, ctx: &mut RunContext<'_>) -> Result<Payload, ExtractError> {
        let driver = ctx.driver()?;
        ensure_page(driver, &self.web_url).await?;
        let html = driver.content().await?;
        let table = table::extract(&html);
        info!("Table has {} columns and {} rows", table.headers.len(), table.rows.len());
        Ok(Payload::Table(table))
    }
}

/// Download links on the portal page, downloaded in priority order.
pub struct LinksStrategy {
    pub web_url: String,
}

/// Click each download/export button once until one reveals candidates.
async fn reveal_by_clicking(driver: &mut dyn PageDriver, page_url: &Url) -> Vec<Url> {
    let buttons = match driver.find_all("button").await {
        Ok(b) => b,
        Err(e) => {
            warn!("Could not list buttons: {}", e);
            return Vec::new();
        }
    };

    for button in &buttons {
        let class = driver.attribute(button, "class").await.ok().flatten();
        let text = driver.read_text(button).await.unwrap_or_default();
        if !links::is_download_control(class.as_deref(), &text) {
            continue;
        }

        info!("Clicking {:?} to reveal download links", text.trim());
        if let Err(e) = driver.click(button).await {
            warn!("Click on button {} failed: {}", button.index, e);
            continue;
        }
        match driver.content().await {
            Ok(html) => {
                let found = links::harvest(&html, page_url);
                if !found.is_empty() {
                    return found;
                }
                debug!("Button {} revealed nothing", button.index);
            }
            Err(e) => warn!("Could not read page after click: {}", e),
        }
    }
    Vec::new()
}

#[async_trait(?Send)]
impl Strategy for LinksStrategy {
    fn kind(&self) -> SourceKind {
        SourceKind::WebLinks
    }

    async fn attempt(&mut self, ctx: &mut RunContext<'_>) -> Result<Payload, ExtractError> {
        let fetcher = ctx.fetcher;
        let out_dir = ctx.out_dir;
        let page_url = Url::parse(&self.web_url).map_err(|e| ExtractError::Parse(e.to_string()))?;

        let driver = ctx.driver()?;
        ensure_page(driver, &self.web_url).await?;
        let html = driver.content().await?;
        let mut candidates = links::harvest(&html, &page_url);
        if candidates.is_empty() && driver.interactive() {
            candidates = reveal_by_clicking(driver, &page_url).await;
        }

        if candidates.is_empty() {
            info!("No download links on {}", self.web_url);
            return Ok(Payload::Empty);
        }

        let total = candidates.len();
        info!("Found {} download candidate(s)", total);
        for (i, url) in candidates.iter().enumerate() {
            match fetcher.download(url.as_str(), out_dir).await {
                Ok(file) => {
                    return Ok(Payload::Download {
                        index: i + 1,
                        file,
                    })
                }
                Err(e) => warn!("Candidate {}/{} failed: {}", i + 1, total, e),
            }
        }
        Ok(Payload::Empty)
    }
}

/// Fixed placeholder data; always last in a plan.
pub struct SampleStrategy {
    pub table: Table,
}

#[async_trait(?Send)]
impl Strategy for SampleStrategy {
    fn kind(&self) -> SourceKind {
        SourceKind::Sample
    }

    async fn attempt(&mut self, _ctx: &mut RunContext<'_>) -> Result<Payload, ExtractError> {
        warn!("Falling back to sample data");
        Ok(Payload::Sample(self.table.clone()))
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::browser::{ElementHandle, SnapshotDriver};
    use crate::fetch::HttpFetcher;
    use crate::orchestrator::{Orchestrator, Outcome};
    use crate::settings::Settings;
    use crate::sources::PET_COUNT_WORDS;

    const WEB_URL: &str = "https://www.datos.gov.co/Funcion-publica/Activos/ie2a-j7h9/about_data";

    fn fetcher() -> HttpFetcher {
        let settings = Settings {
            request_delay_ms: 0,
            ..Settings::default()
        };
        HttpFetcher::new(&settings).unwrap()
    }

    fn fixture(name: &str) -> String {
        std::fs::read_to_string(format!("tests/fixtures/{name}")).unwrap()
    }

    fn sample() -> Table {
        Table::new(vec!["ID".into()], vec![vec!["1".into()]])
    }

    fn portal_plan(server: &MockServer) -> Vec<Box<dyn Strategy>> {
        vec![
            Box::new(ApiStrategy {
                url: format!("{}/api/query.json", server.uri()),
            }),
            Box::new(TableStrategy {
                web_url: WEB_URL.into(),
            }),
            Box::new(LinksStrategy {
                web_url: WEB_URL.into(),
            }),
            Box::new(SampleStrategy { table: sample() }),
        ]
    }

    async fn forbidden_api() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(path("/api/query.json"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;
        server
    }

    #[tokio::test]
    async fn forbidden_api_falls_through_to_rendered_table() {
        let server = forbidden_api().await;
        let fetcher = fetcher();
        let dir = tempfile::tempdir().unwrap();
        let mut driver = SnapshotDriver::recorded([(WEB_URL, fixture("portal_table.html"))]);
        let mut ctx = RunContext {
            fetcher: &fetcher,
            driver: Some(&mut driver),
            out_dir: dir.path(),
        };

        let report = Orchestrator::new(portal_plan(&server)).run(&mut ctx).await;

        assert_eq!(report.attempts.len(), 2);
        assert!(matches!(report.attempts[0].outcome, Outcome::Error(_)));
        let winner = report.winner.unwrap();
        assert_eq!(winner.source, SourceKind::WebTable);
        match winner.payload {
            Payload::Table(t) => assert_eq!(t.rows.len(), 2),
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[tokio::test]
    async fn page_without_table_or_links_ends_in_sample() {
        let server = forbidden_api().await;
        let fetcher = fetcher();
        let dir = tempfile::tempdir().unwrap();
        let mut driver = SnapshotDriver::recorded([(WEB_URL, fixture("portal_empty.html"))]);
        let mut ctx = RunContext {
            fetcher: &fetcher,
            driver: Some(&mut driver),
            out_dir: dir.path(),
        };

        let report = Orchestrator::new(portal_plan(&server)).run(&mut ctx).await;

        let outcomes: Vec<_> = report.attempts.iter().map(|a| (a.source, a.outcome.clone())).collect();
        assert_eq!(outcomes[1], (SourceKind::WebTable, Outcome::Empty));
        assert_eq!(outcomes[2], (SourceKind::WebLinks, Outcome::Empty));
        assert_eq!(report.winner.unwrap().source, SourceKind::Sample);
    }

    #[tokio::test]
    async fn links_skip_failing_candidates() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/files/broken.csv"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/files/good.csv"))
            .respond_with(ResponseTemplate::new(200).set_body_string("a,b\n1,2\n"))
            .mount(&server)
            .await;

        let page_url = format!("{}/dataset", server.uri());
        let html = r#"<a href="/files/broken.csv">CSV</a><a href="/files/good.csv">CSV</a>"#;
        let fetcher = fetcher();
        let dir = tempfile::tempdir().unwrap();
        let mut driver = SnapshotDriver::recorded([(page_url.clone(), html.to_string())]);
        let mut ctx = RunContext {
            fetcher: &fetcher,
            driver: Some(&mut driver),
            out_dir: dir.path(),
        };

        let mut stage = LinksStrategy { web_url: page_url };
        match stage.attempt(&mut ctx).await.unwrap() {
            Payload::Download { index, file } => {
                assert_eq!(index, 2);
                assert_eq!(file.bytes, 8);
            }
            other => panic!("unexpected payload {other:?}"),
        }
    }

    /// Interactive driver over a fixed set of buttons. Clicking `fails_on`
    /// errors; clicking `reveals_on` swaps in `revealed`.
    struct ButtonPage {
        url: String,
        html: String,
        buttons: Vec<(&'static str, &'static str)>,
        fails_on: usize,
        reveals_on: usize,
        revealed: String,
        clicked: Vec<usize>,
    }

    #[async_trait(?Send)]
    impl PageDriver for ButtonPage {
        async fn navigate(&mut self, url: &str) -> Result<(), DriverError> {
            assert_eq!(url, self.url);
            Ok(())
        }
        async fn find_all(&mut self, selector: &str) -> Result<Vec<ElementHandle>, DriverError> {
            assert_eq!(selector, "button");
            Ok((0..self.buttons.len())
                .map(|index| ElementHandle {
                    selector: selector.to_string(),
                    index,
                    tag: "button".to_string(),
                })
                .collect())
        }
        async fn read_text(&mut self, element: &ElementHandle) -> Result<String, DriverError> {
            Ok(self.buttons[element.index].1.to_string())
        }
        async fn attribute(
            &mut self,
            element: &ElementHandle,
            name: &str,
        ) -> Result<Option<String>, DriverError> {
            Ok((name == "class").then(|| self.buttons[element.index].0.to_string()))
        }
        async fn click(&mut self, element: &ElementHandle) -> Result<(), DriverError> {
            self.clicked.push(element.index);
            if element.index == self.fails_on {
                return Err(DriverError::Browser("node is detached".into()));
            }
            if element.index == self.reveals_on {
                self.html = self.revealed.clone();
            }
            Ok(())
        }
        async fn content(&mut self) -> Result<String, DriverError> {
            Ok(self.html.clone())
        }
        fn current_url(&self) -> Option<&str> {
            Some(self.url.as_str())
        }
        fn interactive(&self) -> bool {
            true
        }
        async fn close(&mut self) -> Result<(), DriverError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn clicking_download_buttons_reveals_links() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/files/rows.csv"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ID\n1\n"))
            .mount(&server)
            .await;

        let mut driver = ButtonPage {
            url: format!("{}/dataset", server.uri()),
            html: "<h1>Activos</h1><button>Compartir</button>".to_string(),
            buttons: vec![
                ("btn", "Compartir"),
                ("btn export-menu", "Exportar"),
                ("btn", "Descargar datos"),
                ("btn download", "CSV"),
            ],
            fails_on: 1,
            reveals_on: 2,
            revealed: r#"<a href="/files/rows.csv">CSV</a>"#.to_string(),
            clicked: Vec::new(),
        };
        let fetcher = fetcher();
        let dir = tempfile::tempdir().unwrap();
        let web_url = driver.url.clone();
        let mut ctx = RunContext {
            fetcher: &fetcher,
            driver: Some(&mut driver),
            out_dir: dir.path(),
        };

        let mut stage = LinksStrategy { web_url };
        let payload = stage.attempt(&mut ctx).await.unwrap();
        drop(ctx);

        match payload {
            Payload::Download { index, file } => {
                assert_eq!(index, 1);
                assert!(file.url.ends_with("/files/rows.csv"));
                assert_eq!(file.bytes, 5);
            }
            other => panic!("unexpected payload {other:?}"),
        }
        // "Compartir" is skipped, the failing click moves on, and the
        // loop stops at the first button that reveals a link.
        assert_eq!(driver.clicked, vec![1, 2]);
    }

    #[tokio::test]
    async fn driver_stages_need_a_driver() {
        let fetcher = fetcher();
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = RunContext {
            fetcher: &fetcher,
            driver: None,
            out_dir: dir.path(),
        };
        let mut stage = TableStrategy {
            web_url: WEB_URL.into(),
        };
        assert!(matches!(stage.attempt(&mut ctx).await, Err(ExtractError::NoDriver)));
    }

    #[tokio::test]
    async fn stats_page_yields_records() {
        let server = MockServer::start().await;
        Mock::given(path("/stats"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/html; charset=utf-8")
                    .set_body_string(fixture("stats_page.html")),
            )
            .mount(&server)
            .await;

        let fetcher = fetcher();
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = RunContext {
            fetcher: &fetcher,
            driver: None,
            out_dir: dir.path(),
        };
        let mut stage = PageStrategy {
            url: format!("{}/stats", server.uri()),
            vocab: Vocabulary::new(PET_COUNT_WORDS).unwrap(),
        };
        let payload = stage.attempt(&mut ctx).await.unwrap();
        assert!(matches!(payload, Payload::Records(ref r) if !r.is_empty()));
    }
}
