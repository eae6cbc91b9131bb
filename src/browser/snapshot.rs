use std::collections::HashMap;

use async_trait::async_trait;
use scraper::{Html, Selector};
use tracing::info;

use super::{DriverError, ElementHandle, PageDriver};
use crate::fetch::HttpFetcher;

/// Page driver over plain HTML: either fetched over HTTP (`--no-browser`) or
/// recorded ahead of time. Nothing is executed, so clicks are unsupported.
pub struct SnapshotDriver {
    fetcher: Option<HttpFetcher>,
    recorded: HashMap<String, String>,
    current: Option<(String, String)>,
}

impl SnapshotDriver {
    pub fn http(fetcher: HttpFetcher) -> Self {
        SnapshotDriver {
            fetcher: Some(fetcher),
            recorded: HashMap::new(),
            current: None,
        }
    }

    /// Driver that serves fixed HTML per URL.
    pub fn recorded<I, K, V>(pages: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        SnapshotDriver {
            fetcher: None,
            recorded: pages.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
            current: None,
        }
    }

    fn html(&self) -> Result<&str, DriverError> {
        self.current
            .as_ref()
            .map(|(_, html)| html.as_str())
            .ok_or(DriverError::NoPage)
    }

    fn with_element<T>(
        &self,
        element: &ElementHandle,
        f: impl FnOnce(scraper::ElementRef<'_>) -> T,
    ) -> Result<T, DriverError> {
        let doc = Html::parse_document(self.html()?);
        let sel = parse_selector(&element.selector)?;
        let found = doc.select(&sel).nth(element.index).ok_or_else(|| DriverError::StaleElement {
            selector: element.selector.clone(),
            index: element.index,
        })?;
        Ok(f(found))
    }
}

fn parse_selector(selector: &str) -> Result<Selector, DriverError> {
    Selector::parse(selector).map_err(|_| DriverError::Selector(selector.to_string()))
}

#[async_trait(?Send)]
impl PageDriver for SnapshotDriver {
    async fn navigate(&mut self, url: &str) -> Result<(), DriverError> {
        let html = match (self.recorded.get(url), &self.fetcher) {
            (Some(html), _) => html.clone(),
            (None, Some(fetcher)) => fetcher.fetch_page(url).await?.body,
            (None, None) => {
                return Err(DriverError::Navigation {
                    url: url.to_string(),
                    reason: "no recorded page".to_string(),
                })
            }
        };
        info!("Loaded snapshot of {} ({} bytes)", url, html.len());
        self.current = Some((url.to_string(), html));
        Ok(())
    }

    async fn find_all(&mut self, selector: &str) -> Result<Vec<ElementHandle>, DriverError> {
        let doc = Html::parse_document(self.html()?);
        let sel = parse_selector(selector)?;
        Ok(doc
            .select(&sel)
            .enumerate()
            .map(|(index, el)| ElementHandle {
                selector: selector.to_string(),
                index,
                tag: el.value().name().to_string(),
            })
            .collect())
    }

    async fn read_text(&mut self, element: &ElementHandle) -> Result<String, DriverError> {
        self.with_element(element, |el| el.text().collect::<String>())
    }

    async fn attribute(
        &mut self,
        element: &ElementHandle,
        name: &str,
    ) -> Result<Option<String>, DriverError> {
        self.with_element(element, |el| el.value().attr(name).map(str::to_string))
    }

    async fn click(&mut self, _element: &ElementHandle) -> Result<(), DriverError> {
        Err(DriverError::Unsupported("click"))
    }

    async fn content(&mut self) -> Result<String, DriverError> {
        self.html().map(str::to_string)
    }

    fn current_url(&self) -> Option<&str> {
        self.current.as_ref().map(|(url, _)| url.as_str())
    }

    fn interactive(&self) -> bool {
        false
    }

    async fn close(&mut self) -> Result<(), DriverError> {
        self.current = None;
        Ok(())
    }
}
