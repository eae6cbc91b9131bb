use std::time::Instant;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::element::Element;
use chromiumoxide::page::Page;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{DriverError, ElementHandle, PageDriver, QuietTracker, Settle};
use crate::settings::Settings;

/// `[document.readyState, number of resources the page has fetched]`
const READY_PROBE: &str =
    "[document.readyState, performance.getEntriesByType('resource').length]";

fn browser_err(e: impl std::fmt::Display) -> DriverError {
    DriverError::Browser(e.to_string())
}

/// Headless Chromium behind the page-driver interface.
///
/// Owns the browser process; `close` shuts it down and dropping the driver
/// kills it if `close` was never reached.
pub struct ChromiumDriver {
    browser: Browser,
    page: Page,
    handler: JoinHandle<()>,
    settle: Settle,
    current: Option<String>,
    closed: bool,
}

impl ChromiumDriver {
    pub async fn launch(settings: &Settings) -> Result<Self, DriverError> {
        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .arg("--disable-dev-shm-usage")
            .arg("--disable-gpu")
            .request_timeout(settings.timeout());
        if let Some(path) = &settings.chrome_path {
            builder = builder.chrome_executable(path);
        }
        let config = builder.build().map_err(DriverError::Launch)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| DriverError::Launch(e.to_string()))?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let page = browser.new_page("about:blank").await.map_err(browser_err)?;
        info!("Chromium launched");

        Ok(ChromiumDriver {
            browser,
            page,
            handler,
            settle: Settle::from_settings(settings),
            current: None,
            closed: false,
        })
    }

    async fn wait_settled(&self) {
        match self.settle {
            Settle::Fixed(delay) => tokio::time::sleep(delay).await,
            Settle::Ready {
                poll,
                quiet_polls,
                timeout,
            } => {
                let start = Instant::now();
                let mut tracker = QuietTracker::default();
                loop {
                    let probe = match self.page.evaluate(READY_PROBE).await {
                        Ok(v) => v.into_value::<(String, u64)>().ok(),
                        Err(e) => {
                            debug!("Readiness probe failed: {}", e);
                            None
                        }
                    };
                    if let Some((state, resources)) = probe {
                        if tracker.observe(&state, resources, quiet_polls) {
                            debug!("Page settled after {:?}", start.elapsed());
                            return;
                        }
                    }
                    if start.elapsed() >= timeout {
                        warn!("Page did not settle within {:?}, reading it anyway", timeout);
                        return;
                    }
                    tokio::time::sleep(poll).await;
                }
            }
        }
    }

    async fn resolve(&self, element: &ElementHandle) -> Result<Element, DriverError> {
        let mut found = self
            .page
            .find_elements(element.selector.as_str())
            .await
            .map_err(browser_err)?;
        if element.index < found.len() {
            Ok(found.swap_remove(element.index))
        } else {
            Err(DriverError::StaleElement {
                selector: element.selector.clone(),
                index: element.index,
            })
        }
    }
}

#[async_trait(?Send)]
impl PageDriver for ChromiumDriver {
    async fn navigate(&mut self, url: &str) -> Result<(), DriverError> {
        info!("Navigating to {}", url);
        self.page
            .goto(url)
            .await
            .map_err(|e| DriverError::Navigation {
                url: url.to_string(),
                reason: e.to_string(),
            })?;
        self.wait_settled().await;
        self.current = Some(url.to_string());
        Ok(())
    }

    async fn find_all(&mut self, selector: &str) -> Result<Vec<ElementHandle>, DriverError> {
        let quoted = serde_json::to_string(selector).map_err(browser_err)?;
        let script = format!(
            "Array.from(document.querySelectorAll({quoted})).map(e => e.tagName.toLowerCase())"
        );
        let tags: Vec<String> = self
            .page
            .evaluate(script)
            .await
            .map_err(|_| DriverError::Selector(selector.to_string()))?
            .into_value()
            .map_err(browser_err)?;
        Ok(tags
            .into_iter()
            .enumerate()
            .map(|(index, tag)| ElementHandle {
                selector: selector.to_string(),
                index,
                tag,
            })
            .collect())
    }

    async fn read_text(&mut self, element: &ElementHandle) -> Result<String, DriverError> {
        let el = self.resolve(element).await?;
        Ok(el.inner_text().await.map_err(browser_err)?.unwrap_or_default())
    }

    async fn attribute(
        &mut self,
        element: &ElementHandle,
        name: &str,
    ) -> Result<Option<String>, DriverError> {
        let el = self.resolve(element).await?;
        el.attribute(name).await.map_err(browser_err)
    }

    async fn click(&mut self, element: &ElementHandle) -> Result<(), DriverError> {
        let el = self.resolve(element).await?;
        el.click().await.map_err(browser_err)?;
        self.wait_settled().await;
        Ok(())
    }

    async fn content(&mut self) -> Result<String, DriverError> {
        if self.current.is_none() {
            return Err(DriverError::NoPage);
        }
        self.page.content().await.map_err(browser_err)
    }

    fn current_url(&self) -> Option<&str> {
        self.current.as_deref()
    }

    fn interactive(&self) -> bool {
        true
    }

    async fn close(&mut self) -> Result<(), DriverError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let closed = self.browser.close().await.map_err(browser_err);
        let _ = self.browser.wait().await;
        self.handler.abort();
        info!("Chromium closed");
        closed.map(|_| ())
    }
}

impl Drop for ChromiumDriver {
    fn drop(&mut self) {
        if !self.closed {
            warn!("Chromium driver dropped without close; killing browser");
        }
        self.handler.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[ignore] // needs a local Chromium
    async fn renders_and_queries_data_url() {
        let settings = Settings::default();
        let mut driver = ChromiumDriver::launch(&settings).await.expect("launch");
        driver
            .navigate("data:text/html,<h1>Datos</h1><table><tr><td>1</td></tr></table>")
            .await
            .expect("navigate");

        let h1 = driver.find_all("h1").await.expect("find_all");
        assert_eq!(h1.len(), 1);
        assert_eq!(driver.read_text(&h1[0]).await.unwrap(), "Datos");
        assert!(driver.content().await.unwrap().contains("<td>1</td>"));

        driver.close().await.expect("close");
        driver.close().await.expect("second close is a no-op");
    }
}
