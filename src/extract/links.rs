use std::sync::LazyLock;

use itertools::Itertools;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;
use url::Url;

static BASE_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("base[href]").unwrap());
static ANCHOR_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a").unwrap());
static CONTROL_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a, button").unwrap());

const FILE_EXTENSIONS: &[&str] = &[".csv", ".xlsx", ".xls"];

/// English and Spanish wording for download/export controls.
pub const DOWNLOAD_WORDS: &[&str] = &["download", "descargar", "descarga"];
pub const EXPORT_WORDS: &[&str] = &["export", "exportar"];

/// Lowercased visible text plus `aria-label` and `title`.
fn accessible_text(el: ElementRef<'_>) -> String {
    let mut text = el.text().collect::<String>();
    for attr in ["aria-label", "title"] {
        if let Some(v) = el.value().attr(attr) {
            text.push(' ');
            text.push_str(v);
        }
    }
    text.to_lowercase()
}

fn mentions_any(text: &str, words: &[&str]) -> bool {
    words.iter().any(|w| text.contains(w))
}

/// Whether a control's class or text says it downloads or exports something.
pub fn is_download_control(class: Option<&str>, text: &str) -> bool {
    let text = text.to_lowercase();
    class.is_some_and(|c| c.to_lowercase().contains("download"))
        || mentions_any(&text, DOWNLOAD_WORDS)
        || mentions_any(&text, EXPORT_WORDS)
}

fn href_of(el: ElementRef<'_>) -> Option<&str> {
    let v = el.value();
    v.attr("href").or_else(|| v.attr("data-href")).or_else(|| v.attr("data-url"))
}

fn resolve(base: &Url, href: &str) -> Option<Url> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') {
        return None;
    }
    match base.join(href) {
        Ok(u) if matches!(u.scheme(), "http" | "https") => Some(u),
        Ok(u) => {
            debug!("Skipping non-http link {}", u);
            None
        }
        Err(e) => {
            debug!("Skipping unparseable link {:?}: {}", href, e);
            None
        }
    }
}

/// Candidate download URLs in priority order, resolved and deduplicated.
///
/// Order: anchors pointing at spreadsheet files, controls with a `download`
/// class, then anchors whose text mentions download, then export.
pub fn harvest(html: &str, page_url: &Url) -> Vec<Url> {
    let doc = Html::parse_document(html);

    let base = doc
        .select(&BASE_SEL)
        .next()
        .and_then(|b| b.value().attr("href"))
        .and_then(|href| page_url.join(href).ok())
        .unwrap_or_else(|| page_url.clone());

    let anchors: Vec<(ElementRef<'_>, String)> =
        doc.select(&ANCHOR_SEL).map(|a| (a, accessible_text(a))).collect();

    let by_extension = anchors
        .iter()
        .filter(|(a, _)| {
            a.value()
                .attr("href")
                .is_some_and(|h| mentions_any(&h.to_lowercase(), FILE_EXTENSIONS))
        })
        .map(|(a, _)| *a);
    let by_class = doc.select(&CONTROL_SEL).filter(|el| {
        el.value()
            .attr("class")
            .is_some_and(|c| c.to_lowercase().contains("download"))
    });
    let by_download_text = anchors
        .iter()
        .filter(|(_, text)| mentions_any(text, DOWNLOAD_WORDS))
        .map(|(a, _)| *a);
    let by_export_text = anchors
        .iter()
        .filter(|(_, text)| mentions_any(text, EXPORT_WORDS))
        .map(|(a, _)| *a);

    by_extension
        .chain(by_class)
        .chain(by_download_text)
        .chain(by_export_text)
        .filter_map(|el| href_of(el).and_then(|href| resolve(&base, href)))
        .unique()
        .collect()
}
