//! Regex extraction of statistic claims from a static stats page.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use super::{Record, Unit};
use crate::utils::clean_text;

static KEY_FINDINGS_SEL: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(r"ul.space-y-4 li p.text-base.sm\:text-lg.text-gray-800.leading-relaxed").unwrap()
});
static P_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("p").unwrap());
static HEADING_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("h2, h3").unwrap());

static PERCENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+(?:,\d+)*(?:\.\d+)?)\s*%").unwrap());
static DOLLAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\s?(\d+(?:,\d+)*(?:\.\d+)?)").unwrap());
static NUMBER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d+(?:,\d+)*(?:\.\d+)?)").unwrap());
static TIME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:days?|weeks?|months?|years?)\b").unwrap());

pub const KEY_FINDINGS: &str = "Key Findings";
pub const SLIDESHOW: &str = "Slideshow Statistics";
pub const CONTENT: &str = "Content Statistics";

const MIN_ITEM_LEN: usize = 10;
const MIN_PARAGRAPH_LEN: usize = 20;

/// Domain words that make a number a head count ("homes", "pets", ...).
#[derive(Debug, Clone)]
pub struct Vocabulary {
    count: Regex,
    statistic: Regex,
}

impl Vocabulary {
    /// `words` are regex fragments, e.g. `"homes?"`, `"pupp(?:y|ies)"`.
    pub fn new(words: &[&str]) -> Result<Self, regex::Error> {
        let alternation = words.join("|");
        let count = Regex::new(&format!(r"(?i)\b(?:{alternation})\b"))?;
        let statistic = Regex::new(&format!(
            r"(?i)\d+(?:\.\d+)?\s*%|\$\s?\d+|\d+(?:,\d+)*\s*(?:{alternation})\b"
        ))?;
        Ok(Vocabulary { count, statistic })
    }

    pub fn looks_statistical(&self, text: &str) -> bool {
        self.statistic.is_match(text)
    }
}

/// Percentage, then dollar amount, then any number; `"N/A"` otherwise.
pub fn extract_value(text: &str) -> String {
    if let Some(c) = PERCENT_RE.captures(text) {
        return c[1].replace(',', "");
    }
    if let Some(c) = DOLLAR_RE.captures(text) {
        return c[1].replace(',', "");
    }
    if let Some(c) = NUMBER_RE.captures(text) {
        return c[1].replace(',', "");
    }
    "N/A".to_string()
}

pub fn extract_unit(text: &str, vocab: &Vocabulary) -> Unit {
    if text.contains('%') {
        Unit::Percentage
    } else if text.contains('$') {
        Unit::Dollars
    } else if TIME_RE.is_match(text) {
        Unit::Time
    } else if vocab.count.is_match(text) {
        Unit::Count
    } else {
        Unit::Ratio
    }
}

/// Accumulates records, numbering each category from 1 without gaps no
/// matter how many passes add to it.
struct Collector<'v> {
    vocab: &'v Vocabulary,
    counters: HashMap<String, u32>,
    records: Vec<Record>,
}

impl<'v> Collector<'v> {
    fn new(vocab: &'v Vocabulary) -> Self {
        Collector {
            vocab,
            counters: HashMap::new(),
            records: Vec::new(),
        }
    }

    fn push(&mut self, category: &str, text: &str, min_len: usize) {
        if text.is_empty() || text.chars().count() < min_len {
            return;
        }
        let counter = self.counters.entry(category.to_string()).or_insert(0);
        *counter += 1;
        self.records.push(Record {
            category: category.to_string(),
            index: *counter,
            description: text.to_string(),
            value: extract_value(text),
            unit: extract_unit(text, self.vocab),
        });
    }
}

fn element_text(el: ElementRef<'_>) -> String {
    clean_text(&el.text().collect::<String>())
}

fn inside_statistic_block(p: ElementRef<'_>) -> bool {
    p.ancestors()
        .filter_map(ElementRef::wrap)
        .any(|a| a.value().name() == "div" && a.text().any(|t| t.contains("Statistic")))
}

pub fn extract(html: &str, vocab: &Vocabulary) -> Vec<Record> {
    let doc = Html::parse_document(html);
    let mut out = Collector::new(vocab);

    for el in doc.select(&KEY_FINDINGS_SEL) {
        out.push(KEY_FINDINGS, &element_text(el), MIN_ITEM_LEN);
    }

    let paragraphs: Vec<(ElementRef<'_>, String)> =
        doc.select(&P_SEL).map(|p| (p, element_text(p))).collect();

    for (p, text) in &paragraphs {
        if inside_statistic_block(*p) {
            out.push(SLIDESHOW, text, MIN_ITEM_LEN);
        }
    }

    for heading in doc.select(&HEADING_SEL) {
        let title = element_text(heading);
        if title.is_empty() {
            continue;
        }
        let needle = title.to_lowercase();
        for (_, text) in &paragraphs {
            if text.to_lowercase().contains(&needle) {
                out.push(&title, text, MIN_ITEM_LEN);
            }
        }
    }

    for (_, text) in &paragraphs {
        if vocab.looks_statistical(text) {
            out.push(CONTENT, text, MIN_PARAGRAPH_LEN);
        }
    }

    out.records
}

// ── Tests ──
