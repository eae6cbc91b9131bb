//! Built-in sources and their fixed sample fallbacks.

use crate::extract::{Record, Table, Unit};
use crate::normalize::records_to_table;

/// Count vocabulary for the pet-adoption statistics page.
pub const PET_COUNT_WORDS: &[&str] = &["homes?", "pupp(?:y|ies)", "kittens?", "animals?", "pets?"];

#[derive(Debug, Clone)]
pub struct StatsPageSource {
    pub name: &'static str,
    pub url: &'static str,
    /// Output file stem.
    pub dataset_name: &'static str,
    pub count_words: &'static [&'static str],
}

#[derive(Debug, Clone)]
pub struct PortalSource {
    pub name: &'static str,
    pub api_url: &'static str,
    pub web_url: &'static str,
    /// Used when the web page has no usable heading.
    pub fallback_title: &'static str,
}

#[derive(Debug, Clone)]
pub enum Source {
    StatsPage(StatsPageSource),
    Portal(PortalSource),
}

impl Source {
    pub fn name(&self) -> &'static str {
        match self {
            Source::StatsPage(s) => s.name,
            Source::Portal(p) => p.name,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Source::StatsPage(s) => format!("stats page {}", s.url),
            Source::Portal(p) => format!("data portal {}", p.web_url),
        }
    }

    /// Placeholder output for when every real stage failed.
    pub fn sample(&self) -> Table {
        match self {
            Source::StatsPage(_) => records_to_table(&stats_sample()),
            Source::Portal(_) => portal_sample(),
        }
    }
}

pub fn builtin() -> Vec<Source> {
    vec![
        Source::StatsPage(StatsPageSource {
            name: "worldmetrics-motherless-homes",
            url: "https://worldmetrics.org/motherless-homes-statistics/",
            dataset_name: "motherless_homes_statistics",
            count_words: PET_COUNT_WORDS,
        }),
        Source::Portal(PortalSource {
            name: "datos-gov-co-mistrato",
            api_url: "https://www.datos.gov.co/api/v3/views/ie2a-j7h9/query.json",
            web_url: "https://www.datos.gov.co/Funci-n-p-blica/Activos-de-Informaci-n-Alcald-a-de-Mistrat-/ie2a-j7h9/about_data",
            fallback_title: "Activos-de-Informacion-Alcaldia-de-Mistrat",
        }),
    ]
}

pub fn find(name: &str) -> Option<Source> {
    builtin().into_iter().find(|s| s.name() == name)
}

fn stats_sample() -> Vec<Record> {
    [
        ("Sample placeholder: 0% of homes surveyed", "0", Unit::Percentage),
        ("Sample placeholder: $0 average cost", "0", Unit::Dollars),
        ("Sample placeholder: 0 animals counted", "0", Unit::Count),
    ]
    .into_iter()
    .enumerate()
    .map(|(i, (description, value, unit))| Record {
        category: "Sample".to_string(),
        index: i as u32 + 1,
        description: description.to_string(),
        value: value.to_string(),
        unit,
    })
    .collect()
}

fn portal_sample() -> Table {
    let row = |cells: [&str; 5]| cells.iter().map(|c| c.to_string()).collect::<Vec<_>>();
    Table::new(
        row(["ID", "Nombre", "Tipo", "Valor", "Fecha"]),
        vec![
            row(["1", "Activo 1", "Equipo", "1000000", "2024-01-01"]),
            row(["2", "Activo 2", "Mobiliario", "500000", "2024-01-02"]),
            row(["3", "Activo 3", "Vehiculo", "25000000", "2024-01-03"]),
        ],
    )
}
