//! First table-like element of a rendered page → `Table`.

use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};

use super::{synth_headers, Table};
use crate::utils::clean_text;

/// Tried in order; the first selector with a match wins.
const TABLE_SELECTORS: &[&str] = &[".socrata-table table", "table", "[role='table']", "[role='grid']"];

static TR_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("tr").unwrap());
static ARIA_HEADER_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("[role='columnheader']").unwrap());
static ARIA_ROW_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("[role='row']").unwrap());
static ARIA_CELL_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("[role='cell'], [role='gridcell']").unwrap());

fn first_table(doc: &Html) -> Option<ElementRef<'_>> {
    TABLE_SELECTORS.iter().find_map(|s| {
        let sel = Selector::parse(s).ok()?;
        doc.select(&sel).next()
    })
}

fn nearest_table(el: ElementRef<'_>) -> Option<ElementRef<'_>> {
    el.ancestors()
        .filter_map(ElementRef::wrap)
        .find(|a| a.value().name() == "table")
}

/// `<thead>` of the row's own table, not of an enclosing one.
fn in_own_thead(tr: ElementRef<'_>) -> bool {
    tr.ancestors()
        .filter_map(ElementRef::wrap)
        .take_while(|a| a.value().name() != "table")
        .any(|a| a.value().name() == "thead")
}

/// Direct `td`/`th` children only; nested tables stay inside their cell.
fn own_cells(row: ElementRef<'_>) -> Vec<ElementRef<'_>> {
    row.children()
        .filter_map(ElementRef::wrap)
        .filter(|c| matches!(c.value().name(), "td" | "th"))
        .collect()
}

fn text_of(el: ElementRef<'_>) -> String {
    clean_text(&el.text().collect::<String>())
}

fn cell_texts(row: ElementRef<'_>, sel: &Selector) -> Vec<String> {
    row.select(sel).map(text_of).collect()
}

fn html_table(table: ElementRef<'_>) -> Table {
    let (head, mut body): (Vec<ElementRef<'_>>, Vec<ElementRef<'_>>) = table
        .select(&TR_SEL)
        .filter(|tr| nearest_table(*tr).is_some_and(|t| t.id() == table.id()))
        .partition(|tr| in_own_thead(*tr));

    let mut headers: Vec<String> = head.iter().flat_map(|tr| own_cells(*tr)).map(text_of).collect();

    // No <thead>: a leading row made only of <th> is the header row.
    if headers.is_empty() {
        if let Some(first) = body.first() {
            let cells = own_cells(*first);
            if !cells.is_empty() && cells.iter().all(|c| c.value().name() == "th") {
                headers = cells.into_iter().map(text_of).collect();
                body.remove(0);
            }
        }
    }

    let rows: Vec<Vec<String>> = body
        .into_iter()
        .map(|tr| own_cells(tr).into_iter().map(text_of).collect::<Vec<_>>())
        .filter(|cells| !cells.is_empty())
        .collect();

    if headers.is_empty() {
        headers = synth_headers(rows.first().map_or(0, Vec::len));
    }
    Table::new(headers, rows)
}

fn aria_table(table: ElementRef<'_>) -> Table {
    let mut headers = cell_texts(table, &ARIA_HEADER_SEL);
    let rows: Vec<Vec<String>> = table
        .select(&ARIA_ROW_SEL)
        .map(|row| cell_texts(row, &ARIA_CELL_SEL))
        .filter(|cells| !cells.is_empty())
        .collect();
    if headers.is_empty() {
        headers = synth_headers(rows.first().map_or(0, Vec::len));
    }
    Table::new(headers, rows)
}

/// An empty `Table` means the page had no usable rows.
pub fn extract(html: &str) -> Table {
    let doc = Html::parse_document(html);
    match first_table(&doc) {
        Some(t) if t.value().name() == "table" => html_table(t),
        Some(t) => aria_table(t),
        None => Table::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thead_headers_and_body_rows() {
        let html = std::fs::read_to_string("tests/fixtures/portal_table.html").unwrap();
        let t = extract(&html);
        assert_eq!(t.headers, vec!["Nombre", "Tipo", "Valor"]);
        assert_eq!(t.rows.len(), 2);
        assert_eq!(t.rows[0], vec!["Servidor", "Equipo", "1.000.000"]);
        assert_eq!(t.rows[1][0], "Escritorio");
    }

    #[test]
    fn leading_th_row_is_header() {
        let html = "<table><tr><th>A</th><th>B</th></tr><tr><td>1</td><td>2</td></tr></table>";
        let t = extract(html);
        assert_eq!(t.headers, vec!["A", "B"]);
        assert_eq!(t.rows, vec![vec!["1".to_string(), "2".to_string()]]);
    }

    #[test]
    fn missing_header_synthesizes_columns() {
        let html = "<table><tr><td>x</td><td>y</td><td>z</td></tr></table>";
        let t = extract(html);
        assert_eq!(t.headers, vec!["Column_1", "Column_2", "Column_3"]);
        assert_eq!(t.rows.len(), 1);
    }

    #[test]
    fn nested_tables_stay_inside_their_cell() {
        let html = "<table><tr><td>layout</td><td><table><tr><td>1</td><td>2</td></tr></table></td></tr></table>";
        let t = extract(html);
        assert_eq!(t.headers, vec!["Column_1", "Column_2"]);
        assert_eq!(t.rows, vec![vec!["layout".to_string(), "12".to_string()]]);
    }

    #[test]
    fn inner_thead_does_not_become_outer_header() {
        let html = "<table><thead><tr><th>A</th><th>B</th></tr></thead>\
            <tbody><tr><td>x</td><td><table><thead><tr><th>inner</th></tr></thead></table></td></tr></tbody></table>";
        let t = extract(html);
        assert_eq!(t.headers, vec!["A", "B"]);
        assert_eq!(t.rows, vec![vec!["x".to_string(), "inner".to_string()]]);
    }

    #[test]
    fn aria_grid_is_read() {
        let html = r#"<div role="grid">
            <div role="row"><span role="columnheader">ID</span><span role="columnheader">Fecha</span></div>
            <div role="row"><span role="gridcell">7</span><span role="gridcell">2024-01-01</span></div>
        </div>"#;
        let t = extract(html);
        assert_eq!(t.headers, vec!["ID", "Fecha"]);
        assert_eq!(t.rows, vec![vec!["7".to_string(), "2024-01-01".to_string()]]);
    }

    #[test]
    fn no_rows_is_empty_not_error() {
        assert!(extract("<p>Cargando…</p>").is_empty());
        assert!(extract("<table><thead><tr><th>A</th></tr></thead></table>").is_empty());
    }
}
