//! Open-data API responses → `Table`.
//!
//! Two shapes are understood: the `{meta: {view: {columns}}, data: [[..]]}`
//! row export, and a plain array of row objects.

use serde_json::Value;

use super::{synth_headers, ExtractError, Table};

fn cell(v: &Value) -> String {
    match v {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn column_names(root: &Value) -> Option<Vec<String>> {
    let cols = root.pointer("/meta/view/columns")?.as_array()?;
    cols.iter()
        .map(|c| c.get("name").and_then(Value::as_str).map(str::to_string))
        .collect()
}

fn from_row_arrays(root: &Value, data: &[Value]) -> Result<Table, ExtractError> {
    let rows: Vec<Vec<String>> = data
        .iter()
        .map(|row| {
            row.as_array()
                .map(|cells| cells.iter().map(cell).collect())
                .ok_or_else(|| ExtractError::Parse("`data` row is not an array".to_string()))
        })
        .collect::<Result<_, _>>()?;

    let headers = column_names(root)
        .unwrap_or_else(|| synth_headers(rows.first().map_or(0, Vec::len)));
    Ok(Table::new(headers, rows))
}

fn from_objects(items: &[Value]) -> Result<Table, ExtractError> {
    let mut headers: Vec<String> = Vec::new();
    for item in items {
        let obj = item
            .as_object()
            .ok_or_else(|| ExtractError::Parse("array item is not an object".to_string()))?;
        for key in obj.keys() {
            if !headers.contains(key) {
                headers.push(key.clone());
            }
        }
    }
    let rows = items
        .iter()
        .filter_map(Value::as_object)
        .map(|obj| headers.iter().map(|h| obj.get(h).map(cell).unwrap_or_default()).collect())
        .collect();
    Ok(Table::new(headers, rows))
}

pub fn decode(body: &str) -> Result<Table, ExtractError> {
    let root: Value = serde_json::from_str(body).map_err(|e| ExtractError::Parse(e.to_string()))?;
    match &root {
        Value::Object(obj) => match obj.get("data") {
            Some(Value::Array(data)) => from_row_arrays(&root, data),
            Some(_) => Err(ExtractError::Parse("`data` is not an array".to_string())),
            None => Err(ExtractError::Parse("response has no `data` field".to_string())),
        },
        Value::Array(items) => from_objects(items),
        _ => Err(ExtractError::Parse("unexpected JSON shape".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_export_uses_meta_columns() {
        let body = r#"{
            "meta": {"view": {"columns": [{"name": "ID"}, {"name": "Nombre"}, {"name": "Valor"}]}},
            "data": [["1", "Activo 1", 1000000], ["2", null, 500000.5]]
        }"#;
        let t = decode(body).unwrap();
        assert_eq!(t.headers, vec!["ID", "Nombre", "Valor"]);
        assert_eq!(t.rows[0], vec!["1", "Activo 1", "1000000"]);
        assert_eq!(t.rows[1], vec!["2", "", "500000.5"]);
    }

    #[test]
    fn missing_meta_synthesizes_headers() {
        let t = decode(r#"{"data": [["a", "b"]]}"#).unwrap();
        assert_eq!(t.headers, vec!["Column_1", "Column_2"]);
    }

    #[test]
    fn object_rows_take_the_union_of_keys() {
        let t = decode(r#"[{"id": "1", "tipo": "Equipo"}, {"id": "2", "fecha": "2024-01-02"}]"#).unwrap();
        assert_eq!(t.headers.len(), 3);
        assert!(t.headers.contains(&"fecha".to_string()));
        assert_eq!(t.rows.len(), 2);
        assert!(t.rows.iter().all(|r| r.len() == 3));
    }

    #[test]
    fn empty_data_is_empty_table() {
        assert!(decode(r#"{"data": []}"#).unwrap().is_empty());
        assert!(decode("[]").unwrap().is_empty());
    }

    #[test]
    fn malformed_bodies_are_parse_errors() {
        assert!(matches!(decode("not json"), Err(ExtractError::Parse(_))));
        assert!(matches!(decode(r#"{"rows": []}"#), Err(ExtractError::Parse(_))));
        assert!(matches!(decode(r#"{"data": {"a": 1}}"#), Err(ExtractError::Parse(_))));
        assert!(matches!(decode("42"), Err(ExtractError::Parse(_))));
    }
}
