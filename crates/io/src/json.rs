// JSON import/export

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use serde_json::{Map, Number, Value};
use tablegrid_engine::row::Row;
use tablegrid_engine::value::CellValue;

use crate::column_order;

/// Export rows as a JSON array of objects, one key per column.
/// Columns missing from a row are written as null.
pub fn export_rows(rows: &[Row], path: &Path) -> Result<(), String> {
    let file = File::create(path).map_err(|e| e.to_string())?;
    let writer = BufWriter::new(file);
    serde_json::to_writer_pretty(writer, &rows_to_json(rows, false)).map_err(|e| e.to_string())
}

pub fn rows_to_json(rows: &[Row], include_reserved: bool) -> Value {
    let columns = column_order(rows, include_reserved);
    Value::Array(
        rows.iter()
            .map(|row| {
                let object: Map<String, Value> = columns
                    .iter()
                    .map(|c| (c.clone(), cell_to_json(row.get(c))))
                    .collect();
                Value::Object(object)
            })
            .collect(),
    )
}

/// Read an array of flat objects. Nested arrays and objects are kept as
/// their JSON text.
pub fn import_rows(path: &Path) -> Result<Vec<Row>, String> {
    let content = std::fs::read_to_string(path).map_err(|e| e.to_string())?;
    import_from_str(&content)
}

pub fn import_from_str(content: &str) -> Result<Vec<Row>, String> {
    let value: Value = serde_json::from_str(content).map_err(|e| e.to_string())?;
    let items = match value {
        Value::Array(items) => items,
        _ => return Err("expected a JSON array of objects".to_string()),
    };

    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| match item {
            Value::Object(object) => Ok(object
                .into_iter()
                .map(|(k, v)| (k, json_to_cell(v)))
                .collect::<Row>()),
            _ => Err(format!("item {} is not an object", i)),
        })
        .collect()
}

fn cell_to_json(value: &CellValue) -> Value {
    match value {
        CellValue::Null => Value::Null,
        CellValue::Bool(b) => Value::Bool(*b),
        CellValue::Int(n) => Value::Number((*n).into()),
        CellValue::Float(n) => Number::from_f64(*n).map_or(Value::Null, Value::Number),
        CellValue::Text(_) | CellValue::DateTime(_) => Value::String(value.display_string()),
    }
}

fn json_to_cell(value: Value) -> CellValue {
    match value {
        Value::Null => CellValue::Null,
        Value::Bool(b) => CellValue::Bool(b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => CellValue::Int(i),
            None => n.as_f64().map_or(CellValue::Null, CellValue::Float),
        },
        // Strings get the same inference as CSV fields
        Value::String(s) => CellValue::from_input(&s),
        other => CellValue::Text(other.to_string()),
    }
}
