// src/bigquery/rows.rs

use anyhow::{bail, Context, Result};
use chrono::{LocalResult, TimeZone, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// Schema descriptor attached to every query-results page.
#[derive(Debug, Clone, Deserialize)]
pub struct TableSchema {
    pub fields: Vec<FieldSchema>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FieldSchema {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
}

/// One row in the REST wire shape: a list of cells `f`, each a value `v`.
#[derive(Debug, Clone, Deserialize)]
pub struct WireRow {
    pub f: Vec<WireCell>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireCell {
    #[serde(default)]
    pub v: Value,
}

/// A decoded result cell. Null is the absent-value sentinel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CellValue {
    Integer(i64),
    Text(String),
    Null,
}

/// One query-result row, keyed by column name.
pub type ResultRow = BTreeMap<String, CellValue>;

/// Decode a page of wire rows against `schema`, appending to `out` in
/// server order.
pub fn convert_page(schema: &TableSchema, rows: &[WireRow], out: &mut Vec<ResultRow>) -> Result<()> {
    out.reserve(rows.len());
    for row in rows {
        out.push(convert_row(schema, row)?);
    }
    Ok(())
}

pub fn convert_row(schema: &TableSchema, row: &WireRow) -> Result<ResultRow> {
    if row.f.len() != schema.fields.len() {
        bail!(
            "row has {} cells but the schema has {} fields",
            row.f.len(),
            schema.fields.len()
        );
    }

    let mut decoded = BTreeMap::new();
    for (field, cell) in schema.fields.iter().zip(&row.f) {
        decoded.insert(field.name.clone(), convert_cell(field, cell)?);
    }
    Ok(decoded)
}

fn convert_cell(field: &FieldSchema, cell: &WireCell) -> Result<CellValue> {
    let raw = match &cell.v {
        Value::Null => return Ok(CellValue::Null),
        Value::String(s) => s.clone(),
        // nested records and arrays stay as their raw JSON text
        other => other.to_string(),
    };

    Ok(match field.ty.as_str() {
        "INTEGER" | "INT64" => CellValue::Integer(raw.parse().with_context(|| {
            format!("column `{}`: `{}` is not an integer", field.name, raw)
        })?),
        "TIMESTAMP" => CellValue::Text(render_timestamp(&raw)),
        _ => CellValue::Text(raw),
    })
}

/// TIMESTAMP cells arrive as epoch seconds, often in scientific notation
/// (e.g. "1.5778368E9"). Render them as a UTC datetime; anything that
/// fails to parse passes through untouched.
fn render_timestamp(raw: &str) -> String {
    let secs = match raw.parse::<f64>() {
        Ok(secs) => secs,
        Err(_) => return raw.to_string(),
    };
    let micros = (secs * 1_000_000.0).round() as i64;
    match Utc.timestamp_micros(micros) {
        LocalResult::Single(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        _ => raw.to_string(),
    }
}
