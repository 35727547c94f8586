//! Output formatting utilities

use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use miette::{IntoDiagnostic, Result};
use serde_json::{Map, Value as JsonValue};
use tabled::builder::Builder;
use tabled::settings::Style;

use crate::cli::OutputFormat;
use crate::entities::{DataTable, Value};

fn json_value(value: &Value) -> JsonValue {
    match value {
        Value::Missing => JsonValue::Null,
        Value::Int(i) => JsonValue::from(*i),
        Value::Float(f) => serde_json::Number::from_f64(*f)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null),
        Value::Text(s) => JsonValue::from(s.as_str()),
    }
}

/// Rows as JSON objects keyed by column name
pub fn table_to_json(table: &DataTable) -> JsonValue {
    let names: Vec<&str> = table.column_names().collect();
    let rows = table
        .rows()
        .map(|row| {
            let object: Map<String, JsonValue> = names
                .iter()
                .zip(row)
                .map(|(name, value)| (name.to_string(), json_value(value)))
                .collect();
            JsonValue::Object(object)
        })
        .collect();
    JsonValue::Array(rows)
}

/// Render a table for terminal display
pub fn render_table(table: &DataTable) -> String {
    let mut builder = Builder::default();
    builder.push_record(table.column_names());
    for row in table.rows() {
        builder.push_record(row.iter().map(|v| v.to_string()));
    }
    builder.build().with(Style::rounded()).to_string()
}

/// Write a table to `out` in the requested format
pub fn write_table<W: Write>(table: &DataTable, format: OutputFormat, mut out: W) -> Result<()> {
    match format {
        OutputFormat::Table => writeln!(out, "{}", render_table(table)).into_diagnostic(),
        OutputFormat::Csv => table.write_csv(out).into_diagnostic(),
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&table_to_json(table)).into_diagnostic()?;
            writeln!(out, "{}", json).into_diagnostic()
        }
    }
}

/// Print a table to stdout
pub fn print_table(table: &DataTable, format: OutputFormat) -> Result<()> {
    write_table(table, format, io::stdout().lock())
}

/// Write a table as CSV to a file
pub fn save_csv(table: &DataTable, path: &Path) -> Result<()> {
    let file = File::create(path).into_diagnostic()?;
    table.write_csv(file).into_diagnostic()
}
