//! Line-oriented table exporters.
//!
//! ```text
//! DatasetTable → Exporter::export(schema, records, writer)
//!   jsonl      → {"guid":"w1","degree":1}
//!   tsv        → guid<TAB>degree
//!   edge_list  → tsv over an edge-list table
//! ```
//!
//! Encoders see every record exactly once, in table order, and never reorder
//! columns.

use std::io::Write;
use std::sync::Arc;

use hashbrown::HashMap;

use super::{Record, Schema};
use crate::model::Value;
use crate::{Error, Result};

pub trait Exporter: Send + Sync {
    /// Format name as used in export declarations.
    fn format(&self) -> &'static str;

    fn export(
        &self,
        schema: &Schema,
        records: &mut dyn Iterator<Item = &Record>,
        writer: &mut dyn Write,
    ) -> Result<()>;
}

// ============================================================================
// JSON Lines
// ============================================================================

/// One JSON object per line, keys in schema order.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonLinesExporter;

impl Exporter for JsonLinesExporter {
    fn format(&self) -> &'static str {
        "jsonl"
    }

    fn export(
        &self,
        schema: &Schema,
        records: &mut dyn Iterator<Item = &Record>,
        writer: &mut dyn Write,
    ) -> Result<()> {
        let keys = schema
            .names()
            .map(serde_json::to_string)
            .collect::<std::result::Result<Vec<_>, _>>()?;
        for record in records {
            let mut line = String::from("{");
            for (i, (key, value)) in keys.iter().zip(record.iter()).enumerate() {
                if i > 0 {
                    line.push(',');
                }
                line.push_str(key);
                line.push(':');
                write_json(&mut line, value)?;
            }
            line.push('}');
            writeln!(writer, "{line}")?;
        }
        Ok(())
    }
}

/// Append the JSON encoding of `value`.
fn write_json(out: &mut String, value: &Value) -> Result<()> {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Int(i) => out.push_str(&i.to_string()),
        Value::Float(f) => out.push_str(&format_float(*f)?),
        Value::String(s) => out.push_str(&serde_json::to_string(s)?),
        Value::NodeRef(node) => out.push_str(&serde_json::to_string(&*node.guid)?),
        Value::EdgeRef(edge) => out.push_str(&edge.0.to_string()),
        Value::Geometry(geom) => out.push_str(&serde_json::to_string(&geom.handle)?),
        Value::List(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_json(out, item)?;
            }
            out.push(']');
        }
    }
    Ok(())
}

/// Shortest round-trip form, always with a fraction (`3.0`, not `3`).
fn format_float(f: f64) -> Result<String> {
    Ok(serde_json::to_string(&f)?)
}

// ============================================================================
// TSV
// ============================================================================

/// Header line, then one tab-separated line per record.
#[derive(Debug, Clone, Copy, Default)]
pub struct TsvExporter;

impl Exporter for TsvExporter {
    fn format(&self) -> &'static str {
        "tsv"
    }

    fn export(
        &self,
        schema: &Schema,
        records: &mut dyn Iterator<Item = &Record>,
        writer: &mut dyn Write,
    ) -> Result<()> {
        let header: Vec<String> = schema.names().map(escape_cell).collect();
        writeln!(writer, "{}", header.join("\t"))?;
        for record in records {
            let cells = record.iter().map(tsv_cell).collect::<Result<Vec<_>>>()?;
            writeln!(writer, "{}", cells.join("\t"))?;
        }
        Ok(())
    }
}

fn tsv_cell(value: &Value) -> Result<String> {
    Ok(match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Int(i) => i.to_string(),
        Value::Float(f) => format_float(*f)?,
        Value::String(s) => escape_cell(s),
        Value::NodeRef(node) => escape_cell(&node.guid),
        Value::EdgeRef(edge) => edge.0.to_string(),
        Value::Geometry(geom) => escape_cell(&geom.handle),
        Value::List(_) => {
            let mut json = String::new();
            write_json(&mut json, value)?;
            escape_cell(&json)
        }
    })
}

fn escape_cell(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            _ => out.push(c),
        }
    }
    out
}

// ============================================================================
// Registry
// ============================================================================

/// Format name → exporter.
#[derive(Clone, Default)]
pub struct ExporterRegistry {
    exporters: HashMap<String, Arc<dyn Exporter>>,
}

impl ExporterRegistry {
    /// `jsonl`, `tsv`, and `edge_list` (TSV).
    pub fn standard() -> Self {
        let mut registry = Self::default();
        registry.register("jsonl", Arc::new(JsonLinesExporter));
        registry.register("tsv", Arc::new(TsvExporter));
        registry.register("edge_list", Arc::new(TsvExporter));
        registry
    }

    pub fn register(&mut self, name: impl Into<String>, exporter: Arc<dyn Exporter>) {
        self.exporters.insert(name.into(), exporter);
    }

    pub fn get(&self, format: &str) -> Option<&dyn Exporter> {
        self.exporters.get(format).map(|e| e.as_ref())
    }

    pub fn contains(&self, format: &str) -> bool {
        self.exporters.contains_key(format)
    }

    /// Registered names, sorted.
    pub fn formats(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.exporters.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Encode `records` into memory with the exporter for `format`.
    pub fn encode(&self, table: &str, format: &str, schema: &Schema, records: &[Record]) -> Result<Vec<u8>> {
        let exporter = self.get(format).ok_or_else(|| Error::Export {
            table: table.to_string(),
            format: format.to_string(),
            message: "unknown export format".to_string(),
        })?;
        let mut buf = Vec::new();
        exporter
            .export(schema, &mut records.iter(), &mut buf)
            .map_err(|e| Error::Export {
                table: table.to_string(),
                format: format.to_string(),
                message: e.to_string(),
            })?;
        Ok(buf)
    }
}

impl std::fmt::Debug for ExporterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExporterRegistry").field("formats", &self.formats()).finish()
    }
}
