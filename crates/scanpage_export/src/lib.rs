//! Flat-file output for collected records: JSON arrays, CSV tables and manifests.
//!
//! Every write replaces the target file; there is no append mode.

use scanpage::{CollectionManifest, Record};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("csv: {0}")]
    Csv(#[from] csv::Error),
}

/// `{chain}_{address}_{label}_{days}d`, the file stem shared by all outputs of one query.
pub fn output_stem(chain: &str, address: &str, label: &str, days: u32) -> String {
    let address: String = address
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    format!("{}_{}_{}_{}d", chain.to_ascii_lowercase(), address, label, days)
}

/// Write records as a pretty-printed JSON array of flat objects.
pub fn write_json(records: &[Record], out_path: impl AsRef<Path>) -> Result<(), ExportError> {
    let json = serde_json::to_string_pretty(records)?;
    std::fs::write(out_path.as_ref(), json)?;
    Ok(())
}

/// Read back a JSON array written by [`write_json`].
pub fn read_json(path: impl AsRef<Path>) -> Result<Vec<Record>, ExportError> {
    let raw = std::fs::read_to_string(path.as_ref())?;
    Ok(serde_json::from_str(&raw)?)
}

/// Columns: union of record keys in first-seen order.
pub fn csv_columns(records: &[Record]) -> Vec<String> {
    let mut columns: Vec<String> = Vec::new();
    for record in records {
        for key in record.fields().keys() {
            if !columns.iter().any(|c| c == key) {
                columns.push(key.clone());
            }
        }
    }
    columns
}

fn csv_cell(value: Option<&serde_json::Value>) -> String {
    match value {
        None | Some(serde_json::Value::Null) => String::new(),
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Write records as RFC 4180 CSV. Missing fields are empty cells; nested values are JSON text.
/// No records means an empty file.
pub fn write_csv_to<W: std::io::Write>(records: &[Record], out: W) -> Result<(), ExportError> {
    let mut wtr = csv::WriterBuilder::new()
        .terminator(csv::Terminator::CRLF)
        .from_writer(out);
    if records.is_empty() {
        wtr.flush()?;
        return Ok(());
    }
    let columns = csv_columns(records);
    wtr.write_record(&columns)?;
    for record in records {
        wtr.write_record(columns.iter().map(|c| csv_cell(record.get(c))))?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_csv(records: &[Record], out_path: impl AsRef<Path>) -> Result<(), ExportError> {
    let file = std::fs::File::create(out_path.as_ref())?;
    write_csv_to(records, file)
}

pub fn write_manifest(
    manifest: &CollectionManifest,
    out_path: impl AsRef<Path>,
) -> Result<(), ExportError> {
    std::fs::write(out_path.as_ref(), serde_json::to_string_pretty(manifest)?)?;
    Ok(())
}

pub fn read_manifest(path: impl AsRef<Path>) -> Result<CollectionManifest, ExportError> {
    let raw = std::fs::read_to_string(path.as_ref())?;
    Ok(serde_json::from_str(&raw)?)
}

/// Manifest path that sits next to a records file: `x.json` -> `x.manifest.json`.
pub fn manifest_path_for(records_path: &Path) -> PathBuf {
    let stem = records_path
        .file_stem()
        .unwrap_or_default()
        .to_string_lossy();
    records_path.with_file_name(format!("{stem}.manifest.json"))
}

/// Records path that a manifest refers to: `x.manifest.json` -> `x.json`.
pub fn records_path_for(manifest_path: &Path) -> PathBuf {
    let name = manifest_path
        .file_name()
        .unwrap_or_default()
        .to_string_lossy();
    let stem = name.strip_suffix(".manifest.json").unwrap_or(&*name);
    manifest_path.with_file_name(format!("{stem}.json"))
}
