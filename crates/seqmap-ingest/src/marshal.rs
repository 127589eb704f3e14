//! Reading delimited reference files and persisting indexes as JSON

use crate::decompression::open_text;
use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::debug;

/// Options for reading a delimited text file
#[derive(Debug, Clone, Copy)]
pub struct Delimited {
    pub delimiter: u8,

    /// Honour double quotes around fields (off for TSV files, whose
    /// descriptions may contain stray quote characters)
    pub quoting: bool,
}

impl Delimited {
    pub const TSV: Delimited = Delimited {
        delimiter: b'\t',
        quoting: false,
    };

    pub const CSV: Delimited = Delimited {
        delimiter: b',',
        quoting: true,
    };

    fn reader_builder(self, has_headers: bool) -> csv::ReaderBuilder {
        let mut builder = csv::ReaderBuilder::new();
        builder
            .delimiter(self.delimiter)
            .quoting(self.quoting)
            .has_headers(has_headers)
            .flexible(true)
            .comment(Some(b'#'));
        builder
    }
}

/// Read every row as a list of fields. Lines starting with `#` are skipped,
/// the header row (if any) is returned like any other row.
pub fn read_rows(path: &Path, format: Delimited) -> Result<Vec<Vec<String>>> {
    let mut reader = format.reader_builder(false).from_reader(open_text(path)?);

    let mut rows = Vec::new();
    for (idx, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("Bad row {} in {}", idx + 1, path.display()))?;
        rows.push(record.iter().map(str::to_string).collect());
    }

    debug!("Read {} rows from {}", rows.len(), path.display());
    Ok(rows)
}

/// Read rows keyed by the header line. Short rows yield only the columns present.
pub fn read_records(path: &Path, format: Delimited) -> Result<Vec<HashMap<String, String>>> {
    let mut reader = format.reader_builder(true).from_reader(open_text(path)?);
    let headers: Vec<String> = reader
        .headers()
        .with_context(|| format!("Missing header in {}", path.display()))?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut records = Vec::new();
    for (idx, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("Bad row {} in {}", idx + 2, path.display()))?;
        records.push(
            headers
                .iter()
                .cloned()
                .zip(record.iter().map(str::to_string))
                .collect(),
        );
    }

    debug!("Read {} records from {}", records.len(), path.display());
    Ok(records)
}

/// Serialize `value` as JSON. The file is written beside the target and
/// renamed into place so readers never see a partial index.
pub fn export_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = std::path::PathBuf::from(tmp_name);

    let file = std::fs::File::create(&tmp_path)
        .with_context(|| format!("Failed to create {}", tmp_path.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, value)
        .with_context(|| format!("Failed to serialize {}", path.display()))?;
    writer.flush()?;
    drop(writer);

    std::fs::rename(&tmp_path, path)
        .with_context(|| format!("Failed to move {} into place", path.display()))?;
    Ok(())
}

pub fn import_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let reader = open_text(path)?;
    serde_json::from_reader(reader).with_context(|| format!("Failed to parse JSON in {}", path.display()))
}
