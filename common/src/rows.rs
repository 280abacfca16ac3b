//! Canonical CSV row codec.
//!
//! Source files are CSV with a header line. Each data line becomes a
//! [`Record`] keyed by header, with every cell kept as a string. The same
//! codec writes the raw client cache entry, so a dataset that goes through
//! `to_csv` and back through `parse_csv` yields the same records.

use crate::{DataResult, Record};
use serde_json::Value;
use std::io;

/// Streaming reader turning CSV lines into records.
pub struct RecordReader<R: io::Read> {
    inner: csv::Reader<R>,
    headers: Vec<String>,
}

impl<R: io::Read> RecordReader<R> {
    /// Wrap a CSV source. The first line is consumed as the header.
    pub fn new(source: R) -> DataResult<Self> {
        let mut inner = csv::ReaderBuilder::new().has_headers(true).from_reader(source);
        let headers = inner.headers()?.iter().map(str::to_owned).collect();
        Ok(Self { inner, headers })
    }

    /// Column names in source order.
    pub fn headers(&self) -> &[String] {
        &self.headers
    }
}

impl<R: io::Read> Iterator for RecordReader<R> {
    type Item = DataResult<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut row = csv::StringRecord::new();
        match self.inner.read_record(&mut row) {
            Ok(true) => {
                let record = self
                    .headers
                    .iter()
                    .zip(row.iter())
                    .map(|(h, v)| (h.clone(), Value::String(v.to_owned())))
                    .collect();
                Some(Ok(record))
            }
            Ok(false) => None,
            Err(e) => Some(Err(e.into())),
        }
    }
}

/// Parse CSV text into records.
pub fn parse_csv(text: &str) -> DataResult<Vec<Record>> {
    RecordReader::new(text.as_bytes())?.collect()
}

/// Serialize records to CSV text.
///
/// The header comes from the first record's column order. Missing cells are
/// written empty. An empty slice produces an empty string.
pub fn to_csv(records: &[Record]) -> DataResult<String> {
    let Some(first) = records.first() else {
        return Ok(String::new());
    };
    let headers: Vec<&String> = first.keys().collect();

    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(headers.iter().map(|h| h.as_bytes()))?;
    for record in records {
        writer.write_record(headers.iter().map(|h| cell_text(record.get(h.as_str()))))?;
    }
    let bytes = writer.into_inner().map_err(|e| e.into_error())?;
    // The writer only ever receives UTF-8 from `String` cells.
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn cell_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}
