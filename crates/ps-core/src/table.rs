//! Decoding a labeled section into column-name → value records.

use std::collections::HashMap;

use crate::section::RawSection;

/// One decoded row: column name → raw string value.
///
/// Values are never type-coerced here; coercion happens in normalization.
pub type TabularRecord = HashMap<String, String>;

/// An ordered sequence of decoded rows plus the header that keyed them.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<TabularRecord>,
}

impl Table {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Decodes a section's lines into records, using line 0 as a
/// comma-delimited header.
///
/// Data rows follow quoted-CSV rules. Source payloads are ragged: value
/// positions beyond the header length are ignored, as are header names
/// beyond a row's length. An absent section decodes to an empty table.
/// Rows the CSV decoder rejects are dropped with a warning.
pub fn decode_table(section: Option<&RawSection>) -> Table {
    let Some(section) = section else {
        return Table::default();
    };
    let Some((header_line, data_lines)) = section.lines.split_first() else {
        return Table::default();
    };

    let headers: Vec<String> = header_line.split(',').map(str::to_string).collect();

    let data = data_lines.join("\n");
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(data.as_bytes());

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = match result {
            Ok(record) => record,
            Err(err) => {
                tracing::warn!(error = %err, "dropping undecodable row");
                continue;
            }
        };
        let row: TabularRecord = headers
            .iter()
            .zip(record.iter())
            .map(|(name, value)| (name.clone(), value.to_string()))
            .collect();
        rows.push(row);
    }

    Table { headers, rows }
}
