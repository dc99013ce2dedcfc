//! Pipe-delimited scheduler output.
//!
//! `squeue -h -o ...` and `sacct -n -P ...` both print one record per line
//! with fields separated by `|` and no header.

use chrono::{DateTime, NaiveDate, NaiveDateTime};

use crate::error::SlurmError;

pub const DELIMITER: char = '|';

/// Values the scheduler prints for a time it does not know yet.
const UNSET_TIMES: &[&str] = &["Unknown", "N/A"];

/// One row of scheduler output, keyed by the field names it was parsed with.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Record {
    fields: Vec<(String, String)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<String>) {
        let field = field.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(name, _)| *name == field) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((field, value)),
        }
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, value)| value.as_str())
    }

    /// Like `get`, but a missing field is a `ParseError`.
    pub fn require(&self, field: &str) -> Result<&str, SlurmError> {
        self.get(field)
            .ok_or_else(|| SlurmError::malformed(format!("record has no {} field", field)))
    }

    /// Render back into one line with the given field order.
    /// Fields the record does not carry render as empty.
    pub fn to_line(&self, fields: &[&str]) -> String {
        fields
            .iter()
            .map(|field| self.get(field).unwrap_or(""))
            .collect::<Vec<_>>()
            .join(&DELIMITER.to_string())
    }
}

/// Split scheduler output into records, one per non-blank line.
///
/// Blank output is not an error: an empty queue prints nothing.
pub fn parse_records(text: &str, fields: &[&str]) -> Result<Vec<Record>, SlurmError> {
    let mut records = Vec::new();
    for (index, line) in text.lines().enumerate() {
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() {
            continue;
        }
        let values: Vec<&str> = line.split(DELIMITER).collect();
        if values.len() != fields.len() {
            return Err(SlurmError::parse(
                index + 1,
                format!(
                    "expected {} fields ({}), found {} in '{}'",
                    fields.len(),
                    fields.join(","),
                    values.len(),
                    line
                ),
            ));
        }
        let mut record = Record::new();
        for (field, value) in fields.iter().zip(values) {
            record.insert(*field, value.trim());
        }
        records.push(record);
    }
    Ok(records)
}

/// Parse an ISO-8601 timestamp; `Unknown` and `N/A` mean no value.
///
/// Offsets are normalized to UTC. A bare date means midnight.
pub fn parse_timestamp(value: &str) -> Result<Option<NaiveDateTime>, SlurmError> {
    let value = value.trim();
    if UNSET_TIMES.contains(&value) {
        return Ok(None);
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(time) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(Some(time));
        }
    }
    if let Ok(time) = DateTime::parse_from_rfc3339(value) {
        return Ok(Some(time.naive_utc()));
    }
    if let Some(midnight) = NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
    {
        return Ok(Some(midnight));
    }
    Err(SlurmError::DateParseError(value.to_string()))
}

/// Inverse of `parse_timestamp` for the scheduler's own format.
pub fn format_timestamp(time: Option<&NaiveDateTime>) -> String {
    match time {
        Some(time) => time.format("%Y-%m-%dT%H:%M:%S").to_string(),
        None => UNSET_TIMES[0].to_string(),
    }
}
