use std::collections::HashMap;
use std::str::FromStr;

use thiserror::Error;

use crate::hostlist::HostlistError;

#[derive(Error, Debug)]
pub enum RecordError {
    #[error("record is missing mandatory field '{0}'")]
    MissingField(&'static str),
    #[error("field '{field}' has unparseable value '{value}'")]
    BadValue {
        field: &'static str,
        value: String,
    },
    #[error("bad node list: {0}")]
    BadHostlist(#[from] HostlistError),
}

/// One query line, split on `|` and keyed by its documented field names.
///
/// The scheduler's `--Format` output ends each field with the separator,
/// so a trailing `|` is stripped before splitting.
pub struct FieldMap<'a> {
    values: HashMap<&'static str, &'a str>,
}

impl<'a> FieldMap<'a> {
    /// Builds a map requiring exactly `names.len()` fields. Returns `None`
    /// on a count mismatch; callers report and skip the line.
    pub fn exact(names: &'static [&'static str], line: &'a str) -> Option<Self> {
        let line = line.strip_suffix('|').unwrap_or(line);
        let parts: Vec<&str> = line.split('|').collect();
        if parts.len() != names.len() {
            return None;
        }
        Some(Self::zip(names, parts))
    }

    /// Builds a map splitting into at most `names.len()` fields, so a
    /// trailing field (a job name, say) may itself contain the delimiter.
    /// Lines with fewer fields than expected are rejected.
    pub fn capped(names: &'static [&'static str], line: &'a str) -> Option<Self> {
        let line = line.strip_suffix('|').unwrap_or(line);
        let parts: Vec<&str> = line.splitn(names.len(), '|').collect();
        if parts.len() != names.len() {
            return None;
        }
        Some(Self::zip(names, parts))
    }

    fn zip(names: &'static [&'static str], parts: Vec<&'a str>) -> Self {
        Self {
            values: names
                .iter()
                .copied()
                .zip(parts.into_iter().map(str::trim))
                .collect(),
        }
    }

    pub fn get(&self, name: &'static str) -> &'a str {
        self.values.get(name).copied().unwrap_or("")
    }

    /// A mandatory field: absent or empty fails the whole record.
    pub fn require(&self, name: &'static str) -> Result<&'a str, RecordError> {
        match self.values.get(name) {
            Some(value) if !value.is_empty() => Ok(value),
            _ => Err(RecordError::MissingField(name)),
        }
    }

    /// Numeric field where the scheduler legitimately omits unrequested
    /// dimensions: missing or unparseable yields the default.
    pub fn parse_or_default<T: FromStr + Default>(&self, name: &'static str) -> T {
        self.get(name).parse().unwrap_or_default()
    }

    /// Numeric field whose parse failure fails the whole record.
    pub fn parse_required<T: FromStr>(&self, name: &'static str) -> Result<T, RecordError> {
        let raw = self.require(name)?;
        raw.parse().map_err(|_| RecordError::BadValue {
            field: name,
            value: raw.to_string(),
        })
    }

    /// Boolean by way of "nonzero integer"; anything unparseable is false.
    pub fn flag(&self, name: &'static str) -> bool {
        self.get(name).parse::<i64>().map(|n| n != 0).unwrap_or(false)
    }
}
