use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};

use crate::battery::BatteryState;
use crate::error::ReadError;

/// Key/value fields from one read of a power-supply `uevent` file.
///
/// A line without `=` is kept as a key with no value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawRecord {
    fields: HashMap<String, Option<String>>,
}

impl RawRecord {
    /// Value for `key`. `None` when the key is missing or was listed without a value.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(|v| v.as_deref())
    }

    #[cfg(test)]
    pub fn contains_key(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    fn insert(&mut self, key: &str, value: Option<&str>) {
        self.fields.insert(key.to_string(), value.map(String::from));
    }
}

/// Parse `KEY=VALUE` lines. Lines that are not valid UTF-8 are skipped.
pub fn parse_record<R: BufRead>(reader: R) -> io::Result<RawRecord> {
    let mut record = RawRecord::default();
    for line in reader.split(b'\n') {
        let line = line?;
        let Ok(line) = std::str::from_utf8(&line) else {
            log::debug!("Skipping non UTF-8 line: {:?}", String::from_utf8_lossy(&line));
            continue;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match line.split_once('=') {
            Some((key, value)) => record.insert(key.trim(), Some(value)),
            None => record.insert(line, None),
        }
    }
    Ok(record)
}

/// Reads the power-supply status file at a fixed path.
#[derive(Debug, Clone)]
pub struct StateReader {
    path: PathBuf,
}

impl StateReader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn read(&self) -> Result<RawRecord, ReadError> {
        let file = File::open(&self.path).map_err(|source| {
            let err = ReadError::Unavailable { path: self.path.clone(), source };
            log::warn!("{}", err);
            err
        })?;
        let record = parse_record(BufReader::new(file)).map_err(|source| {
            let err = ReadError::Io { path: self.path.clone(), source };
            log::warn!("{}", err);
            err
        })?;
        log::debug!("Read {} fields from {}", record.len(), self.path.display());
        Ok(record)
    }

    pub fn load(&self) -> Result<BatteryState, ReadError> {
        self.read().map(|record| BatteryState::from_record(&record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::battery::CAPACITY_KEY;
    use std::fs;

    #[test]
    fn parses_every_well_formed_pair() {
        let text = "POWER_SUPPLY_NAME=battery\nPOWER_SUPPLY_CAPACITY=42\nPOWER_SUPPLY_VOLTAGE_NOW=3900000\n";
        let record = parse_record(text.as_bytes()).unwrap();
        assert_eq!(record.len(), 3);
        assert_eq!(record.get("POWER_SUPPLY_NAME"), Some("battery"));
        assert_eq!(record.get(CAPACITY_KEY), Some("42"));
        assert_eq!(record.get("POWER_SUPPLY_VOLTAGE_NOW"), Some("3900000"));

        let again = parse_record(text.as_bytes()).unwrap();
        assert_eq!(record, again);
    }

    #[test]
    fn splits_on_first_equals_only() {
        let record = parse_record("MODEL=a=b\n".as_bytes()).unwrap();
        assert_eq!(record.get("MODEL"), Some("a=b"));
    }

    #[test]
    fn keeps_keys_without_value() {
        let record = parse_record("POWER_SUPPLY_PRESENT\nPOWER_SUPPLY_CAPACITY=7\n".as_bytes()).unwrap();
        assert!(record.contains_key("POWER_SUPPLY_PRESENT"));
        assert_eq!(record.get("POWER_SUPPLY_PRESENT"), None);
        assert_eq!(record.get(CAPACITY_KEY), Some("7"));
    }

    #[test]
    fn last_duplicate_wins() {
        let record = parse_record("POWER_SUPPLY_CAPACITY=10\n\nPOWER_SUPPLY_CAPACITY=11\n".as_bytes()).unwrap();
        assert_eq!(record.len(), 1);
        assert_eq!(record.get(CAPACITY_KEY), Some("11"));
    }

    #[test]
    fn handles_crlf_and_missing_trailing_newline() {
        let record = parse_record("A=1\r\nB=2".as_bytes()).unwrap();
        assert_eq!(record.get("A"), Some("1"));
        assert_eq!(record.get("B"), Some("2"));
    }

    #[test]
    fn invalid_utf8_line_only_drops_that_line() {
        let bytes = b"POWER_SUPPLY_MODEL_NAME=\xff\xfe\nPOWER_SUPPLY_CAPACITY=80\nPOWER_SUPPLY_STATUS=Charging\n";
        let record = parse_record(&bytes[..]).unwrap();
        assert!(!record.contains_key("POWER_SUPPLY_MODEL_NAME"));
        assert_eq!(record.get(CAPACITY_KEY), Some("80"));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("uevent");
        fs::write(&path, bytes).unwrap();
        let state = StateReader::new(&path).load().unwrap();
        assert_eq!(state.capacity, Some(80.0));
        assert_eq!(state.status.as_deref(), Some("Charging"));
    }

    #[test]
    fn missing_file_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let reader = StateReader::new(dir.path().join("uevent"));
        assert!(matches!(reader.read(), Err(ReadError::Unavailable { .. })));
    }

    #[test]
    fn loads_state_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("uevent");
        fs::write(&path, "POWER_SUPPLY_CAPACITY=5\n").unwrap();

        let state = StateReader::new(&path).load().unwrap();
        assert_eq!(state.capacity, Some(5.0));
        assert_eq!(state.status, None);
        assert_eq!(state.health, None);
    }
}
