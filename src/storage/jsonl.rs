//! JSON Lines history files.
//!
//! Append-only logs (one JSON object per line) for records the engine keeps
//! a history of, such as applied refreshes.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::marker::PhantomData;
use std::path::PathBuf;

use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};

use super::StorageError;

/// Appends records to a JSONL file.
pub struct JsonlWriter<T> {
    path: PathBuf,
    _marker: PhantomData<T>,
}

impl<T: Serialize> JsonlWriter<T> {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            _marker: PhantomData,
        }
    }

    fn ensure_dir(&self) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(())
    }

    /// Append a single record.
    pub fn append(&self, record: &T) -> Result<(), StorageError> {
        self.ensure_dir()?;

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        let mut writer = BufWriter::new(file);
        let json = serde_json::to_string(record)?;
        writeln!(writer, "{}", json)?;
        writer.flush()?;

        debug!("Appended record to {:?}", self.path);
        Ok(())
    }
}

/// Reads records back from a JSONL file.
pub struct JsonlReader<T> {
    path: PathBuf,
    _marker: PhantomData<T>,
}

impl<T: DeserializeOwned> JsonlReader<T> {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            _marker: PhantomData,
        }
    }

    /// Read every record. A missing file reads as empty; corrupt lines are skipped.
    pub fn read_all(&self) -> Result<Vec<T>, StorageError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let file = File::open(&self.path)?;
        let reader = BufReader::new(file);
        let mut records = Vec::new();

        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }

            match serde_json::from_str(&line) {
                Ok(record) => records.push(record),
                Err(e) => {
                    warn!(
                        "Failed to parse line {} in {:?}: {}",
                        index + 1,
                        self.path,
                        e
                    );
                }
            }
        }

        Ok(records)
    }

    /// The last `n` records, oldest first.
    pub fn tail(&self, n: usize) -> Result<Vec<T>, StorageError> {
        let mut all = self.read_all()?;
        let skip = all.len().saturating_sub(n);
        Ok(all.split_off(skip))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::TempDir;

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    struct Entry {
        event_count: u64,
        fixtures: u32,
    }

    fn entry(event_count: u64) -> Entry {
        Entry {
            event_count,
            fixtures: 2,
        }
    }

    #[test]
    fn test_append_and_read() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("state").join("history.jsonl");

        let writer: JsonlWriter<Entry> = JsonlWriter::new(path.clone());
        writer.append(&entry(1)).unwrap();
        writer.append(&entry(2)).unwrap();

        let reader: JsonlReader<Entry> = JsonlReader::new(path);
        assert_eq!(reader.read_all().unwrap(), vec![entry(1), entry(2)]);
    }

    #[test]
    fn test_read_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let reader: JsonlReader<Entry> = JsonlReader::new(temp_dir.path().join("none.jsonl"));
        assert!(reader.read_all().unwrap().is_empty());
    }

    #[test]
    fn test_corrupt_lines_are_skipped() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("history.jsonl");
        std::fs::write(
            &path,
            "{\"event_count\":1,\"fixtures\":2}\nnot json\n\n{\"event_count\":3,\"fixtures\":2}\n",
        )
        .unwrap();

        let reader: JsonlReader<Entry> = JsonlReader::new(path);
        assert_eq!(reader.read_all().unwrap(), vec![entry(1), entry(3)]);
    }

    #[test]
    fn test_tail() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("history.jsonl");
        let writer: JsonlWriter<Entry> = JsonlWriter::new(path.clone());
        for n in 1..=5 {
            writer.append(&entry(n)).unwrap();
        }

        let reader: JsonlReader<Entry> = JsonlReader::new(path);
        assert_eq!(reader.tail(2).unwrap(), vec![entry(4), entry(5)]);
        assert_eq!(reader.tail(10).unwrap().len(), 5);
    }
}
