//! CSV input and output
//!
//! Output is written to a temporary sibling file and renamed over the
//! target only once every row is written, so the target path never holds
//! a partial result.

use crate::error::{Result, ScreenError};
use crate::types::{AddressRecord, OutputRow};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Parsed input file
#[derive(Debug, Clone)]
pub struct InputBatch {
    /// Input header in file order
    pub columns: Vec<String>,
    pub records: Vec<AddressRecord>,
}

impl InputBatch {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Read every row of `path`; the address comes from `address_column`
pub fn read_addresses(path: &Path, address_column: &str) -> Result<InputBatch> {
    if !path.exists() {
        return Err(ScreenError::Input(format!("CSV file not found: {}", path.display())));
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::Headers)
        .from_path(path)
        .map_err(|e| ScreenError::Input(format!("cannot open {}: {}", path.display(), e)))?;

    let columns: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    let address_idx = columns
        .iter()
        .position(|c| c == address_column)
        .ok_or_else(|| {
            ScreenError::Input(format!(
                "Column '{}' not found in CSV. Available columns: {:?}",
                address_column, columns
            ))
        })?;

    let mut records = Vec::new();
    for (index, row) in reader.records().enumerate() {
        let row = row.map_err(|e| ScreenError::Input(format!("row {}: {}", index + 1, e)))?;
        let values: Vec<(String, String)> = columns
            .iter()
            .cloned()
            .zip(row.iter().map(str::to_string).chain(std::iter::repeat(String::new())))
            .collect();
        let address = row.get(address_idx).unwrap_or_default().trim().to_string();
        records.push(AddressRecord {
            index,
            address,
            columns: values,
        });
    }

    info!("Read {} addresses from {}", records.len(), path.display());
    Ok(InputBatch { columns, records })
}

/// Write header and rows to `path`, replacing it atomically
pub fn write_rows(path: &Path, header: &[String], rows: &[OutputRow]) -> Result<()> {
    let tmp = partial_path(path);
    let written = write_to(&tmp, header, rows);
    if let Err(e) = written {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }
    fs::rename(&tmp, path)?;
    info!("Results written to {}", path.display());
    Ok(())
}

fn write_to(path: &Path, header: &[String], rows: &[OutputRow]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(header)?;
    for row in rows {
        writer.write_record(&row.values)?;
    }
    writer.flush()?;
    Ok(())
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".partial");
    path.with_file_name(name)
}

/// `dir/name.csv` -> `dir/name_screened.csv`
pub fn default_output_path(input: &Path) -> PathBuf {
    let stem = input.file_stem().map(|s| s.to_string_lossy()).unwrap_or_default();
    let file_name = match input.extension() {
        Some(ext) => format!("{}_screened.{}", stem, ext.to_string_lossy()),
        None => format!("{}_screened", stem),
    };
    input.with_file_name(file_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_input(dir: &TempDir, content: &str) -> PathBuf {
        let path = dir.path().join("input.csv");
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_reads_passthrough_columns_and_duplicates() {
        let dir = TempDir::new().unwrap();
        let path = write_input(
            &dir,
            "transaction_id,address,amount\ntx1,addrA,100.5\ntx2, addrB ,250\ntx3,addrA,75.3\n",
        );

        let batch = read_addresses(&path, "address").unwrap();
        assert_eq!(batch.columns, ["transaction_id", "address", "amount"]);
        assert_eq!(batch.len(), 3);
        assert_eq!(batch.records[1].address, "addrB");
        assert_eq!(batch.records[2].address, "addrA");
        assert_eq!(batch.records[2].index, 2);
        assert_eq!(
            batch.records[0].columns,
            vec![
                ("transaction_id".to_string(), "tx1".to_string()),
                ("address".to_string(), "addrA".to_string()),
                ("amount".to_string(), "100.5".to_string()),
            ]
        );
    }

    #[test]
    fn test_missing_column_is_input_error() {
        let dir = TempDir::new().unwrap();
        let path = write_input(&dir, "wallet\nabc\n");
        let err = read_addresses(&path, "address").unwrap_err();
        assert!(matches!(err, ScreenError::Input(msg) if msg.contains("address")));
    }

    #[test]
    fn test_missing_file_is_input_error() {
        let err = read_addresses(Path::new("/nonexistent/input.csv"), "address").unwrap_err();
        assert!(matches!(err, ScreenError::Input(_)));
    }

    #[test]
    fn test_header_only_file_is_empty_batch() {
        let dir = TempDir::new().unwrap();
        let path = write_input(&dir, "address\n");
        let batch = read_addresses(&path, "address").unwrap();
        assert!(batch.is_empty());
    }

    #[test]
    fn test_write_replaces_target() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.csv");
        fs::write(&path, "stale").unwrap();

        let header = vec!["address".to_string(), "screenStatus".to_string()];
        let rows = vec![OutputRow {
            values: vec!["addrA".to_string(), "complete".to_string()],
        }];
        write_rows(&path, &header, &rows).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content, "address,screenStatus\naddrA,complete\n");
        assert!(!partial_path(&path).exists());
    }

    #[test]
    fn test_default_output_path() {
        assert_eq!(
            default_output_path(Path::new("/data/addresses.csv")),
            PathBuf::from("/data/addresses_screened.csv")
        );
        assert_eq!(
            default_output_path(Path::new("list")),
            PathBuf::from("list_screened")
        );
    }
}
