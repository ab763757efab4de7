//! CSV snapshot of every persisted record, rewritten in full on each flush.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use nhatro_core::StructuredRecord;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};
use uuid::Uuid;

/// Column order of the flat file.
pub const FLAT_FILE_COLUMNS: [&str; 10] = [
    "id",
    "timestamp",
    "content",
    "area",
    "district",
    "ward",
    "address",
    "amenities",
    "price",
    "contact",
];

#[derive(Debug, Error)]
pub enum FlatFileError {
    #[error("{action} {}: {source}", .path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("encoding rows for {}: {source}", .path.display())]
    Encode {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FlatRow {
    id: String,
    timestamp: DateTime<Utc>,
    content: String,
    area: Option<f64>,
    district: Option<String>,
    ward: Option<String>,
    address: Option<String>,
    amenities: String,
    price: i64,
    contact: Option<String>,
}

impl From<&StructuredRecord> for FlatRow {
    fn from(record: &StructuredRecord) -> Self {
        Self {
            id: record.id.clone(),
            timestamp: record.timestamp,
            content: record.content.clone(),
            area: record.area,
            district: record.district.clone(),
            ward: record.ward.clone(),
            address: record.address.clone(),
            amenities: record.amenities_joined(),
            price: record.price,
            contact: record.contact.clone(),
        }
    }
}

impl From<FlatRow> for StructuredRecord {
    fn from(row: FlatRow) -> Self {
        let amenities: BTreeSet<String> = row
            .amenities
            .split(',')
            .map(str::trim)
            .filter(|label| !label.is_empty())
            .map(str::to_string)
            .collect();
        Self {
            id: row.id,
            timestamp: row.timestamp,
            content: row.content,
            area: row.area,
            district: row.district,
            ward: row.ward,
            address: row.address,
            amenities,
            price: row.price,
            contact: row.contact,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FlatFileSnapshot {
    pub path: PathBuf,
    pub rows: usize,
    pub byte_size: usize,
}

#[derive(Debug, Clone)]
pub struct FlatFileStore {
    path: PathBuf,
}

impl FlatFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Previously persisted records. A missing file is an empty store;
    /// rows that cannot be decoded are skipped.
    pub async fn load(&self) -> Result<Vec<StructuredRecord>, FlatFileError> {
        let bytes = match fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %self.path.display(), "no previous snapshot; starting empty");
                return Ok(Vec::new());
            }
            Err(source) => {
                return Err(FlatFileError::Io {
                    action: "reading",
                    path: self.path.clone(),
                    source,
                })
            }
        };

        let mut reader = csv::Reader::from_reader(bytes.as_slice());
        let mut records = Vec::new();
        let mut skipped = 0usize;
        for (line, row) in reader.deserialize::<FlatRow>().enumerate() {
            match row {
                Ok(row) => records.push(StructuredRecord::from(row)),
                Err(err) => {
                    skipped += 1;
                    warn!(path = %self.path.display(), row = line + 1, error = %err, "skipping unreadable row");
                }
            }
        }

        info!(
            path = %self.path.display(),
            rows = records.len(),
            skipped,
            "loaded previous snapshot"
        );
        Ok(records)
    }

    /// Replace the file with `records` via a temp file and an atomic rename.
    pub async fn write_all(
        &self,
        records: &[StructuredRecord],
    ) -> Result<FlatFileSnapshot, FlatFileError> {
        let bytes = self.encode(records)?;

        let parent = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent)
            .await
            .map_err(|source| self.io_error("creating directory for", source))?;

        let file_name = self
            .path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "snapshot".to_string());
        let temp_path = parent.join(format!(".{file_name}.{}.tmp", Uuid::new_v4()));

        if let Err(err) = write_synced(&temp_path, &bytes).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(FlatFileError::Io {
                action: "writing temp snapshot",
                path: temp_path,
                source: err,
            });
        }

        if let Err(source) = fs::rename(&temp_path, &self.path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(self.io_error("atomically replacing", source));
        }

        info!(path = %self.path.display(), rows = records.len(), "snapshot written");
        Ok(FlatFileSnapshot {
            path: self.path.clone(),
            rows: records.len(),
            byte_size: bytes.len(),
        })
    }

    fn encode(&self, records: &[StructuredRecord]) -> Result<Vec<u8>, FlatFileError> {
        let encode_error = |source| FlatFileError::Encode {
            path: self.path.clone(),
            source,
        };

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(Vec::new());
        writer.write_record(FLAT_FILE_COLUMNS).map_err(encode_error)?;
        for record in records {
            writer
                .serialize(FlatRow::from(record))
                .map_err(encode_error)?;
        }
        writer
            .into_inner()
            .map_err(|err| self.io_error("buffering", err.into_error()))
    }

    fn io_error(&self, action: &'static str, source: std::io::Error) -> FlatFileError {
        FlatFileError::Io {
            action,
            path: self.path.clone(),
            source,
        }
    }
}

async fn write_synced(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = fs::OpenOptions::new()
        .create_new(true)
        .write(true)
        .open(path)
        .await?;
    file.write_all(bytes).await?;
    file.flush().await?;
    file.sync_all().await?;
    Ok(())
}
