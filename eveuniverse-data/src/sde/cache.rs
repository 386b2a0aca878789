//! On-disk cache file format for supplementary datasets.
//!
//! A cache file holds one whole remote resource: a fixed header followed by
//! a `bincode` payload with the fetch time and every row as a JSON string.
//! Rows stay JSON because `bincode` cannot encode self-describing values.

use std::fs::{self, File};
use std::io::Read;

use bincode::{deserialize_from, serialize_into};
use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};
use eveuniverse_core::RawRecord;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// File identifier for supplementary dataset caches.
pub(crate) const SDE_CACHE_MAGIC: [u8; 4] = *b"EVSD";

/// Supported version of the cache format.
pub(crate) const SDE_CACHE_VERSION: u16 = 1;

#[derive(Debug, Serialize)]
struct SdeCacheFile<'a> {
    magic: [u8; 4],
    version: u16,
    fetched_at: i64,
    rows: &'a [String],
}

/// Fields following the header.
#[derive(Debug, Deserialize)]
struct SdeCachePayload {
    fetched_at: i64,
    rows: Vec<String>,
}

/// A cached dataset read back from disk.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedDataset {
    /// When the dataset was fetched from the remote.
    pub fetched_at: DateTime<Utc>,
    /// Every row of the resource.
    pub rows: Vec<RawRecord>,
}

/// Error emitted when loading a cache file.
#[derive(Debug, Error)]
pub enum SdeCacheError {
    /// The file could not be read.
    #[error("failed to read dataset cache from {path}: {source}")]
    Io {
        /// Cache file location.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The payload could not be decoded.
    #[error("failed to decode dataset cache from {path}: {source}")]
    Decode {
        /// Cache file location.
        path: Utf8PathBuf,
        /// Decoder error returned by `bincode`.
        #[source]
        source: bincode::Error,
    },
    /// A cached row is not a JSON object.
    #[error("cached row in {path} is not a JSON object: {source}")]
    Row {
        /// Cache file location.
        path: Utf8PathBuf,
        /// JSON decoder error.
        #[source]
        source: serde_json::Error,
    },
    /// The stored fetch time is out of range.
    #[error("dataset cache {path} has an invalid fetch time {seconds}")]
    FetchedAt {
        /// Cache file location.
        path: Utf8PathBuf,
        /// Stored UNIX timestamp.
        seconds: i64,
    },
    /// The file did not contain the expected header.
    #[error("invalid dataset cache magic: expected {expected:?}, found {found:?}")]
    InvalidMagic {
        /// Expected byte sequence.
        expected: [u8; 4],
        /// Sequence read from the file.
        found: [u8; 4],
    },
    /// The reader encountered an unsupported format version.
    #[error("unsupported dataset cache version {found}; supported version is {supported}")]
    UnsupportedVersion {
        /// Version present in the file header.
        found: u16,
        /// Version written by this build.
        supported: u16,
    },
}

/// Error emitted when writing a cache file.
#[derive(Debug, Error)]
pub enum SdeCacheWriteError {
    /// Writing bytes to disk failed.
    #[error("failed to write dataset cache to {path}: {source}")]
    Io {
        /// Destination file path.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// A row could not be rendered as JSON.
    #[error("failed to encode a row for {path}: {source}")]
    Row {
        /// Destination file path.
        path: Utf8PathBuf,
        /// JSON encoder error.
        #[source]
        source: serde_json::Error,
    },
    /// The payload could not be encoded.
    #[error("failed to encode dataset cache for {path}: {source}")]
    Encode {
        /// Destination file path.
        path: Utf8PathBuf,
        /// Encoder failure from `bincode`.
        #[source]
        source: bincode::Error,
    },
}

/// Location of the cache file for `resource` inside `dir`.
#[must_use]
pub fn cache_path(dir: &Utf8Path, resource: &str) -> Utf8PathBuf {
    dir.join(format!("{resource}.sdecache"))
}

/// Persist `rows` fetched at `fetched_at`, creating parent directories.
///
/// Existing files are truncated.
///
/// # Errors
///
/// Returns [`SdeCacheWriteError`] when the file cannot be written or a row
/// cannot be encoded.
pub fn write_cache(
    path: &Utf8Path,
    fetched_at: DateTime<Utc>,
    rows: &[RawRecord],
) -> Result<(), SdeCacheWriteError> {
    let encoded = rows
        .iter()
        .map(serde_json::to_string)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| SdeCacheWriteError::Row {
            path: path.to_path_buf(),
            source,
        })?;
    let io_error = |source| SdeCacheWriteError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_error)?;
    }
    let mut file = File::create(path).map_err(io_error)?;
    let payload = SdeCacheFile {
        magic: SDE_CACHE_MAGIC,
        version: SDE_CACHE_VERSION,
        fetched_at: fetched_at.timestamp(),
        rows: &encoded,
    };
    serialize_into(&mut file, &payload).map_err(|source| SdeCacheWriteError::Encode {
        path: path.to_path_buf(),
        source,
    })?;
    file.sync_all().map_err(io_error)
}

/// Load a cache file written by [`write_cache`].
///
/// # Errors
///
/// Returns [`SdeCacheError`] when the file is missing, has a foreign header
/// or cannot be decoded.
pub fn read_cache(path: &Utf8Path) -> Result<CachedDataset, SdeCacheError> {
    let io_error = |source| SdeCacheError::Io {
        path: path.to_path_buf(),
        source,
    };
    let mut file = File::open(path).map_err(io_error)?;

    let mut magic = [0_u8; 4];
    file.read_exact(&mut magic).map_err(io_error)?;
    if magic != SDE_CACHE_MAGIC {
        return Err(SdeCacheError::InvalidMagic {
            expected: SDE_CACHE_MAGIC,
            found: magic,
        });
    }

    let mut version_bytes = [0_u8; 2];
    file.read_exact(&mut version_bytes).map_err(io_error)?;
    let version = u16::from_le_bytes(version_bytes);
    if version != SDE_CACHE_VERSION {
        return Err(SdeCacheError::UnsupportedVersion {
            found: version,
            supported: SDE_CACHE_VERSION,
        });
    }

    let payload: SdeCachePayload =
        deserialize_from(&mut file).map_err(|source| SdeCacheError::Decode {
            path: path.to_path_buf(),
            source,
        })?;
    let fetched_at = DateTime::from_timestamp(payload.fetched_at, 0).ok_or_else(|| {
        SdeCacheError::FetchedAt {
            path: path.to_path_buf(),
            seconds: payload.fetched_at,
        }
    })?;
    let rows = payload
        .rows
        .iter()
        .map(|row| serde_json::from_str::<RawRecord>(row))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| SdeCacheError::Row {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(CachedDataset { fetched_at, rows })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};
    use serde_json::json;
    use std::io::Write;
    use tempfile::TempDir;

    #[fixture]
    fn cache_dir() -> (TempDir, Utf8PathBuf) {
        let dir = TempDir::new().expect("create temp dir");
        let path = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf-8 path");
        (dir, path)
    }

    fn material_row(type_id: i64, material: i64, quantity: i64) -> RawRecord {
        json!({"typeID": type_id, "materialTypeID": material, "quantity": quantity})
            .as_object()
            .cloned()
            .expect("object literal")
    }

    #[rstest]
    fn written_caches_read_back(cache_dir: (TempDir, Utf8PathBuf)) {
        let (_guard, dir) = cache_dir;
        let path = cache_path(&dir, "invTypeMaterials");
        let fetched_at = DateTime::from_timestamp(1_700_000_000, 0).expect("timestamp");
        let rows = vec![material_row(587, 34, 2_000), material_row(587, 35, 500)];

        write_cache(&path, fetched_at, &rows).expect("write cache");
        let cached = read_cache(&path).expect("read cache");

        assert_eq!(cached.fetched_at, fetched_at);
        assert_eq!(cached.rows, rows);
    }

    #[rstest]
    fn parent_directories_are_created(cache_dir: (TempDir, Utf8PathBuf)) {
        let (_guard, dir) = cache_dir;
        let path = cache_path(&dir.join("nested/deeper"), "industryActivity");

        write_cache(&path, Utc::now(), &[]).expect("write cache");

        assert!(path.exists());
    }

    #[rstest]
    fn foreign_files_are_rejected(cache_dir: (TempDir, Utf8PathBuf)) {
        let (_guard, dir) = cache_dir;
        let path = dir.join("bogus.sdecache");
        let mut file = File::create(&path).expect("create file");
        file.write_all(b"WSPI\x01\x00").expect("write header");

        let err = read_cache(&path).expect_err("invalid magic");

        assert!(matches!(
            err,
            SdeCacheError::InvalidMagic { found, .. } if &found == b"WSPI"
        ));
    }

    #[rstest]
    fn newer_versions_are_rejected(cache_dir: (TempDir, Utf8PathBuf)) {
        let (_guard, dir) = cache_dir;
        let path = dir.join("future.sdecache");
        let mut file = File::create(&path).expect("create file");
        file.write_all(&SDE_CACHE_MAGIC).expect("write magic");
        file.write_all(&9_u16.to_le_bytes()).expect("write version");

        let err = read_cache(&path).expect_err("unsupported version");

        assert!(matches!(
            err,
            SdeCacheError::UnsupportedVersion {
                found: 9,
                supported: SDE_CACHE_VERSION
            }
        ));
    }

    #[rstest]
    fn missing_files_report_io_errors(cache_dir: (TempDir, Utf8PathBuf)) {
        let (_guard, dir) = cache_dir;

        let err = read_cache(&dir.join("absent.sdecache")).expect_err("missing file");

        assert!(matches!(err, SdeCacheError::Io { .. }));
    }
}
