//! On-disk cache of materialized datasets.
//!
//! A cache file holds exactly the `(graphs, raw_labels)` pair produced by a
//! cache-miss materialization. Layout:
//!
//! - Bytes 0-3: magic `LGPC`
//! - Byte 4: format version
//! - Rest: bincode-encoded `(Vec<Graph>, Vec<String>)`
//!
//! Files are written to a sibling temporary path and renamed into place, so a
//! reader never observes a partially written cache.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::SourceKind;
use crate::core::graph::Graph;

const CACHE_MAGIC: [u8; 4] = *b"LGPC";
const CACHE_VERSION: u8 = 1;
const HEADER_LEN: usize = CACHE_MAGIC.len() + 1;

/// File name of the point-cloud source cache inside the dataset root.
pub const POINT_CLOUD_CACHE_NAME: &str = "train.h5.cache";

/// Errors that can occur while reading or writing a dataset cache.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("bincode error: {0}")]
    Encode(#[from] bincode::Error),

    #[error("cache file is truncated ({0} bytes)")]
    Truncated(usize),

    #[error("not a dataset cache file (bad magic bytes)")]
    BadMagic,

    #[error("unsupported cache version {found}, expected {expected}")]
    UnsupportedVersion { found: u8, expected: u8 },

    #[error("cache holds {graphs} graphs but {labels} labels")]
    LengthMismatch { graphs: usize, labels: usize },
}

/// Result type for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;

/// Location of the cache file for a dataset root.
///
/// Scan-graph roots cache next to themselves at `<root>.cache`; the
/// point-cloud source caches inside the root at `<root>/train.h5.cache`.
pub fn cache_path(root: &Path, source: SourceKind) -> PathBuf {
    match source {
        SourceKind::Scans => {
            // Normalizes a trailing separator so `data/` maps to `data.cache`.
            let mut name: OsString = root.components().as_path().as_os_str().to_os_string();
            name.push(".cache");
            PathBuf::from(name)
        }
        SourceKind::PointClouds => root.join(POINT_CLOUD_CACHE_NAME),
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".tmp");
    PathBuf::from(name)
}

/// Read a cached `(graphs, raw_labels)` pair.
///
/// # Errors
///
/// Returns an error if the file cannot be read, does not carry the cache
/// header, was written by another format version, or fails to decode.
pub fn read_cache(path: &Path) -> Result<(Vec<Graph>, Vec<String>)> {
    let data = fs::read(path)?;
    if data.len() < HEADER_LEN {
        return Err(CacheError::Truncated(data.len()));
    }
    if data[..CACHE_MAGIC.len()] != CACHE_MAGIC {
        return Err(CacheError::BadMagic);
    }
    let version = data[CACHE_MAGIC.len()];
    if version != CACHE_VERSION {
        return Err(CacheError::UnsupportedVersion {
            found: version,
            expected: CACHE_VERSION,
        });
    }

    let (graphs, labels): (Vec<Graph>, Vec<String>) = bincode::deserialize(&data[HEADER_LEN..])?;
    if graphs.len() != labels.len() {
        return Err(CacheError::LengthMismatch {
            graphs: graphs.len(),
            labels: labels.len(),
        });
    }

    log::debug!("read {} cached samples from {}", graphs.len(), path.display());
    Ok((graphs, labels))
}

/// Atomically write a `(graphs, raw_labels)` pair to `path`.
///
/// The payload goes to `<path>.tmp` first and is renamed over `path` once
/// fully written. Parent directories are created as needed.
pub fn write_cache(path: &Path, graphs: &[Graph], labels: &[String]) -> Result<()> {
    if graphs.len() != labels.len() {
        return Err(CacheError::LengthMismatch {
            graphs: graphs.len(),
            labels: labels.len(),
        });
    }

    let payload = bincode::serialize(&(graphs, labels))?;
    let mut data = Vec::with_capacity(HEADER_LEN + payload.len());
    data.extend_from_slice(&CACHE_MAGIC);
    data.push(CACHE_VERSION);
    data.extend_from_slice(&payload);

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let temp = temp_path(path);
    fs::write(&temp, &data)?;
    if let Err(e) = fs::rename(&temp, path) {
        let _ = fs::remove_file(&temp);
        return Err(e.into());
    }

    log::debug!(
        "wrote {} samples ({} bytes) to cache {}",
        graphs.len(),
        data.len(),
        path.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn graphs() -> Vec<Graph> {
        vec![
            Graph {
                node_features: vec![vec![0.0, 0.0, 0.0], vec![1.0, 0.0, 0.0]],
                edges: vec![(0, 1)],
                edge_weights: vec![0.5],
            },
            Graph {
                node_features: vec![vec![2.0, 1.0, 0.5]],
                edges: vec![],
                edge_weights: vec![],
            },
        ]
    }

    #[test]
    fn test_cache_path_scans() {
        assert_eq!(
            cache_path(Path::new("data/kitti"), SourceKind::Scans),
            PathBuf::from("data/kitti.cache")
        );
        assert_eq!(
            cache_path(Path::new("data/kitti/"), SourceKind::Scans),
            PathBuf::from("data/kitti.cache")
        );
    }

    #[test]
    fn test_cache_path_point_clouds() {
        assert_eq!(
            cache_path(Path::new("data/modelnet"), SourceKind::PointClouds),
            PathBuf::from("data/modelnet/train.h5.cache")
        );
    }

    #[test]
    fn test_write_then_read() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("root.cache");
        let labels = vec!["Car".to_string(), "Pedestrian".to_string()];

        write_cache(&path, &graphs(), &labels).unwrap();
        let (read_graphs, read_labels) = read_cache(&path).unwrap();

        assert_eq!(read_graphs, graphs());
        assert_eq!(read_labels, labels);
        assert!(!temp_path(&path).exists());
    }

    #[test]
    fn test_write_replaces_existing() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("root.cache");

        write_cache(&path, &graphs(), &["a".to_string(), "b".to_string()]).unwrap();
        write_cache(&path, &graphs()[..1], &["c".to_string()]).unwrap();

        let (read_graphs, read_labels) = read_cache(&path).unwrap();
        assert_eq!(read_graphs.len(), 1);
        assert_eq!(read_labels, vec!["c".to_string()]);
    }

    #[test]
    fn test_write_rejects_length_mismatch() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("root.cache");

        let result = write_cache(&path, &graphs(), &["a".to_string()]);
        assert!(matches!(
            result,
            Err(CacheError::LengthMismatch { graphs: 2, labels: 1 })
        ));
        assert!(!path.exists());
    }

    #[test]
    fn test_read_bad_magic() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("root.cache");
        fs::write(&path, b"\x80\x04\x95pickle data").unwrap();

        assert!(matches!(read_cache(&path), Err(CacheError::BadMagic)));
    }

    #[test]
    fn test_read_wrong_version() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("root.cache");
        fs::write(&path, b"LGPC\x09").unwrap();

        assert!(matches!(
            read_cache(&path),
            Err(CacheError::UnsupportedVersion { found: 9, expected: 1 })
        ));
    }

    #[test]
    fn test_read_truncated() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("root.cache");
        fs::write(&path, b"LG").unwrap();

        assert!(matches!(read_cache(&path), Err(CacheError::Truncated(2))));
    }

    #[test]
    fn test_read_missing() {
        let temp_dir = TempDir::new().unwrap();
        let result = read_cache(&temp_dir.path().join("missing.cache"));
        assert!(matches!(result, Err(CacheError::Io(_))));
    }
}
