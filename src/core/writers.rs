//! Writers for graph artifacts and label files.
//!
//! Graphs are written in the node-link JSON layout read back by
//! [`load_graph_artifact`](super::loaders::load_graph_artifact), so extracted
//! samples can be fed straight into a scan-graph dataset root.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use thiserror::Error;

use super::graph::Graph;
use super::loaders::{NodeLinkEdge, NodeLinkGraph, NodeLinkNode};

/// Errors that can occur during write operations.
#[derive(Error, Debug)]
pub enum WriteError {
    /// Failed to create parent directories.
    #[error("failed to create parent directories for '{path}': {source}")]
    CreateDirectory {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to create or open file for writing.
    #[error("failed to create file '{path}': {source}")]
    CreateFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to write data to file.
    #[error("failed to write to file '{path}': {source}")]
    WriteFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// JSON has no encoding for NaN or infinity.
    #[error("cannot write '{path}': {what} is not finite")]
    NonFinite { path: String, what: String },

    /// JSON encoding error.
    #[error("JSON write error for '{path}': {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Result type for write operations.
pub type Result<T> = std::result::Result<T, WriteError>;

/// Creates parent directories for a file path if they don't exist.
fn ensure_parent_dirs(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| WriteError::CreateDirectory {
                path: parent.display().to_string(),
                source: e,
            })?;
        }
    }
    Ok(())
}

/// Creates a buffered writer for the given path.
fn create_buffered_writer(path: &Path) -> Result<BufWriter<File>> {
    let file = File::create(path).map_err(|e| WriteError::CreateFile {
        path: path.display().to_string(),
        source: e,
    })?;
    Ok(BufWriter::new(file))
}

fn check_finite(path: &Path, graph: &Graph) -> Result<()> {
    let non_finite = |what: String| WriteError::NonFinite {
        path: path.display().to_string(),
        what,
    };

    for (i, features) in graph.node_features.iter().enumerate() {
        if features.iter().any(|v| !v.is_finite()) {
            return Err(non_finite(format!("feature of node {}", i)));
        }
    }
    for (&(a, b), w) in graph.edges.iter().zip(&graph.edge_weights) {
        if !w.is_finite() {
            return Err(non_finite(format!("weight of edge ({}, {})", a, b)));
        }
    }
    Ok(())
}

/// Write a graph as a node-link JSON artifact.
///
/// Nodes get ids `0..n` in order with their features under `x`; every
/// undirected edge is written once as a link carrying its `weight`.
///
/// # Errors
///
/// Returns `WriteError::NonFinite` if a feature or weight is NaN or infinite,
/// and an error if parent directories or the file cannot be created, or the
/// JSON cannot be written. Nothing is written for a non-finite graph.
pub fn write_graph_artifact(path: &Path, graph: &Graph) -> Result<()> {
    check_finite(path, graph)?;
    ensure_parent_dirs(path)?;
    let mut writer = create_buffered_writer(path)?;

    let artifact = NodeLinkGraph {
        directed: false,
        multigraph: false,
        nodes: graph
            .node_features
            .iter()
            .enumerate()
            .map(|(i, x)| NodeLinkNode {
                id: i.into(),
                x: x.clone(),
            })
            .collect(),
        links: graph
            .edges
            .iter()
            .zip(&graph.edge_weights)
            .map(|(&(a, b), &weight)| NodeLinkEdge {
                source: a.into(),
                target: b.into(),
                weight,
            })
            .collect(),
    };

    serde_json::to_writer(&mut writer, &artifact).map_err(|e| WriteError::Json {
        path: path.display().to_string(),
        source: e,
    })?;

    writer.flush().map_err(|e| WriteError::WriteFile {
        path: path.display().to_string(),
        source: e,
    })
}

/// Write a label file holding a single class token followed by a newline.
pub fn write_label(path: &Path, token: &str) -> Result<()> {
    ensure_parent_dirs(path)?;
    let mut writer = create_buffered_writer(path)?;

    writeln!(writer, "{}", token.trim())
        .and_then(|_| writer.flush())
        .map_err(|e| WriteError::WriteFile {
            path: path.display().to_string(),
            source: e,
        })
}
