//! Conversion of one raw sample into a graph and its label token.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::GraphConfig;
use crate::core::geometry::{decimate, Point};
use crate::core::graph::Graph;
use crate::core::loaders::{load_graph_artifact, load_label_token, load_point_cloud, LoaderError};
use crate::processors::knn::{build_knn_graph, GraphError};

/// Errors that can occur while processing a single sample.
#[derive(Debug, Error)]
pub enum SampleError {
    #[error("failed to deserialize '{path}': {source}")]
    Deserialization {
        path: PathBuf,
        #[source]
        source: LoaderError,
    },

    #[error("failed to read label file '{path}': {source}")]
    Label {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot build graph from '{path}': {source}")]
    Graph {
        path: PathBuf,
        #[source]
        source: GraphError,
    },
}

/// Shape of a raw sample artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    /// Node-link JSON graph, adapted as is.
    PrebuiltGraph,
    /// Raw points (`.ply`, `.csv`, `.bin`), turned into a KNN graph.
    PointCloud,
}

impl ArtifactKind {
    /// Classify an artifact by its file extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "json" => Some(ArtifactKind::PrebuiltGraph),
            "ply" | "csv" | "bin" => Some(ArtifactKind::PointCloud),
            _ => None,
        }
    }
}

/// How raw point clouds become graphs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleOptions {
    /// Neighbors per node.
    pub knn_k: usize,
    /// Keep every Nth point before building the graph.
    pub decimation: Option<usize>,
}

impl Default for SampleOptions {
    fn default() -> Self {
        Self {
            knn_k: 1,
            decimation: Some(4),
        }
    }
}

impl From<&GraphConfig> for SampleOptions {
    fn from(config: &GraphConfig) -> Self {
        Self {
            knn_k: config.knn_k,
            decimation: config.decimate.then_some(config.decimation),
        }
    }
}

/// A processed sample: its graph plus the raw label token.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub graph: Graph,
    pub label: String,
}

/// Decimate a point set and connect it into a KNN graph.
pub fn graph_from_points(points: &[Point], options: &SampleOptions) -> Result<Graph, GraphError> {
    match options.decimation {
        Some(stride) if stride > 1 => build_knn_graph(&decimate(points, stride), options.knn_k),
        _ => build_knn_graph(points, options.knn_k),
    }
}

/// Process one `(artifact, label file)` pair.
///
/// Pre-built graph artifacts are adapted directly, keeping their nodes, edges
/// and weights. Point cloud artifacts are decimated per `options` and turned
/// into a KNN graph. The label file's content is trimmed to give the token.
///
/// # Errors
///
/// * `SampleError::Deserialization` - the artifact is missing, malformed or of
///   an unknown type
/// * `SampleError::Graph` - too few points remain for the neighbor count
/// * `SampleError::Label` - the label file cannot be read
pub fn process_sample(
    artifact: &Path,
    label_file: &Path,
    options: &SampleOptions,
) -> Result<Sample, SampleError> {
    let deserialization = |source: LoaderError| SampleError::Deserialization {
        path: artifact.to_path_buf(),
        source,
    };

    let graph = match ArtifactKind::from_path(artifact) {
        Some(ArtifactKind::PrebuiltGraph) => load_graph_artifact(artifact).map_err(deserialization)?,
        Some(ArtifactKind::PointCloud) => {
            let cloud = load_point_cloud(artifact).map_err(deserialization)?;
            graph_from_points(&cloud.to_coords(), options).map_err(|source| SampleError::Graph {
                path: artifact.to_path_buf(),
                source,
            })?
        }
        None => {
            return Err(deserialization(LoaderError::UnsupportedFormat(
                artifact.to_path_buf(),
            )))
        }
    };

    let label = load_label_token(label_file).map_err(|source| SampleError::Label {
        path: label_file.to_path_buf(),
        source,
    })?;

    Ok(Sample { graph, label })
}
