//! Data loaders for point clouds, graph artifacts and label files.
//!
//! This module provides parsers for:
//! - Cartesian point cloud CSV files (x, y, z columns)
//! - ASCII PLY point cloud files
//! - KITTI velodyne scans (packed little-endian `f32` x, y, z, reflectance)
//! - Pre-built graph artifacts in node-link JSON layout
//! - Plain-text label files holding a single class token

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use csv::ReaderBuilder;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::geometry::Point;
use super::graph::{EdgeSet, Graph};

/// Errors that can occur during file loading.
#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Empty file: {0}")]
    EmptyFile(PathBuf),

    #[error("Invalid PLY file: {0}")]
    InvalidPly(String),

    #[error("Missing required columns: {0}")]
    MissingColumns(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Malformed graph artifact: {0}")]
    MalformedGraph(String),

    #[error("Unsupported artifact extension: {0}")]
    UnsupportedFormat(PathBuf),
}

/// Result type for loader operations.
pub type Result<T> = std::result::Result<T, LoaderError>;

/// Container for 3D point cloud data.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PointCloud {
    /// X coordinates of all points.
    pub x: Vec<f32>,
    /// Y coordinates of all points.
    pub y: Vec<f32>,
    /// Z coordinates of all points.
    pub z: Vec<f32>,
}

impl PointCloud {
    /// Creates a new empty point cloud.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new point cloud with pre-allocated capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            x: Vec::with_capacity(capacity),
            y: Vec::with_capacity(capacity),
            z: Vec::with_capacity(capacity),
        }
    }

    /// Returns the number of points in the cloud.
    #[inline]
    pub fn len(&self) -> usize {
        self.x.len()
    }

    /// Returns true if the point cloud is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    /// Converts point cloud to a vector of [x, y, z] coordinate arrays.
    pub fn to_coords(&self) -> Vec<Point> {
        (0..self.len())
            .map(|i| [self.x[i], self.y[i], self.z[i]])
            .collect()
    }

    /// Adds a point to the cloud.
    #[inline]
    pub fn push(&mut self, x: f32, y: f32, z: f32) {
        self.x.push(x);
        self.y.push(y);
        self.z.push(z);
    }
}

/// Load a Cartesian point cloud from a CSV file with x, y, z columns.
///
/// Columns named `x`, `y`, `z` (case-insensitive) are used when present,
/// otherwise the first three columns.
///
/// # Errors
///
/// Returns an error if the file cannot be read, a coordinate does not parse,
/// or the file has no data rows.
pub fn load_cartesian_csv<P: AsRef<Path>>(path: P) -> Result<PointCloud> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(BufReader::new(file));

    let headers = reader.headers()?.clone();
    let col_map: HashMap<String, usize> = headers
        .iter()
        .enumerate()
        .map(|(i, name)| (name.trim().to_lowercase(), i))
        .collect();

    let x_idx = col_map.get("x").copied().unwrap_or(0);
    let y_idx = col_map.get("y").copied().unwrap_or(1);
    let z_idx = col_map.get("z").copied().unwrap_or(2);

    let mut cloud = PointCloud::with_capacity(4096);

    for (row, result) in reader.records().enumerate() {
        let record = result?;
        let field = |idx: usize, axis: &str| -> Result<f32> {
            record
                .get(idx)
                .and_then(|s| s.trim().parse().ok())
                .ok_or_else(|| {
                    LoaderError::ParseError(format!(
                        "row {}: invalid {} value in {}",
                        row + 1,
                        axis,
                        path.display()
                    ))
                })
        };
        cloud.push(field(x_idx, "x")?, field(y_idx, "y")?, field(z_idx, "z")?);
    }

    if cloud.is_empty() {
        return Err(LoaderError::EmptyFile(path.to_path_buf()));
    }

    Ok(cloud)
}

const MAX_PREALLOCATED_POINTS: usize = 1 << 20;

/// Load a point cloud from an ASCII PLY file.
///
/// Only the `x`, `y`, `z` properties of the `vertex` element are read; other
/// vertex properties and other elements (such as mesh faces) are skipped.
///
/// # Errors
///
/// Returns an error if the file is not an ASCII PLY, lacks a coordinate
/// property, or holds fewer vertices than its header declares.
pub fn load_ply<P: AsRef<Path>>(path: P) -> Result<PointCloud> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let mut lines = BufReader::new(file).lines();

    let first_line = lines
        .next()
        .ok_or_else(|| LoaderError::InvalidPly("Empty file".to_string()))??;

    if !first_line.trim().starts_with("ply") {
        return Err(LoaderError::InvalidPly(format!(
            "{} is not a PLY file",
            path.display()
        )));
    }

    // (name, count) of every element in header order, plus vertex property names.
    let mut elements: Vec<(String, usize)> = Vec::new();
    let mut prop_names: Vec<String> = Vec::new();
    let mut header_done = false;

    for line in &mut lines {
        let line = line?;
        let stripped = line.trim();
        let mut tokens = stripped.split_whitespace();

        match tokens.next() {
            Some("format") if !stripped.contains("ascii") => {
                return Err(LoaderError::InvalidPly(format!(
                    "only ASCII PLY is supported, found '{}'",
                    stripped
                )));
            }
            Some("element") => {
                let name = tokens.next().unwrap_or_default().to_string();
                let count = tokens
                    .next()
                    .and_then(|count| count.parse::<usize>().ok())
                    .ok_or_else(|| LoaderError::InvalidPly(format!("Bad element line: '{}'", stripped)))?;
                elements.push((name, count));
            }
            Some("property") => {
                let in_vertex = elements.last().is_some_and(|(name, _)| name == "vertex");
                if in_vertex {
                    if let Some(name) = tokens.last() {
                        prop_names.push(name.to_string());
                    }
                }
            }
            Some("end_header") => {
                header_done = true;
                break;
            }
            _ => {}
        }
    }

    if !header_done {
        return Err(LoaderError::InvalidPly("Missing end_header".to_string()));
    }

    let vertex_element = elements
        .iter()
        .position(|(name, _)| name == "vertex")
        .ok_or_else(|| LoaderError::InvalidPly("No vertex count in header".to_string()))?;
    let num_vertices = elements[vertex_element].1;
    let rows_before: usize = elements[..vertex_element]
        .iter()
        .try_fold(0usize, |acc, (_, count)| acc.checked_add(*count))
        .ok_or_else(|| LoaderError::InvalidPly("Element counts overflow".to_string()))?;

    let position = |axis: &str| {
        prop_names
            .iter()
            .position(|name| name == axis)
            .ok_or_else(|| LoaderError::MissingColumns(axis.to_string()))
    };
    let (x_idx, y_idx, z_idx) = (position("x")?, position("y")?, position("z")?);

    // Header counts are untrusted; only pre-allocate a bounded amount.
    let mut cloud = PointCloud::with_capacity(num_vertices.min(MAX_PREALLOCATED_POINTS));

    for line in lines.skip(rows_before).take(num_vertices) {
        let line = line?;
        let values: Vec<&str> = line.split_whitespace().collect();

        if values.len() < prop_names.len() {
            continue;
        }

        let parse = |idx: usize| -> Result<f32> {
            values[idx]
                .parse()
                .map_err(|_| LoaderError::ParseError(format!("Invalid coordinate: {}", values[idx])))
        };
        cloud.push(parse(x_idx)?, parse(y_idx)?, parse(z_idx)?);
    }

    if cloud.len() < num_vertices {
        return Err(LoaderError::InvalidPly(format!(
            "Expected {} vertices, found {}",
            num_vertices,
            cloud.len()
        )));
    }

    Ok(cloud)
}

/// Load a KITTI velodyne scan.
///
/// The file is a flat array of little-endian `f32` quadruples
/// `(x, y, z, reflectance)`; reflectance is dropped.
pub fn load_velodyne_bin<P: AsRef<Path>>(path: P) -> Result<PointCloud> {
    const RECORD_BYTES: usize = 16;

    let path = path.as_ref();
    let bytes = fs::read(path)?;

    if bytes.len() % RECORD_BYTES != 0 {
        return Err(LoaderError::ParseError(format!(
            "{}: {} bytes is not a whole number of 16-byte points",
            path.display(),
            bytes.len()
        )));
    }

    let mut cloud = PointCloud::with_capacity(bytes.len() / RECORD_BYTES);
    for record in bytes.chunks_exact(RECORD_BYTES) {
        let coord = |i: usize| f32::from_le_bytes([record[i], record[i + 1], record[i + 2], record[i + 3]]);
        cloud.push(coord(0), coord(4), coord(8));
    }

    Ok(cloud)
}

/// Load any supported raw point cloud, chosen by file extension.
///
/// `.ply`, `.csv` and `.bin` (KITTI velodyne) are recognized.
pub fn load_point_cloud<P: AsRef<Path>>(path: P) -> Result<PointCloud> {
    let path = path.as_ref();
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    match ext.as_deref() {
        Some("ply") => load_ply(path),
        Some("csv") => load_cartesian_csv(path),
        Some("bin") => load_velodyne_bin(path),
        _ => Err(LoaderError::UnsupportedFormat(path.to_path_buf())),
    }
}

/// Graph serialized in node-link layout.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct NodeLinkGraph {
    #[serde(default)]
    pub directed: bool,
    #[serde(default)]
    pub multigraph: bool,
    pub nodes: Vec<NodeLinkNode>,
    #[serde(alias = "edges")]
    pub links: Vec<NodeLinkEdge>,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct NodeLinkNode {
    pub id: serde_json::Value,
    #[serde(default)]
    pub x: Vec<f32>,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct NodeLinkEdge {
    pub source: serde_json::Value,
    pub target: serde_json::Value,
    #[serde(default = "default_edge_weight")]
    pub weight: f32,
}

fn default_edge_weight() -> f32 {
    1.0
}

/// Load a pre-built weighted graph from a node-link JSON artifact.
///
/// Nodes keep their order of appearance, node `x` attributes become the
/// feature vectors, and link weights are carried over (1.0 when absent).
/// A link listed in both directions collapses to one undirected edge.
///
/// # Errors
///
/// Returns `LoaderError::Json` for invalid JSON and
/// `LoaderError::MalformedGraph` for duplicate node ids, links to unknown
/// nodes, self-loops or inconsistent feature lengths.
pub fn load_graph_artifact<P: AsRef<Path>>(path: P) -> Result<Graph> {
    let file = File::open(path.as_ref())?;
    let raw: NodeLinkGraph = serde_json::from_reader(BufReader::new(file))?;
    graph_from_node_link(raw)
}

pub(crate) fn graph_from_node_link(raw: NodeLinkGraph) -> Result<Graph> {
    let mut positions: HashMap<String, usize> = HashMap::with_capacity(raw.nodes.len());
    let mut node_features = Vec::with_capacity(raw.nodes.len());

    let feature_dim = raw.nodes.first().map_or(0, |n| n.x.len());

    for (i, node) in raw.nodes.into_iter().enumerate() {
        let key = node.id.to_string();
        if positions.insert(key.clone(), i).is_some() {
            return Err(LoaderError::MalformedGraph(format!("duplicate node id {}", key)));
        }
        if node.x.len() != feature_dim {
            return Err(LoaderError::MalformedGraph(format!(
                "node {} has {} features, expected {}",
                key,
                node.x.len(),
                feature_dim
            )));
        }
        node_features.push(node.x);
    }

    let lookup = |id: &serde_json::Value| {
        positions
            .get(&id.to_string())
            .copied()
            .ok_or_else(|| LoaderError::MalformedGraph(format!("link references unknown node {}", id)))
    };

    let mut edge_set = EdgeSet::new();
    for link in &raw.links {
        let a = lookup(&link.source)?;
        let b = lookup(&link.target)?;
        if !edge_set.insert(a, b, link.weight) {
            return Err(LoaderError::MalformedGraph(format!("self-loop on node {}", link.source)));
        }
    }

    Ok(Graph::from_edge_set(node_features, edge_set))
}

/// Read a label file and return its whitespace-trimmed token.
pub fn load_label_token<P: AsRef<Path>>(path: P) -> std::io::Result<String> {
    let content = fs::read_to_string(path)?;
    Ok(content.trim().to_string())
}
