//! K-nearest-neighbor graph construction for point clouds.
//!
//! Every point becomes a node whose features are its coordinates. Each node
//! is joined to its `k` closest other points by an undirected edge weighted
//! `1 / (1 + d)`, where `d` is the Euclidean distance between the endpoints.
//!
//! # Example
//!
//! ```no_run
//! use lidar_graph_pipeline::processors::knn::build_knn_graph;
//!
//! let points = vec![[0.0f32, 0.0, 0.0], [1.0, 0.0, 0.0], [5.0, 0.0, 0.0]];
//! let graph = build_knn_graph(&points, 1).unwrap();
//! assert_eq!(graph.num_nodes(), 3);
//! ```

use std::cmp::Ordering;

use rayon::prelude::*;
use thiserror::Error;

use crate::core::geometry::Point;
use crate::core::graph::{EdgeSet, Graph};

/// Errors that can occur while building a neighbor graph.
#[derive(Debug, Error, PartialEq)]
pub enum GraphError {
    #[error("{points} points cannot give every node {k} neighbors")]
    InsufficientPoints { points: usize, k: usize },
}

/// Similarity weight for an edge of length `distance`.
///
/// Strictly decreasing in distance, in `(0, 1]`, equal to 1 for coincident points.
#[inline]
pub fn edge_weight(distance: f64) -> f32 {
    (1.0 / (1.0 + distance)) as f32
}

#[inline]
fn distance(a: &Point, b: &Point) -> f64 {
    let dx = a[0] as f64 - b[0] as f64;
    let dy = a[1] as f64 - b[1] as f64;
    let dz = a[2] as f64 - b[2] as f64;
    (dx * dx + dy * dy + dz * dz).sqrt()
}

#[inline]
fn by_distance_then_index(a: &(usize, f64), b: &(usize, f64)) -> Ordering {
    a.1.total_cmp(&b.1).then(a.0.cmp(&b.0))
}

/// Find the `k` nearest other points of every point.
///
/// Returns, per point, `(neighbor_index, distance)` pairs sorted by distance,
/// ties going to the lower index. The point itself is never included.
///
/// # Algorithm
///
/// 1. **Pairwise distances**: each row of the distance matrix is computed
///    independently, rows in parallel with rayon
/// 2. **Partial selection**: `select_nth_unstable_by` isolates the `k`
///    smallest entries of the row without a full sort
/// 3. **Ordering**: only the selected `k` entries are sorted
///
/// # Errors
///
/// Returns `GraphError::InsufficientPoints` if there are fewer than `k + 1` points.
pub fn knn_indices(points: &[Point], k: usize) -> Result<Vec<Vec<(usize, f64)>>, GraphError> {
    let n = points.len();
    if n < k + 1 {
        return Err(GraphError::InsufficientPoints { points: n, k });
    }

    if k == 0 {
        return Ok(vec![Vec::new(); n]);
    }

    let rows: Vec<Vec<(usize, f64)>> = points
        .par_iter()
        .enumerate()
        .map(|(i, p)| {
            let mut row: Vec<(usize, f64)> = points
                .iter()
                .enumerate()
                .filter(|&(j, _)| j != i)
                .map(|(j, q)| (j, distance(p, q)))
                .collect();

            if k < row.len() {
                row.select_nth_unstable_by(k - 1, by_distance_then_index);
                row.truncate(k);
            }
            row.sort_unstable_by(by_distance_then_index);
            row
        })
        .collect();

    Ok(rows)
}

/// Build an undirected KNN graph over a point set.
///
/// Each point asks for an edge to each of its `k` nearest neighbors. Edges go
/// through an [`EdgeSet`], so a pair that is mutually nearest yields one edge.
/// Node features are the point coordinates.
///
/// # Errors
///
/// Returns `GraphError::InsufficientPoints` if there are fewer than `k + 1` points.
pub fn build_knn_graph(points: &[Point], k: usize) -> Result<Graph, GraphError> {
    let neighbors = knn_indices(points, k)?;

    let mut edge_set = EdgeSet::new();
    for (i, row) in neighbors.iter().enumerate() {
        for &(j, d) in row {
            edge_set.insert(i, j, edge_weight(d));
        }
    }

    let node_features = points.iter().map(|p| p.to_vec()).collect();
    let graph = Graph::from_edge_set(node_features, edge_set);

    log::debug!(
        "knn graph: {} nodes, {} edges (k={})",
        graph.num_nodes(),
        graph.num_edges(),
        k
    );

    Ok(graph)
}
