//! Weighted undirected graphs and their labeled dataset form.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A weighted undirected graph with per-node feature vectors.
///
/// Edges are stored once per unordered node pair as `(i, j)` with `i < j`,
/// aligned index-for-index with `edge_weights`. Self-loops never appear.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Graph {
    /// Feature vector of each node (point coordinates for KNN graphs).
    pub node_features: Vec<Vec<f32>>,
    /// Unordered node pairs, lower index first.
    pub edges: Vec<(usize, usize)>,
    /// Weight of each edge in `edges`.
    pub edge_weights: Vec<f32>,
}

/// Edge set keyed by unordered node pair.
///
/// Inserting `(j, i)` after `(i, j)` overwrites the same entry, so an edge
/// requested from both endpoints collapses to one undirected edge.
#[derive(Debug, Clone, Default)]
pub struct EdgeSet {
    edges: BTreeMap<(usize, usize), f32>,
}

impl EdgeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an undirected edge. Self-loops are ignored and return false.
    #[inline]
    pub fn insert(&mut self, a: usize, b: usize, weight: f32) -> bool {
        if a == b {
            return false;
        }
        let key = if a < b { (a, b) } else { (b, a) };
        self.edges.insert(key, weight);
        true
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.edges.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }
}

impl Graph {
    /// Build a graph from node features and a deduplicated edge set.
    ///
    /// Edges come out sorted by `(i, j)`.
    pub fn from_edge_set(node_features: Vec<Vec<f32>>, edge_set: EdgeSet) -> Self {
        let mut edges = Vec::with_capacity(edge_set.len());
        let mut edge_weights = Vec::with_capacity(edge_set.len());
        for (pair, weight) in edge_set.edges {
            edges.push(pair);
            edge_weights.push(weight);
        }
        Self {
            node_features,
            edges,
            edge_weights,
        }
    }

    #[inline]
    pub fn num_nodes(&self) -> usize {
        self.node_features.len()
    }

    #[inline]
    pub fn num_edges(&self) -> usize {
        self.edges.len()
    }

    /// Number of edges incident to each node.
    pub fn degrees(&self) -> Vec<usize> {
        let mut degrees = vec![0usize; self.num_nodes()];
        for &(a, b) in &self.edges {
            degrees[a] += 1;
            degrees[b] += 1;
        }
        degrees
    }

    /// Expand each undirected edge into both directions.
    ///
    /// Returns `(sources, targets, weights)`, the two-row edge index layout
    /// graph network layers consume. Edge `(i, j)` yields `i -> j` then `j -> i`.
    pub fn edge_index_directed(&self) -> (Vec<usize>, Vec<usize>, Vec<f32>) {
        let n = self.edges.len() * 2;
        let mut sources = Vec::with_capacity(n);
        let mut targets = Vec::with_capacity(n);
        let mut weights = Vec::with_capacity(n);

        for (&(a, b), &w) in self.edges.iter().zip(&self.edge_weights) {
            sources.push(a);
            targets.push(b);
            weights.push(w);
            sources.push(b);
            targets.push(a);
            weights.push(w);
        }

        (sources, targets, weights)
    }
}

/// A graph together with its resolved class.
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledGraph {
    pub graph: Graph,
    /// Raw label token as read from the label file.
    pub label: String,
    /// Index of `label` in the dataset vocabulary.
    pub class_id: usize,
    /// One-hot encoding of `class_id` over the vocabulary.
    pub one_hot: Vec<f32>,
}

impl LabeledGraph {
    #[inline]
    pub fn node_features(&self) -> &[Vec<f32>] {
        &self.graph.node_features
    }

    #[inline]
    pub fn edge_index_pairs(&self) -> &[(usize, usize)] {
        &self.graph.edges
    }

    #[inline]
    pub fn edge_weights(&self) -> &[f32] {
        &self.graph.edge_weights
    }

    #[inline]
    pub fn class_label(&self) -> usize {
        self.class_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edge_set_collapses_reversed_pairs() {
        let mut set = EdgeSet::new();
        assert!(set.insert(0, 1, 0.5));
        assert!(set.insert(1, 0, 0.5));
        assert!(set.insert(2, 1, 0.25));

        assert_eq!(set.len(), 2);
        let graph = Graph::from_edge_set(vec![vec![0.0]; 3], set);
        assert_eq!(graph.edges, vec![(0, 1), (1, 2)]);
        assert_eq!(graph.edge_weights, vec![0.5, 0.25]);
    }

    #[test]
    fn test_edge_set_rejects_self_loops() {
        let mut set = EdgeSet::new();
        assert!(!set.insert(3, 3, 1.0));
        assert!(set.is_empty());
    }

    #[test]
    fn test_from_edge_set_sorted_pairs() {
        let mut set = EdgeSet::new();
        set.insert(2, 0, 0.1);
        set.insert(1, 0, 0.2);

        let graph = Graph::from_edge_set(vec![vec![0.0; 3]; 3], set);
        assert_eq!(graph.edges, vec![(0, 1), (0, 2)]);
        assert_eq!(graph.edge_weights, vec![0.2, 0.1]);
        assert_eq!(graph.degrees(), vec![2, 1, 1]);
    }

    #[test]
    fn test_edge_index_directed() {
        let graph = Graph {
            node_features: vec![vec![0.0], vec![1.0], vec![2.0]],
            edges: vec![(0, 1), (1, 2)],
            edge_weights: vec![0.5, 0.25],
        };

        let (src, dst, w) = graph.edge_index_directed();
        assert_eq!(src, vec![0, 1, 1, 2]);
        assert_eq!(dst, vec![1, 0, 2, 1]);
        assert_eq!(w, vec![0.5, 0.5, 0.25, 0.25]);
    }
}
