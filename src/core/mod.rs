//! Core data types, geometry and I/O operations.

pub mod geometry;
pub mod graph;
pub mod kitti;
pub mod loaders;
pub mod writers;

pub use geometry::{GeometryError, OrientedBox, Point};
pub use graph::{EdgeSet, Graph, LabeledGraph};
pub use loaders::{LoaderError, PointCloud};
pub use writers::{write_graph_artifact, write_label, WriteError};
