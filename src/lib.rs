//! Point cloud to k-nearest-neighbor graph pipeline.
//!
//! This crate provides tools for:
//! - Loading point clouds (PLY, CSV, KITTI velodyne) and node-link graph artifacts
//! - Moving annotated KITTI boxes from the camera frame into the LiDAR frame
//! - Filtering, resampling and decimating point sets
//! - Building KNN graphs with distance-derived edge weights (parallelized)
//! - Materializing cached, one-hot labeled graph datasets on a bounded worker pool
//!
//! # Example
//!
//! ```no_run
//! use lidar_graph_pipeline::{core::loaders::load_ply, processors::knn::build_knn_graph};
//!
//! let cloud = load_ply("object.ply").unwrap();
//! let graph = build_knn_graph(&cloud.to_coords(), 1).unwrap();
//! println!("{} nodes, {} edges", graph.num_nodes(), graph.num_edges());
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod processors;

pub use config::{DatasetConfig, ExtractionConfig, GraphConfig, PipelineConfig, SourceKind};
pub use core::graph::{Graph, LabeledGraph};
pub use core::loaders::PointCloud;
pub use processors::dataset::Dataset;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
