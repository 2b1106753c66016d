//! Data processing modules.

pub mod cache;
pub mod dataset;
pub mod extraction;
pub mod knn;
pub mod sample;

// Re-export key types for convenience
pub use cache::{cache_path, read_cache, write_cache, CacheError};
pub use dataset::{
    class_weights, resolve_modelnet_label, ClassVocabulary, Dataset, DatasetError,
    MODELNET10_CLASSES,
};
pub use extraction::{extract_frame, extract_objects, ExtractedObject};
pub use knn::{build_knn_graph, edge_weight, knn_indices, GraphError};
pub use sample::{graph_from_points, process_sample, ArtifactKind, Sample, SampleError, SampleOptions};
