//! Configuration types for the graph pipeline.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Kind of raw samples stored under a dataset root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Per-object graphs extracted from vehicle scans, cached at `<root>.cache`.
    Scans,
    /// Raw CAD-derived point clouds, cached at `<root>/train.h5.cache`.
    PointClouds,
}

impl Default for SourceKind {
    fn default() -> Self {
        SourceKind::Scans
    }
}

/// Configuration for dataset materialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetConfig {
    /// Which raw sample layout the root holds
    #[serde(default)]
    pub source: SourceKind,

    /// Number of concurrent sample workers
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Read and write the on-disk result cache
    #[serde(default = "default_true")]
    pub use_cache: bool,

    /// Show a progress bar while processing samples
    #[serde(default = "default_true")]
    pub show_progress: bool,
}

fn default_workers() -> usize {
    5
}

fn default_true() -> bool {
    true
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            source: SourceKind::default(),
            workers: default_workers(),
            use_cache: true,
            show_progress: true,
        }
    }
}

/// Configuration for building graphs out of raw point clouds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphConfig {
    /// Neighbors per node in the KNN graph
    #[serde(default = "default_graph_k")]
    pub knn_k: usize,

    /// Keep every Nth point before graph construction
    #[serde(default = "default_decimation")]
    pub decimation: usize,

    /// Apply decimation to raw point clouds
    #[serde(default = "default_true")]
    pub decimate: bool,
}

fn default_graph_k() -> usize {
    1
}

fn default_decimation() -> usize {
    4
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            knn_k: default_graph_k(),
            decimation: default_decimation(),
            decimate: true,
        }
    }
}

/// Configuration for per-object extraction from scan frames.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// Points per object after resampling
    #[serde(default = "default_num_points")]
    pub num_points: usize,

    /// Neighbors per node in the object graph
    #[serde(default = "default_graph_k")]
    pub knn_k: usize,

    /// Objects with fewer points inside their box are skipped
    #[serde(default = "default_min_points")]
    pub min_points: usize,

    /// Object classes that are never extracted
    #[serde(default = "default_skip_classes")]
    pub skip_classes: Vec<String>,

    /// Seed for resampling
    #[serde(default = "default_seed")]
    pub seed: u64,
}

fn default_num_points() -> usize {
    256
}

fn default_min_points() -> usize {
    1
}

fn default_skip_classes() -> Vec<String> {
    vec!["DontCare".to_string()]
}

fn default_seed() -> u64 {
    42
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            num_points: default_num_points(),
            knn_k: default_graph_k(),
            min_points: default_min_points(),
            skip_classes: default_skip_classes(),
            seed: default_seed(),
        }
    }
}

/// Main pipeline configuration combining all sub-configs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub dataset: DatasetConfig,

    #[serde(default)]
    pub graph: GraphConfig,

    #[serde(default)]
    pub extraction: ExtractionConfig,
}

impl PipelineConfig {
    /// Load configuration from a YAML file.
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)?;
        let config: PipelineConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a YAML file.
    pub fn to_yaml<P: AsRef<Path>>(&self, path: P) -> Result<(), Box<dyn std::error::Error>> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
