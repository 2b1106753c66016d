//! Cache-aware, concurrent dataset materialization.
//!
//! A dataset root holds raw samples under `X/` and label files under `y/`.
//! Both listings are sorted by file name and paired by position. On a cache
//! miss the pairs are processed on a bounded rayon pool; the resulting
//! `(graphs, raw_labels)` pair is then persisted so later runs skip
//! processing entirely. The class vocabulary, one-hot labels and class
//! weights are derived afresh on every run.
//!
//! # Example
//!
//! ```no_run
//! use lidar_graph_pipeline::config::PipelineConfig;
//! use lidar_graph_pipeline::processors::dataset::Dataset;
//! use std::path::Path;
//!
//! let dataset = Dataset::materialize(Path::new("data/kitti_objects"), &PipelineConfig::default())?;
//! println!("{} samples over {} classes", dataset.len(), dataset.classes().len());
//! # Ok::<(), lidar_graph_pipeline::processors::dataset::DatasetError>(())
//! ```

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info, warn};
use rayon::prelude::*;
use thiserror::Error;

use crate::config::{PipelineConfig, SourceKind};
use crate::core::graph::{Graph, LabeledGraph};
use crate::processors::cache::{cache_path, read_cache, write_cache, CacheError};
use crate::processors::sample::{process_sample, Sample, SampleError, SampleOptions};

/// ModelNet10 class names, indexed by their numeric label.
pub const MODELNET10_CLASSES: [&str; 10] = [
    "bathtub",
    "bed",
    "chair",
    "desk",
    "dresser",
    "monitor",
    "night_stand",
    "sofa",
    "table",
    "toilet",
];

/// Errors that can occur while materializing a dataset.
#[derive(Error, Debug)]
pub enum DatasetError {
    #[error("dataset directory '{0}' does not exist")]
    MissingDirectory(PathBuf),

    #[error("failed to list '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Sample(#[from] SampleError),

    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// Result type for dataset operations.
pub type Result<T> = std::result::Result<T, DatasetError>;

/// Insertion-ordered set of class tokens with stable indices.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClassVocabulary {
    names: Vec<String>,
    index: HashMap<String, usize>,
}

impl ClassVocabulary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a vocabulary from labels in order of first appearance.
    pub fn from_labels<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut vocabulary = Self::new();
        for label in labels {
            vocabulary.insert(label.as_ref());
        }
        vocabulary
    }

    /// Add a token if unseen and return its index.
    pub fn insert(&mut self, token: &str) -> usize {
        if let Some(&idx) = self.index.get(token) {
            return idx;
        }
        let idx = self.names.len();
        self.names.push(token.to_string());
        self.index.insert(token.to_string(), idx);
        idx
    }

    pub fn index_of(&self, token: &str) -> Option<usize> {
        self.index.get(token).copied()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Class names in index order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// One-hot vector for `token`, or `None` if it is not in the vocabulary.
    pub fn one_hot(&self, token: &str) -> Option<Vec<f32>> {
        let idx = self.index_of(token)?;
        let mut v = vec![0.0; self.len()];
        v[idx] = 1.0;
        Some(v)
    }
}

/// Per-class weights from one-hot rows.
///
/// Each class gets the inverse of its sample count, and the weights are then
/// scaled to sum to 1. A class with no samples makes the result `inf`/`NaN`.
pub fn class_weights(one_hot: &[Vec<f32>], num_classes: usize) -> Vec<f32> {
    let mut column_sums = vec![0.0f32; num_classes];
    for row in one_hot {
        for (sum, &v) in column_sums.iter_mut().zip(row) {
            *sum += v;
        }
    }

    let inverse: Vec<f32> = column_sums.iter().map(|&s| 1.0 / s).collect();
    let total: f32 = inverse.iter().sum();
    inverse.iter().map(|&w| w / total).collect()
}

/// Map a numeric ModelNet10 label to its class name.
///
/// Tokens that are not a class index in `0..10` are returned unchanged.
pub fn resolve_modelnet_label(token: &str) -> String {
    match token.parse::<usize>() {
        Ok(id) if id < MODELNET10_CLASSES.len() => MODELNET10_CLASSES[id].to_string(),
        _ => token.to_string(),
    }
}

/// A fully materialized, labeled graph dataset.
#[derive(Debug, Clone)]
pub struct Dataset {
    records: Vec<LabeledGraph>,
    vocabulary: ClassVocabulary,
    weights: Vec<f32>,
    from_cache: bool,
}

impl Dataset {
    /// Materialize the dataset under `root`.
    ///
    /// Reads the cache for `root` if present and enabled; otherwise processes
    /// every `(X, y)` pair on `config.dataset.workers` threads and writes the
    /// cache afterwards. A cache that cannot be decoded is reported and
    /// rebuilt.
    ///
    /// # Errors
    ///
    /// Any failing sample aborts the whole materialization; nothing is cached
    /// in that case. Missing `X`/`y` directories, listing failures and cache
    /// write failures are reported as well.
    pub fn materialize(root: &Path, config: &PipelineConfig) -> Result<Self> {
        let settings = &config.dataset;
        let cache_file = cache_path(root, settings.source);

        let cached = if settings.use_cache && cache_file.exists() {
            match read_cache(&cache_file) {
                Ok(pair) => {
                    info!("Loaded {} samples from cache {}", pair.0.len(), cache_file.display());
                    Some(pair)
                }
                Err(e) => {
                    warn!("Ignoring unreadable cache {}: {}", cache_file.display(), e);
                    None
                }
            }
        } else {
            None
        };

        let from_cache = cached.is_some();
        let (graphs, labels) = match cached {
            Some(pair) => pair,
            None => {
                let pair = process_root(root, config)?;
                if settings.use_cache {
                    write_cache(&cache_file, &pair.0, &pair.1)?;
                    info!("Wrote cache {}", cache_file.display());
                }
                pair
            }
        };

        let labels = match settings.source {
            SourceKind::Scans => labels,
            SourceKind::PointClouds => labels.iter().map(|l| resolve_modelnet_label(l)).collect(),
        };

        let mut dataset = Self::from_parts(graphs, labels);
        dataset.from_cache = from_cache;
        Ok(dataset)
    }

    /// Build a dataset from graphs and their raw labels, paired by position.
    ///
    /// On a length mismatch only the paired prefix is kept, and unpaired
    /// labels do not enter the vocabulary.
    pub fn from_parts(mut graphs: Vec<Graph>, mut labels: Vec<String>) -> Self {
        if graphs.len() != labels.len() {
            let paired = graphs.len().min(labels.len());
            warn!(
                "{} graphs but {} labels, keeping the first {}",
                graphs.len(),
                labels.len(),
                paired
            );
            graphs.truncate(paired);
            labels.truncate(paired);
        }

        let vocabulary = ClassVocabulary::from_labels(&labels);

        let records: Vec<LabeledGraph> = graphs
            .into_iter()
            .zip(labels)
            .map(|(graph, label)| {
                let class_id = vocabulary.index_of(&label).unwrap_or_default();
                let one_hot = vocabulary.one_hot(&label).unwrap_or_default();
                LabeledGraph {
                    graph,
                    label,
                    class_id,
                    one_hot,
                }
            })
            .collect();

        let one_hot: Vec<Vec<f32>> = records.iter().map(|r| r.one_hot.clone()).collect();
        let weights = class_weights(&one_hot, vocabulary.len());

        debug!(
            "dataset: {} records, {} classes",
            records.len(),
            vocabulary.len()
        );

        Self {
            records,
            vocabulary,
            weights,
            from_cache: false,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Record at `index`, in sorted sample order.
    pub fn get(&self, index: usize) -> Option<&LabeledGraph> {
        self.records.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, LabeledGraph> {
        self.records.iter()
    }

    /// Per-class weights, indexed like [`classes`](Self::classes).
    pub fn class_weights(&self) -> Vec<f32> {
        self.weights.clone()
    }

    /// Class names in vocabulary order.
    pub fn classes(&self) -> &[String] {
        self.vocabulary.names()
    }

    pub fn vocabulary(&self) -> &ClassVocabulary {
        &self.vocabulary
    }

    /// Class id of every record.
    pub fn labels(&self) -> Vec<usize> {
        self.records.iter().map(|r| r.class_id).collect()
    }

    /// Sample count per class, in vocabulary order.
    pub fn class_distribution(&self) -> Vec<(String, usize)> {
        let mut counts = vec![0usize; self.vocabulary.len()];
        for record in &self.records {
            counts[record.class_id] += 1;
        }
        self.vocabulary
            .names()
            .iter()
            .cloned()
            .zip(counts)
            .collect()
    }

    /// Whether the records were decoded from the cache.
    pub fn from_cache(&self) -> bool {
        self.from_cache
    }
}

impl<'a> IntoIterator for &'a Dataset {
    type Item = &'a LabeledGraph;
    type IntoIter = std::slice::Iter<'a, LabeledGraph>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

/// Regular files of `dir`, sorted by file name.
fn list_sorted(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(DatasetError::MissingDirectory(dir.to_path_buf()));
    }

    let io_err = |source| DatasetError::Io {
        path: dir.to_path_buf(),
        source,
    };

    let mut files = Vec::new();
    for entry in fs::read_dir(dir).map_err(io_err)? {
        let path = entry.map_err(io_err)?.path();
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

/// Pair `X` and `y` files by sorted position.
fn pair_samples(root: &Path) -> Result<Vec<(PathBuf, PathBuf)>> {
    let artifacts = list_sorted(&root.join("X"))?;
    let labels = list_sorted(&root.join("y"))?;

    if artifacts.len() != labels.len() {
        warn!(
            "{} has {} samples but {} labels, pairing the first {}",
            root.display(),
            artifacts.len(),
            labels.len(),
            artifacts.len().min(labels.len())
        );
    }

    Ok(artifacts.into_iter().zip(labels).collect())
}

fn progress_bar(len: usize, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(len as u64);
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    pb.set_style(style);
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Process every sample under `root` on a bounded worker pool.
///
/// Results keep the sorted pairing order regardless of which worker
/// finishes first.
fn process_root(root: &Path, config: &PipelineConfig) -> Result<(Vec<Graph>, Vec<String>)> {
    let pairs = pair_samples(root)?;
    let workers = config.dataset.workers.max(1);
    let options = SampleOptions::from(&config.graph);

    info!(
        "Processing {} samples from {} on {} workers",
        pairs.len(),
        root.display(),
        workers
    );

    let pool = rayon::ThreadPoolBuilder::new().num_threads(workers).build()?;
    let pb = progress_bar(pairs.len(), config.dataset.show_progress);
    pb.set_message("building graphs");

    let processed: Result<Vec<Sample>> = pool.install(|| {
        pairs
            .par_iter()
            .map(|(artifact, label)| {
                let sample = process_sample(artifact, label, &options);
                pb.inc(1);
                sample.map_err(DatasetError::from)
            })
            .collect()
    });
    pb.finish_and_clear();

    let samples = processed?;
    Ok(samples.into_iter().map(|s| (s.graph, s.label)).unzip())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::writers::{write_graph_artifact, write_label};
    use std::io::Write;
    use tempfile::TempDir;

    fn chain_graph(nodes: usize) -> Graph {
        Graph {
            node_features: (0..nodes).map(|i| vec![i as f32, 0.0, 0.0]).collect(),
            edges: (1..nodes).map(|i| (i - 1, i)).collect(),
            edge_weights: vec![0.5; nodes.saturating_sub(1)],
        }
    }

    fn quiet_config(workers: usize) -> PipelineConfig {
        let mut config = PipelineConfig::default();
        config.dataset.workers = workers;
        config.dataset.show_progress = false;
        config
    }

    /// Writes `X/<i>.json` + `y/<i>.txt` for every label, with `i + 1` nodes each.
    fn scan_root(dir: &Path, labels: &[&str]) -> PathBuf {
        let root = dir.join("objects");
        for (i, label) in labels.iter().enumerate() {
            write_graph_artifact(&root.join("X").join(format!("{:03}.json", i)), &chain_graph(i + 1))
                .unwrap();
            write_label(&root.join("y").join(format!("{:03}.txt", i)), label).unwrap();
        }
        root
    }

    fn summary(dataset: &Dataset) -> Vec<(String, usize)> {
        let mut rows: Vec<(String, usize)> = dataset
            .iter()
            .map(|r| (r.label.clone(), r.graph.num_nodes()))
            .collect();
        rows.sort();
        rows
    }

    #[test]
    fn test_vocabulary_insertion_order() {
        let vocabulary = ClassVocabulary::from_labels(["car", "car", "ped", "car", "cyclist"]);

        assert_eq!(vocabulary.len(), 3);
        assert_eq!(vocabulary.names(), &["car", "ped", "cyclist"]);
        assert_eq!(vocabulary.index_of("ped"), Some(1));
        assert_eq!(vocabulary.index_of("truck"), None);
        assert_eq!(vocabulary.one_hot("cyclist"), Some(vec![0.0, 0.0, 1.0]));
        assert_eq!(vocabulary.one_hot("truck"), None);
    }

    #[test]
    fn test_class_weights_inverse_frequency() {
        let rows = vec![vec![1.0, 0.0], vec![1.0, 0.0], vec![0.0, 1.0]];
        let weights = class_weights(&rows, 2);

        assert!((weights[0] - 1.0 / 3.0).abs() < 1e-6);
        assert!((weights[1] - 2.0 / 3.0).abs() < 1e-6);
        assert!((weights.iter().sum::<f32>() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_class_weights_empty_class_not_finite() {
        let rows = vec![vec![1.0, 0.0]];
        let weights = class_weights(&rows, 2);
        assert!(weights.iter().any(|w| !w.is_finite()));
    }

    #[test]
    fn test_resolve_modelnet_label() {
        assert_eq!(resolve_modelnet_label("0"), "bathtub");
        assert_eq!(resolve_modelnet_label("6"), "night_stand");
        assert_eq!(resolve_modelnet_label("9"), "toilet");
        assert_eq!(resolve_modelnet_label("10"), "10");
        assert_eq!(resolve_modelnet_label("chair"), "chair");
    }

    #[test]
    fn test_from_parts_one_hot() {
        let graphs = vec![chain_graph(1), chain_graph(2), chain_graph(3)];
        let labels = vec!["car".to_string(), "car".to_string(), "ped".to_string()];
        let dataset = Dataset::from_parts(graphs, labels);

        assert_eq!(dataset.len(), 3);
        assert_eq!(dataset.classes(), &["car", "ped"]);
        assert_eq!(dataset.labels(), vec![0, 0, 1]);

        let one_hot: Vec<Vec<f32>> = dataset.iter().map(|r| r.one_hot.clone()).collect();
        assert_eq!(one_hot, vec![vec![1.0, 0.0], vec![1.0, 0.0], vec![0.0, 1.0]]);

        let weights = dataset.class_weights();
        assert!((weights[0] - 1.0 / 3.0).abs() < 1e-6);
        assert!((weights[1] - 2.0 / 3.0).abs() < 1e-6);

        assert_eq!(
            dataset.class_distribution(),
            vec![("car".to_string(), 2), ("ped".to_string(), 1)]
        );

        let record = dataset.get(2).unwrap();
        assert_eq!(record.class_label(), 1);
        assert_eq!(record.node_features().len(), 3);
        assert_eq!(record.edge_index_pairs(), &[(0, 1), (1, 2)]);
        assert_eq!(record.edge_weights(), &[0.5, 0.5]);
        assert!(dataset.get(3).is_none());
    }

    #[test]
    fn test_from_parts_unpaired_labels_dropped() {
        let graphs = vec![chain_graph(1), chain_graph(2)];
        let labels = vec!["car".to_string(), "ped".to_string(), "van".to_string()];
        let dataset = Dataset::from_parts(graphs, labels);

        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.classes(), &["car", "ped"]);
        assert!(dataset.class_weights().iter().all(|w| w.is_finite()));
        assert!(dataset.iter().all(|r| r.one_hot.len() == 2));
    }

    #[test]
    fn test_from_parts_empty() {
        let dataset = Dataset::from_parts(Vec::new(), Vec::new());
        assert!(dataset.is_empty());
        assert!(dataset.classes().is_empty());
        assert!(dataset.class_weights().is_empty());
    }

    #[test]
    fn test_materialize_keeps_sorted_order() {
        let temp_dir = TempDir::new().unwrap();
        let root = scan_root(temp_dir.path(), &["Car", "Pedestrian", "Car", "Cyclist"]);

        let dataset = Dataset::materialize(&root, &quiet_config(2)).unwrap();

        assert!(!dataset.from_cache());
        assert_eq!(dataset.len(), 4);
        assert_eq!(dataset.classes(), &["Car", "Pedestrian", "Cyclist"]);
        for (i, record) in dataset.iter().enumerate() {
            assert_eq!(record.graph, chain_graph(i + 1));
        }
        assert!(temp_dir.path().join("objects.cache").exists());
    }

    #[test]
    fn test_materialize_cache_hit_is_identical() {
        let temp_dir = TempDir::new().unwrap();
        let root = scan_root(temp_dir.path(), &["Car", "Van", "Car"]);
        let config = quiet_config(3);

        let first = Dataset::materialize(&root, &config).unwrap();
        let second = Dataset::materialize(&root, &config).unwrap();

        assert!(!first.from_cache());
        assert!(second.from_cache());
        assert_eq!(first.len(), second.len());
        for i in 0..first.len() {
            assert_eq!(first.get(i), second.get(i));
        }
        assert_eq!(first.class_weights(), second.class_weights());
    }

    #[test]
    fn test_materialize_cache_skips_processing() {
        let temp_dir = TempDir::new().unwrap();
        let root = scan_root(temp_dir.path(), &["Car", "Van"]);
        let config = quiet_config(1);

        Dataset::materialize(&root, &config).unwrap();
        fs::remove_dir_all(root.join("X")).unwrap();

        let cached = Dataset::materialize(&root, &config).unwrap();
        assert_eq!(cached.len(), 2);
    }

    #[test]
    fn test_materialize_without_cache() {
        let temp_dir = TempDir::new().unwrap();
        let root = scan_root(temp_dir.path(), &["Car", "Van"]);
        let mut config = quiet_config(2);
        config.dataset.use_cache = false;

        let dataset = Dataset::materialize(&root, &config).unwrap();
        assert_eq!(dataset.len(), 2);
        assert!(!temp_dir.path().join("objects.cache").exists());
    }

    #[test]
    fn test_materialize_worker_count_independent() {
        let labels = ["Car", "Pedestrian", "Car", "Cyclist", "Van", "Car", "Tram"];

        let dir_a = TempDir::new().unwrap();
        let dir_b = TempDir::new().unwrap();
        let single = Dataset::materialize(&scan_root(dir_a.path(), &labels), &quiet_config(1)).unwrap();
        let many = Dataset::materialize(&scan_root(dir_b.path(), &labels), &quiet_config(4)).unwrap();

        assert_eq!(summary(&single), summary(&many));
        assert_eq!(single.classes(), many.classes());
        assert_eq!(single.class_weights(), many.class_weights());
    }

    #[test]
    fn test_materialize_failure_aborts_without_cache() {
        let temp_dir = TempDir::new().unwrap();
        let root = scan_root(temp_dir.path(), &["Car", "Van", "Car"]);
        fs::write(root.join("X").join("001.json"), "{ not json").unwrap();

        let result = Dataset::materialize(&root, &quiet_config(2));

        assert!(matches!(
            result,
            Err(DatasetError::Sample(SampleError::Deserialization { .. }))
        ));
        assert!(!temp_dir.path().join("objects.cache").exists());
    }

    #[test]
    fn test_materialize_missing_directory() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("empty");
        fs::create_dir_all(root.join("X")).unwrap();

        let result = Dataset::materialize(&root, &quiet_config(1));
        assert!(matches!(result, Err(DatasetError::MissingDirectory(p)) if p.ends_with("y")));
    }

    #[test]
    fn test_materialize_count_mismatch_truncates() {
        let temp_dir = TempDir::new().unwrap();
        let root = scan_root(temp_dir.path(), &["Car", "Van", "Car"]);
        fs::remove_file(root.join("y").join("002.txt")).unwrap();

        let dataset = Dataset::materialize(&root, &quiet_config(2)).unwrap();
        assert_eq!(dataset.len(), 2);
    }

    #[test]
    fn test_materialize_rebuilds_corrupt_cache() {
        let temp_dir = TempDir::new().unwrap();
        let root = scan_root(temp_dir.path(), &["Car", "Van"]);
        let cache_file = temp_dir.path().join("objects.cache");
        fs::write(&cache_file, b"garbage").unwrap();

        let dataset = Dataset::materialize(&root, &quiet_config(2)).unwrap();

        assert!(!dataset.from_cache());
        assert_eq!(dataset.len(), 2);
        assert!(read_cache(&cache_file).is_ok());
    }

    #[test]
    fn test_materialize_point_cloud_source() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("modelnet");
        fs::create_dir_all(root.join("X")).unwrap();

        for (i, label) in ["2", "9", "2"].iter().enumerate() {
            let mut file = fs::File::create(root.join("X").join(format!("{:03}.csv", i))).unwrap();
            writeln!(file, "x,y,z").unwrap();
            for p in 0..12 {
                writeln!(file, "{},{},{}", p * p, i, 0).unwrap();
            }
            write_label(&root.join("y").join(format!("{:03}.txt", i)), label).unwrap();
        }

        let mut config = quiet_config(2);
        config.dataset.source = SourceKind::PointClouds;

        let dataset = Dataset::materialize(&root, &config).unwrap();

        assert_eq!(dataset.classes(), &["chair", "toilet"]);
        assert_eq!(dataset.labels(), vec![0, 1, 0]);
        // 12 points at stride 4.
        assert!(dataset.iter().all(|r| r.graph.num_nodes() == 3));
        assert!(root.join("train.h5.cache").exists());

        // The cache keeps raw tokens; names are resolved on every load.
        let (_, raw) = read_cache(&root.join("train.h5.cache")).unwrap();
        assert_eq!(raw, vec!["2", "9", "2"]);
        let cached = Dataset::materialize(&root, &config).unwrap();
        assert!(cached.from_cache());
        assert_eq!(cached.classes(), &["chair", "toilet"]);
    }
}
