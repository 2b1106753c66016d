//! Command-line interface for the graph pipeline.

use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, error, info, warn};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::config::SourceKind;
use crate::core::geometry::{box_corners, decimate, filter_points_in_box, resample, OrientedBox};
use crate::core::graph::Graph;
use crate::PipelineConfig;

#[derive(Parser)]
#[command(name = "lidar-graph")]
#[command(about = "Point cloud to KNN graph dataset pipeline", version)]
pub struct Cli {
    /// Path to YAML config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase verbosity
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum SourceArg {
    /// Per-object scan graphs
    Scans,
    /// Raw point clouds with ModelNet10 labels
    PointClouds,
}

impl From<SourceArg> for SourceKind {
    fn from(arg: SourceArg) -> Self {
        match arg {
            SourceArg::Scans => SourceKind::Scans,
            SourceArg::PointClouds => SourceKind::PointClouds,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Materialize a dataset root (X/ and y/) into labeled graphs
    Materialize {
        /// Dataset root directory
        root: PathBuf,
        /// Kind of samples under the root
        #[arg(long, value_enum)]
        source: Option<SourceArg>,
        /// Number of worker threads
        #[arg(short, long)]
        workers: Option<usize>,
        /// Neither read nor write the dataset cache
        #[arg(long)]
        no_cache: bool,
    },

    /// Build a KNN graph artifact from one point cloud file
    Graph {
        /// Input point cloud (.ply, .csv or .bin)
        cloud: PathBuf,
        /// Output graph artifact (.json)
        output: PathBuf,
        /// Neighbors per node
        #[arg(short)]
        k: Option<usize>,
        /// Keep every Nth point
        #[arg(long)]
        stride: Option<usize>,
        /// Resample to exactly this many points
        #[arg(long)]
        num_points: Option<usize>,
        /// Keep only points inside the box "x,y,z,w,l,h,yaw"
        #[arg(long = "box", value_parser = parse_box)]
        bbox: Option<OrientedBox>,
    },

    /// Extract per-object graph samples from one KITTI frame
    Extract {
        /// Velodyne scan (.bin)
        #[arg(long)]
        velodyne: PathBuf,
        /// Calibration file
        #[arg(long)]
        calib: PathBuf,
        /// Object label file
        #[arg(long)]
        label: PathBuf,
        /// Dataset root receiving X/ and y/
        #[arg(short, long)]
        output: PathBuf,
        /// Points per object
        #[arg(long)]
        num_points: Option<usize>,
    },
}

/// Parse a box given as `x,y,z,w,l,h,yaw`.
fn parse_box(s: &str) -> Result<OrientedBox, String> {
    let values = s
        .split(',')
        .map(|v| v.trim().parse::<f64>().map_err(|_| format!("invalid number '{}'", v.trim())))
        .collect::<Result<Vec<_>, _>>()?;

    match values[..] {
        [x, y, z, w, l, h, yaw] => {
            if w < 0.0 || l < 0.0 || h < 0.0 {
                return Err("box dimensions must be non-negative".to_string());
            }
            Ok(OrientedBox::new([x, y, z], w, l, h, yaw))
        }
        _ => Err(format!("expected 7 values (x,y,z,w,l,h,yaw), got {}", values.len())),
    }
}

/// Create a spinner for indeterminate operations
fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

/// Print a summary box
fn print_summary(title: &str, items: &[(&str, String)]) {
    println!();
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║ {:<62} ║", title);
    println!("╠══════════════════════════════════════════════════════════════╣");
    for (key, value) in items {
        let display_value = if value.chars().count() > 39 {
            format!("{}...", value.chars().take(36).collect::<String>())
        } else {
            value.clone()
        };
        println!("║ {:<20}: {:<39} ║", key, display_value);
    }
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();
}

pub fn run() {
    let cli = Cli::parse();

    // Initialize logging based on verbosity (must come first)
    env_logger::Builder::new()
        .filter_level(match cli.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            _ => log::LevelFilter::Debug,
        })
        .format_timestamp_secs()
        .init();

    // Load config
    let config = match &cli.config {
        Some(path) => match PipelineConfig::from_yaml(path) {
            Ok(cfg) => {
                info!("Loaded config from: {}", path.display());
                cfg
            }
            Err(e) => {
                warn!("Failed to load config from {}: {}, using defaults", path.display(), e);
                PipelineConfig::default()
            }
        },
        None => PipelineConfig::default(),
    };

    // Dispatch to subcommands
    match cli.command {
        Commands::Materialize { root, source, workers, no_cache } => {
            cmd_materialize(&root, source, workers, no_cache, config);
        }
        Commands::Graph { cloud, output, k, stride, num_points, bbox } => {
            cmd_graph(&cloud, &output, k, stride, num_points, bbox, &config);
        }
        Commands::Extract { velodyne, calib, label, output, num_points } => {
            cmd_extract(&velodyne, &calib, &label, &output, num_points, config);
        }
    }
}

fn cmd_materialize(
    root: &Path,
    source: Option<SourceArg>,
    workers: Option<usize>,
    no_cache: bool,
    mut config: PipelineConfig,
) {
    use crate::processors::dataset::Dataset;

    let start = Instant::now();

    if let Some(source) = source {
        config.dataset.source = source.into();
    }
    if let Some(workers) = workers {
        config.dataset.workers = workers;
    }
    if no_cache {
        config.dataset.use_cache = false;
    }

    match Dataset::materialize(root, &config) {
        Ok(dataset) => {
            let distribution = dataset
                .class_distribution()
                .iter()
                .map(|(name, count)| format!("{}={}", name, count))
                .collect::<Vec<_>>()
                .join(", ");
            let weights = dataset
                .class_weights()
                .iter()
                .map(|w| format!("{:.3}", w))
                .collect::<Vec<_>>()
                .join(", ");

            print_summary(
                "Materialization Complete",
                &[
                    ("Root", root.display().to_string()),
                    ("Samples", dataset.len().to_string()),
                    ("Classes", dataset.classes().len().to_string()),
                    ("Distribution", distribution),
                    ("Class weights", weights),
                    ("From cache", dataset.from_cache().to_string()),
                    ("Workers", config.dataset.workers.to_string()),
                    ("Duration", format!("{:.2?}", start.elapsed())),
                ],
            );
        }
        Err(e) => {
            error!("Materialization failed: {}", e);
            std::process::exit(1);
        }
    }
}

fn build_graph(
    cloud_path: &Path,
    k: usize,
    stride: usize,
    num_points: Option<usize>,
    bbox: Option<&OrientedBox>,
    seed: u64,
) -> anyhow::Result<(usize, Graph)> {
    use crate::core::loaders::load_point_cloud;
    use crate::processors::knn::build_knn_graph;
    use anyhow::Context;

    let cloud = load_point_cloud(cloud_path)
        .with_context(|| format!("Failed to load point cloud: {}", cloud_path.display()))?;
    let mut points = cloud.to_coords();
    let loaded = points.len();

    if let Some(bbox) = bbox {
        debug!("box corners: {:?}", box_corners(bbox));
        points = filter_points_in_box(&points, bbox);
        info!("{} of {} points inside box", points.len(), loaded);
    }

    points = decimate(&points, stride);

    if let Some(n) = num_points {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        points = resample(&points, n, &mut rng)?;
    }

    let graph = build_knn_graph(&points, k)?;
    Ok((loaded, graph))
}

fn cmd_graph(
    cloud: &Path,
    output: &Path,
    k: Option<usize>,
    stride: Option<usize>,
    num_points: Option<usize>,
    bbox: Option<OrientedBox>,
    config: &PipelineConfig,
) {
    use crate::core::writers::write_graph_artifact;

    let start = Instant::now();

    let k = k.unwrap_or(config.graph.knn_k);
    let stride = stride.unwrap_or(if config.graph.decimate {
        config.graph.decimation
    } else {
        1
    });

    let spinner = create_spinner("Building graph...");
    let result = build_graph(cloud, k, stride, num_points, bbox.as_ref(), config.extraction.seed)
        .and_then(|(loaded, graph)| {
            write_graph_artifact(output, &graph)?;
            Ok((loaded, graph))
        });
    spinner.finish_and_clear();

    match result {
        Ok((loaded, graph)) => {
            print_summary(
                "Graph Complete",
                &[
                    ("Input file", cloud.display().to_string()),
                    ("Output file", output.display().to_string()),
                    ("Points loaded", loaded.to_string()),
                    ("Nodes", graph.num_nodes().to_string()),
                    ("Edges", graph.num_edges().to_string()),
                    (
                        "Min degree",
                        graph.degrees().into_iter().min().unwrap_or(0).to_string(),
                    ),
                    ("Neighbors (k)", k.to_string()),
                    ("Stride", stride.to_string()),
                    ("Duration", format!("{:.2?}", start.elapsed())),
                ],
            );
        }
        Err(e) => {
            error!("Graph build failed: {:#}", e);
            std::process::exit(1);
        }
    }
}

fn cmd_extract(
    velodyne: &Path,
    calib: &Path,
    label: &Path,
    output: &Path,
    num_points: Option<usize>,
    mut config: PipelineConfig,
) {
    use crate::processors::extraction::extract_frame;

    let start = Instant::now();

    if let Some(n) = num_points {
        config.extraction.num_points = n;
    }

    let spinner = create_spinner("Extracting objects...");
    let result = extract_frame(velodyne, calib, label, output, &config.extraction);
    spinner.finish_and_clear();

    match result {
        Ok(written) => {
            print_summary(
                "Extraction Complete",
                &[
                    ("Scan", velodyne.display().to_string()),
                    ("Output root", output.display().to_string()),
                    ("Objects written", written.len().to_string()),
                    ("Points per object", config.extraction.num_points.to_string()),
                    ("Duration", format!("{:.2?}", start.elapsed())),
                ],
            );
        }
        Err(e) => {
            error!("Extraction failed: {:#}", e);
            std::process::exit(1);
        }
    }
}
