//! Per-object graph extraction from annotated LiDAR frames.
//!
//! Every annotated object of a frame is turned into one labeled graph
//! sample: its camera-frame box is moved into the LiDAR frame, the scan
//! points inside the box are kept in box-local coordinates, resampled to a
//! fixed count and connected into a KNN graph.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::{debug, info, warn};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::config::ExtractionConfig;
use crate::core::geometry::{camera_box_to_world_box, filter_points_in_box, resample, Point};
use crate::core::graph::Graph;
use crate::core::kitti::{load_objects, Calibration, ObjectLabel};
use crate::core::loaders::load_velodyne_bin;
use crate::core::writers::{write_graph_artifact, write_label};
use crate::processors::knn::build_knn_graph;

/// One object turned into a graph.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedObject {
    /// Position of the object in the frame's label file.
    pub index: usize,
    /// Object class, used as the sample label.
    pub kind: String,
    /// Number of scan points found inside the object's box.
    pub points_in_box: usize,
    pub graph: Graph,
}

/// Extract a graph for every usable object of one frame.
///
/// Objects whose class is listed in `config.skip_classes`, and objects with
/// fewer than `config.min_points` scan points inside their box (or none at
/// all), are skipped.
///
/// # Arguments
///
/// * `points` - Frame points in LiDAR coordinates
/// * `objects` - Object annotations of the frame
/// * `calib` - Frame calibration
/// * `config` - Extraction settings
/// * `rng` - Source of randomness for resampling
///
/// # Errors
///
/// Returns an error if the calibration is singular or a graph cannot be built.
pub fn extract_objects<R: Rng + ?Sized>(
    points: &[Point],
    objects: &[ObjectLabel],
    calib: &Calibration,
    config: &ExtractionConfig,
    rng: &mut R,
) -> Result<Vec<ExtractedObject>> {
    let mut extracted = Vec::new();

    for (index, object) in objects.iter().enumerate() {
        if config.skip_classes.iter().any(|c| c == &object.kind) {
            debug!("object {}: skipping class {}", index, object.kind);
            continue;
        }

        let bbox = camera_box_to_world_box(
            object.location,
            object.rotation_y,
            object.dimensions,
            &calib.velo_to_cam,
            &calib.rect,
        )
        .with_context(|| format!("Failed to place object {} ({}) in the LiDAR frame", index, object.kind))?;

        let inside = filter_points_in_box(points, &bbox);
        if inside.is_empty() || inside.len() < config.min_points {
            warn!(
                "object {} ({}): {} points inside box, skipping",
                index,
                object.kind,
                inside.len()
            );
            continue;
        }

        let sampled = resample(&inside, config.num_points, rng)
            .with_context(|| format!("Failed to resample object {}", index))?;
        let graph = build_knn_graph(&sampled, config.knn_k)
            .with_context(|| format!("Failed to build graph for object {}", index))?;

        extracted.push(ExtractedObject {
            index,
            kind: object.kind.clone(),
            points_in_box: inside.len(),
            graph,
        });
    }

    Ok(extracted)
}

/// Extract every object of a frame and write it as a dataset sample.
///
/// Samples land in `output_root/X/<stem>_<i>.json` with their class in
/// `output_root/y/<stem>_<i>.txt`, where `<stem>` is the scan file stem and
/// `<i>` the object's position in the label file. The output root can then
/// be materialized as a scan-graph dataset.
///
/// # Returns
///
/// Paths of the written graph artifacts.
pub fn extract_frame(
    velodyne: &Path,
    calib_path: &Path,
    label_path: &Path,
    output_root: &Path,
    config: &ExtractionConfig,
) -> Result<Vec<PathBuf>> {
    let cloud = load_velodyne_bin(velodyne)
        .with_context(|| format!("Failed to load scan: {}", velodyne.display()))?;
    let calib = Calibration::from_file(calib_path)
        .with_context(|| format!("Failed to load calibration: {}", calib_path.display()))?;
    let objects = load_objects(label_path)
        .with_context(|| format!("Failed to load labels: {}", label_path.display()))?;

    let stem = velodyne
        .file_stem()
        .and_then(|s| s.to_str())
        .with_context(|| format!("Scan path has no file name: {}", velodyne.display()))?;

    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
    let extracted = extract_objects(&cloud.to_coords(), &objects, &calib, config, &mut rng)?;

    let mut written = Vec::with_capacity(extracted.len());
    for object in &extracted {
        let name = format!("{}_{}", stem, object.index);
        let graph_path = output_root.join("X").join(format!("{}.json", name));
        let label_file = output_root.join("y").join(format!("{}.txt", name));

        write_graph_artifact(&graph_path, &object.graph)
            .with_context(|| format!("Failed to write graph: {}", graph_path.display()))?;
        write_label(&label_file, &object.kind)
            .with_context(|| format!("Failed to write label: {}", label_file.display()))?;
        written.push(graph_path);
    }

    info!(
        "{}: extracted {} of {} objects",
        velodyne.display(),
        written.len(),
        objects.len()
    );

    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::core::kitti::parse_objects;
    use crate::processors::dataset::Dataset;
    use std::fs;
    use tempfile::TempDir;

    const IDENTITY_CALIB: &str = "\
R0_rect: 1 0 0 0 1 0 0 0 1
Tr_velo_to_cam: 1 0 0 0 0 1 0 0 0 0 1 0
";

    // A 4 m long, 2 m wide, 2 m tall car at (10, 0, 0) facing +x, plus
    // annotations that must be skipped.
    const LABELS: &str = "\
Car 0.00 0 0.0 0 0 0 0 2.0 2.0 4.0 10.0 0.0 0.0 -1.5707963267948966
DontCare -1 -1 -10 0 0 0 0 -1 -1 -1 -1000 -1000 -1000 -10
Pedestrian 0.00 0 0.0 0 0 0 0 1.8 0.6 0.8 -20.0 5.0 0.0 -1.5707963267948966
";

    fn frame_points() -> Vec<Point> {
        let mut points = Vec::new();
        for i in 0..6 {
            for j in 0..3 {
                points.push([
                    10.0 - 1.5 + i as f32 * 0.6,
                    -0.5 + j as f32 * 0.5,
                    0.1 + (i + j) as f32 * 0.2,
                ]);
            }
        }
        // Clutter outside every box.
        points.push([0.0, 0.0, 0.0]);
        points.push([10.0, 5.0, 1.0]);
        points.push([10.0, 0.0, 5.0]);
        points
    }

    fn write_velodyne(path: &Path, points: &[Point]) {
        let mut bytes = Vec::new();
        for p in points {
            for v in [p[0], p[1], p[2], 0.5] {
                bytes.extend_from_slice(&v.to_le_bytes());
            }
        }
        fs::write(path, bytes).unwrap();
    }

    fn small_config() -> ExtractionConfig {
        ExtractionConfig {
            num_points: 16,
            ..ExtractionConfig::default()
        }
    }

    #[test]
    fn test_extract_objects_keeps_box_points() {
        let calib = Calibration::parse(IDENTITY_CALIB).unwrap();
        let objects = parse_objects(LABELS).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(7);

        let extracted =
            extract_objects(&frame_points(), &objects, &calib, &small_config(), &mut rng).unwrap();

        assert_eq!(extracted.len(), 1);
        let car = &extracted[0];
        assert_eq!(car.index, 0);
        assert_eq!(car.kind, "Car");
        assert_eq!(car.points_in_box, 18);
        assert_eq!(car.graph.num_nodes(), 16);

        // Nodes are in box-local coordinates.
        for node in &car.graph.node_features {
            assert!(node[0].abs() <= 2.0 + 1e-4);
            assert!(node[1].abs() <= 1.0 + 1e-4);
            assert!(node[2] >= 0.0 && node[2] <= 2.0);
        }
    }

    #[test]
    fn test_extract_objects_min_points() {
        let calib = Calibration::parse(IDENTITY_CALIB).unwrap();
        let objects = parse_objects(LABELS).unwrap();
        let config = ExtractionConfig {
            min_points: 50,
            ..small_config()
        };
        let mut rng = ChaCha8Rng::seed_from_u64(7);

        let extracted = extract_objects(&frame_points(), &objects, &calib, &config, &mut rng).unwrap();
        assert!(extracted.is_empty());
    }

    #[test]
    fn test_extract_objects_deterministic_for_seed() {
        let calib = Calibration::parse(IDENTITY_CALIB).unwrap();
        let objects = parse_objects(LABELS).unwrap();

        let run = |seed| {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            extract_objects(&frame_points(), &objects, &calib, &small_config(), &mut rng).unwrap()
        };

        assert_eq!(run(3), run(3));
    }

    #[test]
    fn test_extract_objects_singular_calibration() {
        let calib = Calibration::parse(
            "R0_rect: 1 0 0 0 1 0 0 0 1\nTr_velo_to_cam: 0 0 0 0 0 0 0 0 0 0 0 0\n",
        )
        .unwrap();
        let objects = parse_objects(LABELS).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(7);

        assert!(extract_objects(&frame_points(), &objects, &calib, &small_config(), &mut rng).is_err());
    }

    #[test]
    fn test_extract_frame_feeds_dataset() {
        let temp_dir = TempDir::new().unwrap();
        let velodyne = temp_dir.path().join("000042.bin");
        let calib = temp_dir.path().join("calib.txt");
        let labels = temp_dir.path().join("label.txt");
        let output = temp_dir.path().join("objects");

        write_velodyne(&velodyne, &frame_points());
        fs::write(&calib, IDENTITY_CALIB).unwrap();
        fs::write(&labels, LABELS).unwrap();

        let written = extract_frame(&velodyne, &calib, &labels, &output, &small_config()).unwrap();

        assert_eq!(written, vec![output.join("X").join("000042_0.json")]);
        assert_eq!(
            fs::read_to_string(output.join("y").join("000042_0.txt")).unwrap(),
            "Car\n"
        );

        let mut config = PipelineConfig::default();
        config.dataset.show_progress = false;
        config.dataset.use_cache = false;
        let dataset = Dataset::materialize(&output, &config).unwrap();

        assert_eq!(dataset.len(), 1);
        assert_eq!(dataset.classes(), &["Car"]);
        assert_eq!(dataset.get(0).unwrap().node_features().len(), 16);
    }

    #[test]
    fn test_extract_frame_missing_scan() {
        let temp_dir = TempDir::new().unwrap();
        let result = extract_frame(
            &temp_dir.path().join("missing.bin"),
            &temp_dir.path().join("calib.txt"),
            &temp_dir.path().join("label.txt"),
            temp_dir.path(),
            &small_config(),
        );

        let message = format!("{:#}", result.unwrap_err());
        assert!(message.contains("Failed to load scan"));
    }
}
