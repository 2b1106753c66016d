//! Frame conversions and point operations on oriented boxes.
//!
//! This module converts KITTI-style camera-frame object annotations into
//! LiDAR-frame oriented boxes, crops point clouds to those boxes, and
//! resamples the crops to a fixed number of points.

use std::f64::consts::PI;

use nalgebra::{Matrix4, Vector4};
use rand::Rng;
use rayon::prelude::*;
use thiserror::Error;

/// A 3D point `[x, y, z]`.
pub type Point = [f32; 3];

/// Errors raised by geometric operations.
#[derive(Error, Debug, PartialEq)]
pub enum GeometryError {
    #[error("camera projection transform is singular and cannot be inverted")]
    SingularTransform,

    #[error("cannot resample an empty point cloud to {requested} points")]
    EmptyPointCloud { requested: usize },
}

/// Result type for geometry operations.
pub type Result<T> = std::result::Result<T, GeometryError>;

/// A 3D box rotated about the vertical axis.
///
/// `center` is the center of the bottom face. `width` spans the box-local x
/// axis, `length` the local y axis and `height` rises from the bottom face
/// along z.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrientedBox {
    pub center: [f64; 3],
    pub width: f64,
    pub length: f64,
    pub height: f64,
    /// Rotation about z, in radians.
    pub yaw: f64,
}

impl OrientedBox {
    pub fn new(center: [f64; 3], width: f64, length: f64, height: f64, yaw: f64) -> Self {
        Self {
            center,
            width,
            length,
            height,
            yaw,
        }
    }

    /// Returns true if the box-local point lies inside or on the box.
    #[inline]
    fn contains_local(&self, x: f64, y: f64, z: f64) -> bool {
        let half_w = self.width / 2.0;
        let half_l = self.length / 2.0;
        x >= -half_w && x <= half_w && y >= -half_l && y <= half_l && z >= 0.0 && z <= self.height
    }
}

/// Convert a yaw angle from camera convention to LiDAR convention.
///
/// Computes `rz = -ry - π/2`, subtracts `π` when `rz ≥ π`, then adds `2π`
/// when the result is `< π`. The second test compares against `π`, not `0`,
/// so outputs can land outside `[0, 2π)` (e.g. `ry = -π/2` maps to `2π`).
pub fn camera_yaw_to_world_yaw(ry: f64) -> f64 {
    let mut angle = -ry - PI / 2.0;
    if angle >= PI {
        angle -= PI;
    }
    if angle < PI {
        angle += 2.0 * PI;
    }
    angle
}

/// Convert a camera-frame object annotation into a LiDAR-frame box.
///
/// # Arguments
///
/// * `center_cam` - Bottom-center of the object in rectified camera coordinates
/// * `yaw_cam` - Rotation about the camera y axis
/// * `dimensions` - Object size as `(height, width, length)`, KITTI order
/// * `velo_to_cam` - Homogeneous LiDAR-to-camera transform
/// * `rect` - Homogeneous rectifying rotation
///
/// # Errors
///
/// Returns `GeometryError::SingularTransform` if `rect · velo_to_cam` has no inverse.
pub fn camera_box_to_world_box(
    center_cam: [f64; 3],
    yaw_cam: f64,
    dimensions: [f64; 3],
    velo_to_cam: &Matrix4<f64>,
    rect: &Matrix4<f64>,
) -> Result<OrientedBox> {
    let [height, width, length] = dimensions;

    let cam_to_velo = (rect * velo_to_cam)
        .try_inverse()
        .ok_or(GeometryError::SingularTransform)?;
    let center = cam_to_velo * Vector4::new(center_cam[0], center_cam[1], center_cam[2], 1.0);

    // Object length runs along the heading, which is box-local x.
    Ok(OrientedBox {
        center: [center[0], center[1], center[2]],
        width: length,
        length: width,
        height,
        yaw: camera_yaw_to_world_yaw(yaw_cam),
    })
}

/// Keep the points that fall inside an oriented box.
///
/// Points are moved into box-local coordinates (translated by the box
/// center, rotated by `-yaw`) before the bounds test, and the survivors are
/// returned in those local coordinates rather than the input frame.
pub fn filter_points_in_box(points: &[Point], bbox: &OrientedBox) -> Vec<Point> {
    let (sin_r, cos_r) = bbox.yaw.sin_cos();
    let [cx, cy, cz] = bbox.center;

    points
        .par_iter()
        .filter_map(|p| {
            let dx = p[0] as f64 - cx;
            let dy = p[1] as f64 - cy;
            let dz = p[2] as f64 - cz;

            let x = cos_r * dx + sin_r * dy;
            let y = -sin_r * dx + cos_r * dy;

            if bbox.contains_local(x, y, dz) {
                Some([x as f32, y as f32, dz as f32])
            } else {
                None
            }
        })
        .collect()
}

/// Compute the eight corners of a box in the world frame.
///
/// The first four are the bottom face counter-clockwise from the local
/// `(-x, -y)` corner, the last four the top face in the same order.
pub fn box_corners(bbox: &OrientedBox) -> [Point; 8] {
    let half_w = bbox.width / 2.0;
    let half_l = bbox.length / 2.0;
    let h = bbox.height;

    let local = [
        [-half_w, -half_l, 0.0],
        [half_w, -half_l, 0.0],
        [half_w, half_l, 0.0],
        [-half_w, half_l, 0.0],
        [-half_w, -half_l, h],
        [half_w, -half_l, h],
        [half_w, half_l, h],
        [-half_w, half_l, h],
    ];

    let (sin_r, cos_r) = bbox.yaw.sin_cos();
    let [cx, cy, cz] = bbox.center;

    let mut corners = [[0.0f32; 3]; 8];
    for (corner, [x, y, z]) in corners.iter_mut().zip(local) {
        *corner = [
            (cos_r * x - sin_r * y + cx) as f32,
            (sin_r * x + cos_r * y + cy) as f32,
            (z + cz) as f32,
        ];
    }
    corners
}

/// Resample a point cloud to exactly `k` points.
///
/// Smaller clouds keep every original point and are padded with points drawn
/// uniformly with replacement. Larger clouds are replaced by `k` draws with
/// replacement. A cloud of exactly `k` points is returned unchanged.
///
/// # Errors
///
/// Returns `GeometryError::EmptyPointCloud` when asked for points from an empty cloud.
pub fn resample<R: Rng + ?Sized>(points: &[Point], k: usize, rng: &mut R) -> Result<Vec<Point>> {
    let n = points.len();

    if n == k {
        return Ok(points.to_vec());
    }
    if n == 0 {
        return Err(GeometryError::EmptyPointCloud { requested: k });
    }

    if n < k {
        let mut out = Vec::with_capacity(k);
        out.extend_from_slice(points);
        for _ in n..k {
            out.push(points[rng.gen_range(0..n)]);
        }
        Ok(out)
    } else {
        Ok((0..k).map(|_| points[rng.gen_range(0..n)]).collect())
    }
}

/// Keep every `stride`-th point, starting with the first.
///
/// A stride of 0 or 1 returns a copy of the input.
pub fn decimate(points: &[Point], stride: usize) -> Vec<Point> {
    if stride <= 1 {
        return points.to_vec();
    }
    points.iter().step_by(stride).copied().collect()
}
