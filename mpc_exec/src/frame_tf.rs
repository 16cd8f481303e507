//! # Frame transforms
//!
//! The body frame has its origin at the vehicle, X pointing forwards and Y to the left.

use nalgebra::Point2;

use crate::vehicle::Pose;

/// Express map frame points in the body frame of a vehicle at `pose`.
///
/// Each point is translated by the negated position and then rotated by the negated heading.
pub fn map_to_body(pose: &Pose, points_map: &[Point2<f64>]) -> Vec<Point2<f64>> {
    let iso = pose.isometry();

    points_map
        .iter()
        .map(|p| iso.inverse_transform_point(p))
        .collect()
}

/// Express body frame points in the map frame, the inverse of [`map_to_body`].
pub fn body_to_map(pose: &Pose, points_body: &[Point2<f64>]) -> Vec<Point2<f64>> {
    let iso = pose.isometry();

    points_body.iter().map(|p| iso.transform_point(p)).collect()
}
