//! Calibration target layouts.
//!
//! Targets are positions in camera-local space (+Z forward, metres). The
//! sequence is fixed before a run starts and visited in order.

use nalgebra::Point3;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TargetError {
    #[error("Target sequence is empty")]
    Empty,

    #[error("Target {index} has depth {depth}, must be in front of the camera")]
    NotInFront { index: usize, depth: f32 },
}

/// Declarative description of a target layout, as stored in configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TargetLayout {
    /// Points on a circle around the optical axis, optionally preceded by the centre
    Circle {
        points: usize,
        radius: f32,
        depth: f32,
        include_center: bool,
    },
    /// Centred NxN grid
    Grid { size: usize, spacing: f32, depth: f32 },
    /// Explicit list of camera-local positions
    Explicit { points: Vec<[f32; 3]> },
}

impl Default for TargetLayout {
    fn default() -> Self {
        TargetLayout::Circle {
            points: 8,
            radius: 0.5,
            depth: 2.0,
            include_center: true,
        }
    }
}

/// Ordered, immutable sequence of calibration targets.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetSequence {
    targets: Vec<Point3<f32>>,
}

impl TargetSequence {
    /// Create a sequence from explicit positions.
    ///
    /// # Errors
    /// Returns [`TargetError::Empty`] if no positions are given.
    pub fn new(targets: Vec<Point3<f32>>) -> Result<Self, TargetError> {
        if targets.is_empty() {
            return Err(TargetError::Empty);
        }
        Ok(Self { targets })
    }

    /// Points arranged on a circle at `depth`, starting on the +X axis and
    /// going counter-clockwise, with the centre point first if requested.
    pub fn circle(
        num_points: usize,
        radius: f32,
        depth: f32,
        include_center: bool,
    ) -> Result<Self, TargetError> {
        let center = include_center.then(|| Point3::new(0.0, 0.0, depth));
        let ring = (0..num_points).map(|i| {
            let angle = 2.0 * std::f32::consts::PI * i as f32 / num_points as f32;
            Point3::new(radius * angle.cos(), radius * angle.sin(), depth)
        });
        Self::new(center.into_iter().chain(ring).collect())
    }

    /// A centred `grid_size` x `grid_size` grid at `depth`, row by row.
    pub fn grid(grid_size: usize, spacing: f32, depth: f32) -> Result<Self, TargetError> {
        let half_extent = grid_size.saturating_sub(1) as f32 / 2.0;
        let mut targets = Vec::with_capacity(grid_size * grid_size);
        for row in 0..grid_size {
            for col in 0..grid_size {
                targets.push(Point3::new(
                    (col as f32 - half_extent) * spacing,
                    (row as f32 - half_extent) * spacing,
                    depth,
                ));
            }
        }
        Self::new(targets)
    }

    /// Build the sequence a configured layout describes.
    ///
    /// # Errors
    /// Besides [`TargetError::Empty`], every target must lie in front of the
    /// camera (finite, positive Z) or [`TargetError::NotInFront`] is returned.
    pub fn from_layout(layout: &TargetLayout) -> Result<Self, TargetError> {
        let sequence = match layout {
            TargetLayout::Circle {
                points,
                radius,
                depth,
                include_center,
            } => Self::circle(*points, *radius, *depth, *include_center),
            TargetLayout::Grid {
                size,
                spacing,
                depth,
            } => Self::grid(*size, *spacing, *depth),
            TargetLayout::Explicit { points } => {
                Self::new(points.iter().map(|&[x, y, z]| Point3::new(x, y, z)).collect())
            }
        }?;
        if let Some((index, target)) = sequence
            .iter()
            .enumerate()
            .find(|(_, t)| !(t.z.is_finite() && t.z > 0.0))
        {
            return Err(TargetError::NotInFront {
                index,
                depth: target.z,
            });
        }
        Ok(sequence)
    }

    pub fn count(&self) -> usize {
        self.targets.len()
    }

    /// Camera-local position of target `index`, or `None` past the end.
    pub fn position_at(&self, index: usize) -> Option<Point3<f32>> {
        self.targets.get(index).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Point3<f32>> {
        self.targets.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_circle_with_center() {
        let targets = TargetSequence::circle(4, 0.2, 2.0, true).unwrap();
        assert_eq!(targets.count(), 5);

        let expected = [
            (0.0, 0.0),
            (0.2, 0.0),
            (0.0, 0.2),
            (-0.2, 0.0),
            (0.0, -0.2),
        ];
        for (i, (x, y)) in expected.iter().enumerate() {
            let p = targets.position_at(i).unwrap();
            assert_relative_eq!(p.x, *x, epsilon = 1e-6);
            assert_relative_eq!(p.y, *y, epsilon = 1e-6);
            assert_relative_eq!(p.z, 2.0);
        }
        assert!(targets.position_at(5).is_none());
    }

    #[test]
    fn test_centered_grid() {
        let targets = TargetSequence::grid(3, 0.1, 1.5).unwrap();
        assert_eq!(targets.count(), 9);

        let first = targets.position_at(0).unwrap();
        assert_relative_eq!(first.x, -0.1, epsilon = 1e-6);
        assert_relative_eq!(first.y, -0.1, epsilon = 1e-6);
        let middle = targets.position_at(4).unwrap();
        assert_relative_eq!(middle.x, 0.0, epsilon = 1e-6);
        assert_relative_eq!(middle.y, 0.0, epsilon = 1e-6);

        let single = TargetSequence::grid(1, 0.1, 1.5).unwrap();
        assert_eq!(single.count(), 1);
        assert_relative_eq!(single.position_at(0).unwrap().x, 0.0);
    }

    #[test]
    fn test_empty_layouts_rejected() {
        assert_eq!(
            TargetSequence::circle(0, 0.2, 2.0, false).unwrap_err(),
            TargetError::Empty
        );
        assert_eq!(TargetSequence::grid(0, 0.1, 1.0).unwrap_err(), TargetError::Empty);
        assert_eq!(TargetSequence::new(vec![]).unwrap_err(), TargetError::Empty);
    }

    #[test]
    fn test_layout_from_json() {
        let layout: TargetLayout = serde_json::from_str(
            r#"{"kind": "explicit", "points": [[0.0, 0.0, 1.0], [0.1, -0.1, 1.0]]}"#,
        )
        .unwrap();
        let targets = TargetSequence::from_layout(&layout).unwrap();
        assert_eq!(targets.count(), 2);
        assert_eq!(targets.position_at(1), Some(Point3::new(0.1, -0.1, 1.0)));
    }

    #[test]
    fn test_layout_behind_camera_rejected() {
        let layout = TargetLayout::Explicit {
            points: vec![[0.0, 0.0, 1.0], [0.2, 0.1, -0.5]],
        };
        assert_eq!(
            TargetSequence::from_layout(&layout).unwrap_err(),
            TargetError::NotInFront {
                index: 1,
                depth: -0.5
            }
        );

        let layout = TargetLayout::Grid {
            size: 2,
            spacing: 0.1,
            depth: 0.0,
        };
        assert!(matches!(
            TargetSequence::from_layout(&layout),
            Err(TargetError::NotInFront { index: 0, .. })
        ));
    }
}
