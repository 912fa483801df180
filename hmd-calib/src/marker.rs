//! Visual marker shown at the current calibration target.

use nalgebra::Point3;
use tracing::debug;

/// Interface to whatever draws the calibration target.
///
/// Abstracts the renderer so calibration runs headless in tests and tools.
pub trait Marker {
    /// Show or hide the marker
    fn set_active(&mut self, active: bool);

    /// Move the marker to a world-space position
    fn set_position(&mut self, world: Point3<f32>);
}

/// Marker that only logs what it would display.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct LoggingMarker {
    active: bool,
    position: Option<Point3<f32>>,
}

impl LoggingMarker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Last position set, if any
    pub fn position(&self) -> Option<Point3<f32>> {
        self.position
    }
}

impl Marker for LoggingMarker {
    fn set_active(&mut self, active: bool) {
        if active != self.active {
            debug!("Marker {}", if active { "shown" } else { "hidden" });
        }
        self.active = active;
    }

    fn set_position(&mut self, world: Point3<f32>) {
        debug!(
            "Marker moved to ({:.3}, {:.3}, {:.3})",
            world.x, world.y, world.z
        );
        self.position = Some(world);
    }
}

impl<M: Marker + ?Sized> Marker for Box<M> {
    fn set_active(&mut self, active: bool) {
        (**self).set_active(active)
    }

    fn set_position(&mut self, world: Point3<f32>) {
        (**self).set_position(world)
    }
}
