//! Live gaze telemetry shared between the tick thread and readers.
//!
//! Each field is overwritten by the most recent packet of its kind. There is
//! no history; readers always see the latest value.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};

use hmd_wire::GazeSample;
use nalgebra::{Point2, Point3};

/// Copy of every telemetry field at one point in time
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TelemetrySample {
    pub left_eye: Point2<f32>,
    pub right_eye: Point2<f32>,
    pub gaze_2d: Point2<f32>,
    /// Engine units
    pub gaze_3d: Point3<f32>,
}

impl Default for TelemetrySample {
    fn default() -> Self {
        Self {
            left_eye: Point2::origin(),
            right_eye: Point2::origin(),
            gaze_2d: Point2::origin(),
            gaze_3d: Point3::origin(),
        }
    }
}

/// Last-writer-wins store for live telemetry.
///
/// Intended to be shared as `Arc<TelemetryStore>`. Fields are locked
/// independently so a reader of one field never waits on a writer of another.
#[derive(Debug)]
pub struct TelemetryStore {
    left_eye: RwLock<Point2<f32>>,
    right_eye: RwLock<Point2<f32>>,
    gaze_2d: RwLock<Point2<f32>>,
    gaze_3d: RwLock<Point3<f32>>,
    updates: AtomicU64,
}

impl Default for TelemetryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn write<T>(lock: &RwLock<T>, value: T) {
    *lock.write().unwrap_or_else(PoisonError::into_inner) = value;
}

fn read<T: Copy>(lock: &RwLock<T>) -> T {
    *lock.read().unwrap_or_else(PoisonError::into_inner)
}

impl TelemetryStore {
    pub fn new() -> Self {
        Self {
            left_eye: RwLock::new(Point2::origin()),
            right_eye: RwLock::new(Point2::origin()),
            gaze_2d: RwLock::new(Point2::origin()),
            gaze_3d: RwLock::new(Point3::origin()),
            updates: AtomicU64::new(0),
        }
    }

    /// Overwrite the field matching the sample kind.
    pub fn apply(&self, sample: &GazeSample) {
        match *sample {
            GazeSample::LeftEye([x, y]) => write(&self.left_eye, Point2::new(x, y)),
            GazeSample::RightEye([x, y]) => write(&self.right_eye, Point2::new(x, y)),
            GazeSample::Point2d([x, y]) => write(&self.gaze_2d, Point2::new(x, y)),
            GazeSample::Point3d([x, y, z]) => write(&self.gaze_3d, Point3::new(x, y, z)),
        }
        self.updates.fetch_add(1, Ordering::Relaxed);
    }

    pub fn left_eye(&self) -> Point2<f32> {
        read(&self.left_eye)
    }

    pub fn right_eye(&self) -> Point2<f32> {
        read(&self.right_eye)
    }

    pub fn gaze_2d(&self) -> Point2<f32> {
        read(&self.gaze_2d)
    }

    pub fn gaze_3d(&self) -> Point3<f32> {
        read(&self.gaze_3d)
    }

    /// Read every field. Fields are read one after another, so a snapshot
    /// taken during an update may mix old and new values across fields.
    pub fn snapshot(&self) -> TelemetrySample {
        TelemetrySample {
            left_eye: self.left_eye(),
            right_eye: self.right_eye(),
            gaze_2d: self.gaze_2d(),
            gaze_3d: self.gaze_3d(),
        }
    }

    /// Total number of samples applied since creation
    pub fn update_count(&self) -> u64 {
        self.updates.load(Ordering::Relaxed)
    }
}
