use super::TrackSource;
use anyhow::Result;
use async_trait::async_trait;
use common::traffic::{BoundingBox, Point, TrackedFrame, TrackedObject};

/// Deterministic traffic generator: a grid of vehicles translating at a constant rate.
///
/// Vehicle `i` starts at `origin + (i % columns, i / columns) * spacing` and moves by
/// `velocity` pixels every frame. Ids are `1..=vehicles`.
#[derive(Debug, Clone)]
pub struct SyntheticTraffic {
    vehicles: usize,
    frames: u64,
    origin: Point,
    spacing: Point,
    columns: usize,
    velocity: Point,
    box_size: (f64, f64),
    class_label: String,
    fps: Option<f64>,
    next_index: u64,
}

impl SyntheticTraffic {
    pub fn new(vehicles: usize, frames: u64) -> Self {
        Self {
            vehicles,
            frames,
            origin: Point::new(100.0, 100.0),
            spacing: Point::new(40.0, 40.0),
            columns: 5,
            velocity: Point::new(0.0, 0.0),
            box_size: (20.0, 30.0),
            class_label: "car".to_string(),
            fps: None,
            next_index: 0,
        }
    }

    pub fn origin(mut self, x: f64, y: f64) -> Self {
        self.origin = Point::new(x, y);
        self
    }

    pub fn spacing(mut self, dx: f64, dy: f64) -> Self {
        self.spacing = Point::new(dx, dy);
        self
    }

    pub fn columns(mut self, columns: usize) -> Self {
        self.columns = columns.max(1);
        self
    }

    /// Displacement per frame in pixels
    pub fn velocity(mut self, dx: f64, dy: f64) -> Self {
        self.velocity = Point::new(dx, dy);
        self
    }

    pub fn box_size(mut self, width: f64, height: f64) -> Self {
        self.box_size = (width, height);
        self
    }

    pub fn class_label(mut self, class_label: impl Into<String>) -> Self {
        self.class_label = class_label.into();
        self
    }

    /// Stamp frames with timestamps derived from this capture rate
    pub fn with_fps(mut self, fps: f64) -> Self {
        self.fps = Some(fps);
        self
    }

    /// Frame at `index` without advancing the generator
    pub fn frame_at(&self, index: u64) -> TrackedFrame {
        let (w, h) = self.box_size;
        let t = index as f64;
        let objects = (0..self.vehicles)
            .map(|i| {
                let col = (i % self.columns) as f64;
                let row = (i / self.columns) as f64;
                let cx = self.origin.x + col * self.spacing.x + t * self.velocity.x;
                let cy = self.origin.y + row * self.spacing.y + t * self.velocity.y;
                TrackedObject::new(
                    i as u64 + 1,
                    BoundingBox::new(cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0),
                    self.class_label.clone(),
                )
            })
            .collect();

        TrackedFrame {
            frame_index: index,
            timestamp_ms: self
                .fps
                .filter(|fps| *fps > 0.0)
                .map(|fps| (t * 1000.0 / fps).round() as u64),
            objects,
        }
    }
}

impl Iterator for SyntheticTraffic {
    type Item = TrackedFrame;

    fn next(&mut self) -> Option<TrackedFrame> {
        if self.next_index >= self.frames {
            return None;
        }
        let frame = self.frame_at(self.next_index);
        self.next_index += 1;
        Some(frame)
    }
}

#[async_trait]
impl TrackSource for SyntheticTraffic {
    async fn next_frame(&mut self) -> Result<Option<TrackedFrame>> {
        Ok(self.next())
    }
}
