//! Drawing surface abstraction
//!
//! The core only issues scaled geometric primitives. Window management and
//! rasterization belong to whatever implements [`DrawSurface`].

use crate::geometry::{Color, Point};
use crate::Result;
use serde::Serialize;
use std::collections::VecDeque;
use std::io::Write;
use std::time::{SystemTime, UNIX_EPOCH};

/// Events coming back from the display side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiEvent {
    /// Window closed or equivalent. Ends the process without draining.
    Quit,
}

/// One primitive issued during a frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum DrawCommand {
    Background {
        color: Color,
    },
    Line {
        start: Point,
        end: Point,
        color: Color,
        width: f64,
    },
    Circle {
        center: Point,
        radius: f64,
        color: Color,
    },
    Polygon {
        points: Vec<Point>,
        color: Color,
        width: f64,
    },
}

/// Capability to receive render-space primitives.
pub trait DrawSurface {
    fn fill_background(&mut self, color: Color);

    fn draw_line(&mut self, start: Point, end: Point, color: Color, width: f64);

    /// Filled circle.
    fn draw_circle(&mut self, center: Point, radius: f64, color: Color);

    /// Polygon outline of `width`, or filled when `width` is zero.
    fn draw_polygon(&mut self, points: &[Point], color: Color, width: f64);

    /// Publish everything drawn since the previous call as one frame.
    fn present(&mut self) -> Result<()>;

    /// Render-space size the scene needs, set whenever workspaces are built.
    fn set_canvas(&mut self, _width: f64, _height: f64) {}

    /// Drain pending display events.
    fn poll_events(&mut self) -> Vec<UiEvent> {
        Vec::new()
    }
}

/// Surface that discards every primitive.
#[derive(Debug, Clone, Default)]
pub struct NullSurface;

impl DrawSurface for NullSurface {
    fn fill_background(&mut self, _color: Color) {}
    fn draw_line(&mut self, _start: Point, _end: Point, _color: Color, _width: f64) {}
    fn draw_circle(&mut self, _center: Point, _radius: f64, _color: Color) {}
    fn draw_polygon(&mut self, _points: &[Point], _color: Color, _width: f64) {}

    fn present(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Surface that keeps every frame in memory.
#[derive(Debug, Default)]
pub struct RecordingSurface {
    canvas: Option<[f64; 2]>,
    current: Vec<DrawCommand>,
    frames: Vec<Vec<DrawCommand>>,
    events: VecDeque<UiEvent>,
}

impl RecordingSurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// Commands issued since the last `present`.
    pub fn pending(&self) -> &[DrawCommand] {
        &self.current
    }

    pub fn frames(&self) -> &[Vec<DrawCommand>] {
        &self.frames
    }

    pub fn last_frame(&self) -> Option<&[DrawCommand]> {
        self.frames.last().map(|f| f.as_slice())
    }

    pub fn canvas(&self) -> Option<[f64; 2]> {
        self.canvas
    }

    /// Queue an event for the next `poll_events`.
    pub fn push_event(&mut self, event: UiEvent) {
        self.events.push_back(event);
    }
}

impl DrawSurface for RecordingSurface {
    fn fill_background(&mut self, color: Color) {
        self.current.push(DrawCommand::Background { color });
    }

    fn draw_line(&mut self, start: Point, end: Point, color: Color, width: f64) {
        self.current.push(DrawCommand::Line { start, end, color, width });
    }

    fn draw_circle(&mut self, center: Point, radius: f64, color: Color) {
        self.current.push(DrawCommand::Circle { center, radius, color });
    }

    fn draw_polygon(&mut self, points: &[Point], color: Color, width: f64) {
        self.current.push(DrawCommand::Polygon {
            points: points.to_vec(),
            color,
            width,
        });
    }

    fn present(&mut self) -> Result<()> {
        self.frames.push(std::mem::take(&mut self.current));
        Ok(())
    }

    fn set_canvas(&mut self, width: f64, height: f64) {
        self.canvas = Some([width, height]);
    }

    fn poll_events(&mut self) -> Vec<UiEvent> {
        self.events.drain(..).collect()
    }
}

/// Get current timestamp as f64 seconds since UNIX epoch
pub fn current_timestamp() -> f64 {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64();
    (timestamp * 1_000_000.0).round() / 1_000_000.0
}

#[derive(Serialize)]
struct FrameRecord<'a> {
    #[serde(rename = "type")]
    event_type: &'static str,
    seq: u64,
    stime: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    canvas: Option<[f64; 2]>,
    commands: &'a [DrawCommand],
}

/// Surface that writes each frame as one JSON line.
///
/// Lets an external renderer (or a test harness) consume frames from a pipe.
pub struct JsonSurface<W: Write> {
    writer: W,
    canvas: Option<[f64; 2]>,
    current: Vec<DrawCommand>,
    seq: u64,
}

impl JsonSurface<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write> JsonSurface<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            canvas: None,
            current: Vec::new(),
            seq: 0,
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> DrawSurface for JsonSurface<W> {
    fn fill_background(&mut self, color: Color) {
        self.current.push(DrawCommand::Background { color });
    }

    fn draw_line(&mut self, start: Point, end: Point, color: Color, width: f64) {
        self.current.push(DrawCommand::Line { start, end, color, width });
    }

    fn draw_circle(&mut self, center: Point, radius: f64, color: Color) {
        self.current.push(DrawCommand::Circle { center, radius, color });
    }

    fn draw_polygon(&mut self, points: &[Point], color: Color, width: f64) {
        self.current.push(DrawCommand::Polygon {
            points: points.to_vec(),
            color,
            width,
        });
    }

    fn present(&mut self) -> Result<()> {
        let record = FrameRecord {
            event_type: "frame",
            seq: self.seq,
            stime: current_timestamp(),
            canvas: self.canvas,
            commands: &self.current,
        };
        let line = serde_json::to_string(&record)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        writeln!(self.writer, "{}", line)?;
        self.writer.flush()?;
        self.seq += 1;
        self.current.clear();
        Ok(())
    }

    fn set_canvas(&mut self, width: f64, height: f64) {
        self.canvas = Some([width, height]);
    }
}
