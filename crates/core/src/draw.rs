use glam::Vec3;
use serde::{Deserialize, Serialize};

pub type Color = [f32; 3];

/// Immediate-mode debug drawing. The engine only describes geometry; the
/// sink decides how (and whether) to show it.
pub trait DebugDraw {
    fn line_strip(&mut self, points: &[Vec3], color: Color);
    fn point(&mut self, position: Vec3, color: Color);
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DrawSettings {
    pub edge_color: Color,
    pub line_strip_color: Color,
    pub selected_color: Color,
    pub show_vertices: bool,
}

impl Default for DrawSettings {
    fn default() -> Self {
        Self {
            edge_color: [0.85, 0.85, 0.9],
            line_strip_color: [0.3, 0.8, 1.0],
            selected_color: [1.0, 0.85, 0.3],
            show_vertices: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineVertex {
    pub position: [f32; 3],
    pub color: Color,
}

/// Collects draw calls as line-list vertices, the layout a line pipeline
/// consumes directly.
#[derive(Debug, Clone, Default)]
pub struct RecordingDraw {
    pub lines: Vec<LineVertex>,
    pub points: Vec<LineVertex>,
    pub strips: usize,
}

impl RecordingDraw {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn segment_count(&self) -> usize {
        self.lines.len() / 2
    }

    pub fn count_color(&self, color: Color) -> usize {
        self.lines.iter().filter(|v| v.color == color).count() / 2
    }
}

impl DebugDraw for RecordingDraw {
    fn line_strip(&mut self, points: &[Vec3], color: Color) {
        if points.len() < 2 {
            return;
        }
        self.strips += 1;
        for pair in points.windows(2) {
            self.lines.push(LineVertex {
                position: pair[0].to_array(),
                color,
            });
            self.lines.push(LineVertex {
                position: pair[1].to_array(),
                color,
            });
        }
    }

    fn point(&mut self, position: Vec3, color: Color) {
        self.points.push(LineVertex {
            position: position.to_array(),
            color,
        });
    }
}
