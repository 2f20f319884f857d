// crates/kryon-core/src/layout_units.rs
use glam::Vec2;
use serde::Deserialize;

/// Layout axis a relationship measures along
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    Horizontal,
    Vertical,
}

impl Axis {
    /// The size dimension that runs along this axis
    pub fn dimension(self) -> Dimension {
        match self {
            Axis::Horizontal => Dimension::Width,
            Axis::Vertical => Dimension::Height,
        }
    }
}

/// One of an element's two size unknowns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dimension {
    Width,
    Height,
}

/// Normalized reference point along an element's extent.
///
/// 0 is the left/top edge, 0.5 the center and 1 the right/bottom edge.
/// Values outside that range are allowed and extrapolate past the edges.
pub struct Anchor;

impl Anchor {
    pub const START: f64 = 0.0;
    pub const CENTER: f64 = 0.5;
    pub const END: f64 = 1.0;
}

/// Resolved geometry handed to the renderer
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LayoutRect {
    pub position: Vec2,
    pub size: Vec2,
}

impl LayoutRect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            position: Vec2::new(x, y),
            size: Vec2::new(width, height),
        }
    }

    pub fn from_f64(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self::new(x as f32, y as f32, width as f32, height as f32)
    }

    pub fn center(&self) -> Vec2 {
        self.position + self.size * 0.5
    }
}
