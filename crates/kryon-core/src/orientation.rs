// crates/kryon-core/src/orientation.rs
use bitflags::bitflags;
use serde::{Deserialize, Deserializer};
use std::fmt;

/// Aspect classification of a layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    /// width > height
    Horizontal,
    /// height >= width
    Vertical,
}

impl Orientation {
    pub fn classify(width: f64, height: f64) -> Self {
        if width > height {
            Orientation::Horizontal
        } else {
            Orientation::Vertical
        }
    }

    pub fn gate(self) -> OrientationGate {
        match self {
            Orientation::Horizontal => OrientationGate::HORIZONTAL,
            Orientation::Vertical => OrientationGate::VERTICAL,
        }
    }
}

impl fmt::Display for Orientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Orientation::Horizontal => f.write_str("horizontal"),
            Orientation::Vertical => f.write_str("vertical"),
        }
    }
}

bitflags! {
    /// Orientations in which a relationship is allowed to be active
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct OrientationGate: u8 {
        const HORIZONTAL = 0b01;
        const VERTICAL = 0b10;
        const ALWAYS = Self::HORIZONTAL.bits() | Self::VERTICAL.bits();
    }
}

impl OrientationGate {
    pub fn admits(self, orientation: Orientation) -> bool {
        self.contains(orientation.gate())
    }
}

impl Default for OrientationGate {
    fn default() -> Self {
        OrientationGate::ALWAYS
    }
}

impl From<Orientation> for OrientationGate {
    fn from(orientation: Orientation) -> Self {
        orientation.gate()
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "lowercase")]
enum GateName {
    Always,
    Horizontal,
    Vertical,
}

impl<'de> Deserialize<'de> for OrientationGate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match GateName::deserialize(deserializer)? {
            GateName::Always => OrientationGate::ALWAYS,
            GateName::Horizontal => OrientationGate::HORIZONTAL,
            GateName::Vertical => OrientationGate::VERTICAL,
        })
    }
}
