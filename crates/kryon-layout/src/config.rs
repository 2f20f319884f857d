// crates/kryon-layout/src/config.rs
//
// Options accepted by the relationship constructors on `Layer`. Every field
// has a default, so scene files may leave any of them out.

use kryon_core::{Anchor, Dimension, OrientationGate};
use kryon_solver::{Priority, Relation};
use serde::Deserialize;

macro_rules! gating_builders {
    ($config:ty) => {
        impl $config {
            pub fn with_priority(mut self, priority: Priority) -> Self {
                self.priority = priority;
                self
            }

            pub fn with_relation(mut self, relation: Relation) -> Self {
                self.relation = relation;
                self
            }

            pub fn with_orientation(mut self, orientation: OrientationGate) -> Self {
                self.orientation = orientation;
                self
            }

            pub fn with_enabled(mut self, enabled: bool) -> Self {
                self.enabled = enabled;
                self
            }
        }
    };
}

/// `(to edge) − (from edge) (relation) distance`
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DistanceConfig {
    pub from_anchor: f64,
    pub to_anchor: f64,
    pub distance: f64,
    pub priority: Priority,
    pub relation: Relation,
    pub orientation: OrientationGate,
    pub enabled: bool,
}

impl Default for DistanceConfig {
    fn default() -> Self {
        Self {
            from_anchor: Anchor::START,
            to_anchor: Anchor::START,
            distance: 0.0,
            priority: Priority::Required,
            relation: Relation::Equal,
            orientation: OrientationGate::ALWAYS,
            enabled: true,
        }
    }
}

impl DistanceConfig {
    pub fn new(distance: f64) -> Self {
        Self {
            distance,
            ..Default::default()
        }
    }

    pub fn with_anchors(mut self, from_anchor: f64, to_anchor: f64) -> Self {
        self.from_anchor = from_anchor;
        self.to_anchor = to_anchor;
        self
    }
}

gating_builders!(DistanceConfig);

/// `to.size (relation) proportion · from.size`
///
/// Dimensions left unset follow the axis the relationship is created on, so
/// a cross-axis proportion only needs to name the dimension that differs.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ProportionConfig {
    pub from_dimension: Option<Dimension>,
    pub to_dimension: Option<Dimension>,
    pub proportion: f64,
    pub priority: Priority,
    pub relation: Relation,
    pub orientation: OrientationGate,
    pub enabled: bool,
}

impl Default for ProportionConfig {
    fn default() -> Self {
        Self {
            from_dimension: None,
            to_dimension: None,
            proportion: 1.0,
            priority: Priority::Required,
            relation: Relation::Equal,
            orientation: OrientationGate::ALWAYS,
            enabled: true,
        }
    }
}

impl ProportionConfig {
    pub fn new(proportion: f64) -> Self {
        Self {
            proportion,
            ..Default::default()
        }
    }

    pub fn with_dimensions(mut self, from: Dimension, to: Dimension) -> Self {
        self.from_dimension = Some(from);
        self.to_dimension = Some(to);
        self
    }
}

gating_builders!(ProportionConfig);

/// `width (relation) aspect · height`
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AspectConfig {
    pub aspect: f64,
    pub priority: Priority,
    pub relation: Relation,
    pub orientation: OrientationGate,
    pub enabled: bool,
}

impl Default for AspectConfig {
    fn default() -> Self {
        Self {
            aspect: 1.0,
            priority: Priority::Strong,
            relation: Relation::Equal,
            orientation: OrientationGate::ALWAYS,
            enabled: true,
        }
    }
}

impl AspectConfig {
    pub fn new(aspect: f64) -> Self {
        Self {
            aspect,
            ..Default::default()
        }
    }
}

gating_builders!(AspectConfig);

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CustomConfig {
    pub priority: Priority,
    pub relation: Relation,
    pub orientation: OrientationGate,
    pub enabled: bool,
}

impl Default for CustomConfig {
    fn default() -> Self {
        Self {
            priority: Priority::Required,
            relation: Relation::Equal,
            orientation: OrientationGate::ALWAYS,
            enabled: true,
        }
    }
}

gating_builders!(CustomConfig);
