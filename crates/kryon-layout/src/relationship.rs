// crates/kryon-layout/src/relationship.rs
use crate::{ElementId, Target};
use kryon_core::{Axis, Dimension, Index, OrientationGate};
use kryon_solver::{ConstraintHandle, Expression, Priority, Relation, SpaceId};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RelationshipId {
    layer: SpaceId,
    index: Index,
}

impl RelationshipId {
    pub(crate) fn new(layer: SpaceId, index: Index) -> Self {
        Self { layer, index }
    }

    pub fn layer(&self) -> SpaceId {
        self.layer
    }

    pub(crate) fn index(&self) -> Index {
        self.index
    }
}

impl fmt::Display for RelationshipId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}@{}", self.index, self.layer)
    }
}

/// The closed set of relationship shapes a layer understands
#[derive(Debug, Clone, PartialEq)]
pub enum RelationshipKind {
    Distance {
        axis: Axis,
        from: Target,
        to: Target,
        from_anchor: f64,
        to_anchor: f64,
        distance: f64,
    },
    Proportion {
        from: Target,
        from_dimension: Dimension,
        to: Target,
        to_dimension: Dimension,
        proportion: f64,
    },
    Aspect {
        element: ElementId,
        aspect: f64,
    },
    Custom {
        lhs: Expression,
        rhs: Expression,
    },
}

impl RelationshipKind {
    pub fn name(&self) -> &'static str {
        match self {
            RelationshipKind::Distance { .. } => "distance",
            RelationshipKind::Proportion { .. } => "proportion",
            RelationshipKind::Aspect { .. } => "aspect",
            RelationshipKind::Custom { .. } => "custom",
        }
    }

    /// Whether the relationship names `id` as one of its sides
    pub fn targets(&self, id: ElementId) -> bool {
        let target = Target::Element(id);
        match self {
            RelationshipKind::Distance { from, to, .. }
            | RelationshipKind::Proportion { from, to, .. } => *from == target || *to == target,
            RelationshipKind::Aspect { element, .. } => *element == id,
            RelationshipKind::Custom { .. } => false,
        }
    }
}

/// A registered relationship and the solver constraint backing it
#[derive(Debug, Clone)]
pub struct Relationship {
    pub(crate) kind: RelationshipKind,
    pub(crate) priority: Priority,
    pub(crate) relation: Relation,
    pub(crate) orientation: OrientationGate,
    pub(crate) enabled: bool,
    pub(crate) constraint: ConstraintHandle,
}

impl Relationship {
    pub fn kind(&self) -> &RelationshipKind {
        &self.kind
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn relation(&self) -> Relation {
        self.relation
    }

    pub fn orientation(&self) -> OrientationGate {
        self.orientation
    }

    /// The caller's enable flag; see [`Layer::is_relationship_active`](crate::Layer::is_relationship_active)
    /// for whether the relationship currently shapes the layout
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn constraint(&self) -> ConstraintHandle {
        self.constraint
    }

    pub fn distance(&self) -> Option<f64> {
        match self.kind {
            RelationshipKind::Distance { distance, .. } => Some(distance),
            _ => None,
        }
    }

    pub fn anchors(&self) -> Option<(f64, f64)> {
        match self.kind {
            RelationshipKind::Distance {
                from_anchor,
                to_anchor,
                ..
            } => Some((from_anchor, to_anchor)),
            _ => None,
        }
    }

    pub fn proportion(&self) -> Option<f64> {
        match self.kind {
            RelationshipKind::Proportion { proportion, .. } => Some(proportion),
            _ => None,
        }
    }

    pub fn aspect(&self) -> Option<f64> {
        match self.kind {
            RelationshipKind::Aspect { aspect, .. } => Some(aspect),
            _ => None,
        }
    }
}
