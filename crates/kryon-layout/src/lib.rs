// crates/kryon-layout/src/lib.rs

use glam::Vec2;
use kryon_core::LayoutRect;
use kryon_solver::SolverError;
use std::collections::HashMap;

pub mod config;
pub mod element;
pub mod layer;
pub mod relationship;
pub mod scene;

pub use config::*;
pub use element::*;
pub use layer::*;
pub use relationship::*;
pub use scene::*;

/// Resolved geometry of every live element, as read by a renderer
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LayoutResult {
    pub computed_positions: HashMap<ElementId, Vec2>,
    pub computed_sizes: HashMap<ElementId, Vec2>,
}

impl LayoutResult {
    pub fn rect(&self, id: ElementId) -> Option<LayoutRect> {
        let position = self.computed_positions.get(&id)?;
        let size = self.computed_sizes.get(&id)?;
        Some(LayoutRect {
            position: *position,
            size: *size,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LayoutError {
    #[error(transparent)]
    Solver(#[from] SolverError),

    #[error("Invalid value for {context}: {value}")]
    InvalidValue { context: &'static str, value: f64 },

    #[error("Element {0} has been released")]
    StaleElement(ElementId),

    #[error("Element {0} belongs to a different layer")]
    ForeignElement(ElementId),

    #[error("Relationship {0} has been destroyed")]
    StaleRelationship(RelationshipId),

    #[error("Relationship {0} belongs to a different layer")]
    ForeignRelationship(RelationshipId),

    #[error("Element {element} is still referenced by {relationships} relationship(s)")]
    ElementInUse {
        element: ElementId,
        relationships: usize,
    },

    #[error("Relationship {id} is a {found} relationship, not {expected}")]
    KindMismatch {
        id: RelationshipId,
        expected: &'static str,
        found: &'static str,
    },

    #[error("Unknown element in scene: {0}")]
    UnknownElement(String),

    #[error("Duplicate element in scene: {0}")]
    DuplicateElement(String),

    #[error("Invalid property reference: {0}")]
    InvalidProperty(String),

    #[error("Scene parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl LayoutError {
    pub fn is_invalid_value(&self) -> bool {
        match self {
            LayoutError::InvalidValue { .. } => true,
            LayoutError::Solver(err) => err.is_invalid_value(),
            _ => false,
        }
    }

    pub fn is_invalid_handle(&self) -> bool {
        match self {
            LayoutError::StaleElement(_)
            | LayoutError::ForeignElement(_)
            | LayoutError::StaleRelationship(_)
            | LayoutError::ForeignRelationship(_)
            | LayoutError::ElementInUse { .. } => true,
            LayoutError::Solver(err) => err.is_invalid_handle(),
            _ => false,
        }
    }

    pub fn is_unsatisfiable(&self) -> bool {
        matches!(self, LayoutError::Solver(err) if err.is_unsatisfiable())
    }
}

pub type Result<T> = std::result::Result<T, LayoutError>;

pub(crate) fn check_finite(context: &'static str, value: f64) -> Result<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(LayoutError::InvalidValue { context, value })
    }
}
