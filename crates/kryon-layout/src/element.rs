// crates/kryon-layout/src/element.rs
use glam::Vec2;
use kryon_core::{Axis, Dimension, Index};
use kryon_solver::{expression, ConstraintHandle, Expression, SpaceId, Variable};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementId {
    layer: SpaceId,
    index: Index,
}

impl ElementId {
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

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "e{}@{}", self.index, self.layer)
    }
}

/// One of the four unknowns every element carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Property {
    X,
    Y,
    Width,
    Height,
}

impl Property {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "x" => Some(Property::X),
            "y" => Some(Property::Y),
            "width" => Some(Property::Width),
            "height" => Some(Property::Height),
            _ => None,
        }
    }
}

/// A rectangle whose geometry is resolved by its layer
#[derive(Debug, Clone)]
pub struct Element {
    pub(crate) name: String,
    pub(crate) x: Variable,
    pub(crate) y: Variable,
    pub(crate) width: Variable,
    pub(crate) height: Variable,
    pub(crate) preferred_position: Option<Preferred>,
    pub(crate) preferred_size: Option<Preferred>,
}

/// Weak equalities pinning an element to its natural geometry
#[derive(Debug, Clone, Copy)]
pub(crate) struct Preferred {
    pub value: Vec2,
    pub constraints: [ConstraintHandle; 2],
}

impl Element {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn x(&self) -> Variable {
        self.x
    }

    pub fn y(&self) -> Variable {
        self.y
    }

    pub fn width(&self) -> Variable {
        self.width
    }

    pub fn height(&self) -> Variable {
        self.height
    }

    pub fn property(&self, property: Property) -> Variable {
        match property {
            Property::X => self.x,
            Property::Y => self.y,
            Property::Width => self.width,
            Property::Height => self.height,
        }
    }

    pub fn position(&self, axis: Axis) -> Variable {
        match axis {
            Axis::Horizontal => self.x,
            Axis::Vertical => self.y,
        }
    }

    pub fn size(&self, dimension: Dimension) -> Variable {
        match dimension {
            Dimension::Width => self.width,
            Dimension::Height => self.height,
        }
    }

    /// `position + anchor · size` along `axis`
    pub fn edge(&self, axis: Axis, anchor: f64) -> Expression {
        expression::add(
            &self.position(axis).into(),
            &expression::term(self.size(axis.dimension()), anchor),
        )
    }

    pub fn preferred_position(&self) -> Option<Vec2> {
        self.preferred_position.map(|preferred| preferred.value)
    }

    pub fn preferred_size(&self) -> Option<Vec2> {
        self.preferred_size.map(|preferred| preferred.value)
    }

    pub fn variables(&self) -> [Variable; 4] {
        [self.x, self.y, self.width, self.height]
    }

    pub(crate) fn owns(&self, variable: Variable) -> bool {
        self.variables().contains(&variable)
    }
}

/// Creation parameters for an element
#[derive(Debug, Clone, Default)]
pub struct ElementDesc {
    pub name: String,
    pub preferred_position: Option<Vec2>,
    pub preferred_size: Option<Vec2>,
}

impl ElementDesc {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_position(mut self, x: f32, y: f32) -> Self {
        self.preferred_position = Some(Vec2::new(x, y));
        self
    }

    pub fn with_size(mut self, width: f32, height: f32) -> Self {
        self.preferred_size = Some(Vec2::new(width, height));
        self
    }
}

/// Either side of a relationship: an element, or the layer's own frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Target {
    Element(ElementId),
    Layer,
}

impl From<ElementId> for Target {
    fn from(id: ElementId) -> Self {
        Target::Element(id)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Element(id) => write!(f, "{}", id),
            Target::Layer => f.write_str("layer"),
        }
    }
}
