// crates/kryon-layout/src/scene.rs
//
// JSON description of a layer: its size, named elements and the relationships
// between them. Elements are referred to by name; the name `layer` always
// means the layer's own frame.

use crate::{
    AspectConfig, CustomConfig, DistanceConfig, ElementDesc, ElementId, Layer, LayoutError,
    Property, ProportionConfig, Result, Target,
};
use glam::Vec2;
use kryon_core::Axis;
use kryon_solver::{Expression, Variable};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

const LAYER: &str = "layer";

#[derive(Debug, Clone, Deserialize)]
pub struct Scene {
    pub width: f64,
    pub height: f64,
    #[serde(default)]
    pub elements: Vec<ElementSpec>,
    #[serde(default)]
    pub relationships: Vec<RelationshipSpec>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ElementSpec {
    pub name: String,
    #[serde(default)]
    pub position: Option<[f32; 2]>,
    #[serde(default)]
    pub size: Option<[f32; 2]>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RelationshipSpec {
    Distance {
        axis: Axis,
        from: String,
        to: String,
        #[serde(flatten)]
        config: DistanceConfig,
    },
    Proportion {
        axis: Axis,
        from: String,
        to: String,
        #[serde(flatten)]
        config: ProportionConfig,
    },
    Aspect {
        element: String,
        #[serde(flatten)]
        config: AspectConfig,
    },
    Custom {
        lhs: ExpressionSpec,
        rhs: ExpressionSpec,
        #[serde(flatten)]
        config: CustomConfig,
    },
}

/// Either a bare number or `{ "constant": c, "terms": [["name.property", k], ...] }`
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ExpressionSpec {
    Constant(f64),
    Terms {
        #[serde(default)]
        constant: f64,
        #[serde(default)]
        terms: Vec<(String, f64)>,
    },
}

impl Scene {
    pub fn from_json(source: &str) -> Result<Self> {
        Ok(serde_json::from_str(source)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let source = std::fs::read_to_string(path)?;
        Self::from_json(&source)
    }

    /// Creates a live layer holding every element and relationship of the scene.
    /// Returns the layer with the element ids keyed by name.
    pub fn build(&self) -> Result<(Layer, HashMap<String, ElementId>)> {
        let mut layer = Layer::new(self.width, self.height)?;
        let mut names = HashMap::new();

        layer.batch(|layer| {
            for spec in &self.elements {
                if spec.name == LAYER || names.contains_key(&spec.name) {
                    return Err(LayoutError::DuplicateElement(spec.name.clone()));
                }
                let desc = ElementDesc {
                    name: spec.name.clone(),
                    preferred_position: spec.position.map(Vec2::from),
                    preferred_size: spec.size.map(Vec2::from),
                };
                names.insert(spec.name.clone(), layer.create_element_with(desc)?);
            }

            for spec in &self.relationships {
                add_relationship(layer, &names, spec)?;
            }
            Ok(())
        })?;

        debug!(
            "Built scene with {} elements and {} relationships",
            self.elements.len(),
            self.relationships.len()
        );
        Ok((layer, names))
    }
}

fn add_relationship(
    layer: &mut Layer,
    names: &HashMap<String, ElementId>,
    spec: &RelationshipSpec,
) -> Result<()> {
    match spec {
        RelationshipSpec::Distance {
            axis,
            from,
            to,
            config,
        } => {
            let (from, to) = (target(names, from)?, target(names, to)?);
            layer.add_distance(*axis, from, to, config.clone())?;
        }
        RelationshipSpec::Proportion {
            axis,
            from,
            to,
            config,
        } => {
            let (from, to) = (target(names, from)?, target(names, to)?);
            layer.add_proportion(*axis, from, to, config.clone())?;
        }
        RelationshipSpec::Aspect { element, config } => {
            let id = element_id(names, element)?;
            layer.add_aspect(id, config.clone())?;
        }
        RelationshipSpec::Custom { lhs, rhs, config } => {
            let lhs = expression(layer, names, lhs)?;
            let rhs = expression(layer, names, rhs)?;
            layer.add_custom(lhs, rhs, config.clone())?;
        }
    }
    Ok(())
}

fn element_id(names: &HashMap<String, ElementId>, name: &str) -> Result<ElementId> {
    names
        .get(name)
        .copied()
        .ok_or_else(|| LayoutError::UnknownElement(name.to_string()))
}

fn target(names: &HashMap<String, ElementId>, name: &str) -> Result<Target> {
    if name == LAYER {
        return Ok(Target::Layer);
    }
    element_id(names, name).map(Target::Element)
}

fn expression(
    layer: &Layer,
    names: &HashMap<String, ElementId>,
    spec: &ExpressionSpec,
) -> Result<Expression> {
    match spec {
        ExpressionSpec::Constant(value) => Ok(Expression::from(*value)),
        ExpressionSpec::Terms { constant, terms } => {
            let variables = terms
                .iter()
                .map(|(reference, coefficient)| Ok((variable(layer, names, reference)?, *coefficient)))
                .collect::<Result<Vec<_>>>()?;
            Ok(Expression::new(*constant, variables))
        }
    }
}

/// Resolves `element.property` or `layer.width` / `layer.height`
fn variable(layer: &Layer, names: &HashMap<String, ElementId>, reference: &str) -> Result<Variable> {
    let invalid = || LayoutError::InvalidProperty(reference.to_string());
    let (owner, property) = reference.rsplit_once('.').ok_or_else(invalid)?;
    let property = Property::from_name(property).ok_or_else(invalid)?;

    if owner == LAYER {
        return match property {
            Property::Width => Ok(layer.width_variable()),
            Property::Height => Ok(layer.height_variable()),
            Property::X | Property::Y => Err(invalid()),
        };
    }
    let id = element_id(names, owner)?;
    Ok(layer.element(id)?.property(property))
}
