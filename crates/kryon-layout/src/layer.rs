//! The layout container
//!
//! A [`Layer`] owns one [`Solver`] and everything registered with it: the
//! layer's own width and height, its elements, and the relationships between
//! them. Relationships carry an orientation gate; whenever a resize flips the
//! layer between horizontal and vertical, the layer walks its observer list in
//! registration order and toggles every relationship whose gate no longer
//! matches. The whole resize is batched, so a transition costs one
//! re-derivation no matter how many relationships change state.

use crate::{
    check_finite, AspectConfig, CustomConfig, DistanceConfig, Element, ElementDesc, ElementId,
    LayoutError, LayoutResult, Preferred, ProportionConfig, Relationship, RelationshipId,
    RelationshipKind, Result, Target,
};
use glam::Vec2;
use kryon_core::{Arena, Axis, Dimension, LayoutRect, Orientation, OrientationGate};
use kryon_solver::{
    expression, ConstraintHandle, Expression, Priority, Relation, Solver, SpaceId, Variable,
};
use tracing::{debug, warn};

/// Outcome of [`Layer::set_size`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeChange {
    pub previous: Orientation,
    pub orientation: Orientation,
    pub activated: usize,
    pub deactivated: usize,
}

impl SizeChange {
    pub fn transitioned(&self) -> bool {
        self.previous != self.orientation
    }
}

#[derive(Debug)]
pub struct Layer {
    solver: Solver,
    width: Variable,
    height: Variable,
    size_constraints: [ConstraintHandle; 2],
    size: (f64, f64),
    orientation: Orientation,
    elements: Arena<Element>,
    relationships: Arena<Relationship>,
    /// Every live relationship, in registration order
    observers: Vec<RelationshipId>,
}

impl Layer {
    pub fn new(width: f64, height: f64) -> Result<Self> {
        check_size(width, height)?;

        let mut solver = Solver::new();
        let width_var = solver.new_variable("layer.width");
        let height_var = solver.new_variable("layer.height");

        solver.begin_batch();
        let created = required_value(&mut solver, width_var, width)
            .and_then(|w| Ok([w, required_value(&mut solver, height_var, height)?]));
        solver.end_batch()?;

        debug!("Created layer {} at {}x{}", solver.space(), width, height);
        Ok(Self {
            solver,
            width: width_var,
            height: height_var,
            size_constraints: created?,
            size: (width, height),
            orientation: Orientation::classify(width, height),
            elements: Arena::new(),
            relationships: Arena::new(),
            observers: Vec::new(),
        })
    }

    pub fn space(&self) -> SpaceId {
        self.solver.space()
    }

    pub fn solver(&self) -> &Solver {
        &self.solver
    }

    /// Number of times resolved geometry has been published
    pub fn derivations(&self) -> u64 {
        self.solver.derivations()
    }

    /// Runs `f` with publication deferred until it returns, so any number of
    /// edits cost a single re-derivation
    pub fn batch<T>(&mut self, f: impl FnOnce(&mut Layer) -> Result<T>) -> Result<T> {
        self.solver.begin_batch();
        let result = f(self);
        let published = self.solver.end_batch();
        let value = result?;
        published?;
        Ok(value)
    }

    pub fn size(&self) -> (f64, f64) {
        self.size
    }

    pub fn orientation(&self) -> Orientation {
        self.orientation
    }

    pub fn width_variable(&self) -> Variable {
        self.width
    }

    pub fn height_variable(&self) -> Variable {
        self.height
    }

    /// Resizes the layer and re-evaluates every orientation gate.
    ///
    /// Relationships leaving the active set are disabled before the new size is
    /// applied and relationships entering it are enabled afterwards, all inside
    /// one solver batch. If the new size itself conflicts with a required
    /// relationship the layer keeps its old size and state. If a relationship
    /// cannot be activated at the new size, the resize still happens, that
    /// relationship stays inactive (it is retried on the next resize) and the
    /// first such error is returned.
    pub fn set_size(&mut self, width: f64, height: f64) -> Result<SizeChange> {
        check_size(width, height)?;
        let previous = self.orientation;
        let next = Orientation::classify(width, height);

        if self.size == (width, height) {
            return Ok(SizeChange {
                previous,
                orientation: next,
                activated: 0,
                deactivated: 0,
            });
        }

        let result = self.batch(|layer| layer.apply_size(width, height, next));

        if let Ok(change) = &result {
            if change.transitioned() {
                debug!(
                    "Layer {} orientation {} -> {} ({} activated, {} deactivated)",
                    self.space(),
                    change.previous,
                    change.orientation,
                    change.activated,
                    change.deactivated
                );
            }
        }
        result
    }

    fn apply_size(&mut self, width: f64, height: f64, next: Orientation) -> Result<SizeChange> {
        let previous = self.orientation;
        let mut entering = Vec::new();
        let mut leaving = Vec::new();
        for &id in &self.observers {
            let Some(relationship) = self.relationships.get(id.index()) else {
                continue;
            };
            let current = self.solver.constraint(relationship.constraint)?.is_enabled();
            let desired = relationship.enabled && relationship.orientation.admits(next);
            match (current, desired) {
                (true, false) => leaving.push(relationship.constraint),
                (false, true) => entering.push((id, relationship.constraint)),
                _ => {}
            }
        }

        for &constraint in &leaving {
            self.solver.set_constraint_enabled(constraint, false)?;
        }

        if let Err(err) = self.resize_frame(width, height) {
            warn!("Layer {} rejected size {}x{}: {}", self.space(), width, height, err);
            for &constraint in &leaving {
                if let Err(restore) = self.solver.set_constraint_enabled(constraint, true) {
                    warn!("Could not restore constraint {}: {}", constraint, restore);
                }
            }
            return Err(err);
        }
        self.size = (width, height);
        self.orientation = next;

        let mut activated = 0;
        let mut first_error = None;
        for &(id, constraint) in &entering {
            match self.solver.set_constraint_enabled(constraint, true) {
                Ok(()) => activated += 1,
                Err(err) => {
                    warn!("Relationship {} stays inactive: {}", id, err);
                    first_error.get_or_insert(err);
                }
            }
        }

        match first_error {
            Some(err) => Err(err.into()),
            None => Ok(SizeChange {
                previous,
                orientation: next,
                activated,
                deactivated: leaving.len(),
            }),
        }
    }

    fn resize_frame(&mut self, width: f64, height: f64) -> Result<()> {
        let [width_constraint, height_constraint] = self.size_constraints;
        self.solver
            .set_constraint_rhs(width_constraint, expression::constant(width))?;
        if let Err(err) = self
            .solver
            .set_constraint_rhs(height_constraint, expression::constant(height))
        {
            self.solver
                .set_constraint_rhs(width_constraint, expression::constant(self.size.0))?;
            return Err(err.into());
        }
        Ok(())
    }

    // Elements

    pub fn create_element(&mut self, name: impl Into<String>) -> ElementId {
        let name = name.into();
        let element = Element {
            x: self.solver.new_variable(format!("{}.x", name)),
            y: self.solver.new_variable(format!("{}.y", name)),
            width: self.solver.new_variable(format!("{}.width", name)),
            height: self.solver.new_variable(format!("{}.height", name)),
            name,
            preferred_position: None,
            preferred_size: None,
        };
        let id = ElementId::new(self.space(), self.elements.insert(element));
        debug!("Created element {}", id);
        id
    }

    /// Creates an element and registers its preferred geometry as weak equalities
    pub fn create_element_with(&mut self, desc: ElementDesc) -> Result<ElementId> {
        for value in desc
            .preferred_position
            .iter()
            .chain(desc.preferred_size.iter())
            .flat_map(|v| [v.x, v.y])
        {
            check_finite("preferred geometry", value as f64)?;
        }

        let id = self.create_element(desc.name);
        let result = self.batch(|layer| {
            layer.set_preferred_position(id, desc.preferred_position)?;
            layer.set_preferred_size(id, desc.preferred_size)
        });

        if let Err(err) = result {
            self.release_element(id)?;
            return Err(err);
        }
        Ok(id)
    }

    pub fn element(&self, id: ElementId) -> Result<&Element> {
        if id.layer() != self.space() {
            return Err(LayoutError::ForeignElement(id));
        }
        self.elements
            .get(id.index())
            .ok_or(LayoutError::StaleElement(id))
    }

    pub fn elements(&self) -> impl Iterator<Item = (ElementId, &Element)> {
        let space = self.space();
        self.elements
            .iter()
            .map(move |(index, element)| (ElementId::new(space, index), element))
    }

    /// Replaces (or with `None`, removes) the weak preferred position
    pub fn set_preferred_position(&mut self, id: ElementId, position: Option<Vec2>) -> Result<()> {
        let element = self.element(id)?;
        let variables = [element.x, element.y];
        let previous = element.preferred_position;
        let preferred = self.replace_preferred(previous, variables, position)?;
        if let Some(element) = self.elements.get_mut(id.index()) {
            element.preferred_position = preferred;
        }
        Ok(())
    }

    /// Replaces (or with `None`, removes) the weak preferred size
    pub fn set_preferred_size(&mut self, id: ElementId, size: Option<Vec2>) -> Result<()> {
        let element = self.element(id)?;
        let variables = [element.width, element.height];
        let previous = element.preferred_size;
        let preferred = self.replace_preferred(previous, variables, size)?;
        if let Some(element) = self.elements.get_mut(id.index()) {
            element.preferred_size = preferred;
        }
        Ok(())
    }

    fn replace_preferred(
        &mut self,
        previous: Option<Preferred>,
        variables: [Variable; 2],
        value: Option<Vec2>,
    ) -> Result<Option<Preferred>> {
        if let Some(value) = value {
            check_finite("preferred geometry", value.x as f64)?;
            check_finite("preferred geometry", value.y as f64)?;
        }

        if let (Some(previous), Some(value)) = (previous, value) {
            for (constraint, component) in previous.constraints.into_iter().zip([value.x, value.y]) {
                self.solver
                    .set_constraint_rhs(constraint, expression::constant(component as f64))?;
            }
            return Ok(Some(Preferred {
                value,
                constraints: previous.constraints,
            }));
        }

        if let Some(previous) = previous {
            for constraint in previous.constraints {
                self.solver.destroy_constraint(constraint)?;
            }
        }

        let Some(value) = value else {
            return Ok(None);
        };
        let [first, second] = variables;
        let constraints = [
            self.prefer(first, value.x as f64)?,
            self.prefer(second, value.y as f64)?,
        ];
        Ok(Some(Preferred { value, constraints }))
    }

    fn prefer(&mut self, variable: Variable, value: f64) -> Result<ConstraintHandle> {
        let constraint = self.solver.create_constraint(
            variable.into(),
            expression::constant(value),
            Relation::Equal,
            Priority::Weak,
            true,
        )?;
        Ok(constraint)
    }

    /// Removes an element and its variables. Fails while any relationship
    /// still refers to it; releasing an already released element returns `false`.
    pub fn release_element(&mut self, id: ElementId) -> Result<bool> {
        if id.layer() != self.space() {
            return Err(LayoutError::ForeignElement(id));
        }
        let Some(element) = self.elements.get(id.index()) else {
            return Ok(false);
        };

        let relationships = self
            .relationships
            .iter()
            .filter(|(_, relationship)| references(relationship, id, element))
            .count();
        if relationships > 0 {
            return Err(LayoutError::ElementInUse {
                element: id,
                relationships,
            });
        }

        let preferred: Vec<ConstraintHandle> = element
            .preferred_position
            .iter()
            .chain(element.preferred_size.iter())
            .flat_map(|preferred| preferred.constraints)
            .collect();
        let variables = element.variables();

        self.batch(|layer| layer.release_variables(&preferred, variables))?;

        self.elements.remove(id.index());
        debug!("Released element {}", id);
        Ok(true)
    }

    fn release_variables(&mut self, preferred: &[ConstraintHandle], variables: [Variable; 4]) -> Result<()> {
        for &constraint in preferred {
            self.solver.destroy_constraint(constraint)?;
        }
        for variable in variables {
            self.solver.remove_variable(variable)?;
        }
        Ok(())
    }

    pub fn rect(&self, id: ElementId) -> Result<LayoutRect> {
        let element = self.element(id)?;
        let [x, y, width, height] = element.variables().map(|variable| self.solver.value(variable));
        Ok(LayoutRect::from_f64(x?, y?, width?, height?))
    }

    /// Resolved geometry of every live element
    pub fn snapshot(&self) -> Result<LayoutResult> {
        let mut result = LayoutResult::default();
        for (id, _) in self.elements() {
            let rect = self.rect(id)?;
            result.computed_positions.insert(id, rect.position);
            result.computed_sizes.insert(id, rect.size);
        }
        Ok(result)
    }

    // Relationships

    /// `(to edge) − (from edge) (relation) distance` along `axis`
    pub fn add_distance(
        &mut self,
        axis: Axis,
        from: impl Into<Target>,
        to: impl Into<Target>,
        config: DistanceConfig,
    ) -> Result<RelationshipId> {
        let kind = RelationshipKind::Distance {
            axis,
            from: from.into(),
            to: to.into(),
            from_anchor: config.from_anchor,
            to_anchor: config.to_anchor,
            distance: config.distance,
        };
        self.register(kind, config.priority, config.relation, config.orientation, config.enabled)
    }

    /// `to.size (relation) proportion · from.size`; dimensions default to `axis`
    pub fn add_proportion(
        &mut self,
        axis: Axis,
        from: impl Into<Target>,
        to: impl Into<Target>,
        config: ProportionConfig,
    ) -> Result<RelationshipId> {
        let kind = RelationshipKind::Proportion {
            from: from.into(),
            from_dimension: config.from_dimension.unwrap_or(axis.dimension()),
            to: to.into(),
            to_dimension: config.to_dimension.unwrap_or(axis.dimension()),
            proportion: config.proportion,
        };
        self.register(kind, config.priority, config.relation, config.orientation, config.enabled)
    }

    /// `width (relation) aspect · height`
    pub fn add_aspect(&mut self, element: ElementId, config: AspectConfig) -> Result<RelationshipId> {
        let kind = RelationshipKind::Aspect {
            element,
            aspect: config.aspect,
        };
        self.register(kind, config.priority, config.relation, config.orientation, config.enabled)
    }

    pub fn add_custom(
        &mut self,
        lhs: Expression,
        rhs: Expression,
        config: CustomConfig,
    ) -> Result<RelationshipId> {
        let kind = RelationshipKind::Custom { lhs, rhs };
        self.register(kind, config.priority, config.relation, config.orientation, config.enabled)
    }

    fn register(
        &mut self,
        kind: RelationshipKind,
        priority: Priority,
        relation: Relation,
        orientation: OrientationGate,
        enabled: bool,
    ) -> Result<RelationshipId> {
        let (lhs, rhs) = self.expressions(&kind)?;
        let active = enabled && orientation.admits(self.orientation);
        let constraint = self
            .solver
            .create_constraint(lhs, rhs, relation, priority, active)?;

        let index = self.relationships.insert(Relationship {
            kind,
            priority,
            relation,
            orientation,
            enabled,
            constraint,
        });
        let id = RelationshipId::new(self.space(), index);
        self.observers.push(id);
        debug!("Registered relationship {} (active={})", id, active);
        Ok(id)
    }

    pub fn relationship(&self, id: RelationshipId) -> Result<&Relationship> {
        if id.layer() != self.space() {
            return Err(LayoutError::ForeignRelationship(id));
        }
        self.relationships
            .get(id.index())
            .ok_or(LayoutError::StaleRelationship(id))
    }

    pub fn relationships(&self) -> impl Iterator<Item = (RelationshipId, &Relationship)> {
        self.observers.iter().filter_map(move |&id| {
            self.relationships
                .get(id.index())
                .map(|relationship| (id, relationship))
        })
    }

    /// Command surface for editing one relationship
    pub fn relationship_mut(&mut self, id: RelationshipId) -> Result<RelationshipMut<'_>> {
        self.relationship(id)?;
        Ok(RelationshipMut { layer: self, id })
    }

    /// Whether the relationship currently shapes the solution: enabled by the
    /// caller and admitted by its orientation gate
    pub fn is_relationship_active(&self, id: RelationshipId) -> Result<bool> {
        let relationship = self.relationship(id)?;
        Ok(self.solver.constraint(relationship.constraint)?.is_active())
    }

    /// Unregisters a relationship. Destroying it again returns `false`.
    pub fn destroy_relationship(&mut self, id: RelationshipId) -> Result<bool> {
        if id.layer() != self.space() {
            return Err(LayoutError::ForeignRelationship(id));
        }
        let Some(relationship) = self.relationships.get(id.index()) else {
            return Ok(false);
        };
        self.solver.destroy_constraint(relationship.constraint)?;
        self.relationships.remove(id.index());
        self.observers.retain(|observer| *observer != id);
        debug!("Destroyed relationship {}", id);
        Ok(true)
    }

    fn extent(&self, target: Target, dimension: Dimension) -> Result<Expression> {
        match (target, dimension) {
            (Target::Layer, Dimension::Width) => Ok(self.width.into()),
            (Target::Layer, Dimension::Height) => Ok(self.height.into()),
            (Target::Element(id), dimension) => Ok(self.element(id)?.size(dimension).into()),
        }
    }

    /// The layer frame starts at the origin, so its edge is `anchor · extent`
    fn edge(&self, target: Target, axis: Axis, anchor: f64) -> Result<Expression> {
        match target {
            Target::Layer => Ok(expression::scale(&self.extent(target, axis.dimension())?, anchor)),
            Target::Element(id) => Ok(self.element(id)?.edge(axis, anchor)),
        }
    }

    /// Validates the parameters of `kind` and expands it into `(lhs, rhs)`
    fn expressions(&self, kind: &RelationshipKind) -> Result<(Expression, Expression)> {
        match kind {
            RelationshipKind::Distance {
                axis,
                from,
                to,
                from_anchor,
                to_anchor,
                distance,
            } => {
                check_finite("anchor", *from_anchor)?;
                check_finite("anchor", *to_anchor)?;
                let distance = check_finite("distance", *distance)?;
                let lhs = expression::subtract(
                    &self.edge(*to, *axis, *to_anchor)?,
                    &self.edge(*from, *axis, *from_anchor)?,
                );
                Ok((lhs, expression::constant(distance)))
            }
            RelationshipKind::Proportion {
                from,
                from_dimension,
                to,
                to_dimension,
                proportion,
            } => {
                let proportion = check_finite("proportion", *proportion)?;
                let lhs = self.extent(*to, *to_dimension)?;
                let rhs = expression::scale(&self.extent(*from, *from_dimension)?, proportion);
                Ok((lhs, rhs))
            }
            RelationshipKind::Aspect { element, aspect } => {
                let aspect = check_finite("aspect ratio", *aspect)?;
                if aspect <= 0.0 {
                    return Err(LayoutError::InvalidValue {
                        context: "aspect ratio",
                        value: aspect,
                    });
                }
                let element = self.element(*element)?;
                Ok((
                    element.width.into(),
                    expression::term(element.height, aspect),
                ))
            }
            RelationshipKind::Custom { lhs, rhs } => Ok((lhs.clone(), rhs.clone())),
        }
    }

    fn replace_kind(&mut self, id: RelationshipId, kind: RelationshipKind) -> Result<()> {
        let (lhs, rhs) = self.expressions(&kind)?;
        let constraint = self.relationship(id)?.constraint;
        self.solver.set_constraint_expressions(constraint, lhs, rhs)?;
        if let Some(relationship) = self.relationships.get_mut(id.index()) {
            relationship.kind = kind;
        }
        Ok(())
    }

    /// Brings the solver's enabled flag in line with the relationship's flag and gate
    fn sync_activation(&mut self, id: RelationshipId) -> Result<()> {
        let relationship = self.relationship(id)?;
        let desired = relationship.enabled && relationship.orientation.admits(self.orientation);
        let constraint = relationship.constraint;
        self.solver.set_constraint_enabled(constraint, desired)?;
        Ok(())
    }
}

fn check_size(width: f64, height: f64) -> Result<()> {
    for value in [width, height] {
        if !value.is_finite() || value < 0.0 {
            return Err(LayoutError::InvalidValue {
                context: "layer size",
                value,
            });
        }
    }
    Ok(())
}

fn required_value(solver: &mut Solver, variable: Variable, value: f64) -> kryon_solver::Result<ConstraintHandle> {
    solver.create_constraint(
        variable.into(),
        expression::constant(value),
        Relation::Equal,
        Priority::Required,
        true,
    )
}

fn references(relationship: &Relationship, id: ElementId, element: &Element) -> bool {
    match &relationship.kind {
        RelationshipKind::Custom { lhs, rhs } => lhs
            .variables()
            .chain(rhs.variables())
            .any(|variable| element.owns(variable)),
        kind => kind.targets(id),
    }
}

/// Mutable view of one relationship.
///
/// Every setter re-derives the layout immediately. A rejected edit (invalid
/// value, or a required conflict) leaves the relationship exactly as it was.
pub struct RelationshipMut<'a> {
    layer: &'a mut Layer,
    id: RelationshipId,
}

impl<'a> RelationshipMut<'a> {
    pub fn id(&self) -> RelationshipId {
        self.id
    }

    pub fn get(&self) -> Result<&Relationship> {
        self.layer.relationship(self.id)
    }

    pub fn set_distance(&mut self, distance: f64) -> Result<()> {
        let mut kind = self.kind()?;
        match &mut kind {
            RelationshipKind::Distance { distance: d, .. } => *d = distance,
            other => return Err(self.mismatch("distance", other)),
        }
        self.layer.replace_kind(self.id, kind)
    }

    pub fn set_anchors(&mut self, from_anchor: f64, to_anchor: f64) -> Result<()> {
        let mut kind = self.kind()?;
        match &mut kind {
            RelationshipKind::Distance {
                from_anchor: from,
                to_anchor: to,
                ..
            } => {
                *from = from_anchor;
                *to = to_anchor;
            }
            other => return Err(self.mismatch("distance", other)),
        }
        self.layer.replace_kind(self.id, kind)
    }

    pub fn set_proportion(&mut self, proportion: f64) -> Result<()> {
        let mut kind = self.kind()?;
        match &mut kind {
            RelationshipKind::Proportion { proportion: p, .. } => *p = proportion,
            other => return Err(self.mismatch("proportion", other)),
        }
        self.layer.replace_kind(self.id, kind)
    }

    pub fn set_aspect(&mut self, aspect: f64) -> Result<()> {
        let mut kind = self.kind()?;
        match &mut kind {
            RelationshipKind::Aspect { aspect: a, .. } => *a = aspect,
            other => return Err(self.mismatch("aspect", other)),
        }
        self.layer.replace_kind(self.id, kind)
    }

    pub fn set_expressions(&mut self, lhs: Expression, rhs: Expression) -> Result<()> {
        let kind = self.kind()?;
        if !matches!(kind, RelationshipKind::Custom { .. }) {
            return Err(self.mismatch("custom", &kind));
        }
        self.layer
            .replace_kind(self.id, RelationshipKind::Custom { lhs, rhs })
    }

    pub fn set_priority(&mut self, priority: Priority) -> Result<()> {
        let constraint = self.get()?.constraint;
        self.layer
            .solver
            .set_constraint_priority(constraint, priority)?;
        self.entry()?.priority = priority;
        Ok(())
    }

    pub fn set_relation(&mut self, relation: Relation) -> Result<()> {
        let constraint = self.get()?.constraint;
        self.layer
            .solver
            .set_constraint_relation(constraint, relation)?;
        self.entry()?.relation = relation;
        Ok(())
    }

    pub fn set_orientation(&mut self, orientation: OrientationGate) -> Result<()> {
        let previous = std::mem::replace(&mut self.entry()?.orientation, orientation);
        if let Err(err) = self.layer.sync_activation(self.id) {
            self.entry()?.orientation = previous;
            return Err(err);
        }
        Ok(())
    }

    pub fn set_enabled(&mut self, enabled: bool) -> Result<()> {
        let previous = std::mem::replace(&mut self.entry()?.enabled, enabled);
        if let Err(err) = self.layer.sync_activation(self.id) {
            self.entry()?.enabled = previous;
            return Err(err);
        }
        Ok(())
    }

    pub fn destroy(self) -> Result<bool> {
        self.layer.destroy_relationship(self.id)
    }

    fn kind(&self) -> Result<RelationshipKind> {
        Ok(self.get()?.kind.clone())
    }

    fn entry(&mut self) -> Result<&mut Relationship> {
        self.layer
            .relationships
            .get_mut(self.id.index())
            .ok_or(LayoutError::StaleRelationship(self.id))
    }

    fn mismatch(&self, expected: &'static str, found: &RelationshipKind) -> LayoutError {
        LayoutError::KindMismatch {
            id: self.id,
            expected,
            found: found.name(),
        }
    }
}
