// crates/kryon-solver/src/constraint.rs
use crate::row::Symbol;
use crate::variable::SpaceId;
use crate::{Expression, Priority, Relation, Variable};
use kryon_core::Index;
use std::fmt;

/// Opaque handle returned by [`Solver::create_constraint`](crate::Solver::create_constraint)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConstraintHandle {
    space: SpaceId,
    index: Index,
}

impl ConstraintHandle {
    pub(crate) fn new(space: SpaceId, index: Index) -> Self {
        Self { space, index }
    }

    pub fn space(&self) -> SpaceId {
        self.space
    }

    pub(crate) fn index(&self) -> Index {
        self.index
    }
}

impl fmt::Display for ConstraintHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "c{}@{}", self.index, self.space)
    }
}

/// Symbols a constraint occupies in the tableau while it is active
#[derive(Debug, Clone, Copy)]
pub(crate) struct Tag {
    pub marker: Symbol,
    pub other: Option<Symbol>,
}

/// A registered `lhs (relation) rhs` at some priority
#[derive(Debug, Clone)]
pub struct Constraint {
    pub(crate) lhs: Expression,
    pub(crate) rhs: Expression,
    pub(crate) relation: Relation,
    pub(crate) priority: Priority,
    pub(crate) enabled: bool,
    pub(crate) tag: Option<Tag>,
    /// Registration order; earlier constraints win ties when the tableau is rebuilt
    pub(crate) sequence: u64,
}

impl Constraint {
    pub fn lhs(&self) -> &Expression {
        &self.lhs
    }

    pub fn rhs(&self) -> &Expression {
        &self.rhs
    }

    pub fn relation(&self) -> Relation {
        self.relation
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Whether the constraint currently influences the solution
    pub fn is_active(&self) -> bool {
        self.tag.is_some()
    }

    pub fn references(&self, variable: Variable) -> bool {
        self.lhs.references(variable) || self.rhs.references(variable)
    }

    pub(crate) fn definition(&self) -> Definition {
        Definition {
            lhs: self.lhs.clone(),
            rhs: self.rhs.clone(),
            relation: self.relation,
            priority: self.priority,
        }
    }

    pub(crate) fn restore(&mut self, definition: Definition) {
        self.lhs = definition.lhs;
        self.rhs = definition.rhs;
        self.relation = definition.relation;
        self.priority = definition.priority;
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {} [{}]", self.lhs, self.relation, self.rhs, self.priority)
    }
}

/// The editable part of a constraint, kept aside so a failed edit can be undone
#[derive(Debug, Clone)]
pub(crate) struct Definition {
    pub lhs: Expression,
    pub rhs: Expression,
    pub relation: Relation,
    pub priority: Priority,
}
