//! Incremental simplex solver
//!
//! The tableau is kept in the form used by the Cassowary family of layout
//! solvers: every basic symbol has a row `basic = constant + Σ cᵢ·symbolᵢ`,
//! restricted symbols (slack and error) stay non-negative, and the objective
//! is the weighted sum of error symbols. Adding or removing a constraint
//! touches only the rows that reference it and then re-optimizes from the
//! current basis, so edits cost a few pivots instead of a full solve.
//!
//! Solved values are published to the variable table after each mutation.
//! Mutations made between [`Solver::begin_batch`] and [`Solver::end_batch`]
//! are published once, when the outermost batch closes.
//!
//! Creating a constraint appends it to the tableau in registration order, so
//! the incremental result is the one a full re-solve would reach. Any other
//! change to the active set (disabling, re-enabling an older constraint,
//! editing a definition) is still checked incrementally, which is where an
//! unsatisfiable required set is caught, but leaves the tableau stale. A stale
//! tableau is rebuilt in registration order before the next publish, so
//! equal-priority ties always go to the constraint registered first.

use crate::constraint::{Constraint, ConstraintHandle, Tag};
use crate::expression::{self, Expression};
use crate::row::{Objective, Row, Symbol, SymbolKind};
use crate::strength::Weight;
use crate::variable::{SpaceId, Variable};
use crate::{near_zero, Priority, Relation, Result, SolverError, TOLERANCE};
use kryon_core::{Arena, Index};
use std::collections::BTreeMap;
use tracing::{debug, trace, warn};

#[derive(Debug)]
struct VariableSlot {
    name: String,
    value: f64,
    symbol: Option<Symbol>,
}

#[derive(Debug, Clone, Copy)]
enum Phase {
    Objective,
    Artificial,
}

#[derive(Debug)]
pub struct Solver {
    space: SpaceId,
    variables: Arena<VariableSlot>,
    constraints: Arena<Constraint>,
    rows: BTreeMap<Symbol, Row>,
    objective: Objective,
    artificial: Option<Objective>,
    next_symbol: u32,
    next_sequence: u64,
    /// Set when a failed insertion left pivots behind that must be rebuilt away
    disturbed: bool,
    /// Set when the tableau no longer matches an in-order insertion of the active set
    stale: bool,
    /// Highest registration sequence inserted since the last rebuild
    frontier: Option<u64>,
    batch_depth: u32,
    dirty: bool,
    derivations: u64,
}

impl Solver {
    pub fn new() -> Self {
        Self {
            space: SpaceId::next(),
            variables: Arena::new(),
            constraints: Arena::new(),
            rows: BTreeMap::new(),
            objective: Objective::default(),
            artificial: None,
            next_symbol: 0,
            next_sequence: 0,
            disturbed: false,
            stale: false,
            frontier: None,
            batch_depth: 0,
            dirty: false,
            derivations: 0,
        }
    }

    pub fn space(&self) -> SpaceId {
        self.space
    }

    pub fn new_variable(&mut self, name: impl Into<String>) -> Variable {
        let index = self.variables.insert(VariableSlot {
            name: name.into(),
            value: 0.0,
            symbol: None,
        });
        Variable::new(self.space, index)
    }

    pub fn variable_name(&self, variable: Variable) -> Result<&str> {
        Ok(self.variable_slot(variable)?.name.as_str())
    }

    /// Releases a variable. Fails while any constraint, enabled or not, still
    /// mentions it. Returns `false` when the variable was already released.
    pub fn remove_variable(&mut self, variable: Variable) -> Result<bool> {
        if variable.space() != self.space {
            return Err(SolverError::ForeignVariable(variable));
        }
        if !self.variables.contains(variable.index()) {
            return Ok(false);
        }

        let constraints = self.references(variable);
        if constraints > 0 {
            return Err(SolverError::VariableInUse {
                variable,
                constraints,
            });
        }

        if let Some(slot) = self.variables.remove(variable.index()) {
            if let Some(symbol) = slot.symbol {
                self.rows.remove(&symbol);
                for row in self.rows.values_mut() {
                    row.remove(symbol);
                }
                self.objective.remove(symbol);
            }
        }
        Ok(true)
    }

    /// Number of registered constraints mentioning `variable`
    pub fn references(&self, variable: Variable) -> usize {
        self.constraints
            .iter()
            .filter(|(_, constraint)| constraint.references(variable))
            .count()
    }

    /// Registers `lhs (relation) rhs` and, when enabled, solves for it immediately.
    ///
    /// An enabled required constraint that conflicts with the active required
    /// set is rejected with [`SolverError::Unsatisfiable`] and nothing is
    /// registered.
    pub fn create_constraint(
        &mut self,
        lhs: Expression,
        rhs: Expression,
        relation: Relation,
        priority: Priority,
        enabled: bool,
    ) -> Result<ConstraintHandle> {
        self.validate_expression(&lhs)?;
        self.validate_expression(&rhs)?;

        let index = self.constraints.insert(Constraint {
            lhs,
            rhs,
            relation,
            priority,
            enabled: false,
            tag: None,
            sequence: self.next_sequence,
        });
        self.next_sequence += 1;
        let handle = ConstraintHandle::new(self.space, index);

        if enabled {
            if let Err(err) = self.activate(index) {
                self.constraints.remove(index);
                return Err(err);
            }
            self.set_enabled_flag(index, true);
            self.mark_dirty()?;
        }

        debug!("Created constraint {}", handle);
        Ok(handle)
    }

    pub fn constraint(&self, handle: ConstraintHandle) -> Result<&Constraint> {
        let index = self.resolve(handle)?;
        self.constraints
            .get(index)
            .ok_or(SolverError::StaleConstraint(handle))
    }

    pub fn set_constraint_lhs(&mut self, handle: ConstraintHandle, lhs: Expression) -> Result<()> {
        let rhs = self.constraint(handle)?.rhs.clone();
        self.set_constraint_expressions(handle, lhs, rhs)
    }

    pub fn set_constraint_rhs(&mut self, handle: ConstraintHandle, rhs: Expression) -> Result<()> {
        let lhs = self.constraint(handle)?.lhs.clone();
        self.set_constraint_expressions(handle, lhs, rhs)
    }

    /// Replaces both sides with a single re-derivation
    pub fn set_constraint_expressions(
        &mut self,
        handle: ConstraintHandle,
        lhs: Expression,
        rhs: Expression,
    ) -> Result<()> {
        let index = self.resolve(handle)?;
        self.validate_expression(&lhs)?;
        self.validate_expression(&rhs)?;
        self.redefine(index, |constraint| {
            constraint.lhs = lhs;
            constraint.rhs = rhs;
        })
    }

    pub fn set_constraint_relation(&mut self, handle: ConstraintHandle, relation: Relation) -> Result<()> {
        if self.constraint(handle)?.relation == relation {
            return Ok(());
        }
        let index = self.resolve(handle)?;
        self.redefine(index, |constraint| constraint.relation = relation)
    }

    pub fn set_constraint_priority(&mut self, handle: ConstraintHandle, priority: Priority) -> Result<()> {
        if self.constraint(handle)?.priority == priority {
            return Ok(());
        }
        let index = self.resolve(handle)?;
        self.redefine(index, |constraint| constraint.priority = priority)
    }

    /// Includes or excludes a constraint from the solution without discarding it.
    /// Setting the current state again is a no-op.
    pub fn set_constraint_enabled(&mut self, handle: ConstraintHandle, enabled: bool) -> Result<()> {
        let index = self.resolve(handle)?;
        let constraint = self
            .constraints
            .get(index)
            .ok_or(SolverError::StaleConstraint(handle))?;
        if constraint.enabled == enabled {
            return Ok(());
        }

        if enabled {
            self.activate(index)?;
        } else {
            self.retire(index)?;
        }
        self.set_enabled_flag(index, enabled);

        debug!("Constraint {} enabled={}", handle, enabled);
        self.mark_dirty()
    }

    /// Permanently unregisters a constraint. Destroying an already destroyed
    /// handle returns `Ok(false)`.
    pub fn destroy_constraint(&mut self, handle: ConstraintHandle) -> Result<bool> {
        if handle.space() != self.space {
            return Err(SolverError::ForeignConstraint(handle));
        }
        let index = handle.index();
        let Some(constraint) = self.constraints.get(index) else {
            return Ok(false);
        };
        let was_active = constraint.is_active();

        self.retire(index)?;
        self.constraints.remove(index);
        if was_active {
            self.mark_dirty()?;
        }

        debug!("Destroyed constraint {}", handle);
        Ok(true)
    }

    /// Last published value of `variable`
    pub fn value(&self, variable: Variable) -> Result<f64> {
        let slot = self.variable_slot(variable)?;
        if self.derivations == 0 {
            return Err(SolverError::NotSolved);
        }
        Ok(slot.value)
    }

    /// Evaluates `expression` against the published values
    pub fn evaluate(&self, expression: &Expression) -> Result<f64> {
        self.validate_expression(expression)?;
        if self.derivations == 0 {
            return Err(SolverError::NotSolved);
        }
        Ok(expression.evaluate(|variable| {
            self.variables
                .get(variable.index())
                .map_or(0.0, |slot| slot.value)
        }))
    }

    /// Whether the constraint holds for the published values, within [`TOLERANCE`]
    pub fn is_satisfied(&self, handle: ConstraintHandle) -> Result<bool> {
        let constraint = self.constraint(handle)?;
        let lhs = self.evaluate(&constraint.lhs)?;
        let rhs = self.evaluate(&constraint.rhs)?;
        Ok(constraint.relation.holds(lhs, rhs, TOLERANCE))
    }

    /// Number of times solved values have been published
    pub fn derivations(&self) -> u64 {
        self.derivations
    }

    pub fn begin_batch(&mut self) {
        self.batch_depth += 1;
    }

    /// Closes a batch; the outermost close publishes pending changes.
    ///
    /// Fails only if rebuilding a stale tableau rejected an enabled constraint.
    pub fn end_batch(&mut self) -> Result<()> {
        self.batch_depth = self.batch_depth.saturating_sub(1);
        if self.batch_depth == 0 && self.dirty {
            return self.publish();
        }
        Ok(())
    }

    /// Throws the tableau away and re-adds every enabled constraint in
    /// registration order.
    ///
    /// An enabled constraint that cannot be re-added stays enabled but inactive
    /// and is reported as [`SolverError::Unsatisfiable`]; the remaining
    /// constraints are still solved and published.
    pub fn rebuild(&mut self) -> Result<()> {
        let rebuilt = self.rebuild_tableau();
        self.mark_dirty()?;
        rebuilt
    }

    fn resolve(&self, handle: ConstraintHandle) -> Result<Index> {
        if handle.space() != self.space {
            return Err(SolverError::ForeignConstraint(handle));
        }
        if !self.constraints.contains(handle.index()) {
            return Err(SolverError::StaleConstraint(handle));
        }
        Ok(handle.index())
    }

    fn variable_slot(&self, variable: Variable) -> Result<&VariableSlot> {
        if variable.space() != self.space {
            return Err(SolverError::ForeignVariable(variable));
        }
        self.variables
            .get(variable.index())
            .ok_or(SolverError::StaleVariable(variable))
    }

    fn validate_expression(&self, expression: &Expression) -> Result<()> {
        if let Some(value) = expression.non_finite_value() {
            return Err(SolverError::InvalidValue {
                context: "constraint expression",
                value,
            });
        }
        for variable in expression.variables() {
            self.variable_slot(variable)?;
        }
        Ok(())
    }

    fn describe(&self, constraint: &Constraint) -> String {
        let name = |expression: &Expression| {
            let mut parts: Vec<String> = expression
                .terms()
                .iter()
                .map(|term| {
                    let name = self.variable_name(term.variable).unwrap_or("?");
                    format!("{} * {}", term.coefficient, name)
                })
                .collect();
            if parts.is_empty() || expression.constant() != 0.0 {
                parts.push(expression.constant().to_string());
            }
            parts.join(" + ")
        };
        format!(
            "{} {} {} [{}]",
            name(&constraint.lhs),
            constraint.relation,
            name(&constraint.rhs),
            constraint.priority
        )
    }

    /// Applies `edit` to the constraint definition, re-solving if it is enabled.
    /// A rejected edit restores the previous definition.
    ///
    /// The old rows leave the tableau under the old definition, so their error
    /// weights are removed from the objective at the tier they were added with.
    fn redefine(&mut self, index: Index, edit: impl FnOnce(&mut Constraint)) -> Result<()> {
        let constraint = self
            .constraints
            .get(index)
            .ok_or(SolverError::Internal("missing constraint record"))?;
        let previous = constraint.definition();
        let enabled = constraint.enabled;

        if enabled {
            self.retire(index)?;
            self.set_enabled_flag(index, false);
        }
        if let Some(constraint) = self.constraints.get_mut(index) {
            edit(constraint);
        }
        if !enabled {
            return Ok(());
        }

        let result = match self.activate(index) {
            Ok(()) => Ok(()),
            Err(err) => {
                warn!("Edit rejected, restoring previous definition: {}", err);
                if let Some(constraint) = self.constraints.get_mut(index) {
                    constraint.restore(previous);
                }
                self.activate(index)?;
                Err(err)
            }
        };
        self.set_enabled_flag(index, true);
        self.mark_dirty()?;
        result
    }

    fn set_enabled_flag(&mut self, index: Index, enabled: bool) {
        if let Some(constraint) = self.constraints.get_mut(index) {
            constraint.enabled = enabled;
        }
    }

    /// Takes an enabled constraint out of the tableau. If removal fails part
    /// way, the tableau is rebuilt with the constraint, still enabled, in place.
    fn retire(&mut self, index: Index) -> Result<()> {
        if let Err(err) = self.deactivate(index) {
            warn!("Removing constraint failed, rebuilding tableau: {}", err);
            self.rebuild_tableau()?;
            self.mark_dirty()?;
            return Err(err);
        }
        Ok(())
    }

    fn activate(&mut self, index: Index) -> Result<()> {
        let constraint = self
            .constraints
            .get(index)
            .ok_or(SolverError::Internal("missing constraint record"))?;
        if constraint.is_active() {
            return Ok(());
        }
        let (lhs, rhs) = (constraint.lhs.clone(), constraint.rhs.clone());
        let (relation, priority) = (constraint.relation, constraint.priority);
        let sequence = constraint.sequence;

        match self.insert(&lhs, &rhs, relation, priority) {
            Ok(tag) => {
                if let Some(constraint) = self.constraints.get_mut(index) {
                    constraint.tag = Some(tag);
                }
                if self.frontier.map_or(true, |frontier| sequence > frontier) {
                    self.frontier = Some(sequence);
                } else {
                    self.stale = true;
                }
                Ok(())
            }
            Err(SolverError::Unsatisfiable { .. }) => {
                let description = self
                    .constraints
                    .get(index)
                    .map(|constraint| self.describe(constraint))
                    .unwrap_or_default();
                // Symbols allocated for the rejected row shift the ordering a
                // rebuild would produce.
                self.stale = true;
                if self.disturbed {
                    warn!("Rebuilding tableau after rejected constraint {}", description);
                    self.rebuild_tableau()?;
                }
                Err(SolverError::Unsatisfiable {
                    constraint: description,
                })
            }
            Err(err) => Err(err),
        }
    }

    fn deactivate(&mut self, index: Index) -> Result<()> {
        let Some(constraint) = self.constraints.get_mut(index) else {
            return Ok(());
        };
        let Some(tag) = constraint.tag.take() else {
            return Ok(());
        };
        let weight = constraint.priority.weight();
        self.stale = true;

        self.remove_marker_effects(tag.marker, weight);
        if let Some(other) = tag.other {
            self.remove_marker_effects(other, weight);
        }

        // A basic marker's row is simply dropped; otherwise pivot it into the
        // basis first.
        if self.rows.remove(&tag.marker).is_none() {
            if let Some(leaving) = self.marker_leaving_row(tag.marker) {
                let mut row = self
                    .rows
                    .remove(&leaving)
                    .ok_or(SolverError::Internal("missing leaving row"))?;
                row.solve_for_pair(leaving, tag.marker);
                self.substitute(tag.marker, &row);
            }
        }

        self.optimize(Phase::Objective)
    }

    fn remove_marker_effects(&mut self, marker: Symbol, weight: Weight) {
        if marker.kind() != SymbolKind::Error {
            return;
        }
        match self.rows.get(&marker) {
            Some(row) => self.objective.insert_row(row, -weight),
            None => self.objective.insert_symbol(marker, -weight),
        }
    }

    fn insert(
        &mut self,
        lhs: &Expression,
        rhs: &Expression,
        relation: Relation,
        priority: Priority,
    ) -> Result<Tag> {
        let (mut row, tag) = self.create_row(lhs, rhs, relation, priority);
        let mut subject = Self::choose_subject(&row, &tag);

        if subject.is_none() && row.all_dummies() {
            if !near_zero(row.constant) {
                return Err(SolverError::Unsatisfiable {
                    constraint: String::new(),
                });
            }
            subject = Some(tag.marker);
        }

        match subject {
            Some(subject) => {
                row.solve_for(subject);
                self.substitute(subject, &row);
                self.rows.insert(subject, row);
            }
            None => {
                if !self.add_with_artificial_variable(row)? {
                    self.disturbed = true;
                    return Err(SolverError::Unsatisfiable {
                        constraint: String::new(),
                    });
                }
            }
        }

        self.optimize(Phase::Objective)?;
        Ok(tag)
    }

    fn create_row(
        &mut self,
        lhs: &Expression,
        rhs: &Expression,
        relation: Relation,
        priority: Priority,
    ) -> (Row, Tag) {
        let expression = expression::subtract(lhs, rhs);
        let mut row = Row::new(expression.constant());

        for term in expression.terms() {
            if near_zero(term.coefficient) {
                continue;
            }
            let symbol = self.variable_symbol(term.variable);
            match self.rows.get(&symbol) {
                Some(basic) => row.insert_row(basic, term.coefficient),
                None => row.insert_symbol(symbol, term.coefficient),
            }
        }

        let weight = priority.weight();
        let tag = match relation {
            Relation::LessOrEqual | Relation::GreaterOrEqual => {
                let coefficient = if relation == Relation::LessOrEqual { 1.0 } else { -1.0 };
                let slack = self.new_symbol(SymbolKind::Slack);
                row.insert_symbol(slack, coefficient);

                let other = if priority.is_required() {
                    None
                } else {
                    let error = self.new_symbol(SymbolKind::Error);
                    row.insert_symbol(error, -coefficient);
                    self.objective.insert_symbol(error, weight);
                    Some(error)
                };
                Tag { marker: slack, other }
            }
            Relation::Equal if priority.is_required() => {
                let dummy = self.new_symbol(SymbolKind::Dummy);
                row.insert_symbol(dummy, 1.0);
                Tag {
                    marker: dummy,
                    other: None,
                }
            }
            Relation::Equal => {
                let plus = self.new_symbol(SymbolKind::Error);
                let minus = self.new_symbol(SymbolKind::Error);
                row.insert_symbol(plus, -1.0);
                row.insert_symbol(minus, 1.0);
                self.objective.insert_symbol(plus, weight);
                self.objective.insert_symbol(minus, weight);
                Tag {
                    marker: plus,
                    other: Some(minus),
                }
            }
        };

        if row.constant < 0.0 {
            row.reverse_sign();
        }
        (row, tag)
    }

    /// External symbols first, then a restricted marker with a negative coefficient
    fn choose_subject(row: &Row, tag: &Tag) -> Option<Symbol> {
        if let Some(symbol) = row.cells.keys().copied().find(Symbol::is_external) {
            return Some(symbol);
        }
        std::iter::once(tag.marker)
            .chain(tag.other)
            .find(|symbol| symbol.is_pivotable() && row.coefficient_for(*symbol) < 0.0)
    }

    /// Phase-one insertion: succeeds only if the artificial objective reaches zero
    fn add_with_artificial_variable(&mut self, row: Row) -> Result<bool> {
        let art = self.new_symbol(SymbolKind::Slack);
        self.artificial = Some(Objective::from_row(&row, Weight::ARTIFICIAL));
        self.rows.insert(art, row);

        let optimized = self.optimize(Phase::Artificial);
        let success = self
            .artificial
            .take()
            .is_some_and(|artificial| artificial.constant.is_near_zero());
        optimized?;

        if let Some(mut basic) = self.rows.remove(&art) {
            if basic.cells.is_empty() {
                return Ok(success);
            }
            let Some(entering) = basic.any_pivotable_symbol() else {
                return Ok(false);
            };
            basic.solve_for_pair(art, entering);
            self.substitute(entering, &basic);
            self.rows.insert(entering, basic);
        }

        for row in self.rows.values_mut() {
            row.remove(art);
        }
        self.objective.remove(art);
        Ok(success)
    }

    fn optimize(&mut self, phase: Phase) -> Result<()> {
        let mut pivots = 0usize;
        loop {
            let objective = match phase {
                Phase::Objective => &self.objective,
                Phase::Artificial => match &self.artificial {
                    Some(artificial) => artificial,
                    None => return Ok(()),
                },
            };
            let Some(entering) = objective.entering_symbol() else {
                trace!("Optimized {:?} in {} pivots", phase, pivots);
                return Ok(());
            };
            let leaving = self
                .leaving_row(entering)
                .ok_or(SolverError::Internal("objective is unbounded"))?;
            let mut row = self
                .rows
                .remove(&leaving)
                .ok_or(SolverError::Internal("missing leaving row"))?;
            row.solve_for_pair(leaving, entering);
            self.substitute(entering, &row);
            self.rows.insert(entering, row);
            pivots += 1;
        }
    }

    /// Minimum-ratio test over restricted rows; ties go to the lowest symbol
    fn leaving_row(&self, entering: Symbol) -> Option<Symbol> {
        let mut best: Option<(f64, Symbol)> = None;
        for (&symbol, row) in &self.rows {
            if symbol.is_external() {
                continue;
            }
            let coefficient = row.coefficient_for(entering);
            if coefficient < 0.0 {
                let ratio = -row.constant / coefficient;
                if best.map_or(true, |(current, _)| ratio < current) {
                    best = Some((ratio, symbol));
                }
            }
        }
        best.map(|(_, symbol)| symbol)
    }

    /// Row to pivot a non-basic marker into the basis when its constraint is removed
    fn marker_leaving_row(&self, marker: Symbol) -> Option<Symbol> {
        let mut negative: Option<(f64, Symbol)> = None;
        let mut positive: Option<(f64, Symbol)> = None;
        let mut external: Option<Symbol> = None;

        for (&symbol, row) in &self.rows {
            let coefficient = row.coefficient_for(marker);
            if coefficient == 0.0 {
                continue;
            }
            if symbol.is_external() {
                external = Some(symbol);
            } else if coefficient < 0.0 {
                let ratio = -row.constant / coefficient;
                if negative.map_or(true, |(current, _)| ratio < current) {
                    negative = Some((ratio, symbol));
                }
            } else {
                let ratio = row.constant / coefficient;
                if positive.map_or(true, |(current, _)| ratio < current) {
                    positive = Some((ratio, symbol));
                }
            }
        }

        negative
            .or(positive)
            .map(|(_, symbol)| symbol)
            .or(external)
    }

    fn substitute(&mut self, symbol: Symbol, row: &Row) {
        for basic in self.rows.values_mut() {
            basic.substitute(symbol, row);
        }
        self.objective.substitute(symbol, row);
        if let Some(artificial) = self.artificial.as_mut() {
            artificial.substitute(symbol, row);
        }
    }

    fn variable_symbol(&mut self, variable: Variable) -> Symbol {
        let existing = self
            .variables
            .get(variable.index())
            .and_then(|slot| slot.symbol);
        if let Some(symbol) = existing {
            return symbol;
        }
        let symbol = self.new_symbol(SymbolKind::External);
        if let Some(slot) = self.variables.get_mut(variable.index()) {
            slot.symbol = Some(symbol);
        }
        symbol
    }

    fn new_symbol(&mut self, kind: SymbolKind) -> Symbol {
        let symbol = Symbol::new(self.next_symbol, kind);
        self.next_symbol += 1;
        symbol
    }

    /// Re-inserts every enabled constraint in registration order. A constraint
    /// that cannot be inserted is left out, the rest are inserted again from an
    /// empty tableau, and the first rejection is returned once done.
    fn rebuild_tableau(&mut self) -> Result<()> {
        let mut order: Vec<(u64, Index)> = self
            .constraints
            .iter()
            .filter(|(_, constraint)| constraint.enabled)
            .map(|(index, constraint)| (constraint.sequence, index))
            .collect();
        order.sort();

        let mut rejected: Option<String> = None;
        loop {
            self.reset_tableau();
            debug!("Rebuilding tableau from {} constraints", order.len());

            let mut failed = None;
            for (position, &(_, index)) in order.iter().enumerate() {
                let Some(constraint) = self.constraints.get(index) else {
                    continue;
                };
                let (lhs, rhs) = (constraint.lhs.clone(), constraint.rhs.clone());
                let (relation, priority) = (constraint.relation, constraint.priority);

                match self.insert(&lhs, &rhs, relation, priority) {
                    Ok(tag) => {
                        if let Some(constraint) = self.constraints.get_mut(index) {
                            constraint.tag = Some(tag);
                        }
                    }
                    Err(SolverError::Unsatisfiable { .. }) => {
                        failed = Some(position);
                        break;
                    }
                    Err(err) => return Err(err),
                }
            }

            let Some(position) = failed else {
                break;
            };
            let (_, index) = order.remove(position);
            let description = self
                .constraints
                .get(index)
                .map(|constraint| self.describe(constraint))
                .unwrap_or_default();
            warn!("Enabled constraint left out of rebuilt tableau: {}", description);
            rejected.get_or_insert(description);
        }

        self.stale = false;
        self.frontier = order.last().map(|&(sequence, _)| sequence);
        match rejected {
            Some(constraint) => Err(SolverError::Unsatisfiable { constraint }),
            None => Ok(()),
        }
    }

    fn reset_tableau(&mut self) {
        self.rows.clear();
        self.objective = Objective::default();
        self.artificial = None;
        self.disturbed = false;
        for (_, constraint) in self.constraints.iter_mut() {
            constraint.tag = None;
        }
        for (_, slot) in self.variables.iter_mut() {
            slot.symbol = None;
        }
    }

    fn mark_dirty(&mut self) -> Result<()> {
        self.dirty = true;
        if self.batch_depth == 0 {
            return self.publish();
        }
        Ok(())
    }

    /// Writes solved values to the variable table, rebuilding a stale tableau
    /// first. Values are published even when the rebuild rejects a constraint.
    fn publish(&mut self) -> Result<()> {
        let rebuilt = if self.stale {
            self.rebuild_tableau()
        } else {
            Ok(())
        };

        let rows = &self.rows;
        for (_, slot) in self.variables.iter_mut() {
            let value = slot
                .symbol
                .and_then(|symbol| rows.get(&symbol))
                .map_or(0.0, |row| row.constant);
            slot.value = if near_zero(value) { 0.0 } else { value };
        }
        self.dirty = false;
        self.derivations += 1;
        trace!("Published derivation {} ({} rows)", self.derivations, self.rows.len());
        rebuilt
    }
}

impl Default for Solver {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::{constant, term};

    fn assert_near(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1.0e-6,
            "expected {}, got {}",
            expected,
            actual
        );
    }

    #[test]
    fn test_value_before_solve() {
        let mut solver = Solver::new();
        let x = solver.new_variable("x");
        assert_eq!(solver.value(x), Err(SolverError::NotSolved));
    }

    #[test]
    fn test_required_equality() {
        let mut solver = Solver::new();
        let x = solver.new_variable("x");
        let y = solver.new_variable("y");

        solver
            .create_constraint(x.into(), constant(100.0), Relation::Equal, Priority::Required, true)
            .unwrap();
        solver
            .create_constraint(y - x, constant(50.0), Relation::Equal, Priority::Required, true)
            .unwrap();

        assert_near(solver.value(x).unwrap(), 100.0);
        assert_near(solver.value(y).unwrap(), 150.0);
    }

    #[test]
    fn test_inequality_is_tight_without_pressure() {
        let mut solver = Solver::new();
        let a = solver.new_variable("a");
        let b = solver.new_variable("b");

        solver
            .create_constraint(a.into(), constant(200.0), Relation::Equal, Priority::Required, true)
            .unwrap();
        solver
            .create_constraint(term(a, 0.5), b.into(), Relation::LessOrEqual, Priority::Required, true)
            .unwrap();

        assert_near(solver.value(b).unwrap(), 100.0);
    }

    #[test]
    fn test_conflicting_required_constraints() {
        let mut solver = Solver::new();
        let x = solver.new_variable("x");

        solver
            .create_constraint(x.into(), constant(10.0), Relation::Equal, Priority::Required, true)
            .unwrap();
        let err = solver
            .create_constraint(x.into(), constant(20.0), Relation::Equal, Priority::Required, true)
            .unwrap_err();

        assert!(err.is_unsatisfiable());
        assert_near(solver.value(x).unwrap(), 10.0);
        assert_eq!(solver.references(x), 1);
    }

    #[test]
    fn test_directional_required_conflict() {
        let mut solver = Solver::new();
        let x = solver.new_variable("x");

        solver
            .create_constraint(x.into(), constant(10.0), Relation::LessOrEqual, Priority::Required, true)
            .unwrap();
        let err = solver
            .create_constraint(x.into(), constant(20.0), Relation::GreaterOrEqual, Priority::Required, true)
            .unwrap_err();

        assert!(err.is_unsatisfiable());
        assert!(solver.value(x).unwrap() <= 10.0 + 1.0e-6);
    }

    #[test]
    fn test_weak_yields_to_required() {
        let mut solver = Solver::new();
        let x = solver.new_variable("x");

        solver
            .create_constraint(x.into(), constant(10.0), Relation::Equal, Priority::Required, true)
            .unwrap();
        let weak = solver
            .create_constraint(x.into(), constant(20.0), Relation::Equal, Priority::Weak, true)
            .unwrap();

        assert_near(solver.value(x).unwrap(), 10.0);
        assert!(!solver.is_satisfied(weak).unwrap());
    }

    #[test]
    fn test_equal_priority_first_registered_wins() {
        let mut solver = Solver::new();
        let x = solver.new_variable("x");

        solver
            .create_constraint(x.into(), constant(10.0), Relation::Equal, Priority::Medium, true)
            .unwrap();
        solver
            .create_constraint(x.into(), constant(30.0), Relation::Equal, Priority::Medium, true)
            .unwrap();

        assert_near(solver.value(x).unwrap(), 10.0);
    }

    #[test]
    fn test_lower_tier_never_outweighs_higher() {
        let mut solver = Solver::new();
        let x = solver.new_variable("x");

        solver
            .create_constraint(x.into(), constant(0.0), Relation::Equal, Priority::Strong, true)
            .unwrap();
        for _ in 0..50 {
            solver
                .create_constraint(term(x, 1000.0), constant(1.0e6), Relation::Equal, Priority::Weak, true)
                .unwrap();
        }

        assert_near(solver.value(x).unwrap(), 0.0);
    }

    #[test]
    fn test_disable_and_reenable() {
        let mut solver = Solver::new();
        let x = solver.new_variable("x");

        solver
            .create_constraint(x.into(), constant(5.0), Relation::Equal, Priority::Weak, true)
            .unwrap();
        let strong = solver
            .create_constraint(x.into(), constant(40.0), Relation::Equal, Priority::Strong, true)
            .unwrap();
        assert_near(solver.value(x).unwrap(), 40.0);

        solver.set_constraint_enabled(strong, false).unwrap();
        assert_near(solver.value(x).unwrap(), 5.0);
        assert!(!solver.constraint(strong).unwrap().is_active());

        solver.set_constraint_enabled(strong, true).unwrap();
        assert_near(solver.value(x).unwrap(), 40.0);
    }

    #[test]
    fn test_enable_twice_is_idempotent() {
        let mut solver = Solver::new();
        let x = solver.new_variable("x");
        let handle = solver
            .create_constraint(x.into(), constant(5.0), Relation::Equal, Priority::Required, false)
            .unwrap();

        solver.set_constraint_enabled(handle, true).unwrap();
        let once = solver.value(x).unwrap();
        let derivations = solver.derivations();

        solver.set_constraint_enabled(handle, true).unwrap();
        assert_eq!(solver.value(x).unwrap(), once);
        assert_eq!(solver.derivations(), derivations);
    }

    #[test]
    fn test_destroyed_handle_is_rejected() {
        let mut solver = Solver::new();
        let x = solver.new_variable("x");
        let handle = solver
            .create_constraint(x.into(), constant(5.0), Relation::Equal, Priority::Required, true)
            .unwrap();

        assert!(solver.destroy_constraint(handle).unwrap());
        assert!(!solver.destroy_constraint(handle).unwrap());
        assert_eq!(
            solver.set_constraint_priority(handle, Priority::Weak),
            Err(SolverError::StaleConstraint(handle))
        );
        assert_near(solver.value(x).unwrap(), 0.0);
    }

    #[test]
    fn test_foreign_variable_is_rejected() {
        let mut first = Solver::new();
        let mut second = Solver::new();
        let foreign = second.new_variable("foreign");

        let err = first
            .create_constraint(foreign.into(), constant(1.0), Relation::Equal, Priority::Required, true)
            .unwrap_err();
        assert_eq!(err, SolverError::ForeignVariable(foreign));
        assert!(err.is_invalid_handle());
    }

    #[test]
    fn test_non_finite_values_are_rejected() {
        let mut solver = Solver::new();
        let x = solver.new_variable("x");

        let err = solver
            .create_constraint(x.into(), constant(f64::NAN), Relation::Equal, Priority::Required, true)
            .unwrap_err();
        assert!(err.is_invalid_value());

        let err = solver
            .create_constraint(term(x, f64::INFINITY), constant(0.0), Relation::Equal, Priority::Weak, true)
            .unwrap_err();
        assert!(err.is_invalid_value());
        assert_eq!(solver.references(x), 0);
    }

    #[test]
    fn test_rejected_edit_restores_previous_definition() {
        let mut solver = Solver::new();
        let x = solver.new_variable("x");
        solver
            .create_constraint(x.into(), constant(10.0), Relation::Equal, Priority::Required, true)
            .unwrap();
        let weak = solver
            .create_constraint(x.into(), constant(20.0), Relation::Equal, Priority::Weak, true)
            .unwrap();

        let err = solver
            .set_constraint_priority(weak, Priority::Required)
            .unwrap_err();
        assert!(err.is_unsatisfiable());
        assert_eq!(solver.constraint(weak).unwrap().priority(), Priority::Weak);
        assert!(solver.constraint(weak).unwrap().is_active());
        assert_near(solver.value(x).unwrap(), 10.0);
    }

    #[test]
    fn test_set_rhs_moves_solution() {
        let mut solver = Solver::new();
        let x = solver.new_variable("x");
        let handle = solver
            .create_constraint(x.into(), constant(10.0), Relation::Equal, Priority::Required, true)
            .unwrap();

        solver.set_constraint_rhs(handle, constant(25.0)).unwrap();
        assert_near(solver.value(x).unwrap(), 25.0);

        solver.set_constraint_lhs(handle, term(x, 5.0)).unwrap();
        assert_near(solver.value(x).unwrap(), 5.0);
    }

    #[test]
    fn test_set_relation() {
        let mut solver = Solver::new();
        let x = solver.new_variable("x");
        solver
            .create_constraint(x.into(), constant(50.0), Relation::Equal, Priority::Weak, true)
            .unwrap();
        let bound = solver
            .create_constraint(x.into(), constant(30.0), Relation::Equal, Priority::Required, true)
            .unwrap();
        assert_near(solver.value(x).unwrap(), 30.0);

        solver.set_constraint_relation(bound, Relation::GreaterOrEqual).unwrap();
        assert_near(solver.value(x).unwrap(), 50.0);
        solver.set_constraint_relation(bound, Relation::LessOrEqual).unwrap();
        assert_near(solver.value(x).unwrap(), 30.0);
    }

    #[test]
    fn test_batch_publishes_once() {
        let mut solver = Solver::new();
        let x = solver.new_variable("x");
        let y = solver.new_variable("y");
        let before = solver.derivations();

        solver.begin_batch();
        solver
            .create_constraint(x.into(), constant(1.0), Relation::Equal, Priority::Required, true)
            .unwrap();
        solver
            .create_constraint(y.into(), x * 2.0, Relation::Equal, Priority::Required, true)
            .unwrap();
        assert_eq!(solver.derivations(), before);
        solver.end_batch().unwrap();

        assert_eq!(solver.derivations(), before + 1);
        assert_near(solver.value(y).unwrap(), 2.0);
    }

    #[test]
    fn test_rebuild_matches_incremental() {
        let mut solver = Solver::new();
        let left = solver.new_variable("left");
        let width = solver.new_variable("width");
        let right = solver.new_variable("right");

        let handles = [
            solver
                .create_constraint(left.into(), constant(20.0), Relation::Equal, Priority::Required, true)
                .unwrap(),
            solver
                .create_constraint(right.into(), left + width, Relation::Equal, Priority::Required, true)
                .unwrap(),
            solver
                .create_constraint(width.into(), constant(300.0), Relation::Equal, Priority::Medium, true)
                .unwrap(),
            solver
                .create_constraint(right.into(), constant(250.0), Relation::LessOrEqual, Priority::Required, true)
                .unwrap(),
        ];
        solver.set_constraint_enabled(handles[3], false).unwrap();
        solver.set_constraint_enabled(handles[3], true).unwrap();

        let incremental: Vec<f64> = [left, width, right]
            .iter()
            .map(|variable| solver.value(*variable).unwrap())
            .collect();
        solver.rebuild().unwrap();
        let rebuilt: Vec<f64> = [left, width, right]
            .iter()
            .map(|variable| solver.value(*variable).unwrap())
            .collect();

        for (a, b) in incremental.iter().zip(&rebuilt) {
            assert_near(*a, *b);
        }
        assert_near(rebuilt[2], 250.0);
        assert_near(rebuilt[1], 230.0);
    }

    #[test]
    fn test_reenabled_constraint_keeps_registration_tie() {
        let mut solver = Solver::new();
        let x = solver.new_variable("x");
        let first = solver
            .create_constraint(x.into(), constant(10.0), Relation::Equal, Priority::Medium, true)
            .unwrap();
        solver
            .create_constraint(x.into(), constant(30.0), Relation::Equal, Priority::Medium, true)
            .unwrap();

        solver.set_constraint_enabled(first, false).unwrap();
        assert_near(solver.value(x).unwrap(), 30.0);
        solver.set_constraint_enabled(first, true).unwrap();
        assert_near(solver.value(x).unwrap(), 10.0);

        solver.rebuild().unwrap();
        assert_near(solver.value(x).unwrap(), 10.0);
    }

    #[test]
    fn test_removal_falls_back_to_first_registered() {
        let mut solver = Solver::new();
        let x = solver.new_variable("x");
        solver
            .create_constraint(x.into(), constant(10.0), Relation::Equal, Priority::Medium, true)
            .unwrap();
        solver
            .create_constraint(x.into(), constant(30.0), Relation::Equal, Priority::Medium, true)
            .unwrap();
        let middle = solver
            .create_constraint(x.into(), constant(20.0), Relation::Equal, Priority::Medium, true)
            .unwrap();
        assert_near(solver.value(x).unwrap(), 20.0);

        solver.destroy_constraint(middle).unwrap();
        assert_near(solver.value(x).unwrap(), 10.0);
    }

    #[test]
    fn test_soft_priority_edits() {
        let mut solver = Solver::new();
        let x = solver.new_variable("x");
        let a = solver
            .create_constraint(x.into(), constant(10.0), Relation::Equal, Priority::Strong, true)
            .unwrap();
        solver
            .create_constraint(x.into(), constant(30.0), Relation::Equal, Priority::Medium, true)
            .unwrap();
        assert_near(solver.value(x).unwrap(), 10.0);

        let steps = [
            (Priority::Weak, 30.0),
            (Priority::Strong, 10.0),
            (Priority::Medium, 10.0),
            (Priority::Strong, 10.0),
            (Priority::Weak, 30.0),
        ];
        for (priority, expected) in steps {
            solver.set_constraint_priority(a, priority).unwrap();
            let constraint = solver.constraint(a).unwrap();
            assert_eq!(constraint.priority(), priority);
            assert!(constraint.is_enabled() && constraint.is_active());
            assert_near(solver.value(x).unwrap(), expected);

            solver.rebuild().unwrap();
            assert_near(solver.value(x).unwrap(), expected);
        }
    }

    #[test]
    fn test_rebuild_reports_rejected_constraint() {
        let mut solver = Solver::new();
        let x = solver.new_variable("x");
        let kept = solver
            .create_constraint(x.into(), constant(10.0), Relation::Equal, Priority::Required, true)
            .unwrap();
        let conflicting = solver
            .create_constraint(x.into(), constant(20.0), Relation::Equal, Priority::Required, false)
            .unwrap();
        // Enabled behind the solver's back, as if the set had drifted
        solver.constraints.get_mut(conflicting.index()).unwrap().enabled = true;

        let err = solver.rebuild().unwrap_err();
        assert!(err.is_unsatisfiable());
        assert_near(solver.value(x).unwrap(), 10.0);
        assert!(solver.constraint(kept).unwrap().is_active());

        let rejected = solver.constraint(conflicting).unwrap();
        assert!(rejected.is_enabled());
        assert!(!rejected.is_active());
    }

    #[test]
    fn test_remove_variable_in_use() {
        let mut solver = Solver::new();
        let x = solver.new_variable("x");
        let handle = solver
            .create_constraint(x.into(), constant(3.0), Relation::Equal, Priority::Required, false)
            .unwrap();

        assert_eq!(
            solver.remove_variable(x),
            Err(SolverError::VariableInUse {
                variable: x,
                constraints: 1
            })
        );
        solver.destroy_constraint(handle).unwrap();
        assert_eq!(solver.remove_variable(x), Ok(true));
        assert_eq!(solver.remove_variable(x), Ok(false));
        assert_eq!(solver.value(x), Err(SolverError::StaleVariable(x)));
    }
}
