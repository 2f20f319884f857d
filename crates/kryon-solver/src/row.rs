// crates/kryon-solver/src/row.rs
use crate::near_zero;
use crate::strength::Weight;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) enum SymbolKind {
    External,
    Slack,
    Error,
    Dummy,
}

/// Tableau column. Ordered by id so every scan over rows and cells is
/// deterministic, which also gives Bland's anti-cycling rule for free.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct Symbol {
    id: u32,
    kind: SymbolKind,
}

impl Symbol {
    pub fn new(id: u32, kind: SymbolKind) -> Self {
        Self { id, kind }
    }

    pub fn kind(&self) -> SymbolKind {
        self.kind
    }

    pub fn is_external(&self) -> bool {
        self.kind == SymbolKind::External
    }

    pub fn is_dummy(&self) -> bool {
        self.kind == SymbolKind::Dummy
    }

    /// Slack and error symbols are restricted to non-negative values and may be pivoted
    pub fn is_pivotable(&self) -> bool {
        matches!(self.kind, SymbolKind::Slack | SymbolKind::Error)
    }
}

/// `basic = constant + Σ coefficient·symbol`
#[derive(Debug, Clone, Default)]
pub(crate) struct Row {
    pub constant: f64,
    pub cells: BTreeMap<Symbol, f64>,
}

impl Row {
    pub fn new(constant: f64) -> Self {
        Self {
            constant,
            cells: BTreeMap::new(),
        }
    }

    pub fn insert_symbol(&mut self, symbol: Symbol, coefficient: f64) {
        let entry = self.cells.entry(symbol).or_insert(0.0);
        *entry += coefficient;
        if near_zero(*entry) {
            self.cells.remove(&symbol);
        }
    }

    pub fn insert_row(&mut self, other: &Row, coefficient: f64) {
        self.constant += other.constant * coefficient;
        for (&symbol, &value) in &other.cells {
            self.insert_symbol(symbol, value * coefficient);
        }
    }

    pub fn remove(&mut self, symbol: Symbol) {
        self.cells.remove(&symbol);
    }

    pub fn reverse_sign(&mut self) {
        self.constant = -self.constant;
        for value in self.cells.values_mut() {
            *value = -*value;
        }
    }

    /// Rewrites `0 = constant + Σ` so that `symbol` becomes the basic variable
    pub fn solve_for(&mut self, symbol: Symbol) {
        let Some(coefficient) = self.cells.remove(&symbol) else {
            return;
        };
        let factor = -1.0 / coefficient;
        self.constant *= factor;
        for value in self.cells.values_mut() {
            *value *= factor;
        }
    }

    /// Swaps the basic variable `lhs` out for `rhs`
    pub fn solve_for_pair(&mut self, lhs: Symbol, rhs: Symbol) {
        self.insert_symbol(lhs, -1.0);
        self.solve_for(rhs);
    }

    pub fn coefficient_for(&self, symbol: Symbol) -> f64 {
        self.cells.get(&symbol).copied().unwrap_or(0.0)
    }

    pub fn substitute(&mut self, symbol: Symbol, row: &Row) {
        if let Some(coefficient) = self.cells.remove(&symbol) {
            self.insert_row(row, coefficient);
        }
    }

    pub fn all_dummies(&self) -> bool {
        self.cells.keys().all(Symbol::is_dummy)
    }

    pub fn any_pivotable_symbol(&self) -> Option<Symbol> {
        self.cells.keys().copied().find(Symbol::is_pivotable)
    }
}

/// Row whose coefficients are tiered weights; the quantity being minimized
#[derive(Debug, Clone, Default)]
pub(crate) struct Objective {
    pub constant: Weight,
    pub cells: BTreeMap<Symbol, Weight>,
}

impl Objective {
    pub fn from_row(row: &Row, weight: Weight) -> Self {
        let mut objective = Objective::default();
        objective.insert_row(row, weight);
        objective
    }

    pub fn insert_symbol(&mut self, symbol: Symbol, weight: Weight) {
        let entry = self.cells.entry(symbol).or_insert(Weight::ZERO);
        *entry = *entry + weight;
        if entry.is_near_zero() {
            self.cells.remove(&symbol);
        }
    }

    pub fn insert_row(&mut self, row: &Row, weight: Weight) {
        self.constant = self.constant + weight * row.constant;
        for (&symbol, &value) in &row.cells {
            self.insert_symbol(symbol, weight * value);
        }
    }

    pub fn remove(&mut self, symbol: Symbol) {
        self.cells.remove(&symbol);
    }

    pub fn substitute(&mut self, symbol: Symbol, row: &Row) {
        if let Some(weight) = self.cells.remove(&symbol) {
            self.insert_row(row, weight);
        }
    }

    /// Lowest-ordered symbol whose coefficient can still reduce the objective
    pub fn entering_symbol(&self) -> Option<Symbol> {
        self.cells
            .iter()
            .find(|(symbol, weight)| !symbol.is_dummy() && weight.is_negative())
            .map(|(symbol, _)| *symbol)
    }
}
