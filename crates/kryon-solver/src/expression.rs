//! Affine expressions over layout variables
//!
//! An [`Expression`] is `constant + Σ coefficient·variable`. Expressions are
//! immutable values: the combinators below and the arithmetic operators all
//! return fresh expressions, and adding a variable that is already present
//! folds into its existing coefficient instead of appending a duplicate term.
//!
//! ```
//! # use kryon_solver::{expression, Solver};
//! let mut solver = Solver::new();
//! let x = solver.new_variable("x");
//! let width = solver.new_variable("width");
//!
//! // right edge: x + 1.0 * width
//! let right = expression::add(&x.into(), &expression::term(width, 1.0));
//! assert_eq!(right.terms().len(), 2);
//! assert_eq!(right, x + width);
//! ```

use crate::{near_zero, Variable};
use std::fmt;
use std::ops::{Add, Mul, Neg, Sub};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Term {
    pub variable: Variable,
    pub coefficient: f64,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Expression {
    constant: f64,
    terms: Vec<Term>,
}

/// Expression with no variables
pub fn constant(value: f64) -> Expression {
    Expression {
        constant: value,
        terms: Vec::new(),
    }
}

/// `coefficient · variable`
pub fn term(variable: Variable, coefficient: f64) -> Expression {
    let mut expression = constant(0.0);
    expression.accumulate(variable, coefficient);
    expression
}

pub fn add(lhs: &Expression, rhs: &Expression) -> Expression {
    let mut sum = lhs.clone();
    sum.constant += rhs.constant;
    for term in &rhs.terms {
        sum.accumulate(term.variable, term.coefficient);
    }
    sum
}

pub fn subtract(lhs: &Expression, rhs: &Expression) -> Expression {
    add(lhs, &scale(rhs, -1.0))
}

pub fn scale(expression: &Expression, factor: f64) -> Expression {
    let mut scaled = constant(expression.constant * factor);
    for term in &expression.terms {
        scaled.accumulate(term.variable, term.coefficient * factor);
    }
    scaled
}

impl Expression {
    /// Builds `constant + Σ terms`, folding repeated variables
    pub fn new(constant_value: f64, terms: impl IntoIterator<Item = (Variable, f64)>) -> Self {
        let mut expression = constant(constant_value);
        for (variable, coefficient) in terms {
            expression.accumulate(variable, coefficient);
        }
        expression
    }

    pub fn constant(&self) -> f64 {
        self.constant
    }

    pub fn terms(&self) -> &[Term] {
        &self.terms
    }

    pub fn coefficient(&self, variable: Variable) -> f64 {
        self.terms
            .iter()
            .find(|term| term.variable == variable)
            .map_or(0.0, |term| term.coefficient)
    }

    pub fn variables(&self) -> impl Iterator<Item = Variable> + '_ {
        self.terms.iter().map(|term| term.variable)
    }

    pub fn references(&self, variable: Variable) -> bool {
        self.terms.iter().any(|term| term.variable == variable)
    }

    /// First non-finite number in the expression, if any
    pub fn non_finite_value(&self) -> Option<f64> {
        std::iter::once(self.constant)
            .chain(self.terms.iter().map(|term| term.coefficient))
            .find(|value| !value.is_finite())
    }

    pub fn evaluate(&self, mut value_of: impl FnMut(Variable) -> f64) -> f64 {
        self.terms
            .iter()
            .fold(self.constant, |sum, term| sum + term.coefficient * value_of(term.variable))
    }

    fn accumulate(&mut self, variable: Variable, coefficient: f64) {
        match self.terms.iter().position(|term| term.variable == variable) {
            Some(position) => {
                let folded = self.terms[position].coefficient + coefficient;
                if near_zero(folded) {
                    self.terms.remove(position);
                } else {
                    self.terms[position].coefficient = folded;
                }
            }
            None if near_zero(coefficient) => {}
            None => self.terms.push(Term {
                variable,
                coefficient,
            }),
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, term) in self.terms.iter().enumerate() {
            if i > 0 {
                f.write_str(" + ")?;
            }
            write!(f, "{} * {}", term.coefficient, term.variable)?;
        }
        if self.terms.is_empty() {
            write!(f, "{}", self.constant)
        } else if self.constant != 0.0 {
            write!(f, " + {}", self.constant)
        } else {
            Ok(())
        }
    }
}

impl From<f64> for Expression {
    fn from(value: f64) -> Self {
        constant(value)
    }
}

impl From<Variable> for Expression {
    fn from(variable: Variable) -> Self {
        term(variable, 1.0)
    }
}

impl Add<Expression> for Expression {
    type Output = Expression;

    fn add(self, rhs: Expression) -> Expression {
        add(&self, &rhs)
    }
}

impl Add<Variable> for Expression {
    type Output = Expression;

    fn add(self, rhs: Variable) -> Expression {
        add(&self, &rhs.into())
    }
}

impl Add<f64> for Expression {
    type Output = Expression;

    fn add(self, rhs: f64) -> Expression {
        add(&self, &constant(rhs))
    }
}

impl Sub<Expression> for Expression {
    type Output = Expression;

    fn sub(self, rhs: Expression) -> Expression {
        subtract(&self, &rhs)
    }
}

impl Sub<Variable> for Expression {
    type Output = Expression;

    fn sub(self, rhs: Variable) -> Expression {
        subtract(&self, &rhs.into())
    }
}

impl Sub<f64> for Expression {
    type Output = Expression;

    fn sub(self, rhs: f64) -> Expression {
        subtract(&self, &constant(rhs))
    }
}

impl Mul<f64> for Expression {
    type Output = Expression;

    fn mul(self, rhs: f64) -> Expression {
        scale(&self, rhs)
    }
}

impl Mul<Expression> for f64 {
    type Output = Expression;

    fn mul(self, rhs: Expression) -> Expression {
        scale(&rhs, self)
    }
}

impl Neg for Expression {
    type Output = Expression;

    fn neg(self) -> Expression {
        scale(&self, -1.0)
    }
}

impl Add<Variable> for Variable {
    type Output = Expression;

    fn add(self, rhs: Variable) -> Expression {
        Expression::from(self) + rhs
    }
}

impl Add<Expression> for Variable {
    type Output = Expression;

    fn add(self, rhs: Expression) -> Expression {
        Expression::from(self) + rhs
    }
}

impl Add<f64> for Variable {
    type Output = Expression;

    fn add(self, rhs: f64) -> Expression {
        Expression::from(self) + rhs
    }
}

impl Sub<Variable> for Variable {
    type Output = Expression;

    fn sub(self, rhs: Variable) -> Expression {
        Expression::from(self) - rhs
    }
}

impl Sub<Expression> for Variable {
    type Output = Expression;

    fn sub(self, rhs: Expression) -> Expression {
        Expression::from(self) - rhs
    }
}

impl Sub<f64> for Variable {
    type Output = Expression;

    fn sub(self, rhs: f64) -> Expression {
        Expression::from(self) - rhs
    }
}

impl Mul<f64> for Variable {
    type Output = Expression;

    fn mul(self, rhs: f64) -> Expression {
        term(self, rhs)
    }
}

impl Mul<Variable> for f64 {
    type Output = Expression;

    fn mul(self, rhs: Variable) -> Expression {
        term(rhs, self)
    }
}

impl Neg for Variable {
    type Output = Expression;

    fn neg(self) -> Expression {
        term(self, -1.0)
    }
}
