// crates/kryon-solver/src/strength.rs
use crate::EPSILON;
use serde::Deserialize;
use std::fmt;
use std::ops::{Add, Mul, Neg, Sub};

/// Strength tier of a constraint.
///
/// `Required` constraints must hold exactly. The other tiers are satisfied as
/// well as possible, strictly in order: no amount of `Weak` error can buy a
/// reduction of `Medium` error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Weak,
    Medium,
    Strong,
    Required,
}

impl Priority {
    pub fn is_required(self) -> bool {
        self == Priority::Required
    }

    pub(crate) fn weight(self) -> Weight {
        match self {
            Priority::Required => Weight::ZERO,
            Priority::Strong => Weight::tier(1),
            Priority::Medium => Weight::tier(2),
            Priority::Weak => Weight::tier(3),
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Priority::Weak => "weak",
            Priority::Medium => "medium",
            Priority::Strong => "strong",
            Priority::Required => "required",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Relation {
    #[serde(alias = "==")]
    Equal,
    #[serde(alias = "<=")]
    LessOrEqual,
    #[serde(alias = ">=")]
    GreaterOrEqual,
}

impl Relation {
    /// Whether `lhs (relation) rhs` holds within `tolerance`
    pub fn holds(self, lhs: f64, rhs: f64, tolerance: f64) -> bool {
        match self {
            Relation::Equal => (lhs - rhs).abs() <= tolerance,
            Relation::LessOrEqual => lhs <= rhs + tolerance,
            Relation::GreaterOrEqual => lhs + tolerance >= rhs,
        }
    }
}

impl Default for Relation {
    fn default() -> Self {
        Relation::Equal
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            Relation::Equal => "==",
            Relation::LessOrEqual => "<=",
            Relation::GreaterOrEqual => ">=",
        };
        f.write_str(symbol)
    }
}

const TIERS: usize = 4;

/// Objective coefficient with one component per tier, compared lexicographically.
///
/// Component 0 is reserved for the artificial objective used while adding a
/// required row that has no usable subject.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub(crate) struct Weight([f64; TIERS]);

impl Weight {
    pub const ZERO: Weight = Weight([0.0; TIERS]);
    pub const ARTIFICIAL: Weight = Weight([1.0, 0.0, 0.0, 0.0]);

    fn tier(tier: usize) -> Weight {
        let mut components = [0.0; TIERS];
        components[tier] = 1.0;
        Weight(components)
    }

    pub fn is_near_zero(&self) -> bool {
        self.0.iter().all(|component| component.abs() < EPSILON)
    }

    /// Sign of the most significant non-negligible component
    pub fn is_negative(&self) -> bool {
        self.0
            .iter()
            .find(|component| component.abs() >= EPSILON)
            .is_some_and(|component| *component < 0.0)
    }
}

impl Add for Weight {
    type Output = Weight;

    fn add(self, rhs: Weight) -> Weight {
        let mut components = self.0;
        for (component, other) in components.iter_mut().zip(rhs.0) {
            *component += other;
        }
        Weight(components)
    }
}

impl Sub for Weight {
    type Output = Weight;

    fn sub(self, rhs: Weight) -> Weight {
        self + -rhs
    }
}

impl Neg for Weight {
    type Output = Weight;

    fn neg(self) -> Weight {
        self * -1.0
    }
}

impl Mul<f64> for Weight {
    type Output = Weight;

    fn mul(self, factor: f64) -> Weight {
        Weight(self.0.map(|component| component * factor))
    }
}
