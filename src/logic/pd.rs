//! Discrete probability distributions and evaluation to them.
//!
//! The probability algebra treats subexpressions as independent: sums and
//! products enumerate value pairs, comparisons accumulate pointwise, and a
//! guarded-effect list mixes the effect distributions weighted by the
//! probability that the guard is the first to fire.

use std::collections::BTreeMap;

use crate::math;
use crate::task::{ActionState, State};

use super::{Expr, Expression, Val};

/// A finite distribution over scalars, values sorted ascending.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiscretePd {
    pub values: Vec<f64>,
    pub probabilities: Vec<f64>,
}

impl DiscretePd {
    /// The distribution that yields `value` with certainty.
    pub fn dirac(value: f64) -> Self {
        Self {
            values: vec![value],
            probabilities: vec![1.0],
        }
    }

    /// A truth-value distribution with the given truth probability.
    /// Probabilities outside [0, 1] are treated as certainty.
    pub fn bernoulli(truth_probability: f64) -> Self {
        if math::leq(truth_probability, 0.0) {
            Self::dirac(0.0)
        } else if math::geq(truth_probability, 1.0) {
            Self::dirac(1.0)
        } else {
            Self {
                values: vec![0.0, 1.0],
                probabilities: vec![1.0 - truth_probability, truth_probability],
            }
        }
    }

    fn from_pairs(pairs: BTreeMap<Val, f64>) -> Self {
        let mut values = Vec::with_capacity(pairs.len());
        let mut probabilities = Vec::with_capacity(pairs.len());
        for (value, probability) in pairs {
            if math::eq(probability, 0.0) {
                continue;
            }
            values.push(value.0);
            probabilities.push(probability);
        }
        Self {
            values,
            probabilities,
        }
    }

    pub fn size(&self) -> usize {
        self.values.len()
    }

    pub fn is_deterministic(&self) -> bool {
        self.values.len() == 1
    }

    pub fn is_truth(&self) -> bool {
        self.is_deterministic() && math::is_true(self.values[0])
    }

    pub fn is_falsity(&self) -> bool {
        self.is_deterministic() && math::eq(self.values[0], 0.0)
    }

    /// Probability that the value is nonzero.
    pub fn truth_probability(&self) -> f64 {
        self.values
            .iter()
            .zip(&self.probabilities)
            .filter(|(value, _)| math::is_true(**value))
            .map(|(_, probability)| probability)
            .sum()
    }

    pub fn falsity_probability(&self) -> f64 {
        self.probability_of(0.0)
    }

    pub fn probability_of(&self, value: f64) -> f64 {
        self.values
            .iter()
            .zip(&self.probabilities)
            .filter(|(v, _)| math::eq(**v, value))
            .map(|(_, probability)| probability)
            .sum()
    }

    /// Nonempty, all probabilities positive, summing to one.
    pub fn is_well_defined(&self) -> bool {
        if self.values.is_empty() || self.values.len() != self.probabilities.len() {
            return false;
        }
        let sum: f64 = self.probabilities.iter().sum();
        self.probabilities.iter().all(|&p| math::gt(p, 0.0)) && math::eq(sum, 1.0)
    }

    fn combine(&self, other: &DiscretePd, op: impl Fn(f64, f64) -> f64) -> DiscretePd {
        let mut pairs: BTreeMap<Val, f64> = BTreeMap::new();
        for (lhs_value, lhs_probability) in self.values.iter().zip(&self.probabilities) {
            for (rhs_value, rhs_probability) in other.values.iter().zip(&other.probabilities) {
                *pairs.entry(Val(op(*lhs_value, *rhs_value))).or_insert(0.0) +=
                    lhs_probability * rhs_probability;
            }
        }
        DiscretePd::from_pairs(pairs)
    }

    fn comparison_probability(&self, other: &DiscretePd, decide: fn(f64, f64) -> bool) -> f64 {
        let mut probability = 0.0;
        for (lhs_value, lhs_probability) in self.values.iter().zip(&self.probabilities) {
            for (rhs_value, rhs_probability) in other.values.iter().zip(&other.probabilities) {
                if decide(*lhs_value, *rhs_value) {
                    probability += lhs_probability * rhs_probability;
                }
            }
        }
        probability
    }
}

pub fn evaluate_to_pd(expr: &Expr, state: &State, action: &ActionState) -> DiscretePd {
    match &**expr {
        Expression::Constant(value) => DiscretePd::dirac(*value),
        Expression::StateFluent(index) => DiscretePd::dirac(state[*index]),
        Expression::ActionFluent(index) => DiscretePd::dirac(action[*index] as f64),

        Expression::Conjunction(exprs) => {
            let mut truth_probability = 1.0;
            for expr in exprs {
                let result = evaluate_to_pd(expr, state, action);
                debug_assert!(result.is_well_defined());
                if result.is_falsity() {
                    return DiscretePd::dirac(0.0);
                }
                truth_probability *= result.truth_probability();
            }
            DiscretePd::bernoulli(truth_probability)
        }
        Expression::Disjunction(exprs) => {
            let mut falsity_probability = 1.0;
            for expr in exprs {
                let result = evaluate_to_pd(expr, state, action);
                debug_assert!(result.is_well_defined());
                if result.is_truth() {
                    return DiscretePd::dirac(1.0);
                }
                falsity_probability *= result.falsity_probability();
            }
            DiscretePd::bernoulli(1.0 - falsity_probability)
        }

        Expression::Equals(exprs) => {
            debug_assert_eq!(exprs.len(), 2);
            let lhs = evaluate_to_pd(&exprs[0], state, action);
            let rhs = evaluate_to_pd(&exprs[1], state, action);
            // The probability that both sides take the same value, not a
            // comparison of the distributions themselves.
            let mut probability = 0.0;
            for (value, value_probability) in lhs.values.iter().zip(&lhs.probabilities) {
                probability += value_probability * rhs.probability_of(*value);
            }
            DiscretePd::bernoulli(probability)
        }
        Expression::Greater(exprs) => pointwise_comparison(exprs, state, action, math::gt),
        Expression::Lower(exprs) => pointwise_comparison(exprs, state, action, math::lt),
        Expression::GreaterEqual(exprs) => pointwise_comparison(exprs, state, action, math::geq),
        Expression::LowerEqual(exprs) => pointwise_comparison(exprs, state, action, math::leq),

        Expression::Addition(exprs) => accumulate(exprs, state, action, |a, b| a + b),
        Expression::Subtraction(exprs) => accumulate(exprs, state, action, |a, b| a - b),
        Expression::Multiplication(exprs) => accumulate(exprs, state, action, |a, b| a * b),
        Expression::Division(exprs) => accumulate(exprs, state, action, |a, b| a / b),

        Expression::Negation(inner) => {
            let result = evaluate_to_pd(inner, state, action);
            DiscretePd::bernoulli(result.falsity_probability())
        }
        Expression::Exponential(inner) => {
            let mut result = evaluate_to_pd(inner, state, action);
            for value in &mut result.values {
                *value = value.exp();
            }
            result
        }

        Expression::Bernoulli(probability) => {
            let probability = evaluate_to_pd(probability, state, action);
            debug_assert!(probability.is_deterministic());
            DiscretePd::bernoulli(probability.values[0])
        }
        Expression::Discrete {
            values,
            probabilities,
        } => {
            let mut pairs: BTreeMap<Val, f64> = BTreeMap::new();
            for (value, probability) in values.iter().zip(probabilities) {
                let value = evaluate_to_pd(value, state, action);
                let probability = evaluate_to_pd(probability, state, action);
                debug_assert!(value.is_deterministic());
                debug_assert!(probability.is_deterministic());
                if math::gt(probability.values[0], 0.0) {
                    *pairs.entry(Val(value.values[0])).or_insert(0.0) += probability.values[0];
                }
            }
            let result = DiscretePd::from_pairs(pairs);
            debug_assert!(result.is_well_defined());
            result
        }

        Expression::IfThenElse {
            condition,
            if_true,
            if_false,
        } => {
            let conditions = [Expr::clone(condition), Expression::truth()];
            let effects = [Expr::clone(if_true), Expr::clone(if_false)];
            mixture(&conditions, &effects, state, action)
        }
        Expression::MultiCondition {
            conditions,
            effects,
        } => mixture(conditions, effects, state, action),

        Expression::Parameter(_)
        | Expression::Object(_)
        | Expression::Variable { .. }
        | Expression::Quantifier { .. } => {
            unreachable!("evaluate_to_pd applied to a schematic formula")
        }
    }
}

fn pointwise_comparison(
    exprs: &[Expr],
    state: &State,
    action: &ActionState,
    decide: fn(f64, f64) -> bool,
) -> DiscretePd {
    debug_assert_eq!(exprs.len(), 2);
    let lhs = evaluate_to_pd(&exprs[0], state, action);
    let rhs = evaluate_to_pd(&exprs[1], state, action);
    DiscretePd::bernoulli(lhs.comparison_probability(&rhs, decide))
}

fn accumulate(
    exprs: &[Expr],
    state: &State,
    action: &ActionState,
    op: fn(f64, f64) -> f64,
) -> DiscretePd {
    let mut result = evaluate_to_pd(&exprs[0], state, action);
    for expr in &exprs[1..] {
        let rhs = evaluate_to_pd(expr, state, action);
        result = result.combine(&rhs, op);
    }
    debug_assert!(result.is_well_defined());
    result
}

/// Weighted mixture over the prefix of guards: each effect contributes with
/// the probability that its guard fires and no earlier guard did.
fn mixture(conditions: &[Expr], effects: &[Expr], state: &State, action: &ActionState) -> DiscretePd {
    let mut pairs: BTreeMap<Val, f64> = BTreeMap::new();
    let mut remaining_probability = 1.0;
    for (condition, effect) in conditions.iter().zip(effects) {
        let guard = evaluate_to_pd(condition, state, action);
        debug_assert!(guard.is_well_defined());
        if !guard.is_falsity() {
            let result = evaluate_to_pd(effect, state, action);
            debug_assert!(result.is_well_defined());
            let weight = guard.truth_probability() * remaining_probability;
            for (value, probability) in result.values.iter().zip(&result.probabilities) {
                *pairs.entry(Val(*value)).or_insert(0.0) += weight * probability;
            }
        }
        remaining_probability *= guard.falsity_probability();
        if math::eq(remaining_probability, 0.0) {
            break;
        }
    }
    let result = DiscretePd::from_pairs(pairs);
    debug_assert!(result.is_well_defined());
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bernoulli_clamps_to_certainty() {
        assert!(DiscretePd::bernoulli(1.5).is_truth());
        assert!(DiscretePd::bernoulli(-0.5).is_falsity());
        let pd = DiscretePd::bernoulli(0.3);
        assert!(pd.is_well_defined());
        assert!(math::eq(pd.truth_probability(), 0.3));
    }

    #[test]
    fn sum_of_independent_bernoullis() {
        let state = State::new(0);
        let action = ActionState::new(0);
        let formula = Expr::new(Expression::Addition(vec![
            Expr::new(Expression::Bernoulli(Expression::constant(0.5))),
            Expr::new(Expression::Bernoulli(Expression::constant(0.5))),
        ]));
        let pd = evaluate_to_pd(&formula, &state, &action);
        assert_eq!(pd.values, vec![0.0, 1.0, 2.0]);
        assert!(math::eq(pd.probabilities[0], 0.25));
        assert!(math::eq(pd.probabilities[1], 0.5));
        assert!(math::eq(pd.probabilities[2], 0.25));
    }

    #[test]
    fn guarded_effects_mix_over_guard_prefix() {
        let state = State::new(0);
        let action = ActionState::new(0);
        let formula = Expr::new(Expression::MultiCondition {
            conditions: vec![
                Expr::new(Expression::Bernoulli(Expression::constant(0.5))),
                Expression::truth(),
            ],
            effects: vec![Expression::constant(2.0), Expression::constant(3.0)],
        });
        let pd = evaluate_to_pd(&formula, &state, &action);
        assert_eq!(pd.values, vec![2.0, 3.0]);
        assert!(math::eq(pd.probabilities[0], 0.5));
        assert!(math::eq(pd.probabilities[1], 0.5));
    }
}
