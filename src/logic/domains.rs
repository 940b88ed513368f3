//! Reachable-value overapproximation.
//!
//! `calculate_domain` computes a superset of the values an expression can
//! produce, given candidate value sets for every state variable and a
//! concrete action. Arithmetic enumerates value pairs Minkowski-style,
//! comparisons yield both truth values when both outcomes are possible, and
//! probabilistic constructs follow their most-likely determinization.

use log::warn;

use crate::math;
use crate::task::ActionState;

use super::{Expr, Expression, ValueSet};

pub fn calculate_domain(expr: &Expr, domains: &[ValueSet], action: &ActionState) -> ValueSet {
    match &**expr {
        Expression::Constant(value) => ValueSet::singleton(*value),
        Expression::StateFluent(index) => domains[*index].clone(),
        Expression::ActionFluent(index) => ValueSet::singleton(action[*index] as f64),

        Expression::Conjunction(exprs) => {
            // Truth values are multiplied, so an impossible child zeroes the
            // whole conjunction.
            let mut result = ValueSet::singleton(1.0);
            for expr in exprs {
                let child = calculate_domain(expr, domains, action);
                let mut next = ValueSet::new();
                for lhs in result.iter() {
                    for rhs in child.iter() {
                        next.insert(lhs * rhs);
                    }
                }
                result = next;
            }
            result
        }
        Expression::Disjunction(exprs) => {
            let mut falsity = ValueSet::singleton(1.0);
            for expr in exprs {
                let child = calculate_domain(expr, domains, action);
                let mut next = ValueSet::new();
                for lhs in falsity.iter() {
                    for rhs in child.iter() {
                        next.insert(lhs * (1.0 - rhs));
                    }
                }
                falsity = next;
            }
            falsity.iter().map(|value| 1.0 - value).collect()
        }

        Expression::Equals(exprs) => {
            debug_assert_eq!(exprs.len(), 2);
            let lhs = calculate_domain(&exprs[0], domains, action);
            let rhs = calculate_domain(&exprs[1], domains, action);
            if lhs.len() == 1 && rhs.len() == 1 {
                return ValueSet::singleton(math::eq(lhs.min(), rhs.min()) as u8 as f64);
            }
            let mut result = ValueSet::singleton(0.0);
            if lhs.iter().any(|value| rhs.contains(value)) {
                result.insert(1.0);
            }
            result
        }
        Expression::Greater(exprs) => comparison_domain(exprs, domains, action, math::gt),
        Expression::Lower(exprs) => comparison_domain(exprs, domains, action, math::lt),
        Expression::GreaterEqual(exprs) => comparison_domain(exprs, domains, action, math::geq),
        Expression::LowerEqual(exprs) => comparison_domain(exprs, domains, action, math::leq),

        Expression::Addition(exprs) => minkowski(exprs, domains, action, |a, b| Some(a + b)),
        Expression::Subtraction(exprs) => minkowski(exprs, domains, action, |a, b| Some(a - b)),
        Expression::Multiplication(exprs) => {
            minkowski(exprs, domains, action, |a, b| Some(a * b))
        }
        Expression::Division(exprs) => {
            let divisor = calculate_domain(&exprs[1], domains, action);
            if divisor.contains(0.0) {
                warn!("division with a divisor range containing 0");
            }
            minkowski(exprs, domains, action, |a, b| {
                if math::eq(b, 0.0) {
                    None
                } else {
                    Some(a / b)
                }
            })
        }

        Expression::Negation(inner) => {
            let child = calculate_domain(inner, domains, action);
            let mut result = ValueSet::new();
            if child.iter().any(math::is_true) {
                result.insert(0.0);
            }
            if child.contains(0.0) {
                result.insert(1.0);
            }
            result
        }
        Expression::Exponential(inner) => calculate_domain(inner, domains, action)
            .iter()
            .map(f64::exp)
            .collect(),

        // The probabilistic constructs follow their determinization.
        Expression::Bernoulli(probability) => {
            let probability = calculate_domain(probability, domains, action);
            let mut result = ValueSet::new();
            if math::leq(0.5, probability.max()) {
                result.insert(1.0);
            }
            if !math::leq(0.5, probability.min()) {
                result.insert(0.0);
            }
            result
        }
        Expression::Discrete {
            values,
            probabilities,
        } => {
            let probability_domains: Vec<ValueSet> = probabilities
                .iter()
                .map(|probability| calculate_domain(probability, domains, action))
                .collect();
            let mut result = ValueSet::new();
            for (index, value) in values.iter().enumerate() {
                // The branch can be chosen if its probability can be
                // pointwise maximal.
                let can_be_maximal = probability_domains
                    .iter()
                    .enumerate()
                    .filter(|(other, _)| *other != index)
                    .all(|(_, other)| {
                        math::geq(probability_domains[index].max(), other.min())
                    });
                if can_be_maximal {
                    result.extend_from(&calculate_domain(value, domains, action));
                }
            }
            result
        }

        Expression::IfThenElse {
            condition,
            if_true,
            if_false,
        } => {
            let guard = calculate_domain(condition, domains, action);
            debug_assert!(!guard.is_empty());
            if guard.len() == 1 && math::eq(guard.min(), 0.0) {
                calculate_domain(if_false, domains, action)
            } else if guard.len() == 1 {
                calculate_domain(if_true, domains, action)
            } else {
                let mut result = calculate_domain(if_true, domains, action);
                result.extend_from(&calculate_domain(if_false, domains, action));
                result
            }
        }
        Expression::MultiCondition {
            conditions,
            effects,
        } => {
            let mut result = ValueSet::new();
            for (condition, effect) in conditions.iter().zip(effects) {
                let guard = calculate_domain(condition, domains, action);
                debug_assert!(!guard.is_empty());
                if guard.len() > 1 || !math::eq(guard.min(), 0.0) {
                    result.extend_from(&calculate_domain(effect, domains, action));
                }
            }
            result
        }

        Expression::Parameter(_)
        | Expression::Object(_)
        | Expression::Variable { .. }
        | Expression::Quantifier { .. } => {
            unreachable!("calculate_domain applied to a schematic formula")
        }
    }
}

fn comparison_domain(
    exprs: &[Expr],
    domains: &[ValueSet],
    action: &ActionState,
    decide: fn(f64, f64) -> bool,
) -> ValueSet {
    debug_assert_eq!(exprs.len(), 2);
    let lhs = calculate_domain(&exprs[0], domains, action);
    let rhs = calculate_domain(&exprs[1], domains, action);
    let mut result = ValueSet::new();
    if decide(lhs.max(), rhs.min()) || decide(lhs.min(), rhs.max()) {
        result.insert(1.0);
    }
    if !decide(lhs.min(), rhs.max()) || !decide(lhs.max(), rhs.min()) {
        result.insert(0.0);
    }
    result
}

fn minkowski(
    exprs: &[Expr],
    domains: &[ValueSet],
    action: &ActionState,
    op: fn(f64, f64) -> Option<f64>,
) -> ValueSet {
    let mut result = calculate_domain(&exprs[0], domains, action);
    for expr in &exprs[1..] {
        let rhs = calculate_domain(expr, domains, action);
        let mut next = ValueSet::new();
        for lhs_value in result.iter() {
            for rhs_value in rhs.iter() {
                if let Some(value) = op(lhs_value, rhs_value) {
                    next.insert(value);
                }
            }
        }
        result = next;
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn boolean_domains(n: usize) -> Vec<ValueSet> {
        vec![ValueSet::both_truth_values(); n]
    }

    #[test]
    fn state_fluent_takes_its_candidate_domain() {
        let domains = vec![vec![0.0, 1.0, 2.0].into_iter().collect::<ValueSet>()];
        let action = ActionState::new(0);
        let expr = Expression::state_fluent(0);
        assert_eq!(calculate_domain(&expr, &domains, &action), domains[0]);
    }

    #[test]
    fn negation_of_uncertain_fluent_is_uncertain() {
        let domains = boolean_domains(1);
        let action = ActionState::new(0);
        let expr = Expr::new(Expression::Negation(Expression::state_fluent(0)));
        assert_eq!(
            calculate_domain(&expr, &domains, &action),
            ValueSet::both_truth_values()
        );
    }

    #[test]
    fn bernoulli_follows_its_determinization() {
        let action = ActionState::new(0);
        let likely = Expr::new(Expression::Bernoulli(Expression::constant(0.7)));
        assert_eq!(
            calculate_domain(&likely, &[], &action),
            ValueSet::singleton(1.0)
        );
        let unlikely = Expr::new(Expression::Bernoulli(Expression::constant(0.2)));
        assert_eq!(
            calculate_domain(&unlikely, &[], &action),
            ValueSet::singleton(0.0)
        );
        let uncertain = Expr::new(Expression::Bernoulli(Expression::state_fluent(0)));
        assert_eq!(
            calculate_domain(&uncertain, &boolean_domains(1), &action),
            ValueSet::both_truth_values()
        );
    }

    #[test]
    fn conditional_unions_reachable_branches() {
        let domains = boolean_domains(1);
        let action = ActionState::new(1);
        let expr = Expr::new(Expression::IfThenElse {
            condition: Expression::state_fluent(0),
            if_true: Expression::constant(3.0),
            if_false: Expression::constant(5.0),
        });
        let result = calculate_domain(&expr, &domains, &action);
        assert!(result.contains(3.0) && result.contains(5.0));

        let decided = Expr::new(Expression::IfThenElse {
            condition: Expression::action_fluent(0),
            if_true: Expression::constant(3.0),
            if_false: Expression::constant(5.0),
        });
        assert_eq!(
            calculate_domain(&decided, &domains, &action),
            ValueSet::singleton(5.0)
        );
    }
}
