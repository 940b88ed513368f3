//! Kleene evaluation: each subformula yields the set of values it can take
//! in a Kleene state. Connectives propagate uncertainty, comparisons yield
//! both truth values when both outcomes are possible, and arithmetic uses
//! Minkowski-style set operations.

use crate::math;
use crate::task::{ActionState, KleeneState};

use super::{Expr, Expression, ValueSet};

pub fn evaluate_to_kleene(expr: &Expr, state: &KleeneState, action: &ActionState) -> ValueSet {
    match &**expr {
        Expression::Constant(value) => ValueSet::singleton(*value),
        Expression::StateFluent(index) => state[*index].clone(),
        Expression::ActionFluent(index) => ValueSet::singleton(action[*index] as f64),

        Expression::Conjunction(exprs) => {
            let mut result = ValueSet::new();
            for expr in exprs {
                let child = evaluate_to_kleene(expr, state, action);
                if child.len() == 1 {
                    if math::eq(child.min(), 0.0) {
                        return ValueSet::singleton(0.0);
                    }
                    result.insert(1.0);
                } else {
                    if child.contains(0.0) {
                        result.insert(0.0);
                    }
                    result.insert(1.0);
                }
            }
            if result.is_empty() {
                result.insert(1.0);
            }
            result
        }
        Expression::Disjunction(exprs) => {
            let mut result = ValueSet::new();
            for expr in exprs {
                let child = evaluate_to_kleene(expr, state, action);
                if child.len() == 1 {
                    if !math::eq(child.min(), 0.0) {
                        return ValueSet::singleton(1.0);
                    }
                    result.insert(0.0);
                } else {
                    if child.contains(0.0) {
                        result.insert(0.0);
                    }
                    result.insert(1.0);
                }
            }
            if result.is_empty() {
                result.insert(0.0);
            }
            result
        }

        Expression::Equals(exprs) => {
            debug_assert_eq!(exprs.len(), 2);
            let lhs = evaluate_to_kleene(&exprs[0], state, action);
            let rhs = evaluate_to_kleene(&exprs[1], state, action);
            if lhs.len() == 1 && rhs.len() == 1 {
                return ValueSet::singleton(math::eq(lhs.min(), rhs.min()) as u8 as f64);
            }
            let mut result = ValueSet::singleton(0.0);
            if lhs.iter().any(|value| rhs.contains(value)) {
                result.insert(1.0);
            }
            result
        }
        Expression::Greater(exprs) => kleene_comparison(exprs, state, action, math::gt),
        Expression::Lower(exprs) => kleene_comparison(exprs, state, action, math::lt),
        Expression::GreaterEqual(exprs) => kleene_comparison(exprs, state, action, math::geq),
        Expression::LowerEqual(exprs) => kleene_comparison(exprs, state, action, math::leq),

        Expression::Addition(exprs) => minkowski_fold(exprs, state, action, |a, b| Some(a + b)),
        Expression::Subtraction(exprs) => minkowski_fold(exprs, state, action, |a, b| Some(a - b)),
        Expression::Multiplication(exprs) => {
            minkowski_fold(exprs, state, action, |a, b| Some(a * b))
        }
        Expression::Division(exprs) => minkowski_fold(exprs, state, action, |a, b| {
            if math::eq(b, 0.0) {
                None
            } else {
                Some(a / b)
            }
        }),

        Expression::Negation(inner) => {
            let child = evaluate_to_kleene(inner, state, action);
            let can_be_false = child.contains(0.0);
            let can_be_true = child.iter().any(math::is_true);
            let mut result = ValueSet::new();
            if can_be_true {
                result.insert(0.0);
            }
            if can_be_false {
                result.insert(1.0);
            }
            result
        }
        Expression::Exponential(inner) => evaluate_to_kleene(inner, state, action)
            .iter()
            .map(f64::exp)
            .collect(),

        Expression::Bernoulli(probability) => {
            let child = evaluate_to_kleene(probability, state, action);
            let mut result = ValueSet::new();
            for value in child.iter() {
                if math::gt(value, 0.0) && math::lt(value, 1.0) {
                    return ValueSet::both_truth_values();
                } else if math::eq(value, 0.0) {
                    result.insert(0.0);
                } else {
                    result.insert(1.0);
                }
            }
            result
        }
        Expression::Discrete {
            values,
            probabilities,
        } => {
            let mut result = ValueSet::new();
            for (value, probability) in values.iter().zip(probabilities) {
                let probability = evaluate_to_kleene(probability, state, action);
                // The branch is possible if the probability can be nonzero.
                if probability.len() > 1 || !probability.contains(0.0) {
                    result.extend_from(&evaluate_to_kleene(value, state, action));
                }
            }
            result
        }

        Expression::IfThenElse {
            condition,
            if_true,
            if_false,
        } => {
            let guard = evaluate_to_kleene(condition, state, action);
            if guard.len() == 1 {
                if math::eq(guard.min(), 0.0) {
                    evaluate_to_kleene(if_false, state, action)
                } else {
                    evaluate_to_kleene(if_true, state, action)
                }
            } else {
                let mut result = evaluate_to_kleene(if_true, state, action);
                result.extend_from(&evaluate_to_kleene(if_false, state, action));
                result
            }
        }
        Expression::MultiCondition {
            conditions,
            effects,
        } => {
            let mut result = ValueSet::new();
            for (condition, effect) in conditions.iter().zip(effects) {
                let guard = evaluate_to_kleene(condition, state, action);
                if guard.len() == 1 {
                    if math::eq(guard.min(), 0.0) {
                        continue;
                    }
                    // This guard fires with certainty; later cases are dead.
                    result.extend_from(&evaluate_to_kleene(effect, state, action));
                    return result;
                }
                result.extend_from(&evaluate_to_kleene(effect, state, action));
            }
            unreachable!("no guard of a multi-condition can fire")
        }

        Expression::Parameter(_)
        | Expression::Object(_)
        | Expression::Variable { .. }
        | Expression::Quantifier { .. } => {
            unreachable!("evaluate_to_kleene applied to a schematic formula")
        }
    }
}

fn kleene_comparison(
    exprs: &[Expr],
    state: &KleeneState,
    action: &ActionState,
    decide: fn(f64, f64) -> bool,
) -> ValueSet {
    debug_assert_eq!(exprs.len(), 2);
    let lhs = evaluate_to_kleene(&exprs[0], state, action);
    let rhs = evaluate_to_kleene(&exprs[1], state, action);
    let mut result = ValueSet::new();
    // The comparison can hold if it holds for the most favorable pair, and
    // can fail if it fails for the least favorable one.
    if decide(lhs.max(), rhs.min()) || decide(lhs.min(), rhs.max()) {
        result.insert(1.0);
    }
    if !decide(lhs.min(), rhs.max()) || !decide(lhs.max(), rhs.min()) {
        result.insert(0.0);
    }
    result
}

fn minkowski_fold(
    exprs: &[Expr],
    state: &KleeneState,
    action: &ActionState,
    op: fn(f64, f64) -> Option<f64>,
) -> ValueSet {
    let mut result = evaluate_to_kleene(&exprs[0], state, action);
    for expr in &exprs[1..] {
        let rhs = evaluate_to_kleene(expr, state, action);
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
    use crate::task::State;

    #[test]
    fn uncertain_conjunction_widens() {
        let mut state = KleeneState::from_state(&State::from_values(vec![1.0]));
        state[0] = ValueSet::both_truth_values();
        let action = ActionState::new(0);
        let formula = Expr::new(Expression::Conjunction(vec![
            Expression::state_fluent(0),
            Expression::truth(),
        ]));
        let result = evaluate_to_kleene(&formula, &state, &action);
        assert_eq!(result, ValueSet::both_truth_values());
    }

    #[test]
    fn comparison_yields_both_when_ranges_overlap() {
        let mut state = KleeneState::new(1);
        state[0] = vec![0.0, 1.0, 2.0].into_iter().collect();
        let action = ActionState::new(0);
        let formula = Expr::new(Expression::Greater(vec![
            Expression::state_fluent(0),
            Expression::constant(1.0),
        ]));
        let result = evaluate_to_kleene(&formula, &state, &action);
        assert_eq!(result, ValueSet::both_truth_values());
    }

    #[test]
    fn minkowski_addition_enumerates_pairs() {
        let mut state = KleeneState::new(2);
        state[0] = ValueSet::both_truth_values();
        state[1] = ValueSet::both_truth_values();
        let action = ActionState::new(0);
        let formula = Expr::new(Expression::Addition(vec![
            Expression::state_fluent(0),
            Expression::state_fluent(1),
        ]));
        let result = evaluate_to_kleene(&formula, &state, &action);
        assert_eq!(result, vec![0.0, 1.0, 2.0].into_iter().collect());
    }
}
