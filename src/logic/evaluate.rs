//! Deterministic evaluation of grounded formulas.
//!
//! Probabilistic constructors have no deterministic value; reaching one here
//! is a pipeline bug (the precomputer and the analyzer only evaluate
//! deterministic formulas and determinizations).

use crate::math;
use crate::task::{ActionState, State};

use super::{Expr, Expression};

pub fn evaluate(expr: &Expr, state: &State, action: &ActionState) -> f64 {
    match &**expr {
        Expression::Constant(value) => *value,
        Expression::StateFluent(index) => state[*index],
        Expression::ActionFluent(index) => action[*index] as f64,

        Expression::Conjunction(exprs) => {
            for expr in exprs {
                if !math::is_true(evaluate(expr, state, action)) {
                    return 0.0;
                }
            }
            1.0
        }
        Expression::Disjunction(exprs) => {
            for expr in exprs {
                if math::is_true(evaluate(expr, state, action)) {
                    return 1.0;
                }
            }
            0.0
        }
        Expression::Equals(exprs) => {
            debug_assert_eq!(exprs.len(), 2);
            let lhs = evaluate(&exprs[0], state, action);
            let rhs = evaluate(&exprs[1], state, action);
            math::eq(lhs, rhs) as u8 as f64
        }
        Expression::Greater(exprs) => binary_comparison(exprs, state, action, math::gt),
        Expression::Lower(exprs) => binary_comparison(exprs, state, action, math::lt),
        Expression::GreaterEqual(exprs) => binary_comparison(exprs, state, action, math::geq),
        Expression::LowerEqual(exprs) => binary_comparison(exprs, state, action, math::leq),

        Expression::Addition(exprs) => exprs
            .iter()
            .map(|expr| evaluate(expr, state, action))
            .sum(),
        Expression::Subtraction(exprs) => {
            let mut result = evaluate(&exprs[0], state, action);
            for expr in &exprs[1..] {
                result -= evaluate(expr, state, action);
            }
            result
        }
        Expression::Multiplication(exprs) => {
            let mut result = 1.0;
            for expr in exprs {
                result *= evaluate(expr, state, action);
                if math::eq(result, 0.0) {
                    return 0.0;
                }
            }
            result
        }
        Expression::Division(exprs) => {
            let mut result = evaluate(&exprs[0], state, action);
            for expr in &exprs[1..] {
                if math::eq(result, 0.0) {
                    return 0.0;
                }
                result /= evaluate(expr, state, action);
            }
            result
        }

        Expression::Negation(inner) => {
            (!math::is_true(evaluate(inner, state, action))) as u8 as f64
        }
        Expression::Exponential(inner) => evaluate(inner, state, action).exp(),

        Expression::IfThenElse {
            condition,
            if_true,
            if_false,
        } => {
            if math::is_true(evaluate(condition, state, action)) {
                evaluate(if_true, state, action)
            } else {
                evaluate(if_false, state, action)
            }
        }
        Expression::MultiCondition {
            conditions,
            effects,
        } => {
            for (condition, effect) in conditions.iter().zip(effects) {
                if math::is_true(evaluate(condition, state, action)) {
                    return evaluate(effect, state, action);
                }
            }
            unreachable!("no guard of a multi-condition fired")
        }

        Expression::Bernoulli(_) | Expression::Discrete { .. } => {
            unreachable!("deterministic evaluate applied to a probabilistic formula")
        }
        Expression::Parameter(_)
        | Expression::Object(_)
        | Expression::Variable { .. }
        | Expression::Quantifier { .. } => {
            unreachable!("evaluate applied to a schematic formula")
        }
    }
}

fn binary_comparison(
    exprs: &[Expr],
    state: &State,
    action: &ActionState,
    decide: fn(f64, f64) -> bool,
) -> f64 {
    debug_assert_eq!(exprs.len(), 2);
    let lhs = evaluate(&exprs[0], state, action);
    let rhs = evaluate(&exprs[1], state, action);
    decide(lhs, rhs) as u8 as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connectives_and_conditionals_evaluate() {
        let state = State::from_values(vec![1.0, 0.0]);
        let action = ActionState::new(1);

        let formula = Expr::new(Expression::IfThenElse {
            condition: Expr::new(Expression::Conjunction(vec![
                Expression::state_fluent(0),
                Expr::new(Expression::Negation(Expression::state_fluent(1))),
            ])),
            if_true: Expr::new(Expression::Addition(vec![
                Expression::state_fluent(0),
                Expression::constant(2.0),
            ])),
            if_false: Expression::falsity(),
        });
        assert_eq!(evaluate(&formula, &state, &action), 3.0);
    }

    #[test]
    fn multi_condition_picks_first_firing_guard() {
        let state = State::from_values(vec![0.0]);
        let action = ActionState::new(0);
        let formula = Expr::new(Expression::MultiCondition {
            conditions: vec![Expression::state_fluent(0), Expression::truth()],
            effects: vec![Expression::constant(5.0), Expression::constant(7.0)],
        });
        assert_eq!(evaluate(&formula, &state, &action), 7.0);
    }
}
