//! Dependency analysis of grounded formulas: which state and action
//! variables an expression depends on, with which polarity action variables
//! occur, and whether the formula is probabilistic or contains arithmetic.
//!
//! Polarity drives the action-relevance prediction for preconditions and
//! the dominance analysis over reward-affecting fluents. Subtraction
//! reverses polarity on its subtrahends, negation flips it, and
//! comparisons conservatively mark every encountered action variable with
//! both polarities. Multiplication and division consult constant operands
//! for their sign; with two non-constant operands both polarities are
//! assumed.

use std::collections::BTreeSet;

use crate::math;

use super::{Expr, Expression};

#[derive(Debug, Clone, Default)]
pub struct ExprInfo {
    pub probabilistic: bool,
    pub has_arithmetic: bool,
    pub state_deps: BTreeSet<usize>,
    pub positive_action_deps: BTreeSet<usize>,
    pub negative_action_deps: BTreeSet<usize>,
    /// Union of the positive and negative dependencies.
    pub action_deps: BTreeSet<usize>,
}

impl ExprInfo {
    pub fn of(expr: &Expr) -> Self {
        let mut info = ExprInfo::default();
        let mut positive = BTreeSet::new();
        let mut negative = BTreeSet::new();
        collect(
            expr,
            &mut info.probabilistic,
            &mut info.has_arithmetic,
            &mut info.state_deps,
            &mut positive,
            &mut negative,
        );
        info.action_deps = positive.union(&negative).copied().collect();
        info.positive_action_deps = positive;
        info.negative_action_deps = negative;
        info
    }
}

fn collect(
    expr: &Expr,
    probabilistic: &mut bool,
    arithmetic: &mut bool,
    states: &mut BTreeSet<usize>,
    positive: &mut BTreeSet<usize>,
    negative: &mut BTreeSet<usize>,
) {
    match &**expr {
        Expression::Constant(_) => {}
        Expression::StateFluent(index) => {
            states.insert(*index);
        }
        Expression::ActionFluent(index) => {
            positive.insert(*index);
        }

        Expression::Conjunction(exprs) | Expression::Disjunction(exprs) => {
            for expr in exprs {
                collect(expr, probabilistic, arithmetic, states, positive, negative);
            }
        }

        Expression::Equals(exprs)
        | Expression::Greater(exprs)
        | Expression::Lower(exprs)
        | Expression::GreaterEqual(exprs)
        | Expression::LowerEqual(exprs) => {
            for expr in exprs {
                collect(expr, probabilistic, arithmetic, states, positive, negative);
            }
            // A comparison can turn any dependency either way.
            merge_polarities(positive, negative);
        }

        Expression::Addition(exprs) => {
            *arithmetic = true;
            for expr in exprs {
                collect(expr, probabilistic, arithmetic, states, positive, negative);
            }
        }
        Expression::Subtraction(exprs) => {
            *arithmetic = true;
            collect(
                &exprs[0],
                probabilistic,
                arithmetic,
                states,
                positive,
                negative,
            );
            for expr in &exprs[1..] {
                collect(expr, probabilistic, arithmetic, states, negative, positive);
            }
        }
        Expression::Multiplication(exprs) | Expression::Division(exprs) => {
            *arithmetic = true;
            collect_product(exprs, probabilistic, arithmetic, states, positive, negative);
        }

        Expression::Negation(inner) => {
            collect(inner, probabilistic, arithmetic, states, negative, positive);
        }
        Expression::Exponential(inner) => {
            *arithmetic = true;
            collect(inner, probabilistic, arithmetic, states, positive, negative);
        }

        Expression::Bernoulli(probability) => {
            *probabilistic = true;
            collect(
                probability,
                probabilistic,
                arithmetic,
                states,
                positive,
                negative,
            );
        }
        Expression::Discrete {
            values,
            probabilities,
        } => {
            *probabilistic = true;
            for expr in values.iter().chain(probabilities) {
                collect(expr, probabilistic, arithmetic, states, positive, negative);
            }
        }

        Expression::IfThenElse {
            condition,
            if_true,
            if_false,
        } => {
            collect(condition, probabilistic, arithmetic, states, positive, negative);
            collect(if_true, probabilistic, arithmetic, states, positive, negative);
            collect(if_false, probabilistic, arithmetic, states, positive, negative);
        }
        Expression::MultiCondition {
            conditions,
            effects,
        } => {
            for (condition, effect) in conditions.iter().zip(effects) {
                collect(condition, probabilistic, arithmetic, states, positive, negative);
                collect(effect, probabilistic, arithmetic, states, positive, negative);
            }
        }

        Expression::Parameter(_)
        | Expression::Object(_)
        | Expression::Variable { .. }
        | Expression::Quantifier { .. } => {
            unreachable!("dependency analysis applied to a schematic formula")
        }
    }
}

fn merge_polarities(positive: &mut BTreeSet<usize>, negative: &mut BTreeSet<usize>) {
    positive.extend(negative.iter().copied());
    *negative = positive.clone();
}

fn collect_product(
    exprs: &[Expr],
    probabilistic: &mut bool,
    arithmetic: &mut bool,
    states: &mut BTreeSet<usize>,
    positive: &mut BTreeSet<usize>,
    negative: &mut BTreeSet<usize>,
) {
    if exprs.len() != 2 {
        // No sign information for longer chains; assume both polarities.
        for expr in exprs {
            let mut pos = BTreeSet::new();
            let mut neg = BTreeSet::new();
            collect(expr, probabilistic, arithmetic, states, &mut pos, &mut neg);
            positive.extend(pos.iter().copied().chain(neg.iter().copied()));
            negative.extend(pos.into_iter().chain(neg));
        }
        return;
    }

    let mut pos = [BTreeSet::new(), BTreeSet::new()];
    let mut neg = [BTreeSet::new(), BTreeSet::new()];
    for (index, expr) in exprs.iter().enumerate() {
        collect(
            expr,
            probabilistic,
            arithmetic,
            states,
            &mut pos[index],
            &mut neg[index],
        );
    }

    let constants = [exprs[0].as_constant(), exprs[1].as_constant()];
    let negative_constant = match constants {
        // Only a single negative constant operand flips the other side.
        [Some(value), None] if math::lt(value, 0.0) => Some(1),
        [None, Some(value)] if math::lt(value, 0.0) => Some(0),
        _ => None,
    };

    match negative_constant {
        Some(flipped) => {
            positive.extend(neg[flipped].iter().copied());
            negative.extend(pos[flipped].iter().copied());
        }
        None => {
            for index in 0..2 {
                positive.extend(pos[index].iter().copied());
                negative.extend(neg[index].iter().copied());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negation_flips_action_polarity() {
        let expr = Expr::new(Expression::Negation(Expression::action_fluent(0)));
        let info = ExprInfo::of(&expr);
        assert!(info.negative_action_deps.contains(&0));
        assert!(!info.positive_action_deps.contains(&0));
    }

    #[test]
    fn subtraction_reverses_polarity_of_subtrahends() {
        let expr = Expr::new(Expression::Subtraction(vec![
            Expression::action_fluent(0),
            Expression::action_fluent(1),
        ]));
        let info = ExprInfo::of(&expr);
        assert!(info.positive_action_deps.contains(&0));
        assert!(info.negative_action_deps.contains(&1));
        assert!(info.has_arithmetic);
    }

    #[test]
    fn negative_constant_factor_flips_polarity() {
        let expr = Expr::new(Expression::Multiplication(vec![
            Expression::constant(-2.0),
            Expression::action_fluent(0),
        ]));
        let info = ExprInfo::of(&expr);
        assert!(info.negative_action_deps.contains(&0));
        assert!(!info.positive_action_deps.contains(&0));
    }

    #[test]
    fn comparisons_mark_both_polarities() {
        let expr = Expr::new(Expression::Greater(vec![
            Expression::action_fluent(0),
            Expression::constant(0.0),
        ]));
        let info = ExprInfo::of(&expr);
        assert!(info.positive_action_deps.contains(&0));
        assert!(info.negative_action_deps.contains(&0));
    }

    #[test]
    fn distributions_mark_probabilistic() {
        let expr = Expr::new(Expression::Bernoulli(Expression::state_fluent(2)));
        let info = ExprInfo::of(&expr);
        assert!(info.probabilistic);
        assert!(info.state_deps.contains(&2));
    }
}
