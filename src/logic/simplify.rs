//! Formula simplification: constant folding, identity and absorption laws,
//! flattening of associative connectives, and normalization of conditionals
//! into a single guarded-effect list.
//!
//! The replacement map substitutes grounded variables, which is how the
//! simplifier propagates removed fluents (replaced by constants) and
//! renumbered or FDR-rewritten variables through all formulas.

use crate::math;

use super::{Expr, Expression, Replacements};

pub fn simplify(expr: &Expr, replace: &Replacements) -> Expr {
    match &**expr {
        Expression::Constant(_) | Expression::Object(_) => Expr::clone(expr),
        Expression::StateFluent(index) => match replace.state.get(index) {
            Some(replacement) => Expr::clone(replacement),
            None => Expr::clone(expr),
        },
        Expression::ActionFluent(index) => match replace.action.get(index) {
            Some(replacement) => Expr::clone(replacement),
            None => Expr::clone(expr),
        },

        Expression::Conjunction(exprs) => simplify_conjunction(exprs, replace),
        Expression::Disjunction(exprs) => simplify_disjunction(exprs, replace),
        Expression::Equals(exprs) => simplify_equals(exprs, replace),
        Expression::Greater(exprs) => {
            simplify_comparison(exprs, replace, math::gt, Expression::Greater)
        }
        Expression::Lower(exprs) => {
            simplify_comparison(exprs, replace, math::lt, Expression::Lower)
        }
        Expression::GreaterEqual(exprs) => {
            simplify_comparison(exprs, replace, math::geq, Expression::GreaterEqual)
        }
        Expression::LowerEqual(exprs) => {
            simplify_comparison(exprs, replace, math::leq, Expression::LowerEqual)
        }
        Expression::Addition(exprs) => simplify_addition(exprs, replace),
        Expression::Subtraction(exprs) => simplify_subtraction(exprs, replace),
        Expression::Multiplication(exprs) => simplify_multiplication(exprs, replace),
        Expression::Division(exprs) => simplify_division(exprs, replace),

        Expression::Negation(inner) => simplify_negation(inner, replace),
        Expression::Exponential(inner) => {
            let inner = simplify(inner, replace);
            match inner.as_constant() {
                Some(value) => Expression::constant(value.exp()),
                None => Expr::new(Expression::Exponential(inner)),
            }
        }

        Expression::Bernoulli(probability) => {
            let probability = simplify(probability, replace);
            if let Some(p) = probability.as_constant() {
                if math::leq(p, 0.0) {
                    return Expression::falsity();
                } else if math::geq(p, 1.0) {
                    return Expression::truth();
                }
            }
            Expr::new(Expression::Bernoulli(probability))
        }
        Expression::Discrete {
            values,
            probabilities,
        } => simplify_discrete(values, probabilities, replace),

        Expression::IfThenElse {
            condition,
            if_true,
            if_false,
        } => simplify_if_then_else(condition, if_true, if_false, replace),
        Expression::MultiCondition {
            conditions,
            effects,
        } => simplify_multi_condition(conditions, effects, replace),

        // Schematic nodes never reach the simplifier.
        Expression::Parameter(_)
        | Expression::Variable { .. }
        | Expression::Quantifier { .. } => {
            unreachable!("simplify applied to a schematic formula")
        }
    }
}

fn simplify_conjunction(exprs: &[Expr], replace: &Replacements) -> Expr {
    let mut simplified = Vec::with_capacity(exprs.len());
    for expr in exprs {
        let expr = simplify(expr, replace);
        if let Some(value) = expr.as_constant() {
            if math::eq(value, 0.0) {
                // An absorbing element makes the conjunction false.
                return Expression::falsity();
            }
            // Identity elements can be dropped.
        } else if let Expression::Conjunction(inner) = &*expr {
            simplified.extend(inner.iter().cloned());
        } else {
            simplified.push(expr);
        }
    }
    match simplified.len() {
        0 => Expression::truth(),
        1 => simplified.pop().unwrap(),
        _ => Expr::new(Expression::Conjunction(simplified)),
    }
}

fn simplify_disjunction(exprs: &[Expr], replace: &Replacements) -> Expr {
    let mut simplified = Vec::with_capacity(exprs.len());
    for expr in exprs {
        let expr = simplify(expr, replace);
        if let Some(value) = expr.as_constant() {
            if !math::eq(value, 0.0) {
                return Expression::truth();
            }
        } else if let Expression::Disjunction(inner) = &*expr {
            simplified.extend(inner.iter().cloned());
        } else {
            simplified.push(expr);
        }
    }
    match simplified.len() {
        0 => Expression::falsity(),
        1 => simplified.pop().unwrap(),
        _ => Expr::new(Expression::Disjunction(simplified)),
    }
}

fn simplify_equals(exprs: &[Expr], replace: &Replacements) -> Expr {
    let mut simplified = Vec::with_capacity(exprs.len());
    let mut comparator: Option<f64> = None;
    for expr in exprs {
        let expr = simplify(expr, replace);
        if let Some(value) = expr.as_constant() {
            match comparator {
                Some(other) if !math::eq(value, other) => {
                    // Two different constants can never be equal.
                    return Expression::falsity();
                }
                Some(_) => {
                    // Equal to the stored comparator, nothing to check.
                }
                None => {
                    comparator = Some(value);
                    simplified.push(expr);
                }
            }
        } else {
            simplified.push(expr);
        }
    }
    if simplified.len() <= 1 {
        // Everything collapsed to a single (or constant) child.
        return Expression::truth();
    }
    Expr::new(Expression::Equals(simplified))
}

fn simplify_comparison(
    exprs: &[Expr],
    replace: &Replacements,
    decide: fn(f64, f64) -> bool,
    build: fn(Vec<Expr>) -> Expression,
) -> Expr {
    debug_assert_eq!(exprs.len(), 2);
    let lhs = simplify(&exprs[0], replace);
    let rhs = simplify(&exprs[1], replace);
    if let (Some(l), Some(r)) = (lhs.as_constant(), rhs.as_constant()) {
        return if decide(l, r) {
            Expression::truth()
        } else {
            Expression::falsity()
        };
    }
    Expr::new(build(vec![lhs, rhs]))
}

fn simplify_addition(exprs: &[Expr], replace: &Replacements) -> Expr {
    let mut simplified = Vec::with_capacity(exprs.len());
    let mut constant_sum = 0.0;
    for expr in exprs {
        let expr = simplify(expr, replace);
        if let Some(value) = expr.as_constant() {
            constant_sum += value;
        } else if let Expression::Addition(inner) = &*expr {
            // Nested additions are already normalized, so a constant can
            // only be their last element.
            for child in inner {
                if let Some(value) = child.as_constant() {
                    constant_sum += value;
                } else {
                    simplified.push(Expr::clone(child));
                }
            }
        } else {
            simplified.push(expr);
        }
    }
    if simplified.is_empty() {
        return Expression::constant(constant_sum);
    }
    if simplified.len() == 1 && math::eq(constant_sum, 0.0) {
        return simplified.pop().unwrap();
    }
    if !math::eq(constant_sum, 0.0) {
        simplified.push(Expression::constant(constant_sum));
    }
    Expr::new(Expression::Addition(simplified))
}

fn simplify_subtraction(exprs: &[Expr], replace: &Replacements) -> Expr {
    debug_assert!(exprs.len() >= 2);
    let mut simplified = Vec::with_capacity(exprs.len());
    let mut constant_part = 0.0;

    let first = simplify(&exprs[0], replace);
    let first_is_constant = match first.as_constant() {
        Some(value) => {
            constant_part = value;
            true
        }
        None => {
            simplified.push(first);
            false
        }
    };

    for expr in &exprs[1..] {
        let expr = simplify(expr, replace);
        if let Some(value) = expr.as_constant() {
            constant_part -= value;
        } else {
            simplified.push(expr);
        }
    }

    if simplified.is_empty() {
        debug_assert!(first_is_constant);
        return Expression::constant(constant_part);
    }
    if first_is_constant {
        simplified.insert(0, Expression::constant(constant_part));
    } else if !math::eq(constant_part, 0.0) {
        // All folded constants were subtrahends.
        simplified.push(Expression::constant(-constant_part));
    }
    if simplified.len() == 1 {
        return simplified.pop().unwrap();
    }
    Expr::new(Expression::Subtraction(simplified))
}

fn simplify_multiplication(exprs: &[Expr], replace: &Replacements) -> Expr {
    let mut simplified = Vec::with_capacity(exprs.len());
    let mut constant_product = 1.0;
    for expr in exprs {
        let expr = simplify(expr, replace);
        if let Some(value) = expr.as_constant() {
            if math::eq(value, 0.0) {
                return Expression::falsity();
            }
            constant_product *= value;
        } else {
            simplified.push(expr);
        }
    }
    if !math::eq(constant_product, 1.0) {
        simplified.push(Expression::constant(constant_product));
    }
    match simplified.len() {
        0 => Expression::truth(),
        1 => simplified.pop().unwrap(),
        _ => Expr::new(Expression::Multiplication(simplified)),
    }
}

fn simplify_division(exprs: &[Expr], replace: &Replacements) -> Expr {
    debug_assert_eq!(exprs.len(), 2);
    let lhs = simplify(&exprs[0], replace);
    let rhs = simplify(&exprs[1], replace);
    if let (Some(l), Some(r)) = (lhs.as_constant(), rhs.as_constant()) {
        return Expression::constant(l / r);
    }
    Expr::new(Expression::Division(vec![lhs, rhs]))
}

fn simplify_negation(inner: &Expr, replace: &Replacements) -> Expr {
    let inner = simplify(inner, replace);
    if let Some(value) = inner.as_constant() {
        return if math::eq(value, 0.0) {
            Expression::truth()
        } else {
            Expression::falsity()
        };
    }
    if let Expression::Negation(doubly_negated) = &*inner {
        return Expr::clone(doubly_negated);
    }
    Expr::new(Expression::Negation(inner))
}

fn simplify_discrete(values: &[Expr], probabilities: &[Expr], replace: &Replacements) -> Expr {
    let mut kept_values = Vec::with_capacity(values.len());
    let mut kept_probabilities = Vec::with_capacity(probabilities.len());
    for (value, probability) in values.iter().zip(probabilities) {
        let probability = simplify(probability, replace);
        if matches!(probability.as_constant(), Some(p) if math::eq(p, 0.0)) {
            continue;
        }
        kept_values.push(simplify(value, replace));
        kept_probabilities.push(probability);
    }
    if kept_values.len() == 1 {
        // A distribution with a single branch is that branch.
        return kept_values.pop().unwrap();
    }
    Expr::new(Expression::Discrete {
        values: kept_values,
        probabilities: kept_probabilities,
    })
}

fn simplify_if_then_else(
    condition: &Expr,
    if_true: &Expr,
    if_false: &Expr,
    replace: &Replacements,
) -> Expr {
    let condition = simplify(condition, replace);
    let if_true = simplify(if_true, replace);
    let if_false = simplify(if_false, replace);

    if let Some(value) = condition.as_constant() {
        return if math::eq(value, 0.0) { if_false } else { if_true };
    }

    if let (Some(t), Some(f)) = (if_true.as_constant(), if_false.as_constant()) {
        if math::eq(t, 1.0) && math::eq(f, 0.0) {
            return condition;
        }
        if math::eq(t, 0.0) && math::eq(f, 1.0) {
            return simplify_negation(&condition, &Replacements::default());
        }
        if math::eq(t, f) {
            return if_true;
        }
    }

    // Merge an else-branch conditional into a single guarded-effect list.
    match &*if_false {
        Expression::IfThenElse {
            condition: else_condition,
            if_true: else_if_true,
            if_false: else_if_false,
        } => {
            let merged = Expr::new(Expression::MultiCondition {
                conditions: vec![
                    condition,
                    Expr::clone(else_condition),
                    Expression::truth(),
                ],
                effects: vec![if_true, Expr::clone(else_if_true), Expr::clone(else_if_false)],
            });
            simplify(&merged, replace)
        }
        Expression::MultiCondition {
            conditions: else_conditions,
            effects: else_effects,
        } => {
            let mut conditions = Vec::with_capacity(1 + else_conditions.len());
            conditions.push(condition);
            conditions.extend(else_conditions.iter().cloned());
            let mut effects = Vec::with_capacity(1 + else_effects.len());
            effects.push(if_true);
            effects.extend(else_effects.iter().cloned());
            let merged = Expr::new(Expression::MultiCondition {
                conditions,
                effects,
            });
            simplify(&merged, replace)
        }
        _ => Expr::new(Expression::IfThenElse {
            condition,
            if_true,
            if_false,
        }),
    }
}

fn simplify_multi_condition(conditions: &[Expr], effects: &[Expr], replace: &Replacements) -> Expr {
    let mut kept_conditions = Vec::with_capacity(conditions.len());
    let mut kept_effects = Vec::with_capacity(effects.len());
    for (condition, effect) in conditions.iter().zip(effects) {
        let condition = simplify(condition, replace);
        let effect = simplify(effect, replace);
        if let Some(value) = condition.as_constant() {
            if math::eq(value, 0.0) {
                // This guard can never fire.
                continue;
            }
            // A guard that always fires ends the list.
            kept_conditions.push(Expression::truth());
            kept_effects.push(effect);
            break;
        }
        kept_conditions.push(condition);
        kept_effects.push(effect);
    }
    debug_assert!(!kept_effects.is_empty());
    if kept_effects.len() == 1 {
        return kept_effects.pop().unwrap();
    }
    Expr::new(Expression::MultiCondition {
        conditions: kept_conditions,
        effects: kept_effects,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_replacements() -> Replacements {
        Replacements::default()
    }

    #[test]
    fn conjunction_short_circuits_and_flattens() {
        let inner = Expr::new(Expression::Conjunction(vec![
            Expression::state_fluent(0),
            Expression::state_fluent(1),
        ]));
        let expr = Expr::new(Expression::Conjunction(vec![
            inner,
            Expression::truth(),
            Expression::state_fluent(2),
        ]));
        let simplified = simplify(&expr, &no_replacements());
        match &*simplified {
            Expression::Conjunction(exprs) => assert_eq!(exprs.len(), 3),
            other => panic!("expected flattened conjunction, got {:?}", other),
        }

        let falsified = Expr::new(Expression::Conjunction(vec![
            Expression::state_fluent(0),
            Expression::falsity(),
        ]));
        assert!(simplify(&falsified, &no_replacements()).is_falsity());
    }

    #[test]
    fn equals_decides_on_constant_children() {
        let conflicting = Expr::new(Expression::Equals(vec![
            Expression::constant(2.0),
            Expression::constant(3.0),
        ]));
        assert!(simplify(&conflicting, &no_replacements()).is_falsity());

        let matching = Expr::new(Expression::Equals(vec![
            Expression::constant(2.0),
            Expression::constant(2.0),
        ]));
        assert!(simplify(&matching, &no_replacements()).is_truth());

        let undecided = Expr::new(Expression::Equals(vec![
            Expression::state_fluent(0),
            Expression::constant(2.0),
        ]));
        assert!(matches!(
            &*simplify(&undecided, &no_replacements()),
            Expression::Equals(_)
        ));
    }

    #[test]
    fn addition_folds_constants_to_the_end() {
        let expr = Expr::new(Expression::Addition(vec![
            Expression::constant(2.0),
            Expression::state_fluent(0),
            Expression::constant(3.0),
        ]));
        match &*simplify(&expr, &no_replacements()) {
            Expression::Addition(exprs) => {
                assert_eq!(exprs.len(), 2);
                assert_eq!(exprs[1].as_constant(), Some(5.0));
            }
            other => panic!("expected addition, got {:?}", other),
        }
    }

    #[test]
    fn boolean_if_collapses_to_condition() {
        let expr = Expr::new(Expression::IfThenElse {
            condition: Expression::state_fluent(0),
            if_true: Expression::truth(),
            if_false: Expression::falsity(),
        });
        assert_eq!(
            simplify(&expr, &no_replacements()),
            Expression::state_fluent(0)
        );

        let negated = Expr::new(Expression::IfThenElse {
            condition: Expression::state_fluent(0),
            if_true: Expression::falsity(),
            if_false: Expression::truth(),
        });
        assert!(matches!(
            &*simplify(&negated, &no_replacements()),
            Expression::Negation(_)
        ));
    }

    #[test]
    fn nested_if_merges_into_multi_condition() {
        let expr = Expr::new(Expression::IfThenElse {
            condition: Expression::action_fluent(0),
            if_true: Expression::truth(),
            if_false: Expr::new(Expression::IfThenElse {
                condition: Expression::action_fluent(1),
                if_true: Expression::falsity(),
                if_false: Expression::state_fluent(0),
            }),
        });
        match &*simplify(&expr, &Replacements::default()) {
            Expression::MultiCondition { conditions, effects } => {
                assert_eq!(conditions.len(), 3);
                assert_eq!(effects.len(), 3);
                assert!(conditions[2].is_truth());
            }
            other => panic!("expected multi-condition, got {:?}", other),
        }
    }

    #[test]
    fn replacement_propagates_and_folds() {
        let mut replace = Replacements::default();
        replace.state.insert(0, Expression::truth());
        let expr = Expr::new(Expression::Conjunction(vec![
            Expression::state_fluent(0),
            Expression::state_fluent(1),
        ]));
        assert_eq!(
            simplify(&expr, &replace),
            Expression::state_fluent(1)
        );
    }

    #[test]
    fn discrete_drops_zero_probability_branches() {
        let expr = Expr::new(Expression::Discrete {
            values: vec![Expression::constant(0.0), Expression::constant(2.0)],
            probabilities: vec![Expression::falsity(), Expression::truth()],
        });
        assert_eq!(
            simplify(&expr, &no_replacements()).as_constant(),
            Some(2.0)
        );
    }
}
