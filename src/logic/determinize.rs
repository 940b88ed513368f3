//! Most-likely-outcome determinization.
//!
//! Bernoulli(p) becomes `seed <= p`; Discrete becomes a guarded-effect list
//! whose i-th guard checks that the i-th probability is pointwise maximal,
//! with ties resolved towards the earlier branch.

use crate::error::{CompileError, Result};

use super::{Expr, Expression};

pub fn determinize_most_likely(expr: &Expr, seed: f64) -> Result<Expr> {
    match &**expr {
        Expression::Constant(_)
        | Expression::StateFluent(_)
        | Expression::ActionFluent(_) => Ok(Expr::clone(expr)),

        Expression::Conjunction(exprs) => Ok(Expr::new(Expression::Conjunction(
            determinize_all(exprs, seed)?,
        ))),
        Expression::Disjunction(exprs) => Ok(Expr::new(Expression::Disjunction(
            determinize_all(exprs, seed)?,
        ))),
        Expression::Equals(exprs) => {
            Ok(Expr::new(Expression::Equals(determinize_all(exprs, seed)?)))
        }
        Expression::Greater(exprs) => Ok(Expr::new(Expression::Greater(determinize_all(
            exprs, seed,
        )?))),
        Expression::Lower(exprs) => {
            Ok(Expr::new(Expression::Lower(determinize_all(exprs, seed)?)))
        }
        Expression::GreaterEqual(exprs) => Ok(Expr::new(Expression::GreaterEqual(
            determinize_all(exprs, seed)?,
        ))),
        Expression::LowerEqual(exprs) => Ok(Expr::new(Expression::LowerEqual(
            determinize_all(exprs, seed)?,
        ))),
        Expression::Addition(exprs) => Ok(Expr::new(Expression::Addition(determinize_all(
            exprs, seed,
        )?))),
        Expression::Subtraction(exprs) => Ok(Expr::new(Expression::Subtraction(
            determinize_all(exprs, seed)?,
        ))),
        Expression::Multiplication(exprs) => Ok(Expr::new(Expression::Multiplication(
            determinize_all(exprs, seed)?,
        ))),
        Expression::Division(exprs) => Ok(Expr::new(Expression::Division(determinize_all(
            exprs, seed,
        )?))),

        Expression::Negation(inner) => Ok(Expr::new(Expression::Negation(
            determinize_most_likely(inner, seed)?,
        ))),
        Expression::Exponential(inner) => Ok(Expr::new(Expression::Exponential(
            determinize_most_likely(inner, seed)?,
        ))),

        Expression::Bernoulli(probability) => Ok(Expr::new(Expression::LowerEqual(vec![
            Expression::constant(seed),
            determinize_most_likely(probability, seed)?,
        ]))),
        Expression::Discrete {
            values,
            probabilities,
        } => determinize_discrete(values, probabilities, seed),

        Expression::IfThenElse {
            condition,
            if_true,
            if_false,
        } => Ok(Expr::new(Expression::IfThenElse {
            condition: determinize_most_likely(condition, seed)?,
            if_true: determinize_most_likely(if_true, seed)?,
            if_false: determinize_most_likely(if_false, seed)?,
        })),
        Expression::MultiCondition {
            conditions,
            effects,
        } => Ok(Expr::new(Expression::MultiCondition {
            conditions: determinize_all(conditions, seed)?,
            effects: determinize_all(effects, seed)?,
        })),

        Expression::Parameter(_)
        | Expression::Object(_)
        | Expression::Variable { .. }
        | Expression::Quantifier { .. } => {
            unreachable!("determinize applied to a schematic formula")
        }
    }
}

fn determinize_all(exprs: &[Expr], seed: f64) -> Result<Vec<Expr>> {
    exprs
        .iter()
        .map(|expr| determinize_most_likely(expr, seed))
        .collect()
}

fn determinize_discrete(values: &[Expr], probabilities: &[Expr], seed: f64) -> Result<Expr> {
    if probabilities.iter().any(contains_distribution) {
        return Err(CompileError::Unsupported(
            "determinization of a Discrete distribution with conditional probabilities"
                .to_string(),
        ));
    }

    let probabilities = determinize_all(probabilities, seed)?;
    let values = determinize_all(values, seed)?;

    // One guard per branch: this probability is at least as large as every
    // other. The first maximal branch wins because the guards are checked
    // in order.
    let mut conditions = Vec::with_capacity(values.len());
    let mut effects = Vec::with_capacity(values.len());
    for (index, value) in values.iter().enumerate() {
        let conjuncts: Vec<Expr> = probabilities
            .iter()
            .enumerate()
            .filter(|(other, _)| *other != index)
            .map(|(_, other)| {
                Expr::new(Expression::GreaterEqual(vec![
                    Expr::clone(&probabilities[index]),
                    Expr::clone(other),
                ]))
            })
            .collect();
        conditions.push(Expr::new(Expression::Conjunction(conjuncts)));
        effects.push(Expr::clone(value));
    }
    Ok(Expr::new(Expression::MultiCondition {
        conditions,
        effects,
    }))
}

fn contains_distribution(expr: &Expr) -> bool {
    match &**expr {
        Expression::Bernoulli(_) | Expression::Discrete { .. } => true,
        Expression::Constant(_)
        | Expression::StateFluent(_)
        | Expression::ActionFluent(_)
        | Expression::Parameter(_)
        | Expression::Object(_) => false,
        Expression::Negation(inner) | Expression::Exponential(inner) => {
            contains_distribution(inner)
        }
        Expression::Conjunction(exprs)
        | Expression::Disjunction(exprs)
        | Expression::Equals(exprs)
        | Expression::Greater(exprs)
        | Expression::Lower(exprs)
        | Expression::GreaterEqual(exprs)
        | Expression::LowerEqual(exprs)
        | Expression::Addition(exprs)
        | Expression::Subtraction(exprs)
        | Expression::Multiplication(exprs)
        | Expression::Division(exprs) => exprs.iter().any(contains_distribution),
        Expression::IfThenElse {
            condition,
            if_true,
            if_false,
        } => {
            contains_distribution(condition)
                || contains_distribution(if_true)
                || contains_distribution(if_false)
        }
        Expression::MultiCondition {
            conditions,
            effects,
        } => {
            conditions.iter().any(contains_distribution)
                || effects.iter().any(contains_distribution)
        }
        Expression::Variable { params, .. } => params.iter().any(contains_distribution),
        Expression::Quantifier { body, .. } => contains_distribution(body),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::simplify::simplify;
    use crate::logic::Replacements;

    #[test]
    fn bernoulli_becomes_a_threshold_check() {
        let expr = Expr::new(Expression::Bernoulli(Expression::constant(0.7)));
        let det = determinize_most_likely(&expr, 0.5).unwrap();
        assert!(matches!(&*det, Expression::LowerEqual(_)));
        assert!(simplify(&det, &Replacements::default()).is_truth());
    }

    #[test]
    fn discrete_with_unique_maximum_folds_to_its_value() {
        let expr = Expr::new(Expression::Discrete {
            values: vec![
                Expression::constant(0.0),
                Expression::constant(1.0),
                Expression::constant(2.0),
            ],
            probabilities: vec![
                Expression::constant(0.2),
                Expression::constant(0.6),
                Expression::constant(0.2),
            ],
        });
        let det = determinize_most_likely(&expr, 0.5).unwrap();
        let simplified = simplify(&det, &Replacements::default());
        assert_eq!(simplified.as_constant(), Some(1.0));
    }

    #[test]
    fn determinization_is_idempotent() {
        let expr = Expr::new(Expression::Bernoulli(Expression::state_fluent(0)));
        let once = determinize_most_likely(&expr, 0.5).unwrap();
        let twice = determinize_most_likely(&once, 0.5).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn conditional_probabilities_are_rejected() {
        let expr = Expr::new(Expression::Discrete {
            values: vec![Expression::constant(0.0), Expression::constant(1.0)],
            probabilities: vec![
                Expr::new(Expression::Bernoulli(Expression::constant(0.5))),
                Expression::constant(0.5),
            ],
        });
        assert!(determinize_most_likely(&expr, 0.5).is_err());
    }
}
