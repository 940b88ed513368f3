//! Serialization of grounded formulas in the prefix grammar the downstream
//! runtime parses back: `$s(i)`, `$a(i)` and `$c(v)` for state fluents,
//! action fluents and constants, operator tokens with space-separated
//! operands, and guarded-effect lists as `if(c) then(e) elif(c) then(e)`.

use std::fmt;

use super::Expression;

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Constant(value) => write!(f, "$c({})", value),
            Expression::StateFluent(index) => write!(f, "$s({})", index),
            Expression::ActionFluent(index) => write!(f, "$a({})", index),

            Expression::Conjunction(exprs) => write_operator(f, "and", exprs),
            Expression::Disjunction(exprs) => write_operator(f, "or", exprs),
            Expression::Equals(exprs) => write_operator(f, "==", exprs),
            Expression::Greater(exprs) => write_operator(f, ">", exprs),
            Expression::Lower(exprs) => write_operator(f, "<", exprs),
            Expression::GreaterEqual(exprs) => write_operator(f, ">=", exprs),
            Expression::LowerEqual(exprs) => write_operator(f, "<=", exprs),
            Expression::Addition(exprs) => write_operator(f, "+", exprs),
            Expression::Subtraction(exprs) => write_operator(f, "-", exprs),
            Expression::Multiplication(exprs) => write_operator(f, "*", exprs),
            Expression::Division(exprs) => write_operator(f, "/", exprs),

            Expression::Negation(inner) => write!(f, "~({})", inner),
            Expression::Exponential(inner) => write!(f, "exp({})", inner),

            Expression::Bernoulli(probability) => write!(f, "Bernoulli({})", probability),
            Expression::Discrete {
                values,
                probabilities,
            } => {
                write!(f, "Discrete(")?;
                for (index, (value, probability)) in
                    values.iter().zip(probabilities).enumerate()
                {
                    if index > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "[{} : {}]", value, probability)?;
                }
                write!(f, ")")
            }

            Expression::IfThenElse {
                condition,
                if_true,
                if_false,
            } => write!(
                f,
                "if({}) then({}) elif($c(1)) then({})",
                condition, if_true, if_false
            ),
            Expression::MultiCondition {
                conditions,
                effects,
            } => {
                for (index, (condition, effect)) in
                    conditions.iter().zip(effects).enumerate()
                {
                    if index == 0 {
                        write!(f, "if({}) then({})", condition, effect)?;
                    } else {
                        write!(f, " elif({}) then({})", condition, effect)?;
                    }
                }
                Ok(())
            }

            // Schematic nodes never reach the output file; the renderings
            // below only serve diagnostics.
            Expression::Parameter(name) => write!(f, "{}", name),
            Expression::Object(id) => write!(f, "@obj{}", id),
            Expression::Variable { schema, params } => {
                write!(f, "#var{}(", schema)?;
                for (index, param) in params.iter().enumerate() {
                    if index > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", param)?;
                }
                write!(f, ")")
            }
            Expression::Quantifier { kind, body, .. } => {
                write!(f, "({:?} .. {})", kind, body)
            }
        }
    }
}

fn write_operator(f: &mut fmt::Formatter<'_>, token: &str, exprs: &[super::Expr]) -> fmt::Result {
    write!(f, "{}(", token)?;
    for (index, expr) in exprs.iter().enumerate() {
        if index > 0 {
            write!(f, " ")?;
        }
        write!(f, "{}", expr)?;
    }
    write!(f, ")")
}

#[cfg(test)]
mod tests {
    use super::super::{Expr, Expression};

    #[test]
    fn prefix_tokens_match_the_output_grammar() {
        let expr = Expr::new(Expression::Conjunction(vec![
            Expression::state_fluent(0),
            Expr::new(Expression::Negation(Expression::action_fluent(1))),
            Expression::constant(0.5),
        ]));
        assert_eq!(expr.to_string(), "and($s(0) ~($a(1)) $c(0.5))");
    }

    #[test]
    fn conditionals_render_as_guard_effect_lists() {
        let expr = Expr::new(Expression::IfThenElse {
            condition: Expression::action_fluent(0),
            if_true: Expression::truth(),
            if_false: Expression::state_fluent(2),
        });
        assert_eq!(
            expr.to_string(),
            "if($a(0)) then($c(1)) elif($c(1)) then($s(2))"
        );
    }

    #[test]
    fn discrete_renders_value_probability_pairs() {
        let expr = Expr::new(Expression::Discrete {
            values: vec![Expression::falsity(), Expression::truth()],
            probabilities: vec![Expression::constant(0.3), Expression::constant(0.7)],
        });
        assert_eq!(
            expr.to_string(),
            "Discrete([$c(0) : $c(0.3)] [$c(1) : $c(0.7)])"
        );
    }
}
