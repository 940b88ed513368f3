//! The determinizer: computes the most-likely determinization of every
//! probabilistic CPF.

use log::debug;

use crate::error::Result;
use crate::logic::determinize::determinize_most_likely;
use crate::logic::simplify::simplify as simplify_formula;
use crate::logic::Replacements;
use crate::task::Task;

/// Replacement for the sampled random number; outcomes at least this
/// likely are taken to happen.
const RANDOM_NUMBER_REPLACEMENT: f64 = 0.5;

pub fn determinize(task: &mut Task) -> Result<()> {
    let no_replacements = Replacements::default();
    for cpf in &mut task.cpfs {
        if !cpf.is_probabilistic() {
            continue;
        }
        let det = determinize_most_likely(&cpf.eval.formula, RANDOM_NUMBER_REPLACEMENT)?;
        let det = simplify_formula(&det, &no_replacements);
        debug!("determinization of {}: {}", cpf.head_name, det);
        cpf.eval.determinization = Some(det);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::{Expr, Expression};
    use crate::task::Cpf;

    #[test]
    fn only_probabilistic_cpfs_get_a_determinization() {
        let mut task = Task::new();
        let mut deterministic = Cpf::new(
            "p".to_string(),
            Task::BOOL_TYPE,
            0.0,
            2,
            Expr::new(Expression::Negation(Expression::state_fluent(0))),
        );
        deterministic.eval.refresh_info();
        let mut probabilistic = Cpf::new(
            "q".to_string(),
            Task::BOOL_TYPE,
            0.0,
            2,
            Expr::new(Expression::Bernoulli(Expression::constant(0.7))),
        );
        probabilistic.eval.refresh_info();
        task.cpfs = vec![deterministic, probabilistic];

        determinize(&mut task).unwrap();
        assert!(task.cpfs[0].eval.determinization.is_none());
        // 0.5 <= 0.7 folds to the constant 1.
        let det = task.cpfs[1].eval.determinization.as_ref().unwrap();
        assert!(det.is_truth());
    }

    #[test]
    fn determinizing_twice_is_stable() {
        let mut task = Task::new();
        let mut cpf = Cpf::new(
            "p".to_string(),
            Task::BOOL_TYPE,
            0.0,
            2,
            Expr::new(Expression::Bernoulli(Expression::state_fluent(0))),
        );
        cpf.eval.refresh_info();
        task.cpfs = vec![cpf];

        determinize(&mut task).unwrap();
        let first = task.cpfs[0].eval.determinization.clone();
        determinize(&mut task).unwrap();
        assert_eq!(first, task.cpfs[0].eval.determinization);
    }
}
