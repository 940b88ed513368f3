//! The precomputer: tabulates evaluation results for every evaluatable
//! whose perfect key space is small enough for vector caching.
//!
//! For each combination of values of the dependent state variables and
//! each action equivalence class, the (determinized) formula is evaluated
//! and stored at its perfect key. Cells are written exactly once.

use std::collections::BTreeSet;

use itertools::Itertools;
use log::info;

use crate::logic::evaluate::evaluate;
use crate::logic::pd::evaluate_to_pd;
use crate::task::{ActionState, CachingKind, Evaluatable, State, Task};

pub fn precompute(task: &mut Task) {
    info!("Precomputing evaluatables");
    let num_cpfs = task.cpfs.len();
    let domains: Vec<Vec<usize>> = task.cpfs.iter().map(|cpf| cpf.domain.clone()).collect();

    for index in 0..num_cpfs {
        if matches!(task.cpfs[index].eval.caching, CachingKind::Vector(_)) {
            precompute_evaluatable(
                &mut task.cpfs[index].eval,
                &domains,
                &task.action_states,
            );
        }
    }
    let reward = &mut task.reward.as_mut().expect("reward not instantiated").eval;
    if matches!(reward.caching, CachingKind::Vector(_)) {
        precompute_evaluatable(reward, &domains, &task.action_states);
    }
    for precond in &mut task.preconds {
        if matches!(precond.eval.caching, CachingKind::Vector(_)) {
            precompute_evaluatable(&mut precond.eval, &domains, &task.action_states);
        }
    }
}

fn precompute_evaluatable(
    eval: &mut Evaluatable,
    domains: &[Vec<usize>],
    action_states: &[ActionState],
) {
    let num_cpfs = domains.len();
    for state in relevant_states(eval, domains, num_cpfs) {
        let state_key = state_fluent_hash_key(eval, &state);
        let mut used_action_keys = BTreeSet::new();
        for action in action_states {
            let action_key = eval.action_hash_keys[action.index];
            if !used_action_keys.insert(action_key) {
                continue;
            }
            let key = (state_key + action_key) as usize;
            if eval.is_probabilistic() {
                let determinization = eval
                    .determinization
                    .as_ref()
                    .expect("probabilistic evaluatable without determinization");
                debug_assert!(eval.precomputed[key].is_none());
                eval.precomputed[key] = Some(evaluate(determinization, &state, action));
                debug_assert!(eval.precomputed_pd[key].is_none());
                eval.precomputed_pd[key] =
                    Some(evaluate_to_pd(&eval.formula, &state, action));
            } else {
                debug_assert!(eval.precomputed[key].is_none());
                eval.precomputed[key] = Some(evaluate(&eval.formula, &state, action));
            }
        }
    }
}

/// All states that assign each dependent variable one of its domain values
/// and every other variable zero.
fn relevant_states(
    eval: &Evaluatable,
    domains: &[Vec<usize>],
    num_cpfs: usize,
) -> Vec<State> {
    let dependents: Vec<usize> = eval.info.state_deps.iter().copied().collect();
    if dependents.is_empty() {
        return vec![State::new(num_cpfs)];
    }
    dependents
        .iter()
        .map(|&index| domains[index].clone())
        .multi_cartesian_product()
        .map(|values| {
            let mut state = State::new(num_cpfs);
            for (&index, value) in dependents.iter().zip(values) {
                state[index] = value as f64;
            }
            state
        })
        .collect()
}

fn state_fluent_hash_key(eval: &Evaluatable, state: &State) -> i64 {
    eval.state_fluent_hash_key_bases
        .iter()
        .map(|&(index, base)| state[index] as i64 * base)
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hashing::generate_hash_keys;
    use crate::logic::{Expr, Expression};
    use crate::task::{Cpf, RewardFunction};

    fn tabulated_task(formula: Expr) -> Task {
        let mut task = Task::new();
        let mut cpf = Cpf::new("p".to_string(), Task::BOOL_TYPE, 0.0, 2, formula);
        cpf.set_domain(2);
        cpf.eval.refresh_info();
        task.cpfs = vec![cpf];
        task.reward = Some(RewardFunction::new(Expression::state_fluent(0)));
        task.reward_mut().eval.refresh_info();
        let mut noop = ActionState::new(0);
        noop.index = 0;
        task.action_states = vec![noop];
        crate::determinize::determinize(&mut task).unwrap();
        generate_hash_keys(&mut task);
        task
    }

    #[test]
    fn negation_cpf_tabulates_both_entries() {
        let mut task = tabulated_task(Expr::new(Expression::Negation(
            Expression::state_fluent(0),
        )));
        precompute(&mut task);
        assert_eq!(task.cpfs[0].eval.precomputed, vec![Some(1.0), Some(0.0)]);
        // The reward is the fluent itself.
        assert_eq!(
            task.reward().eval.precomputed,
            vec![Some(0.0), Some(1.0)]
        );
    }

    #[test]
    fn probabilistic_cpf_tabulates_value_and_distribution() {
        let mut task = tabulated_task(Expr::new(Expression::Bernoulli(
            Expression::constant(0.7),
        )));
        precompute(&mut task);
        let eval = &task.cpfs[0].eval;
        // No state dependencies: a single entry.
        assert_eq!(eval.precomputed, vec![Some(1.0)]);
        let pd = eval.precomputed_pd[0].as_ref().unwrap();
        assert!(crate::math::eq(pd.truth_probability(), 0.7));
    }
}
