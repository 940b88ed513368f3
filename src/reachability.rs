//! Minkowski reachability: a step-bounded fixed point that overapproximates
//! the set of values every state variable can take within the horizon.
//!
//! Each step applies every CPF to the current value sets. To keep the
//! number of applications small, the action states are partitioned per CPF
//! into classes that agree on all action variables the CPF depends on, and
//! only one representative per class is applied.

use std::collections::HashMap;

use log::trace;
use tinyvec::TinyVec;

use crate::logic::domains::calculate_domain;
use crate::logic::ValueSet;
use crate::task::Task;

pub struct MinkowskiReachabilityAnalyser<'a> {
    task: &'a Task,
    step: usize,
    representatives_by_cpf: Vec<Vec<usize>>,
}

impl<'a> MinkowskiReachabilityAnalyser<'a> {
    pub fn new(task: &'a Task) -> Self {
        let representatives_by_cpf = task
            .cpfs
            .iter()
            .map(|cpf| {
                if cpf.eval.is_action_independent() {
                    return vec![0];
                }
                // One representative per assignment to the dependent
                // action variables, keeping the first action of each class.
                let mut seen: HashMap<TinyVec<[usize; 8]>, usize> = HashMap::new();
                let mut representatives = Vec::new();
                for action in &task.action_states {
                    let signature: TinyVec<[usize; 8]> = cpf
                        .eval
                        .info
                        .action_deps
                        .iter()
                        .map(|&dep| action.values[dep])
                        .collect();
                    if seen.insert(signature, action.index).is_none() {
                        representatives.push(action.index);
                    }
                }
                representatives
            })
            .collect();
        Self {
            task,
            step: 0,
            representatives_by_cpf,
        }
    }

    /// The step in which the fixed point was reached (the last step that
    /// added a value is this minus one).
    pub fn num_simulation_steps(&self) -> usize {
        self.step
    }

    pub fn determine_reachable_facts(&mut self) -> Vec<ValueSet> {
        let num_cpfs = self.task.cpfs.len();
        let mut domains: Vec<ValueSet> = self
            .task
            .cpfs
            .iter()
            .map(|cpf| ValueSet::singleton(cpf.initial_value))
            .collect();

        self.step = 0;
        let mut fixed_point_reached = false;
        while self.step < self.task.horizon && !fixed_point_reached {
            self.step += 1;
            fixed_point_reached = true;
            let reached = self.perform_step(&domains);
            for index in 0..num_cpfs {
                if !domains[index].is_superset(&reached[index]) {
                    domains[index].extend_from(&reached[index]);
                    fixed_point_reached = false;
                }
            }
            trace!("reachability step {} done", self.step);
        }
        domains
    }

    fn perform_step(&self, domains: &[ValueSet]) -> Vec<ValueSet> {
        self.task
            .cpfs
            .iter()
            .enumerate()
            .map(|(index, cpf)| {
                if domains[index].len() == cpf.max_domain_size {
                    // Saturated; nothing new can be reached.
                    return ValueSet::new();
                }
                let mut reached = ValueSet::new();
                for &action_index in &self.representatives_by_cpf[index] {
                    let action = &self.task.action_states[action_index];
                    let by_action = calculate_domain(&cpf.eval.formula, domains, action);
                    debug_assert!(!by_action.is_empty());
                    reached.extend_from(&by_action);
                }
                reached
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::{Expr, Expression};
    use crate::task::{ActionState, Cpf, Task};

    fn boolean_cpf(name: &str, initial: f64, formula: Expr) -> Cpf {
        let mut cpf = Cpf::new(name.to_string(), Task::BOOL_TYPE, initial, 2, formula);
        cpf.eval.refresh_info();
        cpf
    }

    fn noop_task(cpfs: Vec<Cpf>, horizon: usize) -> Task {
        let mut task = Task::new();
        task.horizon = horizon;
        task.cpfs = cpfs;
        let mut noop = ActionState::new(0);
        noop.index = 0;
        task.action_states = vec![noop];
        task
    }

    #[test]
    fn chained_fluents_reach_the_fixed_point_stepwise() {
        // a' = b, b' = c, c' = Bernoulli(0.5), all initially 0.
        let task = noop_task(
            vec![
                boolean_cpf("a", 0.0, Expression::state_fluent(1)),
                boolean_cpf("b", 0.0, Expression::state_fluent(2)),
                boolean_cpf(
                    "c",
                    0.0,
                    Expr::new(Expression::Bernoulli(Expression::constant(0.5))),
                ),
            ],
            10,
        );
        let mut analyser = MinkowskiReachabilityAnalyser::new(&task);
        let domains = analyser.determine_reachable_facts();
        for domain in &domains {
            assert_eq!(domain.len(), 2);
        }
        assert_eq!(analyser.num_simulation_steps(), 4);
    }

    #[test]
    fn horizon_bounds_the_iteration() {
        let task = noop_task(
            vec![
                boolean_cpf("a", 0.0, Expression::state_fluent(1)),
                boolean_cpf("b", 0.0, Expression::state_fluent(2)),
                boolean_cpf("c", 0.0, Expression::truth()),
            ],
            1,
        );
        let mut analyser = MinkowskiReachabilityAnalyser::new(&task);
        let domains = analyser.determine_reachable_facts();
        // Only one step: c reaches {0,1}, a and b stay at {0}.
        assert_eq!(domains[2].len(), 2);
        assert_eq!(domains[0].len(), 1);
        assert_eq!(domains[1].len(), 1);
    }
}
