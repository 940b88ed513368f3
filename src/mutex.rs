//! Pairwise mutex detection for action variables.
//!
//! Two action variables are mutex if no applicable joint action activates
//! both. With a concurrency bound of one every pair is trivially mutex;
//! with unbounded concurrency and no constraints none are. In all other
//! cases each candidate pair is checked with a satisfiability query against
//! the constraint model; a query the solver cannot decide within its budget
//! conservatively counts as "not mutex".

use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use log::{debug, warn};
use z3::ast::{Ast, Int};

use crate::csp::{solver_context, TaskCsp};
use crate::task::Task;

/// The mutex relation over action variables, kept symmetric.
#[derive(Debug, Clone)]
pub struct TaskMutexInfo {
    mutex: Vec<BTreeSet<usize>>,
}

impl TaskMutexInfo {
    pub fn new(num_action_vars: usize) -> Self {
        Self {
            mutex: vec![BTreeSet::new(); num_action_vars],
        }
    }

    pub fn vars_are_mutex(&mut self, lhs: usize, rhs: usize) {
        debug_assert_ne!(lhs, rhs);
        self.mutex[lhs].insert(rhs);
        self.mutex[rhs].insert(lhs);
    }

    pub fn has_mutex(&self) -> bool {
        self.mutex.iter().any(|set| !set.is_empty())
    }

    pub fn mutexes_of(&self, var: usize) -> &BTreeSet<usize> {
        &self.mutex[var]
    }

    pub fn is_mutex(&self, lhs: usize, rhs: usize) -> bool {
        self.mutex[lhs].contains(&rhs)
    }
}

pub fn compute_action_var_mutexes(
    task: &Task,
    budget: Duration,
    query_timeout_ms: u32,
) -> TaskMutexInfo {
    let num_action_vars = task.action_fluents.len();
    let mut result = TaskMutexInfo::new(num_action_vars);

    // Pairs are only interesting between binary variables that are not
    // already in finite-domain representation.
    let candidates: Vec<usize> = (0..num_action_vars)
        .filter(|&index| {
            !task.action_fluents[index].is_fdr && task.action_fluent_domain_size(index) == 2
        })
        .collect();
    if candidates.len() < 2 {
        return result;
    }

    let concurrent = task.max_concurrent_actions > 1;
    if concurrent && task.sacs.is_empty() {
        // Nothing constrains concurrent applicability.
        return result;
    }

    if !concurrent {
        for (position, &lhs) in candidates.iter().enumerate() {
            for &rhs in &candidates[position + 1..] {
                result.vars_are_mutex(lhs, rhs);
            }
        }
        return result;
    }

    let ctx = solver_context(query_timeout_ms);
    let mut csp = TaskCsp::new(&ctx, task, query_timeout_ms);
    csp.add_preconditions(task);

    let start = Instant::now();
    'outer: for (position, &lhs) in candidates.iter().enumerate() {
        for &rhs in &candidates[position + 1..] {
            if start.elapsed() > budget {
                warn!("mutex detection stopped early, keeping partial results");
                break 'outer;
            }
            csp.push();
            let one = Int::from_i64(csp.context(), 1);
            csp.assert(&csp.action_var(lhs)._eq(&one));
            csp.assert(&csp.action_var(rhs)._eq(&one));
            if csp.has_solution() == Some(false) {
                debug!(
                    "action variables {} and {} are mutex",
                    task.action_fluents[lhs].name, task.action_fluents[rhs].name
                );
                result.vars_are_mutex(lhs, rhs);
            }
            csp.pop();
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::{Expr, Expression};
    use crate::task::{ActionFluentData, Task};

    fn task_with_binary_action_vars(count: usize) -> Task {
        let mut task = Task::new();
        for index in 0..count {
            task.action_fluents.push(ActionFluentData {
                name: format!("a{}", index),
                value_type: Task::BOOL_TYPE,
                is_fdr: false,
            });
        }
        task
    }

    #[test]
    fn single_action_concurrency_makes_every_pair_mutex() {
        let mut task = task_with_binary_action_vars(3);
        task.max_concurrent_actions = 1;
        let mutexes =
            compute_action_var_mutexes(&task, Duration::from_secs(1), 100);
        assert!(mutexes.has_mutex());
        for lhs in 0..3 {
            for rhs in 0..3 {
                assert_eq!(mutexes.is_mutex(lhs, rhs), lhs != rhs);
            }
        }
    }

    #[test]
    fn unconstrained_concurrency_has_no_mutexes() {
        let mut task = task_with_binary_action_vars(3);
        task.max_concurrent_actions = 3;
        let mutexes =
            compute_action_var_mutexes(&task, Duration::from_secs(1), 100);
        assert!(!mutexes.has_mutex());
    }

    #[test]
    fn single_action_variable_has_nothing_to_pair() {
        let mut task = task_with_binary_action_vars(1);
        task.max_concurrent_actions = 1;
        let mutexes =
            compute_action_var_mutexes(&task, Duration::from_secs(1), 100);
        assert!(!mutexes.has_mutex());
    }

    #[test]
    fn preconditions_enable_solver_backed_detection() {
        // a and b cannot fire together; c is free.
        let mut task = task_with_binary_action_vars(3);
        task.max_concurrent_actions = 3;
        task.sacs = vec![Expr::new(Expression::Negation(Expr::new(
            Expression::Conjunction(vec![
                Expression::action_fluent(0),
                Expression::action_fluent(1),
            ]),
        )))];
        let mutexes =
            compute_action_var_mutexes(&task, Duration::from_secs(5), 1000);
        assert!(mutexes.is_mutex(0, 1));
        assert!(!mutexes.is_mutex(0, 2));
        assert!(!mutexes.is_mutex(1, 2));
    }
}
