//! Synthesis of finite-domain action variables from mutex groups.
//!
//! The mutex relation is partitioned greedily: walk the variables in index
//! order, open a partition with the first unassigned one and extend it by
//! any unassigned variable that is mutex with everything already inside.
//! Every partition of size > 1 becomes a fresh action variable over a
//! fresh value type, with a `none-of-those` sentinel at index 0 and one
//! value per original variable.

use log::{debug, info};

use crate::error::Result;
use crate::logic::{Expr, Expression, Replacements};
use crate::mutex::TaskMutexInfo;
use crate::task::{ActionFluentData, Task};

/// Rewrites the action-variable layout according to the mutex information.
/// Returns true if at least one finite-domain variable was synthesized; the
/// replacements map receives one entry per old action variable.
pub fn generate_fdr_vars(
    task: &mut Task,
    mutexes: &TaskMutexInfo,
    replacements: &mut Replacements,
) -> Result<bool> {
    let partitions = partition_vars(task, mutexes);
    let mut new_fluents: Vec<ActionFluentData> = Vec::with_capacity(partitions.len());
    let mut synthesized = false;

    for partition in partitions {
        let new_index = new_fluents.len();
        if partition.len() == 1 {
            let old_index = partition[0];
            replacements
                .action
                .insert(old_index, Expression::action_fluent(new_index));
            new_fluents.push(std::mem::replace(
                &mut task.action_fluents[old_index],
                ActionFluentData {
                    name: String::new(),
                    value_type: 0,
                    is_fdr: false,
                },
            ));
            continue;
        }

        synthesized = true;
        let counter = task.num_fdr_action_vars;
        task.num_fdr_action_vars += 1;
        let type_name = format!("FDR-action-var-type-{}", counter);
        let var_name = format!("FDR-action-var-{}", counter);
        task.add_type(&type_name, None)?;
        task.add_object(&type_name, &format!("none-of-those-{}", counter))?;

        info!(
            "combining {} mutex action variables into {}",
            partition.len(),
            var_name
        );
        for (offset, &old_index) in partition.iter().enumerate() {
            let value_name = task.action_fluents[old_index].name.replace(' ', "~");
            task.add_object(&type_name, &value_name)?;
            debug!(
                "  {} becomes {} = {}",
                task.action_fluents[old_index].name,
                var_name,
                offset + 1
            );
            replacements.action.insert(
                old_index,
                Expr::new(Expression::Equals(vec![
                    Expression::action_fluent(new_index),
                    Expression::constant((offset + 1) as f64),
                ])),
            );
        }
        new_fluents.push(ActionFluentData {
            name: var_name,
            value_type: task.type_id(&type_name)?,
            is_fdr: true,
        });
    }

    task.action_fluents = new_fluents;
    Ok(synthesized)
}

/// Greedy partitioning of the action variables along the mutex relation,
/// in ascending index order.
fn partition_vars(task: &Task, mutexes: &TaskMutexInfo) -> Vec<Vec<usize>> {
    let num_action_vars = task.action_fluents.len();
    let mut served = vec![false; num_action_vars];
    let mut partitions = Vec::new();

    for var in 0..num_action_vars {
        if served[var] {
            continue;
        }
        served[var] = true;
        let mut partition = vec![var];

        for &candidate in mutexes.mutexes_of(var) {
            if served[candidate] {
                continue;
            }
            debug_assert!(candidate > var);
            if partition
                .iter()
                .all(|&member| mutexes.is_mutex(candidate, member))
            {
                served[candidate] = true;
                partition.push(candidate);
            }
        }
        partitions.push(partition);
    }
    partitions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::VariableKind;

    fn task_with_action_vars(names: &[&str]) -> Task {
        let mut task = Task::new();
        for name in names {
            task.add_schema(crate::task::VariableSchema {
                name: name.to_string(),
                param_types: Vec::new(),
                kind: VariableKind::ActionFluent,
                value_type: Task::BOOL_TYPE,
                default_value: 0.0,
            })
            .unwrap();
            task.action_fluents.push(ActionFluentData {
                name: name.to_string(),
                value_type: Task::BOOL_TYPE,
                is_fdr: false,
            });
        }
        task
    }

    #[test]
    fn mutex_pair_becomes_one_variable_with_sentinel() {
        let mut task = task_with_action_vars(&["a", "b"]);
        let mut mutexes = TaskMutexInfo::new(2);
        mutexes.vars_are_mutex(0, 1);
        let mut replacements = Replacements::default();
        assert!(generate_fdr_vars(&mut task, &mutexes, &mut replacements).unwrap());

        assert_eq!(task.action_fluents.len(), 1);
        assert!(task.action_fluents[0].is_fdr);
        assert_eq!(task.action_fluent_domain_size(0), 3);
        // Both old variables are rewritten to equality checks.
        assert!(matches!(
            &*replacements.action[&0],
            Expression::Equals(_)
        ));
        assert!(matches!(
            &*replacements.action[&1],
            Expression::Equals(_)
        ));
    }

    #[test]
    fn partitioning_is_greedy_over_the_mutex_graph() {
        let mut task = task_with_action_vars(&["a", "b", "c", "d"]);
        // a-b, a-c, b-c mutually mutex; d mutex only with a.
        let mut mutexes = TaskMutexInfo::new(4);
        mutexes.vars_are_mutex(0, 1);
        mutexes.vars_are_mutex(0, 2);
        mutexes.vars_are_mutex(1, 2);
        mutexes.vars_are_mutex(0, 3);
        let mut replacements = Replacements::default();
        assert!(generate_fdr_vars(&mut task, &mutexes, &mut replacements).unwrap());

        // {a, b, c} combine, d stays on its own.
        assert_eq!(task.action_fluents.len(), 2);
        assert!(task.action_fluents[0].is_fdr);
        assert_eq!(task.action_fluent_domain_size(0), 4);
        assert_eq!(task.action_fluents[1].name, "d");
        assert!(matches!(
            &*replacements.action[&3],
            Expression::ActionFluent(1)
        ));
    }

    #[test]
    fn no_mutexes_leave_the_layout_alone() {
        let mut task = task_with_action_vars(&["a", "b"]);
        let mutexes = TaskMutexInfo::new(2);
        let mut replacements = Replacements::default();
        assert!(!generate_fdr_vars(&mut task, &mutexes, &mut replacements).unwrap());
        assert_eq!(task.action_fluents.len(), 2);
        assert!(!task.action_fluents[0].is_fdr);
    }
}
