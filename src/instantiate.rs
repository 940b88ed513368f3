//! The instantiator: grounds schematic variables, CPFs, the reward and the
//! state-action constraints over the finite typed object universes, and
//! recognizes constraints that only bound the number of concurrently
//! applicable actions.

use std::collections::HashMap;

use itertools::Itertools;
use log::{debug, info};

use crate::error::{CompileError, Result};
use crate::logic::instantiate::{instantiate as instantiate_formula, replace_quantifier, Bindings, GroundTables};
use crate::logic::{Expr, Expression};
use crate::task::{ground_name, ActionFluentData, Cpf, RewardFunction, Task, VariableKind};

pub fn instantiate(task: &mut Task) -> Result<()> {
    info!("Instantiating variables");
    let tables = instantiate_variables(task)?;
    info!("Instantiating CPFs");
    instantiate_cpfs(task, &tables)?;
    info!("Instantiating preconditions");
    instantiate_preconditions(task, &tables)?;
    Ok(())
}

struct GroundStateFluent {
    name: String,
    schema: usize,
    initial_value: f64,
}

/// Creates one grounded variable per parameter combination of every schema
/// and returns the lookup tables formulas are resolved against. Grounded
/// variables are ordered by full name; their position is their index.
fn instantiate_variables(task: &mut Task) -> Result<GroundTables> {
    let mut state_fluents: Vec<GroundStateFluent> = Vec::new();
    let mut action_fluents: Vec<ActionFluentData> = Vec::new();
    let mut tables = GroundTables::default();
    let mut bound_initials: HashMap<String, bool> =
        task.initial_values.keys().map(|k| (k.clone(), false)).collect();
    let mut bound_non_fluents: HashMap<String, bool> =
        task.non_fluent_values.keys().map(|k| (k.clone(), false)).collect();

    for (schema_id, schema) in task.schemas.iter().enumerate() {
        if schema.kind == VariableKind::IntermFluent {
            return Err(CompileError::Unsupported(format!(
                "interm-fluent {}",
                schema.name
            )));
        }
        for combination in object_combinations(task, &schema.param_types) {
            let object_names: Vec<&str> = combination
                .iter()
                .map(|&object| task.objects[object].name.as_str())
                .collect();
            let name = ground_name(&schema.name, &object_names);
            match schema.kind {
                VariableKind::StateFluent => {
                    let initial_value = match task.initial_values.get(&name) {
                        Some(&value) => {
                            bound_initials.insert(name.clone(), true);
                            value
                        }
                        None => schema.default_value,
                    };
                    state_fluents.push(GroundStateFluent {
                        name,
                        schema: schema_id,
                        initial_value,
                    });
                }
                VariableKind::ActionFluent => {
                    action_fluents.push(ActionFluentData {
                        name,
                        value_type: schema.value_type,
                        is_fdr: false,
                    });
                }
                VariableKind::NonFluent => {
                    let value = match task.non_fluent_values.get(&name) {
                        Some(&value) => {
                            bound_non_fluents.insert(name.clone(), true);
                            value
                        }
                        None => schema.default_value,
                    };
                    tables.non_fluents.insert(name, value);
                }
                VariableKind::IntermFluent => unreachable!(),
            }
        }
    }

    // An instance binding that grounds no declared variable is a typo.
    for (name, bound) in bound_initials.iter().chain(&bound_non_fluents) {
        if !bound {
            return Err(CompileError::UndefinedVariable(name.clone()));
        }
    }

    state_fluents.sort_by(|lhs, rhs| lhs.name.cmp(&rhs.name));
    action_fluents.sort_by(|lhs, rhs| lhs.name.cmp(&rhs.name));
    for (index, fluent) in state_fluents.iter().enumerate() {
        tables.state_fluents.insert(fluent.name.clone(), index);
    }
    for (index, fluent) in action_fluents.iter().enumerate() {
        tables.action_fluents.insert(fluent.name.clone(), index);
    }
    debug!(
        "grounded {} state fluents, {} action fluents, {} non-fluents",
        state_fluents.len(),
        action_fluents.len(),
        tables.non_fluents.len()
    );

    task.action_fluents = action_fluents;

    // CPFs are created in state-fluent order; until their formulas are
    // instantiated they carry a placeholder body.
    let cpfs: Vec<Cpf> = state_fluents
        .into_iter()
        .map(|fluent| {
            let schema = &task.schemas[fluent.schema];
            Cpf::new(
                fluent.name,
                schema.value_type,
                fluent.initial_value,
                task.types[schema.value_type].objects.len(),
                Expression::falsity(),
            )
        })
        .collect();
    task.cpfs = cpfs;
    Ok(tables)
}

fn instantiate_cpfs(task: &mut Task, tables: &GroundTables) -> Result<()> {
    let mut formulas: Vec<Option<Expr>> = vec![None; task.cpfs.len()];

    for definition in &task.cpf_definitions {
        let schema = &task.schemas[definition.schema];
        if schema.kind != VariableKind::StateFluent {
            return Err(CompileError::Unsupported(format!(
                "CPF head {} is not a state fluent",
                schema.name
            )));
        }
        if definition.param_names.len() != schema.param_types.len() {
            return Err(CompileError::WrongParameterArity(schema.name.clone()));
        }
        let formula = replace_quantifier(&definition.formula, &Bindings::new(), task);

        for combination in object_combinations(task, &schema.param_types) {
            let object_names: Vec<&str> = combination
                .iter()
                .map(|&object| task.objects[object].name.as_str())
                .collect();
            let head = ground_name(&schema.name, &object_names);
            let index = tables.state_fluents[&head];

            let bindings: Bindings = definition
                .param_names
                .iter()
                .cloned()
                .zip(combination)
                .collect();
            let grounded = instantiate_formula(&formula, task, tables, &bindings)?;
            if formulas[index].is_some() {
                return Err(CompileError::DuplicateCpf(head));
            }
            formulas[index] = Some(grounded);
        }
    }

    for (index, formula) in formulas.into_iter().enumerate() {
        match formula {
            Some(formula) => {
                task.cpfs[index].eval.formula = formula;
                task.cpfs[index].eval.refresh_info();
            }
            None => {
                return Err(CompileError::MissingCpf(task.cpfs[index].head_name.clone()))
            }
        }
    }

    let reward_definition = task
        .reward_definition
        .clone()
        .ok_or(CompileError::UndefinedVariable("reward".to_string()))?;
    let reward = replace_quantifier(&reward_definition, &Bindings::new(), task);
    let reward = instantiate_formula(&reward, task, tables, &Bindings::new())?;
    task.reward = Some(RewardFunction::new(reward));
    Ok(())
}

fn instantiate_preconditions(task: &mut Task, tables: &GroundTables) -> Result<()> {
    let mut grounded = Vec::with_capacity(task.constraint_definitions.len());
    for definition in &task.constraint_definitions {
        let formula = replace_quantifier(definition, &Bindings::new(), task);
        grounded.push(instantiate_formula(&formula, task, tables, &Bindings::new())?);
    }

    // Constraints that only bound the number of concurrently active action
    // fluents become the task's concurrency bound instead of preconditions.
    let mut kept = Vec::with_capacity(grounded.len());
    for formula in grounded {
        match concurrency_bound(&formula, task.action_fluents.len()) {
            Some(bound) => {
                debug!("recognized concurrency bound {}", bound);
                task.max_concurrent_actions = bound;
            }
            None => kept.push(formula),
        }
    }
    task.sacs = kept;
    Ok(())
}

/// Matches `sum(a_1, ..., a_n) <= k` and the three equivalent comparison
/// shapes, where the sum ranges over the entire action-fluent vector.
fn concurrency_bound(formula: &Expr, num_action_fluents: usize) -> Option<usize> {
    let (addition, bound) = match &**formula {
        Expression::LowerEqual(exprs) if exprs.len() == 2 => {
            (&exprs[0], exprs[1].as_constant()? as i64)
        }
        Expression::GreaterEqual(exprs) if exprs.len() == 2 => {
            (&exprs[1], exprs[0].as_constant()? as i64)
        }
        Expression::Lower(exprs) if exprs.len() == 2 => {
            (&exprs[0], exprs[1].as_constant()? as i64 - 1)
        }
        Expression::Greater(exprs) if exprs.len() == 2 => {
            (&exprs[1], exprs[0].as_constant()? as i64 - 1)
        }
        _ => return None,
    };
    if bound < 1 || !is_sum_over_all_action_fluents(addition, num_action_fluents) {
        return None;
    }
    Some(bound as usize)
}

fn is_sum_over_all_action_fluents(expr: &Expr, num_action_fluents: usize) -> bool {
    let exprs = match &**expr {
        Expression::Addition(exprs) => exprs,
        _ => return false,
    };
    if exprs.len() != num_action_fluents {
        return false;
    }
    let mut used = vec![false; num_action_fluents];
    for expr in exprs {
        match &**expr {
            Expression::ActionFluent(index) if !used[*index] => used[*index] = true,
            _ => return false,
        }
    }
    true
}

/// The cartesian product of the object universes of the given parameter
/// types; a single empty combination for parameterless schemas.
fn object_combinations(task: &Task, param_types: &[usize]) -> Vec<Vec<usize>> {
    if param_types.is_empty() {
        return vec![Vec::new()];
    }
    param_types
        .iter()
        .map(|&type_id| task.types[type_id].objects.clone())
        .multi_cartesian_product()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser;

    fn grounded_task(domain: &str, instance: &str) -> Task {
        let mut task = Task::new();
        parser::parse_domain(domain, &mut task).unwrap();
        parser::parse_instance(instance, &mut task).unwrap();
        instantiate(&mut task).unwrap();
        task
    }

    #[test]
    fn grounding_orders_fluents_by_name() {
        let task = grounded_task(
            "domain d {
                types { obj; }
                pvariables {
                    p(obj) : {state-fluent, bool, default = false};
                    act(obj) : {action-fluent, bool, default = false};
                }
                cpfs { p'(?o) = p(?o) | act(?o); }
                reward = sum_{?o : obj} [p(?o)];
            }",
            "instance i {
                domain = d;
                objects { obj : {b, a}; }
                init-state { p(a); }
                horizon = 5;
            }",
        );
        assert_eq!(task.cpfs.len(), 2);
        assert_eq!(task.cpfs[0].head_name, "p(a)");
        assert_eq!(task.cpfs[1].head_name, "p(b)");
        assert_eq!(task.cpfs[0].initial_value, 1.0);
        assert_eq!(task.cpfs[1].initial_value, 0.0);
        assert_eq!(task.action_fluents[0].name, "act(a)");
        // Quantifier-free and fully grounded.
        assert!(task.reward().eval.formula.to_string().contains("$s(0)"));
    }

    #[test]
    fn concurrency_constraint_becomes_the_bound() {
        let task = grounded_task(
            "domain d {
                types { obj; }
                pvariables {
                    p : {state-fluent, bool, default = false};
                    act(obj) : {action-fluent, bool, default = false};
                }
                cpfs { p' = exists_{?o : obj} [act(?o)]; }
                reward = p;
                constraints { (sum_{?o : obj} [act(?o)]) <= 2; }
            }",
            "instance i { domain = d; objects { obj : {a, b, c}; } horizon = 3; }",
        );
        assert_eq!(task.max_concurrent_actions, 2);
        assert!(task.sacs.is_empty());
    }

    #[test]
    fn non_fluents_fold_into_constants() {
        let task = grounded_task(
            "domain d {
                types { obj; }
                pvariables {
                    p(obj) : {state-fluent, bool, default = false};
                    weight(obj) : {non-fluent, real, default = 1.5};
                }
                cpfs { p'(?o) = p(?o); }
                reward = sum_{?o : obj} [weight(?o) * p(?o)];
            }",
            "instance i {
                domain = d;
                objects { obj : {a, b}; }
                non-fluents { weight(a) = 2.5; }
                horizon = 3;
            }",
        );
        let reward = task.reward().eval.formula.to_string();
        assert!(reward.contains("$c(2.5)"));
        assert!(reward.contains("$c(1.5)"));
    }

    #[test]
    fn unknown_initial_binding_aborts() {
        let mut task = Task::new();
        parser::parse_domain(
            "domain d {
                pvariables { p : {state-fluent, bool, default = false}; }
                cpfs { p' = p; }
                reward = p;
            }",
            &mut task,
        )
        .unwrap();
        parser::parse_instance(
            "instance i { domain = d; init-state { q; } horizon = 2; }",
            &mut task,
        )
        .unwrap();
        assert!(matches!(
            instantiate(&mut task),
            Err(CompileError::UndefinedVariable(_))
        ));
    }
}
