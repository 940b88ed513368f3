//! Quantifier elimination and grounding of schematic formulas.
//!
//! `replace_quantifier` expands quantifiers over the finite object universes
//! of their binder types and replaces bound parameters by objects.
//! `instantiate` then resolves the remaining schematic variable references
//! against the grounded symbol tables. After both passes a formula contains
//! no schematic node.

use std::collections::HashMap;

use itertools::Itertools;

use crate::error::{CompileError, Result};
use crate::task::{ground_name, Task, VariableKind};

use super::{Expr, Expression, QuantifierKind};

/// Parameter bindings: parameter name to object id.
pub type Bindings = HashMap<String, usize>;

/// Grounded symbol tables the instantiator resolves variable references
/// against.
#[derive(Debug, Default)]
pub struct GroundTables {
    /// Full name to state fluent index (the CPF position).
    pub state_fluents: HashMap<String, usize>,
    /// Full name to action fluent index.
    pub action_fluents: HashMap<String, usize>,
    /// Full name to the constant bound by the instance.
    pub non_fluents: HashMap<String, f64>,
}

pub fn replace_quantifier(expr: &Expr, bindings: &Bindings, task: &Task) -> Expr {
    match &**expr {
        Expression::Parameter(name) => match bindings.get(name) {
            Some(&object) => Expr::new(Expression::Object(object)),
            None => Expr::clone(expr),
        },
        Expression::Object(_)
        | Expression::Constant(_)
        | Expression::StateFluent(_)
        | Expression::ActionFluent(_) => Expr::clone(expr),

        Expression::Variable { schema, params } => Expr::new(Expression::Variable {
            schema: *schema,
            params: params
                .iter()
                .map(|param| replace_quantifier(param, bindings, task))
                .collect(),
        }),

        Expression::Quantifier { kind, params, body } => {
            expand_quantifier(*kind, params, body, bindings, task)
        }

        Expression::Conjunction(exprs) => {
            Expr::new(Expression::Conjunction(replace_all(exprs, bindings, task)))
        }
        Expression::Disjunction(exprs) => {
            Expr::new(Expression::Disjunction(replace_all(exprs, bindings, task)))
        }
        Expression::Equals(exprs) => {
            Expr::new(Expression::Equals(replace_all(exprs, bindings, task)))
        }
        Expression::Greater(exprs) => {
            Expr::new(Expression::Greater(replace_all(exprs, bindings, task)))
        }
        Expression::Lower(exprs) => {
            Expr::new(Expression::Lower(replace_all(exprs, bindings, task)))
        }
        Expression::GreaterEqual(exprs) => {
            Expr::new(Expression::GreaterEqual(replace_all(exprs, bindings, task)))
        }
        Expression::LowerEqual(exprs) => {
            Expr::new(Expression::LowerEqual(replace_all(exprs, bindings, task)))
        }
        Expression::Addition(exprs) => {
            Expr::new(Expression::Addition(replace_all(exprs, bindings, task)))
        }
        Expression::Subtraction(exprs) => {
            Expr::new(Expression::Subtraction(replace_all(exprs, bindings, task)))
        }
        Expression::Multiplication(exprs) => Expr::new(Expression::Multiplication(replace_all(
            exprs, bindings, task,
        ))),
        Expression::Division(exprs) => {
            Expr::new(Expression::Division(replace_all(exprs, bindings, task)))
        }

        Expression::Negation(inner) => Expr::new(Expression::Negation(replace_quantifier(
            inner, bindings, task,
        ))),
        Expression::Exponential(inner) => Expr::new(Expression::Exponential(replace_quantifier(
            inner, bindings, task,
        ))),
        Expression::Bernoulli(probability) => Expr::new(Expression::Bernoulli(
            replace_quantifier(probability, bindings, task),
        )),
        Expression::Discrete {
            values,
            probabilities,
        } => Expr::new(Expression::Discrete {
            values: replace_all(values, bindings, task),
            probabilities: replace_all(probabilities, bindings, task),
        }),
        Expression::IfThenElse {
            condition,
            if_true,
            if_false,
        } => Expr::new(Expression::IfThenElse {
            condition: replace_quantifier(condition, bindings, task),
            if_true: replace_quantifier(if_true, bindings, task),
            if_false: replace_quantifier(if_false, bindings, task),
        }),
        Expression::MultiCondition {
            conditions,
            effects,
        } => Expr::new(Expression::MultiCondition {
            conditions: replace_all(conditions, bindings, task),
            effects: replace_all(effects, bindings, task),
        }),
    }
}

fn replace_all(exprs: &[Expr], bindings: &Bindings, task: &Task) -> Vec<Expr> {
    exprs
        .iter()
        .map(|expr| replace_quantifier(expr, bindings, task))
        .collect()
}

fn expand_quantifier(
    kind: QuantifierKind,
    params: &[(String, usize)],
    body: &Expr,
    bindings: &Bindings,
    task: &Task,
) -> Expr {
    let universes: Vec<Vec<usize>> = params
        .iter()
        .map(|(_, type_id)| task.types[*type_id].objects.clone())
        .collect();

    let mut instances = Vec::new();
    for combination in universes.into_iter().multi_cartesian_product() {
        // The bindings are copied per instance so the binder names shadow
        // the enclosing scope without leaking out of the body.
        let mut inner_bindings = bindings.clone();
        for ((name, _), object) in params.iter().zip(combination) {
            inner_bindings.insert(name.clone(), object);
        }
        instances.push(replace_quantifier(body, &inner_bindings, task));
    }

    match kind {
        QuantifierKind::Sum => Expr::new(Expression::Addition(instances)),
        QuantifierKind::Product => Expr::new(Expression::Multiplication(instances)),
        QuantifierKind::Forall => Expr::new(Expression::Conjunction(instances)),
        QuantifierKind::Exists => Expr::new(Expression::Disjunction(instances)),
    }
}

pub fn instantiate(
    expr: &Expr,
    task: &Task,
    tables: &GroundTables,
    bindings: &Bindings,
) -> Result<Expr> {
    match &**expr {
        Expression::Parameter(name) => {
            let object = bindings
                .get(name)
                .copied()
                .ok_or_else(|| CompileError::UndefinedVariable(name.clone()))?;
            Ok(Expression::constant(task.objects[object].value))
        }
        Expression::Object(object) => Ok(Expression::constant(task.objects[*object].value)),
        Expression::Constant(_)
        | Expression::StateFluent(_)
        | Expression::ActionFluent(_) => Ok(Expr::clone(expr)),

        Expression::Variable { schema, params } => {
            instantiate_variable(*schema, params, task, tables, bindings)
        }

        Expression::Quantifier { .. } => unreachable!(
            "instantiate applied to a formula with quantifiers; \
             replace_quantifier must run first"
        ),

        Expression::Conjunction(exprs) => Ok(Expr::new(Expression::Conjunction(
            instantiate_all(exprs, task, tables, bindings)?,
        ))),
        Expression::Disjunction(exprs) => Ok(Expr::new(Expression::Disjunction(
            instantiate_all(exprs, task, tables, bindings)?,
        ))),
        Expression::Equals(exprs) => Ok(Expr::new(Expression::Equals(instantiate_all(
            exprs, task, tables, bindings,
        )?))),
        Expression::Greater(exprs) => Ok(Expr::new(Expression::Greater(instantiate_all(
            exprs, task, tables, bindings,
        )?))),
        Expression::Lower(exprs) => Ok(Expr::new(Expression::Lower(instantiate_all(
            exprs, task, tables, bindings,
        )?))),
        Expression::GreaterEqual(exprs) => Ok(Expr::new(Expression::GreaterEqual(
            instantiate_all(exprs, task, tables, bindings)?,
        ))),
        Expression::LowerEqual(exprs) => Ok(Expr::new(Expression::LowerEqual(instantiate_all(
            exprs, task, tables, bindings,
        )?))),
        Expression::Addition(exprs) => Ok(Expr::new(Expression::Addition(instantiate_all(
            exprs, task, tables, bindings,
        )?))),
        Expression::Subtraction(exprs) => Ok(Expr::new(Expression::Subtraction(
            instantiate_all(exprs, task, tables, bindings)?,
        ))),
        Expression::Multiplication(exprs) => Ok(Expr::new(Expression::Multiplication(
            instantiate_all(exprs, task, tables, bindings)?,
        ))),
        Expression::Division(exprs) => Ok(Expr::new(Expression::Division(instantiate_all(
            exprs, task, tables, bindings,
        )?))),

        Expression::Negation(inner) => Ok(Expr::new(Expression::Negation(instantiate(
            inner, task, tables, bindings,
        )?))),
        Expression::Exponential(inner) => Ok(Expr::new(Expression::Exponential(instantiate(
            inner, task, tables, bindings,
        )?))),
        Expression::Bernoulli(probability) => Ok(Expr::new(Expression::Bernoulli(instantiate(
            probability,
            task,
            tables,
            bindings,
        )?))),
        Expression::Discrete {
            values,
            probabilities,
        } => Ok(Expr::new(Expression::Discrete {
            values: instantiate_all(values, task, tables, bindings)?,
            probabilities: instantiate_all(probabilities, task, tables, bindings)?,
        })),
        Expression::IfThenElse {
            condition,
            if_true,
            if_false,
        } => Ok(Expr::new(Expression::IfThenElse {
            condition: instantiate(condition, task, tables, bindings)?,
            if_true: instantiate(if_true, task, tables, bindings)?,
            if_false: instantiate(if_false, task, tables, bindings)?,
        })),
        Expression::MultiCondition {
            conditions,
            effects,
        } => Ok(Expr::new(Expression::MultiCondition {
            conditions: instantiate_all(conditions, task, tables, bindings)?,
            effects: instantiate_all(effects, task, tables, bindings)?,
        })),
    }
}

fn instantiate_all(
    exprs: &[Expr],
    task: &Task,
    tables: &GroundTables,
    bindings: &Bindings,
) -> Result<Vec<Expr>> {
    exprs
        .iter()
        .map(|expr| instantiate(expr, task, tables, bindings))
        .collect()
}

fn instantiate_variable(
    schema: usize,
    params: &[Expr],
    task: &Task,
    tables: &GroundTables,
    bindings: &Bindings,
) -> Result<Expr> {
    let schema_data = &task.schemas[schema];
    if params.len() != schema_data.param_types.len() {
        return Err(CompileError::WrongParameterArity(schema_data.name.clone()));
    }

    let mut object_names = Vec::with_capacity(params.len());
    for param in params {
        let object = match &**param {
            Expression::Object(object) => *object,
            Expression::Parameter(name) => bindings
                .get(name)
                .copied()
                .ok_or_else(|| CompileError::UndefinedVariable(name.clone()))?,
            other => unreachable!("unexpected variable parameter: {:?}", other),
        };
        object_names.push(task.objects[object].name.as_str());
    }
    let full_name = ground_name(&schema_data.name, &object_names);

    match schema_data.kind {
        VariableKind::StateFluent => tables
            .state_fluents
            .get(&full_name)
            .map(|&index| Expression::state_fluent(index))
            .ok_or(CompileError::UndefinedVariable(full_name)),
        VariableKind::ActionFluent => tables
            .action_fluents
            .get(&full_name)
            .map(|&index| Expression::action_fluent(index))
            .ok_or(CompileError::UndefinedVariable(full_name)),
        VariableKind::NonFluent => {
            let value = tables
                .non_fluents
                .get(&full_name)
                .copied()
                .unwrap_or(schema_data.default_value);
            Ok(Expression::constant(value))
        }
        VariableKind::IntermFluent => Err(CompileError::Unsupported(format!(
            "interm-fluent {} cannot be instantiated",
            schema_data.name
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::VariableSchema;

    fn fixture() -> (Task, GroundTables) {
        let mut task = Task::new();
        task.add_type("obj", None).unwrap();
        task.add_object("obj", "o1").unwrap();
        task.add_object("obj", "o2").unwrap();
        let obj = task.type_id("obj").unwrap();
        task.add_schema(VariableSchema {
            name: "p".to_string(),
            param_types: vec![obj],
            kind: VariableKind::StateFluent,
            value_type: Task::BOOL_TYPE,
            default_value: 0.0,
        })
        .unwrap();
        let mut tables = GroundTables::default();
        tables.state_fluents.insert("p(o1)".to_string(), 0);
        tables.state_fluents.insert("p(o2)".to_string(), 1);
        (task, tables)
    }

    #[test]
    fn quantifiers_expand_over_the_object_universe() {
        let (task, tables) = fixture();
        let schema = task.schema_id("p").unwrap();
        let body = Expr::new(Expression::Variable {
            schema,
            params: vec![Expr::new(Expression::Parameter("x".to_string()))],
        });
        let obj = task.type_id("obj").unwrap();
        let formula = Expr::new(Expression::Quantifier {
            kind: QuantifierKind::Exists,
            params: vec![("x".to_string(), obj)],
            body,
        });

        let expanded = replace_quantifier(&formula, &Bindings::new(), &task);
        let grounded = instantiate(&expanded, &task, &tables, &Bindings::new()).unwrap();
        match &*grounded {
            Expression::Disjunction(exprs) => {
                assert_eq!(exprs.len(), 2);
                assert_eq!(exprs[0], Expression::state_fluent(0));
                assert_eq!(exprs[1], Expression::state_fluent(1));
            }
            other => panic!("expected a disjunction, got {:?}", other),
        }
    }

    #[test]
    fn replace_quantifier_is_the_identity_on_quantifier_free_formulas() {
        let (task, tables) = fixture();
        let schema = task.schema_id("p").unwrap();
        let formula = Expr::new(Expression::Negation(Expr::new(Expression::Variable {
            schema,
            params: vec![Expr::new(Expression::Parameter("x".to_string()))],
        })));
        let bindings: Bindings = std::iter::once(("x".to_string(), task.object_id("o2").unwrap()))
            .collect();

        let via_replace = instantiate(
            &replace_quantifier(&formula, &Bindings::new(), &task),
            &task,
            &tables,
            &bindings,
        )
        .unwrap();
        let direct = instantiate(&formula, &task, &tables, &bindings).unwrap();
        assert_eq!(via_replace, direct);
    }

    #[test]
    fn arity_mismatch_is_rejected() {
        let (task, tables) = fixture();
        let schema = task.schema_id("p").unwrap();
        let formula = Expr::new(Expression::Variable {
            schema,
            params: Vec::new(),
        });
        assert!(matches!(
            instantiate(&formula, &task, &tables, &Bindings::new()),
            Err(CompileError::WrongParameterArity(_))
        ));
    }
}
