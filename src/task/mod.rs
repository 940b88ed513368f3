//! The task model: typed symbol tables for the schematic level and the
//! grounded entities the pipeline produces from them.
//!
//! A [`Task`] is created by the parser, grounded by the instantiator and
//! then mutated by every following pipeline stage until it is serialized.
//! There is no global state; the task is passed explicitly everywhere.

pub mod evaluatables;
pub mod states;

use std::collections::HashMap;

use crate::error::{CompileError, Result};
use crate::logic::Expr;

pub use evaluatables::{CachingKind, Cpf, Evaluatable, Precondition, RewardFunction};
pub use states::{ActionState, KleeneState, State};

/// A named node in the single-rooted type hierarchy.
#[derive(Debug)]
pub struct TypeData {
    pub name: String,
    pub supertype: Option<usize>,
    /// Object membership is transitive: this list also contains the objects
    /// of all subtypes.
    pub objects: Vec<usize>,
}

/// A named, typed value with an ordinal within its declared type.
#[derive(Debug)]
pub struct ObjectData {
    pub name: String,
    pub object_type: usize,
    /// Position in the declared type's object list; doubles as the numeric
    /// value of the object when used as a fluent value.
    pub value: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariableKind {
    StateFluent,
    ActionFluent,
    NonFluent,
    IntermFluent,
}

/// A lifted variable declaration.
#[derive(Debug)]
pub struct VariableSchema {
    pub name: String,
    pub param_types: Vec<usize>,
    pub kind: VariableKind,
    pub value_type: usize,
    pub default_value: f64,
}

/// A schematic CPF: head schema, head parameter names, and the body.
#[derive(Debug)]
pub struct CpfDefinition {
    pub schema: usize,
    pub param_names: Vec<String>,
    pub formula: Expr,
}

/// A grounded action variable.
#[derive(Debug)]
pub struct ActionFluentData {
    pub name: String,
    pub value_type: usize,
    pub is_fdr: bool,
}

/// How the downstream runtime computes the reward of the final step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalRewardMethod {
    /// Noop is always applicable and optimal as final action.
    Noop,
    /// All actions yield the same reward; apply the first applicable one.
    FirstApplicable,
    /// Evaluate the candidates determined by the dominance analysis.
    BestOfCandidateSet,
}

impl FinalRewardMethod {
    pub fn label(&self) -> &'static str {
        match self {
            FinalRewardMethod::Noop => "NOOP",
            FinalRewardMethod::FirstApplicable => "FIRST_APPLICABLE",
            FinalRewardMethod::BestOfCandidateSet => "BEST_OF_CANDIDATE_SET",
        }
    }
}

#[derive(Debug)]
pub struct Task {
    pub domain_name: String,
    pub instance_name: String,
    pub horizon: usize,
    pub discount_factor: f64,
    /// Bound on concurrently active action fluents; `usize::MAX` until the
    /// instance or a recognized precondition constrains it.
    pub max_concurrent_actions: usize,

    pub types: Vec<TypeData>,
    pub objects: Vec<ObjectData>,
    type_lookup: HashMap<String, usize>,
    object_lookup: HashMap<String, usize>,

    pub schemas: Vec<VariableSchema>,
    schema_lookup: HashMap<String, usize>,

    pub cpf_definitions: Vec<CpfDefinition>,
    pub constraint_definitions: Vec<Expr>,
    pub reward_definition: Option<Expr>,

    /// Instance bindings by full ground name.
    pub initial_values: HashMap<String, f64>,
    pub non_fluent_values: HashMap<String, f64>,

    // Grounded entities, produced by the instantiator and reshaped by the
    // simplifier.
    pub action_fluents: Vec<ActionFluentData>,
    pub cpfs: Vec<Cpf>,
    pub reward: Option<RewardFunction>,
    /// Grounded state-action constraints awaiting (re)classification.
    pub sacs: Vec<Expr>,
    pub preconds: Vec<Precondition>,
    pub static_sacs: Vec<Precondition>,
    pub action_states: Vec<ActionState>,
    /// Counter for FDR variables synthesized so far, to keep their names
    /// unique across simplifier iterations.
    pub num_fdr_action_vars: usize,

    // Hash tables.
    pub state_hash_keys: Vec<Vec<i64>>,
    pub kleene_state_hash_key_bases: Vec<i64>,
    /// Per state variable: (evaluatable hash index, hash key base) of every
    /// evaluatable that depends on it.
    pub state_fluent_hash_keys: Vec<Vec<(usize, i64)>>,
    pub kleene_state_fluent_hash_keys: Vec<Vec<(usize, i64)>>,

    // Task analysis results.
    pub reward_allows_lock_detection: bool,
    pub reward_lock_detected: bool,
    pub unreasonable_action_detected: bool,
    pub unreasonable_action_in_determinization_detected: bool,
    pub states_with_unique_action: usize,
    pub num_encountered_states: usize,
    pub final_reward_method: FinalRewardMethod,
    pub final_action_candidates: Vec<usize>,
    pub training_set: Vec<State>,
}

impl Default for Task {
    fn default() -> Self {
        Self::new()
    }
}

impl Task {
    pub fn new() -> Self {
        let mut task = Self {
            domain_name: String::new(),
            instance_name: String::new(),
            horizon: 1,
            discount_factor: 1.0,
            max_concurrent_actions: usize::MAX,
            types: Vec::new(),
            objects: Vec::new(),
            type_lookup: HashMap::new(),
            object_lookup: HashMap::new(),
            schemas: Vec::new(),
            schema_lookup: HashMap::new(),
            cpf_definitions: Vec::new(),
            constraint_definitions: Vec::new(),
            reward_definition: None,
            initial_values: HashMap::new(),
            non_fluent_values: HashMap::new(),
            action_fluents: Vec::new(),
            cpfs: Vec::new(),
            reward: None,
            sacs: Vec::new(),
            preconds: Vec::new(),
            static_sacs: Vec::new(),
            action_states: Vec::new(),
            num_fdr_action_vars: 0,
            state_hash_keys: Vec::new(),
            kleene_state_hash_key_bases: Vec::new(),
            state_fluent_hash_keys: Vec::new(),
            kleene_state_fluent_hash_keys: Vec::new(),
            reward_allows_lock_detection: false,
            reward_lock_detected: false,
            unreasonable_action_detected: false,
            unreasonable_action_in_determinization_detected: false,
            states_with_unique_action: 0,
            num_encountered_states: 0,
            final_reward_method: FinalRewardMethod::BestOfCandidateSet,
            final_action_candidates: Vec::new(),
            training_set: Vec::new(),
        };
        // Built-in types and the boolean truth values.
        let bool_type = task.add_type("bool", None).unwrap();
        debug_assert_eq!(bool_type, 0);
        task.add_object("bool", "false").unwrap();
        task.add_object("bool", "true").unwrap();
        task.add_type("int", None).unwrap();
        task.add_type("real", None).unwrap();
        task.add_type("object", None).unwrap();
        task
    }

    pub const BOOL_TYPE: usize = 0;

    pub fn add_type(&mut self, name: &str, supertype: Option<&str>) -> Result<usize> {
        if self.type_lookup.contains_key(name) {
            return Err(CompileError::AmbiguousType(name.to_string()));
        }
        let supertype = match supertype {
            None => None,
            Some(parent) => Some(
                self.type_id(parent)
                    .map_err(|_| CompileError::UnknownSupertype(parent.to_string()))?,
            ),
        };
        let id = self.types.len();
        self.types.push(TypeData {
            name: name.to_string(),
            supertype,
            objects: Vec::new(),
        });
        self.type_lookup.insert(name.to_string(), id);
        Ok(id)
    }

    pub fn type_id(&self, name: &str) -> Result<usize> {
        self.type_lookup
            .get(name)
            .copied()
            .ok_or_else(|| CompileError::UnknownType(name.to_string()))
    }

    /// Registers an object of the given type and, transitively, of all its
    /// supertypes.
    pub fn add_object(&mut self, type_name: &str, object_name: &str) -> Result<usize> {
        let type_id = self.type_id(type_name)?;
        if self.object_lookup.contains_key(object_name) {
            return Err(CompileError::AmbiguousObject(object_name.to_string()));
        }
        let id = self.objects.len();
        self.objects.push(ObjectData {
            name: object_name.to_string(),
            object_type: type_id,
            value: self.types[type_id].objects.len() as f64,
        });
        self.object_lookup.insert(object_name.to_string(), id);
        let mut current = Some(type_id);
        while let Some(t) = current {
            self.types[t].objects.push(id);
            current = self.types[t].supertype;
        }
        Ok(id)
    }

    pub fn object_id(&self, name: &str) -> Result<usize> {
        self.object_lookup
            .get(name)
            .copied()
            .ok_or_else(|| CompileError::UnknownObject(name.to_string()))
    }

    pub fn add_schema(&mut self, schema: VariableSchema) -> Result<usize> {
        if self.schema_lookup.contains_key(&schema.name) {
            return Err(CompileError::AmbiguousVariable(schema.name));
        }
        let id = self.schemas.len();
        self.schema_lookup.insert(schema.name.clone(), id);
        self.schemas.push(schema);
        Ok(id)
    }

    pub fn schema_id(&self, name: &str) -> Result<usize> {
        self.schema_lookup
            .get(name)
            .copied()
            .ok_or_else(|| CompileError::UndefinedVariable(name.to_string()))
    }

    pub fn set_reward_definition(&mut self, formula: Expr) -> Result<()> {
        if self.reward_definition.is_some() {
            return Err(CompileError::DuplicateReward);
        }
        self.reward_definition = Some(formula);
        Ok(())
    }

    /// Number of values of an action variable, from its value type.
    pub fn action_fluent_domain_size(&self, index: usize) -> usize {
        self.types[self.action_fluents[index].value_type].objects.len()
    }

    /// The reward function; only valid after instantiation.
    pub fn reward(&self) -> &RewardFunction {
        self.reward.as_ref().expect("reward not instantiated")
    }

    pub fn reward_mut(&mut self) -> &mut RewardFunction {
        self.reward.as_mut().expect("reward not instantiated")
    }

    /// The initial state, with one value per CPF.
    pub fn initial_state(&self) -> State {
        State::from_values(self.cpfs.iter().map(|cpf| cpf.initial_value).collect())
    }

    /// Index of the first probabilistic CPF, which equals the number of
    /// deterministic CPFs because deterministic CPFs sort first.
    pub fn first_probabilistic_index(&self) -> usize {
        self.cpfs
            .iter()
            .position(|cpf| cpf.is_probabilistic())
            .unwrap_or(self.cpfs.len())
    }

    pub fn is_deterministic(&self) -> bool {
        self.first_probabilistic_index() == self.cpfs.len()
    }
}

/// Assembles the full name of a grounded variable from the schema name and
/// the bound objects.
pub fn ground_name(schema_name: &str, object_names: &[&str]) -> String {
    if object_names.is_empty() {
        schema_name.to_string()
    } else {
        format!("{}({})", schema_name, object_names.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_membership_is_transitive() {
        let mut task = Task::new();
        task.add_type("vehicle", None).unwrap();
        task.add_type("truck", Some("vehicle")).unwrap();
        task.add_object("truck", "t1").unwrap();
        let vehicle = task.type_id("vehicle").unwrap();
        let truck = task.type_id("truck").unwrap();
        assert_eq!(task.types[vehicle].objects.len(), 1);
        assert_eq!(task.types[truck].objects.len(), 1);
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut task = Task::new();
        task.add_type("t", None).unwrap();
        assert!(matches!(
            task.add_type("t", None),
            Err(CompileError::AmbiguousType(_))
        ));
        task.add_object("t", "o").unwrap();
        assert!(matches!(
            task.add_object("t", "o"),
            Err(CompileError::AmbiguousObject(_))
        ));
    }

    #[test]
    fn ground_names_follow_schema_and_objects() {
        assert_eq!(ground_name("p", &[]), "p");
        assert_eq!(ground_name("p", &["a", "b"]), "p(a, b)");
    }
}
