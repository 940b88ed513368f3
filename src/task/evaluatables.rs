//! Evaluatables: the grounded CPFs, the reward function and the action
//! preconditions, together with the caching metadata attached to them by the
//! hash-key generator and the precomputer.

use crate::logic::{DiscretePd, Expr, ExprInfo, ValueSet};

/// How results of an evaluatable are cached by the downstream runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachingKind {
    /// The key space overflowed; no caching.
    None,
    /// Perfect keys into a vector of the given length.
    Vector(usize),
    /// Perfect keys into a hash map.
    Map,
}

impl CachingKind {
    pub fn label(&self) -> &'static str {
        match self {
            CachingKind::None => "NONE",
            CachingKind::Vector(_) => "VECTOR",
            CachingKind::Map => "MAP",
        }
    }
}

/// Data shared by everything that is evaluated during search: a formula,
/// its dependency analysis, and the hash-key metadata.
#[derive(Debug)]
pub struct Evaluatable {
    pub name: String,
    pub formula: Expr,
    /// The deterministic analogue; present iff the formula is probabilistic.
    pub determinization: Option<Expr>,
    pub info: ExprInfo,
    pub hash_index: usize,
    pub caching: CachingKind,
    pub kleene_caching: CachingKind,
    /// Precomputed evaluation results; cells stay `None` until the
    /// precomputer writes them exactly once.
    pub precomputed: Vec<Option<f64>>,
    pub precomputed_pd: Vec<Option<DiscretePd>>,
    /// Hash key per action state, one value per action equivalence class.
    pub action_hash_keys: Vec<i64>,
    /// (state variable index, hash key base) per dependent state variable.
    pub state_fluent_hash_key_bases: Vec<(usize, i64)>,
}

impl Evaluatable {
    pub fn new(name: String, formula: Expr) -> Self {
        let info = ExprInfo::of(&formula);
        Self {
            name,
            formula,
            determinization: None,
            info,
            hash_index: 0,
            caching: CachingKind::None,
            kleene_caching: CachingKind::None,
            precomputed: Vec::new(),
            precomputed_pd: Vec::new(),
            action_hash_keys: Vec::new(),
            state_fluent_hash_key_bases: Vec::new(),
        }
    }

    /// Recomputes the dependency analysis after the formula was rewritten.
    pub fn refresh_info(&mut self) {
        self.info = ExprInfo::of(&self.formula);
    }

    pub fn is_probabilistic(&self) -> bool {
        self.info.probabilistic
    }

    pub fn is_action_independent(&self) -> bool {
        self.info.action_deps.is_empty()
    }

    pub fn contains_state_fluent(&self) -> bool {
        !self.info.state_deps.is_empty()
    }
}

/// The transition rule of one state variable.
#[derive(Debug)]
pub struct Cpf {
    /// Full name of the head state fluent.
    pub head_name: String,
    /// Value type of the head; its object list names the domain values.
    pub value_type: usize,
    pub initial_value: f64,
    /// Upper bound on the domain size, from the value type.
    pub max_domain_size: usize,
    pub eval: Evaluatable,
    /// The reachable domain, a contiguous prefix of the naturals once the
    /// domain analysis has run. Empty until then.
    pub domain: Vec<usize>,
    /// `2^|domain| - 1`, or 0 if that overflows the Kleene hash range.
    pub kleene_domain_size: i64,
}

impl Cpf {
    pub fn new(
        head_name: String,
        value_type: usize,
        initial_value: f64,
        max_domain_size: usize,
        formula: Expr,
    ) -> Self {
        Self {
            eval: Evaluatable::new(head_name.clone(), formula),
            head_name,
            value_type,
            initial_value,
            max_domain_size,
            domain: Vec::new(),
            kleene_domain_size: 0,
        }
    }

    pub fn domain_size(&self) -> usize {
        self.domain.len()
    }

    pub fn has_finite_domain(&self) -> bool {
        !self.domain.is_empty()
    }

    pub fn set_domain(&mut self, num_values: usize) {
        self.domain = (0..num_values).collect();
    }

    pub fn is_probabilistic(&self) -> bool {
        self.eval.is_probabilistic()
    }
}

/// A state-action constraint that survived classification as a proper
/// action precondition.
#[derive(Debug)]
pub struct Precondition {
    pub index: usize,
    pub eval: Evaluatable,
}

impl Precondition {
    pub fn new(index: usize, name: String, formula: Expr) -> Self {
        Self {
            index,
            eval: Evaluatable::new(name, formula),
        }
    }
}

/// The reward, a CPF with a synthetic head whose domain bounds the
/// achievable reward.
#[derive(Debug)]
pub struct RewardFunction {
    pub eval: Evaluatable,
    pub domain: ValueSet,
}

impl RewardFunction {
    pub fn new(formula: Expr) -> Self {
        Self {
            eval: Evaluatable::new("Reward".to_string(), formula),
            domain: ValueSet::new(),
        }
    }

    pub fn min_value(&self) -> f64 {
        self.domain.min()
    }

    pub fn max_value(&self) -> f64 {
        self.domain.max()
    }
}
