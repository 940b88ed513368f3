//! Task analysis: reward bounds, the final-reward calculation method, and
//! seeded random walks that detect unreasonable actions and reward locks
//! and collect the training states for the downstream runtime's warm-up.

use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use log::{debug, info};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::logic::domains::calculate_domain;
use crate::logic::evaluate::evaluate;
use crate::logic::kleene::evaluate_to_kleene;
use crate::logic::pd::{evaluate_to_pd, DiscretePd};
use crate::logic::ValueSet;
use crate::math;
use crate::options::CompileOptions;
use crate::task::{ActionState, CachingKind, FinalRewardMethod, KleeneState, State, Task};

pub fn analyze_task(task: &mut Task, options: &CompileOptions) {
    calculate_min_and_max_reward(task);
    determine_task_properties(task);

    info!("Analyzing task with random walks");
    let results = TaskAnalyzer::new(task, options).run();
    task.unreasonable_action_detected = results.unreasonable_action;
    task.unreasonable_action_in_determinization_detected =
        results.unreasonable_action_in_determinization;
    task.reward_lock_detected = results.reward_lock;
    task.states_with_unique_action = results.states_with_unique_action;
    task.num_encountered_states = results.num_encountered_states;
    task.training_set = results.training_set;
}

/// Bounds the achievable reward: exactly from the precomputed table when
/// the reward is vector-cached, otherwise overapproximated with the
/// reachable domains.
fn calculate_min_and_max_reward(task: &mut Task) {
    let values: Vec<f64> = if matches!(task.reward().eval.caching, CachingKind::Vector(_)) {
        task.reward()
            .eval
            .precomputed
            .iter()
            .filter_map(|cell| *cell)
            .collect()
    } else {
        Vec::new()
    };

    let mut domain = ValueSet::new();
    if values.is_empty() {
        let state_domains: Vec<ValueSet> = task
            .cpfs
            .iter()
            .map(|cpf| cpf.domain.iter().map(|&value| value as f64).collect())
            .collect();
        for action in &task.action_states {
            let reachable =
                calculate_domain(&task.reward().eval.formula, &state_domains, action);
            domain.extend_from(&reachable);
        }
    } else {
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        for value in values {
            if math::lt(value, min) {
                min = value;
            }
            if math::gt(value, max) {
                max = value;
            }
        }
        domain.insert(min);
        domain.insert(max);
    }
    task.reward_mut().domain = domain;
    debug!(
        "reward bounds: [{}, {}]",
        task.reward().min_value(),
        task.reward().max_value()
    );
}

/// Decides how the final step's reward is computed, and whether the reward
/// formula admits reward-lock detection at all.
fn determine_task_properties(task: &mut Task) {
    let noop_is_first = task
        .action_states
        .first()
        .map(|action| action.active_fluents.is_empty())
        .unwrap_or(false);
    let noop_unconditional = task
        .action_states
        .first()
        .map(|action| action.relevant_preconditions.is_empty())
        .unwrap_or(false);
    let no_positive_reward_deps = task.reward().eval.info.positive_action_deps.is_empty();
    let reward_is_action_independent = task.reward().eval.info.action_deps.is_empty();

    // Locks are only detectable when staying put never costs reward.
    task.reward_allows_lock_detection = no_positive_reward_deps && noop_is_first;

    if task.reward_allows_lock_detection && noop_unconditional {
        task.final_reward_method = FinalRewardMethod::Noop;
    } else if reward_is_action_independent {
        task.final_reward_method = FinalRewardMethod::FirstApplicable;
    } else {
        task.final_reward_method = FinalRewardMethod::BestOfCandidateSet;
        let mut candidates: Vec<usize> = Vec::new();
        for index in 0..task.action_states.len() {
            let dominated = candidates
                .iter()
                .any(|&candidate| action_state_dominates(task, candidate, index));
            if !dominated {
                candidates.retain(|&candidate| !action_state_dominates(task, index, candidate));
                candidates.push(index);
            }
        }
        debug!("{} candidates for the optimal final action", candidates.len());
        task.final_action_candidates = candidates;
    }
}

/// Action `lhs` dominates `rhs` if it carries no preconditions, activates
/// every positively rewarded fluent of `rhs`, and `rhs` activates every
/// negatively rewarded fluent of `lhs`.
fn action_state_dominates(task: &Task, lhs: usize, rhs: usize) -> bool {
    let lhs = &task.action_states[lhs];
    let rhs = &task.action_states[rhs];
    if !lhs.relevant_preconditions.is_empty() {
        return false;
    }
    let reward_info = &task.reward().eval.info;
    let rewarded = |action: &ActionState, deps: &BTreeSet<usize>| -> BTreeSet<usize> {
        action
            .active_fluents
            .iter()
            .copied()
            .filter(|fluent| deps.contains(fluent))
            .collect()
    };
    let lhs_positive = rewarded(lhs, &reward_info.positive_action_deps);
    let rhs_positive = rewarded(rhs, &reward_info.positive_action_deps);
    let lhs_negative = rewarded(lhs, &reward_info.negative_action_deps);
    let rhs_negative = rewarded(rhs, &reward_info.negative_action_deps);
    rhs_positive.is_subset(&lhs_positive) && lhs_negative.is_subset(&rhs_negative)
}

struct AnalysisResults {
    unreasonable_action: bool,
    unreasonable_action_in_determinization: bool,
    reward_lock: bool,
    states_with_unique_action: usize,
    num_encountered_states: usize,
    training_set: Vec<State>,
}

struct TaskAnalyzer<'a> {
    task: &'a Task,
    rng: StdRng,
    budget: Duration,
    training_set_size: usize,
    encountered: BTreeSet<State>,
    unreasonable_action: bool,
    unreasonable_action_in_determinization: bool,
    reward_lock: bool,
    states_with_unique_action: usize,
}

impl<'a> TaskAnalyzer<'a> {
    fn new(task: &'a Task, options: &CompileOptions) -> Self {
        Self {
            task,
            rng: StdRng::seed_from_u64(options.seed),
            budget: Duration::from_secs_f64(options.analysis_budget),
            training_set_size: options.training_set_size,
            encountered: BTreeSet::new(),
            unreasonable_action: false,
            unreasonable_action_in_determinization: false,
            reward_lock: false,
            states_with_unique_action: 0,
        }
    }

    fn run(mut self) -> AnalysisResults {
        let initial = self.task.initial_state();
        if !self.task.action_states.is_empty() {
            let start = Instant::now();
            let mut current = initial.clone();
            let mut remaining_steps = self.task.horizon;
            while start.elapsed() < self.budget {
                let next = self.analyze_state_and_apply_action(&current);
                self.encountered.insert(current.clone());
                remaining_steps = remaining_steps.saturating_sub(1);
                match next {
                    Some(next) if remaining_steps > 0 => current = next,
                    _ => {
                        current = initial.clone();
                        remaining_steps = self.task.horizon;
                    }
                }
            }
        } else {
            self.encountered.insert(initial);
        }

        let num_encountered_states = self.encountered.len();
        debug!("encountered {} states", num_encountered_states);
        AnalysisResults {
            unreasonable_action: self.unreasonable_action,
            unreasonable_action_in_determinization: self.unreasonable_action_in_determinization,
            reward_lock: self.reward_lock,
            states_with_unique_action: self.states_with_unique_action,
            num_encountered_states,
            training_set: self.create_training_set(),
        }
    }

    fn analyze_state_and_apply_action(&mut self, current: &State) -> Option<State> {
        let task = self.task;
        if self.encountered.contains(current) {
            // Already analyzed; just keep walking.
            return self.apply_random_applicable_action(current);
        }

        if !self.unreasonable_action_in_determinization {
            self.detect_unreasonable_actions_in_determinization(current);
        }

        // Two applicable actions with identical successor distributions
        // make one of them unreasonable.
        let mut successor_distributions: Vec<Vec<DiscretePd>> = Vec::new();
        let mut reasonable: Vec<usize> = Vec::new();
        for action in &task.action_states {
            if !self.action_is_applicable(action, current) {
                continue;
            }
            let successors: Vec<DiscretePd> = task
                .cpfs
                .iter()
                .map(|cpf| evaluate_to_pd(&cpf.eval.formula, current, action))
                .collect();
            if successor_distributions.contains(&successors) {
                self.unreasonable_action = true;
            } else {
                successor_distributions.push(successors);
                reasonable.push(action.index);
            }
        }
        if reasonable.len() == 1 {
            self.states_with_unique_action += 1;
        }
        if reasonable.is_empty() {
            return None;
        }

        let chosen = reasonable[self.rng.gen_range(0..reasonable.len())];
        let action = &task.action_states[chosen];
        let reward = evaluate(&task.reward().eval.formula, current, action);
        if task.reward_allows_lock_detection
            && !self.reward_lock
            && self.is_reward_lock(current, reward)
        {
            debug!("reward lock detected");
            self.reward_lock = true;
        }
        Some(self.sample_successor(current, action))
    }

    fn apply_random_applicable_action(&mut self, current: &State) -> Option<State> {
        let task = self.task;
        let applicable: Vec<usize> = task
            .action_states
            .iter()
            .filter(|action| self.action_is_applicable(action, current))
            .map(|action| action.index)
            .collect();
        if applicable.is_empty() {
            return None;
        }
        let chosen = applicable[self.rng.gen_range(0..applicable.len())];
        Some(self.sample_successor(current, &task.action_states[chosen]))
    }

    fn action_is_applicable(&self, action: &ActionState, state: &State) -> bool {
        action.relevant_preconditions.iter().all(|&index| {
            math::is_true(evaluate(
                &self.task.preconds[index].eval.formula,
                state,
                action,
            ))
        })
    }

    /// Draws one successor state, sampling every probabilistic CPF from
    /// its outcome distribution.
    fn sample_successor(&mut self, state: &State, action: &ActionState) -> State {
        let task = self.task;
        let mut next = State::new(task.cpfs.len());
        for (index, cpf) in task.cpfs.iter().enumerate() {
            next[index] = if cpf.is_probabilistic() {
                let pd = evaluate_to_pd(&cpf.eval.formula, state, action);
                let mut draw = self.rng.gen::<f64>();
                let mut value = *pd.values.last().expect("empty distribution");
                for (&candidate, &probability) in pd.values.iter().zip(&pd.probabilities) {
                    if draw < probability {
                        value = candidate;
                        break;
                    }
                    draw -= probability;
                }
                value
            } else {
                evaluate(&cpf.eval.formula, state, action)
            };
        }
        next
    }

    fn detect_unreasonable_actions_in_determinization(&mut self, current: &State) {
        let task = self.task;
        let mut successors: BTreeSet<State> = BTreeSet::new();
        for action in &task.action_states {
            if !self.action_is_applicable(action, current) {
                continue;
            }
            let mut next = State::new(task.cpfs.len());
            for (index, cpf) in task.cpfs.iter().enumerate() {
                let formula = cpf.eval.determinization.as_ref().unwrap_or(&cpf.eval.formula);
                next[index] = evaluate(formula, current, action);
            }
            if !successors.insert(next) {
                self.unreasonable_action_in_determinization = true;
                return;
            }
        }
    }

    // --------------------------------------------------------------
    // Reward locks
    // --------------------------------------------------------------

    fn is_reward_lock(&self, current: &State, reward: f64) -> bool {
        if math::eq(reward, self.task.reward().min_value()) {
            self.check_dead_end(&KleeneState::from_state(current))
        } else if math::eq(reward, self.task.reward().max_value()) {
            self.check_goal(&KleeneState::from_state(current))
        } else {
            false
        }
    }

    /// A dead end: every action from every (widened) successor keeps the
    /// reward at its minimum.
    fn check_dead_end(&self, state: &KleeneState) -> bool {
        let actions = &self.task.action_states;
        if !self.kleene_reward_is(state, &actions[0], self.task.reward().min_value()) {
            return false;
        }
        let mut merged = self.kleene_successor(state, &actions[0]);
        for action in &actions[1..] {
            if !self.kleene_reward_is(state, action, self.task.reward().min_value()) {
                return false;
            }
            merged.merge(&self.kleene_successor(state, action));
        }
        merged == *state || self.check_dead_end(&merged)
    }

    /// Goals are underapproximated: only states where staying (the first
    /// action) keeps the maximal reward count.
    fn check_goal(&self, state: &KleeneState) -> bool {
        let first = &self.task.action_states[0];
        if !self.kleene_reward_is(state, first, self.task.reward().max_value()) {
            return false;
        }
        let mut successor = self.kleene_successor(state, first);
        successor.merge(state);
        successor == *state || self.check_goal(&successor)
    }

    fn kleene_successor(&self, state: &KleeneState, action: &ActionState) -> KleeneState {
        let mut successor = KleeneState::new(self.task.cpfs.len());
        for (index, cpf) in self.task.cpfs.iter().enumerate() {
            successor[index] = evaluate_to_kleene(&cpf.eval.formula, state, action);
        }
        successor
    }

    fn kleene_reward_is(&self, state: &KleeneState, action: &ActionState, value: f64) -> bool {
        let rewards = evaluate_to_kleene(&self.task.reward().eval.formula, state, action);
        rewards.len() == 1 && math::eq(rewards.min(), value)
    }

    // --------------------------------------------------------------
    // Training set
    // --------------------------------------------------------------

    /// A random subset of the encountered states, always containing the
    /// initial state.
    fn create_training_set(&mut self) -> Vec<State> {
        if self.encountered.len() <= self.training_set_size {
            return self.encountered.iter().cloned().collect();
        }
        let initial = self.task.initial_state();
        let mut chosen: BTreeSet<State> = BTreeSet::new();
        chosen.insert(initial.clone());
        let mut pool: Vec<State> = self
            .encountered
            .iter()
            .filter(|&state| *state != initial)
            .cloned()
            .collect();
        while chosen.len() < self.training_set_size && !pool.is_empty() {
            let index = self.rng.gen_range(0..pool.len());
            chosen.insert(pool.swap_remove(index));
        }
        chosen.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::{Expr, Expression};
    use crate::task::{Cpf, RewardFunction};

    fn toggle_task() -> Task {
        // p' = ~p, reward = p, a single noop action.
        let mut task = Task::new();
        task.horizon = 3;
        let mut cpf = Cpf::new(
            "p".to_string(),
            Task::BOOL_TYPE,
            0.0,
            2,
            Expr::new(Expression::Negation(Expression::state_fluent(0))),
        );
        cpf.set_domain(2);
        cpf.eval.refresh_info();
        task.cpfs = vec![cpf];
        task.reward = Some(RewardFunction::new(Expression::state_fluent(0)));
        task.reward_mut().eval.refresh_info();
        let mut noop = ActionState::new(0);
        noop.index = 0;
        task.action_states = vec![noop];
        task
    }

    fn quick_options() -> CompileOptions {
        CompileOptions {
            analysis_budget: 0.02,
            seed: 7,
            ..CompileOptions::default()
        }
    }

    #[test]
    fn toggle_task_reward_bounds_and_walks() {
        let mut task = toggle_task();
        analyze_task(&mut task, &quick_options());
        assert_eq!(task.reward().min_value(), 0.0);
        assert_eq!(task.reward().max_value(), 1.0);
        // Only noop exists and the reward ignores actions.
        assert_eq!(task.final_reward_method, FinalRewardMethod::Noop);
        // Both states are reachable and encountered.
        assert_eq!(task.num_encountered_states, 2);
        assert_eq!(task.training_set.len(), 2);
        // A toggling fluent never locks the reward.
        assert!(!task.reward_lock_detected);
    }

    #[test]
    fn absorbing_maximum_is_a_goal_lock() {
        // p' = p, reward = p, starting at p = 1.
        let mut task = toggle_task();
        task.cpfs[0].eval.formula = Expression::state_fluent(0);
        task.cpfs[0].eval.refresh_info();
        task.cpfs[0].initial_value = 1.0;
        analyze_task(&mut task, &quick_options());
        assert!(task.reward_allows_lock_detection);
        assert!(task.reward_lock_detected);
    }

    #[test]
    fn identical_actions_are_unreasonable() {
        // Two actions that both toggle p the same way.
        let mut task = toggle_task();
        task.action_fluents.push(crate::task::ActionFluentData {
            name: "a".to_string(),
            value_type: Task::BOOL_TYPE,
            is_fdr: false,
        });
        task.action_fluents.push(crate::task::ActionFluentData {
            name: "b".to_string(),
            value_type: Task::BOOL_TYPE,
            is_fdr: false,
        });
        let mut noop = ActionState::new(2);
        noop.index = 0;
        let mut first = ActionState::new(2);
        first.values[0] = 1;
        first.index = 1;
        first.active_fluents = vec![0];
        let mut second = ActionState::new(2);
        second.values[1] = 1;
        second.index = 2;
        second.active_fluents = vec![1];
        task.action_states = vec![noop, first, second];

        analyze_task(&mut task, &quick_options());
        assert!(task.unreasonable_action_detected);
        assert!(task.unreasonable_action_in_determinization_detected);
    }
}
