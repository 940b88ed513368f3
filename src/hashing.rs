//! Perfect-hash bases for states, Kleene states and evaluatables.
//!
//! States hash as `sum(base_i * value_i)` with `base_i` the product of all
//! earlier domain sizes. Kleene states use the powerset domain (minus the
//! empty set) per variable. Evaluatables hash over the variables they
//! actually depend on, with joint actions collapsed into equivalence
//! classes over the dependent action variables. Every product is checked
//! for overflow; an overflowing table is disabled rather than reported as
//! an error, and the affected evaluatables fall back to map-based caching.

use log::{info, warn};

use crate::math::multiply_with_overflow_check;
use crate::task::{ActionState, CachingKind, Evaluatable, Task};

/// Largest perfect key space that is tabulated in a vector.
const VECTOR_CACHING_THRESHOLD: i64 = 1_000_000;
const KLEENE_VECTOR_CACHING_THRESHOLD: i64 = 200_000;

/// Domains larger than this make the powerset domain overflow on its own.
const MAX_KLEENE_DOMAIN_BITS: usize = 62;

pub fn generate_hash_keys(task: &mut Task) {
    info!("Preparing state hash keys");
    prepare_state_hash_keys(task);
    info!("Preparing Kleene state hash keys");
    prepare_kleene_state_hash_keys(task);
    info!("Preparing hash keys of evaluatables");
    prepare_evaluatable_hash_keys(task);
}

fn prepare_state_hash_keys(task: &mut Task) {
    let mut base: i64 = 1;
    let mut keys: Vec<Vec<i64>> = Vec::with_capacity(task.cpfs.len());
    for cpf in &task.cpfs {
        let num_values = cpf.domain_size();
        keys.push((0..num_values as i64).map(|value| value * base).collect());
        if !multiply_with_overflow_check(&mut base, num_values as i64) {
            warn!("state hashing disabled, the state space overflows");
            return;
        }
    }
    task.state_hash_keys = keys;
}

fn prepare_kleene_state_hash_keys(task: &mut Task) {
    let mut possible = true;
    for cpf in &mut task.cpfs {
        if cpf.domain_size() > MAX_KLEENE_DOMAIN_BITS {
            cpf.kleene_domain_size = 0;
            possible = false;
        } else {
            cpf.kleene_domain_size = (1i64 << cpf.domain_size()) - 1;
        }
    }
    if !possible {
        warn!("Kleene state hashing disabled, a powerset domain overflows");
        return;
    }

    let mut base: i64 = 1;
    let mut bases: Vec<i64> = Vec::with_capacity(task.cpfs.len());
    for cpf in &task.cpfs {
        bases.push(base);
        if !multiply_with_overflow_check(&mut base, cpf.kleene_domain_size) {
            warn!("Kleene state hashing disabled, the state space overflows");
            return;
        }
    }
    task.kleene_state_hash_key_bases = bases;
}

fn prepare_evaluatable_hash_keys(task: &mut Task) {
    let num_cpfs = task.cpfs.len();
    let domain_sizes: Vec<usize> = task.cpfs.iter().map(|cpf| cpf.domain_size()).collect();
    let kleene_sizes: Vec<i64> = task.cpfs.iter().map(|cpf| cpf.kleene_domain_size).collect();
    let mut state_maps: Vec<Vec<(usize, i64)>> = vec![Vec::new(); num_cpfs];
    let mut kleene_maps: Vec<Vec<(usize, i64)>> = vec![Vec::new(); num_cpfs];

    let mut hash_index = 0;
    for index in 0..num_cpfs {
        prepare_evaluatable(
            &mut task.cpfs[index].eval,
            hash_index,
            &domain_sizes,
            &kleene_sizes,
            &task.action_states,
            &mut state_maps,
            &mut kleene_maps,
        );
        hash_index += 1;
    }
    prepare_evaluatable(
        &mut task.reward.as_mut().expect("reward not instantiated").eval,
        hash_index,
        &domain_sizes,
        &kleene_sizes,
        &task.action_states,
        &mut state_maps,
        &mut kleene_maps,
    );
    for precond in &mut task.preconds {
        hash_index += 1;
        prepare_evaluatable(
            &mut precond.eval,
            hash_index,
            &domain_sizes,
            &kleene_sizes,
            &task.action_states,
            &mut state_maps,
            &mut kleene_maps,
        );
    }

    task.state_fluent_hash_keys = state_maps;
    task.kleene_state_fluent_hash_keys = kleene_maps;
}

fn prepare_evaluatable(
    eval: &mut Evaluatable,
    hash_index: usize,
    domain_sizes: &[usize],
    kleene_sizes: &[i64],
    action_states: &[ActionState],
    state_maps: &mut [Vec<(usize, i64)>],
    kleene_maps: &mut [Vec<(usize, i64)>],
) {
    eval.hash_index = hash_index;
    let num_action_classes = determine_action_hash_keys(eval, action_states);
    prepare_state_fluent_hash_keys(eval, domain_sizes, num_action_classes, state_maps);
    prepare_kleene_state_fluent_hash_keys(eval, kleene_sizes, num_action_classes, kleene_maps);
}

/// Partitions the actions into equivalence classes that agree on every
/// dependent action variable, assigning one key per class. Returns the
/// number of classes.
fn determine_action_hash_keys(eval: &mut Evaluatable, action_states: &[ActionState]) -> i64 {
    let mut next_key: i64 = 0;
    eval.action_hash_keys = vec![0; action_states.len()];
    for index in 0..action_states.len() {
        match equivalent_earlier_action(eval, action_states, index) {
            Some(earlier) => {
                eval.action_hash_keys[index] = eval.action_hash_keys[earlier];
            }
            None => {
                eval.action_hash_keys[index] = next_key;
                next_key += 1;
            }
        }
    }
    next_key
}

fn equivalent_earlier_action(
    eval: &Evaluatable,
    action_states: &[ActionState],
    index: usize,
) -> Option<usize> {
    let action = &action_states[index];
    (0..index).find(|&earlier| {
        eval.info
            .action_deps
            .iter()
            .all(|&dep| action.values[dep] == action_states[earlier].values[dep])
    })
}

fn prepare_state_fluent_hash_keys(
    eval: &mut Evaluatable,
    domain_sizes: &[usize],
    num_action_classes: i64,
    state_maps: &mut [Vec<(usize, i64)>],
) {
    let mut base = num_action_classes;
    let mut bases: Vec<(usize, i64)> = Vec::new();
    for (index, &size) in domain_sizes.iter().enumerate() {
        if !eval.info.state_deps.contains(&index) {
            continue;
        }
        bases.push((index, base));
        if !multiply_with_overflow_check(&mut base, size as i64) {
            eval.caching = CachingKind::None;
            return;
        }
    }

    for &(index, key_base) in &bases {
        state_maps[index].push((eval.hash_index, key_base));
    }
    eval.state_fluent_hash_key_bases = bases;

    // `base` is now the number of perfect keys of this evaluatable.
    if base > VECTOR_CACHING_THRESHOLD {
        eval.caching = CachingKind::Map;
    } else {
        eval.caching = CachingKind::Vector(base as usize);
        eval.precomputed = vec![None; base as usize];
        if eval.is_probabilistic() {
            eval.precomputed_pd = vec![None; base as usize];
        }
    }
}

fn prepare_kleene_state_fluent_hash_keys(
    eval: &mut Evaluatable,
    kleene_sizes: &[i64],
    num_action_classes: i64,
    kleene_maps: &mut [Vec<(usize, i64)>],
) {
    let mut base = num_action_classes;
    let mut bases: Vec<(usize, i64)> = Vec::new();
    for (index, &size) in kleene_sizes.iter().enumerate() {
        if !eval.info.state_deps.contains(&index) {
            continue;
        }
        bases.push((index, base));
        if size == 0 || !multiply_with_overflow_check(&mut base, size) {
            eval.kleene_caching = CachingKind::None;
            return;
        }
    }

    for &(index, key_base) in &bases {
        kleene_maps[index].push((eval.hash_index, key_base));
    }

    if base > KLEENE_VECTOR_CACHING_THRESHOLD {
        eval.kleene_caching = CachingKind::Map;
    } else {
        eval.kleene_caching = CachingKind::Vector(base as usize);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::{Expr, Expression};
    use crate::task::{Cpf, RewardFunction};

    fn boolean_cpf(name: &str, formula: Expr) -> Cpf {
        let mut cpf = Cpf::new(name.to_string(), Task::BOOL_TYPE, 0.0, 2, formula);
        cpf.set_domain(2);
        cpf.eval.refresh_info();
        cpf
    }

    fn two_fluent_task() -> Task {
        let mut task = Task::new();
        task.cpfs = vec![
            boolean_cpf("p", Expression::state_fluent(1)),
            boolean_cpf("q", Expression::state_fluent(0)),
        ];
        task.reward = Some(RewardFunction::new(Expression::state_fluent(0)));
        task.reward_mut().eval.refresh_info();
        let mut noop = ActionState::new(0);
        noop.index = 0;
        task.action_states = vec![noop];
        task
    }

    #[test]
    fn state_hash_bases_are_running_domain_products() {
        let mut task = two_fluent_task();
        generate_hash_keys(&mut task);
        assert_eq!(task.state_hash_keys, vec![vec![0, 1], vec![0, 2]]);
        // Powerset domains of size 3 each.
        assert_eq!(task.kleene_state_hash_key_bases, vec![1, 3]);
    }

    #[test]
    fn evaluatables_hash_over_their_dependencies_only() {
        let mut task = two_fluent_task();
        generate_hash_keys(&mut task);
        // Each CPF depends on one boolean fluent and no action, so its key
        // space has one action class times two values.
        assert_eq!(task.cpfs[0].eval.caching, CachingKind::Vector(2));
        assert_eq!(task.cpfs[0].eval.state_fluent_hash_key_bases, vec![(1, 1)]);
        assert_eq!(task.cpfs[0].eval.hash_index, 0);
        assert_eq!(task.reward().eval.hash_index, 2);
        // The inverse map: fluent 0 affects CPF 1 and the reward.
        assert_eq!(task.state_fluent_hash_keys[0].len(), 2);
    }

    #[test]
    fn overflowing_key_spaces_disable_hashing() {
        let mut task = Task::new();
        task.cpfs = (0..80)
            .map(|i| boolean_cpf(&format!("p{}", i), Expression::state_fluent(i)))
            .collect();
        task.reward = Some(RewardFunction::new(Expression::state_fluent(0)));
        task.reward_mut().eval.refresh_info();
        let mut noop = ActionState::new(0);
        noop.index = 0;
        task.action_states = vec![noop];

        generate_hash_keys(&mut task);
        // 2^80 states overflow a 64-bit key.
        assert!(task.state_hash_keys.is_empty());
        assert!(task.kleene_state_hash_key_bases.is_empty());
        // Individual evaluatables still hash fine over one variable each.
        assert_eq!(task.cpfs[0].eval.caching, CachingKind::Vector(2));
    }
}
